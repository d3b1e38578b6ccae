//! Wraps a pose hierarchy as a state machine state, tracking how long the
//! state has been active so condition nodes can query it.

use std::{alloc::Layout, ptr::NonNull};

use bevy::reflect::Reflect;
use serde::{Deserialize, Serialize};

use crate::core::{
    arena::{emplace, relink},
    context::GraphContext,
    graph_definition::{InstantiationContext, InstantiationMode, NodeSettings},
    graph_node::{
        GraphNode, GraphNodes, GraphValueKind, NodeBase, NodeIndex, NodePtr, PoseNode,
        PoseNodeHandle, PoseResult,
    },
    sync_track::{PlaybackTime, SyncTrack},
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StateNodeSettings {
    pub node_index: NodeIndex,
    pub child: PoseNodeHandle,
}

impl NodeSettings for StateNodeSettings {
    fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Pose
    }

    fn instance_layout(&self) -> Layout {
        Layout::new::<StateNode>()
    }

    fn dependencies(&self) -> Vec<NodeIndex> {
        vec![self.child.index()]
    }

    fn type_tag(&self) -> &'static str {
        "state"
    }

    unsafe fn instantiate(&self, at: NonNull<u8>, ctx: &InstantiationContext) -> NodePtr {
        if ctx.mode == InstantiationMode::NodeAlreadyCreated {
            return unsafe { relink::<StateNode>(at) };
        }
        unsafe {
            emplace(
                at,
                StateNode {
                    base: NodeBase::new(self.node_index),
                    child: self.child,
                    time: PlaybackTime::default(),
                    previous_time: PlaybackTime::default(),
                    duration: 0.0,
                    elapsed_time_in_state: 0.0,
                    sync_track: SyncTrack::default(),
                },
            )
        }
    }
}

pub struct StateNode {
    base: NodeBase,
    child: PoseNodeHandle,
    // Caches of the child's timing, refreshed on every update.
    time: PlaybackTime,
    previous_time: PlaybackTime,
    duration: f32,
    elapsed_time_in_state: f32,
    sync_track: SyncTrack,
}

impl StateNode {
    /// Seconds since this state was last initialized.
    pub fn elapsed_time_in_state(&self) -> f32 {
        self.elapsed_time_in_state
    }

    fn cache_child_timing(&mut self, nodes: &GraphNodes) {
        self.previous_time = self.child.previous_time(nodes);
        self.time = self.child.current_time(nodes);
        self.duration = self.child.duration(nodes);
        self.sync_track = self.child.sync_track(nodes).clone();
    }
}

impl GraphNode for StateNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Pose
    }

    fn initialize(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        self.base.mark_initialized();
        self.child.initialize(ctx, nodes);
        self.time = PlaybackTime::default();
        self.previous_time = PlaybackTime::default();
        self.duration = self.child.duration(nodes);
        self.elapsed_time_in_state = 0.0;
        self.sync_track = self.child.sync_track(nodes).clone();
    }

    fn shutdown(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        self.child.shutdown(ctx, nodes);
        self.base.mark_shutdown();
    }

    fn as_pose_node(&mut self) -> Option<&mut dyn PoseNode> {
        Some(self)
    }
}

impl PoseNode for StateNode {
    fn update(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) -> PoseResult {
        self.base.assert_initialized();
        ctx.track_active_node(self.base.index());

        self.elapsed_time_in_state += ctx.delta_time();
        let result = self.child.update(ctx, nodes);
        self.cache_child_timing(nodes);

        self.base.mark_updated(ctx.update_id());
        result
    }

    fn update_with_time(
        &mut self,
        ctx: &mut GraphContext,
        nodes: &GraphNodes,
        time: PlaybackTime,
    ) -> PoseResult {
        self.base.assert_initialized();
        ctx.track_active_node(self.base.index());

        self.elapsed_time_in_state += ctx.delta_time();
        let result = self.child.update_with_time(ctx, nodes, time);
        self.cache_child_timing(nodes);

        self.base.mark_updated(ctx.update_id());
        result
    }

    fn current_time(&self) -> PlaybackTime {
        self.time
    }

    fn previous_time(&self) -> PlaybackTime {
        self.previous_time
    }

    fn duration(&self) -> f32 {
        self.duration
    }

    fn sync_track(&self) -> &SyncTrack {
        &self.sync_track
    }
}

/// Typed handle to a [`StateNode`], resolved at call time.
///
/// Condition nodes hold one of these to query the state they observe without
/// owning its lifecycle.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateNodeHandle(pub NodeIndex);

impl StateNodeHandle {
    pub fn index(&self) -> NodeIndex {
        self.0
    }

    fn resolve<'a>(&self, nodes: &GraphNodes<'a>) -> &'a mut StateNode {
        let index = self.0;
        match nodes.node_mut(index).as_any_mut().downcast_mut::<StateNode>() {
            Some(state) => state,
            None => panic!("node {index} is not a state node"),
        }
    }

    pub fn is_initialized(&self, nodes: &GraphNodes) -> bool {
        self.resolve(nodes).base.is_initialized()
    }

    pub fn current_time(&self, nodes: &GraphNodes) -> PlaybackTime {
        self.resolve(nodes).time
    }

    pub fn duration(&self, nodes: &GraphNodes) -> f32 {
        self.resolve(nodes).duration
    }

    pub fn elapsed_time_in_state(&self, nodes: &GraphNodes) -> f32 {
        self.resolve(nodes).elapsed_time_in_state
    }

    pub fn percentage_through_event(&self, nodes: &GraphNodes, id: &str) -> Option<f32> {
        let state = self.resolve(nodes);
        state.sync_track.percentage_through_event(id, state.time.position)
    }

    pub fn pose_handle(&self) -> PoseNodeHandle {
        PoseNodeHandle(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        animation_clip::AnimationClip,
        data_set::{ClipId, GraphDataSet},
        graph_definition::GraphDefinitionBuilder,
        graph_instance::GraphInstance,
        skeleton::Skeleton,
        sync_track::SyncEvent,
    };
    use crate::nodes::clip_node::ClipNodeSettings;
    use bevy::transform::prelude::Transform;
    use std::sync::Arc;

    fn state_instance() -> GraphInstance {
        let skeleton = Arc::new(Skeleton {
            bone_names: vec!["root".into()],
            parent_indices: vec![None],
            reference_pose: vec![Transform::IDENTITY],
        });
        let mut sync_track = SyncTrack::default();
        sync_track.add_event(SyncEvent {
            id: "plant".into(),
            start: 0.25,
            duration: 0.5,
        });
        let clip = Arc::new(AnimationClip {
            name: "idle".into(),
            duration: 2.0,
            curves: Vec::new(),
            root_motion: None,
            sync_track,
        });
        let data_set = Arc::new(GraphDataSet {
            skeleton,
            clips: vec![clip],
        });

        let mut builder = GraphDefinitionBuilder::new();
        builder
            .push_node(Box::new(ClipNodeSettings {
                node_index: NodeIndex(0),
                clip: ClipId(0),
                looping: true,
                speed_scale: None,
            }))
            .push_node(Box::new(StateNodeSettings {
                node_index: NodeIndex(1),
                child: PoseNodeHandle(NodeIndex(0)),
            }))
            .set_root(NodeIndex(1));
        GraphInstance::new(Arc::new(builder.build().unwrap()), data_set)
    }

    #[test]
    fn state_accumulates_elapsed_time_and_mirrors_child_timing() {
        let mut instance = state_instance();
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);

        ctx.begin_update(0.5);
        instance.update_graph(&mut ctx);
        ctx.begin_update(0.5);
        instance.update_graph(&mut ctx);

        let nodes = instance.nodes_for_tests();
        let handle = StateNodeHandle(NodeIndex(1));
        assert!((handle.elapsed_time_in_state(&nodes) - 1.0).abs() < 1e-5);
        assert!((handle.current_time(&nodes).position.0 - 0.5).abs() < 1e-5);
        assert_eq!(handle.duration(&nodes), 2.0);
        // Position 0.5 is halfway through the "plant" event (0.25..0.75).
        let through = handle.percentage_through_event(&nodes, "plant").unwrap();
        assert!((through - 0.5).abs() < 1e-5);
        assert_eq!(handle.percentage_through_event(&nodes, "absent"), None);

        instance.shutdown(&mut ctx);
    }

    #[test]
    #[should_panic(expected = "is not a state node")]
    fn resolving_a_non_state_node_is_fatal() {
        let mut instance = state_instance();
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);

        let nodes = instance.nodes_for_tests();
        StateNodeHandle(NodeIndex(0)).duration(&nodes);
    }
}
