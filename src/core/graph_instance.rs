use std::sync::Arc;

use bevy::log::warn;
#[cfg(debug_assertions)]
use bevy::transform::prelude::Transform;

use super::{
    arena::NodeArena,
    context::GraphContext,
    data_set::GraphDataSet,
    graph_definition::{GraphDefinition, InstantiationContext, InstantiationMode},
    graph_node::{NodeIndex, NodePtr, PoseResult},
    root_motion::RootMotionData,
};
#[cfg(test)]
use super::graph_node::GraphNodes;
use crate::nodes::parameter_nodes::{ControlParameterBoolNode, ControlParameterFloatNode};

/// A live, updatable copy of a graph definition.
///
/// All node state lives in one contiguous memory block sized by the
/// definition; nodes are constructed in place at their precomputed offsets
/// when the instance is created. The lifecycle is create, initialize, any
/// number of updates, shutdown, drop. Dropping an initialized instance is a
/// fatal contract violation.
pub struct GraphInstance {
    definition: Arc<GraphDefinition>,
    data_set: Arc<GraphDataSet>,
    arena: NodeArena,
    root_node: Option<NodeIndex>,
    root_motion: RootMotionData,
    #[cfg(debug_assertions)]
    active_nodes: Vec<NodeIndex>,
    #[cfg(debug_assertions)]
    debug_filter: Option<Vec<NodeIndex>>,
}

impl GraphInstance {
    /// Allocates the instance memory block and constructs every node at its
    /// offset, in table order.
    pub fn new(definition: Arc<GraphDefinition>, data_set: Arc<GraphDataSet>) -> Self {
        let offsets = definition.instance_node_start_offsets();
        assert_eq!(
            definition.num_nodes(),
            offsets.len(),
            "definition node table and offset table sizes disagree"
        );

        let mut arena = NodeArena::allocate(
            definition.instance_required_memory(),
            definition.instance_required_alignment(),
        );

        let mut constructed: Vec<NodePtr> = Vec::with_capacity(definition.num_nodes());
        for (position, settings) in definition.node_settings().iter().enumerate() {
            let at = arena.address_of(offsets[position]);
            let ctx = InstantiationContext {
                data_set: &data_set,
                constructed: &constructed,
                mode: InstantiationMode::CreateNode,
            };
            let node = unsafe { settings.instantiate(at, &ctx) };
            constructed.push(node);
        }
        for node in constructed {
            arena.push_node(node);
        }

        {
            let nodes = arena.nodes_view();
            for position in 0..definition.num_nodes() {
                let index = NodeIndex(position as u32);
                assert_eq!(
                    nodes.node_mut(index).base().index(),
                    index,
                    "constructed node reports the wrong index"
                );
            }
            for &index in definition.persistent_node_indices() {
                nodes.node_mut(index).base_mut().set_persistent(true);
            }
        }

        Self {
            definition,
            data_set,
            arena,
            root_node: None,
            root_motion: RootMotionData::default(),
            #[cfg(debug_assertions)]
            active_nodes: Vec::new(),
            #[cfg(debug_assertions)]
            debug_filter: None,
        }
    }

    pub fn definition(&self) -> &Arc<GraphDefinition> {
        &self.definition
    }

    pub fn data_set(&self) -> &Arc<GraphDataSet> {
        &self.data_set
    }

    pub fn is_initialized(&self) -> bool {
        self.root_node.is_some()
    }

    /// Initializes the persistent nodes in list order and sets the root.
    pub fn initialize(&mut self, ctx: &mut GraphContext) {
        assert!(ctx.is_valid(), "graph instance initialized with an invalid context");
        assert!(
            self.root_node.is_none(),
            "graph instance initialized twice without an intervening shutdown"
        );

        let nodes = self.arena.nodes_view();
        for &index in self.definition.persistent_node_indices() {
            let node = nodes.node_mut(index);
            if !node.base().is_initialized() {
                node.initialize(ctx, &nodes);
            }
        }

        let root = self.definition.root_node_index();
        assert!(
            nodes.node_mut(root).base().is_initialized(),
            "root node {root} not initialized after instance initialization"
        );
        self.root_node = Some(root);
        self.root_motion.clear();
    }

    /// Shuts down the persistent nodes in reverse initialization order and
    /// clears the root.
    pub fn shutdown(&mut self, ctx: &mut GraphContext) {
        assert!(ctx.is_valid(), "graph instance shut down with an invalid context");
        assert!(
            self.root_node.is_some(),
            "graph instance shut down while not initialized"
        );

        let nodes = self.arena.nodes_view();
        for &index in self.definition.persistent_node_indices().iter().rev() {
            let node = nodes.node_mut(index);
            if node.base().is_initialized() {
                node.shutdown(ctx, &nodes);
            }
        }
        self.root_node = None;
    }

    /// Restarts the root hierarchy from time zero. Persistent nodes other
    /// than the root keep their state.
    pub fn reset(&mut self, ctx: &mut GraphContext) {
        assert!(
            self.root_node.is_some(),
            "graph instance reset while not initialized"
        );
        let root = self.definition.root_node_index();
        let nodes = self.arena.nodes_view();
        let node = nodes.node_mut(root);
        node.shutdown(ctx, &nodes);
        node.initialize(ctx, &nodes);
        self.root_motion.clear();
    }

    /// Evaluates one tick from the root and records the produced root-motion
    /// delta. The caller must have called [`GraphContext::begin_update`] for
    /// this tick.
    pub fn update_graph(&mut self, ctx: &mut GraphContext) -> PoseResult {
        assert!(ctx.is_valid(), "graph instance updated with an invalid context");
        let root = match self.root_node {
            Some(root) => root,
            None => panic!("graph instance updated before initialization"),
        };

        let nodes = self.arena.nodes_view();
        let result = nodes.pose_node_mut(root).update(ctx, &nodes);
        self.root_motion
            .record_delta(result.root_motion_delta, ctx.delta_time());

        #[cfg(debug_assertions)]
        {
            self.active_nodes.clear();
            self.active_nodes.extend_from_slice(ctx.active_nodes());
        }

        result
    }

    /// Stages a value onto a named bool control parameter. Returns false and
    /// logs if the definition exposes no such parameter.
    pub fn set_bool_parameter(&mut self, name: &str, value: bool) -> bool {
        let Some(index) = self.definition.parameter_node(name) else {
            warn!("graph has no parameter named '{name}'");
            return false;
        };
        let nodes = self.arena.nodes_view();
        match nodes
            .node_mut(index)
            .as_any_mut()
            .downcast_mut::<ControlParameterBoolNode>()
        {
            Some(node) => {
                node.set_value(value);
                true
            }
            None => panic!("parameter '{name}' does not target a bool control parameter"),
        }
    }

    /// Stages a value onto a named float control parameter. Returns false
    /// and logs if the definition exposes no such parameter.
    pub fn set_float_parameter(&mut self, name: &str, value: f32) -> bool {
        let Some(index) = self.definition.parameter_node(name) else {
            warn!("graph has no parameter named '{name}'");
            return false;
        };
        let nodes = self.arena.nodes_view();
        match nodes
            .node_mut(index)
            .as_any_mut()
            .downcast_mut::<ControlParameterFloatNode>()
        {
            Some(node) => {
                node.set_value(value);
                true
            }
            None => panic!("parameter '{name}' does not target a float control parameter"),
        }
    }

    pub fn root_motion(&self) -> &RootMotionData {
        &self.root_motion
    }

    #[cfg(test)]
    pub(crate) fn nodes_for_tests(&self) -> GraphNodes<'_> {
        self.arena.nodes_view()
    }

    /// Limits [`Self::draw_debug`] to the listed nodes. `None` draws every
    /// active node.
    #[cfg(debug_assertions)]
    pub fn set_debug_filter(&mut self, filter: Option<Vec<NodeIndex>>) {
        self.debug_filter = filter;
    }

    /// Nodes that participated in the most recent update.
    #[cfg(debug_assertions)]
    pub fn active_nodes(&self) -> &[NodeIndex] {
        &self.active_nodes
    }

    /// Queues debug geometry for the active pose nodes and the recorded
    /// root-motion path.
    #[cfg(debug_assertions)]
    pub fn draw_debug(
        &self,
        character_transform: Transform,
        gizmos: &mut super::debug_draw::DeferredGizmos,
    ) {
        let nodes = self.arena.nodes_view();
        for &index in &self.active_nodes {
            if let Some(filter) = &self.debug_filter {
                if !filter.contains(&index) {
                    continue;
                }
            }
            if let Some(pose_node) = nodes.node_mut(index).as_pose_node() {
                pose_node.debug_draw(character_transform, gizmos);
            }
        }
        self.root_motion.debug_draw(character_transform, gizmos);
    }
}

impl Drop for GraphInstance {
    fn drop(&mut self) {
        // Skipped during unwinding so the original panic stays reportable.
        if !std::thread::panicking() {
            assert!(
                self.root_node.is_none(),
                "graph instance dropped while initialized; call shutdown first"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        animation_clip::AnimationClip,
        data_set::ClipId,
        graph_definition::GraphDefinitionBuilder,
        graph_node::{FloatValueNodeHandle, NodeIndex},
        skeleton::Skeleton,
        sync_track::SyncTrack,
    };
    use crate::nodes::{
        clip_node::ClipNodeSettings,
        parameter_nodes::{ControlParameterBoolNodeSettings, ControlParameterFloatNodeSettings},
    };
    use bevy::transform::prelude::Transform;

    fn test_data_set() -> Arc<GraphDataSet> {
        let skeleton = Arc::new(Skeleton {
            bone_names: vec!["root".into()],
            parent_indices: vec![None],
            reference_pose: vec![Transform::IDENTITY],
        });
        let clip = Arc::new(AnimationClip {
            name: "walk".into(),
            duration: 1.0,
            curves: Vec::new(),
            root_motion: None,
            sync_track: SyncTrack::default(),
        });
        Arc::new(GraphDataSet {
            skeleton,
            clips: vec![clip],
        })
    }

    fn test_definition() -> Arc<GraphDefinition> {
        let mut builder = GraphDefinitionBuilder::new();
        builder
            .push_node(Box::new(ControlParameterBoolNodeSettings {
                node_index: NodeIndex(0),
                initial_value: false,
            }))
            .push_node(Box::new(ControlParameterFloatNodeSettings {
                node_index: NodeIndex(1),
                initial_value: 1.0,
            }))
            .push_node(Box::new(ClipNodeSettings {
                node_index: NodeIndex(2),
                clip: ClipId(0),
                looping: true,
                speed_scale: Some(FloatValueNodeHandle(NodeIndex(1))),
            }))
            .set_root(NodeIndex(2))
            .mark_persistent(NodeIndex(0))
            .mark_persistent(NodeIndex(1))
            .expose_parameter("jump", NodeIndex(0))
            .expose_parameter("speed", NodeIndex(1));
        Arc::new(builder.build().unwrap())
    }

    fn initialized_instance() -> (GraphInstance, GraphContext) {
        let mut instance = GraphInstance::new(test_definition(), test_data_set());
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);
        (instance, ctx)
    }

    #[test]
    fn lifecycle_brackets_cleanly() {
        let (mut instance, mut ctx) = initialized_instance();
        assert!(instance.is_initialized());

        ctx.begin_update(0.016);
        let result = instance.update_graph(&mut ctx);
        assert_eq!(result.pose.bone_count(), 1);

        instance.shutdown(&mut ctx);
        assert!(!instance.is_initialized());
    }

    #[test]
    #[should_panic(expected = "dropped while initialized")]
    fn dropping_initialized_instance_is_fatal() {
        let (instance, _ctx) = initialized_instance();
        drop(instance);
    }

    #[test]
    #[should_panic(expected = "initialized twice")]
    fn double_initialize_is_fatal() {
        let (mut instance, mut ctx) = initialized_instance();
        instance.initialize(&mut ctx);
    }

    #[test]
    #[should_panic(expected = "updated before initialization")]
    fn update_before_initialize_is_fatal() {
        let mut instance = GraphInstance::new(test_definition(), test_data_set());
        let mut ctx = GraphContext::new();
        ctx.begin_update(0.016);
        instance.update_graph(&mut ctx);
    }

    #[test]
    fn parameters_survive_reset() {
        let (mut instance, mut ctx) = initialized_instance();
        assert!(instance.set_bool_parameter("jump", true));
        assert!(instance.set_float_parameter("speed", 2.0));
        assert!(!instance.set_float_parameter("missing", 1.0));

        instance.reset(&mut ctx);

        // Control parameters are persistent; reset only restarts the root.
        let nodes = instance.arena.nodes_view();
        let param = nodes
            .node_mut(NodeIndex(0))
            .as_any_mut()
            .downcast_mut::<ControlParameterBoolNode>()
            .unwrap();
        assert!(param.staged_value());

        instance.shutdown(&mut ctx);
    }

    #[test]
    fn reset_restarts_playback_from_zero() {
        let (mut instance, mut ctx) = initialized_instance();

        ctx.begin_update(0.5);
        instance.update_graph(&mut ctx);
        instance.reset(&mut ctx);
        ctx.begin_update(0.25);
        instance.update_graph(&mut ctx);

        let nodes = instance.arena.nodes_view();
        let time = nodes.pose_node_mut(NodeIndex(2)).current_time();
        assert!((time.position.0 - 0.25).abs() < 1e-5);

        instance.shutdown(&mut ctx);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn active_nodes_recorded_per_update() {
        let (mut instance, mut ctx) = initialized_instance();

        ctx.begin_update(0.016);
        instance.update_graph(&mut ctx);
        assert!(instance.active_nodes().contains(&NodeIndex(2)));

        instance.shutdown(&mut ctx);
    }
}
