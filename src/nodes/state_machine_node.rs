//! State machine pose node: one active state at a time, condition-driven
//! transitions, optional crossfade between source and target.

use std::{alloc::Layout, ptr::NonNull};

use serde::{Deserialize, Serialize};

use crate::core::{
    arena::{emplace, relink},
    context::GraphContext,
    graph_definition::{InstantiationContext, InstantiationMode, NodeSettings},
    graph_node::{
        BoolValueNodeHandle, GraphNode, GraphNodes, GraphValueKind, NodeBase, NodeIndex, NodePtr,
        PoseNode, PoseResult,
    },
    sync_track::{PlaybackTime, SyncTrack},
};

use super::state_node::StateNodeHandle;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransitionSettings {
    /// Index into the state machine's `states` list.
    pub target_state: usize,
    pub condition: BoolValueNodeHandle,
    /// Crossfade length in seconds. Zero or negative switches instantly.
    pub duration: f32,
    /// Drive the target with the source's normalized time while blending.
    #[serde(default)]
    pub synchronize: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StateSettings {
    pub state_node: StateNodeHandle,
    #[serde(default)]
    pub transitions: Vec<TransitionSettings>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StateMachineNodeSettings {
    pub node_index: NodeIndex,
    pub states: Vec<StateSettings>,
    #[serde(default)]
    pub default_state: usize,
}

impl NodeSettings for StateMachineNodeSettings {
    fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Pose
    }

    fn instance_layout(&self) -> Layout {
        Layout::new::<StateMachineNode>()
    }

    fn dependencies(&self) -> Vec<NodeIndex> {
        let mut deps = Vec::new();
        for state in &self.states {
            deps.push(state.state_node.index());
            for transition in &state.transitions {
                deps.push(transition.condition.index());
            }
        }
        deps
    }

    fn type_tag(&self) -> &'static str {
        "state_machine"
    }

    unsafe fn instantiate(&self, at: NonNull<u8>, ctx: &InstantiationContext) -> NodePtr {
        if ctx.mode == InstantiationMode::NodeAlreadyCreated {
            return unsafe { relink::<StateMachineNode>(at) };
        }
        assert!(
            self.default_state < self.states.len(),
            "state machine {} default state {} out of range ({} states)",
            self.node_index,
            self.default_state,
            self.states.len()
        );
        unsafe {
            emplace(
                at,
                StateMachineNode {
                    base: NodeBase::new(self.node_index),
                    states: self.states.clone(),
                    default_state: self.default_state,
                    active_state: self.default_state,
                    active_transition: None,
                    time: PlaybackTime::default(),
                    previous_time: PlaybackTime::default(),
                    duration: 0.0,
                    sync_track: SyncTrack::default(),
                },
            )
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveTransition {
    source_state: usize,
    target_state: usize,
    duration: f32,
    elapsed: f32,
    synchronize: bool,
}

pub struct StateMachineNode {
    base: NodeBase,
    states: Vec<StateSettings>,
    default_state: usize,
    active_state: usize,
    active_transition: Option<ActiveTransition>,
    // Timing caches mirror the state currently driving the output; during a
    // transition that is the target state.
    time: PlaybackTime,
    previous_time: PlaybackTime,
    duration: f32,
    sync_track: SyncTrack,
}

impl StateMachineNode {
    pub fn active_state(&self) -> usize {
        self.active_state
    }

    pub fn is_transitioning(&self) -> bool {
        self.active_transition.is_some()
    }

    fn enter_state(&mut self, index: usize, ctx: &mut GraphContext, nodes: &GraphNodes) {
        let state = self.states[index].clone();
        state.state_node.pose_handle().initialize(ctx, nodes);
        for transition in &state.transitions {
            transition.condition.initialize(ctx, nodes);
        }
    }

    fn exit_state(&mut self, index: usize, ctx: &mut GraphContext, nodes: &GraphNodes) {
        let state = self.states[index].clone();
        for transition in &state.transitions {
            transition.condition.shutdown(ctx, nodes);
        }
        state.state_node.pose_handle().shutdown(ctx, nodes);
    }

    /// Finds the first transition out of the active state whose condition
    /// holds this tick.
    fn pick_transition(
        &mut self,
        ctx: &mut GraphContext,
        nodes: &GraphNodes,
    ) -> Option<TransitionSettings> {
        let transitions = self.states[self.active_state].transitions.clone();
        transitions
            .into_iter()
            .find(|transition| transition.condition.value(ctx, nodes))
    }

    fn cache_state_timing(&mut self, index: usize, nodes: &GraphNodes) {
        let handle = self.states[index].state_node;
        self.previous_time = self.time;
        self.time = handle.current_time(nodes);
        self.duration = handle.duration(nodes);
        self.sync_track = self
            .states[index]
            .state_node
            .pose_handle()
            .sync_track(nodes)
            .clone();
    }

    fn update_transition(
        &mut self,
        mut transition: ActiveTransition,
        ctx: &mut GraphContext,
        nodes: &GraphNodes,
    ) -> PoseResult {
        transition.elapsed += ctx.delta_time();
        let weight = (transition.elapsed / transition.duration).clamp(0.0, 1.0);

        let source = self.states[transition.source_state].state_node.pose_handle();
        let target = self.states[transition.target_state].state_node.pose_handle();

        let result_source = source.update(ctx, nodes);
        let result_target = if transition.synchronize {
            let source_time = source.current_time(nodes);
            target.update_with_time(ctx, nodes, source_time)
        } else {
            target.update(ctx, nodes)
        };

        let result = PoseResult::blend_linear(&result_source, &result_target, weight);
        self.cache_state_timing(transition.target_state, nodes);

        if weight >= 1.0 {
            self.exit_state(transition.source_state, ctx, nodes);
            self.active_state = transition.target_state;
            self.active_transition = None;
        } else {
            self.active_transition = Some(transition);
        }

        result
    }
}

impl GraphNode for StateMachineNode {
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
        self.active_state = self.default_state;
        self.active_transition = None;
        self.enter_state(self.default_state, ctx, nodes);
        self.time = PlaybackTime::default();
        self.previous_time = PlaybackTime::default();
        self.duration = self.states[self.default_state].state_node.duration(nodes);
        self.sync_track = SyncTrack::default();
    }

    fn shutdown(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        if let Some(transition) = self.active_transition.take() {
            self.exit_state(transition.target_state, ctx, nodes);
        }
        self.exit_state(self.active_state, ctx, nodes);
        self.base.mark_shutdown();
    }

    fn as_pose_node(&mut self) -> Option<&mut dyn PoseNode> {
        Some(self)
    }
}

impl PoseNode for StateMachineNode {
    fn update(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) -> PoseResult {
        self.base.assert_initialized();
        ctx.track_active_node(self.base.index());

        let result = if let Some(transition) = self.active_transition {
            self.update_transition(transition, ctx, nodes)
        } else if let Some(picked) = self.pick_transition(ctx, nodes) {
            if picked.duration <= 0.0 {
                // Instant switch: the old state never contributes this tick.
                let source = self.active_state;
                self.enter_state(picked.target_state, ctx, nodes);
                self.exit_state(source, ctx, nodes);
                self.active_state = picked.target_state;
                let handle = self.states[self.active_state].state_node.pose_handle();
                let result = handle.update(ctx, nodes);
                self.cache_state_timing(self.active_state, nodes);
                result
            } else {
                self.enter_state(picked.target_state, ctx, nodes);
                let transition = ActiveTransition {
                    source_state: self.active_state,
                    target_state: picked.target_state,
                    duration: picked.duration,
                    elapsed: 0.0,
                    synchronize: picked.synchronize,
                };
                self.update_transition(transition, ctx, nodes)
            }
        } else {
            let handle = self.states[self.active_state].state_node.pose_handle();
            let result = handle.update(ctx, nodes);
            self.cache_state_timing(self.active_state, nodes);
            result
        };

        self.base.mark_updated(ctx.update_id());
        result
    }

    /// Externally synchronized updates drive the active state directly and
    /// do not start new transitions.
    fn update_with_time(
        &mut self,
        ctx: &mut GraphContext,
        nodes: &GraphNodes,
        time: PlaybackTime,
    ) -> PoseResult {
        self.base.assert_initialized();
        ctx.track_active_node(self.base.index());

        let result = if let Some(transition) = self.active_transition {
            self.update_transition(transition, ctx, nodes)
        } else {
            let handle = self.states[self.active_state].state_node.pose_handle();
            let result = handle.update_with_time(ctx, nodes, time);
            self.cache_state_timing(self.active_state, nodes);
            result
        };

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        animation_clip::{AnimationClip, TransformCurve},
        data_set::{ClipId, GraphDataSet},
        graph_definition::GraphDefinitionBuilder,
        graph_instance::GraphInstance,
        graph_node::PoseNodeHandle,
        skeleton::Skeleton,
        sync_track::SyncTrack,
    };
    use crate::nodes::{
        clip_node::ClipNodeSettings,
        parameter_nodes::ControlParameterBoolNodeSettings,
        state_node::StateNodeSettings,
    };
    use bevy::{math::Vec3, transform::prelude::Transform};
    use std::sync::Arc;

    fn two_state_data_set() -> Arc<GraphDataSet> {
        let skeleton = Arc::new(Skeleton {
            bone_names: vec!["root".into()],
            parent_indices: vec![None],
            reference_pose: vec![Transform::IDENTITY],
        });
        let make_clip = |name: &str, reach: f32| {
            Arc::new(AnimationClip {
                name: name.into(),
                duration: 1.0,
                curves: vec![TransformCurve {
                    bone: 0,
                    timestamps: vec![0.0, 1.0],
                    transforms: vec![
                        Transform::from_translation(Vec3::X * reach),
                        Transform::from_translation(Vec3::X * reach),
                    ],
                }],
                root_motion: None,
                sync_track: SyncTrack::default(),
            })
        };
        Arc::new(GraphDataSet {
            skeleton,
            clips: vec![make_clip("idle", 0.0), make_clip("walk", 1.0)],
        })
    }

    /// idle/walk machine switched by a "walk" control parameter.
    fn machine_instance(transition_duration: f32) -> GraphInstance {
        let mut builder = GraphDefinitionBuilder::new();
        builder
            .push_node(Box::new(ControlParameterBoolNodeSettings {
                node_index: NodeIndex(0),
                initial_value: false,
            }))
            .push_node(Box::new(ClipNodeSettings {
                node_index: NodeIndex(1),
                clip: ClipId(0),
                looping: true,
                speed_scale: None,
            }))
            .push_node(Box::new(StateNodeSettings {
                node_index: NodeIndex(2),
                child: PoseNodeHandle(NodeIndex(1)),
            }))
            .push_node(Box::new(ClipNodeSettings {
                node_index: NodeIndex(3),
                clip: ClipId(1),
                looping: true,
                speed_scale: None,
            }))
            .push_node(Box::new(StateNodeSettings {
                node_index: NodeIndex(4),
                child: PoseNodeHandle(NodeIndex(3)),
            }))
            .push_node(Box::new(StateMachineNodeSettings {
                node_index: NodeIndex(5),
                states: vec![
                    StateSettings {
                        state_node: StateNodeHandle(NodeIndex(2)),
                        transitions: vec![TransitionSettings {
                            target_state: 1,
                            condition: BoolValueNodeHandle(NodeIndex(0)),
                            duration: transition_duration,
                            synchronize: false,
                        }],
                    },
                    StateSettings {
                        state_node: StateNodeHandle(NodeIndex(4)),
                        transitions: Vec::new(),
                    },
                ],
                default_state: 0,
            }))
            .set_root(NodeIndex(5))
            .mark_persistent(NodeIndex(0))
            .expose_parameter("walk", NodeIndex(0));
        GraphInstance::new(Arc::new(builder.build().unwrap()), two_state_data_set())
    }

    fn machine<'a>(instance: &'a GraphInstance) -> &'a mut StateMachineNode {
        let nodes = instance.nodes_for_tests();
        nodes
            .node_mut(NodeIndex(5))
            .as_any_mut()
            .downcast_mut::<StateMachineNode>()
            .unwrap()
    }

    #[test]
    fn stays_in_default_state_until_condition_fires() {
        let mut instance = machine_instance(0.2);
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);

        ctx.begin_update(0.1);
        let result = instance.update_graph(&mut ctx);
        assert_eq!(machine(&instance).active_state(), 0);
        assert!(!machine(&instance).is_transitioning());
        assert_eq!(result.pose.bones[0].translation.x, 0.0);

        instance.shutdown(&mut ctx);
    }

    #[test]
    fn crossfade_blends_and_completes() {
        let mut instance = machine_instance(0.2);
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);

        instance.set_bool_parameter("walk", true);

        // Halfway through the 0.2s crossfade after the first 0.1s tick.
        ctx.begin_update(0.1);
        let result = instance.update_graph(&mut ctx);
        assert!(machine(&instance).is_transitioning());
        assert!((result.pose.bones[0].translation.x - 0.5).abs() < 1e-4);

        // 0.2s later the 0.2s crossfade has finished.
        ctx.begin_update(0.2);
        let result = instance.update_graph(&mut ctx);
        assert!(!machine(&instance).is_transitioning());
        assert_eq!(machine(&instance).active_state(), 1);
        assert!((result.pose.bones[0].translation.x - 1.0).abs() < 1e-4);

        instance.shutdown(&mut ctx);
    }

    #[test]
    fn zero_duration_transition_switches_instantly() {
        let mut instance = machine_instance(0.0);
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);

        instance.set_bool_parameter("walk", true);
        ctx.begin_update(0.1);
        let result = instance.update_graph(&mut ctx);

        assert_eq!(machine(&instance).active_state(), 1);
        assert!(!machine(&instance).is_transitioning());
        assert!((result.pose.bones[0].translation.x - 1.0).abs() < 1e-4);

        instance.shutdown(&mut ctx);
    }

    #[test]
    fn source_state_is_shut_down_after_the_transition() {
        let mut instance = machine_instance(0.2);
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);

        instance.set_bool_parameter("walk", true);
        ctx.begin_update(0.1);
        instance.update_graph(&mut ctx);
        ctx.begin_update(0.2);
        instance.update_graph(&mut ctx);

        let nodes = instance.nodes_for_tests();
        assert!(!StateNodeHandle(NodeIndex(2)).is_initialized(&nodes));
        assert!(StateNodeHandle(NodeIndex(4)).is_initialized(&nodes));

        instance.shutdown(&mut ctx);
    }
}
