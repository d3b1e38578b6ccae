//! Bool conditions that drive state machine transitions by observing a
//! state's playback.

use std::{alloc::Layout, ptr::NonNull};

use bevy::{log::warn, reflect::Reflect};
use serde::{Deserialize, Serialize};

use crate::core::{
    arena::{emplace, relink},
    context::GraphContext,
    graph_definition::{InstantiationContext, InstantiationMode, NodeSettings},
    graph_node::{
        BoolValueNode, FloatValueNodeHandle, GraphNode, GraphNodes, GraphValueKind, NodeBase,
        NodeIndex, NodePtr,
    },
};

use super::state_node::StateNodeHandle;

/// Fires once the observed state is close enough to its end that a
/// transition of the configured duration would finish exactly at it.
///
/// The trigger point is `1 - transition_duration / state_duration`, clamped
/// to `[0, 1]`; the condition is true once the state's normalized position
/// reaches it. States with no duration complete immediately.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StateCompletedConditionNodeSettings {
    pub node_index: NodeIndex,
    pub source_state: StateNodeHandle,
    pub transition_duration: f32,
    /// Optional float child overriding `transition_duration` at runtime.
    #[serde(default)]
    pub duration_override: Option<FloatValueNodeHandle>,
}

impl NodeSettings for StateCompletedConditionNodeSettings {
    fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Bool
    }

    fn instance_layout(&self) -> Layout {
        Layout::new::<StateCompletedConditionNode>()
    }

    fn dependencies(&self) -> Vec<NodeIndex> {
        let mut deps = vec![self.source_state.index()];
        deps.extend(self.duration_override.iter().map(|handle| handle.index()));
        deps
    }

    fn type_tag(&self) -> &'static str {
        "state_completed_condition"
    }

    unsafe fn instantiate(&self, at: NonNull<u8>, ctx: &InstantiationContext) -> NodePtr {
        if ctx.mode == InstantiationMode::NodeAlreadyCreated {
            return unsafe { relink::<StateCompletedConditionNode>(at) };
        }
        unsafe {
            emplace(
                at,
                StateCompletedConditionNode {
                    base: NodeBase::new(self.node_index),
                    source_state: self.source_state,
                    transition_duration: self.transition_duration,
                    duration_override: self.duration_override,
                    result: false,
                },
            )
        }
    }
}

pub struct StateCompletedConditionNode {
    base: NodeBase,
    source_state: StateNodeHandle,
    transition_duration: f32,
    duration_override: Option<FloatValueNodeHandle>,
    result: bool,
}

impl GraphNode for StateCompletedConditionNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Bool
    }

    fn initialize(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        self.base.mark_initialized();
        if let Some(duration_override) = self.duration_override {
            duration_override.initialize(ctx, nodes);
        }
        self.result = false;
    }

    fn shutdown(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        if let Some(duration_override) = self.duration_override {
            duration_override.shutdown(ctx, nodes);
        }
        self.base.mark_shutdown();
    }

    fn as_bool_node(&mut self) -> Option<&mut dyn BoolValueNode> {
        Some(self)
    }
}

impl BoolValueNode for StateCompletedConditionNode {
    fn value(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) -> bool {
        self.base.assert_initialized();
        if self.base.was_updated_this_tick(ctx.update_id()) {
            return self.result;
        }

        let transition_duration = self
            .duration_override
            .map(|handle| handle.value(ctx, nodes))
            .unwrap_or(self.transition_duration);
        let state_duration = self.source_state.duration(nodes);

        self.result = if state_duration > 0.0 {
            let transition_point = (1.0 - transition_duration / state_duration).clamp(0.0, 1.0);
            self.source_state.current_time(nodes).position.0 >= transition_point
        } else {
            true
        };

        self.base.mark_updated(ctx.update_id());
        self.result
    }
}

/// What aspect of the observed state's time a [`TimeConditionNode`] compares.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeConditionType {
    /// Normalized position through the current loop, 0 to 1.
    PercentageThroughState,
    /// Normalized position through a named sync event. 0 when the event is
    /// missing from the state's track.
    PercentageThroughSyncEvent,
    /// Completed loop count.
    LoopCount,
    /// Seconds since the state became active.
    ElapsedTimeInState,
}

#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
}

impl ComparisonOperator {
    fn compare(self, lhs: f32, rhs: f32) -> bool {
        match self {
            ComparisonOperator::LessThan => lhs < rhs,
            ComparisonOperator::LessThanEqual => lhs <= rhs,
            ComparisonOperator::GreaterThan => lhs > rhs,
            ComparisonOperator::GreaterThanEqual => lhs >= rhs,
        }
    }
}

/// Compares a time measurement of the observed state against a comparand.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TimeConditionNodeSettings {
    pub node_index: NodeIndex,
    pub source_state: StateNodeHandle,
    pub condition_type: TimeConditionType,
    pub operator: ComparisonOperator,
    pub comparand: f32,
    /// Optional float child overriding `comparand` at runtime.
    #[serde(default)]
    pub comparand_source: Option<FloatValueNodeHandle>,
    /// Event id for [`TimeConditionType::PercentageThroughSyncEvent`].
    #[serde(default)]
    pub sync_event_id: Option<String>,
}

impl NodeSettings for TimeConditionNodeSettings {
    fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Bool
    }

    fn instance_layout(&self) -> Layout {
        Layout::new::<TimeConditionNode>()
    }

    fn dependencies(&self) -> Vec<NodeIndex> {
        let mut deps = vec![self.source_state.index()];
        deps.extend(self.comparand_source.iter().map(|handle| handle.index()));
        deps
    }

    fn type_tag(&self) -> &'static str {
        "time_condition"
    }

    unsafe fn instantiate(&self, at: NonNull<u8>, ctx: &InstantiationContext) -> NodePtr {
        if ctx.mode == InstantiationMode::NodeAlreadyCreated {
            return unsafe { relink::<TimeConditionNode>(at) };
        }
        unsafe {
            emplace(
                at,
                TimeConditionNode {
                    base: NodeBase::new(self.node_index),
                    source_state: self.source_state,
                    condition_type: self.condition_type,
                    operator: self.operator,
                    comparand: self.comparand,
                    comparand_source: self.comparand_source,
                    sync_event_id: self.sync_event_id.clone(),
                    result: false,
                },
            )
        }
    }
}

pub struct TimeConditionNode {
    base: NodeBase,
    source_state: StateNodeHandle,
    condition_type: TimeConditionType,
    operator: ComparisonOperator,
    comparand: f32,
    comparand_source: Option<FloatValueNodeHandle>,
    sync_event_id: Option<String>,
    result: bool,
}

impl TimeConditionNode {
    fn measure(&self, nodes: &GraphNodes) -> f32 {
        match self.condition_type {
            TimeConditionType::PercentageThroughState => {
                self.source_state.current_time(nodes).position.0
            }
            TimeConditionType::PercentageThroughSyncEvent => {
                let Some(id) = &self.sync_event_id else {
                    warn!(
                        "time condition {} has no sync event id configured",
                        self.base.index()
                    );
                    return 0.0;
                };
                match self.source_state.percentage_through_event(nodes, id) {
                    Some(percentage) => percentage,
                    None => {
                        warn!("sync event '{id}' not found in observed state's track");
                        0.0
                    }
                }
            }
            TimeConditionType::LoopCount => {
                self.source_state.current_time(nodes).loop_count as f32
            }
            TimeConditionType::ElapsedTimeInState => {
                self.source_state.elapsed_time_in_state(nodes)
            }
        }
    }
}

impl GraphNode for TimeConditionNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Bool
    }

    fn initialize(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        self.base.mark_initialized();
        if let Some(comparand_source) = self.comparand_source {
            comparand_source.initialize(ctx, nodes);
        }
        self.result = false;
    }

    fn shutdown(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        if let Some(comparand_source) = self.comparand_source {
            comparand_source.shutdown(ctx, nodes);
        }
        self.base.mark_shutdown();
    }

    fn as_bool_node(&mut self) -> Option<&mut dyn BoolValueNode> {
        Some(self)
    }
}

impl BoolValueNode for TimeConditionNode {
    fn value(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) -> bool {
        self.base.assert_initialized();
        if self.base.was_updated_this_tick(ctx.update_id()) {
            return self.result;
        }

        let comparand = self
            .comparand_source
            .map(|handle| handle.value(ctx, nodes))
            .unwrap_or(self.comparand);
        let measured = self.measure(nodes);
        self.result = self.operator.compare(measured, comparand);

        self.base.mark_updated(ctx.update_id());
        self.result
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
        graph_node::{BoolValueNodeHandle, PoseNodeHandle},
        skeleton::Skeleton,
        sync_track::SyncTrack,
    };
    use crate::core::graph_node::FloatValueNode;
    use crate::nodes::{clip_node::ClipNodeSettings, state_node::StateNodeSettings};
    use bevy::transform::prelude::Transform;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn data_set(clip_duration: f32) -> Arc<GraphDataSet> {
        let skeleton = Arc::new(Skeleton {
            bone_names: vec!["root".into()],
            parent_indices: vec![None],
            reference_pose: vec![Transform::IDENTITY],
        });
        let clip = Arc::new(AnimationClip {
            name: "cycle".into(),
            duration: clip_duration,
            curves: Vec::new(),
            root_motion: None,
            sync_track: SyncTrack::default(),
        });
        Arc::new(GraphDataSet {
            skeleton,
            clips: vec![clip],
        })
    }

    fn condition_instance(
        clip_duration: f32,
        condition: Box<dyn NodeSettings>,
    ) -> GraphInstance {
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
            .push_node(condition)
            .set_root(NodeIndex(1))
            .mark_persistent(NodeIndex(2));
        GraphInstance::new(Arc::new(builder.build().unwrap()), data_set(clip_duration))
    }

    fn query_condition(instance: &GraphInstance, ctx: &mut GraphContext) -> bool {
        let nodes = instance.nodes_for_tests();
        BoolValueNodeHandle(NodeIndex(2)).value(ctx, &nodes)
    }

    #[test]
    fn state_completed_fires_at_the_transition_point() {
        // 2.0s state with a 0.5s transition: trigger point is 0.75.
        let mut instance = condition_instance(
            2.0,
            Box::new(StateCompletedConditionNodeSettings {
                node_index: NodeIndex(2),
                source_state: StateNodeHandle(NodeIndex(1)),
                transition_duration: 0.5,
                duration_override: None,
            }),
        );
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);

        // Position 0.7: not yet.
        ctx.begin_update(1.4);
        instance.update_graph(&mut ctx);
        assert!(!query_condition(&instance, &mut ctx));

        // Position 0.8: fired.
        ctx.begin_update(0.2);
        instance.update_graph(&mut ctx);
        assert!(query_condition(&instance, &mut ctx));

        instance.shutdown(&mut ctx);
    }

    #[test]
    fn zero_duration_state_completes_immediately() {
        let mut instance = condition_instance(
            0.0,
            Box::new(StateCompletedConditionNodeSettings {
                node_index: NodeIndex(2),
                source_state: StateNodeHandle(NodeIndex(1)),
                transition_duration: 0.5,
                duration_override: None,
            }),
        );
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);

        ctx.begin_update(0.016);
        instance.update_graph(&mut ctx);
        assert!(query_condition(&instance, &mut ctx));

        instance.shutdown(&mut ctx);
    }

    #[test]
    fn percentage_through_state_comparison() {
        let condition = |operator| {
            Box::new(TimeConditionNodeSettings {
                node_index: NodeIndex(2),
                source_state: StateNodeHandle(NodeIndex(1)),
                condition_type: TimeConditionType::PercentageThroughState,
                operator,
                comparand: 0.5,
                comparand_source: None,
                sync_event_id: None,
            })
        };

        // Position 0.6 >= 0.5 holds.
        let mut instance = condition_instance(1.0, condition(ComparisonOperator::GreaterThanEqual));
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);
        ctx.begin_update(0.6);
        instance.update_graph(&mut ctx);
        assert!(query_condition(&instance, &mut ctx));
        instance.shutdown(&mut ctx);

        // Position 0.4 >= 0.5 does not.
        let mut instance = condition_instance(1.0, condition(ComparisonOperator::GreaterThanEqual));
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);
        ctx.begin_update(0.4);
        instance.update_graph(&mut ctx);
        assert!(!query_condition(&instance, &mut ctx));
        instance.shutdown(&mut ctx);
    }

    #[test]
    fn loop_count_and_elapsed_time_measurements() {
        let mut instance = condition_instance(
            1.0,
            Box::new(TimeConditionNodeSettings {
                node_index: NodeIndex(2),
                source_state: StateNodeHandle(NodeIndex(1)),
                condition_type: TimeConditionType::LoopCount,
                operator: ComparisonOperator::GreaterThanEqual,
                comparand: 2.0,
                comparand_source: None,
                sync_event_id: None,
            }),
        );
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);

        ctx.begin_update(1.5);
        instance.update_graph(&mut ctx);
        assert!(!query_condition(&instance, &mut ctx));

        ctx.begin_update(1.0);
        instance.update_graph(&mut ctx);
        assert!(query_condition(&instance, &mut ctx));

        instance.shutdown(&mut ctx);
    }

    #[test]
    fn missing_sync_event_reads_as_zero() {
        let mut instance = condition_instance(
            1.0,
            Box::new(TimeConditionNodeSettings {
                node_index: NodeIndex(2),
                source_state: StateNodeHandle(NodeIndex(1)),
                condition_type: TimeConditionType::PercentageThroughSyncEvent,
                operator: ComparisonOperator::LessThanEqual,
                comparand: 0.0,
                comparand_source: None,
                sync_event_id: Some("nonexistent".into()),
            }),
        );
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);

        ctx.begin_update(0.5);
        instance.update_graph(&mut ctx);
        // Missing event measures 0.0, so 0.0 <= 0.0 holds.
        assert!(query_condition(&instance, &mut ctx));

        instance.shutdown(&mut ctx);
    }

    #[test]
    fn result_is_memoized_within_a_tick() {
        let mut instance = condition_instance(
            1.0,
            Box::new(TimeConditionNodeSettings {
                node_index: NodeIndex(2),
                source_state: StateNodeHandle(NodeIndex(1)),
                condition_type: TimeConditionType::PercentageThroughState,
                operator: ComparisonOperator::GreaterThan,
                comparand: 0.25,
                comparand_source: None,
                sync_event_id: None,
            }),
        );
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);

        ctx.begin_update(0.5);
        instance.update_graph(&mut ctx);
        let first = query_condition(&instance, &mut ctx);
        // Same tick, same memoized answer.
        assert_eq!(first, query_condition(&instance, &mut ctx));
        assert!(first);

        instance.shutdown(&mut ctx);
    }

    #[derive(Debug)]
    struct CountingFloatSettings {
        node_index: NodeIndex,
        value: f32,
        evaluations: Arc<AtomicUsize>,
    }

    impl NodeSettings for CountingFloatSettings {
        fn node_index(&self) -> NodeIndex {
            self.node_index
        }

        fn value_kind(&self) -> GraphValueKind {
            GraphValueKind::Float
        }

        fn instance_layout(&self) -> Layout {
            Layout::new::<CountingFloatNode>()
        }

        fn dependencies(&self) -> Vec<NodeIndex> {
            Vec::new()
        }

        fn type_tag(&self) -> &'static str {
            "counting_float"
        }

        unsafe fn instantiate(&self, at: NonNull<u8>, ctx: &InstantiationContext) -> NodePtr {
            if ctx.mode == InstantiationMode::NodeAlreadyCreated {
                return unsafe { relink::<CountingFloatNode>(at) };
            }
            unsafe {
                emplace(
                    at,
                    CountingFloatNode {
                        base: NodeBase::new(self.node_index),
                        value: self.value,
                        evaluations: self.evaluations.clone(),
                    },
                )
            }
        }
    }

    /// Counts every raw evaluation, so memoization in a parent shows up as a
    /// call count rather than a repeated value.
    struct CountingFloatNode {
        base: NodeBase,
        value: f32,
        evaluations: Arc<AtomicUsize>,
    }

    impl GraphNode for CountingFloatNode {
        fn base(&self) -> &NodeBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut NodeBase {
            &mut self.base
        }

        fn value_kind(&self) -> GraphValueKind {
            GraphValueKind::Float
        }

        fn initialize(&mut self, _ctx: &mut GraphContext, _nodes: &GraphNodes) {
            self.base.mark_initialized();
        }

        fn shutdown(&mut self, _ctx: &mut GraphContext, _nodes: &GraphNodes) {
            self.base.mark_shutdown();
        }

        fn as_float_node(&mut self) -> Option<&mut dyn FloatValueNode> {
            Some(self)
        }
    }

    impl FloatValueNode for CountingFloatNode {
        fn value(&mut self, ctx: &mut GraphContext, _nodes: &GraphNodes) -> f32 {
            self.base.assert_initialized();
            self.evaluations.fetch_add(1, Ordering::SeqCst);
            self.base.mark_updated(ctx.update_id());
            self.value
        }
    }

    #[test]
    fn comparand_child_is_queried_once_per_tick() {
        let evaluations = Arc::new(AtomicUsize::new(0));
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
            .push_node(Box::new(CountingFloatSettings {
                node_index: NodeIndex(2),
                value: 0.25,
                evaluations: evaluations.clone(),
            }))
            .push_node(Box::new(TimeConditionNodeSettings {
                node_index: NodeIndex(3),
                source_state: StateNodeHandle(NodeIndex(1)),
                condition_type: TimeConditionType::PercentageThroughState,
                operator: ComparisonOperator::GreaterThanEqual,
                comparand: 0.0,
                comparand_source: Some(FloatValueNodeHandle(NodeIndex(2))),
                sync_event_id: None,
            }))
            .set_root(NodeIndex(1))
            .mark_persistent(NodeIndex(3));
        let mut instance = GraphInstance::new(Arc::new(builder.build().unwrap()), data_set(1.0));
        let mut ctx = GraphContext::new();
        instance.initialize(&mut ctx);

        ctx.begin_update(0.5);
        instance.update_graph(&mut ctx);
        {
            let nodes = instance.nodes_for_tests();
            let condition = BoolValueNodeHandle(NodeIndex(3));
            assert!(condition.value(&mut ctx, &nodes));
            assert!(condition.value(&mut ctx, &nodes));
            assert!(condition.value(&mut ctx, &nodes));
        }
        // The memoized condition queried its comparand child exactly once.
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);

        ctx.begin_update(0.25);
        instance.update_graph(&mut ctx);
        {
            let nodes = instance.nodes_for_tests();
            assert!(BoolValueNodeHandle(NodeIndex(3)).value(&mut ctx, &nodes));
        }
        assert_eq!(evaluations.load(Ordering::SeqCst), 2);

        instance.shutdown(&mut ctx);
    }
}
