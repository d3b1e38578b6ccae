//! # Animation Graph Runtime
//!
//! A data-driven, node-based pose generation runtime. An animation graph is
//! compiled offline into a [`GraphDefinition`]: an immutable table of node
//! settings together with the memory layout of a running instance. At runtime,
//! each playing character owns a [`GraphInstance`] which places every node in a
//! single arena allocation, initializes the persistent subset of nodes, and is
//! then updated once per frame to produce a [`PoseResult`]: a skeletal pose, a
//! root-motion delta and sampled sync-track events.
//!
//! The definition is shared: many instances may reference one
//! [`GraphDefinition`] concurrently, since it is read-only after compilation.
//! Each instance is strictly single-threaded; initialize, update and shutdown
//! must bracket correctly, and violations of the compiled graph's contracts
//! (bad wiring, uninitialized node queries) are treated as fatal, since they
//! indicate a compiler or data bug rather than a runtime condition.
//!
//! [`GraphDefinition`]: crate::core::graph_definition::GraphDefinition
//! [`GraphInstance`]: crate::core::graph_instance::GraphInstance
//! [`PoseResult`]: crate::core::graph_node::PoseResult

pub mod core;
pub mod nodes;

pub mod prelude {
    pub use crate::core::{
        animation_clip::{AnimationClip, TransformCurve},
        context::GraphContext,
        data_set::{ClipId, GraphDataSet},
        debug_draw::DeferredGizmos,
        errors::{AssetLoaderError, GraphDefinitionError},
        graph_definition::{
            AnimationGraphAsset, GraphDefinition, GraphDefinitionBuilder, InstantiationContext,
            InstantiationMode, NodeSettings,
        },
        graph_instance::GraphInstance,
        graph_node::{
            BoolValueNode, BoolValueNodeHandle, FloatValueNode, FloatValueNodeHandle,
            GraphNode, GraphNodes, GraphValueKind, NodeBase, NodeIndex, PoseNode,
            PoseNodeHandle, PoseResult,
        },
        loader::AnimationGraphAssetLoader,
        physics::{PhysicsReadScope, PhysicsScene, PhysicsWriteScope, SweepFilter, SweepHit},
        player::GraphPlayer,
        plugin::AnimationGraphRuntimePlugin,
        pose::Pose,
        registry::NodeTypeRegistry,
        root_motion::RootMotionData,
        skeleton::Skeleton,
        sync_track::{Percentage, PlaybackTime, SampledEvent, SyncEvent, SyncTrack},
    };
    pub use crate::nodes::{
        blend_node::{BlendNode, BlendNodeSettings},
        clip_node::{ClipNode, ClipNodeSettings},
        parameter_nodes::{
            ConstBoolNode, ConstBoolNodeSettings, ConstFloatNode, ConstFloatNodeSettings,
            ControlParameterBoolNode, ControlParameterBoolNodeSettings, ControlParameterFloatNode,
            ControlParameterFloatNodeSettings,
        },
        state_condition_nodes::{
            ComparisonOperator, StateCompletedConditionNode, StateCompletedConditionNodeSettings,
            TimeConditionNode, TimeConditionNodeSettings, TimeConditionType,
        },
        state_machine_node::{
            StateMachineNode, StateMachineNodeSettings, StateSettings, TransitionSettings,
        },
        state_node::{StateNode, StateNodeHandle, StateNodeSettings},
    };
}
