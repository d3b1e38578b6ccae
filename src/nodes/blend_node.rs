//! Two-way linear blend between pose children, optionally synchronized
//! through the children's sync tracks.

use std::{alloc::Layout, ptr::NonNull};

use serde::{Deserialize, Serialize};

use crate::core::{
    arena::{emplace, relink},
    context::GraphContext,
    graph_definition::{InstantiationContext, InstantiationMode, NodeSettings},
    graph_node::{
        FloatValueNodeHandle, GraphNode, GraphNodes, GraphValueKind, NodeBase, NodeIndex, NodePtr,
        PoseNode, PoseNodeHandle, PoseResult,
    },
    sync_track::{PlaybackTime, SyncTrack},
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BlendNodeSettings {
    pub node_index: NodeIndex,
    pub source_a: PoseNodeHandle,
    pub source_b: PoseNodeHandle,
    pub blend_weight: FloatValueNodeHandle,
    /// When set, source B is driven with source A's normalized time so
    /// footfalls and similar sync events stay aligned while blending.
    #[serde(default)]
    pub synchronize: bool,
}

impl NodeSettings for BlendNodeSettings {
    fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Pose
    }

    fn instance_layout(&self) -> Layout {
        Layout::new::<BlendNode>()
    }

    fn dependencies(&self) -> Vec<NodeIndex> {
        vec![
            self.source_a.index(),
            self.source_b.index(),
            self.blend_weight.index(),
        ]
    }

    fn type_tag(&self) -> &'static str {
        "blend"
    }

    unsafe fn instantiate(&self, at: NonNull<u8>, ctx: &InstantiationContext) -> NodePtr {
        if ctx.mode == InstantiationMode::NodeAlreadyCreated {
            return unsafe { relink::<BlendNode>(at) };
        }
        unsafe {
            emplace(
                at,
                BlendNode {
                    base: NodeBase::new(self.node_index),
                    source_a: self.source_a,
                    source_b: self.source_b,
                    blend_weight: self.blend_weight,
                    synchronize: self.synchronize,
                    time: PlaybackTime::default(),
                    previous_time: PlaybackTime::default(),
                    duration: 0.0,
                    sync_track: SyncTrack::default(),
                },
            )
        }
    }
}

pub struct BlendNode {
    base: NodeBase,
    source_a: PoseNodeHandle,
    source_b: PoseNodeHandle,
    blend_weight: FloatValueNodeHandle,
    synchronize: bool,
    // Timing caches refreshed every update: source A is the sync master, so
    // its time drives the blend; duration is interpolated between children.
    time: PlaybackTime,
    previous_time: PlaybackTime,
    duration: f32,
    sync_track: SyncTrack,
}

impl BlendNode {
    fn blend(
        &mut self,
        ctx: &mut GraphContext,
        nodes: &GraphNodes,
        result_a: PoseResult,
        weight: f32,
    ) -> PoseResult {
        let result_b = if self.synchronize {
            let time_a = self.source_a.current_time(nodes);
            self.source_b.update_with_time(ctx, nodes, time_a)
        } else {
            self.source_b.update(ctx, nodes)
        };

        self.previous_time = self.time;
        self.time = self.source_a.current_time(nodes);
        let duration_a = self.source_a.duration(nodes);
        let duration_b = self.source_b.duration(nodes);
        self.duration = duration_a + (duration_b - duration_a) * weight;
        self.sync_track = SyncTrack::select(
            self.source_a.sync_track(nodes),
            self.source_b.sync_track(nodes),
            weight,
        )
        .clone();

        PoseResult::blend_linear(&result_a, &result_b, weight)
    }
}

impl GraphNode for BlendNode {
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
        self.source_a.initialize(ctx, nodes);
        self.source_b.initialize(ctx, nodes);
        self.blend_weight.initialize(ctx, nodes);
        self.time = PlaybackTime::default();
        self.previous_time = PlaybackTime::default();
        self.duration = 0.0;
    }

    fn shutdown(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        self.blend_weight.shutdown(ctx, nodes);
        self.source_b.shutdown(ctx, nodes);
        self.source_a.shutdown(ctx, nodes);
        self.base.mark_shutdown();
    }

    fn as_pose_node(&mut self) -> Option<&mut dyn PoseNode> {
        Some(self)
    }
}

impl PoseNode for BlendNode {
    fn update(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) -> PoseResult {
        self.base.assert_initialized();
        ctx.track_active_node(self.base.index());

        let weight = self.blend_weight.value(ctx, nodes).clamp(0.0, 1.0);
        let result_a = self.source_a.update(ctx, nodes);
        let result = self.blend(ctx, nodes, result_a, weight);

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

        let weight = self.blend_weight.value(ctx, nodes).clamp(0.0, 1.0);
        let result_a = self.source_a.update_with_time(ctx, nodes, time);
        let result = self.blend(ctx, nodes, result_a, weight);

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
