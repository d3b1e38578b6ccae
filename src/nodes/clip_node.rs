//! Leaf pose node that samples an animation clip.

use std::{alloc::Layout, ptr::NonNull, sync::Arc};

use bevy::transform::prelude::Transform;
use serde::{Deserialize, Serialize};

use crate::core::{
    animation_clip::AnimationClip,
    arena::{emplace, relink},
    context::GraphContext,
    data_set::ClipId,
    graph_definition::{InstantiationContext, InstantiationMode, NodeSettings},
    graph_node::{
        FloatValueNodeHandle, GraphNode, GraphNodes, GraphValueKind, NodeBase, NodeIndex, NodePtr,
        PoseNode, PoseResult,
    },
    skeleton::Skeleton,
    sync_track::{Percentage, PlaybackTime, SyncTrack},
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClipNodeSettings {
    pub node_index: NodeIndex,
    pub clip: ClipId,
    #[serde(default)]
    pub looping: bool,
    /// Optional float child scaling playback speed. 1.0 when absent.
    #[serde(default)]
    pub speed_scale: Option<FloatValueNodeHandle>,
}

impl NodeSettings for ClipNodeSettings {
    fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Pose
    }

    fn instance_layout(&self) -> Layout {
        Layout::new::<ClipNode>()
    }

    fn dependencies(&self) -> Vec<NodeIndex> {
        self.speed_scale.iter().map(|handle| handle.index()).collect()
    }

    fn type_tag(&self) -> &'static str {
        "clip"
    }

    unsafe fn instantiate(&self, at: NonNull<u8>, ctx: &InstantiationContext) -> NodePtr {
        if ctx.mode == InstantiationMode::NodeAlreadyCreated {
            return unsafe { relink::<ClipNode>(at) };
        }
        let clip = ctx.data_set.clip(self.clip).clone();
        let sync_track = clip.sync_track.clone();
        unsafe {
            emplace(
                at,
                ClipNode {
                    base: NodeBase::new(self.node_index),
                    clip,
                    skeleton: ctx.data_set.skeleton.clone(),
                    looping: self.looping,
                    speed_scale: self.speed_scale,
                    time: PlaybackTime::default(),
                    previous_time: PlaybackTime::default(),
                    sync_track,
                },
            )
        }
    }
}

pub struct ClipNode {
    base: NodeBase,
    clip: Arc<AnimationClip>,
    skeleton: Arc<Skeleton>,
    looping: bool,
    speed_scale: Option<FloatValueNodeHandle>,
    time: PlaybackTime,
    previous_time: PlaybackTime,
    sync_track: SyncTrack,
}

impl ClipNode {
    /// Samples pose, root-motion delta and sync events at the current time.
    fn sample(&self, wraps: u32) -> PoseResult {
        let duration = self.clip.duration;
        let pose = self
            .clip
            .sample_pose(self.time.position.0 * duration, &self.skeleton);

        let root_motion_delta = if duration > 0.0 {
            self.clip.root_motion_delta(
                self.previous_time.position.0 * duration,
                self.time.position.0 * duration,
                wraps > 0,
            )
        } else {
            Transform::IDENTITY
        };

        let mut result = PoseResult::new(pose);
        result.root_motion_delta = root_motion_delta;
        result.events = self.sync_track.sample(self.time.position);
        result
    }
}

impl GraphNode for ClipNode {
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
        if let Some(speed_scale) = self.speed_scale {
            speed_scale.initialize(ctx, nodes);
        }
        self.time = PlaybackTime::default();
        self.previous_time = PlaybackTime::default();
    }

    fn shutdown(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        if let Some(speed_scale) = self.speed_scale {
            speed_scale.shutdown(ctx, nodes);
        }
        self.base.mark_shutdown();
    }

    fn as_pose_node(&mut self) -> Option<&mut dyn PoseNode> {
        Some(self)
    }
}

impl PoseNode for ClipNode {
    fn update(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) -> PoseResult {
        self.base.assert_initialized();
        ctx.track_active_node(self.base.index());

        let speed = self
            .speed_scale
            .map(|handle| handle.value(ctx, nodes))
            .unwrap_or(1.0)
            .max(0.0);

        self.previous_time = self.time;
        let duration = self.clip.duration;
        let delta_percent = if duration > 0.0 {
            ctx.delta_time() * speed / duration
        } else {
            0.0
        };

        let wraps = if self.looping {
            self.time.advance_looping(delta_percent)
        } else {
            self.time.advance_clamped(delta_percent);
            0
        };

        self.base.mark_updated(ctx.update_id());
        self.sample(wraps)
    }

    fn update_with_time(
        &mut self,
        ctx: &mut GraphContext,
        _nodes: &GraphNodes,
        time: PlaybackTime,
    ) -> PoseResult {
        self.base.assert_initialized();
        ctx.track_active_node(self.base.index());

        self.previous_time = self.time;
        let wrapped = time.position < self.previous_time.position;
        self.time.seek(time.position);

        self.base.mark_updated(ctx.update_id());
        self.sample(u32::from(wrapped))
    }

    fn current_time(&self) -> PlaybackTime {
        self.time
    }

    fn previous_time(&self) -> PlaybackTime {
        self.previous_time
    }

    fn duration(&self) -> f32 {
        self.clip.duration
    }

    fn sync_track(&self) -> &SyncTrack {
        &self.sync_track
    }
}
