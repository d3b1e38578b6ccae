use std::sync::Arc;

use bevy::reflect::Reflect;
use serde::{Deserialize, Serialize};

use super::{animation_clip::AnimationClip, skeleton::Skeleton};

/// Index of a clip inside a [`GraphDataSet`]. Node settings reference clips by
/// id so that the same graph definition can be paired with different data sets
/// (variations of a character sharing one topology).
#[derive(
    Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub struct ClipId(pub u32);

impl ClipId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Auxiliary resources a graph definition is paired with at instance
/// construction time: the skeleton and the animation clips nodes sample.
///
/// Shared read-only between every instance built from it.
#[derive(Debug, Clone, Default)]
pub struct GraphDataSet {
    pub skeleton: Arc<Skeleton>,
    pub clips: Vec<Arc<AnimationClip>>,
}

impl GraphDataSet {
    /// Resolves a clip id. Missing clips are a compiler/data bug: the offline
    /// compiler guarantees every referenced id is present.
    pub fn clip(&self, id: ClipId) -> &Arc<AnimationClip> {
        self.clips.get(id.index()).unwrap_or_else(|| {
            panic!(
                "data set has {} clips but clip {} was requested",
                self.clips.len(),
                id.0
            )
        })
    }
}
