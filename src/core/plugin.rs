use std::sync::Arc;

use bevy::prelude::*;

use super::{
    graph_definition::AnimationGraphAsset,
    graph_node::{BoolValueNodeHandle, FloatValueNodeHandle, NodeIndex, PoseNodeHandle},
    loader::AnimationGraphAssetLoader,
    pose::Pose,
    registry::NodeTypeRegistry,
    root_motion::RootMotionData,
    sync_track::{Percentage, PlaybackTime, SampledEvent, SyncEvent, SyncTrack},
    systems::run_graph_players,
};

/// Adds graph asset loading and player updates to an app
pub struct AnimationGraphRuntimePlugin {
    registry: Arc<NodeTypeRegistry>,
}

impl Default for AnimationGraphRuntimePlugin {
    fn default() -> Self {
        Self {
            registry: Arc::new(NodeTypeRegistry::with_builtin_nodes()),
        }
    }
}

impl AnimationGraphRuntimePlugin {
    /// Uses a caller-provided registry, for apps that register their own
    /// node types on top of the builtins.
    pub fn with_registry(registry: Arc<NodeTypeRegistry>) -> Self {
        Self { registry }
    }
}

impl Plugin for AnimationGraphRuntimePlugin {
    fn build(&self, app: &mut App) {
        self.register_types(app);
        app //
            .init_asset::<AnimationGraphAsset>()
            .register_asset_loader(AnimationGraphAssetLoader::new(self.registry.clone()))
            .add_systems(PreUpdate, run_graph_players);

        #[cfg(debug_assertions)]
        app.add_systems(PostUpdate, super::systems::apply_player_deferred_gizmos);
    }
}

impl AnimationGraphRuntimePlugin {
    fn register_types(&self, app: &mut App) {
        app //
            .register_type::<Pose>()
            .register_type::<Percentage>()
            .register_type::<PlaybackTime>()
            .register_type::<SyncTrack>()
            .register_type::<SyncEvent>()
            .register_type::<SampledEvent>()
            .register_type::<RootMotionData>()
            .register_type::<NodeIndex>()
            .register_type::<PoseNodeHandle>()
            .register_type::<BoolValueNodeHandle>()
            .register_type::<FloatValueNodeHandle>();
    }
}
