use bevy::{asset::prelude::*, ecs::prelude::*, time::Time};
#[cfg(debug_assertions)]
use bevy::gizmos::gizmos::Gizmos;

use super::{graph_definition::AnimationGraphAsset, player::GraphPlayer};

/// System that advances every [`GraphPlayer`] by the frame's delta time
pub fn run_graph_players(
    time: Res<Time>,
    graphs: Res<Assets<AnimationGraphAsset>>,
    mut players: Query<&mut GraphPlayer>,
) {
    let delta_time = time.delta_secs();
    for mut player in &mut players {
        player.update(delta_time, &graphs);
    }
}

/// System that flushes deferred gizmo commands queued during graph evaluation
#[cfg(debug_assertions)]
pub fn apply_player_deferred_gizmos(mut players: Query<&mut GraphPlayer>, mut gizmos: Gizmos) {
    for mut player in &mut players {
        player.deferred_gizmos.apply(&mut gizmos);
    }
}
