use std::sync::Arc;

use super::graph_node::NodeIndex;
use super::physics::PhysicsScene;

/// Per-tick evaluation context shared by every node of a graph instance
/// during a single update.
///
/// A context is valid for evaluation once [`GraphContext::begin_update`] has
/// been called with the tick's delta time. The update id it hands out is what
/// value nodes use to memoize their results within a tick.
pub struct GraphContext {
    update_id: u64,
    delta_time: f32,
    physics: Option<Arc<dyn PhysicsScene>>,
    #[cfg(debug_assertions)]
    active_nodes: Vec<NodeIndex>,
}

impl Default for GraphContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphContext {
    pub fn new() -> Self {
        Self {
            update_id: 0,
            delta_time: 0.0,
            physics: None,
            #[cfg(debug_assertions)]
            active_nodes: Vec::new(),
        }
    }

    pub fn with_physics(physics: Arc<dyn PhysicsScene>) -> Self {
        let mut ctx = Self::new();
        ctx.physics = Some(physics);
        ctx
    }

    pub fn set_physics_scene(&mut self, physics: Option<Arc<dyn PhysicsScene>>) {
        self.physics = physics;
    }

    /// Starts a new tick: bumps the update id, stores the delta time and
    /// clears the active-node record.
    pub fn begin_update(&mut self, delta_time: f32) {
        assert!(
            delta_time.is_finite() && delta_time >= 0.0,
            "graph update started with invalid delta time {delta_time}"
        );
        self.update_id = self.update_id.wrapping_add(1);
        self.delta_time = delta_time;
        #[cfg(debug_assertions)]
        self.active_nodes.clear();
    }

    pub fn is_valid(&self) -> bool {
        self.delta_time.is_finite() && self.delta_time >= 0.0
    }

    pub fn update_id(&self) -> u64 {
        self.update_id
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn physics(&self) -> Option<&Arc<dyn PhysicsScene>> {
        self.physics.as_ref()
    }

    /// Records a node as active this tick. Compiles to nothing in release
    /// builds.
    #[allow(unused_variables)]
    pub fn track_active_node(&mut self, index: NodeIndex) {
        #[cfg(debug_assertions)]
        self.active_nodes.push(index);
    }

    #[cfg(debug_assertions)]
    pub fn active_nodes(&self) -> &[NodeIndex] {
        &self.active_nodes
    }
}
