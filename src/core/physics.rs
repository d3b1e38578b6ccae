use bevy::math::Vec3;

/// Filter handed to scene queries so callers can exclude their own colliders.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SweepFilter {
    /// Entity id (or other caller-chosen id) whose colliders the query skips.
    pub ignored_entity: Option<u64>,
    /// Bitmask of collision layers the sweep tests against. Zero means all.
    pub layer_mask: u32,
}

/// First blocking hit of a sphere sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    /// Sphere center at the time of impact.
    pub position: Vec3,
}

/// Read/write-locked scene that nodes may query during evaluation.
///
/// Lock acquisition is bracketed: every `acquire_*` must be paired with the
/// matching `release_*`, which the [`PhysicsReadScope`]/[`PhysicsWriteScope`]
/// guards take care of. Queries are only valid while a read lock is held.
pub trait PhysicsScene: Send + Sync {
    fn acquire_read_lock(&self);
    fn release_read_lock(&self);
    fn acquire_write_lock(&self);
    fn release_write_lock(&self);

    /// Sweeps a sphere from `start` to `end` and returns the first blocking
    /// hit, if any.
    fn sweep_sphere(
        &self,
        radius: f32,
        start: Vec3,
        end: Vec3,
        filter: SweepFilter,
    ) -> Option<SweepHit>;
}

/// RAII guard holding a read lock on a scene for its lifetime.
pub struct PhysicsReadScope<'a> {
    scene: &'a dyn PhysicsScene,
}

impl<'a> PhysicsReadScope<'a> {
    pub fn new(scene: &'a dyn PhysicsScene) -> Self {
        scene.acquire_read_lock();
        Self { scene }
    }

    pub fn sweep_sphere(
        &self,
        radius: f32,
        start: Vec3,
        end: Vec3,
        filter: SweepFilter,
    ) -> Option<SweepHit> {
        self.scene.sweep_sphere(radius, start, end, filter)
    }
}

impl Drop for PhysicsReadScope<'_> {
    fn drop(&mut self) {
        self.scene.release_read_lock();
    }
}

/// RAII guard holding a write lock on a scene for its lifetime.
pub struct PhysicsWriteScope<'a> {
    scene: &'a dyn PhysicsScene,
}

impl<'a> PhysicsWriteScope<'a> {
    pub fn new(scene: &'a dyn PhysicsScene) -> Self {
        scene.acquire_write_lock();
        Self { scene }
    }
}

impl Drop for PhysicsWriteScope<'_> {
    fn drop(&mut self) {
        self.scene.release_write_lock();
    }
}
