use bevy::{color::LinearRgba, math::Vec3, reflect::Reflect, transform::prelude::Transform};

use super::debug_draw::DeferredGizmos;

/// Number of per-frame deltas kept for velocity queries and debug drawing.
/// Older frames are evicted; the composed total is unaffected.
const HISTORY_CAPACITY: usize = 64;

/// Accumulated root-motion history of a graph instance.
///
/// Records the most recent per-frame transform deltas produced by updates,
/// so gameplay can query average velocities over recent motion and debug
/// views can render the path. The composed total and the wall-clock time
/// cover everything recorded since the last clear, including evicted frames.
#[derive(Reflect, Debug, Clone)]
pub struct RootMotionData {
    deltas: Vec<Transform>,
    delta_times: Vec<f32>,
    total_delta: Transform,
    total_time: f32,
}

impl Default for RootMotionData {
    fn default() -> Self {
        Self {
            deltas: Vec::new(),
            delta_times: Vec::new(),
            total_delta: Transform::IDENTITY,
            total_time: 0.0,
        }
    }
}

impl RootMotionData {
    /// Resets the history to identity/empty.
    pub fn clear(&mut self) {
        self.deltas.clear();
        self.delta_times.clear();
        self.total_delta = Transform::IDENTITY;
        self.total_time = 0.0;
    }

    /// Appends one frame's delta, evicting the oldest frame once the window
    /// is full. The total is the in-order composition of every delta ever
    /// recorded, evicted or not.
    pub fn record_delta(&mut self, delta: Transform, delta_time: f32) {
        self.total_delta = self.total_delta.mul_transform(delta);
        self.total_time += delta_time;
        if self.deltas.len() == HISTORY_CAPACITY {
            self.deltas.remove(0);
            self.delta_times.remove(0);
        }
        self.deltas.push(delta);
        self.delta_times.push(delta_time);
    }

    pub fn total_delta(&self) -> Transform {
        self.total_delta
    }

    /// Seconds covered since the last clear, including evicted frames.
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    pub fn last_delta(&self) -> Option<Transform> {
        self.deltas.last().copied()
    }

    pub fn num_recorded(&self) -> usize {
        self.deltas.len()
    }

    /// Average linear velocity over the retained window, in character space.
    pub fn average_linear_velocity(&self) -> Vec3 {
        let window_time: f32 = self.delta_times.iter().sum();
        if window_time <= 0.0 {
            return Vec3::ZERO;
        }
        let travelled: Vec3 = self.deltas.iter().map(|d| d.translation).sum();
        travelled / window_time
    }

    /// Average angular speed over the retained window, in radians per second.
    pub fn average_angular_velocity(&self) -> f32 {
        let window_time: f32 = self.delta_times.iter().sum();
        if window_time <= 0.0 {
            return 0.0;
        }
        let turned: f32 = self
            .deltas
            .iter()
            .map(|d| d.rotation.angle_between(bevy::math::Quat::IDENTITY))
            .sum();
        turned / window_time
    }

    /// Renders the recorded path as connected axis markers, with segment
    /// colors alternating so individual frame deltas stay visible.
    pub fn debug_draw(&self, start: Transform, gizmos: &mut DeferredGizmos) {
        const SEGMENT_COLORS: [LinearRgba; 2] = [
            LinearRgba::rgb(0.1, 0.9, 0.2),
            LinearRgba::rgb(0.9, 0.9, 0.1),
        ];
        const AXIS_LENGTH: f32 = 0.05;

        let mut cursor = start;
        gizmos.axes(cursor, AXIS_LENGTH);

        for (i, delta) in self.deltas.iter().enumerate() {
            let next = cursor.mul_transform(*delta);
            gizmos.line(cursor.translation, next.translation, SEGMENT_COLORS[i % 2]);
            gizmos.axes(next, AXIS_LENGTH);
            cursor = next;
        }
    }
}
