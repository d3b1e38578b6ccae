use bevy::reflect::{Reflect, std_traits::ReflectDefault};
use serde::{Deserialize, Serialize};

/// Normalized playback position. Valid values live in `[0, 1)` while playback
/// is looping; a clamped (non-looping) playback may rest exactly at `1.0`.
#[derive(
    Reflect, Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[reflect(Default)]
pub struct Percentage(pub f32);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0.0);
    pub const ONE: Percentage = Percentage(1.0);

    pub fn value(self) -> f32 {
        self.0
    }
}

impl std::fmt::Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Normalized playback time of a pose node: position through the current loop
/// plus the number of completed loops.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
pub struct PlaybackTime {
    pub position: Percentage,
    pub loop_count: u32,
}

impl PlaybackTime {
    pub fn new(position: Percentage) -> Self {
        Self {
            position,
            loop_count: 0,
        }
    }

    /// Advances the position by `delta_percent`, wrapping back into `[0, 1)`
    /// and incrementing the loop count once per full wrap. Returns the number
    /// of wraps performed, which may be more than one for large deltas.
    pub fn advance_looping(&mut self, delta_percent: f32) -> u32 {
        assert!(
            delta_percent >= 0.0 && delta_percent.is_finite(),
            "playback time advanced by invalid delta {delta_percent}"
        );

        let unwrapped = self.position.0 + delta_percent;
        let mut wraps = unwrapped.floor() as u32;
        let mut position = unwrapped - unwrapped.floor();

        // Floating point subtraction may land exactly on 1.0.
        if position >= 1.0 {
            position = 0.0;
            wraps += 1;
        }

        self.position = Percentage(position);
        self.loop_count += wraps;
        wraps
    }

    /// Advances the position without wrapping, clamping at the end of playback.
    /// The loop count is left untouched.
    pub fn advance_clamped(&mut self, delta_percent: f32) {
        assert!(
            delta_percent >= 0.0 && delta_percent.is_finite(),
            "playback time advanced by invalid delta {delta_percent}"
        );

        self.position = Percentage((self.position.0 + delta_percent).min(1.0));
    }

    /// Jumps directly to `target`, marking a wrap when the target lies behind
    /// the current position.
    pub fn seek(&mut self, target: Percentage) {
        if target < self.position {
            self.loop_count += 1;
        }
        self.position = target;
    }

    pub fn has_looped(&self) -> bool {
        self.loop_count > 0
    }
}

/// An event sampled out of a sync track during an update.
#[derive(Reflect, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
pub struct SampledEvent {
    pub id: String,
    /// Weight of the event, reduced by blending. 0.0 to 1.0.
    pub weight: f32,
    /// Percentage of total event duration at sampling time. 0.0 to 1.0.
    pub percentage: f32,
}

impl Default for SampledEvent {
    fn default() -> Self {
        Self {
            id: String::new(),
            weight: 1.0,
            percentage: 1.0,
        }
    }
}

impl SampledEvent {
    pub fn scaled(mut self, weight: f32) -> Self {
        self.weight *= weight;
        self
    }
}

/// A named interval on a sync track, in normalized playback time.
#[derive(Reflect, Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[reflect(Default)]
pub struct SyncEvent {
    pub id: String,
    pub start: f32,
    pub duration: f32,
}

impl SyncEvent {
    fn end(&self) -> f32 {
        self.start + self.duration
    }

    fn percentage_at(&self, position: f32) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            ((position - self.start) / self.duration).clamp(0.0, 1.0)
        }
    }
}

/// Normalized-time track of named events used to align playback across
/// blended animations and to answer percentage-through-event queries from
/// condition nodes.
#[derive(Reflect, Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[reflect(Default)]
pub struct SyncTrack {
    pub events: Vec<SyncEvent>,
}

impl SyncTrack {
    /// Adds an event to the track, keeping events sorted by start position.
    ///
    /// This operation is O(n) on the number of existing events.
    pub fn add_event(&mut self, event: SyncEvent) {
        for i in 0..self.events.len() {
            if self.events[i].start > event.start {
                self.events.insert(i, event);
                return;
            }
        }
        self.events.push(event);
    }

    /// How far through the first event named `id` the given position is, if
    /// such an event exists on the track.
    pub fn percentage_through_event(&self, id: &str, position: Percentage) -> Option<f32> {
        self.events
            .iter()
            .find(|ev| ev.id == id)
            .map(|ev| ev.percentage_at(position.0))
    }

    /// Events covering the given position.
    pub fn sample(&self, position: Percentage) -> Vec<SampledEvent> {
        self.events
            .iter()
            .filter(|ev| ev.start <= position.0 && ev.end() > position.0)
            .map(|ev| SampledEvent {
                id: ev.id.clone(),
                weight: 1.0,
                percentage: ev.percentage_at(position.0),
            })
            .collect()
    }

    /// Selects the dominant track of a two-way blend.
    pub fn select<'a>(a: &'a SyncTrack, b: &'a SyncTrack, blend_weight: f32) -> &'a SyncTrack {
        if blend_weight < 0.5 { a } else { b }
    }
}
