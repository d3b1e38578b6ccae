use bevy::{math::Vec3, reflect::Reflect, transform::prelude::Transform};

use super::{pose::Pose, skeleton::Skeleton, sync_track::SyncTrack};

/// Keyframed local-space transforms for one bone.
///
/// `timestamps` are strictly increasing and paired index-for-index with
/// `transforms`.
#[derive(Reflect, Debug, Clone, Default)]
pub struct TransformCurve {
    pub bone: usize,
    pub timestamps: Vec<f32>,
    pub transforms: Vec<Transform>,
}

impl TransformCurve {
    /// Samples the curve at `time`, clamping outside the keyframe range and
    /// interpolating linearly (slerp for rotations) between keyframes.
    pub fn sample(&self, time: f32) -> Transform {
        assert!(
            !self.timestamps.is_empty(),
            "sampled an empty transform curve"
        );

        let (step_start, step_end) = match self
            .timestamps
            .binary_search_by(|probe| probe.partial_cmp(&time).unwrap())
        {
            Ok(i) => (i, i),
            Err(0) => (0, 0),
            Err(n) if n >= self.timestamps.len() => {
                (self.timestamps.len() - 1, self.timestamps.len() - 1)
            }
            Err(i) => (i - 1, i),
        };

        if step_start == step_end {
            return self.transforms[step_start];
        }

        let prev_timestamp = self.timestamps[step_start];
        let next_timestamp = self.timestamps[step_end];
        let lerp = if next_timestamp == prev_timestamp {
            1.0
        } else {
            (time - prev_timestamp) / (next_timestamp - prev_timestamp)
        };

        let prev = self.transforms[step_start];
        let next = self.transforms[step_end];

        let mut next_rotation = next.rotation;
        // Choose the smallest angle for the rotation
        if next_rotation.dot(prev.rotation) < 0.0 {
            next_rotation = -next_rotation;
        }

        Transform {
            translation: prev.translation.lerp(next.translation, lerp),
            rotation: prev.rotation.slerp(next_rotation, lerp),
            scale: prev.scale.lerp(next.scale, lerp),
        }
    }
}

/// A compiled animation clip: per-bone transform curves, an optional
/// root-motion curve and the clip's sync track.
#[derive(Reflect, Debug, Clone, Default)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub curves: Vec<TransformCurve>,
    pub root_motion: Option<TransformCurve>,
    pub sync_track: SyncTrack,
}

impl AnimationClip {
    /// Samples the clip at `time` seconds, starting from the skeleton's
    /// reference pose. Bones without a curve keep their reference transform.
    pub fn sample_pose(&self, time: f32, skeleton: &Skeleton) -> Pose {
        let mut pose = Pose::reference(skeleton);
        let time = time.clamp(0.0, self.duration);

        for curve in &self.curves {
            assert!(
                curve.bone < pose.bone_count(),
                "clip '{}' animates bone {} but the skeleton has {} bones",
                self.name,
                curve.bone,
                pose.bone_count()
            );
            pose.bones[curve.bone] = curve.sample(time);
        }

        pose
    }

    /// The root-motion delta the clip imparts between `previous` and `current`
    /// seconds. When `wrapped` is set, playback looped between the two sample
    /// points and the delta is composed across the loop boundary.
    pub fn root_motion_delta(&self, previous: f32, current: f32, wrapped: bool) -> Transform {
        let Some(curve) = &self.root_motion else {
            return Transform::IDENTITY;
        };

        if wrapped {
            let to_end = root_delta(curve, previous, self.duration);
            let from_start = root_delta(curve, 0.0, current);
            return to_end.mul_transform(from_start);
        }

        root_delta(curve, previous, current)
    }
}

/// Character-space delta between two samples of a root-motion curve:
/// the translation expressed relative to the earlier root orientation and the
/// relative rotation.
fn root_delta(curve: &TransformCurve, from: f32, to: f32) -> Transform {
    let a = curve.sample(from);
    let b = curve.sample(to);
    Transform {
        translation: a.rotation.inverse() * (b.translation - a.translation),
        rotation: a.rotation.inverse() * b.rotation,
        scale: Vec3::ONE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Quat;

    fn quat_is_near(a: Quat, b: Quat, epsilon: f32) -> bool {
        a.angle_between(b) < epsilon
    }

    fn linear_root_clip() -> AnimationClip {
        AnimationClip {
            name: "walk_forward".into(),
            duration: 2.0,
            curves: vec![],
            root_motion: Some(TransformCurve {
                bone: 0,
                timestamps: vec![0.0, 2.0],
                transforms: vec![
                    Transform::IDENTITY,
                    Transform::from_translation(Vec3::new(0.0, 0.0, 2.0)),
                ],
            }),
            sync_track: SyncTrack::default(),
        }
    }

    #[test]
    fn curve_sampling_interpolates_and_clamps() {
        let curve = TransformCurve {
            bone: 0,
            timestamps: vec![0.0, 1.0],
            transforms: vec![
                Transform::from_translation(Vec3::ZERO),
                Transform::from_translation(Vec3::X),
            ],
        };

        assert!((curve.sample(0.5).translation.x - 0.5).abs() < 1e-6);
        assert!((curve.sample(-1.0).translation.x - 0.0).abs() < 1e-6);
        assert!((curve.sample(5.0).translation.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn root_motion_delta_is_relative() {
        let clip = linear_root_clip();
        let delta = clip.root_motion_delta(0.5, 1.0, false);
        assert!((delta.translation.z - 0.5).abs() < 1e-6);
        assert!(quat_is_near(delta.rotation, Quat::IDENTITY, 1e-4));
    }

    #[test]
    fn root_motion_delta_composes_across_wrap() {
        let clip = linear_root_clip();
        // 1.5s -> end covers 0.5m, start -> 0.5s covers another 0.5m.
        let delta = clip.root_motion_delta(1.5, 0.5, true);
        assert!((delta.translation.z - 1.0).abs() < 1e-6);
    }
}
