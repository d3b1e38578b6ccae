use bevy::{reflect::Reflect, transform::prelude::Transform};

use super::skeleton::Skeleton;

/// A skeletal pose: one local-space transform per bone, indexed identically to
/// the skeleton's bone table.
#[derive(Reflect, Debug, Clone, Default, PartialEq)]
pub struct Pose {
    pub bones: Vec<Transform>,
}

impl Pose {
    /// The skeleton's reference (bind) pose.
    pub fn reference(skeleton: &Skeleton) -> Self {
        Self {
            bones: skeleton.reference_pose.clone(),
        }
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// Linear two-way blend. Translations and scales are lerped, rotations are
    /// slerped along the shortest path. Both poses must share a skeleton.
    pub fn blend_linear(&self, other: &Pose, alpha: f32) -> Pose {
        assert_eq!(
            self.bones.len(),
            other.bones.len(),
            "blending poses with mismatched bone counts"
        );

        let bones = self
            .bones
            .iter()
            .zip(other.bones.iter())
            .map(|(a, b)| {
                let mut rotation_b = b.rotation;
                // Choose the smallest angle for the rotation
                if rotation_b.dot(a.rotation) < 0.0 {
                    rotation_b = -rotation_b;
                }
                Transform {
                    translation: a.translation.lerp(b.translation, alpha),
                    rotation: a.rotation.slerp(rotation_b, alpha),
                    scale: a.scale.lerp(b.scale, alpha),
                }
            })
            .collect();

        Pose { bones }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::{Quat, Vec3};

    #[test]
    fn blend_endpoints_match_inputs() {
        let a = Pose {
            bones: vec![Transform::from_translation(Vec3::ZERO)],
        };
        let b = Pose {
            bones: vec![Transform::from_translation(Vec3::X)],
        };

        assert_eq!(a.blend_linear(&b, 0.0), a);
        assert_eq!(a.blend_linear(&b, 1.0), b);

        let mid = a.blend_linear(&b, 0.5);
        assert!((mid.bones[0].translation.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn blend_slerps_rotation() {
        let a = Pose {
            bones: vec![Transform::from_rotation(Quat::IDENTITY)],
        };
        let b = Pose {
            bones: vec![Transform::from_rotation(Quat::from_rotation_y(
                std::f32::consts::FRAC_PI_2,
            ))],
        };

        let mid = a.blend_linear(&b, 0.5);
        let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        assert!(mid.bones[0].rotation.angle_between(expected) < 1e-4);
    }
}
