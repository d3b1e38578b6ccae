use bevy::{reflect::Reflect, transform::prelude::Transform};

/// Bone hierarchy shared by every clip and pose in a data set.
///
/// Bones are identified by index; `parent_indices[0]` is `None` for the root
/// bone and every other parent index precedes its child.
#[derive(Reflect, Debug, Clone, Default)]
pub struct Skeleton {
    pub bone_names: Vec<String>,
    pub parent_indices: Vec<Option<usize>>,
    pub reference_pose: Vec<Transform>,
}

impl Skeleton {
    pub fn bone_count(&self) -> usize {
        self.bone_names.len()
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bone_names.iter().position(|n| n == name)
    }
}
