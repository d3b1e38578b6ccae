//! Serialized form of graph assets.
//!
//! Node settings are polymorphic, so the serialized graph keeps each node's
//! payload as a [`ron::value::RawValue`] next to its type tag. Deserializing
//! happens in two passes: parse the outer structure, then resolve each
//! payload through a [`NodeTypeRegistry`].

use std::sync::Arc;

use bevy::{
    math::{Quat, Vec3},
    transform::prelude::Transform,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{
    animation_clip::{AnimationClip, TransformCurve},
    data_set::GraphDataSet,
    errors::GraphDefinitionError,
    graph_definition::{GraphDefinition, GraphDefinitionBuilder},
    graph_node::NodeIndex,
    registry::NodeTypeRegistry,
    skeleton::Skeleton,
    sync_track::SyncTrack,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct TransformSerial {
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl From<TransformSerial> for Transform {
    fn from(serial: TransformSerial) -> Self {
        Transform {
            translation: Vec3::from_array(serial.translation),
            rotation: Quat::from_array(serial.rotation),
            scale: Vec3::from_array(serial.scale),
        }
    }
}

impl From<Transform> for TransformSerial {
    fn from(transform: Transform) -> Self {
        Self {
            translation: transform.translation.to_array(),
            rotation: transform.rotation.to_array(),
            scale: transform.scale.to_array(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SkeletonSerial {
    pub bone_names: Vec<String>,
    pub parent_indices: Vec<Option<usize>>,
    pub reference_pose: Vec<TransformSerial>,
}

impl From<SkeletonSerial> for Skeleton {
    fn from(serial: SkeletonSerial) -> Self {
        Skeleton {
            bone_names: serial.bone_names,
            parent_indices: serial.parent_indices,
            reference_pose: serial
                .reference_pose
                .into_iter()
                .map(Transform::from)
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransformCurveSerial {
    pub bone: usize,
    pub timestamps: Vec<f32>,
    pub transforms: Vec<TransformSerial>,
}

impl From<TransformCurveSerial> for TransformCurve {
    fn from(serial: TransformCurveSerial) -> Self {
        TransformCurve {
            bone: serial.bone,
            timestamps: serial.timestamps,
            transforms: serial
                .transforms
                .into_iter()
                .map(Transform::from)
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnimationClipSerial {
    pub name: String,
    pub duration: f32,
    #[serde(default)]
    pub curves: Vec<TransformCurveSerial>,
    #[serde(default)]
    pub root_motion: Option<TransformCurveSerial>,
    #[serde(default)]
    pub sync_track: SyncTrack,
}

impl From<AnimationClipSerial> for AnimationClip {
    fn from(serial: AnimationClipSerial) -> Self {
        AnimationClip {
            name: serial.name,
            duration: serial.duration,
            curves: serial.curves.into_iter().map(TransformCurve::from).collect(),
            root_motion: serial.root_motion.map(TransformCurve::from),
            sync_track: serial.sync_track,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GraphDataSetSerial {
    pub skeleton: SkeletonSerial,
    pub clips: Vec<AnimationClipSerial>,
}

impl From<GraphDataSetSerial> for GraphDataSet {
    fn from(serial: GraphDataSetSerial) -> Self {
        GraphDataSet {
            skeleton: Arc::new(serial.skeleton.into()),
            clips: serial
                .clips
                .into_iter()
                .map(|clip| Arc::new(clip.into()))
                .collect(),
        }
    }
}

#[derive(Deserialize)]
pub struct NodeSettingsSerial {
    pub ty: String,
    pub inner: Box<ron::value::RawValue>,
}

#[derive(Deserialize)]
pub struct GraphDefinitionSerial {
    pub nodes: Vec<NodeSettingsSerial>,
    pub root_node: u32,
    #[serde(default)]
    pub persistent_nodes: Vec<u32>,
    #[serde(default)]
    pub parameters: IndexMap<String, u32>,
    pub data_set: GraphDataSetSerial,
}

impl GraphDefinitionSerial {
    /// Resolves node payloads through the registry and builds the validated
    /// definition plus its data set.
    pub fn into_definition(
        self,
        registry: &NodeTypeRegistry,
    ) -> Result<(GraphDefinition, GraphDataSet), GraphDefinitionError> {
        let mut builder = GraphDefinitionBuilder::new();
        for node in &self.nodes {
            builder.push_node(registry.deserialize(&node.ty, &node.inner)?);
        }
        builder.set_root(NodeIndex(self.root_node));
        for &index in &self.persistent_nodes {
            builder.mark_persistent(NodeIndex(index));
        }
        for (name, &index) in &self.parameters {
            builder.expose_parameter(name.clone(), NodeIndex(index));
        }
        let definition = builder.build()?;
        Ok((definition, self.data_set.into()))
    }
}
