use std::{alloc::Layout, fmt::Debug, ptr::NonNull, sync::Arc};

use bevy::{asset::Asset, reflect::TypePath};
use indexmap::IndexMap;
use uuid::Uuid;

use super::{
    data_set::GraphDataSet,
    errors::GraphDefinitionError,
    graph_node::{GraphValueKind, NodeIndex, NodePtr},
};

/// Whether [`NodeSettings::instantiate`] should construct a fresh node or
/// only re-link to one that already exists at the target address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantiationMode {
    CreateNode,
    NodeAlreadyCreated,
}

/// Context handed to settings while an instance is being populated.
///
/// `constructed` holds pointers to every node built so far, in table order,
/// so a node's settings can inspect already-built dependencies.
pub struct InstantiationContext<'a> {
    pub data_set: &'a Arc<GraphDataSet>,
    pub constructed: &'a [NodePtr],
    pub mode: InstantiationMode,
}

/// Immutable, shareable description of one node: everything needed to
/// construct its runtime counterpart inside an instance arena.
///
/// Settings live in the definition and are shared by every instance; all
/// mutable state lives in the instantiated node.
pub trait NodeSettings: Debug + Send + Sync + 'static {
    /// This node's position in the definition's node table.
    fn node_index(&self) -> NodeIndex;

    fn value_kind(&self) -> GraphValueKind;

    /// Memory layout of the runtime node this settings object constructs.
    fn instance_layout(&self) -> Layout;

    /// Indices of nodes this node reads from. Every dependency must precede
    /// this node in the table.
    fn dependencies(&self) -> Vec<NodeIndex>;

    /// Stable tag used by the serialized form and the type registry.
    fn type_tag(&self) -> &'static str;

    /// Constructs the runtime node in place at `at`.
    ///
    /// # Safety
    /// `at` must satisfy [`Self::instance_layout`] and point into memory the
    /// caller owns for at least the node's lifetime.
    unsafe fn instantiate(&self, at: NonNull<u8>, ctx: &InstantiationContext) -> NodePtr;
}

/// Compiled, immutable graph shared by all of its instances.
///
/// Holds the node settings table, each node's precomputed byte offset inside
/// an instance's memory block, and the total size and alignment of that
/// block.
#[derive(Debug)]
pub struct GraphDefinition {
    id: Uuid,
    node_settings: Vec<Box<dyn NodeSettings>>,
    instance_node_start_offsets: Vec<usize>,
    instance_required_memory: usize,
    instance_required_alignment: usize,
    persistent_node_indices: Vec<NodeIndex>,
    root_node_index: NodeIndex,
    parameter_lookup: IndexMap<String, NodeIndex>,
}

impl GraphDefinition {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn num_nodes(&self) -> usize {
        self.node_settings.len()
    }

    pub fn node_settings(&self) -> &[Box<dyn NodeSettings>] {
        &self.node_settings
    }

    pub fn settings(&self, index: NodeIndex) -> &dyn NodeSettings {
        self.node_settings[index.index()].as_ref()
    }

    pub fn instance_node_start_offsets(&self) -> &[usize] {
        &self.instance_node_start_offsets
    }

    pub fn instance_required_memory(&self) -> usize {
        self.instance_required_memory
    }

    pub fn instance_required_alignment(&self) -> usize {
        self.instance_required_alignment
    }

    /// Nodes initialized when the instance initializes and kept alive across
    /// state changes, in initialization order. Always ends with the root.
    pub fn persistent_node_indices(&self) -> &[NodeIndex] {
        &self.persistent_node_indices
    }

    pub fn root_node_index(&self) -> NodeIndex {
        self.root_node_index
    }

    /// Named control parameters and the value nodes they target.
    pub fn parameter_lookup(&self) -> &IndexMap<String, NodeIndex> {
        &self.parameter_lookup
    }

    pub fn parameter_node(&self, name: &str) -> Option<NodeIndex> {
        self.parameter_lookup.get(name).copied()
    }

    /// Re-checks the structural invariants the builder established. Cheap
    /// enough to run when loading a definition from external data.
    pub fn validate(&self) -> Result<(), GraphDefinitionError> {
        if self.node_settings.is_empty() {
            return Err(GraphDefinitionError::EmptyGraph);
        }
        if self.node_settings.len() != self.instance_node_start_offsets.len() {
            return Err(GraphDefinitionError::NodeTableSizeMismatch {
                settings: self.node_settings.len(),
                offsets: self.instance_node_start_offsets.len(),
            });
        }
        for (position, settings) in self.node_settings.iter().enumerate() {
            let node = NodeIndex(position as u32);
            if settings.node_index() != node {
                return Err(GraphDefinitionError::NodeIndexMismatch {
                    node,
                    reported: settings.node_index(),
                });
            }
            for dependency in settings.dependencies() {
                if dependency.index() >= position {
                    return Err(GraphDefinitionError::DependencyOrderViolation {
                        node,
                        dependency,
                    });
                }
            }
        }
        if self.root_node_index.index() >= self.node_settings.len() {
            return Err(GraphDefinitionError::NodeIndexOutOfRange(
                self.root_node_index,
            ));
        }
        if self.settings(self.root_node_index).value_kind() != GraphValueKind::Pose {
            return Err(GraphDefinitionError::RootNodeNotPose(self.root_node_index));
        }
        for &index in &self.persistent_node_indices {
            if index.index() >= self.node_settings.len() {
                return Err(GraphDefinitionError::NodeIndexOutOfRange(index));
            }
        }
        Ok(())
    }
}

/// Builds a [`GraphDefinition`] from node settings pushed in dependency
/// order, computing instance offsets and enforcing the structural
/// invariants.
#[derive(Debug, Default)]
pub struct GraphDefinitionBuilder {
    node_settings: Vec<Box<dyn NodeSettings>>,
    persistent_node_indices: Vec<NodeIndex>,
    root_node_index: Option<NodeIndex>,
    parameter_lookup: IndexMap<String, NodeIndex>,
}

impl GraphDefinitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_node(&mut self, settings: Box<dyn NodeSettings>) -> &mut Self {
        self.node_settings.push(settings);
        self
    }

    pub fn set_root(&mut self, index: NodeIndex) -> &mut Self {
        self.root_node_index = Some(index);
        self
    }

    /// Marks a node as persistent: initialized with the instance and kept
    /// alive until shutdown. Control parameter nodes must be persistent so
    /// externally staged values survive state changes.
    pub fn mark_persistent(&mut self, index: NodeIndex) -> &mut Self {
        self.persistent_node_indices.push(index);
        self
    }

    /// Exposes a value node under a name that [`set_bool_parameter`]-style
    /// calls on instances resolve.
    ///
    /// [`set_bool_parameter`]: super::graph_instance::GraphInstance::set_bool_parameter
    pub fn expose_parameter(&mut self, name: impl Into<String>, index: NodeIndex) -> &mut Self {
        self.parameter_lookup.insert(name.into(), index);
        self
    }

    pub fn build(self) -> Result<GraphDefinition, GraphDefinitionError> {
        if self.node_settings.is_empty() {
            return Err(GraphDefinitionError::EmptyGraph);
        }

        // Table position is identity; settings must agree, and dependencies
        // must be strictly earlier so instantiation and evaluation can walk
        // the table front to back.
        for (position, settings) in self.node_settings.iter().enumerate() {
            let node = NodeIndex(position as u32);
            if settings.node_index() != node {
                return Err(GraphDefinitionError::NodeIndexMismatch {
                    node,
                    reported: settings.node_index(),
                });
            }
            for dependency in settings.dependencies() {
                if dependency.index() >= position {
                    return Err(GraphDefinitionError::DependencyOrderViolation {
                        node,
                        dependency,
                    });
                }
            }
        }

        let root_node_index = self
            .root_node_index
            .ok_or(GraphDefinitionError::MissingRootNode)?;
        if root_node_index.index() >= self.node_settings.len() {
            return Err(GraphDefinitionError::NodeIndexOutOfRange(root_node_index));
        }
        if self.node_settings[root_node_index.index()].value_kind() != GraphValueKind::Pose {
            return Err(GraphDefinitionError::RootNodeNotPose(root_node_index));
        }

        let mut persistent_node_indices = self.persistent_node_indices;
        for (i, &index) in persistent_node_indices.iter().enumerate() {
            if index.index() >= self.node_settings.len() {
                return Err(GraphDefinitionError::NodeIndexOutOfRange(index));
            }
            if persistent_node_indices[..i].contains(&index) {
                return Err(GraphDefinitionError::DuplicatePersistentNode(index));
            }
        }
        // The root is always persistent, initialized after everything else.
        if !persistent_node_indices.contains(&root_node_index) {
            persistent_node_indices.push(root_node_index);
        }

        for (name, &index) in &self.parameter_lookup {
            if index.index() >= self.node_settings.len() {
                return Err(GraphDefinitionError::NodeIndexOutOfRange(index));
            }
            let kind = self.node_settings[index.index()].value_kind();
            if kind == GraphValueKind::Pose {
                return Err(GraphDefinitionError::InvalidParameterTarget {
                    name: name.clone(),
                    node: index,
                });
            }
        }

        // Pack node storage front to back, aligning each node's offset up to
        // its own requirement.
        let mut offsets = Vec::with_capacity(self.node_settings.len());
        let mut cursor = 0usize;
        let mut max_align = 1usize;
        for settings in &self.node_settings {
            let layout = settings.instance_layout();
            max_align = max_align.max(layout.align());
            cursor = cursor.next_multiple_of(layout.align());
            offsets.push(cursor);
            cursor += layout.size();
        }

        Ok(GraphDefinition {
            id: Uuid::new_v4(),
            node_settings: self.node_settings,
            instance_node_start_offsets: offsets,
            instance_required_memory: cursor,
            instance_required_alignment: max_align,
            persistent_node_indices,
            root_node_index,
            parameter_lookup: self.parameter_lookup,
        })
    }
}

/// A loaded graph asset: the shared definition plus the animation data it
/// samples from.
#[derive(Asset, TypePath, Debug)]
pub struct AnimationGraphAsset {
    pub definition: Arc<GraphDefinition>,
    pub data_set: Arc<GraphDataSet>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{
        clip_node::ClipNodeSettings,
        parameter_nodes::{ConstFloatNodeSettings, ControlParameterBoolNodeSettings},
    };
    use crate::core::data_set::ClipId;

    fn clip_settings(index: u32) -> Box<dyn NodeSettings> {
        Box::new(ClipNodeSettings {
            node_index: NodeIndex(index),
            clip: ClipId(0),
            looping: true,
            speed_scale: None,
        })
    }

    fn float_settings(index: u32, value: f32) -> Box<dyn NodeSettings> {
        Box::new(ConstFloatNodeSettings {
            node_index: NodeIndex(index),
            value,
        })
    }

    #[test]
    fn build_packs_offsets_in_table_order() {
        let mut builder = GraphDefinitionBuilder::new();
        builder
            .push_node(float_settings(0, 1.0))
            .push_node(clip_settings(1))
            .set_root(NodeIndex(1));
        let definition = builder.build().unwrap();

        let offsets = definition.instance_node_start_offsets();
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets[0], 0);
        assert!(offsets[1] >= definition.settings(NodeIndex(0)).instance_layout().size());
        assert!(
            definition.instance_required_memory()
                >= offsets[1] + definition.settings(NodeIndex(1)).instance_layout().size()
        );
        assert!(definition.instance_required_alignment().is_power_of_two());
        assert_eq!(definition.persistent_node_indices(), &[NodeIndex(1)]);
        definition.validate().unwrap();
    }

    #[test]
    fn mismatched_node_index_is_rejected() {
        let mut builder = GraphDefinitionBuilder::new();
        builder.push_node(clip_settings(5)).set_root(NodeIndex(0));
        assert!(matches!(
            builder.build(),
            Err(GraphDefinitionError::NodeIndexMismatch { .. })
        ));
    }

    #[test]
    fn forward_dependency_is_rejected() {
        let mut builder = GraphDefinitionBuilder::new();
        builder
            .push_node(Box::new(ClipNodeSettings {
                node_index: NodeIndex(0),
                clip: ClipId(0),
                looping: false,
                speed_scale: Some(crate::core::graph_node::FloatValueNodeHandle(NodeIndex(1))),
            }))
            .push_node(float_settings(1, 2.0))
            .set_root(NodeIndex(0));
        assert!(matches!(
            builder.build(),
            Err(GraphDefinitionError::DependencyOrderViolation { .. })
        ));
    }

    #[test]
    fn value_root_is_rejected() {
        let mut builder = GraphDefinitionBuilder::new();
        builder.push_node(float_settings(0, 0.0)).set_root(NodeIndex(0));
        assert!(matches!(
            builder.build(),
            Err(GraphDefinitionError::RootNodeNotPose(_))
        ));
    }

    #[test]
    fn duplicate_persistent_is_rejected() {
        let mut builder = GraphDefinitionBuilder::new();
        builder
            .push_node(clip_settings(0))
            .set_root(NodeIndex(0))
            .mark_persistent(NodeIndex(0))
            .mark_persistent(NodeIndex(0));
        assert!(matches!(
            builder.build(),
            Err(GraphDefinitionError::DuplicatePersistentNode(_))
        ));
    }

    #[test]
    fn pose_parameter_target_is_rejected() {
        let mut builder = GraphDefinitionBuilder::new();
        builder
            .push_node(clip_settings(0))
            .set_root(NodeIndex(0))
            .expose_parameter("speed", NodeIndex(0));
        assert!(matches!(
            builder.build(),
            Err(GraphDefinitionError::InvalidParameterTarget { .. })
        ));
    }

    #[test]
    fn bool_parameter_target_is_accepted() {
        let mut builder = GraphDefinitionBuilder::new();
        builder
            .push_node(Box::new(ControlParameterBoolNodeSettings {
                node_index: NodeIndex(0),
                initial_value: false,
            }))
            .push_node(clip_settings(1))
            .set_root(NodeIndex(1))
            .mark_persistent(NodeIndex(0))
            .expose_parameter("jump", NodeIndex(0));
        let definition = builder.build().unwrap();
        assert_eq!(definition.parameter_node("jump"), Some(NodeIndex(0)));
        assert_eq!(
            definition.persistent_node_indices(),
            &[NodeIndex(0), NodeIndex(1)]
        );
    }
}
