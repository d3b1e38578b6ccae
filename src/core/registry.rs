use bevy::platform::collections::HashMap;
use ron::value::RawValue;
use serde::de::DeserializeOwned;

use super::{errors::GraphDefinitionError, graph_definition::NodeSettings};

type SettingsDeserializer =
    Box<dyn Fn(&RawValue) -> Result<Box<dyn NodeSettings>, ron::error::SpannedError> + Send + Sync>;

/// Lookup table from stable node-type tags to settings deserializers.
///
/// Node types are registered explicitly at startup; serialized graphs name
/// each node's type by tag and carry its settings as an opaque payload that
/// the registered deserializer turns into typed settings.
#[derive(Default)]
pub struct NodeTypeRegistry {
    deserializers: HashMap<String, SettingsDeserializer>,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every node type this crate ships.
    pub fn with_builtin_nodes() -> Self {
        use crate::nodes::{
            blend_node::BlendNodeSettings,
            clip_node::ClipNodeSettings,
            parameter_nodes::{
                ConstBoolNodeSettings, ConstFloatNodeSettings, ControlParameterBoolNodeSettings,
                ControlParameterFloatNodeSettings,
            },
            state_condition_nodes::{
                StateCompletedConditionNodeSettings, TimeConditionNodeSettings,
            },
            state_machine_node::StateMachineNodeSettings,
            state_node::StateNodeSettings,
        };

        let mut registry = Self::new();
        registry.register::<ClipNodeSettings>("clip");
        registry.register::<BlendNodeSettings>("blend");
        registry.register::<StateNodeSettings>("state");
        registry.register::<StateMachineNodeSettings>("state_machine");
        registry.register::<StateCompletedConditionNodeSettings>("state_completed_condition");
        registry.register::<TimeConditionNodeSettings>("time_condition");
        registry.register::<ControlParameterBoolNodeSettings>("control_parameter_bool");
        registry.register::<ControlParameterFloatNodeSettings>("control_parameter_float");
        registry.register::<ConstBoolNodeSettings>("const_bool");
        registry.register::<ConstFloatNodeSettings>("const_float");
        registry
    }

    pub fn register<T: NodeSettings + DeserializeOwned>(&mut self, tag: &str) {
        self.deserializers.insert(
            tag.to_string(),
            Box::new(|raw| {
                ron::de::from_str::<T>(raw.get_ron())
                    .map(|settings| Box::new(settings) as Box<dyn NodeSettings>)
            }),
        );
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.deserializers.contains_key(tag)
    }

    pub fn deserialize(
        &self,
        tag: &str,
        payload: &RawValue,
    ) -> Result<Box<dyn NodeSettings>, GraphDefinitionError> {
        let deserializer = self
            .deserializers
            .get(tag)
            .ok_or_else(|| GraphDefinitionError::UnknownNodeType(tag.to_string()))?;
        deserializer(payload).map_err(|source| GraphDefinitionError::NodePayload {
            tag: tag.to_string(),
            source,
        })
    }
}
