use std::sync::Arc;

use bevy::asset::{AssetLoader, LoadContext, io::Reader};
use bevy::reflect::TypePath;

use super::{
    errors::AssetLoaderError, graph_definition::AnimationGraphAsset, registry::NodeTypeRegistry,
    serial::GraphDefinitionSerial,
};

/// Loads `.animgraph.ron` files into [`AnimationGraphAsset`]s.
#[derive(TypePath)]
pub struct AnimationGraphAssetLoader {
    registry: Arc<NodeTypeRegistry>,
}

impl AnimationGraphAssetLoader {
    pub fn new(registry: Arc<NodeTypeRegistry>) -> Self {
        Self { registry }
    }
}

impl Default for AnimationGraphAssetLoader {
    fn default() -> Self {
        Self::new(Arc::new(NodeTypeRegistry::with_builtin_nodes()))
    }
}

impl AssetLoader for AnimationGraphAssetLoader {
    type Asset = AnimationGraphAsset;
    type Settings = ();
    type Error = AssetLoaderError;

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &Self::Settings,
        _load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = vec![];
        reader.read_to_end(&mut bytes).await?;
        let serial: GraphDefinitionSerial = ron::de::from_bytes(&bytes)?;
        let (definition, data_set) = serial.into_definition(&self.registry)?;
        definition.validate()?;

        Ok(AnimationGraphAsset {
            definition: Arc::new(definition),
            data_set: Arc::new(data_set),
        })
    }

    fn extensions(&self) -> &[&str] {
        &["animgraph.ron"]
    }
}
