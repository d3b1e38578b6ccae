use bevy::{asset::prelude::*, ecs::prelude::*};

use super::{
    context::GraphContext,
    graph_definition::AnimationGraphAsset,
    graph_instance::GraphInstance,
    graph_node::PoseResult,
};
#[cfg(debug_assertions)]
use super::debug_draw::DeferredGizmos;

/// Animation controls
///
/// Owns a graph instance created lazily once the referenced asset is loaded,
/// and drives its update every frame. Parameter writes are staged on the
/// player and applied to the instance at the start of the next update, so
/// gameplay code can write them at any point in the frame.
#[derive(Component)]
pub struct GraphPlayer {
    pub(crate) paused: bool,
    pub(crate) graph: Option<Handle<AnimationGraphAsset>>,
    pub(crate) instance: Option<GraphInstance>,
    pub(crate) context: GraphContext,
    #[cfg(debug_assertions)]
    pub(crate) deferred_gizmos: DeferredGizmos,

    staged_bool_parameters: Vec<(String, bool)>,
    staged_float_parameters: Vec<(String, f32)>,
    pending_reset: bool,
    last_result: Option<PoseResult>,
}

impl Default for GraphPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphPlayer {
    /// Create a new graph player, with no graph playing
    pub fn new() -> Self {
        Self {
            paused: false,
            graph: None,
            instance: None,
            context: GraphContext::default(),
            #[cfg(debug_assertions)]
            deferred_gizmos: DeferredGizmos::default(),
            staged_bool_parameters: Vec::new(),
            staged_float_parameters: Vec::new(),
            pending_reset: false,
            last_result: None,
        }
    }

    /// Set the graph asset to play
    pub fn with_graph(mut self, graph: Handle<AnimationGraphAsset>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Start playing a graph, discarding any running instance.
    pub fn start(&mut self, graph: Handle<AnimationGraphAsset>) -> &mut Self {
        self.teardown_instance();
        self.graph = Some(graph);
        self.paused = false;
        self
    }

    /// Stage a bool parameter write for the next update.
    pub fn set_bool_parameter(&mut self, name: impl Into<String>, value: bool) -> &mut Self {
        self.staged_bool_parameters.push((name.into(), value));
        self
    }

    /// Stage a float parameter write for the next update.
    pub fn set_float_parameter(&mut self, name: impl Into<String>, value: f32) -> &mut Self {
        self.staged_float_parameters.push((name.into(), value));
        self
    }

    /// Restart the graph from time zero on the next update. Parameters keep
    /// their values.
    pub fn reset(&mut self) -> &mut Self {
        self.pending_reset = true;
        self
    }

    pub fn pause(&mut self) -> &mut Self {
        self.paused = true;
        self
    }

    pub fn resume(&mut self) -> &mut Self {
        self.paused = false;
        self
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn context(&self) -> &GraphContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut GraphContext {
        &mut self.context
    }

    pub fn instance(&self) -> Option<&GraphInstance> {
        self.instance.as_ref()
    }

    /// Result of the most recent update, if the instance has run.
    pub fn last_result(&self) -> Option<&PoseResult> {
        self.last_result.as_ref()
    }

    /// Advances the playing graph by `delta_time` seconds.
    ///
    /// Creates and initializes the instance on the first call after the
    /// asset is available. Does nothing while paused or while the asset is
    /// still loading.
    pub fn update(&mut self, delta_time: f32, graphs: &Assets<AnimationGraphAsset>) {
        if self.instance.is_none() {
            let Some(handle) = &self.graph else {
                return;
            };
            let Some(asset) = graphs.get(handle) else {
                return;
            };
            let mut instance =
                GraphInstance::new(asset.definition.clone(), asset.data_set.clone());
            instance.initialize(&mut self.context);
            self.instance = Some(instance);
        }
        let Some(instance) = self.instance.as_mut() else {
            return;
        };

        for (name, value) in self.staged_bool_parameters.drain(..) {
            instance.set_bool_parameter(&name, value);
        }
        for (name, value) in self.staged_float_parameters.drain(..) {
            instance.set_float_parameter(&name, value);
        }

        if self.pending_reset {
            instance.reset(&mut self.context);
            self.pending_reset = false;
        }

        if self.paused {
            return;
        }

        self.context.begin_update(delta_time);
        self.last_result = Some(instance.update_graph(&mut self.context));
    }

    /// Queues debug geometry for the running instance.
    #[cfg(debug_assertions)]
    pub fn draw_debug(&mut self, character_transform: bevy::transform::prelude::Transform) {
        if let Some(instance) = &self.instance {
            instance.draw_debug(character_transform, &mut self.deferred_gizmos);
        }
    }

    fn teardown_instance(&mut self) {
        if let Some(mut instance) = self.instance.take() {
            if instance.is_initialized() {
                instance.shutdown(&mut self.context);
            }
        }
        self.last_result = None;
    }
}

impl Drop for GraphPlayer {
    fn drop(&mut self) {
        self.teardown_instance();
    }
}
