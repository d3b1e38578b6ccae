pub mod animation_clip;
pub mod arena;
pub mod context;
pub mod data_set;
pub mod debug_draw;
pub mod errors;
pub mod graph_definition;
pub mod graph_instance;
pub mod graph_node;
pub mod loader;
pub mod physics;
pub mod player;
pub mod plugin;
pub mod pose;
pub mod registry;
pub mod root_motion;
pub mod serial;
pub mod skeleton;
pub mod sync_track;
pub mod systems;
