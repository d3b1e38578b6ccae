pub mod blend_node;
pub mod clip_node;
pub mod parameter_nodes;
pub mod state_condition_nodes;
pub mod state_machine_node;
pub mod state_node;
