//! Value nodes that feed externally controlled or constant values into the
//! graph. Control parameter nodes are the write surface gameplay code uses;
//! they must be marked persistent so staged values survive state changes.

use std::{alloc::Layout, ptr::NonNull};

use serde::{Deserialize, Serialize};

use crate::core::{
    arena::{emplace, relink},
    context::GraphContext,
    graph_definition::{InstantiationContext, InstantiationMode, NodeSettings},
    graph_node::{
        BoolValueNode, FloatValueNode, GraphNode, GraphNodes, GraphValueKind, NodeBase, NodeIndex,
        NodePtr,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ControlParameterBoolNodeSettings {
    pub node_index: NodeIndex,
    #[serde(default)]
    pub initial_value: bool,
}

impl NodeSettings for ControlParameterBoolNodeSettings {
    fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Bool
    }

    fn instance_layout(&self) -> Layout {
        Layout::new::<ControlParameterBoolNode>()
    }

    fn dependencies(&self) -> Vec<NodeIndex> {
        Vec::new()
    }

    fn type_tag(&self) -> &'static str {
        "control_parameter_bool"
    }

    unsafe fn instantiate(&self, at: NonNull<u8>, ctx: &InstantiationContext) -> NodePtr {
        if ctx.mode == InstantiationMode::NodeAlreadyCreated {
            return unsafe { relink::<ControlParameterBoolNode>(at) };
        }
        unsafe {
            emplace(
                at,
                ControlParameterBoolNode {
                    base: NodeBase::new(self.node_index),
                    value: self.initial_value,
                },
            )
        }
    }
}

pub struct ControlParameterBoolNode {
    base: NodeBase,
    value: bool,
}

impl ControlParameterBoolNode {
    pub fn set_value(&mut self, value: bool) {
        self.value = value;
    }

    /// The value the next query will observe.
    pub fn staged_value(&self) -> bool {
        self.value
    }
}

impl GraphNode for ControlParameterBoolNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Bool
    }

    fn initialize(&mut self, _ctx: &mut GraphContext, _nodes: &GraphNodes) {
        self.base.mark_initialized();
    }

    fn shutdown(&mut self, _ctx: &mut GraphContext, _nodes: &GraphNodes) {
        self.base.mark_shutdown();
    }

    fn as_bool_node(&mut self) -> Option<&mut dyn BoolValueNode> {
        Some(self)
    }
}

impl BoolValueNode for ControlParameterBoolNode {
    fn value(&mut self, ctx: &mut GraphContext, _nodes: &GraphNodes) -> bool {
        self.base.assert_initialized();
        self.base.mark_updated(ctx.update_id());
        self.value
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ControlParameterFloatNodeSettings {
    pub node_index: NodeIndex,
    #[serde(default)]
    pub initial_value: f32,
}

impl NodeSettings for ControlParameterFloatNodeSettings {
    fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Float
    }

    fn instance_layout(&self) -> Layout {
        Layout::new::<ControlParameterFloatNode>()
    }

    fn dependencies(&self) -> Vec<NodeIndex> {
        Vec::new()
    }

    fn type_tag(&self) -> &'static str {
        "control_parameter_float"
    }

    unsafe fn instantiate(&self, at: NonNull<u8>, ctx: &InstantiationContext) -> NodePtr {
        if ctx.mode == InstantiationMode::NodeAlreadyCreated {
            return unsafe { relink::<ControlParameterFloatNode>(at) };
        }
        unsafe {
            emplace(
                at,
                ControlParameterFloatNode {
                    base: NodeBase::new(self.node_index),
                    value: self.initial_value,
                },
            )
        }
    }
}

pub struct ControlParameterFloatNode {
    base: NodeBase,
    value: f32,
}

impl ControlParameterFloatNode {
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
    }

    pub fn staged_value(&self) -> f32 {
        self.value
    }
}

impl GraphNode for ControlParameterFloatNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Float
    }

    fn initialize(&mut self, _ctx: &mut GraphContext, _nodes: &GraphNodes) {
        self.base.mark_initialized();
    }

    fn shutdown(&mut self, _ctx: &mut GraphContext, _nodes: &GraphNodes) {
        self.base.mark_shutdown();
    }

    fn as_float_node(&mut self) -> Option<&mut dyn FloatValueNode> {
        Some(self)
    }
}

impl FloatValueNode for ControlParameterFloatNode {
    fn value(&mut self, ctx: &mut GraphContext, _nodes: &GraphNodes) -> f32 {
        self.base.assert_initialized();
        self.base.mark_updated(ctx.update_id());
        self.value
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConstBoolNodeSettings {
    pub node_index: NodeIndex,
    pub value: bool,
}

impl NodeSettings for ConstBoolNodeSettings {
    fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Bool
    }

    fn instance_layout(&self) -> Layout {
        Layout::new::<ConstBoolNode>()
    }

    fn dependencies(&self) -> Vec<NodeIndex> {
        Vec::new()
    }

    fn type_tag(&self) -> &'static str {
        "const_bool"
    }

    unsafe fn instantiate(&self, at: NonNull<u8>, ctx: &InstantiationContext) -> NodePtr {
        if ctx.mode == InstantiationMode::NodeAlreadyCreated {
            return unsafe { relink::<ConstBoolNode>(at) };
        }
        unsafe {
            emplace(
                at,
                ConstBoolNode {
                    base: NodeBase::new(self.node_index),
                    value: self.value,
                },
            )
        }
    }
}

pub struct ConstBoolNode {
    base: NodeBase,
    value: bool,
}

impl GraphNode for ConstBoolNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Bool
    }

    fn initialize(&mut self, _ctx: &mut GraphContext, _nodes: &GraphNodes) {
        self.base.mark_initialized();
    }

    fn shutdown(&mut self, _ctx: &mut GraphContext, _nodes: &GraphNodes) {
        self.base.mark_shutdown();
    }

    fn as_bool_node(&mut self) -> Option<&mut dyn BoolValueNode> {
        Some(self)
    }
}

impl BoolValueNode for ConstBoolNode {
    fn value(&mut self, ctx: &mut GraphContext, _nodes: &GraphNodes) -> bool {
        self.base.assert_initialized();
        self.base.mark_updated(ctx.update_id());
        self.value
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConstFloatNodeSettings {
    pub node_index: NodeIndex,
    pub value: f32,
}

impl NodeSettings for ConstFloatNodeSettings {
    fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Float
    }

    fn instance_layout(&self) -> Layout {
        Layout::new::<ConstFloatNode>()
    }

    fn dependencies(&self) -> Vec<NodeIndex> {
        Vec::new()
    }

    fn type_tag(&self) -> &'static str {
        "const_float"
    }

    unsafe fn instantiate(&self, at: NonNull<u8>, ctx: &InstantiationContext) -> NodePtr {
        if ctx.mode == InstantiationMode::NodeAlreadyCreated {
            return unsafe { relink::<ConstFloatNode>(at) };
        }
        unsafe {
            emplace(
                at,
                ConstFloatNode {
                    base: NodeBase::new(self.node_index),
                    value: self.value,
                },
            )
        }
    }
}

pub struct ConstFloatNode {
    base: NodeBase,
    value: f32,
}

impl GraphNode for ConstFloatNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn value_kind(&self) -> GraphValueKind {
        GraphValueKind::Float
    }

    fn initialize(&mut self, _ctx: &mut GraphContext, _nodes: &GraphNodes) {
        self.base.mark_initialized();
    }

    fn shutdown(&mut self, _ctx: &mut GraphContext, _nodes: &GraphNodes) {
        self.base.mark_shutdown();
    }

    fn as_float_node(&mut self) -> Option<&mut dyn FloatValueNode> {
        Some(self)
    }
}

impl FloatValueNode for ConstFloatNode {
    fn value(&mut self, ctx: &mut GraphContext, _nodes: &GraphNodes) -> f32 {
        self.base.assert_initialized();
        self.base.mark_updated(ctx.update_id());
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph_node::GraphNodes;

    #[test]
    fn control_parameter_reports_staged_value() {
        let mut node = ControlParameterFloatNode {
            base: NodeBase::new(NodeIndex(0)),
            value: 1.0,
        };
        let mut ctx = GraphContext::new();
        ctx.begin_update(0.016);
        let nodes = GraphNodes::new(&[]);

        node.initialize(&mut ctx, &nodes);
        assert_eq!(FloatValueNode::value(&mut node, &mut ctx, &nodes), 1.0);
        node.set_value(3.5);
        assert_eq!(FloatValueNode::value(&mut node, &mut ctx, &nodes), 3.5);
        node.shutdown(&mut ctx, &nodes);
    }

    #[test]
    #[should_panic(expected = "used before initialization")]
    fn querying_uninitialized_parameter_is_fatal() {
        let mut node = ControlParameterBoolNode {
            base: NodeBase::new(NodeIndex(0)),
            value: false,
        };
        let mut ctx = GraphContext::new();
        ctx.begin_update(0.016);
        let nodes = GraphNodes::new(&[]);
        BoolValueNode::value(&mut node, &mut ctx, &nodes);
    }
}
