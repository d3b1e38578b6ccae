use std::{any::Any, fmt, ptr::NonNull};

use bevy::{reflect::Reflect, transform::prelude::Transform};
use serde::{Deserialize, Serialize};

use super::{
    context::GraphContext,
    pose::Pose,
    sync_track::{PlaybackTime, SampledEvent, SyncTrack},
};

/// Index of a node within its graph definition's node table.
///
/// Node identity is index-based: settings, handles and serialized assets all
/// refer to nodes by their table position, never by pointer.
#[derive(
    Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of value a node produces when evaluated.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphValueKind {
    Bool,
    Float,
    Pose,
}

/// Upcast to [`Any`] so callers can downcast trait objects to concrete node
/// types. Blanket-implemented for every sized node type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Lifecycle and memoization state embedded in every node.
#[derive(Debug, Clone)]
pub struct NodeBase {
    index: NodeIndex,
    initialized: bool,
    persistent: bool,
    last_update_id: Option<u64>,
}

impl NodeBase {
    pub fn new(index: NodeIndex) -> Self {
        Self {
            index,
            initialized: false,
            persistent: false,
            last_update_id: None,
        }
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Persistent nodes are initialized and shut down by the owning
    /// instance, never by parent nodes that merely reference them.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub(crate) fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
    }

    pub fn mark_initialized(&mut self) {
        assert!(
            !self.initialized,
            "node {} initialized twice without an intervening shutdown",
            self.index
        );
        self.initialized = true;
        self.last_update_id = None;
    }

    pub fn mark_shutdown(&mut self) {
        assert!(
            self.initialized,
            "node {} shut down while not initialized",
            self.index
        );
        self.initialized = false;
    }

    pub fn assert_initialized(&self) {
        assert!(
            self.initialized,
            "node {} used before initialization",
            self.index
        );
    }

    /// Whether the node already produced a result during the given update.
    pub fn was_updated_this_tick(&self, update_id: u64) -> bool {
        self.last_update_id == Some(update_id)
    }

    pub fn mark_updated(&mut self, update_id: u64) {
        self.last_update_id = Some(update_id);
    }
}

/// Result of updating a pose node for one tick.
#[derive(Debug, Clone)]
pub struct PoseResult {
    pub pose: Pose,
    pub root_motion_delta: Transform,
    pub events: Vec<SampledEvent>,
}

impl PoseResult {
    pub fn new(pose: Pose) -> Self {
        Self {
            pose,
            root_motion_delta: Transform::IDENTITY,
            events: Vec::new(),
        }
    }

    /// Blends two results: poses linearly, root-motion deltas by lerping the
    /// translation and slerping the rotation, and events by scaling each
    /// side's weights by its share of the blend.
    pub fn blend_linear(a: &Self, b: &Self, weight: f32) -> Self {
        let pose = Pose::blend_linear(&a.pose, &b.pose, weight);
        let mut rotation_b = b.root_motion_delta.rotation;
        // Choose the smallest angle for the rotation
        if rotation_b.dot(a.root_motion_delta.rotation) < 0.0 {
            rotation_b = -rotation_b;
        }
        let root_motion_delta = Transform {
            translation: a
                .root_motion_delta
                .translation
                .lerp(b.root_motion_delta.translation, weight),
            rotation: a.root_motion_delta.rotation.slerp(rotation_b, weight),
            scale: a
                .root_motion_delta
                .scale
                .lerp(b.root_motion_delta.scale, weight),
        };
        let mut events = Vec::with_capacity(a.events.len() + b.events.len());
        events.extend(a.events.iter().map(|e| e.clone().scaled(1.0 - weight)));
        events.extend(b.events.iter().map(|e| e.clone().scaled(weight)));
        Self {
            pose,
            root_motion_delta,
            events,
        }
    }
}

/// A live node inside a graph instance.
///
/// Nodes are constructed in place inside the instance arena and referenced by
/// index from then on. The lifecycle contract is initialize, any number of
/// updates, shutdown. Violations are programming errors and abort the
/// process rather than returning errors.
pub trait GraphNode: AsAny + Send + Sync {
    fn base(&self) -> &NodeBase;
    fn base_mut(&mut self) -> &mut NodeBase;

    fn value_kind(&self) -> GraphValueKind;

    fn initialize(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes);
    fn shutdown(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes);

    fn as_pose_node(&mut self) -> Option<&mut dyn PoseNode> {
        None
    }

    fn as_bool_node(&mut self) -> Option<&mut dyn BoolValueNode> {
        None
    }

    fn as_float_node(&mut self) -> Option<&mut dyn FloatValueNode> {
        None
    }
}

/// A node that produces a pose and advances an internal playback time.
pub trait PoseNode: GraphNode {
    /// Advances by the context's delta time and samples.
    fn update(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) -> PoseResult;

    /// Jumps to an externally supplied time instead of advancing freely.
    /// Used by synchronized blends and transitions.
    fn update_with_time(
        &mut self,
        ctx: &mut GraphContext,
        nodes: &GraphNodes,
        time: PlaybackTime,
    ) -> PoseResult;

    fn current_time(&self) -> PlaybackTime;
    fn previous_time(&self) -> PlaybackTime;

    /// Duration of one playthrough in seconds. Zero for static poses.
    fn duration(&self) -> f32;

    fn sync_track(&self) -> &SyncTrack;

    #[cfg(debug_assertions)]
    fn debug_draw(
        &self,
        _character_transform: Transform,
        _gizmos: &mut super::debug_draw::DeferredGizmos,
    ) {
    }
}

/// A node producing a boolean, memoized per update id.
pub trait BoolValueNode: GraphNode {
    fn value(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) -> bool;
}

/// A node producing a float, memoized per update id.
pub trait FloatValueNode: GraphNode {
    fn value(&mut self, ctx: &mut GraphContext, nodes: &GraphNodes) -> f32;
}

/// Pointer to a node constructed inside an instance arena.
#[derive(Clone, Copy)]
pub struct NodePtr(pub(crate) NonNull<dyn GraphNode>);

impl NodePtr {
    /// # Safety
    /// `ptr` must point to a live node that outlives this handle.
    pub(crate) unsafe fn new(ptr: NonNull<dyn GraphNode>) -> Self {
        Self(ptr)
    }
}

/// View over an instance's node table that hands out node references by
/// index.
///
/// Handing out `&mut` from `&self` is sound here because every node occupies
/// a disjoint arena region and definitions are validated acyclic with
/// child-before-parent ordering, so an evaluation never reaches the same
/// index twice on one call path.
pub struct GraphNodes<'a> {
    nodes: &'a [NodePtr],
}

impl<'a> GraphNodes<'a> {
    pub(crate) fn new(nodes: &'a [NodePtr]) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[allow(clippy::mut_from_ref)]
    pub fn node_mut(&self, index: NodeIndex) -> &'a mut dyn GraphNode {
        assert!(
            index.index() < self.nodes.len(),
            "node index {} out of range for instance with {} nodes",
            index,
            self.nodes.len()
        );
        unsafe { &mut *self.nodes[index.index()].0.as_ptr() }
    }

    pub fn pose_node_mut(&self, index: NodeIndex) -> &'a mut dyn PoseNode {
        match self.node_mut(index).as_pose_node() {
            Some(node) => node,
            None => panic!("node {index} is not a pose node"),
        }
    }

    pub fn bool_node_mut(&self, index: NodeIndex) -> &'a mut dyn BoolValueNode {
        match self.node_mut(index).as_bool_node() {
            Some(node) => node,
            None => panic!("node {index} is not a bool value node"),
        }
    }

    pub fn float_node_mut(&self, index: NodeIndex) -> &'a mut dyn FloatValueNode {
        match self.node_mut(index).as_float_node() {
            Some(node) => node,
            None => panic!("node {index} is not a float value node"),
        }
    }
}

/// Typed handle to a pose node, resolved against a [`GraphNodes`] view at
/// call time.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoseNodeHandle(pub NodeIndex);

impl PoseNodeHandle {
    pub fn index(&self) -> NodeIndex {
        self.0
    }

    /// Initializes the child unless a previous parent (or the instance, for
    /// persistent nodes) already did.
    pub fn initialize(&self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        let node = nodes.pose_node_mut(self.0);
        if !node.base().is_initialized() {
            node.initialize(ctx, nodes);
        }
    }

    /// Shuts the child down unless it is persistent (owned by the instance)
    /// or was already shut down through another parent.
    pub fn shutdown(&self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        let node = nodes.pose_node_mut(self.0);
        if node.base().is_initialized() && !node.base().is_persistent() {
            node.shutdown(ctx, nodes);
        }
    }

    pub fn update(&self, ctx: &mut GraphContext, nodes: &GraphNodes) -> PoseResult {
        nodes.pose_node_mut(self.0).update(ctx, nodes)
    }

    pub fn update_with_time(
        &self,
        ctx: &mut GraphContext,
        nodes: &GraphNodes,
        time: PlaybackTime,
    ) -> PoseResult {
        nodes.pose_node_mut(self.0).update_with_time(ctx, nodes, time)
    }

    pub fn current_time(&self, nodes: &GraphNodes) -> PlaybackTime {
        nodes.pose_node_mut(self.0).current_time()
    }

    pub fn previous_time(&self, nodes: &GraphNodes) -> PlaybackTime {
        nodes.pose_node_mut(self.0).previous_time()
    }

    pub fn duration(&self, nodes: &GraphNodes) -> f32 {
        nodes.pose_node_mut(self.0).duration()
    }

    pub fn sync_track<'a>(&self, nodes: &GraphNodes<'a>) -> &'a SyncTrack {
        nodes.pose_node_mut(self.0).sync_track()
    }
}

/// Typed handle to a bool value node.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoolValueNodeHandle(pub NodeIndex);

impl BoolValueNodeHandle {
    pub fn index(&self) -> NodeIndex {
        self.0
    }

    pub fn initialize(&self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        let node = nodes.bool_node_mut(self.0);
        if !node.base().is_initialized() {
            node.initialize(ctx, nodes);
        }
    }

    pub fn shutdown(&self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        let node = nodes.bool_node_mut(self.0);
        if node.base().is_initialized() && !node.base().is_persistent() {
            node.shutdown(ctx, nodes);
        }
    }

    pub fn value(&self, ctx: &mut GraphContext, nodes: &GraphNodes) -> bool {
        nodes.bool_node_mut(self.0).value(ctx, nodes)
    }
}

/// Typed handle to a float value node.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatValueNodeHandle(pub NodeIndex);

impl FloatValueNodeHandle {
    pub fn index(&self) -> NodeIndex {
        self.0
    }

    pub fn initialize(&self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        let node = nodes.float_node_mut(self.0);
        if !node.base().is_initialized() {
            node.initialize(ctx, nodes);
        }
    }

    pub fn shutdown(&self, ctx: &mut GraphContext, nodes: &GraphNodes) {
        let node = nodes.float_node_mut(self.0);
        if node.base().is_initialized() && !node.base().is_persistent() {
            node.shutdown(ctx, nodes);
        }
    }

    pub fn value(&self, ctx: &mut GraphContext, nodes: &GraphNodes) -> f32 {
        nodes.float_node_mut(self.0).value(ctx, nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Quat;

    #[test]
    fn root_motion_blend_takes_the_short_rotation_path() {
        let bone = Pose {
            bones: vec![Transform::IDENTITY],
        };
        let a = PoseResult::new(bone.clone());
        let mut b = PoseResult::new(bone);
        // Negated quaternion: same rotation, opposite hemisphere.
        b.root_motion_delta =
            Transform::from_rotation(-Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));

        let blended = PoseResult::blend_linear(&a, &b, 0.5);
        let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        assert!(blended.root_motion_delta.rotation.angle_between(expected) < 1e-4);
    }

    #[test]
    fn base_tracks_memoization_per_update() {
        let mut base = NodeBase::new(NodeIndex(0));
        base.mark_initialized();
        assert!(!base.was_updated_this_tick(1));
        base.mark_updated(1);
        assert!(base.was_updated_this_tick(1));
        assert!(!base.was_updated_this_tick(2));
    }

    #[test]
    #[should_panic(expected = "initialized twice")]
    fn double_initialize_is_fatal() {
        let mut base = NodeBase::new(NodeIndex(7));
        base.mark_initialized();
        base.mark_initialized();
    }

    #[test]
    #[should_panic(expected = "used before initialization")]
    fn use_before_initialize_is_fatal() {
        NodeBase::new(NodeIndex(2)).assert_initialized();
    }

    #[test]
    #[should_panic(expected = "shut down while not initialized")]
    fn shutdown_without_initialize_is_fatal() {
        NodeBase::new(NodeIndex(2)).mark_shutdown();
    }

    #[test]
    fn shutdown_allows_reinitialization() {
        let mut base = NodeBase::new(NodeIndex(0));
        base.mark_initialized();
        base.mark_shutdown();
        base.mark_initialized();
        assert!(base.is_initialized());
    }
}
