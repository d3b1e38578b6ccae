use thiserror::Error;

use super::graph_node::NodeIndex;

/// Errors surfaced while building or validating a graph definition.
///
/// These cover malformed authored data. Contract violations on a live
/// instance (wrong lifecycle order, bad indices at evaluation time) are
/// programming errors and panic instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GraphDefinitionError {
    #[error("definition has {settings} node settings but {offsets} instance offsets")]
    NodeTableSizeMismatch { settings: usize, offsets: usize },
    #[error("node {node} depends on node {dependency}, which does not precede it")]
    DependencyOrderViolation {
        node: NodeIndex,
        dependency: NodeIndex,
    },
    #[error("node index {0} is out of range")]
    NodeIndexOutOfRange(NodeIndex),
    #[error("settings at table position {node} report node index {reported}")]
    NodeIndexMismatch { node: NodeIndex, reported: NodeIndex },
    #[error("root node {0} is not a pose node")]
    RootNodeNotPose(NodeIndex),
    #[error("parameter '{name}' targets node {node}, which is not a value node")]
    InvalidParameterTarget { name: String, node: NodeIndex },
    #[error("node {0} listed as persistent more than once")]
    DuplicatePersistentNode(NodeIndex),
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),
    #[error("failed to deserialize '{tag}' node settings: {source}")]
    NodePayload {
        tag: String,
        source: ron::error::SpannedError,
    },
    #[error("graph definition contains no nodes")]
    EmptyGraph,
    #[error("graph definition has no root node")]
    MissingRootNode,
}

/// Errors surfaced by the asset loader.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AssetLoaderError {
    #[error("could not read asset: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse asset: {0}")]
    RonSpannedError(#[from] ron::error::SpannedError),
    #[error("invalid graph definition: {0}")]
    Definition(#[from] GraphDefinitionError),
}
