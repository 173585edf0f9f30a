//! Error types for the mesh relay simulation core.
//!
//! Construction and submission APIs validate their input before touching any
//! shared state and report problems through `MeshError`. A route that cannot
//! be found is not an error: it is a normal outcome recorded on the message.

use crate::simulation::types::{MessageId, MessageStatus, NodeId};

/// Errors returned by the simulation core.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshError {
    /// A node id was referenced that is not part of the topology.
    UnknownNode(NodeId),
    /// A node id was added twice.
    DuplicateId(NodeId),
    /// A numeric or structural parameter was out of range.
    InvalidParameter(String),
    /// A lifecycle transition outside the allowed graph was attempted.
    InvalidTransition {
        message: MessageId,
        from: MessageStatus,
        to: MessageStatus,
    },
    /// A message id was referenced that the simulation does not know.
    UnknownMessage(MessageId),
}

impl std::fmt::Display for MeshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeshError::UnknownNode(id) => write!(f, "Unknown node: {}", id),
            MeshError::DuplicateId(id) => write!(f, "Duplicate node id: {}", id),
            MeshError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            MeshError::InvalidTransition { message, from, to } => {
                write!(f, "Message {} cannot move from {} to {}", message, from, to)
            }
            MeshError::UnknownMessage(id) => write!(f, "Unknown message: {}", id),
        }
    }
}

impl std::error::Error for MeshError {}

/// Convenience alias for results produced by the core.
pub type MeshResult<T> = Result<T, MeshError>;
