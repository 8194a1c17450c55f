use crate::connection_manager::RejectReason;
use crate::model::{BlockId, ConnectionId};
use thiserror::Error;

/// Errors raised by the block graph, the factory and the controller.
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("No block definition registered for type '{0}'")]
    UnknownBlockType(String),

    #[error("Unknown field type '{0}'")]
    UnknownFieldType(String),

    #[error("Malformed definition for block '{block_type}': {message}")]
    MalformedDefinition { block_type: String, message: String },

    #[error("Block {0:?} does not exist in this workspace")]
    UnknownBlock(BlockId),

    #[error("Block {0:?} is not part of the workspace")]
    NotInWorkspace(BlockId),

    #[error("Connection {0:?} does not exist in this workspace")]
    UnknownConnection(ConnectionId),

    #[error("Connection {source_conn:?} cannot connect to {target:?}: {reason}")]
    IllegalConnection {
        source_conn: ConnectionId,
        target: ConnectionId,
        reason: RejectReason,
    },

    #[error("Block {0:?} (or one of its children) cannot be deleted")]
    NotDeletable(BlockId),

    #[error("Block {0:?} cannot be moved")]
    NotMovable(BlockId),

    #[error("Block {0:?} is already a root block")]
    AlreadyRoot(BlockId),

    #[error("Block {0:?} is attached to a parent block")]
    NotRoot(BlockId),

    #[error("A drag is already in progress for block {0:?}")]
    DragInProgress(BlockId),

    #[error("Block {0:?} is not being dragged")]
    NotDragging(BlockId),

    #[error("Block '{block_type}' has no input named '{input}'")]
    UnknownInput { block_type: String, input: String },

    #[error("Saved block '{block_type}' cannot be restored: {message}")]
    InvalidSavedBlock { block_type: String, message: String },

    #[error(transparent)]
    Procedure(#[from] ProcedureError),

    #[error("Failed to parse block definitions: {0}")]
    Json(#[from] serde_json::Error),
}

/// Consistency errors at the procedure bookkeeping boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcedureError {
    #[error("Procedure block '{block_type}' has no '{field}' name field")]
    MissingNameField { block_type: String, field: String },

    #[error("Block {0:?} is already registered as a procedure definition")]
    AlreadyRegistered(BlockId),

    #[error("No procedure definition named '{0}'")]
    NoSuchDefinition(String),

    #[error("Block {0:?} is not a registered procedure definition")]
    DefinitionNotRegistered(BlockId),

    #[error("Block {0:?} is not a registered procedure reference")]
    ReferenceNotRegistered(BlockId),
}

pub type Result<T, E = BlockError> = std::result::Result<T, E>;
