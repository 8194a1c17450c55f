//! # BlockCanvas
//!
//! `block_canvas` is the headless core of a block-based visual programming editor.
//! It owns the program graph (blocks joined through typed connections), the spatial
//! index used to find snap targets while a block is dragged, and the graph surgery
//! (connect, splice, bump, extract) performed on drop. Rendering and gesture
//! recognition are left to the host application.
//!
//! ## Core Architecture
//! - **Model (`src/model.rs`)**: Blocks, inputs and connections in flat arenas (SlotMap).
//! - **Factory (`src/factory.rs`)**: Block templates, built by hand or from definition JSON.
//! - **Connection Index (`src/connection_manager.rs`)**: Y-sorted buckets and snap search.
//! - **Controller (`src/controller.rs`, `src/dragger.rs`)**: The only writer of the workspace.
//! - **Stats (`src/stats.rs`, `src/procedures.rs`)**: Variable and procedure bookkeeping.

pub mod config;
pub mod connection_manager;
pub mod controller;
pub mod dragger;
pub mod error;
pub mod factory;
pub mod field;
pub mod model;
pub mod names;
pub mod persistence;
pub mod procedures;
pub mod stats;
pub mod workspace;

// Re-exports for convenience
pub use config::{LayoutMetrics, WorkspaceConfig};
pub use connection_manager::{ConnectionManager, RejectReason, YSortedList};
pub use controller::{BlocklyController, WorkspaceEvent};
pub use dragger::DragState;
pub use error::{BlockError, ProcedureError, Result};
pub use factory::{BlockFactory, BlockTemplate, InputTemplate};
pub use field::{Field, FieldKind};
pub use model::{Block, BlockFlags, BlockGraph, BlockId, Connection, ConnectionId, ConnectionType, InputKind};
pub use persistence::{SavedBlock, SavedInput, SavedWorkspace};
pub use procedures::ProcedureManager;
pub use stats::WorkspaceStats;
pub use workspace::Workspace;
