//! # Configuration
//!
//! This module defines the configuration struct for the block workspace.

use serde::{Deserialize, Serialize};

/// Configuration parameters for the workspace.
///
/// These settings allow the host application to tune how eagerly blocks snap together.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Maximum distance (workspace units) between two connections for them to snap.
    /// Also the minimum separation applied to a bumped block. Default: 48.0.
    pub snap_radius: f32,
    /// Default geometry used to place connections before a renderer measures blocks.
    #[serde(default)]
    pub layout: LayoutMetrics,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            snap_radius: 48.0,
            layout: LayoutMetrics::default(),
        }
    }
}

/// Default block geometry.
///
/// A renderer that measures real block shapes should push its own offsets through
/// `BlocklyController::set_connection_offsets` instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayoutMetrics {
    /// Height of a single input row.
    pub row_height: f32,
    /// Horizontal position of value input connectors.
    pub block_width: f32,
    /// Horizontal indent of statement input connectors.
    pub statement_indent: f32,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            row_height: 40.0,
            block_width: 120.0,
            statement_indent: 24.0,
        }
    }
}
