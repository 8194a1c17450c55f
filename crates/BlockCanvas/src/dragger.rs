//! # Dragger
//!
//! Drag gestures on top of the controller. While a block is dragged every
//! connection in its tree is in drag mode: it follows the pointer but is taken out
//! of the connection index, so the dragged tree never snaps to itself. The drop
//! commits at most one connect.

use crate::controller::BlocklyController;
use crate::error::{BlockError, Result};
use crate::model::{BlockId, ConnectionId};
use glam::Vec2;

/// Where the current gesture is.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        block: BlockId,
        /// Position before the drag, restored on cancel.
        start_position: Vec2,
        /// The parent connection the block was extracted from.
        origin: Option<ConnectionId>,
        /// Every connection of the dragged tree, in drag mode.
        connections: Vec<ConnectionId>,
    },
}

impl BlocklyController {
    /// The block currently being dragged.
    pub fn dragged_block(&self) -> Option<BlockId> {
        match &self.drag {
            DragState::Dragging { block, .. } => Some(*block),
            DragState::Idle => None,
        }
    }

    pub fn drag_state(&self) -> &DragState {
        &self.drag
    }

    /// Starts dragging `block`. A block attached to a parent is extracted first;
    /// its children come along.
    pub fn drag_start(&mut self, block: BlockId) -> Result<()> {
        if let Some(current) = self.dragged_block() {
            return Err(BlockError::DragInProgress(current));
        }
        let graph = &self.workspace.graph;
        let b = graph.try_block(block)?;
        if !b.is_movable() {
            return Err(BlockError::NotMovable(block));
        }
        if !self.workspace.contains(block) {
            return Err(BlockError::NotInWorkspace(block));
        }
        let start_position = b.position();
        let origin = graph
            .parent_connection(block)
            .and_then(|link| graph.connections[link].target());

        self.extract_block_as_root(block)?;

        let ws = &mut self.workspace;
        let connections = ws.graph.all_connections_recursive(block);
        for &conn in &connections {
            ws.connections.remove_connection(&ws.graph, conn);
            ws.graph.set_drag_mode(conn, true);
        }

        tracing::debug!(block = ?block, connections = connections.len(), "Drag started");
        self.drag = DragState::Dragging {
            block,
            start_position,
            origin,
            connections,
        };
        Ok(())
    }

    fn ensure_dragging(&self, block: BlockId) -> Result<()> {
        match self.dragged_block() {
            Some(current) if current == block => Ok(()),
            _ => Err(BlockError::NotDragging(block)),
        }
    }

    /// Moves the dragged tree and returns the connection pair a drop here would
    /// join, as `(dragged, target)`.
    pub fn drag_move(&mut self, block: BlockId, position: Vec2) -> Result<Option<(ConnectionId, ConnectionId)>> {
        self.ensure_dragging(block)?;
        self.layout_from(block, position);
        Ok(self.find_best_connection(block))
    }

    /// Drops the dragged block, connecting it to the best candidate in range.
    /// Returns the pair that was connected, if any.
    pub fn drag_end(&mut self, block: BlockId) -> Result<Option<(ConnectionId, ConnectionId)>> {
        self.ensure_dragging(block)?;
        let best = self.find_best_connection(block);
        self.finish_drag();

        if let Some((dragged, target)) = best {
            self.connect(dragged, target)?;
        }
        tracing::debug!(block = ?block, connected = best.is_some(), "Drag ended");
        Ok(best)
    }

    /// Aborts the current drag. The block goes back to where it started and, if it
    /// was extracted from a parent that is still free, back under that parent.
    /// Returns false when nothing was being dragged.
    pub fn cancel_drag(&mut self) -> bool {
        let DragState::Dragging {
            block,
            start_position,
            origin,
            ..
        } = self.drag.clone()
        else {
            return false;
        };

        self.layout_from(block, start_position);
        self.finish_drag();

        let graph = &self.workspace.graph;
        let link = graph.block(block).and_then(|b| b.parent_link());
        if let (Some(link), Some(origin)) = (link, origin) {
            if graph.connection(origin).is_some_and(|c| !c.is_connected()) {
                if let Err(err) = self.connect(link, origin) {
                    tracing::warn!(block = ?block, error = %err, "Could not restore dragged block");
                }
            } else {
                tracing::warn!(block = ?block, "Drag origin is no longer free; block stays a root");
            }
        }
        tracing::debug!(block = ?block, "Drag cancelled");
        true
    }

    /// Clears drag mode and puts the dragged connections back in the index.
    fn finish_drag(&mut self) {
        let DragState::Dragging { connections, .. } = std::mem::take(&mut self.drag) else {
            return;
        };
        let ws = &mut self.workspace;
        for conn in connections {
            ws.graph.set_drag_mode(conn, false);
            ws.connections.add_connection(&ws.graph, conn);
        }
    }

    /// Best snap for the dragged tree.
    ///
    /// The primary connector (previous or output) wins whenever it has a match.
    /// Otherwise the free connectors are tried: inputs, the block's own next, and
    /// the next of the last block in its stack. The closest match wins.
    pub fn find_best_connection(&self, block: BlockId) -> Option<(ConnectionId, ConnectionId)> {
        let graph = &self.workspace.graph;
        let index = &self.workspace.connections;
        let radius = self.config.snap_radius;
        let b = graph.block(block)?;

        if let Some(link) = b.parent_link()
            && let Some(target) = index.closest_connection(graph, link, radius)
        {
            return Some((link, target));
        }

        let last = graph.last_block_in_sequence(block);
        let mut connectors: Vec<ConnectionId> = b.inputs.iter().filter_map(|i| i.connection()).collect();
        connectors.extend(b.next_connection());
        if last != block {
            connectors.extend(graph.block(last).and_then(|l| l.next_connection()));
        }

        let mut best: Option<(ConnectionId, ConnectionId, f32)> = None;
        for conn in connectors {
            let Some(target) = index.closest_connection(graph, conn, radius) else {
                continue;
            };
            let distance = graph.connections[conn].distance_from(&graph.connections[target]);
            if best.is_none_or(|(_, _, best_distance)| distance < best_distance) {
                best = Some((conn, target, distance));
            }
        }
        best.map(|(conn, target, _)| (conn, target))
    }
}
