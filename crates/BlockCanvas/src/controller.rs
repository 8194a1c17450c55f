//! # Controller
//!
//! `BlocklyController` is the only entry point that mutates a [`Workspace`]. It
//! performs the graph surgery behind a drop:
//!
//! - **connect**: link two free connections.
//! - **splice**: the target slot was occupied; the new block goes in between and the
//!   previous occupant is re-attached below it.
//! - **bump**: the target slot was occupied and the new block has nowhere to put the
//!   previous occupant, so the occupant becomes a root and is moved out of snapping
//!   range.
//!
//! Every public operation validates its request before touching the graph, so an
//! `Err` leaves the tree, the root registry and the connection index as they were.

use crate::config::WorkspaceConfig;
use crate::connection_manager::{RejectReason, check_shape};
use crate::dragger::DragState;
use crate::error::{BlockError, Result};
use crate::factory::BlockFactory;
use crate::model::{BlockId, ConnectionId, ConnectionType};
use crate::workspace::Workspace;
use glam::Vec2;

/// Notifications for the host application (re-layout, re-render, bookkeeping).
#[derive(Clone, Debug, PartialEq)]
pub enum WorkspaceEvent {
    /// A block's origin changed.
    BlockMoved { block: BlockId, position: Vec2 },
    /// `child` (a previous/output connection) was linked to `parent`.
    Connected {
        child: ConnectionId,
        parent: ConnectionId,
    },
    /// The link between `child` and `parent` was broken.
    Disconnected {
        child: ConnectionId,
        parent: ConnectionId,
    },
    /// A block was displaced from `from` and moved out of snapping range.
    Bumped { block: BlockId, from: ConnectionId },
    RootAdded(BlockId),
    RootRemoved(BlockId),
    BlockRemoved(BlockId),
}

pub struct BlocklyController {
    /// Configuration settings.
    pub config: WorkspaceConfig,
    pub(crate) workspace: Workspace,
    pub(crate) drag: DragState,
    pub(crate) events: Vec<WorkspaceEvent>,
}

/// Which side of a pending link owns the parent link (previous/output).
struct LinkPlan {
    child_conn: ConnectionId,
    parent_conn: ConnectionId,
    child_block: BlockId,
}

impl BlocklyController {
    pub fn new(config: WorkspaceConfig, factory: BlockFactory) -> Self {
        Self {
            config,
            workspace: Workspace::new(factory),
            drag: DragState::Idle,
            events: Vec::new(),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn factory_mut(&mut self) -> &mut BlockFactory {
        self.workspace.factory_mut()
    }

    /// Takes the events queued since the last call.
    pub fn drain_events(&mut self) -> Vec<WorkspaceEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn emit(&mut self, event: WorkspaceEvent) {
        self.events.push(event);
    }

    /// Builds a detached block of `block_type`. It is not part of the workspace until
    /// it is added as a root or connected to a block that is.
    pub fn obtain_block(&mut self, block_type: &str) -> Result<BlockId> {
        let ws = &mut self.workspace;
        ws.factory
            .instantiate(&mut ws.graph, block_type, &self.config.layout)
    }

    /// Builds a block and adds it to the workspace as a root at `position`.
    pub fn add_block_from_template(&mut self, block_type: &str, position: Vec2) -> Result<BlockId> {
        let block = self.obtain_block(block_type)?;
        self.workspace.graph.blocks[block].position = position;
        if let Err(err) = self.add_root_block(block) {
            self.workspace.graph.remove_block(block);
            return Err(err);
        }
        Ok(block)
    }

    /// Adds a detached block (and everything attached below it) to the workspace.
    pub fn add_root_block(&mut self, block: BlockId) -> Result<()> {
        let graph = &self.workspace.graph;
        graph.try_block(block)?;
        if self.workspace.is_root_block(block) {
            return Err(BlockError::AlreadyRoot(block));
        }
        if graph.parent_connection(block).is_some() {
            return Err(BlockError::NotRoot(block));
        }

        let ws = &mut self.workspace;
        ws.stats
            .collect_stats(&mut ws.graph, &mut ws.connections, block, true)?;
        ws.add_root(block);
        self.emit(WorkspaceEvent::RootAdded(block));
        self.relayout(block);
        tracing::debug!(block = ?block, "Added root block");
        Ok(())
    }

    /// Moves a root block (and its tree) to `position`.
    pub fn move_block(&mut self, block: BlockId, position: Vec2) -> Result<()> {
        self.workspace.graph.try_block(block)?;
        if self.workspace.graph.parent_connection(block).is_some() {
            return Err(BlockError::NotRoot(block));
        }
        self.layout_from(block, position);
        Ok(())
    }

    /// Replaces connection offsets measured by a renderer and re-lays out the tree.
    pub fn set_connection_offsets(&mut self, block: BlockId, offsets: &[(ConnectionId, Vec2)]) -> Result<()> {
        let graph = &self.workspace.graph;
        let owned = graph.try_block(block)?.connections();
        if let Some(&(conn, _)) = offsets.iter().find(|(conn, _)| !owned.contains(conn)) {
            return Err(BlockError::UnknownConnection(conn));
        }
        for &(conn, offset) in offsets {
            self.workspace.graph.connections[conn].offset = offset;
        }
        let root = self.workspace.graph.root_block(block);
        self.relayout(root);
        Ok(())
    }

    /// Recomputes positions below the root of `block`'s tree.
    pub fn relayout(&mut self, block: BlockId) {
        let root = self.workspace.graph.root_block(block);
        let Some(position) = self.workspace.graph.block(root).map(|b| b.position()) else {
            return;
        };
        self.layout_from(root, position);
    }

    pub(crate) fn layout_from(&mut self, block: BlockId, position: Vec2) {
        for (block, position) in self.workspace.layout_tree(block, position) {
            self.emit(WorkspaceEvent::BlockMoved { block, position });
        }
    }

    /// Drops `block` from the root registry without touching its connections, so it
    /// can be placed under a new parent.
    pub fn remove_from_root(&mut self, block: BlockId) -> bool {
        let removed = self.workspace.remove_root(block);
        if removed {
            self.emit(WorkspaceEvent::RootRemoved(block));
        }
        removed
    }

    /// Disconnects `block` from its parent and makes it a root. Blocks attached below
    /// it stay attached. No-op for a block that is already a root. A block in a
    /// detached tree becomes the top of its own detached tree.
    pub fn extract_block_as_root(&mut self, block: BlockId) -> Result<()> {
        let graph = &self.workspace.graph;
        graph.try_block(block)?;
        let Some(child) = graph.parent_connection(block) else {
            return Ok(());
        };
        let in_workspace = self.workspace.contains(block);
        let Some(parent) = self.workspace.graph.unlink(child) else {
            return Ok(());
        };
        self.emit(WorkspaceEvent::Disconnected { child, parent });
        if in_workspace && self.workspace.add_root(block) {
            self.emit(WorkspaceEvent::RootAdded(block));
        }
        tracing::debug!(block = ?block, "Extracted block as root");
        Ok(())
    }

    /// Checks a connect request without mutating anything.
    fn plan_link(&self, source: ConnectionId, target: ConnectionId) -> Result<LinkPlan> {
        let graph = &self.workspace.graph;
        let reject = |reason: RejectReason| BlockError::IllegalConnection {
            source_conn: source,
            target,
            reason,
        };
        let src = graph.try_connection(source)?;
        let tgt = graph.try_connection(target)?;
        check_shape(graph, source, target).map_err(reject)?;
        if src.in_drag_mode() || tgt.in_drag_mode() {
            return Err(reject(RejectReason::InDragMode));
        }

        let (child_conn, parent_conn) = if src.kind.is_parent_link() {
            (source, target)
        } else {
            (target, source)
        };
        let child_block = graph.try_connection(child_conn)?.block;
        let parent_block = graph.try_connection(parent_conn)?.block;

        // The source block is detached from its old parent as part of the connect;
        // a target block must already be free.
        if child_conn == target && tgt.is_connected() {
            return Err(reject(RejectReason::Occupied));
        }
        if graph.is_descendant_of(parent_block, child_block) {
            return Err(reject(RejectReason::CreatesCycle));
        }
        if let Some(occupant) = graph.target_block(parent_conn)
            && graph.block(occupant).is_some_and(|b| !b.is_movable())
        {
            return Err(reject(RejectReason::Unmovable));
        }
        // A definition leaving the workspace would strand the calls left behind.
        if self.workspace.contains(child_block) && !self.workspace.contains(parent_block) {
            let moving = graph.descendants(child_block);
            let procedures = self.workspace.stats.procedures();
            let strands = moving
                .iter()
                .filter_map(|&id| procedures.references_of(id))
                .flatten()
                .any(|call| !moving.contains(call));
            if strands {
                return Err(reject(RejectReason::StrandsReferences));
            }
        }
        Ok(LinkPlan {
            child_conn,
            parent_conn,
            child_block,
        })
    }

    /// Connects `source` to `target`, splicing or bumping whatever occupied the
    /// parent-side slot.
    ///
    /// `source` is the connection on the block being placed. If that block is
    /// attached elsewhere through its previous/output connection it is detached
    /// first. Illegal requests return `BlockError::IllegalConnection` untouched.
    pub fn connect(&mut self, source: ConnectionId, target: ConnectionId) -> Result<()> {
        let plan = self.plan_link(source, target)?;
        let child_kind = self.workspace.graph.connections[plan.child_conn].kind;
        let parent_block = self.workspace.graph.connections[plan.parent_conn].block;
        let parent_in_workspace = self.workspace.contains(parent_block);
        let child_in_workspace = self.workspace.contains(plan.child_block);

        // A detached stack joining the workspace is registered first; this is the
        // only step that can still fail.
        if parent_in_workspace && !child_in_workspace {
            let ws = &mut self.workspace;
            ws.stats
                .collect_stats(&mut ws.graph, &mut ws.connections, plan.child_block, true)?;
        }

        self.extract_block_as_root(plan.child_block)?;
        self.remove_from_root(plan.child_block);
        if child_in_workspace && !parent_in_workspace {
            let ws = &mut self.workspace;
            let stranded = ws
                .stats
                .remove_stats(&ws.graph, &mut ws.connections, plan.child_block);
            debug_assert!(stranded.is_empty(), "calls stranded by a checked connect");
        }

        let bumped = match child_kind {
            ConnectionType::Output => self.attach_value(plan.parent_conn, plan.child_conn),
            _ => self.attach_statement(plan.parent_conn, plan.child_conn),
        };

        self.relayout(plan.child_block);
        if let Some(displaced) = bumped {
            self.bump(plan.parent_conn, displaced, parent_in_workspace);
        }
        tracing::debug!(child = ?plan.child_conn, parent = ?plan.parent_conn, "Connected");
        Ok(())
    }

    fn link(&mut self, parent: ConnectionId, child: ConnectionId) {
        self.workspace.graph.link(parent, child);
        self.emit(WorkspaceEvent::Connected { child, parent });
    }

    /// Puts the block owning `child_output` into the value slot `parent_input`.
    ///
    /// A block already in the slot is re-attached to the end of the new block's
    /// single-value-input chain when it fits there. Returns the block to bump otherwise.
    fn attach_value(&mut self, parent_input: ConnectionId, child_output: ConnectionId) -> Option<BlockId> {
        let displaced = self.workspace.graph.unlink(parent_input);
        if let Some(displaced) = displaced {
            self.emit(WorkspaceEvent::Disconnected {
                child: displaced,
                parent: parent_input,
            });
        }
        self.link(parent_input, child_output);

        let displaced = displaced?;
        let graph = &self.workspace.graph;
        let child_block = graph.connections[child_output].block;
        let displaced_block = graph.connections[displaced].block;
        let free_input = graph
            .last_unconnected_input_connection(child_block)
            .filter(|&free| check_shape(graph, free, displaced).is_ok());

        match free_input {
            Some(free) => {
                self.link(free, displaced);
                tracing::debug!(block = ?displaced_block, "Spliced displaced value block");
                None
            }
            None => Some(displaced_block),
        }
    }

    /// Puts the stack headed by the block owning `child_previous` at `parent_conn`
    /// (a next connection or a statement input).
    ///
    /// A stack already there is re-attached below the last block of the new stack
    /// when that block has a free next connection. Returns the block to bump otherwise.
    fn attach_statement(&mut self, parent_conn: ConnectionId, child_previous: ConnectionId) -> Option<BlockId> {
        let displaced = self.workspace.graph.unlink(parent_conn);
        if let Some(displaced) = displaced {
            self.emit(WorkspaceEvent::Disconnected {
                child: displaced,
                parent: parent_conn,
            });
        }
        self.link(parent_conn, child_previous);

        let displaced = displaced?;
        let graph = &self.workspace.graph;
        let child_block = graph.connections[child_previous].block;
        let displaced_block = graph.connections[displaced].block;
        let last = graph.last_block_in_sequence(child_block);
        let free_next = graph
            .block(last)
            .and_then(|b| b.next_connection())
            .filter(|&next| check_shape(graph, next, displaced).is_ok());

        match free_next {
            Some(next) => {
                self.link(next, displaced);
                tracing::debug!(block = ?displaced_block, "Spliced displaced statement stack");
                None
            }
            None => Some(displaced_block),
        }
    }

    /// Makes `block` a root and moves it so its parent link sits `snap_radius` to the
    /// right of and below `from`. Blocks bumped out of a detached tree stay detached.
    fn bump(&mut self, from: ConnectionId, block: BlockId, register_root: bool) {
        if register_root && self.workspace.add_root(block) {
            self.emit(WorkspaceEvent::RootAdded(block));
        }
        let graph = &self.workspace.graph;
        let anchor = graph.connections[from].position();
        let link_offset = graph
            .block(block)
            .and_then(|b| b.parent_link())
            .map_or(Vec2::ZERO, |link| graph.connections[link].offset);
        let radius = self.config.snap_radius;
        let position = anchor + Vec2::splat(radius) - link_offset;

        self.layout_from(block, position);
        self.emit(WorkspaceEvent::Bumped { block, from });
        tracing::debug!(block = ?block, ?position, "Bumped block");
    }

    /// Deletes `block` and everything attached below it.
    ///
    /// Returns procedure calls elsewhere in the workspace whose definition was
    /// removed; the caller decides whether to delete or relink them.
    pub fn remove_block_tree(&mut self, block: BlockId) -> Result<Vec<BlockId>> {
        let graph = &self.workspace.graph;
        graph.try_block(block)?;
        let blocks = graph.descendants(block);
        if let Some(&locked) = blocks
            .iter()
            .find(|&&id| graph.block(id).is_some_and(|b| !b.is_deletable()))
        {
            return Err(BlockError::NotDeletable(locked));
        }
        if let DragState::Dragging { block: dragged, .. } = &self.drag
            && (blocks.contains(dragged) || graph.is_descendant_of(block, *dragged))
        {
            return Err(BlockError::DragInProgress(*dragged));
        }

        let orphaned = self.discard_tree(block)?;
        tracing::debug!(block = ?block, orphaned = orphaned.len(), "Removed block tree");
        Ok(orphaned)
    }

    /// Unregisters and frees a tree without permission checks.
    pub(crate) fn discard_tree(&mut self, block: BlockId) -> Result<Vec<BlockId>> {
        self.extract_block_as_root(block)?;
        self.remove_from_root(block);

        let ws = &mut self.workspace;
        let blocks = ws.graph.descendants(block);
        let orphaned = ws.stats.remove_stats(&ws.graph, &mut ws.connections, block);
        for &id in &blocks {
            let conns = ws.graph.blocks[id].connections();
            for conn in conns {
                ws.graph.unlink(conn);
            }
        }
        for id in blocks {
            self.workspace.graph.remove_block(id);
            self.emit(WorkspaceEvent::BlockRemoved(id));
        }
        Ok(orphaned)
    }
}
