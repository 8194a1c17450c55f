//! # Workspace
//!
//! Owns the block arena, the registry of root blocks, the block factory and the
//! derived indices (connection index, variable and procedure stats). Only the
//! controller mutates it; everything else reads through the accessors here.

use crate::connection_manager::ConnectionManager;
use crate::factory::BlockFactory;
use crate::model::{BlockGraph, BlockId};
use crate::stats::WorkspaceStats;
use glam::Vec2;

#[derive(Clone, Debug, Default)]
pub struct Workspace {
    pub(crate) graph: BlockGraph,
    pub(crate) factory: BlockFactory,
    pub(crate) connections: ConnectionManager,
    pub(crate) stats: WorkspaceStats,
    roots: Vec<BlockId>,
}

impl Workspace {
    pub fn new(factory: BlockFactory) -> Self {
        Self {
            factory,
            ..Self::default()
        }
    }

    pub fn graph(&self) -> &BlockGraph {
        &self.graph
    }

    pub fn factory(&self) -> &BlockFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut BlockFactory {
        &mut self.factory
    }

    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn stats(&self) -> &WorkspaceStats {
        &self.stats
    }

    /// Top-level blocks, in the order they became roots.
    pub fn root_blocks(&self) -> &[BlockId] {
        &self.roots
    }

    pub fn is_root_block(&self, block: BlockId) -> bool {
        self.roots.contains(&block)
    }

    /// True if `block` belongs to a tree whose root is registered here. Blocks from
    /// `obtain_block` stay outside the workspace until they are added or connected.
    pub fn contains(&self, block: BlockId) -> bool {
        self.graph.contains_block(block) && self.is_root_block(self.graph.root_block(block))
    }

    pub(crate) fn add_root(&mut self, block: BlockId) -> bool {
        if self.roots.contains(&block) {
            return false;
        }
        self.roots.push(block);
        true
    }

    pub(crate) fn remove_root(&mut self, block: BlockId) -> bool {
        match self.roots.iter().position(|&id| id == block) {
            Some(idx) => {
                self.roots.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Places `block` at `position` and recomputes every connection position in its
    /// tree, keeping the connection index sorted. Returns the blocks whose origin
    /// changed.
    pub(crate) fn layout_tree(&mut self, block: BlockId, position: Vec2) -> Vec<(BlockId, Vec2)> {
        let mut moved = Vec::new();
        let mut stack = vec![(block, position)];
        while let Some((id, origin)) = stack.pop() {
            let Some(b) = self.graph.blocks.get_mut(id) else {
                continue;
            };
            if b.position != origin {
                b.position = origin;
                moved.push((id, origin));
            }
            for conn in b.connections() {
                let Some(offset) = self.graph.connection(conn).map(|c| c.offset) else {
                    continue;
                };
                self.connections
                    .move_connection_to(&mut self.graph, conn, origin, offset);

                let c = &self.graph.connections[conn];
                if c.kind.is_parent_link() {
                    continue;
                }
                if let Some(child_conn) = c.target().and_then(|t| self.graph.connection(t)) {
                    stack.push((child_conn.block, c.position() - child_conn.offset));
                }
            }
        }
        moved
    }
}
