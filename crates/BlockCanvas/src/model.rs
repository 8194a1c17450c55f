//! # Core Data Models
//!
//! This module defines the block graph: blocks, their inputs, and the connections
//! that join them into trees. It uses `SlotMap` arenas so that every back-reference
//! (connection → block, connection → target) is a plain key instead of a pointer.
//!
//! Links between connections are always symmetric: `a.target == Some(b)` exactly when
//! `b.target == Some(a)`. Only [`BlockGraph::link`] and [`BlockGraph::unlink`] touch
//! the target fields, and they update both sides together.

use crate::error::{BlockError, Result};
use crate::field::Field;
use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use std::collections::HashMap;

pub use uuid::Uuid;

new_key_type! {
    /// Unique identifier for a Block.
    pub struct BlockId;
    /// Unique identifier for a Connection.
    pub struct ConnectionId;
}

/// The four shapes of attachment point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionType {
    /// Top notch of a statement block.
    Previous,
    /// Bottom tab of a statement block.
    Next,
    /// Socket owned by a value or statement input.
    Input,
    /// Left plug of a value block.
    Output,
}

impl ConnectionType {
    pub const ALL: [ConnectionType; 4] = [
        ConnectionType::Previous,
        ConnectionType::Next,
        ConnectionType::Input,
        ConnectionType::Output,
    ];

    /// The type this one can attach to.
    pub fn opposite(self) -> Self {
        match self {
            ConnectionType::Previous => ConnectionType::Next,
            ConnectionType::Next => ConnectionType::Previous,
            ConnectionType::Input => ConnectionType::Output,
            ConnectionType::Output => ConnectionType::Input,
        }
    }

    /// Previous and Output connections link a block to its parent.
    pub fn is_parent_link(self) -> bool {
        matches!(self, ConnectionType::Previous | ConnectionType::Output)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ConnectionType::Previous => 0,
            ConnectionType::Next => 1,
            ConnectionType::Input => 2,
            ConnectionType::Output => 3,
        }
    }
}

bitflags! {
    /// Editing permissions of a Block.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BlockFlags: u8 {
        /// The block can be dragged, and blocks can be spliced in front of it.
        const MOVABLE = 1 << 0;
        /// The block can be removed from the workspace.
        const DELETABLE = 1 << 1;
        /// The block's fields can be edited.
        const EDITABLE = 1 << 2;
    }
}

impl Default for BlockFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl Serialize for BlockFlags {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for BlockFlags {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u8::deserialize(deserializer)?;
        Ok(Self::from_bits_truncate(bits))
    }
}

/// A typed attachment point on a Block.
#[derive(Clone, Debug)]
pub struct Connection {
    /// Self-reference ID.
    pub id: ConnectionId,
    pub kind: ConnectionType,
    /// Owning block.
    pub block: BlockId,
    /// Index of the owning input, for `Input` connections.
    pub input: Option<usize>,
    /// Position relative to the owning block's origin.
    pub offset: Vec2,
    /// Accepted type names. `None` accepts anything.
    pub checks: Option<Vec<String>>,
    pub(crate) statement: bool,
    pub(crate) position: Vec2,
    pub(crate) target: Option<ConnectionId>,
    pub(crate) in_drag_mode: bool,
}

impl Connection {
    /// Absolute position in workspace coordinates.
    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn target(&self) -> Option<ConnectionId> {
        self.target
    }

    pub fn is_connected(&self) -> bool {
        self.target.is_some()
    }

    pub fn in_drag_mode(&self) -> bool {
        self.in_drag_mode
    }

    /// True for the connection of a statement input.
    pub fn is_statement_input(&self) -> bool {
        self.statement
    }

    pub fn distance_from(&self, other: &Connection) -> f32 {
        self.position.distance(other.position)
    }

    /// Type-check compatibility. Absent check lists accept anything.
    pub fn checks_compatible(&self, other: &Connection) -> bool {
        match (&self.checks, &other.checks) {
            (Some(a), Some(b)) => a.iter().any(|check| b.contains(check)),
            _ => true,
        }
    }
}

/// The kind of an input row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputKind {
    /// Accepts a value block's output.
    Value,
    /// Accepts a statement block's previous connection.
    Statement,
    /// Holds fields only.
    Dummy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alignment {
    #[default]
    Left,
    Centre,
    Right,
}

/// A named row on a block holding fields and, for value and statement inputs,
/// one connection.
#[derive(Clone, Debug)]
pub struct Input {
    pub name: Option<String>,
    pub kind: InputKind,
    pub align: Alignment,
    pub fields: Vec<Field>,
    pub(crate) connection: Option<ConnectionId>,
}

impl Input {
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }
}

/// A node in the program graph.
#[derive(Clone, Debug)]
pub struct Block {
    /// Self-reference ID.
    pub id: BlockId,
    /// Stable UUID for persistence.
    pub uuid: Uuid,
    /// Registry name of the definition this block was built from.
    pub block_type: String,
    pub inputs: Vec<Input>,
    pub flags: BlockFlags,
    pub colour: Option<String>,
    pub tooltip: Option<String>,
    pub(crate) position: Vec2,
    pub(crate) previous: Option<ConnectionId>,
    pub(crate) next: Option<ConnectionId>,
    pub(crate) output: Option<ConnectionId>,
}

impl Block {
    /// Position of the block origin. For non-root blocks this is derived from the
    /// parent connection on every layout pass.
    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn previous_connection(&self) -> Option<ConnectionId> {
        self.previous
    }

    pub fn next_connection(&self) -> Option<ConnectionId> {
        self.next
    }

    pub fn output_connection(&self) -> Option<ConnectionId> {
        self.output
    }

    /// The connection that links this block to a parent, if the block has one.
    pub fn parent_link(&self) -> Option<ConnectionId> {
        self.output.or(self.previous)
    }

    /// All connections on this block: parent link first, then inputs, then next.
    pub fn connections(&self) -> Vec<ConnectionId> {
        let mut out = Vec::with_capacity(self.inputs.len() + 2);
        out.extend(self.output);
        out.extend(self.previous);
        out.extend(self.inputs.iter().filter_map(|input| input.connection));
        out.extend(self.next);
        out
    }

    pub fn input_by_name(&self, name: &str) -> Option<&Input> {
        self.inputs
            .iter()
            .find(|input| input.name.as_deref() == Some(name))
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.inputs
            .iter()
            .flat_map(|input| input.fields.iter())
            .find(|field| field.name.as_deref() == Some(name))
    }

    pub fn field_by_name_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.inputs
            .iter_mut()
            .flat_map(|input| input.fields.iter_mut())
            .find(|field| field.name.as_deref() == Some(name))
    }

    pub fn is_movable(&self) -> bool {
        self.flags.contains(BlockFlags::MOVABLE)
    }

    pub fn is_deletable(&self) -> bool {
        self.flags.contains(BlockFlags::DELETABLE)
    }
}

/// Arena storage for every block and connection in a workspace.
#[derive(Clone, Debug, Default)]
pub struct BlockGraph {
    pub(crate) blocks: SlotMap<BlockId, Block>,
    pub(crate) connections: SlotMap<ConnectionId, Connection>,
    uuid_index: HashMap<Uuid, BlockId>,
}

impl BlockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn try_block(&self, id: BlockId) -> Result<&Block> {
        self.blocks.get(id).ok_or(BlockError::UnknownBlock(id))
    }

    pub fn try_connection(&self, id: ConnectionId) -> Result<&Connection> {
        self.connections
            .get(id)
            .ok_or(BlockError::UnknownConnection(id))
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> Result<&mut Block> {
        self.blocks.get_mut(id).ok_or(BlockError::UnknownBlock(id))
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks.iter()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn contains_block(&self, id: BlockId) -> bool {
        self.blocks.contains_key(id)
    }

    pub fn block_by_uuid(&self, uuid: Uuid) -> Option<BlockId> {
        self.uuid_index.get(&uuid).copied()
    }

    /// Inserts a block built by `build`, which receives the new key.
    pub(crate) fn insert_block_with(&mut self, build: impl FnOnce(BlockId) -> Block) -> BlockId {
        let id = self.blocks.insert_with_key(build);
        let uuid = self.blocks[id].uuid;
        self.uuid_index.insert(uuid, id);
        id
    }

    /// Gives a block the UUID it was saved with. Fails if another block holds it.
    pub(crate) fn set_uuid(&mut self, id: BlockId, uuid: Uuid) -> bool {
        if self.uuid_index.get(&uuid).is_some_and(|&other| other != id) {
            return false;
        }
        let Some(block) = self.blocks.get_mut(id) else {
            return false;
        };
        self.uuid_index.remove(&block.uuid);
        block.uuid = uuid;
        self.uuid_index.insert(uuid, id);
        true
    }

    pub(crate) fn insert_connection(
        &mut self,
        block: BlockId,
        kind: ConnectionType,
        input: Option<usize>,
        statement: bool,
        checks: Option<Vec<String>>,
    ) -> ConnectionId {
        self.connections.insert_with_key(|id| Connection {
            id,
            kind,
            block,
            input,
            offset: Vec2::ZERO,
            checks,
            statement,
            position: Vec2::ZERO,
            target: None,
            in_drag_mode: false,
        })
    }

    /// Frees a block and its connections. Callers unlink the block first.
    pub(crate) fn remove_block(&mut self, id: BlockId) -> Option<Block> {
        let block = self.blocks.remove(id)?;
        for conn in block.connections() {
            debug_assert!(
                self.connections.get(conn).is_none_or(|c| c.target.is_none()),
                "removing a block that is still linked"
            );
            self.connections.remove(conn);
        }
        self.uuid_index.remove(&block.uuid);
        Some(block)
    }

    /// Links two free connections to each other.
    pub(crate) fn link(&mut self, a: ConnectionId, b: ConnectionId) {
        debug_assert!(
            self.connections[a].target.is_none() && self.connections[b].target.is_none(),
            "linking an occupied connection"
        );
        self.connections[a].target = Some(b);
        self.connections[b].target = Some(a);
    }

    /// Breaks the link on `conn`, returning the connection it was linked to.
    pub(crate) fn unlink(&mut self, conn: ConnectionId) -> Option<ConnectionId> {
        let target = self.connections.get_mut(conn)?.target.take()?;
        if let Some(other) = self.connections.get_mut(target) {
            other.target = None;
        }
        Some(target)
    }

    pub(crate) fn set_drag_mode(&mut self, conn: ConnectionId, in_drag_mode: bool) {
        if let Some(c) = self.connections.get_mut(conn) {
            c.in_drag_mode = in_drag_mode;
        }
    }

    /// The block on the other end of `conn`.
    pub fn target_block(&self, conn: ConnectionId) -> Option<BlockId> {
        let target = self.connections.get(conn)?.target?;
        self.connections.get(target).map(|c| c.block)
    }

    /// The block this one is attached under, if any.
    pub fn parent_block(&self, block: BlockId) -> Option<BlockId> {
        let link = self.blocks.get(block)?.parent_link()?;
        self.target_block(link)
    }

    /// The block's own previous/output connection when it is linked to a parent.
    pub fn parent_connection(&self, block: BlockId) -> Option<ConnectionId> {
        let link = self.blocks.get(block)?.parent_link()?;
        self.connections.get(link)?.target.map(|_| link)
    }

    /// The top of the tree containing `block`.
    pub fn root_block(&self, block: BlockId) -> BlockId {
        let mut current = block;
        while let Some(parent) = self.parent_block(current) {
            current = parent;
        }
        current
    }

    /// The block attached below this one's next connection.
    pub fn next_block(&self, block: BlockId) -> Option<BlockId> {
        self.target_block(self.blocks.get(block)?.next?)
    }

    /// Follows next links until the end of the stack.
    pub fn last_block_in_sequence(&self, block: BlockId) -> BlockId {
        let mut current = block;
        while let Some(next) = self.next_block(current) {
            current = next;
        }
        current
    }

    /// Index of the block's value input if it has exactly one.
    pub fn only_value_input(&self, block: BlockId) -> Option<usize> {
        let inputs = &self.blocks.get(block)?.inputs;
        let mut found = None;
        for (idx, input) in inputs.iter().enumerate() {
            if input.kind == InputKind::Value {
                if found.is_some() {
                    return None;
                }
                found = Some(idx);
            }
        }
        found
    }

    /// Walks down single-value-input chains looking for a free socket.
    ///
    /// Used when splicing a value block: the block previously in the socket is
    /// re-attached here instead of being bumped.
    pub fn last_unconnected_input_connection(&self, block: BlockId) -> Option<ConnectionId> {
        let mut current = block;
        loop {
            let idx = self.only_value_input(current)?;
            let conn = self.blocks[current].inputs[idx].connection?;
            match self.target_block(conn) {
                Some(child) => current = child,
                None => return Some(conn),
            }
        }
    }

    /// True if `block` is `ancestor` or sits anywhere below it.
    pub fn is_descendant_of(&self, block: BlockId, ancestor: BlockId) -> bool {
        let mut current = Some(block);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent_block(id);
        }
        false
    }

    /// Blocks directly attached below `block`: input children in order, then next.
    pub fn child_blocks(&self, block: BlockId) -> Vec<BlockId> {
        let Some(b) = self.blocks.get(block) else {
            return Vec::new();
        };
        b.inputs
            .iter()
            .filter_map(|input| input.connection)
            .chain(b.next)
            .filter_map(|conn| self.target_block(conn))
            .collect()
    }

    /// Every block in the tree rooted at `block`, pre-order, including `block`.
    pub fn descendants(&self, block: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![block];
        while let Some(id) = stack.pop() {
            if !self.blocks.contains_key(id) {
                continue;
            }
            out.push(id);
            let mut children = self.child_blocks(id);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Every connection on every block in the tree rooted at `block`.
    pub fn all_connections_recursive(&self, block: BlockId) -> Vec<ConnectionId> {
        self.descendants(block)
            .into_iter()
            .flat_map(|id| self.blocks[id].connections())
            .collect()
    }

    /// Checks the symmetric-link invariant over the whole arena.
    pub fn links_are_symmetric(&self) -> bool {
        self.connections.iter().all(|(id, conn)| match conn.target {
            Some(target) => self
                .connections
                .get(target)
                .is_some_and(|other| other.target == Some(id)),
            None => true,
        })
    }
}
