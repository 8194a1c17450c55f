use crate::controller::BlocklyController;
use crate::error::{BlockError, ProcedureError, Result};
use crate::model::{BlockFlags, BlockId, ConnectionId, Input, Uuid};
use crate::workspace::Workspace;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A serializable representation of a Block and everything attached below it.
///
/// Instead of transient `BlockId`s, blocks are identified by their stable UUID and
/// children are nested under the input (or next connection) they hang from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedBlock {
    pub block_type: String,
    pub uuid: Uuid,
    /// Only root blocks carry a position; the rest is derived by layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec2>,
    #[serde(default)]
    pub flags: BlockFlags,
    /// Field values by field name.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub inputs: Vec<SavedInput>,
    #[serde(default)]
    pub next: Option<Box<SavedBlock>>,
}

/// A child block plugged into a named input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedInput {
    pub name: String,
    pub block: SavedBlock,
}

/// A serializable snapshot of the root blocks of a workspace.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedWorkspace {
    pub blocks: Vec<SavedBlock>,
}

fn invalid(block_type: &str, message: impl Into<String>) -> BlockError {
    BlockError::InvalidSavedBlock {
        block_type: block_type.to_string(),
        message: message.into(),
    }
}

impl Workspace {
    /// Serializes the root blocks, in root order, into a `SavedWorkspace` payload.
    pub fn save(&self) -> SavedWorkspace {
        SavedWorkspace {
            blocks: self
                .root_blocks()
                .iter()
                .filter_map(|&root| self.save_block(root, true))
                .collect(),
        }
    }

    /// Walks `block`: fields, then input children in input order, then the next chain.
    pub fn save_block(&self, block: BlockId, with_position: bool) -> Option<SavedBlock> {
        let b = self.graph.block(block)?;
        let fields = b
            .inputs
            .iter()
            .flat_map(|input| input.fields.iter())
            .filter_map(|field| Some((field.name.clone()?, field.value()?)))
            .collect();
        let inputs = b
            .inputs
            .iter()
            .filter_map(|input| {
                let name = input.name.clone()?;
                let child = self.graph.target_block(input.connection()?)?;
                Some(SavedInput {
                    name,
                    block: self.save_block(child, false)?,
                })
            })
            .collect();
        let next = self
            .graph
            .next_block(block)
            .and_then(|next| self.save_block(next, false))
            .map(Box::new);

        Some(SavedBlock {
            block_type: b.block_type.clone(),
            uuid: b.uuid,
            position: with_position.then_some(b.position()),
            flags: b.flags,
            fields,
            inputs,
            next,
        })
    }
}

impl BlocklyController {
    /// Rebuilds saved trees and adds them to the workspace as roots, returning the
    /// new roots in saved order.
    ///
    /// Trees are added in passes so that a call may be saved before the tree that
    /// defines its procedure. If any tree fails, everything loaded so far is
    /// discarded again and the workspace is left as it was.
    pub fn load(&mut self, saved: &SavedWorkspace) -> Result<Vec<BlockId>> {
        let event_mark = self.events.len();
        let mut roots = Vec::with_capacity(saved.blocks.len());

        let result = self.load_trees(saved, &mut roots);
        if let Err(err) = result {
            for root in roots {
                if let Err(cleanup) = self.discard_tree(root) {
                    tracing::error!(block = ?root, error = %cleanup, "Failed to discard partially loaded tree");
                }
            }
            self.events.truncate(event_mark);
            tracing::warn!(error = %err, "Workspace load rolled back");
            return Err(err);
        }
        tracing::info!(roots = roots.len(), "Loaded workspace");
        Ok(roots)
    }

    fn load_trees(&mut self, saved: &SavedWorkspace, roots: &mut Vec<BlockId>) -> Result<()> {
        for tree in &saved.blocks {
            let root = self.build_tree(tree, roots)?;
            self.workspace.graph.block_mut(root)?.position = tree.position.unwrap_or(Vec2::ZERO);
        }

        let mut pending: Vec<BlockId> = roots.clone();
        while !pending.is_empty() {
            let mut deferred = Vec::new();
            let mut last_error = None;
            for &root in &pending {
                match self.add_root_block(root) {
                    Ok(()) => {}
                    Err(BlockError::Procedure(err @ ProcedureError::NoSuchDefinition(_))) => {
                        deferred.push(root);
                        last_error = Some(err);
                    }
                    Err(err) => return Err(err),
                }
            }
            if deferred.len() == pending.len()
                && let Some(err) = last_error
            {
                return Err(err.into());
            }
            pending = deferred;
        }
        Ok(())
    }

    /// Builds one saved tree outside the workspace and records its root in `created`
    /// once the whole tree is built.
    fn build_tree(&mut self, saved: &SavedBlock, created: &mut Vec<BlockId>) -> Result<BlockId> {
        let root = self.obtain_block(&saved.block_type)?;
        if let Err(err) = self.restore_block(root, saved) {
            self.discard_tree(root)?;
            return Err(err);
        }
        created.push(root);
        Ok(root)
    }

    fn restore_block(&mut self, id: BlockId, saved: &SavedBlock) -> Result<()> {
        let block_type = saved.block_type.as_str();
        if !self.workspace.graph.set_uuid(id, saved.uuid) {
            return Err(invalid(block_type, format!("uuid {} is already in use", saved.uuid)));
        }

        let block = self.workspace.graph.block_mut(id)?;
        block.flags = saved.flags;
        for (name, value) in &saved.fields {
            let field = block
                .field_by_name_mut(name)
                .ok_or_else(|| invalid(block_type, format!("no field named '{name}'")))?;
            if !field.set_value(value) {
                return Err(invalid(block_type, format!("'{value}' is not a valid value for '{name}'")));
            }
        }

        for saved_input in &saved.inputs {
            let socket = self
                .workspace
                .graph
                .try_block(id)?
                .input_by_name(&saved_input.name)
                .and_then(Input::connection)
                .ok_or_else(|| BlockError::UnknownInput {
                    block_type: block_type.to_string(),
                    input: saved_input.name.clone(),
                })?;
            let child = self.obtain_block(&saved_input.block.block_type)?;
            self.restore_child(child, &saved_input.block, socket)?;
        }

        if let Some(saved_next) = &saved.next {
            let next = self
                .workspace
                .graph
                .try_block(id)?
                .next_connection()
                .ok_or_else(|| invalid(block_type, "block has no next connection"))?;
            let child = self.obtain_block(&saved_next.block_type)?;
            self.restore_child(child, saved_next, next)?;
        }
        Ok(())
    }

    /// Connects a freshly obtained child below `socket`, then restores it. The child
    /// is freed if it cannot be connected.
    fn restore_child(&mut self, child: BlockId, saved: &SavedBlock, socket: ConnectionId) -> Result<()> {
        let link = self.workspace.graph.try_block(child)?.parent_link();
        let connected = match link {
            Some(link) => self.connect(link, socket),
            None => Err(invalid(&saved.block_type, "block cannot be attached to a parent")),
        };
        if let Err(err) = connected {
            self.discard_tree(child)?;
            return Err(err);
        }
        self.restore_block(child, saved)
    }
}
