//! # Workspace Stats
//!
//! Single-pass collection of everything a block tree contributes to the workspace
//! indices: its connections (into the [`ConnectionManager`]), the variables its
//! fields name, and procedure definitions/calls (into the [`ProcedureManager`]).
//!
//! Recursion follows `Next` and `Input` connections only. `Previous` and `Output`
//! connections are registered but never followed, because following them would
//! walk back up into the parent that started the traversal.

use crate::connection_manager::ConnectionManager;
use crate::error::{ProcedureError, Result};
use crate::model::{BlockGraph, BlockId, ConnectionId};
use crate::names::NameManager;
use crate::procedures::{NAME_FIELD, ProcedureManager};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, Default)]
pub struct WorkspaceStats {
    variable_names: NameManager,
    /// Lower-cased variable name → blocks with a field naming it.
    variable_references: HashMap<String, Vec<BlockId>>,
    procedures: ProcedureManager,
}

/// Connections to register on one block, split by whether recursion follows them.
fn split_connections(graph: &BlockGraph, block: BlockId) -> Result<(Vec<ConnectionId>, Vec<ConnectionId>)> {
    let b = graph.try_block(block)?;
    let downward = b
        .inputs
        .iter()
        .filter_map(|input| input.connection())
        .chain(b.next_connection())
        .collect();
    let upward = b
        .previous_connection()
        .into_iter()
        .chain(b.output_connection())
        .collect();
    Ok((downward, upward))
}

/// The blocks a walk from `block` visits.
fn walk(graph: &BlockGraph, block: BlockId, recursive: bool) -> Vec<BlockId> {
    if recursive {
        graph.descendants(block)
    } else {
        vec![block]
    }
}

impl WorkspaceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable_names(&self) -> &NameManager {
        &self.variable_names
    }

    pub fn variable_references(&self, name: &str) -> &[BlockId] {
        self.variable_references
            .get(&name.to_lowercase())
            .map_or(&[], Vec::as_slice)
    }

    pub fn procedures(&self) -> &ProcedureManager {
        &self.procedures
    }

    pub fn procedures_mut(&mut self) -> &mut ProcedureManager {
        &mut self.procedures
    }

    /// Registers `block` (and, if `recursive`, its subtree).
    ///
    /// Procedure consistency is checked for the whole walk before anything is
    /// registered, so a failure leaves every index untouched. Definitions are
    /// registered before calls, so a call may refer to a definition in the same tree.
    pub fn collect_stats(
        &mut self,
        graph: &mut BlockGraph,
        connections: &mut ConnectionManager,
        block: BlockId,
        recursive: bool,
    ) -> Result<()> {
        graph.try_block(block)?;
        let blocks = walk(graph, block, recursive);
        self.validate_procedures(graph, &blocks)?;

        let mut references = Vec::new();
        for &id in &blocks {
            let (downward, upward) = split_connections(graph, id)?;
            for conn in downward.into_iter().chain(upward) {
                connections.add_connection(graph, conn);
            }

            let b = graph.try_block(id)?;
            let variables: Vec<String> = b
                .inputs
                .iter()
                .flat_map(|input| input.fields.iter())
                .filter_map(|field| field.variable_name().map(str::to_string))
                .collect();
            for variable in variables {
                self.variable_names.add_name(&variable);
                let refs = self
                    .variable_references
                    .entry(variable.to_lowercase())
                    .or_default();
                if !refs.contains(&id) {
                    refs.push(id);
                }
            }

            if ProcedureManager::is_definition(b) {
                self.procedures.add_definition(graph.block_mut(id)?)?;
            } else if ProcedureManager::is_reference(b) {
                references.push(id);
            }
        }

        for id in references {
            self.procedures.add_reference(graph.try_block(id)?)?;
        }
        tracing::trace!(block = ?block, blocks = blocks.len(), "Collected workspace stats");
        Ok(())
    }

    fn validate_procedures(&self, graph: &BlockGraph, blocks: &[BlockId]) -> Result<()> {
        let mut defined: HashSet<String> = HashSet::new();
        let mut called: Vec<String> = Vec::new();
        for &id in blocks {
            let b = graph.try_block(id)?;
            let is_definition = ProcedureManager::is_definition(b);
            if !is_definition && !ProcedureManager::is_reference(b) {
                continue;
            }
            let name = b
                .field_by_name(NAME_FIELD)
                .and_then(|field| field.value())
                .ok_or_else(|| ProcedureError::MissingNameField {
                    block_type: b.block_type.clone(),
                    field: NAME_FIELD.to_string(),
                })?;
            if is_definition {
                if self.procedures.contains_definition(id) {
                    return Err(ProcedureError::AlreadyRegistered(id).into());
                }
                defined.insert(name.to_lowercase());
            } else {
                called.push(name);
            }
        }
        for name in called {
            if !defined.contains(&name.to_lowercase()) && self.procedures.definition(&name).is_none() {
                return Err(ProcedureError::NoSuchDefinition(name).into());
            }
        }
        Ok(())
    }

    /// Unregisters the subtree rooted at `block` and returns procedure calls left
    /// without a definition that live outside the subtree.
    pub fn remove_stats(
        &mut self,
        graph: &BlockGraph,
        connections: &mut ConnectionManager,
        block: BlockId,
    ) -> Vec<BlockId> {
        let blocks = graph.descendants(block);
        let mut orphaned = Vec::new();
        for &id in &blocks {
            for conn in graph.blocks[id].connections() {
                connections.remove_connection(graph, conn);
            }
            self.variable_references.retain(|_, refs| {
                refs.retain(|&r| r != id);
                !refs.is_empty()
            });
            if self.procedures.contains_reference(id) {
                let _ = self.procedures.remove_reference(id);
            }
            if let Ok(refs) = self.procedures.remove_definition(id) {
                orphaned.extend(refs);
            }
        }
        orphaned.retain(|id| !blocks.contains(id));
        orphaned
    }

    pub fn clear(&mut self) {
        self.variable_names.clear();
        self.variable_references.clear();
        self.procedures.clear();
    }
}
