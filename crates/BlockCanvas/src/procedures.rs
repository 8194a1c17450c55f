//! # Procedures
//!
//! Bookkeeping for procedure definition blocks and the call blocks that refer to
//! them. Every reference must point at a registered definition; definitions are
//! keyed by name, compared case-insensitively.

use crate::error::ProcedureError;
use crate::model::{Block, BlockId};
use crate::names::NameManager;
use std::collections::HashMap;

/// Field holding the procedure name on definition and call blocks.
pub const NAME_FIELD: &str = "NAME";

pub const DEFINITION_TYPES: [&str; 2] = ["procedures_defnoreturn", "procedures_defreturn"];
pub const REFERENCE_TYPES: [&str; 2] = ["procedures_callnoreturn", "procedures_callreturn"];

#[derive(Clone, Debug, Default)]
pub struct ProcedureManager {
    /// Lower-cased name → definition block.
    definitions: HashMap<String, BlockId>,
    /// Lower-cased name → call blocks, in registration order.
    references: HashMap<String, Vec<BlockId>>,
    names: NameManager,
}

fn procedure_name(block: &Block) -> Result<String, ProcedureError> {
    block
        .field_by_name(NAME_FIELD)
        .and_then(|field| field.value())
        .ok_or_else(|| ProcedureError::MissingNameField {
            block_type: block.block_type.clone(),
            field: NAME_FIELD.to_string(),
        })
}

impl ProcedureManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_definition(block: &Block) -> bool {
        DEFINITION_TYPES.contains(&block.block_type.as_str())
    }

    pub fn is_reference(block: &Block) -> bool {
        REFERENCE_TYPES.contains(&block.block_type.as_str())
    }

    /// Registers a definition block and returns the name it was registered under.
    ///
    /// A name already taken by another definition is not an error: the block's name
    /// field is rewritten to a fresh name instead.
    pub fn add_definition(&mut self, block: &mut Block) -> Result<String, ProcedureError> {
        let mut name = procedure_name(block)?;
        if self.contains_definition(block.id) {
            return Err(ProcedureError::AlreadyRegistered(block.id));
        }

        if self.names.contains(&name) {
            let unique = self.names.generate_unique_name(&name, false);
            tracing::info!(from = %name, to = %unique, block = ?block.id, "Renamed duplicate procedure definition");
            if let Some(field) = block.field_by_name_mut(NAME_FIELD) {
                field.set_value(&unique);
            }
            name = unique;
        }

        let key = name.to_lowercase();
        self.names.add_name(&name);
        self.definitions.insert(key.clone(), block.id);
        self.references.insert(key, Vec::new());
        Ok(name)
    }

    /// Registers a call block. Its definition must already be registered.
    pub fn add_reference(&mut self, block: &Block) -> Result<(), ProcedureError> {
        let name = procedure_name(block)?;
        let refs = self
            .references
            .get_mut(&name.to_lowercase())
            .ok_or(ProcedureError::NoSuchDefinition(name))?;
        if !refs.contains(&block.id) {
            refs.push(block.id);
        }
        Ok(())
    }

    /// Unregisters a definition and hands back its now-orphaned references.
    pub fn remove_definition(&mut self, block: BlockId) -> Result<Vec<BlockId>, ProcedureError> {
        let key = self
            .definitions
            .iter()
            .find_map(|(key, &id)| (id == block).then(|| key.clone()))
            .ok_or(ProcedureError::DefinitionNotRegistered(block))?;
        self.definitions.remove(&key);
        self.names.remove_name(&key);
        Ok(self.references.remove(&key).unwrap_or_default())
    }

    pub fn remove_reference(&mut self, block: BlockId) -> Result<(), ProcedureError> {
        for refs in self.references.values_mut() {
            if let Some(idx) = refs.iter().position(|&id| id == block) {
                refs.remove(idx);
                return Ok(());
            }
        }
        Err(ProcedureError::ReferenceNotRegistered(block))
    }

    pub fn contains_definition(&self, block: BlockId) -> bool {
        self.definitions.values().any(|&id| id == block)
    }

    pub fn contains_reference(&self, block: BlockId) -> bool {
        self.references.values().any(|refs| refs.contains(&block))
    }

    pub fn definition(&self, name: &str) -> Option<BlockId> {
        self.definitions.get(&name.to_lowercase()).copied()
    }

    /// References to a known definition (possibly empty); `None` for unknown names.
    pub fn references(&self, name: &str) -> Option<&[BlockId]> {
        self.references
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
    }

    /// References to the procedure that `definition` defines.
    pub fn references_of(&self, definition: BlockId) -> Option<&[BlockId]> {
        let key = self
            .definitions
            .iter()
            .find_map(|(key, &id)| (id == definition).then_some(key))?;
        self.references.get(key).map(Vec::as_slice)
    }

    /// Registered definitions as `(name, block)`, sorted by name.
    pub fn definitions(&self) -> Vec<(String, BlockId)> {
        let mut out: Vec<(String, BlockId)> = self
            .definitions
            .iter()
            .map(|(key, &id)| (self.names.original(key).unwrap_or(key).to_string(), id))
            .collect();
        out.sort();
        out
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    pub fn clear(&mut self) {
        self.definitions.clear();
        self.references.clear();
        self.names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::model::{Alignment, BlockFlags, BlockGraph, Input, InputKind, Uuid};
    use glam::Vec2;

    fn named_block(graph: &mut BlockGraph, block_type: &str, name: &str) -> BlockId {
        graph.insert_block_with(|id| Block {
            id,
            uuid: Uuid::new_v4(),
            block_type: block_type.to_string(),
            inputs: vec![Input {
                name: None,
                kind: InputKind::Dummy,
                align: Alignment::Left,
                fields: vec![Field::text_input(NAME_FIELD, name)],
                connection: None,
            }],
            flags: BlockFlags::default(),
            colour: None,
            tooltip: None,
            position: Vec2::ZERO,
            previous: None,
            next: None,
            output: None,
        })
    }

    #[test]
    fn test_remove_definition_hands_back_references() {
        let mut graph = BlockGraph::new();
        let def = named_block(&mut graph, "procedures_defreturn", "Area");
        let call_a = named_block(&mut graph, "procedures_callreturn", "area");
        let call_b = named_block(&mut graph, "procedures_callreturn", "AREA");

        let mut procedures = ProcedureManager::new();
        assert_eq!(procedures.add_definition(&mut graph.blocks[def]).unwrap(), "Area");
        procedures.add_reference(&graph.blocks[call_a]).unwrap();
        procedures.add_reference(&graph.blocks[call_b]).unwrap();
        // Registering the same call twice keeps one entry.
        procedures.add_reference(&graph.blocks[call_b]).unwrap();
        assert_eq!(procedures.references("area"), Some(&[call_a, call_b][..]));
        assert_eq!(procedures.references_of(def), Some(&[call_a, call_b][..]));
        assert_eq!(procedures.references_of(call_a), None);

        procedures.remove_reference(call_a).unwrap();
        assert_eq!(procedures.remove_definition(def).unwrap(), vec![call_b]);
        assert_eq!(procedures.definition_count(), 0);
        assert_eq!(procedures.references("area"), None);
    }

    #[test]
    fn test_unregistered_blocks_are_errors() {
        let mut graph = BlockGraph::new();
        let def = named_block(&mut graph, "procedures_defnoreturn", "go");
        let call = named_block(&mut graph, "procedures_callnoreturn", "stop");
        let mut procedures = ProcedureManager::new();

        assert_eq!(
            procedures.add_reference(&graph.blocks[call]),
            Err(ProcedureError::NoSuchDefinition("stop".to_string()))
        );
        assert_eq!(
            procedures.remove_definition(def),
            Err(ProcedureError::DefinitionNotRegistered(def))
        );
        assert_eq!(
            procedures.remove_reference(call),
            Err(ProcedureError::ReferenceNotRegistered(call))
        );

        procedures.add_definition(&mut graph.blocks[def]).unwrap();
        assert_eq!(
            procedures.add_definition(&mut graph.blocks[def]),
            Err(ProcedureError::AlreadyRegistered(def))
        );
    }

    #[test]
    fn test_block_kinds() {
        let mut graph = BlockGraph::new();
        let def = named_block(&mut graph, "procedures_defnoreturn", "go");
        let call = named_block(&mut graph, "procedures_callreturn", "go");
        assert!(ProcedureManager::is_definition(&graph.blocks[def]));
        assert!(!ProcedureManager::is_reference(&graph.blocks[def]));
        assert!(ProcedureManager::is_reference(&graph.blocks[call]));
    }
}
