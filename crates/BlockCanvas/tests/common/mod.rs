#![allow(dead_code)]

use block_canvas::{BlockFactory, BlockId, BlocklyController, ConnectionId, WorkspaceConfig};
use glam::Vec2;
use std::collections::HashSet;

/// Block definitions shared by the integration tests.
pub const TEST_BLOCKS: &str = r#"[
  {
    "type": "statement_no_input",
    "message0": "do something",
    "previousStatement": null,
    "nextStatement": null
  },
  {
    "type": "statement_input_no_next",
    "message0": "repeat %1",
    "args0": [{"type": "input_statement", "name": "STATEMENT"}],
    "previousStatement": null
  },
  {
    "type": "statement_value_input",
    "message0": "print %1",
    "args0": [{"type": "input_value", "name": "VALUE"}],
    "previousStatement": null,
    "nextStatement": null
  },
  {
    "type": "simple_input_output",
    "message0": "not %1",
    "args0": [{"type": "input_value", "name": "VALUE"}],
    "output": null
  },
  {
    "type": "multiple_input_output",
    "message0": "%1 + %2",
    "args0": [
      {"type": "input_value", "name": "LEFT"},
      {"type": "input_value", "name": "RIGHT"}
    ],
    "output": null
  },
  {
    "type": "output_no_input",
    "message0": "true",
    "output": null
  },
  {
    "type": "number_output",
    "message0": "%1",
    "args0": [{"type": "field_input", "name": "NUM", "text": "0"}],
    "output": "Number"
  },
  {
    "type": "string_input",
    "message0": "say %1",
    "args0": [{"type": "input_value", "name": "TEXT", "check": "String"}],
    "previousStatement": null,
    "nextStatement": null
  },
  {
    "type": "variables_get",
    "message0": "%1",
    "args0": [{"type": "field_variable", "name": "VAR", "variable": "item"}],
    "output": null
  },
  {
    "type": "procedures_defnoreturn",
    "message0": "to %1 %2",
    "args0": [
      {"type": "field_input", "name": "NAME", "text": "do something"},
      {"type": "input_statement", "name": "STACK"}
    ],
    "colour": 290
  },
  {
    "type": "procedures_callnoreturn",
    "message0": "call %1",
    "args0": [{"type": "field_input", "name": "NAME", "text": "do something"}],
    "previousStatement": null,
    "nextStatement": null,
    "colour": 290
  }
]"#;

pub fn test_factory() -> BlockFactory {
    let mut factory = BlockFactory::new();
    factory
        .add_json_definitions(TEST_BLOCKS)
        .expect("test block definitions should parse");
    factory
}

pub fn controller() -> BlocklyController {
    BlocklyController::new(WorkspaceConfig::default(), test_factory())
}

pub fn add_block(ctrl: &mut BlocklyController, block_type: &str, x: f32, y: f32) -> BlockId {
    ctrl.add_block_from_template(block_type, Vec2::new(x, y))
        .expect("block type should be registered")
}

pub fn previous(ctrl: &BlocklyController, block: BlockId) -> ConnectionId {
    ctrl.workspace().graph().block(block).unwrap().previous_connection().unwrap()
}

pub fn next(ctrl: &BlocklyController, block: BlockId) -> ConnectionId {
    ctrl.workspace().graph().block(block).unwrap().next_connection().unwrap()
}

pub fn output(ctrl: &BlocklyController, block: BlockId) -> ConnectionId {
    ctrl.workspace().graph().block(block).unwrap().output_connection().unwrap()
}

pub fn input(ctrl: &BlocklyController, block: BlockId, name: &str) -> ConnectionId {
    ctrl.workspace()
        .graph()
        .block(block)
        .unwrap()
        .input_by_name(name)
        .and_then(|input| input.connection())
        .unwrap()
}

pub fn position(ctrl: &BlocklyController, block: BlockId) -> Vec2 {
    ctrl.workspace().graph().block(block).unwrap().position()
}

pub fn conn_position(ctrl: &BlocklyController, conn: ConnectionId) -> Vec2 {
    ctrl.workspace().graph().connection(conn).unwrap().position()
}

/// Checks the structural invariants that must hold after every operation.
pub fn assert_consistent(ctrl: &BlocklyController) {
    let ws = ctrl.workspace();
    let graph = ws.graph();
    assert!(graph.links_are_symmetric(), "links must be symmetric");
    assert!(ws.connection_manager().is_sorted(graph), "index must stay sorted");

    // Walk by hand so a cycle fails the test instead of hanging it.
    let mut seen = HashSet::new();
    for &root in ws.root_blocks() {
        assert!(graph.parent_block(root).is_none(), "root {root:?} has a parent");
        let mut stack = vec![root];
        while let Some(block) = stack.pop() {
            assert!(seen.insert(block), "block {block:?} reached twice");
            stack.extend(graph.child_blocks(block));
        }
    }
    for (id, _) in graph.blocks() {
        assert!(seen.contains(&id), "block {id:?} is not reachable from a root");
    }
}
