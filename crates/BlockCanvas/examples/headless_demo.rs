use anyhow::Context;
use block_canvas::{BlockFactory, BlocklyController, WorkspaceConfig};
use glam::Vec2;

const DEFINITIONS: &str = r#"[
    {
        "type": "controls_repeat",
        "message0": "repeat %1 times %2 do %3",
        "args0": [
            {"type": "input_value", "name": "TIMES", "check": "Number"},
            {"type": "input_dummy"},
            {"type": "input_statement", "name": "DO"}
        ],
        "previousStatement": null,
        "nextStatement": null
    },
    {
        "type": "text_print",
        "message0": "print %1",
        "args0": [{"type": "input_value", "name": "TEXT"}],
        "previousStatement": null,
        "nextStatement": null
    },
    {
        "type": "text",
        "message0": "\" %1 \"",
        "args0": [{"type": "field_input", "name": "TEXT", "text": "hello"}],
        "output": "String"
    },
    {
        "type": "math_number",
        "message0": "%1",
        "args0": [{"type": "field_input", "name": "NUM", "text": "3"}],
        "output": "Number"
    }
]"#;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== BlockCanvas Headless Demo ===");

    // 1. Register block definitions
    let mut factory = BlockFactory::new();
    let types = factory.add_json_definitions(DEFINITIONS)?;
    println!("Registered block types: {types:?}");

    let mut ctrl = BlocklyController::new(WorkspaceConfig::default(), factory);

    // 2. Populate the workspace
    let repeat = ctrl.add_block_from_template("controls_repeat", Vec2::new(100.0, 100.0))?;
    let print = ctrl.add_block_from_template("text_print", Vec2::new(400.0, 100.0))?;
    let text = ctrl.add_block_from_template("text", Vec2::new(700.0, 100.0))?;
    let number = ctrl.add_block_from_template("math_number", Vec2::new(700.0, 300.0))?;

    // 3. Wire values directly
    let graph = ctrl.workspace().graph();
    let text_out = graph.block(text).and_then(|b| b.output_connection()).context("text has no output")?;
    let print_in = graph
        .block(print)
        .and_then(|b| b.input_by_name("TEXT"))
        .and_then(|i| i.connection())
        .context("print has no TEXT input")?;
    let number_out = graph
        .block(number)
        .and_then(|b| b.output_connection())
        .context("number has no output")?;
    let times_in = graph
        .block(repeat)
        .and_then(|b| b.input_by_name("TIMES"))
        .and_then(|i| i.connection())
        .context("repeat has no TIMES input")?;
    ctrl.connect(text_out, print_in)?;
    ctrl.connect(number_out, times_in)?;

    // 4. Drag the print block into the loop body
    let graph = ctrl.workspace().graph();
    let body = graph
        .block(repeat)
        .and_then(|b| b.input_by_name("DO"))
        .and_then(|i| i.connection())
        .and_then(|c| graph.connection(c))
        .context("repeat has no DO input")?;
    let drop_at = body.position() + Vec2::new(6.0, 8.0);

    ctrl.drag_start(print)?;
    for frame in 1..=4 {
        let t = frame as f32 / 4.0;
        let start = Vec2::new(400.0, 100.0);
        let candidate = ctrl.drag_move(print, start.lerp(drop_at, t))?;
        println!("Frame {frame}: snap candidate {candidate:?}");
    }
    let joined = ctrl.drag_end(print)?;
    println!("Dropped print block, joined {joined:?}");

    // 5. Report
    for event in ctrl.drain_events() {
        println!("  {event:?}");
    }
    println!("Root blocks: {}", ctrl.workspace().root_blocks().len());

    let saved = ctrl.workspace().save();
    println!("{}", serde_json::to_string_pretty(&saved)?);
    Ok(())
}
