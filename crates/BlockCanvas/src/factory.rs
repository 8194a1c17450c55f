//! # Block Factory
//!
//! Templates describe a block type; the factory turns a template into a fresh block
//! in the arena. Instances never share mutable state with the template or with
//! each other: every instantiation allocates new connections and clones the fields.
//!
//! Templates are written by hand with the builder methods or loaded from
//! Blockly-style definition JSON:
//!
//! ```json
//! {
//!   "type": "math_change",
//!   "message0": "change %1 by %2",
//!   "args0": [
//!     {"type": "field_variable", "name": "VAR", "variable": "item"},
//!     {"type": "input_value", "name": "DELTA", "check": "Number"}
//!   ],
//!   "previousStatement": null,
//!   "nextStatement": null
//! }
//! ```

use crate::config::LayoutMetrics;
use crate::error::{BlockError, Result};
use crate::field::{Field, is_field_tag};
use crate::model::{
    Alignment, Block, BlockFlags, BlockGraph, BlockId, ConnectionType, Input, InputKind, Uuid,
};
use glam::Vec2;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Presence of a previous/next/output connection, with its type checks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionTemplate {
    pub checks: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputTemplate {
    pub name: Option<String>,
    pub kind: InputKind,
    pub align: Alignment,
    pub checks: Option<Vec<String>>,
    pub fields: Vec<Field>,
}

impl InputTemplate {
    fn new(name: Option<&str>, kind: InputKind) -> Self {
        Self {
            name: name.map(str::to_string),
            kind,
            align: Alignment::Left,
            checks: None,
            fields: Vec::new(),
        }
    }

    pub fn value(name: &str) -> Self {
        Self::new(Some(name), InputKind::Value)
    }

    pub fn statement(name: &str) -> Self {
        Self::new(Some(name), InputKind::Statement)
    }

    pub fn dummy() -> Self {
        Self::new(None, InputKind::Dummy)
    }

    pub fn with_checks(mut self, checks: &[&str]) -> Self {
        self.checks = Some(checks.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_align(mut self, align: Alignment) -> Self {
        self.align = align;
        self
    }
}

/// Definition of a block type.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockTemplate {
    pub block_type: String,
    pub inputs: Vec<InputTemplate>,
    pub previous: Option<ConnectionTemplate>,
    pub next: Option<ConnectionTemplate>,
    pub output: Option<ConnectionTemplate>,
    pub colour: Option<String>,
    pub tooltip: Option<String>,
    pub flags: BlockFlags,
}

fn malformed(block_type: &str, message: impl Into<String>) -> BlockError {
    BlockError::MalformedDefinition {
        block_type: block_type.to_string(),
        message: message.into(),
    }
}

fn parse_checks(block_type: &str, value: &Value) -> Result<Option<Vec<String>>> {
    match value {
        Value::Null => Ok(None),
        Value::String(check) => Ok(Some(vec![check.clone()])),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| malformed(block_type, "type checks must be strings"))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        _ => Err(malformed(block_type, "type checks must be a string or an array")),
    }
}

fn parse_align(block_type: &str, value: Option<&Value>) -> Result<Alignment> {
    match value.and_then(Value::as_str) {
        None | Some("LEFT") => Ok(Alignment::Left),
        Some("CENTRE") | Some("CENTER") => Ok(Alignment::Centre),
        Some("RIGHT") => Ok(Alignment::Right),
        Some(other) => Err(malformed(block_type, format!("unknown alignment '{other}'"))),
    }
}

enum Token {
    Text(String),
    Arg(usize),
}

/// Splits `"set %1 to %2"` into text runs and 1-based argument references.
fn tokenize(message: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut chars = message.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            text.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }
        match digits.parse::<usize>() {
            Ok(n) => {
                tokens.push(Token::Text(std::mem::take(&mut text)));
                tokens.push(Token::Arg(n));
            }
            Err(_) => {
                text.push('%');
                text.push_str(&digits);
            }
        }
    }
    tokens.push(Token::Text(text));
    tokens
}

impl BlockTemplate {
    pub fn new(block_type: &str) -> Self {
        Self {
            block_type: block_type.to_string(),
            inputs: Vec::new(),
            previous: None,
            next: None,
            output: None,
            colour: None,
            tooltip: None,
            flags: BlockFlags::default(),
        }
    }

    fn checks(checks: &[&str]) -> ConnectionTemplate {
        ConnectionTemplate {
            checks: if checks.is_empty() {
                None
            } else {
                Some(checks.iter().map(|c| c.to_string()).collect())
            },
        }
    }

    /// Adds a previous connection. Empty `checks` accepts anything.
    pub fn with_previous(mut self, checks: &[&str]) -> Self {
        self.previous = Some(Self::checks(checks));
        self
    }

    pub fn with_next(mut self, checks: &[&str]) -> Self {
        self.next = Some(Self::checks(checks));
        self
    }

    pub fn with_output(mut self, checks: &[&str]) -> Self {
        self.output = Some(Self::checks(checks));
        self
    }

    pub fn with_input(mut self, input: InputTemplate) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_flags(mut self, flags: BlockFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Parses a single Blockly block definition.
    pub fn from_json(json: &Value) -> Result<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| malformed("", "definition is not an object"))?;
        let block_type = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("", "definition has no 'type'"))?;

        let mut template = BlockTemplate::new(block_type);

        for n in 0.. {
            let Some(message) = obj.get(&format!("message{n}")) else {
                break;
            };
            let message = message
                .as_str()
                .ok_or_else(|| malformed(block_type, format!("message{n} is not a string")))?;
            let args = match obj.get(&format!("args{n}")) {
                Some(Value::Array(args)) => args.as_slice(),
                Some(_) => return Err(malformed(block_type, format!("args{n} is not an array"))),
                None => &[],
            };
            let last_align = parse_align(block_type, obj.get(&format!("lastDummyAlign{n}")))?;
            template.interpolate(message, args, last_align)?;
        }

        template.previous = connection_from(obj, block_type, "previousStatement")?;
        template.next = connection_from(obj, block_type, "nextStatement")?;
        template.output = connection_from(obj, block_type, "output")?;
        if template.previous.is_some() && template.output.is_some() {
            return Err(malformed(
                block_type,
                "a block cannot have both an output and a previous connection",
            ));
        }

        template.colour = match obj.get("colour") {
            Some(Value::String(colour)) => Some(colour.clone()),
            Some(Value::Number(hue)) => Some(hue.to_string()),
            _ => None,
        };
        template.tooltip = obj
            .get("tooltip")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(template)
    }

    /// Appends the inputs described by one `messageN`/`argsN` pair.
    fn interpolate(&mut self, message: &str, args: &[Value], last_align: Alignment) -> Result<()> {
        let block_type = self.block_type.clone();
        let mut pending: Vec<Field> = Vec::new();
        let mut used = vec![false; args.len()];

        for token in tokenize(message) {
            match token {
                Token::Text(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        pending.push(Field::label(text));
                    }
                }
                Token::Arg(n) => {
                    let arg = n
                        .checked_sub(1)
                        .and_then(|idx| args.get(idx))
                        .ok_or_else(|| malformed(&block_type, format!("message references missing %{n}")))?;
                    used[n - 1] = true;
                    let tag = arg.get("type").and_then(Value::as_str).unwrap_or_default();
                    if is_field_tag(tag) || !tag.starts_with("input_") {
                        let field = Field::from_json(arg).map_err(|err| match err {
                            BlockError::MalformedDefinition { message, .. } => {
                                malformed(&block_type, message)
                            }
                            other => other,
                        })?;
                        pending.push(field);
                        continue;
                    }
                    let kind = match tag {
                        "input_value" => InputKind::Value,
                        "input_statement" => InputKind::Statement,
                        "input_dummy" => InputKind::Dummy,
                        other => return Err(malformed(&block_type, format!("unknown input type '{other}'"))),
                    };
                    let checks = match arg.get("check") {
                        Some(check) if kind != InputKind::Dummy => parse_checks(&block_type, check)?,
                        _ => None,
                    };
                    let name = arg.get("name").and_then(Value::as_str).map(str::to_string);
                    if name.is_none() && kind != InputKind::Dummy {
                        return Err(malformed(&block_type, format!("%{n} is a {tag} without a name")));
                    }
                    self.inputs.push(InputTemplate {
                        name,
                        kind,
                        align: parse_align(&block_type, arg.get("align"))?,
                        checks,
                        fields: std::mem::take(&mut pending),
                    });
                }
            }
        }

        if let Some(unused) = used.iter().position(|used| !used) {
            return Err(malformed(&block_type, format!("argument %{} is never referenced", unused + 1)));
        }
        if !pending.is_empty() {
            self.inputs.push(InputTemplate {
                align: last_align,
                fields: pending,
                ..InputTemplate::dummy()
            });
        }
        Ok(())
    }
}

fn connection_from(
    obj: &Map<String, Value>,
    block_type: &str,
    key: &str,
) -> Result<Option<ConnectionTemplate>> {
    obj.get(key)
        .map(|value| {
            Ok(ConnectionTemplate {
                checks: parse_checks(block_type, value)?,
            })
        })
        .transpose()
}

/// Registry of block templates by type name.
#[derive(Clone, Debug, Default)]
pub struct BlockFactory {
    templates: HashMap<String, BlockTemplate>,
}

impl BlockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template: BlockTemplate) {
        if self.templates.contains_key(&template.block_type) {
            tracing::warn!(block_type = %template.block_type, "Replacing existing block definition");
        }
        self.templates.insert(template.block_type.clone(), template);
    }

    /// Loads a JSON array (or a single object) of block definitions and returns the
    /// registered type names. Nothing is registered if any definition is invalid.
    pub fn add_json_definitions(&mut self, json: &str) -> Result<Vec<String>> {
        let value: Value = serde_json::from_str(json)?;
        let templates = match &value {
            Value::Array(items) => items
                .iter()
                .map(BlockTemplate::from_json)
                .collect::<Result<Vec<_>>>()?,
            single => vec![BlockTemplate::from_json(single)?],
        };
        let names: Vec<String> = templates.iter().map(|t| t.block_type.clone()).collect();
        for template in templates {
            self.register(template);
        }
        tracing::debug!(count = names.len(), "Loaded block definitions");
        Ok(names)
    }

    pub fn contains(&self, block_type: &str) -> bool {
        self.templates.contains_key(block_type)
    }

    pub fn template(&self, block_type: &str) -> Option<&BlockTemplate> {
        self.templates.get(block_type)
    }

    /// Registered type names, sorted.
    pub fn block_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }

    /// Builds a new, detached block of `block_type` in `graph`.
    pub fn instantiate(
        &self,
        graph: &mut BlockGraph,
        block_type: &str,
        metrics: &LayoutMetrics,
    ) -> Result<BlockId> {
        let template = self
            .templates
            .get(block_type)
            .ok_or_else(|| BlockError::UnknownBlockType(block_type.to_string()))?;
        if template.previous.is_some() && template.output.is_some() {
            return Err(malformed(
                block_type,
                "a block cannot have both an output and a previous connection",
            ));
        }
        if template
            .inputs
            .iter()
            .any(|input| input.kind != InputKind::Dummy && input.name.is_none())
        {
            return Err(malformed(block_type, "value and statement inputs must be named"));
        }

        let id = graph.insert_block_with(|id| Block {
            id,
            uuid: Uuid::new_v4(),
            block_type: template.block_type.clone(),
            inputs: template
                .inputs
                .iter()
                .map(|input| Input {
                    name: input.name.clone(),
                    kind: input.kind,
                    align: input.align,
                    fields: input.fields.clone(),
                    connection: None,
                })
                .collect(),
            flags: template.flags,
            colour: template.colour.clone(),
            tooltip: template.tooltip.clone(),
            position: Vec2::ZERO,
            previous: None,
            next: None,
            output: None,
        });

        let mut row = 0.0_f32;
        let mut input_conns = Vec::with_capacity(template.inputs.len());
        for (idx, input) in template.inputs.iter().enumerate() {
            let offset = match input.kind {
                InputKind::Value => Some(Vec2::new(metrics.block_width, row)),
                InputKind::Statement => Some(Vec2::new(metrics.statement_indent, row + metrics.row_height)),
                InputKind::Dummy => None,
            };
            row += match input.kind {
                InputKind::Statement => 2.0 * metrics.row_height,
                _ => metrics.row_height,
            };
            if let Some(offset) = offset {
                let conn = graph.insert_connection(
                    id,
                    ConnectionType::Input,
                    Some(idx),
                    input.kind == InputKind::Statement,
                    input.checks.clone(),
                );
                graph.connections[conn].offset = offset;
                input_conns.push((idx, conn));
            }
        }
        let height = row.max(metrics.row_height);

        let previous = template
            .previous
            .as_ref()
            .map(|c| graph.insert_connection(id, ConnectionType::Previous, None, false, c.checks.clone()));
        let output = template
            .output
            .as_ref()
            .map(|c| graph.insert_connection(id, ConnectionType::Output, None, false, c.checks.clone()));
        let next = template.next.as_ref().map(|c| {
            let conn = graph.insert_connection(id, ConnectionType::Next, None, false, c.checks.clone());
            graph.connections[conn].offset = Vec2::new(0.0, height);
            conn
        });

        let block = &mut graph.blocks[id];
        for (idx, conn) in input_conns {
            block.inputs[idx].connection = Some(conn);
        }
        block.previous = previous;
        block.output = output;
        block.next = next;

        tracing::trace!(block = ?id, block_type, "Instantiated block");
        Ok(id)
    }
}
