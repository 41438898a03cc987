//! # Block Types
//!
//! Declarative schema for every block kind: its fields, its sockets, a couple
//! of rendering hints and the generator that turns an instance into code.

mod library;
mod registry;

pub use library::*;
pub use registry::BlockRegistry;

use crate::board::BoardDescriptor;
use crate::codegen::{BlockContext, GeneratedFragment, Order};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind name of the `setup()` root block.
pub const ROOT_SETUP: &str = "root_setup";
/// Kind name of the `loop()` root block.
pub const ROOT_LOOP: &str = "root_loop";

/// Generator invoked once per block instance.
pub type GeneratorFn = fn(&BlockContext<'_>) -> GeneratedFragment;

/// Computes dropdown options from the active board at query time.
pub type OptionsResolver = fn(&BoardDescriptor) -> Vec<FieldOption>;

/// The two mandatory, non-deletable top-level blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    Setup,
    Loop,
}

impl RootKind {
    pub const ALL: [RootKind; 2] = [RootKind::Setup, RootKind::Loop];

    pub fn kind_name(self) -> &'static str {
        match self {
            RootKind::Setup => ROOT_SETUP,
            RootKind::Loop => ROOT_LOOP,
        }
    }

    pub fn from_kind_name(kind: &str) -> Option<Self> {
        match kind {
            ROOT_SETUP => Some(RootKind::Setup),
            ROOT_LOOP => Some(RootKind::Loop),
            _ => None,
        }
    }
}

/// How the graph API treats a block kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCategory {
    /// Protected singleton; never deleted, never nested
    Root(RootKind),
    /// Chains through previous/next sockets
    Statement,
    /// Produces an expression for a value slot
    Value,
}

/// A persisted field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(u64),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<u64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// One dropdown entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldOption {
    pub label: String,
    pub value: String,
}

impl FieldOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Where a dropdown gets its options from.
#[derive(Debug, Clone, Copy)]
pub enum OptionsSource {
    Static(&'static [(&'static str, &'static str)]),
    /// Resolved against the active board every time options are queried
    Board(OptionsResolver),
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Dropdown(OptionsSource),
    /// Non-negative integer
    Number { default: u64 },
    Text { default: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn dropdown(name: &'static str, options: &'static [(&'static str, &'static str)]) -> Self {
        Self {
            name,
            kind: FieldKind::Dropdown(OptionsSource::Static(options)),
        }
    }

    pub const fn board_dropdown(name: &'static str, resolver: OptionsResolver) -> Self {
        Self {
            name,
            kind: FieldKind::Dropdown(OptionsSource::Board(resolver)),
        }
    }

    pub const fn number(name: &'static str, default: u64) -> Self {
        Self {
            name,
            kind: FieldKind::Number { default },
        }
    }

    pub const fn text(name: &'static str, default: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text { default },
        }
    }

    /// Options offered for this field on `board`; empty for non-dropdowns.
    pub fn options(&self, board: &BoardDescriptor) -> Vec<FieldOption> {
        match self.kind {
            FieldKind::Dropdown(OptionsSource::Static(options)) => options
                .iter()
                .map(|(label, value)| FieldOption::new(*label, *value))
                .collect(),
            FieldKind::Dropdown(OptionsSource::Board(resolver)) => resolver(board),
            FieldKind::Number { .. } | FieldKind::Text { .. } => Vec::new(),
        }
    }

    /// Value a fresh block starts with.
    pub fn default_value(&self, board: &BoardDescriptor) -> FieldValue {
        match self.kind {
            FieldKind::Dropdown(_) => FieldValue::Text(
                self.options(board)
                    .into_iter()
                    .next()
                    .map(|o| o.value)
                    .unwrap_or_default(),
            ),
            FieldKind::Number { default } => FieldValue::Number(default),
            FieldKind::Text { default } => FieldValue::Text(default.to_string()),
        }
    }

    pub fn is_board_dependent(&self) -> bool {
        matches!(self.kind, FieldKind::Dropdown(OptionsSource::Board(_)))
    }

    /// Validate and normalise a candidate value, returning the reason on rejection.
    pub fn validate(&self, value: FieldValue, board: &BoardDescriptor) -> Result<FieldValue, String> {
        match self.kind {
            FieldKind::Dropdown(_) => {
                let text = value.to_string();
                if self.options(board).iter().any(|o| o.value == text) {
                    Ok(FieldValue::Text(text))
                } else {
                    Err(format!("'{}' is not one of the available options", text))
                }
            }
            FieldKind::Number { .. } => match value {
                FieldValue::Number(n) => Ok(FieldValue::Number(n)),
                FieldValue::Text(text) => text
                    .trim()
                    .parse::<u64>()
                    .map(FieldValue::Number)
                    .map_err(|_| format!("'{}' is not a non-negative integer", text)),
            },
            FieldKind::Text { .. } => Ok(FieldValue::Text(value.to_string())),
        }
    }
}

/// A value input and the literal used when nothing is plugged in.
#[derive(Debug, Clone, Copy)]
pub struct ValueSlot {
    pub name: &'static str,
    /// Binding strength the surrounding code needs from the plugged expression
    pub order: Order,
    pub empty_default: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct Sockets {
    pub previous: bool,
    pub next: bool,
    pub output: bool,
    pub statement_slots: Vec<&'static str>,
    pub value_slots: Vec<ValueSlot>,
}

impl Sockets {
    pub fn has_statement_slot(&self, name: &str) -> bool {
        self.statement_slots.iter().any(|s| *s == name)
    }

    pub fn value_slot(&self, name: &str) -> Option<&ValueSlot> {
        self.value_slots.iter().find(|s| s.name == name)
    }
}

/// Full schema of one block kind.
#[derive(Debug, Clone)]
pub struct BlockType {
    pub kind: &'static str,
    /// Message template shown by the editor
    pub label: &'static str,
    /// Hue hint for the editor
    pub colour: u16,
    pub category: BlockCategory,
    pub fields: Vec<FieldSpec>,
    pub sockets: Sockets,
    pub generator: GeneratorFn,
}

impl BlockType {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn root_kind(&self) -> Option<RootKind> {
        match self.category {
            BlockCategory::Root(root) => Some(root),
            _ => None,
        }
    }
}
