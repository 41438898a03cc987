//! # Sketch Code Generation
//!
//! Arduino C++ generation for block workspaces.

mod cpp_codegen;
mod node_handlers;

pub use cpp_codegen::*;
pub(crate) use node_handlers::*;

use crate::blocks::FieldValue;
use crate::workspace::BlockId;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Text substituted for a statement slot with nothing plugged in.
pub const EMPTY_SLOT_PLACEHOLDER: &str = "// (no blocks)\n";

/// One indentation level in generated code.
pub const INDENT: &str = "  ";

/// C++ operator precedence, lower binds tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Order(pub u8);

impl Order {
    pub const ATOMIC: Order = Order(0);
    pub const UNARY_POSTFIX: Order = Order(1);
    pub const UNARY_PREFIX: Order = Order(2);
    pub const MULTIPLICATIVE: Order = Order(3);
    pub const ADDITIVE: Order = Order(4);
    pub const SHIFT: Order = Order(5);
    pub const RELATIONAL: Order = Order(6);
    pub const EQUALITY: Order = Order(7);
    pub const LOGICAL_AND: Order = Order(11);
    pub const LOGICAL_OR: Order = Order(12);
    pub const CONDITIONAL: Order = Order(13);
    pub const ASSIGNMENT: Order = Order(14);
    pub const NONE: Order = Order(99);

    /// Whether an expression of order `inner` needs parentheses inside a slot of `self`.
    pub fn needs_parens(self, inner: Order) -> bool {
        if self > inner {
            return false;
        }
        !(self == inner && (self == Order::ATOMIC || self == Order::NONE))
    }
}

/// Output of one block generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedFragment {
    /// Complete lines, each terminated by a newline
    Statement(String),
    /// An expression and the precedence of its outermost operator
    Value { code: String, order: Order },
}

impl GeneratedFragment {
    pub fn statement(code: impl Into<String>) -> Self {
        GeneratedFragment::Statement(code.into())
    }

    pub fn value(code: impl Into<String>, order: Order) -> Self {
        GeneratedFragment::Value {
            code: code.into(),
            order,
        }
    }
}

/// Everything a block generator can see about the block being generated.
///
/// Nested statement chains are handed over unindented; the container block
/// indents them itself.
#[derive(Debug)]
pub struct BlockContext<'a> {
    pub block: BlockId,
    /// Number of enclosing non-root statement containers
    pub depth: usize,
    fields: &'a IndexMap<String, FieldValue>,
    statements: HashMap<&'static str, String>,
    values: HashMap<&'static str, String>,
}

impl<'a> BlockContext<'a> {
    pub(crate) fn new(
        block: BlockId,
        depth: usize,
        fields: &'a IndexMap<String, FieldValue>,
        statements: HashMap<&'static str, String>,
        values: HashMap<&'static str, String>,
    ) -> Self {
        Self {
            block,
            depth,
            fields,
            statements,
            values,
        }
    }

    pub fn field(&self, name: &str) -> String {
        self.fields.get(name).map(|v| v.to_string()).unwrap_or_default()
    }

    pub fn number(&self, name: &str) -> u64 {
        self.fields
            .get(name)
            .and_then(FieldValue::as_number)
            .unwrap_or(0)
    }

    /// Code of a nested statement slot, or the placeholder when it is empty.
    pub fn statement(&self, name: &str) -> &str {
        self.statements
            .get(name)
            .map(String::as_str)
            .unwrap_or(EMPTY_SLOT_PLACEHOLDER)
    }

    /// Expression for a value slot, already parenthesised for the slot.
    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("0")
    }

    /// Counter variable for a loop construct at this depth.
    pub fn loop_variable(&self) -> String {
        match self.depth {
            0 => "i".to_string(),
            1 => "j".to_string(),
            2 => "k".to_string(),
            n => format!("i{}", n),
        }
    }
}

/// Prefix every non-empty line of `code` with `levels` indents.
pub fn indent(code: &str, levels: usize) -> String {
    let prefix = INDENT.repeat(levels);
    let mut out = String::with_capacity(code.len() + prefix.len() * 4);
    for line in code.lines() {
        if !line.trim().is_empty() {
            out.push_str(&prefix);
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_prefixes_each_line() {
        assert_eq!(indent("a();\nb();\n", 1), "  a();\n  b();\n");
        assert_eq!(indent("x;\n", 2), "    x;\n");
    }

    #[test]
    fn test_needs_parens() {
        assert!(!Order::NONE.needs_parens(Order::RELATIONAL));
        assert!(Order::RELATIONAL.needs_parens(Order::RELATIONAL));
        assert!(Order::RELATIONAL.needs_parens(Order::EQUALITY));
        assert!(!Order::RELATIONAL.needs_parens(Order::UNARY_POSTFIX));
        assert!(!Order::ATOMIC.needs_parens(Order::ATOMIC));
    }
}
