//! # Arduino C++ Generator
//!
//! Walks the block graph from the two roots and asks every block's generator
//! for its fragment. Top-level blocks that are not roots are never emitted.

use super::{BlockContext, GeneratedFragment};
use crate::blocks::{BlockCategory, BlockRegistry, RootKind};
use crate::error::GenerationError;
use crate::workspace::{BlockId, Workspace};
use std::collections::{HashMap, HashSet};

/// Sketch generator for one workspace snapshot in time
pub struct SketchCodeGenerator<'a> {
    workspace: &'a Workspace,
    registry: &'a BlockRegistry,
    visited: HashSet<BlockId>,
}

impl<'a> SketchCodeGenerator<'a> {
    pub fn new(workspace: &'a Workspace, registry: &'a BlockRegistry) -> Self {
        Self {
            workspace,
            registry,
            visited: HashSet::new(),
        }
    }

    /// Generate `setup()` followed by `loop()`
    pub fn generate_program(mut self) -> Result<String, GenerationError> {
        let mut code = String::new();

        for (index, root) in RootKind::ALL.into_iter().enumerate() {
            let root_id = self
                .workspace
                .root(root)
                .ok_or(GenerationError::MissingRoot(root.kind_name()))?;

            tracing::debug!("[CODEGEN] Generating '{}' from {}", root.kind_name(), root_id);

            if index > 0 {
                code.push('\n');
            }
            match self.generate_block(root_id, 0)? {
                GeneratedFragment::Statement(text) => code.push_str(&text),
                GeneratedFragment::Value { code: expr, .. } => {
                    code.push_str(&expr);
                    code.push('\n');
                }
            }
        }

        Ok(code)
    }

    /// Generate a statement chain in link order
    fn generate_chain(&mut self, head: BlockId, depth: usize) -> Result<String, GenerationError> {
        let mut code = String::new();
        let mut current = Some(head);

        while let Some(id) = current {
            match self.generate_block(id, depth)? {
                GeneratedFragment::Statement(text) => code.push_str(&text),
                GeneratedFragment::Value { code: expr, .. } => {
                    code.push_str(&expr);
                    code.push_str(";\n");
                }
            }
            current = self.lookup(id, id)?.next;
        }

        Ok(code)
    }

    fn lookup(
        &self,
        from: BlockId,
        id: BlockId,
    ) -> Result<&'a crate::workspace::BlockInstance, GenerationError> {
        self.workspace
            .block(id)
            .ok_or(GenerationError::DanglingReference { from, missing: id })
    }

    /// Generate one block, recursing into its slots first
    fn generate_block(&mut self, id: BlockId, depth: usize) -> Result<GeneratedFragment, GenerationError> {
        if !self.visited.insert(id) {
            return Err(GenerationError::Cycle(id));
        }

        let block = self.lookup(id, id)?;
        let block_type = self.registry.get(&block.kind).ok_or_else(|| {
            GenerationError::UnknownBlockKind {
                block: id,
                kind: block.kind.clone(),
            }
        })?;

        let child_depth = match block_type.category {
            BlockCategory::Root(_) => depth,
            _ => depth + 1,
        };

        let mut statements = HashMap::new();
        for slot in &block_type.sockets.statement_slots {
            if let Some(head) = block.statements.get(*slot).copied().flatten() {
                self.lookup(id, head)?;
                let chain = self.generate_chain(head, child_depth)?;
                statements.insert(*slot, chain);
            }
        }

        let mut values = HashMap::new();
        for slot in &block_type.sockets.value_slots {
            let expr = match block.values.get(slot.name).copied().flatten() {
                Some(child) => {
                    self.lookup(id, child)?;
                    match self.generate_block(child, depth)? {
                        GeneratedFragment::Value { code, order } => {
                            if slot.order.needs_parens(order) {
                                format!("({})", code)
                            } else {
                                code
                            }
                        }
                        GeneratedFragment::Statement(text) => text.trim_end().to_string(),
                    }
                }
                None => slot.empty_default.to_string(),
            };
            values.insert(slot.name, expr);
        }

        tracing::trace!("[CODEGEN] {} '{}' at depth {}", id, block.kind, depth);
        let ctx = BlockContext::new(id, depth, &block.fields, statements, values);
        Ok((block_type.generator)(&ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockType, Sockets};
    use crate::workspace::StatementTarget;
    use std::sync::Arc;

    const EMPTY_SKETCH: &str = "void setup() {\n  // (no blocks)\n}\n\nvoid loop() {\n  // (no blocks)\n}\n";

    fn workspace() -> Workspace {
        Workspace::new(Arc::new(BlockRegistry::builtin()), "nano").unwrap()
    }

    fn generate(ws: &Workspace) -> String {
        SketchCodeGenerator::new(ws, ws.registry()).generate_program().unwrap()
    }

    #[test]
    fn test_empty_workspace() {
        assert_eq!(generate(&workspace()), EMPTY_SKETCH);
    }

    #[test]
    fn test_setup_emitted_before_loop_regardless_of_creation_order() {
        let registry = Arc::new(BlockRegistry::builtin());
        let mut ws = Workspace::without_roots(registry, "nano").unwrap();
        ws.create_block(crate::blocks::ROOT_LOOP).unwrap();
        ws.create_block(crate::blocks::ROOT_SETUP).unwrap();
        assert_eq!(generate(&ws), EMPTY_SKETCH);
    }

    #[test]
    fn test_missing_root() {
        let registry = Arc::new(BlockRegistry::builtin());
        let ws = Workspace::without_roots(registry, "nano").unwrap();
        let result = SketchCodeGenerator::new(&ws, ws.registry()).generate_program();
        assert_eq!(result, Err(GenerationError::MissingRoot("root_setup")));
    }

    #[test]
    fn test_orphans_are_ignored() {
        let mut ws = workspace();
        ws.create_block("delay_ms").unwrap();
        assert_eq!(generate(&ws), EMPTY_SKETCH);
    }

    #[test]
    fn test_value_slots_and_defaults() {
        let mut ws = workspace();
        let setup = ws.root(RootKind::Setup).unwrap();
        let print = ws.create_block("serial_print").unwrap();
        let empty_print = ws.create_block("serial_print").unwrap();
        let read = ws.create_block("analog_read").unwrap();
        ws.set_field(read, "PIN", "5").unwrap();
        ws.connect_value(print, "TEXT", read).unwrap();
        ws.connect_statement(setup, StatementTarget::slot("DO"), print).unwrap();
        ws.connect_statement(print, StatementTarget::Next, empty_print).unwrap();

        let code = generate(&ws);
        assert!(code.starts_with(
            "void setup() {\n  Serial.println(analogRead(5));\n  Serial.println(\"\");\n}\n"
        ));
    }

    #[test]
    fn test_precedence_parenthesises_nested_comparison() {
        let mut ws = workspace();
        let lp = ws.root(RootKind::Loop).unwrap();
        let cond = ws.create_block("if_then").unwrap();
        let outer = ws.create_block("compare").unwrap();
        let inner = ws.create_block("compare").unwrap();
        let read = ws.create_block("digital_read").unwrap();
        ws.set_field(read, "PIN", "7").unwrap();
        ws.set_field(inner, "OP", ">").unwrap();
        ws.set_field(outer, "OP", "==").unwrap();
        ws.connect_value(inner, "A", read).unwrap();
        ws.connect_value(outer, "A", inner).unwrap();
        ws.connect_value(cond, "CONDITION", outer).unwrap();
        ws.connect_statement(lp, StatementTarget::slot("DO"), cond).unwrap();

        let code = generate(&ws);
        assert!(code.contains(
            "void loop() {\n  if ((digitalRead(7) > 0) == 0) {\n    // (no blocks)\n  }\n}\n"
        ), "{}", code);
    }

    #[test]
    fn test_if_without_condition_uses_false() {
        let mut ws = workspace();
        let lp = ws.root(RootKind::Loop).unwrap();
        let cond = ws.create_block("if_then").unwrap();
        ws.connect_statement(lp, StatementTarget::slot("DO"), cond).unwrap();
        assert!(generate(&ws).contains("  if (false) {\n"));
    }

    #[test]
    fn test_nested_repeat_uses_distinct_counters() {
        let mut ws = workspace();
        let lp = ws.root(RootKind::Loop).unwrap();
        let outer = ws.create_block("repeat_times").unwrap();
        let inner = ws.create_block("repeat_times").unwrap();
        let delay = ws.create_block("delay_ms").unwrap();
        ws.set_field(outer, "TIMES", 3u64).unwrap();
        ws.set_field(inner, "TIMES", 2u64).unwrap();
        ws.connect_statement(lp, StatementTarget::slot("DO"), outer).unwrap();
        ws.connect_statement(outer, StatementTarget::slot("DO"), inner).unwrap();
        ws.connect_statement(inner, StatementTarget::slot("DO"), delay).unwrap();

        let expected = "void loop() {\n\
                        \x20 for (unsigned long i = 0; i < 3; i++) {\n\
                        \x20   for (unsigned long j = 0; j < 2; j++) {\n\
                        \x20     delay(1000);\n\
                        \x20   }\n\
                        \x20 }\n\
                        }\n";
        assert!(generate(&ws).ends_with(expected), "{}", generate(&ws));
    }

    #[test]
    fn test_large_repeat_count_fits_counter() {
        let mut ws = workspace();
        let lp = ws.root(RootKind::Loop).unwrap();
        let repeat = ws.create_block("repeat_times").unwrap();
        ws.set_field(repeat, "TIMES", 40000u64).unwrap();
        ws.connect_statement(lp, StatementTarget::slot("DO"), repeat).unwrap();

        let code = generate(&ws);
        assert!(code.contains("  for (unsigned long i = 0; i < 40000; i++) {\n"), "{}", code);
    }

    fn servo_write(_: &BlockContext<'_>) -> GeneratedFragment {
        GeneratedFragment::statement("servo();\n")
    }

    #[test]
    fn test_unknown_kind_aborts_generation() {
        let mut custom = BlockRegistry::builtin();
        custom.register(BlockType {
            kind: "servo_write",
            label: "servo %1",
            colour: 0,
            category: BlockCategory::Statement,
            fields: Vec::new(),
            sockets: Sockets {
                previous: true,
                next: true,
                ..Sockets::default()
            },
            generator: servo_write,
        });
        let mut ws = Workspace::new(Arc::new(custom), "nano").unwrap();
        let lp = ws.root(RootKind::Loop).unwrap();
        let servo = ws.create_block("servo_write").unwrap();
        ws.connect_statement(lp, StatementTarget::slot("DO"), servo).unwrap();

        assert!(generate(&ws).contains("  servo();\n"));

        let builtin = BlockRegistry::builtin();
        let result = SketchCodeGenerator::new(&ws, &builtin).generate_program();
        assert_eq!(
            result,
            Err(GenerationError::UnknownBlockKind {
                block: servo,
                kind: "servo_write".to_string()
            })
        );
    }
}
