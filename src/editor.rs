//! # Editor Session
//!
//! Headless editing session: a workspace plus its live code view. Every
//! committed mutation is followed by an explicit regeneration.

use crate::blocks::BlockRegistry;
use crate::compiler::LiveCode;
use crate::error::{BoardError, GenerationError, GraphError};
use crate::serializer::{self, Snapshot};
use crate::workspace::{StaleField, Workspace};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Editor {
    workspace: Workspace,
    code: LiveCode,
}

impl Editor {
    pub fn new(registry: Arc<BlockRegistry>, board_id: &str) -> Result<Self, BoardError> {
        Ok(Self::from_workspace(Workspace::new(registry, board_id)?))
    }

    /// Open a persisted snapshot; unusable snapshots yield an empty program.
    pub fn open(registry: Arc<BlockRegistry>, snapshot: serde_json::Value) -> Self {
        Self::from_workspace(serializer::load_value(registry, snapshot))
    }

    pub fn from_workspace(workspace: Workspace) -> Self {
        let mut editor = Self {
            workspace,
            code: LiveCode::new(),
        };
        let _ = editor.regenerate();
        editor
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Currently displayed code (possibly from an earlier successful run).
    pub fn code(&self) -> &str {
        self.code.text()
    }

    pub fn generation_error(&self) -> Option<&GenerationError> {
        self.code.last_error()
    }

    /// Apply one or more mutations as a unit and regenerate.
    ///
    /// If `edit` fails, the workspace is left exactly as it was before the call.
    pub fn apply<T>(
        &mut self,
        edit: impl FnOnce(&mut Workspace) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let mut draft = self.workspace.clone();
        let result = edit(&mut draft)?;
        self.workspace = draft;
        let _ = self.regenerate();
        Ok(result)
    }

    pub fn set_board(&mut self, board_id: &str) -> Result<Vec<StaleField>, BoardError> {
        let stale = self.workspace.set_board(board_id)?;
        let _ = self.regenerate();
        Ok(stale)
    }

    pub fn regenerate(&mut self) -> Result<&str, GenerationError> {
        let registry = self.workspace.registry().clone();
        self.code.refresh(&self.workspace, &registry)
    }

    pub fn snapshot(&self) -> Snapshot {
        serializer::save(&self.workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::RootKind;
    use crate::workspace::StatementTarget;

    fn editor() -> Editor {
        Editor::new(Arc::new(BlockRegistry::builtin()), "nano").unwrap()
    }

    #[test]
    fn test_mutation_regenerates() {
        let mut editor = editor();
        assert!(editor.code().contains("void loop() {\n  // (no blocks)\n}"));

        editor
            .apply(|ws| {
                let lp = ws.root(RootKind::Loop).unwrap();
                let write = ws.create_block("digital_write")?;
                ws.set_field(write, "PIN", "13")?;
                ws.connect_statement(lp, StatementTarget::slot("DO"), write)
            })
            .unwrap();

        assert!(editor.code().contains("void loop() {\n  digitalWrite(13, HIGH);\n}"));
    }

    #[test]
    fn test_failed_edit_rolls_back() {
        let mut editor = editor();
        let before = editor.snapshot();
        let result = editor.apply(|ws| {
            ws.create_block("delay_ms")?;
            ws.create_block("warp_drive")
        });
        assert!(result.is_err());
        assert_eq!(editor.snapshot(), before);
        assert_eq!(editor.workspace().len(), 2);
    }

    #[test]
    fn test_open_corrupt_snapshot() {
        let editor = Editor::open(
            Arc::new(BlockRegistry::builtin()),
            serde_json::json!({"stacks": "broken"}),
        );
        assert_eq!(editor.workspace().len(), 2);
        assert!(editor.code().starts_with("void setup() {"));
    }
}
