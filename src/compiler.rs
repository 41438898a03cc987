//! # Sketch Compiler
//!
//! Main entry points for turning a block workspace into Arduino source code.

use crate::blocks::BlockRegistry;
use crate::codegen::SketchCodeGenerator;
use crate::error::GenerationError;
use crate::workspace::Workspace;

/// Text shown before the first successful generation.
pub const INITIAL_CODE_TEXT: &str = "// Generated code appears here...\n";

/// Compile a workspace with the registry it was built against
///
/// # Returns
///
/// * `Ok(String)` - `setup()` followed by `loop()`
/// * `Err(GenerationError)` - the run aborted; nothing partial is returned
///
/// # Examples
///
/// ```rust
/// use longboard::{compile_workspace, BlockRegistry, Workspace};
/// use std::sync::Arc;
///
/// let workspace = Workspace::new(Arc::new(BlockRegistry::builtin()), "nano").unwrap();
/// let code = compile_workspace(&workspace).unwrap();
/// assert!(code.starts_with("void setup() {"));
/// ```
pub fn compile_workspace(workspace: &Workspace) -> Result<String, GenerationError> {
    compile_workspace_with_registry(workspace, workspace.registry())
}

/// Compile a workspace against an explicit block registry
///
/// Blocks whose kind the registry does not know abort the run with
/// [`GenerationError::UnknownBlockKind`].
pub fn compile_workspace_with_registry(
    workspace: &Workspace,
    registry: &BlockRegistry,
) -> Result<String, GenerationError> {
    tracing::info!(
        "[CODEGEN] Compiling workspace ({} blocks, board '{}')",
        workspace.len(),
        workspace.board_id()
    );

    let code = SketchCodeGenerator::new(workspace, registry).generate_program()?;

    tracing::info!("[CODEGEN] Code generation complete ({} bytes)", code.len());
    Ok(code)
}

/// Last successfully generated code for an editing session.
///
/// A failed run keeps the previous text on display and records the error.
#[derive(Debug, Clone)]
pub struct LiveCode {
    text: String,
    last_error: Option<GenerationError>,
}

impl Default for LiveCode {
    fn default() -> Self {
        Self {
            text: INITIAL_CODE_TEXT.to_string(),
            last_error: None,
        }
    }
}

impl LiveCode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn last_error(&self) -> Option<&GenerationError> {
        self.last_error.as_ref()
    }

    /// Whether the displayed text matches the current workspace.
    pub fn is_stale(&self) -> bool {
        self.last_error.is_some()
    }

    /// Regenerate from `workspace`. On failure the old text is kept.
    pub fn refresh(&mut self, workspace: &Workspace, registry: &BlockRegistry) -> Result<&str, GenerationError> {
        match compile_workspace_with_registry(workspace, registry) {
            Ok(code) => {
                self.text = code;
                self.last_error = None;
                Ok(&self.text)
            }
            Err(e) => {
                tracing::warn!("[CODEGEN] Generation failed, keeping previous code: {}", e);
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::RootKind;
    use crate::workspace::StatementTarget;
    use parking_lot::Mutex;
    use std::io::Write;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_compile_progress_logged_at_info() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let ws = Workspace::new(Arc::new(BlockRegistry::builtin()), "nano").unwrap();
        tracing::subscriber::with_default(subscriber, || {
            compile_workspace(&ws).unwrap();
        });

        let text = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(text.contains("[CODEGEN] Compiling workspace"), "{}", text);
        assert!(text.contains("[CODEGEN] Code generation complete"), "{}", text);
    }

    #[test]
    fn test_live_code_keeps_last_good_text() {
        let registry = Arc::new(BlockRegistry::builtin());
        let mut ws = Workspace::new(registry.clone(), "nano").unwrap();
        let mut live = LiveCode::new();
        assert_eq!(live.text(), INITIAL_CODE_TEXT);

        live.refresh(&ws, &registry).unwrap();
        let good = live.text().to_string();
        assert!(!live.is_stale());

        let lp = ws.root(RootKind::Loop).unwrap();
        let delay = ws.create_block("delay_ms").unwrap();
        ws.connect_statement(lp, StatementTarget::slot("DO"), delay).unwrap();

        let empty = BlockRegistry::new(registry.boards().clone());
        assert!(live.refresh(&ws, &empty).is_err());
        assert_eq!(live.text(), good);
        assert!(live.is_stale());

        live.refresh(&ws, &registry).unwrap();
        assert!(live.text().contains("delay(1000);"));
        assert!(live.last_error().is_none());
    }
}
