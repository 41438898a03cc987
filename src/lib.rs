//! # Longboard
//!
//! Block-based programming core for microcontroller boards: turns a visual
//! block program into an Arduino sketch and drives the board it runs on.
//!
//! Longboard provides:
//! - A board registry (pins and toolchain names per supported board)
//! - A block library with board-aware field options
//! - An editable block workspace with validated mutations
//! - Deterministic sketch generation with operator precedence
//! - A JSON snapshot format that survives reloads
//! - A device session for upload and live serial monitoring
//!
//! ## Quick Start
//!
//! ```rust
//! use longboard::{compile_workspace, BlockRegistry, RootKind, StatementTarget, Workspace};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(BlockRegistry::builtin());
//! let mut workspace = Workspace::new(registry, "uno")?;
//!
//! let setup = workspace.root(RootKind::Setup).expect("roots are created with the workspace");
//! let mode = workspace.create_block("pin_mode")?;
//! workspace.set_field(mode, "PIN", "13")?;
//! workspace.connect_statement(setup, StatementTarget::slot("DO"), mode)?;
//!
//! let sketch = compile_workspace(&workspace)?;
//! assert!(sketch.contains("pinMode(13, OUTPUT);"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! 1. **Boards** - Static capability table ([`BoardRegistry`])
//! 2. **Blocks** - Kind definitions with fields, sockets and generators ([`BlockRegistry`])
//! 3. **Workspace** - Arena of block instances linked by id ([`Workspace`])
//! 4. **Code Generation** - Tree walk from the two roots ([`compile_workspace`])
//! 5. **Persistence** - Snapshots and project records ([`serializer`], [`project`])
//! 6. **Device** - Exclusive port arbitration ([`DeviceSession`])

pub mod blocks;
pub mod board;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod device;
pub mod editor;
pub mod error;
pub mod project;
pub mod serializer;
pub mod workspace;

// Re-export the main compilation API
pub use compiler::{compile_workspace, compile_workspace_with_registry, LiveCode, INITIAL_CODE_TEXT};

pub use blocks::{BlockCategory, BlockRegistry, BlockType, FieldOption, FieldValue, RootKind};
pub use board::{BoardDescriptor, BoardRegistry, PinOption, DEFAULT_BOARD};
pub use config::IdeConfig;
pub use device::{
    ArduinoCliBridge, DeviceBridge, DeviceSession, PortId, PortListing, SerialFeed, SessionEvent,
    SessionState, UploadOutcome, MONITOR_BUFFER_LINES,
};
pub use editor::Editor;
pub use error::{BoardError, ConfigError, DeviceError, GenerationError, GraphError, PersistenceError};
pub use project::{MemoryProjectStore, ProjectRecord, ProjectStore};
pub use serializer::Snapshot;
pub use workspace::{BlockId, Position, StaleField, StatementTarget, Workspace};
