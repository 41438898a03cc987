//! # Workspace Serializer
//!
//! Structural snapshot of a workspace. Each top-level stack is stored as a
//! list of blocks in chain order; statement slots hold nested lists and value
//! slots hold a single nested block. Block ids are not persisted.
//!
//! Loading never fails: a snapshot that cannot be reconstructed in full is
//! thrown away and an empty workspace (with freshly synthesized roots) is
//! returned instead.

use crate::blocks::{BlockRegistry, FieldValue};
use crate::board::DEFAULT_BOARD;
use crate::error::PersistenceError;
use crate::workspace::{BlockId, BlockInstance, Position, StatementTarget, Workspace};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const SNAPSHOT_VERSION: u32 = 1;

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

fn default_board() -> String {
    DEFAULT_BOARD.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_board")]
    pub board: String,
    #[serde(default)]
    pub stacks: Vec<StackSnapshot>,
}

/// A top-level block and everything chained after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSnapshot {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    pub blocks: Vec<BlockSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub statements: IndexMap<String, Vec<BlockSnapshot>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub values: IndexMap<String, BlockSnapshot>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, PersistenceError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, PersistenceError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn block_count(&self) -> usize {
        fn count(block: &BlockSnapshot) -> usize {
            1 + block.statements.values().flatten().map(count).sum::<usize>()
                + block.values.values().map(count).sum::<usize>()
        }
        self.stacks
            .iter()
            .flat_map(|s| s.blocks.iter())
            .map(count)
            .sum()
    }
}

/// Capture the full structure of `workspace`.
pub fn save(workspace: &Workspace) -> Snapshot {
    let stacks = workspace
        .top_level()
        .into_iter()
        .filter_map(|head| {
            let position = workspace.block(head)?.position;
            Some(StackSnapshot {
                x: position.x,
                y: position.y,
                blocks: save_chain(workspace, head),
            })
        })
        .collect();

    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        board: workspace.board_id().to_string(),
        stacks,
    };
    tracing::debug!(
        "[SERIALIZER] Saved {} blocks in {} stacks",
        snapshot.block_count(),
        snapshot.stacks.len()
    );
    snapshot
}

fn save_chain(workspace: &Workspace, head: BlockId) -> Vec<BlockSnapshot> {
    let mut chain = Vec::new();
    let mut current = Some(head);
    while let Some(block) = current.and_then(|id| workspace.block(id)) {
        chain.push(save_block(workspace, block));
        current = block.next;
    }
    chain
}

fn save_block(workspace: &Workspace, block: &BlockInstance) -> BlockSnapshot {
    BlockSnapshot {
        kind: block.kind.clone(),
        fields: block.fields.clone(),
        statements: block
            .statements
            .iter()
            .filter_map(|(slot, head)| head.map(|h| (slot.clone(), save_chain(workspace, h))))
            .collect(),
        values: block
            .values
            .iter()
            .filter_map(|(slot, child)| {
                let child = workspace.block((*child)?)?;
                Some((slot.clone(), save_block(workspace, child)))
            })
            .collect(),
    }
}

/// Rebuild a workspace from JSON text, falling back to an empty workspace.
pub fn load(registry: Arc<BlockRegistry>, json: &str) -> Workspace {
    let restored = Snapshot::from_json(json)
        .and_then(|snapshot| restore(registry.clone(), &snapshot));
    fallback_on_error(registry, restored)
}

/// Rebuild a workspace from an already-parsed JSON value.
pub fn load_value(registry: Arc<BlockRegistry>, value: serde_json::Value) -> Workspace {
    if value.is_null() {
        return empty_workspace(registry);
    }
    let restored = Snapshot::from_value(value)
        .and_then(|snapshot| restore(registry.clone(), &snapshot));
    fallback_on_error(registry, restored)
}

fn fallback_on_error(
    registry: Arc<BlockRegistry>,
    restored: Result<Workspace, PersistenceError>,
) -> Workspace {
    match restored {
        Ok(workspace) => workspace,
        Err(e) => {
            tracing::warn!("[SERIALIZER] Discarding snapshot: {}", e);
            empty_workspace(registry)
        }
    }
}

fn empty_workspace(registry: Arc<BlockRegistry>) -> Workspace {
    Workspace::with_default_board(registry)
}

/// Strict reconstruction; any inconsistency fails the whole snapshot.
pub fn restore(registry: Arc<BlockRegistry>, snapshot: &Snapshot) -> Result<Workspace, PersistenceError> {
    if snapshot.version > SNAPSHOT_VERSION {
        return Err(PersistenceError::Reconstruct(format!(
            "snapshot version {} is newer than supported version {}",
            snapshot.version, SNAPSHOT_VERSION
        )));
    }
    let mut workspace = Workspace::without_roots(registry, &snapshot.board)
        .map_err(|e| PersistenceError::Reconstruct(e.to_string()))?;

    for stack in &snapshot.stacks {
        let position = Position::new(stack.x, stack.y);
        let Some((first, rest)) = stack.blocks.split_first() else {
            return Err(PersistenceError::Reconstruct("empty stack".to_string()));
        };
        let head = restore_block(&mut workspace, first, position)?;
        restore_tail(&mut workspace, head, rest)?;
    }

    let synthesized = workspace.ensure_roots();
    tracing::info!(
        "[SERIALIZER] Restored {} blocks on board '{}' ({} roots synthesized)",
        workspace.len(),
        workspace.board_id(),
        synthesized
    );
    Ok(workspace)
}

fn restore_tail(
    workspace: &mut Workspace,
    mut previous: BlockId,
    rest: &[BlockSnapshot],
) -> Result<(), PersistenceError> {
    for block in rest {
        let id = restore_block(workspace, block, Position::default())?;
        workspace.connect_statement(previous, StatementTarget::Next, id)?;
        previous = id;
    }
    Ok(())
}

fn restore_block(
    workspace: &mut Workspace,
    block: &BlockSnapshot,
    position: Position,
) -> Result<BlockId, PersistenceError> {
    let id = workspace.create_block_at(&block.kind, position)?;

    for (name, value) in &block.fields {
        workspace.restore_field(id, name, value.clone())?;
    }

    for (slot, chain) in &block.statements {
        let Some((first, rest)) = chain.split_first() else {
            continue;
        };
        let head = restore_block(workspace, first, Position::default())?;
        workspace.connect_statement(id, StatementTarget::slot(slot.as_str()), head)?;
        restore_tail(workspace, head, rest)?;
    }

    for (slot, child) in &block.values {
        let child_id = restore_block(workspace, child, Position::default())?;
        workspace.connect_value(id, slot, child_id)?;
    }

    Ok(id)
}
