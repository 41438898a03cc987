//! # Block Graph
//!
//! The in-memory program: an arena of block instances linked by id. Every
//! mutating operation validates first and only then touches the arena, so a
//! rejected call leaves the workspace exactly as it was.

use crate::blocks::{
    BlockCategory, BlockRegistry, BlockType, FieldOption, FieldValue, RootKind,
};
use crate::board::BoardDescriptor;
use crate::error::{BoardError, GraphError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Canvas position of a top-level block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Where synthesized roots are placed.
pub fn default_root_position(kind: RootKind) -> Position {
    match kind {
        RootKind::Setup => Position::new(20, 20),
        RootKind::Loop => Position::new(20, 240),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInstance {
    pub id: BlockId,
    pub kind: String,
    pub fields: IndexMap<String, FieldValue>,
    pub position: Position,
    /// Continuation of the statement chain
    pub next: Option<BlockId>,
    /// Head of the chain nested in each statement slot
    pub statements: IndexMap<String, Option<BlockId>>,
    pub values: IndexMap<String, Option<BlockId>>,
}

impl BlockInstance {
    fn children(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.next
            .iter()
            .chain(self.statements.values().flatten())
            .chain(self.values.values().flatten())
            .copied()
    }
}

/// Statement connection point on a parent block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementTarget {
    Next,
    Slot(String),
}

impl StatementTarget {
    pub fn slot(name: impl Into<String>) -> Self {
        StatementTarget::Slot(name.into())
    }
}

/// How a block is attached to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Next,
    Statement(String),
    Value(String),
}

/// Lifecycle of a root singleton within one workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootState {
    Absent,
    Present(BlockId),
}

/// A pin field whose value the active board does not offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleField {
    pub block: BlockId,
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    registry: Arc<BlockRegistry>,
    board: BoardDescriptor,
    blocks: IndexMap<BlockId, BlockInstance>,
    next_id: u64,
}

impl Workspace {
    /// Fresh workspace holding only the two root blocks.
    pub fn new(registry: Arc<BlockRegistry>, board_id: &str) -> Result<Self, BoardError> {
        let mut workspace = Self::without_roots(registry, board_id)?;
        workspace.ensure_roots();
        Ok(workspace)
    }

    /// Fresh workspace on the registry's default board.
    pub fn with_default_board(registry: Arc<BlockRegistry>) -> Self {
        let board = registry.boards().default_board().clone();
        let mut workspace = Self {
            registry,
            board,
            blocks: IndexMap::new(),
            next_id: 1,
        };
        workspace.ensure_roots();
        workspace
    }

    /// Workspace with no blocks at all; callers must run [`Workspace::ensure_roots`].
    pub(crate) fn without_roots(
        registry: Arc<BlockRegistry>,
        board_id: &str,
    ) -> Result<Self, BoardError> {
        let board = registry.boards().resolve(board_id)?.clone();
        Ok(Self {
            registry,
            board,
            blocks: IndexMap::new(),
            next_id: 1,
        })
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn board(&self) -> &BoardDescriptor {
        &self.board
    }

    pub fn board_id(&self) -> &'static str {
        self.board.id
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, id: BlockId) -> Option<&BlockInstance> {
        self.blocks.get(&id)
    }

    /// Blocks in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = &BlockInstance> {
        self.blocks.values()
    }

    pub fn root(&self, kind: RootKind) -> Option<BlockId> {
        match self.root_state(kind) {
            RootState::Present(id) => Some(id),
            RootState::Absent => None,
        }
    }

    pub fn root_state(&self, kind: RootKind) -> RootState {
        self.blocks
            .values()
            .find(|b| b.kind == kind.kind_name())
            .map(|b| RootState::Present(b.id))
            .unwrap_or(RootState::Absent)
    }

    /// Synthesize any missing root at its default position. Idempotent;
    /// returns how many roots were created.
    pub fn ensure_roots(&mut self) -> usize {
        let mut created = 0;
        for kind in RootKind::ALL {
            if self.root_state(kind) == RootState::Absent {
                match self.insert_block(kind.kind_name(), default_root_position(kind)) {
                    Ok(id) => {
                        tracing::debug!("[WORKSPACE] Synthesized root '{}' as {}", kind.kind_name(), id);
                        created += 1;
                    }
                    Err(e) => {
                        tracing::warn!("[WORKSPACE] Cannot synthesize root '{}': {}", kind.kind_name(), e)
                    }
                }
            }
        }
        created
    }

    /// Blocks without a parent, in creation order.
    pub fn top_level(&self) -> Vec<BlockId> {
        let referenced: HashSet<BlockId> = self.blocks.values().flat_map(|b| b.children()).collect();
        self.blocks
            .keys()
            .filter(|id| !referenced.contains(id))
            .copied()
            .collect()
    }

    pub fn parent_of(&self, id: BlockId) -> Option<(BlockId, Link)> {
        self.blocks.values().find_map(|b| {
            if b.next == Some(id) {
                return Some((b.id, Link::Next));
            }
            if let Some((slot, _)) = b.statements.iter().find(|(_, c)| **c == Some(id)) {
                return Some((b.id, Link::Statement(slot.clone())));
            }
            b.values
                .iter()
                .find(|(_, c)| **c == Some(id))
                .map(|(slot, _)| (b.id, Link::Value(slot.clone())))
        })
    }

    pub fn create_block(&mut self, kind: &str) -> Result<BlockId, GraphError> {
        self.create_block_at(kind, Position::default())
    }

    pub fn create_block_at(&mut self, kind: &str, position: Position) -> Result<BlockId, GraphError> {
        let block_type = self.registry.lookup(kind)?;
        if let Some(root) = block_type.root_kind() {
            if let RootState::Present(existing) = self.root_state(root) {
                return Err(GraphError::InvalidGraphOperation(format!(
                    "root block '{}' already exists as {}",
                    kind, existing
                )));
            }
        }
        let id = self.insert_block(kind, position)?;
        tracing::debug!("[WORKSPACE] Created {} '{}'", id, kind);
        Ok(id)
    }

    fn insert_block(&mut self, kind: &str, position: Position) -> Result<BlockId, GraphError> {
        let block_type = self.registry.lookup(kind)?;
        let id = BlockId(self.next_id);
        let instance = BlockInstance {
            id,
            kind: block_type.kind.to_string(),
            fields: block_type
                .fields
                .iter()
                .map(|f| (f.name.to_string(), f.default_value(&self.board)))
                .collect(),
            position,
            next: None,
            statements: block_type
                .sockets
                .statement_slots
                .iter()
                .map(|s| (s.to_string(), None))
                .collect(),
            values: block_type
                .sockets
                .value_slots
                .iter()
                .map(|s| (s.name.to_string(), None))
                .collect(),
        };
        self.next_id += 1;
        self.blocks.insert(id, instance);
        Ok(id)
    }

    fn instance(&self, id: BlockId) -> Result<&BlockInstance, GraphError> {
        self.blocks.get(&id).ok_or(GraphError::BlockNotFound(id))
    }

    fn type_of(&self, id: BlockId) -> Result<&BlockType, GraphError> {
        let kind = &self.instance(id)?.kind;
        self.registry.lookup(kind)
    }

    /// Delete a block together with everything nested inside it. The rest of
    /// its statement chain is reattached where the block used to be.
    pub fn delete_block(&mut self, id: BlockId) -> Result<(), GraphError> {
        let block_type = self.type_of(id)?;
        if block_type.root_kind().is_some() {
            return Err(GraphError::ProtectedBlock(id));
        }

        let instance = self.instance(id)?;
        let next = instance.next;
        let position = instance.position;
        let mut doomed = HashSet::new();
        for child in instance
            .statements
            .values()
            .chain(instance.values.values())
            .flatten()
        {
            doomed.extend(self.descendants(*child));
        }
        if doomed.iter().any(|d| self.is_root(*d)) {
            return Err(GraphError::InvalidGraphOperation(format!(
                "block {} contains a root block",
                id
            )));
        }
        let parent = self.parent_of(id);

        match parent {
            Some((parent_id, link)) => self.set_link(parent_id, &link, next),
            None => {
                if let Some(next_id) = next {
                    if let Some(b) = self.blocks.get_mut(&next_id) {
                        b.position = position;
                    }
                }
            }
        }
        self.blocks.shift_remove(&id);
        for d in &doomed {
            self.blocks.shift_remove(d);
        }
        tracing::debug!("[WORKSPACE] Deleted {} ({} nested blocks)", id, doomed.len());
        Ok(())
    }

    fn is_root(&self, id: BlockId) -> bool {
        self.blocks
            .get(&id)
            .and_then(|b| RootKind::from_kind_name(&b.kind))
            .is_some()
    }

    /// Set a field, enforcing the option list of the active board.
    pub fn set_field(
        &mut self,
        id: BlockId,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), GraphError> {
        let value = self.checked_field(id, name, value.into(), true)?;
        self.store_field(id, name, value);
        Ok(())
    }

    /// Like [`Workspace::set_field`] but keeps pin values the board does not
    /// offer. Used when restoring snapshots written for another board.
    pub(crate) fn restore_field(
        &mut self,
        id: BlockId,
        name: &str,
        value: FieldValue,
    ) -> Result<(), GraphError> {
        let value = self.checked_field(id, name, value, false)?;
        self.store_field(id, name, value);
        Ok(())
    }

    fn checked_field(
        &self,
        id: BlockId,
        name: &str,
        value: FieldValue,
        strict_pins: bool,
    ) -> Result<FieldValue, GraphError> {
        let block_type = self.type_of(id)?;
        let spec = block_type.field(name).ok_or_else(|| GraphError::InvalidField {
            block: id,
            field: name.to_string(),
            reason: format!("kind '{}' declares no such field", block_type.kind),
        })?;

        if !strict_pins && spec.is_board_dependent() {
            let raw = value.to_string();
            // Pins of any registered board are kept; anything else is rejected.
            if !self.registry.boards().all().iter().any(|b| b.has_pin(&raw)) {
                return Err(GraphError::InvalidField {
                    block: id,
                    field: name.to_string(),
                    reason: format!("'{}' is not a pin of any known board", raw),
                });
            }
            let value = FieldValue::Text(raw);
            if !self.board.has_pin(&value.to_string()) {
                tracing::warn!(
                    "[WORKSPACE] Keeping pin '{}' on {}.{} although board '{}' does not offer it",
                    value,
                    id,
                    name,
                    self.board.id
                );
            }
            return Ok(value);
        }

        spec.validate(value, &self.board)
            .map_err(|reason| GraphError::InvalidField {
                block: id,
                field: name.to_string(),
                reason,
            })
    }

    fn store_field(&mut self, id: BlockId, name: &str, value: FieldValue) {
        if let Some(b) = self.blocks.get_mut(&id) {
            b.fields.insert(name.to_string(), value);
        }
    }

    /// Options currently offered for a field of a block.
    pub fn available_options(&self, id: BlockId, name: &str) -> Result<Vec<FieldOption>, GraphError> {
        let instance = self.instance(id)?;
        self.registry.field_options(&instance.kind, name, &self.board)
    }

    /// Switch the active board. Field values are kept as they are; pin
    /// values the new board does not offer are reported and logged.
    pub fn set_board(&mut self, board_id: &str) -> Result<Vec<StaleField>, BoardError> {
        self.board = self.registry.boards().resolve(board_id)?.clone();
        let stale = self.stale_fields();
        for s in &stale {
            tracing::warn!(
                "[WORKSPACE] {}.{} = '{}' is not a pin of '{}'",
                s.block,
                s.field,
                s.value,
                self.board.id
            );
        }
        Ok(stale)
    }

    pub fn stale_fields(&self) -> Vec<StaleField> {
        let mut stale = Vec::new();
        for b in self.blocks.values() {
            let Some(block_type) = self.registry.get(&b.kind) else {
                continue;
            };
            for spec in block_type.fields.iter().filter(|f| f.is_board_dependent()) {
                if let Some(value) = b.fields.get(spec.name) {
                    let value = value.to_string();
                    if !self.board.has_pin(&value) {
                        stale.push(StaleField {
                            block: b.id,
                            field: spec.name.to_string(),
                            value,
                        });
                    }
                }
            }
        }
        stale
    }

    /// All blocks reachable from `id` through any link, `id` included.
    pub fn descendants(&self, id: BlockId) -> HashSet<BlockId> {
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(b) = self.blocks.get(&current) {
                stack.extend(b.children());
            }
        }
        seen
    }

    fn chain_tail(&self, head: BlockId) -> BlockId {
        let mut current = head;
        let mut seen = HashSet::new();
        while let Some(next) = self.blocks.get(&current).and_then(|b| b.next) {
            if !seen.insert(current) {
                break;
            }
            current = next;
        }
        current
    }

    fn check_connectable(&self, parent: BlockId, child: BlockId) -> Result<(), GraphError> {
        self.instance(parent)?;
        self.instance(child)?;
        if self.is_root(child) {
            return Err(GraphError::InvalidGraphOperation(format!(
                "root block {} must stay top-level",
                child
            )));
        }
        if self.descendants(child).contains(&parent) {
            return Err(GraphError::InvalidGraphOperation(format!(
                "connecting {} under {} would create a cycle",
                child, parent
            )));
        }
        Ok(())
    }

    fn current_link(&self, parent: BlockId, link: &Link) -> Option<BlockId> {
        let b = self.blocks.get(&parent)?;
        match link {
            Link::Next => b.next,
            Link::Statement(slot) => b.statements.get(slot).copied().flatten(),
            Link::Value(slot) => b.values.get(slot).copied().flatten(),
        }
    }

    fn set_link(&mut self, parent: BlockId, link: &Link, child: Option<BlockId>) {
        if let Some(b) = self.blocks.get_mut(&parent) {
            match link {
                Link::Next => b.next = child,
                Link::Statement(slot) => {
                    b.statements.insert(slot.clone(), child);
                }
                Link::Value(slot) => {
                    b.values.insert(slot.clone(), child);
                }
            }
        }
    }

    /// Attach `child` (and the rest of its chain) below `parent`. Whatever
    /// occupied the target moves to the end of the attached chain.
    pub fn connect_statement(
        &mut self,
        parent: BlockId,
        target: StatementTarget,
        child: BlockId,
    ) -> Result<(), GraphError> {
        self.check_connectable(parent, child)?;
        let parent_type = self.type_of(parent)?;
        let link = match &target {
            StatementTarget::Next if parent_type.sockets.next => Link::Next,
            StatementTarget::Slot(slot) if parent_type.sockets.has_statement_slot(slot) => {
                Link::Statement(slot.clone())
            }
            _ => {
                return Err(GraphError::InvalidGraphOperation(format!(
                    "block {} ('{}') has no statement input {:?}",
                    parent, parent_type.kind, target
                )))
            }
        };
        let child_type = self.type_of(child)?;
        if child_type.category != BlockCategory::Statement || !child_type.sockets.previous {
            return Err(GraphError::InvalidGraphOperation(format!(
                "block {} ('{}') cannot be chained as a statement",
                child, child_type.kind
            )));
        }

        let displaced = self.current_link(parent, &link);
        if displaced == Some(child) {
            return Ok(());
        }
        let tail = self.chain_tail(child);
        if displaced.is_some() {
            let tail_type = self.type_of(tail)?;
            if !tail_type.sockets.next {
                return Err(GraphError::InvalidGraphOperation(format!(
                    "block {} has no next socket to take the displaced chain",
                    tail
                )));
            }
        }

        self.detach(child);
        self.set_link(parent, &link, Some(child));
        if let Some(displaced) = displaced {
            self.set_link(tail, &Link::Next, Some(displaced));
        }
        tracing::debug!("[WORKSPACE] Connected {} to {} via {:?}", child, parent, link);
        Ok(())
    }

    /// Plug an expression block into a value slot. A block already in the
    /// slot becomes top-level.
    pub fn connect_value(&mut self, parent: BlockId, slot: &str, child: BlockId) -> Result<(), GraphError> {
        self.check_connectable(parent, child)?;
        let parent_type = self.type_of(parent)?;
        if parent_type.sockets.value_slot(slot).is_none() {
            return Err(GraphError::InvalidGraphOperation(format!(
                "block {} ('{}') has no value input '{}'",
                parent, parent_type.kind, slot
            )));
        }
        let child_type = self.type_of(child)?;
        if child_type.category != BlockCategory::Value || !child_type.sockets.output {
            return Err(GraphError::InvalidGraphOperation(format!(
                "block {} ('{}') does not produce a value",
                child, child_type.kind
            )));
        }

        let link = Link::Value(slot.to_string());
        if self.current_link(parent, &link) == Some(child) {
            return Ok(());
        }
        self.detach(child);
        self.set_link(parent, &link, Some(child));
        tracing::debug!("[WORKSPACE] Plugged {} into {}.{}", child, parent, slot);
        Ok(())
    }

    /// Detach a block (and everything after it in its chain) from its parent.
    /// Top-level blocks are left alone.
    pub fn disconnect(&mut self, id: BlockId) -> Result<(), GraphError> {
        self.instance(id)?;
        self.detach(id);
        Ok(())
    }

    fn detach(&mut self, id: BlockId) {
        if let Some((parent, link)) = self.parent_of(id) {
            self.set_link(parent, &link, None);
        }
    }

    /// Check the structural invariants: exactly one of each root, roots are
    /// top-level, references resolve, each block has one parent, no cycles.
    pub fn validate(&self) -> Result<(), GraphError> {
        for kind in RootKind::ALL {
            let count = self.blocks.values().filter(|b| b.kind == kind.kind_name()).count();
            if count != 1 {
                return Err(GraphError::InvalidGraphOperation(format!(
                    "expected exactly one '{}', found {}",
                    kind.kind_name(),
                    count
                )));
            }
        }

        let mut parents: HashSet<BlockId> = HashSet::new();
        for b in self.blocks.values() {
            for child in b.children() {
                if !self.blocks.contains_key(&child) {
                    return Err(GraphError::BlockNotFound(child));
                }
                if self.is_root(child) {
                    return Err(GraphError::InvalidGraphOperation(format!(
                        "root {} is referenced by {}",
                        child, b.id
                    )));
                }
                if !parents.insert(child) {
                    return Err(GraphError::InvalidGraphOperation(format!(
                        "block {} has more than one parent",
                        child
                    )));
                }
            }
        }

        // With single parents, a cycle is a set of blocks unreachable from any top-level block.
        let mut reachable = HashSet::new();
        for top in self.top_level() {
            reachable.extend(self.descendants(top));
        }
        if reachable.len() != self.blocks.len() {
            return Err(GraphError::InvalidGraphOperation(
                "block references form a cycle".to_string(),
            ));
        }
        Ok(())
    }
}
