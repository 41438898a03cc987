//! Block type registry, built once per session and passed by reference to the
//! workspace, serializer and code generator.

use super::{builtin_block_types, BlockType, FieldOption};
use crate::board::{BoardDescriptor, BoardRegistry};
use crate::error::GraphError;
use indexmap::IndexMap;

#[derive(Debug, Clone)]
pub struct BlockRegistry {
    boards: BoardRegistry,
    types: IndexMap<&'static str, BlockType>,
}

impl BlockRegistry {
    /// Empty registry; only useful for building custom block sets.
    pub fn new(boards: BoardRegistry) -> Self {
        Self {
            boards,
            types: IndexMap::new(),
        }
    }

    /// Registry with the builtin boards and block library.
    pub fn builtin() -> Self {
        let mut registry = Self::new(BoardRegistry::builtin());
        for block_type in builtin_block_types() {
            registry.register(block_type);
        }
        tracing::debug!("[BLOCKS] Registered {} block types", registry.len());
        registry
    }

    pub fn register(&mut self, block_type: BlockType) {
        if let Some(previous) = self.types.insert(block_type.kind, block_type) {
            tracing::warn!("[BLOCKS] Block type '{}' registered twice, keeping the latest", previous.kind);
        }
    }

    pub fn boards(&self) -> &BoardRegistry {
        &self.boards
    }

    pub fn get(&self, kind: &str) -> Option<&BlockType> {
        self.types.get(kind)
    }

    pub fn lookup(&self, kind: &str) -> Result<&BlockType, GraphError> {
        self.get(kind)
            .ok_or_else(|| GraphError::UnknownBlockKind(kind.to_string()))
    }

    /// Registered kinds in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Dropdown options for `kind.field` as seen on `board`.
    pub fn field_options(
        &self,
        kind: &str,
        field: &str,
        board: &BoardDescriptor,
    ) -> Result<Vec<FieldOption>, GraphError> {
        let block_type = self.lookup(kind)?;
        let spec = block_type.field(field).ok_or_else(|| {
            GraphError::InvalidGraphOperation(format!(
                "block kind '{}' has no field '{}'",
                kind, field
            ))
        })?;
        Ok(spec.options(board))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockCategory, RootKind, ROOT_LOOP, ROOT_SETUP};

    #[test]
    fn test_builtin_contains_roots() {
        let registry = BlockRegistry::builtin();
        let setup = registry.lookup(ROOT_SETUP).unwrap();
        assert_eq!(setup.category, BlockCategory::Root(RootKind::Setup));
        assert_eq!(registry.lookup(ROOT_LOOP).unwrap().root_kind(), Some(RootKind::Loop));
    }

    #[test]
    fn test_lookup_unknown_kind() {
        let registry = BlockRegistry::builtin();
        assert_eq!(
            registry.lookup("servo_write").unwrap_err(),
            GraphError::UnknownBlockKind("servo_write".to_string())
        );
    }

    #[test]
    fn test_pin_options_follow_board() {
        let registry = BlockRegistry::builtin();
        let nano = registry.boards().resolve("nano").unwrap();
        let esp32 = registry.boards().resolve("esp32").unwrap();

        let on_nano = registry.field_options("pin_mode", "PIN", nano).unwrap();
        let on_esp = registry.field_options("pin_mode", "PIN", esp32).unwrap();

        assert!(on_nano.iter().any(|o| o.value == "13"));
        assert!(!on_esp.iter().any(|o| o.value == "13"));
        assert_eq!(on_esp.len(), esp32.pins.len());
    }

    #[test]
    fn test_static_options_ignore_board() {
        let registry = BlockRegistry::builtin();
        let nano = registry.boards().resolve("nano").unwrap();
        let esp32 = registry.boards().resolve("esp32").unwrap();
        assert_eq!(
            registry.field_options("pin_mode", "MODE", nano).unwrap(),
            registry.field_options("pin_mode", "MODE", esp32).unwrap()
        );
    }

    #[test]
    fn test_unknown_field_options() {
        let registry = BlockRegistry::builtin();
        let nano = registry.boards().resolve("nano").unwrap();
        assert!(registry.field_options("pin_mode", "SPEED", nano).is_err());
    }
}
