//! # Board Registry
//!
//! Static capability table: board id -> display name, toolchain FQBN and the
//! ordered list of pins offered to pin-typed block fields.

use crate::error::BoardError;
use serde::Serialize;

/// Board used when nothing else is selected.
pub const DEFAULT_BOARD: &str = "nano";

/// A selectable pin: label shown to the user and the raw value emitted in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PinOption {
    pub label: &'static str,
    pub value: &'static str,
}

const fn pin(label: &'static str, value: &'static str) -> PinOption {
    PinOption { label, value }
}

/// Immutable description of one hardware target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    /// Fully-qualified board name understood by the compile/upload toolchain
    pub fqbn: &'static str,
    pub pins: &'static [PinOption],
}

impl BoardDescriptor {
    pub fn has_pin(&self, value: &str) -> bool {
        self.pins.iter().any(|p| p.value == value)
    }
}

const AVR_PINS: &[PinOption] = &[
    pin("Pin 2", "2"),
    pin("Pin 3", "3"),
    pin("Pin 4", "4"),
    pin("Pin 5", "5"),
    pin("Pin 6", "6"),
    pin("Pin 7", "7"),
    pin("Pin 8", "8"),
    pin("Pin 9", "9"),
    pin("Pin 10", "10"),
    pin("Pin 11", "11"),
    pin("Pin 12", "12"),
    pin("Pin 13", "13"),
];

const ESP32_PINS: &[PinOption] = &[
    pin("GPIO 2", "2"),
    pin("GPIO 4", "4"),
    pin("GPIO 5", "5"),
    pin("GPIO 18", "18"),
    pin("GPIO 19", "19"),
    pin("GPIO 21", "21"),
    pin("GPIO 22", "22"),
    pin("GPIO 23", "23"),
];

const BOARDS: &[BoardDescriptor] = &[
    BoardDescriptor {
        id: "uno",
        display_name: "Arduino Uno",
        fqbn: "arduino:avr:uno",
        pins: AVR_PINS,
    },
    BoardDescriptor {
        id: "nano",
        display_name: "Arduino Nano",
        fqbn: "arduino:avr:nano",
        pins: AVR_PINS,
    },
    BoardDescriptor {
        id: "esp32",
        display_name: "ESP32 DevKit V1",
        fqbn: "esp32:esp32:esp32",
        pins: ESP32_PINS,
    },
];

/// Lookup table over the supported boards.
#[derive(Debug, Clone)]
pub struct BoardRegistry {
    boards: &'static [BoardDescriptor],
}

impl Default for BoardRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BoardRegistry {
    /// Registry with the boards the IDE ships with.
    pub fn builtin() -> Self {
        Self { boards: BOARDS }
    }

    pub fn resolve(&self, board_id: &str) -> Result<&BoardDescriptor, BoardError> {
        self.boards
            .iter()
            .find(|b| b.id == board_id)
            .ok_or_else(|| BoardError::UnknownBoard(board_id.to_string()))
    }

    /// The default board, or the first registered one.
    pub fn default_board(&self) -> &BoardDescriptor {
        self.resolve(DEFAULT_BOARD).unwrap_or(&BOARDS[0])
    }

    pub fn contains(&self, board_id: &str) -> bool {
        self.resolve(board_id).is_ok()
    }

    pub fn all(&self) -> &[BoardDescriptor] {
        self.boards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_boards() {
        let registry = BoardRegistry::builtin();
        let nano = registry.resolve("nano").unwrap();
        assert_eq!(nano.display_name, "Arduino Nano");
        assert_eq!(nano.fqbn, "arduino:avr:nano");
        assert!(nano.has_pin("13"));

        let esp = registry.resolve("esp32").unwrap();
        assert!(!esp.has_pin("13"));
        assert_eq!(esp.pins[0].value, "2");
    }

    #[test]
    fn test_resolve_unknown_board() {
        let registry = BoardRegistry::builtin();
        assert_eq!(
            registry.resolve("mega"),
            Err(BoardError::UnknownBoard("mega".to_string()))
        );
    }

    #[test]
    fn test_default_board_is_registered() {
        assert!(BoardRegistry::builtin().contains(DEFAULT_BOARD));
    }
}
