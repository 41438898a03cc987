//! Builtin block library.
//!
//! Empty value slot defaults:
//! - `analog_write.VALUE`: `0`
//! - `if_then.CONDITION`: `false`
//! - `serial_print.TEXT`: `""`
//! - `compare.A`, `compare.B`: `0`

use super::{
    BlockCategory, BlockType, FieldOption, FieldSpec, RootKind, Sockets, ValueSlot, ROOT_LOOP,
    ROOT_SETUP,
};
use crate::board::BoardDescriptor;
use crate::codegen::{self, Order};

const PIN_MODES: &[(&str, &str)] = &[
    ("output", "OUTPUT"),
    ("input", "INPUT"),
    ("input with pull-up", "INPUT_PULLUP"),
];

const PIN_STATES: &[(&str, &str)] = &[("high", "HIGH"), ("low", "LOW")];

const BAUD_RATES: &[(&str, &str)] = &[
    ("9600", "9600"),
    ("19200", "19200"),
    ("57600", "57600"),
    ("115200", "115200"),
];

const COMPARISONS: &[(&str, &str)] = &[
    ("=", "=="),
    ("≠", "!="),
    ("<", "<"),
    ("≤", "<="),
    (">", ">"),
    ("≥", ">="),
];

/// Pin dropdown options for the active board.
pub fn board_pins(board: &BoardDescriptor) -> Vec<FieldOption> {
    board
        .pins
        .iter()
        .map(|p| FieldOption::new(p.label, p.value))
        .collect()
}

fn statement_sockets() -> Sockets {
    Sockets {
        previous: true,
        next: true,
        ..Sockets::default()
    }
}

fn value_sockets() -> Sockets {
    Sockets {
        output: true,
        ..Sockets::default()
    }
}

fn arg_slot(name: &'static str, empty_default: &'static str) -> ValueSlot {
    ValueSlot {
        name,
        order: Order::NONE,
        empty_default,
    }
}

fn root(kind: RootKind, label: &'static str, generator: super::GeneratorFn) -> BlockType {
    BlockType {
        kind: kind.kind_name(),
        label,
        colour: 120,
        category: BlockCategory::Root(kind),
        fields: Vec::new(),
        sockets: Sockets {
            statement_slots: vec!["DO"],
            ..Sockets::default()
        },
        generator,
    }
}

/// Every block type the IDE ships with, roots first.
pub fn builtin_block_types() -> Vec<BlockType> {
    debug_assert_eq!(RootKind::Setup.kind_name(), ROOT_SETUP);
    debug_assert_eq!(RootKind::Loop.kind_name(), ROOT_LOOP);

    vec![
        root(RootKind::Setup, "when the board starts %1", codegen::root_setup),
        root(RootKind::Loop, "repeat forever %1", codegen::root_loop),
        BlockType {
            kind: "pin_mode",
            label: "set %1 as %2",
            colour: 230,
            category: BlockCategory::Statement,
            fields: vec![
                FieldSpec::board_dropdown("PIN", board_pins),
                FieldSpec::dropdown("MODE", PIN_MODES),
            ],
            sockets: statement_sockets(),
            generator: codegen::pin_mode,
        },
        BlockType {
            kind: "digital_write",
            label: "write %1 %2",
            colour: 230,
            category: BlockCategory::Statement,
            fields: vec![
                FieldSpec::board_dropdown("PIN", board_pins),
                FieldSpec::dropdown("STATE", PIN_STATES),
            ],
            sockets: statement_sockets(),
            generator: codegen::digital_write,
        },
        BlockType {
            kind: "analog_write",
            label: "write %1 level %2",
            colour: 230,
            category: BlockCategory::Statement,
            fields: vec![FieldSpec::board_dropdown("PIN", board_pins)],
            sockets: Sockets {
                value_slots: vec![arg_slot("VALUE", "0")],
                ..statement_sockets()
            },
            generator: codegen::analog_write,
        },
        BlockType {
            kind: "delay_ms",
            label: "wait %1 milliseconds",
            colour: 120,
            category: BlockCategory::Statement,
            fields: vec![FieldSpec::number("MS", 1000)],
            sockets: statement_sockets(),
            generator: codegen::delay_ms,
        },
        BlockType {
            kind: "repeat_times",
            label: "repeat %1 times %2",
            colour: 120,
            category: BlockCategory::Statement,
            fields: vec![FieldSpec::number("TIMES", 10)],
            sockets: Sockets {
                statement_slots: vec!["DO"],
                ..statement_sockets()
            },
            generator: codegen::repeat_times,
        },
        BlockType {
            kind: "if_then",
            label: "if %1 then %2",
            colour: 210,
            category: BlockCategory::Statement,
            fields: Vec::new(),
            sockets: Sockets {
                statement_slots: vec!["DO"],
                value_slots: vec![arg_slot("CONDITION", "false")],
                ..statement_sockets()
            },
            generator: codegen::if_then,
        },
        BlockType {
            kind: "serial_begin",
            label: "start serial at %1 baud",
            colour: 160,
            category: BlockCategory::Statement,
            fields: vec![FieldSpec::dropdown("BAUD", BAUD_RATES)],
            sockets: statement_sockets(),
            generator: codegen::serial_begin,
        },
        BlockType {
            kind: "serial_print",
            label: "print %1",
            colour: 160,
            category: BlockCategory::Statement,
            fields: Vec::new(),
            sockets: Sockets {
                value_slots: vec![arg_slot("TEXT", "\"\"")],
                ..statement_sockets()
            },
            generator: codegen::serial_print,
        },
        BlockType {
            kind: "number",
            label: "%1",
            colour: 230,
            category: BlockCategory::Value,
            fields: vec![FieldSpec::number("NUM", 0)],
            sockets: value_sockets(),
            generator: codegen::number,
        },
        BlockType {
            kind: "text",
            label: "\"%1\"",
            colour: 160,
            category: BlockCategory::Value,
            fields: vec![FieldSpec::text("TEXT", "")],
            sockets: value_sockets(),
            generator: codegen::text,
        },
        BlockType {
            kind: "digital_read",
            label: "read %1",
            colour: 230,
            category: BlockCategory::Value,
            fields: vec![FieldSpec::board_dropdown("PIN", board_pins)],
            sockets: value_sockets(),
            generator: codegen::digital_read,
        },
        BlockType {
            kind: "analog_read",
            label: "read level of %1",
            colour: 230,
            category: BlockCategory::Value,
            fields: vec![FieldSpec::board_dropdown("PIN", board_pins)],
            sockets: value_sockets(),
            generator: codegen::analog_read,
        },
        BlockType {
            kind: "compare",
            label: "%1 %2 %3",
            colour: 210,
            category: BlockCategory::Value,
            fields: vec![FieldSpec::dropdown("OP", COMPARISONS)],
            sockets: Sockets {
                value_slots: vec![
                    ValueSlot {
                        name: "A",
                        order: Order::RELATIONAL,
                        empty_default: "0",
                    },
                    ValueSlot {
                        name: "B",
                        order: Order::RELATIONAL,
                        empty_default: "0",
                    },
                ],
                ..value_sockets()
            },
            generator: codegen::compare,
        },
    ]
}
