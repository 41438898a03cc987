//! # Node-Specific Handlers
//!
//! Per-kind generators for the builtin block library. Containers indent their
//! own nested chains; everything else emits a single line or expression.

use super::{indent, BlockContext, GeneratedFragment, Order};

fn function_body(signature: &str, ctx: &BlockContext<'_>) -> GeneratedFragment {
    GeneratedFragment::statement(format!(
        "{} {{\n{}}}\n",
        signature,
        indent(ctx.statement("DO"), 1)
    ))
}

pub fn root_setup(ctx: &BlockContext<'_>) -> GeneratedFragment {
    function_body("void setup()", ctx)
}

pub fn root_loop(ctx: &BlockContext<'_>) -> GeneratedFragment {
    function_body("void loop()", ctx)
}

pub fn pin_mode(ctx: &BlockContext<'_>) -> GeneratedFragment {
    GeneratedFragment::statement(format!(
        "pinMode({}, {});\n",
        ctx.field("PIN"),
        ctx.field("MODE")
    ))
}

pub fn digital_write(ctx: &BlockContext<'_>) -> GeneratedFragment {
    GeneratedFragment::statement(format!(
        "digitalWrite({}, {});\n",
        ctx.field("PIN"),
        ctx.field("STATE")
    ))
}

pub fn analog_write(ctx: &BlockContext<'_>) -> GeneratedFragment {
    GeneratedFragment::statement(format!(
        "analogWrite({}, {});\n",
        ctx.field("PIN"),
        ctx.value("VALUE")
    ))
}

pub fn delay_ms(ctx: &BlockContext<'_>) -> GeneratedFragment {
    GeneratedFragment::statement(format!("delay({});\n", ctx.number("MS")))
}

pub fn repeat_times(ctx: &BlockContext<'_>) -> GeneratedFragment {
    let var = ctx.loop_variable();
    GeneratedFragment::statement(format!(
        "for (unsigned long {var} = 0; {var} < {times}; {var}++) {{\n{body}}}\n",
        var = var,
        times = ctx.number("TIMES"),
        body = indent(ctx.statement("DO"), 1)
    ))
}

pub fn if_then(ctx: &BlockContext<'_>) -> GeneratedFragment {
    GeneratedFragment::statement(format!(
        "if ({}) {{\n{}}}\n",
        ctx.value("CONDITION"),
        indent(ctx.statement("DO"), 1)
    ))
}

pub fn serial_begin(ctx: &BlockContext<'_>) -> GeneratedFragment {
    GeneratedFragment::statement(format!("Serial.begin({});\n", ctx.field("BAUD")))
}

pub fn serial_print(ctx: &BlockContext<'_>) -> GeneratedFragment {
    GeneratedFragment::statement(format!("Serial.println({});\n", ctx.value("TEXT")))
}

pub fn number(ctx: &BlockContext<'_>) -> GeneratedFragment {
    GeneratedFragment::value(ctx.number("NUM").to_string(), Order::ATOMIC)
}

pub fn text(ctx: &BlockContext<'_>) -> GeneratedFragment {
    GeneratedFragment::value(quote_string(&ctx.field("TEXT")), Order::ATOMIC)
}

pub fn digital_read(ctx: &BlockContext<'_>) -> GeneratedFragment {
    GeneratedFragment::value(
        format!("digitalRead({})", ctx.field("PIN")),
        Order::UNARY_POSTFIX,
    )
}

pub fn analog_read(ctx: &BlockContext<'_>) -> GeneratedFragment {
    GeneratedFragment::value(
        format!("analogRead({})", ctx.field("PIN")),
        Order::UNARY_POSTFIX,
    )
}

pub fn compare(ctx: &BlockContext<'_>) -> GeneratedFragment {
    let op = ctx.field("OP");
    let order = match op.as_str() {
        "==" | "!=" => Order::EQUALITY,
        _ => Order::RELATIONAL,
    };
    GeneratedFragment::value(
        format!("{} {} {}", ctx.value("A"), op, ctx.value("B")),
        order,
    )
}

/// C++ string literal for `raw`.
pub fn quote_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_string_escapes() {
        assert_eq!(quote_string("hi"), "\"hi\"");
        assert_eq!(quote_string("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
    }
}
