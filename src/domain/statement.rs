//! Statement shapes recognised in a script body.
//!
//! [`classify`] maps one trimmed body line onto a closed [`StatementKind`];
//! the first matching shape wins, in declaration order of the variants.

use crate::domain::indicator::Indicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Int,
    Float,
    Bool,
    String,
    Source,
    /// Bare `input(...)`.
    Any,
}

impl InputKind {
    fn from_call(name: &str) -> Option<Self> {
        match name {
            "input.int" => Some(InputKind::Int),
            "input.float" => Some(InputKind::Float),
            "input.bool" => Some(InputKind::Bool),
            "input.string" => Some(InputKind::String),
            "input.source" => Some(InputKind::Source),
            "input" => Some(InputKind::Any),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOp {
    Entry,
    Exit,
    Close,
}

impl OrderOp {
    pub fn method(self) -> &'static str {
        match self {
            OrderOp::Entry => "entry",
            OrderOp::Exit => "exit",
            OrderOp::Close => "close",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    Over,
    Under,
}

/// Left-hand side of a multi-output assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets<'a> {
    /// `name = ta.macd(...)` binds `name_macd`, `name_signal`, `name_hist`.
    Prefix(&'a str),
    /// `[a, b, c] = ta.macd(...)`.
    Tuple(Vec<&'a str>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind<'a> {
    InputDecl {
        name: &'a str,
        kind: InputKind,
        args: &'a str,
    },
    OrderCall {
        op: OrderOp,
        args: &'a str,
    },
    PlotCall {
        args: &'a str,
    },
    CrossAssign {
        name: &'a str,
        cross: Cross,
        args: &'a str,
    },
    MultiOutputAssign {
        targets: Targets<'a>,
        args: &'a str,
    },
    SingleOutputAssign {
        name: &'a str,
        indicator: Indicator,
        args: &'a str,
    },
    GenericAssign {
        name: &'a str,
        expr: &'a str,
        reassign: bool,
    },
    If {
        condition: &'a str,
    },
    ElseIf {
        condition: &'a str,
    },
    Else,
    Fallback(&'a str),
}

const TYPE_KEYWORDS: &[&str] = &["int", "float", "bool", "string"];

pub fn classify(stmt: &str) -> StatementKind<'_> {
    let stmt = stmt.trim();

    if let Some((targets, rhs)) = split_tuple_assignment(stmt) {
        if let Some(args) = call_args(rhs, "ta.macd") {
            return StatementKind::MultiOutputAssign {
                targets: Targets::Tuple(targets),
                args,
            };
        }
    }

    let assignment = split_assignment(stmt);

    if let Some((name, rhs, false)) = assignment {
        if let Some((call, args)) = whole_call(rhs) {
            if let Some(kind) = InputKind::from_call(call) {
                return StatementKind::InputDecl { name, kind, args };
            }
        }
    }

    for op in [OrderOp::Entry, OrderOp::Exit, OrderOp::Close] {
        let prefix = format!("strategy.{}", op.method());
        if let Some(args) = call_args(stmt, &prefix) {
            return StatementKind::OrderCall { op, args };
        }
    }

    if let Some(args) = call_args(stmt, "plot") {
        return StatementKind::PlotCall { args };
    }

    if let Some((name, rhs, reassign)) = assignment {
        if let Some((call, args)) = whole_call(rhs) {
            let cross = match call.strip_prefix("ta.").unwrap_or(call) {
                "crossover" => Some(Cross::Over),
                "crossunder" => Some(Cross::Under),
                _ => None,
            };
            if let Some(cross) = cross {
                return StatementKind::CrossAssign { name, cross, args };
            }
            if call == "ta.macd" && !reassign {
                return StatementKind::MultiOutputAssign {
                    targets: Targets::Prefix(name),
                    args,
                };
            }
            if let Some(indicator) = call.strip_prefix("ta.").and_then(Indicator::from_name) {
                return StatementKind::SingleOutputAssign {
                    name,
                    indicator,
                    args,
                };
            }
        }
        return StatementKind::GenericAssign {
            name,
            expr: rhs,
            reassign,
        };
    }

    if let Some(rest) = strip_keyword(stmt, "else") {
        let rest = rest.trim();
        if let Some(condition) = strip_keyword(rest, "if") {
            return StatementKind::ElseIf {
                condition: trim_block_colon(condition),
            };
        }
        if trim_block_colon(rest).is_empty() {
            return StatementKind::Else;
        }
    }
    if let Some(condition) = strip_keyword(stmt, "if") {
        return StatementKind::If {
            condition: trim_block_colon(condition),
        };
    }

    StatementKind::Fallback(stmt)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_char)
}

/// Leading identifier of `s` and the text after it.
fn leading_identifier(s: &str) -> Option<(&str, &str)> {
    if !s.starts_with(is_ident_start) {
        return None;
    }
    let end = s.find(|c: char| !is_ident_char(c)).unwrap_or(s.len());
    Some((&s[..end], &s[end..]))
}

/// `name = rhs`, `name := rhs` or `<type> name = rhs`; the flag marks `:=`.
pub(crate) fn split_assignment(stmt: &str) -> Option<(&str, &str, bool)> {
    let (first, rest) = leading_identifier(stmt)?;
    let (name, rest) = if TYPE_KEYWORDS.contains(&first) {
        match leading_identifier(rest.trim_start()) {
            Some(found) => found,
            None => (first, rest),
        }
    } else {
        (first, rest)
    };
    let rest = rest.trim_start();
    if let Some(rhs) = rest.strip_prefix(":=") {
        return Some((name, rhs.trim(), true));
    }
    let rhs = rest.strip_prefix('=')?;
    if rhs.starts_with('=') {
        return None;
    }
    Some((name, rhs.trim(), false))
}

/// `[a, b, c] = rhs`.
fn split_tuple_assignment(stmt: &str) -> Option<(Vec<&str>, &str)> {
    let inner_end = stmt.find(']')?;
    let names = stmt.strip_prefix('[')?.get(..inner_end - 1)?;
    let rhs = stmt[inner_end + 1..].trim_start().strip_prefix('=')?;
    if rhs.starts_with('=') {
        return None;
    }
    let targets: Vec<&str> = names.split(',').map(str::trim).collect();
    if targets.iter().all(|t| is_identifier(t)) {
        Some((targets, rhs.trim()))
    } else {
        None
    }
}

fn strip_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(keyword)?;
    if rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == ':' || c == '(') {
        Some(rest)
    } else {
        None
    }
}

fn trim_block_colon(s: &str) -> &str {
    let s = s.trim();
    s.strip_suffix(':').map(str::trim_end).unwrap_or(s)
}

/// If `expr` is exactly one call `path(...)`, its dotted path and argument text.
pub(crate) fn whole_call(expr: &str) -> Option<(&str, &str)> {
    let open = expr.find('(')?;
    let path = expr[..open].trim_end();
    if path.is_empty() || !path.split('.').all(is_identifier) {
        return None;
    }
    let close = matching_paren(expr, open)?;
    if !expr[close + 1..].trim().is_empty() {
        return None;
    }
    Some((path, &expr[open + 1..close]))
}

/// Argument text of `prefix(...)` when the statement is exactly that call.
pub(crate) fn call_args<'a>(stmt: &'a str, prefix: &str) -> Option<&'a str> {
    let (path, args) = whole_call(stmt)?;
    (path == prefix).then_some(args)
}

/// Byte index of the `)` closing the `(` at `open`, skipping string literals.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices().skip_while(|(i, _)| *i < open) {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split an argument list on top-level commas; nested brackets and strings stay whole.
pub(crate) fn split_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(args[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// `key = value` keyword argument.
pub(crate) fn keyword_arg(arg: &str) -> Option<(&str, &str)> {
    let (name, rest) = leading_identifier(arg)?;
    let value = rest.trim_start().strip_prefix('=')?;
    if value.starts_with('=') {
        return None;
    }
    Some((name, value.trim()))
}

/// Positional arguments and keyword arguments of a call, in source order.
pub(crate) fn partition_args(args: &str) -> (Vec<&str>, Vec<(&str, &str)>) {
    let mut positional = Vec::new();
    let mut named = Vec::new();
    for arg in split_args(args) {
        match keyword_arg(arg) {
            Some(kw) => named.push(kw),
            None => positional.push(arg),
        }
    }
    (positional, named)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_declarations() {
        assert_eq!(
            classify("len = input.int(14, title=\"Length\")"),
            StatementKind::InputDecl {
                name: "len",
                kind: InputKind::Int,
                args: "14, title=\"Length\"",
            }
        );
        assert!(matches!(
            classify("src = input.source(close)"),
            StatementKind::InputDecl {
                kind: InputKind::Source,
                ..
            }
        ));
        assert!(matches!(
            classify("x = input(1.5)"),
            StatementKind::InputDecl {
                kind: InputKind::Any,
                ..
            }
        ));
    }

    #[test]
    fn order_calls() {
        assert_eq!(
            classify("strategy.entry(\"L\", strategy.long, 1)"),
            StatementKind::OrderCall {
                op: OrderOp::Entry,
                args: "\"L\", strategy.long, 1",
            }
        );
        assert!(matches!(
            classify("strategy.exit(\"x\", from_entry=\"L\")"),
            StatementKind::OrderCall {
                op: OrderOp::Exit,
                ..
            }
        ));
        assert!(matches!(
            classify("strategy.close(\"L\")"),
            StatementKind::OrderCall {
                op: OrderOp::Close,
                ..
            }
        ));
    }

    #[test]
    fn plot_call() {
        assert_eq!(
            classify("plot(s, title=\"SMA\")"),
            StatementKind::PlotCall {
                args: "s, title=\"SMA\""
            }
        );
    }

    #[test]
    fn crossing_with_and_without_namespace() {
        assert_eq!(
            classify("up = ta.crossover(fast, slow)"),
            StatementKind::CrossAssign {
                name: "up",
                cross: Cross::Over,
                args: "fast, slow",
            }
        );
        assert!(matches!(
            classify("dn = crossunder(fast, slow)"),
            StatementKind::CrossAssign {
                cross: Cross::Under,
                ..
            }
        ));
    }

    #[test]
    fn crossing_inside_larger_expression_is_generic() {
        assert!(matches!(
            classify("buy = ta.crossover(a, b) and ok"),
            StatementKind::GenericAssign { .. }
        ));
    }

    #[test]
    fn macd_forms() {
        assert_eq!(
            classify("m = ta.macd(close, 12, 26, 9)"),
            StatementKind::MultiOutputAssign {
                targets: Targets::Prefix("m"),
                args: "close, 12, 26, 9",
            }
        );
        assert_eq!(
            classify("[a, b, c] = ta.macd(close, 12, 26, 9)"),
            StatementKind::MultiOutputAssign {
                targets: Targets::Tuple(vec!["a", "b", "c"]),
                args: "close, 12, 26, 9",
            }
        );
    }

    #[test]
    fn single_output_indicators() {
        assert_eq!(
            classify("s = ta.sma(close, len)"),
            StatementKind::SingleOutputAssign {
                name: "s",
                indicator: Indicator::Sma,
                args: "close, len",
            }
        );
        assert!(matches!(
            classify("r = ta.rsi(close)"),
            StatementKind::SingleOutputAssign {
                indicator: Indicator::Rsi,
                ..
            }
        ));
    }

    #[test]
    fn generic_assignments() {
        assert_eq!(
            classify("mid = (high + low) / 2"),
            StatementKind::GenericAssign {
                name: "mid",
                expr: "(high + low) / 2",
                reassign: false,
            }
        );
        assert_eq!(
            classify("x := x + 1"),
            StatementKind::GenericAssign {
                name: "x",
                expr: "x + 1",
                reassign: true,
            }
        );
        assert_eq!(
            classify("float m = close * 2"),
            StatementKind::GenericAssign {
                name: "m",
                expr: "close * 2",
                reassign: false,
            }
        );
    }

    #[test]
    fn equality_is_not_assignment() {
        assert_eq!(classify("x == 1"), StatementKind::Fallback("x == 1"));
    }

    #[test]
    fn conditionals() {
        assert_eq!(
            classify("if f > s"),
            StatementKind::If { condition: "f > s" }
        );
        assert_eq!(
            classify("else if r > 70"),
            StatementKind::ElseIf { condition: "r > 70" }
        );
        assert_eq!(classify("else"), StatementKind::Else);
        assert_eq!(classify("else:"), StatementKind::Else);
        assert_eq!(
            classify("if(close > open)"),
            StatementKind::If {
                condition: "(close > open)"
            }
        );
    }

    #[test]
    fn identifiers_starting_with_keywords_are_not_conditionals() {
        assert_eq!(classify("iffy(x)"), StatementKind::Fallback("iffy(x)"));
        assert_eq!(classify("elsewhere"), StatementKind::Fallback("elsewhere"));
    }

    #[test]
    fn split_args_respects_nesting_and_strings() {
        assert_eq!(
            split_args("ta.sma(close, 5), \"a,b\", [1, 2]"),
            vec!["ta.sma(close, 5)", "\"a,b\"", "[1, 2]"]
        );
        assert!(split_args("  ").is_empty());
    }

    #[test]
    fn partition_keyword_arguments() {
        let (pos, named) = partition_args("14, title=\"Len\", minval = 1");
        assert_eq!(pos, vec!["14"]);
        assert_eq!(named, vec![("title", "\"Len\""), ("minval", "1")]);
        let (pos, named) = partition_args("a == b");
        assert_eq!(pos, vec!["a == b"]);
        assert!(named.is_empty());
    }

    #[test]
    fn whole_call_requires_full_expression() {
        assert_eq!(whole_call("ta.sma(close, 5)"), Some(("ta.sma", "close, 5")));
        assert_eq!(whole_call("ta.sma(close, 5) * 2"), None);
        assert_eq!(whole_call("(a + b)"), None);
        assert_eq!(whole_call("f(\")\")"), Some(("f", "\")\"")));
    }
}
