//! Statement translator and procedure generator.
//!
//! Each body line is classified ([`classify`]) and emitted as one or more
//! procedure statements that keep the line's indentation and its source line
//! number. Statements are concatenated in body order; nothing is reordered or
//! eliminated.

use crate::domain::indicator::macd::{DEFAULT_FAST, DEFAULT_SIGNAL, DEFAULT_SLOW};
use crate::domain::indicator::DEFAULT_PERIOD;
use crate::domain::rewrite::rewrite;
use crate::domain::source::{SourceLine, SourceUnit};
use crate::domain::statement::{
    classify, partition_args, split_args, Cross, InputKind, StatementKind, Targets,
};

pub const DEFAULT_UNIT_NAME: &str = "TranslatedStrategy";

/// Name the unit binds the dataset to.
pub const DATASET_PARAM: &str = "df";

/// Import requests written at the top of every procedure.
pub const IMPORTS: &[&str] = &[
    "series",
    "frame",
    "ta",
    "pinetrader::runtime",
    "pinetrader::plot",
];

/// Marker of the trailing source line annotation.
pub const LINE_MARKER: &str = "# pine:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedStatement {
    /// Statement text including its leading indentation.
    pub target_text: String,
    pub source_line: Option<usize>,
}

impl GeneratedStatement {
    fn new(indent: usize, text: impl AsRef<str>, source_line: Option<usize>) -> Self {
        Self {
            target_text: format!("{}{}", " ".repeat(indent), text.as_ref()),
            source_line,
        }
    }
}

/// Handle to a generated runnable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedProcedure {
    pub unit_name: String,
    pub statements: Vec<GeneratedStatement>,
}

impl GeneratedProcedure {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for import in IMPORTS {
            out.push_str("use ");
            out.push_str(import);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&format!("unit {}({}):\n", self.unit_name, DATASET_PARAM));
        if self.statements.is_empty() {
            out.push_str("    pass\n");
        }
        for stmt in &self.statements {
            out.push_str("    ");
            out.push_str(&stmt.target_text);
            if let Some(line) = stmt.source_line {
                out.push_str(&format!("  {LINE_MARKER}{line}"));
            }
            out.push('\n');
        }
        out
    }
}

pub fn generate(unit: &SourceUnit) -> GeneratedProcedure {
    generate_named(unit, DEFAULT_UNIT_NAME)
}

pub fn generate_named(unit: &SourceUnit, unit_name: &str) -> GeneratedProcedure {
    let mut statements = Vec::new();
    if let Some(configure) = translate_declaration(unit) {
        statements.push(configure);
    }
    for line in &unit.body {
        statements.extend(translate_statement(line));
    }
    tracing::debug!(
        unit = unit_name,
        body_lines = unit.body.len(),
        statements = statements.len(),
        "generated procedure"
    );
    GeneratedProcedure {
        unit_name: unit_name.to_string(),
        statements,
    }
}

/// `strategy(..., pyramiding=N, default_qty_value=Q)` becomes a configure call.
fn translate_declaration(unit: &SourceUnit) -> Option<GeneratedStatement> {
    let (_, named) = partition_args(unit.declaration_args()?);
    let settings: Vec<String> = named
        .iter()
        .filter_map(|(key, value)| match *key {
            "pyramiding" => Some(format!("pyramiding={value}")),
            "default_qty_value" => Some(format!("default_qty={value}")),
            _ => None,
        })
        .collect();
    if settings.is_empty() {
        return None;
    }
    Some(GeneratedStatement::new(
        0,
        format!("self.configure({})", settings.join(", ")),
        unit.declaration_line(),
    ))
}

pub fn translate_statement(line: &SourceLine) -> Vec<GeneratedStatement> {
    let indent = line.indent();
    let at = Some(line.line_number);
    let stmt = strip_inline_comment(line.text.trim());
    let emit = |text: String| GeneratedStatement::new(indent, text, at);

    match classify(stmt) {
        StatementKind::InputDecl { name, kind, args } => {
            let default = input_default(kind, args);
            vec![emit(format!("{name} = {default}"))]
        }
        StatementKind::OrderCall { op, args } => {
            let args: Vec<String> = split_args(args).into_iter().map(rewrite).collect();
            vec![emit(format!("self.{}({})", op.method(), args.join(", ")))]
        }
        StatementKind::PlotCall { args } => vec![emit(translate_plot(args))],
        StatementKind::CrossAssign { name, cross, args } => {
            let operands: Vec<String> = split_args(args).into_iter().map(rewrite).collect();
            let text = match operands.as_slice() {
                [a, b, ..] => {
                    let (lagged, current) = match cross {
                        Cross::Over => ("<", ">="),
                        Cross::Under => (">", "<="),
                    };
                    format!("{name} = (({a})[1] {lagged} ({b})[1]) and (({a}) {current} ({b}))")
                }
                _ => format!("{name} = series.fill(false)"),
            };
            vec![emit(text)]
        }
        StatementKind::MultiOutputAssign { targets, args } => {
            let lhs = match targets {
                Targets::Prefix(name) => format!("{name}_macd, {name}_signal, {name}_hist"),
                Targets::Tuple(names) => names.join(", "),
            };
            let (positional, named) = partition_args(args);
            let source = positional
                .first()
                .copied()
                .or_else(|| lookup(&named, "source"))
                .map(rewrite)
                .unwrap_or_else(|| "df.close".into());
            let period = |i: usize, key: &str, default: i64| {
                positional
                    .get(i)
                    .copied()
                    .or_else(|| lookup(&named, key))
                    .map(rewrite)
                    .unwrap_or_else(|| default.to_string())
            };
            vec![emit(format!(
                "{lhs} = ta.macd({source}, int({}), int({}), int({}))",
                period(1, "fastlen", DEFAULT_FAST),
                period(2, "slowlen", DEFAULT_SLOW),
                period(3, "siglen", DEFAULT_SIGNAL),
            ))]
        }
        StatementKind::SingleOutputAssign {
            name,
            indicator,
            args,
        } => {
            let (positional, named) = partition_args(args);
            let source = positional
                .first()
                .map(|s| rewrite(s))
                .unwrap_or_else(|| "df.close".into());
            let length = positional
                .get(1)
                .copied()
                .or_else(|| lookup(&named, "length"))
                .map(rewrite)
                .unwrap_or_else(|| DEFAULT_PERIOD.to_string());
            vec![emit(format!(
                "{name} = ta.{}({source}, int({length}))",
                indicator.name()
            ))]
        }
        StatementKind::GenericAssign {
            name,
            expr,
            reassign,
        } => {
            let op = if reassign { ":=" } else { "=" };
            vec![emit(format!("{name} {op} {}", rewrite(expr)))]
        }
        StatementKind::If { condition } => vec![emit(format!("if {}:", rewrite(condition)))],
        StatementKind::ElseIf { condition } => {
            vec![emit(format!("else if {}:", rewrite(condition)))]
        }
        StatementKind::Else => vec![emit("else:".to_string())],
        StatementKind::Fallback(text) => vec![emit(rewrite(text))],
    }
}

fn lookup<'a>(named: &[(&str, &'a str)], key: &str) -> Option<&'a str> {
    named.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// `default=` wins, then Pine's `defval=`, then the first positional argument.
fn input_default(kind: InputKind, args: &str) -> String {
    let (positional, named) = partition_args(args);
    let raw = lookup(&named, "default")
        .or_else(|| lookup(&named, "defval"))
        .or_else(|| positional.first().copied());
    match raw {
        None => "nan".to_string(),
        Some(value) => match kind {
            InputKind::Source => rewrite(value),
            _ => normalize_literal(value),
        },
    }
}

fn normalize_literal(value: &str) -> String {
    let v = value.trim();
    if v.eq_ignore_ascii_case("true") {
        "true".to_string()
    } else if v.eq_ignore_ascii_case("false") {
        "false".to_string()
    } else {
        v.to_string()
    }
}

fn translate_plot(args: &str) -> String {
    let (positional, named) = partition_args(args);
    let series = positional.first().map(|s| rewrite(s)).unwrap_or_default();
    let title = lookup(&named, "title").or_else(|| {
        positional
            .get(1)
            .copied()
            .filter(|s| s.starts_with('"') || s.starts_with('\''))
    });
    match title {
        Some(title) => format!("plot({series}, title={title})"),
        None => format!("plot({series})"),
    }
}

/// Drop a trailing `// ...` comment that is outside any string literal.
fn strip_inline_comment(stmt: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev = '\0';
    for (i, c) in stmt.char_indices() {
        match quote {
            Some(q) if c == q && prev != '\\' => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '/' && prev == '/' => return stmt[..i - 1].trim_end(),
            None => {}
        }
        prev = c;
    }
    stmt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(text: &str) -> String {
        let out = translate_statement(&SourceLine::new(text, 3));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_line, Some(3));
        out[0].target_text.clone()
    }

    #[test]
    fn input_prefers_explicit_default() {
        assert_eq!(one("len = input.int(14)"), "len = 14");
        assert_eq!(one("len = input.int(10, default=20)"), "len = 20");
        assert_eq!(one("len = input.int(title=\"L\", defval=7)"), "len = 7");
        assert_eq!(one("flag = input.bool(TRUE)"), "flag = true");
        assert_eq!(one("name = input.string(\"abc\")"), "name = \"abc\"");
        assert_eq!(one("x = input.float()"), "x = nan");
        assert_eq!(one("src = input.source(close)"), "src = df.close");
    }

    #[test]
    fn order_calls_map_to_runtime() {
        assert_eq!(
            one("strategy.entry(\"L\", strategy.long, 1)"),
            "self.entry(\"L\", \"long\", 1)"
        );
        assert_eq!(
            one("strategy.exit(\"X\", from_entry=\"L\", qty=2)"),
            "self.exit(\"X\", from_entry=\"L\", qty=2)"
        );
        assert_eq!(one("strategy.close(\"close\")"), "self.close(\"close\")");
    }

    #[test]
    fn plot_rewrites_series_and_keeps_title() {
        assert_eq!(one("plot(close)"), "plot(df.close)");
        assert_eq!(
            one("plot(s, title=\"SMA\", color=color.red)"),
            "plot(s, title=\"SMA\")"
        );
        assert_eq!(one("plot(s, \"SMA\")"), "plot(s, title=\"SMA\")");
    }

    #[test]
    fn crossover_uses_lagged_comparison() {
        assert_eq!(
            one("up = ta.crossover(fast, close)"),
            "up = ((fast)[1] < (df.close)[1]) and ((fast) >= (df.close))"
        );
        assert_eq!(
            one("dn = crossunder(a, b)"),
            "dn = ((a)[1] > (b)[1]) and ((a) <= (b))"
        );
    }

    #[test]
    fn crossover_with_one_operand_degrades() {
        assert_eq!(one("up = ta.crossover(fast)"), "up = series.fill(false)");
    }

    #[test]
    fn macd_binds_three_names() {
        assert_eq!(
            one("m = ta.macd(close, fast, slow, sig)"),
            "m_macd, m_signal, m_hist = ta.macd(df.close, int(fast), int(slow), int(sig))"
        );
        assert_eq!(
            one("m = ta.macd(close)"),
            "m_macd, m_signal, m_hist = ta.macd(df.close, int(12), int(26), int(9))"
        );
        assert_eq!(
            one("[a, b, c] = ta.macd(close, 5, 10, 3)"),
            "a, b, c = ta.macd(df.close, int(5), int(10), int(3))"
        );
    }

    #[test]
    fn macd_keyword_lengths_bind_by_name() {
        assert_eq!(
            one("m = ta.macd(close, slowlen=26, fastlen=12, siglen=9)"),
            "m_macd, m_signal, m_hist = ta.macd(df.close, int(12), int(26), int(9))"
        );
        assert_eq!(
            one("m = ta.macd(close, 8, siglen=4)"),
            "m_macd, m_signal, m_hist = ta.macd(df.close, int(8), int(26), int(4))"
        );
    }

    #[test]
    fn single_output_indicators() {
        assert_eq!(one("s = ta.sma(close, len)"), "s = ta.sma(df.close, int(len))");
        assert_eq!(one("e = ta.ema(high, 9)"), "e = ta.ema(df.high, int(9))");
        assert_eq!(one("r = ta.rsi(close)"), "r = ta.rsi(df.close, int(14))");
        assert_eq!(
            one("r = ta.rsi(close, length=7)"),
            "r = ta.rsi(df.close, int(7))"
        );
    }

    #[test]
    fn generic_assignment_is_rewritten() {
        assert_eq!(
            one("rng = math.abs(high - low)"),
            "rng = series.abs(df.high - df.low)"
        );
        assert_eq!(one("x := x + 1"), "x := x + 1");
    }

    #[test]
    fn conditionals_get_block_terminator() {
        assert_eq!(one("if f > s"), "if f > s:");
        assert_eq!(one("else if r > 70"), "else if r > 70:");
        assert_eq!(one("else"), "else:");
        assert_eq!(one("if close > open:"), "if df.close > df.open:");
    }

    #[test]
    fn indentation_is_kept() {
        let out = translate_statement(&SourceLine::new(
            "    strategy.close(\"L\")",
            9,
        ));
        assert_eq!(out[0].target_text, "    self.close(\"L\")");
        let out = translate_statement(&SourceLine::new("\tx = close", 2));
        assert_eq!(out[0].target_text, "    x = df.close");
    }

    #[test]
    fn fallback_passes_through_rewrite() {
        assert_eq!(one("alert(\"hi\")"), "alert(\"hi\")");
        assert_eq!(one("close > open"), "df.close > df.open");
    }

    #[test]
    fn inline_comments_are_dropped() {
        assert_eq!(one("x = close // the close"), "x = df.close");
        assert_eq!(one("s = \"a//b\""), "s = \"a//b\"");
    }

    #[test]
    fn empty_procedure_renders_pass() {
        let unit = SourceUnit {
            version: Some(5),
            is_strategy: false,
            header: vec![],
            body: vec![],
        };
        let text = generate(&unit).render();
        assert!(text.contains("unit TranslatedStrategy(df):\n    pass\n"));
        assert!(text.starts_with("use series\n"));
    }

    #[test]
    fn render_annotates_lines_in_body_order() {
        let unit = SourceUnit {
            version: Some(5),
            is_strategy: true,
            header: vec![SourceLine::new(
                "strategy(\"x\", pyramiding=2, default_qty_value=3)",
                2,
            )],
            body: vec![
                SourceLine::new("a = close", 4),
                SourceLine::new("b = a * 2", 5),
            ],
        };
        let procedure = generate_named(&unit, "Custom");
        assert_eq!(procedure.unit_name, "Custom");
        let text = procedure.render();
        let body: Vec<&str> = text
            .lines()
            .skip_while(|l| !l.starts_with("unit "))
            .collect();
        assert_eq!(
            body,
            vec![
                "unit Custom(df):",
                "    self.configure(pyramiding=2, default_qty=3)  # pine:2",
                "    a = df.close  # pine:4",
                "    b = a * 2  # pine:5",
            ]
        );
    }
}
