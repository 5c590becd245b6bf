//! Line-oriented structural segmenter.
//!
//! Diverts the `// @version = N` pragma and the `indicator(...)`/`strategy(...)`
//! declaration to the header, drops blank and comment-only lines, and keeps every
//! other line in the body with its original line number. It does not understand
//! multi-line expressions or keywords hidden inside string literals.

use crate::domain::source::{SourceLine, SourceUnit};
use crate::ports::front_end_port::FrontEnd;

#[derive(Debug, Clone, Copy, Default)]
pub struct LineFrontEnd;

impl FrontEnd for LineFrontEnd {
    fn parse(&self, source: &str) -> SourceUnit {
        let mut unit = SourceUnit {
            version: None,
            is_strategy: false,
            header: Vec::new(),
            body: Vec::new(),
        };

        for (idx, raw) in source.lines().enumerate() {
            let line_number = idx + 1;
            let stripped = raw.trim();
            if stripped.is_empty() {
                continue;
            }
            if let Some(version) = parse_version_pragma(stripped) {
                unit.version = Some(version);
                unit.header.push(SourceLine::new(raw, line_number));
                continue;
            }
            if let Some(is_strategy) = parse_declaration(stripped) {
                unit.is_strategy = is_strategy;
                unit.header.push(SourceLine::new(raw, line_number));
                continue;
            }
            if stripped.starts_with("//") {
                continue;
            }
            unit.body.push(SourceLine::new(raw, line_number));
        }

        tracing::debug!(
            version = ?unit.version,
            header = unit.header.len(),
            body = unit.body.len(),
            "segmented script"
        );
        unit
    }
}

/// `// @version = N`, whitespace optional around every token.
fn parse_version_pragma(stripped: &str) -> Option<u32> {
    let rest = stripped.strip_prefix("//")?.trim_start();
    let rest = rest.strip_prefix("@version")?.trim_start();
    let rest = rest.strip_prefix('=')?.trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Returns `Some(true)` for `strategy(...)`, `Some(false)` for `indicator(...)`.
fn parse_declaration(stripped: &str) -> Option<bool> {
    let (is_strategy, rest) = if let Some(rest) = stripped.strip_prefix("strategy") {
        (true, rest)
    } else if let Some(rest) = stripped.strip_prefix("indicator") {
        (false, rest)
    } else {
        return None;
    };
    let rest = rest.trim_start();
    if rest.starts_with('(') && rest.ends_with(')') {
        Some(is_strategy)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "
//@version=5
strategy(title=\"Cross Strategy\", overlay=true)
// a comment
fast = input.int(5)

if close > open
    strategy.entry(\"L\", strategy.long, 1)
";

    #[test]
    fn splits_header_and_body() {
        let unit = LineFrontEnd.parse(SCRIPT);
        assert_eq!(unit.version, Some(5));
        assert!(unit.is_strategy);
        assert_eq!(unit.header.len(), 2);
        assert_eq!(unit.header[0].line_number, 2);
        assert_eq!(unit.header[1].line_number, 3);

        let body: Vec<(usize, &str)> = unit
            .body
            .iter()
            .map(|l| (l.line_number, l.text.as_str()))
            .collect();
        assert_eq!(
            body,
            vec![
                (5, "fast = input.int(5)"),
                (7, "if close > open"),
                (8, "    strategy.entry(\"L\", strategy.long, 1)"),
            ]
        );
    }

    #[test]
    fn version_pragma_with_spaces() {
        assert_eq!(parse_version_pragma("// @version = 6"), Some(6));
        assert_eq!(parse_version_pragma("//@version=5"), Some(5));
        assert_eq!(parse_version_pragma("// version 5"), None);
        assert_eq!(parse_version_pragma("//@version="), None);
    }

    #[test]
    fn indicator_declaration() {
        let unit = LineFrontEnd.parse("indicator(\"SMA\", overlay=true)\nplot(close)\n");
        assert!(!unit.is_strategy);
        assert_eq!(unit.version, None);
        assert_eq!(unit.header.len(), 1);
        assert_eq!(unit.body.len(), 1);
    }

    #[test]
    fn malformed_declaration_falls_through_to_body() {
        let unit = LineFrontEnd.parse("strategy(\"unterminated\"\nstrategyName = 1\n");
        assert!(unit.header.is_empty());
        assert_eq!(unit.body.len(), 2);
        assert!(!unit.is_strategy);
    }

    #[test]
    fn empty_source() {
        let unit = LineFrontEnd.parse("");
        assert!(unit.header.is_empty());
        assert!(unit.body.is_empty());
    }

    #[test]
    fn crlf_line_endings() {
        let unit = LineFrontEnd.parse("//@version=5\r\nx = 1\r\n");
        assert_eq!(unit.version, Some(5));
        assert_eq!(unit.body[0].text, "x = 1");
    }
}
