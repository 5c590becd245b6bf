//! Intermediate form produced by a front end: header and body lines of a script.

use std::fmt;

/// One physical line of the source script, with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub text: String,
    pub line_number: usize,
}

impl SourceLine {
    pub fn new(text: impl Into<String>, line_number: usize) -> Self {
        Self {
            text: text.into(),
            line_number,
        }
    }

    /// Leading indentation width in columns; a tab counts as four.
    pub fn indent(&self) -> usize {
        self.text
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .map(|c| if c == '\t' { 4 } else { 1 })
            .sum()
    }
}

/// Script kind named by the `indicator(...)` / `strategy(...)` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Indicator,
    Strategy,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptKind::Indicator => write!(f, "indicator"),
            ScriptKind::Strategy => write!(f, "strategy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub version: Option<u32>,
    pub is_strategy: bool,
    pub header: Vec<SourceLine>,
    pub body: Vec<SourceLine>,
}

impl SourceUnit {
    /// Argument text of the script declaration, if the header holds one.
    pub fn declaration_args(&self) -> Option<&str> {
        self.header.iter().find_map(|line| {
            let trimmed = line.text.trim();
            let rest = trimmed
                .strip_prefix("strategy")
                .or_else(|| trimmed.strip_prefix("indicator"))?;
            let rest = rest.trim_start().strip_prefix('(')?;
            rest.trim_end().strip_suffix(')')
        })
    }

    /// Line number of the script declaration.
    pub fn declaration_line(&self) -> Option<usize> {
        self.header
            .iter()
            .find(|line| !line.text.trim_start().starts_with("//"))
            .map(|line| line.line_number)
    }

    pub fn kind(&self) -> Option<ScriptKind> {
        self.declaration_line()?;
        Some(if self.is_strategy {
            ScriptKind::Strategy
        } else {
            ScriptKind::Indicator
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(header: &[(&str, usize)]) -> SourceUnit {
        SourceUnit {
            version: Some(5),
            is_strategy: header.iter().any(|(t, _)| t.starts_with("strategy")),
            header: header
                .iter()
                .map(|(t, n)| SourceLine::new(*t, *n))
                .collect(),
            body: Vec::new(),
        }
    }

    #[test]
    fn indent_counts_tabs_as_four() {
        assert_eq!(SourceLine::new("    x = 1", 1).indent(), 4);
        assert_eq!(SourceLine::new("\tx = 1", 1).indent(), 4);
        assert_eq!(SourceLine::new("\t  x", 1).indent(), 6);
        assert_eq!(SourceLine::new("x", 1).indent(), 0);
    }

    #[test]
    fn declaration_args_strips_call() {
        let u = unit(&[
            ("//@version=5", 1),
            ("strategy(\"Cross\", overlay=true, pyramiding=2)", 2),
        ]);
        assert_eq!(
            u.declaration_args(),
            Some("\"Cross\", overlay=true, pyramiding=2")
        );
        assert_eq!(u.declaration_line(), Some(2));
        assert_eq!(u.kind(), Some(ScriptKind::Strategy));
    }

    #[test]
    fn no_declaration() {
        let u = unit(&[("//@version=5", 1)]);
        assert_eq!(u.declaration_args(), None);
        assert_eq!(u.kind(), None);
    }

    #[test]
    fn indicator_kind() {
        let u = unit(&[("indicator(title=\"SMA\")", 1)]);
        assert_eq!(u.kind(), Some(ScriptKind::Indicator));
        assert_eq!(ScriptKind::Indicator.to_string(), "indicator");
        assert_eq!(u.declaration_args(), Some("title=\"SMA\""));
    }
}
