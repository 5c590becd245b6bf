//! Domain error types.

/// A parse error in generated procedure text, with 1-based line and column.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error column of the offending line.
    pub fn display_with_context(&self, input: &str) -> String {
        let source_line = input.lines().nth(self.line.saturating_sub(1)).unwrap_or("");
        let caret = " ".repeat(self.column.saturating_sub(1)) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = source_line,
            caret = caret,
            err = self
        )
    }
}

/// Failure reported by the indicator library.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndicatorError {
    #[error("{indicator}: invalid {param} {value}, must be at least 1")]
    InvalidPeriod {
        indicator: &'static str,
        param: &'static str,
        value: i64,
    },
}

/// Top-level error type for pinetrader.
#[derive(Debug, thiserror::Error)]
pub enum PineError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("dataset error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error("generated procedure does not define runnable unit '{name}'")]
    MissingUnit { name: String },

    #[error("not permitted: {capability}")]
    NotPermitted { capability: String },

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error("{}", eval_message(.pine_line, .reason))]
    Eval {
        pine_line: Option<usize>,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn eval_message(pine_line: &Option<usize>, reason: &str) -> String {
    match pine_line {
        Some(line) => format!("pine line {line}: {reason}"),
        None => reason.to_string(),
    }
}

impl PineError {
    pub(crate) fn eval(pine_line: Option<usize>, reason: impl Into<String>) -> Self {
        PineError::Eval {
            pine_line,
            reason: reason.into(),
        }
    }

    /// Attach a script line to an evaluation error that has none yet.
    pub(crate) fn at_line(self, line: Option<usize>) -> Self {
        match self {
            PineError::Eval {
                pine_line: None,
                reason,
            } => PineError::Eval {
                pine_line: line,
                reason,
            },
            other => other,
        }
    }
}

impl From<&PineError> for std::process::ExitCode {
    fn from(err: &PineError) -> Self {
        let code: u8 = match err {
            PineError::Io(_) => 1,
            PineError::ConfigParse { .. }
            | PineError::ConfigMissing { .. }
            | PineError::ConfigInvalid { .. } => 2,
            PineError::Data { .. } => 3,
            PineError::Syntax(_) | PineError::MissingUnit { .. } => 4,
            PineError::NotPermitted { .. } => 5,
            PineError::Indicator(_) | PineError::Eval { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_context_points_at_column() {
        let err = ParseError {
            message: "unexpected ')'".into(),
            line: 2,
            column: 5,
        };
        let rendered = err.display_with_context("use ta\nx = )\n");
        let mut lines = rendered.lines();
        assert_eq!(lines.next(), Some("x = )"));
        assert_eq!(lines.next(), Some("    ^"));
        assert!(lines.next().unwrap().contains("line 2, column 5"));
    }

    #[test]
    fn eval_error_mentions_pine_line() {
        let err = PineError::eval(Some(7), "cannot compare string with series");
        assert_eq!(
            err.to_string(),
            "pine line 7: cannot compare string with series"
        );
        let err = PineError::eval(None, "boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn at_line_keeps_existing_line() {
        let err = PineError::eval(None, "boom").at_line(Some(3));
        assert_eq!(err.to_string(), "pine line 3: boom");
        let err = PineError::eval(Some(1), "boom").at_line(Some(3));
        assert_eq!(err.to_string(), "pine line 1: boom");
    }

    #[test]
    fn indicator_error_is_transparent() {
        let err: PineError = IndicatorError::InvalidPeriod {
            indicator: "SMA",
            param: "period",
            value: 0,
        }
        .into();
        assert_eq!(err.to_string(), "SMA: invalid period 0, must be at least 1");
    }
}
