//! Rewrite rule engine.
//!
//! Maps Pine expression fragments onto procedure-language fragments with an
//! ordered table of substitution rules. Categories run strictly in the order
//! series, special values, direction constants, math, logical; a later
//! category never sees text inside a replacement made by an earlier one
//! because every pattern is boundary-checked and replacements only ever
//! produce dotted names or quoted strings.
//!
//! String literals are opaque: `"close"` stays `"close"`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleCategory {
    Series,
    Special,
    Direction,
    Math,
    Logical,
}

/// How a pattern occurrence must sit in its surrounding text to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Not preceded by a word character or `.`, not followed by a word character.
    Word,
    /// As `Word`, comparing ASCII case-insensitively.
    WordIgnoreCase,
    /// As `Word`, and the next non-blank character is `(`.
    Call,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteRule {
    pub category: RuleCategory,
    pub pattern: &'static str,
    pub replacement: &'static str,
    pub boundary: Boundary,
}

const fn rule(
    category: RuleCategory,
    pattern: &'static str,
    replacement: &'static str,
    boundary: Boundary,
) -> RewriteRule {
    RewriteRule {
        category,
        pattern,
        replacement,
        boundary,
    }
}

use Boundary::{Call, Word, WordIgnoreCase};
use RuleCategory::{Direction, Logical, Math, Series, Special};

/// The rule table. Sorted by category; order within a category is irrelevant
/// because no two patterns of one category can match the same text.
pub const RULES: &[RewriteRule] = &[
    rule(Series, "open", "df.open", Word),
    rule(Series, "high", "df.high", Word),
    rule(Series, "low", "df.low", Word),
    rule(Series, "close", "df.close", Word),
    rule(Series, "volume", "df.volume", Word),
    rule(Special, "bar_index", "df.index", Word),
    rule(Special, "time", "df.time", Word),
    rule(Special, "na", "nan", Word),
    rule(Special, "strategy.position_size", "self.position_size()", Word),
    rule(Direction, "strategy.long", "\"long\"", Word),
    rule(Direction, "strategy.short", "\"short\"", Word),
    rule(Math, "math.sqrt", "series.sqrt", Word),
    rule(Math, "math.pow", "series.pow", Word),
    rule(Math, "math.floor", "series.floor", Word),
    rule(Math, "math.ceil", "series.ceil", Word),
    rule(Math, "math.abs", "series.abs", Word),
    rule(Math, "math.log", "series.log", Word),
    rule(Math, "math.exp", "series.exp", Word),
    rule(Math, "math.max", "series.max", Word),
    rule(Math, "math.min", "series.min", Word),
    rule(Math, "abs", "series.abs", Call),
    rule(Logical, "true", "true", WordIgnoreCase),
    rule(Logical, "false", "false", WordIgnoreCase),
];

fn is_word(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

impl Boundary {
    /// Whether `text[start..start + len]` is a match under this boundary.
    fn accepts(self, text: &[u8], start: usize, len: usize) -> bool {
        let before_ok = start == 0 || !(is_word(text[start - 1]) || text[start - 1] == b'.');
        let end = start + len;
        let after_ok = end >= text.len() || !is_word(text[end]);
        if !(before_ok && after_ok) {
            return false;
        }
        match self {
            Word | WordIgnoreCase => true,
            Call => text[end..]
                .iter()
                .find(|c| !c.is_ascii_whitespace())
                .is_some_and(|c| *c == b'('),
        }
    }
}

impl RewriteRule {
    fn matches_at(&self, text: &[u8], pos: usize) -> bool {
        let pat = self.pattern.as_bytes();
        let Some(candidate) = text.get(pos..pos + pat.len()) else {
            return false;
        };
        let same = match self.boundary {
            WordIgnoreCase => candidate.eq_ignore_ascii_case(pat),
            Word | Call => candidate == pat,
        };
        same && self.boundary.accepts(text, pos, pat.len())
    }

    /// Apply this single rule to every eligible occurrence outside string literals.
    pub fn apply(&self, input: &str) -> String {
        let bytes = input.as_bytes();
        let mut out = String::with_capacity(input.len());
        let mut pos = 0;
        let mut copied = 0;

        while pos < bytes.len() {
            let c = bytes[pos];
            if c == b'"' || c == b'\'' {
                pos = skip_string(bytes, pos);
                continue;
            }
            if self.matches_at(bytes, pos) {
                out.push_str(&input[copied..pos]);
                out.push_str(self.replacement);
                pos += self.pattern.len();
                copied = pos;
                continue;
            }
            pos += 1;
        }
        out.push_str(&input[copied..]);
        out
    }
}

/// Index just past the string literal starting at `start` (or end of input).
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            c if c == quote => return pos + 1,
            _ => pos += 1,
        }
    }
    bytes.len()
}

/// Rewrite a Pine expression fragment. Pure and total; unmatched text passes through.
pub fn rewrite(fragment: &str) -> String {
    RULES
        .iter()
        .fold(fragment.to_string(), |acc, rule| rule.apply(&acc))
}
