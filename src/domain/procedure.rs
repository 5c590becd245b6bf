//! Procedure text parser.
//!
//! Turns generated procedure text into a syntax tree: import requests plus
//! units whose bodies are nested by indentation. Expressions are parsed by a
//! recursive descent parser with position-accurate errors.

use crate::domain::codegen::LINE_MARKER;
use crate::domain::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Nan,
    /// A name or dotted path such as `df.close`.
    Path(Vec<String>),
    Call {
        callee: Vec<String>,
        args: Vec<Arg>,
    },
    Index {
        target: Box<Expr>,
        offset: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign {
        targets: Vec<String>,
        value: Expr,
        reassign: bool,
    },
    If(Expr),
    ElseIf(Expr),
    Else,
    Pass,
    Expr(Expr),
}

impl StmtKind {
    fn opens_block(&self) -> bool {
        matches!(self, StmtKind::If(_) | StmtKind::ElseIf(_) | StmtKind::Else)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// Line in the procedure text.
    pub line: usize,
    /// Script line from the trailing `# pine:N` annotation.
    pub pine_line: Option<usize>,
    pub kind: StmtKind,
    pub block: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub path: Vec<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: String,
    pub param: String,
    pub line: usize,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcedureAst {
    pub imports: Vec<Import>,
    pub units: Vec<Unit>,
}

/// One physical statement line before nesting.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyLine<'a> {
    pub line: usize,
    pub indent: usize,
    pub text: &'a str,
    pub pine_line: Option<usize>,
}

impl<'a> BodyLine<'a> {
    /// Line from raw statement text; indentation is measured before trimming.
    pub fn new(line: usize, raw: &'a str, pine_line: Option<usize>) -> Self {
        Self {
            line,
            indent: indent_of(raw),
            text: raw.trim(),
            pine_line,
        }
    }
}

pub fn parse_procedure(text: &str) -> Result<ProcedureAst, ParseError> {
    let mut ast = ProcedureAst::default();
    let mut pending: Option<(String, String, usize)> = None;
    let mut body: Vec<BodyLine<'_>> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let (code, pine_line) = split_comment(raw);
        if code.trim().is_empty() {
            continue;
        }
        let indent = indent_of(code);
        if indent > 0 {
            if pending.is_none() {
                return Err(error_at(line, indent + 1, "statement outside of a unit"));
            }
            body.push(BodyLine::new(line, code, pine_line));
            continue;
        }

        if let Some((name, param, unit_line)) = pending.take() {
            ast.units.push(Unit {
                name,
                param,
                line: unit_line,
                body: parse_body(&body)?,
            });
            body.clear();
        }

        let code = code.trim_end();
        if let Some(rest) = keyword_rest(code, "use") {
            ast.imports.push(Import {
                path: parse_import_path(rest, line, 5)?,
                line,
            });
        } else if let Some(rest) = keyword_rest(code, "unit") {
            let (name, param) = parse_unit_header(rest, line)?;
            pending = Some((name, param, line));
        } else {
            return Err(error_at(
                line,
                1,
                format!("expected 'use' or 'unit', found '{}'", first_word(code)),
            ));
        }
    }

    if let Some((name, param, unit_line)) = pending {
        ast.units.push(Unit {
            name,
            param,
            line: unit_line,
            body: parse_body(&body)?,
        });
    }
    Ok(ast)
}

/// Parse and nest statement lines; the first line sets the block indentation.
pub fn parse_body(lines: &[BodyLine<'_>]) -> Result<Vec<Stmt>, ParseError> {
    let Some(first) = lines.first() else {
        return Ok(Vec::new());
    };
    let mut pos = 0;
    let stmts = nest(lines, &mut pos, first.indent)?;
    if let Some(stray) = lines.get(pos) {
        return Err(error_at(
            stray.line,
            1,
            "unindent does not match any outer indentation level",
        ));
    }
    Ok(stmts)
}

fn nest(lines: &[BodyLine<'_>], pos: &mut usize, indent: usize) -> Result<Vec<Stmt>, ParseError> {
    let mut out = Vec::new();
    while let Some(current) = lines.get(*pos) {
        if current.indent < indent {
            break;
        }
        if current.indent > indent {
            return Err(error_at(current.line, current.indent + 1, "unexpected indent"));
        }
        *pos += 1;
        let kind = parse_statement(current)?;
        let mut block = Vec::new();
        if kind.opens_block() {
            match lines.get(*pos) {
                Some(next) if next.indent > indent => {
                    block = nest(lines, pos, next.indent)?;
                }
                _ => {
                    return Err(error_at(
                        current.line,
                        current.indent + current.text.len() + 1,
                        "expected an indented block",
                    ));
                }
            }
        }
        out.push(Stmt {
            line: current.line,
            pine_line: current.pine_line,
            kind,
            block,
        });
    }
    Ok(out)
}

fn parse_statement(line: &BodyLine<'_>) -> Result<StmtKind, ParseError> {
    let mut parser = Parser::new(line.text, line.line, line.indent);
    let kind = parser.parse_statement()?;
    parser.skip_whitespace();
    if parser.peek().is_some() {
        return Err(parser.error(format!("unexpected '{}'", parser.peek_word())));
    }
    Ok(kind)
}

/// Code part of a line and the script line from a trailing annotation.
fn split_comment(raw: &str) -> (&str, Option<usize>) {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in raw.char_indices() {
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
            '#' => {
                let comment = raw[i..].trim();
                let pine_line = comment
                    .strip_prefix(LINE_MARKER)
                    .and_then(|n| n.trim().parse().ok());
                return (&raw[..i], pine_line);
            }
            _ => {}
        }
    }
    (raw, None)
}

fn indent_of(code: &str) -> usize {
    code.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn keyword_rest<'a>(code: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = code.strip_prefix(keyword)?;
    rest.starts_with(char::is_whitespace).then_some(rest)
}

fn first_word(code: &str) -> &str {
    code.split_whitespace().next().unwrap_or(code)
}

fn error_at(line: usize, column: usize, message: impl Into<String>) -> ParseError {
    ParseError {
        message: message.into(),
        line,
        column,
    }
}

fn parse_import_path(rest: &str, line: usize, column: usize) -> Result<Vec<String>, ParseError> {
    let path: Vec<String> = rest.trim().split("::").map(|s| s.trim().to_string()).collect();
    if path.iter().all(|s| is_identifier(s)) {
        Ok(path)
    } else {
        Err(error_at(line, column, format!("invalid import path '{}'", rest.trim())))
    }
}

fn parse_unit_header(rest: &str, line: usize) -> Result<(String, String), ParseError> {
    let rest = rest.trim();
    let header = rest
        .strip_suffix(':')
        .ok_or_else(|| error_at(line, rest.len() + 6, "expected ':' after unit header"))?;
    let open = header
        .find('(')
        .ok_or_else(|| error_at(line, 6, "expected '(' after unit name"))?;
    let name = header[..open].trim();
    let param = header[open + 1..]
        .trim_end()
        .strip_suffix(')')
        .ok_or_else(|| error_at(line, header.len() + 5, "expected ')' after unit parameter"))?
        .trim();
    if !is_identifier(name) {
        return Err(error_at(line, 6, format!("invalid unit name '{}'", name)));
    }
    if !is_identifier(param) {
        return Err(error_at(line, open + 7, format!("invalid unit parameter '{}'", param)));
    }
    Ok((name.to_string(), param.to_string()))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

const KEYWORDS: &[&str] = &["and", "or", "not", "if", "else", "true", "false", "nan", "pass"];

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    indent: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, line: usize, indent: usize) -> Self {
        Self {
            input,
            pos: 0,
            line,
            indent,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        error_at(self.line, self.indent + self.pos + 1, message)
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of line", expected))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        self.skip_whitespace();
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of line".to_string())
        } else {
            word
        }
    }

    fn parse_identifier(&mut self) -> Option<String> {
        self.skip_whitespace();
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return None,
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        Some(self.input[start..self.pos].to_string())
    }

    fn parse_statement(&mut self) -> Result<StmtKind, ParseError> {
        self.skip_whitespace();
        if self.consume_keyword("pass") {
            return Ok(StmtKind::Pass);
        }
        if self.consume_keyword("else") {
            if self.consume_keyword("if") {
                let cond = self.parse_expr()?;
                self.expect_char(':')?;
                return Ok(StmtKind::ElseIf(cond));
            }
            self.expect_char(':')?;
            return Ok(StmtKind::Else);
        }
        if self.consume_keyword("if") {
            let cond = self.parse_expr()?;
            self.expect_char(':')?;
            return Ok(StmtKind::If(cond));
        }
        if let Some((targets, reassign)) = self.try_assignment_targets() {
            let value = self.parse_expr()?;
            return Ok(StmtKind::Assign {
                targets,
                value,
                reassign,
            });
        }
        Ok(StmtKind::Expr(self.parse_expr()?))
    }

    /// `a = `, `a, b, c = ` or `a := `; rewinds when the line is not an assignment.
    fn try_assignment_targets(&mut self) -> Option<(Vec<String>, bool)> {
        let start = self.pos;
        let mut targets = Vec::new();
        loop {
            match self.parse_identifier() {
                Some(name) if !KEYWORDS.contains(&name.as_str()) => targets.push(name),
                _ => {
                    self.pos = start;
                    return None;
                }
            }
            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.advance();
                continue;
            }
            break;
        }
        if self.consume_exact(":=") {
            return Some((targets, true));
        }
        if self.remaining().starts_with('=') && !self.remaining().starts_with("==") {
            self.advance();
            return Some((targets, false));
        }
        self.pos = start;
        None
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_or()?;
        self.skip_whitespace();
        if self.peek() == Some('?') {
            self.advance();
            let then = self.parse_expr()?;
            self.expect_char(':')?;
            let otherwise = self.parse_expr()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.consume_keyword("or") {
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.consume_keyword("and") {
            let right = self.parse_not()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.consume_keyword("not") {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        self.skip_whitespace();
        let op = if self.consume_exact("<=") {
            BinaryOp::Le
        } else if self.consume_exact(">=") {
            BinaryOp::Ge
        } else if self.consume_exact("==") {
            BinaryOp::Eq
        } else if self.consume_exact("!=") {
            BinaryOp::Ne
        } else if self.consume_exact("<") {
            BinaryOp::Lt
        } else if self.consume_exact(">") {
            BinaryOp::Gt
        } else {
            return Ok(left);
        };
        let right = self.parse_additive()?;
        Ok(binary(op, left, right))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.consume_exact("+") {
                BinaryOp::Add
            } else if self.consume_exact("-") {
                BinaryOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.consume_exact("*") {
                BinaryOp::Mul
            } else if self.consume_exact("/") {
                BinaryOp::Div
            } else if self.consume_exact("%") {
                BinaryOp::Rem
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.consume_exact("-") {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.consume_exact("+") {
            return self.parse_unary();
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('[') => {
                    self.advance();
                    let offset = self.parse_expr()?;
                    self.expect_char(']')?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        offset: Box::new(offset),
                    };
                }
                Some('(') => {
                    let Expr::Path(callee) = expr else {
                        return Err(self.error("only named operations can be called"));
                    };
                    self.advance();
                    let args = self.parse_args()?;
                    expr = Expr::Call { callee, args };
                }
                Some('.') => {
                    let Expr::Path(mut path) = expr else {
                        return Err(self.error("'.' must follow a name"));
                    };
                    self.advance();
                    let segment = self
                        .parse_identifier()
                        .ok_or_else(|| self.error("expected name after '.'"))?;
                    path.push(segment);
                    expr = Expr::Path(path);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Arg>, ParseError> {
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.advance();
            return Ok(args);
        }
        loop {
            let name = self.try_keyword_name();
            let value = self.parse_expr()?;
            args.push(Arg { name, value });
            self.skip_whitespace();
            match self.advance() {
                Some(',') => continue,
                Some(')') => return Ok(args),
                Some(ch) => return Err(self.error(format!("expected ',' or ')', found '{}'", ch))),
                None => return Err(self.error("expected ')', found end of line")),
            }
        }
    }

    fn try_keyword_name(&mut self) -> Option<String> {
        let start = self.pos;
        if let Some(name) = self.parse_identifier() {
            self.skip_whitespace();
            if self.remaining().starts_with('=') && !self.remaining().starts_with("==") {
                self.advance();
                return Some(name);
            }
        }
        self.pos = start;
        None
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_char(')')?;
                Ok(inner)
            }
            Some(q @ ('"' | '\'')) => self.parse_string(q),
            Some(c) if c.is_ascii_digit() || c == '.' => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                if self.consume_keyword("true") {
                    return Ok(Expr::Bool(true));
                }
                if self.consume_keyword("false") {
                    return Ok(Expr::Bool(false));
                }
                if self.peek_keyword("nan") {
                    self.pos += 3;
                    self.skip_whitespace();
                    // `nan(x)` is the missing-value test
                    if self.peek() == Some('(') {
                        return Ok(Expr::Path(vec!["nan".to_string()]));
                    }
                    return Ok(Expr::Nan);
                }
                let word = self.peek_word();
                if KEYWORDS.contains(&word.as_str()) {
                    return Err(self.error(format!("unexpected keyword '{}'", word)));
                }
                let name = self
                    .parse_identifier()
                    .ok_or_else(|| self.error("expected name"))?;
                Ok(Expr::Path(vec![name]))
            }
            Some(c) => Err(self.error(format!("expected expression, found '{}'", c))),
            None => Err(self.error("expected expression, found end of line")),
        }
    }

    fn parse_number(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mark = self.pos;
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.pos = mark;
            }
        }
        if digits == 0 {
            self.pos = start;
            return Err(self.error("expected number"));
        }
        let num_str = &self.input[start..self.pos];
        num_str
            .parse::<f64>()
            .map(Expr::Number)
            .map_err(|_| error_at(self.line, self.indent + start + 1, format!("invalid number: {}", num_str)))
    }

    fn parse_string(&mut self, quote: char) -> Result<Expr, ParseError> {
        let start = self.pos;
        self.advance();
        let mut out = String::new();
        while let Some(ch) = self.advance() {
            match ch {
                '\\' => match self.advance() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => break,
                },
                c if c == quote => return Ok(Expr::Str(out)),
                c => out.push(c),
            }
        }
        Err(error_at(
            self.line,
            self.indent + start + 1,
            "unterminated string literal",
        ))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
