//! Execution harness.
//!
//! Loads generated procedure text into a [`Program`]. Nothing in the text is
//! ever run as host code: imports are checked against a fixed set of roots,
//! the runnable unit is located by name, and every call path is resolved to
//! one of the typed operations in [`crate::domain::ir`]. Anything else is
//! refused with [`PineError::NotPermitted`].

use crate::domain::codegen::{GeneratedProcedure, DATASET_PARAM, DEFAULT_UNIT_NAME};
use crate::domain::error::PineError;
use crate::domain::indicator::macd::{DEFAULT_FAST, DEFAULT_SIGNAL, DEFAULT_SLOW};
use crate::domain::indicator::{Indicator, DEFAULT_PERIOD};
use crate::domain::ir::{Branch, MathFn, Node, Op, Primitive, Program, Step};
use crate::domain::ohlcv::PriceField;
use crate::domain::procedure::{
    parse_body, parse_procedure, Arg, BodyLine, Expr, Import, Stmt, StmtKind, UnaryOp,
};
use crate::domain::value::Value;

/// Roots a procedure may import from.
pub const PERMITTED_IMPORTS: &[&str] = &["series", "frame", "ta", "pinetrader"];

#[derive(Debug, Clone)]
pub struct Harness {
    unit_name: String,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_NAME)
    }
}

impl Harness {
    pub fn new(unit_name: impl Into<String>) -> Self {
        Self {
            unit_name: unit_name.into(),
        }
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// Parse, gate and lower procedure text.
    pub fn load(&self, text: &str) -> Result<Program, PineError> {
        let ast = parse_procedure(text)?;
        check_imports(&ast.imports)?;
        let unit = ast
            .units
            .iter()
            .find(|u| u.name == self.unit_name)
            .ok_or_else(|| PineError::MissingUnit {
                name: self.unit_name.clone(),
            })?;
        let steps = Lowering::new(&unit.param).block(&unit.body, false)?;
        tracing::debug!(unit = %unit.name, steps = steps.len(), "loaded procedure text");
        Ok(Program::plan(&unit.name, steps))
    }

    /// Lower a generated procedure directly from its handle.
    pub fn load_procedure(&self, procedure: &GeneratedProcedure) -> Result<Program, PineError> {
        let lines: Vec<BodyLine<'_>> = procedure
            .statements
            .iter()
            .enumerate()
            .map(|(idx, stmt)| BodyLine::new(idx + 1, &stmt.target_text, stmt.source_line))
            .filter(|line| !line.text.is_empty())
            .collect();
        let body = parse_body(&lines)?;
        let steps = Lowering::new(DATASET_PARAM).block(&body, false)?;
        tracing::debug!(unit = %procedure.unit_name, steps = steps.len(), "loaded procedure handle");
        Ok(Program::plan(&procedure.unit_name, steps))
    }
}

fn check_imports(imports: &[Import]) -> Result<(), PineError> {
    for import in imports {
        let root = import.path.first().map(String::as_str).unwrap_or_default();
        if !PERMITTED_IMPORTS.contains(&root) {
            tracing::warn!(import = %import.path.join("::"), line = import.line, "import refused");
            return Err(PineError::NotPermitted {
                capability: format!("import of '{}'", import.path.join("::")),
            });
        }
    }
    Ok(())
}

fn not_permitted(what: impl Into<String>) -> PineError {
    PineError::NotPermitted {
        capability: what.into(),
    }
}

fn invalid(reason: impl Into<String>) -> PineError {
    PineError::eval(None, reason)
}

/// Arguments of one call, split into positional and keyword form.
struct CallArgs<'e> {
    callee: String,
    positional: Vec<&'e Expr>,
    named: Vec<(&'e str, &'e Expr)>,
}

impl<'e> CallArgs<'e> {
    fn new(callee: &[String], args: &'e [Arg]) -> Result<Self, PineError> {
        let mut positional = Vec::new();
        let mut named = Vec::new();
        for arg in args {
            match &arg.name {
                Some(name) => named.push((name.as_str(), &arg.value)),
                None if !named.is_empty() => {
                    return Err(invalid(format!(
                        "{}: positional argument after keyword argument",
                        callee.join(".")
                    )));
                }
                None => positional.push(&arg.value),
            }
        }
        Ok(Self {
            callee: callee.join("."),
            positional,
            named,
        })
    }

    /// Argument by keyword (any of `names`) or by position.
    fn get(&self, index: Option<usize>, names: &[&str]) -> Option<&'e Expr> {
        self.named
            .iter()
            .find(|(n, _)| names.contains(n))
            .map(|(_, e)| *e)
            .or_else(|| index.and_then(|i| self.positional.get(i).copied()))
    }

    fn require(&self, index: usize, names: &[&str]) -> Result<&'e Expr, PineError> {
        self.get(Some(index), names).ok_or_else(|| {
            invalid(format!("{} requires argument '{}'", self.callee, names[0]))
        })
    }

    fn check_arity(&self, (min, max): (usize, usize)) -> Result<(), PineError> {
        let count = self.positional.len() + self.named.len();
        if count < min || count > max {
            let expected = if min == max {
                min.to_string()
            } else if max == usize::MAX {
                format!("at least {}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(invalid(format!(
                "{} takes {} arguments, got {}",
                self.callee, expected, count
            )));
        }
        Ok(())
    }
}

/// Lowers syntax into typed steps for one unit.
struct Lowering<'a> {
    dataset: &'a str,
}

impl<'a> Lowering<'a> {
    fn new(dataset: &'a str) -> Self {
        Self { dataset }
    }

    fn block(&self, stmts: &[Stmt], nested: bool) -> Result<Vec<Step>, PineError> {
        let mut steps = Vec::new();
        let mut iter = stmts.iter().peekable();
        while let Some(stmt) = iter.next() {
            let line = stmt.pine_line;
            let op = match &stmt.kind {
                StmtKind::Pass => continue,
                StmtKind::If(cond) => {
                    let mut branches = vec![self.branch(cond, &stmt.block, line)?];
                    let mut otherwise = Vec::new();
                    while let Some(&next) = iter.peek() {
                        match &next.kind {
                            StmtKind::ElseIf(cond) => {
                                branches.push(self.branch(cond, &next.block, next.pine_line)?);
                                iter.next();
                            }
                            StmtKind::Else => {
                                otherwise = self.block(&next.block, true)?;
                                iter.next();
                                break;
                            }
                            _ => break,
                        }
                    }
                    Op::Conditional {
                        branches,
                        otherwise,
                    }
                }
                StmtKind::ElseIf(_) | StmtKind::Else => {
                    return Err(PineError::eval(line, "'else' without a preceding 'if'"));
                }
                StmtKind::Assign { targets, value, .. } => {
                    self.assign(targets, value).map_err(|e| e.at_line(line))?
                }
                StmtKind::Expr(expr) => {
                    let op = self.statement(expr).map_err(|e| e.at_line(line))?;
                    if nested && matches!(op, Op::Plot { .. }) {
                        return Err(PineError::eval(
                            line,
                            "plot can only be used at the top level of a unit",
                        ));
                    }
                    op
                }
            };
            steps.push(Step::new(op, line));
        }
        Ok(steps)
    }

    fn branch(&self, cond: &Expr, body: &[Stmt], line: Option<usize>) -> Result<Branch, PineError> {
        Ok(Branch {
            cond: self.expr(cond).map_err(|e| e.at_line(line))?,
            body: self.block(body, true)?,
        })
    }

    fn assign(&self, targets: &[String], value: &Expr) -> Result<Op, PineError> {
        if let Some(target) = targets.iter().find(|t| *t == self.dataset) {
            return Err(invalid(format!("cannot assign to dataset '{}'", target)));
        }
        match (targets, value) {
            ([a, b, c], Expr::Call { callee, args }) if is_path(callee, &["ta", "macd"]) => {
                let call = CallArgs::new(callee, args)?;
                call.check_arity((1, 4))?;
                let period = |index: usize, names: &[&str], default: i64| match call
                    .get(Some(index), names)
                {
                    Some(expr) => self.expr(expr),
                    None => Ok(Node::Literal(Value::Num(default as f64))),
                };
                Ok(Op::AssignMacd {
                    names: [a.clone(), b.clone(), c.clone()],
                    source: self.expr(call.require(0, &["source"])?)?,
                    fast: period(1, &["fastlen", "fast"], DEFAULT_FAST)?,
                    slow: period(2, &["slowlen", "slow"], DEFAULT_SLOW)?,
                    signal: period(3, &["siglen", "signal"], DEFAULT_SIGNAL)?,
                })
            }
            ([name], _) => Ok(Op::Assign {
                name: name.clone(),
                value: self.expr(value)?,
            }),
            _ => Err(invalid(format!(
                "cannot unpack into {} names; only ta.macd yields several values",
                targets.len()
            ))),
        }
    }

    /// Order, configuration and plot calls; any other expression is evaluated
    /// for its errors only.
    fn statement(&self, expr: &Expr) -> Result<Op, PineError> {
        let Expr::Call { callee, args } = expr else {
            return Ok(Op::Eval(self.expr(expr)?));
        };
        let segments: Vec<&str> = callee.iter().map(String::as_str).collect();
        let call = CallArgs::new(callee, args)?;
        let optional = |index: Option<usize>, names: &[&str]| -> Result<Option<Node>, PineError> {
            call.get(index, names).map(|e| self.expr(e)).transpose()
        };
        let op = match segments.as_slice() {
            ["self", "entry"] => Op::Entry {
                id: self.expr(call.require(0, &["id"])?)?,
                direction: self.expr(call.require(1, &["direction"])?)?,
                qty: optional(Some(2), &["qty"])?,
                price: optional(Some(3), &["limit", "price"])?,
            },
            ["self", "exit"] => Op::Exit {
                id: self.expr(call.require(0, &["id"])?)?,
                from_entry: optional(Some(1), &["from_entry"])?,
                qty: optional(Some(2), &["qty"])?,
                price: optional(None, &["limit", "price"])?,
            },
            ["self", "close"] => Op::Close {
                id: self.expr(call.require(0, &["id"])?)?,
            },
            ["self", "configure"] => Op::Configure {
                pyramiding: optional(None, &["pyramiding"])?,
                default_qty: optional(None, &["default_qty"])?,
            },
            ["plot"] => Op::Plot {
                series: self.expr(call.require(0, &["series"])?)?,
                title: optional(Some(1), &["title"])?,
            },
            _ => Op::Eval(self.expr(expr)?),
        };
        Ok(op)
    }

    fn expr(&self, expr: &Expr) -> Result<Node, PineError> {
        Ok(match expr {
            Expr::Number(x) => Node::Literal(Value::Num(*x)),
            Expr::Str(s) => Node::Literal(Value::Str(s.clone())),
            Expr::Bool(b) => Node::Literal(Value::Bool(*b)),
            Expr::Nan => Node::Literal(Value::na()),
            Expr::Path(path) => self.path(path)?,
            Expr::Call { callee, args } => self.call(callee, args)?,
            Expr::Index { target, offset } => Node::Lag {
                value: Box::new(self.expr(target)?),
                offset: Box::new(self.expr(offset)?),
            },
            Expr::Unary { op, operand } => {
                let inner = Box::new(self.expr(operand)?);
                match op {
                    UnaryOp::Neg => Node::Neg(inner),
                    UnaryOp::Not => Node::Not(inner),
                }
            }
            Expr::Binary { op, left, right } => {
                Node::binary(*op, self.expr(left)?, self.expr(right)?)
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => Node::Select {
                cond: Box::new(self.expr(cond)?),
                then: Box::new(self.expr(then)?),
                otherwise: Box::new(self.expr(otherwise)?),
            },
        })
    }

    fn path(&self, path: &[String]) -> Result<Node, PineError> {
        match path {
            [name] if name == self.dataset => Err(invalid(format!(
                "dataset '{}' can only be read through its columns",
                name
            ))),
            [name] if name == "self" => Err(not_permitted("access to 'self'")),
            [name] => Ok(Node::Local(name.clone())),
            [root, field] if root == self.dataset => match field.as_str() {
                "index" => Ok(Node::BarIndex),
                "time" => Ok(Node::Time),
                other => PriceField::from_name(other)
                    .map(Node::Column)
                    .ok_or_else(|| not_permitted(format!("column '{}.{}'", root, other))),
            },
            _ => Err(not_permitted(format!("attribute '{}'", path.join(".")))),
        }
    }

    fn args(&self, call: &CallArgs<'_>) -> Result<Vec<Node>, PineError> {
        call.positional
            .iter()
            .copied()
            .chain(call.named.iter().map(|(_, e)| *e))
            .map(|e| self.expr(e))
            .collect()
    }

    fn call(&self, callee: &[String], args: &[Arg]) -> Result<Node, PineError> {
        let segments: Vec<&str> = callee.iter().map(String::as_str).collect();
        let call = CallArgs::new(callee, args)?;
        match segments.as_slice() {
            ["self", "position_size"] => {
                call.check_arity((0, 0))?;
                Ok(Node::PositionSize)
            }
            ["self", "entry" | "exit" | "close" | "configure"] | ["plot"] => Err(invalid(format!(
                "{} is a statement and has no value",
                call.callee
            ))),
            ["series", "fill"] => {
                call.check_arity((1, 1))?;
                Ok(Node::Fill(Box::new(self.expr(call.require(0, &["value"])?)?)))
            }
            ["series", name] => {
                let func = MathFn::from_name(name)
                    .ok_or_else(|| not_permitted(format!("call to '{}'", call.callee)))?;
                call.check_arity(func.arity())?;
                Ok(Node::Math {
                    func,
                    args: self.args(&call)?,
                })
            }
            ["ta", "crossover" | "crossunder"] => {
                call.check_arity((2, 2))?;
                let a = self.expr(call.require(0, &["source1"])?)?;
                let b = self.expr(call.require(1, &["source2"])?)?;
                Ok(if segments[1] == "crossover" {
                    Node::crossover(a, b)
                } else {
                    Node::crossunder(a, b)
                })
            }
            ["ta", "macd"] => Err(invalid(
                "ta.macd yields three series and must be assigned to three names",
            )),
            ["ta", name] => {
                let indicator = Indicator::from_name(name)
                    .ok_or_else(|| not_permitted(format!("call to '{}'", call.callee)))?;
                call.check_arity((1, 2))?;
                let period = match call.get(Some(1), &["length"]) {
                    Some(expr) => self.expr(expr)?,
                    None => Node::Literal(Value::Num(DEFAULT_PERIOD as f64)),
                };
                Ok(Node::Indicator {
                    indicator,
                    source: Box::new(self.expr(call.require(0, &["source"])?)?),
                    period: Box::new(period),
                })
            }
            [name @ ("min" | "max")] => {
                let func = MathFn::from_name(name)
                    .ok_or_else(|| not_permitted(format!("call to '{}'", call.callee)))?;
                call.check_arity(func.arity())?;
                Ok(Node::Math {
                    func,
                    args: self.args(&call)?,
                })
            }
            [name] => {
                let prim = Primitive::from_name(name)
                    .ok_or_else(|| not_permitted(format!("call to '{}'", call.callee)))?;
                call.check_arity(prim.arity())?;
                Ok(Node::Prim {
                    prim,
                    args: self.args(&call)?,
                })
            }
            _ => Err(not_permitted(format!("call to '{}'", call.callee))),
        }
    }
}

fn is_path(callee: &[String], expected: &[&str]) -> bool {
    callee.len() == expected.len() && callee.iter().zip(expected).all(|(a, b)| a == b)
}
