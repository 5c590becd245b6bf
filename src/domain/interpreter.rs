//! Procedure interpreter.
//!
//! Runs a [`Program`] over a dataset in three phases: bar-invariant setup
//! steps are evaluated once over whole columns, per-bar steps run for every
//! row from first to last, and plots of bar-dependent values are emitted at
//! the end. Orders go through a pyramiding gate before reaching the
//! [`StrategyRuntime`].

use std::collections::{HashMap, HashSet};

use crate::domain::error::PineError;
use crate::domain::indicator::{calculate_macd, MacdOutput};
use crate::domain::ir::{MathFn, Node, Op, Primitive, Program, Step};
use crate::domain::ohlcv::{Dataset, PriceField};
use crate::domain::runtime::{Direction, ExecutionResult, StrategyRuntime};
use crate::domain::value::{self, truthy, Value};
use crate::ports::plot_port::PlotPort;

/// Order defaults a procedure may override with `self.configure(...)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionOptions {
    /// Extra same-direction entries allowed on one id; 0 and 1 both allow one.
    pub pyramiding: u32,
    /// Quantity of an entry that names none.
    pub default_qty: f64,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            pyramiding: 0,
            default_qty: 1.0,
        }
    }
}

impl ExecutionOptions {
    fn entry_limit(&self) -> u32 {
        self.pyramiding.max(1)
    }
}

/// Counts open same-direction entries per id.
#[derive(Debug)]
struct OrderGate {
    options: ExecutionOptions,
    open: HashMap<String, u32>,
}

impl OrderGate {
    fn new(options: ExecutionOptions) -> Self {
        Self {
            options,
            open: HashMap::new(),
        }
    }

    fn admit(&mut self, id: &str, direction: Direction, position: f64) -> bool {
        let adds = match direction {
            Direction::Long => position > 0.0,
            Direction::Short => position < 0.0,
        };
        let count = self.open.entry(id.to_string()).or_insert(0);
        if !adds {
            *count = 1;
            return true;
        }
        if *count >= self.options.entry_limit() {
            return false;
        }
        *count += 1;
        true
    }
}

struct Columns {
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
    index: Vec<f64>,
    time: Vec<f64>,
}

impl Columns {
    fn new(dataset: &Dataset) -> Self {
        Self {
            open: dataset.column(PriceField::Open),
            high: dataset.column(PriceField::High),
            low: dataset.column(PriceField::Low),
            close: dataset.column(PriceField::Close),
            volume: dataset.column(PriceField::Volume),
            index: dataset.bar_index(),
            time: dataset.time(),
        }
    }

    fn price(&self, field: PriceField) -> &[f64] {
        match field {
            PriceField::Open => &self.open,
            PriceField::High => &self.high,
            PriceField::Low => &self.low,
            PriceField::Close => &self.close,
            PriceField::Volume => &self.volume,
        }
    }
}

fn fail(reason: String) -> PineError {
    PineError::eval(None, reason)
}

impl Program {
    /// Run with default order options.
    pub fn run(
        &self,
        dataset: &Dataset,
        plot: &mut dyn PlotPort,
    ) -> Result<ExecutionResult, PineError> {
        self.run_with(dataset, ExecutionOptions::default(), plot)
    }

    pub fn run_with(
        &self,
        dataset: &Dataset,
        options: ExecutionOptions,
        plot: &mut dyn PlotPort,
    ) -> Result<ExecutionResult, PineError> {
        let mut interp = Interpreter::new(dataset, &self.dynamic, options, plot);
        for step in &self.setup {
            interp.run_vectorized(step)?;
        }
        for bar in 0..dataset.len() {
            interp.runtime.set_bar(bar);
            for step in &self.per_bar {
                interp.run_at(step, bar)?;
            }
        }
        for step in &self.deferred {
            interp.run_vectorized(step)?;
        }

        let result = interp.runtime.into_result();
        tracing::info!(
            unit = %self.unit_name,
            bars = dataset.len(),
            orders = result.orders.len(),
            positions = result.positions.len(),
            "run finished"
        );
        Ok(result)
    }
}

struct Interpreter<'a, 'p> {
    columns: Columns,
    len: usize,
    dynamic: &'a HashSet<String>,
    locals: HashMap<String, Value>,
    runtime: StrategyRuntime,
    gate: OrderGate,
    plotter: &'p mut dyn PlotPort,
}

impl<'a, 'p> Interpreter<'a, 'p> {
    fn new(
        dataset: &Dataset,
        dynamic: &'a HashSet<String>,
        options: ExecutionOptions,
        plotter: &'p mut dyn PlotPort,
    ) -> Self {
        Self {
            columns: Columns::new(dataset),
            len: dataset.len(),
            dynamic,
            locals: HashMap::new(),
            runtime: StrategyRuntime::new(),
            gate: OrderGate::new(options),
            plotter,
        }
    }

    fn run_vectorized(&mut self, step: &Step) -> Result<(), PineError> {
        self.exec_vectorized(&step.op)
            .map_err(|e| e.at_line(step.pine_line))
    }

    fn run_at(&mut self, step: &Step, bar: usize) -> Result<(), PineError> {
        self.exec_at(&step.op, bar)
            .map_err(|e| e.at_line(step.pine_line))
    }

    fn run_block(&mut self, steps: &[Step], bar: usize) -> Result<(), PineError> {
        for step in steps {
            self.run_at(step, bar)?;
        }
        Ok(())
    }

    fn exec_vectorized(&mut self, op: &Op) -> Result<(), PineError> {
        match op {
            Op::Assign { name, value } => {
                let value = self.eval(value, None)?;
                self.locals.insert(name.clone(), value);
            }
            Op::AssignMacd {
                names,
                source,
                fast,
                slow,
                signal,
            } => {
                let out = self.macd(source, [fast, slow, signal], None)?;
                for (name, series) in names.iter().zip([out.macd, out.signal, out.histogram]) {
                    self.locals.insert(name.clone(), Value::Series(series));
                }
            }
            Op::Configure {
                pyramiding,
                default_qty,
            } => self.configure(pyramiding.as_ref(), default_qty.as_ref(), None)?,
            Op::Plot { series, title } => self.plot(series, title.as_ref())?,
            Op::Eval(node) => {
                self.eval(node, None)?;
            }
            Op::Conditional { .. } | Op::Entry { .. } | Op::Exit { .. } | Op::Close { .. } => {
                return Err(fail(
                    "orders and conditionals can only run bar by bar".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn exec_at(&mut self, op: &Op, bar: usize) -> Result<(), PineError> {
        match op {
            Op::Assign { name, value } => {
                let value = self.eval(value, Some(bar))?;
                self.store(name, bar, value)?;
            }
            Op::AssignMacd {
                names,
                source,
                fast,
                slow,
                signal,
            } => {
                let out = self.macd(source, [fast, slow, signal], Some(bar))?;
                for (name, series) in names.iter().zip([out.macd, out.signal, out.histogram]) {
                    let x = series.get(bar).copied().unwrap_or(f64::NAN);
                    self.store(name, bar, Value::Num(x))?;
                }
            }
            Op::Conditional {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    if self.eval(&branch.cond, Some(bar))?.as_bool().map_err(fail)? {
                        return self.run_block(&branch.body, bar);
                    }
                }
                self.run_block(otherwise, bar)?;
            }
            Op::Entry {
                id,
                direction,
                qty,
                price,
            } => self.entry(id, direction, qty.as_ref(), price.as_ref(), bar)?,
            Op::Exit {
                id,
                from_entry,
                qty,
                price,
            } => {
                let id = self.label(id, bar)?;
                let from_entry = from_entry
                    .as_ref()
                    .map(|n| self.label(n, bar))
                    .transpose()?;
                let qty = qty.as_ref().map(|n| self.number(n, bar)).transpose()?;
                let price = self.price(price.as_ref(), bar)?;
                tracing::debug!(bar, id = %id, ?from_entry, ?qty, "exit");
                self.runtime.exit(&id, from_entry.as_deref(), qty, price);
            }
            Op::Close { id } => {
                let id = self.label(id, bar)?;
                tracing::debug!(bar, id = %id, "close");
                self.runtime.close(&id);
            }
            Op::Configure {
                pyramiding,
                default_qty,
            } => self.configure(pyramiding.as_ref(), default_qty.as_ref(), Some(bar))?,
            Op::Plot { .. } => {
                return Err(fail(
                    "plot can only be used at the top level of a unit".to_string(),
                ));
            }
            Op::Eval(node) => {
                self.eval(node, Some(bar))?;
            }
        }
        Ok(())
    }

    /// Write one bar of a bar-dependent binding.
    fn store(&mut self, name: &str, bar: usize, value: Value) -> Result<(), PineError> {
        let len = self.len;
        match (self.locals.get_mut(name), value) {
            (Some(Value::Series(col)), Value::Num(x)) => col[bar] = x,
            (Some(Value::Mask(col)), Value::Bool(b)) => col[bar] = b,
            (_, Value::Str(s)) => {
                self.locals.insert(name.to_string(), Value::Str(s));
            }
            (None, Value::Num(x)) => {
                let mut col = vec![f64::NAN; len];
                col[bar] = x;
                self.locals.insert(name.to_string(), Value::Series(col));
            }
            (None, Value::Bool(b)) => {
                let mut col = vec![false; len];
                col[bar] = b;
                self.locals.insert(name.to_string(), Value::Mask(col));
            }
            (None, column @ (Value::Series(_) | Value::Mask(_))) => {
                return Err(fail(format!(
                    "'{}' cannot take a {} on a single bar",
                    name,
                    column.type_name()
                )));
            }
            (Some(existing), value) => {
                return Err(fail(format!(
                    "'{}' holds a {} and cannot take a {}",
                    name,
                    existing.type_name(),
                    value.type_name()
                )));
            }
        }
        Ok(())
    }

    fn entry(
        &mut self,
        id: &Node,
        direction: &Node,
        qty: Option<&Node>,
        price: Option<&Node>,
        bar: usize,
    ) -> Result<(), PineError> {
        let id = self.label(id, bar)?;
        let direction = match self.eval(direction, Some(bar))? {
            Value::Str(token) => Direction::from_token(&token)
                .ok_or_else(|| fail(format!("invalid order direction '{}'", token)))?,
            other => return Err(fail(format!("invalid order direction {}", other))),
        };
        let qty = match qty {
            Some(node) => self.number(node, bar)?,
            None => self.gate.options.default_qty,
        };
        let price = self.price(price, bar)?;

        if !self.gate.admit(&id, direction, self.runtime.position(&id)) {
            tracing::trace!(bar, id = %id, %direction, "entry over pyramiding limit skipped");
            return Ok(());
        }
        tracing::debug!(bar, id = %id, %direction, qty, "entry");
        self.runtime.entry(&id, direction, qty, price);
        Ok(())
    }

    fn configure(
        &mut self,
        pyramiding: Option<&Node>,
        default_qty: Option<&Node>,
        at: Option<usize>,
    ) -> Result<(), PineError> {
        if let Some(node) = pyramiding {
            let n = self.eval(node, at)?.as_f64().map_err(fail)?;
            if !(n.is_finite() && n >= 0.0) {
                return Err(fail(format!("pyramiding must be a non-negative number, got {}", n)));
            }
            self.gate.options.pyramiding = n as u32;
        }
        if let Some(node) = default_qty {
            let q = self.eval(node, at)?.as_f64().map_err(fail)?;
            if !(q.is_finite() && q > 0.0) {
                return Err(fail(format!("default_qty must be a positive number, got {}", q)));
            }
            self.gate.options.default_qty = q;
        }
        tracing::debug!(
            pyramiding = self.gate.options.pyramiding,
            default_qty = self.gate.options.default_qty,
            "order options configured"
        );
        Ok(())
    }

    fn plot(&mut self, series: &Node, title: Option<&Node>) -> Result<(), PineError> {
        let values = self.eval(series, None)?.to_series(self.len).map_err(fail)?;
        let label = title
            .map(|t| self.eval(t, None).and_then(|v| v.to_label().map_err(fail)))
            .transpose()?;
        if let Err(err) = self.plotter.plot(&values, label.as_deref()) {
            tracing::warn!(error = %err, label = label.as_deref().unwrap_or(""), "plot failed");
        }
        Ok(())
    }

    fn macd(
        &self,
        source: &Node,
        [fast, slow, signal]: [&Node; 3],
        at: Option<usize>,
    ) -> Result<MacdOutput, PineError> {
        let src = self.eval(source, None)?.to_series(self.len).map_err(fail)?;
        Ok(calculate_macd(
            &src,
            self.period(fast, at)?,
            self.period(slow, at)?,
            self.period(signal, at)?,
        )?)
    }

    fn label(&self, node: &Node, bar: usize) -> Result<String, PineError> {
        self.eval(node, Some(bar))?.to_label().map_err(fail)
    }

    fn number(&self, node: &Node, bar: usize) -> Result<f64, PineError> {
        self.eval(node, Some(bar))?.as_f64().map_err(fail)
    }

    /// Order price; a missing value means no price.
    fn price(&self, node: Option<&Node>, bar: usize) -> Result<Option<f64>, PineError> {
        match node {
            Some(node) => Ok(Some(self.number(node, bar)?).filter(|p| !p.is_nan())),
            None => Ok(None),
        }
    }

    fn period(&self, node: &Node, at: Option<usize>) -> Result<i64, PineError> {
        let n = self.eval(node, at)?.as_f64().map_err(fail)?;
        Ok(n.trunc() as i64)
    }

    fn offset(&self, node: &Node, at: Option<usize>) -> Result<usize, PineError> {
        let k = self.eval(node, at)?.as_f64().map_err(fail)?;
        if !(k.is_finite() && k >= 0.0) {
            return Err(fail(format!("history offset must be a non-negative number, got {}", k)));
        }
        Ok(k as usize)
    }

    fn local(&self, name: &str, at: Option<usize>) -> Result<Value, PineError> {
        match (self.locals.get(name), at) {
            (Some(value), Some(i)) => Ok(value.at(i)),
            (Some(value), None) => Ok(value.clone()),
            (None, Some(_)) if self.dynamic.contains(name) => Ok(Value::na()),
            (None, None) if self.dynamic.contains(name) => {
                Ok(Value::Series(vec![f64::NAN; self.len]))
            }
            (None, _) => Err(fail(format!("'{}' is not defined", name))),
        }
    }

    fn eval_all(&self, nodes: &[Node], at: Option<usize>) -> Result<Vec<Value>, PineError> {
        nodes.iter().map(|n| self.eval(n, at)).collect()
    }

    /// Evaluate over whole columns (`at == None`) or at one bar.
    fn eval(&self, node: &Node, at: Option<usize>) -> Result<Value, PineError> {
        match node {
            Node::Literal(v) => Ok(v.clone()),
            Node::Local(name) => self.local(name, at),
            Node::Column(field) => Ok(column(self.columns.price(*field), at)),
            Node::BarIndex => Ok(column(&self.columns.index, at)),
            Node::Time => Ok(column(&self.columns.time, at)),
            Node::PositionSize => Ok(Value::Num(self.runtime.position_size())),
            Node::Lag { value, offset } => {
                let k = self.offset(offset, at)?;
                match at {
                    None => Ok(self.eval(value, None)?.shift(k)),
                    Some(i) if k <= i => self.eval(value, Some(i - k)),
                    Some(_) => Ok(missing_like(&self.eval(value, Some(0))?)),
                }
            }
            Node::Neg(inner) => value::negate(&self.eval(inner, at)?).map_err(fail),
            Node::Not(inner) => value::not(&self.eval(inner, at)?).map_err(fail),
            Node::Binary { op, left, right } => {
                let (l, r) = (self.eval(left, at)?, self.eval(right, at)?);
                value::binary(*op, &l, &r).map_err(fail)
            }
            Node::Select {
                cond,
                then,
                otherwise,
            } => {
                let c = self.eval(cond, at)?;
                value::select(&c, &self.eval(then, at)?, &self.eval(otherwise, at)?)
                    .map_err(fail)
            }
            Node::Math { func, args } => math(*func, &self.eval_all(args, at)?).map_err(fail),
            Node::Fill(inner) => {
                let v = self.eval(inner, at)?;
                match at {
                    Some(_) => Ok(v),
                    None => fill(v, self.len).map_err(fail),
                }
            }
            Node::Prim { prim, args } => {
                primitive(*prim, &self.eval_all(args, at)?).map_err(fail)
            }
            Node::Indicator {
                indicator,
                source,
                period,
            } => {
                let src = self.eval(source, None)?.to_series(self.len).map_err(fail)?;
                let out = indicator.compute(&src, self.period(period, at)?)?;
                Ok(pick(Value::Series(out), at))
            }
        }
    }
}

fn column(values: &[f64], at: Option<usize>) -> Value {
    match at {
        Some(i) => Value::Num(values.get(i).copied().unwrap_or(f64::NAN)),
        None => Value::Series(values.to_vec()),
    }
}

fn pick(value: Value, at: Option<usize>) -> Value {
    match at {
        Some(i) => value.at(i),
        None => value,
    }
}

fn missing_like(value: &Value) -> Value {
    match value {
        Value::Bool(_) | Value::Mask(_) => Value::Bool(false),
        _ => Value::na(),
    }
}

fn fill(value: Value, len: usize) -> Result<Value, String> {
    match value {
        Value::Num(x) => Ok(Value::Series(vec![x; len])),
        Value::Bool(b) => Ok(Value::Mask(vec![b; len])),
        Value::Str(_) => Err("series.fill needs a number or bool".to_string()),
        column => Ok(column),
    }
}

fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

fn math(func: MathFn, args: &[Value]) -> Result<Value, String> {
    match func {
        MathFn::Sqrt => value::map_num(&args[0], f64::sqrt),
        MathFn::Floor => value::map_num(&args[0], f64::floor),
        MathFn::Ceil => value::map_num(&args[0], f64::ceil),
        MathFn::Abs => value::map_num(&args[0], f64::abs),
        MathFn::Log => value::map_num(&args[0], f64::ln),
        MathFn::Exp => value::map_num(&args[0], f64::exp),
        MathFn::Pow => value::zip_with(&args[0], &args[1], f64::powf),
        MathFn::Max => fold(args, nan_max),
        MathFn::Min => fold(args, nan_min),
    }
}

fn fold(args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value, String> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| "expected at least one argument".to_string())?;
    rest.iter()
        .try_fold(first.clone(), |acc, v| value::zip_with(&acc, v, f))
}

fn as_numeric(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(_) => Ok(Value::Num(value.as_f64()?)),
        Value::Mask(m) => Ok(Value::Series(value.to_series(m.len())?)),
        other => value::map_num(other, |x| x),
    }
}

fn primitive(prim: Primitive, args: &[Value]) -> Result<Value, String> {
    let x = &args[0];
    match prim {
        Primitive::Int => value::map_num(&as_numeric(x)?, f64::trunc),
        Primitive::Float => as_numeric(x),
        Primitive::Bool => match x {
            Value::Num(v) => Ok(Value::Bool(truthy(*v))),
            Value::Series(v) => Ok(Value::Mask(v.iter().map(|v| truthy(*v)).collect())),
            Value::Bool(_) | Value::Mask(_) => Ok(x.clone()),
            Value::Str(_) => Err("cannot convert a string to bool".to_string()),
        },
        Primitive::Str => x.to_label().map(Value::Str),
        Primitive::Len => match x {
            Value::Series(v) => Ok(Value::Num(v.len() as f64)),
            Value::Mask(m) => Ok(Value::Num(m.len() as f64)),
            Value::Str(s) => Ok(Value::Num(s.chars().count() as f64)),
            other => Err(format!("len() is undefined for a {}", other.type_name())),
        },
        Primitive::IsNa => match x {
            Value::Num(v) => Ok(Value::Bool(v.is_nan())),
            Value::Series(v) => Ok(Value::Mask(v.iter().map(|v| v.is_nan()).collect())),
            Value::Mask(m) => Ok(Value::Mask(vec![false; m.len()])),
            Value::Bool(_) | Value::Str(_) => Ok(Value::Bool(false)),
        },
        Primitive::Nz => {
            let replacement = match args.get(1) {
                Some(v) => v.as_f64()?,
                None => 0.0,
            };
            value::map_num(x, |v| if v.is_nan() { replacement } else { v })
        }
    }
}
