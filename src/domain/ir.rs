//! Typed operation set executed by the interpreter.
//!
//! A loaded procedure is lowered to [`Step`]s whose expressions are [`Node`]s.
//! Only the operations named here exist; anything a procedure asks for beyond
//! them is refused while lowering.

use std::collections::HashSet;

use crate::domain::indicator::Indicator;
use crate::domain::ohlcv::PriceField;
use crate::domain::procedure::BinaryOp;
use crate::domain::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Sqrt,
    Pow,
    Floor,
    Ceil,
    Abs,
    Log,
    Exp,
    Max,
    Min,
}

impl MathFn {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sqrt" => Some(MathFn::Sqrt),
            "pow" => Some(MathFn::Pow),
            "floor" => Some(MathFn::Floor),
            "ceil" => Some(MathFn::Ceil),
            "abs" => Some(MathFn::Abs),
            "log" => Some(MathFn::Log),
            "exp" => Some(MathFn::Exp),
            "max" => Some(MathFn::Max),
            "min" => Some(MathFn::Min),
            _ => None,
        }
    }

    /// Accepted argument counts as `(min, max)`.
    pub fn arity(self) -> (usize, usize) {
        match self {
            MathFn::Pow => (2, 2),
            MathFn::Max | MathFn::Min => (2, usize::MAX),
            _ => (1, 1),
        }
    }
}

/// Conversion and inspection primitives callable without a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Int,
    Float,
    Bool,
    Str,
    Len,
    IsNa,
    Nz,
}

impl Primitive {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Primitive::Int),
            "float" => Some(Primitive::Float),
            "bool" => Some(Primitive::Bool),
            "str" => Some(Primitive::Str),
            "len" => Some(Primitive::Len),
            "nan" => Some(Primitive::IsNa),
            "nz" => Some(Primitive::Nz),
            _ => None,
        }
    }

    pub fn arity(self) -> (usize, usize) {
        match self {
            Primitive::Nz => (1, 2),
            _ => (1, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(Value),
    Local(String),
    Column(PriceField),
    BarIndex,
    Time,
    PositionSize,
    Lag {
        value: Box<Node>,
        offset: Box<Node>,
    },
    Neg(Box<Node>),
    Not(Box<Node>),
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Select {
        cond: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },
    Math {
        func: MathFn,
        args: Vec<Node>,
    },
    Fill(Box<Node>),
    Prim {
        prim: Primitive,
        args: Vec<Node>,
    },
    Indicator {
        indicator: Indicator,
        source: Box<Node>,
        period: Box<Node>,
    },
}

impl Node {
    pub fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
        Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn lag(value: Node, bars: f64) -> Node {
        Node::Lag {
            value: Box::new(value),
            offset: Box::new(Node::Literal(Value::Num(bars))),
        }
    }

    /// `a` crosses over `b`: below on the previous bar, at or above now.
    pub fn crossover(a: Node, b: Node) -> Node {
        let before = Node::binary(
            BinaryOp::Lt,
            Node::lag(a.clone(), 1.0),
            Node::lag(b.clone(), 1.0),
        );
        Node::binary(BinaryOp::And, before, Node::binary(BinaryOp::Ge, a, b))
    }

    pub fn crossunder(a: Node, b: Node) -> Node {
        let before = Node::binary(
            BinaryOp::Gt,
            Node::lag(a.clone(), 1.0),
            Node::lag(b.clone(), 1.0),
        );
        Node::binary(BinaryOp::And, before, Node::binary(BinaryOp::Le, a, b))
    }

    fn children(&self) -> Vec<&Node> {
        match self {
            Node::Literal(_)
            | Node::Local(_)
            | Node::Column(_)
            | Node::BarIndex
            | Node::Time
            | Node::PositionSize => Vec::new(),
            Node::Lag { value, offset } => vec![value.as_ref(), offset.as_ref()],
            Node::Neg(inner) | Node::Not(inner) | Node::Fill(inner) => vec![inner.as_ref()],
            Node::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Node::Select {
                cond,
                then,
                otherwise,
            } => vec![cond.as_ref(), then.as_ref(), otherwise.as_ref()],
            Node::Math { args, .. } | Node::Prim { args, .. } => args.iter().collect(),
            Node::Indicator { source, period, .. } => vec![source.as_ref(), period.as_ref()],
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        match self {
            Node::Literal(_)
            | Node::Local(_)
            | Node::Column(_)
            | Node::BarIndex
            | Node::Time
            | Node::PositionSize => Vec::new(),
            Node::Lag { value, offset } => vec![value.as_mut(), offset.as_mut()],
            Node::Neg(inner) | Node::Not(inner) | Node::Fill(inner) => vec![inner.as_mut()],
            Node::Binary { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Node::Select {
                cond,
                then,
                otherwise,
            } => vec![cond.as_mut(), then.as_mut(), otherwise.as_mut()],
            Node::Math { args, .. } | Node::Prim { args, .. } => args.iter_mut().collect(),
            Node::Indicator { source, period, .. } => vec![source.as_mut(), period.as_mut()],
        }
    }

    /// Whether the value can change while bars are being processed.
    pub fn is_dynamic(&self, dynamic: &HashSet<String>) -> bool {
        match self {
            Node::PositionSize => true,
            Node::Local(name) => dynamic.contains(name),
            other => other.children().into_iter().any(|c| c.is_dynamic(dynamic)),
        }
    }

    /// Replace every indicator call over bar-invariant inputs with a local
    /// bound by `hoist`, innermost first.
    pub fn hoist_indicators(
        &mut self,
        dynamic: &HashSet<String>,
        hoist: &mut dyn FnMut(Node) -> String,
    ) {
        for child in self.children_mut() {
            child.hoist_indicators(dynamic, hoist);
        }
        if matches!(self, Node::Indicator { .. }) && !self.is_dynamic(dynamic) {
            let call = std::mem::replace(self, Node::Literal(Value::na()));
            *self = Node::Local(hoist(call));
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub cond: Node,
    pub body: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Assign {
        name: String,
        value: Node,
    },
    AssignMacd {
        names: [String; 3],
        source: Node,
        fast: Node,
        slow: Node,
        signal: Node,
    },
    Conditional {
        branches: Vec<Branch>,
        otherwise: Vec<Step>,
    },
    Entry {
        id: Node,
        direction: Node,
        qty: Option<Node>,
        price: Option<Node>,
    },
    Exit {
        id: Node,
        from_entry: Option<Node>,
        qty: Option<Node>,
        price: Option<Node>,
    },
    Close {
        id: Node,
    },
    Configure {
        pyramiding: Option<Node>,
        default_qty: Option<Node>,
    },
    Plot {
        series: Node,
        title: Option<Node>,
    },
    Eval(Node),
}

impl Op {
    /// Names this operation binds.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Op::Assign { name, .. } => vec![name.as_str()],
            Op::AssignMacd { names, .. } => names.iter().map(|n| n.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn nodes(&self) -> Vec<&Node> {
        match self {
            Op::Assign { value, .. } => vec![value],
            Op::AssignMacd {
                source,
                fast,
                slow,
                signal,
                ..
            } => vec![source, fast, slow, signal],
            Op::Conditional { branches, .. } => branches.iter().map(|b| &b.cond).collect(),
            Op::Entry {
                id,
                direction,
                qty,
                price,
            } => [Some(id), Some(direction), qty.as_ref(), price.as_ref()]
                .into_iter()
                .flatten()
                .collect(),
            Op::Exit {
                id,
                from_entry,
                qty,
                price,
            } => [Some(id), from_entry.as_ref(), qty.as_ref(), price.as_ref()]
                .into_iter()
                .flatten()
                .collect(),
            Op::Close { id } => vec![id],
            Op::Configure {
                pyramiding,
                default_qty,
            } => [pyramiding.as_ref(), default_qty.as_ref()]
                .into_iter()
                .flatten()
                .collect(),
            Op::Plot { series, title } => [Some(series), title.as_ref()]
                .into_iter()
                .flatten()
                .collect(),
            Op::Eval(node) => vec![node],
        }
    }

    pub fn nodes_mut(&mut self) -> Vec<&mut Node> {
        match self {
            Op::Assign { value, .. } => vec![value],
            Op::AssignMacd {
                source,
                fast,
                slow,
                signal,
                ..
            } => vec![source, fast, slow, signal],
            Op::Conditional { branches, .. } => branches.iter_mut().map(|b| &mut b.cond).collect(),
            Op::Entry {
                id,
                direction,
                qty,
                price,
            } => [Some(id), Some(direction), qty.as_mut(), price.as_mut()]
                .into_iter()
                .flatten()
                .collect(),
            Op::Exit {
                id,
                from_entry,
                qty,
                price,
            } => [Some(id), from_entry.as_mut(), qty.as_mut(), price.as_mut()]
                .into_iter()
                .flatten()
                .collect(),
            Op::Close { id } => vec![id],
            Op::Configure {
                pyramiding,
                default_qty,
            } => [pyramiding.as_mut(), default_qty.as_mut()]
                .into_iter()
                .flatten()
                .collect(),
            Op::Plot { series, title } => [Some(series), title.as_mut()]
                .into_iter()
                .flatten()
                .collect(),
            Op::Eval(node) => vec![node],
        }
    }

    /// Nested statement blocks.
    pub fn blocks_mut(&mut self) -> Vec<&mut Vec<Step>> {
        match self {
            Op::Conditional {
                branches,
                otherwise,
            } => {
                let mut blocks: Vec<&mut Vec<Step>> =
                    branches.iter_mut().map(|b| &mut b.body).collect();
                blocks.push(otherwise);
                blocks
            }
            _ => Vec::new(),
        }
    }

    pub fn blocks(&self) -> Vec<&Vec<Step>> {
        match self {
            Op::Conditional {
                branches,
                otherwise,
            } => {
                let mut blocks: Vec<&Vec<Step>> = branches.iter().map(|b| &b.body).collect();
                blocks.push(otherwise);
                blocks
            }
            _ => Vec::new(),
        }
    }

    pub fn is_dynamic(&self, dynamic: &HashSet<String>) -> bool {
        self.nodes().into_iter().any(|n| n.is_dynamic(dynamic))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub op: Op,
    /// Script line the step was generated from.
    pub pine_line: Option<usize>,
}

impl Step {
    pub fn new(op: Op, pine_line: Option<usize>) -> Self {
        Self { op, pine_line }
    }
}

/// Names whose values can change between bars: everything bound inside a
/// conditional block or rebound at top level, plus top-level bindings that
/// read such a name or the open position.
pub fn dynamic_names(steps: &[Step]) -> HashSet<String> {
    fn bound_in_blocks(step: &Step, nested: bool, out: &mut HashSet<String>) {
        if nested {
            out.extend(step.op.targets().into_iter().map(str::to_string));
        }
        for block in step.op.blocks() {
            for inner in block {
                bound_in_blocks(inner, true, out);
            }
        }
    }

    let mut dynamic = HashSet::new();
    let mut bound = HashSet::new();
    for step in steps {
        bound_in_blocks(step, false, &mut dynamic);
        for target in step.op.targets() {
            // A later rebinding must not be seen by earlier statements.
            if !bound.insert(target) {
                dynamic.insert(target.to_string());
            }
        }
    }
    loop {
        let before = dynamic.len();
        for step in steps {
            if step.op.is_dynamic(&dynamic) {
                dynamic.extend(step.op.targets().into_iter().map(str::to_string));
            }
        }
        if dynamic.len() == before {
            return dynamic;
        }
    }
}

/// A lowered procedure, split into the phases the interpreter runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub(crate) unit_name: String,
    /// Bar-invariant steps, evaluated once over whole columns.
    pub(crate) setup: Vec<Step>,
    /// Steps evaluated on every bar in order.
    pub(crate) per_bar: Vec<Step>,
    /// Plots of bar-dependent values, emitted after the last bar.
    pub(crate) deferred: Vec<Step>,
    pub(crate) dynamic: HashSet<String>,
}

impl Program {
    /// Split top-level steps into phases. Indicator calls over bar-invariant
    /// inputs inside per-bar steps are computed once during setup.
    pub fn plan(unit_name: &str, steps: Vec<Step>) -> Self {
        let dynamic = dynamic_names(&steps);
        let mut setup = Vec::new();
        let mut per_bar = Vec::new();
        let mut deferred = Vec::new();
        let mut hoisted = 0usize;

        for mut step in steps {
            let varies = step.op.is_dynamic(&dynamic)
                || step.op.targets().iter().any(|t| dynamic.contains(*t));
            let vectorizable = matches!(
                step.op,
                Op::Assign { .. }
                    | Op::AssignMacd { .. }
                    | Op::Configure { .. }
                    | Op::Plot { .. }
                    | Op::Eval(_)
            );
            match (vectorizable, varies) {
                (true, false) => setup.push(step),
                (true, true) if matches!(step.op, Op::Plot { .. }) => deferred.push(step),
                _ => {
                    let pine_line = step.pine_line;
                    let mut hoist = |call: Node| {
                        let name = format!("#ta{}", hoisted);
                        hoisted += 1;
                        setup.push(Step::new(
                            Op::Assign {
                                name: name.clone(),
                                value: call,
                            },
                            pine_line,
                        ));
                        name
                    };
                    hoist_step(&mut step, &dynamic, &mut hoist);
                    per_bar.push(step);
                }
            }
        }

        tracing::debug!(
            unit = unit_name,
            setup = setup.len(),
            per_bar = per_bar.len(),
            deferred = deferred.len(),
            hoisted,
            "planned program"
        );
        Program {
            unit_name: unit_name.to_string(),
            setup,
            per_bar,
            deferred,
            dynamic,
        }
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// True when the procedure does nothing.
    pub fn is_empty(&self) -> bool {
        self.setup.is_empty() && self.per_bar.is_empty() && self.deferred.is_empty()
    }
}

fn hoist_step(step: &mut Step, dynamic: &HashSet<String>, hoist: &mut dyn FnMut(Node) -> String) {
    for node in step.op.nodes_mut() {
        node.hoist_indicators(dynamic, hoist);
    }
    for block in step.op.blocks_mut() {
        for inner in block.iter_mut() {
            hoist_step(inner, dynamic, hoist);
        }
    }
}
