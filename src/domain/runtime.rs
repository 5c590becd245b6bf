//! Strategy runtime: per-identifier signed positions and an append-only order log.
//!
//! Each identifier is an independent state machine whose state is its signed
//! size (positive long, negative short, zero flat). Every operation is total.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "long" => Some(Direction::Long),
            "short" => Some(Direction::Short),
            _ => None,
        }
    }

    /// Direction of the order that reduces a position of this sign.
    fn offsetting(position: f64) -> Self {
        if position > 0.0 {
            Direction::Short
        } else {
            Direction::Long
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub direction: Direction,
    pub quantity: f64,
    pub price: Option<f64>,
    /// Bar index current when the order was placed.
    pub bar: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub orders: Vec<Order>,
    pub positions: BTreeMap<String, f64>,
}

impl ExecutionResult {
    pub fn position(&self, id: &str) -> f64 {
        self.positions.get(id).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Default)]
pub struct StrategyRuntime {
    orders: Vec<Order>,
    positions: HashMap<String, f64>,
    bar: usize,
}

impl StrategyRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bar(&mut self, bar: usize) {
        self.bar = bar;
    }

    pub fn position(&self, id: &str) -> f64 {
        self.positions.get(id).copied().unwrap_or(0.0)
    }

    /// Net size across all identifiers.
    pub fn position_size(&self) -> f64 {
        self.positions.values().sum()
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    fn record(&mut self, id: &str, direction: Direction, quantity: f64, price: Option<f64>) {
        self.orders.push(Order {
            id: id.to_string(),
            direction,
            quantity,
            price,
            bar: self.bar,
        });
    }

    /// Record an entry and move the position by `qty` in `direction`.
    /// Zero or negative quantities are recorded as given.
    pub fn entry(&mut self, id: &str, direction: Direction, qty: f64, price: Option<f64>) {
        self.record(id, direction, qty, price);
        let delta = match direction {
            Direction::Long => qty,
            Direction::Short => -qty,
        };
        *self.positions.entry(id.to_string()).or_insert(0.0) += delta;
    }

    /// Offset the position tracked under `from_entry` (or `id`). A missing
    /// `qty` exits the full open amount; a larger `qty` is not clamped.
    pub fn exit(&mut self, id: &str, from_entry: Option<&str>, qty: Option<f64>, price: Option<f64>) {
        let key = from_entry.unwrap_or(id);
        let pos = self.position(key);
        if pos == 0.0 {
            return;
        }
        let qty = qty.unwrap_or(pos.abs());
        let direction = Direction::offsetting(pos);
        self.record(id, direction, qty, price);
        let new_pos = if pos > 0.0 { pos - qty } else { pos + qty };
        self.positions.insert(key.to_string(), new_pos);
    }

    /// Flatten the position for `id` with one offsetting order.
    pub fn close(&mut self, id: &str) {
        let pos = self.position(id);
        if pos == 0.0 {
            return;
        }
        self.record(id, Direction::offsetting(pos), pos.abs(), None);
        self.positions.insert(id.to_string(), 0.0);
    }

    pub fn into_result(self) -> ExecutionResult {
        ExecutionResult {
            orders: self.orders,
            positions: self.positions.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn entry_long_adds() {
        let mut rt = StrategyRuntime::new();
        rt.entry("L", Direction::Long, 2.0, None);
        rt.entry("L", Direction::Long, 1.0, Some(101.5));
        assert_eq!(rt.position("L"), 3.0);
        assert_eq!(rt.orders().len(), 2);
        assert_eq!(rt.orders()[1].price, Some(101.5));
    }

    #[test]
    fn entry_short_subtracts() {
        let mut rt = StrategyRuntime::new();
        rt.entry("S", Direction::Short, 3.0, None);
        assert_eq!(rt.position("S"), -3.0);
    }

    #[test]
    fn entry_accepts_zero_and_negative_qty() {
        let mut rt = StrategyRuntime::new();
        rt.entry("L", Direction::Long, 0.0, None);
        rt.entry("L", Direction::Long, -1.0, None);
        assert_eq!(rt.orders().len(), 2);
        assert_eq!(rt.position("L"), -1.0);
    }

    #[test]
    fn exit_on_flat_is_noop() {
        let mut rt = StrategyRuntime::new();
        rt.exit("L", None, Some(1.0), None);
        assert!(rt.orders().is_empty());
        assert_eq!(rt.position("L"), 0.0);
    }

    #[test]
    fn exit_defaults_to_full_amount() {
        let mut rt = StrategyRuntime::new();
        rt.entry("L", Direction::Long, 4.0, None);
        rt.exit("L", None, None, None);
        assert_eq!(rt.position("L"), 0.0);
        let last = rt.orders().last().unwrap();
        assert_eq!(last.direction, Direction::Short);
        assert_eq!(last.quantity, 4.0);
    }

    #[test]
    fn exit_partial_short() {
        let mut rt = StrategyRuntime::new();
        rt.entry("S", Direction::Short, 5.0, None);
        rt.exit("S", None, Some(2.0), Some(99.0));
        assert_eq!(rt.position("S"), -3.0);
        let last = rt.orders().last().unwrap();
        assert_eq!(last.direction, Direction::Long);
        assert_eq!(last.price, Some(99.0));
    }

    #[test]
    fn exit_overshoot_is_not_clamped() {
        let mut rt = StrategyRuntime::new();
        rt.entry("L", Direction::Long, 1.0, None);
        rt.exit("L", None, Some(3.0), None);
        assert_eq!(rt.orders().len(), 2);
        assert_eq!(rt.position("L"), -2.0);
    }

    #[test]
    fn exit_from_entry_tracks_other_key() {
        let mut rt = StrategyRuntime::new();
        rt.entry("L", Direction::Long, 2.0, None);
        rt.exit("TP", Some("L"), Some(1.0), None);
        assert_eq!(rt.position("L"), 1.0);
        assert_eq!(rt.position("TP"), 0.0);
        assert_eq!(rt.orders().last().unwrap().id, "TP");
    }

    #[test]
    fn close_flattens() {
        let mut rt = StrategyRuntime::new();
        rt.entry("S", Direction::Short, 2.5, None);
        rt.close("S");
        assert_eq!(rt.position("S"), 0.0);
        let last = rt.orders().last().unwrap();
        assert_eq!(last.direction, Direction::Long);
        assert_eq!(last.quantity, 2.5);
        assert_eq!(last.price, None);
    }

    #[test]
    fn close_on_flat_is_noop() {
        let mut rt = StrategyRuntime::new();
        rt.close("X");
        assert!(rt.orders().is_empty());
    }

    #[test]
    fn position_size_sums_ids() {
        let mut rt = StrategyRuntime::new();
        rt.entry("A", Direction::Long, 2.0, None);
        rt.entry("B", Direction::Short, 0.5, None);
        assert_eq!(rt.position_size(), 1.5);
    }

    #[test]
    fn orders_carry_bar_index() {
        let mut rt = StrategyRuntime::new();
        rt.set_bar(7);
        rt.entry("L", Direction::Long, 1.0, None);
        assert_eq!(rt.orders()[0].bar, 7);
    }

    #[test]
    fn into_result_is_sorted() {
        let mut rt = StrategyRuntime::new();
        rt.entry("b", Direction::Long, 1.0, None);
        rt.entry("a", Direction::Long, 1.0, None);
        let result = rt.into_result();
        let keys: Vec<&str> = result.positions.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(result.position("missing"), 0.0);
    }

    #[test]
    fn direction_tokens() {
        assert_eq!(Direction::from_token("long"), Some(Direction::Long));
        assert_eq!(Direction::from_token("short"), Some(Direction::Short));
        assert_eq!(Direction::from_token("flat"), None);
        assert_eq!(Direction::Short.to_string(), "short");
    }

    fn op() -> impl Strategy<Value = (u8, bool, f64)> {
        (0u8..3, any::<bool>(), 0.0f64..10.0)
    }

    proptest! {
        #[test]
        fn close_always_flattens_with_at_most_one_order(ops in prop::collection::vec(op(), 0..20)) {
            let mut rt = StrategyRuntime::new();
            for (kind, long, qty) in ops {
                let dir = if long { Direction::Long } else { Direction::Short };
                match kind {
                    0 => rt.entry("X", dir, qty, None),
                    1 => rt.exit("X", None, Some(qty), None),
                    _ => rt.close("X"),
                }
            }
            let before = rt.orders().len();
            rt.close("X");
            prop_assert_eq!(rt.position("X"), 0.0);
            prop_assert!(rt.orders().len() - before <= 1);
        }

        #[test]
        fn full_exit_never_increases_magnitude(qty in 0.1f64..100.0, long in any::<bool>()) {
            let mut rt = StrategyRuntime::new();
            let dir = if long { Direction::Long } else { Direction::Short };
            rt.entry("X", dir, qty, None);
            let before = rt.position("X").abs();
            rt.exit("X", None, None, None);
            prop_assert!(rt.position("X").abs() <= before);
        }
    }
}
