//! Runtime values of the procedure interpreter.
//!
//! A value is either a scalar (number, boolean, string) or a column aligned
//! with the dataset (numeric series or boolean mask). Binary operations
//! broadcast scalars against columns. NaN is the missing value; any ordered
//! comparison touching NaN is false.

use std::fmt;

use crate::domain::procedure::BinaryOp;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Bool(bool),
    Str(String),
    Series(Vec<f64>),
    Mask(Vec<bool>),
}

impl Value {
    pub fn na() -> Self {
        Value::Num(f64::NAN)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Num(_) => "number",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Series(_) => "series",
            Value::Mask(_) => "mask",
        }
    }

    /// Element `i` of a column; scalars are returned unchanged.
    /// Out-of-range reads yield the missing value of the column's kind.
    pub fn at(&self, i: usize) -> Value {
        match self {
            Value::Series(v) => Value::Num(v.get(i).copied().unwrap_or(f64::NAN)),
            Value::Mask(m) => Value::Bool(m.get(i).copied().unwrap_or(false)),
            scalar => scalar.clone(),
        }
    }

    /// History reference: element `i` of the result is element `i - k` of `self`.
    pub fn shift(&self, k: usize) -> Value {
        match self {
            Value::Series(v) => Value::Series(shifted(v, k, f64::NAN)),
            Value::Mask(m) => Value::Mask(shifted(m, k, false)),
            scalar => scalar.clone(),
        }
    }

    pub fn as_f64(&self) -> Result<f64, String> {
        match self {
            Value::Num(x) => Ok(*x),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            other => Err(format!("expected a number, found {}", other.type_name())),
        }
    }

    pub fn as_bool(&self) -> Result<bool, String> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Num(x) => Ok(truthy(*x)),
            other => Err(format!("expected a condition, found {}", other.type_name())),
        }
    }

    /// Numeric column of length `len`, broadcasting scalars.
    pub fn to_series(&self, len: usize) -> Result<Vec<f64>, String> {
        match self {
            Value::Series(v) => Ok(v.clone()),
            Value::Mask(m) => Ok(m.iter().map(|b| if *b { 1.0 } else { 0.0 }).collect()),
            Value::Num(_) | Value::Bool(_) => Ok(vec![self.as_f64()?; len]),
            Value::Str(_) => Err("expected a series, found string".to_string()),
        }
    }

    /// Render a scalar for use as an order identifier or label.
    pub fn to_label(&self) -> Result<String, String> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            Value::Num(x) => Ok(x.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(format!("expected a scalar, found {}", other.type_name())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(x) if x.is_nan() => write!(f, "nan"),
            Value::Num(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::Series(v) => write!(f, "<series of {}>", v.len()),
            Value::Mask(m) => write!(f, "<mask of {}>", m.len()),
        }
    }
}

pub(crate) fn truthy(x: f64) -> bool {
    !x.is_nan() && x != 0.0
}

fn shifted<T: Copy>(values: &[T], k: usize, fill: T) -> Vec<T> {
    let n = values.len();
    let k = k.min(n);
    let mut out = vec![fill; k];
    out.extend_from_slice(&values[..n - k]);
    out
}

/// Operand view used by the elementwise helpers.
enum Lane<'a, T> {
    Scalar(T),
    Column(&'a [T]),
}

impl<T: Copy> Lane<'_, T> {
    fn get(&self, i: usize) -> T {
        match self {
            Lane::Scalar(x) => *x,
            Lane::Column(v) => v[i],
        }
    }

    fn len(&self) -> Option<usize> {
        match self {
            Lane::Scalar(_) => None,
            Lane::Column(v) => Some(v.len()),
        }
    }
}

fn num_lane(value: &Value) -> Result<Lane<'_, f64>, String> {
    match value {
        Value::Num(x) => Ok(Lane::Scalar(*x)),
        Value::Series(v) => Ok(Lane::Column(v)),
        other => Err(format!("expected a number or series, found {}", other.type_name())),
    }
}

fn bool_lane(value: &Value) -> Result<Lane<'_, bool>, String> {
    match value {
        Value::Bool(b) => Ok(Lane::Scalar(*b)),
        Value::Num(x) => Ok(Lane::Scalar(truthy(*x))),
        Value::Mask(m) => Ok(Lane::Column(m)),
        other => Err(format!("expected a condition, found {}", other.type_name())),
    }
}

/// Common length of two lanes, or `None` when both are scalar.
fn zip_len<A: Copy, B: Copy>(a: &Lane<'_, A>, b: &Lane<'_, B>) -> Result<Option<usize>, String> {
    match (a.len(), b.len()) {
        (Some(x), Some(y)) if x != y => Err(format!("length mismatch: {} vs {}", x, y)),
        (Some(x), _) | (_, Some(x)) => Ok(Some(x)),
        (None, None) => Ok(None),
    }
}

fn zip_num(a: &Value, b: &Value, f: fn(f64, f64) -> f64) -> Result<Value, String> {
    let (a, b) = (num_lane(a)?, num_lane(b)?);
    Ok(match zip_len(&a, &b)? {
        None => Value::Num(f(a.get(0), b.get(0))),
        Some(n) => Value::Series((0..n).map(|i| f(a.get(i), b.get(i))).collect()),
    })
}

fn zip_cmp(a: &Value, b: &Value, f: fn(f64, f64) -> bool) -> Result<Value, String> {
    let (a, b) = (num_lane(a)?, num_lane(b)?);
    Ok(match zip_len(&a, &b)? {
        None => Value::Bool(f(a.get(0), b.get(0))),
        Some(n) => Value::Mask((0..n).map(|i| f(a.get(i), b.get(i))).collect()),
    })
}

fn zip_bool(a: &Value, b: &Value, f: fn(bool, bool) -> bool) -> Result<Value, String> {
    let (a, b) = (bool_lane(a)?, bool_lane(b)?);
    Ok(match zip_len(&a, &b)? {
        None => Value::Bool(f(a.get(0), b.get(0))),
        Some(n) => Value::Mask((0..n).map(|i| f(a.get(i), b.get(i))).collect()),
    })
}

fn is_boolish(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Mask(_))
}

/// Elementwise `f` over one numeric operand.
pub fn map_num(value: &Value, f: impl Fn(f64) -> f64) -> Result<Value, String> {
    match value {
        Value::Num(x) => Ok(Value::Num(f(*x))),
        Value::Series(v) => Ok(Value::Series(v.iter().map(|x| f(*x)).collect())),
        other => Err(format!("expected a number or series, found {}", other.type_name())),
    }
}

/// Elementwise `f` over two numeric operands with broadcasting.
pub fn zip_with(a: &Value, b: &Value, f: fn(f64, f64) -> f64) -> Result<Value, String> {
    zip_num(a, b, f)
}

pub fn negate(value: &Value) -> Result<Value, String> {
    map_num(value, |x| -x)
}

pub fn not(value: &Value) -> Result<Value, String> {
    match bool_lane(value)? {
        Lane::Scalar(b) => Ok(Value::Bool(!b)),
        Lane::Column(m) => Ok(Value::Mask(m.iter().map(|b| !b).collect())),
    }
}

pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, String> {
    match op {
        BinaryOp::Add => match (a, b) {
            (Value::Str(x), Value::Str(y)) => Ok(Value::Str(format!("{}{}", x, y))),
            _ => zip_num(a, b, |x, y| x + y),
        },
        BinaryOp::Sub => zip_num(a, b, |x, y| x - y),
        BinaryOp::Mul => zip_num(a, b, |x, y| x * y),
        BinaryOp::Div => zip_num(a, b, |x, y| x / y),
        BinaryOp::Rem => zip_num(a, b, |x, y| x % y),
        BinaryOp::Lt => zip_cmp(a, b, |x, y| x < y),
        BinaryOp::Le => zip_cmp(a, b, |x, y| x <= y),
        BinaryOp::Gt => zip_cmp(a, b, |x, y| x > y),
        BinaryOp::Ge => zip_cmp(a, b, |x, y| x >= y),
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (a, b) {
                (Value::Str(x), Value::Str(y)) => Value::Bool(x == y),
                _ if is_boolish(a) && is_boolish(b) => zip_bool(a, b, |x, y| x == y)?,
                _ => zip_cmp(a, b, |x, y| x == y)?,
            };
            if op == BinaryOp::Eq { Ok(equal) } else { not(&equal) }
        }
        BinaryOp::And => zip_bool(a, b, |x, y| x && y),
        BinaryOp::Or => zip_bool(a, b, |x, y| x || y),
    }
}

/// `cond ? then : otherwise`, elementwise when the condition is a mask.
pub fn select(cond: &Value, then: &Value, otherwise: &Value) -> Result<Value, String> {
    let mask = match bool_lane(cond)? {
        Lane::Scalar(c) => return Ok(if c { then.clone() } else { otherwise.clone() }),
        Lane::Column(m) => m,
    };
    let n = mask.len();
    if is_boolish(then) && is_boolish(otherwise) {
        let (t, o) = (bool_lane(then)?, bool_lane(otherwise)?);
        check_len(&t, n)?;
        check_len(&o, n)?;
        return Ok(Value::Mask(
            (0..n).map(|i| if mask[i] { t.get(i) } else { o.get(i) }).collect(),
        ));
    }
    let (t, o) = (num_lane(then)?, num_lane(otherwise)?);
    check_len(&t, n)?;
    check_len(&o, n)?;
    Ok(Value::Series(
        (0..n).map(|i| if mask[i] { t.get(i) } else { o.get(i) }).collect(),
    ))
}

fn check_len<T: Copy>(lane: &Lane<'_, T>, n: usize) -> Result<(), String> {
    match lane.len() {
        Some(len) if len != n => Err(format!("length mismatch: {} vs {}", len, n)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_arithmetic() {
        let v = binary(BinaryOp::Add, &Value::Num(1.0), &Value::Num(2.0)).unwrap();
        assert_eq!(v, Value::Num(3.0));
        let v = binary(BinaryOp::Rem, &Value::Num(7.0), &Value::Num(4.0)).unwrap();
        assert_eq!(v, Value::Num(3.0));
    }

    #[test]
    fn broadcast_series_and_scalar() {
        let s = Value::Series(vec![1.0, 2.0, 3.0]);
        let v = binary(BinaryOp::Mul, &s, &Value::Num(2.0)).unwrap();
        assert_eq!(v, Value::Series(vec![2.0, 4.0, 6.0]));
        let v = binary(BinaryOp::Sub, &Value::Num(10.0), &s).unwrap();
        assert_eq!(v, Value::Series(vec![9.0, 8.0, 7.0]));
    }

    #[test]
    fn comparisons_with_nan_are_false() {
        let s = Value::Series(vec![f64::NAN, 2.0]);
        let v = binary(BinaryOp::Gt, &s, &Value::Num(1.0)).unwrap();
        assert_eq!(v, Value::Mask(vec![false, true]));
        let v = binary(BinaryOp::Lt, &s, &Value::Num(1.0)).unwrap();
        assert_eq!(v, Value::Mask(vec![false, false]));
        let v = binary(BinaryOp::Eq, &Value::na(), &Value::na()).unwrap();
        assert_eq!(v, Value::Bool(false));
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let a = Value::Series(vec![1.0]);
        let b = Value::Series(vec![1.0, 2.0]);
        assert!(binary(BinaryOp::Add, &a, &b).is_err());
    }

    #[test]
    fn logical_ops_on_masks() {
        let a = Value::Mask(vec![true, true, false]);
        let b = Value::Mask(vec![true, false, false]);
        assert_eq!(
            binary(BinaryOp::And, &a, &b).unwrap(),
            Value::Mask(vec![true, false, false])
        );
        assert_eq!(
            binary(BinaryOp::Or, &a, &Value::Bool(false)).unwrap(),
            Value::Mask(vec![true, true, false])
        );
        assert_eq!(not(&b).unwrap(), Value::Mask(vec![false, true, true]));
    }

    #[test]
    fn string_equality_and_concat() {
        let a = Value::Str("long".into());
        let b = Value::Str("long".into());
        assert_eq!(binary(BinaryOp::Eq, &a, &b).unwrap(), Value::Bool(true));
        assert_eq!(binary(BinaryOp::Ne, &a, &b).unwrap(), Value::Bool(false));
        assert_eq!(
            binary(BinaryOp::Add, &a, &Value::Str("!".into())).unwrap(),
            Value::Str("long!".into())
        );
    }

    #[test]
    fn arithmetic_on_strings_is_an_error() {
        let err = binary(BinaryOp::Mul, &Value::Str("a".into()), &Value::Num(1.0)).unwrap_err();
        assert!(err.contains("string"));
    }

    #[test]
    fn shift_fills_with_missing() {
        let s = Value::Series(vec![1.0, 2.0, 3.0]).shift(1);
        let Value::Series(v) = s else { panic!() };
        assert!(v[0].is_nan());
        assert_eq!(&v[1..], &[1.0, 2.0]);
        assert_eq!(
            Value::Mask(vec![true, true]).shift(5),
            Value::Mask(vec![false, false])
        );
        assert_eq!(Value::Num(4.0).shift(3), Value::Num(4.0));
    }

    #[test]
    fn element_access() {
        let s = Value::Series(vec![1.0, 2.0]);
        assert_eq!(s.at(1), Value::Num(2.0));
        assert!(matches!(s.at(9), Value::Num(x) if x.is_nan()));
        assert_eq!(Value::Str("x".into()).at(3), Value::Str("x".into()));
    }

    #[test]
    fn select_elementwise() {
        let cond = Value::Mask(vec![true, false]);
        let v = select(&cond, &Value::Num(1.0), &Value::Series(vec![5.0, 6.0])).unwrap();
        assert_eq!(v, Value::Series(vec![1.0, 6.0]));
        let v = select(&Value::Bool(false), &Value::Num(1.0), &Value::Num(2.0)).unwrap();
        assert_eq!(v, Value::Num(2.0));
    }

    #[test]
    fn number_truthiness() {
        assert!(Value::Num(2.0).as_bool().unwrap());
        assert!(!Value::na().as_bool().unwrap());
        assert!(!Value::Num(0.0).as_bool().unwrap());
        assert!(Value::Str("x".into()).as_bool().is_err());
    }

    #[test]
    fn labels() {
        assert_eq!(Value::Str("L".into()).to_label().unwrap(), "L");
        assert_eq!(Value::Num(3.0).to_label().unwrap(), "3");
        assert!(Value::Series(vec![]).to_label().is_err());
    }
}
