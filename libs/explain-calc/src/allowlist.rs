//! Names a formula may reference
//!
//! Formulas can read the constants below, call the functions below and read
//! document variables. Nothing else is reachable from formula text.

use crate::value::Value;
use std::f64::consts;
use tracing::trace;

/// Named constants available to every formula
pub const CONSTANTS: &[(&str, f64)] = &[
    ("pi", consts::PI),
    ("tau", consts::TAU),
    ("eulers_number", consts::E),
    ("infinity", f64::INFINITY),
    ("nan", f64::NAN),
];

/// Words that can never be used as variable names
const RESERVED_WORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Look up a named constant
pub fn constant(name: &str) -> Option<f64> {
    CONSTANTS
        .iter()
        .find(|(constant, _)| *constant == name)
        .map(|(_, value)| *value)
}

pub fn is_function(name: &str) -> bool {
    Builtin::from_name(name).is_some()
}

/// Name is a constant or a function
pub fn is_allowlisted(name: &str) -> bool {
    constant(name).is_some() || is_function(name)
}

/// Whether a name must not be used as a variable name
///
/// Rejects empty names, anything that is not a plain identifier, names
/// containing a double underscore, reserved words and allowlisted names.
pub fn is_suspicious_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return true;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return true;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return true;
    }

    name.contains("__") || RESERVED_WORDS.contains(&name) || is_allowlisted(name)
}

/// Allowlisted functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    // Trigonometry
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    Degrees,
    Radians,
    Hypot,
    // Exponentials and roots
    Sqrt,
    Exp,
    Log,
    Log10,
    Log2,
    Pow,
    // Rounding
    Floor,
    Ceil,
    Trunc,
    Round,
    Abs,
    // Sequences and aggregates
    Min,
    Max,
    Sum,
    Range,
    Divmod,
}

impl Builtin {
    pub const ALL: &'static [Builtin] = &[
        Builtin::Sin,
        Builtin::Cos,
        Builtin::Tan,
        Builtin::Asin,
        Builtin::Acos,
        Builtin::Atan,
        Builtin::Atan2,
        Builtin::Sinh,
        Builtin::Cosh,
        Builtin::Tanh,
        Builtin::Asinh,
        Builtin::Acosh,
        Builtin::Atanh,
        Builtin::Degrees,
        Builtin::Radians,
        Builtin::Hypot,
        Builtin::Sqrt,
        Builtin::Exp,
        Builtin::Log,
        Builtin::Log10,
        Builtin::Log2,
        Builtin::Pow,
        Builtin::Floor,
        Builtin::Ceil,
        Builtin::Trunc,
        Builtin::Round,
        Builtin::Abs,
        Builtin::Min,
        Builtin::Max,
        Builtin::Sum,
        Builtin::Range,
        Builtin::Divmod,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Tan => "tan",
            Builtin::Asin => "asin",
            Builtin::Acos => "acos",
            Builtin::Atan => "atan",
            Builtin::Atan2 => "atan2",
            Builtin::Sinh => "sinh",
            Builtin::Cosh => "cosh",
            Builtin::Tanh => "tanh",
            Builtin::Asinh => "asinh",
            Builtin::Acosh => "acosh",
            Builtin::Atanh => "atanh",
            Builtin::Degrees => "degrees",
            Builtin::Radians => "radians",
            Builtin::Hypot => "hypot",
            Builtin::Sqrt => "sqrt",
            Builtin::Exp => "exp",
            Builtin::Log => "log",
            Builtin::Log10 => "log10",
            Builtin::Log2 => "log2",
            Builtin::Pow => "pow",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
            Builtin::Trunc => "trunc",
            Builtin::Round => "round",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Range => "range",
            Builtin::Divmod => "divmod",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }

    /// Accepted argument counts (inclusive); `None` upper bound is variadic
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Builtin::Atan2 | Builtin::Hypot | Builtin::Pow | Builtin::Divmod => (2, Some(2)),
            Builtin::Log | Builtin::Round => (1, Some(2)),
            Builtin::Range => (1, Some(3)),
            Builtin::Min | Builtin::Max => (1, None),
            _ => (1, Some(1)),
        }
    }

    /// Apply the function to already evaluated arguments
    ///
    /// Errors are plain messages; the evaluator attaches the formula text.
    pub fn call(self, args: &[Value], max_sequence_len: usize) -> Result<Value, String> {
        let (min, max) = self.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            return Err(arity_message(self.name(), min, max, args.len()));
        }
        trace!(function = self.name(), args = args.len(), "builtin call");

        match self {
            Builtin::Sin => unary(args, f64::sin),
            Builtin::Cos => unary(args, f64::cos),
            Builtin::Tan => unary(args, f64::tan),
            Builtin::Asin => unary(args, f64::asin),
            Builtin::Acos => unary(args, f64::acos),
            Builtin::Atan => unary(args, f64::atan),
            Builtin::Sinh => unary(args, f64::sinh),
            Builtin::Cosh => unary(args, f64::cosh),
            Builtin::Tanh => unary(args, f64::tanh),
            Builtin::Asinh => unary(args, f64::asinh),
            Builtin::Acosh => unary(args, f64::acosh),
            Builtin::Atanh => {
                let x = number(&args[0])?;
                if x.abs() >= 1.0 {
                    return Err(DOMAIN_ERROR.to_string());
                }
                checked(x, x.atanh())
            },
            Builtin::Degrees => unary(args, f64::to_degrees),
            Builtin::Radians => unary(args, f64::to_radians),
            Builtin::Sqrt => unary(args, f64::sqrt),
            Builtin::Exp => unary(args, f64::exp),
            Builtin::Log10 => log_with(number(&args[0])?, f64::log10),
            Builtin::Log2 => log_with(number(&args[0])?, f64::log2),
            Builtin::Log => {
                let x = number(&args[0])?;
                match args.get(1) {
                    None => log_with(x, f64::ln),
                    Some(base) => {
                        let base = number(base)?;
                        if base <= 0.0 {
                            return Err(DOMAIN_ERROR.to_string());
                        }
                        if base == 1.0 {
                            return Err("float division by zero".to_string());
                        }
                        log_with(x, |x| x.ln() / base.ln())
                    },
                }
            },
            Builtin::Atan2 => {
                let (y, x) = (number(&args[0])?, number(&args[1])?);
                Ok(Value::Number(y.atan2(x)))
            },
            Builtin::Hypot => {
                let (a, b) = (number(&args[0])?, number(&args[1])?);
                Ok(Value::Number(a.hypot(b)))
            },
            Builtin::Pow => power(number(&args[0])?, number(&args[1])?).map(Value::Number),
            Builtin::Floor => to_integral(number(&args[0])?, f64::floor),
            Builtin::Ceil => to_integral(number(&args[0])?, f64::ceil),
            Builtin::Trunc => to_integral(number(&args[0])?, f64::trunc),
            Builtin::Round => {
                let x = number(&args[0])?;
                match args.get(1) {
                    None => to_integral(x, round_half_even),
                    Some(digits) => {
                        let digits = integer(digits, "round() ndigits")?;
                        Ok(Value::Number(round_to_digits(x, digits)))
                    },
                }
            },
            Builtin::Abs => Ok(Value::Number(number(&args[0])?.abs())),
            Builtin::Min => extremum(args, "min", |candidate, best| candidate < best),
            Builtin::Max => extremum(args, "max", |candidate, best| candidate > best),
            Builtin::Sum => {
                let Value::Tuple(items) = &args[0] else {
                    return Err(format!("'{}' object is not iterable", args[0].type_name()));
                };
                items
                    .iter()
                    .try_fold(0.0, |acc, item| Ok(acc + number(item)?))
                    .map(Value::Number)
            },
            Builtin::Range => range(args, max_sequence_len),
            Builtin::Divmod => {
                let (a, b) = (number(&args[0])?, number(&args[1])?);
                Ok(Value::Tuple(vec![
                    Value::Number(floor_div(a, b)?),
                    Value::Number(modulo(a, b)?),
                ]))
            },
        }
    }
}

const DOMAIN_ERROR: &str = "math domain error";
const RANGE_ERROR: &str = "math range error";

fn arity_message(name: &str, min: usize, max: Option<usize>, given: usize) -> String {
    match max {
        Some(max) if max == min => {
            format!("{}() takes exactly {} argument(s) ({} given)", name, min, given)
        },
        Some(max) => format!(
            "{}() takes {} to {} arguments ({} given)",
            name, min, max, given
        ),
        None => format!(
            "{}() takes at least {} argument(s) ({} given)",
            name, min, given
        ),
    }
}

fn number(value: &Value) -> Result<f64, String> {
    value
        .as_number()
        .ok_or_else(|| format!("must be a real number, not {}", value.type_name()))
}

fn integer(value: &Value, what: &str) -> Result<i64, String> {
    let n = number(value)?;
    if !n.is_finite() || n.fract() != 0.0 {
        return Err(format!("{} must be an integer, got {}", what, n));
    }
    Ok(n as i64)
}

/// Map NaN from a non-NaN input to a domain error and overflow to a range error
fn checked(input: f64, output: f64) -> Result<Value, String> {
    if output.is_nan() && !input.is_nan() {
        return Err(DOMAIN_ERROR.to_string());
    }
    if output.is_infinite() && input.is_finite() {
        return Err(RANGE_ERROR.to_string());
    }
    Ok(Value::Number(output))
}

fn unary(args: &[Value], f: fn(f64) -> f64) -> Result<Value, String> {
    let x = number(&args[0])?;
    checked(x, f(x))
}

fn log_with(x: f64, f: impl Fn(f64) -> f64) -> Result<Value, String> {
    if x <= 0.0 {
        return Err(DOMAIN_ERROR.to_string());
    }
    Ok(Value::Number(f(x)))
}

fn to_integral(x: f64, f: fn(f64) -> f64) -> Result<Value, String> {
    if x.is_nan() {
        return Err("cannot convert float NaN to integer".to_string());
    }
    if x.is_infinite() {
        return Err("cannot convert float infinity to integer".to_string());
    }
    Ok(Value::Number(f(x)))
}

/// Round to nearest, ties to even
pub fn round_half_even(x: f64) -> f64 {
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        x.round()
    }
}

fn round_to_digits(x: f64, digits: i64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let factor = 10f64.powi(digits.clamp(-308, 308) as i32);
    let rounded = round_half_even(x * factor) / factor;
    if rounded.is_finite() {
        rounded
    } else {
        x
    }
}

fn extremum(args: &[Value], name: &str, better: fn(f64, f64) -> bool) -> Result<Value, String> {
    let items = match args {
        [Value::Tuple(items)] => items.as_slice(),
        [single] => {
            return Err(format!("'{}' object is not iterable", single.type_name()));
        },
        many => many,
    };

    let mut best: Option<f64> = None;
    for item in items {
        let candidate = number(item)?;
        best = match best {
            Some(current) if !better(candidate, current) => Some(current),
            _ => Some(candidate),
        };
    }
    best.map(Value::Number)
        .ok_or_else(|| format!("{}() arg is an empty sequence", name))
}

fn range(args: &[Value], max_sequence_len: usize) -> Result<Value, String> {
    let ints = args
        .iter()
        .map(|arg| integer(arg, "range() argument"))
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(arity_message("range", 1, Some(3), args.len())),
    };
    if step == 0 {
        return Err("range() arg 3 must not be zero".to_string());
    }

    let span = i128::from(stop) - i128::from(start);
    let step_wide = i128::from(step);
    let len = if (step > 0 && span <= 0) || (step < 0 && span >= 0) {
        0
    } else {
        (span.abs() + step_wide.abs() - 1) / step_wide.abs()
    };
    if len > max_sequence_len as i128 {
        return Err(format!(
            "range() of {} items exceeds the limit of {}",
            len, max_sequence_len
        ));
    }

    Ok(Value::Tuple(
        (0..len as i64)
            .map(|i| Value::Number((start + i * step) as f64))
            .collect(),
    ))
}

pub(crate) fn floor_div(a: f64, b: f64) -> Result<f64, String> {
    if b == 0.0 {
        return Err("float floor division by zero".to_string());
    }
    Ok((a / b).floor())
}

/// Remainder with the sign of the divisor
pub(crate) fn modulo(a: f64, b: f64) -> Result<f64, String> {
    if b == 0.0 {
        return Err("float modulo by zero".to_string());
    }
    let mut r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r += b;
    }
    Ok(r)
}

pub(crate) fn power(base: f64, exponent: f64) -> Result<f64, String> {
    if base == 0.0 && exponent < 0.0 {
        return Err("0.0 cannot be raised to a negative power".to_string());
    }
    if base < 0.0 && exponent.is_finite() && exponent.fract() != 0.0 {
        return Err("negative number cannot be raised to a fractional power".to_string());
    }
    let result = base.powf(exponent);
    if result.is_infinite() && base.is_finite() && exponent.is_finite() {
        return Err("numerical result out of range".to_string());
    }
    Ok(result)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_allowlist_membership() {
        assert!(is_allowlisted("sin"));
        assert!(is_allowlisted("pi"));
        assert!(is_allowlisted("eulers_number"));
        assert!(!is_allowlisted("open"));
        assert!(!is_allowlisted("__import__"));
        assert!(!is_allowlisted("eval"));
    }

    #[test]
    fn test_suspicious_var_names() {
        assert!(is_suspicious_var_name(""));
        assert!(is_suspicious_var_name("__class__"));
        assert!(is_suspicious_var_name("a__b"));
        assert!(is_suspicious_var_name("lambda"));
        assert!(is_suspicious_var_name("sin"));
        assert!(is_suspicious_var_name("pi"));
        assert!(is_suspicious_var_name("1abc"));
        assert!(is_suspicious_var_name("a.b"));
        assert!(is_suspicious_var_name("my var"));

        assert!(!is_suspicious_var_name("var"));
        assert!(!is_suspicious_var_name("_offset"));
        assert!(!is_suspicious_var_name("speed2"));
    }

    #[test]
    fn test_arity_checked() {
        let err = Builtin::Sin.call(&[], 10).unwrap_err();
        assert!(err.contains("sin()"));
        assert!(Builtin::Atan2.call(&[num(1.0)], 10).is_err());
        assert!(Builtin::Max.call(&[num(1.0), num(5.0), num(3.0)], 10).is_ok());
    }

    #[test]
    fn test_domain_errors() {
        assert_eq!(
            Builtin::Sqrt.call(&[num(-1.0)], 10).unwrap_err(),
            DOMAIN_ERROR
        );
        assert!(Builtin::Log.call(&[num(0.0)], 10).is_err());
        assert!(Builtin::Log.call(&[num(8.0), num(1.0)], 10).is_err());
        assert!(Builtin::Exp.call(&[num(1000.0)], 10).is_err());
        assert!(Builtin::Atanh.call(&[num(1.0)], 10).is_err());
        assert!(Builtin::Floor.call(&[num(f64::INFINITY)], 10).is_err());
    }

    #[test]
    fn test_log_with_base() {
        let Value::Number(n) = Builtin::Log.call(&[num(8.0), num(2.0)], 10).unwrap() else {
            panic!("expected number");
        };
        assert!((n - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(3.5), 4.0);
        assert_eq!(round_half_even(-2.5), -2.0);
        assert_eq!(round_half_even(2.6), 3.0);
        assert_eq!(
            Builtin::Round.call(&[num(1.25), num(1.0)], 10).unwrap(),
            num(1.2)
        );
    }

    #[test]
    fn test_min_max_forms() {
        assert_eq!(
            Builtin::Min.call(&[num(3.0), num(1.0), num(2.0)], 10).unwrap(),
            num(1.0)
        );
        let tuple = Value::Tuple(vec![num(3.0), num(7.0)]);
        assert_eq!(Builtin::Max.call(&[tuple], 10).unwrap(), num(7.0));
        assert!(Builtin::Max.call(&[Value::Tuple(vec![])], 10).is_err());
        assert!(Builtin::Max.call(&[num(3.0)], 10).is_err());
    }

    #[test]
    fn test_sum_takes_a_tuple() {
        let tuple = Value::Tuple(vec![num(1.0), num(2.5), Value::Bool(true)]);
        assert_eq!(Builtin::Sum.call(&[tuple], 10).unwrap(), num(4.5));
        assert!(Builtin::Sum.call(&[num(1.0)], 10).is_err());
    }

    #[test]
    fn test_range() {
        assert_eq!(
            Builtin::Range.call(&[num(1.0), num(3.0)], 10).unwrap(),
            Value::Tuple(vec![num(1.0), num(2.0)])
        );
        assert_eq!(
            Builtin::Range.call(&[num(5.0), num(0.0), num(-2.0)], 10).unwrap(),
            Value::Tuple(vec![num(5.0), num(3.0), num(1.0)])
        );
        assert_eq!(
            Builtin::Range.call(&[num(3.0), num(1.0)], 10).unwrap(),
            Value::Tuple(vec![])
        );
        assert!(Builtin::Range.call(&[num(1.5)], 10).is_err());
        assert!(Builtin::Range.call(&[num(0.0), num(5.0), num(0.0)], 10).is_err());
        assert!(Builtin::Range.call(&[num(1e9)], 10_000).is_err());
    }

    #[test]
    fn test_python_style_division() {
        assert_eq!(modulo(-7.0, 3.0).unwrap(), 2.0);
        assert_eq!(modulo(7.0, -3.0).unwrap(), -2.0);
        assert_eq!(floor_div(-7.0, 2.0).unwrap(), -4.0);
        assert!(modulo(1.0, 0.0).is_err());
        assert_eq!(
            Builtin::Divmod.call(&[num(7.0), num(2.0)], 10).unwrap(),
            Value::Tuple(vec![num(3.0), num(1.0)])
        );
    }

    #[test]
    fn test_power_errors() {
        assert!(power(0.0, -1.0).is_err());
        assert!(power(-8.0, 0.5).is_err());
        assert!(power(10.0, 400.0).is_err());
        assert_eq!(power(2.0, -1.0).unwrap(), 0.5);
    }
}
