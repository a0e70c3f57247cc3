//! FormulaEngine - sandboxed formula evaluator with a result cache
//!
//! Evaluation pipeline:
//! 1. Validate the supplied variables (names and value shapes)
//! 2. Serve the raw result from the cache when the formula was seen before
//! 3. Otherwise screen the text, parse it, check every referenced name
//!    against the allowlist and the variables, then interpret the tree
//! 4. Reconcile the raw result with the expected length

use crate::allowlist::{self, Builtin};
use crate::cache::{CacheStats, FormulaCache};
use crate::parser::{self, BinaryOp, CompareOp, Expr, UnaryOp};
use crate::screener::Screener;
use crate::value::{EvaluationResult, Value, Variables};
use common::config::EvaluationConfig;
use errors::{ExplainError, ExplainErrorTrait, Result};
use std::cmp::Ordering;
use tracing::{debug, trace, warn};

/// Snapshot of a variable set, compared bit for bit
type VariableFingerprint = Vec<(String, Vec<u64>)>;

/// Formula evaluation engine
///
/// # Example
/// ```
/// use explain_calc::{FormulaEngine, Variables, VariableValue};
///
/// let mut engine = FormulaEngine::with_defaults().unwrap();
/// let mut vars = Variables::new();
/// vars.insert("x".to_string(), VariableValue::Scalar(3.0));
///
/// let result = engine.evaluate("(x, x*2)", &vars, None, true).unwrap();
/// assert_eq!(result.components(), &[3.0, 6.0]);
/// ```
#[derive(Debug)]
pub struct FormulaEngine {
    screener: Screener,
    /// Longest tuple `range()` or tuple repetition may build
    max_sequence_len: usize,
    cache: FormulaCache,
    /// Variables seen by the previous cached evaluation
    last_variables: Option<VariableFingerprint>,
}

impl FormulaEngine {
    pub fn new(max_formula_len: usize, max_sequence_len: usize) -> Result<Self> {
        Ok(Self {
            screener: Screener::new(max_formula_len)?,
            max_sequence_len,
            cache: FormulaCache::new(),
            last_variables: None,
        })
    }

    pub fn from_config(config: &EvaluationConfig) -> Result<Self> {
        Self::new(config.max_formula_len, config.max_range_len)
    }

    pub fn with_defaults() -> Result<Self> {
        Self::from_config(&EvaluationConfig::default())
    }

    /// Evaluate a formula against a variable set
    ///
    /// # Arguments
    /// * `expect_len` - Number of components the caller needs, if any
    /// * `extend_to_expected` - Pad a short result with its last element and
    ///   truncate a long one instead of failing
    pub fn evaluate(
        &mut self,
        formula: &str,
        variables: &Variables,
        expect_len: Option<usize>,
        extend_to_expected: bool,
    ) -> Result<EvaluationResult> {
        let result = self
            .evaluate_cached(formula, variables)
            .and_then(|raw| {
                EvaluationResult::new(raw.to_components()?)
                    .reconcile(expect_len, extend_to_expected)
            });

        if let Err(e) = &result {
            if e.is_security() {
                warn!(formula, error = %e, "formula blocked");
            } else {
                debug!(formula, error = %e, "formula evaluation failed");
            }
        }
        result
    }

    fn evaluate_cached(&mut self, formula: &str, variables: &Variables) -> Result<Value> {
        validate_variables(variables)?;

        let fingerprint = fingerprint(variables);
        if self.last_variables.as_ref() != Some(&fingerprint) {
            if self.last_variables.is_some() {
                debug!(entries = self.cache.len(), "variables changed, clearing formula cache");
                self.cache.clear();
            }
            self.last_variables = Some(fingerprint);
        }

        if let Some(raw) = self.cache.get(formula) {
            trace!(formula, "formula cache hit");
            return Ok(raw);
        }

        let raw = self.compute(formula, variables)?;
        self.cache.record_computation();
        self.cache.insert(formula, raw.clone());
        Ok(raw)
    }

    /// Evaluate without touching the cache and return the raw value
    pub fn evaluate_raw(&self, formula: &str, variables: &Variables) -> Result<Value> {
        validate_variables(variables)?;
        self.compute(formula, variables)
    }

    fn compute(&self, formula: &str, variables: &Variables) -> Result<Value> {
        self.screener.screen(formula)?;
        let expr = parser::parse(formula)?;
        check_names(&expr, variables)?;

        let interpreter = Interpreter {
            formula,
            variables,
            max_sequence_len: self.max_sequence_len,
        };
        interpreter.eval(&expr)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.last_variables = None;
    }

    pub fn cache(&self) -> &FormulaCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn max_formula_len(&self) -> usize {
        self.screener.max_len()
    }
}

fn fingerprint(variables: &Variables) -> VariableFingerprint {
    variables
        .iter()
        .map(|(name, value)| (name.clone(), value.bits()))
        .collect()
}

fn validate_variables(variables: &Variables) -> Result<()> {
    for (name, value) in variables {
        if allowlist::is_suspicious_var_name(name) {
            return Err(ExplainError::DisallowedName(name.clone()));
        }
        value.validate(name)?;
    }
    Ok(())
}

/// Every name must be a constant or variable, every call an allowlisted function
fn check_names(expr: &Expr, variables: &Variables) -> Result<()> {
    let (values, calls) = expr.referenced_names();
    for name in values {
        if allowlist::constant(name).is_none() && !variables.contains_key(name) {
            return Err(ExplainError::DisallowedName(name.to_string()));
        }
    }
    for name in calls {
        if !allowlist::is_function(name) {
            return Err(ExplainError::DisallowedName(name.to_string()));
        }
    }
    Ok(())
}

struct Interpreter<'a> {
    formula: &'a str,
    variables: &'a Variables,
    max_sequence_len: usize,
}

impl Interpreter<'_> {
    fn error(&self, message: impl Into<String>) -> ExplainError {
        ExplainError::runtime(self.formula, message)
    }

    fn eval(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Name(name) => self.lookup(name),
            Expr::Tuple(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Tuple),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                let n = value.as_number().ok_or_else(|| {
                    self.error(format!("bad operand type for unary operator: {}", value.type_name()))
                })?;
                Ok(Value::Number(match op {
                    UnaryOp::Plus => n,
                    UnaryOp::Minus => -n,
                }))
            },
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, left, right)
            },
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first)?;
                for (op, next) in rest {
                    let right = self.eval(next)?;
                    if !self.compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            },
            Expr::Call { function, args } => {
                let builtin = Builtin::from_name(function)
                    .ok_or_else(|| ExplainError::DisallowedName(function.clone()))?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                builtin
                    .call(&args, self.max_sequence_len)
                    .map_err(|e| self.error(e))
            },
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let Value::Tuple(items) = target else {
                    return Err(self.error(format!(
                        "'{}' object is not subscriptable",
                        target.type_name()
                    )));
                };
                let len = items.len() as i64;
                let position = if *index < 0 { len + index } else { *index };
                if position < 0 || position >= len {
                    return Err(self.error("tuple index out of range"));
                }
                Ok(items[position as usize].clone())
            },
        }
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        if let Some(value) = allowlist::constant(name) {
            return Ok(Value::Number(value));
        }
        self.variables
            .get(name)
            .map(|value| value.to_value())
            .ok_or_else(|| ExplainError::DisallowedName(name.to_string()))
    }

    fn binary(&self, op: BinaryOp, left: Value, right: Value) -> Result<Value> {
        match (op, left, right) {
            (BinaryOp::Add, Value::Tuple(mut a), Value::Tuple(b)) => {
                if a.len() + b.len() > self.max_sequence_len {
                    return Err(self.error("tuple is too long"));
                }
                a.extend(b);
                Ok(Value::Tuple(a))
            },
            (BinaryOp::Mul, Value::Tuple(items), count)
            | (BinaryOp::Mul, count, Value::Tuple(items))
                if !matches!(count, Value::Tuple(_)) =>
            {
                self.repeat(items, &count)
            },
            (op, left, right) => {
                let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
                    return Err(self.error(format!(
                        "unsupported operand types for {}: {} and {}",
                        op_symbol(op),
                        left.type_name(),
                        right.type_name()
                    )));
                };
                let result = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => {
                        if b == 0.0 {
                            return Err(self.error("float division by zero"));
                        }
                        a / b
                    },
                    BinaryOp::FloorDiv => allowlist::floor_div(a, b).map_err(|e| self.error(e))?,
                    BinaryOp::Mod => allowlist::modulo(a, b).map_err(|e| self.error(e))?,
                    BinaryOp::Pow => allowlist::power(a, b).map_err(|e| self.error(e))?,
                };
                if result.is_infinite() && a.is_finite() && b.is_finite() {
                    return Err(self.error("numerical result out of range"));
                }
                Ok(Value::Number(result))
            },
        }
    }

    fn repeat(&self, items: Vec<Value>, count: &Value) -> Result<Value> {
        let n = count.as_number().unwrap_or(f64::NAN);
        if !n.is_finite() || n.fract() != 0.0 {
            return Err(self.error("can't multiply a tuple by a non-integer"));
        }
        if n <= 0.0 {
            return Ok(Value::Tuple(Vec::new()));
        }
        if items.len() as f64 * n > self.max_sequence_len as f64 {
            return Err(self.error("tuple is too long"));
        }
        let n = n as usize;
        let mut repeated = Vec::with_capacity(items.len() * n);
        for _ in 0..n {
            repeated.extend(items.iter().cloned());
        }
        Ok(Value::Tuple(repeated))
    }

    fn compare(&self, op: CompareOp, left: &Value, right: &Value) -> Result<bool> {
        match op {
            CompareOp::Eq => Ok(values_equal(left, right)),
            CompareOp::Ne => Ok(!values_equal(left, right)),
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
                let ordering = order(left, right).ok_or_else(|| {
                    self.error(format!(
                        "ordering not supported between {} and {}",
                        left.type_name(),
                        right.type_name()
                    ))
                })?;
                Ok(match (op, ordering) {
                    (_, None) => false,
                    (CompareOp::Lt, Some(o)) => o == Ordering::Less,
                    (CompareOp::Le, Some(o)) => o != Ordering::Greater,
                    (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
                    (_, Some(o)) => o != Ordering::Less,
                })
            },
        }
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        },
        (Value::Tuple(_), _) | (_, Value::Tuple(_)) => false,
        (a, b) => a.as_number() == b.as_number(),
    }
}

/// Outer `None` for unorderable types, inner `None` when NaN is involved
fn order(left: &Value, right: &Value) -> Option<Option<Ordering>> {
    match (left, right) {
        (Value::Tuple(a), Value::Tuple(b)) => {
            for (x, y) in a.iter().zip(b) {
                match order(x, y)? {
                    Some(Ordering::Equal) => continue,
                    other => return Some(other),
                }
            }
            Some(Some(a.len().cmp(&b.len())))
        },
        (Value::Tuple(_), _) | (_, Value::Tuple(_)) => None,
        (a, b) => Some(a.as_number()?.partial_cmp(&b.as_number()?)),
    }
}
