//! Consumed expression-evaluator contract.
//!
//! Model formulas (delays, batch sizes, arrival rates) are evaluated by an
//! external parser tree; this core only consumes a numeric evaluation
//! contract and never inspects the tree. [`ConstantExpression`] is the
//! trivial implementation used by tests and simple models.

use std::collections::HashMap;

use thiserror::Error;

/// Expression evaluation failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    /// The expression references a value the context does not provide.
    #[error("unknown value '{0}' in expression context")]
    UnknownValue(String),

    /// The expression produced a non-finite number.
    #[error("expression produced a non-finite value")]
    NotFinite,

    /// Evaluator-internal failure, passed through opaquely.
    #[error("evaluation failed: {0}")]
    Internal(String),
}

/// Values visible to an expression at evaluation time.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    /// Logical time of the evaluating worker, milliseconds.
    pub time: i64,
    /// Index of the evaluating worker.
    pub thread_nr: usize,
    /// Named model values (station loads, counters, parameters).
    pub values: HashMap<String, f64>,
}

impl EvalContext {
    pub fn at(time: i64, thread_nr: usize) -> Self {
        Self {
            time,
            thread_nr,
            values: HashMap::new(),
        }
    }

    pub fn with_value(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    /// Look up a named value.
    pub fn value(&self, name: &str) -> Result<f64, EvalError> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| EvalError::UnknownValue(name.to_string()))
    }
}

/// Numeric evaluation contract consumed by event implementations.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, context: &EvalContext) -> Result<f64, EvalError>;
}

/// Evaluator that always yields the same finite number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantExpression(pub f64);

impl ExpressionEvaluator for ConstantExpression {
    fn evaluate(&self, _context: &EvalContext) -> Result<f64, EvalError> {
        if self.0.is_finite() {
            Ok(self.0)
        } else {
            Err(EvalError::NotFinite)
        }
    }
}
