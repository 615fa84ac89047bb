// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde_json::Value;

/// Typed value carried by an aggregator
///
/// The kind is fixed at registration; feeding a different kind into an
/// aggregator is a programming error and fails fast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregatorValue {
    Float(f64),
    Int(i64),
    Bool(bool),
}

impl AggregatorValue {
    pub fn to_json(&self) -> Value {
        match self {
            AggregatorValue::Float(v) => Value::from(*v),
            AggregatorValue::Int(v) => Value::from(*v),
            AggregatorValue::Bool(v) => Value::from(*v),
        }
    }

    /// Reads a wire value as the same kind as `like`
    pub fn from_json_like(like: &AggregatorValue, wire: &Value) -> Option<AggregatorValue> {
        match like {
            AggregatorValue::Float(_) => wire.as_f64().map(AggregatorValue::Float),
            AggregatorValue::Int(_) => wire.as_i64().map(AggregatorValue::Int),
            AggregatorValue::Bool(_) => wire.as_bool().map(AggregatorValue::Bool),
        }
    }
}

/// Reduction applied when a new contribution is folded in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorKind {
    /// Keep the larger value
    Max,
    /// Add values together
    Sum,
    /// Boolean or
    Or,
    /// Last write wins
    Overwrite,
}

/// A named global reduction value, updated during/after each superstep
///
/// Non-permanent aggregators reset to their identity element at every
/// superstep's aggregation phase; permanent ones keep their value until
/// the execution ends.
#[derive(Debug, Clone)]
pub struct ValueAggregator {
    kind: AggregatorKind,
    permanent: bool,
    identity: AggregatorValue,
    current: AggregatorValue,
}

impl ValueAggregator {
    pub fn new(kind: AggregatorKind, identity: AggregatorValue, permanent: bool) -> Self {
        Self {
            kind,
            permanent,
            identity,
            current: identity,
        }
    }

    /// Convenience constructors for the common registrations
    pub fn max_float(identity: f64) -> Self {
        Self::new(AggregatorKind::Max, AggregatorValue::Float(identity), false)
    }

    pub fn sum_float() -> Self {
        Self::new(AggregatorKind::Sum, AggregatorValue::Float(0.0), false)
    }

    pub fn sum_int() -> Self {
        Self::new(AggregatorKind::Sum, AggregatorValue::Int(0), false)
    }

    pub fn bool_or() -> Self {
        Self::new(AggregatorKind::Or, AggregatorValue::Bool(false), false)
    }

    pub fn overwrite_float(identity: f64) -> Self {
        Self::new(
            AggregatorKind::Overwrite,
            AggregatorValue::Float(identity),
            false,
        )
    }

    pub fn permanent(mut self) -> Self {
        self.permanent = true;
        self
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    /// Fold a contribution into the current state
    pub fn aggregate(&mut self, value: &AggregatorValue) {
        self.current = match (self.kind, self.current, *value) {
            (AggregatorKind::Max, AggregatorValue::Float(a), AggregatorValue::Float(b)) => {
                AggregatorValue::Float(a.max(b))
            }
            (AggregatorKind::Max, AggregatorValue::Int(a), AggregatorValue::Int(b)) => {
                AggregatorValue::Int(a.max(b))
            }
            (AggregatorKind::Sum, AggregatorValue::Float(a), AggregatorValue::Float(b)) => {
                AggregatorValue::Float(a + b)
            }
            (AggregatorKind::Sum, AggregatorValue::Int(a), AggregatorValue::Int(b)) => {
                AggregatorValue::Int(a + b)
            }
            (AggregatorKind::Or, AggregatorValue::Bool(a), AggregatorValue::Bool(b)) => {
                AggregatorValue::Bool(a || b)
            }
            (AggregatorKind::Overwrite, AggregatorValue::Float(_), b @ AggregatorValue::Float(_)) => b,
            (AggregatorKind::Overwrite, AggregatorValue::Int(_), b @ AggregatorValue::Int(_)) => b,
            (AggregatorKind::Overwrite, AggregatorValue::Bool(_), b @ AggregatorValue::Bool(_)) => b,
            (kind, current, incoming) => panic!(
                "aggregator kind {:?} with state {:?} fed a {:?}: value type contract violated",
                kind, current, incoming
            ),
        };
    }

    pub fn value(&self) -> AggregatorValue {
        self.current
    }

    /// Overwrite the state directly (used when absorbing the global
    /// snapshot broadcast by the conductor)
    pub fn set_value(&mut self, value: AggregatorValue) {
        self.current = value;
    }

    /// Restore the identity element; no-op for permanent aggregators
    pub fn reset(&mut self) {
        if !self.permanent {
            self.current = self.identity;
        }
    }
}
