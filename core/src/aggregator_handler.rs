// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::aggregator::{AggregatorValue, ValueAggregator};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;

/// Name-keyed registry of aggregators for one worker or the conductor
///
/// The registry is fixed at algorithm registration time; aggregating
/// under an unknown name is a logged no-op, reading with the wrong value
/// type fails fast.
#[derive(Debug, Default)]
pub struct AggregatorHandler {
    aggregators: HashMap<String, ValueAggregator>,
}

impl AggregatorHandler {
    pub fn new(registrations: Vec<(String, ValueAggregator)>) -> Self {
        Self {
            aggregators: registrations.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Fold a contribution into the named aggregator
    pub fn aggregate(&mut self, name: &str, value: AggregatorValue) {
        match self.aggregators.get_mut(name) {
            Some(aggregator) => aggregator.aggregate(&value),
            None => warn!(name, "aggregate called for unregistered aggregator"),
        }
    }

    pub fn value(&self, name: &str) -> Option<AggregatorValue> {
        self.aggregators.get(name).map(|a| a.value())
    }

    /// Typed accessor; panics if the aggregator holds a different kind
    pub fn get_float(&self, name: &str) -> f64 {
        match self.value(name) {
            Some(AggregatorValue::Float(v)) => v,
            Some(other) => panic!(
                "aggregator '{}' holds {:?}, not a float: value type contract violated",
                name, other
            ),
            None => panic!("aggregator '{}' is not registered", name),
        }
    }

    /// Typed accessor; panics if the aggregator holds a different kind
    pub fn get_int(&self, name: &str) -> i64 {
        match self.value(name) {
            Some(AggregatorValue::Int(v)) => v,
            Some(other) => panic!(
                "aggregator '{}' holds {:?}, not an int: value type contract violated",
                name, other
            ),
            None => panic!("aggregator '{}' is not registered", name),
        }
    }

    /// Typed accessor; panics if the aggregator holds a different kind
    pub fn get_bool(&self, name: &str) -> bool {
        match self.value(name) {
            Some(AggregatorValue::Bool(v)) => v,
            Some(other) => panic!(
                "aggregator '{}' holds {:?}, not a bool: value type contract violated",
                name, other
            ),
            None => panic!("aggregator '{}' is not registered", name),
        }
    }

    /// Current values as a wire document, for shipping to the conductor
    /// or broadcasting the global snapshot to workers
    pub fn serialize_values(&self) -> Value {
        let mut map = Map::new();
        for (name, aggregator) in &self.aggregators {
            map.insert(name.clone(), aggregator.value().to_json());
        }
        Value::Object(map)
    }

    /// Fold a worker's shipped values into this handler
    pub fn absorb_values(&mut self, document: &Value) {
        let Some(map) = document.as_object() else {
            warn!("aggregator document is not an object, ignoring");
            return;
        };
        for (name, wire) in map {
            let Some(aggregator) = self.aggregators.get_mut(name) else {
                warn!(name = %name, "aggregator document names an unregistered aggregator");
                continue;
            };
            match AggregatorValue::from_json_like(&aggregator.value(), wire) {
                Some(value) => aggregator.aggregate(&value),
                None => warn!(name = %name, wire = %wire, "aggregator value has the wrong wire type"),
            }
        }
    }

    /// Overwrite states from the conductor's broadcast snapshot
    pub fn set_values(&mut self, document: &Value) {
        let Some(map) = document.as_object() else {
            warn!("aggregator snapshot is not an object, ignoring");
            return;
        };
        for (name, wire) in map {
            let Some(aggregator) = self.aggregators.get_mut(name) else {
                continue;
            };
            if let Some(value) = AggregatorValue::from_json_like(&aggregator.value(), wire) {
                aggregator.set_value(value);
            }
        }
    }

    /// Superstep boundary: non-permanent aggregators return to their
    /// identity, permanent ones keep their value
    pub fn reset_values(&mut self) {
        for aggregator in self.aggregators.values_mut() {
            aggregator.reset();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.aggregators.is_empty()
    }
}
