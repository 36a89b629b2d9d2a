/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Conditional filters over event data.
//!
//! A subscription receives an event only when every one of its filters
//! passes. Field paths are dotted (`order.items.0.sku`); a path starting with
//! `data` that does not resolve is retried without that segment, so
//! `data.priority` addresses the payload's own `priority` field.

use cmo_models::models::{FilterOperator, WebhookFilter};
use serde_json::Value;
use std::cmp::Ordering;

/// Returns true when `data` passes all `filters`. An empty list matches.
pub fn matches(data: &Value, filters: &[WebhookFilter]) -> bool {
    filters.iter().all(|f| evaluate(data, f))
}

/// Evaluates a single filter against `data`.
pub fn evaluate(data: &Value, filter: &WebhookFilter) -> bool {
    let Some(actual) = resolve(data, &filter.field) else {
        return matches!(
            filter.operator,
            FilterOperator::Ne | FilterOperator::NotContains
        );
    };
    let expected = &filter.value;

    match filter.operator {
        FilterOperator::Eq => loose_eq(actual, expected),
        FilterOperator::Ne => !loose_eq(actual, expected),
        FilterOperator::Gt => compare(actual, expected) == Some(Ordering::Greater),
        FilterOperator::Lt => compare(actual, expected) == Some(Ordering::Less),
        FilterOperator::Gte => matches!(
            compare(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::Lte => matches!(
            compare(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::Contains => contains(actual, expected),
        FilterOperator::NotContains => !contains(actual, expected),
    }
}

/// Resolves a dotted path against `data`.
pub fn resolve<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    lookup(data, &segments).or_else(|| match segments.split_first() {
        Some((&"data", rest)) if !rest.is_empty() => lookup(data, rest),
        _ => None,
    })
}

fn lookup<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Orders two values, or `None` when they are not comparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(_), _) | (_, Value::Number(_)) => as_number(a)?.partial_cmp(&as_number(b)?),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    a == b || compare(a, b) == Some(Ordering::Equal)
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => match needle {
            Value::String(n) => s.contains(n.as_str()),
            Value::Number(_) | Value::Bool(_) => s.contains(&needle.to_string()),
            _ => false,
        },
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}
