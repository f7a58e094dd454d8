use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single sample: a metric name, its label set, a nanosecond timestamp, and
/// a value. Labels are kept in a `BTreeMap` so the label set is always in
/// canonical (sorted-by-key) order -- this doubles as the order fingerprinting
/// hashes over.
///
/// Invariant (only guaranteed after the sanitizer has run): `name` and every
/// label key match `[a-zA-Z_][a-zA-Z0-9_]*`, `value` is finite, and
/// `labels["__name__"] == name`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub timestamp_ns: i64,
    pub value: f64,
}

impl Point {
    pub fn new(name: impl Into<String>, timestamp_ns: i64, value: f64) -> Self {
        Point {
            name: name.into(),
            labels: BTreeMap::new(),
            timestamp_ns,
            value,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn is_finite(&self) -> bool {
        self.value.is_finite()
    }

    /// The canonical label set used for fingerprinting: every label plus the
    /// synthetic `__name__` label, already sorted because `labels` is a
    /// `BTreeMap` and `__name__` is injected in its sorted position.
    pub fn canonical_labels(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = Vec::with_capacity(self.labels.len() + 1);
        out.push(("__name__", self.name.as_str()));
        for (k, v) in &self.labels {
            if k != "__name__" {
                out.push((k.as_str(), v.as_str()));
            }
        }
        out.sort_unstable_by_key(|(k, _)| *k);
        out
    }

    pub fn fingerprint(&self) -> u64 {
        ms_route::fingerprint(&self.canonical_labels())
    }
}

/// An ordered sequence of points plus whatever envelope fields the transport
/// needs. Serialized as one MessagePack record per wire message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub points: Vec<Point>,
}

impl Batch {
    pub fn new() -> Self {
        Batch::default()
    }

    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Debug-only check that every point in the batch already looks
    /// sanitized. The internode listener only ever receives batches the
    /// sender's sanitizer has already cleaned, so it trusts this instead of
    /// re-running the sanitizer.
    pub fn assert_sanitized(&self) {
        #[cfg(debug_assertions)]
        for p in &self.points {
            debug_assert!(p.is_finite(), "unsanitized point reached internode listener");
            debug_assert_eq!(
                p.labels.get("__name__").map(String::as_str),
                Some(p.name.as_str()),
                "unsanitized point missing __name__ label"
            );
        }
    }
}
