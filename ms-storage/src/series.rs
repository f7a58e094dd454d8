use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ms_base::{validation, Result};
use ms_net::Point;

/// A matcher over a single label. `Select` always requires one matcher with
/// `name == "__name__"` and `op == Equal` -- strict equality is the only
/// supported form for metric names (see `ms-replicate` for where that
/// restriction is enforced at the replicated-querier boundary; the local
/// store itself is permissive so `/private` callers and tests can probe any
/// matcher shape).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matcher {
    pub name: String,
    pub op: MatchOp,
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOp {
    Equal,
    NotEqual,
    Regexp,
    NotRegexp,
}

impl Matcher {
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Matcher {
            name: name.into(),
            op: MatchOp::Equal,
            value: value.into(),
        }
    }

    pub fn matches(&self, label_value: Option<&str>) -> Result<bool> {
        let label_value = label_value.unwrap_or("");
        Ok(match self.op {
            MatchOp::Equal => label_value == self.value,
            MatchOp::NotEqual => label_value != self.value,
            MatchOp::Regexp => {
                let re = regex::Regex::new(&self.value)
                    .map_err(|e| validation(format!("bad regexp matcher: {e}")))?;
                re.is_match(label_value)
            }
            MatchOp::NotRegexp => {
                let re = regex::Regex::new(&self.value)
                    .map_err(|e| validation(format!("bad regexp matcher: {e}")))?;
                !re.is_match(label_value)
            }
        })
    }
}

/// A single (labels) series with its samples in ascending timestamp order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    pub samples: Vec<(i64, f64)>,
}

impl Series {
    pub fn label_key(&self) -> Vec<(String, String)> {
        self.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

pub fn point_matches(point: &Point, matchers: &[Matcher]) -> Result<bool> {
    for m in matchers {
        let value = if m.name == "__name__" {
            Some(point.name.as_str())
        } else {
            point.labels.get(&m.name).map(String::as_str)
        };
        if !m.matches(value)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// The capability a replicated querier (or the HTTP API, for `/private`
/// paths) uses to read data. Narrow on purpose -- see the design note about
/// breaking the store/replicated-querier cycle via this trait.
pub trait Querier: Send + Sync {
    fn select(&self, matchers: &[Matcher]) -> Result<Vec<Series>>;
    fn label_names(&self) -> Result<Vec<String>>;
    fn label_values(&self, name: &str) -> Result<Vec<String>>;
}

/// The capability used to write data. `add` buffers; `commit` flushes.
pub trait Appender: Send {
    fn add(&mut self, point: Point) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
}
