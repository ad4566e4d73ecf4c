//! Structural comparison of workflow output documents.

use serde_json::{Map, Number, Value};

/// The first location where two output documents disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDifference {
    /// JSON-pointer style path, `""` for the document root.
    pub path: String,
    /// `None` when the key is absent on that side.
    pub expected: Option<Value>,
    pub observed: Option<Value>,
}

impl OutputDifference {
    pub fn display_path(&self) -> &str {
        if self.path.is_empty() {
            "/"
        } else {
            &self.path
        }
    }
}

pub fn render(value: &Option<Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "<missing>".to_string(),
    }
}

/// Compare two output mappings key by key. Keys are visited in sorted
/// order so the reported difference is deterministic.
pub fn first_difference(
    expected: &Map<String, Value>,
    observed: &Map<String, Value>,
) -> Option<OutputDifference> {
    diff_maps("", expected, observed)
}

pub fn structurally_equal(expected: &Value, observed: &Value) -> bool {
    diff_values(String::new(), expected, observed).is_none()
}

fn diff_maps(
    path: &str,
    expected: &Map<String, Value>,
    observed: &Map<String, Value>,
) -> Option<OutputDifference> {
    let mut keys: Vec<&String> = expected.keys().chain(observed.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter().find_map(|key| {
        let child = format!("{path}/{}", escape(key));
        match (expected.get(key), observed.get(key)) {
            (Some(e), Some(o)) => diff_values(child, e, o),
            (e, o) => Some(OutputDifference {
                path: child,
                expected: e.cloned(),
                observed: o.cloned(),
            }),
        }
    })
}

fn diff_values(path: String, expected: &Value, observed: &Value) -> Option<OutputDifference> {
    let mismatch = |path: String| {
        Some(OutputDifference {
            path,
            expected: Some(expected.clone()),
            observed: Some(observed.clone()),
        })
    };

    match (expected, observed) {
        (Value::Object(e), Value::Object(o)) => diff_maps(&path, e, o),
        (Value::Array(e), Value::Array(o)) => {
            if e.len() != o.len() {
                return mismatch(path);
            }
            e.iter()
                .zip(o)
                .enumerate()
                .find_map(|(i, (ev, ov))| diff_values(format!("{path}/{i}"), ev, ov))
        }
        (Value::Number(e), Value::Number(o)) => {
            if numbers_equal(e, o) {
                None
            } else {
                mismatch(path)
            }
        }
        (Value::String(e), Value::String(o)) if e == o => None,
        (Value::Bool(e), Value::Bool(o)) if e == o => None,
        (Value::Null, Value::Null) => None,
        _ => mismatch(path),
    }
}

// Engines round-trip integers through doubles, so 1 and 1.0 compare equal.
// A float only matches an integer when it converts back to it exactly.
fn numbers_equal(a: &Number, b: &Number) -> bool {
    match (as_integer(a), as_integer(b)) {
        (Some(x), Some(y)) => x == y,
        (Some(x), None) => float_is_integer(b.as_f64(), x),
        (None, Some(y)) => float_is_integer(a.as_f64(), y),
        (None, None) => matches!((a.as_f64(), b.as_f64()), (Some(x), Some(y)) if x == y),
    }
}

fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

fn float_is_integer(float: Option<f64>, integer: i128) -> bool {
    match float {
        Some(f) if f.is_finite() && f.fract() == 0.0 => f as i128 == integer,
        _ => false,
    }
}

fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
