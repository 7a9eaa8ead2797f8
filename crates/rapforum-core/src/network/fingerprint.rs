//! Request fingerprints.
//!
//! A fingerprint is the identity string shared by the response cache and the
//! in-flight registry. Object keys are written in sorted order so two requests
//! that differ only in key order map to the same fingerprint.

use reqwest::Method;
use serde_json::Value;

/// Derive the fingerprint for a request.
pub fn fingerprint(method: &Method, url: &str, params: Option<&Value>, body: Option<&Value>) -> String {
    let mut key = String::with_capacity(url.len() + 32);
    key.push_str(method.as_str());
    key.push(':');
    key.push_str(url);
    key.push(':');
    write_canonical(params.unwrap_or(&Value::Null), &mut key);
    key.push(':');
    write_canonical(body.unwrap_or(&Value::Null), &mut key);
    key
}

/// Serialize `value` as compact JSON with object keys sorted.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    // Serializing a str cannot fail.
    out.push_str(&serde_json::to_string(s).unwrap_or_default());
}
