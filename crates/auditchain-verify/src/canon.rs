//! Canonical JSON and SHA-256, implemented independently of the ledger.
//!
//! Keys sort by UTF-16 code units. Strings escape only `"`, `\` and C0
//! controls. Integers and floats must fit in ±(2^53 - 1); integral floats
//! print as integers; other floats print as the shortest round-trip decimal.
//! `__proto__`, `constructor` and `prototype` are refused as keys.

use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

const SAFE_MAX: u64 = 9_007_199_254_740_991;
const FORBIDDEN_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Why a value has no canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonError(pub String);

impl std::fmt::Display for CanonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CanonError {}

pub fn canonical(value: &Value) -> Result<String, CanonError> {
    let mut buf = String::with_capacity(128);
    emit(value, &mut buf)?;
    Ok(buf)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// `sha256_hex(canonical(value))`.
pub fn digest(value: &Value) -> Result<String, CanonError> {
    canonical(value).map(|text| sha256_hex(text.as_bytes()))
}

fn emit(value: &Value, buf: &mut String) -> Result<(), CanonError> {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(true) => buf.push_str("true"),
        Value::Bool(false) => buf.push_str("false"),
        Value::Number(n) => buf.push_str(&number(n)?),
        Value::String(s) => quote(s, buf),
        Value::Array(items) => {
            buf.push('[');
            let mut first = true;
            for item in items {
                if !first {
                    buf.push(',');
                }
                first = false;
                emit(item, buf)?;
            }
            buf.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(Vec<u16>, &String, &Value)> = Vec::with_capacity(map.len());
            for (key, item) in map {
                if FORBIDDEN_KEYS.contains(&key.as_str()) {
                    return Err(CanonError(format!("forbidden key {key:?}")));
                }
                entries.push((key.encode_utf16().collect(), key, item));
            }
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            buf.push('{');
            let mut first = true;
            for (_, key, item) in entries {
                if !first {
                    buf.push(',');
                }
                first = false;
                quote(key, buf);
                buf.push(':');
                emit(item, buf)?;
            }
            buf.push('}');
        }
    }
    Ok(())
}

fn number(n: &Number) -> Result<String, CanonError> {
    if let Some(u) = n.as_u64() {
        if u > SAFE_MAX {
            return Err(CanonError(format!("integer {u} outside the safe range")));
        }
        return Ok(u.to_string());
    }
    if let Some(i) = n.as_i64() {
        if i.unsigned_abs() > SAFE_MAX {
            return Err(CanonError(format!("integer {i} outside the safe range")));
        }
        return Ok(i.to_string());
    }
    match n.as_f64() {
        Some(f) if f.is_finite() => {
            if f.abs() > SAFE_MAX as f64 {
                Err(CanonError(format!("number {f:e} outside the safe range")))
            } else if f.trunc() == f {
                let whole = f as i64;
                Ok(whole.to_string())
            } else {
                Ok(f.to_string())
            }
        }
        _ => Err(CanonError(format!("number {n} is not finite"))),
    }
}

fn quote(s: &str, buf: &mut String) {
    buf.push('"');
    for ch in s.chars() {
        match ch {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\u{08}' => buf.push_str("\\b"),
            '\u{0c}' => buf.push_str("\\f"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                buf.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => buf.push(c),
        }
    }
    buf.push('"');
}
