//! Canonical JSON encoding for deterministic hashing.
//!
//! Every event hash, checkpoint signature and pack hash is computed over the
//! output of [`canonicalize`]. The rules:
//! - Object keys sorted by UTF-16 code units, no whitespace
//! - Arrays keep their order
//! - Strings use standard JSON escaping (`"`, `\`, and control characters only)
//! - Integers in plain decimal, restricted to ±(2^53 - 1)
//! - Floats share that range; integral ones render as integers (`1.0` -> `1`)
//! - Other finite floats render as the shortest round-trip decimal, no exponent
//!
//! Anything that would need interpretation is rejected with a
//! [`CanonicalError`]: non-finite numbers, raw bytes, non-string map keys,
//! unit values, and the reserved keys `__proto__`, `constructor`, `prototype`.
//!
//! **CRITICAL**: This encoding is FROZEN. Changes break every stored hash and
//! the offline verifier's independent implementation.

use std::fmt::Write as _;

use serde::ser::{self, Serialize};
use serde_json::{Map, Number, Value};

use crate::crypto::sha256_hex;
use crate::error::CanonicalError;

/// Keys that are refused anywhere in a canonicalized document.
pub const RESERVED_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Largest integer magnitude every JSON implementation represents exactly.
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Encode a JSON value to its canonical string.
pub fn canonicalize(value: &Value) -> Result<String, CanonicalError> {
    let mut out = String::new();
    write_value(&mut out, value, "$")?;
    Ok(out)
}

/// Canonicalize any `Serialize` value through the strict serializer.
pub fn canonicalize_serialize<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    canonicalize(&to_canonical_value(value)?)
}

/// SHA-256 (lowercase hex) of the canonical encoding of `value`.
pub fn hash_canonical(value: &Value) -> Result<String, CanonicalError> {
    Ok(sha256_hex(canonicalize(value)?.as_bytes()))
}

/// Convert a `Serialize` value into a JSON value without any coercion.
///
/// Unlike `serde_json::to_value`, this never maps a non-finite float to
/// `null` and never base64-or-array-encodes bytes; it fails instead.
pub fn to_canonical_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, CanonicalError> {
    value.serialize(StrictSerializer {
        path: "$".to_string(),
    })
}

fn write_value(out: &mut String, value: &Value, path: &str) -> Result<(), CanonicalError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(out, n, path)?,
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item, &format!("{path}[{i}]"))?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            for key in &keys {
                check_key(key, path)?;
            }
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key], &format!("{path}.{key}"))?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_number(out: &mut String, n: &Number, path: &str) -> Result<(), CanonicalError> {
    if let Some(i) = n.as_i64() {
        check_safe(i.unsigned_abs(), path, || i.to_string())?;
        let _ = write!(out, "{i}");
    } else if let Some(u) = n.as_u64() {
        check_safe(u, path, || u.to_string())?;
        let _ = write!(out, "{u}");
    } else {
        let f = n.as_f64().ok_or_else(|| CanonicalError::NonFiniteNumber {
            path: path.to_string(),
        })?;
        out.push_str(&format_float(f, path)?);
    }
    Ok(())
}

/// Render a float in the fixed canonical form.
pub(crate) fn format_float(f: f64, path: &str) -> Result<String, CanonicalError> {
    if !f.is_finite() {
        return Err(CanonicalError::NonFiniteNumber {
            path: path.to_string(),
        });
    }
    // Beyond 2^53 every float is integral and would print as an unsafe integer.
    if f.abs() > MAX_SAFE_INTEGER as f64 {
        return Err(CanonicalError::UnsafeInteger {
            path: path.to_string(),
            value: format!("{f:e}"),
        });
    }
    if f.fract() == 0.0 {
        // `as i64` also folds -0.0 into 0
        return Ok((f as i64).to_string());
    }
    Ok(format!("{f}"))
}

fn check_safe(
    magnitude: u64,
    path: &str,
    render: impl FnOnce() -> String,
) -> Result<(), CanonicalError> {
    if magnitude > MAX_SAFE_INTEGER {
        return Err(CanonicalError::UnsafeInteger {
            path: path.to_string(),
            value: render(),
        });
    }
    Ok(())
}

fn check_key(key: &str, path: &str) -> Result<(), CanonicalError> {
    if RESERVED_KEYS.contains(&key) {
        return Err(CanonicalError::ReservedKey {
            path: path.to_string(),
            key: key.to_string(),
        });
    }
    Ok(())
}

fn write_string(out: &mut String, s: &str) {
    // serde_json's string escaping is exactly the JSON standard set:
    // quote, backslash, and C0 controls (short forms where they exist).
    let escaped = serde_json::to_string(s).unwrap_or_default();
    out.push_str(&escaped);
}

// ─────────────────────────────────────────────────────────────────────────────
// Strict serializer
// ─────────────────────────────────────────────────────────────────────────────

struct StrictSerializer {
    path: String,
}

impl StrictSerializer {
    fn child(&self, segment: impl std::fmt::Display) -> Self {
        Self {
            path: format!("{}.{}", self.path, segment),
        }
    }

    fn index(&self, i: usize) -> Self {
        Self {
            path: format!("{}[{}]", self.path, i),
        }
    }

    fn int(self, magnitude: u64, value: Value) -> Result<Value, CanonicalError> {
        check_safe(magnitude, &self.path, || value.to_string())?;
        Ok(value)
    }

    fn float(self, f: f64) -> Result<Value, CanonicalError> {
        if !f.is_finite() {
            return Err(CanonicalError::NonFiniteNumber { path: self.path });
        }
        Number::from_f64(f)
            .map(Value::Number)
            .ok_or(CanonicalError::NonFiniteNumber { path: self.path })
    }
}

impl ser::Serializer for StrictSerializer {
    type Ok = Value;
    type Error = CanonicalError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(self, v: bool) -> Result<Value, CanonicalError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, CanonicalError> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, CanonicalError> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, CanonicalError> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, CanonicalError> {
        self.int(v.unsigned_abs(), Value::from(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, CanonicalError> {
        match i64::try_from(v) {
            Ok(n) => self.serialize_i64(n),
            Err(_) => Err(CanonicalError::UnsafeInteger {
                path: self.path,
                value: v.to_string(),
            }),
        }
    }

    fn serialize_u8(self, v: u8) -> Result<Value, CanonicalError> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, CanonicalError> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, CanonicalError> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, CanonicalError> {
        self.int(v, Value::from(v))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, CanonicalError> {
        match u64::try_from(v) {
            Ok(n) => self.serialize_u64(n),
            Err(_) => Err(CanonicalError::UnsafeInteger {
                path: self.path,
                value: v.to_string(),
            }),
        }
    }

    fn serialize_f32(self, v: f32) -> Result<Value, CanonicalError> {
        self.float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, CanonicalError> {
        self.float(v)
    }

    fn serialize_char(self, v: char) -> Result<Value, CanonicalError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, CanonicalError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Value, CanonicalError> {
        Err(CanonicalError::RawBytes { path: self.path })
    }

    fn serialize_none(self) -> Result<Value, CanonicalError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, CanonicalError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, CanonicalError> {
        Err(CanonicalError::AbsentValue {
            path: self.path,
            kind: "unit",
        })
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, CanonicalError> {
        Err(CanonicalError::AbsentValue {
            path: self.path,
            kind: "unit struct",
        })
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, CanonicalError> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, CanonicalError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, CanonicalError> {
        check_key(variant, &self.path)?;
        let inner = value.serialize(self.child(variant))?;
        let mut map = Map::new();
        map.insert(variant.to_string(), inner);
        Ok(Value::Object(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, CanonicalError> {
        Ok(SeqBuilder {
            ser: self,
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, CanonicalError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, CanonicalError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder, CanonicalError> {
        check_key(variant, &self.path)?;
        let inner = self.child(variant);
        Ok(VariantSeqBuilder {
            variant,
            seq: inner.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder, CanonicalError> {
        Ok(MapBuilder {
            ser: self,
            map: Map::new(),
            next_key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<MapBuilder, CanonicalError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantMapBuilder, CanonicalError> {
        check_key(variant, &self.path)?;
        let inner = self.child(variant);
        Ok(VariantMapBuilder {
            variant,
            map: inner.serialize_map(Some(len))?,
        })
    }
}

struct SeqBuilder {
    ser: StrictSerializer,
    items: Vec<Value>,
}

impl SeqBuilder {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CanonicalError> {
        let item = value.serialize(self.ser.index(self.items.len()))?;
        self.items.push(item);
        Ok(())
    }
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CanonicalError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, CanonicalError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CanonicalError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, CanonicalError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CanonicalError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, CanonicalError> {
        Ok(Value::Array(self.items))
    }
}

struct VariantSeqBuilder {
    variant: &'static str,
    seq: SeqBuilder,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CanonicalError> {
        self.seq.push(value)
    }

    fn end(self) -> Result<Value, CanonicalError> {
        let mut map = Map::new();
        map.insert(self.variant.to_string(), Value::Array(self.seq.items));
        Ok(Value::Object(map))
    }
}

struct MapBuilder {
    ser: StrictSerializer,
    map: Map<String, Value>,
    next_key: Option<String>,
}

impl MapBuilder {
    fn insert<T: Serialize + ?Sized>(&mut self, key: String, value: &T) -> Result<(), CanonicalError> {
        check_key(&key, &self.ser.path)?;
        let item = value.serialize(self.ser.child(&key))?;
        self.map.insert(key, item);
        Ok(())
    }
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), CanonicalError> {
        let key = key.serialize(KeySerializer {
            path: &self.ser.path,
        })?;
        self.next_key = Some(key);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CanonicalError> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| CanonicalError::Custom("map value without a key".into()))?;
        self.insert(key, value)
    }

    fn end(self) -> Result<Value, CanonicalError> {
        Ok(Value::Object(self.map))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CanonicalError> {
        self.insert(key.to_string(), value)
    }

    fn end(self) -> Result<Value, CanonicalError> {
        Ok(Value::Object(self.map))
    }
}

struct VariantMapBuilder {
    variant: &'static str,
    map: MapBuilder,
}

impl ser::SerializeStructVariant for VariantMapBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CanonicalError> {
        self.map.insert(key.to_string(), value)
    }

    fn end(self) -> Result<Value, CanonicalError> {
        let mut outer = Map::new();
        outer.insert(self.variant.to_string(), Value::Object(self.map.map));
        Ok(Value::Object(outer))
    }
}

/// Accepts only string-like map keys.
struct KeySerializer<'a> {
    path: &'a str,
}

impl KeySerializer<'_> {
    fn reject<T>(self) -> Result<T, CanonicalError> {
        Err(CanonicalError::NonStringKey {
            path: self.path.to_string(),
        })
    }
}

impl ser::Serializer for KeySerializer<'_> {
    type Ok = String;
    type Error = CanonicalError;

    type SerializeSeq = ser::Impossible<String, CanonicalError>;
    type SerializeTuple = ser::Impossible<String, CanonicalError>;
    type SerializeTupleStruct = ser::Impossible<String, CanonicalError>;
    type SerializeTupleVariant = ser::Impossible<String, CanonicalError>;
    type SerializeMap = ser::Impossible<String, CanonicalError>;
    type SerializeStruct = ser::Impossible<String, CanonicalError>;
    type SerializeStructVariant = ser::Impossible<String, CanonicalError>;

    fn serialize_str(self, v: &str) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_char(self, v: char) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String, CanonicalError> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, CanonicalError> {
        value.serialize(self)
    }

    fn serialize_bool(self, _v: bool) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_i8(self, _v: i8) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_i16(self, _v: i16) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_i32(self, _v: i32) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_i64(self, _v: i64) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_u8(self, _v: u8) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_u16(self, _v: u16) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_u32(self, _v: u32) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_u64(self, _v: u64) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_f32(self, _v: f32) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_f64(self, _v: f64) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_none(self) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_some<T: Serialize + ?Sized>(self, _value: &T) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_unit(self) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, CanonicalError> {
        self.reject()
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, CanonicalError> {
        self.reject()
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, CanonicalError> {
        self.reject()
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, CanonicalError> {
        self.reject()
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, CanonicalError> {
        self.reject()
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, CanonicalError> {
        self.reject()
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, CanonicalError> {
        self.reject()
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, CanonicalError> {
        self.reject()
    }
}
