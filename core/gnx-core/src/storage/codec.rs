//! Field Codec — fixed-width binary encoding of typed values
//!
//! | Type | Width | Encoding |
//! |---|---|---|
//! | BOOL | 1 | 0/1 |
//! | INT / LINK | 8 | i64 LE (LINK null = -1) |
//! | DOUBLE | 8 | f64 LE |
//! | DATETIME | 8 | POSIX seconds, i64 LE |
//! | STRING(n) | n | UTF-8, NUL padded |

use crate::config::StringOverflow;
use crate::error::{GnxError, GnxResult};
use crate::schema::{FieldDef, FieldType, ModelDef};
use crate::storage::value::{RecordId, Value};
use std::sync::Arc;

/// LINK 필드의 null 표현
pub const NULL_LINK: i64 = -1;

/// Default value of a stored field (what `Value::Null` encodes to).
pub fn default_value(field_type: FieldType) -> Value {
    match field_type {
        FieldType::Int => Value::Int(0),
        FieldType::Double => Value::Double(0.0),
        FieldType::Bool => Value::Bool(false),
        FieldType::DateTime => Value::DateTime(0),
        FieldType::String => Value::String(String::new()),
        FieldType::Link | FieldType::VirtualLink => Value::Link(None),
    }
}

/// Coerce `value` into the canonical variant of `field`'s type.
///
/// DOUBLE accepts INT, DATETIME accepts INT, LINK accepts INT (-1 = null) and
/// `Null` becomes the field default. String length is not checked here.
pub fn coerce(field: &FieldDef, value: Value) -> GnxResult<Value> {
    let mismatch = |v: &Value| GnxError::mismatch(&field.name, field.field_type.name(), v.type_name());
    Ok(match (field.field_type, value) {
        (_, Value::Null) => default_value(field.field_type),
        (FieldType::Int, Value::Int(v)) => Value::Int(v),
        (FieldType::Double, Value::Double(v)) => Value::Double(v),
        (FieldType::Double, Value::Int(v)) => Value::Double(v as f64),
        (FieldType::Bool, Value::Bool(v)) => Value::Bool(v),
        (FieldType::DateTime, Value::DateTime(v) | Value::Int(v)) => Value::DateTime(v),
        (FieldType::String, Value::String(s)) => {
            if s.contains('\0') {
                return Err(GnxError::mismatch(&field.name, "STRING without NUL", "STRING with NUL"));
            }
            Value::String(s)
        }
        (FieldType::Link, Value::Link(id)) => Value::Link(id),
        (FieldType::Link, Value::Int(v)) if v == NULL_LINK => Value::Link(None),
        (FieldType::Link, Value::Int(v)) if v >= 0 => Value::Link(Some(v as RecordId)),
        (_, other) => return Err(mismatch(&other)),
    })
}

/// Fit a string into `size` bytes according to the overflow policy.
pub fn fit_string(field: &FieldDef, s: String, policy: StringOverflow) -> GnxResult<String> {
    if s.len() <= field.size {
        return Ok(s);
    }
    match policy {
        StringOverflow::Reject => Err(GnxError::mismatch(
            &field.name,
            format!("STRING({})", field.size),
            format!("STRING({})", s.len()),
        )),
        StringOverflow::Truncate => {
            let mut end = field.size;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            let mut s = s;
            s.truncate(end);
            Ok(s)
        }
    }
}

/// Encode one field into `out` (exactly `field.size` bytes).
fn encode_field(field: &FieldDef, value: &Value, out: &mut [u8]) -> GnxResult<()> {
    match value {
        Value::Int(v) | Value::DateTime(v) => out.copy_from_slice(&v.to_le_bytes()),
        Value::Double(v) => out.copy_from_slice(&v.to_le_bytes()),
        Value::Bool(v) => out[0] = u8::from(*v),
        Value::Link(id) => {
            let raw = id.map_or(NULL_LINK, |v| v as i64);
            out.copy_from_slice(&raw.to_le_bytes());
        }
        Value::String(s) => {
            let bytes = s.as_bytes();
            out[..bytes.len()].copy_from_slice(bytes);
            out[bytes.len()..].fill(0);
        }
        Value::Null => {
            return Err(GnxError::mismatch(&field.name, field.field_type.name(), "NULL"));
        }
    }
    Ok(())
}

fn read_i64(bytes: &[u8]) -> GnxResult<i64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| GnxError::Corrupted(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(i64::from_le_bytes(raw))
}

/// Decode one field from its slice of a record.
pub fn decode_field(field: &FieldDef, bytes: &[u8]) -> GnxResult<Value> {
    Ok(match field.field_type {
        FieldType::Int => Value::Int(read_i64(bytes)?),
        FieldType::DateTime => Value::DateTime(read_i64(bytes)?),
        FieldType::Double => Value::Double(f64::from_bits(read_i64(bytes)? as u64)),
        FieldType::Bool => Value::Bool(bytes.first().copied().unwrap_or(0) != 0),
        FieldType::Link => match read_i64(bytes)? {
            v if v < 0 => Value::Link(None),
            v => Value::Link(Some(v as RecordId)),
        },
        FieldType::String => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            let s = std::str::from_utf8(&bytes[..end]).map_err(|e| {
                GnxError::Corrupted(format!("field '{}' holds invalid UTF-8: {e}", field.name))
            })?;
            Value::String(s.to_string())
        }
        FieldType::VirtualLink => Value::Link(None),
    })
}

/// Record-level codec bound to one model.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    def: Arc<ModelDef>,
    overflow: StringOverflow,
}

impl RecordCodec {
    pub fn new(def: Arc<ModelDef>, overflow: StringOverflow) -> Self {
        Self { def, overflow }
    }

    pub fn def(&self) -> &Arc<ModelDef> {
        &self.def
    }

    /// Canonicalize a full value vector (coercion, defaults, string fitting).
    ///
    /// The result is exactly what [`decode`](Self::decode) returns after a
    /// round trip through [`encode`](Self::encode).
    pub fn normalize(&self, values: Vec<Value>) -> GnxResult<Vec<Value>> {
        let expected = self.def.column_count();
        if values.len() != expected {
            return Err(GnxError::Validation(format!(
                "model '{}' expects {expected} values, got {}",
                self.def.name,
                values.len()
            )));
        }
        self.def
            .stored_fields()
            .zip(values)
            .map(|(field, value)| self.normalize_field(field, value))
            .collect()
    }

    pub fn normalize_field(&self, field: &FieldDef, value: Value) -> GnxResult<Value> {
        match coerce(field, value)? {
            Value::String(s) => Ok(Value::String(fit_string(field, s, self.overflow)?)),
            other => Ok(other),
        }
    }

    /// Encode already-normalized values into a `record_size` byte buffer.
    pub fn encode(&self, values: &[Value]) -> GnxResult<Vec<u8>> {
        let mut buf = vec![0u8; self.def.record_size];
        for (field, value) in self.def.stored_fields().zip(values) {
            encode_field(field, value, &mut buf[field.offset..field.offset + field.size])?;
        }
        Ok(buf)
    }

    pub fn decode(&self, bytes: &[u8]) -> GnxResult<Vec<Value>> {
        self.check_len(bytes)?;
        self.def
            .stored_fields()
            .map(|field| decode_field(field, &bytes[field.offset..field.offset + field.size]))
            .collect()
    }

    /// Decode a single field without materializing the whole record.
    pub fn decode_one(&self, bytes: &[u8], field: &FieldDef) -> GnxResult<Value> {
        self.check_len(bytes)?;
        decode_field(field, &bytes[field.offset..field.offset + field.size])
    }

    fn check_len(&self, bytes: &[u8]) -> GnxResult<()> {
        if bytes.len() != self.def.record_size {
            return Err(GnxError::Corrupted(format!(
                "record of '{}' is {} bytes, layout says {}",
                self.def.name,
                bytes.len(),
                self.def.record_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelBuilder;

    fn codec(policy: StringOverflow) -> RecordCodec {
        let def = ModelDef::register(
            ModelBuilder::new("Item")
                .string("name", 6)
                .int("qty")
                .double("price")
                .bool("active")
                .datetime("at")
                .link("owner")
                .virtual_link("parts", "item")
                .build(),
        )
        .unwrap();
        RecordCodec::new(def, policy)
    }

    fn sample() -> Vec<Value> {
        vec![
            Value::from("pen"),
            Value::Int(-4),
            Value::Double(1.25),
            Value::Bool(true),
            Value::DateTime(1_700_000_000),
            Value::link(9),
        ]
    }

    #[test]
    fn test_encode_decode() {
        let codec = codec(StringOverflow::Reject);
        let values = codec.normalize(sample()).unwrap();
        let bytes = codec.encode(&values).unwrap();
        assert_eq!(bytes.len(), 6 + 8 + 8 + 1 + 8 + 8);
        assert_eq!(codec.decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_null_encodes_default() {
        let codec = codec(StringOverflow::Reject);
        let values = codec.normalize(vec![Value::Null; 6]).unwrap();
        let decoded = codec.decode(&codec.encode(&values).unwrap()).unwrap();
        assert_eq!(decoded[0], Value::String(String::new()));
        assert_eq!(decoded[1], Value::Int(0));
        assert_eq!(decoded[5], Value::Link(None));
    }

    #[test]
    fn test_string_overflow_reject() {
        let codec = codec(StringOverflow::Reject);
        let mut values = sample();
        values[0] = Value::from("notebook");
        assert!(matches!(
            codec.normalize(values),
            Err(GnxError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_string_overflow_truncates_on_char_boundary() {
        let codec = codec(StringOverflow::Truncate);
        let mut values = sample();
        // '€' is 3 bytes, so byte 6 falls inside the second one
        values[0] = Value::from("ab€€");
        let normalized = codec.normalize(values).unwrap();
        assert_eq!(normalized[0], Value::from("ab€"));
    }

    #[test]
    fn test_rejects_nul_and_wrong_types() {
        let codec = codec(StringOverflow::Reject);
        let mut values = sample();
        values[0] = Value::from("a\0b");
        assert!(codec.normalize(values).is_err());

        let mut values = sample();
        values[1] = Value::from("four");
        assert!(matches!(
            codec.normalize(values),
            Err(GnxError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_coercions() {
        let codec = codec(StringOverflow::Reject);
        let mut values = sample();
        values[2] = Value::Int(3);
        values[4] = Value::Int(60);
        values[5] = Value::Int(-1);
        let normalized = codec.normalize(values).unwrap();
        assert_eq!(normalized[2], Value::Double(3.0));
        assert_eq!(normalized[4], Value::DateTime(60));
        assert_eq!(normalized[5], Value::Link(None));
    }

    #[test]
    fn test_wrong_value_count() {
        let codec = codec(StringOverflow::Reject);
        assert!(matches!(
            codec.normalize(vec![Value::Int(1)]),
            Err(GnxError::Validation(_))
        ));
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let codec = codec(StringOverflow::Reject);
        assert!(matches!(codec.decode(&[0u8; 3]), Err(GnxError::Corrupted(_))));
    }
}
