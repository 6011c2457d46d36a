//! # Payload Codec
//!
//! Converts bus payload objects to JSON values and back.
//!
//! | range | decode | encode |
//! |---|---|---|
//! | `2.0.0.0/8` | MessagePack value tree, map keys coerced to strings | MessagePack of the JSON value |
//! | `64.0.0.0/4` | JSON string | string as is, anything else as its JSON rendering |
//! | other | the object's text representation | unsupported |

use crate::domain::error::{GatewayError, GatewayResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rmpv::Value as MsgPack;
use serde_json::{Map, Number, Value};
use shared_bus::{PayloadObject, PoMask, STRUCTURED_MASK, TEXT_MASK};

/// Decode one payload object into a JSON value.
pub fn decode(po: &PayloadObject) -> GatewayResult<Value> {
    if po.is_type(&STRUCTURED_MASK) {
        let mut contents: &[u8] = po.contents().as_ref();
        let tree = rmpv::decode::read_value(&mut contents).map_err(|e| {
            GatewayError::DecodeFailure(format!("PO {}: invalid msgpack: {}", po.ponum(), e))
        })?;
        Ok(msgpack_to_json(tree))
    } else if po.is_type(&TEXT_MASK) {
        let text = std::str::from_utf8(po.contents()).map_err(|e| {
            GatewayError::DecodeFailure(format!("PO {}: invalid UTF-8: {}", po.ponum(), e))
        })?;
        Ok(Value::String(text.to_string()))
    } else {
        Ok(Value::String(po.text_representation()))
    }
}

/// Encode a JSON value as a payload object tagged with `target`'s PO number.
pub fn encode(target: &PoMask, value: &Value) -> GatewayResult<PayloadObject> {
    let ponum = target.ponum();

    if target.within(&STRUCTURED_MASK) {
        let buf = rmp_serde::to_vec(value)
            .map_err(|e| GatewayError::Internal(format!("msgpack encoding failed: {}", e)))?;
        Ok(PayloadObject::new(ponum, buf))
    } else if target.within(&TEXT_MASK) {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Ok(PayloadObject::new(ponum, text.into_bytes()))
    } else {
        Err(GatewayError::UnsupportedPayloadType(target.to_string()))
    }
}

/// Convert a MessagePack value tree to JSON.
///
/// Binary and extension data become standard base64, and map keys are
/// coerced to strings at every depth.
pub fn msgpack_to_json(value: MsgPack) -> Value {
    match value {
        MsgPack::Nil => Value::Null,
        MsgPack::Boolean(b) => Value::Bool(b),
        MsgPack::Integer(i) => {
            if let Some(n) = i.as_i64() {
                Value::Number(n.into())
            } else if let Some(n) = i.as_u64() {
                Value::Number(n.into())
            } else {
                Value::String(i.to_string())
            }
        }
        MsgPack::F32(f) => float_to_json(f64::from(f)),
        MsgPack::F64(f) => float_to_json(f),
        MsgPack::String(s) => Value::String(utf8_or_base64(s)),
        MsgPack::Binary(b) => Value::String(STANDARD.encode(b)),
        MsgPack::Ext(_, data) => Value::String(STANDARD.encode(data)),
        MsgPack::Array(items) => Value::Array(items.into_iter().map(msgpack_to_json).collect()),
        MsgPack::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (k, v) in entries {
                map.insert(key_to_string(k), msgpack_to_json(v));
            }
            Value::Object(map)
        }
    }
}

fn float_to_json(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

fn utf8_or_base64(s: rmpv::Utf8String) -> String {
    match s.as_str() {
        Some(text) => text.to_string(),
        None => STANDARD.encode(s.as_bytes()),
    }
}

fn key_to_string(key: MsgPack) -> String {
    match key {
        MsgPack::String(s) => utf8_or_base64(s),
        MsgPack::Integer(i) => i.to_string(),
        MsgPack::F32(f) => f.to_string(),
        MsgPack::F64(f) => f.to_string(),
        MsgPack::Boolean(b) => b.to_string(),
        MsgPack::Nil => "null".to_string(),
        other => msgpack_to_json(other).to_string(),
    }
}
