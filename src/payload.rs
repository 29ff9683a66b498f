//! Request payload generation.
//!
//! Payloads are built once per protocol run and shared by every request of
//! that run as a cheaply clonable [`Bytes`] handle.

use bytes::Bytes;
use rand::Rng;
use serde_json::{json, Value};

use crate::models::PayloadMode;

/// Every byte at an offset divisible by this value is random
const RANDOM_BYTE_STRIDE: usize = 1000;

/// Number of entries in the structured document's item array
const STRUCTURED_ITEM_COUNT: usize = 16;

/// Filler used to pad structured payloads to their target size
const PADDING_CHAR: char = 'X';

/// Generate a payload of exactly `size_bytes` bytes
pub fn generate(size_bytes: usize, mode: PayloadMode) -> Bytes {
    if size_bytes == 0 {
        return Bytes::new();
    }

    match mode {
        PayloadMode::Binary => Bytes::from(binary_payload(size_bytes)),
        PayloadMode::Structured => Bytes::from(structured_payload(size_bytes)),
    }
}

/// Sequential `i % 256` pattern with a random byte every 1000 bytes
fn binary_payload(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size)
        .map(|i| {
            if i % RANDOM_BYTE_STRIDE == 0 {
                rng.gen::<u8>()
            } else {
                (i % 256) as u8
            }
        })
        .collect()
}

/// JSON document padded (or truncated) to `size` bytes
fn structured_payload(size: usize) -> Vec<u8> {
    let mut doc = structured_document();

    let mut base = to_json_bytes(&doc);
    if base.len() >= size {
        base.truncate(size);
        return base;
    }

    doc["padding"] = Value::String(String::new());
    let with_field = to_json_bytes(&doc);
    if with_field.len() <= size {
        let fill = size - with_field.len();
        doc["padding"] = Value::String(std::iter::repeat(PADDING_CHAR).take(fill).collect());
        let padded = to_json_bytes(&doc);
        debug_assert_eq!(padded.len(), size);
        return padded;
    }

    // Too small for a padding field; trailing whitespace keeps it valid JSON
    base.resize(size, b' ');
    base
}

fn to_json_bytes(doc: &Value) -> Vec<u8> {
    serde_json::to_vec(doc).unwrap_or_else(|_| b"{}".to_vec())
}

fn structured_document() -> Value {
    let mut rng = rand::thread_rng();

    let items: Vec<Value> = (0..STRUCTURED_ITEM_COUNT)
        .map(|i| {
            json!({
                "index": i,
                "title": format!("Item {}", i),
                "active": i % 2 == 0,
                "value": rng.gen_range(0..100_000),
            })
        })
        .collect();

    json!({
        "id": format!("payload-{}", rng.gen::<u32>()),
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "status": 200,
        "message": "Success",
        "user": {
            "userId": format!("u-{}", rng.gen::<u32>()),
            "name": "Jane Doe",
            "email": "jane.doe@example.com",
            "roles": ["admin", "editor", "observer"],
        },
        "metrics": {
            "cpu": rng.gen::<f64>(),
            "mem": rng.gen::<f64>(),
            "latencyMs": rng.gen_range(1..20),
        },
        "items": items,
    })
}
