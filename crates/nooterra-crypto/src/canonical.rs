use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonError {
    #[error("non-finite number is not representable in canonical JSON")]
    NonFiniteNumber,

    #[error("field {0} ends in `Hash` but is not a 64-char lowercase hex string")]
    MalformedHashField(String),
}

/// Deterministic serialization of a JSON value: object keys sorted by
/// Unicode code point, array order preserved, no extraneous whitespace.
/// Runs the normalizer described in §4.1 before emitting bytes: rejects
/// non-finite numbers and requires any field whose name ends in `Hash` to be
/// a 64-char lowercase hex string when present.
pub fn to_canonical_bytes(value: &Value) -> Result<Vec<u8>, CanonError> {
    let mut out = Vec::new();
    write_canonical(value, None, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, field_name: Option<&str>, out: &mut Vec<u8>) -> Result<(), CanonError> {
    if let Some(name) = field_name {
        if name.ends_with("Hash") {
            if let Value::String(s) = value {
                let is_hex64 = s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
                if !is_hex64 {
                    return Err(CanonError::MalformedHashField(name.to_string()));
                }
            }
        }
    }

    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(CanonError::NonFiniteNumber);
                }
            }
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => write_json_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, None, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_json_string(key, out);
                out.push(b':');
                write_canonical(&map[*key], Some(key.as_str()), out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_json_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    out.extend_from_slice(format!("\\u{:04x}", unit).as_bytes());
                }
            }
            c => out.extend_from_slice(c.to_string().as_bytes()),
        }
    }
    out.push(b'"');
}
