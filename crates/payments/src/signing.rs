//! Request and webhook signing.
//!
//! The shared secret is never used directly: both the bearer token and the
//! webhook HMAC key are the lowercase hex SHA-512 digest of it.

use std::io;

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256, Sha512};

use crate::error::ConfigurationError;

type HmacSha256 = Hmac<Sha256>;

/// Hex SHA-512 of the secret.
pub fn secret_digest(secret: &str) -> String {
    hex::encode(Sha512::digest(secret.as_bytes()))
}

/// Canonical string a webhook signature covers.
///
/// Top-level keys sorted, then `environment` (replacing a body key of the
/// same name in its sorted position, `null` when absent), serialized
/// compactly with non-ASCII characters left as is. Floats are written the
/// way Python's `json.dumps` writes them (`1e+16`, `1e-05`, `100.0`).
pub fn signing_payload(body: &Map<String, Value>, environment: Option<&str>) -> String {
    let mut keys: Vec<&String> = body.keys().collect();
    keys.sort();

    let mut canonical = Map::with_capacity(body.len() + 1);
    for key in keys {
        canonical.insert(key.clone(), body[key.as_str()].clone());
    }
    canonical.insert(
        "environment".to_string(),
        environment.map_or(Value::Null, |env| Value::String(env.to_string())),
    );

    let mut out = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PythonFloats);
    // Writing a `Value` into a `Vec` cannot fail.
    let _ = Value::Object(canonical).serialize(&mut serializer);
    String::from_utf8(out).unwrap_or_default()
}

/// Compact formatter with Python `repr` float notation.
struct PythonFloats;

impl Formatter for PythonFloats {
    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(python_float(value).as_bytes())
    }
}

/// Shortest round-trip digits, scientific below 1e-4 and from 1e16 up, with
/// a signed exponent of at least two digits.
fn python_float(value: f64) -> String {
    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };

    if !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs());
    }

    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    if exponent < 0 {
        let zeros = "0".repeat(exponent.unsigned_abs() as usize - 1);
        return format!("{sign}0.{zeros}{digits}");
    }

    let point = exponent as usize + 1;
    if digits.len() > point {
        format!("{sign}{}.{}", &digits[..point], &digits[point..])
    } else {
        format!("{sign}{digits}{}.0", "0".repeat(point - digits.len()))
    }
}

fn mac(digest: &str) -> Result<HmacSha256, ConfigurationError> {
    HmacSha256::new_from_slice(digest.as_bytes()).map_err(|e| ConfigurationError::Invalid {
        name: "secret",
        reason: e.to_string(),
    })
}

/// Hex HMAC-SHA256 of `payload` keyed by the secret digest.
pub fn sign(digest: &str, payload: &str) -> Result<String, ConfigurationError> {
    let mut mac = mac(digest)?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature.
pub fn verify(digest: &str, payload: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = mac(digest) else {
        return false;
    };
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn digest_is_hex_sha512() {
        let digest = secret_digest("secret");
        assert_eq!(digest.len(), 128);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(digest, secret_digest("secret2"));
    }

    #[test]
    fn payload_sorts_keys_and_appends_environment() {
        let body: Map<String, Value> = serde_json::from_str(
            r#"{"referenceNumber":"R1","amount":100,"uroPayOrderId":"uro_1"}"#,
        )
        .unwrap();
        assert_eq!(
            signing_payload(&body, Some("live")),
            r#"{"amount":100,"referenceNumber":"R1","uroPayOrderId":"uro_1","environment":"live"}"#
        );
        assert_eq!(
            signing_payload(&body, None),
            r#"{"amount":100,"referenceNumber":"R1","uroPayOrderId":"uro_1","environment":null}"#
        );
    }

    #[test]
    fn environment_key_in_body_is_replaced_in_place() {
        let body: Map<String, Value> =
            serde_json::from_str(r#"{"zeta":1,"environment":"body","alpha":2}"#).unwrap();
        assert_eq!(
            signing_payload(&body, Some("test")),
            r#"{"alpha":2,"environment":"test","zeta":1}"#
        );
    }

    #[test]
    fn non_ascii_is_not_escaped() {
        let body = object(json!({"customerName": "Zoë"}));
        assert_eq!(
            signing_payload(&body, None),
            "{\"customerName\":\"Zoë\",\"environment\":null}"
        );
    }

    #[test]
    fn floats_use_python_notation() {
        let body: Map<String, Value> = serde_json::from_str(
            r#"{"a":1e16,"b":1.5e-7,"c":1e15,"d":0.0001,"e":0.00001,"f":123.456,"g":-2.5e100,"h":100.0,"i":0.0,"j":-0.5}"#,
        )
        .unwrap();
        assert_eq!(
            signing_payload(&body, None),
            r#"{"a":1e+16,"b":1.5e-07,"c":1000000000000000.0,"d":0.0001,"e":1e-05,"f":123.456,"g":-2.5e+100,"h":100.0,"i":0.0,"j":-0.5,"environment":null}"#
        );
    }

    #[test]
    fn integers_are_untouched() {
        let body = object(json!({"amount": 24997, "delta": -3}));
        assert_eq!(
            signing_payload(&body, Some("live")),
            r#"{"amount":24997,"delta":-3,"environment":"live"}"#
        );
    }

    #[test]
    fn sign_then_verify() {
        let digest = secret_digest("secret");
        let payload = signing_payload(&object(json!({"amount": 100})), Some("live"));
        let signature = sign(&digest, &payload).unwrap();

        assert_eq!(signature.len(), 64);
        assert!(verify(&digest, &payload, &signature));
        assert!(!verify(&secret_digest("other"), &payload, &signature));
        assert!(!verify(&digest, &payload, "not-hex"));
    }

    #[test]
    fn any_payload_change_breaks_signature() {
        let digest = secret_digest("secret");
        let payload = signing_payload(&object(json!({"amount": 100, "referenceNumber": "R1"})), Some("live"));
        let signature = sign(&digest, &payload).unwrap();

        for index in 0..payload.len() {
            let mut tampered = payload.clone().into_bytes();
            tampered[index] ^= 0x01;
            let tampered = String::from_utf8_lossy(&tampered).into_owned();
            assert!(!verify(&digest, &tampered, &signature), "byte {index} was not covered");
        }
    }
}
