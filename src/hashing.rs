use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn hmac_sha256_hex(secret: &str, data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_hmac_sha256(secret: &str, data: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

pub fn hash_api_key(secret: &str, raw_key: &str) -> String {
    hmac_sha256_hex(secret, raw_key.as_bytes())
}

/// Re-serialises a JSON body so that whitespace and key order do not change
/// the fingerprint. Non-JSON bodies are used verbatim; an empty body maps to "".
pub fn canonical_body(body: &[u8]) -> String {
    if body.iter().all(u8::is_ascii_whitespace) {
        return String::new();
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => value.to_string(),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

pub fn request_fingerprint(merchant_id: &str, method: &str, path: &str, body: &[u8]) -> String {
    let material = format!(
        "{}:{}:{}:{}",
        merchant_id,
        method.to_ascii_uppercase(),
        path,
        canonical_body(body)
    );
    sha256_hex(material.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_body_ignores_key_order_and_whitespace() {
        let a = canonical_body(br#"{"b": 1, "a": {"y": 2, "x": 3}}"#);
        let b = canonical_body(br#"{"a":{"x":3,"y":2},"b":1}"#);
        assert_eq!(a, b);
        assert_eq!(canonical_body(b""), "");
        assert_eq!(canonical_body(b"  \n"), "");
    }

    #[test]
    fn hmac_verification_rejects_other_secrets() {
        let sig = hmac_sha256_hex("s1", b"payload");
        assert!(verify_hmac_sha256("s1", b"payload", &sig));
        assert!(!verify_hmac_sha256("s2", b"payload", &sig));
        assert!(!verify_hmac_sha256("s1", b"payload", "not-hex"));
    }
}
