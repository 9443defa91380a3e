//! OAuth 1.0a request signing (HMAC-SHA1).
//!
//! Nonce and timestamp are inputs, never generated inside [`sign`], so a
//! signature is fully determined by its arguments.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::Rng;
use ring::hmac;

use crate::error::{Error, Result};

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const VERSION: &str = "1.0";

/// Query parameters as ordered key/value pairs.
pub type Params = Vec<(String, String)>;

/// RFC 3986 encoding: only `A-Z a-z 0-9 - . _ ~` pass through.
#[must_use]
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Encode every pair, sort, and join into the canonical parameter string.
/// An `oauth_signature` pair is never part of what gets signed.
#[must_use]
pub fn normalize_params(params: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .filter(|(k, _)| k != "oauth_signature")
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn base_string(method: &str, url: &str, params: &[(String, String)]) -> Result<String> {
    if method.is_empty() {
        return Err(Error::Signature("HTTP method is empty".to_string()));
    }
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(Error::Signature(format!("not an absolute URL: '{url}'")));
    }
    Ok(format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&normalize_params(params))
    ))
}

/// Compute the base64 HMAC-SHA1 signature for a request.
///
/// The signing key is `<consumer_secret>&<token_secret>`, with an empty token
/// secret before a request token exists.
pub fn sign(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: Option<&str>,
) -> Result<String> {
    let base = base_string(method, url, params)?;
    let signing_key = format!("{consumer_secret}&{}", token_secret.unwrap_or_default());
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, signing_key.as_bytes());
    let tag = hmac::sign(&key, base.as_bytes());
    Ok(STANDARD.encode(tag.as_ref()))
}

/// The protocol parameters every signed request carries.
#[must_use]
pub fn protocol_params(consumer_key: &str, nonce: &str, timestamp: u64) -> Params {
    vec![
        ("oauth_consumer_key".to_string(), consumer_key.to_string()),
        ("oauth_nonce".to_string(), nonce.to_string()),
        (
            "oauth_signature_method".to_string(),
            SIGNATURE_METHOD.to_string(),
        ),
        ("oauth_timestamp".to_string(), timestamp.to_string()),
        ("oauth_version".to_string(), VERSION.to_string()),
    ]
}

/// Fresh random nonce, 32 lowercase hex characters.
#[must_use]
pub fn nonce() -> String {
    use std::fmt::Write;

    let bytes: [u8; 16] = rand::rng().random();
    bytes
        .iter()
        .fold(String::with_capacity(32), |mut acc: String, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

/// Seconds since the Unix epoch.
#[must_use]
pub fn timestamp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn photos_params() -> Params {
        params(&[
            ("file", "vacation.jpg"),
            ("size", "original"),
            ("oauth_consumer_key", "dpf43f3p2l4k3l03"),
            ("oauth_token", "nnch734d00sl2jdk"),
            ("oauth_nonce", "kllo9940pd9333jh"),
            ("oauth_timestamp", "1191242096"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_version", "1.0"),
        ])
    }

    #[test]
    fn test_percent_encode_unreserved() {
        assert_eq!(percent_encode("abc-._~XYZ09"), "abc-._~XYZ09");
        assert_eq!(percent_encode("a b&c=d/e:f"), "a%20b%26c%3Dd%2Fe%3Af");
        assert_eq!(percent_encode("+"), "%2B");
    }

    #[test]
    fn test_known_signature_vector() {
        let sig = sign(
            "GET",
            "http://photos.example.net/photos",
            &photos_params(),
            "kd94hf93k423kf44",
            Some("pfkkdhi9sl3r4s00"),
        )
        .unwrap();
        assert_eq!(sig, "tR3+Ty81lMeYAr/Fid0kMTYa/WM=");
    }

    #[test]
    fn test_base_string_layout() {
        let base = base_string("GET", "http://photos.example.net/photos", &photos_params())
            .unwrap();
        assert_eq!(
            base,
            "GET&http%3A%2F%2Fphotos.example.net%2Fphotos&file%3Dvacation.jpg\
             %26oauth_consumer_key%3Ddpf43f3p2l4k3l03%26oauth_nonce%3Dkllo9940pd9333jh\
             %26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1191242096\
             %26oauth_token%3Dnnch734d00sl2jdk%26oauth_version%3D1.0%26size%3Doriginal"
        );
    }

    #[test]
    fn test_empty_token_secret_vector() {
        // Request-token leg: no token secret yet, callback URL double-encoded.
        let p = params(&[
            ("method", "profile.get"),
            ("format", "json"),
            ("oauth_consumer_key", "ck"),
            ("oauth_nonce", "abc"),
            ("oauth_timestamp", "1700000000"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_version", "1.0"),
            ("oauth_callback", "http://localhost:8080/callback"),
        ]);
        let sig = sign(
            "GET",
            "https://authentication.fatsecret.com/oauth/request_token",
            &p,
            "cs",
            None,
        )
        .unwrap();
        assert_eq!(sig, "Gur/kh3/QKbeCGTDai59nql4F5c=");
    }

    #[test]
    fn test_signature_ignores_param_order() {
        let forward = photos_params();
        let mut reversed = forward.clone();
        reversed.reverse();
        let url = "http://photos.example.net/photos";

        let a = sign("GET", url, &forward, "cs", Some("ts")).unwrap();
        let b = sign("GET", url, &reversed, "cs", Some("ts")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_existing_signature_not_signed() {
        let url = "http://photos.example.net/photos";
        let plain = photos_params();
        let mut with_sig = plain.clone();
        with_sig.push(("oauth_signature".to_string(), "stale".to_string()));

        assert_eq!(
            sign("GET", url, &plain, "cs", None).unwrap(),
            sign("GET", url, &with_sig, "cs", None).unwrap()
        );
    }

    #[test]
    fn test_sign_rejects_bad_input() {
        assert!(matches!(
            sign("", "https://example.com", &[], "cs", None),
            Err(Error::Signature(_))
        ));
        assert!(matches!(
            sign("GET", "example.com/path", &[], "cs", None),
            Err(Error::Signature(_))
        ));
    }

    #[test]
    fn test_nonce_shape() {
        let a = nonce();
        let b = nonce();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_protocol_params() {
        let p = protocol_params("key", "n", 42);
        assert!(p.contains(&("oauth_signature_method".to_string(), "HMAC-SHA1".to_string())));
        assert!(p.contains(&("oauth_timestamp".to_string(), "42".to_string())));
        assert!(p.contains(&("oauth_version".to_string(), "1.0".to_string())));
    }
}
