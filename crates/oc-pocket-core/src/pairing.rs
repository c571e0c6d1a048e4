//! Pairing string codec.
//!
//! A pairing string carries the server base URL and bearer token out of band
//! (usually as a QR code):
//!
//! ```text
//! oc-pocket-pair:v1:<base64url-no-padding(json)>
//! ```

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use thiserror::Error;

/// Version marker every supported pairing string starts with.
pub const PAIRING_PREFIX: &str = "oc-pocket-pair:v1:";

/// Payload version implied by [`PAIRING_PREFIX`].
pub const SUPPORTED_VERSION: u32 = 1;

/// Pairing failure, surfaced to the pairing UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    #[error("invalid pairing string: {0}")]
    InvalidFormat(String),
    #[error("unsupported pairing version: {0}")]
    UnsupportedVersion(String),
    #[error("invalid pairing string (missing {0})")]
    MissingFields(&'static str),
}

impl PairingError {
    /// Corrective message naming the failure category.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidFormat(_) => {
                "This is not an oc-pocket pairing code. Scan the code shown by `oc-pocket pair` again."
            }
            Self::UnsupportedVersion(_) => {
                "This pairing code uses an unsupported version. Update the app or the companion and pair again."
            }
            Self::MissingFields(_) => {
                "This pairing code is incomplete (server address or token missing). Generate a new code."
            }
        }
    }
}

/// Decoded pairing payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingPayload {
    pub version: u32,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// Any JSON number is accepted as a version so that out-of-range values
// are reported as unsupported rather than malformed.
#[derive(Deserialize)]
struct PairingWire {
    #[serde(default)]
    version: Option<Number>,
    #[serde(rename = "baseUrl", default)]
    base_url: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    name: Option<String>,
}

impl PairingPayload {
    /// Create a version-1 payload.
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, name: Option<String>) -> Self {
        Self {
            version: SUPPORTED_VERSION,
            base_url: base_url.into(),
            token: token.into(),
            name,
        }
    }

    /// Encode into a pairing string.
    ///
    /// # Errors
    /// Returns error if the version is not supported or a required field is blank.
    pub fn encode(&self) -> Result<String, PairingError> {
        if self.version != SUPPORTED_VERSION {
            return Err(PairingError::UnsupportedVersion(self.version.to_string()));
        }
        self.check_required()?;

        let json = serde_json::to_vec(self)
            .map_err(|e| PairingError::InvalidFormat(format!("unencodable payload: {e}")))?;
        Ok(format!("{PAIRING_PREFIX}{}", BASE64URL.encode(json)))
    }

    /// Decode a pairing string.
    ///
    /// Never panics: every failure maps to a [`PairingError`].
    ///
    /// # Errors
    /// Returns error if the prefix, encoding, version or required fields are invalid.
    pub fn decode(raw: &str) -> Result<Self, PairingError> {
        let encoded = raw
            .trim()
            .strip_prefix(PAIRING_PREFIX)
            .ok_or_else(|| PairingError::InvalidFormat("missing oc-pocket-pair:v1: prefix".into()))?
            .trim();
        if encoded.is_empty() {
            return Err(PairingError::InvalidFormat("missing payload".into()));
        }

        let bytes = BASE64URL
            .decode(to_url_safe_unpadded(encoded))
            .map_err(|e| PairingError::InvalidFormat(format!("payload is not base64url: {e}")))?;

        let parsed: PairingWire = serde_json::from_slice(&bytes)
            .map_err(|e| PairingError::InvalidFormat(format!("payload is not valid JSON: {e}")))?;

        match &parsed.version {
            Some(v) if v.as_u64() == Some(u64::from(SUPPORTED_VERSION)) => {}
            Some(v) => return Err(PairingError::UnsupportedVersion(v.to_string())),
            None => return Err(PairingError::UnsupportedVersion("missing".into())),
        }

        let payload = Self {
            version: SUPPORTED_VERSION,
            base_url: parsed.base_url.trim().trim_end_matches('/').to_string(),
            token: parsed.token.trim().to_string(),
            name: parsed
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        };
        payload.check_required()?;
        Ok(payload)
    }

    fn check_required(&self) -> Result<(), PairingError> {
        if self.base_url.trim().is_empty() {
            return Err(PairingError::MissingFields("baseUrl"));
        }
        if self.token.trim().is_empty() {
            return Err(PairingError::MissingFields("token"));
        }
        Ok(())
    }
}

/// Decode a pairing string scanned or pasted by the user.
///
/// # Errors
/// See [`PairingPayload::decode`].
pub fn decode_pairing_code(raw: &str) -> Result<PairingPayload, PairingError> {
    PairingPayload::decode(raw)
}

// Accept standard-alphabet and padded input as well.
fn to_url_safe_unpadded(encoded: &str) -> String {
    encoded
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairing_string(json: &str) -> String {
        format!("{PAIRING_PREFIX}{}", BASE64URL.encode(json))
    }

    #[test]
    fn test_decode_valid_string() {
        let raw = pairing_string(
            r#"{"version":1,"baseUrl":"http://127.0.0.1:4096","token":"abc","name":"My Mac"}"#,
        );

        let decoded = PairingPayload::decode(&raw).unwrap();
        assert_eq!(decoded.version, 1);
        assert_eq!(decoded.base_url, "http://127.0.0.1:4096");
        assert_eq!(decoded.token, "abc");
        assert_eq!(decoded.name.as_deref(), Some("My Mac"));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let payload = PairingPayload::new("https://mac.tail1234.ts.net", "s3cr3t-token", None);
        let encoded = payload.encode().unwrap();

        assert!(encoded.starts_with(PAIRING_PREFIX));
        assert!(!encoded.ends_with('='));
        assert_eq!(PairingPayload::decode(&encoded).unwrap(), payload);

        let named = PairingPayload::new("http://10.0.0.2:4096", "t", Some("Studio".into()));
        assert_eq!(decode_pairing_code(&named.encode().unwrap()).unwrap(), named);
    }

    #[test]
    fn test_decode_trims_and_normalizes() {
        let raw = pairing_string(
            r#"{"version":1,"baseUrl":" http://127.0.0.1:4096/ ","token":" abc ","name":"  "}"#,
        );

        let decoded = PairingPayload::decode(&format!("  {raw}\n")).unwrap();
        assert_eq!(decoded.base_url, "http://127.0.0.1:4096");
        assert_eq!(decoded.token, "abc");
        assert_eq!(decoded.name, None);
    }

    #[test]
    fn test_decode_accepts_padded_standard_alphabet() {
        use base64::engine::general_purpose::STANDARD;
        let json = r#"{"version":1,"baseUrl":"http://h/?a=b>","token":"x~y","name":null}"#;
        let raw = format!("{PAIRING_PREFIX}{}", STANDARD.encode(json));

        let decoded = PairingPayload::decode(&raw).unwrap();
        assert_eq!(decoded.token, "x~y");
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let raw = pairing_string(
            r#"{"version":1,"baseUrl":"http://h","token":"t","createdAtMs":1700000000000,"extra":{"a":1}}"#,
        );
        assert!(PairingPayload::decode(&raw).is_ok());
    }

    #[test]
    fn test_decode_rejects_invalid_prefix() {
        for raw in [
            "not-a-pairing-string",
            "",
            "oc-pocket-pair:v2:eyJ9",
            "OC-POCKET-PAIR:V1:eyJ9",
            "xoc-pocket-pair:v1:eyJ9",
        ] {
            assert!(
                matches!(PairingPayload::decode(raw), Err(PairingError::InvalidFormat(_))),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_garbage_payloads() {
        for raw in [
            "oc-pocket-pair:v1:",
            "oc-pocket-pair:v1:   ",
            "oc-pocket-pair:v1:!!!not base64!!!",
            "oc-pocket-pair:v1:\u{1F600}",
        ] {
            assert!(matches!(
                PairingPayload::decode(raw),
                Err(PairingError::InvalidFormat(_))
            ));
        }

        let not_json = format!("{PAIRING_PREFIX}{}", BASE64URL.encode([0xff, 0xfe, 0x00]));
        assert!(matches!(
            PairingPayload::decode(&not_json),
            Err(PairingError::InvalidFormat(_))
        ));

        let wrong_types = pairing_string(r#"{"version":"1","baseUrl":5,"token":[]}"#);
        assert!(matches!(
            PairingPayload::decode(&wrong_types),
            Err(PairingError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let raw = pairing_string(r#"{"version":1,"baseUrl":"","token":"","name":"x"}"#);
        assert_eq!(
            PairingPayload::decode(&raw),
            Err(PairingError::MissingFields("baseUrl"))
        );

        let raw = pairing_string(r#"{"version":1,"baseUrl":"http://h","token":"   "}"#);
        assert_eq!(
            PairingPayload::decode(&raw),
            Err(PairingError::MissingFields("token"))
        );

        let raw = pairing_string(r#"{"version":1,"token":"t"}"#);
        assert_eq!(
            PairingPayload::decode(&raw),
            Err(PairingError::MissingFields("baseUrl"))
        );
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let raw = pairing_string(
            r#"{"version":2,"baseUrl":"http://127.0.0.1:4096","token":"abc","name":"x"}"#,
        );

        let err = PairingPayload::decode(&raw).unwrap_err();
        assert_eq!(err, PairingError::UnsupportedVersion("2".into()));
        assert!(err.to_string().to_lowercase().contains("version"));
    }

    #[test]
    fn test_decode_out_of_range_version_is_unsupported() {
        for version in ["-1", "0", "4294967297", "18446744073709551616", "1.5", "1e3", "null"] {
            let raw = pairing_string(&format!(
                r#"{{"version":{version},"baseUrl":"http://h","token":"t"}}"#
            ));
            let err = PairingPayload::decode(&raw).unwrap_err();
            assert!(
                matches!(err, PairingError::UnsupportedVersion(_)),
                "version {version} gave {err:?}"
            );
            assert!(err.to_string().contains("version"));
        }

        let missing = pairing_string(r#"{"baseUrl":"http://h","token":"t"}"#);
        assert_eq!(
            PairingPayload::decode(&missing),
            Err(PairingError::UnsupportedVersion("missing".into()))
        );
    }

    #[test]
    fn test_encode_validates() {
        let blank = PairingPayload::new(" ", "t", None);
        assert_eq!(blank.encode(), Err(PairingError::MissingFields("baseUrl")));

        let mut future = PairingPayload::new("http://h", "t", None);
        future.version = 3;
        assert_eq!(future.encode(), Err(PairingError::UnsupportedVersion("3".into())));
    }

    #[test]
    fn test_user_messages_name_category() {
        assert!(PairingError::UnsupportedVersion("9".into()).user_message().contains("version"));
        assert!(PairingError::MissingFields("token").user_message().contains("token"));
        assert!(PairingError::InvalidFormat(String::new()).user_message().contains("pairing code"));
    }
}
