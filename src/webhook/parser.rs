//! Event Parsing
//!
//! Turns a raw webhook body into a [`WebhookEvent`]. Verification always runs
//! first; a body from an unauthenticated sender is never decoded.

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::config::WebhookConfig;
use crate::error::{FormatError, Result, VerificationError};
use crate::webhook::events::{resource_type_of, WebhookEvent};
use crate::webhook::signature::{SignatureHeaders, SignatureInfo};

const RESOURCE_TYPE_KEYS: [&str; 2] = ["resourceType", "resource_type"];
const CREATED_KEYS: [&str; 3] = ["createdOn", "created_on", "created"];

/// Decode a body without any signature check.
///
/// # Security
///
/// This bypasses authentication. Use it only for local development or when
/// the transport has already authenticated the sender (e.g. mutual TLS).
#[instrument(level = "debug", skip_all, fields(body_len = body.len()))]
pub fn parse_unverified(body: &[u8]) -> std::result::Result<WebhookEvent, FormatError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| FormatError::InvalidJson(e.to_string()))?;
    let Value::Object(data) = value else {
        return Err(FormatError::NotAnObject);
    };

    let event_type = extract_type(&data).ok_or(FormatError::MissingEventType)?;
    let id = extract_id(&data).unwrap_or_default();
    let resource_type = first_scalar(&data, &RESOURCE_TYPE_KEYS)
        .unwrap_or_else(|| resource_type_of(&event_type).to_string());
    let created_on = first_scalar(&data, &CREATED_KEYS);
    let mode = first_scalar(&data, &["mode"]);

    debug!(event_id = %id, event_type = %event_type, keys = data.len(), "Webhook body decoded");

    Ok(WebhookEvent {
        id,
        event_type,
        resource_type,
        created_on,
        mode,
        data,
        raw: body.to_vec(),
        signature: None,
    })
}

/// Verify (unless `config.skip_verification`) and decode a webhook body.
///
/// The returned event carries its [`SignatureInfo`] when verified.
///
/// # Errors
///
/// - [`VerificationError`] when verification is required and fails, including
///   [`VerificationError::MissingSecret`] when no secret is configured
/// - [`FormatError`] when the body is not a JSON object with an event type
pub fn parse_event<H>(body: &[u8], headers: &H, config: &WebhookConfig) -> Result<WebhookEvent>
where
    H: SignatureHeaders + ?Sized,
{
    verify_and_parse(body, headers, config).map(|(_, event)| event)
}

/// Verify the signature, then parse. Short-circuits on verification failure.
///
/// Returns the verification details separately as well, `None` when
/// verification was skipped by configuration.
#[instrument(level = "debug", skip_all, fields(body_len = body.len(), skip = config.skip_verification))]
pub fn verify_and_parse<H>(
    body: &[u8],
    headers: &H,
    config: &WebhookConfig,
) -> Result<(Option<SignatureInfo>, WebhookEvent)>
where
    H: SignatureHeaders + ?Sized,
{
    if config.skip_verification {
        warn!("Webhook signature verification skipped by configuration");
        return Ok((None, parse_unverified(body)?));
    }

    let verifier = config.verifier().ok_or(VerificationError::MissingSecret)?;
    let info = verifier.verify(body, headers)?;

    let mut event = parse_unverified(body)?;
    event.signature = Some(info.clone());
    Ok((Some(info), event))
}

fn non_empty_str(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        other => non_empty_str(other),
    }
}

fn first_scalar(data: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| data.get(*key).and_then(scalar))
}

fn extract_type(data: &Map<String, Value>) -> Option<String> {
    if let Some(event_type) = data.get("type").and_then(non_empty_str) {
        return Some(event_type);
    }
    let nested = match data.get("event") {
        Some(Value::Object(event)) => event.get("type").and_then(non_empty_str),
        Some(other) => non_empty_str(other),
        None => None,
    };
    nested.or_else(|| data.get("event_type").and_then(non_empty_str))
}

fn extract_id(data: &Map<String, Value>) -> Option<String> {
    if let Some(id) = data.get("id").and_then(scalar) {
        return Some(id);
    }
    if let Some(Value::Object(event)) = data.get("event") {
        if let Some(id) = event.get("id").and_then(scalar) {
            return Some(id);
        }
    }
    data.get("event_id").and_then(scalar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::signature::{sign_payload, SignatureScheme};
    use crate::Error;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const BODY: &[u8] = br#"{"type":"charge.successful","id":"evt_1"}"#;

    #[test]
    fn test_parse_basic_event() {
        let event = parse_unverified(BODY).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, "charge.successful");
        assert_eq!(event.resource_type, "charge");
        assert_eq!(event.raw, BODY.to_vec());
        assert!(event.signature.is_none());
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        let body = json!({
            "type": "subscription.created",
            "id": "evt_2",
            "brandNewField": {"nested": [1, 2, 3]},
            "createdOn": "2024-01-01T00:00:00Z",
            "mode": "live",
        });
        let event = parse_unverified(body.to_string().as_bytes()).unwrap();

        assert_eq!(Value::Object(event.data.clone()), body);
        assert_eq!(event.created_on.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(event.mode.as_deref(), Some("live"));
        assert!(event.is_live());
    }

    #[test]
    fn test_type_fallbacks() {
        let cases = [
            (json!({"event": "charge.failed"}), "charge.failed"),
            (json!({"event": {"type": "token.created", "id": "evt_n"}}), "token.created"),
            (json!({"event_type": "refund.created"}), "refund.created"),
            (json!({"type": "", "event_type": "refund.updated"}), "refund.updated"),
            (json!({"type": "customer.created", "event": "ignored"}), "customer.created"),
        ];
        for (body, expected) in cases {
            let event = parse_unverified(body.to_string().as_bytes()).unwrap();
            assert_eq!(event.event_type, expected, "body {body}");
        }
    }

    #[test]
    fn test_id_fallbacks() {
        let nested = parse_unverified(br#"{"event":{"type":"a.b","id":"evt_n"}}"#).unwrap();
        assert_eq!(nested.id, "evt_n");

        let alias = parse_unverified(br#"{"type":"a.b","event_id":"evt_a"}"#).unwrap();
        assert_eq!(alias.id, "evt_a");

        let numeric = parse_unverified(br#"{"type":"a.b","id":42}"#).unwrap();
        assert_eq!(numeric.id, "42");

        let missing = parse_unverified(br#"{"type":"a.b"}"#).unwrap();
        assert_eq!(missing.id, "");
        assert!(!missing.has_id());
    }

    #[test]
    fn test_explicit_resource_type_wins() {
        let event =
            parse_unverified(br#"{"type":"charge_finished","resourceType":"charge"}"#).unwrap();
        assert_eq!(event.resource_type, "charge");

        let derived = parse_unverified(br#"{"type":"ping"}"#).unwrap();
        assert_eq!(derived.resource_type, "ping");
    }

    #[test]
    fn test_format_errors() {
        assert!(matches!(parse_unverified(b"not json"), Err(FormatError::InvalidJson(_))));
        assert!(matches!(parse_unverified(b""), Err(FormatError::InvalidJson(_))));
        assert_eq!(parse_unverified(b"[1,2]"), Err(FormatError::NotAnObject));
        assert_eq!(parse_unverified(br#"{"id":"evt"}"#), Err(FormatError::MissingEventType));
        assert!(matches!(parse_unverified(b"{\"type\":\"\xff\"}"), Err(FormatError::InvalidJson(_))));
    }

    #[test]
    fn test_skip_verification_needs_no_secret() {
        let config = WebhookConfig::default().with_skip_verification(true);
        let headers: Vec<(String, String)> = Vec::new();
        let event = parse_event(BODY, &headers, &config).unwrap();
        assert_eq!(event.event_type, "charge.successful");
        assert!(!event.is_verified());
    }

    #[test]
    fn test_verified_event_carries_signature() {
        let config = WebhookConfig::test_config();
        let value = sign_payload("whsec_test", BODY, SignatureScheme::Timestamped, None);
        let headers = [("X-Univapay-Signature", value.as_str())];

        let (info, event) = verify_and_parse(BODY, &headers, &config).unwrap();
        let info = info.unwrap();
        assert_eq!(info.scheme(), SignatureScheme::Timestamped);
        assert_eq!(event.signature.as_ref(), Some(&info));
        assert!(event.is_verified());
    }

    #[test]
    fn test_missing_secret_is_verification_error() {
        let headers = [("X-Signature", "abcd")];
        let err = parse_event(BODY, &headers, &WebhookConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Verification(VerificationError::MissingSecret)));
    }

    #[test]
    fn test_verification_runs_before_decoding() {
        let headers = [("X-Signature", "sha256=00")];
        let err = parse_event(b"not json", &headers, &WebhookConfig::test_config()).unwrap_err();
        assert!(matches!(
            err,
            Error::Verification(VerificationError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_json_rejected_even_when_skipping() {
        let config = WebhookConfig::default().with_skip_verification(true);
        let headers: [(&str, &str); 0] = [];
        let err = parse_event(b"not json", &headers, &config).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::InvalidJson(_))));
    }
}
