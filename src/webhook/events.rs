//! Univapay Event Types
//!
//! The permissive [`WebhookEvent`] envelope plus a catalogue of the event
//! names the SDK knows about. Unknown event names are still delivered; they
//! just map to [`EventKind::Unknown`].

use std::borrow::Cow;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FormatError;
use crate::webhook::signature::SignatureInfo;

/// Separator between segments of an event name (`charge.successful`)
pub const EVENT_TYPE_SEPARATOR: char = '.';

/// Pattern matching every event in the router
pub const WILDCARD: &str = "*";

/// Event names published by Univapay
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    // Charge events
    #[serde(rename = "charge.created")]
    ChargeCreated,
    #[serde(rename = "charge.authorized")]
    ChargeAuthorized,
    #[serde(rename = "charge.captured")]
    ChargeCaptured,
    #[serde(rename = "charge.successful")]
    ChargeSuccessful,
    #[serde(rename = "charge.failed")]
    ChargeFailed,
    #[serde(rename = "charge.refunded")]
    ChargeRefunded,
    #[serde(rename = "charge.cancelled")]
    ChargeCancelled,

    // Subscription events
    #[serde(rename = "subscription.created")]
    SubscriptionCreated,
    #[serde(rename = "subscription.updated")]
    SubscriptionUpdated,
    #[serde(rename = "subscription.suspended")]
    SubscriptionSuspended,
    #[serde(rename = "subscription.resumed")]
    SubscriptionResumed,
    #[serde(rename = "subscription.cancelled")]
    SubscriptionCancelled,
    #[serde(rename = "subscription.payment.succeeded")]
    SubscriptionPaymentSucceeded,
    #[serde(rename = "subscription.payment.failed")]
    SubscriptionPaymentFailed,

    // Token events
    #[serde(rename = "token.created")]
    TokenCreated,
    #[serde(rename = "token.used")]
    TokenUsed,
    #[serde(rename = "token.expired")]
    TokenExpired,

    // Customer events
    #[serde(rename = "customer.created")]
    CustomerCreated,
    #[serde(rename = "customer.updated")]
    CustomerUpdated,
    #[serde(rename = "customer.deleted")]
    CustomerDeleted,

    // Refund events
    #[serde(rename = "refund.created")]
    RefundCreated,
    #[serde(rename = "refund.updated")]
    RefundUpdated,

    // Catch-all for events we don't explicitly know
    #[serde(other)]
    Unknown,
}

impl EventKind {
    /// Every known kind, in catalogue order
    pub const ALL: [EventKind; 22] = [
        Self::ChargeCreated,
        Self::ChargeAuthorized,
        Self::ChargeCaptured,
        Self::ChargeSuccessful,
        Self::ChargeFailed,
        Self::ChargeRefunded,
        Self::ChargeCancelled,
        Self::SubscriptionCreated,
        Self::SubscriptionUpdated,
        Self::SubscriptionSuspended,
        Self::SubscriptionResumed,
        Self::SubscriptionCancelled,
        Self::SubscriptionPaymentSucceeded,
        Self::SubscriptionPaymentFailed,
        Self::TokenCreated,
        Self::TokenUsed,
        Self::TokenExpired,
        Self::CustomerCreated,
        Self::CustomerUpdated,
        Self::CustomerDeleted,
        Self::RefundCreated,
        Self::RefundUpdated,
    ];

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChargeCreated => "charge.created",
            Self::ChargeAuthorized => "charge.authorized",
            Self::ChargeCaptured => "charge.captured",
            Self::ChargeSuccessful => "charge.successful",
            Self::ChargeFailed => "charge.failed",
            Self::ChargeRefunded => "charge.refunded",
            Self::ChargeCancelled => "charge.cancelled",
            Self::SubscriptionCreated => "subscription.created",
            Self::SubscriptionUpdated => "subscription.updated",
            Self::SubscriptionSuspended => "subscription.suspended",
            Self::SubscriptionResumed => "subscription.resumed",
            Self::SubscriptionCancelled => "subscription.cancelled",
            Self::SubscriptionPaymentSucceeded => "subscription.payment.succeeded",
            Self::SubscriptionPaymentFailed => "subscription.payment.failed",
            Self::TokenCreated => "token.created",
            Self::TokenUsed => "token.used",
            Self::TokenExpired => "token.expired",
            Self::CustomerCreated => "customer.created",
            Self::CustomerUpdated => "customer.updated",
            Self::CustomerDeleted => "customer.deleted",
            Self::RefundCreated => "refund.created",
            Self::RefundUpdated => "refund.updated",
            Self::Unknown => "unknown",
        }
    }

    /// Check if this is a known event type
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Whether the resource this event describes has reached a state it will
    /// not leave without new external action.
    ///
    /// This is the single table for terminal semantics; match on it instead
    /// of comparing status strings.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ChargeSuccessful
                | Self::ChargeCaptured
                | Self::ChargeFailed
                | Self::ChargeRefunded
                | Self::ChargeCancelled
                | Self::SubscriptionCancelled
                | Self::TokenExpired
                | Self::CustomerDeleted
        )
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .unwrap_or(Self::Unknown))
    }
}

/// First segment of an event name, or the whole name when it has no separator
pub fn resource_type_of(event_type: &str) -> &str {
    event_type
        .split_once(EVENT_TYPE_SEPARATOR)
        .map_or(event_type, |(head, _)| head)
}

/// Generic Univapay webhook envelope.
///
/// `data` is the complete decoded body: unknown keys are kept, and the lifted
/// convenience fields (`id`, `type`, ...) are copies, never removals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEvent {
    /// Provider-assigned event id; empty when the body carried none
    pub id: String,

    /// Dot-separated event name, e.g. `charge.successful`
    #[serde(rename = "type")]
    pub event_type: String,

    /// Resource the event is about (`charge`, `subscription`, ...)
    pub resource_type: String,

    /// Creation time as sent by the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_on: Option<String>,

    /// `test` or `live`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Full decoded payload
    pub data: Map<String, Value>,

    /// Body exactly as received
    #[serde(skip)]
    pub raw: Vec<u8>,

    /// Verification details; `None` when verification was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureInfo>,
}

impl WebhookEvent {
    /// Get the typed event kind
    pub fn kind(&self) -> EventKind {
        // Infallible error type means this can never fail
        EventKind::from_str(&self.event_type).unwrap_or(EventKind::Unknown)
    }

    /// Whether the provider supplied an event id
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    /// Whether the event went through signature verification
    pub fn is_verified(&self) -> bool {
        self.signature.as_ref().is_some_and(SignatureInfo::verified)
    }

    /// Whether the event came from live mode
    pub fn is_live(&self) -> bool {
        self.mode.as_deref() == Some("live")
    }

    /// Top-level field of the payload
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Nested resource object (`data` key of the payload), if present
    pub fn object(&self) -> Option<&Value> {
        self.data.get("data")
    }

    /// Deserialize the nested resource object into a caller-defined type
    ///
    /// # Errors
    ///
    /// [`FormatError::MissingData`] when there is no `data` key,
    /// [`FormatError::DataMismatch`] when it does not fit `T`.
    pub fn object_as<T: DeserializeOwned>(&self) -> Result<T, FormatError> {
        let object = self.object().cloned().ok_or(FormatError::MissingData)?;
        serde_json::from_value(object).map_err(|e| FormatError::DataMismatch(e.to_string()))
    }

    /// Raw body as text, lossy for invalid UTF-8
    pub fn raw_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, data: Value) -> WebhookEvent {
        WebhookEvent {
            id: "evt_1".to_string(),
            event_type: event_type.to_string(),
            resource_type: resource_type_of(event_type).to_string(),
            created_on: None,
            mode: Some("test".to_string()),
            data: data.as_object().cloned().unwrap_or_default(),
            raw: Vec::new(),
            signature: None,
        }
    }

    #[test]
    fn test_event_kind_parsing() {
        assert_eq!(
            EventKind::from_str("charge.successful").unwrap(),
            EventKind::ChargeSuccessful
        );
        assert_eq!(
            EventKind::from_str("subscription.payment.failed").unwrap(),
            EventKind::SubscriptionPaymentFailed
        );
        assert_eq!(
            EventKind::from_str("unknown.event").unwrap(),
            EventKind::Unknown
        );
    }

    #[test]
    fn test_catalogue_round_trips_names() {
        for kind in EventKind::ALL {
            assert!(kind.is_known());
            assert_eq!(EventKind::from_str(kind.as_str()).unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_terminal_table() {
        assert!(EventKind::ChargeSuccessful.is_terminal());
        assert!(EventKind::SubscriptionCancelled.is_terminal());
        assert!(!EventKind::ChargeAuthorized.is_terminal());
        assert!(!EventKind::SubscriptionSuspended.is_terminal());
        assert!(!EventKind::Unknown.is_terminal());
    }

    #[test]
    fn test_unknown_deserializes_to_catch_all() {
        let kind: EventKind = serde_json::from_str("\"payout.created\"").unwrap();
        assert_eq!(kind, EventKind::Unknown);
    }

    #[test]
    fn test_resource_type_of() {
        assert_eq!(resource_type_of("charge.successful"), "charge");
        assert_eq!(resource_type_of("subscription.payment.failed"), "subscription");
        assert_eq!(resource_type_of("ping"), "ping");
        assert_eq!(resource_type_of(""), "");
    }

    #[test]
    fn test_object_as() {
        #[derive(Deserialize)]
        struct Charge {
            id: String,
            amount: u64,
        }

        let ev = event(
            "charge.successful",
            json!({"type": "charge.successful", "data": {"id": "ch_1", "amount": 1000, "extra": true}}),
        );
        let charge: Charge = ev.object_as().unwrap();
        assert_eq!(charge.id, "ch_1");
        assert_eq!(charge.amount, 1000);

        let bare = event("ping", json!({"type": "ping"}));
        assert_eq!(bare.object_as::<Charge>().err(), Some(FormatError::MissingData));

        let wrong = event("charge.failed", json!({"type": "charge.failed", "data": {"id": 7}}));
        assert!(matches!(
            wrong.object_as::<Charge>(),
            Err(FormatError::DataMismatch(_))
        ));
    }

    #[test]
    fn test_serialization_renames_type_and_skips_raw() {
        let mut ev = event("charge.created", json!({"type": "charge.created"}));
        ev.raw = b"secret-bytes".to_vec();
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "charge.created");
        assert_eq!(json["resource_type"], "charge");
        assert!(json.get("raw").is_none());
        assert!(json.get("signature").is_none());
        assert!(!ev.is_verified());
        assert!(!ev.is_live());
        assert_eq!(ev.kind(), EventKind::ChargeCreated);
    }
}
