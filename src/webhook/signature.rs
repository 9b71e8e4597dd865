//! Webhook Signature Verification
//!
//! Locates a recognized signature header, decodes its value into one of the
//! supported schemes, recomputes the HMAC over the raw body and compares in
//! constant time.
//!
//! # Supported header values
//!
//! ```text
//! t=<unix seconds>,v1=<hex>[,v1=<hex>...]   HMAC-SHA256 over "<t>.<body>", freshness checked
//! sha256=<hex>                              HMAC-SHA256 over the body
//! sha1=<hex>                                HMAC-SHA1 over the body
//! <hex>                                     HMAC-SHA256 over the body
//! ```
//!
//! The prefixed and bare-hex schemes carry no timestamp and are therefore
//! replayable; prefer the timestamped form when the sender supports it.
//!
//! Verification must run over the exact bytes received. Re-serializing a
//! decoded JSON body changes whitespace and key order and invalidates the
//! signature.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::BuildHasher;
use std::str::FromStr;

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument};

use crate::error::VerificationError;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Header names probed, in precedence order, when no override is given
pub const SIGNATURE_HEADERS: [&str; 5] = [
    "X-Univapay-Signature",
    "X-Univapay-Webhook-Signature",
    "X-Signature",
    "X-Hub-Signature-256",
    "X-Hub-Signature",
];

/// Default freshness window for timestamped signatures (5 minutes)
pub const DEFAULT_TOLERANCE_SECS: i64 = 5 * 60;

/// Separator between timestamp and body in the timestamped signed message
const TIMESTAMP_SEPARATOR: &[u8] = b".";

// =============================================================================
// Header access
// =============================================================================

/// Case-insensitive read access to request headers.
///
/// Implemented for `http::HeaderMap` and for plain string maps and pair lists,
/// so the verifier works with whatever the web framework hands over.
pub trait SignatureHeaders {
    /// Value of `name`, compared case-insensitively
    fn header(&self, name: &str) -> Option<&str>;
}

impl SignatureHeaders for http::HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|value| value.to_str().ok())
    }
}

impl<K, V, S> SignatureHeaders for HashMap<K, V, S>
where
    K: AsRef<str>,
    V: AsRef<str>,
    S: BuildHasher,
{
    fn header(&self, name: &str) -> Option<&str> {
        find_pair(self.iter(), name)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> SignatureHeaders for BTreeMap<K, V> {
    fn header(&self, name: &str) -> Option<&str> {
        find_pair(self.iter(), name)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> SignatureHeaders for [(K, V)] {
    fn header(&self, name: &str) -> Option<&str> {
        find_pair(self.iter().map(|(k, v)| (k, v)), name)
    }
}

impl<K: AsRef<str>, V: AsRef<str>, const N: usize> SignatureHeaders for [(K, V); N] {
    fn header(&self, name: &str) -> Option<&str> {
        self.as_slice().header(name)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> SignatureHeaders for Vec<(K, V)> {
    fn header(&self, name: &str) -> Option<&str> {
        self.as_slice().header(name)
    }
}

fn find_pair<'a, K, V, I>(pairs: I, name: &str) -> Option<&'a str>
where
    K: AsRef<str> + 'a,
    V: AsRef<str> + 'a,
    I: Iterator<Item = (&'a K, &'a V)>,
{
    pairs
        .into_iter()
        .find(|(k, _)| k.as_ref().eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_ref())
}

// =============================================================================
// Schemes
// =============================================================================

/// Signature scheme found in a header value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureScheme {
    /// `t=<int>,v1=<hex>` over `"<t>.<body>"`
    #[serde(rename = "timestamped")]
    Timestamped,
    /// `sha256=<hex>` over the body
    #[serde(rename = "sha256")]
    Sha256,
    /// `sha1=<hex>` over the body
    #[serde(rename = "sha1")]
    Sha1,
    /// Bare hex HMAC-SHA256 over the body
    #[serde(rename = "raw-hex")]
    RawHex,
}

impl SignatureScheme {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timestamped => "timestamped",
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
            Self::RawHex => "raw-hex",
        }
    }

    /// Whether the scheme binds a timestamp and so resists replay
    pub fn is_timestamped(&self) -> bool {
        matches!(self, Self::Timestamped)
    }

    fn uses_sha1(&self) -> bool {
        matches!(self, Self::Sha1)
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamped" | "t" => Ok(Self::Timestamped),
            "sha256" => Ok(Self::Sha256),
            "sha1" => Ok(Self::Sha1),
            "raw-hex" | "raw" | "hex" => Ok(Self::RawHex),
            other => Err(format!("unknown signature scheme: {other}")),
        }
    }
}

/// Decoded header value
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParsedSignature {
    Timestamped {
        /// Timestamp exactly as sent; it is part of the signed message
        raw_timestamp: String,
        timestamp: i64,
        candidates: Vec<String>,
    },
    Prefixed {
        scheme: SignatureScheme,
        digest: String,
    },
    RawHex(String),
}

fn parse_signature_value(header: &str, value: &str) -> Result<ParsedSignature, VerificationError> {
    let unrecognized = |reason: &str| VerificationError::UnrecognizedScheme {
        header: header.to_string(),
        reason: reason.to_string(),
    };

    let pairs: Vec<(String, &str)> = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim()))
        .collect();

    if pairs.is_empty() {
        let raw = value.trim();
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(ParsedSignature::RawHex(raw.to_string()));
        }
        return Err(unrecognized("value is neither key=value pairs nor a hex digest"));
    }

    let first = |key: &str| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| *v);
    let candidates: Vec<String> = pairs
        .iter()
        .filter(|(k, _)| k == "v1")
        .map(|(_, v)| (*v).to_string())
        .collect();

    if let Some(raw_timestamp) = first("t").filter(|_| !candidates.is_empty()) {
        let timestamp = raw_timestamp
            .parse::<i64>()
            .map_err(|_| unrecognized("timestamp is not an integer"))?;
        return Ok(ParsedSignature::Timestamped {
            raw_timestamp: raw_timestamp.to_string(),
            timestamp,
            candidates,
        });
    }

    if let Some(digest) = first("sha256") {
        return Ok(ParsedSignature::Prefixed {
            scheme: SignatureScheme::Sha256,
            digest: digest.to_string(),
        });
    }

    if let Some(digest) = first("sha1") {
        return Ok(ParsedSignature::Prefixed {
            scheme: SignatureScheme::Sha1,
            digest: digest.to_string(),
        });
    }

    Err(unrecognized("expected t=/v1=, sha256= or sha1="))
}

// =============================================================================
// Digests
// =============================================================================

fn mac_digest<M: Mac + KeyInit>(secret: &[u8], chunks: &[&[u8]]) -> Vec<u8> {
    let mut mac =
        <M as KeyInit>::new_from_slice(secret).expect("HMAC accepts keys of any length");
    for chunk in chunks {
        mac.update(chunk);
    }
    mac.finalize().into_bytes().to_vec()
}

fn compute_digest(scheme: SignatureScheme, secret: &[u8], chunks: &[&[u8]]) -> Vec<u8> {
    if scheme.uses_sha1() {
        mac_digest::<HmacSha1>(secret, chunks)
    } else {
        mac_digest::<HmacSha256>(secret, chunks)
    }
}

/// Constant-time comparison of a computed digest against provided hex.
///
/// Hex that does not decode counts as a mismatch. `subtle` keeps the byte
/// comparison free of data-dependent branches.
fn digest_matches(expected: &[u8], provided_hex: &str) -> bool {
    match hex::decode(provided_hex.trim()) {
        Ok(provided) => expected.ct_eq(&provided).into(),
        Err(_) => false,
    }
}

/// Produce a signature header value for `payload`.
///
/// `timestamp` is only used by [`SignatureScheme::Timestamped`]; when `None`
/// the current time is used.
///
/// ```rust
/// use univapay_webhooks::webhook::signature::{sign_payload, SignatureScheme};
///
/// let value = sign_payload("whsec_test", b"{}", SignatureScheme::Sha256, None);
/// assert!(value.starts_with("sha256="));
/// ```
pub fn sign_payload(
    secret: &str,
    payload: &[u8],
    scheme: SignatureScheme,
    timestamp: Option<i64>,
) -> String {
    let secret = secret.as_bytes();
    match scheme {
        SignatureScheme::Timestamped => {
            let t = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp()).to_string();
            let digest = compute_digest(scheme, secret, &[t.as_bytes(), TIMESTAMP_SEPARATOR, payload]);
            format!("t={t},v1={}", hex::encode(digest))
        }
        SignatureScheme::Sha256 | SignatureScheme::Sha1 => {
            let digest = compute_digest(scheme, secret, &[payload]);
            format!("{}={}", scheme.as_str(), hex::encode(digest))
        }
        SignatureScheme::RawHex => hex::encode(compute_digest(scheme, secret, &[payload])),
    }
}

// =============================================================================
// Verification result
// =============================================================================

/// Outcome of a successful verification, kept for logging and audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureInfo {
    header: String,
    scheme: SignatureScheme,
    timestamp: Option<i64>,
    computed_digest: String,
    provided_digest: String,
    verified: bool,
}

impl SignatureInfo {
    /// Header the signature was read from
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Scheme that verified
    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Timestamp embedded in the signature, if the scheme carries one
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Hex digest recomputed from the body
    pub fn computed_digest(&self) -> &str {
        &self.computed_digest
    }

    /// Hex digest supplied by the sender that matched
    pub fn provided_digest(&self) -> &str {
        &self.provided_digest
    }

    /// Whether the signature verified
    pub fn verified(&self) -> bool {
        self.verified
    }
}

// =============================================================================
// Verifier
// =============================================================================

/// Reusable verifier bound to one signing secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_s: i64,
    header_name: Option<String>,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"***")
            .field("tolerance_s", &self.tolerance_s)
            .field("header_name", &self.header_name)
            .finish()
    }
}

impl SignatureVerifier {
    /// Create a verifier with the default tolerance and header probing
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_s: DEFAULT_TOLERANCE_SECS,
            header_name: None,
        }
    }

    /// Set the freshness window.
    ///
    /// Zero or a negative value turns the freshness check off entirely,
    /// including for timestamped signatures. This is an explicit opt-out.
    pub fn with_tolerance(mut self, tolerance_s: i64) -> Self {
        self.tolerance_s = tolerance_s;
        self
    }

    /// Only consult `name` instead of probing [`SIGNATURE_HEADERS`]
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = Some(name.into());
        self
    }

    /// Configured tolerance in seconds
    pub fn tolerance_s(&self) -> i64 {
        self.tolerance_s
    }

    /// Verify against the current wall clock
    pub fn verify<H>(&self, payload: &[u8], headers: &H) -> Result<SignatureInfo, VerificationError>
    where
        H: SignatureHeaders + ?Sized,
    {
        self.verify_at(payload, headers, chrono::Utc::now().timestamp())
    }

    /// Verify with an explicit `now` (unix seconds)
    #[instrument(level = "debug", skip_all, fields(payload_len = payload.len()))]
    pub fn verify_at<H>(
        &self,
        payload: &[u8],
        headers: &H,
        now: i64,
    ) -> Result<SignatureInfo, VerificationError>
    where
        H: SignatureHeaders + ?Sized,
    {
        if self.secret.is_empty() {
            return Err(VerificationError::MissingSecret);
        }

        let (header, value) = self.locate_header(headers)?;
        debug!(header = %header, value_len = value.len(), "Signature header found");

        let parsed = parse_signature_value(&header, value)?;
        let secret = self.secret.as_bytes();

        let info = match parsed {
            ParsedSignature::Timestamped {
                raw_timestamp,
                timestamp,
                candidates,
            } => {
                let scheme = SignatureScheme::Timestamped;
                let computed = compute_digest(
                    scheme,
                    secret,
                    &[raw_timestamp.as_bytes(), TIMESTAMP_SEPARATOR, payload],
                );

                // Every candidate is compared; no early exit on the first match.
                let mut matched: Option<String> = None;
                for candidate in candidates {
                    if digest_matches(&computed, &candidate) && matched.is_none() {
                        matched = Some(candidate);
                    }
                }
                let provided = matched.ok_or_else(|| VerificationError::DigestMismatch {
                    header: header.clone(),
                    scheme,
                })?;

                if self.tolerance_s > 0 && now.abs_diff(timestamp) > self.tolerance_s.unsigned_abs() {
                    debug!(header = %header, timestamp, now, "Signature timestamp out of tolerance");
                    return Err(VerificationError::TimestampOutOfTolerance {
                        header,
                        timestamp,
                        now,
                        tolerance_s: self.tolerance_s,
                    });
                }

                SignatureInfo {
                    header,
                    scheme,
                    timestamp: Some(timestamp),
                    computed_digest: hex::encode(computed),
                    provided_digest: provided,
                    verified: true,
                }
            }
            ParsedSignature::Prefixed { scheme, digest } => {
                self.check_body_digest(header, scheme, payload, digest)?
            }
            ParsedSignature::RawHex(digest) => {
                self.check_body_digest(header, SignatureScheme::RawHex, payload, digest)?
            }
        };

        debug!(header = %info.header, scheme = %info.scheme, "Signature verified");
        Ok(info)
    }

    fn check_body_digest(
        &self,
        header: String,
        scheme: SignatureScheme,
        payload: &[u8],
        provided: String,
    ) -> Result<SignatureInfo, VerificationError> {
        let computed = compute_digest(scheme, self.secret.as_bytes(), &[payload]);
        if !digest_matches(&computed, &provided) {
            return Err(VerificationError::DigestMismatch { header, scheme });
        }
        Ok(SignatureInfo {
            header,
            scheme,
            timestamp: None,
            computed_digest: hex::encode(computed),
            provided_digest: provided,
            verified: true,
        })
    }

    fn locate_header<'h, H>(&self, headers: &'h H) -> Result<(String, &'h str), VerificationError>
    where
        H: SignatureHeaders + ?Sized,
    {
        let present = |name: &str| headers.header(name).filter(|v| !v.trim().is_empty());

        if let Some(name) = &self.header_name {
            return present(name)
                .map(|value| (name.clone(), value))
                .ok_or_else(|| VerificationError::NoSignatureHeader {
                    header: Some(name.clone()),
                });
        }

        SIGNATURE_HEADERS
            .iter()
            .find_map(|name| present(name).map(|value| ((*name).to_string(), value)))
            .ok_or(VerificationError::NoSignatureHeader { header: None })
    }
}

/// Verify `payload` against the signature found in `headers`.
///
/// Convenience wrapper around [`SignatureVerifier`] using the current time.
pub fn verify_signature<H>(
    payload: &[u8],
    headers: &H,
    secret: &str,
    tolerance_s: i64,
    header_name: Option<&str>,
) -> Result<SignatureInfo, VerificationError>
where
    H: SignatureHeaders + ?Sized,
{
    let mut verifier = SignatureVerifier::new(secret).with_tolerance(tolerance_s);
    if let Some(name) = header_name {
        verifier = verifier.with_header_name(name);
    }
    verifier.verify(payload, headers)
}
