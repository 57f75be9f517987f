//! Stripe webhook signature verification (§4.8 step 2).
//!
//! Mirrors the official `stripe` SDK's `Webhook.construct_event`: an
//! HMAC-SHA256 over `"{timestamp}.{payload}"` keyed by the webhook
//! secret, checked against every `v1=` scheme in the `stripe-signature`
//! header within a tolerance window of the header's `t=` timestamp.
//! Reimplemented directly here (rather than pulling in the `stripe`
//! crate) since this core only needs the signature check, not the full
//! Stripe API client.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

/// Stripe tolerates up to 5 minutes of clock drift by default.
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
	#[error("missing stripe-signature header")]
	MissingHeader,
	#[error("malformed stripe-signature header")]
	Malformed,
	#[error("signature timestamp outside tolerance window")]
	Stale,
	#[error("signature does not match any v1 scheme")]
	Mismatch,
}

struct ParsedHeader {
	timestamp: i64,
	v1_signatures: Vec<String>,
}

fn parse_header(header: &str) -> Result<ParsedHeader, SignatureError> {
	let mut timestamp: Option<i64> = None;
	let mut v1_signatures = Vec::new();
	for part in header.split(',') {
		let mut kv = part.splitn(2, '=');
		let key = kv.next().unwrap_or("").trim();
		let value = kv.next().unwrap_or("").trim();
		match key {
			"t" => timestamp = value.parse::<i64>().ok(),
			"v1" => v1_signatures.push(value.to_string()),
			_ => {}
		}
	}
	match timestamp {
		Some(timestamp) if !v1_signatures.is_empty() => Ok(ParsedHeader { timestamp, v1_signatures }),
		_ => Err(SignatureError::Malformed),
	}
}

fn constant_time_eq(a: &str, b: &str) -> bool {
	let a = a.as_bytes();
	let b = b.as_bytes();
	if a.len() != b.len() {
		return false;
	}
	let mut diff = 0u8;
	for (x, y) in a.iter().zip(b.iter()) {
		diff |= x ^ y;
	}
	diff == 0
}

/// Verifies a `stripe-signature` header against the raw request body and
/// the configured webhook secret. `now` is injected for testability.
pub fn verify(payload: &[u8], header: &str, secret: &str, now: i64, tolerance_seconds: i64) -> Result<(), SignatureError> {
	if header.trim().is_empty() {
		return Err(SignatureError::MissingHeader);
	}
	let parsed = parse_header(header)?;
	if (now - parsed.timestamp).abs() > tolerance_seconds {
		return Err(SignatureError::Stale);
	}

	let signed_payload = format!("{}.", parsed.timestamp);
	let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
	mac.update(signed_payload.as_bytes());
	mac.update(payload);
	let expected = hex::encode(mac.finalize().into_bytes());

	if parsed.v1_signatures.iter().any(|sig| constant_time_eq(sig, &expected)) {
		Ok(())
	} else {
		Err(SignatureError::Mismatch)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
		let signed_payload = format!("{timestamp}.");
		let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
		mac.update(signed_payload.as_bytes());
		mac.update(payload);
		format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
	}

	#[test]
	fn valid_signature_within_tolerance_passes() {
		let secret = "whsec_test";
		let payload = br#"{"id":"evt_1"}"#;
		let now = 1_700_000_000;
		let header = sign(payload, secret, now);
		assert!(verify(payload, &header, secret, now, DEFAULT_TOLERANCE_SECONDS).is_ok());
	}

	#[test]
	fn tampered_payload_is_rejected() {
		let secret = "whsec_test";
		let payload = br#"{"id":"evt_1"}"#;
		let now = 1_700_000_000;
		let header = sign(payload, secret, now);
		let tampered = br#"{"id":"evt_2"}"#;
		assert_eq!(verify(tampered, &header, secret, now, DEFAULT_TOLERANCE_SECONDS), Err(SignatureError::Mismatch));
	}

	#[test]
	fn stale_timestamp_is_rejected() {
		let secret = "whsec_test";
		let payload = br#"{"id":"evt_1"}"#;
		let header = sign(payload, secret, 1_700_000_000);
		assert_eq!(
			verify(payload, &header, secret, 1_700_000_000 + 1000, DEFAULT_TOLERANCE_SECONDS),
			Err(SignatureError::Stale)
		);
	}

	#[test]
	fn missing_header_is_rejected() {
		assert_eq!(verify(b"{}", "", "secret", 0, DEFAULT_TOLERANCE_SECONDS), Err(SignatureError::MissingHeader));
	}
}
