//! Unverified inspection of session tokens.
//!
//! Tokens are JWT-shaped (`header.payload.signature`). The client cannot
//! verify the signature, but it can read the payload to estimate how old a
//! token is without a network round trip. Nothing here is used to make an
//! authorization decision.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value as JsonValue;

/// Decode the payload segment of a token into JSON claims.
///
/// Returns `None` for anything that is not three dot-separated segments with
/// a base64url JSON object in the middle.
pub fn decode_claims(token: &str) -> Option<JsonValue> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || payload.is_empty() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| URL_SAFE.decode(payload))
        .ok()?;
    let claims: JsonValue = serde_json::from_slice(&bytes).ok()?;
    claims.is_object().then_some(claims)
}

fn timestamp_claim(claims: &JsonValue, name: &str) -> Option<DateTime<Utc>> {
    let secs = match claims.get(name)? {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        _ => return None,
    };
    Utc.timestamp_opt(secs, 0).single()
}

/// Issue time (`iat`) of a token, or `None` if the token is undecodable.
pub fn issued_at(token: &str) -> Option<DateTime<Utc>> {
    timestamp_claim(&decode_claims(token)?, "iat")
}

/// Expiry (`exp`) of a token when the issuer includes one.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    timestamp_claim(&decode_claims(token)?, "exp")
}

/// Whole days between `issued_at` and `now`, clamped at zero for clock skew.
pub fn age_days(issued_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - issued_at).num_days().max(0)
}

/// Whether a token issued at `issued_at` is due for a proactive refresh.
pub fn is_stale(issued_at: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    age_days(issued_at, now) >= threshold.num_days()
}

#[cfg(test)]
pub(crate) fn encode_for_test(claims: &JsonValue) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

/// A token whose `iat` lies `days` in the past.
#[cfg(test)]
pub(crate) fn token_issued_days_ago(days: i64) -> String {
    let iat = (Utc::now() - Duration::days(days)).timestamp();
    encode_for_test(&serde_json::json!({ "sub": "u1", "iat": iat }))
}
