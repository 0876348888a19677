//! The request-level interface: single and batch verification with the
//! error statuses an HTTP front end reports. Bodies are JSON values so any
//! HTTP framework can sit on top.

use serde_json::{Value, json};
use tracing::warn;

use crate::batch::verify_batch;
use crate::error::ApiError;
use crate::format::is_valid_address;
use crate::result::VerificationResult;
use crate::verifier::Verifier;

/// Verifies one address, turning terminal negative outcomes into errors.
///
/// A missing or malformed address, a domain without exchange hosts and a
/// domain where no host could be reached are errors; everything else,
/// including rejections and temporary failures, is a result.
pub async fn verify_email(
    verifier: &Verifier,
    email: Option<&str>,
) -> Result<VerificationResult, ApiError> {
    let email = email.map(str::trim).filter(|e| !e.is_empty());
    let Some(email) = email else {
        return Err(ApiError::MissingEmail);
    };

    if !is_valid_address(email) {
        return Err(ApiError::InvalidFormat);
    }

    let result = verifier.verify(email).await;
    if result.found_no_exchange() {
        return Err(ApiError::NoMxRecords);
    }
    if !result.connection_succeeded {
        warn!(
            email,
            "no exchange host reachable: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
        return Err(ApiError::ConnectionFailed);
    }
    Ok(result)
}

/// Verifies a JSON list of addresses. Entries that are not strings are
/// verified as their JSON text and so come back malformed.
pub async fn verify_emails(
    verifier: &Verifier,
    emails: Option<&Value>,
) -> Result<Vec<VerificationResult>, ApiError> {
    let Some(Value::Array(entries)) = emails else {
        return Err(ApiError::NotAList);
    };

    let emails: Vec<String> = entries
        .iter()
        .map(|entry| match entry {
            Value::String(email) => email.clone(),
            other => other.to_string(),
        })
        .collect();

    Ok(verify_batch(verifier, &emails).await?)
}

// Body `{"email": "..."}` in, status and JSON body out
pub async fn handle_verify(verifier: &Verifier, body: &Value) -> (u16, Value) {
    let email = match body.get("email") {
        None => None,
        Some(value) if is_falsy(value) => None,
        Some(Value::String(email)) => Some(email.clone()),
        Some(other) => Some(other.to_string()),
    };

    match verify_email(verifier, email.as_deref()).await {
        Ok(result) => (200, to_body(&result)),
        Err(err) => (err.status_code(), err.body()),
    }
}

// Body `{"emails": [...]}` in, status and JSON body out
pub async fn handle_verify_batch(verifier: &Verifier, body: &Value) -> (u16, Value) {
    match verify_emails(verifier, body.get("emails")).await {
        Ok(results) => (200, to_body(&results)),
        Err(err) => (err.status_code(), err.body()),
    }
}

// `null`, `false`, zero and the empty string count as "no email given".
// Arrays and objects are present values, even when empty.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!("failed to serialize response: {e}");
        json!({ "error": ApiError::Internal.to_string() })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifierConfig;
    use crate::mx::{ExchangeHost, MxResolver};
    use futures::future::BoxFuture;
    use std::sync::Arc;

    struct NoRecords;

    impl MxResolver for NoRecords {
        fn resolve<'a>(&'a self, _domain: &'a str) -> BoxFuture<'a, Vec<ExchangeHost>> {
            Box::pin(async { Vec::new() })
        }
    }

    fn verifier() -> Verifier {
        Verifier::new(VerifierConfig::default(), Arc::new(NoRecords))
    }

    #[tokio::test]
    async fn missing_email() {
        let (status, body) = handle_verify(&verifier(), &json!({})).await;
        assert_eq!(status, 400);
        assert_eq!(body, json!({ "error": "missing email" }));

        for missing in [json!(""), json!(null), json!(false), json!(0), json!(0.0)] {
            let (status, body) = handle_verify(&verifier(), &json!({ "email": missing })).await;
            assert_eq!(status, 400);
            assert_eq!(body, json!({ "error": "missing email" }), "{missing}");
        }
    }

    #[tokio::test]
    async fn invalid_format() {
        let (status, body) = handle_verify(&verifier(), &json!({ "email": "not-an-address" })).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "email format is invalid");

        for present in [json!(42), json!(true), json!([]), json!({})] {
            let (status, body) = handle_verify(&verifier(), &json!({ "email": present })).await;
            assert_eq!(status, 400);
            assert_eq!(body["error"], "email format is invalid", "{present}");
        }
    }

    #[tokio::test]
    async fn no_mx_records() {
        let err = verify_email(&verifier(), Some("user@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::NoMxRecords);
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn batch_must_be_a_list() {
        let (status, body) =
            handle_verify_batch(&verifier(), &json!({ "emails": "a@example.com" })).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "emails must be an array");

        let (status, _) = handle_verify_batch(&verifier(), &json!({})).await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn batch_over_cap() {
        let emails: Vec<String> = (0..101).map(|i| format!("u{i}@example.com")).collect();
        let (status, body) = handle_verify_batch(&verifier(), &json!({ "emails": emails })).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "maximum 100 emails allowed per request");
    }

    #[tokio::test]
    async fn batch_entries_keep_order() {
        let body = json!({ "emails": ["a@example.com", 7, "broken"] });
        let (status, body) = handle_verify_batch(&verifier(), &body).await;
        assert_eq!(status, 200);

        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["email"], "a@example.com");
        assert_eq!(results[0]["email_format_is_valid"], true);
        assert_eq!(results[0]["error"], "no mail exchange found");
        assert_eq!(results[1]["email"], "7");
        assert_eq!(results[1]["email_format_is_valid"], false);
        assert_eq!(results[2]["email"], "broken");
        assert_eq!(results[2]["email_format_is_valid"], false);
    }
}
