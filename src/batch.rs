use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::BatchError;
use crate::result::VerificationResult;
use crate::verifier::Verifier;

/// Verifies every address concurrently and returns one result per input,
/// in input order.
///
/// Lists longer than the configured cap are rejected before any
/// verification starts. Each address runs in its own task, so a panic
/// while verifying one address becomes a failed result for that address
/// and leaves its siblings alone.
pub async fn verify_batch(
    verifier: &Verifier,
    emails: &[String],
) -> Result<Vec<VerificationResult>, BatchError> {
    verify_batch_with(verifier, emails, |_| {}).await
}

// Same as `verify_batch`, calling `on_result` as each address finishes
pub async fn verify_batch_with<F>(
    verifier: &Verifier,
    emails: &[String],
    on_result: F,
) -> Result<Vec<VerificationResult>, BatchError>
where
    F: Fn(&VerificationResult) + Send + Sync + 'static,
{
    let max = verifier.config().max_batch_size;
    if emails.len() > max {
        return Err(BatchError::TooLarge {
            len: emails.len(),
            max,
        });
    }

    info!("verifying batch of {} address(es)", emails.len());

    let on_result = Arc::new(on_result);
    let tasks = emails.iter().map(|email| {
        let verifier = verifier.clone();
        let email = email.clone();
        let on_result = Arc::clone(&on_result);
        tokio::spawn(async move {
            let result = verifier.verify(&email).await;
            (*on_result)(&result);
            result
        })
    });
    let joined = join_all(tasks).await;

    let results = emails
        .iter()
        .zip(joined)
        .map(|(email, joined)| match joined {
            Ok(result) => result,
            Err(e) => {
                error!(email = %email, "verification task failed: {e}");
                let result = VerificationResult::internal_failure(email);
                (*on_result)(&result);
                result
            }
        })
        .collect();

    Ok(results)
}
