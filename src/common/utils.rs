//! Utility functions for quizcache

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Get current Unix timestamp (milliseconds)
pub fn timestamp_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Initialize tracing with an env-filter falling back to the given level.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Retry with exponential backoff and a little jitter
pub async fn retry_with_backoff<F, Fut, T>(
    mut f: F,
    max_retries: usize,
    initial_delay: std::time::Duration,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::Result<T>>,
{
    let mut delay = initial_delay;

    for attempt in 0..max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries - 1 => {
                tracing::warn!(
                    "Retry attempt {} failed: {}, retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );
                let jitter = rand::thread_rng().gen_range(0..=delay.as_millis().max(1) as u64 / 4);
                tokio::time::sleep(delay + std::time::Duration::from_millis(jitter)).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    Err(crate::Error::Internal("Max retries exceeded".into()))
}

/// Validate a participant key (must be non-empty, reasonable length)
pub fn validate_participant_key(key: &str) -> crate::Result<()> {
    if key.is_empty() {
        return Err(crate::Error::InvalidConfig(
            "participant key cannot be empty".into(),
        ));
    }

    if key.len() > 255 {
        return Err(crate::Error::InvalidConfig(
            "participant key too long (max 255 bytes)".into(),
        ));
    }

    if key.chars().any(|c| c.is_control()) {
        return Err(crate::Error::InvalidConfig(
            "participant key contains invalid characters".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_validate_participant_key() {
        assert!(validate_participant_key("student42").is_ok());
        assert!(validate_participant_key("team-blue").is_ok());
        assert!(validate_participant_key("").is_err());
        assert!(validate_participant_key(&"x".repeat(300)).is_err());
        assert!(validate_participant_key("bad\nkey").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failures() {
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(crate::Error::Persistence("transient".into()))
                    } else {
                        Ok(n)
                    }
                }
            },
            5,
            std::time::Duration::from_millis(10),
        )
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_on_non_retryable() {
        let attempts = AtomicUsize::new(0);
        let result: crate::Result<()> = retry_with_backoff(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(crate::Error::QuizNotActive(1)) }
            },
            5,
            std::time::Duration::from_millis(10),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
