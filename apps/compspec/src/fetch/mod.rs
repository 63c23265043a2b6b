//! # Fetching
//!
//! Everything that leaves the process: schema documents over HTTP, artifacts
//! from OCI registries, and the on-disk artifact cache in front of them.
//!
//! Every network call goes through [`with_retry`], which applies the
//! per-attempt timeout, retries transient failures with a linear backoff and
//! gives up immediately when the run is cancelled.

pub mod cache;
pub mod registry;
pub mod schema;

pub use cache::ArtifactCache;
pub use registry::{Reference, RegistryClient};
pub use schema::SchemaLoader;

use compspec_core::{CompatibilityArtifact, CompspecError};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

// =============================================================================
// POLICY
// =============================================================================

/// Timeout and retry settings for one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Limit for a single attempt.
    pub timeout: Duration,
    /// Attempts including the first. Zero behaves as one.
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

// =============================================================================
// CANCELLATION
// =============================================================================

/// Trigger side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Cancel every fetch observing the paired [`Cancellation`].
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Observer side of a cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Cancellation(watch::Receiver<bool>);

/// Create a linked cancel handle and observer.
#[must_use]
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), Cancellation(rx))
}

impl Cancellation {
    /// An observer that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self(rx)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancelled. Pends forever if the handle was dropped
    /// without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// =============================================================================
// RETRY
// =============================================================================

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum Attempt {
    /// Worth retrying: timeouts, connection failures, 429 and 5xx.
    Transient(String),
    /// Retrying cannot help.
    Fatal(CompspecError),
}

impl From<reqwest::Error> for Attempt {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

/// Classify a non-success HTTP status for `target`.
#[must_use]
pub fn classify_status(target: &str, status: reqwest::StatusCode) -> Attempt {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Attempt::Transient(format!("server returned {}", status))
    } else {
        Attempt::Fatal(CompspecError::fetch(target, format!("server returned {}", status)))
    }
}

/// Run `op` under `policy`, retrying transient failures.
pub async fn with_retry<T, F, Fut>(
    target: &str,
    policy: &FetchPolicy,
    cancel: &Cancellation,
    mut op: F,
) -> Result<T, CompspecError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Attempt>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last = String::from("no attempt made");

    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = policy.backoff.saturating_mul(attempt - 1);
            tracing::warn!(url = target, attempt, "Retrying in {:?}: {}", delay, last);
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(CompspecError::Cancelled(target.to_string()));
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(CompspecError::Cancelled(target.to_string()));
            }
            outcome = tokio::time::timeout(policy.timeout, op()) => outcome,
        };

        match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(Attempt::Fatal(e))) => return Err(e),
            Ok(Err(Attempt::Transient(reason))) => last = reason,
            Err(_) => last = format!("timed out after {:?}", policy.timeout),
        }
    }

    Err(CompspecError::fetch(
        target,
        format!("{} (gave up after {} attempts)", last, attempts),
    ))
}

// =============================================================================
// ARTIFACT FETCHER
// =============================================================================

/// Loads compatibility artifacts, from the cache when possible.
pub struct ArtifactFetcher {
    registry: RegistryClient,
    cache: Option<ArtifactCache>,
    media_type: String,
}

impl ArtifactFetcher {
    #[must_use]
    pub fn new(
        registry: RegistryClient,
        cache: Option<ArtifactCache>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            cache,
            media_type: media_type.into(),
        }
    }

    /// The artifact cache, if one is configured.
    #[must_use]
    pub fn cache(&self) -> Option<&ArtifactCache> {
        self.cache.as_ref()
    }

    /// Load the artifact published at `uri`.
    ///
    /// A cache hit never touches the network. A registry download is written
    /// to the cache, unless an entry appeared there in the meantime.
    pub async fn load(&self, uri: &str) -> Result<CompatibilityArtifact, CompspecError> {
        if let Some(cache) = &self.cache {
            if let Some(artifact) = cache.load(uri)? {
                tracing::debug!(artifact = uri, "Artifact cache hit");
                return Ok(artifact);
            }
        }

        let reference = Reference::parse(uri)?;
        let artifact = self
            .registry
            .fetch_artifact(&reference, &self.media_type)
            .await?;

        if let Some(cache) = &self.cache {
            if cache.store(uri, &artifact)? {
                tracing::debug!(artifact = uri, "Cached artifact");
            }
        }
        Ok(artifact)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(5),
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry("https://example.com", &fast_policy(3), &Cancellation::never(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Attempt::Transient("503".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry("https://example.com", &fast_policy(3), &Cancellation::never(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Attempt::Fatal(CompspecError::fetch("x", "404"))) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_attempt_by_default() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(
            "https://example.com",
            &FetchPolicy::default(),
            &Cancellation::never(),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Attempt::Transient("reset".into())) }
            },
        )
        .await;

        let err = result.expect_err("exhausted");
        assert!(matches!(err, CompspecError::Fetch { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let (handle, cancel) = cancellation();
        handle.cancel();
        assert!(cancel.is_cancelled());

        let result: Result<(), _> = with_retry("https://example.com", &fast_policy(3), &cancel, || {
            async { Err(Attempt::Transient("unreachable".into())) }
        })
        .await;

        assert!(matches!(result, Err(CompspecError::Cancelled(_))));
    }

    #[tokio::test]
    async fn attempt_timeout_is_transient() {
        let policy = FetchPolicy {
            timeout: Duration::from_millis(5),
            max_attempts: 1,
            backoff: Duration::ZERO,
        };
        let result: Result<(), _> = with_retry("slow", &policy, &Cancellation::never(), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.expect_err("timed out");
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status("x", reqwest::StatusCode::SERVICE_UNAVAILABLE),
            Attempt::Transient(_)
        ));
        assert!(matches!(
            classify_status("x", reqwest::StatusCode::TOO_MANY_REQUESTS),
            Attempt::Transient(_)
        ));
        assert!(matches!(
            classify_status("x", reqwest::StatusCode::NOT_FOUND),
            Attempt::Fatal(_)
        ));
    }
}
