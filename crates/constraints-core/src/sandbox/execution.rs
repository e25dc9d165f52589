//! Execution controls: a dedicated worker thread raced against a deadline.

use std::num::NonZeroU64;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use constraints_lang::Budget;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::error::{SandboxError, SandboxResult};

/// Stack reserved for each worker; the interpreter's depth limit is sized
/// against it.
pub const DEFAULT_WORKER_STACK_BYTES: usize = 256 * 1024 * 1024;

pub const DEFAULT_TIMEOUT_MS: NonZeroU64 = match NonZeroU64::new(10_000) {
    Some(ms) => ms,
    None => unreachable!(),
};

/// Configuration for sandboxed execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxConfig {
    /// Wall-clock limit for one request (milliseconds).
    pub timeout_ms: NonZeroU64,
    /// Stack size of the worker thread (bytes).
    pub worker_stack_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            worker_stack_bytes: DEFAULT_WORKER_STACK_BYTES,
        }
    }
}

impl SandboxConfig {
    /// Config with the given timeout; zero is rejected.
    pub fn with_timeout_ms(timeout_ms: u64) -> SandboxResult<Self> {
        let timeout_ms = NonZeroU64::new(timeout_ms)
            .ok_or_else(|| SandboxError::InvalidConfig("timeout must be greater than zero".into()))?;
        Ok(Self {
            timeout_ms,
            ..Self::default()
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.get())
    }
}

/// Run `job` on a fresh worker thread and wait at most `config.timeout()`.
///
/// `job` receives a [`Budget`] carrying the same deadline plus a cancel
/// flag. On expiry the flag is set and the worker's result channel is
/// dropped, so a late result is discarded. A panic in `job` is caught on
/// the worker and reported as [`SandboxError::WorkerPanicked`].
pub async fn execute_with_deadline<T, F>(config: &SandboxConfig, job: F) -> SandboxResult<T>
where
    T: Send + 'static,
    F: FnOnce(Budget) -> T + Send + 'static,
{
    let limit = config.timeout();
    let cancel = Arc::new(AtomicBool::new(false));
    let budget = Budget::new(Some(Instant::now() + limit), cancel.clone());
    let (tx, rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("constraints-worker".into())
        .stack_size(config.worker_stack_bytes)
        .spawn(move || {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| job(budget)));
            // The receiver is gone once the deadline has passed.
            let _ = tx.send(result);
        })
        .map_err(SandboxError::Spawn)?;

    match tokio::time::timeout(limit, rx).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(payload))) => Err(SandboxError::WorkerPanicked(panic_message(payload.as_ref()))),
        Ok(Err(_closed)) => Err(SandboxError::WorkerPanicked(
            "worker exited without a result".into(),
        )),
        Err(_elapsed) => {
            cancel.store(true, Ordering::Relaxed);
            tracing::debug!(limit_ms = config.timeout_ms.get(), "worker abandoned after deadline");
            Err(SandboxError::Timeout {
                limit_ms: config.timeout_ms.get(),
            })
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(timeout_ms: u64) -> SandboxConfig {
        SandboxConfig {
            worker_stack_bytes: 4 * 1024 * 1024,
            ..SandboxConfig::with_timeout_ms(timeout_ms).unwrap()
        }
    }

    #[test]
    fn test_default_config() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.timeout_ms.get(), 10_000);
        assert_eq!(cfg.timeout(), Duration::from_secs(10));
        assert_eq!(cfg.worker_stack_bytes, DEFAULT_WORKER_STACK_BYTES);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        match SandboxConfig::with_timeout_ms(0) {
            Err(SandboxError::InvalidConfig(msg)) => assert!(msg.contains("greater than zero")),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_job_result_returned() {
        let value = execute_with_deadline(&config(1000), |_budget| 6 * 7).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_job_panic_is_caught() {
        let result = execute_with_deadline(&config(1000), |_budget| -> u32 { panic!("kaboom") }).await;
        match result {
            Err(SandboxError::WorkerPanicked(msg)) => assert_eq!(msg, "kaboom"),
            other => panic!("expected WorkerPanicked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_abandons_worker() {
        let started = Instant::now();
        let result = execute_with_deadline(&config(50), |_budget| {
            std::thread::sleep(Duration::from_millis(500));
            1
        })
        .await;

        match result {
            Err(SandboxError::Timeout { limit_ms }) => assert_eq!(limit_ms, 50),
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&7u8), "non-string panic payload");
    }
}
