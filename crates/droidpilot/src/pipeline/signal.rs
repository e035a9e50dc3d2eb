//! One-shot completion signal shared between a task and its delivery stream

use tokio_util::sync::CancellationToken;

/// Monotonic flag that goes from unset to set exactly once.
///
/// Any number of clones may observe it; only the task boundary sets it,
/// normally through a [`CompletionGuard`].
#[derive(Debug, Clone, Default)]
pub struct CompletionSignal {
    token: CancellationToken,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the producer as finished. Setting twice has no further effect.
    pub fn set(&self) {
        self.token.cancel();
    }

    pub fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once the signal is set.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    /// Guard that sets this signal when dropped.
    pub fn guard(&self) -> CompletionGuard {
        CompletionGuard {
            signal: self.clone(),
        }
    }
}

/// Sets its [`CompletionSignal`] on drop, so every exit path of the owning
/// scope fires it: normal return, `?`, panic unwind, or the future being
/// dropped mid-await.
#[derive(Debug)]
pub struct CompletionGuard {
    signal: CompletionSignal,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.signal.set();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_signal_is_monotonic() {
        let signal = CompletionSignal::new();
        assert!(!signal.is_set());
        signal.set();
        assert!(signal.is_set());
        signal.set();
        assert!(signal.is_set());
    }

    #[test]
    fn test_clones_observe_the_same_flag() {
        let signal = CompletionSignal::new();
        let reader = signal.clone();
        signal.set();
        assert!(reader.is_set());
    }

    #[test]
    fn test_guard_sets_on_drop() {
        let signal = CompletionSignal::new();
        {
            let _guard = signal.guard();
            assert!(!signal.is_set());
        }
        assert!(signal.is_set());
    }

    #[tokio::test]
    async fn test_guard_fires_when_future_is_aborted() {
        let signal = CompletionSignal::new();
        let guard = signal.guard();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        handle.abort();
        let _ = handle.await;

        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("signal should fire after abort");
    }
}
