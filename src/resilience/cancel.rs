//! Cancellation signal merging.
//!
//! A merged signal fires as soon as any of its sources fires and stays fired.
//! Listeners are plain futures, so dropping them on any exit path releases
//! them.

use futures_util::future::select_all;
use tokio_util::sync::CancellationToken;

/// Resolve once any of `signals` is cancelled. Never resolves for an empty set.
pub async fn any_cancelled(signals: &[CancellationToken]) {
    if signals.is_empty() {
        return std::future::pending().await;
    }
    let waits = signals.iter().map(|signal| Box::pin(signal.cancelled()));
    select_all(waits).await;
}

/// One child signal fed by several parent signals.
#[derive(Debug)]
pub struct MergedSignal {
    token: CancellationToken,
    sources: Vec<CancellationToken>,
}

impl MergedSignal {
    /// Merge `sources`. Already-fired sources fire the merged signal at once.
    pub fn new(sources: Vec<CancellationToken>) -> Self {
        let token = CancellationToken::new();
        if sources.iter().any(CancellationToken::is_cancelled) {
            token.cancel();
        }
        Self { token, sources }
    }

    /// The merged token handed downstream.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the merged signal directly (used by the timer source).
    pub fn fire(&self) {
        self.token.cancel();
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve when a parent source fires, propagating it to the merged token.
    pub async fn source_fired(&self) {
        any_cancelled(&self.sources).await;
        self.token.cancel();
    }
}
