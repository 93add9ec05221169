use std::time::{Duration, Instant};

/// Deadline-based cancellation signal handed to exporters and producers.
///
/// An export attempt is bounded by the processor's configured timeout; the
/// token carries that deadline so transport code can both poll
/// [`is_cancelled`](CancelToken::is_cancelled) between units of work and derive
/// a request timeout from [`remaining`](CancelToken::remaining).
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelToken {
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never cancels (timeout disabled).
    pub fn none() -> Self {
        Self { deadline: None }
    }

    /// A token that cancels `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// A token that cancels at `deadline`.
    pub fn at(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Time left before cancellation; `None` when the token never cancels.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}
