//! Scoped provider session.
//!
//! A [`Session`] owns the provider for the length of one run:
//! 1. The provider is opened once when the session is created
//! 2. Orchestration and configuration borrow it
//! 3. It is closed when the session drops, on success, error or panic

use crate::backend::Provider;
use std::time::{Duration, Instant};

/// Owns a provider and releases it on drop.
pub struct Session {
    provider: Box<dyn Provider>,
    started: Instant,
}

impl Session {
    /// Open a session over `provider`.
    pub fn open(provider: Box<dyn Provider>) -> Self {
        log::debug!("Opened {} session", provider.name());
        Self {
            provider,
            started: Instant::now(),
        }
    }

    /// Borrow the provider.
    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Time since the session was opened.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.provider.close();
        log::info!(
            "Closed {} session after {:.1}s",
            self.provider.name(),
            self.elapsed().as_secs_f64()
        );
    }
}
