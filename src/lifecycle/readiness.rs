//! Readiness gate
//!
//! Two independent signals must fire before a deployment counts as ready:
//! the framework's module-started signal and the application's own ready
//! callback. Waiting is bounded; release_all() unblocks waiters on failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// A readiness signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadySignal {
    ModuleStarted,
    AppReady,
}

impl ReadySignal {
    fn index(self) -> usize {
        match self {
            Self::ModuleStarted => 0,
            Self::AppReady => 1,
        }
    }
}

/// Two-count barrier with a bounded wait
#[derive(Debug)]
pub struct ReadinessGate {
    remaining: watch::Sender<u8>,
    fired: [AtomicBool; 2],
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (remaining, _) = watch::channel(2);
        Self {
            remaining,
            fired: [AtomicBool::new(false), AtomicBool::new(false)],
        }
    }

    /// Count `signal` down; each signal counts once
    pub fn signal(&self, signal: ReadySignal) -> bool {
        if self.fired[signal.index()].swap(true, Ordering::AcqRel) {
            return false;
        }
        self.remaining.send_modify(|n| *n = n.saturating_sub(1));
        true
    }

    /// Force the gate open
    pub fn release_all(&self) {
        self.remaining.send_replace(0);
    }

    pub fn remaining(&self) -> u8 {
        *self.remaining.borrow()
    }

    /// Wait for the gate to open; `false` on timeout
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.remaining.subscribe();
        let opened = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0)).await,
            Ok(Ok(_))
        );
        opened
    }
}
