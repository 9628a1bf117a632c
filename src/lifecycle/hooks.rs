//! Shutdown hook registry

use crate::error::HostResult;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use tracing::{debug, warn};

type Hook = Box<dyn FnOnce() -> HostResult<()> + Send>;

/// Hooks registered by a hosted package, run once on uninstall or shutdown
#[derive(Default)]
pub struct ShutdownHooks {
    hooks: Mutex<Vec<(String, Hook)>>,
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> HostResult<()> + Send + 'static,
    {
        let name = name.into();
        match self.hooks.lock() {
            Ok(mut hooks) => hooks.push((name, Box::new(hook))),
            Err(_) => warn!("Shutdown hook registry poisoned, dropping hook {}", name),
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run and drain every hook in registration order.
    ///
    /// A failing or panicking hook is logged and the rest still run.
    /// Returns the number of hooks that failed.
    pub fn call_all(&self) -> usize {
        let hooks = match self.hooks.lock() {
            Ok(mut hooks) => std::mem::take(&mut *hooks),
            Err(_) => return 0,
        };

        let mut failed = 0;
        for (name, hook) in hooks {
            match panic::catch_unwind(AssertUnwindSafe(hook)) {
                Ok(Ok(())) => debug!("Shutdown hook {} completed", name),
                Ok(Err(e)) => {
                    failed += 1;
                    warn!("Shutdown hook {} failed: {}", name, e);
                }
                Err(_) => {
                    failed += 1;
                    warn!("Shutdown hook {} panicked", name);
                }
            }
        }
        failed
    }
}
