//! Entry-point invocation
//!
//! The package's main entry point runs on the blocking pool with the
//! package context installed as the thread's ambient context for the
//! duration of the call only. The invoking task carries the same context
//! for each poll while it waits, so neither thread keeps it afterwards.

use crate::assemble::ContainerInfo;
use crate::error::{HostError, HostResult};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Ambient context of the package whose code is running on this thread
#[derive(Debug, Clone)]
pub struct PackageContext {
    pub name: String,
    pub instance_id: u64,
    pub containers: Arc<Vec<ContainerInfo>>,
}

thread_local! {
    static CURRENT: RefCell<Option<PackageContext>> = const { RefCell::new(None) };
}

/// The package context of the calling thread, if any
pub fn current_context() -> Option<PackageContext> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Installs a context and restores the previous one on drop
pub struct ContextGuard {
    previous: Option<PackageContext>,
}

impl ContextGuard {
    pub fn enter(context: PackageContext) -> Self {
        let previous = CURRENT.with(|current| current.replace(Some(context)));
        Self { previous }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| {
            *current.borrow_mut() = previous;
        });
    }
}

/// Future that runs every poll of `inner` under `context`
pub struct WithContext<F> {
    context: PackageContext,
    inner: F,
}

/// Scope `future` to `context` on whichever thread polls it
pub fn with_context<F: Future + Unpin>(context: PackageContext, future: F) -> WithContext<F> {
    WithContext {
        context,
        inner: future,
    }
}

impl<F: Future + Unpin> Future for WithContext<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let _guard = ContextGuard::enter(this.context.clone());
        Pin::new(&mut this.inner).poll(cx)
    }
}

/// Failures a package declares as application errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationError {
    MissingRuntimeFeature(String),
    UnsupportedFrameworkVersion { found: String, supported: String },
}

/// What an entry point may fail with
#[derive(Debug)]
pub enum EntryPointError {
    Application(ApplicationError),
    Other(String),
}

impl fmt::Display for EntryPointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application(e) => write!(f, "application error: {e:?}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<EntryPointError> for HostError {
    fn from(err: EntryPointError) -> Self {
        match err {
            EntryPointError::Application(ApplicationError::MissingRuntimeFeature(feature)) => {
                HostError::MissingRuntimeFeature(feature)
            }
            EntryPointError::Application(ApplicationError::UnsupportedFrameworkVersion {
                found,
                supported,
            }) => HostError::UnsupportedFrameworkVersion { found, supported },
            EntryPointError::Other(msg) => HostError::InvocationFailure(msg),
        }
    }
}

/// A package's main entry point
pub trait EntryPoint: Send + Sync {
    fn main(&self, launch: &super::LaunchContext) -> Result<(), EntryPointError>;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "entry point panicked".to_string()
    }
}

/// Run `entry` on the blocking pool and classify its failure
pub async fn invoke(entry: Arc<dyn EntryPoint>, launch: super::LaunchContext) -> HostResult<()> {
    let name = launch.package().name.clone();
    debug!("Invoking entry point of {}", name);

    let context = launch.package().clone();
    let running = tokio::task::spawn_blocking(move || {
        let _guard = ContextGuard::enter(launch.package().clone());
        entry.main(&launch)
    });
    let joined = with_context(context, running).await;

    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!("Entry point of {} failed: {}", name, e);
            Err(e.into())
        }
        Err(join) if join.is_panic() => {
            let msg = panic_message(join.into_panic().as_ref());
            warn!("Entry point of {} panicked: {}", name, msg);
            Err(HostError::InvocationFailure(msg))
        }
        Err(join) => Err(HostError::InvocationFailure(join.to_string())),
    }
}
