//! fathost - host for fat application archives
//!
//! Thins fat archives into content-addressed library caches, assembles
//! layered containers from the result, reconciles generated server
//! configuration against what is already present, and drives each hosted
//! package through install, start and uninstall.

pub mod assemble;
pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod package;
pub mod reconcile;
pub mod store;
pub mod thin;
pub mod unit;

pub use error::{HostError, HostResult};
