//! CLI command implementations

pub mod cache;
pub mod config;
pub mod units;

pub use cache::execute as cache;
pub use config::execute as config;
pub use units::execute as units;
