//! Dynamic configuration units
//!
//! A unit is an independently named carrier of generated configuration.
//! Its record is written to the units directory so a restarted host can
//! find units left over from a prior run and remove them.

pub mod manager;
pub mod record;

pub use manager::UnitManager;
pub use record::{UnitHandle, UnitRecord, UnitTag, UNIT_KIND};
