//! Single-assignment cells and the active instance slot
//!
//! Both are lock-free: writers race on compare-and-set, readers load.

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A value that may be assigned once and consumed once.
///
/// Assignment is decided by a compare-and-set on a flag, so a second
/// `set` fails even after the value was taken.
#[derive(Debug)]
pub struct SingleAssignment<T> {
    assigned: AtomicBool,
    value: ArcSwapOption<T>,
}

impl<T> Default for SingleAssignment<T> {
    fn default() -> Self {
        Self {
            assigned: AtomicBool::new(false),
            value: ArcSwapOption::empty(),
        }
    }
}

impl<T> SingleAssignment<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the value; hands it back if already assigned
    pub fn set(&self, value: T) -> Result<(), T> {
        if self
            .assigned
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(value);
        }
        self.value.store(Some(Arc::new(value)));
        Ok(())
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned.load(Ordering::Acquire)
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.value.load_full()
    }

    /// Consume the value, leaving the cell assigned but empty.
    ///
    /// Yields nothing while a reader still holds the value from `get`.
    pub fn take(&self) -> Option<T> {
        self.value.swap(None).and_then(Arc::into_inner)
    }
}

/// At most one hosted package name at a time
#[derive(Debug, Default)]
pub struct ActiveInstanceSlot {
    occupant: ArcSwapOption<String>,
}

impl ActiveInstanceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `name`.
    ///
    /// Succeeds when empty or already held by `name`; otherwise returns the
    /// current occupant.
    pub fn claim(&self, name: &str) -> Result<(), String> {
        let mut current = self.occupant.load();
        loop {
            if let Some(held) = current.as_deref() {
                return if held.as_str() == name {
                    Ok(())
                } else {
                    Err(held.to_string())
                };
            }

            let previous = self
                .occupant
                .compare_and_swap(&current, Some(Arc::new(name.to_string())));
            if same_occupant(&previous, &current) {
                return Ok(());
            }
            current = previous;
        }
    }

    /// Release the slot if `name` holds it
    pub fn release(&self, name: &str) -> bool {
        let mut current = self.occupant.load();
        loop {
            if current.as_deref().map(String::as_str) != Some(name) {
                return false;
            }

            let previous = self.occupant.compare_and_swap(&current, None::<Arc<String>>);
            if same_occupant(&previous, &current) {
                return true;
            }
            current = previous;
        }
    }

    pub fn occupant(&self) -> Option<String> {
        self.occupant.load_full().map(|name| name.as_ref().clone())
    }
}

fn same_occupant(a: &Option<Arc<String>>, b: &Option<Arc<String>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}
