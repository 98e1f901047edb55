//! Stateful loop predicates.

use std::sync::atomic::{AtomicU32, Ordering};

use lockstep_core::address::Address;

/// A predicate that answers `true` for its first `times` calls and `false`
/// ever after.
pub fn true_times(times: u32) -> impl Fn(&Address) -> bool + Send + Sync + 'static {
    let remaining = AtomicU32::new(times);
    move |_| {
        remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}
