//! Thread-local call-depth guard for reentrant instrumentation hooks.
//!
//! Instrumentation hooks are typically attached to multiple overlapping API
//! surfaces (e.g. both a "write one unit" and a "write a range" entry
//! point), and one commonly delegates to the other. A naive hook captures
//! the same bytes twice. The guard tracks a per-thread, per-category call
//! depth so that only the outermost invocation of an operation category
//! performs capture.
//!
//! Depth state is strictly thread-local. A logical call chain for one
//! request does not span threads in this design; a host that moves work
//! across threads mid-request must carry and reset this state explicitly.

use std::cell::RefCell;

/// Operation categories tracked independently per thread.
///
/// Reads and writes on the same thread may interleave (a response write
/// triggered while a request read is in flight); their depths must not
/// interfere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCategory {
    /// Intercepted reads from a request payload stream.
    Read,
    /// Intercepted writes to a response payload stream.
    Write,
}

const CATEGORY_COUNT: usize = 2;

thread_local! {
    static DEPTHS: RefCell<[u32; CATEGORY_COUNT]> = const { RefCell::new([0; CATEGORY_COUNT]) };
}

/// Increment and return the post-increment depth for the calling thread and
/// category.
///
/// Callers treat a result greater than 1 as "skip capture, a reentrant call
/// is already handling this operation".
pub fn enter(category: OpCategory) -> u32 {
    DEPTHS.with_borrow_mut(|depths| {
        let slot = &mut depths[category as usize];
        *slot += 1;
        *slot
    })
}

/// Unconditionally reset the depth for this thread and category to 0.
///
/// Invoked once when the outermost call concludes, regardless of how many
/// nested increments occurred. Resetting (rather than decrementing) means
/// leftover depth from a prior, already-completed chain can never leak into
/// the next call on the same thread.
pub fn complete_and_reset(category: OpCategory) {
    DEPTHS.with_borrow_mut(|depths| {
        depths[category as usize] = 0;
    });
}

/// Current depth for this thread and category.
pub fn current_depth(category: OpCategory) -> u32 {
    DEPTHS.with_borrow(|depths| depths[category as usize])
}

/// RAII wrapper around [`enter`] / [`complete_and_reset`].
///
/// The scope records whether it was the outermost entry; on drop, only the
/// outermost scope resets the counter. Nested scopes drop without touching
/// it, so an inner hook returning early cannot disturb the outer chain.
#[derive(Debug)]
pub struct ReentrancyScope {
    category: OpCategory,
    depth: u32,
}

impl ReentrancyScope {
    /// Enter the category and capture the resulting depth.
    pub fn enter(category: OpCategory) -> Self {
        let depth = enter(category);
        Self { category, depth }
    }

    /// Returns `true` if this scope is the outermost entry for its
    /// category on this thread, i.e. the one that should perform capture.
    pub fn is_outermost(&self) -> bool {
        self.depth == 1
    }

    /// The post-increment depth observed at entry.
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

impl Drop for ReentrancyScope {
    fn drop(&mut self) {
        if self.is_outermost() {
            complete_and_reset(self.category);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_starts_at_zero_and_increments() {
        complete_and_reset(OpCategory::Read);
        assert_eq!(current_depth(OpCategory::Read), 0);
        assert_eq!(enter(OpCategory::Read), 1);
        assert_eq!(enter(OpCategory::Read), 2);
        assert_eq!(enter(OpCategory::Read), 3);
        complete_and_reset(OpCategory::Read);
        assert_eq!(current_depth(OpCategory::Read), 0);
    }

    #[test]
    fn test_reset_not_decrement() {
        complete_and_reset(OpCategory::Write);
        // Simulate an outer call with several nested entries that never
        // individually unwind; a single reset clears everything.
        enter(OpCategory::Write);
        enter(OpCategory::Write);
        enter(OpCategory::Write);
        complete_and_reset(OpCategory::Write);
        // The next chain starts fresh at depth 1.
        assert_eq!(enter(OpCategory::Write), 1);
        complete_and_reset(OpCategory::Write);
    }

    #[test]
    fn test_categories_are_independent() {
        complete_and_reset(OpCategory::Read);
        complete_and_reset(OpCategory::Write);
        assert_eq!(enter(OpCategory::Read), 1);
        assert_eq!(enter(OpCategory::Write), 1);
        assert_eq!(enter(OpCategory::Read), 2);
        assert_eq!(current_depth(OpCategory::Write), 1);
        complete_and_reset(OpCategory::Read);
        assert_eq!(current_depth(OpCategory::Write), 1);
        complete_and_reset(OpCategory::Write);
    }

    #[test]
    fn test_threads_do_not_share_depth() {
        complete_and_reset(OpCategory::Read);
        enter(OpCategory::Read);
        let other = std::thread::spawn(|| {
            // Fresh thread, fresh counter
            assert_eq!(current_depth(OpCategory::Read), 0);
            assert_eq!(enter(OpCategory::Read), 1);
            complete_and_reset(OpCategory::Read);
        });
        other.join().unwrap();
        assert_eq!(current_depth(OpCategory::Read), 1);
        complete_and_reset(OpCategory::Read);
    }

    #[test]
    fn test_scope_only_outermost_resets() {
        complete_and_reset(OpCategory::Write);
        {
            let outer = ReentrancyScope::enter(OpCategory::Write);
            assert!(outer.is_outermost());
            {
                let inner = ReentrancyScope::enter(OpCategory::Write);
                assert!(!inner.is_outermost());
                assert_eq!(inner.depth(), 2);
            }
            // Inner drop must not have reset the counter mid-chain.
            assert_eq!(current_depth(OpCategory::Write), 2);
        }
        // Outer drop resets to zero even though depth was 2.
        assert_eq!(current_depth(OpCategory::Write), 0);
    }

    #[test]
    fn test_capture_happens_exactly_once_per_chain() {
        complete_and_reset(OpCategory::Write);
        let mut captures = 0;
        {
            let outer = ReentrancyScope::enter(OpCategory::Write);
            if outer.is_outermost() {
                captures += 1;
            }
            // An outer write(range) delegating to write(unit) per element
            for _ in 0..5 {
                let inner = ReentrancyScope::enter(OpCategory::Write);
                if inner.is_outermost() {
                    captures += 1;
                }
            }
        }
        assert_eq!(captures, 1);
        assert_eq!(current_depth(OpCategory::Write), 0);
    }
}
