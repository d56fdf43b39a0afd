//! Single-owner thread check.

use std::thread::{self, ThreadId};

/// Records which thread owns a cache and checks callers against it
///
/// The check is a debug assertion: calling from a foreign thread aborts a
/// debug build and is not checked at all in release builds. Until an owner
/// is set, any thread is accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadOwner {
    owner: Option<ThreadId>,
}

impl ThreadOwner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: ThreadId) {
        self.owner = Some(id);
    }

    pub fn get(&self) -> Option<ThreadId> {
        self.owner
    }

    /// Whether the current thread may use the cache
    pub fn is_current(&self) -> bool {
        self.owner.map_or(true, |owner| owner == thread::current().id())
    }

    #[track_caller]
    pub fn assert_current(&self) {
        debug_assert!(
            self.is_current(),
            "tile cache owned by {:?} used from {:?}",
            self.owner,
            thread::current().id()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unowned_accepts_any_thread() {
        let owner = ThreadOwner::new();
        assert!(owner.is_current());
        owner.assert_current();

        let result = thread::spawn(move || owner.is_current()).join().unwrap();
        assert!(result);
    }

    #[test]
    fn test_owner_rejects_other_threads() {
        let mut owner = ThreadOwner::new();
        owner.set(thread::current().id());

        assert!(owner.is_current());
        let result = thread::spawn(move || owner.is_current()).join().unwrap();
        assert!(!result);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_assert_panics_on_foreign_thread() {
        let mut owner = ThreadOwner::new();
        owner.set(thread::current().id());

        let result = thread::spawn(move || owner.assert_current()).join();
        assert!(result.is_err());
    }
}
