/// Key holding the serialized session collection
pub const SESSIONS_KEY: &str = "tutorchat.sessions";

/// Key holding the user preferences object
pub const PREFERENCES_KEY: &str = "tutorchat.preferences";

/// Key holding aggregate progress statistics
pub const PROGRESS_KEY: &str = "tutorchat.progress";

/// Key holding the bookmarked-messages list
pub const BOOKMARKS_KEY: &str = "tutorchat.bookmarks";

/// Key evicted first when a non-session write hits the capacity limit
pub const LOW_PRIORITY_KEY: &str = PROGRESS_KEY;

/// Sessions retained when the session collection no longer fits
pub const DEFAULT_MAX_SESSIONS_ON_QUOTA: usize = 10;

/// Default store capacity in bytes, matching a typical browser origin quota
pub const DEFAULT_CAPACITY_BYTES: usize = 5 * 1024 * 1024;

/// Result of a [`super::PersistentStore::write`] call
///
/// Writes never fail past the store boundary; this reports what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The value was stored as given
    Written,
    /// The value was stored after applying the degradation policy
    Degraded,
    /// The write was dropped; in-memory state is the only copy
    Dropped,
}

impl WriteOutcome {
    /// Whether anything reached the backend
    pub fn is_success(self) -> bool {
        !matches!(self, WriteOutcome::Dropped)
    }
}
