//! Warnings about unavailable storages.
//!
//! Each distinct message is emitted once per process, through `tracing`,
//! unless [`disable_warnings`] was called.

use crate::platform::Platform;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use tracing::warn;

static NO_WARNINGS: AtomicBool = AtomicBool::new(false);

static ALREADY_WARNED: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

const SERVER_HINT: &str =
    "Are you running on a server? Most of storages are not available while running on a server.";

/// Silences warnings about missing storages for the rest of the process.
///
/// Useful when the library runs where no browser storage exists.
pub fn disable_warnings() {
    NO_WARNINGS.store(true, Ordering::SeqCst);
}

/// Whether missing-storage warnings are still emitted.
pub fn warnings_enabled() -> bool {
    !NO_WARNINGS.load(Ordering::SeqCst)
}

/// Messages emitted so far, in no particular order.
pub fn emitted_warnings() -> Vec<String> {
    ALREADY_WARNED.lock().iter().cloned().collect()
}

/// Emits `message` unless warnings are disabled or it was already emitted.
///
/// Returns whether the warning was emitted.
pub(crate) fn warn_user(message: &str, platform: &Platform) -> bool {
    if !warnings_enabled() {
        return false;
    }
    if !ALREADY_WARNED.lock().insert(message.to_string()) {
        return false;
    }

    if platform.is_browser() {
        warn!(target: "persistore::warnings", "{message}");
    } else {
        warn!(target: "persistore::warnings", "{message}\n{SERVER_HINT}");
    }
    true
}

/// Warns that the storage called `storage_name` does not exist.
pub(crate) fn warn_storage_not_found(storage_name: &str, platform: &Platform) -> bool {
    warn_user(
        &format!("Unable to find the {storage_name}. No data will be persisted."),
        platform,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_message_is_emitted_once() {
        let platform = Platform::detached();
        assert!(warn_user("warnings test: first", &platform));
        assert!(!warn_user("warnings test: first", &platform));
        assert!(warn_user("warnings test: second", &platform));
    }

    #[test]
    fn storage_not_found_message_names_the_storage() {
        let platform = Platform::detached();
        warn_storage_not_found("warnings test storage", &platform);
        assert!(emitted_warnings().contains(
            &"Unable to find the warnings test storage. No data will be persisted.".to_string()
        ));
    }
}
