//! Presence tracking for the Banter hub.
//!
//! The [`PresenceStore`] is the single source of truth for who is online.
//! Usernames compare case-insensitively; a record is created the first time
//! an identity registers and is never deleted afterwards, so users who have
//! gone offline still appear (greyed out) in client listings.

use std::collections::HashMap;
use std::sync::Mutex;

use banter_protocol::PresenceUpdate;
use tracing::debug;

use crate::connection::ConnectionId;

/// Presence state for a single identity.
#[derive(Debug, Clone)]
struct PresenceRecord {
    /// Username in its first-registered casing.
    username: String,
    /// The connection currently bound to this user, if online.
    ///
    /// `Some` iff the user is online.
    connection: Option<ConnectionId>,
}

/// Tracks online/offline state for every identity ever registered.
///
/// All operations serialize on one internal mutex; the lock is never held
/// across I/O and is invisible to callers. Lookups normalize case, so
/// `Alice` and `alice` are the same identity.
#[derive(Debug, Default)]
pub struct PresenceStore {
    /// Records keyed by case-normalized username.
    records: Mutex<HashMap<String, PresenceRecord>>,
}

impl PresenceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an identity online and bind it to `connection`.
    ///
    /// Re-registering updates the record in place and re-binds it to the new
    /// connection. Any previous binding is overwritten without notifying the
    /// displaced session; its eventual disconnect becomes a no-op here.
    pub fn set_online(&self, username: &str, connection: ConnectionId) {
        let mut records = self.records.lock().unwrap();
        let key = username.to_lowercase();

        if let Some(record) = records.get_mut(&key) {
            if record.connection.is_some() {
                debug!(user = %record.username, connection = %connection, "Presence: rebound, displacing previous session");
            }
            record.connection = Some(connection);
        } else {
            debug!(user = %username, connection = %connection, "Presence: first registration");
            records.insert(
                key,
                PresenceRecord {
                    username: username.to_string(),
                    connection: Some(connection),
                },
            );
        }
    }

    /// Mark whichever identity is bound to `connection` offline.
    ///
    /// Lookup is by connection, not name: the disconnecting transport only
    /// knows the socket. If the identity has since re-registered elsewhere
    /// (or was never bound) this is a no-op. Returns the affected username
    /// when a record actually changed.
    pub fn set_offline(&self, connection: &ConnectionId) -> Option<String> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .values_mut()
            .find(|r| r.connection.as_ref() == Some(connection))?;

        record.connection = None;
        debug!(user = %record.username, connection = %connection, "Presence: went offline");
        Some(record.username.clone())
    }

    /// Check whether an identity is currently online.
    #[must_use]
    pub fn is_online(&self, username: &str) -> bool {
        let records = self.records.lock().unwrap();
        records
            .get(&username.to_lowercase())
            .is_some_and(|r| r.connection.is_some())
    }

    /// Number of identities ever registered.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Copy out the full presence listing.
    ///
    /// Online entries first, then case-insensitive alphabetical within each
    /// group (raw string comparison as the final tie-break) - a total order
    /// so client listings render deterministically. The copy is taken under
    /// the lock, so no entry is ever observed mid-mutation, and connection
    /// identifiers never leave the store.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PresenceUpdate> {
        let records = self.records.lock().unwrap();
        let mut users: Vec<PresenceUpdate> = records
            .values()
            .map(|r| PresenceUpdate::new(r.username.clone(), r.connection.is_some()))
            .collect();
        drop(records);

        users.sort_by(|a, b| {
            b.is_online
                .cmp(&a.is_online)
                .then_with(|| a.username.to_lowercase().cmp(&b.username.to_lowercase()))
                .then_with(|| a.username.cmp(&b.username))
        });
        users
    }
}
