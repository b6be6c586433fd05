//! Presence roster for the active room.
//!
//! Members are partitioned into an online set (status `online` or `idle`)
//! and an offline set. A user id is in at most one of the two.

use bubble_shared::{PresenceStatus, PresenceUpdate, RosterEntry};

/// What an `update` did to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    /// First sighting, inserted into the online set.
    Joined,
    /// Status changed within the online set (`online` <-> `idle`).
    Updated,
    /// Moved from the online set to the offline set.
    WentOffline,
    /// Moved from the offline set to the online set.
    CameOnline,
    /// Same status as before.
    Unchanged,
    /// `offline` for a user never seen; nothing to track.
    Ignored,
    /// The roster has not been seeded yet; replayed after the seed.
    Queued,
}

impl PresenceChange {
    pub fn is_change(self) -> bool {
        matches!(
            self,
            PresenceChange::Joined
                | PresenceChange::Updated
                | PresenceChange::WentOffline
                | PresenceChange::CameOnline
        )
    }
}

/// Updates for one user received before the seed, collapsed to the latest
/// status.
#[derive(Debug, Clone, PartialEq)]
struct Queued {
    latest: PresenceUpdate,
    /// Seen `online` or `idle` at some point, so the user must be tracked
    /// even when the latest status is `offline`.
    sighted: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    online: Vec<RosterEntry>,
    offline: Vec<RosterEntry>,
    seeded: bool,
    /// One slot per user, in order of first update.
    pending: Vec<Queued>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate from a full roster fetch, replacing anything known, then
    /// replay updates that arrived before it. Later duplicates of a user id
    /// win.
    pub fn seed(&mut self, entries: impl IntoIterator<Item = RosterEntry>) {
        self.online.clear();
        self.offline.clear();
        for entry in entries {
            self.remove_user(&entry.user_id);
            if entry.status.is_online() {
                self.online.push(entry);
            } else {
                self.offline.push(entry);
            }
        }
        self.seeded = true;

        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            crate::log_debug!("Replaying {} presence updates after seed", pending.len());
        }
        for queued in &pending {
            if queued.sighted && !queued.latest.status.is_online() {
                let sighting = PresenceUpdate {
                    user_id: queued.latest.user_id.clone(),
                    status: PresenceStatus::Online,
                };
                self.apply(&sighting);
            }
            self.apply(&queued.latest);
        }
    }

    /// Number of users with updates waiting for the seed.
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Apply one presence update.
    pub fn apply(&mut self, update: &PresenceUpdate) -> PresenceChange {
        if !self.seeded {
            self.queue(update);
            return PresenceChange::Queued;
        }

        let user_id = update.user_id.as_str();
        let status = update.status;

        if let Some(entry) = self.online.iter_mut().find(|e| e.user_id == user_id) {
            if entry.status == status {
                return PresenceChange::Unchanged;
            }
            if status.is_online() {
                entry.status = status;
                return PresenceChange::Updated;
            }
            let mut entry = take_entry(&mut self.online, user_id);
            entry.status = PresenceStatus::Offline;
            self.offline.push(entry);
            return PresenceChange::WentOffline;
        }

        if self.offline.iter().any(|e| e.user_id == user_id) {
            if !status.is_online() {
                return PresenceChange::Unchanged;
            }
            let mut entry = take_entry(&mut self.offline, user_id);
            entry.status = status;
            self.online.push(entry);
            return PresenceChange::CameOnline;
        }

        if status.is_online() {
            self.online.push(RosterEntry::sighted(user_id, status));
            PresenceChange::Joined
        } else {
            crate::log_debug!("Ignoring offline update for unknown user {}", user_id);
            PresenceChange::Ignored
        }
    }

    /// Members with status `online` or `idle`, in order of first sighting.
    pub fn online(&self) -> &[RosterEntry] {
        &self.online
    }

    pub fn offline(&self) -> &[RosterEntry] {
        &self.offline
    }

    pub fn get(&self, user_id: &str) -> Option<&RosterEntry> {
        self.online
            .iter()
            .chain(self.offline.iter())
            .find(|e| e.user_id == user_id)
    }

    /// `None` for users this roster does not track.
    pub fn status_of(&self, user_id: &str) -> Option<PresenceStatus> {
        self.get(user_id).map(|e| e.status)
    }

    pub fn len(&self) -> usize {
        self.online.len() + self.offline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything, including queued updates.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn queue(&mut self, update: &PresenceUpdate) {
        let sighted = update.status.is_online();
        match self.pending.iter_mut().find(|q| q.latest.user_id == update.user_id) {
            Some(queued) => {
                queued.latest.status = update.status;
                queued.sighted |= sighted;
            }
            None => self.pending.push(Queued {
                latest: update.clone(),
                sighted,
            }),
        }
    }

    fn remove_user(&mut self, user_id: &str) {
        self.online.retain(|e| e.user_id != user_id);
        self.offline.retain(|e| e.user_id != user_id);
    }
}

/// Remove and return the entry for `user_id`. Callers check presence first.
fn take_entry(list: &mut Vec<RosterEntry>, user_id: &str) -> RosterEntry {
    match list.iter().position(|e| e.user_id == user_id) {
        Some(index) => list.remove(index),
        None => RosterEntry::sighted(user_id, PresenceStatus::Offline),
    }
}
