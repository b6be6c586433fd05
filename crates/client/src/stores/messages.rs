//! Message timeline for the active room.
//!
//! The timeline is a sequence in arrival order. Edits and deletes keep the
//! position of every other entry. Reply references may dangle.
//!
//! Until history is loaded, edits and deletes are also remembered by id so
//! the history snapshot cannot bring back a deleted message or an old
//! version of an edited one.

use std::collections::{HashMap, HashSet};

use bubble_shared::{Message, MessageId, RoomId};

/// Result of [`Timeline::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// An entry with the same id is already present.
    Duplicate,
    /// The message belongs to another room.
    OtherRoom,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    room: Option<RoomId>,
    messages: Vec<Message>,
    history_loaded: bool,
    /// Deleted before history was loaded.
    tombstones: HashSet<MessageId>,
    /// Latest content per id edited before history was loaded.
    early_edits: HashMap<MessageId, String>,
}

impl Timeline {
    /// Empty timeline for `room`.
    pub fn for_room(room: RoomId) -> Self {
        Self {
            room: Some(room),
            ..Self::default()
        }
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    /// Add to the end if the message belongs to this timeline's room.
    pub fn append(&mut self, message: Message) -> AppendOutcome {
        if self.room.as_ref() != Some(&message.room_id) {
            crate::log_debug!("Ignoring message {} for room {}", message.id, message.room_id);
            return AppendOutcome::OtherRoom;
        }
        if self.get(message.id).is_some() {
            return AppendOutcome::Duplicate;
        }
        self.messages.push(message);
        AppendOutcome::Appended
    }

    /// Replace the content of message `id`. Unknown ids are a no-op.
    pub fn edit_in_place(&mut self, id: MessageId, content: &str) -> bool {
        if !self.history_loaded && !self.tombstones.contains(&id) {
            self.early_edits.insert(id, content.to_string());
        }
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.content = content.to_string();
                true
            }
            None => {
                crate::log_debug!("Edit for unknown message {}", id);
                false
            }
        }
    }

    /// Delete message `id`. Unknown ids are a no-op.
    pub fn remove(&mut self, id: MessageId) -> Option<Message> {
        if !self.history_loaded {
            self.early_edits.remove(&id);
            self.tombstones.insert(id);
        }
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    /// The message that `id` replies to, for a reply preview. `None` when `id`
    /// is not a reply or its target is gone. If the target id occurs more than
    /// once the earliest entry is used.
    pub fn resolve_reply(&self, id: MessageId) -> Option<&Message> {
        let target = self.get(id)?.reply_to_id?;
        self.get(target)
    }

    /// Every entry carrying the referenced id.
    pub fn reply_targets(&self, id: MessageId) -> Vec<&Message> {
        match self.get(id).and_then(|m| m.reply_to_id) {
            Some(target) => self.messages.iter().filter(|m| m.id == target).collect(),
            None => Vec::new(),
        }
    }

    /// Replace the sequence with fetched history. Live messages that arrived
    /// while the fetch was in flight and are not part of it stay, after the
    /// history. Messages for other rooms and repeated ids are skipped, and
    /// edits and deletes seen before the load are applied on top.
    /// Returns the resulting length.
    pub fn replace_history(&mut self, history: impl IntoIterator<Item = Message>) -> usize {
        let live = std::mem::take(&mut self.messages);
        let tombstones = std::mem::take(&mut self.tombstones);
        let mut edits = std::mem::take(&mut self.early_edits);
        self.history_loaded = true;

        for mut message in history.into_iter().chain(live) {
            if tombstones.contains(&message.id) {
                continue;
            }
            if let Some(content) = edits.remove(&message.id) {
                message.content = content;
            }
            self.append(message);
        }
        self.messages.len()
    }

    /// Whether history has been applied with [`Timeline::replace_history`].
    pub fn is_history_loaded(&self) -> bool {
        self.history_loaded
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether message `id` exists and was written by `display_name`.
    pub fn is_authored_by(&self, id: MessageId, display_name: &str) -> bool {
        self.get(id)
            .is_some_and(|m| m.author_display_name == display_name)
    }
}
