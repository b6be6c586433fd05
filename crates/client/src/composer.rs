//! Message composer: what the input box does on submit.

use bubble_shared::MessageId;
use url::Url;

use crate::client::SyncClient;
use crate::error::SyncError;

/// What submitting the input does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComposerMode {
    #[default]
    Message,
    Edit(MessageId),
    Reply(MessageId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    mode: ComposerMode,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ComposerMode {
        self.mode
    }

    pub fn start_edit(&mut self, id: MessageId) {
        self.mode = ComposerMode::Edit(id);
    }

    pub fn start_reply(&mut self, id: MessageId) {
        self.mode = ComposerMode::Reply(id);
    }

    pub fn cancel(&mut self) {
        self.mode = ComposerMode::Message;
    }

    /// Label shown above the input while editing or replying.
    pub fn indicator(&self) -> Option<String> {
        match self.mode {
            ComposerMode::Message => None,
            ComposerMode::Edit(id) => Some(format!("Editing message {id}")),
            ComposerMode::Reply(id) => Some(format!("Replying to message {id}")),
        }
    }

    /// Send `text` according to the current mode. Empty input does nothing.
    /// On success the composer returns to plain message mode; on error the
    /// mode is kept so the user can retry.
    pub fn submit(&mut self, client: &SyncClient, text: &str) -> Result<(), SyncError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        match self.mode {
            ComposerMode::Message => client.send_message(text)?,
            ComposerMode::Edit(id) => {
                client.edit_message(id, text)?;
            }
            ComposerMode::Reply(id) => client.reply_to_message(id, text)?,
        }
        self.mode = ComposerMode::Message;
        Ok(())
    }
}

/// The message itself if the whole message is an http(s) URL.
pub fn detect_link(text: &str) -> Option<String> {
    let candidate = text.trim();
    if candidate.is_empty() || candidate.contains(char::is_whitespace) {
        return None;
    }
    let url = Url::parse(candidate).ok()?;
    let web = matches!(url.scheme(), "http" | "https");
    (web && url.host_str().is_some_and(|h| !h.is_empty())).then(|| candidate.to_string())
}
