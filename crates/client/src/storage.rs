//! Session token storage.
//!
//! The token is an opaque string owned by the login flow. The sync core only
//! reads it before authorized commands; it never parses or mutates it.
//!
//! - Web: `localStorage`
//! - Desktop: JSON files in the platform-appropriate config directory:
//!   - Linux: `~/.config/bubble/`
//!   - macOS: `~/Library/Application Support/bubble/`
//!   - Windows: `%APPDATA%\bubble\`

use std::cell::RefCell;

/// Key the session token is stored under.
pub const TOKEN_KEY: &str = "token";

/// Opaque get/set access to the session token.
pub trait TokenStore {
    fn token(&self) -> Option<String>;
    fn set_token(&self, token: &str);
    fn clear(&self);
}

/// Persistent token store backed by the platform storage.
#[derive(Debug, Clone)]
pub struct LocalTokenStore {
    key: String,
}

impl LocalTokenStore {
    pub fn new() -> Self {
        Self::with_key(TOKEN_KEY)
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Default for LocalTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for LocalTokenStore {
    fn token(&self) -> Option<String> {
        let raw = load_raw(&self.key)?;
        // Desktop stores JSON strings; fall back to the raw value for tokens
        // written by other tools.
        let token = serde_json::from_str::<String>(&raw).unwrap_or(raw);
        (!token.is_empty()).then_some(token)
    }

    fn set_token(&self, token: &str) {
        let saved = match serde_json::to_string(token) {
            Ok(json) => save_raw(&self.key, &json),
            Err(_) => false,
        };
        if !saved {
            crate::log_warn!("failed to persist session token");
        }
    }

    fn clear(&self) {
        remove_raw(&self.key);
    }
}

/// In-memory token store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RefCell<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: RefCell::new(Some(token.into())) }
    }
}

impl TokenStore for MemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token.borrow().clone().filter(|t| !t.is_empty())
    }

    fn set_token(&self, token: &str) {
        *self.token.borrow_mut() = Some(token.to_string());
    }

    fn clear(&self) {
        *self.token.borrow_mut() = None;
    }
}

// =========================================
// Web (WASM) implementation
// =========================================

#[cfg(target_arch = "wasm32")]
fn local_storage() -> Option<web_sys::Storage> {
    web_sys::window()?.local_storage().ok()?
}

#[cfg(target_arch = "wasm32")]
fn save_raw(key: &str, value: &str) -> bool {
    local_storage().is_some_and(|storage| storage.set_item(key, value).is_ok())
}

#[cfg(target_arch = "wasm32")]
fn load_raw(key: &str) -> Option<String> {
    local_storage()?.get_item(key).ok()?
}

#[cfg(target_arch = "wasm32")]
fn remove_raw(key: &str) {
    if let Some(storage) = local_storage() {
        let _ = storage.remove_item(key);
    }
}

// =========================================
// Desktop (native) implementation
// =========================================

#[cfg(not(target_arch = "wasm32"))]
fn get_config_dir() -> Option<std::path::PathBuf> {
    let app_dir = dirs::config_dir()?.join("bubble");

    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir).ok()?;
    }

    Some(app_dir)
}

#[cfg(not(target_arch = "wasm32"))]
fn get_file_path(key: &str) -> Option<std::path::PathBuf> {
    let config_dir = get_config_dir()?;
    // Sanitize key to be a valid filename
    let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
    Some(config_dir.join(format!("{}.json", safe_key)))
}

#[cfg(not(target_arch = "wasm32"))]
fn save_raw(key: &str, value: &str) -> bool {
    let Some(path) = get_file_path(key) else {
        return false;
    };
    std::fs::write(path, value).is_ok()
}

#[cfg(not(target_arch = "wasm32"))]
fn load_raw(key: &str) -> Option<String> {
    let path = get_file_path(key)?;
    std::fs::read_to_string(path).ok()
}

#[cfg(not(target_arch = "wasm32"))]
fn remove_raw(key: &str) {
    if let Some(path) = get_file_path(key) {
        let _ = std::fs::remove_file(path);
    }
}
