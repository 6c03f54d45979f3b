use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::Token;

/// Application name used for the session directory path
const APP_NAME: &str = "rig";

/// Session file name in the config directory
const SESSION_FILE: &str = "session.json";

/// The current access/refresh token pair.
///
/// Replaced wholesale on every login or refresh; empty strings mean
/// "no session".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty()
    }
}

impl From<Token> for TokenPair {
    fn from(token: Token) -> Self {
        Self::new(token.access_token, token.refresh_token)
    }
}

/// Holds the tokens the client authenticates with.
///
/// The client reads and writes the store from every call site, so
/// implementations must tolerate concurrent use. `set_tokens` must replace
/// both tokens together. There is no error channel: a store that fails to
/// read reports empty tokens.
///
/// The default is [`MemorySessionStore`]. Provide your own (e.g. backed by a
/// config file) to keep a session across restarts.
pub trait SessionStore: Send + Sync {
    fn access_token(&self) -> String;

    fn refresh_token(&self) -> String;

    fn set_tokens(&self, access_token: &str, refresh_token: &str);

    /// Both tokens at once. Override when the two getters could observe
    /// different writes.
    fn tokens(&self) -> TokenPair {
        TokenPair::new(self.access_token(), self.refresh_token())
    }

    /// Used for logging.
    fn name(&self) -> &str {
        "unknown"
    }
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn access_token(&self) -> String {
        (**self).access_token()
    }

    fn refresh_token(&self) -> String {
        (**self).refresh_token()
    }

    fn set_tokens(&self, access_token: &str, refresh_token: &str) {
        (**self).set_tokens(access_token, refresh_token)
    }

    fn tokens(&self) -> TokenPair {
        (**self).tokens()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// In-memory session; lost when the process exits.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    tokens: RwLock<TokenPair>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: RwLock::new(tokens),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn access_token(&self) -> String {
        self.tokens().access_token
    }

    fn refresh_token(&self) -> String {
        self.tokens().refresh_token
    }

    fn set_tokens(&self, access_token: &str, refresh_token: &str) {
        let mut guard = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        *guard = TokenPair::new(access_token, refresh_token);
    }

    fn tokens(&self) -> TokenPair {
        self.tokens
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Session persisted as JSON on disk.
///
/// The file is read once on construction and rewritten on every
/// `set_tokens`. Write failures are logged; the in-memory copy stays
/// authoritative for this process.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    cached: MemorySessionStore,
}

impl FileSessionStore {
    /// Open the session file at `path`, loading any tokens it holds.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tokens = match Self::load(&path) {
            Ok(tokens) => tokens.unwrap_or_default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read session file");
                TokenPair::default()
            }
        };
        Self {
            path,
            cached: MemorySessionStore::with_tokens(tokens),
        }
    }

    /// Open the session file at the platform default location,
    /// e.g. `~/.config/rig/session.json`.
    pub fn open_default() -> Option<Self> {
        Self::default_path().map(Self::new)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(SESSION_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> std::io::Result<Option<TokenPair>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let tokens = serde_json::from_str(&contents)?;
        Ok(Some(tokens))
    }

    fn save(&self, tokens: &TokenPair) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(tokens)?;
        std::fs::write(&self.path, contents)?;

        // Set file permissions to 0600 on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Forget the session and delete the file.
    pub fn clear(&self) -> std::io::Result<()> {
        self.cached.set_tokens("", "");
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn access_token(&self) -> String {
        self.cached.access_token()
    }

    fn refresh_token(&self) -> String {
        self.cached.refresh_token()
    }

    fn set_tokens(&self, access_token: &str, refresh_token: &str) {
        self.cached.set_tokens(access_token, refresh_token);
        let tokens = TokenPair::new(access_token, refresh_token);
        match self.save(&tokens) {
            Ok(()) => debug!(path = %self.path.display(), "Session saved"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to save session"),
        }
    }

    fn tokens(&self) -> TokenPair {
        self.cached.tokens()
    }

    fn name(&self) -> &str {
        "file"
    }
}
