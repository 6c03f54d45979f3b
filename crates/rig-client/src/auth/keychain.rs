use keyring::Entry;
use tracing::warn;

use super::session::{MemorySessionStore, SessionStore, TokenPair};

const SERVICE_NAME: &str = "rig-client";

/// Whether this target has a native keychain backend compiled in. Elsewhere
/// keyring falls back to an in-process mock that forgets everything on exit.
const NATIVE_BACKEND: bool = cfg!(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "windows"
));

/// Session kept in the OS keychain, one entry per profile.
///
/// Backends: macOS/iOS Keychain, Windows Credential Manager and the Linux
/// kernel keyutils session keyring. Like [`super::FileSessionStore`] it
/// caches the pair in memory and writes through on every update; keychain
/// failures are logged, not returned.
pub struct KeyringSessionStore {
    profile: String,
    entry: Option<Entry>,
    cached: MemorySessionStore,
}

impl KeyringSessionStore {
    /// Open the keychain entry for `profile`, loading any stored session.
    pub fn new(profile: impl Into<String>) -> Self {
        let profile = profile.into();
        if !NATIVE_BACKEND {
            warn!(profile = %profile, "No native keychain on this platform, session will not persist");
        }
        match Entry::new(SERVICE_NAME, &profile) {
            Ok(entry) => Self::with_entry(profile, entry),
            Err(e) => {
                warn!(profile = %profile, error = %e, "Failed to open keychain entry");
                Self {
                    profile,
                    entry: None,
                    cached: MemorySessionStore::new(),
                }
            }
        }
    }

    fn with_entry(profile: String, entry: Entry) -> Self {
        let tokens = load(&entry).unwrap_or_else(|e| {
            warn!(profile = %profile, error = %e, "Failed to read session from keychain");
            TokenPair::default()
        });
        Self {
            profile,
            entry: Some(entry),
            cached: MemorySessionStore::with_tokens(tokens),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

fn load(entry: &Entry) -> keyring::Result<TokenPair> {
    match entry.get_password() {
        Ok(secret) => Ok(serde_json::from_str(&secret).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring malformed keychain session");
            TokenPair::default()
        })),
        Err(keyring::Error::NoEntry) => Ok(TokenPair::default()),
        Err(e) => Err(e),
    }
}

/// Write `tokens`, or delete the entry when both tokens are empty.
fn save(entry: &Entry, tokens: &TokenPair) -> keyring::Result<()> {
    if tokens.is_empty() && tokens.refresh_token.is_empty() {
        return match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        };
    }
    let secret =
        serde_json::to_string(tokens).map_err(|e| keyring::Error::PlatformFailure(Box::new(e)))?;
    entry.set_password(&secret)
}

impl SessionStore for KeyringSessionStore {
    fn access_token(&self) -> String {
        self.cached.access_token()
    }

    fn refresh_token(&self) -> String {
        self.cached.refresh_token()
    }

    fn set_tokens(&self, access_token: &str, refresh_token: &str) {
        self.cached.set_tokens(access_token, refresh_token);
        let Some(entry) = &self.entry else {
            return;
        };
        if let Err(e) = save(entry, &TokenPair::new(access_token, refresh_token)) {
            warn!(profile = %self.profile, error = %e, "Failed to store session in keychain");
        }
    }

    fn tokens(&self) -> TokenPair {
        self.cached.tokens()
    }

    fn name(&self) -> &str {
        "keyring"
    }
}

#[cfg(test)]
mod tests {
    use keyring::mock::MockCredential;

    use super::*;

    fn mock_entry() -> Entry {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        Entry::new(SERVICE_NAME, "test-profile").unwrap()
    }

    fn mock_store() -> KeyringSessionStore {
        KeyringSessionStore::with_entry("test-profile".to_string(), mock_entry())
    }

    fn stored(store: &KeyringSessionStore) -> keyring::Result<String> {
        store.entry.as_ref().unwrap().get_password()
    }

    #[test]
    fn test_empty_entry_loads_empty_session() {
        let store = mock_store();
        assert!(store.tokens().is_empty());
        assert_eq!(store.name(), "keyring");
        assert_eq!(store.profile(), "test-profile");
    }

    #[test]
    fn test_stored_session_is_loaded() {
        let entry = mock_entry();
        entry
            .set_password(r#"{"access_token":"A","refresh_token":"R"}"#)
            .unwrap();

        let store = KeyringSessionStore::with_entry("test-profile".to_string(), entry);
        assert_eq!(store.tokens(), TokenPair::new("A", "R"));
    }

    #[test]
    fn test_set_tokens_writes_through() {
        let store = mock_store();
        store.set_tokens("A", "R");

        assert_eq!(store.tokens(), TokenPair::new("A", "R"));
        let secret = stored(&store).unwrap();
        let saved: TokenPair = serde_json::from_str(&secret).unwrap();
        assert_eq!(saved, TokenPair::new("A", "R"));
    }

    #[test]
    fn test_empty_pair_deletes_entry() {
        let store = mock_store();
        store.set_tokens("A", "R");
        store.set_tokens("", "");

        assert!(store.tokens().is_empty());
        assert!(matches!(stored(&store), Err(keyring::Error::NoEntry)));

        // Deleting an entry that does not exist is fine too
        store.set_tokens("", "");
        assert!(matches!(stored(&store), Err(keyring::Error::NoEntry)));
    }

    #[test]
    fn test_malformed_secret_falls_back_to_empty() {
        let entry = mock_entry();
        entry.set_password("not json").unwrap();

        let store = KeyringSessionStore::with_entry("test-profile".to_string(), entry);
        assert!(store.tokens().is_empty());
    }

    #[test]
    fn test_keychain_read_error_falls_back_to_empty() {
        let entry = mock_entry();
        let mock: &MockCredential = entry.get_credential().downcast_ref().unwrap();
        mock.set_error(keyring::Error::PlatformFailure("locked".into()));

        let store = KeyringSessionStore::with_entry("test-profile".to_string(), entry);
        assert!(store.tokens().is_empty());
    }

    #[test]
    fn test_keychain_write_error_keeps_cached_pair() {
        let store = mock_store();
        let mock: &MockCredential = store
            .entry
            .as_ref()
            .unwrap()
            .get_credential()
            .downcast_ref()
            .unwrap();
        mock.set_error(keyring::Error::PlatformFailure("locked".into()));

        store.set_tokens("A", "R");
        assert_eq!(store.tokens(), TokenPair::new("A", "R"));
        assert!(matches!(stored(&store), Err(keyring::Error::NoEntry)));
    }
}
