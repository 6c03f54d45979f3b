use std::fmt;

use crate::models::{ClientCredentials, LoginMethod, LoginRequest, UserIdentifier, UserPassword};

/// Environment variable holding the OAuth2 client id.
pub const ENV_CLIENT_ID: &str = "RIG_CLIENT_ID";

/// Environment variable holding the OAuth2 client secret.
pub const ENV_CLIENT_SECRET: &str = "RIG_CLIENT_SECRET";

/// Long-lived credential used to obtain the first token pair.
///
/// Configured once when the client is built and only exchanged when the
/// session store is empty.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// OAuth2 client credentials of a service account.
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    /// A user's login, optionally scoped by API key or project.
    UserPassword {
        identifier: UserIdentifier,
        password: String,
        api_key: Option<String>,
        project_id: Option<String>,
    },
}

impl Credential {
    pub fn client_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Credential::ClientCredentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn email_password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::UserPassword {
            identifier: UserIdentifier::Email(email.into()),
            password: password.into(),
            api_key: None,
            project_id: None,
        }
    }

    /// Client credentials from `RIG_CLIENT_ID` / `RIG_CLIENT_SECRET`.
    ///
    /// Returns `None` unless the client id is set; a missing secret is
    /// treated as empty.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let client_id = lookup(ENV_CLIENT_ID)?;
        let client_secret = lookup(ENV_CLIENT_SECRET).unwrap_or_default();
        Some(Self::client_credentials(client_id, client_secret))
    }

    /// The `Login` request this credential is exchanged with.
    pub fn to_login_request(&self) -> LoginRequest {
        let method = match self {
            Credential::ClientCredentials {
                client_id,
                client_secret,
            } => LoginMethod::ClientCredentials(ClientCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            }),
            Credential::UserPassword {
                identifier,
                password,
                api_key,
                project_id,
            } => LoginMethod::UserPassword(UserPassword {
                identifier: identifier.clone(),
                password: password.clone(),
                api_key: api_key.clone(),
                project_id: project_id.clone(),
            }),
        };
        LoginRequest { method }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Credential::UserPassword {
                identifier,
                project_id,
                ..
            } => f
                .debug_struct("UserPassword")
                .field("identifier", identifier)
                .field("password", &"<redacted>")
                .field("project_id", project_id)
                .finish_non_exhaustive(),
        }
    }
}
