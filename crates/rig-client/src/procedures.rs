//! Fully-qualified procedure names the client refers to directly.

pub const AUTHENTICATION_SERVICE: &str = "api.v1.authentication.Service";

pub const LOGIN: &str = "/api.v1.authentication.Service/Login";
pub const REGISTER: &str = "/api.v1.authentication.Service/Register";
pub const VERIFY_EMAIL: &str = "/api.v1.authentication.Service/VerifyEmail";
pub const REFRESH_TOKEN: &str = "/api.v1.authentication.Service/RefreshToken";
pub const OAUTH_CALLBACK: &str = "/api.v1.authentication.Service/OauthCallback";
pub const SEND_PASSWORD_RESET: &str = "/api.v1.authentication.Service/SendPasswordReset";
pub const RESET_PASSWORD: &str = "/api.v1.authentication.Service/ResetPassword";
pub const GET_AUTH_CONFIG: &str = "/api.v1.authentication.Service/GetAuthConfig";
pub const GET: &str = "/api.v1.authentication.Service/Get";
pub const LOGOUT: &str = "/api.v1.authentication.Service/Logout";

/// Procedures callable without a session. Fixed at compile time.
pub const AUTH_EXEMPT: [&str; 8] = [
    LOGIN,
    REGISTER,
    VERIFY_EMAIL,
    REFRESH_TOKEN,
    OAUTH_CALLBACK,
    SEND_PASSWORD_RESET,
    RESET_PASSWORD,
    GET_AUTH_CONFIG,
];

pub fn requires_auth(procedure: &str) -> bool {
    !AUTH_EXEMPT.contains(&procedure)
}
