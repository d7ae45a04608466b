use serde::Deserialize;

/// Lifetime assumed when the provider does not declare one.
pub const DEFAULT_TOKEN_LIFETIME: u64 = 3600;

/// Wrapper around a token sent back from the Google OAuth token endpoint.
///
/// Unless you are inspecting the raw refresh response, you usually will not need to use
/// this struct; `Client::get_access_token()` hands back the access token directly.
#[derive(Debug, Deserialize)]
pub struct TokenRecord {
    pub access_token: Option<String>,
    pub expires_in: Option<u64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenRecord {
    /// Declared lifetime of the access token in seconds.
    pub fn lifetime(&self) -> u64 {
        self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME)
    }
}
