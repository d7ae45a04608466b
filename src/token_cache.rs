//! In-memory access token cache, keyed by refresh token.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Seconds shaved off the provider's declared lifetime, to cover clock skew and requests
/// still in flight when the token expires.
pub const EXPIRY_MARGIN_SECS: i64 = 300;

/// Declared lifetimes are capped at a year.
const MAX_LIFETIME_SECS: u64 = 365 * 24 * 60 * 60;

/// An access token together with the moment it stops being usable.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Build an entry for a token issued now with the given declared lifetime.
    pub fn issued_now(access_token: String, lifetime_secs: u64) -> CachedToken {
        let lifetime = lifetime_secs.min(MAX_LIFETIME_SECS) as i64;
        let expires_at = Utc::now() + Duration::seconds(lifetime - EXPIRY_MARGIN_SECS);

        CachedToken { access_token, expires_at }
    }

    /// Whether the entry may still be handed out.
    pub fn is_live(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Maps refresh tokens to their most recent access token.
///
/// Entries are replaced whole, never mutated in place, and every operation touches a single
/// key. Two callers racing on a stale entry both refresh; whichever write lands last wins,
/// and either token is valid.
///
/// Entries live for the lifetime of the cache. There is no eviction.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: DashMap<String, CachedToken>,
}

impl TokenCache {
    pub fn new() -> TokenCache {
        TokenCache {
            tokens: DashMap::new(),
        }
    }

    /// Get the cached access token for `refresh_token`, if it has not expired.
    pub fn get(&self, refresh_token: &str) -> Option<String> {
        self.tokens
            .get(refresh_token)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.access_token.clone())
    }

    /// Get the raw entry for `refresh_token`, live or not.
    pub fn entry(&self, refresh_token: &str) -> Option<CachedToken> {
        self.tokens.get(refresh_token).map(|entry| entry.value().clone())
    }

    /// Store a freshly issued access token, applying the expiry margin.
    pub fn store(&self, refresh_token: &str, access_token: String, lifetime_secs: u64) -> CachedToken {
        let entry = CachedToken::issued_now(access_token, lifetime_secs);
        self.insert(refresh_token, entry.clone());

        entry
    }

    /// Put an entry into the cache as-is, replacing any previous one.
    pub fn insert(&self, refresh_token: &str, entry: CachedToken) {
        self.tokens.insert(refresh_token.to_string(), entry);
    }

    /// Drop the entry for `refresh_token`. Returns whether one existed.
    pub fn invalidate(&self, refresh_token: &str) -> bool {
        self.tokens.remove(refresh_token).is_some()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
