use std::env;

/// Base address of the vitals API server.
pub fn default_api_url() -> String {
    env::var("VITALS_API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

/// Base address of the data-sync backend (registry + realtime channels).
pub fn default_sync_url() -> String {
    env::var("VITALS_SYNC_URL").unwrap_or_else(|_| "http://localhost:4000".to_string())
}

/// Access token for the data-sync backend. Empty when unset.
pub fn default_sync_token() -> String {
    env::var("VITALS_SYNC_TOKEN").unwrap_or_default()
}
