use clap::Parser;
use vitalink::{api, sync, util};

/// Service endpoints shared by every tool.
#[derive(Parser, Debug, Clone)]
pub struct ServiceOpts {
    /// Vitals API server address (e.g., http://localhost:8080)
    #[arg(
        long = "api",
        default_value_t = util::default_api_url(),
        help = "Vitals API server address"
    )]
    pub api: String,

    /// Data-sync backend address (registry + realtime channels)
    #[arg(
        long = "sync",
        default_value_t = util::default_sync_url(),
        help = "Data-sync backend address"
    )]
    pub sync: String,

    /// Data-sync backend access token
    #[arg(
        long = "sync-token",
        default_value_t = util::default_sync_token(),
        hide_default_value = true,
        help = "Data-sync backend access token"
    )]
    pub sync_token: String,
}

impl ServiceOpts {
    pub fn api_client(&self) -> Result<api::Client, api::Error> {
        api::Client::new(&self.api)
    }

    pub fn sync_client(&self) -> Result<sync::Client, sync::Error> {
        sync::Client::new(&self.sync, &self.sync_token)
    }
}
