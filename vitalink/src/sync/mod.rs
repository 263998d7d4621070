//! Client for the managed data-sync backend, which the monitor reaches two
//! ways: a registry lookup that maps session keys to identifiers, and the
//! realtime channel that pushes row inserts for one session.

mod channel;
pub mod proto;

pub use channel::{ChannelEvent, ChannelStatus, Subscription};

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::data::SessionId;
use crate::session::SessionKey;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum Error {
    /// Registry request never completed.
    Http(reqwest::Error),
    /// Registry answered with a non-success status.
    Status(u16),
    /// Registry response body was not what was promised.
    Decode(String),
    /// The websocket connection could not be established.
    Connect(String),
    /// The channel failed while joining or sending.
    Channel(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "registry request failed: {}", e),
            Error::Status(code) => write!(f, "registry returned status {}", code),
            Error::Decode(msg) => write!(f, "unexpected registry response: {}", msg),
            Error::Connect(msg) => write!(f, "realtime connect failed: {}", msg),
            Error::Channel(msg) => write!(f, "realtime channel failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::Http(e)
    }
}

/// Explicitly constructed handle to the data-sync backend. Owners pass it
/// where it is needed; there is no process-wide instance.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    base: String,
    token: String,
    http: reqwest::blocking::Client,
}

impl Client {
    pub fn new(base: &str, token: &str) -> Result<Client, Error> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Client {
            base: base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        })
    }

    /// Look up the internal identifier registered for a session key.
    /// Zero matching rows is not an error: resolution stays pending.
    pub fn session_id(&self, key: &SessionKey) -> Result<Option<SessionId>, Error> {
        #[derive(Deserialize)]
        struct Row {
            id: SessionId,
        }

        let url = format!(
            "{}/registry/sessions?session_key=eq.{}&select=id",
            self.base, key
        );
        let resp = self.http.get(url).header("apikey", &self.token).send()?;
        if !resp.status().is_success() {
            return Err(Error::Status(resp.status().as_u16()));
        }
        let rows: Vec<Row> = resp.json().map_err(|e| Error::Decode(e.to_string()))?;
        Ok(rows.first().map(|row| row.id))
    }

    /// Open the live channel for a resolved session identifier.
    pub fn subscribe(&self, session_id: SessionId) -> Result<Subscription, Error> {
        channel::open(&self.ws_url(), &self.token, session_id)
    }

    fn ws_url(&self) -> String {
        let base = if let Some(rest) = self.base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base.clone()
        };
        format!("{}/realtime/ws", base)
    }
}
