use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::data::Sample;
use crate::session::SessionKey;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum Error {
    /// The request never completed (connection refused, timeout, ...).
    Transport(reqwest::Error),
    /// The server answered with a non-success status.
    Status(u16),
    /// The response body was not what the endpoint promises.
    Decode(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "request failed: {}", e),
            Error::Status(code) => write!(f, "server returned status {}", code),
            Error::Decode(msg) => write!(f, "unexpected response body: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::Transport(e)
    }
}

/// Blocking client for the vitals API server.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    base: String,
    http: reqwest::blocking::Client,
}

impl Client {
    pub fn new(base: &str) -> Result<Client, Error> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Client {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Existence check for a session key: one request, success status only.
    /// Any failure cause collapses into an error; callers surface a uniform
    /// message.
    pub fn check_session(&self, key: &SessionKey) -> Result<(), Error> {
        let resp = self.http.get(self.data_url(key)).send()?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Status(resp.status().as_u16()))
        }
    }

    /// One-time historical snapshot for a session key.
    pub fn fetch_samples(&self, key: &SessionKey) -> Result<Vec<Sample>, Error> {
        let resp = self.http.get(self.data_url(key)).send()?;
        if !resp.status().is_success() {
            return Err(Error::Status(resp.status().as_u16()));
        }
        resp.json().map_err(|e| Error::Decode(e.to_string()))
    }

    /// Register a new monitoring session and return its key.
    pub fn create_session(&self) -> Result<String, Error> {
        #[derive(Deserialize)]
        struct NewSession {
            session_key: String,
        }

        let resp = self
            .http
            .post(format!("{}/session/new", self.base))
            .send()?;
        if !resp.status().is_success() {
            return Err(Error::Status(resp.status().as_u16()));
        }
        let created: NewSession = resp.json().map_err(|e| Error::Decode(e.to_string()))?;
        Ok(created.session_key)
    }

    fn data_url(&self, key: &SessionKey) -> String {
        format!("{}/data/{}", self.base, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash_from_base() {
        let client = Client::new("http://localhost:8080/").unwrap();
        let key = SessionKey::parse("ab12cd").unwrap();
        assert_eq!(client.data_url(&key), "http://localhost:8080/data/AB12CD");
    }
}
