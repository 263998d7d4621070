use serde::de::{Deserializer, Error as DeError, Unexpected};
use serde::Deserialize;

/// Internal identifier scoping a monitoring session. Distinct from the
/// user-facing session key.
pub type SessionId = i64;

/// A single biometric reading.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sample {
    /// Seconds since epoch.
    #[serde(deserialize_with = "lenient_f64")]
    pub timestamp: f64,
    /// Blood-oxygen saturation, percent.
    #[serde(deserialize_with = "lenient_f64")]
    pub spo2: f64,
    /// Pulse, beats per minute.
    #[serde(deserialize_with = "lenient_f64")]
    pub pulse: f64,
    /// Owning session, when the source includes it.
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

impl Sample {
    pub fn new(timestamp: f64, spo2: f64, pulse: f64) -> Sample {
        Sample {
            timestamp,
            spo2,
            pulse,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Sample {
        self.session_id = Some(session_id);
        self
    }
}

impl std::fmt::Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.3} spo2: {:.0} pulse: {:.0}",
            self.timestamp, self.spo2, self.pulse
        )
    }
}

// Some sources deliver numeric fields as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum LenientNumber {
    Number(f64),
    Text(String),
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match LenientNumber::deserialize(deserializer)? {
        LenientNumber::Number(v) => Ok(v),
        LenientNumber::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| DeError::invalid_value(Unexpected::Str(&s), &"a numeric string")),
    }
}
