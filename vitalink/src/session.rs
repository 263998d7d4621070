use std::fmt;

use crate::data::{Sample, SampleBuffer, SessionId, TABLE_ROWS};

/// Maximum length of a user-facing session key.
pub const KEY_MAX_LEN: usize = 6;

/// Fixed error text for every validation failure; the cause is deliberately
/// not distinguished to the user.
pub const INVALID_KEY_MESSAGE: &str = "Invalid session key. Please try again.";

/// A user-supplied session key, trimmed and uppercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    Empty,
    TooLong,
}

impl SessionKey {
    pub fn parse(input: &str) -> Result<SessionKey, KeyError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }
        if trimmed.chars().count() > KEY_MAX_LEN {
            return Err(KeyError::TooLong);
        }
        Ok(SessionKey(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entry screen: collect a key, run one validation at a time, surface one
/// uniform error. Performs no I/O itself; the driver runs the actual check
/// and reports back.
#[derive(Debug, Default)]
pub struct EntryScreen {
    input: String,
    busy: bool,
    error: Option<&'static str>,
}

impl EntryScreen {
    pub fn new() -> EntryScreen {
        EntryScreen::default()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn busy(&self) -> bool {
        self.busy
    }

    pub fn error(&self) -> Option<&'static str> {
        self.error
    }

    /// Append one typed character. Input is capped at `KEY_MAX_LEN`; any
    /// edit clears a previous error immediately.
    pub fn push_char(&mut self, c: char) {
        if self.busy || self.input.chars().count() >= KEY_MAX_LEN {
            return;
        }
        self.input.push(c.to_ascii_uppercase());
        self.error = None;
    }

    pub fn pop_char(&mut self) {
        if self.busy {
            return;
        }
        self.input.pop();
        self.error = None;
    }

    /// Request validation of the current input. Returns the key to check,
    /// or `None` when a check is already in flight or the input is not a
    /// plausible key (which surfaces the same uniform error).
    pub fn submit(&mut self) -> Option<SessionKey> {
        if self.busy {
            return None;
        }
        match SessionKey::parse(&self.input) {
            Ok(key) => {
                self.busy = true;
                Some(key)
            }
            Err(_) => {
                self.error = Some(INVALID_KEY_MESSAGE);
                None
            }
        }
    }

    /// The in-flight check passed; the driver navigates to the data screen.
    pub fn validation_passed(&mut self) {
        self.busy = false;
        self.error = None;
    }

    /// The in-flight check failed for any reason.
    pub fn validation_failed(&mut self) {
        self.busy = false;
        self.error = Some(INVALID_KEY_MESSAGE);
    }
}

/// Data-screen lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    FetchingSnapshot,
    ResolvingId,
    Subscribing,
    Active,
    Failed,
}

/// Side effects the driver must perform on behalf of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    FetchSnapshot { key: SessionKey, generation: u64 },
    LookupSession { key: SessionKey },
    OpenChannel { session_id: SessionId },
    CloseChannel { session_id: SessionId },
}

/// Data screen: reconciles the one-time snapshot with the live stream and
/// owns the sample buffer. All transitions are explicit; a live channel can
/// only be requested once a session identifier is known.
///
/// The machine performs no I/O. Drivers execute the returned [`Action`]s
/// against real transports; tests feed results straight back in.
#[derive(Debug)]
pub struct DataScreen {
    key: SessionKey,
    phase: Phase,
    generation: u64,
    session_id: Option<SessionId>,
    open_channel: Option<SessionId>,
    buffer: SampleBuffer,
}

impl DataScreen {
    pub fn new(key: SessionKey) -> DataScreen {
        DataScreen {
            key,
            phase: Phase::Idle,
            generation: 0,
            session_id: None,
            open_channel: None,
            buffer: SampleBuffer::new(),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Begin the snapshot fetch. Runs exactly once per mount; later calls
    /// are no-ops.
    pub fn start(&mut self) -> Option<Action> {
        if self.phase != Phase::Idle {
            return None;
        }
        self.generation += 1;
        self.phase = Phase::FetchingSnapshot;
        Some(Action::FetchSnapshot {
            key: self.key.clone(),
            generation: self.generation,
        })
    }

    /// Switch to a different session key: tear down any open channel, reset
    /// the buffer, and refetch. The generation bump makes any response from
    /// the superseded fetch stale.
    pub fn change_key(&mut self, key: SessionKey) -> Vec<Action> {
        let mut actions = Vec::new();
        if let Some(close) = self.teardown() {
            actions.push(close);
        }
        self.key = key;
        self.phase = Phase::FetchingSnapshot;
        self.session_id = None;
        self.buffer = SampleBuffer::new();
        self.generation += 1;
        actions.push(Action::FetchSnapshot {
            key: self.key.clone(),
            generation: self.generation,
        });
        actions
    }

    /// Snapshot arrived. Stale generations are discarded. The buffer is
    /// replaced wholesale; identifier resolution prefers the first row's
    /// `session_id` and falls back to a registry lookup.
    pub fn snapshot_loaded(&mut self, generation: u64, rows: Vec<Sample>) -> Option<Action> {
        if generation != self.generation || self.phase != Phase::FetchingSnapshot {
            return None;
        }
        let first_id = rows.first().and_then(|s| s.session_id);
        self.buffer.replace(rows);
        match first_id {
            Some(id) => {
                self.session_id = Some(id);
                self.phase = Phase::Subscribing;
                Some(Action::OpenChannel { session_id: id })
            }
            None => {
                self.phase = Phase::ResolvingId;
                Some(Action::LookupSession {
                    key: self.key.clone(),
                })
            }
        }
    }

    /// Snapshot failed: sticky error, empty buffer, no retry.
    pub fn snapshot_failed(&mut self, generation: u64) {
        if generation != self.generation || self.phase != Phase::FetchingSnapshot {
            return;
        }
        self.phase = Phase::Failed;
    }

    /// Registry lookup finished. `None` leaves the screen waiting for data
    /// indefinitely; that is a degraded mode, not an error.
    pub fn lookup_resolved(&mut self, session_id: Option<SessionId>) -> Option<Action> {
        if self.phase != Phase::ResolvingId {
            return None;
        }
        let id = session_id?;
        self.session_id = Some(id);
        self.phase = Phase::Subscribing;
        Some(Action::OpenChannel { session_id: id })
    }

    /// The driver opened a channel for this identifier; teardown now owes
    /// exactly one close.
    pub fn channel_opened(&mut self, session_id: SessionId) {
        self.open_channel = Some(session_id);
    }

    /// The channel join was acknowledged.
    pub fn channel_joined(&mut self) {
        if self.phase == Phase::Subscribing {
            self.phase = Phase::Active;
        }
    }

    /// One live insert event: bounded append. Delivery implies the channel
    /// is live, so a pending join also flips to active here.
    pub fn live_insert(&mut self, sample: Sample) {
        self.buffer.push_live(sample);
        if self.phase == Phase::Subscribing {
            self.phase = Phase::Active;
        }
    }

    /// Release the live channel. Returns the close action exactly once per
    /// opened channel, and `None` when there is nothing to close.
    pub fn teardown(&mut self) -> Option<Action> {
        let session_id = self.open_channel.take()?;
        Some(Action::CloseChannel { session_id })
    }

    /// True while there is nothing to show and no error to show instead.
    pub fn waiting_for_data(&self) -> bool {
        self.buffer.is_empty() && self.phase != Phase::Failed
    }

    /// Chronological view for the charts. Recomputed on every call.
    pub fn chronological(&self) -> Vec<Sample> {
        self.buffer.chronological()
    }

    /// Recency view for the table: newest first, at most `TABLE_ROWS` rows.
    pub fn table_rows(&self) -> Vec<Sample> {
        self.buffer.recent(TABLE_ROWS)
    }

    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> SessionKey {
        SessionKey::parse(s).unwrap()
    }

    #[test]
    fn keys_are_trimmed_and_uppercased() {
        assert_eq!(key(" ab12cd ").as_str(), "AB12CD");
        assert_eq!(SessionKey::parse(""), Err(KeyError::Empty));
        assert_eq!(SessionKey::parse("abcdefg"), Err(KeyError::TooLong));
    }

    #[test]
    fn entry_screen_caps_input_and_clears_error_on_edit() {
        let mut entry = EntryScreen::new();
        for c in "ab12cd99".chars() {
            entry.push_char(c);
        }
        assert_eq!(entry.input(), "AB12CD");

        entry.validation_failed();
        assert_eq!(entry.error(), Some(INVALID_KEY_MESSAGE));
        entry.pop_char();
        assert_eq!(entry.error(), None);
    }

    #[test]
    fn entry_screen_allows_one_validation_in_flight() {
        let mut entry = EntryScreen::new();
        for c in "ab12cd".chars() {
            entry.push_char(c);
        }
        let first = entry.submit();
        assert_eq!(first, Some(key("AB12CD")));
        assert!(entry.busy());
        assert_eq!(entry.submit(), None);

        entry.validation_failed();
        assert!(!entry.busy());
        assert_eq!(entry.error(), Some(INVALID_KEY_MESSAGE));
        assert!(entry.submit().is_some());
    }

    #[test]
    fn start_fetches_once_per_mount() {
        let mut screen = DataScreen::new(key("ab12cd"));
        let action = screen.start();
        assert_eq!(
            action,
            Some(Action::FetchSnapshot {
                key: key("AB12CD"),
                generation: 1
            })
        );
        assert_eq!(screen.start(), None);
        assert_eq!(screen.phase(), Phase::FetchingSnapshot);
    }

    #[test]
    fn snapshot_with_session_id_skips_the_lookup() {
        let mut screen = DataScreen::new(key("ab12cd"));
        screen.start();
        let action = screen.snapshot_loaded(1, vec![Sample::new(100.0, 97.0, 72.0).with_session(5)]);
        assert_eq!(action, Some(Action::OpenChannel { session_id: 5 }));
        assert_eq!(screen.phase(), Phase::Subscribing);
        assert_eq!(screen.session_id(), Some(5));
    }

    #[test]
    fn empty_snapshot_falls_back_to_lookup() {
        let mut screen = DataScreen::new(key("ab12cd"));
        screen.start();
        let action = screen.snapshot_loaded(1, vec![]);
        assert_eq!(action, Some(Action::LookupSession { key: key("AB12CD") }));
        assert_eq!(screen.phase(), Phase::ResolvingId);
        assert!(screen.waiting_for_data());
    }

    #[test]
    fn missing_registry_row_stays_waiting_forever() {
        let mut screen = DataScreen::new(key("ab12cd"));
        screen.start();
        screen.snapshot_loaded(1, vec![]);
        assert_eq!(screen.lookup_resolved(None), None);
        assert_eq!(screen.phase(), Phase::ResolvingId);
        assert!(screen.waiting_for_data());
    }

    #[test]
    fn snapshot_failure_is_sticky() {
        let mut screen = DataScreen::new(key("ab12cd"));
        screen.start();
        screen.snapshot_failed(1);
        assert_eq!(screen.phase(), Phase::Failed);
        assert!(!screen.waiting_for_data());

        // A late success from the same fetch must not resurrect the screen.
        assert_eq!(screen.snapshot_loaded(1, vec![Sample::new(1.0, 97.0, 72.0)]), None);
        assert_eq!(screen.phase(), Phase::Failed);
        assert_eq!(screen.sample_count(), 0);
    }

    #[test]
    fn stale_generation_results_are_discarded() {
        let mut screen = DataScreen::new(key("ab12cd"));
        screen.start();
        let actions = screen.change_key(key("ZZ9900"));
        assert_eq!(
            actions,
            vec![Action::FetchSnapshot {
                key: key("ZZ9900"),
                generation: 2
            }]
        );

        // Response from the superseded fetch arrives late.
        assert_eq!(screen.snapshot_loaded(1, vec![Sample::new(1.0, 90.0, 60.0)]), None);
        assert_eq!(screen.sample_count(), 0);

        let action = screen.snapshot_loaded(2, vec![Sample::new(2.0, 97.0, 72.0).with_session(9)]);
        assert_eq!(action, Some(Action::OpenChannel { session_id: 9 }));
    }

    #[test]
    fn teardown_closes_exactly_once() {
        let mut screen = DataScreen::new(key("ab12cd"));
        screen.start();
        screen.snapshot_loaded(1, vec![Sample::new(100.0, 97.0, 72.0).with_session(5)]);
        assert_eq!(screen.teardown(), None);

        screen.channel_opened(5);
        assert_eq!(screen.teardown(), Some(Action::CloseChannel { session_id: 5 }));
        assert_eq!(screen.teardown(), None);
    }

    #[test]
    fn key_change_tears_down_the_old_channel_first() {
        let mut screen = DataScreen::new(key("ab12cd"));
        screen.start();
        screen.snapshot_loaded(1, vec![Sample::new(100.0, 97.0, 72.0).with_session(5)]);
        screen.channel_opened(5);

        let actions = screen.change_key(key("ZZ9900"));
        assert_eq!(actions[0], Action::CloseChannel { session_id: 5 });
        assert!(matches!(actions[1], Action::FetchSnapshot { generation: 2, .. }));
        assert_eq!(screen.sample_count(), 0);
        assert_eq!(screen.session_id(), None);
    }

    #[test]
    fn live_insert_promotes_a_pending_join() {
        let mut screen = DataScreen::new(key("ab12cd"));
        screen.start();
        screen.snapshot_loaded(1, vec![]);
        screen.lookup_resolved(Some(7));
        assert_eq!(screen.phase(), Phase::Subscribing);

        screen.live_insert(Sample::new(10.0, 95.0, 80.0));
        assert_eq!(screen.phase(), Phase::Active);
        assert!(!screen.waiting_for_data());
    }
}
