// End-to-end data-screen scenarios, driven the way the monitor drives the
// state machine: execute each returned action against canned results.

use vitalink::data::Sample;
use vitalink::session::{Action, DataScreen, Phase, SessionKey};

fn key(s: &str) -> SessionKey {
    SessionKey::parse(s).unwrap()
}

#[test]
fn snapshot_row_resolves_the_id_and_live_inserts_merge_in() {
    let mut screen = DataScreen::new(key("ab12cd"));

    let fetch = screen.start().unwrap();
    let generation = match fetch {
        Action::FetchSnapshot { generation, .. } => generation,
        other => panic!("expected snapshot fetch, got {:?}", other),
    };

    // Historical fetch returns one row that already carries the identifier,
    // so no registry lookup is needed.
    let open = screen.snapshot_loaded(
        generation,
        vec![Sample::new(100.0, 97.0, 72.0).with_session(5)],
    );
    assert_eq!(open, Some(Action::OpenChannel { session_id: 5 }));
    screen.channel_opened(5);
    screen.channel_joined();
    assert_eq!(screen.phase(), Phase::Active);

    // One live insert for session 5 arrives.
    screen.live_insert(Sample::new(105.0, 96.0, 75.0).with_session(5));

    let chron: Vec<(f64, f64, f64)> = screen
        .chronological()
        .iter()
        .map(|s| (s.timestamp, s.spo2, s.pulse))
        .collect();
    assert_eq!(chron, vec![(100.0, 97.0, 72.0), (105.0, 96.0, 75.0)]);

    let table: Vec<(f64, f64, f64)> = screen
        .table_rows()
        .iter()
        .map(|s| (s.timestamp, s.spo2, s.pulse))
        .collect();
    assert_eq!(table, vec![(105.0, 96.0, 75.0), (100.0, 97.0, 72.0)]);

    assert_eq!(screen.teardown(), Some(Action::CloseChannel { session_id: 5 }));
}

#[test]
fn brand_new_session_resolves_via_the_registry_and_waits() {
    let mut screen = DataScreen::new(key("zz9900"));
    screen.start();

    // Empty snapshot: the identifier has to come from the registry.
    let lookup = screen.snapshot_loaded(1, vec![]);
    assert_eq!(lookup, Some(Action::LookupSession { key: key("ZZ9900") }));

    let open = screen.lookup_resolved(Some(7));
    assert_eq!(open, Some(Action::OpenChannel { session_id: 7 }));
    screen.channel_opened(7);

    // Subscribed but nothing has arrived yet: still waiting for data.
    assert!(screen.waiting_for_data());

    screen.live_insert(Sample::new(10.0, 95.0, 80.0).with_session(7));
    assert!(!screen.waiting_for_data());
    assert_eq!(screen.phase(), Phase::Active);
    assert_eq!(screen.table_rows().len(), 1);
}

#[test]
fn uppercasing_happens_before_any_request() {
    let mut screen = DataScreen::new(key("ab12cd"));
    match screen.start().unwrap() {
        Action::FetchSnapshot { key, .. } => assert_eq!(key.as_str(), "AB12CD"),
        other => panic!("expected snapshot fetch, got {:?}", other),
    }
}
