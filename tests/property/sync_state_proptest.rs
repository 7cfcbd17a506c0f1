//! Property-based tests for the record lifecycle

use proptest::prelude::*;
use tripsync::client::sync::{AckOutcome, SyncState};

#[derive(Debug, Clone, Copy)]
enum Event {
    Edit,
    Delete,
    Ack,
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![Just(Event::Edit), Just(Event::Delete), Just(Event::Ack)]
}

fn state() -> impl Strategy<Value = SyncState> {
    prop_oneof![
        Just(SyncState::Pending),
        Just(SyncState::Synced),
        Just(SyncState::Deleted)
    ]
}

proptest! {
    #[test]
    fn test_tombstone_only_leaves_through_ack(events in prop::collection::vec(event(), 1..50)) {
        // `None` means the row was purged
        let mut current = Some(SyncState::Pending);
        for event in events {
            let Some(state) = current else { break };
            current = match event {
                Event::Edit => Some(state.mark_pending().unwrap_or(state)),
                Event::Delete => Some(state.mark_deleted()),
                Event::Ack => match state.mark_synced() {
                    Ok(AckOutcome::Synced) => Some(SyncState::Synced),
                    Ok(AckOutcome::Purge) => None,
                    Err(_) => Some(state),
                },
            };
            if state == SyncState::Deleted {
                prop_assert!(matches!(current, Some(SyncState::Deleted) | None));
            }
        }
    }

    #[test]
    fn test_needs_push_matches_ackability(state in state()) {
        prop_assert_eq!(state.needs_push(), state.mark_synced().is_ok());
    }

    #[test]
    fn test_state_string_round_trip(state in state()) {
        prop_assert_eq!(state.to_string().parse::<SyncState>().unwrap(), state);
    }
}
