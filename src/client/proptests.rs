//! Property-based tests for the client engine
//!
//! - Reveal frames are strictly increasing byte prefixes ending in the exact text
//! - Restoring the snapshot of any mutation returns the store to its prior state
//! - A rejected mutation changes nothing

use super::reveal::reveal_frames;
use super::store::{Mutation, StoreState};
use crate::model::{Chat, Message, Role};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_message() -> impl Strategy<Value = Message> {
    (any::<bool>(), "[a-z ]{0,20}", 0i64..1_000_000).prop_map(|(user, content, timestamp)| {
        Message {
            role: if user { Role::User } else { Role::Assistant },
            content,
            timestamp,
        }
    })
}

/// Chat ids are drawn from a small pool so mutations hit existing chats
fn arb_chat_id() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|n| format!("c{n}"))
}

fn arb_chat(id: String) -> impl Strategy<Value = Chat> {
    (
        "[A-Za-z ]{1,12}",
        proptest::collection::vec(arb_message(), 0..4),
    )
        .prop_map(move |(name, messages)| Chat {
            messages,
            ..Chat::new(id.clone(), "owner", name)
        })
}

fn arb_state() -> impl Strategy<Value = StoreState> {
    proptest::collection::btree_set(0u8..8, 0..6)
        .prop_flat_map(|ids| {
            let chats: Vec<_> = ids
                .into_iter()
                .map(|n| arb_chat(format!("c{n}")))
                .collect();
            (chats, any::<prop::sample::Index>(), any::<bool>())
        })
        .prop_map(|(sessions, pick, has_selection)| {
            let selected = if has_selection && !sessions.is_empty() {
                Some(sessions[pick.index(sessions.len())].id.clone())
            } else {
                None
            };
            StoreState {
                sessions,
                selected,
                ..StoreState::default()
            }
        })
}

fn arb_mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        arb_chat_id()
            .prop_flat_map(arb_chat)
            .prop_map(Mutation::Insert),
        (arb_chat_id(), arb_message())
            .prop_map(|(chat_id, message)| Mutation::Append { chat_id, message }),
        (arb_chat_id(), "[A-Za-z ]{1,12}")
            .prop_map(|(chat_id, name)| Mutation::Rename { chat_id, name }),
        arb_chat_id().prop_map(|chat_id| Mutation::Remove { chat_id }),
    ]
}

// ============================================================================
// Reveal frames
// ============================================================================

proptest! {
    #[test]
    fn prop_frames_are_increasing_prefixes(text in "[a-z \\t\\n]{0,60}|\\PC{0,40}") {
        let ends = reveal_frames(&text);

        prop_assert!(!ends.is_empty());
        prop_assert_eq!(*ends.last().unwrap(), text.len());
        for pair in ends.windows(2) {
            prop_assert!(pair[0] < pair[1], "frames must grow: {:?}", ends);
        }
        for end in &ends {
            prop_assert!(text.get(..*end).is_some(), "frame must end on a char boundary");
        }
    }

    #[test]
    fn prop_frame_count_matches_tokens(words in proptest::collection::vec("[a-z]{1,8}", 1..12)) {
        let text = words.join(" ");
        let ends = reveal_frames(&text);

        prop_assert_eq!(ends.len(), words.len());
        for (k, end) in ends.iter().enumerate() {
            prop_assert_eq!(text.get(..*end).unwrap(), words[..=k].join(" "));
        }
    }
}

// ============================================================================
// Store snapshots
// ============================================================================

proptest! {
    #[test]
    fn prop_restore_undoes_apply(state in arb_state(), mutation in arb_mutation()) {
        let mut working = state.clone();
        match working.apply(mutation) {
            Ok(snapshot) => {
                working.restore(snapshot);
                prop_assert_eq!(working, state);
            }
            Err(_) => prop_assert_eq!(working, state),
        }
    }

    #[test]
    fn prop_selection_always_resolves(state in arb_state(), mutation in arb_mutation()) {
        let mut working = state;
        let _ = working.apply(mutation);
        if let Some(id) = &working.selected {
            prop_assert!(working.sessions.iter().any(|c| &c.id == id));
        }
    }
}
