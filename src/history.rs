//! Conversational memory reconstruction.
//!
//! Rebuilds (user, assistant) pairs from a flat, time-ascending log of chat
//! turns. The fold keeps a single-slot buffer for the most recent unpaired
//! user turn: a later user turn overwrites it, an assistant turn emits a
//! pair (empty user utterance when nothing is buffered) and clears it, and
//! a trailing unpaired user turn is dropped.
//!
//! Purely in-memory; persistence never leaks in here.

use crate::models::{ChatTurn, HistoryPair};

/// Fold a time-ascending turn sequence into history pairs, oldest first.
pub fn pair_turns(turns: &[ChatTurn]) -> Vec<HistoryPair> {
    let mut pairs = Vec::new();
    let mut pending_user: Option<&str> = None;

    for turn in turns {
        if turn.is_user_message {
            pending_user = Some(&turn.content);
        } else {
            pairs.push(HistoryPair {
                user: pending_user.take().unwrap_or("").to_string(),
                assistant: turn.content.clone(),
            });
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn turn(content: &str, is_user: bool, seq: i64) -> ChatTurn {
        ChatTurn {
            id: seq,
            user_id: 1,
            content: content.to_string(),
            is_user_message: is_user,
            timestamp: Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap(),
        }
    }

    #[test]
    fn empty_log_yields_no_pairs() {
        assert!(pair_turns(&[]).is_empty());
    }

    #[test]
    fn alternating_turns_pair_in_order() {
        let turns = vec![
            turn("hi", true, 0),
            turn("hello!", false, 1),
            turn("how do I sleep better?", true, 2),
            turn("try a routine", false, 3),
        ];
        let pairs = pair_turns(&turns);
        assert_eq!(
            pairs,
            vec![
                HistoryPair {
                    user: "hi".to_string(),
                    assistant: "hello!".to_string()
                },
                HistoryPair {
                    user: "how do I sleep better?".to_string(),
                    assistant: "try a routine".to_string()
                },
            ]
        );
    }

    #[test]
    fn consecutive_user_turns_keep_only_the_latest() {
        let turns = vec![
            turn("U1", true, 0),
            turn("U2", true, 1),
            turn("A1", false, 2),
        ];
        let pairs = pair_turns(&turns);
        assert_eq!(
            pairs,
            vec![HistoryPair {
                user: "U2".to_string(),
                assistant: "A1".to_string()
            }]
        );
    }

    #[test]
    fn leading_assistant_turn_pairs_with_empty_user() {
        let turns = vec![turn("A1", false, 0)];
        let pairs = pair_turns(&turns);
        assert_eq!(
            pairs,
            vec![HistoryPair {
                user: String::new(),
                assistant: "A1".to_string()
            }]
        );
    }

    #[test]
    fn trailing_user_turn_is_dropped() {
        let turns = vec![
            turn("hi", true, 0),
            turn("hello!", false, 1),
            turn("one more thing", true, 2),
        ];
        let pairs = pair_turns(&turns);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].assistant, "hello!");
    }

    #[test]
    fn pair_count_never_exceeds_assistant_turn_count() {
        let turns: Vec<ChatTurn> = (0..20)
            .map(|i| turn(&format!("t{}", i), i % 3 != 2, i))
            .collect();
        let assistant_turns = turns.iter().filter(|t| !t.is_user_message).count();
        assert_eq!(pair_turns(&turns).len(), assistant_turns);
    }
}
