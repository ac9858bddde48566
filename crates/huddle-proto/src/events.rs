//! Server-pushed events.
//!
//! Each event is a single-key JSON object naming the case, e.g.
//! `{"participantLeft": {"participantId": "p-2"}}`.

use serde::{Deserialize, Serialize};

use crate::{
    estimation::VoteSummary,
    room::{Participant, RoomState},
};

/// Events on the room stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RoomEvent {
    /// A participant joined or reclaimed their seat.
    ParticipantJoined {
        /// The joined participant; absent payloads are ignored.
        #[serde(default)]
        participant: Option<Participant>,
    },
    /// A participant left or was removed.
    ParticipantLeft {
        /// Who left.
        participant_id: String,
    },
    /// Host privileges moved.
    HostChanged {
        /// The new host.
        new_host_id: String,
    },
    /// Round phase changed.
    StateChanged {
        /// New phase.
        new_state: RoomState,
    },
    /// Topic under estimation changed.
    TopicChanged {
        /// New topic; empty clears it.
        #[serde(default)]
        topic: String,
    },
    /// The room no longer exists.
    RoomClosed {
        /// Human readable reason.
        #[serde(default)]
        reason: String,
    },
}

/// Events on the vote stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum VoteEvent {
    /// Someone voted. The value stays secret until reveal.
    VoteCast {
        /// Voter.
        participant_id: String,
        /// Voter display name.
        #[serde(default)]
        participant_name: String,
    },
    /// The host revealed the round.
    VotesRevealed {
        /// Authority-computed result.
        #[serde(default)]
        summary: Option<VoteSummary>,
    },
    /// The host reset the round.
    RoundReset {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_event_cases_decode() {
        let left: RoomEvent =
            serde_json::from_str(r#"{"participantLeft": {"participantId": "p-2"}}"#).unwrap();
        assert_eq!(left, RoomEvent::ParticipantLeft { participant_id: "p-2".into() });

        let state: RoomEvent =
            serde_json::from_str(r#"{"stateChanged": {"newState": "ROOM_STATE_VOTING"}}"#).unwrap();
        assert_eq!(state, RoomEvent::StateChanged { new_state: RoomState::Voting });

        let host: RoomEvent =
            serde_json::from_str(r#"{"hostChanged": {"newHostId": "p-3"}}"#).unwrap();
        assert_eq!(host, RoomEvent::HostChanged { new_host_id: "p-3".into() });

        let closed: RoomEvent = serde_json::from_str(r#"{"roomClosed": {}}"#).unwrap();
        assert_eq!(closed, RoomEvent::RoomClosed { reason: String::new() });
    }

    #[test]
    fn vote_event_cases_decode() {
        let reset: VoteEvent = serde_json::from_str(r#"{"roundReset": {}}"#).unwrap();
        assert_eq!(reset, VoteEvent::RoundReset {});

        let cast: VoteEvent =
            serde_json::from_str(r#"{"voteCast": {"participantId": "a", "participantName": "A"}}"#)
                .unwrap();
        assert_eq!(
            cast,
            VoteEvent::VoteCast { participant_id: "a".into(), participant_name: "A".into() }
        );
    }

    #[test]
    fn unknown_case_is_an_error() {
        assert!(serde_json::from_str::<RoomEvent>(r#"{"confetti": {}}"#).is_err());
        assert!(serde_json::from_str::<VoteEvent>("{}").is_err());
    }

    #[test]
    fn serialized_form_is_single_key_object() {
        let json = serde_json::to_value(RoomEvent::TopicChanged { topic: "API".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"topicChanged": {"topic": "API"}}));
    }
}
