//! Room, participant and card deck messages.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};

use crate::de::{EnumTag, i64_lenient};

/// Phase of the current round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RoomState {
    /// Unknown or not reported by the server.
    #[default]
    Unspecified,
    /// Waiting for the host to start a round.
    Waiting,
    /// Participants are casting votes.
    Voting,
    /// Votes are revealed.
    Revealed,
}

impl RoomState {
    /// Canonical wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "ROOM_STATE_UNSPECIFIED",
            Self::Waiting => "ROOM_STATE_WAITING",
            Self::Voting => "ROOM_STATE_VOTING",
            Self::Revealed => "ROOM_STATE_REVEALED",
        }
    }

    fn from_tag(tag: EnumTag) -> Option<Self> {
        match tag {
            EnumTag::Number(0) => Some(Self::Unspecified),
            EnumTag::Number(1) => Some(Self::Waiting),
            EnumTag::Number(2) => Some(Self::Voting),
            EnumTag::Number(3) => Some(Self::Revealed),
            EnumTag::Number(_) => None,
            EnumTag::Name(name) => {
                match name.trim_start_matches("ROOM_STATE_").to_ascii_uppercase().as_str() {
                    "UNSPECIFIED" => Some(Self::Unspecified),
                    "WAITING" => Some(Self::Waiting),
                    "VOTING" => Some(Self::Voting),
                    "REVEALED" => Some(Self::Revealed),
                    _ => None,
                }
            },
        }
    }
}

impl Serialize for RoomState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoomState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = EnumTag::deserialize(deserializer)?;
        Self::from_tag(tag).ok_or_else(|| D::Error::custom("unknown room state"))
    }
}

/// Predefined deck families.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CardPreset {
    /// Not set; the server falls back to Fibonacci.
    #[default]
    Unspecified,
    /// 1, 2, 3, 5, 8, 13, 21.
    Fibonacci,
    /// 0, 1, 2, 3, 5, 8, 13, 20, 40, 100.
    ModifiedFibonacci,
    /// XS to XL.
    TShirt,
    /// 1, 2, 4 ... 32.
    PowersOfTwo,
    /// 1 to 10.
    Linear,
    /// User supplied values.
    Custom,
}

/// Wire names in enum-number order.
static PRESET_NAMES: [(CardPreset, &str); 7] = [
    (CardPreset::Unspecified, "CARD_PRESET_UNSPECIFIED"),
    (CardPreset::Fibonacci, "CARD_PRESET_FIBONACCI"),
    (CardPreset::ModifiedFibonacci, "CARD_PRESET_MODIFIED_FIBONACCI"),
    (CardPreset::TShirt, "CARD_PRESET_TSHIRT"),
    (CardPreset::PowersOfTwo, "CARD_PRESET_POWERS_OF_TWO"),
    (CardPreset::Linear, "CARD_PRESET_LINEAR"),
    (CardPreset::Custom, "CARD_PRESET_CUSTOM"),
];

impl CardPreset {
    /// Canonical wire name.
    pub fn as_str(self) -> &'static str {
        PRESET_NAMES.iter().find(|(preset, _)| *preset == self).map_or("", |(_, name)| *name)
    }
}

impl Serialize for CardPreset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CardPreset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let found = match EnumTag::deserialize(deserializer)? {
            EnumTag::Number(n) => usize::try_from(n).ok().and_then(|i| PRESET_NAMES.get(i)),
            EnumTag::Name(name) => {
                let upper = name.to_ascii_uppercase();
                PRESET_NAMES.iter().find(|(_, wire)| {
                    *wire == upper || wire.trim_start_matches("CARD_PRESET_") == upper
                })
            },
        };
        found.map(|(preset, _)| *preset).ok_or_else(|| D::Error::custom("unknown card preset"))
    }
}

/// One card of a deck.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Display value, also the value cast as a vote.
    #[serde(default)]
    pub value: String,
    /// Value used for averaging; zero for non-numeric cards.
    #[serde(default, deserialize_with = "i64_lenient")]
    pub numeric_value: i64,
    /// Whether the card participates in numeric averaging.
    #[serde(default)]
    pub is_numeric: bool,
}

impl Card {
    /// Build a card.
    pub fn new(value: impl Into<String>, numeric_value: i64, is_numeric: bool) -> Self {
        Self { value: value.into(), numeric_value, is_numeric }
    }
}

/// Deck configuration of a room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardConfig {
    /// Deck family.
    #[serde(default)]
    pub preset: CardPreset,
    /// Cards in display order.
    #[serde(default)]
    pub cards: Vec<Card>,
}

/// A member of a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Server-assigned participant id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Holder of host privileges; exactly one per room.
    #[serde(default)]
    pub is_host: bool,
    /// Spectators never vote.
    #[serde(default)]
    pub is_spectator: bool,
    /// Whether the participant currently has a live session.
    #[serde(default)]
    pub is_connected: bool,
    /// Unix seconds.
    #[serde(default, deserialize_with = "i64_lenient")]
    pub joined_at: i64,
}

/// A room as reported by the authority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Opaque room id used by RPCs.
    pub id: String,
    /// Durable, human readable name used for navigation.
    #[serde(default)]
    pub name: String,
    /// Members at the time of the snapshot.
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// Round phase.
    #[serde(default)]
    pub state: RoomState,
    /// Topic under estimation, empty when unset.
    #[serde(default)]
    pub current_topic: String,
    /// Unix seconds.
    #[serde(default, deserialize_with = "i64_lenient")]
    pub created_at: i64,
    /// Deck in use.
    #[serde(default)]
    pub card_config: Option<CardConfig>,
}

impl Room {
    /// Look up a participant by id.
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }
}
