//! Match configuration schema.
//!
//! These types are deserialized from YAML match files. Durations are
//! humantime strings (`750ms`, `2s`, `1m 30s`).

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::roster::PlayerNumber;
use crate::round::{AfterGame, Timing};

// ============================================================================
// Top-Level Configuration
// ============================================================================

/// Root configuration for one match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct MatchConfig {
    /// Match metadata (required)
    #[serde(rename = "match")]
    pub meta: MatchMetadata,

    /// Pauses between phases
    #[serde(default)]
    pub timing: TimingConfig,

    /// Victory rule settings
    #[serde(default)]
    pub victory: VictoryConfig,

    /// What to do once the outcome is decided
    #[serde(default)]
    pub after_game: AfterGame,

    /// Player records; numbers must be unique and cover `0..N`
    #[serde(default)]
    pub players: Vec<PlayerConfig>,

    /// Initial roster
    #[serde(default)]
    pub units: Vec<UnitConfig>,

    /// Interludes played before a player receives control
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub narrative: Vec<SceneConfig>,
}

/// Match identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchMetadata {
    /// Display name (required)
    pub name: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// Timing
// ============================================================================

/// Phase pauses as written in the match file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Pause after activation
    #[serde(with = "humantime_duration")]
    pub game_start: Duration,

    /// Pause at the start of every round
    #[serde(with = "humantime_duration")]
    pub round_start: Duration,

    /// Pause before each hand-over of control
    #[serde(with = "humantime_duration")]
    pub turn_start: Duration,

    /// Pause between the outcome and the after-game action
    #[serde(with = "humantime_duration")]
    pub game_over_linger: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let timing = Timing::default();
        Self {
            game_start: timing.game_start,
            round_start: timing.round_start,
            turn_start: timing.turn_start,
            game_over_linger: timing.game_over_linger,
        }
    }
}

impl From<TimingConfig> for Timing {
    fn from(config: TimingConfig) -> Self {
        Self {
            game_start: config.game_start,
            round_start: config.round_start,
            turn_start: config.turn_start,
            game_over_linger: config.game_over_linger,
        }
    }
}

// ============================================================================
// Victory
// ============================================================================

/// Settings for the last-player-standing rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VictoryConfig {
    /// The player whose survival decides Win or Loss
    pub protagonist: PlayerNumber,

    /// Declare a Loss as soon as the protagonist is eliminated, even while
    /// several opponents remain
    pub concede_on_elimination: bool,
}

// ============================================================================
// Players & Units
// ============================================================================

/// Who issues a player's commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    /// Finishes every pending unit as soon as it is prompted
    #[default]
    Auto,
    /// Waits for clicks and commands from outside
    Manual,
}

impl Control {
    /// Name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

/// A player record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayerConfig {
    /// Player number
    pub number: PlayerNumber,

    /// Display name
    pub name: String,

    /// Command source
    #[serde(default)]
    pub control: Control,
}

/// A roster entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitConfig {
    /// Display name
    pub name: String,

    /// Owning player
    pub owner: PlayerNumber,

    /// Scripted casualty: the unit is destroyed when this round starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub falls_in_round: Option<u32>,
}

// ============================================================================
// Narrative
// ============================================================================

/// One scripted interlude.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneConfig {
    /// Round the scene belongs to
    pub round: u32,

    /// Player about to receive control
    pub player: PlayerNumber,

    /// Lines to display
    #[serde(default)]
    pub lines: Vec<String>,

    /// How long the interlude holds the hand-over
    #[serde(default, with = "humantime_duration")]
    pub duration: Duration,
}

// ============================================================================
// Duration (de)serialization
// ============================================================================

mod humantime_duration {
    use super::{Deserialize, Deserializer, Duration, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================
