//! Configuration validation.
//!
//! Runs on the fully deserialized [`MatchConfig`] and collects every issue
//! instead of stopping at the first, so a single pass reports everything
//! wrong with a match file.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::loader::ConfigLimits;
use crate::config::schema::MatchConfig;
use crate::error::{Severity, ValidationIssue};
use crate::roster::PlayerNumber;

// ============================================================================
// Public API
// ============================================================================

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Match configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns every issue found.
    pub fn validate(&mut self, config: &MatchConfig, limits: &ConfigLimits) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_metadata(config);
        let numbers = self.validate_players(config);
        self.validate_victory(config, &numbers);
        self.validate_units(config, &numbers);
        self.validate_narrative(config, &numbers);
        self.validate_timing(config);
        self.validate_limits(config, limits);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Checks
    // ========================================================================

    fn validate_metadata(&mut self, config: &MatchConfig) {
        if config.meta.name.trim().is_empty() {
            self.add_error("match.name", "Match name is required and cannot be empty");
        }
        if config.meta.name.len() > 100 {
            self.add_warning("match.name", "Match name is unusually long (> 100 characters)");
        }
    }

    /// Checks that player numbers are unique and cover `0..N` exactly.
    ///
    /// Returns the set of declared numbers for the cross-reference checks.
    fn validate_players(&mut self, config: &MatchConfig) -> BTreeSet<PlayerNumber> {
        let mut seen: BTreeMap<PlayerNumber, usize> = BTreeMap::new();

        for (i, player) in config.players.iter().enumerate() {
            let path = format!("players[{i}]");
            if player.name.trim().is_empty() {
                self.add_error(&format!("{path}.name"), "Player name cannot be empty");
            }
            if let Some(first) = seen.insert(player.number, i) {
                self.add_error(
                    &format!("{path}.number"),
                    &format!(
                        "Duplicate player number {} (first declared at players[{first}])",
                        player.number
                    ),
                );
            }
        }

        if config.players.is_empty() {
            self.add_warning("players", "No players declared; the match ends at the first turn");
        }

        let numbers: BTreeSet<PlayerNumber> = seen.into_keys().collect();
        let expected = u32::try_from(numbers.len()).unwrap_or(u32::MAX);
        if let Some(gap) = (0..expected).map(PlayerNumber).find(|n| !numbers.contains(n)) {
            self.add_error(
                "players",
                &format!(
                    "Player numbers must cover 0..{expected} without gaps; {gap} is missing"
                ),
            );
        }

        numbers
    }

    fn validate_victory(&mut self, config: &MatchConfig, numbers: &BTreeSet<PlayerNumber>) {
        let protagonist = config.victory.protagonist;
        if !numbers.is_empty() && !numbers.contains(&protagonist) {
            self.add_error(
                "victory.protagonist",
                &format!("Protagonist {protagonist} has no player record"),
            );
        }
    }

    fn validate_units(&mut self, config: &MatchConfig, numbers: &BTreeSet<PlayerNumber>) {
        let mut owners = BTreeSet::new();

        for (i, unit) in config.units.iter().enumerate() {
            let path = format!("units[{i}]");
            if unit.name.trim().is_empty() {
                self.add_error(&format!("{path}.name"), "Unit name cannot be empty");
            }
            if numbers.contains(&unit.owner) {
                owners.insert(unit.owner);
            } else {
                self.add_warning(
                    &format!("{path}.owner"),
                    &format!(
                        "Unit '{}' is owned by player {}, which has no player record; \
                         it will be skipped",
                        unit.name, unit.owner
                    ),
                );
            }
            if unit.falls_in_round == Some(0) {
                self.add_error(
                    &format!("{path}.falls_in_round"),
                    "Rounds are numbered from 1",
                );
            }
        }

        for number in numbers.difference(&owners) {
            self.add_warning(
                "units",
                &format!("Player {number} has no units and will never take a turn"),
            );
        }
    }

    fn validate_narrative(&mut self, config: &MatchConfig, numbers: &BTreeSet<PlayerNumber>) {
        let mut cues = BTreeSet::new();

        for (i, scene) in config.narrative.iter().enumerate() {
            let path = format!("narrative[{i}]");
            if scene.round == 0 {
                self.add_error(&format!("{path}.round"), "Rounds are numbered from 1");
            }
            if !numbers.contains(&scene.player) {
                self.add_warning(
                    &format!("{path}.player"),
                    &format!("Scene is cued for player {}, which has no player record", scene.player),
                );
            }
            if !cues.insert((scene.round, scene.player)) {
                self.add_warning(
                    &path,
                    &format!(
                        "Another scene is already cued for round {} player {}; it waits for a later hand-over",
                        scene.round, scene.player
                    ),
                );
            }
            if scene.lines.is_empty() {
                self.add_warning(&format!("{path}.lines"), "Scene has no lines");
            }
        }
    }

    fn validate_timing(&mut self, config: &MatchConfig) {
        let timing = &config.timing;
        let pauses = [
            ("timing.game_start", timing.game_start),
            ("timing.round_start", timing.round_start),
            ("timing.turn_start", timing.turn_start),
            ("timing.game_over_linger", timing.game_over_linger),
        ];
        for (path, pause) in pauses {
            if pause.as_secs() > 3600 {
                self.add_warning(path, "Pause is longer than an hour");
            }
        }
    }

    fn validate_limits(&mut self, config: &MatchConfig, limits: &ConfigLimits) {
        if config.players.len() > limits.max_players {
            self.add_error(
                "players",
                &format!(
                    "Too many players: {} (max: {})",
                    config.players.len(),
                    limits.max_players
                ),
            );
        }
        if config.units.len() > limits.max_units {
            self.add_error(
                "units",
                &format!(
                    "Too many units: {} (max: {})",
                    config.units.len(),
                    limits.max_units
                ),
            );
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
