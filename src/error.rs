//! Error types for `skirmish`
//!
//! Error hierarchy for configuration loading, the round controller, and
//! turn rotation, plus the process exit codes the CLI maps them to.

use std::path::PathBuf;
use thiserror::Error;

use crate::roster::{PlayerNumber, UnitId};

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `skirmish` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Round controller error (invariant violation, illegal transition)
    pub const PHASE_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `skirmish` operations.
///
/// Aggregates the domain-specific errors and maps each to an exit code.
#[derive(Debug, Error)]
pub enum SkirmishError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Round controller error
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid command-line usage
    #[error("usage: {0}")]
    Usage(String),

    /// Stopped by a shutdown signal
    #[error("interrupted")]
    Interrupted,
}

impl SkirmishError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Phase(_) => ExitCode::PHASE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Interrupted => ExitCode::INTERRUPTED,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Location in the configuration where it was referenced
        location: String,
    },

    /// A roster entry names an owner with no player record
    #[error("unit '{unit}' is owned by player {owner}, which has no player record")]
    UnknownOwner {
        /// Display name of the unit
        unit: String,
        /// Owner named by the roster entry
        owner: PlayerNumber,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "players[2].number")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Prevents the configuration from being used
    Error,
    /// Informational; the configuration still loads
    Warning,
}

// ============================================================================
// Round Controller Errors
// ============================================================================

/// Turn rotation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RotationError {
    /// A full cycle of player numbers found nobody with a living unit.
    ///
    /// Victory evaluation should have ended the match before this point.
    #[error("no eligible player after probing {probed} player numbers from {from}")]
    NoEligiblePlayer {
        /// Player number the scan started from
        from: PlayerNumber,
        /// Number of player numbers probed
        probed: u32,
    },

    /// The match has no players at all
    #[error("rotation over an empty player set")]
    NoPlayers,
}

/// Round controller errors.
///
/// Variants are either *rejections* (a command arrived that the current
/// phase does not accept; the timeline logs it and continues) or *fatal*
/// invariant violations that stop the match. See [`PhaseError::is_fatal`].
#[derive(Debug, Error)]
pub enum PhaseError {
    /// Command not accepted in the current phase
    #[error("invalid phase transition: {0}")]
    InvalidTransition(String),

    /// Referenced unit does not exist in the roster
    #[error("unknown unit: {0}")]
    UnknownUnit(UnitId),

    /// Unit does not belong to the player in control
    #[error("unit {unit} belongs to player {owner}, but player {current} is in control")]
    NotCurrentPlayer {
        /// The unit that was referenced
        unit: UnitId,
        /// Its owner
        owner: PlayerNumber,
        /// The player currently in control
        current: PlayerNumber,
    },

    /// Unit already finished acting this round
    #[error("unit {0} has already ended its turn")]
    UnitAlreadyEnded(UnitId),

    /// Roster mutation rejected
    #[error(transparent)]
    Roster(#[from] ConfigError),

    /// Turn rotation could not find a player (invariant violation)
    #[error("turn rotation failed: {0}")]
    Rotation(#[from] RotationError),

    /// Internal state machine reached an impossible state
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Delayed actions need a running tokio runtime
    #[error("delayed action scheduler unavailable: no tokio runtime")]
    SchedulerUnavailable,
}

impl PhaseError {
    /// Returns `true` when the error means the match can no longer continue.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Rotation(_) | Self::Invariant(_))
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `skirmish` operations.
pub type Result<T> = std::result::Result<T, SkirmishError>;

// ============================================================================
// Tests
// ============================================================================
