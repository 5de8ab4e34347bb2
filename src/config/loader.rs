//! Match configuration loader.
//!
//! Loading pipeline:
//! 1. Size check against [`ConfigLimits::max_config_size`]
//! 2. Read (UTF-8 BOM stripped)
//! 3. Environment variable expansion (pre-parse, on raw text)
//! 4. YAML parsing and deserialization to [`MatchConfig`]
//! 5. Validation (every issue collected)
//! 6. Freeze with `Arc`

use std::path::Path;
use std::sync::Arc;

use crate::config::schema::MatchConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

// ============================================================================
// Public API
// ============================================================================

/// Limits for configuration size to prevent resource exhaustion.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum number of player records.
    pub max_players: usize,

    /// Maximum number of roster entries.
    pub max_units: usize,

    /// Maximum configuration file size in bytes.
    pub max_config_size: usize,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_players: env_or("SKIRMISH_MAX_PLAYERS", 64),
            max_units: env_or("SKIRMISH_MAX_UNITS", 10_000),
            max_config_size: env_or("SKIRMISH_MAX_CONFIG_SIZE", 1024 * 1024),
        }
    }
}

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: Arc<MatchConfig>,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} at {location}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Configuration loader.
///
/// Handles the full pipeline from YAML file to frozen [`MatchConfig`].
#[derive(Debug, Default)]
pub struct ConfigLoader {
    limits: ConfigLimits,
}

impl ConfigLoader {
    /// Creates a loader with the given limits.
    #[must_use]
    pub const fn new(limits: ConfigLimits) -> Self {
        Self { limits }
    }

    /// Creates a loader with default limits.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Loads a configuration file and returns the frozen configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read or exceeds the size limit
    /// - A required environment variable is unset
    /// - YAML parsing fails
    /// - Validation fails
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        let file_size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if file_size > self.limits.max_config_size {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{file_size} bytes"),
                expected: format!("at most {} bytes", self.limits.max_config_size),
            });
        }

        let raw_content = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        self.load_str(&raw_content, path)
    }

    /// Runs the pipeline on in-memory text. `origin` is used in diagnostics.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigLoader::load`], minus the file access errors.
    pub fn load_str(&self, raw_content: &str, origin: &Path) -> Result<LoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let raw_content = raw_content.strip_prefix('\u{feff}').unwrap_or(raw_content);

        let mut env_sub = EnvSubstitution::new();
        let substituted = env_sub.substitute(raw_content, origin)?;
        warnings.extend(env_sub.warnings);

        if substituted.trim().is_empty() {
            return Err(ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: None,
                message: "Configuration file is empty".to_string(),
            });
        }

        let config: MatchConfig =
            serde_yaml::from_str(&substituted).map_err(|e| ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        let validation = Validator::new().validate(&config, &self.limits);
        if validation.has_errors() {
            return Err(ConfigError::ValidationError {
                path: origin.display().to_string(),
                errors: validation.errors,
            });
        }

        warnings.extend(validation.warnings.into_iter().map(|issue| LoadWarning {
            message: issue.message,
            location: Some(issue.path),
        }));

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }
}

// ============================================================================
// Environment Variable Substitution
// ============================================================================

/// Pre-parse environment variable substitution.
///
/// Runs on raw YAML text before parsing so substituted values take part in
/// YAML type inference (`${ROUNDS:-3}` becomes an integer).
struct EnvSubstitution {
    warnings: Vec<LoadWarning>,
}

impl EnvSubstitution {
    const fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    /// Substitutes environment variables in raw YAML text.
    ///
    /// Supports:
    /// - `${VAR}` - expand to value (empty string if unset with warning)
    /// - `${VAR:-default}` - expand to default if unset
    /// - `${VAR:?message}` - fail if unset
    /// - `$$` - literal `$`
    fn substitute(&mut self, raw_yaml: &str, source_path: &Path) -> Result<String, ConfigError> {
        let mut result = String::with_capacity(raw_yaml.len());
        let mut chars = raw_yaml.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                result.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();
                    let spec = VarSpec::parse(&mut chars, source_path)?;
                    match std::env::var(&spec.name) {
                        Ok(value) => result.push_str(&value),
                        Err(_) => match spec.fallback {
                            Fallback::Default(default) => result.push_str(&default),
                            Fallback::Required(message) => {
                                return Err(ConfigError::EnvVarNotSet {
                                    var: spec.name,
                                    location: if message.is_empty() {
                                        source_path.display().to_string()
                                    } else {
                                        message
                                    },
                                });
                            }
                            Fallback::Empty => self.warnings.push(LoadWarning {
                                message: format!(
                                    "Environment variable '{}' is not set, using empty string",
                                    spec.name
                                ),
                                location: Some(source_path.display().to_string()),
                            }),
                        },
                    }
                }
                _ => result.push(c),
            }
        }

        Ok(result)
    }
}

/// What to do when a referenced variable is unset.
enum Fallback {
    Empty,
    Default(String),
    Required(String),
}

/// A parsed `${...}` reference.
struct VarSpec {
    name: String,
    fallback: Fallback,
}

impl VarSpec {
    /// Parses the body of a `${...}` reference; the opening brace has
    /// already been consumed.
    fn parse(
        chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
        source_path: &Path,
    ) -> Result<Self, ConfigError> {
        let mut name = String::new();

        while let Some(c) = chars.next() {
            match c {
                '}' => {
                    return Ok(Self {
                        name,
                        fallback: Fallback::Empty,
                    });
                }
                ':' if chars.peek() == Some(&'-') => {
                    chars.next();
                    let default = read_until_close(chars, source_path)?;
                    return Ok(Self {
                        name,
                        fallback: Fallback::Default(default),
                    });
                }
                ':' if chars.peek() == Some(&'?') => {
                    chars.next();
                    let message = read_until_close(chars, source_path)?;
                    return Ok(Self {
                        name,
                        fallback: Fallback::Required(message),
                    });
                }
                _ => name.push(c),
            }
        }

        Err(unclosed(source_path, &name))
    }
}

/// Reads content until the closing `}`, keeping nested braces.
fn read_until_close(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    source_path: &Path,
) -> Result<String, ConfigError> {
    let mut value = String::new();
    let mut depth = 1;

    for c in chars.by_ref() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(value);
                }
            }
            _ => {}
        }
        value.push(c);
    }

    Err(unclosed(source_path, &value))
}

fn unclosed(source_path: &Path, fragment: &str) -> ConfigError {
    ConfigError::ParseError {
        path: source_path.to_path_buf(),
        line: None,
        message: format!("Unclosed environment variable reference: ${{{fragment}"),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parses an environment variable with a default value.
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// Tests
// ============================================================================
