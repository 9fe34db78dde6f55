//! Configuration file for ~/.config/gator/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos. `login` and `register` rewrite the file through
//! [`Config::save`].
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid interval {0}")]
    InvalidInterval(String),

    #[error("HOME environment variable not set")]
    NoHomeDir,
}

// ============================================================================
// Paths
// ============================================================================

/// Get the config directory path (~/.config/gator/)
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os("HOME").ok_or(ConfigError::NoHomeDir)?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

fn default_db_url() -> String {
    match config_dir() {
        Ok(dir) => format!("sqlite:{}", dir.join("gator.db").display()),
        Err(_) => "sqlite:gator.db".to_string(),
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// `Debug` masks `db_url`, which may embed credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `sqlite:` connection URL of the store.
    pub db_url: String,

    /// User recorded by the last `login` or `register`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,

    /// Per-fetch timeout in seconds.
    pub fetch_timeout_secs: u64,

    /// `agg` interval used when none is given on the command line.
    pub default_interval: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: default_db_url(),
            current_user_name: None,
            fetch_timeout_secs: 30,
            default_interval: "1m".to_string(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("db_url", &"[REDACTED]")
            .field("current_user_name", &self.current_user_name)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("default_interval", &self.default_interval)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 4] = [
        "db_url",
        "current_user_name",
        "fetch_timeout_secs",
        "default_interval",
    ];

    /// `~/.config/gator/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid loading a huge file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            user = ?config.current_user_name,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Write the configuration with write-to-temp-then-rename, so a crash
    /// never leaves a truncated file behind.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        atomic_write(path, content.as_bytes())?;
        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Record `name` as the current user.
    pub fn set_current_user(&mut self, name: &str) {
        self.current_user_name = Some(name.to_string());
    }

    pub fn fetch_timeout(&self) -> Result<Duration, ConfigError> {
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidInterval(
                "fetch_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(Duration::from_secs(self.fetch_timeout_secs))
    }

    /// `default_interval` parsed with [`parse_interval`].
    pub fn default_interval(&self) -> Result<Duration, ConfigError> {
        parse_interval(&self.default_interval)
    }
}

fn atomic_write(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", nanos));
    write_via_temp(dst, &temp_path, content)
}

fn write_via_temp(dst: &Path, temp_path: &Path, content: &[u8]) -> std::io::Result<()> {
    // create_new fails if anything already sits at the temp path, so a
    // planted file or symlink there is never written through.
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut temp_file = options.open(temp_path)?;

    let written = temp_file
        .write_all(content)
        .and_then(|()| temp_file.sync_all());
    drop(temp_file);
    if let Err(e) = written {
        let _ = std::fs::remove_file(temp_path);
        return Err(e);
    }

    // On Windows, rename fails if destination exists
    #[cfg(windows)]
    if dst.exists() {
        if let Err(e) = std::fs::remove_file(dst) {
            let _ = std::fs::remove_file(temp_path);
            return Err(e);
        }
    }

    std::fs::rename(temp_path, dst).inspect_err(|_| {
        let _ = std::fs::remove_file(temp_path);
    })
}

// ============================================================================
// Intervals
// ============================================================================

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse a duration such as `1m`, `45s`, `1h30m`, `1.5h` or `500ms`.
///
/// Accepted units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. Every number
/// needs a unit and the total must be greater than zero.
pub fn parse_interval(input: &str) -> Result<Duration, ConfigError> {
    let invalid = |why: &str| ConfigError::InvalidInterval(format!("{:?}: {}", input, why));

    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(invalid("empty"));
    }

    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(num_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        if number.is_empty() {
            return Err(invalid("expected a number"));
        }
        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3600 * NANOS_PER_SEC,
            "" => return Err(invalid("missing unit")),
            other => return Err(invalid(&format!("unknown unit {:?}", other))),
        };

        let nanos = component_nanos(number, unit_nanos).ok_or_else(|| invalid("bad number"))?;
        total_nanos = total_nanos
            .checked_add(nanos)
            .ok_or_else(|| invalid("out of range"))?;
        rest = tail;
    }

    if total_nanos == 0 {
        return Err(invalid("must be greater than zero"));
    }
    let secs = u64::try_from(total_nanos / NANOS_PER_SEC).map_err(|_| invalid("out of range"))?;
    // Remainder is below one billion, so it fits in u32
    let subsec = (total_nanos % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, subsec))
}

/// `number` (`12`, `1.5`, `.5`) times `unit_nanos`, truncated to whole nanoseconds.
fn component_nanos(number: &str, unit_nanos: u128) -> Option<u128> {
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(unit_nanos)?;
    if !frac.is_empty() {
        let digits: u128 = frac.parse().ok()?;
        let scale = 10u128.checked_pow(u32::try_from(frac.len()).ok()?)?;
        nanos = nanos.checked_add(digits.checked_mul(unit_nanos)? / scale)?;
    }
    Some(nanos)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn temp_config(name: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("gator_config_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.db_url.starts_with("sqlite:"));
        assert!(config.db_url.ends_with("gator.db"));
        assert!(config.current_user_name.is_none());
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.default_interval, "1m");
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/gator_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = temp_config("whitespace");
        std::fs::write(&path, "   \n  \n  ").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = temp_config("partial");
        std::fs::write(&path, "current_user_name = \"kahya\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.current_user_name.as_deref(), Some("kahya"));
        assert_eq!(config.fetch_timeout_secs, 30); // default
        assert_eq!(config.default_interval, "1m"); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let (dir, path) = temp_config("full");
        let content = r#"
db_url = "sqlite:/var/lib/gator/gator.db"
current_user_name = "lane"
fetch_timeout_secs = 10
default_interval = "1h30m"
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.db_url, "sqlite:/var/lib/gator/gator.db");
        assert_eq!(config.current_user_name.as_deref(), Some("lane"));
        assert_eq!(config.fetch_timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(
            config.default_interval().unwrap(),
            Duration::from_secs(90 * 60)
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = temp_config("invalid");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (dir, path) = temp_config("unknown");
        std::fs::write(&path, "default_interval = \"5m\"\ntheme = \"dark\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.default_interval, "5m");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (dir, path) = temp_config("wrongtype");
        std::fs::write(&path, "fetch_timeout_secs = \"soon\"\n").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = temp_config("too_large");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_then_load() {
        let (dir, path) = temp_config("save");
        let mut config = Config::default();
        config.db_url = "sqlite:/tmp/gator-save-test.db".to_string();
        config.set_current_user("kahya");

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);

        // Only the target file remains, no temp files
        let entries: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let (dir, path) = temp_config("replace");
        std::fs::write(&path, "current_user_name = \"old\"\n").unwrap();

        let mut config = Config::load(&path).unwrap();
        config.set_current_user("new");
        config.save(&path).unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.current_user_name.as_deref(), Some("new"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[test]
    fn test_save_refuses_existing_temp_path() {
        let (dir, path) = temp_config("planted");
        let target = dir.join("elsewhere");
        std::fs::write(&target, "untouched").unwrap();
        let temp_path = dir.join("config.tmp.planted");
        std::fs::remove_file(&temp_path).ok();
        std::fs::remove_file(&path).ok();
        std::os::unix::fs::symlink(&target, &temp_path).unwrap();

        let err = write_via_temp(&path, &temp_path, b"db_url = \"x\"\n").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "untouched");
        assert!(!path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let (dir, _) = temp_config("nested");
        let path = dir.join("a").join("b").join("config.toml");

        Config::default().save(&path).unwrap();
        assert!(path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_zero_fetch_timeout_rejected() {
        let config = Config {
            fetch_timeout_secs: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.fetch_timeout(),
            Err(ConfigError::InvalidInterval(_))
        ));
    }

    #[test]
    fn test_debug_masks_db_url() {
        let config = Config {
            db_url: "sqlite:/home/secret-user/gator.db".to_string(),
            ..Config::default()
        };

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("secret-user"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    // ------------------------------------------------------------------------
    // parse_interval
    // ------------------------------------------------------------------------

    #[test]
    fn test_parse_interval_units() {
        let cases = [
            ("1m", Duration::from_secs(60)),
            ("45s", Duration::from_secs(45)),
            ("1h30m", Duration::from_secs(5400)),
            ("500ms", Duration::from_millis(500)),
            ("1.5h", Duration::from_secs(5400)),
            (".5s", Duration::from_millis(500)),
            ("250us", Duration::from_micros(250)),
            ("250µs", Duration::from_micros(250)),
            ("10ns", Duration::from_nanos(10)),
            (" 2m ", Duration::from_secs(120)),
            ("1m0s", Duration::from_secs(60)),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_interval(input).unwrap(), expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_parse_interval_rejects() {
        for input in ["", "0s", "0", "10", "m", "5x", "1.2.3s", "-1m", "1 m", "."] {
            assert!(
                matches!(parse_interval(input), Err(ConfigError::InvalidInterval(_))),
                "input {:?} should be rejected",
                input
            );
        }
    }

    proptest! {
        #[test]
        fn prop_hms_components_add_up(h in 0u64..100, m in 0u64..60, s in 1u64..60) {
            let parsed = parse_interval(&format!("{}h{}m{}s", h, m, s)).unwrap();
            prop_assert_eq!(parsed, Duration::from_secs(h * 3600 + m * 60 + s));
        }

        #[test]
        fn prop_parse_never_panics(input in "\\PC{0,16}") {
            let _ = parse_interval(&input);
        }
    }
}
