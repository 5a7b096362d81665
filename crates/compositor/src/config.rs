//! Runtime configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable that turns direct scanout off regardless of config
pub const DISABLE_DIRECT_SCANOUT_ENV: &str = "WAYSCENE_DISABLE_DIRECT_SCANOUT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Compositor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub core: CoreConfig,
    pub workarounds: WorkaroundsConfig,
    pub animate: AnimateConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Color painted where no surface covers the output (RGBA)
    pub background_color: [f32; 4],

    /// How long a transaction waits for slow clients (ms)
    pub transaction_timeout_ms: u64,

    /// Present a single fullscreen opaque surface without compositing
    pub direct_scanout: bool,

    /// Log the damage of every painted frame
    pub damage_debug: bool,

    /// Repaint whole outputs every frame
    pub no_damage_track: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            background_color: [0.1, 0.1, 0.1, 1.0],
            transaction_timeout_ms: 100,
            direct_scanout: true,
            damage_debug: false,
            no_damage_track: false,
        }
    }
}

impl CoreConfig {
    /// Direct scanout allowed by both config and environment
    pub fn direct_scanout_enabled(&self) -> bool {
        let disabled_by_env = std::env::var(DISABLE_DIRECT_SCANOUT_ENV).is_ok_and(|v| v == "1");
        self.direct_scanout && !disabled_by_env
    }

    pub fn transaction_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.transaction_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkaroundsConfig {
    /// Let surfaces subtract their opaque region from damage and visibility.
    /// Some clients report wrong opaque regions; turning this off trades
    /// performance for correctness.
    pub enable_opaque_region_damage_optimizations: bool,
}

impl Default for WorkaroundsConfig {
    fn default() -> Self {
        Self {
            enable_opaque_region_damage_optimizations: true,
        }
    }
}

/// Options of the animate plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimateConfig {
    /// Effect name for newly mapped views, or "none"
    pub open_animation: String,
    pub close_animation: String,
    pub minimize_animation: String,

    /// Fallback duration for effects without their own (ms)
    pub duration_ms: u64,
    pub fade_duration_ms: u64,
    pub zoom_duration_ms: u64,
    pub spin_duration_ms: u64,
    pub spin_rotations: i32,

    /// Output fade-in when an output starts rendering (ms)
    pub startup_duration_ms: u64,

    /// Easing curve: "linear", "circle" or "sigmoid"
    pub easing: String,

    /// App ids animated with the open/close/minimize animation.
    /// Supports prefix matching with "*" and "all".
    pub enabled_for: Vec<String>,

    /// App ids always animated with fade
    pub fade_enabled_for: Vec<String>,

    /// App ids always animated with zoom
    pub zoom_enabled_for: Vec<String>,
}

impl Default for AnimateConfig {
    fn default() -> Self {
        Self {
            open_animation: "fade".to_string(),
            close_animation: "fade".to_string(),
            minimize_animation: "zoom".to_string(),
            duration_ms: 400,
            fade_duration_ms: 400,
            zoom_duration_ms: 500,
            spin_duration_ms: 500,
            spin_rotations: 1,
            startup_duration_ms: 600,
            easing: "circle".to_string(),
            enabled_for: vec!["all".to_string()],
            fade_enabled_for: Vec::new(),
            zoom_enabled_for: Vec::new(),
        }
    }
}

/// Check an app id against a list of patterns.
/// Supports exact match, "all", and prefix match with "*" suffix
/// (e.g., "org.gnome.*").
pub fn app_id_matches(patterns: &[String], app_id: &str) -> bool {
    patterns.iter().any(|pattern| {
        if pattern == "all" {
            true
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            app_id.starts_with(prefix)
        } else {
            app_id == pattern
        }
    })
}

impl Config {
    /// Load configuration from the first config file found, falling back to
    /// defaults
    pub fn load() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("wayscene/config.toml")),
            Some(PathBuf::from("/etc/wayscene/config.toml")),
        ];

        for path in config_paths.into_iter().flatten() {
            if path.exists() {
                match Self::from_path(&path) {
                    Ok(config) => {
                        tracing::info!(?path, "loaded configuration");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(?path, error = %e, "failed to load config");
                    }
                }
            }
        }

        tracing::info!("using default configuration");
        Self::default()
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.core.transaction_timeout_ms == 0 {
            return Err(ConfigError::Invalid("core.transaction_timeout_ms must be positive".into()));
        }
        if self
            .core
            .background_color
            .iter()
            .any(|c| !c.is_finite() || *c < 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "core.background_color must be non-negative, got {:?}",
                self.core.background_color
            )));
        }
        Ok(())
    }
}

/// Helper for getting XDG directories
mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== Parsing ==========

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.core.transaction_timeout_ms, 100);
        assert!(config.workarounds.enable_opaque_region_damage_optimizations);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [core]
            transaction_timeout_ms = 250

            [animate]
            open_animation = "zoom"
            fade_enabled_for = ["org.gnome.*"]
            "#,
        )
        .unwrap();
        assert_eq!(config.core.transaction_timeout_ms, 250);
        assert!(config.core.direct_scanout);
        assert_eq!(config.animate.open_animation, "zoom");
        assert_eq!(config.animate.close_animation, "fade");
        assert_eq!(config.animate.fade_enabled_for, vec!["org.gnome.*".to_string()]);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = Config::from_toml_str("[core\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    // ========== Validation ==========

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Config::from_toml_str("[core]\ntransaction_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn negative_color_is_rejected() {
        let mut config = Config::default();
        config.core.background_color = [0.0, -1.0, 0.0, 1.0];
        assert!(config.validate().is_err());
        config.core.background_color = [0.0, f32::NAN, 0.0, 1.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::from_path(Path::new("/nonexistent/wayscene.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    // ========== Matchers ==========

    #[test]
    fn app_id_patterns() {
        let patterns = vec!["org.gnome.*".to_string(), "firefox".to_string()];
        assert!(app_id_matches(&patterns, "org.gnome.Nautilus"));
        assert!(app_id_matches(&patterns, "firefox"));
        assert!(!app_id_matches(&patterns, "firefox-esr"));
        assert!(app_id_matches(&["all".to_string()], "anything"));
        assert!(!app_id_matches(&[], "anything"));
    }
}
