use std::path::PathBuf;

use livegate_core::{ConfigError, DeviceProfile, LivenessConfig};

/// Driver configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Explicit device profile. Takes precedence over a config file's own
    /// `profile` key; desktop when neither names one.
    pub profile: Option<DeviceProfile>,
    /// TOML file with liveness overrides.
    pub config_path: Option<PathBuf>,
    /// Overrides the profile's tick interval.
    pub tick_interval_ms: Option<u64>,
    /// Frame size reported by the replay camera.
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: None,
            config_path: None,
            tick_interval_ms: None,
            frame_width: 640,
            frame_height: 480,
        }
    }
}

impl Config {
    /// Load configuration from `LIVEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let profile = match lookup("LIVEGATE_PROFILE").map(|v| v.parse::<DeviceProfile>()) {
            Some(Ok(profile)) => Some(profile),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "ignoring LIVEGATE_PROFILE");
                defaults.profile
            }
            None => defaults.profile,
        };

        Self {
            profile,
            config_path: lookup("LIVEGATE_CONFIG")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            tick_interval_ms: parse(&lookup, "LIVEGATE_TICK_MS"),
            frame_width: parse(&lookup, "LIVEGATE_FRAME_WIDTH").unwrap_or(defaults.frame_width),
            frame_height: parse(&lookup, "LIVEGATE_FRAME_HEIGHT").unwrap_or(defaults.frame_height),
        }
    }

    /// Resolve the liveness settings: the profile preset with the config file
    /// merged over it, then the tick override.
    pub fn liveness(&self) -> Result<LivenessConfig, ConfigError> {
        let mut config = match &self.config_path {
            Some(path) => LivenessConfig::load_with_profile(path, self.profile)?,
            None => LivenessConfig::for_profile(self.profile.unwrap_or_default()),
        };
        if let Some(ms) = self.tick_interval_ms {
            config.tick_interval_ms = ms;
        }
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_env() {
        assert_eq!(from_pairs(&[]), Config::default());
    }

    #[test]
    fn test_reads_env_values() {
        let config = from_pairs(&[
            ("LIVEGATE_PROFILE", "constrained"),
            ("LIVEGATE_TICK_MS", "250"),
            ("LIVEGATE_FRAME_WIDTH", "1280"),
            ("LIVEGATE_FRAME_HEIGHT", "720"),
            ("LIVEGATE_CONFIG", "/etc/livegate.toml"),
        ]);
        assert_eq!(config.profile, Some(DeviceProfile::Constrained));
        assert_eq!(config.tick_interval_ms, Some(250));
        assert_eq!(config.frame_width, 1280);
        assert_eq!(config.frame_height, 720);
        assert_eq!(config.config_path, Some(PathBuf::from("/etc/livegate.toml")));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = from_pairs(&[
            ("LIVEGATE_PROFILE", "tablet"),
            ("LIVEGATE_FRAME_WIDTH", "wide"),
            ("LIVEGATE_CONFIG", ""),
        ]);
        assert_eq!(config.profile, None);
        assert_eq!(config.frame_width, 640);
        assert_eq!(config.config_path, None);
    }

    #[test]
    fn test_liveness_uses_profile_and_tick_override() {
        let config = Config {
            profile: Some(DeviceProfile::Constrained),
            tick_interval_ms: Some(100),
            ..Config::default()
        };
        let liveness = config.liveness().unwrap();
        assert_eq!(liveness.miss_threshold, 6);
        assert_eq!(liveness.tick_interval_ms, 100);
    }

    #[test]
    fn test_liveness_missing_file_is_an_error() {
        let config = Config {
            config_path: Some(PathBuf::from("/nonexistent/livegate.toml")),
            ..Config::default()
        };
        assert!(matches!(config.liveness(), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_profile_overrides_config_file() {
        let path = std::env::temp_dir().join(format!("livegate-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "profile = \"desktop\"\nmouth_step = true\n").unwrap();

        let from_file = Config {
            config_path: Some(path.clone()),
            ..Config::default()
        }
        .liveness()
        .unwrap();
        assert_eq!(from_file.profile, DeviceProfile::Desktop);

        let overridden = Config {
            profile: Some(DeviceProfile::Constrained),
            config_path: Some(path.clone()),
            ..Config::default()
        }
        .liveness()
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(overridden.profile, DeviceProfile::Constrained);
        assert_eq!(overridden.miss_threshold, 6);
        assert!(overridden.mouth_step);
    }
}
