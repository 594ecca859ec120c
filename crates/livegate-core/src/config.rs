use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::oval::OvalConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("unknown device profile {0:?} (expected desktop or constrained)")]
    UnknownProfile(String),
}

/// Device class the session runs on. Selects the detection tolerances that
/// depend on camera quality and frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProfile {
    #[default]
    Desktop,
    /// Phones and other low-frame-rate cameras.
    Constrained,
}

impl FromStr for DeviceProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(Self::Desktop),
            "constrained" | "mobile" => Ok(Self::Constrained),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }
}

/// Target oval geometry relative to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OvalSettings {
    /// Oval centre as a fraction of frame width.
    pub center_x_ratio: f32,
    /// Oval centre as a fraction of frame height.
    pub center_y_ratio: f32,
    /// Horizontal radius as a fraction of frame width.
    pub radius_x_ratio: f32,
    /// Vertical radius as a multiple of the horizontal radius.
    pub aspect: f32,
    /// The preview shown to the user is horizontally flipped.
    pub mirror_x: bool,
    pub fill_ratio_lower_bound: f32,
    pub fill_ratio_upper_bound: f32,
    pub containment_slack: f32,
}

impl Default for OvalSettings {
    fn default() -> Self {
        Self {
            center_x_ratio: 0.5,
            center_y_ratio: 0.5,
            radius_x_ratio: 0.25,
            aspect: 1.2,
            mirror_x: false,
            fill_ratio_lower_bound: 0.4,
            fill_ratio_upper_bound: 0.59,
            containment_slack: 1.0,
        }
    }
}

impl OvalSettings {
    /// Resolve to absolute pixel geometry for a frame of the given size.
    pub fn resolve(&self, frame_width: u32, frame_height: u32) -> OvalConfig {
        let width = frame_width as f32;
        let height = frame_height as f32;
        let radius_x = width * self.radius_x_ratio;
        OvalConfig {
            center_x: width * self.center_x_ratio,
            center_y: height * self.center_y_ratio,
            radius_x,
            radius_y: radius_x * self.aspect,
            mirror_x: self.mirror_x,
            fill_ratio_lower_bound: self.fill_ratio_lower_bound,
            fill_ratio_upper_bound: self.fill_ratio_upper_bound,
            containment_slack: self.containment_slack,
        }
    }
}

/// Every tunable of a liveness session. Immutable once a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub profile: DeviceProfile,
    /// Insert the randomized left/right challenge after `Start`.
    pub challenge_step: bool,
    /// Insert the mouth-open step after `Blink`.
    pub mouth_step: bool,
    /// Consecutive missed detections tolerated before the face is unstable.
    pub miss_threshold: u32,
    /// Minimum frame-to-frame change of the mean eye-aspect-ratio.
    pub ear_delta: f32,
    /// A blink completes once the EAR change count exceeds this.
    pub blink_changes_required: u32,
    pub mouth_open_ratio: f32,
    /// Nose-tip horizontal travel between ticks that counts as a head turn.
    pub head_turn_px: f32,
    /// Nose offset from the eye centre required by the challenge.
    pub challenge_offset_px: f32,
    pub challenge_timeout_ms: u64,
    pub hold_duration_ms: u64,
    pub transition_delay_ms: u64,
    pub tick_interval_ms: u64,
    /// Recent landmark samples kept for spoof evidence.
    pub spoof_buffer_len: usize,
    pub oval: OvalSettings,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self::desktop()
    }
}

impl LivenessConfig {
    pub fn desktop() -> Self {
        Self {
            profile: DeviceProfile::Desktop,
            challenge_step: true,
            mouth_step: false,
            miss_threshold: 3,
            ear_delta: 0.01,
            blink_changes_required: 2,
            mouth_open_ratio: 0.4,
            head_turn_px: 30.0,
            challenge_offset_px: 20.0,
            challenge_timeout_ms: 5000,
            hold_duration_ms: 2000,
            transition_delay_ms: 200,
            tick_interval_ms: 400,
            spoof_buffer_len: 10,
            oval: OvalSettings::default(),
        }
    }

    pub fn constrained() -> Self {
        Self {
            profile: DeviceProfile::Constrained,
            miss_threshold: 6,
            challenge_offset_px: 15.0,
            tick_interval_ms: 300,
            ..Self::desktop()
        }
    }

    pub fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Desktop => Self::desktop(),
            DeviceProfile::Constrained => Self::constrained(),
        }
    }

    /// Parse a TOML document. Missing keys fall back to the profile named in
    /// the document (desktop when absent).
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::from_toml_with_profile(text, None)
    }

    /// Like [`from_toml_str`](Self::from_toml_str), but an explicit `profile`
    /// replaces the document's own `profile` key as the merge base.
    pub fn from_toml_with_profile(
        text: &str,
        profile: Option<DeviceProfile>,
    ) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct ProfileOnly {
            #[serde(default)]
            profile: DeviceProfile,
        }

        let ProfileOnly { profile: named } = toml::from_str(text)?;
        let mut merged = toml::Value::try_from(Self::for_profile(profile.unwrap_or(named)))?;
        let mut overrides: toml::Value = toml::from_str(text)?;
        if let toml::Value::Table(table) = &mut overrides {
            table.remove("profile");
        }
        merge_toml(&mut merged, overrides);
        Ok(merged.try_into()?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_profile(path, None)
    }

    pub fn load_with_profile(
        path: &Path,
        profile: Option<DeviceProfile>,
    ) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_with_profile(&text, profile)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn hold_duration(&self) -> Duration {
        Duration::from_millis(self.hold_duration_ms)
    }

    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_millis(self.challenge_timeout_ms)
    }

    pub fn transition_delay(&self) -> Duration {
        Duration::from_millis(self.transition_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

fn merge_toml(base: &mut toml::Value, overrides: toml::Value) {
    match (base, overrides) {
        (toml::Value::Table(base), toml::Value::Table(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_differ_where_devices_differ() {
        let desktop = LivenessConfig::desktop();
        let constrained = LivenessConfig::constrained();
        assert_eq!(desktop.miss_threshold, 3);
        assert_eq!(constrained.miss_threshold, 6);
        assert_eq!(desktop.challenge_offset_px, 20.0);
        assert_eq!(constrained.challenge_offset_px, 15.0);
        assert_eq!(desktop.hold_duration_ms, constrained.hold_duration_ms);
    }

    #[test]
    fn test_default_oval_matches_frame() {
        let oval = OvalSettings::default().resolve(640, 480);
        assert_eq!(oval.center_x, 320.0);
        assert_eq!(oval.center_y, 240.0);
        assert_eq!(oval.radius_x, 160.0);
        assert!((oval.radius_y - 192.0).abs() < 1e-4);
    }

    #[test]
    fn test_toml_partial_override() {
        let config = LivenessConfig::from_toml_str(
            "hold_duration_ms = 3000\n[oval]\nmirror_x = true\n",
        )
        .unwrap();
        assert_eq!(config.hold_duration_ms, 3000);
        assert!(config.oval.mirror_x);
        assert_eq!(config.oval.fill_ratio_lower_bound, 0.4);
        assert_eq!(config.miss_threshold, 3);
    }

    #[test]
    fn test_toml_profile_selects_base() {
        let config =
            LivenessConfig::from_toml_str("profile = \"constrained\"\nmouth_step = true\n")
                .unwrap();
        assert_eq!(config.profile, DeviceProfile::Constrained);
        assert_eq!(config.miss_threshold, 6);
        assert!(config.mouth_step);
    }

    #[test]
    fn test_explicit_profile_replaces_document_profile() {
        let text = "profile = \"desktop\"\nhold_duration_ms = 3000\n";
        let config =
            LivenessConfig::from_toml_with_profile(text, Some(DeviceProfile::Constrained))
                .unwrap();
        assert_eq!(config.profile, DeviceProfile::Constrained);
        assert_eq!(config.miss_threshold, 6);
        assert_eq!(config.hold_duration_ms, 3000);

        let unnamed =
            LivenessConfig::from_toml_with_profile("mouth_step = true\n", None).unwrap();
        assert_eq!(unnamed.profile, DeviceProfile::Desktop);
        assert!(unnamed.mouth_step);
    }

    #[test]
    fn test_toml_rejects_bad_type() {
        let err = LivenessConfig::from_toml_str("hold_duration_ms = \"long\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_render_parses_back() {
        let config = LivenessConfig::constrained();
        let text = config.to_toml_string().unwrap();
        assert_eq!(LivenessConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("desktop".parse::<DeviceProfile>().unwrap(), DeviceProfile::Desktop);
        assert_eq!(
            " Constrained ".parse::<DeviceProfile>().unwrap(),
            DeviceProfile::Constrained
        );
        assert_eq!("mobile".parse::<DeviceProfile>().unwrap(), DeviceProfile::Constrained);
        assert!(matches!(
            "tablet".parse::<DeviceProfile>(),
            Err(ConfigError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_zero_tick_interval_is_clamped() {
        let config = LivenessConfig {
            tick_interval_ms: 0,
            ..LivenessConfig::desktop()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }
}
