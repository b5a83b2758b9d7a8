//! Session configuration.

/// Settings applied by [`crate::Session`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Playback rate reported back to the host on action change.
    pub frame_rate: u32,
    /// Run the limb solver after each evaluated frame.
    pub solve_ik: bool,
    /// Name given to an animation appended by a save that targets no existing clip.
    pub new_animation_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            solve_ik: true,
            new_animation_name: "NEW_ANIMATION".to_string(),
        }
    }
}

#[cfg(feature = "json")]
impl Config {
    /// Parses a config; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, crate::Error> {
        serde_json::from_str(s).map_err(|e| crate::Error::ConfigParse {
            message: e.to_string(),
        })
    }
}
