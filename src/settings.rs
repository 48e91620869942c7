//!
//! Runtime settings.
//!
//! Settings are read from an optional config file (any format the `config`
//! crate understands, `config.toml` by default) and then from `HN_`
//! environment variables, with `__` separating nested keys:
//!
//! ```text
//! [fire_and_forget]
//! should_always_rethrow_exception = false
//!
//! [demo]
//! story_count = 25
//! pattern = "good"        # or "bad"
//! ```
//!
//! `HN_DEMO__PATTERN=bad` overrides `demo.pattern`.
//!
use crate::fire_and_forget::FireAndForgetSettings;
use crate::{Error, Result};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CONFIG_NAME: &str = "config";
pub const ENV_PREFIX: &str = "HN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fire_and_forget: FireAndForgetConfig,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FireAndForgetConfig {
    pub should_always_rethrow_exception: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// How many top stories to load.
    pub story_count: usize,
    /// `good` loads stories concurrently, `bad` one at a time.
    pub pattern: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            story_count: 25,
            pattern: LoadPattern::Good.to_string(),
        }
    }
}

impl DemoConfig {
    pub fn load_pattern(&self) -> Result<LoadPattern> {
        self.pattern.parse()
    }
}

/// How the demo loads its stories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPattern {
    /// Await each story before requesting the next.
    Bad,
    /// Request every story at once and await them together.
    Good,
}

impl FromStr for LoadPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bad" => Ok(LoadPattern::Bad),
            "good" => Ok(LoadPattern::Good),
            other => Err(Error::Config(ConfigError::Message(format!(
                "unknown load pattern `{}`, expected `good` or `bad`",
                other
            )))),
        }
    }
}

impl fmt::Display for LoadPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPattern::Bad => write!(f, "bad"),
            LoadPattern::Good => write!(f, "good"),
        }
    }
}

impl Settings {
    /// Load settings from `config_name` (missing file is fine) and the
    /// environment.
    pub fn load(config_name: &str) -> Result<Self> {
        let mut config = Config::default();
        config
            .merge(File::with_name(config_name).required(false))?
            .merge(Environment::with_prefix(ENV_PREFIX).separator("__"))?;
        Self::from_config(config)
    }

    /// Deserialize `config`, filling every missing key with its default.
    pub fn from_config(mut config: Config) -> Result<Self> {
        // an empty config deserializes as unit, so defaults are seeded as keys
        let demo = DemoConfig::default();
        config
            .set_default("fire_and_forget.should_always_rethrow_exception", false)?
            .set_default("demo.story_count", demo.story_count as i64)?
            .set_default("demo.pattern", demo.pattern)?;
        let settings: Settings = config.try_into()?;
        settings.demo.load_pattern()?;
        Ok(settings)
    }
}

impl From<&FireAndForgetConfig> for FireAndForgetSettings {
    fn from(config: &FireAndForgetConfig) -> Self {
        let mut settings = FireAndForgetSettings::new();
        settings.initialize(config.should_always_rethrow_exception);
        settings
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn defaults_without_config_file_test() {
        let settings = Settings::from_config(Config::default()).unwrap();

        assert!(!settings.fire_and_forget.should_always_rethrow_exception);
        assert_eq!(settings.demo.story_count, 25);
        assert_eq!(settings.demo.load_pattern().unwrap(), LoadPattern::Good);
    }

    #[test]
    fn partial_config_keeps_other_defaults_test() {
        let mut config = Config::default();
        config.set("demo.pattern", "bad").unwrap();

        let settings = Settings::from_config(config).unwrap();

        assert_eq!(settings.demo.story_count, 25);
        assert_eq!(settings.demo.load_pattern().unwrap(), LoadPattern::Bad);
        assert!(!settings.fire_and_forget.should_always_rethrow_exception);
    }

    #[test]
    fn values_override_defaults_test() {
        let mut config = Config::default();
        config.set("demo.story_count", 5).unwrap();
        config.set("demo.pattern", "Bad").unwrap();
        config
            .set("fire_and_forget.should_always_rethrow_exception", true)
            .unwrap();

        let settings = Settings::from_config(config).unwrap();

        assert_eq!(settings.demo.story_count, 5);
        assert_eq!(settings.demo.load_pattern().unwrap(), LoadPattern::Bad);
        let fire_and_forget = FireAndForgetSettings::from(&settings.fire_and_forget);
        assert!(fire_and_forget.should_always_rethrow_exception());
    }

    #[test]
    fn unknown_pattern_is_rejected_test() {
        let mut config = Config::default();
        config.set("demo.pattern", "sideways").unwrap();

        let err = Settings::from_config(config).unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("sideways"));
    }

    #[test]
    #[serial]
    fn environment_overrides_test() {
        env::set_var("HN_DEMO__STORY_COUNT", "3");
        let settings = Settings::load("does-not-exist");
        env::remove_var("HN_DEMO__STORY_COUNT");

        assert_eq!(settings.unwrap().demo.story_count, 3);
    }
}
