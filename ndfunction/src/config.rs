/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Configuration for functions.
//!
//! A [`Config`] carries the defaults a [`crate::Function`] applies to
//! the variables it creates, plus the checks it performs on writes and
//! on projected reads. Configurations can be loaded from environment
//! variables and YAML files; partial sources are expressed as a
//! [`ConfigOverlay`] and merged onto the defaults.

use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::variable::ExtrapolationType;
use crate::variable::InterpolationType;

/// Environment variable naming the default interpolation policy.
pub const DEFAULT_INTERPOLATION_ENV: &str = "NDFUNCTION_DEFAULT_INTERPOLATION";
/// Environment variable naming the default extrapolation policy.
pub const DEFAULT_EXTRAPOLATION_ENV: &str = "NDFUNCTION_DEFAULT_EXTRAPOLATION";
/// Environment variable toggling argument sortedness enforcement.
pub const ENFORCE_SORTED_ENV: &str = "NDFUNCTION_ENFORCE_SORTED";
/// Environment variable toggling projection generation checks.
pub const CHECK_VIEW_GENERATION_ENV: &str = "NDFUNCTION_CHECK_VIEW_GENERATION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Interpolation policy of variables created through a function.
    pub default_interpolation: InterpolationType,
    /// Extrapolation policy of variables created through a function.
    pub default_extrapolation: ExtrapolationType,
    /// Reject argument values that would leave an argument unsorted.
    pub enforce_sorted_arguments: bool,
    /// Reject projected reads and writes after the underlying grid has
    /// been restructured.
    pub check_view_generation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_interpolation: InterpolationType::Linear,
            default_extrapolation: ExtrapolationType::None,
            enforce_sorted_arguments: true,
            check_view_generation: true,
        }
    }
}

/// A partial configuration: only the fields that are set override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverlay {
    pub default_interpolation: Option<InterpolationType>,
    pub default_extrapolation: Option<ExtrapolationType>,
    pub enforce_sorted_arguments: Option<bool>,
    pub check_view_generation: Option<bool>,
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let val = env::var(key).ok()?;
    match val.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::error!("ignoring malformed {}={}: {}", key, val, err);
            None
        }
    }
}

impl ConfigOverlay {
    /// The settings present in the environment.
    pub fn from_env() -> Self {
        Self {
            default_interpolation: parse_env(DEFAULT_INTERPOLATION_ENV),
            default_extrapolation: parse_env(DEFAULT_EXTRAPOLATION_ENV),
            enforce_sorted_arguments: parse_env(ENFORCE_SORTED_ENV),
            check_view_generation: parse_env(CHECK_VIEW_GENERATION_ENV),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// The defaults, overridden by the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.merge(&ConfigOverlay::from_env());
        config
    }

    /// The defaults, overridden by the settings in a YAML file. Fields
    /// missing from the file keep their defaults.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let mut file = File::open(path.as_ref())?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let overlay: ConfigOverlay = serde_yaml::from_str(&contents)?;
        let mut config = Self::default();
        config.merge(&overlay);
        tracing::info!(path = %path.as_ref().display(), ?config, "loaded configuration");
        Ok(config)
    }

    /// Merge with an overlay, with the overlay taking precedence
    pub fn merge(&mut self, other: &ConfigOverlay) {
        if let Some(value) = other.default_interpolation {
            self.default_interpolation = value;
        }
        if let Some(value) = other.default_extrapolation {
            self.default_extrapolation = value;
        }
        if let Some(value) = other.enforce_sorted_arguments {
            self.enforce_sorted_arguments = value;
        }
        if let Some(value) = other.check_view_generation {
            self.check_view_generation = value;
        }
    }

    /// Save configuration to a YAML file
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

/// Global configuration functions
///
/// [`crate::Function::new`] takes its configuration from here. The
/// global configuration is initialized from the environment on first
/// use.
///
/// Tests that override the global configuration must hold
/// [`global::lock`] so that they are serialized:
///
/// ```ignore rust
/// let config = ndfunction::config::global::lock();
/// let _guard = config.override_config(Config { .. });
/// ```
pub mod global {
    use std::sync::LazyLock;

    use parking_lot::Mutex;
    use parking_lot::MutexGuard;
    use parking_lot::RwLock;

    use super::*;

    static CONFIG: LazyLock<RwLock<Config>> = LazyLock::new(|| RwLock::new(Config::from_env()));

    /// A snapshot of the global configuration.
    pub fn get() -> Config {
        CONFIG.read().clone()
    }

    /// Initialize the global configuration from environment variables
    pub fn init_from_env() {
        *CONFIG.write() = Config::from_env();
    }

    /// Initialize the global configuration from a YAML file
    pub fn init_from_yaml<P: AsRef<Path>>(path: P) -> Result<(), anyhow::Error> {
        let config = Config::from_yaml(path)?;
        *CONFIG.write() = config;
        Ok(())
    }

    /// Acquire the lock serializing global overrides.
    pub fn lock() -> ConfigLock {
        static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));
        ConfigLock {
            _guard: MUTEX.lock(),
        }
    }

    /// Holds the override lock; the only way to create overrides.
    pub struct ConfigLock {
        _guard: MutexGuard<'static, ()>,
    }

    impl ConfigLock {
        /// Replace the global configuration until the returned guard is
        /// dropped.
        pub fn override_config(&self, config: Config) -> ConfigGuard<'_> {
            let orig = std::mem::replace(&mut *CONFIG.write(), config);
            ConfigGuard {
                orig: Some(orig),
                _lock: self,
            }
        }
    }

    /// Restores the previous global configuration when dropped.
    pub struct ConfigGuard<'a> {
        orig: Option<Config>,
        _lock: &'a ConfigLock,
    }

    impl Drop for ConfigGuard<'_> {
        fn drop(&mut self) {
            if let Some(orig) = self.orig.take() {
                *CONFIG.write() = orig;
            }
        }
    }
}
