//  Copyright 2024, The Tari Project
//
//  Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
//  following conditions are met:
//
//  1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
//  disclaimer.
//
//  2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
//  following disclaimer in the documentation and/or other materials provided with the distribution.
//
//  3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
//  products derived from this software without specific prior written permission.
//
//  THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
//  INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
//  DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
//  SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
//  SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
//  WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
//  USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! # Application configuration
//!
//! Configuration is read with the `config` crate. Every component owns a section (for example `[block_sync]` or
//! `[transport]`) and a config struct that implements [`Deserialize`][serde::Deserialize], [`Serialize`],
//! [`Default`] and [`SubConfigPath`]. Such a struct gets [`DefaultConfigLoader`] for free: any value missing from the
//! config source is taken from the struct's `Default`.
//!
//! ## Example
//!
//! ```
//! # use config::Config;
//! # use serde::{Deserialize, Serialize};
//! use meridian_common::{DefaultConfigLoader, SubConfigPath};
//!
//! #[derive(Serialize, Deserialize)]
//! struct MyNodeConfig {
//!     welcome_message: String,
//!     goodbye_message: String,
//! }
//! impl Default for MyNodeConfig {
//!     fn default() -> Self {
//!         Self {
//!             welcome_message: "welcome".into(),
//!             goodbye_message: "bye bye".into(),
//!         }
//!     }
//! }
//! impl SubConfigPath for MyNodeConfig {
//!     fn main_key_prefix() -> &'static str {
//!         "my_node"
//!     }
//! }
//! let config = Config::builder()
//!     .set_override("my_node.goodbye_message", "see you later")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let my_config = <MyNodeConfig as DefaultConfigLoader>::load_from(&config).unwrap();
//! assert_eq!(my_config.goodbye_message, "see you later".to_string());
//! assert_eq!(my_config.welcome_message, MyNodeConfig::default().welcome_message);
//! ```

use std::path::Path;

use config::{Config, File};
use serde::{de::DeserializeOwned, Serialize};

use super::ConfigurationError;

/// Names the config section a struct is loaded from.
pub trait SubConfigPath {
    /// Main configuration section, e.g. `"block_sync"`
    fn main_key_prefix() -> &'static str;
}

/// Configuration loader based on [SubConfigPath] with defaults taken from [Default].
pub trait DefaultConfigLoader: SubConfigPath + Default + Serialize + DeserializeOwned {
    /// Load the section named by `main_key_prefix()`. Values absent from `config` are taken from `Self::default()`.
    fn load_from(config: &Config) -> Result<Self, ConfigurationError> {
        let section = Self::main_key_prefix();
        let default = serde_json::to_value(Self::default())
            .and_then(serde_json::from_value::<config::Value>)
            .map_err(|source| ConfigurationError::DefaultValues { section, source })?;
        let merged = Config::builder()
            .set_default(section, default)?
            .add_source(config.clone())
            .build()?;
        Ok(merged.get(section)?)
    }
}

impl<C> DefaultConfigLoader for C where C: SubConfigPath + Default + Serialize + DeserializeOwned {}

/// Reads a TOML configuration file. Environment variables prefixed with `MERIDIAN` (sections separated by `__`, e.g.
/// `MERIDIAN_BLOCK_SYNC__BATCH_SIZE`) take precedence over the file.
pub fn load_configuration_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigurationError> {
    let config = Config::builder()
        .add_source(File::from(path.as_ref()).required(true))
        .add_source(
            config::Environment::with_prefix("MERIDIAN")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    Ok(config)
}

#[cfg(test)]
mod test {
    use std::{fs, time::Duration};

    use meridian_test_utils::paths::{random_file_in, with_temp_dir};
    use serde::Deserialize;

    use super::*;
    use crate::configuration::serializers;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct SyncSection {
        batch_size: u32,
        #[serde(with = "serializers::seconds")]
        no_commit_interval: Duration,
        peers: Vec<String>,
    }

    impl Default for SyncSection {
        fn default() -> Self {
            Self {
                batch_size: 10,
                no_commit_interval: Duration::from_secs(5),
                peers: vec!["a".to_string()],
            }
        }
    }

    impl SubConfigPath for SyncSection {
        fn main_key_prefix() -> &'static str {
            "sync_section"
        }
    }

    #[test]
    fn it_uses_defaults_for_missing_values() {
        let config = Config::builder()
            .set_override("sync_section.batch_size", 42)
            .unwrap()
            .build()
            .unwrap();
        let section = SyncSection::load_from(&config).unwrap();
        assert_eq!(section.batch_size, 42);
        assert_eq!(section.no_commit_interval, Duration::from_secs(5));
        assert_eq!(section.peers, vec!["a".to_string()]);
    }

    #[test]
    fn it_loads_a_toml_file() {
        with_temp_dir(|dir| {
            let path = random_file_in(dir, "toml");
            fs::write(&path, "[sync_section]\nno_commit_interval = 9\n").unwrap();
            let config = load_configuration_file(&path).unwrap();
            let section = SyncSection::load_from(&config).unwrap();
            assert_eq!(section.no_commit_interval, Duration::from_secs(9));
            assert_eq!(section.batch_size, 10);
        });
    }

    #[test]
    fn it_rejects_unknown_fields() {
        let config = Config::builder()
            .set_override("sync_section.no_such_field", 1)
            .unwrap()
            .build()
            .unwrap();
        assert!(SyncSection::load_from(&config).is_err());
    }
}
