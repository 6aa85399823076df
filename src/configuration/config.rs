#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::env;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    ApiURL,
    ConfigFile,
    RequestTimeout,
    RetryBaseDelay,
    RetryMaxAttempts,
    RetryMaxDelay,
    Username,
}

impl ConfigKey {
    pub fn is_numeric(&self) -> bool {
        return matches!(
            self,
            ConfigKey::RequestTimeout
                | ConfigKey::RetryBaseDelay
                | ConfigKey::RetryMaxAttempts
                | ConfigKey::RetryMaxDelay
        );
    }
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn get_u64(key: ConfigKey) -> Result<u64> {
        let val = Config::get(key);
        if let Ok(num) = val.parse::<u64>() {
            return Ok(num);
        }

        bail!(format!("Config key '{key}' must be a whole number, got '{val}'"));
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    pub fn default(key: ConfigKey) -> String {
        if key == ConfigKey::Username {
            let mut user = env::var("USER").unwrap_or_else(|_| return "".to_string());
            if user.is_empty() {
                user = "User".to_string();
            }

            return user;
        }

        #[cfg(not(target_os = "macos"))]
        let config_path = dirs::config_dir()
            .unwrap_or_else(|| return path::PathBuf::from("."))
            .join("council/config.toml");
        #[cfg(target_os = "macos")]
        let config_path = path::PathBuf::from(env::var("HOME").unwrap_or_default())
            .join(".config/council/config.toml");

        let res = match key {
            ConfigKey::ApiURL => "http://localhost:8001",
            ConfigKey::RequestTimeout => "10000",
            ConfigKey::RetryBaseDelay => "600",
            ConfigKey::RetryMaxAttempts => "3",
            ConfigKey::RetryMaxDelay => "5000",

            // Special
            ConfigKey::ConfigFile => return config_path.to_string_lossy().to_string(),
            ConfigKey::Username => "",
        };

        return res.to_string();
    }

    /// Reads every known key out of a TOML config file. Empty strings are
    /// skipped so they fall back to the defaults.
    pub async fn read_file(config_path: &path::Path) -> Result<Vec<(ConfigKey, String)>> {
        let toml_str = fs::read_to_string(config_path).await?;
        let doc = toml_str.parse::<toml_edit::Document>()?;

        let mut values = vec![];
        for key in ConfigKey::iter() {
            if key == ConfigKey::ConfigFile {
                continue;
            }

            if let Some(val) = doc.get(&key.to_string()) {
                if let Some(val_int) = val.as_integer() {
                    if val_int < 0 {
                        bail!(format!(
                            "config.toml has an invalid value for key '{key}': {val_int}"
                        ));
                    }
                    values.push((key, val_int.to_string()));
                } else if let Some(val_str) = val.as_str() {
                    if val_str.is_empty() {
                        continue;
                    }
                    if key.is_numeric() && val_str.parse::<u64>().is_err() {
                        bail!(format!("config.toml has an invalid value for key '{key}': {val_str}\nExpected a whole number."));
                    }
                    values.push((key, val_str.to_string()));
                } else {
                    bail!(format!(
                        "config.toml has an invalid {} for key '{key}'",
                        val.type_name()
                    ));
                }
            }
        }

        return Ok(values);
    }

    pub async fn load(clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(&config_file);
        if config_path.exists() {
            for (key, val) in Config::read_file(&config_path).await? {
                Config::set(key, &val);
            }
        }
        Config::set(ConfigKey::ConfigFile, &config_file);

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    if key.is_numeric() && val.parse::<u64>().is_err() {
                        bail!(format!("Invalid value for '--{key}': {val}\nExpected a whole number."));
                    }
                    Config::set(key, val)
                }
            }
        }

        tracing::debug!(
            api_url = Config::get(ConfigKey::ApiURL),
            config_file = Config::get(ConfigKey::ConfigFile),
            request_timeout = Config::get(ConfigKey::RequestTimeout),
            retry_base_delay = Config::get(ConfigKey::RetryBaseDelay),
            retry_max_attempts = Config::get(ConfigKey::RetryMaxAttempts),
            retry_max_delay = Config::get(ConfigKey::RetryMaxDelay),
            username = Config::get(ConfigKey::Username),
            "config"
        );

        return Ok(());
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                if key == ConfigKey::Username {
                    return Some(
                        "# Your user name displayed in printed transcripts.\n# username = \"\""
                            .to_string(),
                    );
                }

                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key.to_string().as_str()))?;

                let mut description = arg
                    .get_help()
                    .map(|help| return help.to_string())
                    .unwrap_or_default();

                description = description
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if key.is_numeric() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
