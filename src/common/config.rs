//! Settings read from a json file next to the executable.
//!
//! Lookups go settings file first, then an explicit default, then the defaults
//! the caller built the Config with.  The client also writes its calibration
//! profile back through [`Config::save_settings`].
use json::JsonValue;
use regex::Regex;
use std::{
    error::Error,
    fmt,
    fs::File,
    io::{ErrorKind, Write},
};
use log::{info, warn};

#[derive(Debug)]
pub struct MissingConfigError {
    key: String,
}

impl fmt::Display for MissingConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Required configuration value '{}' is missing", self.key)
    }
}

impl Error for MissingConfigError {}

pub struct Config {
    filename: String,
    settings: JsonValue,
    defaults: JsonValue,
}

impl Config {
    pub fn build(filename: String, defaults: JsonValue) -> Result<Config, std::io::Error> {
        let filename_regex = Regex::new(r"^[a-zA-Z0-9_\-\.]+\.json$")
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
        if !filename_regex.is_match(&filename) {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "Invalid filename '{}' - must contain only letters, numbers, underscore, dash, dot and end in .json",
                    filename
                ),
            ));
        }

        let mut config = Config {
            filename,
            settings: json::object! {},
            defaults,
        };

        if let Err(err) = config.load_from_file() {
            info!("Using default settings ({}): {}", config.filename, err);
        }

        Ok(config)
    }

    fn load_from_file(&mut self) -> std::io::Result<()> {
        let raw_data = std::fs::read_to_string(&self.filename)?;
        match json::parse(&raw_data) {
            Ok(parsed) if parsed.is_object() => {
                self.settings = parsed;
                info!("Loaded settings from {}: {}", self.filename, self.settings.dump());
            }
            Ok(_) => warn!("Config file {} is not a json object, ignoring it", self.filename),
            Err(err) => warn!("Failed to parse config file {}: {}", self.filename, err),
        }
        Ok(())
    }

    fn lookup<T>(
        &self,
        key: &str,
        default: Option<T>,
        extract: impl Fn(&JsonValue) -> Option<T>,
    ) -> Result<T, MissingConfigError> {
        if let Some(val) = extract(&self.settings[key]) {
            return Ok(val);
        }
        if let Some(def) = default {
            return Ok(def);
        }
        extract(&self.defaults[key]).ok_or_else(|| MissingConfigError {
            key: key.to_string(),
        })
    }

    pub fn get_str_value(&self, key: &str, default: Option<String>) -> Result<String, MissingConfigError> {
        self.lookup(key, default, |v| v.as_str().map(String::from))
    }

    pub fn get_bool_value(&self, key: &str, default: Option<bool>) -> Result<bool, MissingConfigError> {
        self.lookup(key, default, |v| v.as_bool())
    }

    pub fn get_u32_value(&self, key: &str, default: Option<u32>) -> Result<u32, MissingConfigError> {
        self.lookup(key, default, |v| v.as_u32())
    }

    pub fn get_i64_value(&self, key: &str, default: Option<i64>) -> Result<i64, MissingConfigError> {
        self.lookup(key, default, |v| v.as_i64())
    }

    pub fn get_f64_value(&self, key: &str, default: Option<f64>) -> Result<f64, MissingConfigError> {
        self.lookup(key, default, |v| v.as_f64())
    }

    /// true when the settings file (not the defaults) holds this key
    pub fn has_setting(&self, key: &str) -> bool {
        self.settings.has_key(key)
    }

    pub fn set_value(&mut self, key: &str, val: impl Into<JsonValue>) -> Result<(), String> {
        let json_val = val.into();
        match json_val {
            JsonValue::Short(_) | JsonValue::String(_) | JsonValue::Boolean(_) | JsonValue::Number(_) => {
                self.settings[key] = json_val;
                Ok(())
            }
            _ => Err(format!("Unsupported value type for key: {}", key)),
        }
    }

    pub fn get_filename(&self) -> &str {
        &self.filename
    }

    pub fn save_settings(&self) -> std::io::Result<()> {
        let mut f = File::create(self.filename.as_str())?;
        f.write_all(self.settings.pretty(2).as_bytes())?;
        f.sync_all()
    }
}
