//! The derived, always-total view over the `settings` collection.
//!
//! Raw [`Setting`] records are key/value rows with JSON-encoded string
//! values. [`ClientSettings`] folds them into one struct with a default
//! for every absent key, so consumers never handle missing settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Setting;

/// Typed view of the device settings, total over all known keys.
///
/// Derived from the settings mirror on demand; never stored. Keys the
/// backend sends that this struct does not know land in `extra` instead
/// of being dropped, so a newer backend stays round-trippable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Whether first-run setup has completed.
    pub setup: bool,
    /// Target platform the device reports, e.g. `"windows"` or `"linux"`.
    pub os: String,
    /// Directory games are installed into.
    pub games_directory: String,
    /// Launcher command used when a game record names none.
    pub default_launcher: String,
    /// Catalog server URL.
    pub server_url: String,
    /// Stored catalog credentials.
    pub email: String,
    pub password: String,
    /// Whether cover art is scaled to fill its tile.
    pub fit_covers: bool,
    /// Unrecognized keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            setup: false,
            os: "windows".to_string(),
            games_directory: String::new(),
            default_launcher: String::new(),
            server_url: String::new(),
            email: String::new(),
            password: String::new(),
            fit_covers: true,
            extra: BTreeMap::new(),
        }
    }
}

/// Decode one stored setting value.
///
/// Values are written JSON-encoded, but older rows may hold bare strings;
/// anything that fails to parse as JSON is kept as a plain string.
fn decode_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

impl ClientSettings {
    /// Fold setting records into the typed view.
    ///
    /// Later records win when a key repeats. A value whose decoded type
    /// does not match the typed field is kept under `extra` rather than
    /// coerced, and the field stays at its default.
    pub fn from_records(records: &[Setting]) -> Self {
        let mut settings = Self::default();
        for record in records {
            let value = decode_value(&record.value);
            match (record.key.as_str(), value) {
                ("setup", Value::Bool(b)) => settings.setup = b,
                ("fitCovers", Value::Bool(b)) => settings.fit_covers = b,
                ("os", Value::String(s)) => settings.os = s,
                ("gamesDirectory", Value::String(s)) => settings.games_directory = s,
                ("defaultLauncher", Value::String(s)) => settings.default_launcher = s,
                ("serverUrl", Value::String(s)) => settings.server_url = s,
                ("email", Value::String(s)) => settings.email = s,
                ("password", Value::String(s)) => settings.password = s,
                (key, value) => {
                    settings.extra.insert(key.to_string(), value);
                }
            }
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Base;

    fn setting(key: &str, value: &str) -> Setting {
        Setting {
            base: Base {
                id: format!("s-{key}"),
                ..Base::default()
            },
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn empty_collection_yields_defaults() {
        let settings = ClientSettings::from_records(&[]);
        assert_eq!(settings.os, "windows");
        assert!(settings.fit_covers);
        assert!(!settings.setup);
        assert_eq!(settings.games_directory, "");
        assert!(settings.extra.is_empty());
    }

    #[test]
    fn json_encoded_values_decode_into_fields() {
        let settings = ClientSettings::from_records(&[
            setting("setup", "true"),
            setting("os", "\"linux\""),
            setting("gamesDirectory", "\"/home/me/games\""),
            setting("fitCovers", "false"),
        ]);
        assert!(settings.setup);
        assert_eq!(settings.os, "linux");
        assert_eq!(settings.games_directory, "/home/me/games");
        assert!(!settings.fit_covers);
    }

    #[test]
    fn bare_string_values_are_accepted() {
        // Rows written before values were JSON-encoded hold raw strings.
        let settings = ClientSettings::from_records(&[setting("os", "linux")]);
        assert_eq!(settings.os, "linux");
    }

    #[test]
    fn last_writer_wins_on_duplicate_keys() {
        let settings = ClientSettings::from_records(&[
            setting("os", "\"linux\""),
            setting("os", "\"darwin\""),
        ]);
        assert_eq!(settings.os, "darwin");
    }

    #[test]
    fn unknown_keys_land_in_extra() {
        let settings = ClientSettings::from_records(&[setting("theme", "\"dark\"")]);
        assert_eq!(
            settings.extra.get("theme"),
            Some(&Value::String("dark".to_string()))
        );
    }

    #[test]
    fn type_mismatch_preserves_default_and_keeps_raw_value() {
        // "setup" must be a bool; a number is not coerced.
        let settings = ClientSettings::from_records(&[setting("setup", "42")]);
        assert!(!settings.setup);
        assert_eq!(settings.extra.get("setup"), Some(&serde_json::json!(42)));
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let json = serde_json::to_value(ClientSettings::default()).expect("serialize");
        assert!(json.get("gamesDirectory").is_some());
        assert!(json.get("fitCovers").is_some());
        assert!(json.get("games_directory").is_none());
    }

    #[test]
    fn credentials_fold_from_records() {
        let settings = ClientSettings::from_records(&[
            setting("serverUrl", "\"https://catalog.example.com\""),
            setting("email", "\"me@example.com\""),
            setting("password", "\"hunter2\""),
        ]);
        assert_eq!(settings.server_url, "https://catalog.example.com");
        assert_eq!(settings.email, "me@example.com");
        assert_eq!(settings.password, "hunter2");
    }
}
