//! Environment configuration
//!
//! An [`Environment`] is built once per invocation from an environment file
//! (`environments/<name>.toml`) and the process variables carrying the
//! `MIGRATIONS_` prefix, then threaded through every operation. Reserved
//! setting keys become typed fields; every other key is a script variable.

use chrono::{FixedOffset, Local, Utc};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{MigrationError, MigrationResult};
use crate::variables::Variables;

/// Prefix of process variables that override environment file settings
pub const ENV_PREFIX: &str = "MIGRATIONS_";

/// Default name of the changelog table
pub const DEFAULT_CHANGELOG_TABLE: &str = "CHANGELOG";

/// Format of the `APPLIED_AT` changelog column
pub const APPLIED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Keys with a fixed meaning that are never exposed to scripts as variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SettingKey {
    TimeZone,
    Delimiter,
    ScriptCharSet,
    FullLineDelimiter,
    SendFullScript,
    AutoCommit,
    RemoveCrs,
    IgnoreWarnings,
    StopOnError,
    Driver,
    Url,
    Username,
    Password,
    Changelog,
    HookBeforeUp,
    HookBeforeEachUp,
    HookAfterEachUp,
    HookAfterUp,
    HookBeforeDown,
    HookBeforeEachDown,
    HookAfterEachDown,
    HookAfterDown,
}

impl SettingKey {
    pub const ALL: [SettingKey; 22] = [
        SettingKey::TimeZone,
        SettingKey::Delimiter,
        SettingKey::ScriptCharSet,
        SettingKey::FullLineDelimiter,
        SettingKey::SendFullScript,
        SettingKey::AutoCommit,
        SettingKey::RemoveCrs,
        SettingKey::IgnoreWarnings,
        SettingKey::StopOnError,
        SettingKey::Driver,
        SettingKey::Url,
        SettingKey::Username,
        SettingKey::Password,
        SettingKey::Changelog,
        SettingKey::HookBeforeUp,
        SettingKey::HookBeforeEachUp,
        SettingKey::HookAfterEachUp,
        SettingKey::HookAfterUp,
        SettingKey::HookBeforeDown,
        SettingKey::HookBeforeEachDown,
        SettingKey::HookAfterEachDown,
        SettingKey::HookAfterDown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::TimeZone => "time_zone",
            SettingKey::Delimiter => "delimiter",
            SettingKey::ScriptCharSet => "script_char_set",
            SettingKey::FullLineDelimiter => "full_line_delimiter",
            SettingKey::SendFullScript => "send_full_script",
            SettingKey::AutoCommit => "auto_commit",
            SettingKey::RemoveCrs => "remove_crs",
            SettingKey::IgnoreWarnings => "ignore_warnings",
            SettingKey::StopOnError => "stop_on_error",
            SettingKey::Driver => "driver",
            SettingKey::Url => "url",
            SettingKey::Username => "username",
            SettingKey::Password => "password",
            SettingKey::Changelog => "changelog",
            SettingKey::HookBeforeUp => "hook_before_up",
            SettingKey::HookBeforeEachUp => "hook_before_each_up",
            SettingKey::HookAfterEachUp => "hook_after_each_up",
            SettingKey::HookAfterUp => "hook_after_up",
            SettingKey::HookBeforeDown => "hook_before_down",
            SettingKey::HookBeforeEachDown => "hook_before_each_down",
            SettingKey::HookAfterEachDown => "hook_after_each_down",
            SettingKey::HookAfterDown => "hook_after_down",
        }
    }

    pub fn parse(key: &str) -> Option<SettingKey> {
        Self::ALL.iter().copied().find(|setting| setting.as_str() == key)
    }

    /// Check whether a variable name is a reserved setting
    pub fn is_reserved(key: &str) -> bool {
        Self::parse(key).is_some()
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings consumed by the script runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOperationOptions {
    pub delimiter: String,
    pub auto_commit: bool,
    pub stop_on_error: bool,
    pub full_line_delimiter: bool,
    pub send_full_script: bool,
    pub remove_crs: bool,
}

impl Default for DatabaseOperationOptions {
    fn default() -> Self {
        Self {
            delimiter: ";".to_string(),
            auto_commit: false,
            stop_on_error: true,
            full_line_delimiter: false,
            send_full_script: false,
            remove_crs: false,
        }
    }
}

/// Time zone used to render changelog timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeZoneSetting {
    #[default]
    Utc,
    Local,
    Fixed(FixedOffset),
}

impl TimeZoneSetting {
    /// Current time formatted for the `APPLIED_AT` column
    pub fn now(&self) -> String {
        match self {
            TimeZoneSetting::Utc => Utc::now().format(APPLIED_AT_FORMAT).to_string(),
            TimeZoneSetting::Local => Local::now().format(APPLIED_AT_FORMAT).to_string(),
            TimeZoneSetting::Fixed(offset) => Utc::now()
                .with_timezone(offset)
                .format(APPLIED_AT_FORMAT)
                .to_string(),
        }
    }
}

impl FromStr for TimeZoneSetting {
    type Err = MigrationError;

    fn from_str(s: &str) -> MigrationResult<Self> {
        let value = s.trim();
        match value.to_lowercase().as_str() {
            "utc" | "gmt" | "gmt+0:00" | "z" => return Ok(TimeZoneSetting::Utc),
            "local" => return Ok(TimeZoneSetting::Local),
            _ => {}
        }

        let offset = strip_prefix_ignore_case(value, "GMT")
            .or_else(|| strip_prefix_ignore_case(value, "UTC"))
            .unwrap_or(value);
        parse_offset(offset).map(TimeZoneSetting::Fixed).ok_or_else(|| {
            MigrationError::configuration(format!(
                "Invalid time_zone '{}': expected UTC, local, or an offset such as +09:00",
                s
            ))
        })
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &value[prefix.len()..])
}

fn parse_offset(value: &str) -> Option<FixedOffset> {
    let (sign, rest) = match value.chars().next()? {
        '+' => (1, &value[1..]),
        '-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Connection, runner and hook settings for one named environment
///
/// `driver` and `ignore_warnings` are reserved but carry no typed field:
/// the driver follows the URL scheme and the executor reports no warnings.
#[derive(Debug, Clone)]
pub struct Environment {
    pub name: String,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub time_zone: TimeZoneSetting,
    pub changelog_table: String,
    pub options: DatabaseOperationOptions,
    hooks: BTreeMap<SettingKey, String>,
    variables: Variables,
}

impl Environment {
    /// Environment with default settings and no connection details
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            username: None,
            password: None,
            time_zone: TimeZoneSetting::default(),
            changelog_table: DEFAULT_CHANGELOG_TABLE.to_string(),
            options: DatabaseOperationOptions::default(),
            hooks: BTreeMap::new(),
            variables: Variables::new(),
        }
    }

    /// Load `<base_dir>/environments/<name>.toml` merged with the process variables.
    pub fn load(base_dir: &Path, name: &str) -> MigrationResult<Self> {
        let path = base_dir.join("environments").join(format!("{}.toml", name));
        let file_values = Self::read_file(&path)?;
        Self::from_sources(name, file_values, unicode_vars(std::env::vars_os()))
    }

    /// Read a flat TOML table of scalar values
    pub fn read_file(path: &Path) -> MigrationResult<BTreeMap<String, String>> {
        let content = fs::read_to_string(path).map_err(|e| MigrationError::io(path, e))?;
        Self::parse_values(&content)
    }

    pub fn parse_values(content: &str) -> MigrationResult<BTreeMap<String, String>> {
        let table: toml::Table = content.parse()?;
        let mut values = BTreeMap::new();
        for (key, value) in table {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => {
                    return Err(MigrationError::configuration(format!(
                        "Setting '{}' must be a scalar value, found {}",
                        key,
                        other.type_str()
                    )))
                }
            };
            values.insert(key, text);
        }
        Ok(values)
    }

    /// Build an environment from file values and process variables.
    ///
    /// Process variables named `MIGRATIONS_<KEY>` override `<key>` from the file.
    pub fn from_sources<I>(
        name: &str,
        file_values: BTreeMap<String, String>,
        process_vars: I,
    ) -> MigrationResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut values = file_values;
        for (key, value) in process_vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                if !stripped.is_empty() {
                    values.insert(stripped.to_lowercase(), value);
                }
            }
        }

        let mut environment = Self::new(name);
        for (key, value) in values {
            match SettingKey::parse(&key) {
                Some(setting) => environment.apply_setting(setting, value)?,
                None => {
                    environment.variables.insert(key, value);
                }
            }
        }
        validate_table_name(&environment.changelog_table)?;
        Ok(environment)
    }

    fn apply_setting(&mut self, setting: SettingKey, value: String) -> MigrationResult<()> {
        match setting {
            SettingKey::TimeZone => self.time_zone = value.parse()?,
            SettingKey::Delimiter => {
                if value.is_empty() {
                    return Err(MigrationError::configuration("delimiter cannot be empty"));
                }
                self.options.delimiter = value;
            }
            SettingKey::ScriptCharSet => {
                let normalized = value.to_lowercase().replace('-', "");
                if normalized != "utf8" {
                    return Err(MigrationError::configuration(format!(
                        "Unsupported script_char_set '{}': scripts must be UTF-8",
                        value
                    )));
                }
            }
            SettingKey::FullLineDelimiter => {
                self.options.full_line_delimiter = parse_bool(setting, &value)?
            }
            SettingKey::SendFullScript => {
                self.options.send_full_script = parse_bool(setting, &value)?
            }
            SettingKey::AutoCommit => self.options.auto_commit = parse_bool(setting, &value)?,
            SettingKey::RemoveCrs => self.options.remove_crs = parse_bool(setting, &value)?,
            SettingKey::StopOnError => self.options.stop_on_error = parse_bool(setting, &value)?,
            SettingKey::IgnoreWarnings => {
                parse_bool(setting, &value)?;
            }
            SettingKey::Driver => {}
            SettingKey::Url => self.url = Some(value),
            SettingKey::Username => self.username = Some(value),
            SettingKey::Password => self.password = Some(value),
            SettingKey::Changelog => self.changelog_table = value,
            hook => {
                self.hooks.insert(hook, value);
            }
        }
        Ok(())
    }

    /// Runner settings for this environment
    pub fn operation_options(&self) -> DatabaseOperationOptions {
        self.options.clone()
    }

    /// Substitutable user variables, reserved keys excluded
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if !SettingKey::is_reserved(&key) {
            self.variables.insert(key, value);
        }
        self
    }

    /// Raw hook specification configured under `key`
    pub fn hook_setting(&self, key: SettingKey) -> Option<&str> {
        self.hooks.get(&key).map(String::as_str)
    }

    /// Database URL with `username`/`password` folded in when given separately
    pub fn connection_url(&self) -> MigrationResult<String> {
        let raw = self
            .url
            .as_deref()
            .ok_or_else(|| MigrationError::configuration(format!(
                "Environment '{}' does not define a url",
                self.name
            )))?;

        if self.username.is_none() && self.password.is_none() {
            return Ok(raw.to_string());
        }

        let mut parsed = url::Url::parse(raw)
            .map_err(|e| MigrationError::configuration(format!("Invalid database url: {}", e)))?;
        if let Some(username) = &self.username {
            parsed.set_username(username).map_err(|_| {
                MigrationError::configuration("Database url does not accept a username")
            })?;
        }
        if let Some(password) = &self.password {
            parsed.set_password(Some(password.as_str())).map_err(|_| {
                MigrationError::configuration("Database url does not accept a password")
            })?;
        }
        Ok(parsed.to_string())
    }
}

/// Process variables whose name and value are valid Unicode; others are skipped.
fn unicode_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}

fn parse_bool(setting: SettingKey, value: &str) -> MigrationResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(MigrationError::configuration(format!(
            "Setting '{}' expects true or false, found '{}'",
            setting, value
        ))),
    }
}

/// Changelog table names are interpolated into SQL, so only plain identifiers are accepted.
pub fn validate_table_name(table: &str) -> MigrationResult<()> {
    let mut parts = table.split('.');
    let valid = parts.clone().count() <= 2
        && parts.all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        });
    if valid {
        Ok(())
    } else {
        Err(MigrationError::configuration(format!(
            "Invalid changelog table name '{}'",
            table
        )))
    }
}
