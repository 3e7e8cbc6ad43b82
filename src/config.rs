//! Session configuration
//!
//! Settings live in a property map (`"connection.proxy"`, `"terminal.model"`, ...)
//! that round-trips through JSON. Listeners are told about every change. Before
//! a connection is made the map is validated into a typed [`NetSettings`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::proxy::{parse_proxy_spec, ProxySpec};
use crate::telnet::{Environment, TelnetSettings};
use crate::tls::TlsSettings;
use crate::tn3270e::{BidPolicy, Tn3270eOptions};

/// Configuration change event
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    pub property_name: String,
    pub old_value: Option<ConfigValue>,
    /// `None` when the property was removed
    pub new_value: Option<ConfigValue>,
}

/// Configuration change listener trait
pub trait ConfigChangeListener: Send + Sync {
    fn on_config_changed(&mut self, event: &ConfigChangeEvent);
}

/// Supported configuration value types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    StringArray(Vec<String>),
}

impl ConfigValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            ConfigValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&Vec<String>> {
        match self {
            ConfigValue::StringArray(arr) => Some(arr),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            ConfigValue::String(s) => s.clone(),
            ConfigValue::Integer(i) => i.to_string(),
            ConfigValue::Float(f) => f.to_string(),
            ConfigValue::Boolean(b) => b.to_string(),
            ConfigValue::StringArray(arr) => arr.join(","),
        }
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Boolean(value)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(value: Vec<String>) -> Self {
        ConfigValue::StringArray(value)
    }
}

/// 3278/3279 display models and their maximum screen sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalModel {
    Model2,
    Model3,
    Model4,
    Model5,
}

impl TerminalModel {
    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            2 => Some(TerminalModel::Model2),
            3 => Some(TerminalModel::Model3),
            4 => Some(TerminalModel::Model4),
            5 => Some(TerminalModel::Model5),
            _ => None,
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            TerminalModel::Model2 => 2,
            TerminalModel::Model3 => 3,
            TerminalModel::Model4 => 4,
            TerminalModel::Model5 => 5,
        }
    }

    /// Maximum (rows, columns)
    pub fn dimensions(&self) -> (u16, u16) {
        match self {
            TerminalModel::Model2 => (24, 80),
            TerminalModel::Model3 => (32, 80),
            TerminalModel::Model4 => (43, 80),
            TerminalModel::Model5 => (27, 132),
        }
    }

    /// `IBM-327{8|9}-<model>[-E]`
    pub fn terminal_type(&self, color: bool, extended: bool) -> String {
        format!(
            "IBM-{}-{}{}",
            if color { "3279" } else { "3278" },
            self.number(),
            if extended { "-E" } else { "" }
        )
    }
}

/// Validated settings for one connection
#[derive(Debug, Clone)]
pub struct NetSettings {
    pub telnet: TelnetSettings,
    pub tls: TlsSettings,
    pub proxy: Option<ProxySpec>,
    /// Bound on each address attempt
    pub connect_timeout: Duration,
}

impl Default for NetSettings {
    fn default() -> Self {
        Self {
            telnet: TelnetSettings::default(),
            tls: TlsSettings::default(),
            proxy: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT as u64),
        }
    }
}

impl NetSettings {
    /// The name and port to resolve: the proxy's when one is configured.
    pub fn dial_target(&self, host: &str, port: u16) -> (String, u16) {
        match &self.proxy {
            Some(proxy) => (proxy.host.clone(), proxy.port),
            None => (host.to_string(), port),
        }
    }
}

pub const DEFAULT_CONNECT_TIMEOUT: i64 = 30;

fn invalid(parameter: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Property-map configuration for one session
pub struct SessionConfig {
    properties: HashMap<String, ConfigValue>,
    listeners: Vec<Box<dyn ConfigChangeListener>>,
    session_name: String,
    config_resource: String,
}

impl SessionConfig {
    /// Create a new configuration instance
    pub fn new(config_resource: String, session_name: String) -> Self {
        let mut config = Self {
            properties: HashMap::new(),
            listeners: Vec::new(),
            session_name,
            config_resource,
        };

        config.set_defaults();
        config
    }

    fn set_defaults(&mut self) {
        let defaults: [(&str, ConfigValue); 21] = [
            ("connection.host", "".into()),
            ("connection.port", 23i64.into()),
            ("connection.tls", false.into()),
            ("connection.luNames", Vec::<String>::new().into()),
            ("connection.connectTimeout", DEFAULT_CONNECT_TIMEOUT.into()),
            ("connection.tn3270e", true.into()),
            ("connection.contentionResolution", false.into()),
            ("connection.bidPolicy", "grant".into()),
            ("connection.proxy", "".into()),
            ("connection.tls.caBundlePath", "".into()),
            ("connection.tls.verifyHostName", "".into()),
            ("connection.tls.clientCert", "".into()),
            ("connection.tls.clientKey", "".into()),
            ("connection.tls.clientKeyPassword", "".into()),
            ("connection.tls.allowStartTls", true.into()),
            ("terminal.model", 2i64.into()),
            ("terminal.color", true.into()),
            ("terminal.extended", true.into()),
            ("terminal.type", "".into()),
            ("environ.user", "".into()),
            ("environ.devname", "".into()),
        ];
        for (key, value) in defaults {
            self.properties.insert(key.to_string(), value);
        }
    }

    /// Get configuration property as string
    pub fn get_string_property(&self, key: &str) -> Option<String> {
        self.properties.get(key).and_then(|v| v.as_string().map(|s| s.to_string()))
    }

    /// Get configuration property as string with default
    pub fn get_string_property_or(&self, key: &str, default: &str) -> String {
        self.get_string_property(key).unwrap_or_else(|| default.to_string())
    }

    /// Get configuration property as integer
    pub fn get_int_property(&self, key: &str) -> Option<i64> {
        self.properties.get(key).and_then(|v| v.as_integer())
    }

    /// Get configuration property as integer with default
    pub fn get_int_property_or(&self, key: &str, default: i64) -> i64 {
        self.get_int_property(key).unwrap_or(default)
    }

    pub fn get_float_property(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(|v| v.as_float())
    }

    /// Get configuration property as boolean
    pub fn get_boolean_property(&self, key: &str) -> Option<bool> {
        self.properties.get(key).and_then(|v| v.as_boolean())
    }

    /// Get configuration property as boolean with default
    pub fn get_boolean_property_or(&self, key: &str, default: bool) -> bool {
        self.get_boolean_property(key).unwrap_or(default)
    }

    /// Get configuration property as string array
    pub fn get_string_array_property(&self, key: &str) -> Option<&Vec<String>> {
        self.properties.get(key).and_then(|v| v.as_string_array())
    }

    /// Set configuration property and fire change event
    pub fn set_property<T: Into<ConfigValue>>(&mut self, key: &str, value: T) {
        let new_value = value.into();
        let old_value = self.properties.insert(key.to_string(), new_value.clone());
        if old_value.as_ref() == Some(&new_value) {
            return;
        }
        self.fire_change_event(&ConfigChangeEvent {
            property_name: key.to_string(),
            old_value,
            new_value: Some(new_value),
        });
    }

    /// Add a configuration change listener
    pub fn add_listener(&mut self, listener: Box<dyn ConfigChangeListener>) {
        self.listeners.push(listener);
    }

    fn fire_change_event(&mut self, event: &ConfigChangeEvent) {
        log::debug!("Configuration '{}' changed", event.property_name);
        for listener in &mut self.listeners {
            listener.on_config_changed(event);
        }
    }

    pub fn get_session_name(&self) -> &str {
        &self.session_name
    }

    /// Path the configuration is saved to
    pub fn get_config_resource(&self) -> &str {
        &self.config_resource
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.properties)
    }

    /// Merge properties from JSON, firing a change event for each one
    pub fn from_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let loaded: HashMap<String, ConfigValue> = serde_json::from_str(json)?;
        for (key, value) in loaded {
            self.set_property(&key, value);
        }
        Ok(())
    }

    /// Load a configuration file. A missing file leaves the defaults in place.
    pub fn load_from_file(path: &Path, session_name: String) -> ConfigResult<Self> {
        let mut config = Self::new(path.to_string_lossy().to_string(), session_name);
        if !path.exists() {
            log::info!("No configuration at {}, using defaults", path.display());
            return Ok(config);
        }
        let file_error = |error: String| ConfigError::FileError {
            path: path.display().to_string(),
            error,
        };
        let text = fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        config
            .from_json(&text)
            .map_err(|e| file_error(e.to_string()))?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration to its resource path, creating parent directories
    pub fn save_to_file(&self) -> ConfigResult<()> {
        let path = PathBuf::from(&self.config_resource);
        let file_error = |error: String| ConfigError::FileError {
            path: path.display().to_string(),
            error,
        };
        let json = self.to_json().map_err(|e| file_error(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| file_error(e.to_string()))?;
        }
        fs::write(&path, json).map_err(|e| file_error(e.to_string()))
    }

    pub fn get_all_keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Remove property and fire change event
    pub fn remove_property(&mut self, key: &str) -> Option<ConfigValue> {
        let old_value = self.properties.remove(key)?;
        self.fire_change_event(&ConfigChangeEvent {
            property_name: key.to_string(),
            old_value: Some(old_value.clone()),
            new_value: None,
        });
        Some(old_value)
    }

    fn string_setting(&self, key: &str) -> Option<String> {
        self.get_string_property(key).filter(|s| !s.trim().is_empty())
    }

    /// Display model from `terminal.model`
    pub fn terminal_model(&self) -> ConfigResult<TerminalModel> {
        let n = self.get_int_property_or("terminal.model", 2);
        TerminalModel::from_number(n).ok_or_else(|| invalid("terminal.model", n, "must be 2, 3, 4 or 5"))
    }

    /// Terminal type: `terminal.type` if set, else built from the model
    pub fn terminal_type(&self) -> ConfigResult<String> {
        if let Some(explicit) = self.string_setting("terminal.type") {
            return Ok(explicit);
        }
        let model = self.terminal_model()?;
        Ok(model.terminal_type(
            self.get_boolean_property_or("terminal.color", true),
            self.get_boolean_property_or("terminal.extended", true),
        ))
    }

    /// `connection.host` and `connection.port`
    pub fn host_and_port(&self) -> ConfigResult<(String, u16)> {
        let host = self
            .string_setting("connection.host")
            .ok_or_else(|| ConfigError::MissingRequired {
                parameter: "connection.host".to_string(),
            })?;
        let port = self.get_int_property_or("connection.port", 23);
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| invalid("connection.port", port, "must be 1-65535"))?;
        Ok((host, port))
    }

    /// Validate the connection settings
    pub fn net_settings(&self) -> ConfigResult<NetSettings> {
        let model = self.terminal_model()?;
        let (max_rows, max_cols) = model.dimensions();

        let lu_names = self
            .get_string_array_property("connection.luNames")
            .cloned()
            .unwrap_or_default();
        let bid_policy: BidPolicy = self
            .get_string_property_or("connection.bidPolicy", "grant")
            .parse()?;

        let timeout = self.get_int_property_or("connection.connectTimeout", DEFAULT_CONNECT_TIMEOUT);
        if timeout <= 0 {
            return Err(invalid("connection.connectTimeout", timeout, "must be positive"));
        }

        let proxy = match self.string_setting("connection.proxy") {
            Some(spec) => Some(
                parse_proxy_spec(&spec).map_err(|e| invalid("connection.proxy", &spec, &e.to_string()))?,
            ),
            None => None,
        };

        let user = self
            .string_setting("environ.user")
            .or_else(|| std::env::var("USER").ok());
        let environment = Environment::new(user, self.string_setting("environ.devname"));

        let telnet = TelnetSettings {
            tn3270e: Tn3270eOptions {
                terminal_type: self.terminal_type()?,
                lu_names,
                contention_resolution: self
                    .get_boolean_property_or("connection.contentionResolution", false),
                bid_policy,
                max_rows,
                max_cols,
            },
            allow_tn3270e: self.get_boolean_property_or("connection.tn3270e", true),
            allow_starttls: self.get_boolean_property_or("connection.tls.allowStartTls", true),
            environment,
        };

        let client_cert_path = self.string_setting("connection.tls.clientCert").map(PathBuf::from);
        let client_key_path = self.string_setting("connection.tls.clientKey").map(PathBuf::from);
        match (&client_cert_path, &client_key_path) {
            (Some(cert), None) => {
                return Err(invalid(
                    "connection.tls.clientCert",
                    cert.display(),
                    "needs connection.tls.clientKey",
                ))
            }
            (None, Some(key)) => {
                return Err(invalid(
                    "connection.tls.clientKey",
                    key.display(),
                    "needs connection.tls.clientCert",
                ))
            }
            _ => {}
        }
        let tls = TlsSettings {
            ca_bundle_path: self.string_setting("connection.tls.caBundlePath").map(PathBuf::from),
            verify_host_name: self.string_setting("connection.tls.verifyHostName"),
            client_cert_path,
            client_key_path,
            client_key_password: self.string_setting("connection.tls.clientKeyPassword"),
        };

        Ok(NetSettings {
            telnet,
            tls,
            proxy,
            connect_timeout: Duration::from_secs(timeout as u64),
        })
    }

    /// One line per property, sorted, for diagnostics
    pub fn summary(&self) -> Vec<String> {
        let mut keys = self.get_all_keys();
        keys.sort();
        keys.into_iter()
            .filter_map(|k| self.properties.get(&k).map(|v| format!("{k} = {}", v.describe())))
            .collect()
    }
}

/// Thread-safe configuration wrapper
pub type SharedSessionConfig = Arc<Mutex<SessionConfig>>;

pub fn create_shared_config(config_resource: String, session_name: String) -> SharedSessionConfig {
    Arc::new(Mutex::new(SessionConfig::new(config_resource, session_name)))
}

/// Default configuration file.
/// Priority:
/// 1) TN3270R_CONFIG env var
/// 2) the platform config directory: tn3270r/session.json
/// 3) ./session.json
pub fn default_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("TN3270R_CONFIG") {
        return PathBuf::from(p);
    }
    match dirs::config_dir() {
        Some(base) => base.join("tn3270r").join("session.json"),
        None => PathBuf::from("session.json"),
    }
}
