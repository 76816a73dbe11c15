//! Connection configuration

use std::collections::HashMap;

/// Default SQL Server port
pub const DEFAULT_MSSQL_PORT: u16 = 1433;

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Host address
    pub host: String,
    /// Port number (0 for driver default)
    pub port: u16,
    /// Initial database
    pub database: Option<String>,
    /// Username (SQL authentication)
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Additional driver parameters
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a configuration for a SQL Server host
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            database: None,
            username: None,
            password: None,
            params: HashMap::new(),
        }
    }

    /// Set the initial database
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set SQL authentication credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let val = value.into();
        let str_val = match val {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.params.insert(key.to_string(), str_val);
        self
    }

    /// Get a string parameter
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "host" => Some(self.host.clone()),
            "database" => self.database.clone(),
            "username" | "user" => self.username.clone(),
            "password" => self.password.clone(),
            _ => None,
        }
    }

    /// Get a boolean parameter (`true`/`1`/`yes`, case-insensitive)
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.params
            .get(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
    }

    /// Port, falling back to the SQL Server default
    pub fn get_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_MSSQL_PORT
        } else {
            self.port
        }
    }
}
