// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ShipperError;
use std::env;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 12201;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for a [`crate::LogShipper`]. Fixed once the shipper is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipperConfig {
    /// Graylog input host name or address
    pub host: String,
    /// Graylog input TCP port
    pub port: u16,
    /// Flatten lists of name/value objects before encoding
    pub normalize: bool,
    /// Drop the oldest pending record once this many are queued. Unbounded when `None`.
    pub max_queue_len: Option<usize>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            normalize: false,
            max_queue_len: None,
            log_level: "info".to_string(),
        }
    }
}

impl ShipperConfig {
    /// Configuration for the given endpoint with normalization disabled.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    #[must_use]
    pub fn with_max_queue_len(mut self, max_queue_len: usize) -> Self {
        self.max_queue_len = Some(max_queue_len);
        self
    }

    /// `host:port` form of the endpoint, used in log lines and errors.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ShipperError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ShipperError> {
        let host = lookup("GRAYLOG_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = lookup("GRAYLOG_PORT")
            .and_then(|port| port.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let normalize = lookup("GRAYLOG_NORMALIZE")
            .map(|val| matches!(val.trim().to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);
        let max_queue_len = match lookup("GRAYLOG_MAX_QUEUE_LEN") {
            Some(val) => Some(val.trim().parse::<usize>().map_err(|e| {
                ShipperError::InvalidConfig(format!(
                    "GRAYLOG_MAX_QUEUE_LEN must be a positive integer, got '{val}': {e}"
                ))
            })?),
            None => None,
        };
        let log_level = lookup("GRAYLOG_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|| "info".to_string());

        let config = Self {
            host,
            port,
            normalize,
            max_queue_len,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ShipperError> {
        if self.host.trim().is_empty() {
            return Err(ShipperError::InvalidConfig(
                "GRAYLOG_HOST cannot be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(ShipperError::InvalidConfig(
                "Graylog port must be greater than 0".to_string(),
            ));
        }

        if self.max_queue_len == Some(0) {
            return Err(ShipperError::InvalidConfig(
                "Queue bound must be greater than 0".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ShipperError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}
