// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors surfaced by the shipper lifecycle and configuration
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shipper already started")]
    AlreadyStarted,

    #[error("No tokio runtime available to run the delivery worker")]
    NoRuntime,

    #[error("Delivery worker failed: {0}")]
    Worker(String),
}

/// Failure to deliver a single record. The worker logs these and moves on.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {bytes} bytes: {source}")]
    Write {
        bytes: usize,
        #[source]
        source: std::io::Error,
    },
}
