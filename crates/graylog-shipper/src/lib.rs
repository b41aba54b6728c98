// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fire-and-forget shipping of structured log records to a Graylog TCP input.
//!
//! Records are queued by the application and delivered by a background worker, one TCP
//! connection per record. Delivery is best effort: there is no acknowledgement, no retry
//! and no persistence. Failures are logged and the record is dropped.
//!
//! - [`normalizer`]: optional flattening of name/value lists
//! - [`sender`]: encode, connect, write, close
//! - [`queue`]: FIFO of pending records and the shutdown marker
//! - [`shipper`]: lifecycle of the background worker

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod error;
pub mod normalizer;
pub mod queue;
pub mod sender;
pub mod shipper;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

/// One structured log entry. Key order is preserved through normalization and encoding.
pub type Record = serde_json::Map<String, serde_json::Value>;

pub use config::ShipperConfig;
pub use error::{SendError, ShipperError};
pub use sender::{DeliveryOutcome, Sender, TcpTransport, Transport};
pub use shipper::{LogShipper, ShipperStatus};
