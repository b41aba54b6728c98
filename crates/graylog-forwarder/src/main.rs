// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use graylog_shipper::{LogShipper, Record, ShipperConfig};

/// How long a forceful stop may wait for the record in flight after Ctrl-C.
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// Reads newline-delimited JSON objects from stdin and ships each one to Graylog.
///
/// End of input stops gracefully, delivering everything read. Ctrl-C, before or during
/// that final drain, stops right away, abandons whatever is still queued and exits with
/// status 130.
#[tokio::main]
pub async fn main() {
    let config = match ShipperConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error reading graylog-forwarder configuration: {e}");
            return;
        }
    };

    let env_filter = config.log_level.clone();

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let shipper = LogShipper::new(config);
    if let Err(e) = shipper.start() {
        error!("Error starting graylog shipper: {e}");
        return;
    }

    let outcome = forward_until_interrupted(
        &shipper,
        forward_stdin(&shipper),
        tokio::signal::ctrl_c,
        INTERRUPT_GRACE,
    )
    .await;

    if outcome == Outcome::Interrupted {
        // The stdin reader thread may still be blocked and would hold the runtime open.
        std::process::exit(130);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Input ended and everything read was handed to Graylog.
    Drained,
    /// Interrupted; queued records were abandoned.
    Interrupted,
}

/// Feeds `input` into the shipper, then drains it. `interrupt` is raced against both
/// phases; once it fires the shipper is stopped forcefully, waiting at most `grace`.
async fn forward_until_interrupted<I, F, S>(
    shipper: &LogShipper,
    input: I,
    mut interrupt: F,
    grace: Duration,
) -> Outcome
where
    I: Future<Output = ()>,
    F: FnMut() -> S,
    S: Future,
{
    let interrupted = tokio::select! {
        () = input => {
            debug!("End of input reached");
            tokio::select! {
                result = shipper.stop(true) => {
                    if let Err(e) = result {
                        error!("Error stopping graylog shipper: {e}");
                    }
                    false
                }
                _ = interrupt() => true,
            }
        }
        _ = interrupt() => true,
    };

    if !interrupted {
        return Outcome::Drained;
    }

    info!("Interrupted, dropping {} queued records", shipper.pending());
    match tokio::time::timeout(grace, shipper.stop(false)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Error stopping graylog shipper: {e}"),
        Err(_) => warn!("Delivery worker still busy after {grace:?}, exiting anyway"),
    }
    Outcome::Interrupted
}

async fn forward_stdin(shipper: &LogShipper) {
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut line_number = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Error reading from stdin: {e}");
                break;
            }
        };
        line_number += 1;

        match parse_record(&line) {
            Ok(Some(record)) => shipper.enqueue([record]),
            Ok(None) => {}
            Err(reason) => warn!("Skipping line {line_number}: {reason}"),
        }
    }
}

/// Parses one input line. Blank lines yield `Ok(None)`.
fn parse_record(line: &str) -> Result<Option<Record>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(record)) => Ok(Some(record)),
        Ok(other) => Err(format!("expected a JSON object, got {}", kind(&other))),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
