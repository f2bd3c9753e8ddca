//! Core application runner for `beacon-advertiser`.
//!
//! This module is intentionally decoupled from CLI parsing, signal handling
//! and process exit codes so it can be tested deterministically with an
//! injected advertising service and injected output stream.

use crate::advertiser::{AdvertisingService, Backend};
use crate::controller::{AdvertiseError, AdvertisingController, StopOutcome};
use crate::identity::DeviceIdentity;
use clap::Parser;
use std::future::Future;
use std::io;
use std::io::Write;
use std::time::Duration;
use thiserror::Error;

/// Beacon UUID advertised when none is given.
pub const DEFAULT_UUID: &str = "2D7A9F0C-E0E8-4CC9-A71B-A21DB2D034A1";

/// Configuration for a single advertising session.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Beacon UUID in 8-4-4-4-12 hexadecimal form.
    #[arg(long, default_value = DEFAULT_UUID)]
    pub uuid: String,

    /// Major value, 0-65535.
    #[arg(long)]
    pub major: String,

    /// Minor value, 0-65535.
    #[arg(long)]
    pub minor: String,

    /// Stop advertising after this long instead of waiting for Ctrl-C.
    /// Accepts duration with suffix: 30s, 5m, 500ms, 1h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, value_parser = crate::duration::parse_duration)]
    pub duration: Option<Duration>,

    /// Override the install identifier used to derive the pseudo-MAC.
    #[arg(long)]
    pub install_id: Option<String>,

    /// Override the device model used to derive the pseudo-MAC.
    #[arg(long)]
    pub model: Option<String>,

    /// Override the device brand used to derive the pseudo-MAC.
    #[arg(long)]
    pub brand: Option<String>,

    /// Verbose output, log state transitions
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Bluetooth advertising backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,
}

impl Options {
    /// Device identity from the system, with any CLI overrides applied.
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::probe().with_overrides(
            self.install_id.clone(),
            self.model.clone(),
            self.brand.clone(),
        )
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Advertise(#[from] AdvertiseError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Advertise the beacon described by `options` until `shutdown` resolves
/// (or `options.duration` elapses), writing status lines to `out`.
///
/// Start failures are returned without writing to `out`; the caller reports them.
pub async fn run_with_io<S, F>(
    options: Options,
    service: S,
    identity: DeviceIdentity,
    shutdown: F,
    out: &mut dyn Write,
) -> Result<(), RunError>
where
    S: AdvertisingService,
    F: Future<Output = ()>,
{
    let mut controller = AdvertisingController::new(service, identity);
    writeln!(out, "Pseudo-MAC: {}", controller.pseudo_id())?;

    let config = controller
        .start(&options.uuid, &options.major, &options.minor)
        .await?;
    writeln!(out, "Advertising started: {config}")?;

    match options.duration {
        Some(duration) => {
            tokio::select! {
                _ = shutdown => {}
                _ = tokio::time::sleep(duration) => {
                    tracing::debug!(?duration, "advertising duration elapsed");
                }
            }
        }
        None => shutdown.await,
    }

    match controller.stop().await {
        StopOutcome::Stopped => writeln!(out, "Advertising stopped")?,
        StopOutcome::NotAdvertising => writeln!(out, "Not advertising")?,
    }

    Ok(())
}
