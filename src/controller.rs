//! Advertising lifecycle state machine.
//!
//! The controller owns the advertising state and the cached pseudo-MAC, and
//! serializes start/stop requests against an [`AdvertisingService`]: taking
//! `&mut self` guarantees at most one outstanding request per controller.
//!
//! There is no timeout on service completions. If the service never reports
//! back, the controller stays in `Starting` or `Stopping`; dropping the
//! pending future leaves that state in place, and the next `start` performs
//! an implicit stop first.

use crate::advertiser::{
    AdvertiseSettings, AdvertisingService, ServiceFailure, StartCompletion, StartFailure,
};
use crate::beacon::{AdvertisingConfiguration, BeaconRequest, ValidationError};
use crate::identity::DeviceIdentity;
use crate::pseudo_id::PseudoId;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::watch;

/// Advertising lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingState {
    Idle,
    Starting,
    Advertising,
    Stopping,
}

impl fmt::Display for AdvertisingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdvertisingState::Idle => "idle",
            AdvertisingState::Starting => "starting",
            AdvertisingState::Advertising => "advertising",
            AdvertisingState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// Nothing was advertising; no service call was made.
    NotAdvertising,
}

/// Errors returned by [`AdvertisingController::start`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdvertiseError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Bluetooth permission denied: {0}")]
    PermissionDenied(String),
    #[error("advertising failed: {0}")]
    StartFailure(StartFailure),
}

impl From<ServiceFailure> for AdvertiseError {
    fn from(failure: ServiceFailure) -> Self {
        match failure {
            ServiceFailure::PermissionDenied(reason) => AdvertiseError::PermissionDenied(reason),
            ServiceFailure::Start(reason) => AdvertiseError::StartFailure(reason),
        }
    }
}

/// Drives one beacon advertisement through an [`AdvertisingService`].
pub struct AdvertisingController<S> {
    service: S,
    identity: DeviceIdentity,
    pseudo_id: OnceLock<PseudoId>,
    settings: AdvertiseSettings,
    state: watch::Sender<AdvertisingState>,
    active: Option<AdvertisingConfiguration>,
}

impl<S: AdvertisingService> AdvertisingController<S> {
    pub fn new(service: S, identity: DeviceIdentity) -> Self {
        let (state, _) = watch::channel(AdvertisingState::Idle);
        Self {
            service,
            identity,
            pseudo_id: OnceLock::new(),
            settings: AdvertiseSettings::BEACON,
            state,
            active: None,
        }
    }

    pub fn state(&self) -> AdvertisingState {
        *self.state.borrow()
    }

    /// Observe every state transition.
    pub fn subscribe(&self) -> watch::Receiver<AdvertisingState> {
        self.state.subscribe()
    }

    /// The configuration currently on air, if any.
    pub fn active(&self) -> Option<&AdvertisingConfiguration> {
        self.active.as_ref()
    }

    /// The pseudo-MAC, derived from the device identity on first use.
    pub fn pseudo_id(&self) -> PseudoId {
        *self
            .pseudo_id
            .get_or_init(|| PseudoId::derive(&self.identity.seed_parts()))
    }

    /// Validate the request and start advertising it.
    ///
    /// Validation failures leave the state untouched. If an advertisement is
    /// already on air (or starting), it is stopped before the new one starts.
    /// Any service failure returns the controller to `Idle`.
    pub async fn start(
        &mut self,
        uuid: &str,
        major: &str,
        minor: &str,
    ) -> Result<AdvertisingConfiguration, AdvertiseError> {
        let request = BeaconRequest::parse(uuid, major, minor)?;

        if matches!(
            self.state(),
            AdvertisingState::Starting | AdvertisingState::Advertising
        ) {
            tracing::info!("stopping current advertisement before restart");
            self.stop_service().await;
        }

        let config = AdvertisingConfiguration::new(request, self.pseudo_id());
        self.transition(AdvertisingState::Starting);

        let completion = self
            .service
            .start(self.settings, config.manufacturer_data())
            .await
            .unwrap_or_else(|_| {
                tracing::warn!("advertising service dropped the start request");
                StartCompletion::Failure(StartFailure::InternalError.into())
            });

        match completion {
            StartCompletion::Success => {
                self.active = Some(config);
                self.transition(AdvertisingState::Advertising);
                tracing::info!(%config, "advertising started");
                Ok(config)
            }
            StartCompletion::Failure(failure) => {
                self.active = None;
                self.transition(AdvertisingState::Idle);
                tracing::warn!(error = %failure, "advertising start failed");
                Err(failure.into())
            }
        }
    }

    /// Stop advertising. A no-op returning [`StopOutcome::NotAdvertising`] when idle.
    pub async fn stop(&mut self) -> StopOutcome {
        if self.state() == AdvertisingState::Idle {
            return StopOutcome::NotAdvertising;
        }
        self.stop_service().await;
        tracing::info!("advertising stopped");
        StopOutcome::Stopped
    }

    async fn stop_service(&mut self) {
        self.transition(AdvertisingState::Stopping);
        if self.service.stop().await.is_err() {
            tracing::debug!("advertising service dropped the stop request, assuming stopped");
        }
        self.active = None;
        self.transition(AdvertisingState::Idle);
    }

    fn transition(&self, to: AdvertisingState) {
        let from = self.state.send_replace(to);
        tracing::debug!(%from, %to, "advertising state transition");
    }
}
