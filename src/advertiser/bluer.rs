//! BlueZ D-Bus advertising backend.
//!
//! This backend registers an `LEAdvertisement` with the BlueZ daemon via the
//! `bluer` crate. It requires the `bluetoothd` daemon to be running. The
//! advertisement stays registered for as long as its handle is held.

use super::{
    AdvertiseSettings, AdvertisingService, ServiceFailure, StartCompletion, StartFailure,
};
use crate::payload::ManufacturerData;
use bluer::adv::{Advertisement, AdvertisementHandle, Feature, Type};
use bluer::{ErrorKind, Session};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};

/// A live BlueZ registration. Dropping it unregisters the advertisement.
struct Registration {
    _session: Session,
    _handle: AdvertisementHandle,
}

/// Advertiser backed by the BlueZ daemon's default adapter.
#[derive(Default)]
pub struct BluerAdvertiser {
    active: Arc<Mutex<Option<Registration>>>,
}

impl BluerAdvertiser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AdvertisingService for BluerAdvertiser {
    fn start(
        &self,
        settings: AdvertiseSettings,
        data: ManufacturerData,
    ) -> oneshot::Receiver<StartCompletion> {
        let (tx, rx) = oneshot::channel();
        let active = Arc::clone(&self.active);

        tokio::spawn(async move {
            let mut active = active.lock().await;
            let completion = if active.is_some() {
                StartCompletion::Failure(StartFailure::AlreadyStarted.into())
            } else {
                match register(settings, &data).await {
                    Ok(registration) => {
                        *active = Some(registration);
                        StartCompletion::Success
                    }
                    Err(failure) => StartCompletion::Failure(failure),
                }
            };
            let _ = tx.send(completion);
        });

        rx
    }

    fn stop(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let active = Arc::clone(&self.active);

        tokio::spawn(async move {
            if active.lock().await.take().is_some() {
                tracing::debug!("unregistered BlueZ advertisement");
            }
            let _ = tx.send(());
        });

        rx
    }
}

async fn register(
    settings: AdvertiseSettings,
    data: &ManufacturerData,
) -> Result<Registration, ServiceFailure> {
    if data.to_ad_structure().is_none() {
        return Err(StartFailure::DataTooLarge.into());
    }

    let session = Session::new().await.map_err(map_error)?;
    let adapter = session.default_adapter().await.map_err(map_error)?;
    if !adapter.is_powered().await.map_err(map_error)? {
        adapter.set_powered(true).await.map_err(map_error)?;
    }
    tracing::debug!(adapter = adapter.name(), "registering BlueZ advertisement");

    let handle = adapter
        .advertise(advertisement(&settings, data))
        .await
        .map_err(map_error)?;

    Ok(Registration {
        _session: session,
        _handle: handle,
    })
}

/// Build the BlueZ advertisement for `settings` and `data`.
fn advertisement(settings: &AdvertiseSettings, data: &ManufacturerData) -> Advertisement {
    let interval = Duration::from_millis(settings.mode.interval_ms());

    let mut system_includes = BTreeSet::new();
    if settings.include_device_name {
        system_includes.insert(Feature::LocalName);
    }
    if settings.include_tx_power_level {
        system_includes.insert(Feature::TxPower);
    }

    Advertisement {
        advertisement_type: if settings.connectable {
            Type::Peripheral
        } else {
            Type::Broadcast
        },
        manufacturer_data: BTreeMap::from([(data.company_id, data.data.clone())]),
        system_includes,
        min_interval: Some(interval),
        max_interval: Some(interval),
        tx_power: Some(settings.tx_power.dbm()),
        ..Default::default()
    }
}

fn map_error(err: bluer::Error) -> ServiceFailure {
    match err.kind {
        ErrorKind::NotAuthorized | ErrorKind::NotPermitted => {
            ServiceFailure::PermissionDenied(err.to_string())
        }
        ErrorKind::InvalidLength => StartFailure::DataTooLarge.into(),
        ErrorKind::AlreadyExists | ErrorKind::InProgress => StartFailure::AlreadyStarted.into(),
        ErrorKind::NotSupported => StartFailure::FeatureUnsupported.into(),
        _ => {
            tracing::warn!(error = %err, "unmapped BlueZ advertising error");
            StartFailure::InternalError.into()
        }
    }
}
