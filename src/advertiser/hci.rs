//! Raw HCI socket advertising backend.
//!
//! This backend drives the controller directly with legacy LE advertising
//! commands, without requiring the BlueZ daemon. It requires CAP_NET_RAW and
//! CAP_NET_ADMIN capabilities or root privileges. Legacy advertising has no
//! per-set transmit power command, so the controller default power is used.

use super::{
    AdvertiseSettings, AdvertisingService, ServiceFailure, StartCompletion, StartFailure,
};
use crate::payload::{MAX_ADV_DATA_LEN, ManufacturerData};
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use thiserror::Error;
use tokio::io::unix::AsyncFd;
use tokio::sync::oneshot;

/// Controller index used when none is given (`hci0`).
pub const DEFAULT_DEVICE: u16 = 0;

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const SOL_HCI: c_int = 0;
const HCI_FILTER: c_int = 2;
const HCI_CHANNEL_RAW: u16 = 0;

// HCI packet types
const HCI_COMMAND_PKT: u8 = 0x01;
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_CMD_COMPLETE: u8 = 0x0E;
const EVT_CMD_STATUS: u8 = 0x0F;

// HCI commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_ADVERTISING_PARAMETERS: u16 = 0x0006;
const OCF_LE_SET_ADVERTISING_DATA: u16 = 0x0008;
const OCF_LE_SET_ADVERTISE_ENABLE: u16 = 0x000A;

// Advertising types
const ADV_IND: u8 = 0x00;
const ADV_NONCONN_IND: u8 = 0x03;

// Own address type
const LE_PUBLIC_ADDRESS: u8 = 0x00;

// All three advertising channels
const ADV_CHANNEL_MAP_ALL: u8 = 0x07;

// Filter policy
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;

// HCI status codes
const STATUS_SUCCESS: u8 = 0x00;
const STATUS_UNKNOWN_COMMAND: u8 = 0x01;
const STATUS_HARDWARE_FAILURE: u8 = 0x03;
const STATUS_MEMORY_CAPACITY_EXCEEDED: u8 = 0x07;
const STATUS_CONNECTION_LIMIT_EXCEEDED: u8 = 0x09;
const STATUS_COMMAND_DISALLOWED: u8 = 0x0C;
const STATUS_UNSUPPORTED_FEATURE: u8 = 0x11;
const STATUS_INVALID_PARAMETERS: u8 = 0x12;

/// Failures while talking to the controller.
#[derive(Error, Debug)]
enum HciError {
    #[error("HCI I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("HCI command 0x{opcode:04x} failed with status 0x{status:02x}")]
    Status { opcode: u16, status: u8 },
    #[error("advertising data does not fit in 31 bytes")]
    DataTooLarge,
}

impl From<HciError> for ServiceFailure {
    fn from(err: HciError) -> Self {
        match err {
            HciError::Io(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                ServiceFailure::PermissionDenied(e.to_string())
            }
            HciError::Io(e) => {
                tracing::warn!(error = %e, "HCI advertising I/O failure");
                StartFailure::InternalError.into()
            }
            HciError::Status { status, .. } => map_status(status).into(),
            HciError::DataTooLarge => StartFailure::DataTooLarge.into(),
        }
    }
}

/// Map a non-zero HCI status code to a start failure.
fn map_status(status: u8) -> StartFailure {
    match status {
        STATUS_MEMORY_CAPACITY_EXCEEDED | STATUS_CONNECTION_LIMIT_EXCEEDED => {
            StartFailure::TooManyAdvertisers
        }
        STATUS_COMMAND_DISALLOWED => StartFailure::AlreadyStarted,
        STATUS_INVALID_PARAMETERS => StartFailure::DataTooLarge,
        STATUS_UNKNOWN_COMMAND | STATUS_UNSUPPORTED_FEATURE => StartFailure::FeatureUnsupported,
        STATUS_HARDWARE_FAILURE => StartFailure::InternalError,
        other => StartFailure::Unknown(i32::from(other)),
    }
}

/// HCI socket address structure
#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// HCI filter structure for raw sockets
#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn new() -> Self {
        Self {
            type_mask: 0,
            event_mask: [0, 0],
            opcode: 0,
        }
    }

    fn set_ptype(&mut self, ptype: u8) {
        self.type_mask |= 1 << (ptype as u32);
    }

    fn set_event(&mut self, event: u8) {
        let bit = event as usize;
        self.event_mask[bit / 32] |= 1 << (bit % 32);
    }
}

/// LE Set Advertising Parameters command
struct LeSetAdvertisingParametersCmd {
    interval_min: u16,
    interval_max: u16,
    advertising_type: u8,
    own_address_type: u8,
    peer_address_type: u8,
    peer_address: [u8; 6],
    channel_map: u8,
    filter_policy: u8,
}

impl LeSetAdvertisingParametersCmd {
    fn for_settings(settings: &AdvertiseSettings) -> Self {
        let interval = interval_units(settings.mode.interval_ms());
        Self {
            interval_min: interval,
            interval_max: interval,
            advertising_type: if settings.connectable {
                ADV_IND
            } else {
                ADV_NONCONN_IND
            },
            own_address_type: LE_PUBLIC_ADDRESS,
            peer_address_type: LE_PUBLIC_ADDRESS,
            peer_address: [0; 6],
            channel_map: ADV_CHANNEL_MAP_ALL,
            filter_policy: FILTER_POLICY_ACCEPT_ALL,
        }
    }

    fn to_bytes(&self) -> [u8; 15] {
        let mut out = [0u8; 15];
        out[0..2].copy_from_slice(&self.interval_min.to_le_bytes());
        out[2..4].copy_from_slice(&self.interval_max.to_le_bytes());
        out[4] = self.advertising_type;
        out[5] = self.own_address_type;
        out[6] = self.peer_address_type;
        out[7..13].copy_from_slice(&self.peer_address);
        out[13] = self.channel_map;
        out[14] = self.filter_policy;
        out
    }
}

/// Convert milliseconds to 0.625 ms advertising interval units.
fn interval_units(ms: u64) -> u16 {
    (ms * 1000 / 625).clamp(0x0020, 0x4000) as u16
}

/// LE Set Advertising Data parameters: significant length plus 31 padded bytes.
fn advertising_data_params(
    data: &ManufacturerData,
) -> Result<[u8; 1 + MAX_ADV_DATA_LEN], HciError> {
    let ad = data.to_ad_structure().ok_or(HciError::DataTooLarge)?;
    let mut out = [0u8; 1 + MAX_ADV_DATA_LEN];
    out[0] = ad.len() as u8;
    out[1..1 + ad.len()].copy_from_slice(&ad);
    Ok(out)
}

/// Create an HCI command packet
fn hci_command_packet(opcode: u16, params: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(HCI_COMMAND_PKT);
    packet.extend_from_slice(&opcode.to_le_bytes());
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

fn le_opcode(ocf: u16) -> u16 {
    (OGF_LE_CTL << 10) | ocf
}

/// Extract the status of `opcode` from a Command Complete or Command Status event.
fn command_status(packet: &[u8], opcode: u16) -> Option<u8> {
    if packet.len() < 3 || packet[0] != HCI_EVENT_PKT {
        return None;
    }
    let params = &packet[3..];

    match packet[1] {
        // num_packets(1) + opcode(2) + status(1)
        EVT_CMD_COMPLETE if params.len() >= 4 => {
            let evt_opcode = u16::from_le_bytes([params[1], params[2]]);
            (evt_opcode == opcode).then_some(params[3])
        }
        // status(1) + num_packets(1) + opcode(2)
        EVT_CMD_STATUS if params.len() >= 4 => {
            let evt_opcode = u16::from_le_bytes([params[2], params[3]]);
            (evt_opcode == opcode).then_some(params[0])
        }
        _ => None,
    }
}

/// Open a non-blocking raw HCI socket
fn open_hci_socket() -> io::Result<OwnedFd> {
    let fd = unsafe {
        libc::socket(
            AF_BLUETOOTH,
            SOCK_RAW | SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            BTPROTO_HCI,
        )
    };

    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Bind HCI socket to a device
fn bind_hci_socket(fd: &OwnedFd, dev_id: u16) -> io::Result<()> {
    let addr = SockaddrHci {
        hci_family: AF_BLUETOOTH as u16,
        hci_dev: dev_id,
        hci_channel: HCI_CHANNEL_RAW,
    };

    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const SockaddrHci as *const sockaddr,
            mem::size_of::<SockaddrHci>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Only pass command completion events to the socket
fn set_hci_filter(fd: &OwnedFd) -> io::Result<()> {
    let mut filter = HciFilter::new();
    filter.set_ptype(HCI_EVENT_PKT);
    filter.set_event(EVT_CMD_COMPLETE);
    filter.set_event(EVT_CMD_STATUS);

    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            SOL_HCI,
            HCI_FILTER,
            &filter as *const HciFilter as *const c_void,
            mem::size_of::<HciFilter>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// An open, filtered HCI socket that issues commands and awaits their completion.
struct HciSocket {
    fd: AsyncFd<OwnedFd>,
}

impl HciSocket {
    fn open(dev_id: u16) -> Result<Self, HciError> {
        let fd = open_hci_socket()?;
        bind_hci_socket(&fd, dev_id)?;
        set_hci_filter(&fd)?;
        Ok(Self {
            fd: AsyncFd::new(fd)?,
        })
    }

    /// Send an LE command and wait for the controller to complete it.
    async fn le_command(&self, ocf: u16, params: &[u8]) -> Result<(), HciError> {
        let opcode = le_opcode(ocf);
        let packet = hci_command_packet(opcode, params);

        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                packet.as_ptr() as *const c_void,
                packet.len(),
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }

        let mut buf = [0u8; 258]; // Max HCI event size
        loop {
            let mut guard = self.fd.readable().await?;

            let n = match guard.try_io(|inner| {
                let ret = unsafe {
                    libc::read(
                        inner.as_raw_fd(),
                        buf.as_mut_ptr() as *mut c_void,
                        buf.len(),
                    )
                };
                if ret < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(ret as usize)
                }
            }) {
                Ok(result) => result?,
                Err(_would_block) => continue,
            };

            match command_status(&buf[..n], opcode) {
                Some(STATUS_SUCCESS) => return Ok(()),
                Some(status) => return Err(HciError::Status { opcode, status }),
                None => continue,
            }
        }
    }
}

/// Advertiser driving an HCI controller directly.
#[derive(Debug, Clone, Copy)]
pub struct HciAdvertiser {
    dev_id: u16,
}

impl HciAdvertiser {
    pub fn new(dev_id: u16) -> Self {
        Self { dev_id }
    }
}

async fn enable_advertising(
    dev_id: u16,
    settings: AdvertiseSettings,
    data: ManufacturerData,
) -> Result<(), HciError> {
    let data_params = advertising_data_params(&data)?;
    let socket = HciSocket::open(dev_id)?;

    let params = LeSetAdvertisingParametersCmd::for_settings(&settings);
    socket
        .le_command(OCF_LE_SET_ADVERTISING_PARAMETERS, &params.to_bytes())
        .await?;
    socket
        .le_command(OCF_LE_SET_ADVERTISING_DATA, &data_params)
        .await?;
    socket.le_command(OCF_LE_SET_ADVERTISE_ENABLE, &[0x01]).await
}

async fn disable_advertising(dev_id: u16) -> Result<(), HciError> {
    let socket = HciSocket::open(dev_id)?;
    socket.le_command(OCF_LE_SET_ADVERTISE_ENABLE, &[0x00]).await
}

impl AdvertisingService for HciAdvertiser {
    fn start(
        &self,
        settings: AdvertiseSettings,
        data: ManufacturerData,
    ) -> oneshot::Receiver<StartCompletion> {
        let (tx, rx) = oneshot::channel();
        let dev_id = self.dev_id;

        tokio::spawn(async move {
            let completion = match enable_advertising(dev_id, settings, data).await {
                Ok(()) => StartCompletion::Success,
                Err(e) => {
                    tracing::debug!(error = %e, dev_id, "HCI advertising start failed");
                    StartCompletion::Failure(e.into())
                }
            };
            let _ = tx.send(completion);
        });

        rx
    }

    fn stop(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let dev_id = self.dev_id;

        tokio::spawn(async move {
            if let Err(e) = disable_advertising(dev_id).await {
                tracing::warn!(error = %e, dev_id, "HCI advertising disable failed");
            }
            let _ = tx.send(());
        });

        rx
    }
}
