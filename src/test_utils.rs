use crate::advertiser::{AdvertiseSettings, AdvertisingService, StartCompletion};
use crate::identity::DeviceIdentity;
use crate::payload::ManufacturerData;
use crate::pseudo_id::PseudoId;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// The default beacon UUID used throughout the tests.
pub const TEST_UUID: &str = "2D7A9F0C-E0E8-4CC9-A71B-A21DB2D034A1";

/// A stable pseudo-MAC for unit tests.
pub const TEST_PSEUDO_ID: PseudoId = PseudoId([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// A fixed identity so derived pseudo-MACs are reproducible.
pub fn test_identity() -> DeviceIdentity {
    DeviceIdentity::new("0123456789abcdef", "Test Model", "Test Brand")
}

/// A request observed by [`FakeService`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start(AdvertiseSettings, ManufacturerData),
    Stop,
}

impl Call {
    pub fn kind(&self) -> &'static str {
        match self {
            Call::Start(..) => "start",
            Call::Stop => "stop",
        }
    }
}

/// How the fake answers the next start request.
enum Script {
    Complete(StartCompletion),
    Drop,
    Hang,
}

/// Advertising service that records requests and answers from a script.
///
/// Start requests succeed unless a different outcome was queued. Stop
/// requests are always acknowledged.
#[derive(Default)]
pub struct FakeService {
    calls: Mutex<Vec<Call>>,
    script: Mutex<VecDeque<Script>>,
    pending: Mutex<Vec<oneshot::Sender<StartCompletion>>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_start(&self, completion: StartCompletion) {
        self.script
            .lock()
            .unwrap()
            .push_back(Script::Complete(completion));
    }

    /// Drop the completion sender of the next start without answering.
    pub fn drop_next_start(&self) {
        self.script.lock().unwrap().push_back(Script::Drop);
    }

    /// Never answer the next start.
    pub fn hang_next_start(&self) {
        self.script.lock().unwrap().push_back(Script::Hang);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl AdvertisingService for FakeService {
    fn start(
        &self,
        settings: AdvertiseSettings,
        data: ManufacturerData,
    ) -> oneshot::Receiver<StartCompletion> {
        self.calls.lock().unwrap().push(Call::Start(settings, data));

        let (tx, rx) = oneshot::channel();
        let script = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Complete(StartCompletion::Success));
        match script {
            Script::Complete(completion) => {
                let _ = tx.send(completion);
            }
            Script::Drop => drop(tx),
            Script::Hang => self.pending.lock().unwrap().push(tx),
        }
        rx
    }

    fn stop(&self) -> oneshot::Receiver<()> {
        self.calls.lock().unwrap().push(Call::Stop);

        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        rx
    }
}
