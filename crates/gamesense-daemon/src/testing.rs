//! Scripted samplers and a recording device for scheduler tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use gamesense_proto::client::{DeviceApi, DeviceApiFactory, TransportError};
use gamesense_proto::protocol::{DisplayEvent, HandlerOptions};

use crate::sampler::{SongSampler, VolumeSampler};

#[derive(Clone, Default)]
pub struct FakeVolume {
    value: Arc<Mutex<Option<u8>>>,
}

impl FakeVolume {
    pub fn set(&self, value: Option<u8>) {
        *self.value.lock().unwrap() = value;
    }
}

impl VolumeSampler for FakeVolume {
    async fn sample(&mut self) -> Option<u8> {
        *self.value.lock().unwrap()
    }
}

#[derive(Clone, Default)]
pub struct FakeSong {
    value: Arc<Mutex<Option<String>>>,
}

impl FakeSong {
    pub fn set(&self, value: Option<&str>) {
        *self.value.lock().unwrap() = value.map(str::to_string);
    }
}

impl SongSampler for FakeSong {
    async fn sample(&mut self) -> Option<String> {
        self.value.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Connection,
    Rejected,
}

impl Failure {
    fn into_error(self) -> TransportError {
        match self {
            Self::Connection => TransportError::Unreachable {
                address: "http://127.0.0.1:1".into(),
                reason: "connection refused".into(),
            },
            Self::Rejected => TransportError::Rejected {
                endpoint: "game_event".into(),
                status: 400,
                body: "bad event".into(),
            },
        }
    }
}

/// Shared log of everything the fake engine was asked to do.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<DisplayEvent>>>,
    registrations: Arc<Mutex<Vec<HandlerOptions>>>,
    failures: Arc<Mutex<VecDeque<Failure>>>,
    clients_created: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
}

impl Recorder {
    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn registrations(&self) -> Vec<HandlerOptions> {
        self.registrations.lock().unwrap().clone()
    }

    pub fn clients_created(&self) -> usize {
        self.clients_created.load(Ordering::SeqCst)
    }

    /// Make the next send fail.
    pub fn fail_next(&self, failure: Failure) {
        self.failures.lock().unwrap().push_back(failure);
    }

    /// Make client creation fail, as when the engine is not running.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every request hang without an answer.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn factory(&self) -> FakeFactory {
        FakeFactory {
            recorder: self.clone(),
        }
    }
}

pub struct FakeClient {
    recorder: Recorder,
}

impl FakeClient {
    async fn stall_if_asked(&self) {
        if self.recorder.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

impl DeviceApi for FakeClient {
    fn address(&self) -> &str {
        "http://127.0.0.1:1"
    }

    async fn send(&self, event: &DisplayEvent) -> Result<(), TransportError> {
        self.stall_if_asked().await;
        let failure = self.recorder.failures.lock().unwrap().pop_front();
        if let Some(failure) = failure {
            return Err(failure.into_error());
        }
        self.recorder.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn register(&self, options: HandlerOptions) -> Result<(), TransportError> {
        self.stall_if_asked().await;
        self.recorder.registrations.lock().unwrap().push(options);
        Ok(())
    }
}

pub struct FakeFactory {
    recorder: Recorder,
}

impl DeviceApiFactory for FakeFactory {
    type Client = FakeClient;

    fn create(&mut self) -> Result<FakeClient, TransportError> {
        if self.recorder.unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::Discovery("coreProps.json not found".into()));
        }
        self.recorder.clients_created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeClient {
            recorder: self.recorder.clone(),
        })
    }
}
