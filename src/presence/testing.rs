//! Scripted transport and metadata source for exercising the loop in tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::payload::Activity;
use super::traits::{
    ConnectionState, NowPlaying, NowPlayingSource, PresenceTransport, SourceError, TransportError,
    TransportFactory,
};

#[derive(Default)]
struct Script {
    connects: VecDeque<Result<(), TransportError>>,
    updates: VecDeque<Result<(), TransportError>>,
    attempted_slots: Vec<u8>,
    pushed: Vec<(u8, Activity)>,
    closes: usize,
}

/// Hands out transports that replay queued results. Unscripted calls succeed.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    script: Arc<Mutex<Script>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_connects(&self, results: impl IntoIterator<Item = Result<(), TransportError>>) {
        self.script.lock().unwrap().connects.extend(results);
    }

    pub fn push_updates(&self, results: impl IntoIterator<Item = Result<(), TransportError>>) {
        self.script.lock().unwrap().updates.extend(results);
    }

    pub fn attempted_slots(&self) -> Vec<u8> {
        self.script.lock().unwrap().attempted_slots.clone()
    }

    /// Successful pushes, with the slot of the transport that carried them
    pub fn pushed(&self) -> Vec<(u8, Activity)> {
        self.script.lock().unwrap().pushed.clone()
    }

    pub fn close_count(&self) -> usize {
        self.script.lock().unwrap().closes
    }
}

impl TransportFactory for ScriptedFactory {
    fn create(&self, slot: u8) -> Box<dyn PresenceTransport> {
        Box::new(ScriptedTransport {
            slot,
            state: ConnectionState::Disconnected,
            script: Arc::clone(&self.script),
        })
    }
}

struct ScriptedTransport {
    slot: u8,
    state: ConnectionState,
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl PresenceTransport for ScriptedTransport {
    fn slot(&self) -> u8 {
        self.slot
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        let result = {
            let mut script = self.script.lock().unwrap();
            script.attempted_slots.push(self.slot);
            script.connects.pop_front().unwrap_or(Ok(()))
        };
        self.state = if result.is_ok() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        result
    }

    async fn update(&mut self, activity: &Activity) -> Result<(), TransportError> {
        let mut script = self.script.lock().unwrap();
        let result = script.updates.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            script.pushed.push((self.slot, activity.clone()));
        }
        result
    }

    async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        self.script.lock().unwrap().closes += 1;
    }
}

/// Replays queued fetch results, then keeps returning `fallback`.
#[derive(Clone)]
pub struct ScriptedSource {
    results: Arc<Mutex<VecDeque<Result<Option<NowPlaying>, SourceError>>>>,
    fallback: Option<NowPlaying>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedSource {
    pub fn playing(track: &str, artist: &str) -> Self {
        Self {
            results: Arc::default(),
            fallback: Some(NowPlaying {
                track: track.to_string(),
                artists: vec![artist.to_string()],
            }),
            calls: Arc::default(),
        }
    }

    pub fn idle() -> Self {
        Self {
            results: Arc::default(),
            fallback: None,
            calls: Arc::default(),
        }
    }

    pub fn push(&self, result: Result<Option<NowPlaying>, SourceError>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl NowPlayingSource for ScriptedSource {
    async fn now_playing(&mut self) -> Result<Option<NowPlaying>, SourceError> {
        *self.calls.lock().unwrap() += 1;
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
