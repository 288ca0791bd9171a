//! This module provides a mocked [`Upstream`], that can be tweaked to return errors on some tests
#![cfg(any(test, feature = "mock_upstream"))]

use std::error::Error;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{Probe, Upstream};

/// This stores some behaviour tweaks, that describe how a mocked upstream will behave during a given test
///
/// So that a functions fails _n_ times after _m_ initial successes, set `(m, n)` for the suited parameter
#[derive(Default, Clone, Debug)]
pub struct MockBehaviour {
    /// If this is true, every action will be allowed
    pub is_suspended: bool,

    pub probe_behaviour: (u32, u32),
    pub download_behaviour: (u32, u32),
}

impl MockBehaviour {
    pub fn new() -> Self {
        Self::default()
    }

    /// All actions will fail at once, for `n_fails` times
    pub fn fail_now(n_fails: u32) -> Self {
        Self {
            is_suspended: false,
            probe_behaviour: (0, n_fails),
            download_behaviour: (0, n_fails),
        }
    }

    /// Suspend this mock behaviour until you call `resume`
    pub fn suspend(&mut self) {
        self.is_suspended = true;
    }
    /// Make this behaviour active again
    pub fn resume(&mut self) {
        self.is_suspended = false;
    }

    pub fn can_probe(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.probe_behaviour, "probe")
    }
    pub fn can_download(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.download_behaviour, "download")
    }
}


/// Return Ok(()) in case the value is `(1+, _)` or `(_, 0)`, or return Err and decrement otherwise
fn decrement(value: &mut (u32, u32), descr: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let remaining_successes = value.0;
    let remaining_failures = value.1;

    if remaining_successes > 0 {
        value.0 -= 1;
        log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
        Ok(())
    } else if remaining_failures > 0 {
        value.1 -= 1;
        log::debug!("Mock behaviour: failing a {} ({:?})", descr, value);
        Err(format!("Mocked behaviour requires this {} to fail this time. ({:?})", descr, value).into())
    } else {
        log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
        Ok(())
    }
}


/// An in-memory feed that counts how often it is queried
#[derive(Debug, Default)]
pub struct MockUpstream {
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    body: Vec<u8>,
    last_modified: Option<String>,
    behaviour: MockBehaviour,
    /// How long every request takes
    latency: Duration,
    probes: u32,
    downloads: u32,
}

impl MockUpstream {
    pub fn new<B: Into<Vec<u8>>>(body: B) -> Self {
        let mock = Self::default();
        mock.set_body(body);
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only means another test thread panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_body<B: Into<Vec<u8>>>(&self, body: B) {
        self.state().body = body.into();
    }
    /// Set the raw `Last-Modified` header returned by probes
    pub fn set_last_modified(&self, last_modified: Option<&str>) {
        self.state().last_modified = last_modified.map(String::from);
    }
    pub fn set_behaviour(&self, behaviour: MockBehaviour) {
        self.state().behaviour = behaviour;
    }
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    pub fn probe_count(&self) -> u32 {
        self.state().probes
    }
    pub fn download_count(&self) -> u32 {
        self.state().downloads
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn probe(&self) -> Result<Probe, Box<dyn Error + Send + Sync>> {
        let (latency, result) = {
            let mut state = self.state();
            state.probes += 1;
            let result = state.behaviour.can_probe()
                .map(|_| Probe { last_modified: state.last_modified.clone() });
            (state.latency, result)
        };
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }
        result
    }

    async fn download(&self) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>> {
        let (latency, result) = {
            let mut state = self.state();
            state.downloads += 1;
            let result = state.behaviour.can_download()
                .map(|_| state.body.clone());
            (state.latency, result)
        };
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }
        result
    }
}
