//! Shared fakes for controller and API tests
//!
//! `FakeBackend` plays the inspector, the prober and the launcher at once,
//! backed by one in-memory model of each service.

#![allow(dead_code)]

use async_trait::async_trait;
use llm_common::ServiceName;
use llmd::controller::{LifecycleController, LifecycleTimings};
use llmd::inspector::{PortLookup, ProcessInspector};
use llmd::prober::HealthProber;
use llmd::registry::{ServiceRegistry, ServiceSpec};
use llmd::runner::{ScriptAction, ScriptError, ScriptOutput, ServiceLauncher};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NLLB_PORT: u16 = 18000;
pub const OLLAMA_PORT: u16 = 18001;
pub const FAKE_PID: u32 = 4242;

pub fn port_of(name: ServiceName) -> u16 {
    match name {
        ServiceName::Nllb => NLLB_PORT,
        ServiceName::Ollama => OLLAMA_PORT,
    }
}

pub fn test_specs() -> Vec<ServiceSpec> {
    ServiceName::ALL
        .iter()
        .map(|&name| {
            let port = port_of(name);
            ServiceSpec {
                name,
                port,
                health_url: format!("http://localhost:{}/health", port),
                endpoint: format!("http://localhost:{}", port),
                start_script: PathBuf::from(format!("llm-control/start-{}.sh", name)),
                stop_script: PathBuf::from(format!("llm-control/stop-{}.sh", name)),
            }
        })
        .collect()
}

pub fn fast_timings() -> LifecycleTimings {
    LifecycleTimings {
        start_poll_attempts: 5,
        start_poll_interval: Duration::from_millis(10),
        settle_delay: Duration::from_millis(10),
    }
}

pub fn ok_output(stdout: &str) -> ScriptOutput {
    ScriptOutput {
        exit_code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn failed_output(code: i32, stderr: &str) -> ScriptOutput {
    ScriptOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// In-memory model of one service
#[derive(Debug, Clone)]
pub struct FakeService {
    /// Probe answer once `probe_script` is exhausted
    pub healthy: bool,
    pub probe_script: VecDeque<bool>,
    /// Process listening on the port, independent of health
    pub pid: Option<u32>,
    pub start_result: Result<ScriptOutput, ScriptError>,
    pub stop_result: Result<ScriptOutput, ScriptError>,
    /// A successful start script makes the service healthy and listening
    pub start_brings_up: bool,
    /// A successful stop script takes the service down
    pub stop_brings_down: bool,
    pub script_delay: Duration,

    pub probes: usize,
    pub start_calls: usize,
    pub stop_calls: usize,
    pub in_flight: usize,
    pub max_in_flight: usize,
}

impl Default for FakeService {
    fn default() -> Self {
        Self {
            healthy: false,
            probe_script: VecDeque::new(),
            pid: None,
            start_result: Ok(ok_output("starting\n")),
            stop_result: Ok(ok_output("stopping\n")),
            start_brings_up: true,
            stop_brings_down: true,
            script_delay: Duration::ZERO,
            probes: 0,
            start_calls: 0,
            stop_calls: 0,
            in_flight: 0,
            max_in_flight: 0,
        }
    }
}

impl FakeService {
    pub fn running() -> Self {
        Self {
            healthy: true,
            pid: Some(FAKE_PID),
            ..Self::default()
        }
    }

    pub fn stopped() -> Self {
        Self::default()
    }
}

#[derive(Default)]
pub struct FakeBackend {
    services: Mutex<HashMap<ServiceName, FakeService>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        for name in ServiceName::ALL {
            backend.set(name, FakeService::stopped());
        }
        Arc::new(backend)
    }

    pub fn set(&self, name: ServiceName, service: FakeService) {
        self.services.lock().unwrap().insert(name, service);
    }

    pub fn update(&self, name: ServiceName, f: impl FnOnce(&mut FakeService)) {
        let mut services = self.services.lock().unwrap();
        f(services.get_mut(&name).unwrap());
    }

    pub fn get(&self, name: ServiceName) -> FakeService {
        self.services.lock().unwrap()[&name].clone()
    }

    pub fn controller(self: &Arc<Self>) -> LifecycleController {
        LifecycleController::new(
            ServiceRegistry::new(test_specs()),
            self.clone(),
            self.clone(),
            self.clone(),
            fast_timings(),
        )
    }

    fn name_for_port(port: u16) -> Option<ServiceName> {
        ServiceName::ALL.into_iter().find(|&name| port_of(name) == port)
    }

    fn name_for_url(url: &str) -> Option<ServiceName> {
        ServiceName::ALL
            .into_iter()
            .find(|&name| url.contains(&format!(":{}/", port_of(name))))
    }
}

#[async_trait]
impl ProcessInspector for FakeBackend {
    async fn lookup(&self, port: u16) -> PortLookup {
        let Some(name) = Self::name_for_port(port) else {
            return PortLookup::Absent;
        };
        match self.get(name).pid {
            Some(pid) => PortLookup::Listening(pid),
            None => PortLookup::Absent,
        }
    }
}

#[async_trait]
impl HealthProber for FakeBackend {
    async fn probe(&self, url: &str) -> bool {
        let Some(name) = Self::name_for_url(url) else {
            return false;
        };
        let mut services = self.services.lock().unwrap();
        let service = services.get_mut(&name).unwrap();
        service.probes += 1;
        service.probe_script.pop_front().unwrap_or(service.healthy)
    }
}

#[async_trait]
impl ServiceLauncher for FakeBackend {
    async fn launch(
        &self,
        service: &ServiceSpec,
        action: ScriptAction,
    ) -> Result<ScriptOutput, ScriptError> {
        let delay = {
            let mut services = self.services.lock().unwrap();
            let fake = services.get_mut(&service.name).unwrap();
            match action {
                ScriptAction::Start => fake.start_calls += 1,
                ScriptAction::Stop => fake.stop_calls += 1,
            }
            fake.in_flight += 1;
            fake.max_in_flight = fake.max_in_flight.max(fake.in_flight);
            fake.script_delay
        };

        tokio::time::sleep(delay).await;

        let mut services = self.services.lock().unwrap();
        let fake = services.get_mut(&service.name).unwrap();
        fake.in_flight -= 1;

        let result = match action {
            ScriptAction::Start => fake.start_result.clone(),
            ScriptAction::Stop => fake.stop_result.clone(),
        };
        let succeeded = matches!(&result, Ok(output) if output.success());

        match action {
            ScriptAction::Start if succeeded && fake.start_brings_up => {
                fake.healthy = true;
                fake.pid = Some(FAKE_PID);
            }
            ScriptAction::Stop if succeeded && fake.stop_brings_down => {
                fake.healthy = false;
                fake.pid = None;
                fake.probe_script.clear();
            }
            _ => {}
        }

        result
    }
}
