//! Lifecycle controller - start, stop, restart and status of managed services.
//!
//! Rules:
//! - Status always reconciles against the port owner and the health probe;
//!   the registry only caches the last answer
//! - Start is a no-op when the health probe already passes
//! - A clean start script is not enough: Start succeeds only after a
//!   positive health probe within the polling window
//! - Stop succeeds only if reconciliation after the settle delay says Stopped
//! - Restart is Stop then Start under one lock; a failed Stop ends it
//! - At most one lifecycle operation per service runs at a time. Identical
//!   concurrent requests join the running one and share its outcome
//! - Operations run in their own task, so a dropped request cannot abort one

use crate::error::{LifecycleError, ScriptFailure};
use crate::inspector::ProcessInspector;
use crate::prober::HealthProber;
use crate::registry::{LifecycleLock, ServiceEntry, ServiceRegistry, ServiceSpec};
use crate::runner::{ScriptAction, ServiceLauncher};
use llm_common::{
    LifecycleOp, LifecycleResponse, ServiceName, ServiceSnapshot, ServiceState, ServiceStatus,
    ServicesStatusResponse,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Polling bounds for Start and the settle delay used by Stop/Restart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimings {
    pub start_poll_attempts: u32,
    /// Delay before each health poll
    pub start_poll_interval: Duration,
    pub settle_delay: Duration,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            start_poll_attempts: 15,
            start_poll_interval: Duration::from_secs(2),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// One live reading of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub healthy: bool,
}

impl Observation {
    /// Running needs both a listener and a passing health probe
    pub fn from_readings(pid: Option<u32>, healthy: bool) -> Self {
        match pid {
            Some(pid) if healthy => Self {
                state: ServiceState::Running,
                pid: Some(pid),
                healthy,
            },
            _ => Self {
                state: ServiceState::Stopped,
                pid: None,
                healthy,
            },
        }
    }
}

/// A lifecycle operation that succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOutcome {
    pub service: ServiceName,
    pub op: LifecycleOp,
    pub status: ServiceStatus,
    /// Combined stdout of the scripts that ran
    pub stdout: String,
    /// Start found the service healthy and ran nothing
    pub already_running: bool,
}

impl LifecycleOutcome {
    pub fn message(&self) -> String {
        match (self.op, self.already_running) {
            (LifecycleOp::Start, true) => format!("{} service is already running", self.service),
            (LifecycleOp::Start, false) => format!("{} service started successfully", self.service),
            (LifecycleOp::Stop, _) => format!("{} service stopped successfully", self.service),
            (LifecycleOp::Restart, _) => format!("{} service restarted successfully", self.service),
        }
    }

    pub fn to_response(&self) -> LifecycleResponse {
        LifecycleResponse {
            success: true,
            message: self.message(),
            service: self.service,
            status: self.status.status,
            pid: self.status.pid,
            healthy: self.status.healthy,
            port: self.status.port,
            endpoint: self.status.endpoint.clone(),
            stdout: self.stdout.clone(),
        }
    }
}

pub type LifecycleResult = Result<LifecycleOutcome, LifecycleError>;

type PendingKey = (ServiceName, LifecycleOp);
type PendingOps = HashMap<PendingKey, watch::Receiver<Option<LifecycleResult>>>;

/// Owns the registry and every state transition of the managed services
#[derive(Clone)]
pub struct LifecycleController {
    registry: Arc<ServiceRegistry>,
    inspector: Arc<dyn ProcessInspector>,
    prober: Arc<dyn HealthProber>,
    launcher: Arc<dyn ServiceLauncher>,
    timings: LifecycleTimings,
    pending: Arc<StdMutex<PendingOps>>,
}

impl LifecycleController {
    pub fn new(
        registry: ServiceRegistry,
        inspector: Arc<dyn ProcessInspector>,
        prober: Arc<dyn HealthProber>,
        launcher: Arc<dyn ServiceLauncher>,
        timings: LifecycleTimings,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            inspector,
            prober,
            launcher,
            timings,
            pending: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn timings(&self) -> LifecycleTimings {
        self.timings
    }

    fn resolve(&self, name: &str) -> Result<(ServiceName, &ServiceEntry), LifecycleError> {
        let service: ServiceName = name
            .parse()
            .map_err(|_| LifecycleError::Validation(name.to_string()))?;
        let entry = self
            .registry
            .get(service)
            .ok_or_else(|| LifecycleError::Validation(name.to_string()))?;
        Ok((service, entry))
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Reconciled status of one service
    pub async fn status(&self, name: &str) -> Result<ServiceStatus, LifecycleError> {
        let (_, entry) = self.resolve(name)?;
        Ok(self.reconcile(entry).await)
    }

    /// Reconciled status of every service
    pub async fn status_all(&self) -> ServicesStatusResponse {
        let mut statuses = BTreeMap::new();
        for name in self.registry.names() {
            if let Some(entry) = self.registry.get(name) {
                statuses.insert(name, self.reconcile(entry).await);
            }
        }
        statuses
    }

    /// Last-known state of every service, without touching the services
    pub async fn snapshot_all(&self) -> BTreeMap<ServiceName, ServiceSnapshot> {
        let mut snapshots = BTreeMap::new();
        for name in self.registry.names() {
            if let Some(entry) = self.registry.get(name) {
                snapshots.insert(name, entry.snapshot().await);
            }
        }
        snapshots
    }

    /// Seed the cache from live state; run once at startup
    pub async fn reconcile_all(&self) {
        for (name, status) in self.status_all().await {
            info!(
                service = %name,
                status = %status.status,
                pid = ?status.pid,
                port = status.port,
                "Initial reconciliation"
            );
        }
    }

    async fn observe(&self, spec: &ServiceSpec) -> Observation {
        let (pid, healthy) = tokio::join!(
            self.inspector.pid_on_port(spec.port),
            self.prober.probe(&spec.health_url)
        );
        Observation::from_readings(pid, healthy)
    }

    /// Observe and cache, unless a lifecycle operation owns the record
    async fn reconcile(&self, entry: &ServiceEntry) -> ServiceStatus {
        let lock = entry.try_lock();
        let observed = self.observe(entry.spec()).await;

        match &lock {
            Some(lock) => {
                lock.commit(observed.state, observed.pid).await;
            }
            None => debug!(
                service = %entry.spec().name,
                "Lifecycle operation in flight, reporting without caching"
            ),
        }
        let operation = if lock.is_some() { None } else { entry.operation() };

        status_view(entry.spec(), observed, operation)
    }

    /// Observe and commit under a held lock
    async fn refresh(&self, spec: &ServiceSpec, lock: &LifecycleLock<'_>) -> Observation {
        let observed = self.observe(spec).await;
        lock.commit(observed.state, observed.pid).await;
        observed
    }

    /// Commit what status would report after a passing probe.
    ///
    /// Health alone decides Start's success; the cache still only records
    /// Running when the port owner is known.
    async fn confirm_healthy(&self, spec: &ServiceSpec, lock: &LifecycleLock<'_>) -> Option<u32> {
        let pid = self.inspector.pid_on_port(spec.port).await;
        if pid.is_none() {
            warn!(
                service = %spec.name,
                port = spec.port,
                "Health probe passed but no listener found on port"
            );
        }
        let observed = Observation::from_readings(pid, true);
        lock.commit(observed.state, observed.pid).await;
        pid
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub async fn start(&self, name: &str) -> LifecycleResult {
        self.run(name, LifecycleOp::Start).await
    }

    pub async fn stop(&self, name: &str) -> LifecycleResult {
        self.run(name, LifecycleOp::Stop).await
    }

    pub async fn restart(&self, name: &str) -> LifecycleResult {
        self.run(name, LifecycleOp::Restart).await
    }

    pub async fn run(&self, name: &str, op: LifecycleOp) -> LifecycleResult {
        let (service, _) = self.resolve(name)?;
        let mut rx = self.join_or_spawn(service, op);

        let settled = rx.wait_for(Option::is_some).await;
        match settled {
            Ok(result) => Option::clone(&result).unwrap_or_else(|| {
                Err(LifecycleError::Internal(format!("{} {} produced no result", op, service)))
            }),
            Err(_) => Err(LifecycleError::Internal(format!(
                "{} {} ended without reporting",
                op, service
            ))),
        }
    }

    fn lock_pending(&self) -> StdMutexGuard<'_, PendingOps> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn join_or_spawn(
        &self,
        service: ServiceName,
        op: LifecycleOp,
    ) -> watch::Receiver<Option<LifecycleResult>> {
        let mut pending = self.lock_pending();
        if let Some(rx) = pending.get(&(service, op)) {
            debug!(service = %service, op = %op, "Joining in-flight operation");
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        pending.insert((service, op), rx.clone());
        drop(pending);

        let controller = self.clone();
        tokio::spawn(async move {
            let slot = PendingSlot {
                pending: Arc::clone(&controller.pending),
                key: (service, op),
            };
            let result = controller.execute(service, op).await;
            // Late arrivals start a fresh operation instead of reading this one
            drop(slot);
            tx.send_replace(Some(result));
        });

        rx
    }

    async fn execute(&self, service: ServiceName, op: LifecycleOp) -> LifecycleResult {
        let entry = self
            .registry
            .get(service)
            .ok_or_else(|| LifecycleError::Validation(service.to_string()))?;

        let lock = entry.lock().await;
        lock.begin(op);
        info!(service = %service, op = %op, "Lifecycle operation started");

        let result = match op {
            LifecycleOp::Start => self.do_start(entry.spec(), &lock).await,
            LifecycleOp::Stop => self.do_stop(entry.spec(), &lock).await,
            LifecycleOp::Restart => self.do_restart(entry.spec(), &lock).await,
        };

        match &result {
            Ok(outcome) => info!(
                service = %service,
                op = %op,
                status = %outcome.status.status,
                pid = ?outcome.status.pid,
                "{}",
                outcome.message()
            ),
            Err(e) => warn!(service = %service, op = %op, error = %e, "Lifecycle operation failed"),
        }

        result
    }

    async fn do_start(&self, spec: &ServiceSpec, lock: &LifecycleLock<'_>) -> LifecycleResult {
        let service = spec.name;

        if self.prober.probe(&spec.health_url).await {
            let pid = self.confirm_healthy(spec, lock).await;
            return Ok(outcome(spec, LifecycleOp::Start, pid, String::new(), true));
        }

        let output = match self.launcher.launch(spec, ScriptAction::Start).await {
            Ok(output) if output.success() => output,
            Ok(output) => {
                self.refresh(spec, lock).await;
                return Err(LifecycleError::StartScript {
                    service,
                    failure: ScriptFailure::exited(output),
                });
            }
            Err(e) => {
                self.refresh(spec, lock).await;
                return Err(LifecycleError::StartScript {
                    service,
                    failure: e.into(),
                });
            }
        };

        let attempts = self.timings.start_poll_attempts;
        for attempt in 1..=attempts {
            tokio::time::sleep(self.timings.start_poll_interval).await;

            if self.prober.probe(&spec.health_url).await {
                debug!(service = %service, attempt, "Health confirmed");
                let pid = self.confirm_healthy(spec, lock).await;
                return Ok(outcome(spec, LifecycleOp::Start, pid, output.stdout, false));
            }
            debug!(service = %service, attempt, attempts, "Waiting for health");
        }

        self.refresh(spec, lock).await;
        Err(LifecycleError::StartTimeout {
            service,
            attempts,
            stdout: output.stdout,
        })
    }

    async fn do_stop(&self, spec: &ServiceSpec, lock: &LifecycleLock<'_>) -> LifecycleResult {
        let service = spec.name;

        let output = match self.launcher.launch(spec, ScriptAction::Stop).await {
            Ok(output) if output.success() => output,
            Ok(output) => {
                self.refresh(spec, lock).await;
                return Err(LifecycleError::StopScript {
                    service,
                    failure: ScriptFailure::exited(output),
                });
            }
            Err(e) => {
                self.refresh(spec, lock).await;
                return Err(LifecycleError::StopScript {
                    service,
                    failure: e.into(),
                });
            }
        };

        tokio::time::sleep(self.timings.settle_delay).await;

        let observed = self.refresh(spec, lock).await;
        if observed.state == ServiceState::Running {
            return Err(LifecycleError::StopIncomplete {
                service,
                pid: observed.pid,
                stdout: output.stdout,
            });
        }

        Ok(LifecycleOutcome {
            service,
            op: LifecycleOp::Stop,
            status: status_view(spec, observed, None),
            stdout: output.stdout,
            already_running: false,
        })
    }

    async fn do_restart(&self, spec: &ServiceSpec, lock: &LifecycleLock<'_>) -> LifecycleResult {
        let stopped = self.do_stop(spec, lock).await?;

        tokio::time::sleep(self.timings.settle_delay).await;

        let started = self.do_start(spec, lock).await?;
        Ok(LifecycleOutcome {
            op: LifecycleOp::Restart,
            stdout: format!("{}{}", stopped.stdout, started.stdout),
            ..started
        })
    }
}

/// Removes a pending operation when its task finishes or unwinds
struct PendingSlot {
    pending: Arc<StdMutex<PendingOps>>,
    key: PendingKey,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pending.remove(&self.key);
    }
}

fn status_view(spec: &ServiceSpec, observed: Observation, operation: Option<LifecycleOp>) -> ServiceStatus {
    ServiceStatus {
        status: observed.state,
        pid: observed.pid,
        healthy: observed.healthy,
        port: spec.port,
        endpoint: spec.endpoint.clone(),
        operation,
    }
}

fn outcome(
    spec: &ServiceSpec,
    op: LifecycleOp,
    pid: Option<u32>,
    stdout: String,
    already_running: bool,
) -> LifecycleOutcome {
    let observed = Observation {
        state: ServiceState::Running,
        pid,
        healthy: true,
    };
    LifecycleOutcome {
        service: spec.name,
        op,
        status: status_view(spec, observed, None),
        stdout,
        already_running,
    }
}
