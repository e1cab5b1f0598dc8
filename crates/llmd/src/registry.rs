//! Service registry - static definitions plus last-known state.
//!
//! The registry is a cache of the last reconciliation, never a source of
//! truth. Entries are created once from configuration and never removed.
//! A record can only be written through a `LifecycleLock`, so every write
//! happens under the per-service lock; readers get whole cloned snapshots.

use chrono::{DateTime, Utc};
use llm_common::{LifecycleOp, ServiceName, ServiceSnapshot, ServiceState};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

/// Static definition of a managed service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: ServiceName,
    pub port: u16,
    pub health_url: String,
    pub endpoint: String,
    pub start_script: PathBuf,
    pub stop_script: PathBuf,
}

/// Mutable part of a service, as of the last committed reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRecord {
    pub state: ServiceState,
    pub pid: Option<u32>,
    /// When `state` last changed
    pub last_transition: Option<DateTime<Utc>>,
    /// When a reconciliation was last committed
    pub last_checked: Option<DateTime<Utc>>,
}

/// One registry slot
pub struct ServiceEntry {
    spec: ServiceSpec,
    record: RwLock<ServiceRecord>,
    lifecycle: Mutex<()>,
    operation: StdMutex<Option<LifecycleOp>>,
}

impl ServiceEntry {
    fn new(spec: ServiceSpec) -> Self {
        Self {
            spec,
            record: RwLock::new(ServiceRecord::default()),
            lifecycle: Mutex::new(()),
            operation: StdMutex::new(None),
        }
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    /// Copy of the current record
    pub async fn record(&self) -> ServiceRecord {
        self.record.read().await.clone()
    }

    /// Lifecycle operation currently holding the lock, if any
    pub fn operation(&self) -> Option<LifecycleOp> {
        self.operation.lock().ok().and_then(|op| *op)
    }

    pub async fn snapshot(&self) -> ServiceSnapshot {
        let record = self.record().await;
        ServiceSnapshot {
            status: record.state,
            pid: record.pid,
            last_transition: record.last_transition,
            last_checked: record.last_checked,
            operation: self.operation(),
        }
    }

    /// Wait for exclusive lifecycle access to this service
    pub async fn lock(&self) -> LifecycleLock<'_> {
        LifecycleLock {
            entry: self,
            _guard: self.lifecycle.lock().await,
        }
    }

    /// Lifecycle access without waiting; None while an operation runs
    pub fn try_lock(&self) -> Option<LifecycleLock<'_>> {
        self.lifecycle.try_lock().ok().map(|guard| LifecycleLock {
            entry: self,
            _guard: guard,
        })
    }
}

/// Proof of exclusive lifecycle access to one service
pub struct LifecycleLock<'a> {
    entry: &'a ServiceEntry,
    _guard: MutexGuard<'a, ()>,
}

impl LifecycleLock<'_> {
    /// Mark `op` as in flight until this lock is dropped
    pub fn begin(&self, op: LifecycleOp) {
        if let Ok(mut current) = self.entry.operation.lock() {
            *current = Some(op);
        }
    }

    /// Replace the record with a fresh observation
    pub async fn commit(&self, state: ServiceState, pid: Option<u32>) -> ServiceRecord {
        let now = Utc::now();
        let mut record = self.entry.record.write().await;

        if record.state != state {
            info!(
                service = %self.entry.spec.name,
                from = %record.state,
                to = %state,
                pid = ?pid,
                "Service state changed"
            );
            record.last_transition = Some(now);
        } else {
            debug!(service = %self.entry.spec.name, state = %state, "Service state unchanged");
        }

        record.state = state;
        record.pid = pid;
        record.last_checked = Some(now);
        record.clone()
    }
}

impl Drop for LifecycleLock<'_> {
    fn drop(&mut self) {
        if let Ok(mut current) = self.entry.operation.lock() {
            *current = None;
        }
    }
}

/// Registry of every managed service
pub struct ServiceRegistry {
    services: HashMap<ServiceName, ServiceEntry>,
}

impl ServiceRegistry {
    pub fn new(specs: Vec<ServiceSpec>) -> Self {
        let services: HashMap<_, _> = specs
            .into_iter()
            .map(|spec| (spec.name, ServiceEntry::new(spec)))
            .collect();

        info!(count = services.len(), "Service registry initialized");
        Self { services }
    }

    pub fn get(&self, name: ServiceName) -> Option<&ServiceEntry> {
        self.services.get(&name)
    }

    /// Registered names in stable order
    pub fn names(&self) -> Vec<ServiceName> {
        let mut names: Vec<_> = self.services.keys().copied().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.services.len()
    }
}
