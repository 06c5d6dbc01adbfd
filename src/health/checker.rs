//! Backend connection status aggregation.
//!
//! # Responsibilities
//! - Track every live backend connection while its pump runs
//! - Probe all tracked connections and fold the results into one verdict
//! - Evict (cancel) connections that fail `max_failed_count` probes in a row
//! - Collapse concurrent checks onto a single in-flight pass
//!
//! # Design Decisions
//! - The registry mutex is never held across a `status()` call; a pass snapshots the
//!   registry, probes concurrently, then re-locks to apply the outcomes
//! - Every probe is bounded by `probe_timeout` so one hanging backend cannot stall
//!   the verdict for the others
//! - Outcomes only touch the registration that was probed; a connection removed or
//!   replaced mid-pass is left alone
//! - Eviction callbacks run after the registry lock is released
//! - A pass runs as its own task, so it finishes even when every caller gives up

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};

use crate::backend::Statuser;
use crate::health::state::{HealthState, FAILING_ACTION, FAILING_IMPACT};
use crate::observability::metrics;

type EvictFn = Box<dyn Fn() + Send + Sync>;
type SharedPass = Shared<BoxFuture<'static, CheckResult>>;

struct StatusConnection {
    serial: u64,
    conn: Arc<dyn Statuser>,
    cancel: EvictFn,
    failed_count: u32,
    evicted: bool,
}

#[derive(Default)]
struct Registry {
    conns: HashMap<String, StatusConnection>,
    next_serial: u64,
}

#[derive(Default)]
struct Inflight {
    next_pass: u64,
    current: Option<(u64, SharedPass)>,
}

struct Inner {
    registry: Mutex<Registry>,
    inflight: Mutex<Inflight>,
    max_failed_count: u32,
    probe_timeout: Duration,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().expect("status registry mutex poisoned")
    }

    fn inflight(&self) -> MutexGuard<'_, Inflight> {
        self.inflight.lock().expect("status inflight mutex poisoned")
    }
}

/// Outcome of one aggregate pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
    pub working: usize,
    pub total: usize,
    pub problems: Vec<String>,
}

impl CheckResult {
    /// A pass that died before reporting; classified as unhealthy.
    fn aborted(problem: String) -> Self {
        Self {
            working: 0,
            total: 1,
            problems: vec![format!("status check aborted: {problem}")],
        }
    }

    /// Classify the pass.
    pub fn health(&self) -> HealthState {
        if self.total == 0 {
            return HealthState::healthy("no active connections");
        }

        let conns = format!(
            "{}/{} backend connections working;",
            self.working, self.total
        );
        let output = format!("{}{}", conns, self.problems.join(", "));

        if self.working * 2 < self.total {
            HealthState::Unhealthy {
                output,
                action: FAILING_ACTION.to_string(),
                impact: FAILING_IMPACT.to_string(),
            }
        } else if self.working != self.total || !self.problems.is_empty() {
            HealthState::Degraded {
                output,
                action: FAILING_ACTION.to_string(),
            }
        } else {
            HealthState::healthy(conns)
        }
    }
}

enum Observation {
    Working(Vec<String>),
    Failing(Vec<String>),
}

/// Registry of live backend connections plus the aggregate health policy.
///
/// Cloning shares the registry; construct one per server and hand clones to every
/// factory that tracks connections.
#[derive(Clone)]
pub struct StatusChecker {
    inner: Arc<Inner>,
}

impl StatusChecker {
    pub fn new(max_failed_count: u32, probe_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::default()),
                inflight: Mutex::new(Inflight::default()),
                max_failed_count: max_failed_count.max(1),
                probe_timeout,
            }),
        }
    }

    /// Track `conn` under `id`, replacing any previous registration with that id.
    ///
    /// `cancel` is invoked at most once, when the connection crosses the failure
    /// threshold.
    pub fn register_statuser(
        &self,
        id: impl Into<String>,
        conn: Arc<dyn Statuser>,
        cancel: impl Fn() + Send + Sync + 'static,
    ) {
        let id = id.into();
        let tracked = {
            let mut registry = self.inner.registry();
            let serial = registry.next_serial;
            registry.next_serial += 1;
            registry.conns.insert(
                id.clone(),
                StatusConnection {
                    serial,
                    conn,
                    cancel: Box::new(cancel),
                    failed_count: 0,
                    evicted: false,
                },
            );
            registry.conns.len()
        };
        metrics::set_tracked_connections(tracked);
        tracing::debug!(id = %id, tracked, "Connection registered for health checks");
    }

    /// Stop tracking `id`. Unknown ids are ignored.
    pub fn remove_statuser(&self, id: &str) {
        let (removed, tracked) = {
            let mut registry = self.inner.registry();
            let removed = registry.conns.remove(id).is_some();
            (removed, registry.conns.len())
        };
        if removed {
            metrics::set_tracked_connections(tracked);
            tracing::debug!(id = %id, tracked, "Connection removed from health checks");
        }
    }

    /// Register and return a guard that removes the registration when dropped.
    pub fn track(
        &self,
        id: impl Into<String>,
        conn: Arc<dyn Statuser>,
        cancel: impl Fn() + Send + Sync + 'static,
    ) -> StatusGuard {
        let id = id.into();
        self.register_statuser(id.clone(), conn, cancel);
        StatusGuard {
            checker: self.clone(),
            id,
        }
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.inner.registry().conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.registry().conns.contains_key(id)
    }

    /// Probe every tracked connection and classify the result.
    pub async fn check_status(&self) -> HealthState {
        self.check().await.health()
    }

    /// Run a pass, or join the one already in flight.
    pub async fn check(&self) -> CheckResult {
        let pass = {
            let mut inflight = self.inner.inflight();
            let joined = inflight.current.as_ref().map(|(_, pass)| pass.clone());
            match joined {
                Some(pass) => pass,
                None => {
                    let pass_id = inflight.next_pass;
                    inflight.next_pass += 1;
                    let task = tokio::spawn(run_pass(self.inner.clone(), pass_id));
                    let pass = async move {
                        task.await.unwrap_or_else(|e| {
                            tracing::error!(error = %e, "Status check pass failed");
                            CheckResult::aborted(e.to_string())
                        })
                    }
                    .boxed()
                    .shared();
                    inflight.current = Some((pass_id, pass.clone()));
                    pass
                }
            }
        };
        pass.await
    }
}

/// Clears the in-flight slot when its pass ends, even by panic.
struct PassSlot {
    inner: Arc<Inner>,
    pass_id: u64,
}

impl Drop for PassSlot {
    fn drop(&mut self) {
        let mut inflight = self.inner.inflight();
        if matches!(&inflight.current, Some((id, _)) if *id == self.pass_id) {
            inflight.current = None;
        }
    }
}

async fn run_pass(inner: Arc<Inner>, pass_id: u64) -> CheckResult {
    let _slot = PassSlot {
        inner: inner.clone(),
        pass_id,
    };
    let snapshot: Vec<(String, u64, Arc<dyn Statuser>)> = inner
        .registry()
        .conns
        .iter()
        .map(|(id, c)| (id.clone(), c.serial, c.conn.clone()))
        .collect();

    let result = if snapshot.is_empty() {
        CheckResult::default()
    } else {
        let probes = snapshot
            .iter()
            .map(|(_, _, conn)| probe(conn.clone(), inner.probe_timeout));
        let observations = join_all(probes).await;
        apply(&inner, &snapshot, observations)
    };
    result
}

async fn probe(conn: Arc<dyn Statuser>, timeout: Duration) -> Observation {
    match tokio::time::timeout(timeout, conn.status()).await {
        Ok(Ok(status)) if status.working => Observation::Working(status.problems),
        Ok(Ok(status)) => Observation::Failing(status.problems),
        Ok(Err(e)) => Observation::Failing(vec![e.to_string()]),
        Err(_) => Observation::Failing(vec![format!(
            "status probe timed out after {}ms",
            timeout.as_millis()
        )]),
    }
}

fn apply(
    inner: &Inner,
    snapshot: &[(String, u64, Arc<dyn Statuser>)],
    observations: Vec<Observation>,
) -> CheckResult {
    let mut result = CheckResult {
        total: snapshot.len(),
        ..CheckResult::default()
    };
    let mut evictions = Vec::new();

    {
        let mut registry = inner.registry();
        for ((id, serial, _), observation) in snapshot.iter().zip(observations) {
            let record = registry
                .conns
                .get_mut(id)
                .filter(|record| record.serial == *serial);

            match observation {
                Observation::Working(problems) => {
                    result.working += 1;
                    result.problems.extend(problems);
                    if let Some(record) = record {
                        record.failed_count = 0;
                    }
                }
                Observation::Failing(problems) => {
                    result.problems.extend(problems);
                    let Some(record) = record else { continue };
                    record.failed_count += 1;
                    if record.failed_count >= inner.max_failed_count && !record.evicted {
                        record.evicted = true;
                        tracing::warn!(
                            id = %id,
                            failed_checks = record.failed_count,
                            "Evicting unhealthy backend connection"
                        );
                        evictions.push(id.clone());
                    }
                }
            }
        }

        // Run callbacks outside the lock; they may deregister synchronously.
        let callbacks: Vec<EvictFn> = evictions
            .iter()
            .filter_map(|id| {
                let record = registry.conns.get_mut(id)?;
                Some(std::mem::replace(
                    &mut record.cancel,
                    Box::new(|| {}) as EvictFn,
                ))
            })
            .collect();
        drop(registry);

        for cancel in callbacks {
            cancel();
            metrics::record_eviction();
        }
    }

    result
}

/// Removes its registration from the checker when dropped.
pub struct StatusGuard {
    checker: StatusChecker,
    id: String,
}

impl StatusGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for StatusGuard {
    fn drop(&mut self) {
        self.checker.remove_statuser(&self.id);
    }
}
