//! Deployment scheduler for the Bosun control plane.
//!
//! [`DeploymentScheduler`] owns every status transition a deployment can
//! make.  Given a fresh or completed deployment event it decides to admit,
//! queue, or preempt under a priority-plus-aging policy, keeping the cluster
//! resource ledger consistent across concurrent operations.
//!
//! The pieces:
//!
//! | Concern | Where |
//! |---|---|
//! | Resource accounting | [`ledger::ResourceLedger`] |
//! | Dependency gate | `dependency_satisfied` (predecessor must be COMPLETED) |
//! | Priority score | [`priority::priority_score`] — tier-dominated, bounded aging |
//! | Pending queue | [`queue::PendingQueues`] — score-ordered, FIFO in ties |
//! | Victim selection | [`preemption::plan_victims`] |
//!
//! # Concurrency
//! Every operation touching cluster `C` — submission, completion,
//! cancellation, queue drain — runs under `C`'s async mutex, acquired via
//! [`ClusterLocks`].  Different clusters proceed independently.  This single
//! serialization point is what makes check-then-debit atomic, keeps the
//! preemption planner's snapshot stable through execution, and gives queue
//! drain its monotonicity argument.
//!
//! # Example
//! ```rust,ignore
//! let scheduler = DeploymentScheduler::new(store, ledger, queues, clock);
//! let outcome = scheduler.schedule(deployment_id).await?;
//! ```

pub mod error;
pub mod ledger;
pub mod preemption;
pub mod priority;
pub mod queue;

pub use error::ScheduleError;
pub use ledger::{DebitOutcome, ResourceLedger};
pub use queue::PendingQueues;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::cluster::ClusterId;
use crate::deployment::{
    CompletionOutcome, Deployment, DeploymentId, DeploymentStatus, PriorityTier,
};
use crate::store::DeploymentStore;

use priority::priority_score;

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// What the scheduler decided for one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Debited and RUNNING.
    Admitted,
    /// Waiting in the pending queue (insufficient resources or an
    /// unsatisfied dependency).
    Deferred,
    /// Permanently failed — the target cluster does not exist.
    Failed,
}

// ── Per-cluster locks ─────────────────────────────────────────────────────────

/// Lazily created async mutex per cluster.  The map-level std mutex is held
/// only long enough to clone the `Arc`.
#[derive(Debug, Default)]
struct ClusterLocks {
    locks: StdMutex<HashMap<ClusterId, Arc<AsyncMutex<()>>>>,
}

impl ClusterLocks {
    fn for_cluster(&self, id: ClusterId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("cluster lock map poisoned");
        locks.entry(id).or_default().clone()
    }
}

// ── DeploymentScheduler ───────────────────────────────────────────────────────

/// The admission decision engine.  Owns no deployment state itself — the
/// store is the source of truth, the ledger tracks capacity, the queues are
/// an advisory cache — but it is the only writer of status transitions.
pub struct DeploymentScheduler {
    store: Arc<DeploymentStore>,
    ledger: Arc<ResourceLedger>,
    queues: Arc<PendingQueues>,
    clock: Arc<dyn Clock>,
    locks: ClusterLocks,
}

impl DeploymentScheduler {
    pub fn new(
        store: Arc<DeploymentStore>,
        ledger: Arc<ResourceLedger>,
        queues: Arc<PendingQueues>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            ledger,
            queues,
            clock,
            locks: ClusterLocks::default(),
        }
    }

    /// The scheduler's time source.  Submissions stamp `created_at` through
    /// this so the aging bonus and every transition timestamp share one
    /// clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ── Public entry points ───────────────────────────────────────────────────

    /// Try to place a PENDING (or re-queued) deployment on its cluster.
    ///
    /// Runs the full admission ladder under the cluster lock: dependency
    /// gate, immediate debit, preemption for HIGH/CRITICAL, then enqueue.
    pub async fn schedule(&self, id: DeploymentId) -> Result<ScheduleOutcome, ScheduleError> {
        let deployment = self
            .store
            .get(id)
            .ok_or(ScheduleError::DeploymentMissing { deployment_id: id })?;

        let lock = self.locks.for_cluster(deployment.cluster_id);
        let _guard = lock.lock().await;
        self.try_schedule_locked(id)
    }

    /// Record the terminal outcome the job-runtime agent observed for a
    /// RUNNING deployment, credit its resources back, and drain the cluster
    /// queue.
    ///
    /// Delivering a completion for a deployment that is not RUNNING (double
    /// delivery, completion racing a cancel) is an idempotent no-op that
    /// returns the row unchanged.
    pub async fn report_completion(
        &self,
        id: DeploymentId,
        outcome: CompletionOutcome,
    ) -> Result<Deployment, ScheduleError> {
        let deployment = self
            .store
            .get(id)
            .ok_or(ScheduleError::DeploymentMissing { deployment_id: id })?;

        let lock = self.locks.for_cluster(deployment.cluster_id);
        let _guard = lock.lock().await;

        // Reload under the lock — the pre-lock read only located the cluster.
        let mut deployment = self
            .store
            .get(id)
            .ok_or(ScheduleError::DeploymentMissing { deployment_id: id })?;

        if deployment.status != DeploymentStatus::Running {
            debug!(
                deployment = deployment.id,
                status = %deployment.status,
                "completion for non-running deployment ignored"
            );
            return Ok(deployment);
        }

        self.finish_locked(&mut deployment, outcome.status())?;
        self.drain_locked(deployment.cluster_id)?;
        drop(_guard);

        if outcome == CompletionOutcome::Completed {
            self.reprocess_dependents(&deployment).await?;
        }

        Ok(self.store.get(id).unwrap_or(deployment))
    }

    /// Cancel a deployment.  Terminal deployments are left alone and `false`
    /// is returned; RUNNING ones are finished as FAILED (crediting the
    /// ledger and draining); everything else transitions straight to FAILED
    /// and its queue entry is discarded lazily on the next pop.
    pub async fn cancel(&self, id: DeploymentId) -> Result<bool, ScheduleError> {
        let Some(deployment) = self.store.get(id) else {
            return Ok(false);
        };

        let lock = self.locks.for_cluster(deployment.cluster_id);
        let _guard = lock.lock().await;

        let Some(mut deployment) = self.store.get(id) else {
            return Ok(false);
        };

        match deployment.status {
            DeploymentStatus::Completed | DeploymentStatus::Failed => Ok(false),
            DeploymentStatus::Running => {
                self.finish_locked(&mut deployment, DeploymentStatus::Failed)?;
                self.drain_locked(deployment.cluster_id)?;
                Ok(true)
            }
            DeploymentStatus::Pending | DeploymentStatus::Queued | DeploymentStatus::Preempted => {
                deployment.completed_at = Some(self.clock.now());
                self.transition(&mut deployment, DeploymentStatus::Failed)?;
                self.store.save(&deployment);
                info!(deployment = deployment.id, "cancelled before running");
                Ok(true)
            }
        }
    }

    /// Rebuild every cluster's pending queue from the deployment table.
    ///
    /// The queue is a cache; after a restart (or a lost queue backend) the
    /// QUEUED rows alone are enough to reconstruct it.  Scores are
    /// recomputed at the current instant, which is also where the aging
    /// bonus of long-waiting deployments materializes.
    pub async fn recover_queues(&self) {
        for cluster in self.ledger.all() {
            let lock = self.locks.for_cluster(cluster.id);
            let _guard = lock.lock().await;

            let now = self.clock.now();
            let queued = self.store.queued_on(cluster.id);
            let entries: Vec<(DeploymentId, f64)> = queued
                .iter()
                .map(|d| (d.id, priority_score(d, now)))
                .collect();
            if !entries.is_empty() {
                info!(
                    cluster = cluster.id,
                    entries = entries.len(),
                    "rebuilt pending queue from deployment table"
                );
            }
            self.queues.rebuild(cluster.id, entries);
        }
    }

    // ── Admission ladder (cluster lock held) ──────────────────────────────────

    fn try_schedule_locked(&self, id: DeploymentId) -> Result<ScheduleOutcome, ScheduleError> {
        let mut deployment = self
            .store
            .get(id)
            .ok_or(ScheduleError::DeploymentMissing { deployment_id: id })?;

        if !matches!(
            deployment.status,
            DeploymentStatus::Pending | DeploymentStatus::Queued
        ) {
            return Err(ScheduleError::IllegalTransition {
                deployment_id: deployment.id,
                from: deployment.status,
                to: DeploymentStatus::Running,
            });
        }

        // 1. The target cluster must exist; a vanished cluster fails the
        //    deployment permanently.
        if !self.ledger.contains(deployment.cluster_id) {
            warn!(
                deployment = deployment.id,
                cluster = deployment.cluster_id,
                "target cluster not registered — failing deployment"
            );
            deployment.completed_at = Some(self.clock.now());
            self.transition(&mut deployment, DeploymentStatus::Failed)?;
            self.store.save(&deployment);
            return Ok(ScheduleOutcome::Failed);
        }

        // 2. Dependency gate.
        if !self.dependency_satisfied(&deployment) {
            debug!(
                deployment = deployment.id,
                predecessor = ?deployment.depends_on,
                "dependency not satisfied — deferring"
            );
            self.defer_locked(&mut deployment)?;
            return Ok(ScheduleOutcome::Deferred);
        }

        // 3. Immediate admission.
        if self.ledger.try_debit(deployment.cluster_id, &deployment.requirements)?
            == DebitOutcome::Debited
        {
            self.admit_locked(&mut deployment)?;
            return Ok(ScheduleOutcome::Admitted);
        }

        // 4. Preemption, for HIGH and CRITICAL demanders only.
        if deployment.priority >= PriorityTier::High {
            if self.try_preempt_locked(&deployment)? {
                match self
                    .ledger
                    .try_debit(deployment.cluster_id, &deployment.requirements)?
                {
                    DebitOutcome::Debited => {
                        self.admit_locked(&mut deployment)?;
                        return Ok(ScheduleOutcome::Admitted);
                    }
                    // The planner guarantees coverage; reaching this arm
                    // means the snapshot was violated mid-plan.
                    DebitOutcome::Insufficient => {
                        return Err(ScheduleError::PreemptionShortfall {
                            deployment_id: deployment.id,
                            cluster_id: deployment.cluster_id,
                        });
                    }
                }
            }
        }

        // 5. Out of options — wait in line.
        self.defer_locked(&mut deployment)?;
        Ok(ScheduleOutcome::Deferred)
    }

    /// Plan and execute a preemption for `demander`.  Returns `true` when a
    /// feasible victim set was evicted (each victim PREEMPTED, credited, and
    /// re-enqueued), `false` when no plan exists.
    fn try_preempt_locked(&self, demander: &Deployment) -> Result<bool, ScheduleError> {
        let running = self.store.running_on(demander.cluster_id);
        let (available, _) = self
            .ledger
            .snapshot(demander.cluster_id)
            .ok_or(ScheduleError::ClusterMissing {
                cluster_id: demander.cluster_id,
            })?;

        let Some(plan) = preemption::plan_victims(
            &running,
            &available,
            &demander.requirements,
            demander.priority,
        ) else {
            debug!(
                deployment = demander.id,
                cluster = demander.cluster_id,
                "no feasible preemption plan"
            );
            return Ok(false);
        };

        for victim_id in &plan.victims {
            let mut victim =
                self.store
                    .get(*victim_id)
                    .ok_or(ScheduleError::DeploymentMissing {
                        deployment_id: *victim_id,
                    })?;
            self.ledger.credit(victim.cluster_id, &victim.requirements)?;
            self.transition(&mut victim, DeploymentStatus::Preempted)?;
            victim.completed_at = None;
            self.transition(&mut victim, DeploymentStatus::Queued)?;
            self.store.save(&victim);

            let score = priority_score(&victim, self.clock.now());
            self.queues.push(victim.cluster_id, victim.id, score);

            info!(
                victim = victim.id,
                victim_tier = %victim.priority,
                demander = demander.id,
                demander_tier = %demander.priority,
                "✗ preempted and re-enqueued"
            );
        }

        Ok(true)
    }

    /// Debit already done — mark the deployment RUNNING with concrete
    /// timestamps.
    fn admit_locked(&self, deployment: &mut Deployment) -> Result<(), ScheduleError> {
        let now = self.clock.now();
        deployment.scheduled_at = Some(now);
        deployment.started_at = Some(now);
        self.transition(deployment, DeploymentStatus::Running)?;
        self.store.save(deployment);
        info!(
            deployment = deployment.id,
            cluster = deployment.cluster_id,
            tier = %deployment.priority,
            "✓ admitted"
        );
        Ok(())
    }

    /// Park the deployment in the pending queue with a fresh score.  PENDING
    /// rows transition to QUEUED; rows popped off the queue during a drain
    /// are already QUEUED and are simply re-enqueued.
    fn defer_locked(&self, deployment: &mut Deployment) -> Result<(), ScheduleError> {
        if deployment.status == DeploymentStatus::Pending {
            self.transition(deployment, DeploymentStatus::Queued)?;
            self.store.save(deployment);
        }
        let score = priority_score(deployment, self.clock.now());
        self.queues.push(deployment.cluster_id, deployment.id, score);
        debug!(
            deployment = deployment.id,
            cluster = deployment.cluster_id,
            score = score,
            "deferred to pending queue"
        );
        Ok(())
    }

    /// Credit the ledger and move a RUNNING deployment to its terminal
    /// state.  Caller holds the cluster lock and has verified RUNNING.
    fn finish_locked(
        &self,
        deployment: &mut Deployment,
        terminal: DeploymentStatus,
    ) -> Result<(), ScheduleError> {
        self.ledger
            .credit(deployment.cluster_id, &deployment.requirements)?;
        deployment.completed_at = Some(self.clock.now());
        self.transition(deployment, terminal)?;
        self.store.save(deployment);
        info!(
            deployment = deployment.id,
            cluster = deployment.cluster_id,
            status = %deployment.status,
            "finished"
        );
        Ok(())
    }

    // ── Queue drain ───────────────────────────────────────────────────────────

    /// Pop waiters in score order and try each until one defers.
    ///
    /// A deferral means even the highest-priority waiter cannot be admitted,
    /// so no lower-scored waiter can either — the entry was already
    /// re-pushed by `defer_locked` and the drain stops.  Entries whose
    /// deployment is gone or no longer QUEUED are stale cache and are
    /// silently discarded.
    fn drain_locked(&self, cluster_id: ClusterId) -> Result<(), ScheduleError> {
        let mut admitted = 0usize;
        while let Some(entry) = self.queues.pop_highest(cluster_id) {
            let Some(deployment) = self.store.get(entry.deployment_id) else {
                debug!(entry = entry.deployment_id, "stale queue entry discarded");
                continue;
            };
            if deployment.status != DeploymentStatus::Queued {
                debug!(
                    entry = entry.deployment_id,
                    status = %deployment.status,
                    "stale queue entry discarded"
                );
                continue;
            }

            match self.try_schedule_locked(deployment.id)? {
                ScheduleOutcome::Admitted => admitted += 1,
                ScheduleOutcome::Deferred => break,
                ScheduleOutcome::Failed => continue,
            }
        }
        if admitted > 0 {
            info!(cluster = cluster_id, admitted = admitted, "queue drained");
        }
        Ok(())
    }

    /// Reprocess clusters that host deployments waiting on `completed`.
    ///
    /// The completion drain already covered `completed`'s own cluster;
    /// dependents elsewhere get their cluster drained here, one lock at a
    /// time (never nested, so lock order cannot deadlock).
    async fn reprocess_dependents(&self, completed: &Deployment) -> Result<(), ScheduleError> {
        let dependent_clusters: BTreeSet<ClusterId> = self
            .store
            .dependents_of(completed.id)
            .into_iter()
            .filter(|d| {
                matches!(
                    d.status,
                    DeploymentStatus::Pending | DeploymentStatus::Queued
                )
            })
            .map(|d| d.cluster_id)
            .filter(|c| *c != completed.cluster_id)
            .collect();

        for cluster_id in dependent_clusters {
            let lock = self.locks.for_cluster(cluster_id);
            let _guard = lock.lock().await;
            self.drain_locked(cluster_id)?;
        }
        Ok(())
    }

    // ── Small helpers ─────────────────────────────────────────────────────────

    /// Predecessor gate: no predecessor, or predecessor exists and is
    /// COMPLETED.  A FAILED or deleted predecessor is permanently `false`.
    fn dependency_satisfied(&self, deployment: &Deployment) -> bool {
        match deployment.depends_on {
            None => true,
            Some(predecessor_id) => self
                .store
                .get(predecessor_id)
                .map(|p| p.status == DeploymentStatus::Completed)
                .unwrap_or(false),
        }
    }

    /// Checked status transition — refuses anything outside the state graph
    /// before any write happens.
    fn transition(
        &self,
        deployment: &mut Deployment,
        to: DeploymentStatus,
    ) -> Result<(), ScheduleError> {
        if !deployment.status.can_transition_to(to) {
            return Err(ScheduleError::IllegalTransition {
                deployment_id: deployment.id,
                from: deployment.status,
                to,
            });
        }
        deployment.status = to;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::clock::testing::ManualClock;
    use crate::resources::ResourceVector;
    use crate::store::NewDeployment;

    // ── Test rig ──────────────────────────────────────────────────────────────

    struct Rig {
        store: Arc<DeploymentStore>,
        ledger: Arc<ResourceLedger>,
        queues: Arc<PendingQueues>,
        clock: Arc<ManualClock>,
        scheduler: DeploymentScheduler,
    }

    impl Rig {
        fn new() -> Self {
            let store = Arc::new(DeploymentStore::new());
            let ledger = Arc::new(ResourceLedger::new());
            let queues = Arc::new(PendingQueues::new());
            let clock = Arc::new(ManualClock::new());
            let scheduler = DeploymentScheduler::new(
                store.clone(),
                ledger.clone(),
                queues.clone(),
                clock.clone(),
            );
            Self {
                store,
                ledger,
                queues,
                clock,
                scheduler,
            }
        }

        fn cluster(&self, ram_gb: f64, cpu_cores: f64, gpu_count: u32) -> ClusterId {
            self.ledger.register(
                "test-cluster",
                "acme",
                ResourceVector::new(ram_gb, cpu_cores, gpu_count),
            )
        }

        fn insert(
            &self,
            cluster_id: ClusterId,
            ram_gb: f64,
            cpu_cores: f64,
            gpu_count: u32,
            priority: PriorityTier,
            depends_on: Option<DeploymentId>,
        ) -> Deployment {
            self.store.insert(
                NewDeployment {
                    name: "job".into(),
                    image: "registry.local/job:1".into(),
                    cluster_id,
                    user_id: 7,
                    requirements: ResourceVector::new(ram_gb, cpu_cores, gpu_count),
                    priority,
                    depends_on,
                },
                self.clock.now(),
            )
        }

        async fn submit(
            &self,
            cluster_id: ClusterId,
            ram_gb: f64,
            cpu_cores: f64,
            gpu_count: u32,
            priority: PriorityTier,
        ) -> (Deployment, ScheduleOutcome) {
            let d = self.insert(cluster_id, ram_gb, cpu_cores, gpu_count, priority, None);
            let outcome = self.scheduler.schedule(d.id).await.unwrap();
            (self.store.get(d.id).unwrap(), outcome)
        }

        fn status(&self, id: DeploymentId) -> DeploymentStatus {
            self.store.get(id).unwrap().status
        }

        fn avail(&self, cluster_id: ClusterId) -> ResourceVector {
            self.ledger.snapshot(cluster_id).unwrap().0
        }

        /// Capacity conservation: `avail + Σ running requirements == total`.
        fn assert_conservation(&self, cluster_id: ClusterId) {
            let (avail, total) = self.ledger.snapshot(cluster_id).unwrap();
            let mut used = ResourceVector::ZERO;
            for d in self.store.running_on(cluster_id) {
                used = used.plus(&d.requirements);
            }
            let sum = avail.plus(&used);
            assert!(
                (sum.ram_gb - total.ram_gb).abs() < 1e-9
                    && (sum.cpu_cores - total.cpu_cores).abs() < 1e-9
                    && sum.gpu_count == total.gpu_count,
                "capacity not conserved: avail {avail} + running {used} != total {total}"
            );
        }

        /// Queue–status coherence: QUEUED rows ⟺ live queue entries
        /// (stale entries for non-QUEUED rows are allowed until popped).
        fn assert_queue_coherence(&self, cluster_id: ClusterId) {
            let queued_rows: BTreeSet<DeploymentId> = self
                .store
                .queued_on(cluster_id)
                .iter()
                .map(|d| d.id)
                .collect();
            let entries: BTreeSet<DeploymentId> = self
                .queues
                .peek_all(cluster_id)
                .iter()
                .map(|e| e.deployment_id)
                .collect();
            for id in &queued_rows {
                assert!(
                    entries.contains(id),
                    "QUEUED deployment {id} has no queue entry"
                );
            }
        }
    }

    // ── Fit admission ─────────────────────────────────────────

    #[tokio::test]
    async fn fit_admission_runs_and_debits() {
        let rig = Rig::new();
        let c = rig.cluster(32.0, 8.0, 2);

        let (d1, outcome) = rig.submit(c, 4.0, 2.0, 1, PriorityTier::Medium).await;

        assert_eq!(outcome, ScheduleOutcome::Admitted);
        assert_eq!(d1.status, DeploymentStatus::Running);
        assert!(d1.started_at.is_some() && d1.scheduled_at.is_some());
        assert_eq!(rig.avail(c), ResourceVector::new(28.0, 6.0, 1));
        rig.assert_conservation(c);
    }

    // ── Queueing ──────────────────────────────────────────────

    #[tokio::test]
    async fn oversized_submission_is_queued_without_debiting() {
        let rig = Rig::new();
        let c = rig.cluster(32.0, 8.0, 2);
        rig.submit(c, 4.0, 2.0, 1, PriorityTier::Medium).await;

        let (d2, outcome) = rig.submit(c, 30.0, 6.0, 2, PriorityTier::Low).await;

        assert_eq!(outcome, ScheduleOutcome::Deferred);
        assert_eq!(d2.status, DeploymentStatus::Queued);
        let entries = rig.queues.peek_all(c);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].deployment_id, d2.id);
        assert_eq!(rig.avail(c), ResourceVector::new(28.0, 6.0, 1));
        rig.assert_queue_coherence(c);
    }

    // ── Drain on completion ───────────────────────────────────

    #[tokio::test]
    async fn completion_credits_and_drains_queue() {
        let rig = Rig::new();
        let c = rig.cluster(32.0, 8.0, 2);
        let (d1, _) = rig.submit(c, 4.0, 2.0, 1, PriorityTier::Medium).await;
        let (d2, _) = rig.submit(c, 30.0, 6.0, 2, PriorityTier::Low).await;

        let d1 = rig
            .scheduler
            .report_completion(d1.id, CompletionOutcome::Completed)
            .await
            .unwrap();

        assert_eq!(d1.status, DeploymentStatus::Completed);
        assert!(d1.completed_at.is_some());
        assert_eq!(rig.status(d2.id), DeploymentStatus::Running);
        assert!(rig.queues.is_empty(c));
        assert_eq!(rig.avail(c), ResourceVector::new(2.0, 2.0, 0));
        rig.assert_conservation(c);
    }

    // ── Preemption by CRITICAL ────────────────────────────────

    #[tokio::test]
    async fn critical_preempts_low_and_requeues_it() {
        let rig = Rig::new();
        let c = rig.cluster(8.0, 4.0, 1);
        let (a, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Low).await;
        assert_eq!(a.status, DeploymentStatus::Running);

        let (b, outcome) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Critical).await;

        assert_eq!(outcome, ScheduleOutcome::Admitted);
        assert_eq!(b.status, DeploymentStatus::Running);
        assert_eq!(rig.status(a.id), DeploymentStatus::Queued);
        assert!(rig.store.get(a.id).unwrap().completed_at.is_none());
        let entries = rig.queues.peek_all(c);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].deployment_id, a.id);
        assert_eq!(rig.avail(c), ResourceVector::ZERO);
        rig.assert_conservation(c);
    }

    // ── No preemption within a tier ───────────────────────────

    #[tokio::test]
    async fn equal_tier_demand_queues_instead_of_preempting() {
        let rig = Rig::new();
        let c = rig.cluster(8.0, 4.0, 1);
        let (a, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::High).await;

        let (b, outcome) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::High).await;

        assert_eq!(outcome, ScheduleOutcome::Deferred);
        assert_eq!(b.status, DeploymentStatus::Queued);
        assert_eq!(rig.status(a.id), DeploymentStatus::Running);
        assert_eq!(rig.avail(c), ResourceVector::ZERO);
        rig.assert_conservation(c);
    }

    // ── Dependency gate ───────────────────────────────────────

    #[tokio::test]
    async fn dependent_waits_for_predecessor_completion() {
        let rig = Rig::new();
        let c = rig.cluster(32.0, 8.0, 2);
        let (p, _) = rig.submit(c, 2.0, 1.0, 0, PriorityTier::Medium).await;
        assert_eq!(p.status, DeploymentStatus::Running);

        let child = rig.insert(c, 2.0, 1.0, 0, PriorityTier::Medium, Some(p.id));
        let outcome = rig.scheduler.schedule(child.id).await.unwrap();
        assert_eq!(outcome, ScheduleOutcome::Deferred);
        assert_eq!(rig.status(child.id), DeploymentStatus::Queued);

        rig.scheduler
            .report_completion(p.id, CompletionOutcome::Completed)
            .await
            .unwrap();

        assert_eq!(rig.status(child.id), DeploymentStatus::Running);
        rig.assert_conservation(c);
    }

    #[tokio::test]
    async fn cross_cluster_dependent_is_reprocessed_on_completion() {
        let rig = Rig::new();
        let c1 = rig.cluster(8.0, 4.0, 1);
        let c2 = rig.cluster(8.0, 4.0, 1);
        let (p, _) = rig.submit(c1, 2.0, 1.0, 0, PriorityTier::Medium).await;

        let child = rig.insert(c2, 2.0, 1.0, 0, PriorityTier::Medium, Some(p.id));
        rig.scheduler.schedule(child.id).await.unwrap();
        assert_eq!(rig.status(child.id), DeploymentStatus::Queued);

        rig.scheduler
            .report_completion(p.id, CompletionOutcome::Completed)
            .await
            .unwrap();

        assert_eq!(rig.status(child.id), DeploymentStatus::Running);
        rig.assert_conservation(c2);
    }

    #[tokio::test]
    async fn failed_predecessor_blocks_dependent_permanently() {
        let rig = Rig::new();
        let c = rig.cluster(32.0, 8.0, 2);
        let (p, _) = rig.submit(c, 2.0, 1.0, 0, PriorityTier::Medium).await;

        let child = rig.insert(c, 2.0, 1.0, 0, PriorityTier::Medium, Some(p.id));
        rig.scheduler.schedule(child.id).await.unwrap();

        rig.scheduler
            .report_completion(p.id, CompletionOutcome::Failed)
            .await
            .unwrap();

        // The drain popped the child, found its dependency unsatisfiable,
        // and re-queued it; it can only leave via cancel.
        assert_eq!(rig.status(child.id), DeploymentStatus::Queued);
        assert!(!rig.queues.is_empty(c));
        assert!(rig.scheduler.cancel(child.id).await.unwrap());
        assert_eq!(rig.status(child.id), DeploymentStatus::Failed);
    }

    // ── Aging within a tier ───────────────────────────────────

    #[tokio::test]
    async fn older_deployment_is_admitted_first_within_a_tier() {
        let rig = Rig::new();
        let c = rig.cluster(8.0, 4.0, 1);
        // Fill the cluster so both LOW submissions queue.
        let (filler, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Medium).await;

        let (x, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Low).await;
        rig.clock.advance(Duration::minutes(90));
        let (y, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Low).await;
        assert_eq!(rig.status(x.id), DeploymentStatus::Queued);
        assert_eq!(rig.status(y.id), DeploymentStatus::Queued);

        // A reprocess sweep refreshes scores: x now carries a 15-point aging
        // bonus over y.
        rig.scheduler.recover_queues().await;
        let entries = rig.queues.peek_all(c);
        assert_eq!(entries[0].deployment_id, x.id);
        assert!(entries[0].score > entries[1].score);

        // Only one slot frees up — the older waiter takes it.
        rig.scheduler
            .report_completion(filler.id, CompletionOutcome::Completed)
            .await
            .unwrap();
        assert_eq!(rig.status(x.id), DeploymentStatus::Running);
        assert_eq!(rig.status(y.id), DeploymentStatus::Queued);
    }

    #[tokio::test]
    async fn preempted_deployment_keeps_aging_from_original_creation() {
        let rig = Rig::new();
        let c = rig.cluster(8.0, 4.0, 1);
        let (a, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Low).await;

        rig.clock.advance(Duration::hours(2));
        let (b, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Critical).await;
        assert_eq!(b.status, DeploymentStatus::Running);

        // Re-enqueued with two hours of age — 20 bonus points, not zero.
        let entries = rig.queues.peek_all(c);
        assert_eq!(entries[0].deployment_id, a.id);
        assert!((entries[0].score - 1020.0).abs() < 1e-9);
    }

    // ── Cancel while queued ───────────────────────────────────

    #[tokio::test]
    async fn cancelled_queued_deployment_is_skipped_by_drain() {
        let rig = Rig::new();
        let c = rig.cluster(8.0, 4.0, 1);
        let (filler, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Medium).await;
        let (q, _) = rig.submit(c, 4.0, 2.0, 0, PriorityTier::Medium).await;
        assert_eq!(q.status, DeploymentStatus::Queued);

        assert!(rig.scheduler.cancel(q.id).await.unwrap());
        assert_eq!(rig.status(q.id), DeploymentStatus::Failed);
        // Entry is still cached; the next drain discards it.
        assert_eq!(rig.queues.len(c), 1);

        rig.scheduler
            .report_completion(filler.id, CompletionOutcome::Completed)
            .await
            .unwrap();
        assert!(rig.queues.is_empty(c));
        assert_eq!(rig.status(q.id), DeploymentStatus::Failed);
        assert_eq!(rig.avail(c), ResourceVector::new(8.0, 4.0, 1));
    }

    // ── Idempotence and terminal-state behavior ──────────────────────────────

    #[tokio::test]
    async fn double_completion_is_a_no_op_and_credits_once() {
        let rig = Rig::new();
        let c = rig.cluster(32.0, 8.0, 2);
        let (d, _) = rig.submit(c, 4.0, 2.0, 1, PriorityTier::Medium).await;

        rig.scheduler
            .report_completion(d.id, CompletionOutcome::Completed)
            .await
            .unwrap();
        let after_first = rig.avail(c);

        let second = rig
            .scheduler
            .report_completion(d.id, CompletionOutcome::Failed)
            .await
            .unwrap();

        assert_eq!(second.status, DeploymentStatus::Completed, "outcome unchanged");
        assert_eq!(rig.avail(c), after_first, "no second credit");
    }

    #[tokio::test]
    async fn completion_of_unknown_deployment_is_an_error() {
        let rig = Rig::new();
        rig.cluster(8.0, 4.0, 1);
        let err = rig
            .scheduler
            .report_completion(99, CompletionOutcome::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::DeploymentMissing { .. }));
    }

    #[tokio::test]
    async fn cancel_is_false_for_terminal_and_unknown_deployments() {
        let rig = Rig::new();
        let c = rig.cluster(32.0, 8.0, 2);
        let (d, _) = rig.submit(c, 4.0, 2.0, 1, PriorityTier::Medium).await;
        rig.scheduler
            .report_completion(d.id, CompletionOutcome::Completed)
            .await
            .unwrap();

        assert!(!rig.scheduler.cancel(d.id).await.unwrap());
        assert!(!rig.scheduler.cancel(12345).await.unwrap());
        assert_eq!(rig.status(d.id), DeploymentStatus::Completed);
    }

    #[tokio::test]
    async fn cancelling_running_deployment_credits_and_drains() {
        let rig = Rig::new();
        let c = rig.cluster(8.0, 4.0, 1);
        let (a, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Medium).await;
        let (waiting, _) = rig.submit(c, 4.0, 2.0, 0, PriorityTier::Medium).await;

        assert!(rig.scheduler.cancel(a.id).await.unwrap());

        assert_eq!(rig.status(a.id), DeploymentStatus::Failed);
        assert!(rig.store.get(a.id).unwrap().completed_at.is_some());
        assert_eq!(rig.status(waiting.id), DeploymentStatus::Running);
        rig.assert_conservation(c);
    }

    // ── Missing cluster ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn missing_cluster_fails_deployment_permanently() {
        let rig = Rig::new();
        let d = rig.insert(404, 1.0, 1.0, 0, PriorityTier::Medium, None);
        let outcome = rig.scheduler.schedule(d.id).await.unwrap();

        assert_eq!(outcome, ScheduleOutcome::Failed);
        let d = rig.store.get(d.id).unwrap();
        assert_eq!(d.status, DeploymentStatus::Failed);
        assert!(d.completed_at.is_some());
    }

    // ── Preemption edge cases ────────────────────────────────────────────────

    #[tokio::test]
    async fn infeasible_preemption_leaves_victims_running() {
        let rig = Rig::new();
        let c = rig.cluster(8.0, 4.0, 1);
        let (a, _) = rig.submit(c, 4.0, 2.0, 0, PriorityTier::Low).await;

        // Demands more than the whole cluster — evicting everything would
        // still not cover it, so nothing may be evicted.
        let (b, outcome) = rig.submit(c, 64.0, 32.0, 4, PriorityTier::Critical).await;

        assert_eq!(outcome, ScheduleOutcome::Deferred);
        assert_eq!(b.status, DeploymentStatus::Queued);
        assert_eq!(rig.status(a.id), DeploymentStatus::Running);
        rig.assert_conservation(c);
    }

    #[tokio::test]
    async fn medium_priority_never_preempts() {
        let rig = Rig::new();
        let c = rig.cluster(8.0, 4.0, 1);
        let (a, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Low).await;

        let (b, outcome) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Medium).await;

        assert_eq!(outcome, ScheduleOutcome::Deferred);
        assert_eq!(b.status, DeploymentStatus::Queued);
        assert_eq!(rig.status(a.id), DeploymentStatus::Running);
    }

    #[tokio::test]
    async fn preemption_evicts_minimal_count_newest_first() {
        let rig = Rig::new();
        let c = rig.cluster(8.0, 4.0, 0);
        let (old, _) = rig.submit(c, 4.0, 2.0, 0, PriorityTier::Low).await;
        rig.clock.advance(Duration::minutes(10));
        let (newer, _) = rig.submit(c, 4.0, 2.0, 0, PriorityTier::Low).await;

        // HIGH demand the size of one victim: only the newest-started LOW
        // is evicted.
        let (b, outcome) = rig.submit(c, 4.0, 2.0, 0, PriorityTier::High).await;

        assert_eq!(outcome, ScheduleOutcome::Admitted);
        assert_eq!(b.status, DeploymentStatus::Running);
        assert_eq!(rig.status(old.id), DeploymentStatus::Running);
        assert_eq!(rig.status(newer.id), DeploymentStatus::Queued);
        rig.assert_conservation(c);
    }

    // ── Drain ordering ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn drain_admits_in_priority_order_and_stops_at_first_deferral() {
        let rig = Rig::new();
        let c = rig.cluster(8.0, 4.0, 0);
        let (filler, _) = rig.submit(c, 8.0, 4.0, 0, PriorityTier::Medium).await;

        let (low, _) = rig.submit(c, 2.0, 1.0, 0, PriorityTier::Low).await;
        let (med_big, _) = rig.submit(c, 8.0, 4.0, 0, PriorityTier::Medium).await;
        assert_eq!(rig.status(low.id), DeploymentStatus::Queued);
        assert_eq!(rig.status(med_big.id), DeploymentStatus::Queued);

        rig.scheduler
            .report_completion(filler.id, CompletionOutcome::Completed)
            .await
            .unwrap();

        // The MEDIUM waiter outranks the LOW one and takes the whole
        // cluster; the drain then stops without admitting the LOW waiter
        // even though it would fit nothing anyway.
        assert_eq!(rig.status(med_big.id), DeploymentStatus::Running);
        assert_eq!(rig.status(low.id), DeploymentStatus::Queued);
        rig.assert_queue_coherence(c);
    }

    // ── Recovery ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn queue_is_rebuildable_from_deployment_table() {
        let rig = Rig::new();
        let c = rig.cluster(8.0, 4.0, 0);
        let (filler, _) = rig.submit(c, 8.0, 4.0, 0, PriorityTier::Medium).await;
        let (w1, _) = rig.submit(c, 4.0, 2.0, 0, PriorityTier::Low).await;
        let (w2, _) = rig.submit(c, 4.0, 2.0, 0, PriorityTier::Medium).await;

        // Simulate losing the queue cache.
        while rig.queues.pop_highest(c).is_some() {}
        assert!(rig.queues.is_empty(c));

        rig.scheduler.recover_queues().await;
        let entries = rig.queues.peek_all(c);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].deployment_id, w2.id, "MEDIUM waiter ranks first");

        rig.scheduler
            .report_completion(filler.id, CompletionOutcome::Completed)
            .await
            .unwrap();
        assert_eq!(rig.status(w1.id), DeploymentStatus::Running);
        assert_eq!(rig.status(w2.id), DeploymentStatus::Running);
    }

    // ── Invariant sweep over a longer interleaving ───────────────────────────

    #[tokio::test]
    async fn invariants_hold_across_a_mixed_operation_sequence() {
        let rig = Rig::new();
        let c = rig.cluster(16.0, 8.0, 2);

        let (a, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Low).await;
        let (b, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Medium).await;
        let (q1, _) = rig.submit(c, 8.0, 4.0, 0, PriorityTier::Low).await;
        rig.assert_conservation(c);
        rig.assert_queue_coherence(c);

        // CRITICAL arrival preempts the LOW runner.
        let (crit, _) = rig.submit(c, 8.0, 4.0, 1, PriorityTier::Critical).await;
        assert_eq!(rig.status(crit.id), DeploymentStatus::Running);
        assert_eq!(rig.status(a.id), DeploymentStatus::Queued);
        rig.assert_conservation(c);
        rig.assert_queue_coherence(c);

        rig.scheduler.cancel(q1.id).await.unwrap();
        rig.scheduler
            .report_completion(b.id, CompletionOutcome::Failed)
            .await
            .unwrap();
        rig.assert_conservation(c);
        rig.assert_queue_coherence(c);

        rig.scheduler
            .report_completion(crit.id, CompletionOutcome::Completed)
            .await
            .unwrap();
        rig.assert_conservation(c);
        rig.assert_queue_coherence(c);

        // Terminal states are terminal.
        assert!(!rig.scheduler.cancel(q1.id).await.unwrap());
        let done: Vec<DeploymentStatus> = [b.id, crit.id, q1.id]
            .iter()
            .map(|id| rig.status(*id))
            .collect();
        assert!(done.iter().all(|s| s.is_terminal()));
    }
}
