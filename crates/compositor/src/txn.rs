//! Transaction manager
//!
//! Objects scheduled together form a transaction. A transaction is
//! *collecting* until the next flush, then *committed*: every member has
//! been asked to reconcile its pending state and the manager waits until
//! all members report ready, or the deadline passes. Then all members are
//! applied in the order they were added, in one go.
//!
//! An object belongs to at most one committed transaction. Scheduling an
//! object whose commit is still in flight queues it for the next
//! transaction, which starts collecting once the in-flight one is done.
//!
//! The manager only tracks keys; the caller owns the objects and drives
//! `commit`/`apply` on them, so no callbacks hold borrows of the caller.

use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Default deadline for a committed transaction
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Collecting,
    Committed,
    Done,
}

/// Result of asking an object to commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Waiting for the client; readiness arrives through `mark_ready`
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyReason {
    /// Every member reported ready
    Ready,
    /// The deadline passed with members still waiting
    Timeout,
}

/// Where `schedule_object` put an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    Collecting(TransactionId),
    /// Queued behind the in-flight transaction holding the object
    Queued,
}

/// Something that takes part in transactions
pub trait TransactionObject {
    /// What `apply` hands back, typically the replaced state
    type Applied;

    fn stringify(&self) -> String;

    /// Reconcile pending state with the client
    fn commit(&mut self) -> Readiness;

    /// Make committed state current. `still_pending` is set when the object
    /// is already scheduled for another transaction.
    fn apply(&mut self, still_pending: bool) -> Self::Applied;
}

#[derive(Debug)]
struct Transaction<K> {
    id: TransactionId,
    objects: Vec<K>,
    ready: Vec<bool>,
    deadline: Option<Instant>,
}

impl<K: PartialEq> Transaction<K> {
    fn contains(&self, object: &K) -> bool {
        self.objects.contains(object)
    }

    fn all_ready(&self) -> bool {
        self.ready.iter().all(|&r| r)
    }
}

/// One member of a transaction being applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyEntry<K> {
    pub object: K,
    /// Already scheduled again for a later transaction
    pub still_pending: bool,
}

/// A transaction that finished and must be applied by the caller, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransaction<K> {
    pub id: TransactionId,
    pub reason: ApplyReason,
    pub entries: Vec<ApplyEntry<K>>,
}

#[derive(Debug)]
pub struct TransactionManager<K> {
    timeout: Duration,
    collecting: Option<Transaction<K>>,
    /// Objects scheduled while their previous commit is in flight
    queued: Vec<K>,
    committed: VecDeque<Transaction<K>>,
    next_id: u64,
}

impl<K: Copy + Eq + Hash + fmt::Display> TransactionManager<K> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            collecting: None,
            queued: Vec::new(),
            committed: VecDeque::new(),
            next_id: 1,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Applies to transactions committed from now on
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn add_to_collecting(&mut self, object: K) -> TransactionId {
        let next_id = &mut self.next_id;
        let txn = self.collecting.get_or_insert_with(|| {
            let id = TransactionId(*next_id);
            *next_id += 1;
            Transaction {
                id,
                objects: Vec::new(),
                ready: Vec::new(),
                deadline: None,
            }
        });
        if !txn.contains(&object) {
            txn.objects.push(object);
            txn.ready.push(false);
        }
        txn.id
    }

    /// Add an object to the transaction being collected
    pub fn schedule_object(&mut self, object: K) -> Scheduled {
        if self.is_object_committed(object) {
            if !self.queued.contains(&object) {
                tracing::debug!(target: "wayscene::txn", object = %object, "object in flight, queued for next transaction");
                self.queued.push(object);
            }
            return Scheduled::Queued;
        }
        Scheduled::Collecting(self.add_to_collecting(object))
    }

    /// Whether a flush has anything to commit
    pub fn has_collecting(&self) -> bool {
        self.collecting.as_ref().is_some_and(|t| !t.objects.is_empty())
    }

    pub fn collecting_objects(&self) -> &[K] {
        self.collecting.as_ref().map_or(&[], |t| t.objects.as_slice())
    }

    /// Scheduled but not yet committed
    pub fn is_object_pending(&self, object: K) -> bool {
        self.queued.contains(&object) || self.collecting.as_ref().is_some_and(|t| t.contains(&object))
    }

    /// In a committed transaction that has not been applied yet
    pub fn is_object_committed(&self, object: K) -> bool {
        self.committed.iter().any(|t| t.contains(&object))
    }

    /// Committed transactions not applied yet
    pub fn committed_count(&self) -> usize {
        self.committed.len()
    }

    pub fn state(&self, id: TransactionId) -> TransactionState {
        if self.collecting.as_ref().is_some_and(|t| t.id == id) {
            TransactionState::Collecting
        } else if self.committed.iter().any(|t| t.id == id) {
            TransactionState::Committed
        } else {
            TransactionState::Done
        }
    }

    /// Move the collecting transaction to committed and return its members.
    ///
    /// The caller commits each member and reports readiness through
    /// [`TransactionManager::mark_ready`].
    pub fn start_commit(&mut self, now: Instant) -> Option<(TransactionId, Vec<K>)> {
        let mut txn = self.collecting.take()?;
        if txn.objects.is_empty() {
            return None;
        }
        txn.deadline = Some(now + self.timeout);
        let id = txn.id;
        let objects = txn.objects.clone();
        tracing::debug!(target: "wayscene::txn", txn = %id, objects = objects.len(), "committing transaction");
        self.committed.push_back(txn);
        Some((id, objects))
    }

    /// Record that an object of a committed transaction is ready
    pub fn mark_ready(&mut self, object: K) -> bool {
        for txn in &mut self.committed {
            if let Some(index) = txn.objects.iter().position(|o| *o == object) {
                if !txn.ready[index] {
                    tracing::trace!(target: "wayscene::txn", txn = %txn.id, object = %object, "object ready");
                }
                txn.ready[index] = true;
                return true;
            }
        }
        false
    }

    /// Earliest deadline of a committed transaction still waiting
    pub fn next_deadline(&self) -> Option<Instant> {
        self.committed
            .iter()
            .filter(|t| !t.all_ready())
            .filter_map(|t| t.deadline)
            .min()
    }

    /// Whether `apply_ready` would return anything at `now`
    pub fn has_ready(&self, now: Instant) -> bool {
        self.committed
            .iter()
            .any(|t| t.all_ready() || t.deadline.is_some_and(|d| now >= d))
    }

    /// Remove every transaction that is ready or past its deadline and
    /// return them in commit order. The caller must apply all entries
    /// before yielding to the render loop.
    pub fn apply_ready(&mut self, now: Instant) -> Vec<AppliedTransaction<K>> {
        let mut done = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.committed.len());
        while let Some(txn) = self.committed.pop_front() {
            let reason = if txn.all_ready() {
                ApplyReason::Ready
            } else if txn.deadline.is_some_and(|d| now >= d) {
                let waiting: Vec<String> = txn
                    .objects
                    .iter()
                    .zip(&txn.ready)
                    .filter(|(_, ready)| !**ready)
                    .map(|(o, _)| o.to_string())
                    .collect();
                tracing::warn!(target: "wayscene::txn", txn = %txn.id, ?waiting, "transaction timed out, applying anyway");
                ApplyReason::Timeout
            } else {
                remaining.push_back(txn);
                continue;
            };
            done.push((txn, reason));
        }
        self.committed = remaining;

        // Objects queued behind a finished transaction join the next one.
        let queued = std::mem::take(&mut self.queued);
        for object in queued {
            if self.is_object_committed(object) {
                self.queued.push(object);
            } else {
                self.add_to_collecting(object);
            }
        }

        done.into_iter()
            .map(|(txn, reason)| {
                tracing::debug!(target: "wayscene::txn", txn = %txn.id, ?reason, "applying transaction");
                AppliedTransaction {
                    id: txn.id,
                    reason,
                    entries: txn
                        .objects
                        .into_iter()
                        .map(|object| ApplyEntry {
                            object,
                            still_pending: self.is_object_pending(object),
                        })
                        .collect(),
                }
            })
            .collect()
    }

    /// Drop an object from every transaction, e.g. when it is destroyed.
    ///
    /// A committed transaction stays committed with the object counted as
    /// ready.
    pub fn forget_object(&mut self, object: K) {
        if let Some(txn) = &mut self.collecting {
            if let Some(index) = txn.objects.iter().position(|o| *o == object) {
                txn.objects.remove(index);
                txn.ready.remove(index);
            }
        }
        self.queued.retain(|o| *o != object);
        for txn in &mut self.committed {
            if let Some(index) = txn.objects.iter().position(|o| *o == object) {
                txn.objects.remove(index);
                txn.ready.remove(index);
            }
        }
    }

    /// Structured dump of every transaction the manager knows about
    pub fn dump(&self) -> serde_json::Value {
        fn describe<K: fmt::Display>(txn: &Transaction<K>) -> serde_json::Value {
            serde_json::json!({
                "id": txn.id.to_string(),
                "objects": txn.objects.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "ready": txn.ready,
            })
        }
        serde_json::json!({
            "timeout_ms": self.timeout.as_millis() as u64,
            "collecting": self.collecting.as_ref().map(describe),
            "committed": self.committed.iter().map(describe).collect::<Vec<_>>(),
            "queued": self.queued.iter().map(ToString::to_string).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TransactionManager<u32> {
        TransactionManager::new(DEFAULT_TRANSACTION_TIMEOUT)
    }

    #[test]
    fn objects_scheduled_together_share_a_transaction() {
        let mut txm = manager();
        let a = txm.schedule_object(1);
        let b = txm.schedule_object(2);
        assert_eq!(a, b);
        assert!(txm.is_object_pending(1));
        assert_eq!(txm.collecting_objects(), &[1, 2]);
    }

    #[test]
    fn applies_only_when_all_ready() {
        let now = Instant::now();
        let mut txm = manager();
        txm.schedule_object(1);
        txm.schedule_object(2);
        let (id, objects) = txm.start_commit(now).unwrap();
        assert_eq!(objects, vec![1, 2]);
        assert_eq!(txm.state(id), TransactionState::Committed);

        txm.mark_ready(1);
        assert!(txm.apply_ready(now).is_empty());
        txm.mark_ready(2);
        let applied = txm.apply_ready(now);
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].reason, ApplyReason::Ready);
        let order: Vec<u32> = applied[0].entries.iter().map(|e| e.object).collect();
        assert_eq!(order, vec![1, 2]);
        assert_eq!(txm.state(id), TransactionState::Done);
    }

    #[test]
    fn deadline_forces_apply() {
        let now = Instant::now();
        let mut txm = manager();
        txm.schedule_object(7);
        txm.start_commit(now).unwrap();
        assert_eq!(txm.next_deadline(), Some(now + DEFAULT_TRANSACTION_TIMEOUT));
        assert!(txm.apply_ready(now + Duration::from_millis(99)).is_empty());
        let applied = txm.apply_ready(now + DEFAULT_TRANSACTION_TIMEOUT);
        assert_eq!(applied[0].reason, ApplyReason::Timeout);
        assert!(txm.next_deadline().is_none());
    }

    #[test]
    fn in_flight_object_is_queued_for_next_transaction() {
        let now = Instant::now();
        let mut txm = manager();
        txm.schedule_object(1);
        txm.start_commit(now).unwrap();
        assert_eq!(txm.schedule_object(1), Scheduled::Queued);
        assert!(!txm.has_collecting());

        txm.mark_ready(1);
        let applied = txm.apply_ready(now);
        assert!(applied[0].entries[0].still_pending);
        assert!(txm.has_collecting());
        assert_eq!(txm.collecting_objects(), &[1]);
    }

    #[test]
    fn forgetting_object_unblocks_transaction() {
        let now = Instant::now();
        let mut txm = manager();
        txm.schedule_object(1);
        txm.schedule_object(2);
        txm.start_commit(now).unwrap();
        txm.mark_ready(1);
        txm.forget_object(2);
        let applied = txm.apply_ready(now);
        assert_eq!(applied[0].entries.len(), 1);
    }

    #[test]
    fn empty_flush_commits_nothing() {
        let mut txm = manager();
        assert!(txm.start_commit(Instant::now()).is_none());
    }
}
