// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded execution of store transactions.
//!
//! redb transactions are blocking, so each unit of work runs on the blocking
//! pool while the caller awaits it under a deadline. A [`CommitGate`] shared by
//! both sides settles the race between "caller gave up" (deadline passed or
//! future dropped) and "worker is about to commit": whichever flips the gate
//! first wins.
//!
//! - Caller wins: the worker aborts its write transaction, nothing is visible.
//! - Worker wins: the commit goes ahead and the caller waits for the durable
//!   result, even past the deadline.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use super::error::{LedgerError, LedgerResult};
use crate::storage::{PointStore, ReadOnly, ReadWrite, StoreError, Tables};

const RUNNING: u8 = 0;
const COMMITTING: u8 = 1;
const ABANDONED: u8 = 2;

/// Shared decision point between a waiting caller and its worker.
#[derive(Clone)]
pub struct CommitGate {
    state: Arc<AtomicU8>,
    operation: &'static str,
    timeout: Duration,
}

impl CommitGate {
    fn new(operation: &'static str, timeout: Duration) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(RUNNING)),
            operation,
            timeout,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.state.load(Ordering::Acquire) == ABANDONED
    }

    /// Claim the right to commit. False once the caller has given up.
    pub fn enter_commit(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, COMMITTING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Give up on the worker. False when it is already committing.
    fn abandon(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn timeout_error(&self) -> LedgerError {
        LedgerError::TransactionTimeout {
            operation: self.operation,
            timeout_ms: self.timeout_ms(),
        }
    }
}

/// Abandons the worker if the awaiting future is dropped before it settles.
struct AbandonOnDrop {
    gate: CommitGate,
    armed: bool,
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if self.armed && self.gate.abandon() {
            warn!(operation = self.gate.operation, "caller cancelled, rolling back");
        }
    }
}

/// Runs blocking store work under a deadline.
#[derive(Debug, Clone, Copy)]
pub struct TxnRunner {
    timeout: Duration,
}

impl TxnRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `work` on the blocking pool.
    ///
    /// Returns [`LedgerError::TransactionTimeout`] if the deadline passes
    /// before the worker claims the commit gate.
    pub async fn run<T, F>(&self, operation: &'static str, work: F) -> LedgerResult<T>
    where
        F: FnOnce(&CommitGate) -> LedgerResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let gate = CommitGate::new(operation, self.timeout);
        let mut guard = AbandonOnDrop {
            gate: gate.clone(),
            armed: true,
        };

        let worker_gate = gate.clone();
        let mut handle = tokio::task::spawn_blocking(move || work(&worker_gate));

        let waited = tokio::time::timeout(self.timeout, &mut handle).await;
        let joined = match waited {
            Ok(joined) => joined,
            Err(_) => {
                if gate.abandon() {
                    guard.armed = false;
                    warn!(
                        operation,
                        timeout_ms = gate.timeout_ms(),
                        "transaction deadline exceeded, rolling back"
                    );
                    return Err(gate.timeout_error());
                }
                // The worker is committing; its outcome is authoritative.
                handle.await
            }
        };
        guard.armed = false;

        joined.map_err(|e| {
            error!(operation, error = %e, "transaction worker failed");
            LedgerError::PersistenceFailure(format!("{operation} worker failed: {e}"))
        })?
    }
}

/// Run `body` in a write transaction that commits only if `gate` allows it.
///
/// Any error from `body` drops the transaction, which rolls it back.
pub fn write_gated<T>(
    store: &PointStore,
    gate: &CommitGate,
    body: impl for<'t> FnOnce(&mut Tables<ReadWrite<'t>>) -> LedgerResult<T>,
) -> LedgerResult<T> {
    let txn = store.begin_write()?;
    if gate.is_abandoned() {
        return Err(gate.timeout_error());
    }

    let value = {
        let mut tables = Tables::write(&txn)?;
        body(&mut tables)?
    };

    if !gate.enter_commit() {
        txn.abort().map_err(StoreError::from)?;
        return Err(gate.timeout_error());
    }
    txn.commit().map_err(StoreError::from)?;
    Ok(value)
}

/// Run `body` against a read snapshot unless the caller already gave up.
pub fn read_gated<T>(
    store: &PointStore,
    gate: &CommitGate,
    body: impl FnOnce(&Tables<ReadOnly>) -> LedgerResult<T>,
) -> LedgerResult<T> {
    if gate.is_abandoned() {
        return Err(gate.timeout_error());
    }
    store.read(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::{META, META_LEDGER_SEQ};
    use redb::ReadableTable;
    use tempfile::TempDir;

    fn temp_store() -> (Arc<PointStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = PointStore::open(&dir.path().join("points.redb")).unwrap();
        (Arc::new(store), dir)
    }

    #[test]
    fn timeout_millis_saturate() {
        let gate = CommitGate::new("spend", Duration::from_millis(250));
        assert_eq!(gate.timeout_ms(), 250);
        let huge = CommitGate::new("spend", Duration::MAX);
        assert!(matches!(
            huge.timeout_error(),
            LedgerError::TransactionTimeout { timeout_ms: u64::MAX, .. }
        ));
    }

    fn stored_seq(store: &PointStore) -> Option<u64> {
        let txn = store.begin_read().unwrap();
        let meta = txn.open_table(META).unwrap();
        meta.get(META_LEDGER_SEQ).unwrap().map(|v| v.value())
    }

    /// Writes the sequence key after sleeping inside the transaction.
    fn slow_write(store: Arc<PointStore>, delay: Duration) -> impl FnOnce(&CommitGate) -> LedgerResult<()> {
        move |gate| {
            write_gated(&store, gate, |tables| {
                std::thread::sleep(delay);
                tables
                    .meta
                    .insert(META_LEDGER_SEQ, 1u64)
                    .map_err(StoreError::from)?;
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn completes_within_deadline() {
        let (store, _dir) = temp_store();
        let runner = TxnRunner::new(Duration::from_secs(5));
        runner
            .run("test", slow_write(store.clone(), Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(stored_seq(&store), Some(1));
    }

    #[tokio::test]
    async fn timeout_rolls_back() {
        let (store, _dir) = temp_store();
        let runner = TxnRunner::new(Duration::from_millis(20));

        let err = runner
            .run("test", slow_write(store.clone(), Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::TransactionTimeout { operation: "test", .. }));

        // Let the worker reach its commit point and observe the abandoned gate.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(stored_seq(&store), None);
    }

    #[tokio::test]
    async fn committing_worker_outlives_deadline() {
        let runner = TxnRunner::new(Duration::from_millis(20));
        let value = runner
            .run("test", |gate| {
                assert!(gate.enter_commit());
                std::thread::sleep(Duration::from_millis(100));
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn dropped_caller_rolls_back() {
        let (store, _dir) = temp_store();
        let runner = TxnRunner::new(Duration::from_secs(5));

        let task = {
            let store = store.clone();
            tokio::spawn(async move {
                runner
                    .run("test", slow_write(store, Duration::from_millis(200)))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();
        let _ = task.await;

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(stored_seq(&store), None);
    }

    #[tokio::test]
    async fn worker_errors_propagate() {
        let runner = TxnRunner::new(Duration::from_secs(1));
        let err = runner
            .run::<(), _>("test", |_| Err(LedgerError::invalid("nope")))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }
}
