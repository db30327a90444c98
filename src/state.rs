//! Revisioned state with long-poll waiters.
//!
//! The published [`State`] is the only thing external pollers observe. All
//! mutation funnels through [`StateStore::update`], which bumps the strictly
//! monotonic revision and hands the fresh state to every registered waiter
//! in one shot. A waiter registered at revision `r` is only ever unblocked
//! with a state whose revision is greater than `r`: registration happens
//! while the exclusive lock is held, so no update can slip between the
//! staleness check and the enqueue.

use crate::error::{Error, Result};
use crate::types::State;
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::error;

struct Inner {
    state: State,
    waiters: Vec<oneshot::Sender<State>>,
}

/// Guard around the published state and its waiters.
pub struct StateStore {
    inner: RwLock<Inner>,
}

impl StateStore {
    pub fn new(initial: State) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: initial,
                waiters: Vec::new(),
            }),
        }
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> State {
        self.inner.read().state.clone()
    }

    /// Current revision.
    pub fn rev(&self) -> u64 {
        self.inner.read().state.rev
    }

    /// Mutate the state under the exclusive lock, bump the revision, and
    /// notify every waiter. The updater never blocks on waiter
    /// consumption; delivery is buffered one-shot.
    pub fn update(&self, body: impl FnOnce(&mut State)) {
        let mut inner = self.inner.write();
        body(&mut inner.state);
        inner.state.rev += 1;

        let snapshot = inner.state.clone();
        for waiter in inner.waiters.drain(..) {
            // A poller that gave up holds a dead receiver; that's fine.
            let _ = waiter.send(snapshot.clone());
        }
    }

    /// Long-poll the state.
    ///
    /// Returns immediately when `have_rev` is `None` or differs from the
    /// current revision. Otherwise blocks until the next update or until
    /// `cancel` fires (`Error::Cancelled`).
    pub async fn wait(&self, have_rev: Option<u64>, cancel: &CancellationToken) -> Result<State> {
        let rx = {
            let mut inner = self.inner.write();

            match have_rev {
                None => return Ok(inner.state.clone()),
                Some(rev) if rev != inner.state.rev => return Ok(inner.state.clone()),
                Some(_) => {}
            }

            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            rx
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            delivered = rx => match delivered {
                Ok(state) => Ok(state),
                Err(_) => {
                    // The store outlives every waiter it registered.
                    error!("state waiter dropped without delivery");
                    panic!("can't happen: state store dropped with live waiters");
                }
            },
        }
    }
}
