//! Single-owner task hosting the [`Reconciler`].
//!
//! ```text
//!  SyncChannel reader ──┐
//!                       ├── mpsc inbox ──► PresentationActor ──► watch snapshot ──► renderers
//!  tests / local apply ─┘                    │
//!                                            └── live-message deadline (one, resettable)
//! ```
//!
//! Every update runs to completion before the next is read, so the state has
//! exactly one writer. Renderers only ever see cloned snapshots.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};

use crate::reconciler::{Reconciler, Update};
use crate::state::PresentationState;

/// How long a live message stays on screen.
pub const DEFAULT_LIVE_MESSAGE_TTL: Duration = Duration::from_secs(5);

const INBOX_CAPACITY: usize = 256;

struct PresentationActor {
    reconciler: Reconciler,
    inbox: mpsc::Receiver<Update>,
    snapshots: watch::Sender<PresentationState>,
    live_message_ttl: Duration,
}

impl PresentationActor {
    async fn run(mut self) {
        let expiry = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(expiry);
        let mut expiry_armed = false;

        loop {
            tokio::select! {
                update = self.inbox.recv() => {
                    let Some(update) = update else { break };
                    if matches!(update, Update::LiveMessage(_)) {
                        // Replaces any pending expiry, never stacks.
                        Self::arm(expiry.as_mut(), self.live_message_ttl);
                        expiry_armed = true;
                    }
                    self.reconciler.apply(update);
                    self.publish();
                }
                () = &mut expiry, if expiry_armed => {
                    expiry_armed = false;
                    self.reconciler.clear_live_message();
                    log::debug!("Live message expired");
                    self.publish();
                }
            }
        }

        log::debug!("Presentation actor stopped");
    }

    fn arm(expiry: std::pin::Pin<&mut Sleep>, ttl: Duration) {
        expiry.reset(Instant::now() + ttl);
    }

    fn publish(&self) {
        let next = self.reconciler.state();
        self.snapshots.send_if_modified(|current| {
            if current != next {
                *current = next.clone();
                true
            } else {
                false
            }
        });
    }
}

/// Handle to a running presentation actor.
///
/// Dropping every [`UpdateSender`] and the handle stops the actor;
/// [`PresentationHandle::close`] stops it immediately.
pub struct PresentationHandle {
    inbox: mpsc::Sender<Update>,
    snapshots: watch::Receiver<PresentationState>,
    task: JoinHandle<()>,
}

/// Cloneable inbox for feeding updates to the actor.
#[derive(Clone)]
pub struct UpdateSender {
    inbox: mpsc::Sender<Update>,
}

impl UpdateSender {
    /// Queue an update. Returns `false` once the actor has stopped.
    pub async fn send(&self, update: Update) -> bool {
        self.inbox.send(update).await.is_ok()
    }
}

impl PresentationHandle {
    /// Spawn a new actor on the current tokio runtime.
    pub fn spawn(live_message_ttl: Duration) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (snap_tx, snap_rx) = watch::channel(PresentationState::default());

        let actor = PresentationActor {
            reconciler: Reconciler::new(),
            inbox: inbox_rx,
            snapshots: snap_tx,
            live_message_ttl,
        };
        let task = tokio::spawn(actor.run());

        Self {
            inbox: inbox_tx,
            snapshots: snap_rx,
            task,
        }
    }

    pub fn sender(&self) -> UpdateSender {
        UpdateSender {
            inbox: self.inbox.clone(),
        }
    }

    /// Queue an update for the actor.
    pub async fn apply(&self, update: Update) -> bool {
        self.inbox.send(update).await.is_ok()
    }

    /// Latest published state.
    pub fn snapshot(&self) -> PresentationState {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every published change.
    pub fn subscribe(&self) -> watch::Receiver<PresentationState> {
        self.snapshots.clone()
    }

    /// Stop the actor. Queued updates are discarded.
    pub fn close(&self) {
        self.task.abort();
    }
}
