//! Single-task owner of a [`ClientMirror`].
//!
//! Fetch results, push events, user actions and round-trip replies all reach
//! the mirror through one task, so no two writes interleave:
//!
//! ```text
//!  SessionHandle::check_in ──▶ commands ─┐
//!  GarageClient::updates()  ─────────────┼──▶ MirrorSession::run ──▶ watch<Vec<MirrorEntry>>
//!  spawned round trips      ──▶ replies ─┘                      └──▶ mpsc<UserNotice>
//! ```
//!
//! Round trips run on their own tasks and are never cancelled; their replies
//! are fed back into the sequencer.

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};

use gatorpark_core::{Action, Mutation};

use crate::client::{ClientError, GarageClient, PushEvent};
use crate::mirror::{ClientMirror, LocalEdit, MirrorEntry, Reconciliation, RollbackReason};

/// Messages for the user interface.
#[derive(Debug, Clone, PartialEq)]
pub enum UserNotice {
    /// A local check-in/check-out did not take effect.
    Rejected { name: String, reason: RollbackReason },
    /// Live updates stopped; the view is refreshed by polling.
    ConnectionLost,
    /// Live updates resumed.
    ConnectionRestored,
}

enum Command {
    Local { name: String, action: Action },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Mirror session has stopped")]
pub struct SessionClosed;

/// Cheap handle used by UI code.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<Vec<MirrorEntry>>,
}

impl SessionHandle {
    pub async fn check_in(&self, name: impl Into<String>) -> Result<(), SessionClosed> {
        self.submit(name.into(), Action::CheckIn).await
    }

    pub async fn check_out(&self, name: impl Into<String>) -> Result<(), SessionClosed> {
        self.submit(name.into(), Action::CheckOut).await
    }

    async fn submit(&self, name: String, action: Action) -> Result<(), SessionClosed> {
        self.commands
            .send(Command::Local { name, action })
            .await
            .map_err(|_| SessionClosed)
    }

    /// Receiver that is notified whenever the displayed garages change.
    pub fn view(&self) -> watch::Receiver<Vec<MirrorEntry>> {
        self.view.clone()
    }

    /// Current displayed entries.
    pub fn current(&self) -> Vec<MirrorEntry> {
        self.view.borrow().clone()
    }
}

pub struct MirrorSession {
    client: GarageClient,
    mirror: ClientMirror,
    commands: mpsc::Receiver<Command>,
    replies_tx: mpsc::Sender<(LocalEdit, Result<Mutation, ClientError>)>,
    replies_rx: mpsc::Receiver<(LocalEdit, Result<Mutation, ClientError>)>,
    view: watch::Sender<Vec<MirrorEntry>>,
    notices: mpsc::Sender<UserNotice>,
}

impl MirrorSession {
    /// Create a session plus the handle and notice stream for the UI.
    pub fn new(client: GarageClient) -> (Self, SessionHandle, mpsc::Receiver<UserNotice>) {
        let (commands_tx, commands) = mpsc::channel(64);
        let (replies_tx, replies_rx) = mpsc::channel(64);
        let (view, view_rx) = watch::channel(Vec::new());
        let (notices, notices_rx) = mpsc::channel(64);

        let session = Self {
            client,
            mirror: ClientMirror::new(),
            commands,
            replies_tx,
            replies_rx,
            view,
            notices,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            view: view_rx,
        };
        (session, handle, notices_rx)
    }

    /// Run until every [`SessionHandle`] is dropped. Returns the final mirror.
    pub async fn run(mut self) -> ClientMirror {
        match self.client.fetch_garages().await {
            Ok(garages) => {
                log::info!("Loaded {} garages", garages.len());
                self.mirror.apply_snapshot(garages);
            }
            Err(e) => log::warn!("Initial garage fetch failed: {e}"),
        }
        self.publish_view();

        let updates = self.client.updates();
        futures_util::pin_mut!(updates);
        let mut connected_once = false;
        let mut offline = false;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Local { name, action }) => self.start_edit(&name, action),
                    None => break,
                },

                Some((edit, reply)) = self.replies_rx.recv() => {
                    let outcome = self.mirror.complete_local(&edit, reply);
                    if let Reconciliation::RolledBack { reason, .. } = outcome {
                        self.notify(UserNotice::Rejected { name: edit.name, reason });
                    }
                    self.publish_view();
                }

                Some(event) = updates.next() => match event {
                    PushEvent::Connected => {
                        if offline {
                            self.notify(UserNotice::ConnectionRestored);
                        }
                        offline = false;
                        connected_once = true;
                    }
                    PushEvent::Update(garage) => {
                        if self.mirror.apply_remote(garage) {
                            self.publish_view();
                        }
                    }
                    PushEvent::Resync(garages) => {
                        if self.mirror.apply_snapshot(garages) {
                            self.publish_view();
                        }
                    }
                    PushEvent::Disconnected => {
                        if !offline && connected_once {
                            self.notify(UserNotice::ConnectionLost);
                        }
                        offline = true;
                    }
                    PushEvent::Malformed(reason) => {
                        log::warn!("Ignoring malformed update: {reason}");
                    }
                },
            }
        }

        self.mirror
    }

    fn start_edit(&mut self, name: &str, action: Action) {
        let edit = self.mirror.begin_local(name, action);
        self.publish_view();

        let client = self.client.clone();
        let replies = self.replies_tx.clone();
        tokio::spawn(async move {
            let reply = client.mutate(&edit.name, edit.action).await;
            // The session may have stopped; the mutation itself still completed.
            let _ = replies.send((edit, reply)).await;
        });
    }

    fn publish_view(&self) {
        let entries: Vec<MirrorEntry> = self.mirror.entries().cloned().collect();
        self.view.send_replace(entries);
    }

    fn notify(&self, notice: UserNotice) {
        if self.notices.try_send(notice).is_err() {
            log::debug!("Notice dropped, UI is not listening");
        }
    }
}
