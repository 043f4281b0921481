//! Local copy of every garage, reconciled against the server.
//!
//! Three sources write to the mirror:
//!
//! ```text
//!  fetch / resync ──▶ apply_snapshot ─┐
//!  push event     ──▶ apply_remote   ─┼──▶ entry.authoritative ──┐
//!  round trip     ──▶ complete_local ─┘                          ├──▶ entry.displayed
//!  user action    ──▶ begin_local ──────▶ entry.pending ─────────┘
//! ```
//!
//! Rules:
//! - remote state always wins: a push event or snapshot replaces the
//!   authoritative value and discards every optimistic delta for that garage
//! - an optimistic delta is reconciled by whichever arrives first, its own
//!   round-trip reply or any push event for the garage; the later arrival is a
//!   no-op for the displayed value
//! - a rejected or failed round trip rolls the garage back to the last
//!   authoritative value and is reported so the UI can tell the user
//! - a push event or reply whose `revision` is lower than the authoritative
//!   one is stale and never moves the value backwards; snapshots are always
//!   taken as-is, since a restarted server starts counting again from zero
//!
//! The mirror is plain data with `&mut self` methods. It is meant to be owned
//! by one sequencer (see [`session`](crate::session)).

use indexmap::IndexMap;
use std::fmt;

use gatorpark_core::{Action, Garage, Mutation, MutationTag};

use crate::client::ClientError;

/// One locally initiated action waiting for its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEdit {
    pub ticket: u64,
    pub name: String,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingDelta {
    ticket: u64,
    action: Action,
}

/// Mirror state for one garage.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorEntry {
    authoritative: Garage,
    displayed: Garage,
    pending: Vec<PendingDelta>,
}

impl MirrorEntry {
    fn new(garage: Garage) -> Self {
        Self {
            displayed: garage.clone(),
            authoritative: garage,
            pending: Vec::new(),
        }
    }

    /// Value to show: the authoritative value plus outstanding optimistic deltas.
    pub fn garage(&self) -> &Garage {
        &self.displayed
    }

    /// Last value confirmed by the server.
    pub fn authoritative(&self) -> &Garage {
        &self.authoritative
    }

    /// Whether an optimistic edit is still unconfirmed.
    pub fn pending_local_delta(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn is_stale(&self, garage: &Garage) -> bool {
        garage.revision < self.authoritative.revision
    }

    fn set_authoritative(&mut self, garage: Garage) {
        self.authoritative = garage;
        self.recompute();
    }

    // Optimistic deltas are clamped the same way the store clamps them.
    fn recompute(&mut self) {
        let capacity = self.authoritative.capacity;
        let count = self.pending.iter().fold(self.authoritative.current_count, |count, p| {
            match p.action {
                Action::CheckIn if count < capacity => count + 1,
                Action::CheckOut if count > 0 => count - 1,
                _ => count,
            }
        });
        self.displayed = Garage {
            current_count: count,
            ..self.authoritative.clone()
        };
    }
}

/// Why an optimistic edit was undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackReason {
    AtCapacity,
    AlreadyEmpty,
    NotFound,
    Transport(String),
}

impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtCapacity => f.write_str("This garage is full"),
            Self::AlreadyEmpty => f.write_str("This garage is already empty"),
            Self::NotFound => f.write_str("This garage no longer exists"),
            Self::Transport(e) => write!(f, "Could not reach the server: {e}"),
        }
    }
}

/// What completing a local edit did.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The reply confirmed the edit; the entry now shows this value.
    Confirmed(Garage),
    /// A push event had already reconciled the edit; nothing changed.
    AlreadyReconciled,
    /// The edit did not take effect. `garage` is the value now shown, if the
    /// garage is known locally.
    RolledBack {
        garage: Option<Garage>,
        reason: RollbackReason,
    },
}

fn rollback_reason(tag: MutationTag) -> Option<RollbackReason> {
    match tag {
        MutationTag::Applied => None,
        MutationTag::AtCapacity => Some(RollbackReason::AtCapacity),
        MutationTag::AlreadyEmpty => Some(RollbackReason::AlreadyEmpty),
    }
}

fn failure_reason(error: &ClientError) -> RollbackReason {
    match error {
        ClientError::NotFound(_) => RollbackReason::NotFound,
        other => RollbackReason::Transport(other.to_string()),
    }
}

/// Ordered local cache of all garages.
#[derive(Debug, Clone, Default)]
pub struct ClientMirror {
    entries: IndexMap<String, MirrorEntry>,
    next_ticket: u64,
}

impl ClientMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every listed garage with the snapshot value.
    ///
    /// Garages missing from the snapshot are kept; entries are never removed.
    /// Returns whether any displayed value changed.
    pub fn apply_snapshot(&mut self, garages: Vec<Garage>) -> bool {
        let mut changed = false;
        for garage in garages {
            changed |= self.replace(garage);
        }
        changed
    }

    /// Apply one authoritative value from the server.
    ///
    /// Outstanding optimistic deltas for the garage are discarded. Applying
    /// the same value twice is a no-op, and a value older than the one
    /// already held is ignored. Returns whether the displayed value changed.
    pub fn apply_remote(&mut self, garage: Garage) -> bool {
        if let Some(entry) = self.entries.get(&garage.name) {
            if entry.is_stale(&garage) {
                log::trace!(
                    "Ignoring stale update for {} (revision {} < {})",
                    garage.name,
                    garage.revision,
                    entry.authoritative.revision
                );
                return false;
            }
        }
        self.replace(garage)
    }

    fn replace(&mut self, garage: Garage) -> bool {
        match self.entries.get_mut(&garage.name) {
            Some(entry) => {
                let before = entry.displayed.clone();
                entry.pending.clear();
                entry.set_authoritative(garage);
                entry.displayed != before
            }
            None => {
                self.entries
                    .insert(garage.name.clone(), MirrorEntry::new(garage));
                true
            }
        }
    }

    /// Show an action immediately, before the server has answered.
    ///
    /// The returned edit must be passed to [`complete_local`](Self::complete_local)
    /// with the round-trip result. Unknown garages get no optimistic change.
    pub fn begin_local(&mut self, name: &str, action: Action) -> LocalEdit {
        self.next_ticket += 1;
        let edit = LocalEdit {
            ticket: self.next_ticket,
            name: name.to_string(),
            action,
        };
        if let Some(entry) = self.entries.get_mut(name) {
            entry.pending.push(PendingDelta {
                ticket: edit.ticket,
                action,
            });
            entry.recompute();
        }
        edit
    }

    /// Reconcile an edit with its round-trip result.
    pub fn complete_local(
        &mut self,
        edit: &LocalEdit,
        reply: Result<Mutation, ClientError>,
    ) -> Reconciliation {
        let Some(entry) = self.entries.get_mut(&edit.name) else {
            return match reply {
                Ok(mutation) => {
                    let tag = mutation.tag;
                    let garage = mutation.garage;
                    self.entries
                        .insert(garage.name.clone(), MirrorEntry::new(garage.clone()));
                    match rollback_reason(tag) {
                        None => Reconciliation::Confirmed(garage),
                        Some(reason) => Reconciliation::RolledBack {
                            garage: Some(garage),
                            reason,
                        },
                    }
                }
                Err(e) => Reconciliation::RolledBack {
                    garage: None,
                    reason: failure_reason(&e),
                },
            };
        };

        let Some(pos) = entry.pending.iter().position(|p| p.ticket == edit.ticket) else {
            // A push event already replaced the optimistic value. Keep it, but
            // still report an edit that did not happen.
            return match reply {
                Ok(mutation) => match rollback_reason(mutation.tag) {
                    None => Reconciliation::AlreadyReconciled,
                    Some(reason) => Reconciliation::RolledBack {
                        garage: Some(entry.displayed.clone()),
                        reason,
                    },
                },
                Err(e) => Reconciliation::RolledBack {
                    garage: Some(entry.displayed.clone()),
                    reason: failure_reason(&e),
                },
            };
        };

        entry.pending.remove(pos);
        match reply {
            Ok(mutation) => {
                let tag = mutation.tag;
                if entry.is_stale(&mutation.garage) {
                    // A later reply already counted this change.
                    entry.recompute();
                } else {
                    entry.set_authoritative(mutation.garage);
                }
                match rollback_reason(tag) {
                    None => Reconciliation::Confirmed(entry.displayed.clone()),
                    Some(reason) => Reconciliation::RolledBack {
                        garage: Some(entry.displayed.clone()),
                        reason,
                    },
                }
            }
            Err(e) => {
                log::debug!("Rolling back {} on {}: {e}", edit.action, edit.name);
                entry.recompute();
                Reconciliation::RolledBack {
                    garage: Some(entry.displayed.clone()),
                    reason: failure_reason(&e),
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&MirrorEntry> {
        self.entries.get(name)
    }

    /// Entries in first-seen order.
    pub fn entries(&self) -> impl Iterator<Item = &MirrorEntry> {
        self.entries.values()
    }

    /// Displayed garages in first-seen order.
    pub fn garages(&self) -> Vec<Garage> {
        self.entries.values().map(|e| e.displayed.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
