//! Mail item lifecycle.
//!
//! Every status change on a mail item, from user, admin or webhook routes,
//! goes through [`Lifecycle::check`]. It applies the guards in a fixed order
//! and then looks the move up in the transition table:
//!
//! | action           | from                                         | to                |
//! |------------------|----------------------------------------------|-------------------|
//! | `Scan`           | received                                     | scanned           |
//! | `Process`        | received, scanned                            | processed         |
//! | `Process`        | forward_requested                            | forward_requested |
//! | `RequestForward` | scanned, processed                           | forward_requested |
//! | `Ship`           | forward_requested (must be processed)        | forwarded         |
//! | `Cancel`         | received, scanned, processed, forward_requested | cancelled      |
//! | `Delete`         | any                                          | unchanged, deleted |
//!
//! Deleting a `forward_requested` item also withdraws its forwarding request.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use super::types::{ForwardingStatus, MailItem, MailStatus};

/// Something that can happen to a mail item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MailAction {
    Scan,
    Process,
    RequestForward,
    Ship,
    Cancel,
    Delete,
}

impl MailAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailAction::Scan => "scan",
            MailAction::Process => "process",
            MailAction::RequestForward => "request_forward",
            MailAction::Ship => "ship",
            MailAction::Cancel => "cancel",
            MailAction::Delete => "delete",
        }
    }
}

/// Who is acting on the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// An account holder; may only touch their own items.
    User(i64),
    /// A back-office operator.
    Admin,
    /// A provider callback.
    Webhook,
}

/// Why a lifecycle action was refused. Displays as the reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("not_found")]
    NotFound,
    #[error("not_owner")]
    NotOwner,
    #[error("deleted")]
    Deleted,
    #[error("too_old")]
    TooOld,
    #[error("invalid_state")]
    InvalidState,
    #[error("not_processed")]
    NotProcessed,
}

impl TransitionError {
    /// Stable reason code returned to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            TransitionError::NotFound => "not_found",
            TransitionError::NotOwner => "not_owner",
            TransitionError::Deleted => "deleted",
            TransitionError::TooOld => "too_old",
            TransitionError::InvalidState => "invalid_state",
            TransitionError::NotProcessed => "not_processed",
        }
    }
}

/// The effect of an accepted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub action: MailAction,
    pub from: MailStatus,
    pub to: MailStatus,
    /// New forwarding status, if it changes.
    pub forwarding_status: Option<ForwardingStatus>,
    /// Stamp `processed_at`.
    pub stamp_processed: bool,
    /// Set the soft-delete flag.
    pub delete: bool,
}

/// Transition table and guards.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    forwarding_window: Duration,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(14)
    }
}

impl Lifecycle {
    /// Create a lifecycle with the given forwarding window in days.
    pub fn new(forwarding_window_days: i64) -> Self {
        Self {
            forwarding_window: Duration::days(forwarding_window_days),
        }
    }

    /// Forwarding window.
    pub fn forwarding_window(&self) -> Duration {
        self.forwarding_window
    }

    /// Decide whether `actor` may apply `action` to `item` at `now`.
    ///
    /// Guards run in order: not_found, not_owner, deleted, too_old,
    /// invalid_state, not_processed.
    pub fn check(
        &self,
        item: Option<&MailItem>,
        actor: Actor,
        action: MailAction,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        let item = item.ok_or(TransitionError::NotFound)?;

        if let Actor::User(user_id) = actor {
            if item.user_id != user_id {
                return Err(TransitionError::NotOwner);
            }
            if !user_may(action) {
                return Err(TransitionError::InvalidState);
            }
        }

        if item.deleted {
            return Err(TransitionError::Deleted);
        }

        if action == MailAction::RequestForward
            && item.age_secs(now) > self.forwarding_window.num_seconds()
        {
            return Err(TransitionError::TooOld);
        }

        let (to, forwarding_status) =
            next_state(action, item.status).ok_or(TransitionError::InvalidState)?;

        if action == MailAction::Ship && !item.is_processed() {
            return Err(TransitionError::NotProcessed);
        }

        Ok(Transition {
            action,
            from: item.status,
            to,
            forwarding_status,
            stamp_processed: action == MailAction::Process,
            delete: action == MailAction::Delete,
        })
    }

    /// Actions `actor` could apply to `item` right now.
    pub fn allowed_actions(
        &self,
        item: &MailItem,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Vec<MailAction> {
        [
            MailAction::Scan,
            MailAction::Process,
            MailAction::RequestForward,
            MailAction::Ship,
            MailAction::Cancel,
            MailAction::Delete,
        ]
        .into_iter()
        .filter(|action| self.check(Some(item), actor, *action, now).is_ok())
        .collect()
    }
}

/// Account holders may only forward and delete.
fn user_may(action: MailAction) -> bool {
    matches!(action, MailAction::RequestForward | MailAction::Delete)
}

fn next_state(
    action: MailAction,
    from: MailStatus,
) -> Option<(MailStatus, Option<ForwardingStatus>)> {
    use MailStatus::*;

    match (action, from) {
        (MailAction::Scan, Received) => Some((Scanned, None)),
        (MailAction::Process, Received | Scanned) => Some((Processed, None)),
        (MailAction::Process, ForwardRequested) => {
            Some((ForwardRequested, Some(ForwardingStatus::Processing)))
        }
        (MailAction::RequestForward, Scanned | Processed) => {
            Some((ForwardRequested, Some(ForwardingStatus::Requested)))
        }
        (MailAction::Ship, ForwardRequested) => {
            Some((Forwarded, Some(ForwardingStatus::Dispatched)))
        }
        (MailAction::Cancel, ForwardRequested) => {
            Some((Cancelled, Some(ForwardingStatus::Cancelled)))
        }
        (MailAction::Cancel, Received | Scanned | Processed) => Some((Cancelled, None)),
        (MailAction::Delete, ForwardRequested) => {
            Some((ForwardRequested, Some(ForwardingStatus::Cancelled)))
        }
        (MailAction::Delete, status) => Some((status, None)),
        _ => None,
    }
}
