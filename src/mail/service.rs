//! Mail service for postbox.
//!
//! High-level operations for user, admin and webhook routes. Every status
//! change is decided by [`Lifecycle`] and written in one transaction together
//! with its forwarding request and notification rows.

use chrono::Utc;
use tracing::{debug, info};

use crate::datetime::{now_db, to_db};
use crate::db::{Database, DbConn, UserRepository};
use crate::notification::{NewNotification, NotificationRepository};
use crate::{PostboxError, Result};

use super::lifecycle::{Actor, Lifecycle, MailAction, Transition, TransitionError};
use super::repository::{ForwardingRequestRepository, MailItemRepository};
use super::types::{
    ForwardAddress, ForwardingRequest, ForwardingStatus, MailItem, MailStatus, NewMailItem,
    MAX_ADDRESS_FIELD_LENGTH, MAX_NOTE_LENGTH, MAX_TAG_LENGTH,
};

/// Validate a tag string.
fn validate_tag(tag: &str) -> Result<()> {
    if tag.chars().count() > MAX_TAG_LENGTH {
        return Err(PostboxError::Validation(format!(
            "tag must be at most {MAX_TAG_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Validate a forwarding destination.
fn validate_address(address: &ForwardAddress) -> Result<()> {
    let required = [
        ("name", &address.name),
        ("line1", &address.line1),
        ("city", &address.city),
        ("postcode", &address.postcode),
        ("country", &address.country),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(PostboxError::Validation(format!("{field} is required")));
        }
        if value.chars().count() > MAX_ADDRESS_FIELD_LENGTH {
            return Err(PostboxError::Validation(format!("{field} is too long")));
        }
    }
    if let Some(ref line2) = address.line2 {
        if line2.chars().count() > MAX_ADDRESS_FIELD_LENGTH {
            return Err(PostboxError::Validation("line2 is too long".to_string()));
        }
    }
    Ok(())
}

/// Service for mail item operations.
pub struct MailService<'a> {
    db: &'a Database,
    lifecycle: Lifecycle,
}

impl<'a> MailService<'a> {
    /// Create a new MailService.
    pub fn new(db: &'a Database, lifecycle: Lifecycle) -> Self {
        Self { db, lifecycle }
    }

    // ------------------------------------------------------------------
    // User operations
    // ------------------------------------------------------------------

    /// List the user's visible items.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<MailItem>> {
        let mut conn = self.db.pool().acquire().await?;
        MailItemRepository::list_for_user(&mut conn, user_id).await
    }

    /// Get one of the user's items.
    ///
    /// Items owned by someone else or soft-deleted are reported as not found.
    pub async fn get_for_user(&self, user_id: i64, item_id: i64) -> Result<MailItem> {
        let mut conn = self.db.pool().acquire().await?;
        match MailItemRepository::get_by_id(&mut conn, item_id).await? {
            Some(item) if item.user_id == user_id && !item.deleted => Ok(item),
            _ => Err(PostboxError::NotFound("mail item".to_string())),
        }
    }

    /// Actions the user could take on an item now.
    pub fn allowed_actions(&self, item: &MailItem, actor: Actor) -> Vec<MailAction> {
        self.lifecycle.allowed_actions(item, actor, Utc::now())
    }

    /// Set or clear the user's tag on an item.
    pub async fn update_tag(
        &self,
        user_id: i64,
        item_id: i64,
        tag: Option<&str>,
    ) -> Result<MailItem> {
        let tag = tag.map(str::trim).filter(|t| !t.is_empty());
        if let Some(t) = tag {
            validate_tag(t)?;
        }

        self.get_for_user(user_id, item_id).await?;

        let mut conn = self.db.pool().acquire().await?;
        if !MailItemRepository::update_tag(&mut conn, item_id, tag, &now_db()).await? {
            return Err(PostboxError::NotFound("mail item".to_string()));
        }
        MailItemRepository::get_by_id(&mut conn, item_id)
            .await?
            .ok_or_else(|| PostboxError::NotFound("mail item".to_string()))
    }

    /// Ask for an item to be posted on.
    ///
    /// The item moves to `forward_requested` and a forwarding request row is
    /// created in the same transaction.
    pub async fn request_forward(
        &self,
        user_id: i64,
        item_id: i64,
        address: &ForwardAddress,
        note: Option<&str>,
    ) -> Result<(MailItem, ForwardingRequest)> {
        validate_address(address)?;
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        if note.is_some_and(|n| n.chars().count() > MAX_NOTE_LENGTH) {
            return Err(PostboxError::Validation(format!(
                "note must be at most {MAX_NOTE_LENGTH} characters"
            )));
        }

        let mut tx = self.db.begin().await?;
        let now = now_db();

        let transition = self
            .transition_in(&mut tx, item_id, Actor::User(user_id), MailAction::RequestForward)
            .await?;
        let request = ForwardingRequestRepository::create(
            &mut tx, item_id, user_id, address, note, &now,
        )
        .await?;
        NotificationRepository::create(
            &mut tx,
            &NewNotification::forward_requested(user_id, item_id),
            &now,
        )
        .await?;
        let item = Self::reload(&mut tx, item_id).await?;

        tx.commit().await?;
        info!(
            user_id,
            item_id,
            forwarding_request_id = request.id,
            from = transition.from.as_str(),
            "Forwarding requested"
        );
        Ok((item, request))
    }

    /// List the user's forwarding requests.
    pub async fn list_forwarding_requests(&self, user_id: i64) -> Result<Vec<ForwardingRequest>> {
        let mut conn = self.db.pool().acquire().await?;
        ForwardingRequestRepository::list_for_user(&mut conn, user_id).await
    }

    /// Soft-delete an item.
    pub async fn soft_delete(&self, actor: Actor, item_id: i64) -> Result<()> {
        let mut tx = self.db.begin().await?;
        let transition = self
            .transition_in(&mut tx, item_id, actor, MailAction::Delete)
            .await?;
        if transition.forwarding_status == Some(ForwardingStatus::Cancelled) {
            Self::withdraw_forwarding_request(&mut tx, item_id).await?;
        }
        tx.commit().await?;
        info!(item_id, ?actor, "Mail item deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Admin operations
    // ------------------------------------------------------------------

    /// List items across all users.
    pub async fn list_all(
        &self,
        status: Option<MailStatus>,
        include_deleted: bool,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<MailItem>> {
        let mut conn = self.db.pool().acquire().await?;
        MailItemRepository::list_all(&mut conn, status, include_deleted, offset, limit).await
    }

    /// Get any item.
    pub async fn get(&self, item_id: i64) -> Result<MailItem> {
        let mut conn = self.db.pool().acquire().await?;
        MailItemRepository::get_by_id(&mut conn, item_id)
            .await?
            .ok_or_else(|| PostboxError::NotFound("mail item".to_string()))
    }

    /// Record a newly received physical item for a user.
    pub async fn create_item(&self, user_id: i64, tag: Option<&str>) -> Result<MailItem> {
        let tag = tag.map(str::trim).filter(|t| !t.is_empty());
        if let Some(t) = tag {
            validate_tag(t)?;
        }

        UserRepository::new(self.db.pool())
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| PostboxError::NotFound("user".to_string()))?;

        let mut new_item = NewMailItem::received(user_id).with_storage_expiry(to_db(
            &(Utc::now() + self.lifecycle.forwarding_window()),
        ));
        if let Some(t) = tag {
            new_item = new_item.with_tag(t);
        }

        let mut conn = self.db.pool().acquire().await?;
        let item = MailItemRepository::create(&mut conn, &new_item, &now_db()).await?;
        info!(user_id, item_id = item.id, "Mail item received");
        Ok(item)
    }

    /// Mark an item as handled by an operator.
    ///
    /// On a `forward_requested` item this stamps `processed_at` and moves the
    /// forwarding request to `processing`.
    pub async fn process(&self, item_id: i64) -> Result<MailItem> {
        let mut tx = self.db.begin().await?;
        let now = now_db();

        let transition = self
            .transition_in(&mut tx, item_id, Actor::Admin, MailAction::Process)
            .await?;
        if let Some(status) = transition.forwarding_status {
            if let Some(request) =
                ForwardingRequestRepository::latest_for_item(&mut tx, item_id).await?
            {
                ForwardingRequestRepository::set_status(&mut tx, request.id, status, &now).await?;
            }
        }
        let item = Self::reload(&mut tx, item_id).await?;

        tx.commit().await?;
        info!(item_id, to = transition.to.as_str(), "Mail item processed");
        Ok(item)
    }

    /// Dispatch a processed, forward-requested item.
    pub async fn ship(
        &self,
        item_id: i64,
        courier: Option<&str>,
        tracking_number: Option<&str>,
    ) -> Result<MailItem> {
        let mut tx = self.db.begin().await?;
        let now = now_db();

        self.transition_in(&mut tx, item_id, Actor::Admin, MailAction::Ship)
            .await?;
        if let Some(request) =
            ForwardingRequestRepository::latest_for_item(&mut tx, item_id).await?
        {
            ForwardingRequestRepository::mark_dispatched(
                &mut tx,
                request.id,
                courier,
                tracking_number,
                &now,
            )
            .await?;
        }
        let item = Self::reload(&mut tx, item_id).await?;
        NotificationRepository::create(
            &mut tx,
            &NewNotification::mail_forwarded(item.user_id, item_id, courier, tracking_number),
            &now,
        )
        .await?;

        tx.commit().await?;
        info!(item_id, courier = courier.unwrap_or(""), "Mail item shipped");
        Ok(item)
    }

    /// Cancel handling of an item.
    pub async fn cancel(&self, item_id: i64) -> Result<MailItem> {
        let mut tx = self.db.begin().await?;
        let now = now_db();

        let transition = self
            .transition_in(&mut tx, item_id, Actor::Admin, MailAction::Cancel)
            .await?;
        if transition.forwarding_status == Some(ForwardingStatus::Cancelled) {
            Self::withdraw_forwarding_request(&mut tx, item_id).await?;
        }
        let item = Self::reload(&mut tx, item_id).await?;
        NotificationRepository::create(
            &mut tx,
            &NewNotification::mail_cancelled(item.user_id, item_id),
            &now,
        )
        .await?;

        tx.commit().await?;
        info!(item_id, from = transition.from.as_str(), "Mail item cancelled");
        Ok(item)
    }

    // ------------------------------------------------------------------
    // Webhook operations
    // ------------------------------------------------------------------

    /// Record an arriving scan, inside the caller's transaction.
    ///
    /// A `received` item already linked to the file moves to `scanned`;
    /// otherwise a new `scanned` item is created. Repeated deliveries for the
    /// same file return the existing item unchanged. Returns `None` when the
    /// linked item has been deleted; it is left untouched.
    pub async fn ingest_scan(
        conn: &mut DbConn,
        lifecycle: &Lifecycle,
        user_id: i64,
        file_id: i64,
    ) -> Result<Option<MailItem>> {
        let now = Utc::now();
        let now_str = to_db(&now);

        if let Some(existing) = MailItemRepository::get_by_file_id(conn, file_id).await? {
            if existing.deleted {
                debug!(item_id = existing.id, file_id, "Scan for deleted item");
                return Ok(None);
            }
            if existing.status != MailStatus::Received {
                debug!(item_id = existing.id, file_id, "Scan already ingested");
                return Ok(Some(existing));
            }
            let transition =
                lifecycle.check(Some(&existing), Actor::Webhook, MailAction::Scan, now)?;
            if !MailItemRepository::apply(conn, existing.id, &transition, &now_str).await? {
                return Err(TransitionError::InvalidState.into());
            }
            MailItemRepository::attach_scan(conn, existing.id, file_id, &now_str).await?;
            NotificationRepository::create(
                conn,
                &NewNotification::mail_scanned(user_id, existing.id),
                &now_str,
            )
            .await?;
            return Self::reload(conn, existing.id).await.map(Some);
        }

        let new_item = NewMailItem::scanned(user_id, file_id)
            .with_storage_expiry(to_db(&(now + lifecycle.forwarding_window())));
        let item = MailItemRepository::create(conn, &new_item, &now_str).await?;
        NotificationRepository::create(
            conn,
            &NewNotification::mail_scanned(user_id, item.id),
            &now_str,
        )
        .await?;
        info!(user_id, item_id = item.id, file_id, "Scan ingested");
        Ok(Some(item))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Load, check and apply a transition on `conn`.
    async fn transition_in(
        &self,
        conn: &mut DbConn,
        item_id: i64,
        actor: Actor,
        action: MailAction,
    ) -> Result<Transition> {
        let item = MailItemRepository::get_by_id(conn, item_id).await?;
        let transition = match self.lifecycle.check(item.as_ref(), actor, action, Utc::now()) {
            Ok(t) => t,
            Err(reason) => {
                debug!(item_id, action = action.as_str(), reason = reason.reason(), "Transition rejected");
                return Err(reason.into());
            }
        };

        if !MailItemRepository::apply(conn, item_id, &transition, &now_db()).await? {
            return Err(TransitionError::InvalidState.into());
        }
        Ok(transition)
    }

    /// Mark the item's open forwarding request cancelled.
    async fn withdraw_forwarding_request(conn: &mut DbConn, item_id: i64) -> Result<()> {
        if let Some(request) = ForwardingRequestRepository::latest_for_item(conn, item_id).await? {
            ForwardingRequestRepository::set_status(
                conn,
                request.id,
                ForwardingStatus::Cancelled,
                &now_db(),
            )
            .await?;
        }
        Ok(())
    }

    async fn reload(conn: &mut DbConn, item_id: i64) -> Result<MailItem> {
        MailItemRepository::get_by_id(conn, item_id)
            .await?
            .ok_or_else(|| PostboxError::NotFound("mail item".to_string()))
    }
}
