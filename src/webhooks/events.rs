//! Log of accepted provider events.

use serde::Serialize;

use crate::db::DbConn;
use crate::Result;

/// One stored provider event.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct WebhookEvent {
    pub id: i64,
    pub provider: String,
    pub event_type: String,
    pub user_id: Option<i64>,
    pub reference: Option<String>,
    /// Raw JSON as received.
    pub payload: String,
    pub received_at: String,
}

/// What a provider handler did with one event.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedEvent {
    pub event_type: String,
    /// The account the event touched, if any.
    pub user_id: Option<i64>,
    /// Provider-side id (applicant, mandate, payment, file).
    pub reference: Option<String>,
    pub payload: serde_json::Value,
    /// Logged for the record but changed no state.
    pub ignored: bool,
}

impl AppliedEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            user_id: None,
            reference: None,
            payload,
            ignored: false,
        }
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub fn with_user(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_reference(mut self, reference: Option<impl Into<String>>) -> Self {
        self.reference = reference.map(Into::into);
        self
    }
}

const COLUMNS: &str = "id, provider, event_type, user_id, reference, payload, received_at";

/// Repository for the provider event log.
pub struct WebhookEventRepository;

impl WebhookEventRepository {
    /// Append an event.
    pub async fn record(
        conn: &mut DbConn,
        provider: &str,
        event: &AppliedEvent,
        now: &str,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO webhook_events (provider, event_type, user_id, reference, payload, received_at)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(provider)
        .bind(&event.event_type)
        .bind(event.user_id)
        .bind(&event.reference)
        .bind(event.payload.to_string())
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Events linked to a user, oldest first.
    pub async fn list_for_user(conn: &mut DbConn, user_id: i64) -> Result<Vec<WebhookEvent>> {
        let sql = format!("SELECT {COLUMNS} FROM webhook_events WHERE user_id = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, WebhookEvent>(&sql)
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Count events from one provider.
    pub async fn count_for_provider(conn: &mut DbConn, provider: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events WHERE provider = $1")
                .bind(provider)
                .fetch_one(&mut *conn)
                .await?;
        Ok(count)
    }
}
