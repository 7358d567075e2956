//! Database schema and migrations.
//!
//! Migrations are applied in order; `schema_version` records which ones ran.
//! Only the primary key definition differs between backends.

#[cfg(not(feature = "postgres"))]
macro_rules! pk {
    () => {
        "id INTEGER PRIMARY KEY AUTOINCREMENT"
    };
}

#[cfg(feature = "postgres")]
macro_rules! pk {
    () => {
        "id BIGSERIAL PRIMARY KEY"
    };
}

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: accounts
    concat!(
        "CREATE TABLE users (
    ",
        pk!(),
        ",
    email                   TEXT NOT NULL UNIQUE,
    name                    TEXT NOT NULL,
    role                    TEXT NOT NULL DEFAULT 'user',           -- 'user', 'admin'
    kyc_status              TEXT NOT NULL DEFAULT 'not_started',
    sumsub_review_status    TEXT,
    plan_status             TEXT NOT NULL DEFAULT 'none',
    gocardless_customer_id  TEXT,
    gocardless_mandate_id   TEXT,
    email_bounced_at        TEXT,
    email_complaint_at      TEXT,
    created_at              TEXT NOT NULL
);
CREATE INDEX idx_users_gc_customer ON users(gocardless_customer_id);
"
    ),
    // v2: scanned files and mail items
    concat!(
        "CREATE TABLE files (
    ",
        pk!(),
        ",
    user_id     BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    item_id     TEXT NOT NULL UNIQUE,                 -- provider item id
    name        TEXT NOT NULL,
    path        TEXT,
    web_url     TEXT,
    size        BIGINT NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);
CREATE TABLE mail_items (
    ",
        pk!(),
        ",
    user_id             BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    status              TEXT NOT NULL DEFAULT 'received',
    tag                 TEXT,
    scanned             INTEGER NOT NULL DEFAULT 0,
    file_id             BIGINT REFERENCES files(id) ON DELETE SET NULL,
    forwarding_status   TEXT NOT NULL DEFAULT 'none',
    storage_expires_at  TEXT,
    deleted             INTEGER NOT NULL DEFAULT 0,
    processed_at        TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);
CREATE INDEX idx_mail_items_user ON mail_items(user_id, deleted);
CREATE INDEX idx_mail_items_file ON mail_items(file_id);
"
    ),
    // v3: forwarding requests
    concat!(
        "CREATE TABLE forwarding_requests (
    ",
        pk!(),
        ",
    mail_item_id     BIGINT NOT NULL REFERENCES mail_items(id) ON DELETE CASCADE,
    user_id          BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    status           TEXT NOT NULL DEFAULT 'requested',
    name             TEXT NOT NULL,
    line1            TEXT NOT NULL,
    line2            TEXT,
    city             TEXT NOT NULL,
    postcode         TEXT NOT NULL,
    country          TEXT NOT NULL,
    note             TEXT,
    courier          TEXT,
    tracking_number  TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);
CREATE INDEX idx_forwarding_requests_item ON forwarding_requests(mail_item_id);
CREATE INDEX idx_forwarding_requests_user ON forwarding_requests(user_id);
"
    ),
    // v4: notifications, provider events, invoices
    concat!(
        "CREATE TABLE notifications (
    ",
        pk!(),
        ",
    user_id       BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    kind          TEXT NOT NULL,
    title         TEXT NOT NULL,
    body          TEXT NOT NULL,
    mail_item_id  BIGINT,
    read_at       TEXT,
    created_at    TEXT NOT NULL
);
CREATE INDEX idx_notifications_user ON notifications(user_id);
CREATE TABLE webhook_events (
    ",
        pk!(),
        ",
    provider     TEXT NOT NULL,
    event_type   TEXT NOT NULL,
    user_id      BIGINT,
    reference    TEXT,
    payload      TEXT NOT NULL,
    received_at  TEXT NOT NULL
);
CREATE INDEX idx_webhook_events_user ON webhook_events(user_id);
CREATE TABLE invoices (
    ",
        pk!(),
        ",
    user_id                BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    amount_pence           BIGINT NOT NULL,
    currency               TEXT NOT NULL DEFAULT 'GBP',
    status                 TEXT NOT NULL DEFAULT 'pending',
    gocardless_payment_id  TEXT UNIQUE,
    created_at             TEXT NOT NULL
);
"
    ),
    // v5: GDPR export jobs and maintenance locks
    concat!(
        "CREATE TABLE export_jobs (
    ",
        pk!(),
        ",
    user_id       BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    job_type      TEXT NOT NULL DEFAULT 'gdpr',
    status        TEXT NOT NULL DEFAULT 'pending',     -- pending, running, done, error
    token         TEXT UNIQUE,
    expires_at    TEXT,
    file_path     TEXT,
    file_size     BIGINT,
    error         TEXT,
    created_at    TEXT NOT NULL,
    started_at    TEXT,
    completed_at  TEXT,
    purged_at     TEXT
);
CREATE INDEX idx_export_jobs_user ON export_jobs(user_id, status);
CREATE TABLE maintenance_locks (
    lock_key     BIGINT PRIMARY KEY,
    holder       TEXT NOT NULL,
    acquired_at  TEXT NOT NULL
);
"
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_not_empty() {
        assert_eq!(MIGRATIONS.len(), 5);
    }

    #[test]
    fn test_mail_items_migration() {
        let migration = MIGRATIONS[1];
        assert!(migration.contains("CREATE TABLE mail_items"));
        assert!(migration.contains("forwarding_status"));
        assert!(migration.contains("storage_expires_at"));
        assert!(migration.contains("deleted"));
    }

    #[test]
    fn test_export_jobs_migration() {
        let migration = MIGRATIONS[4];
        assert!(migration.contains("CREATE TABLE export_jobs"));
        assert!(migration.contains("token"));
        assert!(migration.contains("purged_at"));
    }

    #[test]
    fn test_every_table_has_primary_key() {
        for migration in MIGRATIONS {
            assert!(migration.contains("PRIMARY KEY"));
        }
    }
}
