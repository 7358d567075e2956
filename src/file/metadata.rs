//! File metadata types and repository.

use serde::Serialize;

use crate::db::DbConn;
use crate::{PostboxError, Result};

/// Metadata for a scan stored with the cloud drive provider.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoredFile {
    /// Unique file ID.
    pub id: i64,
    /// Owner.
    pub user_id: i64,
    /// Provider item id.
    pub item_id: String,
    /// Display name.
    pub name: String,
    /// Path within the drive.
    pub path: Option<String>,
    /// Provider web link.
    pub web_url: Option<String>,
    /// Size in bytes.
    pub size: i64,
    pub created_at: String,
}

/// Data for recording a file.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub user_id: i64,
    pub item_id: String,
    pub name: String,
    pub path: Option<String>,
    pub web_url: Option<String>,
    pub size: i64,
}

impl NewFile {
    /// Create a new NewFile.
    pub fn new(user_id: i64, item_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id,
            item_id: item_id.into(),
            name: name.into(),
            path: None,
            web_url: None,
            size: 0,
        }
    }
}

const COLUMNS: &str = "id, user_id, item_id, name, path, web_url, size, created_at";

/// Repository for file metadata.
pub struct FileRepository;

impl FileRepository {
    /// Insert a file, or refresh its metadata if the provider item id is known.
    ///
    /// The owner of an existing row is never changed.
    pub async fn upsert(conn: &mut DbConn, file: &NewFile, now: &str) -> Result<StoredFile> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO files (user_id, item_id, name, path, web_url, size, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (item_id) DO UPDATE SET
                name = excluded.name,
                path = excluded.path,
                web_url = excluded.web_url,
                size = excluded.size
             RETURNING id",
        )
        .bind(file.user_id)
        .bind(&file.item_id)
        .bind(&file.name)
        .bind(&file.path)
        .bind(&file.web_url)
        .bind(file.size)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Self::get_by_id(conn, id)
            .await?
            .ok_or_else(|| PostboxError::NotFound("file".to_string()))
    }

    /// Get a file by ID.
    pub async fn get_by_id(conn: &mut DbConn, id: i64) -> Result<Option<StoredFile>> {
        let sql = format!("SELECT {COLUMNS} FROM files WHERE id = $1");
        let file = sqlx::query_as::<_, StoredFile>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(file)
    }

    /// List a user's files.
    pub async fn list_for_user(conn: &mut DbConn, user_id: i64) -> Result<Vec<StoredFile>> {
        let sql = format!("SELECT {COLUMNS} FROM files WHERE user_id = $1 ORDER BY id");
        let files = sqlx::query_as::<_, StoredFile>(&sql)
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(files)
    }
}

#[cfg(all(test, not(feature = "postgres")))]
mod tests {
    use super::*;
    use crate::datetime::now_db;
    use crate::db::{NewUser, UserRepository};
    use crate::Database;

    #[tokio::test]
    async fn test_upsert_by_provider_id() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        let owner = repo.create(&NewUser::new("a@example.com", "A")).await.unwrap();
        let other = repo.create(&NewUser::new("b@example.com", "B")).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let mut new = NewFile::new(owner.id, "01ABC", "scan.pdf");
        new.size = 100;
        let first = FileRepository::upsert(&mut conn, &new, &now_db()).await.unwrap();
        assert_eq!(first.size, 100);

        let mut renamed = NewFile::new(other.id, "01ABC", "scan-renamed.pdf");
        renamed.size = 120;
        let second = FileRepository::upsert(&mut conn, &renamed, &now_db()).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "scan-renamed.pdf");
        assert_eq!(second.user_id, owner.id);

        assert_eq!(FileRepository::list_for_user(&mut conn, owner.id).await.unwrap().len(), 1);
        assert!(FileRepository::list_for_user(&mut conn, other.id).await.unwrap().is_empty());
    }
}
