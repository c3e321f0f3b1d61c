use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{until_cancelled, ListParams, RecordStore};
use crate::category::{
    CategoryId, CategoryPatch, CategoryRecord, CategoryStatus, NewCategory, SortKey, SortOrder,
};
use crate::error::CategoryError;

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    parent_id: Option<i64>,
    description: Option<String>,
    color: Option<String>,
    icon: Option<String>,
    status: String,
    product_count: i64,
    revenue: f64,
    created_at: i64,
}

impl CategoryRow {
    fn into_record(self) -> CategoryRecord {
        let status = CategoryStatus::from_str(&self.status).unwrap_or_else(|e| {
            tracing::warn!(id = self.id, error = %e, "Unknown status in store, treating as active");
            CategoryStatus::Active
        });
        CategoryRecord {
            id: CategoryId::Int(self.id),
            name: self.name,
            parent_id: self.parent_id.map(CategoryId::Int),
            description: self.description,
            color: self.color,
            icon: self.icon,
            status,
            product_count: Some(self.product_count.max(0) as u64),
            revenue: Some(self.revenue),
            created_at: DateTime::from_timestamp(self.created_at, 0),
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, name, parent_id, description, color, icon, status, \
     product_count, revenue, created_at FROM categories";

// ============================================================================
// Store
// ============================================================================

/// Local category store on SQLite.
///
/// Enforces the same rules as the inventory server: names are unique
/// (case-insensitively), parents must exist, and a category holding products
/// cannot be deleted. Deleting a parent detaches its children.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the store at `path` and run migrations.
    /// `":memory:"` opens a private in-memory store.
    pub async fn open(path: &str) -> Result<Self, CategoryError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Create the file with user-only permissions before SQLite touches it.
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() && db_path.parent().is_some_and(|p| p.exists()) {
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(map_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(map_sqlx)?;

        let store = Self { pool };
        store.migrate().await.map_err(map_sqlx)?;
        tracing::debug!(path = %path, "Opened local category store");
        Ok(store)
    }

    /// All schema statements run in one transaction and are idempotent.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                parent_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
                description TEXT,
                color TEXT,
                icon TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                product_count INTEGER NOT NULL DEFAULT 0,
                revenue REAL NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn fetch(&self, id: i64) -> Result<Option<CategoryRecord>, CategoryError> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let row: Option<CategoryRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(CategoryRow::into_record))
    }

    /// Set the product count of a category. Product assignment lives outside
    /// the category engine; this exists for seeding and tests.
    pub async fn set_product_count(&self, id: &CategoryId, count: u64) -> Result<(), CategoryError> {
        let key = local_key(id)?;
        let stored = i64::try_from(count).map_err(|_| {
            CategoryError::Conflict(format!("Product count {} is out of range", count))
        })?;
        let result = sqlx::query("UPDATE categories SET product_count = ? WHERE id = ?")
            .bind(stored)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn list(
        &self,
        params: ListParams,
        cancel: CancellationToken,
    ) -> Result<Vec<CategoryRecord>, CategoryError> {
        let pattern = params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));

        let sql = format!(
            "{} WHERE (?1 IS NULL OR name LIKE ?1 ESCAPE '\\' OR description LIKE ?1 ESCAPE '\\') \
             ORDER BY {}",
            SELECT_COLUMNS,
            order_clause(params.sort, params.order)
        );

        let query = async {
            let rows: Vec<CategoryRow> = sqlx::query_as(&sql)
                .bind(pattern)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
            Ok(rows.into_iter().map(CategoryRow::into_record).collect())
        };
        until_cancelled(&cancel, query).await
    }

    async fn create(&self, draft: NewCategory) -> Result<CategoryRecord, CategoryError> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(CategoryError::Conflict(
                "Category name cannot be empty".to_string(),
            ));
        }
        let parent = draft.parent_id.as_ref().map(local_key).transpose()?;

        let row: (i64,) = sqlx::query_as(
            "INSERT INTO categories (name, parent_id, description, color, icon, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(parent)
        .bind(&draft.description)
        .bind(&draft.color)
        .bind(&draft.icon)
        .bind(draft.status.as_str())
        .bind(Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let id = CategoryId::Int(row.0);
        self.fetch(row.0).await?.ok_or_else(|| not_found(&id))
    }

    async fn update(
        &self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<CategoryRecord, CategoryError> {
        let key = local_key(&id)?;
        let mut record = self.fetch(key).await?.ok_or_else(|| not_found(&id))?;
        record.apply(&patch);

        if record.name.trim().is_empty() {
            return Err(CategoryError::Conflict(
                "Category name cannot be empty".to_string(),
            ));
        }
        let parent = record.parent_id.as_ref().map(local_key).transpose()?;
        if parent == Some(key) {
            return Err(CategoryError::Conflict(
                "A category cannot be its own parent".to_string(),
            ));
        }

        sqlx::query(
            "UPDATE categories SET name = ?, parent_id = ?, description = ?, color = ?, icon = ?, \
             status = ? WHERE id = ?",
        )
        .bind(record.name.trim())
        .bind(parent)
        .bind(&record.description)
        .bind(&record.color)
        .bind(&record.icon)
        .bind(record.status.as_str())
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        self.fetch(key).await?.ok_or_else(|| not_found(&id))
    }

    async fn remove(&self, id: CategoryId) -> Result<(), CategoryError> {
        let key = local_key(&id)?;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT name, product_count FROM categories WHERE id = ?")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx)?;
        let (name, products) = row.ok_or_else(|| not_found(&id))?;
        if products > 0 {
            return Err(CategoryError::Conflict(format!(
                "Category '{}' is in use by {} product(s)",
                name, products
            )));
        }

        // ON DELETE SET NULL detaches child categories
        sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn order_clause(sort: Option<SortKey>, order: Option<SortOrder>) -> String {
    let column = match sort {
        None => return "id".to_string(),
        Some(SortKey::Name) => "name COLLATE NOCASE",
        Some(SortKey::ProductCount) => "product_count",
        Some(SortKey::Revenue) => "revenue",
        Some(SortKey::CreatedAt) => "created_at",
    };
    let direction = match order.unwrap_or_default() {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    format!("{} {}, id", column, direction)
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Local rows are keyed by integer; any other id cannot exist here.
fn local_key(id: &CategoryId) -> Result<i64, CategoryError> {
    match id {
        CategoryId::Int(key) => Ok(*key),
        other => Err(not_found(other)),
    }
}

fn not_found(id: &CategoryId) -> CategoryError {
    CategoryError::Conflict(format!("Category {} not found", id))
}

fn map_sqlx(err: sqlx::Error) -> CategoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return CategoryError::Conflict("A category with this name already exists".to_string());
        }
        if db.is_foreign_key_violation() {
            return CategoryError::Conflict("Parent category does not exist".to_string());
        }
    }
    CategoryError::Network(format!("Store error: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_clause_whitelists_columns() {
        assert_eq!(order_clause(None, None), "id");
        assert_eq!(
            order_clause(Some(SortKey::ProductCount), Some(SortOrder::Desc)),
            "product_count DESC, id"
        );
        assert_eq!(
            order_clause(Some(SortKey::Name), None),
            "name COLLATE NOCASE ASC, id"
        );
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        store.migrate().await.unwrap();
        let items = store
            .list(ListParams::default(), CancellationToken::new())
            .await
            .unwrap();
        assert!(items.is_empty());
    }
}
