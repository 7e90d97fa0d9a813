/// Repository layer
///
/// Every entity is persisted through the same minimal capability set
/// (`insert`, `find_by_id`, `find_many`, `update`, `delete`), expressed as
/// the async [`Repository`] trait. It is implemented once generically for
/// PostgreSQL ([`postgres::PgRepository`]) and once in memory
/// ([`memory::MemoryRepository`]); entity types plug in through [`Entity`]
/// (and [`postgres::PgEntity`] for the SQL column mapping).
///
/// [`Repositories`] bundles one handle per entity together with the backend
/// that owns the connections. It is constructed once at startup, injected
/// into the HTTP layer and closed on shutdown.
///
/// # Example
///
/// ```
/// use tourbook_shared::repository::Repositories;
/// use tourbook_shared::query::ListQuery;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let repos = Repositories::in_memory();
/// let tours = repos.tours.find_many(&ListQuery::all()).await?;
/// assert!(tours.is_empty());
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{booking::Booking, review::Review, tour::Tour, user::User};
use crate::query::{Column, Filter, ListQuery};

pub use memory::MemoryRepository;
pub use postgres::{PgEntity, PgRepository};

/// Repository result alias
pub type RepoResult<T> = Result<T, RepoError>;

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A unique constraint was violated (constraint name)
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    /// A referenced record does not exist (constraint name)
    #[error("Referenced record does not exist: {0}")]
    InvalidReference(String),

    /// A check constraint rejected the row (constraint name)
    #[error("Check constraint violated: {0}")]
    CheckViolation(String),

    /// Underlying database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// In-memory storage failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                Some("23505") => return RepoError::Conflict(constraint),
                Some("23503") => return RepoError::InvalidReference(constraint),
                Some("23514") => return RepoError::CheckViolation(constraint),
                _ => {}
            }
        }

        RepoError::Database(err)
    }
}

/// A named unique constraint over one or more serialized fields
#[derive(Debug, Clone, Copy)]
pub struct UniqueKey {
    pub constraint: &'static str,
    pub fields: &'static [&'static str],
}

/// A persisted document type
///
/// `build` and `apply` hold the entity's defaulting and derivation rules
/// (slugs, normalized emails, timestamps) so both backends produce the same
/// rows.
pub trait Entity: Serialize + Clone + Send + Sync + Unpin + 'static {
    /// Input for creating a new entity
    type Create: Send + Sync + 'static;

    /// Partial update input
    type Patch: Send + Sync + 'static;

    /// Singular resource name used in messages ("tour")
    const NAME: &'static str;

    /// Table name
    const TABLE: &'static str;

    /// Columns that may be filtered and sorted on
    const COLUMNS: &'static [Column];

    /// Unique constraints
    const UNIQUE_KEYS: &'static [UniqueKey];

    /// Primary key
    fn id(&self) -> Uuid;

    /// Creates a new entity with a fresh id
    fn build(data: Self::Create, now: DateTime<Utc>) -> Self;

    /// Applies a partial update
    fn apply(&mut self, patch: Self::Patch, now: DateTime<Utc>);
}

/// The repository capability set shared by every entity
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Inserts a new entity and returns it
    async fn insert(&self, data: E::Create) -> RepoResult<E>;

    /// Fetches an entity by id
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<E>>;

    /// Fetches the entities matching a list query, sorted and paginated
    ///
    /// An empty sort orders by `created_at` descending. Ties are broken by id.
    async fn find_many(&self, query: &ListQuery) -> RepoResult<Vec<E>>;

    /// Applies a partial update atomically; `None` if the id doesn't exist
    async fn update(&self, id: Uuid, patch: E::Patch) -> RepoResult<Option<E>>;

    /// Deletes by id; `false` if the id doesn't exist
    async fn delete(&self, id: Uuid) -> RepoResult<bool>;

    /// First entity matching all filters
    async fn find_first(&self, filters: Vec<Filter>) -> RepoResult<Option<E>> {
        let query = ListQuery {
            limit: Some(1),
            ..ListQuery::all()
        }
        .scoped(filters);

        Ok(self.find_many(&query).await?.into_iter().next())
    }
}

#[derive(Clone)]
enum Backend {
    Postgres(PgPool),
    Memory,
}

/// One repository handle per entity plus the backend that owns them
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn Repository<User>>,
    pub tours: Arc<dyn Repository<Tour>>,
    pub reviews: Arc<dyn Repository<Review>>,
    pub bookings: Arc<dyn Repository<Booking>>,
    backend: Backend,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgRepository::<User>::new(pool.clone())),
            tours: Arc::new(PgRepository::<Tour>::new(pool.clone())),
            reviews: Arc::new(PgRepository::<Review>::new(pool.clone())),
            bookings: Arc::new(PgRepository::<Booking>::new(pool.clone())),
            backend: Backend::Postgres(pool),
        }
    }

    /// Empty in-memory repositories (tests and local development)
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MemoryRepository::<User>::new()),
            tours: Arc::new(MemoryRepository::<Tour>::new()),
            reviews: Arc::new(MemoryRepository::<Review>::new()),
            bookings: Arc::new(MemoryRepository::<Booking>::new()),
            backend: Backend::Memory,
        }
    }

    /// Backend name for health reporting
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Postgres(_) => "postgres",
            Backend::Memory => "memory",
        }
    }

    /// Checks backend connectivity
    pub async fn ping(&self) -> RepoResult<()> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(crate::db::pool::health_check(pool).await?),
            Backend::Memory => Ok(()),
        }
    }

    /// Releases backend resources
    pub async fn close(&self) {
        if let Backend::Postgres(pool) = &self.backend {
            crate::db::pool::close_pool(pool).await;
        }
    }
}
