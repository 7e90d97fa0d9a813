/// PostgreSQL repository
///
/// One generic implementation serves every entity. Rows are built in Rust
/// (`Entity::build` / `Entity::apply`) and written with `QueryBuilder`, so
/// the column list in [`PgEntity::FIELDS`] and the bind order in
/// [`PgEntity::push_values`] must line up. Updates run inside a transaction
/// holding a `FOR UPDATE` row lock.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::marker::PhantomData;
use tracing::debug;
use uuid::Uuid;

use super::{Entity, RepoResult, Repository};
use crate::query::{FilterValue, ListQuery};

/// SQL column mapping for an [`Entity`]
pub trait PgEntity: Entity + for<'r> FromRow<'r, PgRow> {
    /// Every persisted column, in bind order
    const FIELDS: &'static [&'static str];

    /// Binds one value per entry of `FIELDS`
    fn push_values(&self, values: &mut Separated<'_, '_, Postgres, &'static str>);
}

/// Generic PostgreSQL repository
pub struct PgRepository<E> {
    pool: PgPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: PgEntity> PgRepository<E> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    fn column_list() -> String {
        E::FIELDS.join(", ")
    }
}

fn push_filter_value(builder: &mut QueryBuilder<'_, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Text(v) => builder.push_bind(v.clone()),
        FilterValue::Number(v) => builder.push_bind(*v),
        FilterValue::Bool(v) => builder.push_bind(*v),
        FilterValue::Uuid(v) => builder.push_bind(*v),
        FilterValue::Timestamp(v) => builder.push_bind(*v),
    };
}

/// Builds `SELECT * FROM table WHERE ... ORDER BY ... LIMIT ... OFFSET ...`
fn build_select<'a, E: PgEntity>(query: &ListQuery) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT * FROM {} WHERE TRUE", E::TABLE));

    for filter in &query.filters {
        builder
            .push(" AND ")
            .push(filter.field)
            .push(" ")
            .push(filter.op.as_sql())
            .push(" ");
        push_filter_value(&mut builder, &filter.value);
    }

    builder.push(" ORDER BY ");
    if query.sort.is_empty() {
        builder.push("created_at DESC");
    } else {
        for (i, key) in query.sort.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder
                .push(key.field)
                .push(if key.descending { " DESC" } else { " ASC" });
        }
    }
    builder.push(", id ASC");

    if let Some(limit) = query.limit {
        builder.push(" LIMIT ").push_bind(i64::from(limit));
        builder
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
    }

    builder
}

#[async_trait]
impl<E: PgEntity> Repository<E> for PgRepository<E> {
    async fn insert(&self, data: E::Create) -> RepoResult<E> {
        let entity = E::build(data, Utc::now());

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}) VALUES (",
            E::TABLE,
            Self::column_list()
        ));
        {
            let mut values = builder.separated(", ");
            entity.push_values(&mut values);
        }
        builder.push(") RETURNING *");

        let created = builder.build_query_as::<E>().fetch_one(&self.pool).await?;
        debug!(table = E::TABLE, id = %created.id(), "Inserted row");

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<E>> {
        let row = sqlx::query_as::<_, E>(&format!("SELECT * FROM {} WHERE id = $1", E::TABLE))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_many(&self, query: &ListQuery) -> RepoResult<Vec<E>> {
        let mut builder = build_select::<E>(query);
        let rows = builder.build_query_as::<E>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn update(&self, id: Uuid, patch: E::Patch) -> RepoResult<Option<E>> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, E>(&format!(
            "SELECT * FROM {} WHERE id = $1 FOR UPDATE",
            E::TABLE
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut entity) = current else {
            tx.rollback().await?;
            return Ok(None);
        };

        entity.apply(patch, Utc::now());

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "UPDATE {} SET ({}) = (",
            E::TABLE,
            Self::column_list()
        ));
        {
            let mut values = builder.separated(", ");
            entity.push_values(&mut values);
        }
        builder.push(") WHERE id = ").push_bind(id).push(" RETURNING *");

        let updated = builder.build_query_as::<E>().fetch_one(&mut *tx).await?;
        tx.commit().await?;

        debug!(table = E::TABLE, id = %id, "Updated row");
        Ok(Some(updated))
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", E::TABLE))
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
