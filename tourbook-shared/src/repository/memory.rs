/// In-memory repository
///
/// Documents are kept in a `RwLock<HashMap>` keyed by id. Filters, sorting
/// and unique constraints are evaluated against each entity's serialized
/// JSON form, so the semantics follow the same column names the PostgreSQL
/// backend uses.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::{Entity, RepoError, RepoResult, Repository};
use crate::query::{compare_json, ListQuery, SortKey};

const DEFAULT_SORT: &[SortKey] = &[SortKey::desc("created_at")];

/// `RwLock<HashMap>`-backed repository for any [`Entity`]
pub struct MemoryRepository<E: Entity> {
    rows: RwLock<HashMap<Uuid, E>>,
}

impl<E: Entity> MemoryRepository<E> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Entity> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> RepoError {
    RepoError::Storage("repository lock poisoned".to_string())
}

fn to_document<E: Entity>(entity: &E) -> RepoResult<Value> {
    serde_json::to_value(entity).map_err(|e| RepoError::Storage(e.to_string()))
}

/// Rejects `candidate` if another row shares all fields of a unique key
///
/// Keys with a null or missing field are not enforced, like SQL `UNIQUE`.
fn check_unique<E: Entity>(rows: &HashMap<Uuid, E>, candidate: &E) -> RepoResult<()> {
    if E::UNIQUE_KEYS.is_empty() {
        return Ok(());
    }

    let document = to_document(candidate)?;
    let others = rows
        .values()
        .filter(|row| row.id() != candidate.id())
        .map(to_document)
        .collect::<RepoResult<Vec<_>>>()?;

    for key in E::UNIQUE_KEYS {
        let values: Vec<&Value> = key
            .fields
            .iter()
            .map(|field| document.get(*field).unwrap_or(&Value::Null))
            .collect();

        if values.iter().any(|v| v.is_null()) {
            continue;
        }

        let taken = others.iter().any(|other| {
            key.fields
                .iter()
                .zip(&values)
                .all(|(field, value)| other.get(*field) == Some(*value))
        });

        if taken {
            return Err(RepoError::Conflict(key.constraint.to_string()));
        }
    }

    Ok(())
}

fn compare_documents(sort: &[SortKey], a: &(Value, Uuid), b: &(Value, Uuid)) -> Ordering {
    for key in sort {
        let left = a.0.get(key.field).unwrap_or(&Value::Null);
        let right = b.0.get(key.field).unwrap_or(&Value::Null);
        let ordering = compare_json(left, right);
        let ordering = if key.descending {
            ordering.reverse()
        } else {
            ordering
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a.1.cmp(&b.1)
}

#[async_trait]
impl<E: Entity> Repository<E> for MemoryRepository<E> {
    async fn insert(&self, data: E::Create) -> RepoResult<E> {
        let entity = E::build(data, Utc::now());
        let mut rows = self.rows.write().map_err(|_| poisoned())?;

        check_unique(&rows, &entity)?;
        rows.insert(entity.id(), entity.clone());

        Ok(entity)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<E>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.get(&id).cloned())
    }

    async fn find_many(&self, query: &ListQuery) -> RepoResult<Vec<E>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;

        let mut matched = Vec::new();
        for entity in rows.values() {
            let document = to_document(entity)?;
            if query.matches(&document) {
                matched.push(((document, entity.id()), entity));
            }
        }

        let sort = if query.sort.is_empty() {
            DEFAULT_SORT
        } else {
            query.sort.as_slice()
        };
        matched.sort_by(|a, b| compare_documents(sort, &a.0, &b.0));

        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map(|l| l as usize)
            .unwrap_or(usize::MAX);

        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, entity)| entity.clone())
            .collect())
    }

    async fn update(&self, id: Uuid, patch: E::Patch) -> RepoResult<Option<E>> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;

        let Some(current) = rows.get(&id) else {
            return Ok(None);
        };

        let mut updated = current.clone();
        updated.apply(patch, Utc::now());
        check_unique(&rows, &updated)?;
        rows.insert(id, updated.clone());

        Ok(Some(updated))
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        Ok(rows.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tour::{CreateTour, Difficulty, Tour, UpdateTour};
    use crate::query::{Filter, FilterOp, FilterValue};

    fn tour(name: &str, price: f64) -> CreateTour {
        CreateTour {
            name: name.to_string(),
            duration: 5,
            max_group_size: 10,
            difficulty: Difficulty::Easy,
            ratings_average: None,
            price,
            price_discount: None,
            summary: "A short summary".to_string(),
            description: None,
            image_cover: "cover.jpg".to_string(),
            images: vec![],
            start_dates: vec![],
            guides: vec![],
            secret_tour: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_by_id() {
        let repo = MemoryRepository::<Tour>::new();
        let created = repo.insert(tour("The Forest Hiker", 397.0)).await.unwrap();

        let found = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.name, "The Forest Hiker");
        assert_eq!(found.slug, "the-forest-hiker");
        assert_eq!(repo.len(), 1);

        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_key_conflict() {
        let repo = MemoryRepository::<Tour>::new();
        repo.insert(tour("The Forest Hiker", 397.0)).await.unwrap();

        let err = repo.insert(tour("The Forest Hiker", 100.0)).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(ref c) if c == "tours_name_key"));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_update_rejects_conflict_and_keeps_row() {
        let repo = MemoryRepository::<Tour>::new();
        repo.insert(tour("The Forest Hiker", 397.0)).await.unwrap();
        let second = repo.insert(tour("The Sea Explorer", 497.0)).await.unwrap();

        let patch = UpdateTour {
            name: Some("The Forest Hiker".to_string()),
            ..Default::default()
        };
        assert!(repo.update(second.id, patch).await.is_err());

        let unchanged = repo.find_by_id(second.id).await.unwrap().unwrap();
        assert_eq!(unchanged.name, "The Sea Explorer");

        let missing = repo
            .update(Uuid::new_v4(), UpdateTour::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_find_many_filters_sorts_and_paginates() {
        let repo = MemoryRepository::<Tour>::new();
        repo.insert(tour("The Forest Hiker", 397.0)).await.unwrap();
        repo.insert(tour("The Sea Explorer", 497.0)).await.unwrap();
        repo.insert(tour("The Snow Adventurer", 997.0)).await.unwrap();

        let query = ListQuery {
            sort: vec![SortKey::asc("price")],
            ..ListQuery::all()
        }
        .filter(Filter::new("price", FilterOp::Gte, FilterValue::Number(400.0)));
        let tours = repo.find_many(&query).await.unwrap();
        let names: Vec<_> = tours.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["The Sea Explorer", "The Snow Adventurer"]);

        let page = ListQuery {
            sort: vec![SortKey::desc("price")],
            page: 2,
            limit: Some(2),
            ..ListQuery::all()
        };
        let tours = repo.find_many(&page).await.unwrap();
        assert_eq!(tours.len(), 1);
        assert_eq!(tours[0].name, "The Forest Hiker");
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = MemoryRepository::<Tour>::new();
        let created = repo.insert(tour("The Forest Hiker", 397.0)).await.unwrap();

        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
        assert!(repo.is_empty());
    }
}
