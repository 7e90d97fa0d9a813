/// User administration
///
/// Admins list, read, update and delete users through the CRUD factory.
/// Accounts are created by signup only. Deactivated users are hidden.
/// Deleting a user removes their reviews and bookings and refreshes the
/// ratings of the tours they reviewed.

use async_trait::async_trait;
use std::{collections::BTreeSet, sync::Arc};
use tourbook_shared::{
    models::{booking::Booking, review::Review, user::User},
    query::{Filter, FilterValue},
    repository::Repository,
};
use tracing::debug;

use crate::{
    app::AppState,
    error::ApiResult,
    routes::{
        factory::{delete_where, Resource},
        reviews::sync_tour_ratings,
    },
};

#[async_trait]
impl Resource for User {
    fn repo(state: &AppState) -> Arc<dyn Repository<Self>> {
        state.repos.users.clone()
    }

    fn default_scope() -> Vec<Filter> {
        vec![Filter::eq("active", FilterValue::Bool(true))]
    }

    async fn before_delete(state: &AppState, user: &Self) -> ApiResult<()> {
        let owned_by = Filter::eq("user_id", FilterValue::Uuid(user.id));
        let reviews = delete_where::<Review>(state, owned_by.clone()).await?;
        let bookings = delete_where::<Booking>(state, owned_by).await?;

        let reviewed: BTreeSet<_> = reviews.iter().map(|review| review.tour_id).collect();
        for tour_id in reviewed {
            sync_tour_ratings(state, tour_id).await?;
        }

        debug!(
            user_id = %user.id,
            reviews = reviews.len(),
            bookings = bookings.len(),
            "Removed records of deleted user"
        );
        Ok(())
    }
}
