/// Booking model
///
/// Bookings are normally created by webhook reconciliation, which records
/// the provider's checkout session id. At most one booking exists per
/// session id (`bookings_checkout_session_id_key`); administrator-created
/// bookings carry no session id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::Postgres;
use sqlx::query_builder::Separated;
use uuid::Uuid;
use validator::Validate;

use crate::query::{Column, ColumnKind};
use crate::repository::{Entity, PgEntity, UniqueKey};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub tour_id: Uuid,
    pub user_id: Uuid,

    /// Price paid, major currency units
    pub price: f64,

    pub paid: bool,

    /// Provider checkout session this booking was reconciled from
    pub checkout_session_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_paid() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBooking {
    pub tour_id: Uuid,
    pub user_id: Uuid,

    #[validate(range(min = 0.0, message = "Booking price cannot be negative"))]
    pub price: f64,

    #[serde(default = "default_paid")]
    pub paid: bool,

    #[validate(length(min = 1, message = "Checkout session id must not be empty"))]
    pub checkout_session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateBooking {
    pub tour_id: Option<Uuid>,
    pub user_id: Option<Uuid>,

    #[validate(range(min = 0.0, message = "Booking price cannot be negative"))]
    pub price: Option<f64>,

    pub paid: Option<bool>,
}

impl Entity for Booking {
    type Create = CreateBooking;
    type Patch = UpdateBooking;

    const NAME: &'static str = "booking";
    const TABLE: &'static str = "bookings";

    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnKind::Uuid),
        Column::new("tour_id", ColumnKind::Uuid),
        Column::new("user_id", ColumnKind::Uuid),
        Column::new("price", ColumnKind::Number),
        Column::new("paid", ColumnKind::Bool),
        Column::new("checkout_session_id", ColumnKind::Text),
        Column::new("created_at", ColumnKind::Timestamp),
        Column::new("updated_at", ColumnKind::Timestamp),
    ];

    const UNIQUE_KEYS: &'static [UniqueKey] = &[UniqueKey {
        constraint: "bookings_checkout_session_id_key",
        fields: &["checkout_session_id"],
    }];

    fn id(&self) -> Uuid {
        self.id
    }

    fn build(data: CreateBooking, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tour_id: data.tour_id,
            user_id: data.user_id,
            price: data.price,
            paid: data.paid,
            checkout_session_id: data.checkout_session_id,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, patch: UpdateBooking, now: DateTime<Utc>) {
        if let Some(tour_id) = patch.tour_id {
            self.tour_id = tour_id;
        }
        if let Some(user_id) = patch.user_id {
            self.user_id = user_id;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(paid) = patch.paid {
            self.paid = paid;
        }
        self.updated_at = now;
    }
}

impl PgEntity for Booking {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "tour_id",
        "user_id",
        "price",
        "paid",
        "checkout_session_id",
        "created_at",
        "updated_at",
    ];

    fn push_values(&self, values: &mut Separated<'_, '_, Postgres, &'static str>) {
        values
            .push_bind(self.id)
            .push_bind(self.tour_id)
            .push_bind(self.user_id)
            .push_bind(self.price)
            .push_bind(self.paid)
            .push_bind(self.checkout_session_id.clone())
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paid_defaults_to_true() {
        let input: CreateBooking = serde_json::from_value(serde_json::json!({
            "tour_id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "price": 497.0,
        }))
        .unwrap();

        assert!(input.paid);
        assert!(input.checkout_session_id.is_none());
        assert!(input.validate().is_ok());

        let booking = Booking::build(input, Utc::now());
        assert!(booking.paid);
    }

    #[test]
    fn test_negative_price_rejected() {
        let patch = UpdateBooking {
            price: Some(-1.0),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }
}
