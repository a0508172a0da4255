//! Keeps a tour's `ratings_average` / `ratings_quantity` in step with its
//! reviews.
//!
//! Every review write calls [`recalculate`] for the affected tour on the same
//! connection (normally the write's transaction). The stats are always
//! derived from the full review set, so running it again, or racing another
//! recalculation for the same tour, converges on the same values.

use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, QueryFilter, QuerySelect,
};
use uuid::Uuid;

use crate::entities::{review, tour};
use crate::error::{AppError, AppResult};

/// Average shown for a tour nobody has reviewed yet.
pub const BASELINE_AVERAGE: f64 = 4.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingStats {
    pub quantity: i32,
    pub average: f64,
}

impl RatingStats {
    pub fn baseline() -> Self {
        Self {
            quantity: 0,
            average: BASELINE_AVERAGE,
        }
    }

    fn from_aggregate(aggregate: ReviewAggregate) -> AppResult<Self> {
        match (aggregate.num_ratings, aggregate.avg_rating) {
            (0, _) | (_, None) => Ok(Self::baseline()),
            (count, Some(average)) => Ok(Self {
                quantity: i32::try_from(count).map_err(|_| {
                    AppError::Internal(format!("Review count out of range: {}", count))
                })?,
                average,
            }),
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct ReviewAggregate {
    num_ratings: i64,
    avg_rating: Option<f64>,
}

/// Count and mean rating of the tour's current reviews.
pub async fn compute<C: ConnectionTrait>(db: &C, tour_id: Uuid) -> AppResult<RatingStats> {
    let aggregate = review::Entity::find()
        .select_only()
        .column_as(
            SimpleExpr::from(Func::count(Expr::col(review::Column::Id))),
            "num_ratings",
        )
        .column_as(
            SimpleExpr::from(Func::avg(Expr::col(review::Column::Rating))),
            "avg_rating",
        )
        .filter(review::Column::TourId.eq(tour_id))
        .into_model::<ReviewAggregate>()
        .one(db)
        .await?
        .unwrap_or(ReviewAggregate {
            num_ratings: 0,
            avg_rating: None,
        });

    RatingStats::from_aggregate(aggregate)
}

/// Recomputes the tour's stats and writes them straight onto the row. This
/// is an internal consistency write, so no user-facing validation runs.
pub async fn recalculate<C: ConnectionTrait>(db: &C, tour_id: Uuid) -> AppResult<RatingStats> {
    let stats = compute(db, tour_id).await?;

    tour::Entity::update_many()
        .col_expr(tour::Column::RatingsQuantity, Expr::value(stats.quantity))
        .col_expr(tour::Column::RatingsAverage, Expr::value(stats.average))
        .filter(tour::Column::Id.eq(tour_id))
        .exec(db)
        .await?;

    tracing::debug!(
        tour_id = %tour_id,
        quantity = stats.quantity,
        average = stats.average,
        "Recalculated tour ratings"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};

    use super::*;

    fn aggregate_row(count: i64, average: Option<f64>) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("num_ratings", Value::from(count)),
            ("avg_rating", Value::Double(average)),
        ])
    }

    fn updated() -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }
    }

    /// Values bound to the UPDATE statement: quantity, average, tour id.
    fn update_values(db: sea_orm::DatabaseConnection) -> Vec<Value> {
        let log = db.into_transaction_log();
        let update = log
            .iter()
            .flat_map(|txn| txn.statements())
            .find(|stmt| stmt.sql.starts_with("UPDATE"))
            .expect("no UPDATE statement was issued");
        update.values.as_ref().map(|v| v.0.clone()).unwrap_or_default()
    }

    #[test]
    fn test_zero_reviews_resets_to_baseline() {
        let stats = RatingStats::from_aggregate(ReviewAggregate {
            num_ratings: 0,
            avg_rating: None,
        })
        .unwrap();

        assert_eq!(stats, RatingStats { quantity: 0, average: 4.5 });
    }

    #[tokio::test]
    async fn test_recalculate_writes_mean_and_count() {
        let tour_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![aggregate_row(2, Some(3.0))]])
            .append_exec_results([updated()])
            .into_connection();

        let stats = recalculate(&db, tour_id).await.unwrap();
        assert_eq!(stats, RatingStats { quantity: 2, average: 3.0 });

        let values = update_values(db);
        assert!(values.contains(&Value::from(2i32)));
        assert!(values.contains(&Value::from(3.0f64)));
        assert!(values.contains(&Value::from(tour_id)));
    }

    #[tokio::test]
    async fn test_recalculate_after_last_review_removed() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![aggregate_row(0, None)]])
            .append_exec_results([updated()])
            .into_connection();

        let stats = recalculate(&db, Uuid::new_v4()).await.unwrap();
        assert_eq!(stats, RatingStats::baseline());

        let values = update_values(db);
        assert!(values.contains(&Value::from(0i32)));
        assert!(values.contains(&Value::from(4.5f64)));
    }

    #[tokio::test]
    async fn test_recalculate_is_idempotent() {
        let tour_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([
                vec![aggregate_row(3, Some(4.0))],
                vec![aggregate_row(3, Some(4.0))],
            ])
            .append_exec_results([updated(), updated()])
            .into_connection();

        let first = recalculate(&db, tour_id).await.unwrap();
        let second = recalculate(&db, tour_id).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failed_stats_write_is_reported() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![aggregate_row(1, Some(5.0))]])
            .append_exec_errors([sea_orm::DbErr::Custom("tour row locked".to_string())])
            .into_connection();

        assert!(recalculate(&db, Uuid::new_v4()).await.is_err());
    }
}
