use std::collections::BTreeMap;

use chrono::Datelike;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Alias, Expr, Func, SimpleExpr};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, Order, QueryFilter, QueryOrder,
    QuerySelect, Select,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::tour::{self, Difficulty};
use crate::error::{AppError, AppResult};

/// Base query for every public tour read: secret tours are never listed,
/// found, or aggregated.
pub fn visible() -> Select<tour::Entity> {
    tour::Entity::find().filter(tour::Column::SecretTour.eq(false))
}

pub async fn find_visible<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<tour::Model> {
    visible()
        .filter(tour::Column::Id.eq(id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("No tour found with that ID".to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    pub difficulty: Difficulty,
    pub num_tours: i64,
    pub num_ratings: i64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Per-difficulty statistics over well rated tours, cheapest first.
pub async fn stats<C: ConnectionTrait>(db: &C) -> AppResult<Vec<DifficultyStats>> {
    let stats = visible()
        .select_only()
        .column(tour::Column::Difficulty)
        .column_as(SimpleExpr::from(Func::count(Expr::col(tour::Column::Id))), "num_tours")
        .column_as(
            SimpleExpr::from(Func::sum(Expr::col(tour::Column::RatingsQuantity))),
            "num_ratings",
        )
        .column_as(
            SimpleExpr::from(Func::avg(Expr::col(tour::Column::RatingsAverage))),
            "avg_rating",
        )
        .column_as(SimpleExpr::from(Func::avg(Expr::col(tour::Column::Price))), "avg_price")
        .column_as(SimpleExpr::from(Func::min(Expr::col(tour::Column::Price))), "min_price")
        .column_as(SimpleExpr::from(Func::max(Expr::col(tour::Column::Price))), "max_price")
        .filter(tour::Column::RatingsAverage.gte(4.5))
        .group_by(tour::Column::Difficulty)
        .order_by(SimpleExpr::from(Expr::col(Alias::new("avg_price"))), Order::Asc)
        .into_model::<DifficultyStats>()
        .all(db)
        .await?;

    Ok(stats)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthPlan {
    pub month: u32,
    pub num_tour_starts: usize,
    pub tours: Vec<String>,
}

#[derive(Debug, FromQueryResult)]
struct TourStarts {
    name: String,
    start_dates: Vec<DateTimeWithTimeZone>,
}

pub async fn monthly_plan<C: ConnectionTrait>(db: &C, year: i32) -> AppResult<Vec<MonthPlan>> {
    let tours = visible()
        .select_only()
        .column(tour::Column::Name)
        .column(tour::Column::StartDates)
        .into_model::<TourStarts>()
        .all(db)
        .await?;

    Ok(plan_year(
        year,
        tours.iter().map(|t| (t.name.as_str(), t.start_dates.as_slice())),
    ))
}

/// Groups each tour start within `year` by calendar month, busiest month
/// first. A tour starting twice in one month is listed twice.
pub fn plan_year<'a, I>(year: i32, tours: I) -> Vec<MonthPlan>
where
    I: IntoIterator<Item = (&'a str, &'a [DateTimeWithTimeZone])>,
{
    let mut months: BTreeMap<u32, Vec<String>> = BTreeMap::new();

    for (name, dates) in tours {
        for date in dates.iter().filter(|date| date.year() == year) {
            months.entry(date.month()).or_default().push(name.to_string());
        }
    }

    let mut plan: Vec<MonthPlan> = months
        .into_iter()
        .map(|(month, tours)| MonthPlan {
            month,
            num_tour_starts: tours.len(),
            tours,
        })
        .collect();

    // BTreeMap order gives month ascending for ties
    plan.sort_by(|a, b| b.num_tour_starts.cmp(&a.num_tour_starts));
    plan
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use sea_orm::{DbBackend, QueryTrait};

    use super::*;

    fn at(raw: &str) -> DateTimeWithTimeZone {
        DateTime::parse_from_rfc3339(raw).unwrap()
    }

    #[test]
    fn test_visible_excludes_secret_tours() {
        let sql = visible().build(DbBackend::Postgres).to_string();
        let expected = tour::Entity::find()
            .filter(tour::Column::SecretTour.eq(false))
            .build(DbBackend::Postgres)
            .to_string();

        assert_eq!(sql, expected);
        assert!(sql.contains("secret_tour"));
    }

    #[test]
    fn test_plan_year_groups_by_month() {
        let forest = vec![
            at("2021-04-25T09:00:00Z"),
            at("2021-07-20T09:00:00Z"),
            at("2021-10-05T09:00:00Z"),
        ];
        let sea = vec![
            at("2021-06-19T09:00:00Z"),
            at("2021-07-20T09:00:00Z"),
            at("2022-08-18T09:00:00Z"),
        ];

        let plan = plan_year(
            2021,
            [("The Forest Hiker", forest.as_slice()), ("The Sea Explorer", sea.as_slice())],
        );

        assert_eq!(
            plan[0],
            MonthPlan {
                month: 7,
                num_tour_starts: 2,
                tours: vec!["The Forest Hiker".to_string(), "The Sea Explorer".to_string()],
            }
        );
        let months: Vec<u32> = plan.iter().map(|p| p.month).collect();
        assert_eq!(months, vec![7, 4, 6, 10]);
    }

    #[test]
    fn test_plan_year_without_starts_is_empty() {
        let dates = vec![at("2019-01-01T00:00:00Z")];
        assert!(plan_year(2021, [("The Snow Adventurer", dates.as_slice())]).is_empty());
    }
}
