//! Development fixtures.
//!
//! A fixture directory holds `users.json`, `tours.json` and `reviews.json`.
//! Records carry their own ids so reviews and tour guides can point at users
//! and tours from the same set. Passwords are given in clear text and hashed
//! on import.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait, Set, TransactionTrait};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::entities::user::{self, UserRole};
use crate::entities::{review, tour};
use crate::error::{AppError, AppResult};
use crate::handlers::tours::CreateTourRequest;
use crate::services::{ratings, users};
use crate::utils::password::hash_password;

#[derive(Debug, Deserialize, Validate)]
pub struct UserFixture {
    pub id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[serde(default = "default_role")]
    pub role: UserRole,
    pub photo: Option<String>,
}

fn default_role() -> UserRole {
    UserRole::User
}

#[derive(Debug, Deserialize)]
pub struct TourFixture {
    pub id: Uuid,
    #[serde(flatten)]
    pub tour: CreateTourRequest,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewFixture {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[validate(length(min = 1))]
    pub review: String,
    #[validate(range(min = 1.0, max = 5.0))]
    pub rating: f64,
    pub tour: Uuid,
    pub user: Uuid,
}

#[derive(Debug, Default)]
pub struct Fixtures {
    pub users: Vec<UserFixture>,
    pub tours: Vec<TourFixture>,
    pub reviews: Vec<ReviewFixture>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub users: u64,
    pub tours: u64,
    pub reviews: u64,
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<Vec<T>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", path.display(), e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::Validation(format!("Invalid fixture {}: {}", path.display(), e)))
}

impl Fixtures {
    pub async fn load(dir: &Path) -> AppResult<Self> {
        Ok(Self {
            users: read_json(&dir.join("users.json")).await?,
            tours: read_json(&dir.join("tours.json")).await?,
            reviews: read_json(&dir.join("reviews.json")).await?,
        })
    }

    /// Field rules plus references: guides and review authors must be
    /// fixture users, reviewed tours must be fixture tours, and a user
    /// reviews a tour at most once.
    pub fn validate(&self) -> AppResult<()> {
        let user_ids: HashSet<Uuid> = self.users.iter().map(|u| u.id).collect();
        let tour_ids: HashSet<Uuid> = self.tours.iter().map(|t| t.id).collect();

        for fixture in &self.users {
            fixture.validate()?;
        }

        for fixture in &self.tours {
            fixture.tour.validate()?;
            fixture.tour.check_discount()?;
            if let Some(guide) = fixture.tour.guides.iter().find(|g| !user_ids.contains(*g)) {
                return Err(AppError::Validation(format!(
                    "Tour {} lists unknown guide {}",
                    fixture.id, guide
                )));
            }
        }

        let mut reviewed = HashSet::new();
        for fixture in &self.reviews {
            fixture.validate()?;
            if !tour_ids.contains(&fixture.tour) || !user_ids.contains(&fixture.user) {
                return Err(AppError::Validation(format!(
                    "Review {} points at an unknown tour or user",
                    fixture.id
                )));
            }
            if !reviewed.insert((fixture.tour, fixture.user)) {
                return Err(AppError::Validation(format!(
                    "User {} reviews tour {} more than once",
                    fixture.user, fixture.tour
                )));
            }
        }

        Ok(())
    }
}

fn user_model(fixture: UserFixture) -> AppResult<user::ActiveModel> {
    let now = Utc::now().fixed_offset();
    Ok(user::ActiveModel {
        id: Set(fixture.id),
        name: Set(fixture.name.trim().to_string()),
        email: Set(users::normalize_email(&fixture.email)),
        photo: Set(fixture.photo.unwrap_or_else(|| "default.jpg".to_string())),
        password_hash: Set(hash_password(&fixture.password)?),
        password_changed_at: Set(None),
        role: Set(fixture.role),
        password_reset_token: Set(None),
        password_reset_expires: Set(None),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    })
}

fn review_model(fixture: ReviewFixture) -> review::ActiveModel {
    review::ActiveModel {
        id: Set(fixture.id),
        review: Set(fixture.review.trim().to_string()),
        rating: Set(fixture.rating),
        tour_id: Set(fixture.tour),
        user_id: Set(fixture.user),
        created_at: Set(Utc::now().fixed_offset()),
    }
}

/// Inserts the whole set in one transaction, then brings the rating stats
/// of every reviewed tour up to date.
pub async fn import(db: &DatabaseConnection, fixtures: Fixtures) -> AppResult<Counts> {
    fixtures.validate()?;

    let reviewed_tours: BTreeSet<Uuid> = fixtures.reviews.iter().map(|r| r.tour).collect();
    let users = fixtures
        .users
        .into_iter()
        .map(user_model)
        .collect::<AppResult<Vec<_>>>()?;
    let tours: Vec<tour::ActiveModel> = fixtures
        .tours
        .into_iter()
        .map(|fixture| fixture.tour.into_active_model(fixture.id))
        .collect();
    let reviews: Vec<review::ActiveModel> = fixtures.reviews.into_iter().map(review_model).collect();

    let txn = db.begin().await?;

    let mut counts = Counts {
        users: 0,
        tours: 0,
        reviews: 0,
    };
    if !users.is_empty() {
        counts.users = user::Entity::insert_many(users)
            .exec_without_returning(&txn)
            .await?;
    }
    if !tours.is_empty() {
        counts.tours = tour::Entity::insert_many(tours)
            .exec_without_returning(&txn)
            .await?;
    }
    if !reviews.is_empty() {
        counts.reviews = review::Entity::insert_many(reviews)
            .exec_without_returning(&txn)
            .await?;
    }

    for tour_id in &reviewed_tours {
        ratings::recalculate(&txn, *tour_id).await?;
    }
    txn.commit().await?;

    tracing::info!(
        users = counts.users,
        tours = counts.tours,
        reviews = counts.reviews,
        "Fixtures imported"
    );
    Ok(counts)
}

/// Removes every review, tour and user.
pub async fn delete_all(db: &DatabaseConnection) -> AppResult<Counts> {
    let txn = db.begin().await?;

    let reviews = review::Entity::delete_many().exec(&txn).await?.rows_affected;
    let tours = tour::Entity::delete_many().exec(&txn).await?.rows_affected;
    let users = user::Entity::delete_many().exec(&txn).await?.rows_affected;

    txn.commit().await?;

    let counts = Counts {
        users,
        tours,
        reviews,
    };
    tracing::info!(users, tours, reviews, "Fixtures deleted");
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use serde_json::json;

    use super::*;

    fn fixtures() -> Fixtures {
        let guide = Uuid::new_v4();
        let reviewer = Uuid::new_v4();
        let tour = Uuid::new_v4();

        Fixtures {
            users: serde_json::from_value(json!([
                {
                    "id": guide,
                    "name": "Steve T. Scaife",
                    "email": "steve@example.com",
                    "password": "test1234",
                    "role": "lead-guide"
                },
                {
                    "id": reviewer,
                    "name": "Sophie Louise Hart",
                    "email": "Sophie@Example.com",
                    "password": "test1234"
                }
            ]))
            .unwrap(),
            tours: serde_json::from_value(json!([{
                "id": tour,
                "name": "The Sea Explorer",
                "duration": 7,
                "maxGroupSize": 15,
                "difficulty": "medium",
                "price": 497,
                "summary": "Exploring the jaw-dropping US east coast by foot and by boat",
                "imageCover": "tour-2-cover.jpg",
                "guides": [guide]
            }]))
            .unwrap(),
            reviews: serde_json::from_value(json!([{
                "review": "Cras mollis nisi parturient mi nec aliquet suspendisse",
                "rating": 4,
                "tour": tour,
                "user": reviewer
            }]))
            .unwrap(),
        }
    }

    fn rows(n: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: n,
        }
    }

    #[test]
    fn test_user_role_defaults_to_user() {
        let set = fixtures();
        assert_eq!(set.users[0].role, UserRole::LeadGuide);
        assert_eq!(set.users[1].role, UserRole::User);
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_review_of_unknown_tour_is_rejected() {
        let mut set = fixtures();
        set.reviews[0].tour = Uuid::new_v4();
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_unknown_guide_is_rejected() {
        let mut set = fixtures();
        set.tours[0].tour.guides.push(Uuid::new_v4());
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_duplicate_review_is_rejected() {
        let mut set = fixtures();
        let first = &set.reviews[0];
        let again = ReviewFixture {
            id: Uuid::new_v4(),
            review: "Second opinion".to_string(),
            rating: 2.0,
            tour: first.tour,
            user: first.user,
        };
        set.reviews.push(again);
        assert!(set.validate().is_err());
    }

    #[tokio::test]
    async fn test_bundled_fixtures_are_consistent() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("dev-data");
        let set = Fixtures::load(&dir).await.unwrap();

        assert_eq!(set.users.len(), 5);
        assert_eq!(set.tours.len(), 2);
        assert_eq!(set.reviews.len(), 3);
        set.validate().unwrap();
    }

    #[tokio::test]
    async fn test_import_is_one_transaction_ending_in_recalculation() {
        let set = fixtures();
        let tour_id = set.tours[0].id;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([rows(2), rows(1), rows(1), rows(1)])
            .append_query_results([vec![BTreeMap::from([
                ("num_ratings", Value::from(1i64)),
                ("avg_rating", Value::from(4.0f64)),
            ])]])
            .into_connection();

        let counts = import(&db, set).await.unwrap();
        assert_eq!(
            counts,
            Counts {
                users: 2,
                tours: 1,
                reviews: 1
            }
        );

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 1);
        let sql: Vec<&str> = log[0].statements().iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(sql.first(), Some(&"BEGIN"));
        assert!(sql[1].starts_with("INSERT INTO \"user\""));
        assert!(sql[2].starts_with("INSERT INTO \"tour\""));
        assert!(sql[3].starts_with("INSERT INTO \"review\""));
        assert!(sql[5].starts_with("UPDATE \"tour\""));
        assert_eq!(sql.last(), Some(&"COMMIT"));

        let update = &log[0].statements()[5];
        let values = update.values.as_ref().map(|v| v.0.clone()).unwrap_or_default();
        assert!(values.contains(&Value::from(tour_id)));
    }

    #[tokio::test]
    async fn test_delete_all_clears_reviews_first() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([rows(3), rows(2), rows(4)])
            .into_connection();

        let counts = delete_all(&db).await.unwrap();
        assert_eq!(
            counts,
            Counts {
                users: 4,
                tours: 2,
                reviews: 3
            }
        );

        let log = db.into_transaction_log();
        let sql: Vec<&str> = log[0].statements().iter().map(|s| s.sql.as_str()).collect();
        assert!(sql[1].starts_with("DELETE FROM \"review\""));
        assert!(sql[2].starts_with("DELETE FROM \"tour\""));
        assert!(sql[3].starts_with("DELETE FROM \"user\""));
    }
}
