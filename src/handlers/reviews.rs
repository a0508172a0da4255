use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Select, Set, TransactionTrait,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::entities::review;
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::features::{self, QueryFeatures};
use crate::handlers::{created, to_document, ApiResponse, Created};
use crate::middleware::auth::AuthUser;
use crate::services::{ratings, tours};
use crate::utils::extract::{AppPath, AppQuery, ValidJson};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(length(min = 1, message = "Review can not be empty!"))]
    pub review: String,
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1 and 5"))]
    pub rating: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateReviewRequest {
    #[validate(length(min = 1, message = "Review can not be empty!"))]
    pub review: Option<String>,
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1 and 5"))]
    pub rating: Option<f64>,
}

/// Review document with its author reduced to `{ id, name, photo }`.
/// Soft-deleted authors show up as `null`.
fn review_document(review: review::Model, author: Option<user::Model>) -> AppResult<Value> {
    let mut document = to_document(review)?;
    document["user"] = match author.filter(|author| author.active) {
        Some(author) => json!({
            "id": author.id,
            "name": author.name,
            "photo": author.photo,
        }),
        None => Value::Null,
    };
    Ok(document)
}

async fn find_reviews(
    state: &AppState,
    base: Select<review::Entity>,
    pairs: &[(String, String)],
) -> AppResult<Json<ApiResponse<Value>>> {
    let features = QueryFeatures::parse(pairs)?;
    let rows = features::apply(base, &features)?
        .find_also_related(user::Entity)
        .all(state.db.as_ref())
        .await?;

    let documents = rows
        .into_iter()
        .map(|(review, author)| review_document(review, author))
        .map(|document| document.map(|d| features.projection.apply(d)))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::list("reviews", documents))
}

async fn find_review(state: &AppState, id: Uuid) -> AppResult<review::Model> {
    review::Entity::find_by_id(id)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("No review found with that ID".to_string()))
}

/// List all reviews
pub async fn list_reviews(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<Vec<(String, String)>>,
) -> AppResult<Json<ApiResponse<Value>>> {
    find_reviews(&state, review::Entity::find(), &query).await
}

/// List the reviews of one tour
pub async fn list_tour_reviews(
    State(state): State<AppState>,
    AppPath(tour_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<Vec<(String, String)>>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let base = review::Entity::find().filter(review::Column::TourId.eq(tour_id));
    find_reviews(&state, base, &query).await
}

pub async fn get_review(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let (review, author) = review::Entity::find_by_id(id)
        .find_also_related(user::Entity)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("No review found with that ID".to_string()))?;

    ApiResponse::one("review", review_document(review, author)?)
}

/// Review a tour as the logged in user
pub async fn create_review(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    AppPath(tour_id): AppPath<Uuid>,
    ValidJson(payload): ValidJson<CreateReviewRequest>,
) -> AppResult<Created<ApiResponse<Value>>> {
    let tour = tours::find_visible(state.db.as_ref(), tour_id).await?;

    let existing = review::Entity::find()
        .filter(review::Column::TourId.eq(tour.id))
        .filter(review::Column::UserId.eq(user.id))
        .one(state.db.as_ref())
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(
            "You have already reviewed this tour".to_string(),
        ));
    }

    let txn = state.db.begin().await?;

    let review = review::ActiveModel {
        id: Set(Uuid::new_v4()),
        review: Set(payload.review.trim().to_string()),
        rating: Set(payload.rating),
        tour_id: Set(tour.id),
        user_id: Set(user.id),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(&txn)
    .await?;

    ratings::recalculate(&txn, tour.id).await?;
    txn.commit().await?;

    tracing::info!(review_id = %review.id, tour_id = %tour.id, user_id = %user.id, "Review created");
    Ok(created(ApiResponse::one("review", review)?))
}

/// Update a review (author only)
pub async fn update_review(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    AppPath(id): AppPath<Uuid>,
    ValidJson(payload): ValidJson<UpdateReviewRequest>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let review = find_review(&state, id).await?;

    // Verify ownership
    if review.user_id != user.id {
        return Err(AppError::Forbidden(
            "You can only edit your own reviews".to_string(),
        ));
    }

    let tour_id = review.tour_id;
    let mut active: review::ActiveModel = review.into();
    if let Some(text) = payload.review {
        active.review = Set(text.trim().to_string());
    }
    if let Some(rating) = payload.rating {
        active.rating = Set(rating);
    }

    let txn = state.db.begin().await?;
    let review = active.update(&txn).await?;
    ratings::recalculate(&txn, tour_id).await?;
    txn.commit().await?;

    ApiResponse::one("review", review)
}

/// Delete a review (author or admin)
pub async fn delete_review(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    let review = find_review(&state, id).await?;

    if review.user_id != user.id && user.role != UserRole::Admin {
        return Err(AppError::Forbidden(
            "You can only delete your own reviews".to_string(),
        ));
    }

    let txn = state.db.begin().await?;
    review::Entity::delete_by_id(review.id).exec(&txn).await?;
    ratings::recalculate(&txn, review.tour_id).await?;
    txn.commit().await?;

    tracing::info!(review_id = %review.id, tour_id = %review.tour_id, "Review deleted");
    Ok(StatusCode::NO_CONTENT)
}
