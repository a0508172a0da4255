use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::entities::tour::{self, Difficulty, GeoPoint, Locations};
use crate::entities::{review, user};
use crate::error::{AppError, AppResult};
use crate::features::{self, QueryFeatures};
use crate::handlers::{created, to_document, ApiResponse, Created};
use crate::services::ratings::BASELINE_AVERAGE;
use crate::services::{tours, users};
use crate::utils::extract::{AppPath, AppQuery, ValidJson};
use crate::utils::slug::slugify;
use crate::AppState;

/// Query merged into `GET /tours/top-5-cheap`.
pub const TOP_CHEAP: &[(&str, &str)] = &[
    ("limit", "5"),
    ("sort", "price,-ratingsAverage"),
    ("fields", "name,price,ratingsAverage"),
];

/// A tour as returned by the API, with its derived `durationWeeks`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TourDocument {
    #[serde(flatten)]
    pub tour: tour::Model,
    pub duration_weeks: f64,
}

impl From<tour::Model> for TourDocument {
    fn from(tour: tour::Model) -> Self {
        let duration_weeks = tour.duration_weeks();
        Self {
            tour,
            duration_weeks,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTourRequest {
    #[validate(length(
        min = 10,
        max = 40,
        message = "A tour name must have between 10 and 40 characters"
    ))]
    pub name: String,
    #[validate(range(min = 1, message = "A tour must have a duration"))]
    pub duration: i32,
    #[validate(range(min = 1, message = "A tour must have a group size"))]
    pub max_group_size: i32,
    pub difficulty: Difficulty,
    #[validate(range(max = 6.0, message = "Rating must be at most 6.0"))]
    pub ratings_average: Option<f64>,
    #[validate(range(min = 0.0, message = "A tour must have a price"))]
    pub price: f64,
    pub price_discount: Option<f64>,
    #[validate(length(min = 1, message = "A tour must have a summary"))]
    pub summary: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "A tour must have a cover image"))]
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub start_dates: Vec<DateTimeWithTimeZone>,
    #[serde(default)]
    pub secret_tour: bool,
    pub start_location: Option<GeoPoint>,
    #[serde(default)]
    pub locations: Vec<GeoPoint>,
    #[serde(default)]
    pub guides: Vec<Uuid>,
}

impl CreateTourRequest {
    /// Discount is only checked against the price it is created with
    pub fn check_discount(&self) -> AppResult<()> {
        match self.price_discount {
            Some(discount) if discount >= self.price => Err(AppError::Validation(format!(
                "Discount price ({}) should be below regular price",
                discount
            ))),
            _ => Ok(()),
        }
    }

    pub fn into_active_model(self, id: Uuid) -> tour::ActiveModel {
        let name = self.name.trim().to_string();
        tour::ActiveModel {
            id: Set(id),
            slug: Set(slugify(&name)),
            name: Set(name),
            duration: Set(self.duration),
            max_group_size: Set(self.max_group_size),
            difficulty: Set(self.difficulty),
            ratings_average: Set(self.ratings_average.unwrap_or(BASELINE_AVERAGE)),
            ratings_quantity: Set(0),
            price: Set(self.price),
            price_discount: Set(self.price_discount),
            summary: Set(self.summary.trim().to_string()),
            description: Set(self.description.map(|d| d.trim().to_string())),
            image_cover: Set(self.image_cover),
            images: Set(self.images),
            start_dates: Set(self.start_dates),
            secret_tour: Set(self.secret_tour),
            start_location: Set(self.start_location),
            locations: Set(Locations(self.locations)),
            guides: Set(self.guides),
            created_at: Set(Utc::now().fixed_offset()),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTourRequest {
    #[validate(length(
        min = 10,
        max = 40,
        message = "A tour name must have between 10 and 40 characters"
    ))]
    pub name: Option<String>,
    #[validate(range(min = 1))]
    pub duration: Option<i32>,
    #[validate(range(min = 1))]
    pub max_group_size: Option<i32>,
    pub difficulty: Option<Difficulty>,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    #[validate(length(min = 1))]
    pub summary: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1))]
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<DateTimeWithTimeZone>>,
    pub secret_tour: Option<bool>,
    pub start_location: Option<GeoPoint>,
    pub locations: Option<Vec<GeoPoint>>,
    pub guides: Option<Vec<Uuid>>,
}

async fn find_tours(
    state: &AppState,
    pairs: &[(String, String)],
) -> AppResult<Json<ApiResponse<Value>>> {
    let features = QueryFeatures::parse(pairs)?;
    let tours = features::apply(tours::visible(), &features)?
        .all(state.db.as_ref())
        .await?;

    let documents: Vec<TourDocument> = tours.into_iter().map(TourDocument::from).collect();
    Ok(ApiResponse::list(
        "tours",
        features.projection.apply_all(&documents)?,
    ))
}

/// List tours (filter, sort, fields, page, limit)
pub async fn list_tours(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<Vec<(String, String)>>,
) -> AppResult<Json<ApiResponse<Value>>> {
    find_tours(&state, &query).await
}

/// Five best-value tours
pub async fn top_cheap_tours(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<Vec<(String, String)>>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let query = features::with_preset(query, TOP_CHEAP);
    find_tours(&state, &query).await
}

pub async fn tour_stats(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Value>>> {
    let stats = tours::stats(state.db.as_ref()).await?;
    ApiResponse::one("stats", stats)
}

pub async fn monthly_plan(
    State(state): State<AppState>,
    AppPath(year): AppPath<i32>,
) -> AppResult<Json<ApiResponse<Value>>> {
    if !(1..=9999).contains(&year) {
        return Err(AppError::BadRequest(format!("Invalid year: {}", year)));
    }

    let plan = tours::monthly_plan(state.db.as_ref(), year).await?;
    ApiResponse::one("plan", plan)
}

/// Get one tour with its guides and reviews
pub async fn get_tour(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let tour = tours::find_visible(state.db.as_ref(), id).await?;

    let guides = if tour.guides.is_empty() {
        Vec::new()
    } else {
        users::active()
            .filter(user::Column::Id.is_in(tour.guides.clone()))
            .all(state.db.as_ref())
            .await?
    };

    let reviews = review::Entity::find()
        .filter(review::Column::TourId.eq(tour.id))
        .order_by_desc(review::Column::CreatedAt)
        .all(state.db.as_ref())
        .await?;

    let mut document = to_document(TourDocument::from(tour))?;
    document["guides"] = to_document(guides)?;
    document["reviews"] = to_document(reviews)?;

    ApiResponse::one("tour", document)
}

pub async fn create_tour(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreateTourRequest>,
) -> AppResult<Created<ApiResponse<Value>>> {
    payload.check_discount()?;
    let tour = payload
        .into_active_model(Uuid::new_v4())
        .insert(state.db.as_ref())
        .await?;
    tracing::info!(tour_id = %tour.id, slug = %tour.slug, "Tour created");

    Ok(created(ApiResponse::one("tour", TourDocument::from(tour))?))
}

pub async fn update_tour(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    ValidJson(payload): ValidJson<UpdateTourRequest>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let tour = tours::find_visible(state.db.as_ref(), id).await?;
    let mut active: tour::ActiveModel = tour.into();

    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        active.slug = Set(slugify(&name));
        active.name = Set(name);
    }
    if let Some(duration) = payload.duration {
        active.duration = Set(duration);
    }
    if let Some(max_group_size) = payload.max_group_size {
        active.max_group_size = Set(max_group_size);
    }
    if let Some(difficulty) = payload.difficulty {
        active.difficulty = Set(difficulty);
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(discount) = payload.price_discount {
        active.price_discount = Set(Some(discount));
    }
    if let Some(summary) = payload.summary {
        active.summary = Set(summary.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description.trim().to_string()));
    }
    if let Some(image_cover) = payload.image_cover {
        active.image_cover = Set(image_cover);
    }
    if let Some(images) = payload.images {
        active.images = Set(images);
    }
    if let Some(start_dates) = payload.start_dates {
        active.start_dates = Set(start_dates);
    }
    if let Some(secret_tour) = payload.secret_tour {
        active.secret_tour = Set(secret_tour);
    }
    if let Some(start_location) = payload.start_location {
        active.start_location = Set(Some(start_location));
    }
    if let Some(locations) = payload.locations {
        active.locations = Set(Locations(locations));
    }
    if let Some(guides) = payload.guides {
        active.guides = Set(guides);
    }

    let tour = active.update(state.db.as_ref()).await?;
    ApiResponse::one("tour", TourDocument::from(tour))
}

pub async fn delete_tour(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    let tour = tours::find_visible(state.db.as_ref(), id).await?;
    tour::Entity::delete_by_id(tour.id).exec(state.db.as_ref()).await?;

    tracing::info!(tour_id = %tour.id, "Tour deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_cheap_preset_overrides_caller() {
        let query = vec![
            ("limit".to_string(), "50".to_string()),
            ("difficulty".to_string(), "easy".to_string()),
        ];
        let features = QueryFeatures::parse(&features::with_preset(query, TOP_CHEAP)).unwrap();

        assert_eq!(features.pagination.limit, 5);
        assert_eq!(features.filters.len(), 1);
        assert_eq!(features.sort[0].field, "price");
        assert!(features.sort[1].descending);
        assert_eq!(
            features.projection,
            features::Projection::parse("name,price,ratingsAverage").unwrap()
        );
    }

    #[test]
    fn test_create_request_caps_rating_only_from_above() {
        let mut payload: CreateTourRequest = serde_json::from_value(serde_json::json!({
            "name": "The Forest Hiker",
            "duration": 5,
            "maxGroupSize": 25,
            "difficulty": "easy",
            "ratingsAverage": 0.5,
            "price": 397,
            "summary": "Breathtaking hike through the Canadian Banff National Park",
            "imageCover": "tour-1-cover.jpg"
        }))
        .unwrap();
        assert!(payload.validate().is_ok());

        payload.ratings_average = Some(6.5);
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("ratings_average"));
    }

    #[test]
    fn test_create_request_rejects_short_name() {
        let payload: CreateTourRequest = serde_json::from_value(serde_json::json!({
            "name": "Short",
            "duration": 5,
            "maxGroupSize": 25,
            "difficulty": "easy",
            "price": 397,
            "summary": "Breathtaking hike through the Canadian Banff National Park",
            "imageCover": "tour-1-cover.jpg"
        }))
        .unwrap();

        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
    }

    #[test]
    fn test_create_request_rejects_unknown_difficulty() {
        let result = serde_json::from_value::<CreateTourRequest>(serde_json::json!({
            "name": "The Forest Hiker",
            "duration": 5,
            "maxGroupSize": 25,
            "difficulty": "extreme",
            "price": 397,
            "summary": "Breathtaking hike",
            "imageCover": "tour-1-cover.jpg"
        }));

        assert!(result.is_err());
    }
}
