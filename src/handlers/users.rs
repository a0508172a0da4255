use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::entities::review;
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::features::{self, QueryFeatures};
use crate::handlers::ApiResponse;
use crate::middleware::auth::AuthUser;
use crate::services::{ratings, users};
use crate::utils::extract::{AppPath, AppQuery, ValidJson};
use crate::utils::upload::image_extension;
use crate::AppState;

#[derive(Debug, Default, Validate)]
struct UpdateMeForm {
    #[validate(length(min = 1, max = 100, message = "Please tell us your name (at most 100 characters)!"))]
    name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub photo: Option<String>,
}

/// Stored name of an uploaded profile photo.
pub fn photo_filename(user_id: Uuid, uploaded_at_ms: i64, extension: &str) -> String {
    format!("user-{}-{}.{}", user_id, uploaded_at_ms, extension)
}

/// The logged in user
pub async fn me(Extension(AuthUser(user)): Extension<AuthUser>) -> AppResult<Json<ApiResponse<Value>>> {
    ApiResponse::one("user", user)
}

/// Update name, email and photo of the logged in user (multipart form)
pub async fn update_me(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let mut multipart = multipart.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let mut form = UpdateMeForm::default();
    let mut photo = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "name" => form.name = Some(field.text().await?.trim().to_string()),
            "email" => form.email = Some(field.text().await?),
            "photo" => {
                let extension = image_extension(field.content_type())?;
                photo = Some((extension, field.bytes().await?));
            }
            "password" | "passwordConfirm" => {
                return Err(AppError::BadRequest(
                    "This route is not for password updates. Please use /updatePassword."
                        .to_string(),
                ));
            }
            // Role and other fields are not self-service
            _ => {}
        }
    }

    form.validate()?;

    let user_id = user.id;
    let mut active: user::ActiveModel = user.into();

    if let Some(name) = form.name {
        active.name = Set(name);
    }
    if let Some(email) = form.email {
        active.email = Set(users::normalize_email(&email));
    }
    if let Some((extension, contents)) = photo {
        let filename = photo_filename(user_id, Utc::now().timestamp_millis(), &extension);
        let stored = state.files.store(&filename, contents).await?;
        tracing::debug!(user_id = %user_id, size = stored.size, "Stored profile photo");
        active.photo = Set(stored.filename);
    }
    active.updated_at = Set(Utc::now().fixed_offset());

    let user = active.update(state.db.as_ref()).await?;
    ApiResponse::one("user", user)
}

/// Deactivate the logged in user's account
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> AppResult<StatusCode> {
    let user_id = user.id;
    let mut active: user::ActiveModel = user.into();
    active.active = Set(false);
    active.updated_at = Set(Utc::now().fixed_offset());
    active.update(state.db.as_ref()).await?;

    tracing::info!(user_id = %user_id, "User deactivated");
    Ok(StatusCode::NO_CONTENT)
}

/// List users (admin)
pub async fn list_users(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<Vec<(String, String)>>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let features = QueryFeatures::parse(&query)?;
    let users = features::apply(users::active(), &features)?
        .all(state.db.as_ref())
        .await?;

    Ok(ApiResponse::list(
        "users",
        features.projection.apply_all(&users)?,
    ))
}

/// Accounts are only created through signup
pub async fn create_user() -> AppResult<StatusCode> {
    Err(AppError::BadRequest(
        "This route is not defined, please use /signup instead".to_string(),
    ))
}

pub async fn get_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let user = users::find_active(state.db.as_ref(), id).await?;
    ApiResponse::one("user", user)
}

/// Update a user (admin). Passwords are never changed here.
pub async fn update_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    ValidJson(payload): ValidJson<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let user = users::find_active(state.db.as_ref(), id).await?;
    let mut active: user::ActiveModel = user.into();

    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(email) = payload.email {
        active.email = Set(users::normalize_email(&email));
    }
    if let Some(role) = payload.role {
        active.role = Set(role);
    }
    if let Some(photo) = payload.photo {
        active.photo = Set(photo);
    }
    active.updated_at = Set(Utc::now().fixed_offset());

    let user = active.update(state.db.as_ref()).await?;
    ApiResponse::one("user", user)
}

/// Delete a user (admin). Their reviews go with them, so the reviewed
/// tours get their ratings recalculated.
pub async fn delete_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    let user = users::find_active(state.db.as_ref(), id).await?;

    let txn = state.db.begin().await?;

    let reviewed_tours: Vec<Uuid> = review::Entity::find()
        .select_only()
        .column(review::Column::TourId)
        .filter(review::Column::UserId.eq(user.id))
        .into_tuple()
        .all(&txn)
        .await?;

    user::Entity::delete_by_id(user.id).exec(&txn).await?;

    for tour_id in &reviewed_tours {
        ratings::recalculate(&txn, *tour_id).await?;
    }
    txn.commit().await?;

    tracing::info!(
        user_id = %user.id,
        tours = reviewed_tours.len(),
        "User deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_filename() {
        let id = Uuid::nil();
        assert_eq!(
            photo_filename(id, 1_700_000_000_000, "jpeg"),
            "user-00000000-0000-0000-0000-000000000000-1700000000000.jpeg"
        );
    }

    #[test]
    fn test_update_me_form_rejects_bad_email() {
        let form = UpdateMeForm {
            name: Some("Jonas".to_string()),
            email: Some("jonas-at-example".to_string()),
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_names_are_capped_at_column_width() {
        let form = UpdateMeForm {
            name: Some("x".repeat(101)),
            email: None,
        };
        assert!(form.validate().is_err());

        let payload = UpdateUserRequest {
            name: Some("x".repeat(100)),
            email: None,
            role: None,
            photo: None,
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_admin_update_has_no_password_field() {
        let payload: UpdateUserRequest = serde_json::from_value(serde_json::json!({
            "role": "lead-guide",
            "password": "ignored-entirely"
        }))
        .unwrap();

        assert_eq!(payload.role, Some(UserRole::LeadGuide));
    }
}
