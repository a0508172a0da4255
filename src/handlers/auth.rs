use axum::{extract::State, Extension, Json};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::handlers::{created, ApiResponse, Created};
use crate::middleware::auth::AuthUser;
use crate::services::users::{self, NewUser};
use crate::utils::extract::{AppPath, ValidJson};
use crate::utils::jwt::create_token;
use crate::utils::mail::Mail;
use crate::utils::password::{generate_reset_token, hash_reset_token, verify_password};
use crate::AppState;

/// Reset tokens stay valid this long.
const RESET_TOKEN_MINUTES: i64 = 10;

const FORGOT_PASSWORD_MESSAGE: &str =
    "If that email belongs to an account, a reset link has been sent to it!";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 100, message = "Please tell us your name (at most 100 characters)!"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords are not the same!"))]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords are not the same!"))]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[serde(alias = "currentPassword")]
    pub password_current: String,
    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords are not the same!"))]
    pub password_confirm: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub status: &'static str,
    pub token: String,
    pub data: Value,
}

fn send_token(state: &AppState, user: user::Model) -> AppResult<Json<AuthResponse>> {
    let token = create_token(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_expiration_hours,
    )?;

    Ok(Json(AuthResponse {
        status: "success",
        token,
        data: json!({ "user": user }),
    }))
}

/// Register a new `user`-role account
pub async fn signup(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<SignupRequest>,
) -> AppResult<Created<AuthResponse>> {
    let user = users::create(
        state.db.as_ref(),
        NewUser {
            name: &payload.name,
            email: &payload.email,
            password: &payload.password,
            role: UserRole::User,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "User signed up");
    Ok(created(send_token(&state, user)?))
}

/// Login with email and password
pub async fn login(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (Some(email), Some(password)) = (payload.email, payload.password) else {
        return Err(AppError::BadRequest(
            "Please provide email and password!".to_string(),
        ));
    };

    let user = users::find_active_by_email(state.db.as_ref(), &email).await?;

    match user {
        Some(user) if verify_password(&password, &user.password_hash)? => {
            send_token(&state, user)
        }
        _ => {
            tracing::warn!(email = %users::normalize_email(&email), "Failed login attempt");
            Err(AppError::Unauthorized(
                "Incorrect email or password".to_string(),
            ))
        }
    }
}

/// Mail a password reset link. The response never reveals whether the
/// address is registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<ForgotPasswordRequest>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let Some(user) = users::find_active_by_email(state.db.as_ref(), &payload.email).await? else {
        return Ok(ApiResponse::new(json!({ "message": FORGOT_PASSWORD_MESSAGE })));
    };

    let reset = generate_reset_token();
    let user_id = user.id;
    let recipient = user.email.clone();

    let mut active: user::ActiveModel = user.into();
    active.password_reset_token = Set(Some(reset.hashed));
    active.password_reset_expires =
        Set(Some((Utc::now() + Duration::minutes(RESET_TOKEN_MINUTES)).fixed_offset()));
    let user = active.update(state.db.as_ref()).await?;

    let reset_url = format!(
        "{}/api/v1/users/resetPassword/{}",
        state.config.public_url.trim_end_matches('/'),
        reset.raw
    );
    let mail = Mail {
        recipient,
        subject: format!(
            "Your password reset token (valid for {} min)",
            RESET_TOKEN_MINUTES
        ),
        message: format!(
            "Forgot your password? Submit a PATCH request with your new password and \
             passwordConfirm to: {}.\nIf you didn't forget your password, please ignore this email!",
            reset_url
        ),
    };

    if let Err(err) = state.mailer.send(mail).await {
        let mut active: user::ActiveModel = user.into();
        active.password_reset_token = Set(None);
        active.password_reset_expires = Set(None);
        active.update(state.db.as_ref()).await?;

        tracing::error!(user_id = %user_id, error = %err, "Failed to send password reset mail");
        return Err(AppError::Internal(
            "There was an error sending the email. Try again later!".to_string(),
        ));
    }

    tracing::info!(user_id = %user_id, "Password reset mail sent");
    Ok(ApiResponse::new(json!({ "message": FORGOT_PASSWORD_MESSAGE })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    AppPath(token): AppPath<String>,
    ValidJson(payload): ValidJson<ResetPasswordRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = users::active()
        .filter(user::Column::PasswordResetToken.eq(hash_reset_token(&token)))
        .filter(user::Column::PasswordResetExpires.gt(Utc::now().fixed_offset()))
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| AppError::BadRequest("Token is invalid or has expired".to_string()))?;

    let user = users::set_password(state.db.as_ref(), user, &payload.password).await?;

    tracing::info!(user_id = %user.id, "Password reset");
    send_token(&state, user)
}

/// Change the password of the logged in user
pub async fn update_password(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    ValidJson(payload): ValidJson<UpdatePasswordRequest>,
) -> AppResult<Json<AuthResponse>> {
    if !verify_password(&payload.password_current, &user.password_hash)? {
        return Err(AppError::Unauthorized(
            "Your current password is wrong.".to_string(),
        ));
    }

    let user = users::set_password(state.db.as_ref(), user, &payload.password).await?;

    tracing::info!(user_id = %user.id, "Password updated");
    send_token(&state, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_requires_matching_confirmation() {
        let payload = SignupRequest {
            name: "Jonas".to_string(),
            email: "jonas@example.com".to_string(),
            password: "pass1234".to_string(),
            password_confirm: "pass12345".to_string(),
        };

        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password_confirm"));
    }

    #[test]
    fn test_signup_rejects_overlong_name() {
        let payload = SignupRequest {
            name: "J".repeat(101),
            email: "jonas@example.com".to_string(),
            password: "pass1234".to_string(),
            password_confirm: "pass1234".to_string(),
        };

        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
    }

    #[test]
    fn test_signup_rejects_invalid_email() {
        let payload = SignupRequest {
            name: "Jonas".to_string(),
            email: "not-an-email".to_string(),
            password: "pass1234".to_string(),
            password_confirm: "pass1234".to_string(),
        };

        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_signup_ignores_role_field() {
        let payload: SignupRequest = serde_json::from_value(json!({
            "name": "Mallory",
            "email": "mallory@example.com",
            "password": "pass1234",
            "passwordConfirm": "pass1234",
            "role": "admin"
        }))
        .unwrap();

        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_update_password_accepts_both_field_names() {
        let payload: UpdatePasswordRequest = serde_json::from_value(json!({
            "currentPassword": "old-password",
            "password": "new-password",
            "passwordConfirm": "new-password"
        }))
        .unwrap();

        assert_eq!(payload.password_current, "old-password");
    }
}
