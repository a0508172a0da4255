use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};
use sea_orm::{ColumnTrait, QueryFilter};

use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::services::users;
use crate::utils::jwt::verify_token;
use crate::AppState;

/// The authenticated account, attached to request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub user::Model);

/// Resolve the bearer token to a live account
pub async fn auth_middleware(
    State(state): State<AppState>,
    auth: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let TypedHeader(auth) = auth.map_err(|_| {
        AppError::Unauthorized(
            "You are not logged in! Please log in to get access.".to_string(),
        )
    })?;

    let claims = verify_token(auth.token(), &state.config.jwt_secret)?;

    let user = users::active()
        .filter(user::Column::Id.eq(claims.sub))
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| {
            AppError::Unauthorized(
                "The user belonging to this token no longer exists.".to_string(),
            )
        })?;

    if user.changed_password_after(claims.iat) {
        return Err(AppError::Unauthorized(
            "User recently changed password! Please log in again.".to_string(),
        ));
    }

    request.extensions_mut().insert(AuthUser(user));
    Ok(next.run(request).await)
}

/// Only lets the request through when the authenticated role is in `roles`.
pub async fn restrict_to(
    roles: &'static [UserRole],
    request: Request,
    next: Next,
) -> AppResult<Response> {
    let AuthUser(user) = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| AppError::Unauthorized("No authentication found".to_string()))?;

    if !roles.contains(&user.role) {
        tracing::debug!(user_id = %user.id, role = ?user.role, "Role not permitted");
        return Err(AppError::Forbidden(
            "You do not have permission to perform this action".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

/// Require admin role
pub async fn require_admin(request: Request, next: Next) -> AppResult<Response> {
    restrict_to(&[UserRole::Admin], request, next).await
}
