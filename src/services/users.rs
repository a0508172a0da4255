use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Select, Set,
};
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::utils::password::hash_password;

/// Base query for every standard user read: soft-deleted accounts are
/// invisible.
pub fn active() -> Select<user::Entity> {
    user::Entity::find().filter(user::Column::Active.eq(true))
}

pub async fn find_active<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<user::Model> {
    active()
        .filter(user::Column::Id.eq(id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("No user found with that ID".to_string()))
}

pub async fn find_active_by_email<C: ConnectionTrait>(
    db: &C,
    email: &str,
) -> AppResult<Option<user::Model>> {
    Ok(active()
        .filter(user::Column::Email.eq(normalize_email(email)))
        .one(db)
        .await?)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub role: UserRole,
}

pub async fn create<C: ConnectionTrait>(db: &C, new_user: NewUser<'_>) -> AppResult<user::Model> {
    let now = Utc::now().fixed_offset();

    let user = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(new_user.name.trim().to_string()),
        email: Set(normalize_email(new_user.email)),
        photo: Set("default.jpg".to_string()),
        password_hash: Set(hash_password(new_user.password)?),
        password_changed_at: Set(None),
        role: Set(new_user.role),
        password_reset_token: Set(None),
        password_reset_expires: Set(None),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    };

    Ok(user.insert(db).await?)
}

/// Stores a new password hash and invalidates every token issued before it.
/// The change time is backdated a second so a token signed right after the
/// change is still accepted.
pub async fn set_password<C: ConnectionTrait>(
    db: &C,
    user: user::Model,
    password: &str,
) -> AppResult<user::Model> {
    let now = Utc::now().fixed_offset();

    let mut active: user::ActiveModel = user.into();
    active.password_hash = Set(hash_password(password)?);
    active.password_changed_at = Set(Some(now - Duration::seconds(1)));
    active.password_reset_token = Set(None);
    active.password_reset_expires = Set(None);
    active.updated_at = Set(now);

    Ok(active.update(db).await?)
}

#[cfg(test)]
mod tests {
    use sea_orm::{DbBackend, QueryTrait};

    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jonas@Example.COM "), "jonas@example.com");
    }

    #[test]
    fn test_active_excludes_soft_deleted() {
        let sql = active().build(DbBackend::Postgres).to_string();
        let expected = user::Entity::find()
            .filter(user::Column::Active.eq(true))
            .build(DbBackend::Postgres)
            .to_string();

        assert_eq!(sql, expected);
    }
}
