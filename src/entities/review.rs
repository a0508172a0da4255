use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::features::{FieldKind, Queryable};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "review")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(column_type = "Text")]
    pub review: String,
    pub rating: f64,
    #[serde(rename = "tour")]
    pub tour_id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tour::Entity",
        from = "Column::TourId",
        to = "super::tour::Column::Id"
    )]
    Tour,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::tour::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tour.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Queryable for Entity {
    const FIELDS: &'static [&'static str] = &["id", "review", "rating", "tour", "user", "createdAt"];

    fn field(name: &str) -> Option<(Column, FieldKind)> {
        let field = match name {
            "id" => (Column::Id, FieldKind::Uuid),
            "review" => (Column::Review, FieldKind::Text),
            "rating" => (Column::Rating, FieldKind::Float),
            "tour" => (Column::TourId, FieldKind::Uuid),
            "user" => (Column::UserId, FieldKind::Uuid),
            "createdAt" => (Column::CreatedAt, FieldKind::Timestamp),
            _ => return None,
        };
        Some(field)
    }

    fn default_sort() -> Column {
        Column::CreatedAt
    }
}
