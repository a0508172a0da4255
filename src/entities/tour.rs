use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

use crate::features::{FieldKind, Queryable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "tour_difficulty")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[sea_orm(string_value = "easy")]
    Easy,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "difficult")]
    Difficult,
}

/// GeoJSON point. Coordinates are `[longitude, latitude]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "point_type")]
    pub kind: String,
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Day of the tour this stop belongs to; unset for the start location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<i32>,
}

fn point_type() -> String {
    "Point".to_string()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Locations(pub Vec<GeoPoint>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tour")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    pub slug: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: Difficulty,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    pub price_discount: Option<f64>,
    #[sea_orm(column_type = "Text")]
    pub summary: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub start_dates: Vec<DateTimeWithTimeZone>,
    pub secret_tour: bool,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub start_location: Option<GeoPoint>,
    #[sea_orm(column_type = "JsonBinary")]
    pub locations: Locations,
    pub guides: Vec<Uuid>,
    #[serde(skip_serializing)]
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn duration_weeks(&self) -> f64 {
        f64::from(self.duration) / 7.0
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::review::Entity")]
    Reviews,
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reviews.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Queryable for Entity {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "name",
        "slug",
        "duration",
        "durationWeeks",
        "maxGroupSize",
        "difficulty",
        "ratingsAverage",
        "ratingsQuantity",
        "price",
        "priceDiscount",
        "summary",
        "description",
        "imageCover",
        "images",
        "startDates",
        "secretTour",
        "startLocation",
        "locations",
        "guides",
    ];

    fn field(name: &str) -> Option<(Column, FieldKind)> {
        let field = match name {
            "id" => (Column::Id, FieldKind::Uuid),
            "name" => (Column::Name, FieldKind::Text),
            "slug" => (Column::Slug, FieldKind::Text),
            "duration" => (Column::Duration, FieldKind::Int),
            "maxGroupSize" => (Column::MaxGroupSize, FieldKind::Int),
            "difficulty" => (
                Column::Difficulty,
                FieldKind::Enum(&["easy", "medium", "difficult"]),
            ),
            "ratingsAverage" => (Column::RatingsAverage, FieldKind::Float),
            "ratingsQuantity" => (Column::RatingsQuantity, FieldKind::Int),
            "price" => (Column::Price, FieldKind::Float),
            "priceDiscount" => (Column::PriceDiscount, FieldKind::Float),
            "summary" => (Column::Summary, FieldKind::Text),
            "imageCover" => (Column::ImageCover, FieldKind::Text),
            "secretTour" => (Column::SecretTour, FieldKind::Bool),
            "createdAt" => (Column::CreatedAt, FieldKind::Timestamp),
            _ => return None,
        };
        Some(field)
    }

    fn default_sort() -> Column {
        Column::CreatedAt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_defaults_to_point_type() {
        let point: GeoPoint =
            serde_json::from_str(r#"{"coordinates":[-80.185942,25.774772],"address":"Miami"}"#)
                .unwrap();

        assert_eq!(point.kind, "Point");
        assert_eq!(point.coordinates, [-80.185942, 25.774772]);
        assert_eq!(point.day, None);
    }

    #[test]
    fn test_difficulty_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Difficulty::Difficult).unwrap(),
            r#""difficult""#
        );
    }
}
