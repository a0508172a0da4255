pub mod auth;
pub mod reviews;
pub mod tours;
pub mod users;

use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

/// Success envelope: `{ status: "success", results?, data }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            results: None,
            data,
        })
    }
}

impl ApiResponse<Value> {
    /// Wraps a single document under `key`.
    pub fn one<T: Serialize>(key: &str, document: T) -> AppResult<Json<Self>> {
        let mut data = Map::new();
        data.insert(key.to_string(), to_document(document)?);
        Ok(Self::new(Value::Object(data)))
    }

    /// Wraps a list of documents under `key`, with the result count.
    pub fn list(key: &str, documents: Vec<Value>) -> Json<Self> {
        let results = documents.len();
        let mut data = Map::new();
        data.insert(key.to_string(), Value::Array(documents));
        Json(Self {
            status: "success",
            results: Some(results),
            data: Value::Object(data),
        })
    }
}

pub type Created<T> = (StatusCode, Json<T>);

pub fn created<T>(body: Json<T>) -> Created<T> {
    (StatusCode::CREATED, body)
}

pub fn to_document<T: Serialize>(document: T) -> AppResult<Value> {
    serde_json::to_value(document)
        .map_err(|e| AppError::Internal(format!("Failed to serialize document: {}", e)))
}
