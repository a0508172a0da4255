//! List-endpoint query features.
//!
//! A parsed query string is turned into [`QueryFeatures`] and then applied to a
//! base `Select` in a fixed order: filter, sort, select (projection),
//! paginate. Every stage touches only its own part of the query, so the
//! base select's own predicates (secret tours, inactive users) always stay in
//! force.
//!
//! ```text
//! ?difficulty=easy&price[gte]=500&sort=-price&fields=name,price&page=2&limit=10
//! ```

mod field;
mod projection;

use sea_orm::{ColumnTrait, Order, QueryFilter, QueryOrder, QuerySelect, Select, Value};
use sea_orm::sea_query::SimpleExpr;

use crate::error::{AppError, AppResult};

pub use field::{FieldKind, Queryable};
pub use projection::Projection;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    fn from_suffix(suffix: &str) -> AppResult<Self> {
        match suffix {
            "gte" => Ok(FilterOp::Gte),
            "gt" => Ok(FilterOp::Gt),
            "lte" => Ok(FilterOp::Lte),
            "lt" => Ok(FilterOp::Lt),
            other => Err(AppError::BadRequest(format!(
                "Unsupported filter operator: {}",
                other
            ))),
        }
    }

    fn condition<C: ColumnTrait>(self, column: C, value: Value) -> SimpleExpr {
        match self {
            FilterOp::Eq => column.eq(value),
            FilterOp::Gt => column.gt(value),
            FilterOp::Gte => column.gte(value),
            FilterOp::Lt => column.lt(value),
            FilterOp::Lte => column.lte(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl FieldFilter {
    /// Parses `price` or `price[gte]` into a field and operator.
    fn parse(key: &str, value: &str) -> AppResult<Self> {
        let (field, op) = match key.split_once('[') {
            None => (key, FilterOp::Eq),
            Some((field, rest)) => {
                let suffix = rest.strip_suffix(']').ok_or_else(|| {
                    AppError::BadRequest(format!("Malformed filter key: {}", key))
                })?;
                (field, FilterOp::from_suffix(suffix)?)
            }
        };

        if field.is_empty() {
            return Err(AppError::BadRequest(format!("Malformed filter key: {}", key)));
        }

        Ok(Self {
            field: field.to_string(),
            op,
            value: value.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    /// Rows skipped before this page. Postgres binds `OFFSET` as a signed
    /// 64-bit value, so anything beyond `i64::MAX` is `None`.
    pub fn checked_skip(&self) -> Option<u64> {
        self.page
            .checked_sub(1)?
            .checked_mul(self.limit)
            .filter(|skip| i64::try_from(*skip).is_ok())
    }

    pub fn skip(&self) -> u64 {
        self.checked_skip().unwrap_or(i64::MAX as u64)
    }

    fn validate(&self) -> AppResult<()> {
        if self.limit > MAX_LIMIT {
            return Err(AppError::BadRequest(format!(
                "limit must not exceed {}",
                MAX_LIMIT
            )));
        }
        if self.checked_skip().is_none() {
            return Err(AppError::BadRequest("page is out of range".to_string()));
        }
        Ok(())
    }
}

fn parse_positive(key: &str, raw: &str) -> AppResult<u64> {
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(AppError::BadRequest(format!(
            "{} must be a positive integer",
            key
        ))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFeatures {
    pub filters: Vec<FieldFilter>,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub pagination: Pagination,
}

impl QueryFeatures {
    /// Parses raw query pairs. `page`, `sort`, `limit` and `fields` are
    /// reserved; a repeated reserved key keeps its last value and repeated
    /// filter keys are all applied.
    pub fn parse(pairs: &[(String, String)]) -> AppResult<Self> {
        let mut features = QueryFeatures::default();

        for (key, value) in pairs {
            match key.as_str() {
                "page" => features.pagination.page = parse_positive("page", value)?,
                "limit" => features.pagination.limit = parse_positive("limit", value)?,
                "sort" => features.sort = parse_sort(value),
                "fields" => features.projection = Projection::parse(value)?,
                _ => features.filters.push(FieldFilter::parse(key, value)?),
            }
        }

        features.pagination.validate()?;
        Ok(features)
    }
}

fn parse_sort(raw: &str) -> Vec<SortKey> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.strip_prefix('-') {
            Some(field) => SortKey {
                field: field.to_string(),
                descending: true,
            },
            None => SortKey {
                field: entry.to_string(),
                descending: false,
            },
        })
        .collect()
}

/// Overlays preset query values (an alias route) on top of the caller's query.
pub fn with_preset(pairs: Vec<(String, String)>, preset: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = pairs
        .into_iter()
        .filter(|(key, _)| !preset.iter().any(|(preset_key, _)| preset_key == key))
        .collect();
    merged.extend(
        preset
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string())),
    );
    merged
}

/// Applies [`QueryFeatures`] to a base select, one stage at a time.
pub struct FeatureQuery<'a, E: Queryable> {
    select: Select<E>,
    features: &'a QueryFeatures,
}

impl<'a, E: Queryable> FeatureQuery<'a, E> {
    pub fn new(select: Select<E>, features: &'a QueryFeatures) -> Self {
        Self { select, features }
    }

    pub fn filter(mut self) -> AppResult<Self> {
        for filter in &self.features.filters {
            let (column, kind) = E::field(&filter.field).ok_or_else(|| {
                AppError::BadRequest(format!("Cannot filter on field: {}", filter.field))
            })?;
            let value = kind.parse(&filter.field, &filter.value)?;
            self.select = self.select.filter(filter.op.condition(column, value));
        }
        Ok(self)
    }

    pub fn sort(mut self) -> AppResult<Self> {
        if self.features.sort.is_empty() {
            self.select = self.select.order_by(E::default_sort(), Order::Desc);
            return Ok(self);
        }

        for key in &self.features.sort {
            let (column, _) = E::field(&key.field).ok_or_else(|| {
                AppError::BadRequest(format!("Cannot sort on field: {}", key.field))
            })?;
            let order = if key.descending { Order::Desc } else { Order::Asc };
            self.select = self.select.order_by(column, order);
        }
        Ok(self)
    }

    /// Projection happens on the serialized documents; here it is only
    /// checked against the entity's known fields.
    pub fn select(self) -> AppResult<Self> {
        self.features.projection.validate(E::FIELDS)?;
        Ok(self)
    }

    pub fn paginate(mut self) -> Self {
        let pagination = self.features.pagination;
        self.select = self
            .select
            .offset(pagination.skip())
            .limit(pagination.limit);
        self
    }

    pub fn build(self) -> Select<E> {
        self.select
    }
}

/// Runs every stage in order and returns the refined select.
pub fn apply<E: Queryable>(select: Select<E>, features: &QueryFeatures) -> AppResult<Select<E>> {
    Ok(FeatureQuery::new(select, features)
        .filter()?
        .sort()?
        .select()?
        .paginate()
        .build())
}
