//! Query engine: filter, sort and paginate stored documents.
//!
//! Filters compare the textual form of a JSON field. Relation fields may be
//! stored either as a bare id or as `{"id": ..}` because documents are only
//! normalized on read, so a relation filter matches both shapes.

use super::connection::CatalogDb;
use crate::normalize::is_relation_field;
use crate::{Error, ResourceType};
use serde_json::Value;
use tokio_rusqlite::rusqlite::{params_from_iter, types::Value as SqlValue};

/// Page size ceiling.
pub const MAX_LIMIT: u32 = 100;

/// Fields compared numerically when sorting.
const NUMERIC_SORT_FIELDS: &[&str] = &[
    "id",
    "count_of_issues",
    "count_of_issue_appearances",
    "count_of_episodes",
    "count_of_movies",
    "count_of_team_members",
    "issue_number",
    "episode_number",
    "start_year",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: &str, direction: SortDirection) -> Self {
        Self { field: field.to_string(), direction }
    }

    /// Ordering used when a request names none.
    pub fn default_for(resource: ResourceType) -> Self {
        use ResourceType::*;
        match resource {
            Volume => Self::new("count_of_issues", SortDirection::Desc),
            Series => Self::new("count_of_episodes", SortDirection::Desc),
            Character | Person | Team | Concept | Object | Location | StoryArc => {
                Self::new("count_of_issue_appearances", SortDirection::Desc)
            }
            _ => Self::new("name", SortDirection::Asc),
        }
    }
}

/// One `field:value` equality test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: String,
}

/// A list request against one resource type.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub resource: ResourceType,
    pub filters: Vec<Filter>,
    pub sort: Option<Sort>,
    pub limit: u32,
    pub offset: u64,
    /// Publisher names volume listings are restricted to. Empty means no restriction.
    pub publishers: Vec<String>,
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Value>,
    pub total: u64,
}

fn check_field(field: &str) -> Result<(), Error> {
    if !field.is_empty() && field.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid field name: {field:?}")))
    }
}

impl QuerySpec {
    pub fn new(resource: ResourceType) -> Self {
        Self { resource, filters: Vec::new(), sort: None, limit: MAX_LIMIT, offset: 0, publishers: Vec::new() }
    }

    /// Build a query from request parameters.
    ///
    /// Recognises `filter=f:v(,f:v)*`, `sort=f[:asc|desc]`, `limit` and
    /// `offset`; everything else is ignored. Unparseable `limit`/`offset`
    /// fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for a malformed filter or a field name
    /// outside `[A-Za-z0-9_]`.
    pub fn from_params(resource: ResourceType, params: &[(String, String)]) -> Result<Self, Error> {
        let mut spec = Self::new(resource);

        for (key, value) in params {
            match key.as_str() {
                "filter" => {
                    for pair in value.split(',').filter(|p| !p.is_empty()) {
                        let (field, value) = pair
                            .split_once(':')
                            .ok_or_else(|| Error::InvalidInput(format!("filter without value: {pair:?}")))?;
                        check_field(field)?;
                        spec.filters.push(Filter { field: field.to_string(), value: value.to_string() });
                    }
                }
                "sort" if !value.is_empty() => {
                    let (field, direction) = value.split_once(':').unwrap_or((value, "asc"));
                    check_field(field)?;
                    let direction = if direction.eq_ignore_ascii_case("desc") {
                        SortDirection::Desc
                    } else {
                        SortDirection::Asc
                    };
                    spec.sort = Some(Sort::new(field, direction));
                }
                "limit" => {
                    spec.limit = value
                        .parse::<i64>()
                        .ok()
                        .and_then(|n| u32::try_from(n.clamp(0, i64::from(MAX_LIMIT))).ok())
                        .unwrap_or(MAX_LIMIT);
                }
                "offset" => spec.offset = value.parse::<u64>().unwrap_or(0),
                _ => {}
            }
        }

        spec.limit = spec.limit.min(MAX_LIMIT);
        Ok(spec)
    }

    pub fn with_publishers(mut self, publishers: &[String]) -> Self {
        self.publishers = publishers.to_vec();
        self
    }

    /// Sort that will actually be applied.
    pub fn effective_sort(&self) -> Sort {
        self.sort.clone().unwrap_or_else(|| Sort::default_for(self.resource))
    }

    /// WHERE clause and its bound parameters, shared by the page and count queries.
    fn predicate(&self) -> Result<(String, Vec<SqlValue>), Error> {
        let mut clauses = vec!["json_valid(data)".to_string()];
        let mut params = Vec::new();

        for filter in &self.filters {
            check_field(&filter.field)?;
            if filter.field == "id" {
                clauses.push("CAST(id AS TEXT) = ?".into());
                params.push(SqlValue::Text(filter.value.clone()));
            } else if is_relation_field(self.resource, &filter.field) {
                clauses.push(
                    "(CAST(json_extract(data, ?) AS TEXT) = ? OR CAST(json_extract(data, ?) AS TEXT) = ?)".into(),
                );
                params.push(SqlValue::Text(format!("$.{}", filter.field)));
                params.push(SqlValue::Text(filter.value.clone()));
                params.push(SqlValue::Text(format!("$.{}.id", filter.field)));
                params.push(SqlValue::Text(filter.value.clone()));
            } else {
                clauses.push("CAST(json_extract(data, ?) AS TEXT) = ?".into());
                params.push(SqlValue::Text(format!("$.{}", filter.field)));
                params.push(SqlValue::Text(filter.value.clone()));
            }
        }

        if self.resource == ResourceType::Volume && !self.publishers.is_empty() {
            let slots = vec!["?"; self.publishers.len()].join(", ");
            clauses.push(format!("json_extract(data, '$.publisher.name') IN ({slots})"));
            params.extend(self.publishers.iter().cloned().map(SqlValue::Text));
        }

        Ok((clauses.join(" AND "), params))
    }

    fn order_by(&self) -> Result<String, Error> {
        let sort = self.effective_sort();
        check_field(&sort.field)?;

        let key = if sort.field == "id" {
            "id".to_string()
        } else if NUMERIC_SORT_FIELDS.contains(&sort.field.as_str()) {
            format!("CAST(json_extract(data, '$.{}') AS REAL)", sort.field)
        } else {
            format!("CAST(json_extract(data, '$.{}') AS TEXT)", sort.field)
        };

        Ok(format!("({key}) IS NULL, {key} {}, id ASC", sort.direction.as_sql()))
    }
}

impl CatalogDb {
    /// Run a list query.
    ///
    /// `total` is counted under the same predicate as the page. Rows that
    /// are not valid JSON never match.
    pub async fn query(&self, spec: &QuerySpec) -> Result<Page, Error> {
        let table = spec.resource.table();
        let (predicate, params) = spec.predicate()?;
        let order_by = spec.order_by()?;
        let limit = i64::from(spec.limit.min(MAX_LIMIT));
        let offset = i64::try_from(spec.offset).unwrap_or(i64::MAX);

        let count_sql = format!("SELECT COUNT(*) FROM {table} WHERE {predicate}");
        let page_sql = format!("SELECT data FROM {table} WHERE {predicate} ORDER BY {order_by} LIMIT ? OFFSET ?");

        tracing::debug!(resource = %spec.resource, filters = spec.filters.len(), limit, offset, "running list query");

        self.conn
            .call(move |conn| -> Result<Page, Error> {
                let total: i64 = conn.query_row(&count_sql, params_from_iter(params.iter()), |row| row.get(0))?;
                if total == 0 {
                    return Ok(Page::default());
                }

                let mut page_params = params;
                page_params.push(SqlValue::Integer(limit));
                page_params.push(SqlValue::Integer(offset));

                let mut stmt = conn.prepare(&page_sql)?;
                let rows = stmt.query_map(params_from_iter(page_params.iter()), |row| row.get::<_, String>(0))?;

                let mut items: Vec<Value> = Vec::new();
                for row in rows {
                    items.push(serde_json::from_str(&row?)?);
                }

                Ok(Page { items, total: total as u64 })
            })
            .await
            .map_err(Error::from)
    }
}
