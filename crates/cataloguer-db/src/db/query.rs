//! Paginated queries over one index partition
//!
//! A query names an index of an entity, the partition to read, an optional
//! range on the sort key and an optional filter evaluated per row. Results
//! come back a page at a time with an opaque cursor that resumes exactly
//! after the last row consumed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use cataloguer_core::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::store::{RangeQuery, SortCondition};
use super::table::layout::IndexLayout;
use super::table::record::{Entity, Position, StoredRecord};
use super::table::Table;

/// Attribute marking a record as logically deleted.
pub const DELETED_AT: &str = "deletedAt";

/// Predicate evaluated against a record's attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    NotExists(String),
    Exists(String),
    Eq(String, Value),
    BeginsWith(String, String),
    Contains(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Substring,
    Prefix,
}

impl Filter {
    /// Only records without `deletedAt`.
    pub fn active() -> Self {
        Filter::NotExists(DELETED_AT.to_string())
    }

    /// Name or description matches `term`. Matching is case-sensitive.
    pub fn search(term: &str, mode: SearchMode) -> Self {
        let term = term.to_string();
        let matcher = |attribute: &str| match mode {
            SearchMode::Substring => Filter::Contains(attribute.to_string(), term.clone()),
            SearchMode::Prefix => Filter::BeginsWith(attribute.to_string(), term.clone()),
        };
        Filter::Or(vec![matcher("name"), matcher("description")])
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn matches(&self, data: &Value) -> bool {
        let attribute = |name: &str| data.get(name).filter(|v| !v.is_null());
        match self {
            Filter::NotExists(name) => attribute(name).is_none(),
            Filter::Exists(name) => attribute(name).is_some(),
            Filter::Eq(name, expected) => attribute(name) == Some(expected),
            Filter::BeginsWith(name, prefix) => attribute(name)
                .and_then(Value::as_str)
                .is_some_and(|v| v.starts_with(prefix.as_str())),
            Filter::Contains(name, needle) => attribute(name)
                .and_then(Value::as_str)
                .is_some_and(|v| v.contains(needle.as_str())),
            Filter::And(filters) => filters.iter().all(|f| f.matches(data)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(data)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// How many store pages a query may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// One store page; fewer than `limit` records may come back.
    SinglePage,
    /// Keep reading until the page is full or the partition is exhausted.
    #[default]
    Exhaustive,
}

/// Range on the leading sort-key attributes of an index, by attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortRange {
    BeginsWith(Vec<String>),
    Between(Vec<String>, Vec<String>),
    Gte(Vec<String>),
    Lte(Vec<String>),
}

impl SortRange {
    fn to_condition(&self, index: &IndexLayout) -> Result<SortCondition, AppError> {
        let sort = &index.sort;
        Ok(match self {
            SortRange::BeginsWith(values) => SortCondition::BeginsWith(sort.prefix(values)?),
            SortRange::Between(low, high) => {
                SortCondition::Between(sort.render_leading(low)?, sort.upper_bound(high)?)
            }
            SortRange::Gte(low) => SortCondition::Gte(sort.render_leading(low)?),
            SortRange::Lte(high) => SortCondition::Lte(sort.upper_bound(high)?),
        })
    }
}

/// A query against one index partition.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub index: &'static str,
    pub partition: Vec<(&'static str, String)>,
    pub range: Option<SortRange>,
    pub filter: Option<Filter>,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub mode: QueryMode,
}

impl QueryRequest {
    pub fn new(index: &'static str) -> Self {
        Self {
            index,
            partition: Vec::new(),
            range: None,
            filter: None,
            order: SortOrder::Asc,
            limit: None,
            cursor: None,
            mode: QueryMode::Exhaustive,
        }
    }

    pub fn partition(mut self, attribute: &'static str, value: impl Into<String>) -> Self {
        self.partition.push((attribute, value.into()));
        self
    }

    pub fn range(mut self, range: SortRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when nothing further matches.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorPayload {
    index: String,
    partition: String,
    index_sk: String,
    pk: String,
    sk: String,
}

pub fn encode_cursor(index: &str, partition: &str, position: &Position) -> String {
    let payload = CursorPayload {
        index: index.to_string(),
        partition: partition.to_string(),
        index_sk: position.index_sk.clone(),
        pk: position.pk.clone(),
        sk: position.sk.clone(),
    };
    // Serializing plain strings cannot fail.
    let json = serde_json::to_vec(&payload).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a cursor and check it belongs to `index`/`partition`.
pub fn decode_cursor(cursor: &str, index: &str, partition: &str) -> Result<Position, AppError> {
    let invalid = || AppError::Validation("Invalid pagination cursor".to_string());
    let bytes = URL_SAFE_NO_PAD.decode(cursor.trim()).map_err(|_| invalid())?;
    let payload: CursorPayload = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
    if payload.index != index || payload.partition != partition {
        return Err(AppError::Validation(
            "Pagination cursor belongs to a different query".to_string(),
        ));
    }
    Ok(Position {
        index_sk: payload.index_sk,
        pk: payload.pk,
        sk: payload.sk,
    })
}

impl Table {
    fn resolve_limit(&self, limit: Option<usize>) -> Result<usize, AppError> {
        let limits = self.limits();
        let limit = limit.unwrap_or(limits.default_page_size);
        if limit == 0 || limit > limits.max_page_size {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                limits.max_page_size
            )));
        }
        Ok(limit)
    }

    /// Run a paginated query for entity `E`.
    #[tracing::instrument(skip(self, request), fields(entity = E::KIND.as_str(), index = request.index))]
    pub async fn query<E: Entity>(&self, request: QueryRequest) -> Result<Page<E>, AppError> {
        let index = E::KIND.layout().index(request.index)?;
        let values: Vec<(&str, &str)> = request
            .partition
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        let partition = index.partition.render_from(&values)?;
        let limit = self.resolve_limit(request.limit)?;
        // Entities sharing a partition differ in their leading sort label.
        let condition = match &request.range {
            Some(range) => range.to_condition(index)?,
            None => SortCondition::BeginsWith(index.sort.prefix(&[])?),
        };
        let start_after = request
            .cursor
            .as_deref()
            .map(|cursor| decode_cursor(cursor, index.name, &partition))
            .transpose()?;

        let mut range = RangeQuery {
            index: index.physical,
            partition: partition.clone(),
            condition: Some(condition),
            ascending: request.order == SortOrder::Asc,
            start_after,
            limit,
        };

        let filter = request.filter.as_ref();
        let passes = |record: &StoredRecord| {
            record.entity == E::KIND && filter.map_or(true, |f| f.matches(&record.data))
        };

        let mut items = Vec::with_capacity(limit);
        let mut pages_read = 0usize;
        let next: Option<Position> = loop {
            let page = self.store().query(&range).await?;
            pages_read += 1;
            let exhausted = page.last_evaluated.is_none();

            let mut records = page.records.into_iter();
            let mut last_consumed = None;
            for record in records.by_ref() {
                last_consumed = record.position(index.physical);
                if passes(&record) {
                    items.push(E::from_record(record)?);
                    if items.len() == limit {
                        break;
                    }
                }
            }

            if items.len() == limit {
                if records.any(|record| passes(&record)) {
                    break last_consumed;
                }
                if exhausted {
                    break None;
                }
                if request.mode == QueryMode::SinglePage {
                    break page.last_evaluated;
                }
                let resume = page.last_evaluated.clone();
                let more = self.has_more_matches(&range, resume, &passes).await?;
                break if more { last_consumed } else { None };
            }

            if exhausted {
                break None;
            }
            if request.mode == QueryMode::SinglePage {
                break page.last_evaluated;
            }
            range.start_after = page.last_evaluated;
        };

        tracing::debug!(
            items = items.len(),
            pages_read,
            has_more = next.is_some(),
            "Query complete"
        );

        Ok(Page {
            items,
            next_cursor: next.map(|position| encode_cursor(index.name, &partition, &position)),
        })
    }

    /// Scan ahead from `resume` until a matching row turns up or the range ends.
    async fn has_more_matches(
        &self,
        range: &RangeQuery,
        resume: Option<Position>,
        passes: &impl Fn(&StoredRecord) -> bool,
    ) -> Result<bool, AppError> {
        let mut ahead = range.clone();
        ahead.start_after = resume;
        loop {
            let page = self.store().query(&ahead).await?;
            if page.records.iter().any(passes) {
                return Ok(true);
            }
            match page.last_evaluated {
                Some(position) => ahead.start_after = Some(position),
                None => return Ok(false),
            }
        }
    }
}
