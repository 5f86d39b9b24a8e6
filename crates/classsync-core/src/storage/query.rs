//! Query builder for indexed lookups

use super::index::IndexValue;
use crate::error::{SyncError, SyncResult};
use crate::types::Collection;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`
    Eq { field: String, value: IndexValue },
    /// `from <= field <= to`, either end optional
    Range {
        field: String,
        from: Option<IndexValue>,
        to: Option<IndexValue>,
    },
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq { field, .. } | Filter::Range { field, .. } => field,
        }
    }
}

/// Equality and range filters over declared indexes, optional ordering
/// by a declared field, optional limit.
///
/// ```ignore
/// let recent = Query::new()
///     .between("date", "2026-10-01", "2026-10-31")
///     .newest_first("date")
///     .limit(20);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub(crate) filters: Vec<Filter>,
    pub(crate) order_by: Option<(String, Order)>,
    pub(crate) limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<IndexValue>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn range(
        mut self,
        field: impl Into<String>,
        from: Option<IndexValue>,
        to: Option<IndexValue>,
    ) -> Self {
        self.filters.push(Filter::Range {
            field: field.into(),
            from,
            to,
        });
        self
    }

    /// Inclusive range on both ends
    #[must_use]
    pub fn between(
        self,
        field: impl Into<String>,
        from: impl Into<IndexValue>,
        to: impl Into<IndexValue>,
    ) -> Self {
        self.range(field, Some(from.into()), Some(to.into()))
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, order: Order) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }

    /// Reverse-chronological ordering by `field`
    #[must_use]
    pub fn newest_first(self, field: impl Into<String>) -> Self {
        self.order_by(field, Order::Descending)
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Every field used must be indexed on `collection`, and range bounds
    /// must be of one kind.
    pub(crate) fn validate(&self, collection: Collection) -> SyncResult<()> {
        let fields = self
            .filters
            .iter()
            .map(Filter::field)
            .chain(self.order_by.as_ref().map(|(f, _)| f.as_str()));
        for field in fields {
            if !collection.is_indexed(field) {
                return Err(SyncError::UndeclaredIndex {
                    collection: collection.to_string(),
                    field: field.to_string(),
                });
            }
        }

        for filter in &self.filters {
            if let Filter::Range { field, from, to } = filter {
                match (from, to) {
                    (None, None) => {
                        return Err(SyncError::InvalidOperation(format!(
                            "range on '{field}' needs at least one bound"
                        )))
                    }
                    (Some(a), Some(b)) if !a.same_kind(b) => {
                        return Err(SyncError::InvalidOperation(format!(
                            "range bounds on '{field}' have different types"
                        )))
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}
