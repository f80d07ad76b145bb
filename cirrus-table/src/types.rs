use chrono::{DateTime, Utc};

/// A typed wide entity as seen by callers.
///
/// `etag` and `timestamp` are filled in by reads and refreshed by writes;
/// conditional updates and deletes compare `etag` against the stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudEntity<T> {
    pub partition_key: String,
    pub row_key: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub value: T,
}

impl<T> CloudEntity<T> {
    pub fn new<P: Into<String>, R: Into<String>>(partition_key: P, row_key: R, value: T) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            timestamp: None,
            etag: None,
            value,
        }
    }

    pub fn with_etag<E: Into<String>>(mut self, etag: E) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// Which rows a query returns.
#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    /// Every row of the table.
    All,
    Partition(String),
    /// Rows of one partition with `start <= row_key < end`; open ends unbounded.
    RowRange {
        partition_key: String,
        start: Option<String>,
        end: Option<String>,
    },
    /// Specific rows of one partition; missing keys are skipped.
    RowKeys {
        partition_key: String,
        row_keys: Vec<String>,
    },
}

impl RowFilter {
    pub fn matches(&self, partition_key: &str, row_key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Partition(pk) => pk == partition_key,
            Self::RowRange {
                partition_key: pk,
                start,
                end,
            } => {
                pk == partition_key
                    && start.as_deref().map_or(true, |s| row_key >= s)
                    && end.as_deref().map_or(true, |e| row_key < e)
            }
            Self::RowKeys {
                partition_key: pk,
                row_keys,
            } => pk == partition_key && row_keys.iter().any(|rk| rk == row_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_range_is_half_open() {
        let filter = RowFilter::RowRange {
            partition_key: "p".into(),
            start: Some("b".into()),
            end: Some("d".into()),
        };
        assert!(!filter.matches("p", "a"));
        assert!(filter.matches("p", "b"));
        assert!(filter.matches("p", "c"));
        assert!(!filter.matches("p", "d"));
        assert!(!filter.matches("q", "c"));
    }

    #[test]
    fn row_keys_filter_is_partition_scoped() {
        let filter = RowFilter::RowKeys {
            partition_key: "p".into(),
            row_keys: vec!["1".into(), "3".into()],
        };
        assert!(filter.matches("p", "3"));
        assert!(!filter.matches("p", "2"));
        assert!(!filter.matches("x", "1"));
    }
}
