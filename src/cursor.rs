//! Opaque pagination cursors.
//!
//! Cursors round-trip through query parameters as urlsafe-base64 JSON
//! arrays tagged with a type key (`PC`, `OC`, `RRSC`). Clients treat them
//! as opaque; anything that fails to decode into a known type is an
//! [`CursorError::InvalidPageCursor`], never a silent default.
//!
//! `next`/`prev`/`first` are pure: they return a new cursor (or `None` when
//! the step would land out of bounds) and never mutate the receiver.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde_json::{json, Value};

use crate::error::CursorError;

pub const DEFAULT_PAGE_SIZE: usize = 13;
pub const MAX_PAGE_SIZE: usize = 101;
pub const MAX_OFFSET: usize = 9997;

/// Sentinel total count meaning "more than we counted exactly".
pub const MANY_MORE: i64 = -1;

const TYPE_BASIC: &str = "PC";
const TYPE_OFFSET: &str = "OC";
const TYPE_SAMPLE: &str = "RRSC";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Size and total only; no offset navigation.
    Basic {
        page_size: usize,
        total_count: i64,
    },
    /// Offset pagination bounded by [`MAX_OFFSET`].
    Offset {
        page_size: usize,
        total_count: i64,
        start_offset: usize,
    },
    /// Offset pagination that additionally records the ids served on the
    /// first page, so a random-sample ordering can be reproduced.
    Sample {
        page_size: usize,
        total_count: i64,
        start_offset: usize,
        first_page_ids: Vec<String>,
    },
}

impl PageCursor {
    pub fn new_basic(page_size: usize) -> Self {
        PageCursor::Basic {
            page_size,
            total_count: MANY_MORE,
        }
    }

    pub fn new_offset(page_size: usize) -> Self {
        PageCursor::Offset {
            page_size,
            total_count: MANY_MORE,
            start_offset: 0,
        }
    }

    pub fn new_sample(page_size: usize) -> Self {
        PageCursor::Sample {
            page_size,
            total_count: MANY_MORE,
            start_offset: 0,
            first_page_ids: Vec::new(),
        }
    }

    pub fn page_size(&self) -> usize {
        match self {
            PageCursor::Basic { page_size, .. }
            | PageCursor::Offset { page_size, .. }
            | PageCursor::Sample { page_size, .. } => *page_size,
        }
    }

    /// Page size capped at [`MAX_PAGE_SIZE`].
    pub fn bounded_page_size(&self) -> usize {
        self.page_size().min(MAX_PAGE_SIZE)
    }

    pub fn total_count(&self) -> i64 {
        match self {
            PageCursor::Basic { total_count, .. }
            | PageCursor::Offset { total_count, .. }
            | PageCursor::Sample { total_count, .. } => *total_count,
        }
    }

    pub fn set_total_count(&mut self, count: i64) {
        match self {
            PageCursor::Basic { total_count, .. }
            | PageCursor::Offset { total_count, .. }
            | PageCursor::Sample { total_count, .. } => *total_count = count,
        }
    }

    pub fn has_many_more(&self) -> bool {
        self.total_count() == MANY_MORE
    }

    pub fn start_offset(&self) -> usize {
        match self {
            PageCursor::Basic { .. } => 0,
            PageCursor::Offset { start_offset, .. }
            | PageCursor::Sample { start_offset, .. } => *start_offset,
        }
    }

    pub fn is_first_page(&self) -> bool {
        self.start_offset() == 0
    }

    pub fn first_page_ids(&self) -> &[String] {
        match self {
            PageCursor::Sample { first_page_ids, .. } => first_page_ids,
            _ => &[],
        }
    }

    pub fn set_first_page_ids(&mut self, ids: Vec<String>) {
        if let PageCursor::Sample { first_page_ids, .. } = self {
            *first_page_ids = ids;
        }
    }

    fn end_offset(&self) -> i64 {
        let total = if self.has_many_more() {
            i64::MAX
        } else {
            self.total_count()
        };
        if self.bounded_page_size() == self.page_size() {
            total
        } else {
            total.min(self.page_size() as i64)
        }
    }

    pub fn is_valid(&self) -> bool {
        let counts_ok =
            self.page_size() > 0 && (self.has_many_more() || self.total_count() >= 0);
        match self {
            PageCursor::Basic { .. } => counts_ok,
            PageCursor::Offset { start_offset, .. }
            | PageCursor::Sample { start_offset, .. } => {
                counts_ok
                    && *start_offset <= MAX_OFFSET
                    && (*start_offset as i64) < self.end_offset()
            }
        }
    }

    fn with_start_offset(&self, start_offset: usize) -> Option<Self> {
        let mut stepped = self.clone();
        match &mut stepped {
            PageCursor::Basic { .. } => return None,
            PageCursor::Offset { start_offset: so, .. }
            | PageCursor::Sample { start_offset: so, .. } => *so = start_offset,
        }
        stepped.is_valid().then_some(stepped)
    }

    pub fn next_cursor(&self) -> Option<Self> {
        if matches!(self, PageCursor::Sample { first_page_ids, .. } if first_page_ids.is_empty()) {
            return None;
        }
        self.with_start_offset(self.start_offset() + self.bounded_page_size())
    }

    pub fn prev_cursor(&self) -> Option<Self> {
        if matches!(self, PageCursor::Sample { first_page_ids, .. } if first_page_ids.is_empty()) {
            return None;
        }
        let prev_offset = self.start_offset().checked_sub(self.bounded_page_size())?;
        self.with_start_offset(prev_offset)
    }

    pub fn first_cursor(&self) -> Option<Self> {
        self.with_start_offset(0)
    }

    /// Encode as an opaque query-parameter value.
    pub fn encode(&self) -> String {
        let fields: Value = match self {
            PageCursor::Basic {
                page_size,
                total_count,
            } => json!([TYPE_BASIC, page_size, total_count]),
            PageCursor::Offset {
                page_size,
                total_count,
                start_offset,
            } => json!([TYPE_OFFSET, page_size, total_count, start_offset]),
            PageCursor::Sample {
                page_size,
                total_count,
                start_offset,
                first_page_ids,
            } => json!([TYPE_SAMPLE, page_size, total_count, start_offset, first_page_ids]),
        };
        URL_SAFE.encode(fields.to_string())
    }

    /// Decode a query-parameter value produced by [`encode`](Self::encode).
    pub fn decode(value: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE
            .decode(value)
            .map_err(|_| CursorError::InvalidPageCursor)?;
        let parsed: Value =
            serde_json::from_slice(&bytes).map_err(|_| CursorError::InvalidPageCursor)?;
        let fields = parsed.as_array().ok_or(CursorError::InvalidPageCursor)?;
        let type_key = fields
            .first()
            .and_then(Value::as_str)
            .ok_or(CursorError::InvalidPageCursor)?;
        let usize_at = |i: usize| -> Result<usize, CursorError> {
            fields
                .get(i)
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .ok_or(CursorError::InvalidPageCursor)
        };
        let i64_at = |i: usize| -> Result<i64, CursorError> {
            fields
                .get(i)
                .and_then(Value::as_i64)
                .ok_or(CursorError::InvalidPageCursor)
        };
        match type_key {
            TYPE_BASIC => Ok(PageCursor::Basic {
                page_size: usize_at(1)?,
                total_count: i64_at(2)?,
            }),
            TYPE_OFFSET => Ok(PageCursor::Offset {
                page_size: usize_at(1)?,
                total_count: i64_at(2)?,
                start_offset: usize_at(3)?,
            }),
            TYPE_SAMPLE => {
                let ids = fields
                    .get(4)
                    .and_then(Value::as_array)
                    .ok_or(CursorError::InvalidPageCursor)?
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .map(str::to_string)
                            .ok_or(CursorError::InvalidPageCursor)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(PageCursor::Sample {
                    page_size: usize_at(1)?,
                    total_count: i64_at(2)?,
                    start_offset: usize_at(3)?,
                    first_page_ids: ids,
                })
            }
            _ => Err(CursorError::InvalidPageCursor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_types() {
        let basic = PageCursor::Basic {
            page_size: 13,
            total_count: 42,
        };
        let offset = PageCursor::Offset {
            page_size: 13,
            total_count: 42,
            start_offset: 26,
        };
        let sample = PageCursor::Sample {
            page_size: 13,
            total_count: MANY_MORE,
            start_offset: 13,
            first_page_ids: vec!["a".into(), "b".into()],
        };
        for cursor in [basic, offset, sample] {
            let decoded = PageCursor::decode(&cursor.encode()).unwrap();
            assert_eq!(decoded, cursor);
        }
    }

    #[test]
    fn test_decode_garbage_is_invalid() {
        assert!(PageCursor::decode("not base64 at all!").is_err());
        // valid base64, wrong shape
        let bogus = URL_SAFE.encode(r#"{"not":"an array"}"#);
        assert!(PageCursor::decode(&bogus).is_err());
        // unknown type tag
        let unknown = URL_SAFE.encode(r#"["ZZZ",13,42]"#);
        assert!(PageCursor::decode(&unknown).is_err());
    }

    #[test]
    fn test_offset_navigation() {
        let mut cursor = PageCursor::new_offset(13);
        cursor.set_total_count(30);
        assert!(cursor.is_valid());
        let second = cursor.next_cursor().unwrap();
        assert_eq!(second.start_offset(), 13);
        let third = second.next_cursor().unwrap();
        assert_eq!(third.start_offset(), 26);
        // 39 >= 30 total, no fourth page
        assert!(third.next_cursor().is_none());
        assert_eq!(third.prev_cursor().unwrap().start_offset(), 13);
        assert_eq!(third.first_cursor().unwrap().start_offset(), 0);
    }

    #[test]
    fn test_offset_bounded_by_max_offset() {
        let mut cursor = PageCursor::Offset {
            page_size: 13,
            total_count: 1_000_000,
            start_offset: MAX_OFFSET,
        };
        assert!(cursor.is_valid());
        assert!(cursor.next_cursor().is_none());
        cursor = PageCursor::Offset {
            page_size: 13,
            total_count: 1_000_000,
            start_offset: MAX_OFFSET + 1,
        };
        assert!(!cursor.is_valid());
    }

    #[test]
    fn test_sample_cursor_needs_first_page_ids_to_move() {
        let mut cursor = PageCursor::new_sample(13);
        cursor.set_total_count(100);
        assert!(cursor.next_cursor().is_none());
        cursor.set_first_page_ids(vec!["x".into()]);
        let next = cursor.next_cursor().unwrap();
        assert_eq!(next.start_offset(), 13);
        assert_eq!(next.first_page_ids(), ["x".to_string()]);
    }

    #[test]
    fn test_many_more_total_allows_next() {
        let cursor = PageCursor::Offset {
            page_size: 13,
            total_count: MANY_MORE,
            start_offset: 0,
        };
        assert!(cursor.next_cursor().is_some());
    }

    #[test]
    fn test_oversized_page_size_is_bounded() {
        let cursor = PageCursor::new_basic(10_000);
        assert_eq!(cursor.bounded_page_size(), MAX_PAGE_SIZE);
    }
}
