//! Forward-only row cursors with one row of look-ahead.
//!
//! A [`RowSource`] yields rows in the order its backend query defines.
//! [`Cursor`] wraps a source and keeps the next row pre-fetched so callers
//! can peek at it before deciding whether to consume it. Both support
//! [`reset`](Cursor::reset), which restarts iteration from the first row.

use std::collections::VecDeque;

use crate::error::{ReadError, SourceError};

/// Backend that yields rows of one query in a fixed order.
pub trait RowSource {
    /// Row type produced by the query.
    type Row;

    /// Fetch the next row, or `None` once the query is exhausted.
    fn next_row(&mut self) -> Result<Option<Self::Row>, SourceError>;

    /// Restart the query so the next call to
    /// [`next_row`](RowSource::next_row) yields the first row again.
    fn reset(&mut self) -> Result<(), SourceError>;
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    type Row = S::Row;

    fn next_row(&mut self) -> Result<Option<Self::Row>, SourceError> {
        (**self).next_row()
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        (**self).reset()
    }
}

/// Boxed row source borrowing from a backend for `'a`.
pub type BoxedSource<'a, R> = Box<dyn RowSource<Row = R> + 'a>;

/// In-memory row source over a pre-sorted vector.
///
/// # Examples
///
/// ```
/// use snapshot_core::cursor::{Cursor, VecSource};
///
/// # fn main() -> Result<(), snapshot_core::ReadError> {
/// let mut cursor = Cursor::open(VecSource::new(vec![1, 2]))?;
/// assert_eq!(cursor.current(), Some(&1));
/// assert_eq!(cursor.advance()?, Some(1));
/// assert_eq!(cursor.advance()?, Some(2));
/// assert!(!cursor.has_more());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct VecSource<R> {
    rows: Vec<R>,
    position: usize,
}

impl<R> VecSource<R> {
    /// Serve `rows` in the given order.
    #[must_use]
    pub const fn new(rows: Vec<R>) -> Self {
        Self { rows, position: 0 }
    }
}

impl<R> Default for VecSource<R> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<R: Clone> RowSource for VecSource<R> {
    type Row = R;

    fn next_row(&mut self) -> Result<Option<R>, SourceError> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        self.position = 0;
        Ok(())
    }
}

/// Row source that buffers one page of rows at a time.
///
/// `fetch` receives the last row of the previous page (or `None` for the
/// first page) and returns at most `page_size` rows. A page shorter than
/// `page_size` ends the query.
pub struct PagedSource<R, F> {
    fetch: F,
    page_size: usize,
    buffer: VecDeque<R>,
    last: Option<R>,
    exhausted: bool,
}

impl<R, F> PagedSource<R, F>
where
    R: Clone,
    F: FnMut(Option<&R>) -> Result<Vec<R>, SourceError>,
{
    /// Wrap a page fetcher returning pages of `page_size` rows.
    ///
    /// A `page_size` of zero is treated as one.
    pub fn new(fetch: F, page_size: usize) -> Self {
        Self {
            fetch,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            last: None,
            exhausted: false,
        }
    }
}

impl<R, F> RowSource for PagedSource<R, F>
where
    R: Clone,
    F: FnMut(Option<&R>) -> Result<Vec<R>, SourceError>,
{
    type Row = R;

    fn next_row(&mut self) -> Result<Option<R>, SourceError> {
        if self.buffer.is_empty() && !self.exhausted {
            let page = (self.fetch)(self.last.as_ref())?;
            if page.len() < self.page_size {
                self.exhausted = true;
            }
            self.buffer.extend(page);
        }
        let row = self.buffer.pop_front();
        if let Some(ref fetched) = row {
            self.last = Some(fetched.clone());
        }
        Ok(row)
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        self.buffer.clear();
        self.last = None;
        self.exhausted = false;
        Ok(())
    }
}

/// Cursor holding the next row of a [`RowSource`] in memory.
///
/// The cursor is primed on construction: [`current`](Cursor::current) is
/// the first row straight away.
pub struct Cursor<S: RowSource> {
    source: S,
    current: Option<S::Row>,
}

impl<S: RowSource> Cursor<S> {
    /// Wrap `source` and pre-fetch its first row.
    pub fn open(mut source: S) -> Result<Self, ReadError> {
        let current = fetch(&mut source, "opening a cursor")?;
        Ok(Self { source, current })
    }

    /// Row the cursor is positioned on.
    #[must_use]
    pub const fn current(&self) -> Option<&S::Row> {
        self.current.as_ref()
    }

    /// Whether a row is available.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.current.is_some()
    }

    /// Consume the current row and pre-fetch the following one.
    pub fn advance(&mut self) -> Result<Option<S::Row>, ReadError> {
        if self.current.is_none() {
            return Ok(None);
        }
        let next = fetch(&mut self.source, "advancing a cursor")?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    /// Discard every remaining row, returning how many were skipped.
    pub fn drain(&mut self) -> Result<usize, ReadError> {
        let mut skipped = 0;
        while self.advance()?.is_some() {
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Restart from the first row.
    pub fn reset(&mut self) -> Result<(), ReadError> {
        self.source
            .reset()
            .map_err(|source| ReadError::Source {
                operation: "resetting a cursor",
                source,
            })?;
        self.current = fetch(&mut self.source, "resetting a cursor")?;
        Ok(())
    }
}

fn fetch<S: RowSource>(source: &mut S, operation: &'static str) -> Result<Option<S::Row>, ReadError> {
    source
        .next_row()
        .map_err(|err| ReadError::Source {
            operation,
            source: err,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Default)]
    struct FailingSource {
        fail_after: usize,
        served: usize,
    }

    impl RowSource for FailingSource {
        type Row = usize;

        fn next_row(&mut self) -> Result<Option<usize>, SourceError> {
            if self.served >= self.fail_after {
                return Err("backend went away".into());
            }
            self.served += 1;
            Ok(Some(self.served))
        }

        fn reset(&mut self) -> Result<(), SourceError> {
            self.served = 0;
            Ok(())
        }
    }

    #[rstest]
    fn empty_source_has_nothing_current() {
        let cursor = Cursor::open(VecSource::<u8>::default()).expect("open cursor");
        assert!(!cursor.has_more());
        assert_eq!(cursor.current(), None);
    }

    #[rstest]
    fn advance_returns_rows_in_order() {
        let mut cursor = Cursor::open(VecSource::new(vec!['a', 'b', 'c'])).expect("open cursor");
        let mut seen = Vec::new();
        while let Some(row) = cursor.advance().expect("advance") {
            seen.push(row);
        }
        assert_eq!(seen, vec!['a', 'b', 'c']);
        assert_eq!(cursor.advance().expect("advance past end"), None);
    }

    #[rstest]
    fn reset_restarts_from_first_row() {
        let mut cursor = Cursor::open(VecSource::new(vec![10, 20])).expect("open cursor");
        assert_eq!(cursor.drain().expect("drain"), 2);
        cursor.reset().expect("reset");
        assert_eq!(cursor.current(), Some(&10));
    }

    #[rstest]
    fn source_failures_name_the_operation() {
        let mut cursor = Cursor::open(FailingSource {
            fail_after: 1,
            served: 0,
        })
        .expect("first row is served");
        let err = cursor.advance().expect_err("second fetch fails");
        assert!(matches!(
            err,
            ReadError::Source {
                operation: "advancing a cursor",
                ..
            }
        ));
    }

    #[rstest]
    #[case(5, 3)]
    #[case(6, 4)]
    #[case(0, 1)]
    fn paged_source_resumes_after_last_row(#[case] total: i64, #[case] expected_pages: usize) {
        let rows: Vec<i64> = (1..=total).collect();
        let mut pages_served = 0;
        let source = PagedSource::new(
            |last: Option<&i64>| {
                pages_served += 1;
                let start = last.copied().unwrap_or(0);
                Ok(rows
                    .iter()
                    .copied()
                    .filter(|row| *row > start)
                    .take(2)
                    .collect())
            },
            2,
        );
        let mut cursor = Cursor::open(source).expect("open cursor");
        let mut seen = Vec::new();
        while let Some(row) = cursor.advance().expect("advance") {
            seen.push(row);
        }
        assert_eq!(seen, rows);
        drop(cursor);
        // A short page ends the query; only an exact multiple needs the
        // trailing empty page.
        assert_eq!(pages_served, expected_pages);
    }

    #[rstest]
    fn paged_source_refetches_after_reset() {
        let mut pages_served = 0;
        let source = PagedSource::new(
            |_: Option<&u8>| {
                pages_served += 1;
                Ok(vec![7])
            },
            4,
        );
        let mut cursor = Cursor::open(source).expect("open cursor");
        assert_eq!(cursor.drain().expect("drain"), 1);
        cursor.reset().expect("reset");
        assert_eq!(cursor.current(), Some(&7));
        drop(cursor);
        assert_eq!(pages_served, 2);
    }
}
