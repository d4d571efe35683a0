use super::page::{RecordPage, RecordsManager};
use crate::storage::record::Record;
use crate::types::Result;

/// Walks record pages along their links from a starting position up to an
/// exclusive upper key.
///
/// Holds at most one page checkout; it is returned when the walk moves on,
/// ends, or the iterator is dropped.
pub struct RangeIter {
    pages: RecordsManager,
    page: Option<RecordPage>,
    idx: usize,
    max: Option<Record>,
}

impl RangeIter {
    pub(crate) fn new(pages: RecordsManager, page: RecordPage, idx: usize, max: Option<Record>) -> Self {
        Self {
            pages,
            page: Some(page),
            idx,
            max,
        }
    }

    fn finish(&mut self) {
        if let Some(page) = self.page.take() {
            self.pages.release(page);
        }
    }
}

impl Iterator for RangeIter {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let page = self.page.as_ref()?;
            if let Some(record) = page.records.get(self.idx) {
                if self.max.as_ref().is_some_and(|max| record.key() >= max.key()) {
                    self.finish();
                    return None;
                }
                self.idx += 1;
                return Some(Ok(record.clone()));
            }
            let link = page.link;
            self.finish();
            let next = link?;
            match self.pages.get_read(next) {
                Ok(page) => {
                    self.page = Some(page);
                    self.idx = 0;
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
