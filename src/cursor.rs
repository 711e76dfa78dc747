use serde::Serialize;

/// Reading position: page index and word offset within that page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadingCursor {
    pub page: usize,
    pub word: usize,
}

impl ReadingCursor {
    pub fn new(page: usize, word: usize) -> Self {
        Self { page, word }
    }

    /// Moves past a chunk; wraps to the next page once `page_len` is reached.
    pub fn advance(&mut self, chunk_size: usize, page_len: usize) {
        self.word = self.word.saturating_add(chunk_size);
        if self.word >= page_len {
            self.skip_page();
        }
    }

    pub fn skip_page(&mut self) {
        self.page += 1;
        self.word = 0;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_finished(&self, page_count: usize) -> bool {
        self.page >= page_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_stays_on_page_while_words_remain() {
        let mut cursor = ReadingCursor::default();
        cursor.advance(2, 5);
        assert_eq!(cursor, ReadingCursor::new(0, 2));
        cursor.advance(2, 5);
        assert_eq!(cursor, ReadingCursor::new(0, 4));
    }

    #[test]
    fn advance_wraps_when_chunk_reaches_page_end() {
        let mut cursor = ReadingCursor::new(0, 4);
        cursor.advance(2, 5);
        assert_eq!(cursor, ReadingCursor::new(1, 0));

        let mut exact = ReadingCursor::new(2, 3);
        exact.advance(3, 6);
        assert_eq!(exact, ReadingCursor::new(3, 0));
    }

    #[test]
    fn finished_once_page_reaches_count() {
        let mut cursor = ReadingCursor::new(1, 0);
        assert!(!cursor.is_finished(2));
        cursor.skip_page();
        assert!(cursor.is_finished(2));
        cursor.reset();
        assert_eq!(cursor, ReadingCursor::default());
        assert!(ReadingCursor::default().is_finished(0));
    }
}
