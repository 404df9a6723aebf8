//! External scanner for nested block comments.

use crate::lexer::{ExternalScanner, ScanCursor};

/// Recognizes `/* ... */` comments, which nest and may contain `//` line
/// comments that hide a closing `*/` until the end of their line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockCommentScanner {
    depth: u32,
}

impl BlockCommentScanner {
    /// Nesting depth reached by the last scan.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    fn skip_line_comment(cursor: &mut ScanCursor<'_>) {
        while let Some(c) = cursor.lookahead() {
            cursor.advance(false);
            if c == '\n' {
                return;
            }
            if c == '\r' {
                if cursor.lookahead() == Some('\n') {
                    cursor.advance(false);
                }
                return;
            }
        }
    }

    fn consume_body(&mut self, cursor: &mut ScanCursor<'_>) -> bool {
        self.depth = 1;
        while let Some(c) = cursor.lookahead() {
            cursor.advance(false);
            match (c, cursor.lookahead()) {
                ('/', Some('*')) => {
                    cursor.advance(false);
                    self.depth += 1;
                }
                ('/', Some('/')) => {
                    cursor.advance(false);
                    Self::skip_line_comment(cursor);
                }
                ('*', Some('/')) => {
                    cursor.advance(false);
                    self.depth -= 1;
                    if self.depth == 0 {
                        cursor.mark_end();
                        return true;
                    }
                }
                _ => {}
            }
        }
        cursor.mark_end();
        false
    }
}

impl ExternalScanner for BlockCommentScanner {
    fn scan(&mut self, cursor: &mut ScanCursor<'_>, valid_symbols: &[bool]) -> bool {
        if !valid_symbols.first().copied().unwrap_or(false) {
            return false;
        }
        while cursor.lookahead().is_some_and(char::is_whitespace) {
            cursor.advance(true);
        }
        if cursor.lookahead() != Some('/') {
            return false;
        }
        cursor.advance(false);
        if cursor.lookahead() != Some('*') {
            return false;
        }
        cursor.advance(false);

        if !self.consume_body(cursor) {
            return false;
        }
        cursor.set_result_symbol(0);
        true
    }

    fn serialize(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.depth.to_ne_bytes());
    }

    fn deserialize(&mut self, buffer: &[u8]) {
        self.depth = buffer.try_into().map_or(0, u32::from_ne_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> Option<(usize, u32)> {
        let mut scanner = BlockCommentScanner::default();
        let mut cursor = ScanCursor::new(text, 0);
        scanner
            .scan(&mut cursor, &[true])
            .then(|| (cursor.position(), scanner.depth()))
    }

    #[test]
    fn simple_comment() {
        assert_eq!(scan("/* hi */ rest"), Some((8, 0)));
    }

    #[test]
    fn nested_comments_balance() {
        let text = "/* a /* b */ c */x";
        assert_eq!(scan(text), Some((text.len() - 1, 0)));
    }

    #[test]
    fn line_comment_hides_terminator() {
        let text = "/* // */ still inside\n */";
        assert_eq!(scan(text), Some((text.len(), 0)));
    }

    #[test]
    fn unterminated_comment_is_rejected() {
        assert_eq!(scan("/* /* */"), None);
        assert_eq!(scan("// line"), None);
    }

    #[test]
    fn invalid_when_not_expected() {
        let mut scanner = BlockCommentScanner::default();
        let mut cursor = ScanCursor::new("/* x */", 0);
        assert!(!scanner.scan(&mut cursor, &[false]));
    }

    #[test]
    fn state_survives_serialization() {
        let scanner = BlockCommentScanner { depth: 3 };
        let mut buffer = Vec::new();
        scanner.serialize(&mut buffer);
        assert_eq!(buffer.len(), 4);

        let mut restored = BlockCommentScanner::default();
        restored.deserialize(&buffer);
        assert_eq!(restored.depth(), 3);
        restored.deserialize(&[]);
        assert_eq!(restored.depth(), 0);
    }
}
