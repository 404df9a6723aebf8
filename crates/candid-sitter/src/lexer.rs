//! Context-aware tokenization.
//!
//! The parser asks for one token at a time together with the set of
//! terminals its chart can accept next; only those (plus extras) compete.
//! Among matches the longest wins, then string literals beat patterns, then
//! higher lexical precedence, then the earlier defined terminal. When the
//! word token wins with the text of a keyword that is acceptable here, the
//! keyword is produced instead.

use crate::language::{Language, LanguageData, Symbol, ERROR_SYMBOL};
use crate::tree::{LineIndex, Range};

/// A lexed token, addressed by byte offsets into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    pub symbol: Symbol,
    pub start: usize,
    pub end: usize,
    /// Whether extras (whitespace, comments) were skipped right before it.
    pub after_extra: bool,
    /// For extra tokens: the visible rule wrapping the terminal.
    pub wrapper: Option<Symbol>,
}

/// A hand-written tokenizer for the symbols a grammar lists in `externals`.
///
/// Mirrors Tree-sitter's external scanner protocol: `scan` is offered the
/// externals that are currently acceptable and reports which one it
/// recognized through [`ScanCursor::set_result_symbol`]. State that must
/// survive between tokens goes through `serialize`/`deserialize`.
pub trait ExternalScanner: Send {
    /// Attempts to recognize one external token at the cursor.
    fn scan(&mut self, cursor: &mut ScanCursor<'_>, valid_symbols: &[bool]) -> bool;

    /// Writes the scanner state into `buffer`.
    fn serialize(&self, buffer: &mut Vec<u8>);

    /// Restores state written by [`ExternalScanner::serialize`]. An empty
    /// buffer resets the scanner.
    fn deserialize(&mut self, buffer: &[u8]);
}

/// The view of the source text handed to an [`ExternalScanner`].
#[derive(Debug)]
pub struct ScanCursor<'a> {
    text: &'a str,
    position: usize,
    token_start: usize,
    marked_end: Option<usize>,
    result_symbol: usize,
}

impl<'a> ScanCursor<'a> {
    /// Creates a cursor positioned at byte `position` of `text`.
    #[must_use]
    pub fn new(text: &'a str, position: usize) -> Self {
        Self {
            text,
            position,
            token_start: position,
            marked_end: None,
            result_symbol: 0,
        }
    }

    /// The next character, or `None` at end of input.
    #[must_use]
    pub fn lookahead(&self) -> Option<char> {
        self.text.get(self.position..).and_then(|rest| rest.chars().next())
    }

    /// Moves past the lookahead. Skipped characters are excluded from the token.
    pub fn advance(&mut self, skip: bool) {
        if let Some(c) = self.lookahead() {
            self.position += c.len_utf8();
        }
        if skip {
            self.token_start = self.position;
        }
    }

    /// Marks the current position as the end of the token.
    pub fn mark_end(&mut self) {
        self.marked_end = Some(self.position);
    }

    /// Whether the cursor reached the end of input.
    #[must_use]
    pub fn eof(&self) -> bool {
        self.position >= self.text.len()
    }

    /// Records which external symbol (index into `externals`) was recognized.
    pub fn set_result_symbol(&mut self, index: usize) {
        self.result_symbol = index;
    }

    /// The current byte offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    fn token_range(&self) -> (usize, usize) {
        (self.token_start, self.marked_end.unwrap_or(self.position))
    }
}

struct Candidate {
    symbol: Option<Symbol>,
    len: usize,
    is_string: bool,
    precedence: i32,
}

impl Candidate {
    /// Ordering key: longer, then literal, then precedence, then earlier symbol.
    fn beats(&self, other: &Candidate) -> bool {
        let key = |c: &Candidate| {
            (
                c.len,
                c.is_string,
                c.precedence,
                std::cmp::Reverse(c.symbol.unwrap_or(Symbol::MAX)),
            )
        };
        key(self) > key(other)
    }
}

/// Produces tokens from a source string on demand.
pub(crate) struct Lexer<'a> {
    language: &'a LanguageData,
    text: &'a str,
    scanner: Option<Box<dyn ExternalScanner>>,
    scanner_state: Vec<u8>,
}

/// Extras consumed in front of a token, and where the token may start.
pub(crate) struct Leading {
    pub extras: Vec<Token>,
    pub offset: usize,
    pub after_extra: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(language: &'a LanguageData, text: &'a str) -> Self {
        Self {
            language,
            text,
            scanner: language.scanner.map(|factory| factory()),
            scanner_state: Vec::new(),
        }
    }

    /// Consumes whitespace and extra tokens starting at `position`.
    ///
    /// Stops early when an expected terminal matches at least as far as the
    /// next extra would.
    pub fn skip_extras(&mut self, mut position: usize, expected: &[bool]) -> Leading {
        let mut extras = Vec::new();
        let mut after_extra = false;

        while position < self.text.len() {
            if let Some(token) = self.scan_external(position, expected, true) {
                if token.wrapper.is_some()
                    || self.language.extra_tokens.contains_key(&token.symbol)
                {
                    position = token.end;
                    after_extra = true;
                    extras.push(Token { after_extra, ..token });
                    continue;
                }
                break;
            }

            let rest = &self.text[position..];
            let skip_len = self
                .language
                .skip
                .iter()
                .filter_map(|re| re.find(rest).map(|m| m.end()))
                .max()
                .unwrap_or(0);
            let extra = self.best_match(rest, |symbol| {
                self.language.extra_tokens.contains_key(&symbol)
            });
            let wanted = self
                .best_match(rest, |symbol| {
                    expected.get(usize::from(symbol)).copied().unwrap_or(false)
                })
                .map_or(0, |c| c.len);

            let extra_len = extra.as_ref().map_or(0, |c| c.len);
            if extra_len > 0 && extra_len > wanted && extra_len >= skip_len {
                if let Some(symbol) = extra.and_then(|c| c.symbol) {
                    let wrapper = self.language.extra_tokens.get(&symbol).copied().flatten();
                    extras.push(Token {
                        symbol,
                        start: position,
                        end: position + extra_len,
                        after_extra,
                        wrapper,
                    });
                }
                position += extra_len;
                after_extra = true;
            } else if skip_len > 0 && skip_len > wanted {
                position += skip_len;
                after_extra = true;
            } else {
                break;
            }
        }

        Leading {
            extras,
            offset: position,
            after_extra,
        }
    }

    /// Lexes one token at `position`, considering only `expected` terminals,
    /// or every terminal when `expected` is `None`.
    pub fn token(
        &mut self,
        position: usize,
        expected: Option<&[bool]>,
        after_extra: bool,
    ) -> Option<Token> {
        if position >= self.text.len() {
            return None;
        }
        let accepts = |symbol: Symbol| match expected {
            Some(expected) => expected.get(usize::from(symbol)).copied().unwrap_or(false),
            None => true,
        };

        let all = vec![true; self.language.symbols.len()];
        if let Some(token) = self.scan_external(position, expected.unwrap_or(&all), false) {
            if accepts(token.symbol) {
                return Some(Token { after_extra, ..token });
            }
        }

        let rest = &self.text[position..];
        let best = self.best_match(rest, |symbol| {
            accepts(symbol) && !self.is_extra_only(symbol, expected.is_some())
        })?;
        let mut symbol = best.symbol?;
        if Some(symbol) == self.language.word {
            match self.language.keywords.get(&rest[..best.len]) {
                Some(&keyword) if accepts(keyword) => symbol = keyword,
                _ => {}
            }
        }
        Some(Token {
            symbol,
            start: position,
            end: position + best.len,
            after_extra,
            wrapper: None,
        })
    }

    /// A one-character `ERROR` token for input no terminal matches.
    pub fn error_token(&self, position: usize, after_extra: bool) -> Option<Token> {
        let c = self.text.get(position..)?.chars().next()?;
        Some(Token {
            symbol: ERROR_SYMBOL,
            start: position,
            end: position + c.len_utf8(),
            after_extra,
            wrapper: None,
        })
    }

    fn is_extra_only(&self, symbol: Symbol, contextual: bool) -> bool {
        !contextual && self.language.extra_tokens.contains_key(&symbol)
    }

    fn best_match(&self, rest: &str, accepts: impl Fn(Symbol) -> bool) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for token in self.language.lex_tokens.values() {
            if !accepts(token.symbol) {
                continue;
            }
            let Some(m) = token.regex.find(rest) else {
                continue;
            };
            if m.end() == 0 {
                continue;
            }
            let candidate = Candidate {
                symbol: Some(token.symbol),
                len: m.end(),
                is_string: token.is_string,
                precedence: token.precedence,
            };
            if best.as_ref().is_none_or(|b| candidate.beats(b)) {
                best = Some(candidate);
            }
        }
        best
    }

    fn scan_external(
        &mut self,
        position: usize,
        expected: &[bool],
        extras_only: bool,
    ) -> Option<Token> {
        let scanner = self.scanner.as_mut()?;
        let externals = &self.language.externals;
        let valid: Vec<bool> = externals
            .iter()
            .map(|&symbol| {
                let is_extra = self.language.extra_tokens.contains_key(&symbol);
                let wanted = expected.get(usize::from(symbol)).copied().unwrap_or(false);
                if extras_only {
                    is_extra
                } else {
                    wanted || is_extra
                }
            })
            .collect();
        if !valid.iter().any(|v| *v) {
            return None;
        }

        scanner.deserialize(&self.scanner_state);
        let mut cursor = ScanCursor::new(self.text, position);
        if !scanner.scan(&mut cursor, &valid) {
            return None;
        }
        let (start, end) = cursor.token_range();
        let symbol = *externals.get(cursor.result_symbol)?;
        if end <= start || !valid.get(cursor.result_symbol).copied().unwrap_or(false) {
            return None;
        }
        self.scanner_state.clear();
        scanner.serialize(&mut self.scanner_state);

        Some(Token {
            symbol,
            start,
            end,
            after_extra: false,
            wrapper: self.language.extra_tokens.get(&symbol).copied().flatten(),
        })
    }
}

/// A token reported by [`tokenize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexedToken {
    /// Node kind of the token; for extras, the rule that wraps it.
    pub kind: Symbol,
    /// Where the token lies in the text.
    pub range: Range,
    /// Whether whitespace or extras preceded the token.
    pub after_extra: bool,
    /// Whether the token is an extra such as a comment.
    pub is_extra: bool,
}

/// Splits `text` into tokens without parsing it.
///
/// Every terminal of the language competes at every position, so the result
/// can differ from the tokens a parse would see. Input no terminal matches
/// yields one-character `ERROR` tokens.
#[must_use]
pub fn tokenize(language: &Language, text: &str) -> Vec<LexedToken> {
    let data = language.data();
    let lines = LineIndex::new(text);
    let mut lexer = Lexer::new(data, text);
    let none = vec![false; data.symbols.len()];
    let mut tokens = Vec::new();
    let mut position = 0;

    loop {
        let leading = lexer.skip_extras(position, &none);
        tokens.extend(leading.extras.iter().map(|extra| LexedToken {
            kind: extra.wrapper.unwrap_or(extra.symbol),
            range: lines.range(extra.start, extra.end),
            after_extra: extra.after_extra,
            is_extra: true,
        }));
        position = leading.offset;

        let token = lexer
            .token(position, None, leading.after_extra)
            .or_else(|| lexer.error_token(position, leading.after_extra));
        let Some(token) = token else {
            return tokens;
        };
        tokens.push(LexedToken {
            kind: token.symbol,
            range: lines.range(token.start, token.end),
            after_extra: token.after_extra,
            is_extra: false,
        });
        position = token.end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::dsl::{choice, pattern, prec, seq, string, sym, token, GrammarBuilder};

    fn language() -> Language {
        let grammar = GrammarBuilder::new("lexing")
            .word("id")
            .extras([pattern(r"\s"), sym("comment")])
            .rule(
                "start",
                seq([
                    choice([string("let"), sym("id")]),
                    choice([sym("nat"), sym("int")]),
                ]),
            )
            .rule("comment", token(seq([string("#"), pattern("[^\n]*")])))
            .rule("id", pattern("[a-z]+"))
            .rule("nat", pattern("[0-9]+"))
            .rule("int", prec(-1, token(pattern("[+-]?[0-9]+"))))
            .build();
        Language::new(&grammar).unwrap()
    }

    fn id(language: &Language, name: &str, named: bool) -> Symbol {
        language.id_for_node_kind(name, named).unwrap()
    }

    #[test]
    fn longest_match_and_keywords() {
        let language = language();
        let data = language.data();
        let mut lexer = Lexer::new(data, "letter let");
        let all = vec![true; data.symbols.len()];

        let first = lexer.token(0, Some(all.as_slice()), false).unwrap();
        assert_eq!(first.symbol, id(&language, "id", true));
        assert_eq!(first.end, 6);

        let leading = lexer.skip_extras(first.end, &all);
        assert!(leading.after_extra);
        let second = lexer.token(leading.offset, Some(all.as_slice()), true).unwrap();
        assert_eq!(second.symbol, id(&language, "let", false));
    }

    #[test]
    fn lexical_precedence_breaks_ties() {
        let language = language();
        let data = language.data();
        let mut lexer = Lexer::new(data, "42");
        let token = lexer.token(0, None, false).unwrap();
        assert_eq!(token.symbol, id(&language, "nat", true));
    }

    #[test]
    fn expected_set_restricts_candidates() {
        let language = language();
        let data = language.data();
        let mut lexer = Lexer::new(data, "42");
        let mut expected = vec![false; data.symbols.len()];
        expected[usize::from(id(&language, "int", true))] = true;
        let token = lexer.token(0, Some(expected.as_slice()), false).unwrap();
        assert_eq!(token.symbol, id(&language, "int", true));
    }

    #[test]
    fn comments_are_collected_as_extras() {
        let language = language();
        let data = language.data();
        let mut lexer = Lexer::new(data, "  # note\n x");
        let none = vec![false; data.symbols.len()];
        let leading = lexer.skip_extras(0, &none);
        assert_eq!(leading.extras.len(), 1);
        assert_eq!(leading.extras[0].symbol, id(&language, "comment", true));
        assert_eq!(leading.offset, 10);
    }

    #[test]
    fn tokenize_reports_every_token() {
        let language = language();
        let tokens = tokenize(&language, "let x # done\n é");
        let kinds: Vec<_> = tokens
            .iter()
            .map(|t| language.node_kind_for_id(t.kind).unwrap_or_default())
            .collect();
        assert_eq!(kinds, ["let", "id", "comment", "ERROR"]);
        assert!(tokens[2].is_extra);
        assert!(tokens[3].after_extra);
        assert_eq!(tokens[3].range.start_point.row, 1);
    }

    #[test]
    fn unmatched_input_yields_error_token() {
        let language = language();
        let mut lexer = Lexer::new(language.data(), "é");
        assert!(lexer.token(0, None, false).is_none());
        let error = lexer.error_token(0, false).unwrap();
        assert_eq!(error.symbol, ERROR_SYMBOL);
        assert_eq!(error.end, 2);
    }
}
