//! The parsing driver.
//!
//! Parsing is Earley recognition over a token stream that is lexed on
//! demand, so the lexer only ever considers terminals the chart can accept.
//! When an old tree is supplied, unchanged subtrees are fed to the chart as
//! single units, and the grammar productions beneath them are never
//! predicted.

mod build;
mod chart;

use crate::language::{
    Language, LanguageData, Symbol, ERROR_SYMBOL, LANGUAGE_VERSION,
    MIN_COMPATIBLE_LANGUAGE_VERSION,
};
use crate::lexer::{Lexer, Token};
use crate::tree::{LineIndex, Subtree, Tree};
use build::{is_reusable, Builder};
use chart::Chart;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Errors reported by [`Parser::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// No language was assigned with [`Parser::set_language`].
    #[error("no language has been set")]
    NoLanguage,

    /// The cancellation flag was raised during parsing.
    #[error("parsing was cancelled")]
    Cancelled,

    /// The input bytes are not valid UTF-8.
    #[error("input is not valid UTF-8 (at byte {0})")]
    InvalidUtf8(usize),
}

/// Raised when a language cannot be used by this parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("incompatible language version {version}; expected {min}..={max}")]
pub struct LanguageError {
    /// The version the language was compiled with.
    pub version: usize,
    /// Oldest supported version.
    pub min: usize,
    /// Newest supported version.
    pub max: usize,
}

/// One input unit of the chart: a freshly lexed token or a reused subtree.
#[derive(Debug, Clone)]
pub(crate) enum Unit {
    Token(Token),
    Reused(Arc<Subtree>),
}

impl Unit {
    pub fn start(&self) -> usize {
        match self {
            Unit::Token(token) => token.start,
            Unit::Reused(node) => node.range.start_byte,
        }
    }

    pub fn end(&self) -> usize {
        match self {
            Unit::Token(token) => token.end,
            Unit::Reused(node) => node.range.end_byte,
        }
    }
}

/// Builds syntax trees from source text.
#[derive(Debug, Default)]
pub struct Parser {
    language: Option<Language>,
    cancellation_flag: Option<Arc<AtomicBool>>,
}

impl Parser {
    /// A parser without a language.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the language to parse with.
    ///
    /// # Errors
    ///
    /// Fails if the language tables were built for an incompatible version.
    pub fn set_language(&mut self, language: &Language) -> Result<(), LanguageError> {
        let version = language.version();
        if !(MIN_COMPATIBLE_LANGUAGE_VERSION..=LANGUAGE_VERSION).contains(&version) {
            return Err(LanguageError {
                version,
                min: MIN_COMPATIBLE_LANGUAGE_VERSION,
                max: LANGUAGE_VERSION,
            });
        }
        self.language = Some(language.clone());
        Ok(())
    }

    /// The language currently assigned.
    #[must_use]
    pub fn language(&self) -> Option<&Language> {
        self.language.as_ref()
    }

    /// Installs a flag that aborts parsing with [`ParseError::Cancelled`] once set.
    pub fn set_cancellation_flag(&mut self, flag: Option<Arc<AtomicBool>>) {
        self.cancellation_flag = flag;
    }

    /// Forgets per-parse state. Parses are self-contained, so this only
    /// clears the cancellation flag.
    pub fn reset(&mut self) {
        self.cancellation_flag = None;
    }

    /// Parses UTF-8 bytes. See [`Parser::parse`].
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidUtf8`] for malformed input, otherwise the
    /// errors of [`Parser::parse`].
    pub fn parse_bytes(
        &mut self,
        bytes: &[u8],
        old_tree: Option<&Tree>,
    ) -> Result<Tree, ParseError> {
        let text =
            std::str::from_utf8(bytes).map_err(|e| ParseError::InvalidUtf8(e.valid_up_to()))?;
        self.parse(text, old_tree)
    }

    /// Parses `text` into a syntax tree.
    ///
    /// `old_tree` must describe a previous version of the text and must
    /// already have been updated with [`Tree::edit`] for every change since.
    /// Syntax errors do not fail the parse; they surface as `ERROR` nodes.
    ///
    /// # Errors
    ///
    /// Fails when no language is set or the cancellation flag is raised.
    pub fn parse(&mut self, text: &str, old_tree: Option<&Tree>) -> Result<Tree, ParseError> {
        let language = self.language.clone().ok_or(ParseError::NoLanguage)?;
        let lines = LineIndex::new(text);

        let reusable = match old_tree {
            Some(old) if old.language() == &language => {
                collect_reusable(language.data(), &old.root)
            }
            _ => HashMap::new(),
        };

        let mut outcome = self.run(&language, text, &lines, &reusable)?;
        if !outcome.accepted && !reusable.is_empty() {
            tracing::debug!("incremental parse failed; reparsing from scratch");
            outcome = self.run(&language, text, &lines, &HashMap::new())?;
        }

        tracing::debug!(
            language = language.name(),
            bytes = text.len(),
            reused = outcome.reused,
            has_error = outcome.root.has_error,
            "parsed"
        );
        Ok(Tree::new(Arc::new(outcome.root), language))
    }

    fn cancelled(&self) -> bool {
        self.cancellation_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn run(
        &self,
        language: &Language,
        text: &str,
        lines: &LineIndex,
        reusable: &HashMap<usize, Vec<Arc<Subtree>>>,
    ) -> Result<Outcome, ParseError> {
        let data = language.data();
        let mut lexer = Lexer::new(data, text);
        let mut chart = Chart::new(data);
        let mut units: Vec<Unit> = Vec::new();
        let mut floating: Vec<Subtree> = Vec::new();
        let mut skipped: Vec<Token> = Vec::new();
        let mut position = 0;
        let mut reused = 0;
        let none = vec![false; data.symbols.len()];

        loop {
            if self.cancelled() {
                return Err(ParseError::Cancelled);
            }
            let k = units.len();

            let candidates = if reusable.is_empty() {
                &[][..]
            } else {
                let offset = lexer.skip_extras(position, &none).offset;
                reusable.get(&offset).map_or(&[][..], Vec::as_slice)
            };
            let suppressed: HashSet<Symbol> = candidates.iter().map(|node| node.symbol).collect();
            chart.close(k, &suppressed);

            let expected = chart.expected_terminals(k);
            let leading = lexer.skip_extras(position, &expected);
            for extra in &leading.extras {
                floating.push(extra_node(extra, lines));
            }
            position = leading.offset;

            let waiting: HashSet<Symbol> = chart.expected_nonterminals(k).collect();
            let reuse = candidates
                .iter()
                .find(|node| node.range.start_byte == position && waiting.contains(&node.symbol));
            if let Some(node) = reuse {
                tracing::trace!(symbol = node.symbol, start = position, "reusing subtree");
                flush_skipped(&mut skipped, &mut floating, lines);
                chart.scan(k, node.symbol, false);
                position = node.range.end_byte;
                units.push(Unit::Reused(Arc::clone(node)));
                reused += 1;
                continue;
            }
            if !suppressed.is_empty() {
                chart.close(k, &HashSet::new());
            }
            let expected = chart.expected_terminals(k);

            let token = lexer
                .token(position, Some(expected.as_slice()), leading.after_extra)
                .or_else(|| lexer.token(position, None, leading.after_extra))
                .or_else(|| lexer.error_token(position, leading.after_extra));
            let Some(token) = token else {
                break;
            };

            if token.symbol != ERROR_SYMBOL && chart.scan(k, token.symbol, token.after_extra) {
                flush_skipped(&mut skipped, &mut floating, lines);
                units.push(Unit::Token(token));
            } else {
                chart.discard_after(k);
                tracing::trace!(start = token.start, end = token.end, "skipping unexpected token");
                skipped.push(token);
            }
            position = token.end;
        }
        flush_skipped(&mut skipped, &mut floating, lines);

        let mut builder = Builder::new(data, &chart, &units, lines);
        let derived = if chart.accepts(units.len()) {
            builder.accepted_root()
        } else {
            None
        };
        let accepted = derived.is_some();
        let mut root = match derived {
            Some(root) => root,
            None => builder.error_root(),
        };
        for node in floating {
            root.insert_floating(Arc::new(node));
        }
        root.cover_children();

        Ok(Outcome {
            root,
            accepted,
            reused,
        })
    }
}

struct Outcome {
    root: Subtree,
    accepted: bool,
    reused: usize,
}

fn extra_node(token: &Token, lines: &LineIndex) -> Subtree {
    let symbol = token.wrapper.unwrap_or(token.symbol);
    let mut node = Subtree::leaf(symbol, symbol, lines.range(token.start, token.end));
    node.is_extra = true;
    node
}

/// Wraps a run of skipped tokens into a single `ERROR` node.
fn flush_skipped(skipped: &mut Vec<Token>, floating: &mut Vec<Subtree>, lines: &LineIndex) {
    let (Some(first), Some(last)) = (skipped.first(), skipped.last()) else {
        return;
    };
    let range = lines.range(first.start, last.end);
    let children = skipped
        .drain(..)
        .map(|token| {
            let span = lines.range(token.start, token.end);
            let leaf = Subtree::leaf(token.symbol, token.symbol, span);
            (Arc::new(leaf), None)
        })
        .collect();
    floating.push(Subtree::node(ERROR_SYMBOL, ERROR_SYMBOL, range, children));
}

/// Indexes reusable nodes of an edited tree by start byte, outermost first.
fn collect_reusable(
    language: &LanguageData,
    root: &Arc<Subtree>,
) -> HashMap<usize, Vec<Arc<Subtree>>> {
    let mut index: HashMap<usize, Vec<Arc<Subtree>>> = HashMap::new();
    let mut stack = vec![Arc::clone(root)];
    while let Some(node) = stack.pop() {
        if is_reusable(language, &node) {
            index.entry(node.range.start_byte).or_default().push(Arc::clone(&node));
            continue;
        }
        stack.extend(node.children.iter().rev().cloned());
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::dsl::{
        choice, field, immediate, optional, pattern, repeat, seq, string, sym, GrammarBuilder,
    };
    use crate::tree::InputEdit;

    fn list_language() -> Language {
        let grammar = GrammarBuilder::new("list")
            .word("id")
            .extras([pattern(r"\s"), sym("comment")])
            .rule(
                "document",
                seq([
                    repeat(seq([sym("entry"), immediate(string(";"))])),
                    optional(sym("entry")),
                ]),
            )
            .rule(
                "entry",
                choice([
                    seq([field("key", sym("id")), string("="), field("value", sym("value"))]),
                    seq([string("let"), sym("id")]),
                ]),
            )
            .rule("value", choice([sym("id"), sym("number")]))
            .rule("comment", pattern("#[^\n]*"))
            .rule("id", pattern("[a-z]+"))
            .rule("number", pattern("[0-9]+"))
            .build();
        Language::new(&grammar).unwrap()
    }

    fn parse(text: &str) -> Tree {
        let mut parser = Parser::new();
        parser.set_language(&list_language()).unwrap();
        parser.parse(text, None).unwrap()
    }

    #[test]
    fn parse_without_language_fails() {
        let mut parser = Parser::new();
        assert_eq!(parser.parse("a", None).unwrap_err(), ParseError::NoLanguage);
    }

    #[test]
    fn parses_simple_document() {
        let tree = parse("a = b; let c");
        let root = tree.root_node();
        assert_eq!(root.kind(), "document");
        assert!(!root.has_error());
        assert_eq!(
            root.to_sexp(),
            "(document (entry key: (id) value: (value (id))) (entry (id)))"
        );
        assert_eq!(root.child_count(), 3);
        assert_eq!(root.child(1).unwrap().kind(), ";");
    }

    #[test]
    fn fields_are_addressable() {
        let text = "x = 42";
        let tree = parse(text);
        let entry = tree.root_node().named_child(0).unwrap();
        let key = entry.child_by_field_name("key").unwrap();
        assert_eq!(key.utf8_text(text.as_bytes()).unwrap(), "x");
        let value = entry.child_by_field_name("value").unwrap();
        assert_eq!(value.named_child(0).unwrap().kind(), "number");
        assert_eq!(entry.field_name_for_child(1), None);
    }

    #[test]
    fn comments_become_extra_nodes() {
        let tree = parse("# heading\na = b");
        let root = tree.root_node();
        let comment = root.child(0).unwrap();
        assert_eq!(comment.kind(), "comment");
        assert!(comment.is_extra());
        assert_eq!(root.start_byte(), 0);
    }

    #[test]
    fn immediate_separator_rejects_whitespace() {
        let tree = parse("a = b ;");
        assert!(tree.root_node().has_error());
    }

    #[test]
    fn unexpected_tokens_are_wrapped_in_errors() {
        let tree = parse("a = b; = ; let c");
        let root = tree.root_node();
        assert!(root.has_error());
        assert!(root.children().any(|child| child.is_error()));
    }

    #[test]
    fn empty_input_yields_empty_root() {
        let tree = parse("");
        let root = tree.root_node();
        assert_eq!(root.kind(), "document");
        assert_eq!(root.byte_range(), 0..0);
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn incremental_parse_reuses_unchanged_entries() {
        let mut parser = Parser::new();
        parser.set_language(&list_language()).unwrap();
        let old_text = "a = b; c = d; e = f";
        let mut tree = parser.parse(old_text, None).unwrap();

        let edit = InputEdit::replace(old_text, 18, 19, "42").unwrap();
        tree.edit(&edit);
        let new_text = "a = b; c = d; e = 42";
        let new_tree = parser.parse(new_text, Some(&tree)).unwrap();
        let fresh = parser.parse(new_text, None).unwrap();
        assert_eq!(new_tree.root_node().to_sexp(), fresh.root_node().to_sexp());

        assert!(Arc::ptr_eq(&tree.root.children[0], &new_tree.root.children[0]));
        assert!(Arc::ptr_eq(&tree.root.children[2], &new_tree.root.children[2]));
        assert!(!new_tree.root_node().has_changes());

        let changed = tree.changed_ranges(&new_tree);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].start_byte, 18);
        assert_eq!(changed[0].end_byte, 20);
    }

    #[test]
    fn cancellation_aborts_parse() {
        let mut parser = Parser::new();
        parser.set_language(&list_language()).unwrap();
        let flag = Arc::new(AtomicBool::new(true));
        parser.set_cancellation_flag(Some(flag));
        assert_eq!(parser.parse("a = b", None).unwrap_err(), ParseError::Cancelled);
        parser.reset();
        assert!(parser.parse("a = b", None).is_ok());
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let mut parser = Parser::new();
        parser.set_language(&list_language()).unwrap();
        let err = parser.parse_bytes(b"a = \xff", None).unwrap_err();
        assert_eq!(err, ParseError::InvalidUtf8(4));
    }
}
