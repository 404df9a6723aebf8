//! A Rust-native, incremental tree-sitter for Candid.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::multiple_crate_versions)]

/// Core structures for Tree-sitter grammars.
///
/// A grammar is either decoded from `grammar.json` or written with the
/// [`grammar::dsl`] helpers. Everything downstream, from validation to
/// parsing, consumes the same [`Grammar`] value.
pub mod grammar;

/// Grammar validation and consistency checking utilities.
///
/// Validation exists to protect downstream stages from malformed grammars.
/// It enforces Tree-sitter's invariants and reports suspicious but legal
/// constructs as warnings.
pub mod validate;

/// Lowering of grammars into flat productions and lexical tokens.
pub mod compile;

/// Compiled languages and their symbol and field tables.
pub mod language;

/// On-demand, context-aware tokenization and the external scanner protocol.
pub mod lexer;

/// The incremental parser.
pub mod parser;

/// Syntax trees, nodes, cursors and edits.
pub mod tree;

/// The Candid grammar and its block-comment scanner.
pub mod candid;

pub use compile::CompileError;
pub use grammar::{parse_grammar, Grammar, GrammarError, Rule};
pub use language::{Language, LANGUAGE_VERSION};
pub use lexer::{tokenize, ExternalScanner, LexedToken, ScanCursor};
pub use parser::{LanguageError, ParseError, Parser};
pub use tree::{InputEdit, Node, Point, Range, Tree, TreeCursor};
pub use validate::{validate, ValidationError};
