//! The compiled, shareable form of a grammar.
//!
//! A [`Language`] is what parsers consume: a symbol table, BNF productions,
//! lexical tables and an optional external scanner factory. It is produced
//! once from a [`Grammar`](crate::grammar::Grammar) by [`Language::new`] and
//! then cloned freely (it is reference counted).

use crate::compile::{self, CompileError};
use crate::grammar::Grammar;
use crate::lexer::ExternalScanner;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The table layout version produced by this crate.
pub const LANGUAGE_VERSION: usize = 14;

/// The oldest table layout version a [`Parser`](crate::Parser) still accepts.
pub const MIN_COMPATIBLE_LANGUAGE_VERSION: usize = 13;

/// Numeric identifier of a node kind.
pub type Symbol = u16;

/// Numeric identifier of a field name. Field ids start at 1.
pub type FieldId = u16;

/// Symbol of the end-of-input marker.
pub const END_SYMBOL: Symbol = 0;

/// Symbol used for `ERROR` nodes.
pub const ERROR_SYMBOL: Symbol = Symbol::MAX;

/// Constructs a fresh external scanner for every parse.
pub type ScannerFactory = fn() -> Box<dyn ExternalScanner>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SymbolKind {
    End,
    Terminal,
    External,
    Nonterminal,
    Auxiliary,
    Alias,
}

#[derive(Debug, Clone)]
pub(crate) struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub named: bool,
    pub visible: bool,
}

impl SymbolInfo {
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, SymbolKind::Terminal | SymbolKind::External)
    }
}

/// One element on the right-hand side of a production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Step {
    pub symbol: Symbol,
    pub field: Option<FieldId>,
    pub alias: Option<Symbol>,
    pub immediate: bool,
}

impl Step {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            field: None,
            alias: None,
            immediate: false,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Production {
    pub lhs: Symbol,
    pub steps: Vec<Step>,
    pub priority: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct LexToken {
    pub symbol: Symbol,
    pub regex: Regex,
    pub is_string: bool,
    pub precedence: i32,
}

/// Tables shared by every clone of a [`Language`].
pub(crate) struct LanguageData {
    pub name: String,
    pub version: usize,
    pub symbols: Vec<SymbolInfo>,
    pub fields: Vec<String>,
    pub productions: Vec<Production>,
    pub productions_by_lhs: Vec<Vec<usize>>,
    pub nullable: Vec<bool>,
    pub start: Symbol,
    pub lex_tokens: HashMap<Symbol, LexToken>,
    pub skip: Vec<Regex>,
    pub extra_tokens: HashMap<Symbol, Option<Symbol>>,
    pub externals: Vec<Symbol>,
    pub keywords: HashMap<String, Symbol>,
    pub word: Option<Symbol>,
    pub scanner: Option<ScannerFactory>,
}

/// An opaque, cheaply clonable handle to a compiled grammar.
#[derive(Clone)]
pub struct Language(pub(crate) Arc<LanguageData>);

impl Language {
    /// Compiles a grammar that does not use an external scanner.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] when validation fails, a rule cannot be
    /// compiled, or the grammar declares externals.
    pub fn new(grammar: &Grammar) -> Result<Self, CompileError> {
        compile::compile(grammar, None).map(|data| Self(Arc::new(data)))
    }

    /// Compiles a grammar whose `externals` are produced by the scanner built
    /// by `factory`.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] when validation fails or a rule cannot be compiled.
    pub fn with_external_scanner(
        grammar: &Grammar,
        factory: ScannerFactory,
    ) -> Result<Self, CompileError> {
        compile::compile(grammar, Some(factory)).map(|data| Self(Arc::new(data)))
    }

    /// The grammar's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The table layout version.
    #[must_use]
    pub fn version(&self) -> usize {
        self.0.version
    }

    /// Number of distinct node kinds, auxiliary ones included.
    #[must_use]
    pub fn node_kind_count(&self) -> usize {
        self.0.symbols.len()
    }

    /// Name of the node kind with the given id.
    #[must_use]
    pub fn node_kind_for_id(&self, id: Symbol) -> Option<&str> {
        if id == ERROR_SYMBOL {
            return Some("ERROR");
        }
        self.0.symbols.get(usize::from(id)).map(|s| s.name.as_str())
    }

    /// Looks up the id of a node kind by name. Returns `None` if unknown.
    #[must_use]
    pub fn id_for_node_kind(&self, kind: &str, named: bool) -> Option<Symbol> {
        if kind == "ERROR" && named {
            return Some(ERROR_SYMBOL);
        }
        self.0
            .symbols
            .iter()
            .position(|s| s.name == kind && s.named == named && s.visible)
            .and_then(|i| Symbol::try_from(i).ok())
    }

    /// Whether nodes of this kind are named (as opposed to anonymous literals).
    #[must_use]
    pub fn node_kind_is_named(&self, id: Symbol) -> bool {
        id == ERROR_SYMBOL || self.info(id).is_some_and(|s| s.named)
    }

    /// Whether nodes of this kind appear in syntax trees.
    #[must_use]
    pub fn node_kind_is_visible(&self, id: Symbol) -> bool {
        id == ERROR_SYMBOL || self.info(id).is_some_and(|s| s.visible)
    }

    /// Number of distinct field names.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.0.fields.len()
    }

    /// Name of the field with the given id.
    #[must_use]
    pub fn field_name_for_id(&self, id: FieldId) -> Option<&str> {
        let index = usize::from(id).checked_sub(1)?;
        self.0.fields.get(index).map(String::as_str)
    }

    /// Looks up a field id by name.
    #[must_use]
    pub fn field_id_for_name(&self, name: &str) -> Option<FieldId> {
        self.0
            .fields
            .iter()
            .position(|f| f == name)
            .and_then(|i| FieldId::try_from(i + 1).ok())
    }

    pub(crate) fn info(&self, id: Symbol) -> Option<&SymbolInfo> {
        self.0.symbols.get(usize::from(id))
    }

    pub(crate) fn data(&self) -> &LanguageData {
        &self.0
    }
}

impl PartialEq for Language {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Language {}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.0.name)
            .field("version", &self.0.version)
            .field("symbols", &self.0.symbols.len())
            .field("productions", &self.0.productions.len())
            .finish_non_exhaustive()
    }
}
