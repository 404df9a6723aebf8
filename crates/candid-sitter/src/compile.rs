//! Grammar compilation: from declarative [`Rule`] trees to parse tables.
//!
//! Syntactic rules are flattened into BNF productions. Repetitions and
//! oversized nested choices become hidden auxiliary nonterminals, string
//! literals become anonymous terminals, and lexical rules are turned into
//! anchored regular expressions for the [`lexer`](crate::lexer).

use crate::grammar::{is_hidden_name, Grammar, GrammarError, Rule, RuleType};
use crate::language::{
    FieldId, LanguageData, LexToken, Production, ScannerFactory, Step, Symbol, SymbolInfo,
    SymbolKind, LANGUAGE_VERSION,
};
use crate::validate::{validate, ValidationError};
use regex::Regex;
use std::collections::HashMap;

/// Largest number of alternatives a single sequence may expand into before
/// members are moved into auxiliary rules.
const MAX_INLINE_ALTERNATIVES: usize = 32;

/// Failures raised while turning a grammar into a [`Language`](crate::Language).
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The grammar could not be decoded.
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    /// The grammar failed structural validation.
    #[error("invalid grammar: {0}")]
    Validation(#[from] ValidationError),

    /// A rule uses a construct that cannot be compiled in its position.
    #[error("rule '{rule}' uses unsupported {construct}")]
    UnsupportedRule {
        /// The rule being compiled.
        rule: String,
        /// What was found.
        construct: String,
    },

    /// A symbol name could not be resolved.
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),

    /// A lexical rule produced a regular expression the regex engine rejects.
    #[error("invalid pattern for '{rule}': {source}")]
    InvalidPattern {
        /// The terminal being compiled.
        rule: String,
        /// The regex engine's complaint.
        source: regex::Error,
    },

    /// An entry in `extras` is neither a token nor a choice of tokens.
    #[error("extra '{0}' must be a token or a choice of tokens")]
    BadExtra(String),

    /// The grammar declares externals but no scanner was supplied.
    #[error("grammar '{0}' declares externals but no external scanner was provided")]
    MissingScanner(String),

    /// The grammar needs more symbols than a table can address.
    #[error("grammar has too many symbols")]
    TooManySymbols,
}

#[derive(Debug, Clone, Default)]
struct Alternative {
    steps: Vec<Step>,
    priority: i32,
}

impl Alternative {
    fn single(symbol: Symbol) -> Self {
        Self {
            steps: vec![Step::new(symbol)],
            priority: 0,
        }
    }
}

struct Compiler<'g> {
    grammar: &'g Grammar,
    symbols: Vec<SymbolInfo>,
    by_name: HashMap<String, Symbol>,
    literals: HashMap<String, Symbol>,
    inline_tokens: HashMap<String, Symbol>,
    aliases: HashMap<(String, bool), Symbol>,
    fields: Vec<String>,
    productions: Vec<Production>,
    lex_tokens: HashMap<Symbol, LexToken>,
    aux_counter: usize,
}

/// Compiles `grammar` into language tables.
pub(crate) fn compile(
    grammar: &Grammar,
    scanner: Option<ScannerFactory>,
) -> Result<LanguageData, CompileError> {
    validate(grammar)?;

    let externals = grammar.external_names();
    if !externals.is_empty() && scanner.is_none() {
        return Err(CompileError::MissingScanner(grammar.name.clone()));
    }

    let mut compiler = Compiler {
        grammar,
        symbols: Vec::new(),
        by_name: HashMap::new(),
        literals: HashMap::new(),
        inline_tokens: HashMap::new(),
        aliases: HashMap::new(),
        fields: Vec::new(),
        productions: Vec::new(),
        lex_tokens: HashMap::new(),
        aux_counter: 0,
    };

    compiler.push_symbol("end", SymbolKind::End, false, false)?;

    let mut external_symbols = Vec::new();
    for name in &externals {
        let hidden = is_hidden_name(name);
        let id = compiler.push_symbol(name, SymbolKind::External, !hidden, !hidden)?;
        compiler.by_name.insert((*name).to_string(), id);
        external_symbols.push(id);
    }

    let ordered: Vec<(&str, &Rule)> = grammar.ordered_rules().collect();
    for (name, rule) in &ordered {
        if compiler.by_name.contains_key(*name) {
            continue;
        }
        let hidden = is_hidden_name(name);
        let kind = if rule.is_lexical() {
            SymbolKind::Terminal
        } else {
            SymbolKind::Nonterminal
        };
        let id = compiler.push_symbol(name, kind, !hidden, !hidden)?;
        compiler.by_name.insert((*name).to_string(), id);
    }

    for (name, rule) in &ordered {
        let id = compiler.by_name[*name];
        match compiler.symbols[usize::from(id)].kind {
            SymbolKind::Terminal => compiler.lexical_rule(id, name, rule)?,
            SymbolKind::Nonterminal => {
                for alt in compiler.flatten(rule, name)? {
                    compiler.productions.push(Production {
                        lhs: id,
                        steps: alt.steps,
                        priority: alt.priority,
                    });
                }
            }
            _ => {}
        }
    }

    let start_name = grammar
        .start_rule()
        .ok_or_else(|| CompileError::UnknownSymbol("<start>".to_string()))?;
    let start_rule = compiler.symbol(start_name)?;
    let start = compiler.push_symbol("_start", SymbolKind::Auxiliary, false, false)?;
    compiler.productions.push(Production {
        lhs: start,
        steps: vec![Step::new(start_rule)],
        priority: 0,
    });

    let (skip, extra_tokens) = compiler.extras()?;
    let (word, keywords) = compiler.keywords()?;

    let symbol_count = compiler.symbols.len();
    let mut productions_by_lhs = vec![Vec::new(); symbol_count];
    for (index, production) in compiler.productions.iter().enumerate() {
        productions_by_lhs[usize::from(production.lhs)].push(index);
    }
    let nullable = nullable_symbols(symbol_count, &compiler.productions);

    tracing::debug!(
        grammar = %grammar.name,
        symbols = symbol_count,
        productions = compiler.productions.len(),
        tokens = compiler.lex_tokens.len(),
        "compiled grammar"
    );

    Ok(LanguageData {
        name: grammar.name.clone(),
        version: LANGUAGE_VERSION,
        symbols: compiler.symbols,
        fields: compiler.fields,
        productions: compiler.productions,
        productions_by_lhs,
        nullable,
        start,
        lex_tokens: compiler.lex_tokens,
        skip,
        extra_tokens,
        externals: external_symbols,
        keywords,
        word,
        scanner,
    })
}

fn nullable_symbols(symbol_count: usize, productions: &[Production]) -> Vec<bool> {
    let mut nullable = vec![false; symbol_count];
    let mut changed = true;
    while changed {
        changed = false;
        for production in productions {
            let lhs = usize::from(production.lhs);
            if !nullable[lhs]
                && production
                    .steps
                    .iter()
                    .all(|step| nullable[usize::from(step.symbol)])
            {
                nullable[lhs] = true;
                changed = true;
            }
        }
    }
    nullable
}

impl Compiler<'_> {
    fn push_symbol(
        &mut self,
        name: &str,
        kind: SymbolKind,
        named: bool,
        visible: bool,
    ) -> Result<Symbol, CompileError> {
        let id = Symbol::try_from(self.symbols.len()).map_err(|_| CompileError::TooManySymbols)?;
        if id == crate::language::ERROR_SYMBOL {
            return Err(CompileError::TooManySymbols);
        }
        self.symbols.push(SymbolInfo {
            name: name.to_string(),
            kind,
            named,
            visible,
        });
        Ok(id)
    }

    fn symbol(&self, name: &str) -> Result<Symbol, CompileError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnknownSymbol(name.to_string()))
    }

    fn field_id(&mut self, name: &str) -> Result<FieldId, CompileError> {
        let index = match self.fields.iter().position(|f| f == name) {
            Some(index) => index,
            None => {
                self.fields.push(name.to_string());
                self.fields.len() - 1
            }
        };
        FieldId::try_from(index + 1).map_err(|_| CompileError::TooManySymbols)
    }

    fn next_aux_name(&mut self, owner: &str, what: &str) -> String {
        self.aux_counter += 1;
        format!("{owner}_{what}{}", self.aux_counter)
    }

    /// Registers a named lexical rule.
    fn lexical_rule(&mut self, id: Symbol, name: &str, rule: &Rule) -> Result<(), CompileError> {
        let source = lexical_regex(rule, name)?;
        let token = LexToken {
            symbol: id,
            regex: anchored(&source, name)?,
            is_string: literal_text(rule).is_some(),
            precedence: lexical_precedence(rule),
        };
        self.lex_tokens.insert(id, token);
        Ok(())
    }

    /// Returns the anonymous terminal for a string literal, creating it on first use.
    fn literal(&mut self, text: &str) -> Result<Symbol, CompileError> {
        if let Some(&id) = self.literals.get(text) {
            return Ok(id);
        }
        let id = self.push_symbol(text, SymbolKind::Terminal, false, true)?;
        self.literals.insert(text.to_string(), id);
        self.lex_tokens.insert(
            id,
            LexToken {
                symbol: id,
                regex: anchored(&regex::escape(text), text)?,
                is_string: true,
                precedence: 0,
            },
        );
        Ok(id)
    }

    /// Returns a hidden terminal for a pattern or `token(...)` written inside a syntactic rule.
    fn inline_token(&mut self, rule: &Rule, owner: &str) -> Result<Symbol, CompileError> {
        if let Some(text) = literal_text(rule) {
            return self.literal(text);
        }
        let source = lexical_regex(rule, owner)?;
        if let Some(&id) = self.inline_tokens.get(&source) {
            return Ok(id);
        }
        let name = self.next_aux_name(owner, "token");
        let id = self.push_symbol(&name, SymbolKind::Terminal, false, false)?;
        self.lex_tokens.insert(
            id,
            LexToken {
                symbol: id,
                regex: anchored(&source, &name)?,
                is_string: false,
                precedence: lexical_precedence(rule),
            },
        );
        self.inline_tokens.insert(source, id);
        Ok(id)
    }

    fn alias_symbol(&mut self, name: &str, named: bool) -> Result<Symbol, CompileError> {
        if let Some(&id) = self.aliases.get(&(name.to_string(), named)) {
            return Ok(id);
        }
        let existing = self.symbols.iter().position(|s| {
            s.name == name && s.named == named && s.visible && s.kind != SymbolKind::End
        });
        let id = match existing {
            Some(index) => Symbol::try_from(index).map_err(|_| CompileError::TooManySymbols)?,
            None => self.push_symbol(name, SymbolKind::Alias, named, true)?,
        };
        self.aliases.insert((name.to_string(), named), id);
        Ok(id)
    }

    /// Moves `rule` into a fresh hidden nonterminal and returns its symbol.
    fn auxiliary(&mut self, rule: &Rule, owner: &str, what: &str) -> Result<Symbol, CompileError> {
        let name = self.next_aux_name(owner, what);
        let id = self.push_symbol(&name, SymbolKind::Auxiliary, false, false)?;
        for alt in self.flatten(rule, owner)? {
            self.productions.push(Production {
                lhs: id,
                steps: alt.steps,
                priority: alt.priority,
            });
        }
        Ok(id)
    }

    /// `R -> content | R content`, skipping the cyclic `R -> R` when content is nullable.
    fn repetition(&mut self, content: &Rule, owner: &str) -> Result<Symbol, CompileError> {
        let name = self.next_aux_name(owner, "repeat");
        let id = self.push_symbol(&name, SymbolKind::Auxiliary, false, false)?;
        for alt in self.flatten(content, owner)? {
            if !alt.steps.is_empty() {
                let mut steps = Vec::with_capacity(alt.steps.len() + 1);
                steps.push(Step::new(id));
                steps.extend(alt.steps.iter().cloned());
                self.productions.push(Production {
                    lhs: id,
                    steps,
                    priority: alt.priority,
                });
            }
            self.productions.push(Production {
                lhs: id,
                steps: alt.steps,
                priority: alt.priority,
            });
        }
        Ok(id)
    }

    fn flatten(&mut self, rule: &Rule, owner: &str) -> Result<Vec<Alternative>, CompileError> {
        let alts = match rule.rule_type {
            RuleType::Blank => vec![Alternative::default()],

            RuleType::String => {
                let text = rule.string_value().unwrap_or_default();
                vec![Alternative::single(self.literal(text)?)]
            }

            RuleType::Pattern | RuleType::Token => {
                vec![Alternative::single(self.inline_token(rule, owner)?)]
            }

            RuleType::ImmediateToken => {
                let mut alt = Alternative::single(self.inline_token(rule, owner)?);
                alt.steps[0].immediate = true;
                vec![alt]
            }

            RuleType::Symbol => {
                let name = rule.name.as_deref().unwrap_or_default();
                vec![Alternative::single(self.symbol(name)?)]
            }

            RuleType::Seq => {
                let mut acc = vec![Alternative::default()];
                for member in &rule.members {
                    let mut alts = self.flatten(member, owner)?;
                    if alts.len() > 1 && acc.len() * alts.len() > MAX_INLINE_ALTERNATIVES {
                        alts = vec![Alternative::single(self.auxiliary(member, owner, "seq")?)];
                    }
                    let mut next = Vec::with_capacity(acc.len() * alts.len());
                    for prefix in &acc {
                        for alt in &alts {
                            let mut steps = prefix.steps.clone();
                            steps.extend(alt.steps.iter().cloned());
                            next.push(Alternative {
                                steps,
                                priority: prefix.priority.max(alt.priority),
                            });
                        }
                    }
                    acc = next;
                }
                acc
            }

            RuleType::Choice => {
                let mut alts = Vec::new();
                for member in &rule.members {
                    alts.extend(self.flatten(member, owner)?);
                }
                alts
            }

            RuleType::Repeat => {
                let content = content_of(rule, owner)?;
                let id = self.repetition(content, owner)?;
                vec![Alternative::default(), Alternative::single(id)]
            }

            RuleType::Repeat1 => {
                let content = content_of(rule, owner)?;
                vec![Alternative::single(self.repetition(content, owner)?)]
            }

            RuleType::Prec | RuleType::PrecLeft | RuleType::PrecRight | RuleType::PrecDynamic => {
                let level = rule.precedence().unwrap_or(0);
                let mut alts = self.flatten(content_of(rule, owner)?, owner)?;
                for alt in &mut alts {
                    alt.priority = alt.priority.max(level);
                }
                alts
            }

            RuleType::Field => {
                let name = rule.name.as_deref().unwrap_or_default();
                let field = self.field_id(name)?;
                let mut alts = self.flatten(content_of(rule, owner)?, owner)?;
                for step in alts.iter_mut().flat_map(|alt| alt.steps.iter_mut()) {
                    step.field.get_or_insert(field);
                }
                alts
            }

            RuleType::Alias => {
                let name = rule.name.as_deref().unwrap_or_default();
                let alias = self.alias_symbol(name, rule.named.unwrap_or(false))?;
                let content = content_of(rule, owner)?;
                let target = match content.symbol_name() {
                    Some(symbol) => self.symbol(symbol)?,
                    None => self.auxiliary(content, owner, "alias")?,
                };
                let mut alt = Alternative::single(target);
                alt.steps[0].alias = Some(alias);
                vec![alt]
            }

            RuleType::Reserved => self.flatten(content_of(rule, owner)?, owner)?,
        };
        Ok(alts)
    }

    /// Splits `extras` into silently skipped patterns and extra terminals.
    ///
    /// Extra terminals map to the visible rule that wraps them, if any.
    #[allow(clippy::type_complexity)]
    fn extras(&mut self) -> Result<(Vec<Regex>, HashMap<Symbol, Option<Symbol>>), CompileError> {
        let mut skip = Vec::new();
        let mut extra_tokens = HashMap::new();
        let grammar = self.grammar;

        for extra in grammar.extras.iter().flatten() {
            match extra.rule_type {
                RuleType::Pattern | RuleType::String | RuleType::Token => {
                    let source = lexical_regex(extra, "extras")?;
                    skip.push(anchored(&source, "extras")?);
                }
                RuleType::Symbol => {
                    let name = extra.name.as_deref().unwrap_or_default();
                    let id = self.symbol(name)?;
                    if self.symbols[usize::from(id)].is_terminal() {
                        extra_tokens.insert(id, None);
                        continue;
                    }
                    for production in self.productions.iter().filter(|p| p.lhs == id) {
                        match production.steps.as_slice() {
                            [step] if self.symbols[usize::from(step.symbol)].is_terminal() => {
                                extra_tokens.insert(step.symbol, Some(id));
                            }
                            _ => return Err(CompileError::BadExtra(name.to_string())),
                        }
                    }
                }
                _ => return Err(CompileError::BadExtra(extra.type_name().to_string())),
            }
        }

        if grammar.extras.is_none() {
            skip.push(anchored(r"\s", "extras")?);
        }
        Ok((skip, extra_tokens))
    }

    /// Resolves the word token and the literals it would otherwise swallow.
    fn keywords(&self) -> Result<(Option<Symbol>, HashMap<String, Symbol>), CompileError> {
        let Some(word_name) = self.grammar.word.as_deref() else {
            return Ok((None, HashMap::new()));
        };
        let word = self.symbol(word_name)?;
        let Some(word_token) = self.lex_tokens.get(&word) else {
            return Err(CompileError::UnsupportedRule {
                rule: word_name.to_string(),
                construct: "non-lexical word rule".to_string(),
            });
        };
        let keywords = self
            .literals
            .iter()
            .filter(|(text, _)| {
                word_token
                    .regex
                    .find(text)
                    .is_some_and(|m| m.end() == text.len())
            })
            .map(|(text, &id)| (text.clone(), id))
            .collect();
        Ok((Some(word), keywords))
    }
}

fn content_of<'r>(rule: &'r Rule, owner: &str) -> Result<&'r Rule, CompileError> {
    rule.content
        .as_deref()
        .ok_or_else(|| CompileError::UnsupportedRule {
            rule: owner.to_string(),
            construct: format!("{} without content", rule.type_name()),
        })
}

/// Returns the literal text of a `STRING`, possibly wrapped in token/precedence rules.
fn literal_text(rule: &Rule) -> Option<&str> {
    match rule.rule_type {
        RuleType::String => rule.string_value(),
        RuleType::Token
        | RuleType::ImmediateToken
        | RuleType::Prec
        | RuleType::PrecLeft
        | RuleType::PrecRight
        | RuleType::PrecDynamic => rule.content.as_deref().and_then(literal_text),
        _ => None,
    }
}

fn lexical_precedence(rule: &Rule) -> i32 {
    match rule.rule_type {
        kind if kind.is_precedence() => rule.precedence().unwrap_or(0),
        RuleType::Token | RuleType::ImmediateToken => {
            rule.content.as_deref().map_or(0, lexical_precedence)
        }
        _ => 0,
    }
}

/// Translates a lexical rule into regex source.
fn lexical_regex(rule: &Rule, owner: &str) -> Result<String, CompileError> {
    let source = match rule.rule_type {
        RuleType::Blank => String::new(),
        RuleType::String => regex::escape(rule.string_value().unwrap_or_default()),
        RuleType::Pattern => {
            let pattern = rule.pattern_value().unwrap_or_default();
            match rule.flags.as_deref() {
                Some(flags) if !flags.is_empty() => format!("(?{flags}:{pattern})"),
                _ => format!("(?:{pattern})"),
            }
        }
        RuleType::Seq => rule
            .members
            .iter()
            .map(|m| lexical_regex(m, owner))
            .collect::<Result<String, _>>()?,
        RuleType::Choice => {
            let members = rule
                .members
                .iter()
                .map(|m| lexical_regex(m, owner))
                .collect::<Result<Vec<_>, _>>()?;
            format!("(?:{})", members.join("|"))
        }
        RuleType::Repeat => format!("(?:{})*", lexical_regex(content_of(rule, owner)?, owner)?),
        RuleType::Repeat1 => format!("(?:{})+", lexical_regex(content_of(rule, owner)?, owner)?),
        RuleType::Token
        | RuleType::ImmediateToken
        | RuleType::Prec
        | RuleType::PrecLeft
        | RuleType::PrecRight
        | RuleType::PrecDynamic
        | RuleType::Field
        | RuleType::Alias
        | RuleType::Reserved => lexical_regex(content_of(rule, owner)?, owner)?,
        RuleType::Symbol => {
            return Err(CompileError::UnsupportedRule {
                rule: owner.to_string(),
                construct: format!(
                    "symbol '{}' inside a token",
                    rule.name.as_deref().unwrap_or_default()
                ),
            })
        }
    };
    Ok(source)
}

fn anchored(source: &str, rule: &str) -> Result<Regex, CompileError> {
    Regex::new(&format!("^(?:{source})")).map_err(|source| CompileError::InvalidPattern {
        rule: rule.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::dsl::{
        alias, choice, field, immediate, optional, pattern, repeat, seq, string, sym, token,
        GrammarBuilder,
    };

    fn tiny() -> Grammar {
        GrammarBuilder::new("tiny")
            .word("id")
            .extras([pattern(r"\s"), sym("comment")])
            .rule(
                "list",
                seq([
                    repeat(seq([sym("item"), immediate(string(";"))])),
                    optional(sym("item")),
                ]),
            )
            .rule(
                "item",
                choice([
                    seq([field("key", sym("id")), string("="), sym("id")]),
                    alias(sym("_bare"), "bare", true),
                ]),
            )
            .rule("_bare", seq([string("let"), sym("id")]))
            .rule("comment", token(seq([string("#"), pattern("[^\n]*")])))
            .rule("id", pattern("[a-z]+"))
            .build()
    }

    #[test]
    fn flattens_repeat_into_hidden_auxiliary() {
        let data = compile(&tiny(), None).unwrap();
        let aux: Vec<_> = data
            .symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::Auxiliary)
            .collect();
        assert!(aux.iter().any(|s| s.name.starts_with("list_repeat")));
        assert!(aux.iter().all(|s| !s.visible));
        let list = data.symbols.iter().position(|s| s.name == "list").unwrap();
        assert!(data.nullable[list]);
    }

    #[test]
    fn literals_become_anonymous_terminals() {
        let data = compile(&tiny(), None).unwrap();
        let eq = data.symbols.iter().find(|s| s.name == "=").unwrap();
        assert_eq!(eq.kind, SymbolKind::Terminal);
        assert!(!eq.named);
        assert!(eq.visible);
        assert!(data.keywords.contains_key("let"));
        assert!(!data.keywords.contains_key("="));
    }

    #[test]
    fn fields_and_aliases_are_recorded_on_steps() {
        let data = compile(&tiny(), None).unwrap();
        assert_eq!(data.fields, vec!["key".to_string()]);
        let has_alias = data
            .productions
            .iter()
            .flat_map(|p| &p.steps)
            .any(|step| step.alias.is_some());
        assert!(has_alias);
        let immediate = data
            .productions
            .iter()
            .flat_map(|p| &p.steps)
            .any(|step| step.immediate);
        assert!(immediate);
    }

    #[test]
    fn extras_split_into_skip_and_tokens() {
        let data = compile(&tiny(), None).unwrap();
        assert_eq!(data.skip.len(), 1);
        let comment = data.symbols.iter().position(|s| s.name == "comment").unwrap();
        let comment = Symbol::try_from(comment).unwrap();
        assert_eq!(data.extra_tokens.get(&comment), Some(&None));
    }

    #[test]
    fn missing_scanner_is_rejected() {
        let grammar = GrammarBuilder::new("ext")
            .externals([sym("_heredoc")])
            .rule("start", sym("_heredoc"))
            .build();
        assert!(matches!(
            compile(&grammar, None),
            Err(CompileError::MissingScanner(_))
        ));
    }

    #[test]
    fn symbols_inside_tokens_are_rejected() {
        let grammar = GrammarBuilder::new("bad")
            .rule("start", token(seq([string("a"), sym("start")])))
            .build();
        assert!(matches!(
            compile(&grammar, None),
            Err(CompileError::UnsupportedRule { .. })
        ));
    }

    #[test]
    fn invalid_patterns_are_reported() {
        let grammar = GrammarBuilder::new("bad")
            .rule("start", pattern("[unclosed"))
            .build();
        assert!(matches!(
            compile(&grammar, None),
            Err(CompileError::InvalidPattern { .. })
        ));
    }
}
