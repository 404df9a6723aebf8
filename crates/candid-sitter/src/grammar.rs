//! The grammar model shared by every later stage.
//!
//! A [`Grammar`] is what `tree-sitter generate` writes to `grammar.json`,
//! decoded with [`facet_json`]. The [`dsl`] module builds the same value from
//! Rust code.

use facet::Facet;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

pub mod dsl;
mod rules;

pub use rules::{is_hidden_name, Rule, RuleType, RuleValue};

/// A complete grammar: its rules plus the declarations around them.
///
/// Decoding loses the key order of `rules`, so [`Grammar::rule_order`]
/// records definition order separately. [`dsl::GrammarBuilder`] fills it in;
/// decoded grammars fall back to sorted rule names.
///
/// Schema: <https://tree-sitter.github.io/tree-sitter/assets/schemas/grammar.schema.json>
#[derive(Debug, Clone, Facet)]
pub struct Grammar {
    /// `$schema` reference, if the file carries one.
    #[facet(rename = "$schema")]
    #[facet(default)]
    pub schema: Option<String>,

    /// Language name, e.g. `"candid"`.
    pub name: String,

    /// Base grammar this one extends. Carried, not resolved.
    #[facet(default)]
    pub inherits: Option<String>,

    /// Rule definitions by name.
    pub rules: HashMap<String, Rule>,

    /// Rule names in definition order. The first entry is the start rule.
    #[facet(default)]
    pub rule_order: Vec<String>,

    /// Tokens allowed anywhere between other tokens. Defaults to whitespace.
    #[facet(default)]
    pub extras: Option<Vec<Rule>>,

    /// Tokens produced by an external scanner, in scanner order.
    #[facet(default)]
    pub externals: Option<Vec<Rule>>,

    /// Hidden rules to splice into their callers.
    #[facet(default)]
    pub inline: Option<Vec<String>>,

    /// Precedence orderings. Entries are `STRING` (a named level) or
    /// `SYMBOL` (a rule taking that slot) rules.
    #[facet(default)]
    pub precedences: Option<Vec<Vec<Rule>>>,

    /// Declared LR conflicts. The Earley parser needs none of them.
    #[facet(default)]
    pub conflicts: Option<Vec<Vec<String>>>,

    /// Reserved-word sets by context name.
    #[facet(default)]
    pub reserved: Option<HashMap<String, Vec<Rule>>>,

    /// The identifier token that keywords are extracted from.
    #[facet(default)]
    pub word: Option<String>,

    /// Hidden rules that still name a node category.
    #[facet(default)]
    pub supertypes: Option<Vec<String>>,
}

/// Decodes `grammar.json` text.
///
/// # Errors
///
/// [`GrammarError::JsonParse`] when the text is not a grammar document, and
/// [`GrammarError::Validation`] when it defines no rules.
pub fn parse_grammar(json: &str) -> Result<Grammar, GrammarError> {
    let tagged = tag_rule_values(json)?;
    let grammar: Grammar = facet_json::from_str(&tagged)
        .map_err(|e| GrammarError::JsonParse(strip_ansi(&e.to_string())))?;
    if grammar.rules.is_empty() {
        return Err(GrammarError::Validation(format!(
            "grammar '{}' has no rules",
            grammar.name
        )));
    }
    tracing::debug!(grammar = %grammar.name, rules = grammar.rules.len(), "decoded grammar");
    Ok(grammar)
}

/// A `"value"` key with a string or integer, or else any JSON string token.
const VALUE_SCALAR: &str = r#""value"\s*:\s*("(?:[^"\\]|\\.)*"|-?[0-9]+)|"(?:[^"\\]|\\.)*""#;

/// Rewrites every bare `"value": <scalar>` into the externally tagged form
/// [`RuleValue`] decodes from, e.g. `"value": {"Integer": 3}`.
///
/// Whole string tokens are matched as well, so keys and literals inside
/// strings are never rewritten.
fn tag_rule_values(json: &str) -> Result<Cow<'_, str>, GrammarError> {
    let scalars =
        Regex::new(VALUE_SCALAR).map_err(|e| GrammarError::JsonParse(e.to_string()))?;
    Ok(scalars.replace_all(json, |caps: &Captures<'_>| match caps.get(1) {
        Some(scalar) if scalar.as_str().starts_with('"') => {
            format!(r#""value": {{"String": {}}}"#, scalar.as_str())
        }
        Some(scalar) => format!(r#""value": {{"Integer": {}}}"#, scalar.as_str()),
        None => caps[0].to_string(),
    }))
}

/// Removes terminal colour sequences from decoder diagnostics.
fn strip_ansi(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut chars = message.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            // CSI sequences end with a letter.
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Why a grammar could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    /// Malformed JSON, or JSON that does not fit the schema.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Well-formed but unusable.
    #[error("validation error: {0}")]
    Validation(String),
}

impl Grammar {
    /// Returns rule names in definition order.
    ///
    /// Uses [`Grammar::rule_order`] when it names every rule; otherwise the
    /// recorded names come first and the rest follow alphabetically.
    #[must_use]
    pub fn ordered_rule_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut names: Vec<&str> = self
            .rule_order
            .iter()
            .filter(|name| self.rules.contains_key(name.as_str()))
            .filter(|name| seen.insert(name.as_str()))
            .map(String::as_str)
            .collect();
        let mut rest: Vec<&str> = self
            .rules
            .keys()
            .map(String::as_str)
            .filter(|name| !seen.contains(name))
            .collect();
        rest.sort_unstable();
        names.extend(rest);
        names
    }

    /// Iterates over `(name, rule)` pairs in definition order.
    pub fn ordered_rules(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.ordered_rule_names()
            .into_iter()
            .filter_map(|name| self.rules.get(name).map(|rule| (name, rule)))
    }

    /// Returns the name of the rule parsing starts from.
    ///
    /// This is the first recorded rule. Without a recorded order, the first
    /// (alphabetically) visible rule that no other rule references is chosen.
    #[must_use]
    pub fn start_rule(&self) -> Option<&str> {
        if let Some(first) = self
            .rule_order
            .iter()
            .find(|name| self.rules.contains_key(name.as_str()))
        {
            return Some(first.as_str());
        }

        let mut referenced = HashSet::new();
        for (name, rule) in &self.rules {
            rule.walk(&mut |r| {
                if let Some(sym) = r.symbol_name() {
                    if sym != name.as_str() {
                        referenced.insert(sym.to_string());
                    }
                }
            });
        }
        let names = self.ordered_rule_names();
        names
            .iter()
            .copied()
            .find(|name| !referenced.contains(*name) && !is_hidden_name(name))
            .or_else(|| names.first().copied())
    }

    /// Returns the names of symbols declared in `externals`.
    #[must_use]
    pub fn external_names(&self) -> Vec<&str> {
        self.externals
            .iter()
            .flatten()
            .filter_map(|rule| match rule.rule_type {
                RuleType::Symbol => rule.name.as_deref(),
                RuleType::String => rule.string_value(),
                _ => None,
            })
            .collect()
    }
}
