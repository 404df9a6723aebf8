//! Validation routines for Tree-sitter grammars.
//!
//! This module performs structural checks over parsed [`Grammar`](crate::grammar::Grammar)
//! definitions, such as verifying symbol references, ensuring all rules are reachable,
//! detecting left recursion, and confirming precedence consistency. It runs before
//! every grammar compilation so that malformed grammars fail early.

use crate::grammar::{Grammar, Rule, RuleType};
use std::collections::{BTreeMap, HashSet};

/// Represents a validation failure encountered when checking a grammar.
///
/// Validation errors indicate issues such as undefined symbols or dangling
/// `word`/`extras` references that violate Tree-sitter's grammar constraints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    /// The descriptive human-readable error message.
    pub message: String,
}

impl ValidationError {
    /// Creates a new [`ValidationError`] from a message string.
    fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

/// Non-fatal findings collected while validating a grammar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Rules that cannot be reached from the start rule or the extras.
    pub unreachable: Vec<String>,
    /// Rules whose first element refers back to the rule itself.
    pub left_recursive: Vec<String>,
    /// Rules declaring more than one precedence level, with the levels found.
    pub mixed_precedence: Vec<(String, Vec<i32>)>,
}

impl ValidationReport {
    /// Returns `true` when no findings were recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.unreachable.is_empty()
            && self.left_recursive.is_empty()
            && self.mixed_precedence.is_empty()
    }
}

/// Performs semantic validation of a parsed [`Grammar`](crate::grammar::Grammar).
///
/// This function runs several consistency passes over the grammar:
///
/// - Checks that all referenced symbols are defined or external.
/// - Checks that `word`, `inline` and symbol extras name existing rules.
/// - Warns about unreachable rules.
/// - Detects immediate left recursion.
/// - Verifies precedence consistency.
///
/// # Errors
///
/// Returns a [`ValidationError`] if any structural rule violation is detected.
pub fn validate(grammar: &Grammar) -> Result<ValidationReport, ValidationError> {
    check_undefined_symbols(grammar)?;
    check_declarations(grammar)?;

    let report = ValidationReport {
        unreachable: check_unreachable_rules(grammar)?,
        left_recursive: check_left_recursion(grammar),
        mixed_precedence: check_precedence(grammar),
    };
    Ok(report)
}

fn defined_symbols(grammar: &Grammar) -> HashSet<&str> {
    grammar
        .rules
        .keys()
        .map(String::as_str)
        .chain(grammar.external_names())
        .collect()
}

fn check_undefined_symbols(grammar: &Grammar) -> Result<(), ValidationError> {
    let defined = defined_symbols(grammar);

    for (rule_name, rule) in grammar.ordered_rules() {
        check_rule_symbols(rule, &defined, rule_name)?;
    }

    Ok(())
}

fn check_rule_symbols(
    rule: &Rule,
    defined: &HashSet<&str>,
    context: &str,
) -> Result<(), ValidationError> {
    let mut missing = None;
    rule.walk(&mut |r| {
        if let Some(name) = r.symbol_name() {
            if missing.is_none() && !defined.contains(name) {
                missing = Some(name.to_string());
            }
        }
    });
    match missing {
        Some(name) => Err(ValidationError::new(format!(
            "undefined symbol '{name}' referenced in rule '{context}'"
        ))),
        None => Ok(()),
    }
}

fn check_declarations(grammar: &Grammar) -> Result<(), ValidationError> {
    let defined = defined_symbols(grammar);

    if let Some(word) = &grammar.word {
        if !grammar.rules.contains_key(word) {
            return Err(ValidationError::new(format!(
                "word token '{word}' is not a defined rule"
            )));
        }
    }

    for name in grammar.inline.iter().flatten() {
        if !grammar.rules.contains_key(name) {
            return Err(ValidationError::new(format!(
                "inline rule '{name}' is not defined"
            )));
        }
    }

    for extra in grammar.extras.iter().flatten() {
        check_rule_symbols(extra, &defined, "extras")?;
    }

    Ok(())
}

fn check_unreachable_rules(grammar: &Grammar) -> Result<Vec<String>, ValidationError> {
    let entry_point = grammar
        .start_rule()
        .ok_or_else(|| ValidationError::new("grammar has no rules"))?;

    let mut reachable = HashSet::new();
    let mut to_visit = vec![entry_point.to_string()];
    for extra in grammar.extras.iter().flatten() {
        collect_referenced_symbols(extra, &mut to_visit);
    }

    while let Some(rule_name) = to_visit.pop() {
        if !reachable.insert(rule_name.clone()) {
            continue;
        }

        if let Some(rule) = grammar.rules.get(&rule_name) {
            collect_referenced_symbols(rule, &mut to_visit);
        }
    }

    let mut unreachable = Vec::new();
    for rule_name in grammar.ordered_rule_names() {
        let inline_contains = grammar
            .inline
            .as_ref()
            .is_some_and(|v| v.iter().any(|name| name == rule_name));

        if !reachable.contains(rule_name) && !inline_contains {
            tracing::warn!(rule = rule_name, "unreachable rule");
            unreachable.push(rule_name.to_string());
        }
    }

    Ok(unreachable)
}

fn collect_referenced_symbols(rule: &Rule, symbols: &mut Vec<String>) {
    rule.walk(&mut |r| {
        if let Some(name) = r.symbol_name() {
            symbols.push(name.to_string());
        }
    });
}

fn check_left_recursion(grammar: &Grammar) -> Vec<String> {
    let mut found = Vec::new();
    for (rule_name, rule) in grammar.ordered_rules() {
        if has_immediate_left_recursion(rule, rule_name) {
            // Earley recognition copes with left recursion; record it only.
            tracing::info!(rule = rule_name, "rule is left recursive");
            found.push(rule_name.to_string());
        }
    }
    found
}

fn has_immediate_left_recursion(rule: &Rule, target: &str) -> bool {
    match rule.rule_type {
        RuleType::Symbol => rule.name.as_deref() == Some(target),

        RuleType::Seq => rule
            .members
            .first()
            .is_some_and(|first| has_immediate_left_recursion(first, target)),

        RuleType::Choice => rule
            .members
            .iter()
            .any(|member| has_immediate_left_recursion(member, target)),

        RuleType::Prec
        | RuleType::PrecLeft
        | RuleType::PrecRight
        | RuleType::PrecDynamic
        | RuleType::Field
        | RuleType::Alias
        | RuleType::Repeat
        | RuleType::Repeat1 => rule
            .content
            .as_deref()
            .is_some_and(|content| has_immediate_left_recursion(content, target)),

        _ => false,
    }
}

fn check_precedence(grammar: &Grammar) -> Vec<(String, Vec<i32>)> {
    let mut prec_levels: BTreeMap<String, Vec<i32>> = BTreeMap::new();

    for (rule_name, rule) in grammar.ordered_rules() {
        rule.walk(&mut |r| {
            if let Some(p) = r.precedence() {
                let levels = prec_levels.entry(rule_name.to_string()).or_default();
                if !levels.contains(&p) {
                    levels.push(p);
                }
            }
        });
    }

    prec_levels
        .into_iter()
        .filter(|(_, levels)| levels.len() > 1)
        .inspect(|(rule, levels)| {
            tracing::warn!(rule = %rule, ?levels, "rule has multiple precedence levels");
        })
        .collect()
}
