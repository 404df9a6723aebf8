//! Rust counterparts of Tree-sitter's JavaScript grammar DSL.
//!
//! Each helper builds the same [`Rule`] tree that `tree-sitter generate`
//! would emit into `grammar.json`, so grammars written here and grammars
//! decoded from JSON go through identical compilation.

use super::{Grammar, Rule, RuleType, RuleValue};
use std::collections::HashMap;

/// The empty production.
#[must_use]
pub fn blank() -> Rule {
    Rule::new(RuleType::Blank)
}

/// A literal string token.
#[must_use]
pub fn string(text: &str) -> Rule {
    let mut rule = Rule::new(RuleType::String);
    rule.value = Some(RuleValue::String(text.to_string()));
    rule
}

/// A regular-expression token.
#[must_use]
pub fn pattern(regex: &str) -> Rule {
    let mut rule = Rule::new(RuleType::Pattern);
    rule.value = Some(RuleValue::String(regex.to_string()));
    rule
}

/// A reference to another rule (`$.name` in the JavaScript DSL).
#[must_use]
pub fn sym(name: &str) -> Rule {
    let mut rule = Rule::new(RuleType::Symbol);
    rule.name = Some(name.to_string());
    rule
}

/// Match every member in order.
#[must_use]
pub fn seq(members: impl IntoIterator<Item = Rule>) -> Rule {
    let mut rule = Rule::new(RuleType::Seq);
    rule.members = members.into_iter().collect();
    rule
}

/// Match exactly one of the members.
#[must_use]
pub fn choice(members: impl IntoIterator<Item = Rule>) -> Rule {
    let mut rule = Rule::new(RuleType::Choice);
    rule.members = members.into_iter().collect();
    rule
}

/// Match the rule or nothing.
#[must_use]
pub fn optional(rule: Rule) -> Rule {
    choice([rule, blank()])
}

fn wrap(rule_type: RuleType, content: Rule) -> Rule {
    let mut rule = Rule::new(rule_type);
    rule.content = Some(Box::new(content));
    rule
}

/// Zero or more repetitions.
#[must_use]
pub fn repeat(rule: Rule) -> Rule {
    wrap(RuleType::Repeat, rule)
}

/// One or more repetitions.
#[must_use]
pub fn repeat1(rule: Rule) -> Rule {
    wrap(RuleType::Repeat1, rule)
}

/// Collapse the content into a single lexical token.
#[must_use]
pub fn token(rule: Rule) -> Rule {
    wrap(RuleType::Token, rule)
}

/// A token that must not be preceded by extras (`token.immediate`).
#[must_use]
pub fn immediate(rule: Rule) -> Rule {
    wrap(RuleType::ImmediateToken, rule)
}

/// Attach a field name to the child produced by `rule`.
#[must_use]
pub fn field(name: &str, rule: Rule) -> Rule {
    let mut field = wrap(RuleType::Field, rule);
    field.name = Some(name.to_string());
    field
}

/// Rename the node produced by `rule`; `named` controls visibility as a named node.
#[must_use]
pub fn alias(rule: Rule, name: &str, named: bool) -> Rule {
    let mut alias = wrap(RuleType::Alias, rule);
    alias.name = Some(name.to_string());
    alias.named = Some(named);
    alias
}

/// Numeric precedence, used by the parser to rank ambiguous derivations and
/// by the lexer to rank tokens of equal length.
#[must_use]
pub fn prec(level: i32, rule: Rule) -> Rule {
    let mut prec = wrap(RuleType::Prec, rule);
    prec.value = Some(RuleValue::Integer(level));
    prec
}

/// Incrementally assembles a [`Grammar`], remembering rule definition order.
#[derive(Debug, Clone)]
pub struct GrammarBuilder {
    grammar: Grammar,
}

impl GrammarBuilder {
    /// Starts an empty grammar with the given name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            grammar: Grammar {
                schema: None,
                name: name.to_string(),
                inherits: None,
                rules: HashMap::new(),
                rule_order: Vec::new(),
                extras: None,
                externals: None,
                inline: None,
                precedences: None,
                conflicts: None,
                reserved: None,
                word: None,
                supertypes: None,
            },
        }
    }

    /// Declares the keyword-extraction word rule.
    #[must_use]
    pub fn word(mut self, name: &str) -> Self {
        self.grammar.word = Some(name.to_string());
        self
    }

    /// Declares the rules that may appear between any two tokens.
    #[must_use]
    pub fn extras(mut self, extras: impl IntoIterator<Item = Rule>) -> Self {
        self.grammar.extras = Some(extras.into_iter().collect());
        self
    }

    /// Declares the symbols produced by an external scanner.
    #[must_use]
    pub fn externals(mut self, externals: impl IntoIterator<Item = Rule>) -> Self {
        self.grammar.externals = Some(externals.into_iter().collect());
        self
    }

    /// Adds a rule. The first rule added is the start rule; redefining a
    /// name replaces the rule but keeps its first position.
    #[must_use]
    pub fn rule(mut self, name: &str, rule: Rule) -> Self {
        if self.grammar.rules.insert(name.to_string(), rule).is_none() {
            self.grammar.rule_order.push(name.to_string());
        }
        self
    }

    /// Finishes the grammar.
    #[must_use]
    pub fn build(self) -> Grammar {
        self.grammar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_is_choice_with_blank() {
        let rule = optional(string(";"));
        assert_eq!(rule.rule_type, RuleType::Choice);
        assert_eq!(rule.members[1].rule_type, RuleType::Blank);
    }

    #[test]
    fn builder_keeps_definition_order() {
        let grammar = GrammarBuilder::new("tiny")
            .word("id")
            .rule("start", seq([sym("id"), string(";")]))
            .rule("id", pattern("[a-z]+"))
            .rule("start", sym("id"))
            .build();
        assert_eq!(grammar.rule_order, vec!["start", "id"]);
        assert_eq!(grammar.start_rule(), Some("start"));
        assert_eq!(grammar.rules["start"], sym("id"));
    }

    #[test]
    fn field_and_alias_carry_names() {
        let f = field("name", sym("id"));
        assert_eq!(f.name.as_deref(), Some("name"));
        let a = alias(sym("_x"), "x", true);
        assert_eq!(a.named, Some(true));
        assert_eq!(a.content.as_deref(), Some(&sym("_x")));
    }
}
