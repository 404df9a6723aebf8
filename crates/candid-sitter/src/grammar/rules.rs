//! Rule combinators as they appear in `grammar.json`.
//!
//! Every combinator decodes into the same [`Rule`] record; which payload
//! fields are meaningful depends on its [`RuleType`].

use facet::Facet;

/// One node of a grammar's rule graph.
///
/// The record is flat and decodes straight from the JSON schema. Prefer the
/// accessors over the raw fields where one exists.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct Rule {
    /// Which combinator this is.
    #[facet(rename = "type")]
    pub rule_type: RuleType,

    /// Literal text, regex source or precedence level.
    #[facet(default)]
    pub value: Option<RuleValue>,

    /// Symbol, field or alias name.
    #[facet(default)]
    pub name: Option<String>,

    /// The wrapped rule of unary combinators.
    #[facet(default)]
    pub content: Option<Box<Rule>>,

    /// Operands of `SEQ` and `CHOICE`.
    #[facet(default)]
    pub members: Vec<Rule>,

    /// For `ALIAS`: whether the alias is a named node.
    #[facet(default)]
    pub named: Option<bool>,

    /// Regex flags of a `PATTERN`, such as `"i"`.
    #[facet(default)]
    pub flags: Option<String>,

    /// Reserved-word set of a `RESERVED` wrapper.
    #[facet(default)]
    pub context_name: Option<String>,
}

/// Scalar payload of a rule.
#[derive(Debug, Clone, PartialEq, Facet)]
#[repr(u8)]
pub enum RuleValue {
    /// Literal text or regex source.
    String(String),

    /// Precedence level.
    Integer(i32),
}

/// The combinator tags of `grammar.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum RuleType {
    /// Matches nothing.
    #[facet(rename = "BLANK")]
    Blank,
    /// A literal.
    #[facet(rename = "STRING")]
    String,
    /// A regular expression.
    #[facet(rename = "PATTERN")]
    Pattern,
    /// A reference to a named rule.
    #[facet(rename = "SYMBOL")]
    Symbol,
    /// One of `members`.
    #[facet(rename = "CHOICE")]
    Choice,
    /// All of `members`, in order.
    #[facet(rename = "SEQ")]
    Seq,
    /// `content` zero or more times.
    #[facet(rename = "REPEAT")]
    Repeat,
    /// `content` one or more times.
    #[facet(rename = "REPEAT1")]
    Repeat1,
    /// `content` at a fixed precedence level.
    #[facet(rename = "PREC")]
    Prec,
    /// Left-associative precedence.
    #[facet(rename = "PREC_LEFT")]
    PrecLeft,
    /// Right-associative precedence.
    #[facet(rename = "PREC_RIGHT")]
    PrecRight,
    /// Precedence applied when ranking whole derivations.
    #[facet(rename = "PREC_DYNAMIC")]
    PrecDynamic,
    /// Labels the child produced by `content`.
    #[facet(rename = "FIELD")]
    Field,
    /// Renames the node produced by `content`.
    #[facet(rename = "ALIAS")]
    Alias,
    /// Lexes `content` as one token.
    #[facet(rename = "TOKEN")]
    Token,
    /// A token that no extras may precede.
    #[facet(rename = "IMMEDIATE_TOKEN")]
    ImmediateToken,
    /// `content` under a reserved-word context.
    #[facet(rename = "RESERVED")]
    Reserved,
}

impl RuleType {
    /// The tag as written in `grammar.json`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blank => "BLANK",
            Self::String => "STRING",
            Self::Pattern => "PATTERN",
            Self::Symbol => "SYMBOL",
            Self::Choice => "CHOICE",
            Self::Seq => "SEQ",
            Self::Repeat => "REPEAT",
            Self::Repeat1 => "REPEAT1",
            Self::Prec => "PREC",
            Self::PrecLeft => "PREC_LEFT",
            Self::PrecRight => "PREC_RIGHT",
            Self::PrecDynamic => "PREC_DYNAMIC",
            Self::Field => "FIELD",
            Self::Alias => "ALIAS",
            Self::Token => "TOKEN",
            Self::ImmediateToken => "IMMEDIATE_TOKEN",
            Self::Reserved => "RESERVED",
        }
    }

    /// Any of the four `PREC*` wrappers.
    #[must_use]
    pub fn is_precedence(self) -> bool {
        matches!(
            self,
            Self::Prec | Self::PrecLeft | Self::PrecRight | Self::PrecDynamic
        )
    }
}

impl Rule {
    /// Creates a rule of the given type with no payload.
    #[must_use]
    pub fn new(rule_type: RuleType) -> Self {
        Self {
            rule_type,
            value: None,
            name: None,
            content: None,
            members: Vec::new(),
            named: None,
            flags: None,
            context_name: None,
        }
    }

    /// Shorthand for `self.rule_type.as_str()`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.rule_type.as_str()
    }

    /// Whether the whole rule describes a single token: a literal, a pattern,
    /// a `TOKEN` wrapper, or precedence around one of those.
    #[must_use]
    pub fn is_lexical(&self) -> bool {
        match self.rule_type {
            RuleType::String
            | RuleType::Pattern
            | RuleType::Token
            | RuleType::ImmediateToken => true,
            kind if kind.is_precedence() => self.content.as_deref().is_some_and(Rule::is_lexical),
            _ => false,
        }
    }

    /// A bare `STRING` or `PATTERN`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.rule_type, RuleType::String | RuleType::Pattern)
    }

    /// A `SYMBOL` reference.
    #[must_use]
    pub fn is_symbol(&self) -> bool {
        self.rule_type == RuleType::Symbol
    }

    /// The referenced name of a `SYMBOL`.
    #[must_use]
    pub fn symbol_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|_| self.is_symbol())
    }

    /// The level of a `PREC*` wrapper.
    #[must_use]
    pub fn precedence(&self) -> Option<i32> {
        match (&self.value, self.rule_type.is_precedence()) {
            (Some(RuleValue::Integer(level)), true) => Some(*level),
            _ => None,
        }
    }

    /// The textual payload: literal text for `STRING`, regex source for
    /// `PATTERN`.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            Some(RuleValue::String(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// The literal of a `STRING` rule.
    #[must_use]
    pub fn string_value(&self) -> Option<&str> {
        match self.rule_type {
            RuleType::String => self.text(),
            _ => None,
        }
    }

    /// The regex source of a `PATTERN` rule.
    #[must_use]
    pub fn pattern_value(&self) -> Option<&str> {
        match self.rule_type {
            RuleType::Pattern => self.text(),
            _ => None,
        }
    }

    /// Visits this rule and every rule nested in it, pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Rule)) {
        visit(self);
        if let Some(content) = &self.content {
            content.walk(visit);
        }
        for member in &self.members {
            member.walk(visit);
        }
    }
}

/// Hidden rules start with an underscore and never appear as nodes.
#[must_use]
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_prec_left() {
        let json = r#"{
            "type": "PREC_LEFT",
            "value": 3,
            "content": {
                "type": "SEQ",
                "members": [
                    {"type": "SYMBOL", "name": "datatype"},
                    {"type": "STRING", "value": "->"},
                    {"type": "SYMBOL", "name": "datatype"}
                ]
            }
        }"#;

        let tagged = super::super::tag_rule_values(json).unwrap();
        let rule: Rule = facet_json::from_str(&tagged).unwrap();
        assert_eq!(rule.precedence(), Some(3));
        assert_eq!(rule.type_name(), "PREC_LEFT");
        assert_eq!(rule.members.len(), 0);
        let seq = rule.content.as_deref().unwrap();
        assert_eq!(seq.members[0].symbol_name(), Some("datatype"));
        assert_eq!(seq.members[1].string_value(), Some("->"));
    }

    #[test]
    fn pattern_text_is_not_a_string_value() {
        let mut pattern = Rule::new(RuleType::Pattern);
        pattern.value = Some(RuleValue::String("[0-9]+".into()));
        assert_eq!(pattern.pattern_value(), Some("[0-9]+"));
        assert_eq!(pattern.string_value(), None);
        assert!(pattern.is_terminal());
        assert!(!pattern.is_symbol());
        assert_eq!(pattern.precedence(), None);
    }

    #[test]
    fn lexical_detection() {
        let mut token = Rule::new(RuleType::Token);
        token.content = Some(Box::new(Rule::new(RuleType::Pattern)));
        let mut prec = Rule::new(RuleType::Prec);
        prec.value = Some(RuleValue::Integer(2));
        prec.content = Some(Box::new(token));
        assert!(prec.is_lexical());
        assert!(!Rule::new(RuleType::Seq).is_lexical());
    }

    #[test]
    fn walk_is_pre_order() {
        let mut seq = Rule::new(RuleType::Seq);
        let mut sym = Rule::new(RuleType::Symbol);
        sym.name = Some("id".into());
        seq.members = vec![sym, Rule::new(RuleType::Blank)];
        let mut seen = Vec::new();
        seq.walk(&mut |r| seen.push(r.type_name()));
        assert_eq!(seen, ["SEQ", "SYMBOL", "BLANK"]);
    }

    #[test]
    fn hidden_names() {
        assert!(is_hidden_name("_consval_short"));
        assert!(!is_hidden_name("text"));
    }
}
