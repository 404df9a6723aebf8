//! The Candid interface description language.
//!
//! [`grammar`] builds the grammar with the [`dsl`](crate::grammar::dsl)
//! helpers, rule for rule in the order tree-sitter-candid declares them.
//! Quoted text is lexed as one token, and numeric literals are single
//! tokens whose alternatives are ordered so the longest form is tried first.

mod scanner;

pub use scanner::BlockCommentScanner;

use crate::compile::CompileError;
use crate::grammar::dsl::{
    alias, choice, field, immediate, optional, pattern, repeat, seq, string, sym, token,
    GrammarBuilder,
};
use crate::grammar::{Grammar, Rule};
use crate::language::Language;
use crate::lexer::ExternalScanner;

const NUM: &str = "[0-9](?:_?[0-9])*";
const HEX_NUM: &str = "[0-9A-Fa-f](?:_?[0-9A-Fa-f])*";
const TEXT: &str = r#""(?:[^"\\\x00-\x1f\x7f]|\\[0-9A-Fa-f]{2}|\\[nrt\\"']|\\u\{[0-9A-Fa-f](?:_?[0-9A-Fa-f])*\})*""#;

/// Zero or more `rule`s, each but the last followed immediately by `separator`.
fn sep(rule: Rule, separator: &str) -> Rule {
    seq([
        repeat(seq([rule.clone(), immediate(string(separator))])),
        optional(rule),
    ])
}

fn sign() -> Rule {
    optional(choice([string("+"), string("-")]))
}

fn signed(parts: impl IntoIterator<Item = Rule>) -> Rule {
    seq(std::iter::once(sign()).chain(parts))
}

fn literals<const N: usize>(texts: [&str; N]) -> Rule {
    choice(texts.map(string))
}

/// Field entries shared by record types and values, joined by `:` or `=`.
fn record_field(glue: &str, value: &str) -> Rule {
    choice([
        seq([field("index", sym("nat")), string(glue), sym(value)]),
        seq([field("hasharg", sym("name")), string(glue), sym(value)]),
        sym(value),
    ])
}

fn variant_field(glue: &str, value: &str) -> Rule {
    choice([
        seq([field("index", sym("nat")), string(glue), sym(value)]),
        seq([field("hasharg", sym("name")), string(glue), sym(value)]),
        sym("nat"),
        sym("name"),
    ])
}

/// The Candid grammar.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn grammar() -> Grammar {
    GrammarBuilder::new("candid")
        .word("id")
        .extras([pattern(r"\s"), sym("comment")])
        .externals([sym("_block_comment")])
        // Type structure
        .rule("prog", seq([sep(sym("def"), ";"), optional(sym("actor"))]))
        .rule(
            "def",
            choice([
                seq([string("type"), sym("id"), string("="), sym("datatype")]),
                seq([string("import"), optional(string("service")), sym("text")]),
            ]),
        )
        .rule(
            "actor",
            seq([
                string("service"),
                optional(field("name", sym("id"))),
                string(":"),
                optional(seq([field("type_parameters", sym("tuptype")), string("->")])),
                field("return_type", choice([sym("actortype"), sym("id")])),
                optional(string(";")),
            ]),
        )
        .rule(
            "actortype",
            seq([string("{"), sep(sym("methtype"), ";"), string("}")]),
        )
        .rule(
            "methtype",
            seq([
                field("name", sym("name")),
                string(":"),
                field("type", choice([sym("functype"), sym("id")])),
            ]),
        )
        .rule(
            "functype",
            seq([
                field("type_parameters", sym("tuptype")),
                string("->"),
                field("return_type", sym("tuptype")),
                repeat(sym("funcann")),
            ]),
        )
        .rule("funcann", literals(["oneway", "query", "composite_query"]))
        .rule(
            "tuptype",
            seq([string("("), sep(sym("argtype"), ","), string(")")]),
        )
        .rule("argtype", choice([sym("datatype"), sym("_argtype_short")]))
        .rule("_record_fieldtype", record_field(":", "datatype"))
        .rule("_variant_fieldtype", variant_field(":", "datatype"))
        .rule(
            "datatype",
            choice([sym("id"), sym("primtype"), sym("comptype")]),
        )
        .rule("comptype", choice([sym("constype"), sym("reftype")]))
        .rule(
            "primtype",
            choice([
                sym("numtype"),
                literals(["bool", "text", "null", "reserved", "empty", "principal"]),
            ]),
        )
        .rule(
            "numtype",
            literals([
                "nat", "nat8", "nat16", "nat32", "nat64", "int", "int8", "int16", "int32",
                "int64", "float32", "float64",
            ]),
        )
        .rule(
            "constype",
            choice([
                seq([string("opt"), sym("datatype")]),
                seq([string("vec"), sym("datatype")]),
                seq([
                    string("record"),
                    string("{"),
                    sep(alias(sym("_record_fieldtype"), "fieldtype", true), ";"),
                    string("}"),
                ]),
                seq([
                    string("variant"),
                    string("{"),
                    sep(alias(sym("_variant_fieldtype"), "fieldtype", true), ";"),
                    string("}"),
                ]),
                sym("_constype_short"),
            ]),
        )
        .rule(
            "reftype",
            choice([
                seq([string("func"), sym("functype")]),
                seq([string("service"), sym("actortype")]),
            ]),
        )
        .rule("name", choice([sym("id"), sym("text")]))
        // Syntactic shorthands
        .rule(
            "_argtype_short",
            seq([field("name", sym("name")), string(":"), sym("datatype")]),
        )
        .rule("_constype_short", string("blob"))
        // Comments
        .rule("comment", choice([sym("_line_comment"), sym("_block_comment")]))
        .rule("_line_comment", token(seq([string("//"), pattern("[^\n]*")])))
        // Interfaces
        .rule(
            "desc",
            seq([
                sep(sym("def"), ";"),
                optional(seq([sym("service"), immediate(string(";"))])),
            ]),
        )
        .rule(
            "service",
            seq([
                string("service"),
                optional(field("name", sym("id"))),
                string(":"),
                field("return_type", choice([sym("actortype"), sym("id")])),
            ]),
        )
        // Values
        .rule(
            "val",
            choice([
                sym("primval"),
                sym("consval"),
                sym("refval"),
                seq([string("("), sym("annval"), string(")")]),
            ]),
        )
        .rule(
            "annval",
            choice([
                sym("val"),
                seq([sym("val"), string(":"), sym("datatype")]),
            ]),
        )
        .rule(
            "primval",
            choice([
                sym("nat"),
                sym("int"),
                sym("float"),
                sym("text"),
                sym("bool_literal"),
                sym("null_literal"),
            ]),
        )
        .rule("bool_literal", literals(["true", "false"]))
        .rule("null_literal", string("null"))
        .rule(
            "consval",
            choice([
                seq([string("opt"), sym("val")]),
                seq([string("vec"), string("{"), sep(sym("annval"), ";"), string("}")]),
                seq([
                    string("record"),
                    string("{"),
                    sep(alias(sym("_record_fieldval"), "fieldval", true), ";"),
                    string("}"),
                ]),
                seq([
                    string("variant"),
                    string("{"),
                    alias(sym("_variant_fieldval"), "fieldval", true),
                    string("}"),
                ]),
                sym("_consval_short"),
            ]),
        )
        .rule("_record_fieldval", record_field("=", "annval"))
        .rule("_variant_fieldval", variant_field("=", "annval"))
        .rule(
            "refval",
            choice([
                seq([string("service"), sym("text")]),
                seq([string("func"), sym("text"), string("."), sym("name")]),
                seq([string("principal"), sym("text")]),
            ]),
        )
        .rule("arg", seq([string("("), sep(sym("annval"), ","), string(")")]))
        // Lexical structure
        .rule("letter", pattern("[A-Za-z]"))
        .rule("digit", pattern("[0-9]"))
        .rule("id", pattern("[A-Za-z_][A-Za-z0-9_]*"))
        .rule(
            "nat",
            token(choice([
                seq([string("0x"), pattern(HEX_NUM)]),
                pattern(NUM),
            ])),
        )
        .rule("int", token(signed([pattern(NUM)])))
        .rule(
            "float",
            token(choice([
                signed([
                    string("0x"),
                    pattern(HEX_NUM),
                    optional(seq([string("."), optional(pattern(HEX_NUM))])),
                    choice([string("p"), string("P")]),
                    sign(),
                    pattern(NUM),
                ]),
                signed([
                    string("0x"),
                    pattern(HEX_NUM),
                    string("."),
                    optional(pattern(HEX_NUM)),
                ]),
                signed([
                    pattern(NUM),
                    optional(seq([string("."), optional(pattern(NUM))])),
                    choice([string("e"), string("E")]),
                    sign(),
                    pattern(NUM),
                ]),
                signed([pattern(NUM), string("."), optional(pattern(NUM))]),
            ])),
        )
        .rule("text", pattern(TEXT))
        // Interface shorthands
        .rule("_consval_short", seq([string("blob"), sym("text")]))
        .build()
}

/// A fresh [`BlockCommentScanner`], usable as a
/// [`ScannerFactory`](crate::language::ScannerFactory).
#[must_use]
pub fn scanner() -> Box<dyn ExternalScanner> {
    Box::new(BlockCommentScanner::default())
}

/// The compiled Candid language, with its block-comment scanner attached.
///
/// # Errors
///
/// Only fails if the grammar itself is broken.
pub fn language() -> Result<Language, CompileError> {
    Language::with_external_scanner(&grammar(), scanner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Parser;

    fn parse(text: &str) -> String {
        let mut parser = Parser::new();
        parser.set_language(&language().unwrap()).unwrap();
        parser.parse(text, None).unwrap().root_node().to_sexp()
    }

    #[test]
    fn can_load_grammar() {
        let language = language().unwrap();
        assert_eq!(language.name(), "candid");
        assert!(language.id_for_node_kind("prog", true).is_some());
        assert!(language.id_for_node_kind("fieldtype", true).is_some());
    }

    #[test]
    fn prog_is_the_start_rule() {
        assert_eq!(grammar().start_rule(), Some("prog"));
    }

    #[test]
    fn grammar_is_valid() {
        let report = crate::validate(&grammar()).unwrap();
        assert!(report.left_recursive.is_empty());
        assert!(report.unreachable.contains(&"desc".to_string()));
    }

    #[test]
    fn type_definition() {
        assert_eq!(
            parse("type t = nat;"),
            "(prog (def (id) (datatype (primtype (numtype)))))"
        );
    }

    #[test]
    fn numeric_literals_prefer_longest_form() {
        let language = language().unwrap();
        let data = language.data();
        let nat = language.id_for_node_kind("nat", true).unwrap();
        let float = language.id_for_node_kind("float", true).unwrap();
        let regex = |symbol| &data.lex_tokens[&symbol].regex;
        assert_eq!(regex(nat).find("0x1F").map(|m| m.end()), Some(4));
        assert_eq!(regex(float).find("1.5e3").map(|m| m.end()), Some(5));
        assert_eq!(regex(float).find("0x1.8p3").map(|m| m.end()), Some(7));
    }
}
