//! Editing trees and reparsing them incrementally.

use candid_sitter::{candid, InputEdit, Parser, Tree};

fn parser() -> Parser {
    let mut parser = Parser::new();
    parser
        .set_language(&candid::language().expect("candid grammar compiles"))
        .expect("compatible language");
    parser
}

/// Applies one replacement to both the text and the tree, then reparses.
fn reparse(
    parser: &mut Parser,
    tree: &mut Tree,
    text: &str,
    range: std::ops::Range<usize>,
    inserted: &str,
) -> (String, Tree) {
    let edit = InputEdit::replace(text, range.start, range.end, inserted).expect("valid edit");
    let mut new_text = text.to_string();
    new_text.replace_range(range, inserted);
    tree.edit(&edit);
    let new_tree = parser.parse(&new_text, Some(&*tree)).expect("parse succeeds");
    (new_text, new_tree)
}

#[test]
fn reparse_matches_fresh_parse() {
    let mut parser = parser();
    let text = "type a = nat;\ntype b = text;\nservice : { f : () -> () }";
    let mut tree = parser.parse(text, None).expect("parse succeeds");

    let (new_text, new_tree) = reparse(&mut parser, &mut tree, text, 9..12, "int");
    let fresh = parser.parse(&new_text, None).expect("parse succeeds");
    assert_eq!(new_tree.root_node().to_sexp(), fresh.root_node().to_sexp());
    assert_eq!(new_tree.root_node().byte_range(), fresh.root_node().byte_range());
}

#[test]
fn unchanged_definitions_are_reused() {
    let mut parser = parser();
    let text = "type a = nat;\ntype b = text;\ntype c = bool;";
    let mut tree = parser.parse(text, None).expect("parse succeeds");

    let (_, new_tree) = reparse(&mut parser, &mut tree, text, 9..12, "int");
    let old_root = tree.root_node();
    let new_root = new_tree.root_node();
    assert_ne!(old_root.named_child(0), new_root.named_child(0));
    assert_eq!(old_root.named_child(1), new_root.named_child(1));
    assert_eq!(old_root.named_child(2), new_root.named_child(2));
    assert!(!new_root.has_changes());
}

#[test]
fn edit_marks_and_shifts_nodes() {
    let mut parser = parser();
    let text = "type a = nat;\ntype b = text;";
    let mut tree = parser.parse(text, None).expect("parse succeeds");

    let edit = InputEdit::replace(text, 5, 6, "alpha").expect("valid edit");
    tree.edit(&edit);
    let root = tree.root_node();
    assert!(root.has_changes());
    let first = root.named_child(0).expect("first def");
    assert!(first.has_changes());
    let second = root.named_child(1).expect("second def");
    assert!(!second.has_changes());
    assert_eq!(second.start_byte(), 18);
    assert_eq!(second.start_position().row, 1);
}

#[test]
fn changed_ranges_cover_the_edit() {
    let mut parser = parser();
    let text = "type a = nat;\ntype b = text;";
    let mut tree = parser.parse(text, None).expect("parse succeeds");

    let (_, new_tree) = reparse(&mut parser, &mut tree, text, 9..12, "int");
    let changed = tree.changed_ranges(&new_tree);
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].start_byte, 9);
    assert!(changed[0].end_byte <= 14);
}

#[test]
fn inserting_a_definition() {
    let mut parser = parser();
    let text = "type a = nat;\ntype c = bool;";
    let mut tree = parser.parse(text, None).expect("parse succeeds");

    let (new_text, new_tree) = reparse(&mut parser, &mut tree, text, 14..14, "type b = text;\n");
    let root = new_tree.root_node();
    assert!(!root.has_error());
    assert_eq!(root.named_children().filter(|n| n.kind() == "def").count(), 3);
    let fresh = parser.parse(&new_text, None).expect("parse succeeds");
    assert_eq!(root.to_sexp(), fresh.root_node().to_sexp());
}

#[test]
fn introducing_and_fixing_an_error() {
    let mut parser = parser();
    let text = "type a = nat;\ntype b = text;";
    let mut tree = parser.parse(text, None).expect("parse succeeds");

    let (broken_text, mut broken) = reparse(&mut parser, &mut tree, text, 7..8, "");
    assert!(broken.root_node().has_error());

    let (fixed_text, fixed) = reparse(&mut parser, &mut broken, &broken_text, 7..7, "=");
    assert_eq!(fixed_text, text);
    assert!(!fixed.root_node().has_error());
    let fresh = parser.parse(text, None).expect("parse succeeds");
    assert_eq!(fixed.root_node().to_sexp(), fresh.root_node().to_sexp());
}

#[test]
fn edits_inside_comments() {
    let mut parser = parser();
    let text = "/* note */\ntype a = nat;";
    let mut tree = parser.parse(text, None).expect("parse succeeds");

    let (new_text, new_tree) = reparse(&mut parser, &mut tree, text, 3..7, "longer note");
    let root = new_tree.root_node();
    assert!(!root.has_error());
    let comment = root.child(0).expect("comment");
    assert_eq!(comment.kind(), "comment");
    assert_eq!(comment.end_byte(), new_text.find('\n').expect("newline"));
}

#[test]
fn old_tree_from_another_language_is_ignored() {
    let mut parser = parser();
    let text = "type a = nat;";
    let tree = parser.parse(text, None).expect("parse succeeds");

    let other = candid::language().expect("candid grammar compiles");
    let mut second = Parser::new();
    second.set_language(&other).expect("compatible language");
    let reparsed = second.parse(text, Some(&tree)).expect("parse succeeds");
    assert_eq!(reparsed.root_node().to_sexp(), tree.root_node().to_sexp());
}
