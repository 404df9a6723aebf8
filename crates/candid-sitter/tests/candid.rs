//! Parsing the Candid corpus: definitions, comments, errors and navigation.

use candid_sitter::{candid, Parser, Tree};

fn parse(text: &str) -> Tree {
    let mut parser = Parser::new();
    parser
        .set_language(&candid::language().expect("candid grammar compiles"))
        .expect("compatible language");
    parser.parse(text, None).expect("parse succeeds")
}

fn sexp(text: &str) -> String {
    let tree = parse(text);
    assert!(!tree.root_node().has_error(), "unexpected error in {text:?}: {tree:?}");
    tree.root_node().to_sexp()
}

#[test]
fn can_load_grammar() {
    let language = candid::language().expect("candid grammar compiles");
    assert_eq!(language.name(), "candid");
}

#[test]
fn empty_program() {
    let tree = parse("");
    assert_eq!(tree.root_node().kind(), "prog");
    assert!(!tree.root_node().has_error());
}

#[test]
fn type_definitions() {
    assert_eq!(
        sexp("type a = nat;\ntype b = text;"),
        "(prog (def (id) (datatype (primtype (numtype)))) (def (id) (datatype (primtype))))"
    );
}

#[test]
fn keywords_can_name_types() {
    assert_eq!(
        sexp("type natural = nat64;"),
        "(prog (def (id) (datatype (primtype (numtype)))))"
    );
}

#[test]
fn records_use_field_aliases() {
    assert_eq!(
        sexp("type r = record { name : text; age : nat8 };"),
        "(prog (def (id) (datatype (comptype (constype \
         (fieldtype hasharg: (name (id)) (datatype (primtype))) \
         (fieldtype hasharg: (name (id)) (datatype (primtype (numtype)))))))))"
    );
}

#[test]
fn variants_allow_bare_tags() {
    assert_eq!(
        sexp("type v = variant { ok; 3 : nat; err : text };"),
        "(prog (def (id) (datatype (comptype (constype \
         (fieldtype (name (id))) \
         (fieldtype index: (nat) (datatype (primtype (numtype)))) \
         (fieldtype hasharg: (name (id)) (datatype (primtype))))))))"
    );
}

#[test]
fn service_with_methods() {
    let text = "service : {\n  greet : (text) -> (text) query;\n  ping : () -> () oneway;\n}";
    assert_eq!(
        sexp(text),
        "(prog (actor return_type: (actortype \
         (methtype name: (name (id)) type: (functype \
         type_parameters: (tuptype (argtype (datatype (primtype)))) \
         return_type: (tuptype (argtype (datatype (primtype)))) (funcann))) \
         (methtype name: (name (id)) type: (functype \
         type_parameters: (tuptype) return_type: (tuptype) (funcann))))))"
    );
}

#[test]
fn named_service_with_init_args() {
    let tree = parse("service counter : (nat) -> { get : () -> (nat) query }");
    let root = tree.root_node();
    assert!(!root.has_error());
    let actor = root.named_child(0).expect("actor");
    assert_eq!(actor.kind(), "actor");
    let name = actor.child_by_field_name("name").expect("name field");
    assert_eq!(name.utf8_text(b"service counter").ok(), Some("counter"));
    assert_eq!(
        actor.child_by_field_name("type_parameters").map(|n| n.kind()),
        Some("tuptype")
    );
    assert_eq!(
        actor.child_by_field_name("return_type").map(|n| n.kind()),
        Some("actortype")
    );
}

#[test]
fn argument_shorthand_and_references() {
    assert_eq!(
        sexp("type f = func (to : principal, amount : nat) -> ();"),
        "(prog (def (id) (datatype (comptype (reftype (functype \
         type_parameters: (tuptype \
         (argtype name: (name (id)) (datatype (primtype))) \
         (argtype name: (name (id)) (datatype (primtype (numtype))))) \
         return_type: (tuptype)))))))"
    );
}

#[test]
fn imports_and_blob() {
    assert_eq!(
        sexp("import service \"other.did\";\ntype data = blob;"),
        "(prog (def (text)) (def (id) (datatype (comptype (constype)))))"
    );
}

#[test]
fn escapes_inside_text() {
    let text = r#"import "a\"b\n\u{1F600}\7e.did";"#;
    assert_eq!(sexp(text), "(prog (def (text)))");
}

#[test]
fn line_comments_are_extras() {
    let tree = parse("// leading\ntype a = nat; // trailing\n");
    let root = tree.root_node();
    assert!(!root.has_error());
    assert_eq!(root.start_byte(), 0);
    let kinds: Vec<_> = root.named_children().map(|n| n.kind()).collect();
    assert_eq!(kinds, ["comment", "def", "comment"]);
    assert!(root.named_child(0).is_some_and(|n| n.is_extra()));
}

#[test]
fn nested_block_comments() {
    let text = "/* outer /* inner */ still outer // */\n */\ntype a = text;";
    let tree = parse(text);
    let root = tree.root_node();
    assert!(!root.has_error());
    let comment = root.child(0).expect("comment");
    assert_eq!(comment.kind(), "comment");
    assert_eq!(comment.end_byte(), text.find("\ntype").expect("def"));
    assert_eq!(root.named_child(1).map(|n| n.kind()), Some("def"));
}

#[test]
fn comment_inside_definition() {
    let tree = parse("type a = /* why */ vec nat;");
    let root = tree.root_node();
    assert!(!root.has_error());
    let def = root.named_child(0).expect("def");
    assert!(def.named_children().any(|n| n.kind() == "comment"));
}

#[test]
fn unterminated_block_comment_is_an_error() {
    let tree = parse("type a = nat; /* never closed");
    assert!(tree.root_node().has_error());
}

#[test]
fn separator_must_follow_immediately() {
    assert!(parse("type a = nat ;").root_node().has_error());
    assert!(!parse("type a = nat;").root_node().has_error());
}

#[test]
fn missing_name_produces_error_node() {
    let tree = parse("type = nat;");
    let root = tree.root_node();
    assert!(root.has_error());
    assert!(root.is_error() || root.children().any(|n| n.is_error()));
}

#[test]
fn stray_token_is_skipped() {
    let tree = parse("type a = nat; @ type b = int;");
    let root = tree.root_node();
    assert_eq!(root.kind(), "prog");
    assert!(root.has_error());
    let error = root.children().find(|n| n.is_error()).expect("error node");
    assert_eq!(error.byte_range(), 14..15);
    assert_eq!(root.named_children().filter(|n| n.kind() == "def").count(), 2);
}

#[test]
fn positions_track_rows_and_columns() {
    let text = "type a = nat;\n\ntype b = text;";
    let tree = parse(text);
    let second = tree.root_node().named_child(1).expect("def");
    assert_eq!(second.start_position().row, 2);
    assert_eq!(second.start_position().column, 0);
    assert_eq!(second.end_position().column, 13);
    assert_eq!(second.parent().map(|p| p.kind()), Some("prog"));
    assert_eq!(
        second.prev_named_sibling().map(|n| n.byte_range()),
        Some(0..12)
    );
}

#[test]
fn cursor_walks_the_tree() {
    let tree = parse("type a = nat;");
    let mut cursor = tree.walk();
    assert!(cursor.goto_first_child());
    assert_eq!(cursor.node().kind(), "def");
    assert!(cursor.goto_first_child());
    assert_eq!(cursor.node().kind(), "type");
    assert!(cursor.goto_next_sibling());
    assert_eq!(cursor.node().kind(), "id");
    assert_eq!(cursor.depth(), 2);
    assert!(cursor.goto_parent());
    assert!(cursor.goto_next_sibling());
    assert_eq!(cursor.node().kind(), ";");
    assert!(!cursor.goto_next_sibling());
}

#[test]
fn descendant_lookup() {
    let text = "type a = record { x : nat };";
    let tree = parse(text);
    let offset = text.find('x').expect("x");
    let node = tree
        .root_node()
        .descendant_for_byte_range(offset, offset + 1)
        .expect("descendant");
    assert_eq!(node.kind(), "id");
    assert_eq!(node.parent().map(|p| p.kind()), Some("name"));
}

fn count_kind(node: &candid_sitter::Node<'_>, kind: &str) -> usize {
    let own = usize::from(node.kind() == kind);
    own + node
        .children()
        .map(|child| count_kind(&child, kind))
        .sum::<usize>()
}

#[test]
fn deeply_nested_types() {
    let depth = 40;
    let text = format!(
        "type a = {}nat{};",
        "record { x : opt vec ".repeat(depth),
        " }".repeat(depth)
    );
    let tree = parse(&text);
    let root = tree.root_node();
    assert!(!root.has_error());
    let records = count_kind(&root, "fieldtype");
    assert_eq!(records, depth);
}

#[test]
fn many_definitions() {
    let text: String = (0..500)
        .map(|i| format!("type t{i} = record {{ a : nat; b : vec text; c : opt t{i} }};\n"))
        .collect();
    let tree = parse(&text);
    let root = tree.root_node();
    assert!(!root.has_error());
    assert_eq!(root.named_child_count(), 500);
}
