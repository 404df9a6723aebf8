//! Concrete syntax trees.
//!
//! A [`Tree`] owns an immutable, reference-counted node structure. Editing
//! a tree ([`Tree::edit`]) rebuilds only the spine touched by the edit, so
//! subtrees stay shared between the old tree, the edited tree and any tree
//! produced by re-parsing against it.

use crate::language::{FieldId, Language, Symbol, ERROR_SYMBOL};
use std::fmt;
use std::ops;
use std::sync::Arc;

/// A position in a text document as a zero-based row and byte column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    /// Zero-based line number.
    pub row: usize,
    /// Zero-based byte offset within the line.
    pub column: usize,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// A span of text in both byte offsets and points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Range {
    /// First byte of the span.
    pub start_byte: usize,
    /// One past the last byte of the span.
    pub end_byte: usize,
    /// Position of `start_byte`.
    pub start_point: Point,
    /// Position of `end_byte`.
    pub end_point: Point,
}

/// Describes a single text replacement applied to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEdit {
    /// Where the replaced text starts.
    pub start_byte: usize,
    /// Where the replaced text ended before the edit.
    pub old_end_byte: usize,
    /// Where the inserted text ends after the edit.
    pub new_end_byte: usize,
    /// Point of `start_byte`.
    pub start_position: Point,
    /// Point of `old_end_byte` in the old text.
    pub old_end_position: Point,
    /// Point of `new_end_byte` in the new text.
    pub new_end_position: Point,
}

impl InputEdit {
    /// Computes the edit that replaces `old_text[start..old_end]` with `inserted`.
    ///
    /// Returns `None` if the offsets are out of range or not on character boundaries.
    #[must_use]
    pub fn replace(old_text: &str, start: usize, old_end: usize, inserted: &str) -> Option<Self> {
        if start > old_end
            || !old_text.is_char_boundary(start)
            || !old_text.is_char_boundary(old_end)
        {
            return None;
        }
        let start_position = LineIndex::new(old_text).point(start);
        let old_end_position = LineIndex::new(old_text).point(old_end);
        let new_end_position = advance_point(start_position, inserted);
        Some(Self {
            start_byte: start,
            old_end_byte: old_end,
            new_end_byte: start + inserted.len(),
            start_position,
            old_end_position,
            new_end_position,
        })
    }

    fn shift_byte(&self, byte: usize) -> usize {
        if byte >= self.old_end_byte {
            byte - self.old_end_byte + self.new_end_byte
        } else if byte > self.start_byte {
            byte.min(self.new_end_byte)
        } else {
            byte
        }
    }

    fn shift_point(&self, point: Point) -> Point {
        if point >= self.old_end_position {
            if point.row == self.old_end_position.row {
                Point::new(
                    self.new_end_position.row,
                    point.column - self.old_end_position.column + self.new_end_position.column,
                )
            } else {
                Point::new(
                    point.row - self.old_end_position.row + self.new_end_position.row,
                    point.column,
                )
            }
        } else if point > self.start_position {
            point.min(self.new_end_position)
        } else {
            point
        }
    }
}

fn advance_point(mut point: Point, text: &str) -> Point {
    for line in text.split_inclusive('\n') {
        if line.ends_with('\n') {
            point.row += 1;
            point.column = 0;
        } else {
            point.column += line.len();
        }
    }
    point
}

/// Maps byte offsets to points.
#[derive(Debug, Clone)]
pub(crate) struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    pub fn point(&self, byte: usize) -> Point {
        let row = self.line_starts.partition_point(|&start| start <= byte) - 1;
        Point::new(row, byte - self.line_starts[row])
    }

    pub fn range(&self, start: usize, end: usize) -> Range {
        Range {
            start_byte: start,
            end_byte: end,
            start_point: self.point(start),
            end_point: self.point(end),
        }
    }
}

/// Internal node storage shared between trees.
#[derive(Debug, Clone)]
pub(crate) struct Subtree {
    /// Grammar symbol that produced the node, used when reusing it.
    pub symbol: Symbol,
    /// Displayed kind; differs from `symbol` when aliased.
    pub kind: Symbol,
    pub range: Range,
    pub children: Vec<Arc<Subtree>>,
    pub fields: Vec<Option<FieldId>>,
    pub is_extra: bool,
    pub has_error: bool,
    pub has_changes: bool,
}

impl Subtree {
    pub fn leaf(symbol: Symbol, kind: Symbol, range: Range) -> Self {
        Self {
            symbol,
            kind,
            range,
            children: Vec::new(),
            fields: Vec::new(),
            is_extra: false,
            has_error: symbol == ERROR_SYMBOL,
            has_changes: false,
        }
    }

    pub fn node(
        symbol: Symbol,
        kind: Symbol,
        range: Range,
        children: Vec<(Arc<Subtree>, Option<FieldId>)>,
    ) -> Self {
        let has_error = symbol == ERROR_SYMBOL || children.iter().any(|(c, _)| c.has_error);
        let (children, fields) = children.into_iter().unzip();
        Self {
            symbol,
            kind,
            range,
            children,
            fields,
            is_extra: false,
            has_error,
            has_changes: false,
        }
    }

    /// Inserts a node that is not part of the derivation (an extra or an
    /// error) at the deepest position whose range contains it.
    pub fn insert_floating(&mut self, floating: Arc<Subtree>) {
        let (start, end) = (floating.range.start_byte, floating.range.end_byte);
        self.has_error |= floating.has_error;
        let container = self.children.iter().position(|child| {
            !child.children.is_empty()
                && !child.is_extra
                && child.range.start_byte < start
                && end < child.range.end_byte
        });
        if let Some(index) = container {
            Arc::make_mut(&mut self.children[index]).insert_floating(floating);
            return;
        }
        let index = self
            .children
            .partition_point(|child| child.range.start_byte < start);
        self.children.insert(index, floating);
        self.fields.insert(index, None);
    }

    /// Widens the range to cover every child.
    pub fn cover_children(&mut self) {
        if let Some(first) = self.children.first() {
            if first.range.start_byte < self.range.start_byte || self.range == Range::default() {
                self.range.start_byte = first.range.start_byte;
                self.range.start_point = first.range.start_point;
            }
        }
        if let Some(last) = self.children.last() {
            if last.range.end_byte > self.range.end_byte {
                self.range.end_byte = last.range.end_byte;
                self.range.end_point = last.range.end_point;
            }
        }
    }
}

fn edited(subtree: &Arc<Subtree>, edit: &InputEdit) -> Arc<Subtree> {
    let range = subtree.range;
    if range.end_byte < edit.start_byte {
        return Arc::clone(subtree);
    }
    let touched = range.start_byte <= edit.old_end_byte;
    let mut node = Subtree::clone(subtree);
    node.range = Range {
        start_byte: edit.shift_byte(range.start_byte),
        end_byte: edit.shift_byte(range.end_byte),
        start_point: edit.shift_point(range.start_point),
        end_point: edit.shift_point(range.end_point),
    };
    node.has_changes |= touched;
    node.children = subtree.children.iter().map(|child| edited(child, edit)).collect();
    Arc::new(node)
}

fn leaves<'a>(subtree: &'a Arc<Subtree>, out: &mut Vec<&'a Arc<Subtree>>) {
    if subtree.children.is_empty() {
        out.push(subtree);
    } else {
        for child in &subtree.children {
            leaves(child, out);
        }
    }
}

/// A syntax tree produced by a [`Parser`](crate::Parser).
#[derive(Clone)]
pub struct Tree {
    pub(crate) root: Arc<Subtree>,
    pub(crate) language: Language,
}

impl Tree {
    pub(crate) fn new(root: Arc<Subtree>, language: Language) -> Self {
        Self { root, language }
    }

    /// The root node.
    #[must_use]
    pub fn root_node(&self) -> Node<'_> {
        Node {
            language: &self.language,
            data: &self.root,
            path: Vec::new(),
        }
    }

    /// The language the tree was parsed with.
    #[must_use]
    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Adjusts node positions for a text edit and marks touched nodes as
    /// changed, so that a subsequent parse can reuse everything else.
    pub fn edit(&mut self, edit: &InputEdit) {
        self.root = edited(&self.root, edit);
        tracing::trace!(
            start = edit.start_byte,
            old_end = edit.old_end_byte,
            new_end = edit.new_end_byte,
            "edited tree"
        );
    }

    /// A cursor positioned at the root node.
    #[must_use]
    pub fn walk(&self) -> TreeCursor<'_> {
        self.root_node().walk()
    }

    /// Byte ranges whose leaf tokens differ between `self` and `other`.
    ///
    /// `self` is expected to be an old tree that has been [`edit`](Tree::edit)ed
    /// to match the text `other` was parsed from.
    #[must_use]
    pub fn changed_ranges(&self, other: &Tree) -> Vec<Range> {
        let mut old = Vec::new();
        let mut new = Vec::new();
        leaves(&self.root, &mut old);
        leaves(&other.root, &mut new);

        let same = |a: &Arc<Subtree>, b: &Arc<Subtree>| {
            a.kind == b.kind
                && a.range.start_byte == b.range.start_byte
                && a.range.end_byte == b.range.end_byte
                && !a.has_changes
        };

        let mut ranges: Vec<Range> = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < old.len() || j < new.len() {
            match (old.get(i), new.get(j)) {
                (Some(a), Some(b)) if same(a, b) => {
                    i += 1;
                    j += 1;
                }
                (Some(a), Some(b)) => {
                    let changed = if a.range.end_byte <= b.range.start_byte {
                        i += 1;
                        a.range
                    } else if b.range.end_byte <= a.range.start_byte {
                        j += 1;
                        b.range
                    } else {
                        i += 1;
                        j += 1;
                        b.range
                    };
                    push_merged(&mut ranges, changed);
                }
                (Some(a), None) => {
                    i += 1;
                    push_merged(&mut ranges, a.range);
                }
                (None, Some(b)) => {
                    j += 1;
                    push_merged(&mut ranges, b.range);
                }
                (None, None) => break,
            }
        }
        ranges
    }
}

fn push_merged(ranges: &mut Vec<Range>, range: Range) {
    if let Some(last) = ranges.last_mut() {
        if range.start_byte <= last.end_byte {
            if range.end_byte > last.end_byte {
                last.end_byte = range.end_byte;
                last.end_point = range.end_point;
            }
            return;
        }
    }
    ranges.push(range);
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{Tree {}}}", self.root_node().to_sexp())
    }
}

/// A node inside a [`Tree`].
///
/// Nodes are lightweight views: they borrow the tree and remember the path
/// from the root, which is what makes [`Node::parent`] and sibling
/// navigation possible.
#[derive(Clone)]
pub struct Node<'tree> {
    language: &'tree Language,
    data: &'tree Arc<Subtree>,
    path: Vec<(&'tree Arc<Subtree>, usize)>,
}

impl<'tree> Node<'tree> {
    /// The node's kind, e.g. `"def"` or `";"`.
    #[must_use]
    pub fn kind(&self) -> &'tree str {
        self.language.node_kind_for_id(self.data.kind).unwrap_or("ERROR")
    }

    /// Numeric id of [`Node::kind`].
    #[must_use]
    pub fn kind_id(&self) -> Symbol {
        self.data.kind
    }

    /// The grammar symbol that produced this node, before aliasing.
    #[must_use]
    pub fn grammar_id(&self) -> Symbol {
        self.data.symbol
    }

    /// Whether the node is named (anonymous nodes are literal tokens).
    #[must_use]
    pub fn is_named(&self) -> bool {
        self.language.node_kind_is_named(self.data.kind)
    }

    /// Whether the node is an extra, such as a comment.
    #[must_use]
    pub fn is_extra(&self) -> bool {
        self.data.is_extra
    }

    /// Whether this node is an `ERROR` node.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.data.kind == ERROR_SYMBOL
    }

    /// Whether this node or any descendant is an `ERROR` node.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.data.has_error
    }

    /// Whether the node was touched by an edit since it was parsed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.data.has_changes
    }

    /// First byte of the node.
    #[must_use]
    pub fn start_byte(&self) -> usize {
        self.data.range.start_byte
    }

    /// One past the last byte of the node.
    #[must_use]
    pub fn end_byte(&self) -> usize {
        self.data.range.end_byte
    }

    /// Byte span of the node.
    #[must_use]
    pub fn byte_range(&self) -> ops::Range<usize> {
        self.start_byte()..self.end_byte()
    }

    /// Span of the node in bytes and points.
    #[must_use]
    pub fn range(&self) -> Range {
        self.data.range
    }

    /// Position of the node's first byte.
    #[must_use]
    pub fn start_position(&self) -> Point {
        self.data.range.start_point
    }

    /// Position one past the node's last byte.
    #[must_use]
    pub fn end_position(&self) -> Point {
        self.data.range.end_point
    }

    /// Number of children, anonymous ones included.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.data.children.len()
    }

    /// The `index`-th child.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<Node<'tree>> {
        let child = self.data.children.get(index)?;
        let mut path = self.path.clone();
        path.push((self.data, index));
        Some(Node {
            language: self.language,
            data: child,
            path,
        })
    }

    /// Number of named children.
    #[must_use]
    pub fn named_child_count(&self) -> usize {
        self.data
            .children
            .iter()
            .filter(|c| self.language.node_kind_is_named(c.kind))
            .count()
    }

    /// The `index`-th named child.
    #[must_use]
    pub fn named_child(&self, index: usize) -> Option<Node<'tree>> {
        self.named_children().nth(index)
    }

    /// All children in order.
    pub fn children(&self) -> impl Iterator<Item = Node<'tree>> + '_ {
        (0..self.child_count()).filter_map(move |i| self.child(i))
    }

    /// Named children in order.
    pub fn named_children(&self) -> impl Iterator<Item = Node<'tree>> + '_ {
        self.children().filter(Node::is_named)
    }

    /// The first child carrying the given field name.
    #[must_use]
    pub fn child_by_field_name(&self, name: &str) -> Option<Node<'tree>> {
        self.children_by_field_name(name).next()
    }

    /// Every child carrying the given field name.
    pub fn children_by_field_name(&self, name: &str) -> impl Iterator<Item = Node<'tree>> + '_ {
        let id = self.language.field_id_for_name(name);
        (0..self.child_count())
            .filter(move |&i| id.is_some() && self.data.fields.get(i).copied().flatten() == id)
            .filter_map(move |i| self.child(i))
    }

    /// The field name of the `index`-th child, if it has one.
    #[must_use]
    pub fn field_name_for_child(&self, index: usize) -> Option<&'tree str> {
        let id = self.data.fields.get(index).copied().flatten()?;
        self.language.field_name_for_id(id)
    }

    /// The parent node, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Node<'tree>> {
        let mut path = self.path.clone();
        let (data, _) = path.pop()?;
        Some(Node {
            language: self.language,
            data,
            path,
        })
    }

    fn index_in_parent(&self) -> Option<usize> {
        self.path.last().map(|&(_, index)| index)
    }

    /// The following sibling.
    #[must_use]
    pub fn next_sibling(&self) -> Option<Node<'tree>> {
        let index = self.index_in_parent()?;
        self.parent()?.child(index + 1)
    }

    /// The preceding sibling.
    #[must_use]
    pub fn prev_sibling(&self) -> Option<Node<'tree>> {
        let index = self.index_in_parent()?;
        self.parent()?.child(index.checked_sub(1)?)
    }

    /// The following named sibling.
    #[must_use]
    pub fn next_named_sibling(&self) -> Option<Node<'tree>> {
        let mut node = self.next_sibling()?;
        while !node.is_named() {
            node = node.next_sibling()?;
        }
        Some(node)
    }

    /// The preceding named sibling.
    #[must_use]
    pub fn prev_named_sibling(&self) -> Option<Node<'tree>> {
        let mut node = self.prev_sibling()?;
        while !node.is_named() {
            node = node.prev_sibling()?;
        }
        Some(node)
    }

    /// The smallest descendant spanning `start..end`.
    #[must_use]
    pub fn descendant_for_byte_range(&self, start: usize, end: usize) -> Option<Node<'tree>> {
        if start < self.start_byte() || end > self.end_byte() {
            return None;
        }
        let mut node = self.clone();
        loop {
            let next = node
                .children()
                .find(|child| child.start_byte() <= start && end <= child.end_byte());
            match next {
                Some(child) => node = child,
                None => return Some(node),
            }
        }
    }

    /// The text the node spans in `source`.
    ///
    /// # Errors
    ///
    /// Fails if the span is not valid UTF-8 in `source`.
    pub fn utf8_text<'a>(&self, source: &'a [u8]) -> Result<&'a str, std::str::Utf8Error> {
        let end = self.end_byte().min(source.len());
        let start = self.start_byte().min(end);
        std::str::from_utf8(&source[start..end])
    }

    /// A cursor starting at this node.
    #[must_use]
    pub fn walk(&self) -> TreeCursor<'tree> {
        TreeCursor {
            node: self.clone(),
            depth: 0,
        }
    }

    /// Renders named nodes as an S-expression, with `field:` prefixes.
    #[must_use]
    pub fn to_sexp(&self) -> String {
        let mut out = String::new();
        self.write_sexp(&mut out, None);
        out
    }

    fn write_sexp(&self, out: &mut String, field: Option<&str>) {
        if !out.is_empty() {
            out.push(' ');
        }
        if let Some(field) = field {
            out.push_str(field);
            out.push_str(": ");
        }
        if self.is_named() {
            out.push('(');
            out.push_str(self.kind());
        } else {
            out.push_str("(\"");
            out.extend(self.kind().escape_default());
            out.push('"');
        }
        for (index, child) in self.children().enumerate() {
            if child.is_named() || child.is_error() {
                child.write_sexp(out, self.field_name_for_child(index));
            }
        }
        out.push(')');
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self.data, other.data) && self.path.len() == other.path.len()
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Node {} {} - {}}}",
            self.kind(),
            self.start_position(),
            self.end_position()
        )
    }
}

/// A stateful walker over a tree, cheaper to move than re-deriving nodes.
#[derive(Clone, Debug)]
pub struct TreeCursor<'tree> {
    node: Node<'tree>,
    depth: usize,
}

impl<'tree> TreeCursor<'tree> {
    /// The node under the cursor.
    #[must_use]
    pub fn node(&self) -> Node<'tree> {
        self.node.clone()
    }

    /// The field name of the node under the cursor.
    #[must_use]
    pub fn field_name(&self) -> Option<&'tree str> {
        let index = self.node.index_in_parent()?;
        self.node.parent()?.field_name_for_child(index)
    }

    /// How many levels below the starting node the cursor is.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Moves to the first child. Returns `false` if there is none.
    pub fn goto_first_child(&mut self) -> bool {
        match self.node.child(0) {
            Some(child) => {
                self.node = child;
                self.depth += 1;
                true
            }
            None => false,
        }
    }

    /// Moves to the next sibling. Returns `false` if there is none.
    pub fn goto_next_sibling(&mut self) -> bool {
        if self.depth == 0 {
            return false;
        }
        match self.node.next_sibling() {
            Some(sibling) => {
                self.node = sibling;
                true
            }
            None => false,
        }
    }

    /// Moves to the parent. Returns `false` at the starting node.
    pub fn goto_parent(&mut self) -> bool {
        if self.depth == 0 {
            return false;
        }
        match self.node.parent() {
            Some(parent) => {
                self.node = parent;
                self.depth -= 1;
                true
            }
            None => false,
        }
    }

    /// Re-targets the cursor to `node`.
    pub fn reset(&mut self, node: Node<'tree>) {
        self.node = node;
        self.depth = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sexp_shows_fields_and_quotes_anonymous_nodes() {
        use crate::grammar::dsl::{field, pattern, seq, string, sym, GrammarBuilder};
        use crate::{Language, Parser};

        let grammar = GrammarBuilder::new("pairs")
            .rule(
                "pair",
                seq([field("left", sym("key")), string("="), field("right", sym("key"))]),
            )
            .rule("key", pattern("[a-z]+"))
            .build();
        let mut parser = Parser::new();
        parser.set_language(&Language::new(&grammar).unwrap()).unwrap();
        let tree = parser.parse("a = b", None).unwrap();
        let root = tree.root_node();
        assert_eq!(root.to_sexp(), "(pair left: (key) right: (key))");
        assert_eq!(root.child(1).unwrap().to_sexp(), r#"("=")"#);
    }

    #[test]
    fn line_index_points() {
        let index = LineIndex::new("ab\ncd\n");
        assert_eq!(index.point(0), Point::new(0, 0));
        assert_eq!(index.point(3), Point::new(1, 0));
        assert_eq!(index.point(5), Point::new(1, 2));
        assert_eq!(index.point(6), Point::new(2, 0));
    }

    #[test]
    fn replace_computes_points() {
        let edit = InputEdit::replace("ab\ncd", 3, 4, "x\ny").unwrap();
        assert_eq!(edit.start_position, Point::new(1, 0));
        assert_eq!(edit.old_end_position, Point::new(1, 1));
        assert_eq!(edit.new_end_position, Point::new(2, 1));
        assert_eq!(edit.new_end_byte, 6);
        assert!(InputEdit::replace("ab", 2, 1, "").is_none());
    }

    #[test]
    fn edits_shift_following_positions() {
        let edit = InputEdit::replace("ab\ncd", 1, 2, "XYZ").unwrap();
        assert_eq!(edit.shift_byte(4), 6);
        assert_eq!(edit.shift_point(Point::new(0, 2)), Point::new(0, 4));
        assert_eq!(edit.shift_point(Point::new(1, 1)), Point::new(1, 1));
        assert_eq!(edit.shift_byte(0), 0);
    }
}
