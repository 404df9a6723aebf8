//! Extracts one derivation from a finished chart and turns it into nodes.
//!
//! Hidden rules and auxiliary nonterminals are spliced into their parents;
//! hidden terminals vanish. When several derivations exist, productions
//! with higher priority win, then productions defined earlier, then the
//! split that keeps the last child shortest.

use super::chart::{Chart, Item};
use super::Unit;
use crate::language::{FieldId, LanguageData, Step, Symbol, SymbolKind, ERROR_SYMBOL};
use crate::tree::{LineIndex, Range, Subtree};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type Entry = (Arc<Subtree>, Option<FieldId>);
type Span = (Symbol, usize, usize);

pub(crate) struct Builder<'a> {
    language: &'a LanguageData,
    chart: &'a Chart<'a>,
    units: &'a [Unit],
    lines: &'a LineIndex,
    /// Spans being derived further up the stack.
    active: HashSet<Span>,
    /// Finished derivations. Failures are only kept when no active span
    /// was hit while deriving them.
    memo: HashMap<Span, Option<Vec<Entry>>>,
    /// Number of times a derivation was cut short by an active span.
    cycles: usize,
}

impl<'a> Builder<'a> {
    pub fn new(
        language: &'a LanguageData,
        chart: &'a Chart<'a>,
        units: &'a [Unit],
        lines: &'a LineIndex,
    ) -> Self {
        Self {
            language,
            chart,
            units,
            lines,
            active: HashSet::new(),
            memo: HashMap::new(),
            cycles: 0,
        }
    }

    /// Byte and point range covered by units `i..j`.
    pub fn span(&self, i: usize, j: usize) -> Range {
        if i < j {
            return self.lines.range(self.units[i].start(), self.units[j - 1].end());
        }
        let at = match i.checked_sub(1).and_then(|p| self.units.get(p)) {
            Some(previous) => previous.end(),
            None => self.units.first().map_or(0, Unit::start),
        };
        self.lines.range(at, at)
    }

    /// Builds the root for a chart that accepted the whole input.
    pub fn accepted_root(&mut self) -> Option<Subtree> {
        let n = self.units.len();
        let start = self.language.start;
        let mut entries = self.derive(start, 0, n)?;
        if entries.len() == 1 && !entries[0].0.is_extra {
            let (root, _) = entries.remove(0);
            return Some(Arc::unwrap_or_clone(root));
        }
        let first = self.language.productions_by_lhs[usize::from(start)][0];
        let rule = self.language.productions[first].steps[0].symbol;
        Some(Subtree::node(rule, rule, self.span(0, n), entries))
    }

    /// Builds an `ERROR` root for a chart that did not accept the input,
    /// keeping the largest complete constituents that were recognized.
    pub fn error_root(&mut self) -> Subtree {
        let n = self.units.len();
        let mut best_end: Vec<Option<(usize, Symbol)>> = vec![None; n + 1];
        for (j, set) in self.chart.sets.iter().enumerate().skip(1) {
            for &(symbol, origin) in set.completed.keys() {
                let info = &self.language.symbols[usize::from(symbol)];
                if info.visible && origin < j && best_end[origin].is_none_or(|(end, _)| end < j) {
                    best_end[origin] = Some((j, symbol));
                }
            }
        }

        let mut children = Vec::new();
        let mut k = 0;
        while k < n {
            if let Some((end, symbol)) = best_end[k] {
                let before = children.len();
                self.materialize(&Step::new(symbol), k, end, &mut children);
                if children.len() > before {
                    k = end;
                    continue;
                }
            }
            children.push((self.unit_leaf(k), None));
            k += 1;
        }
        Subtree::node(ERROR_SYMBOL, ERROR_SYMBOL, self.span(0, n), children)
    }

    fn unit_leaf(&self, k: usize) -> Arc<Subtree> {
        match &self.units[k] {
            Unit::Reused(node) => Arc::clone(node),
            Unit::Token(token) => Arc::new(Subtree::leaf(
                token.symbol,
                token.symbol,
                self.lines.range(token.start, token.end),
            )),
        }
    }

    fn is_terminal(&self, symbol: Symbol) -> bool {
        self.language.symbols[usize::from(symbol)].is_terminal()
    }

    /// Appends the node(s) for `step` spanning `i..j` to `out`.
    fn materialize(&mut self, step: &Step, i: usize, j: usize, out: &mut Vec<Entry>) -> bool {
        let info = &self.language.symbols[usize::from(step.symbol)];
        let visible = info.visible || step.alias.is_some();
        let kind = step.alias.unwrap_or(step.symbol);

        if self.is_terminal(step.symbol) {
            if visible {
                out.push((
                    Arc::new(Subtree::leaf(step.symbol, kind, self.span(i, j))),
                    step.field,
                ));
            }
            return true;
        }

        let Some(children) = self.derive(step.symbol, i, j) else {
            return false;
        };
        if visible {
            let node = Subtree::node(step.symbol, kind, self.span(i, j), children);
            out.push((Arc::new(node), step.field));
        } else {
            out.extend(
                children
                    .into_iter()
                    .map(|(child, field)| (child, field.or(step.field))),
            );
        }
        true
    }

    /// Children of a `symbol` node spanning `i..j`.
    fn derive(&mut self, symbol: Symbol, i: usize, j: usize) -> Option<Vec<Entry>> {
        let span = (symbol, i, j);
        if let Some(known) = self.memo.get(&span) {
            return known.clone();
        }
        if !self.active.insert(span) {
            self.cycles += 1;
            return None;
        }
        let cycles = self.cycles;
        let mut productions = self
            .chart
            .sets
            .get(j)
            .and_then(|set| set.completed.get(&(symbol, i)))
            .cloned()
            .unwrap_or_default();
        productions
            .sort_by_key(|&p| (std::cmp::Reverse(self.language.productions[p].priority), p));

        let result = productions
            .into_iter()
            .find_map(|production| self.derive_production(production, i, j));
        self.active.remove(&span);
        if result.is_some() || self.cycles == cycles {
            self.memo.insert(span, result.clone());
        }
        result
    }

    fn derive_production(&mut self, production: usize, i: usize, j: usize) -> Option<Vec<Entry>> {
        let language = self.language;
        let chart = self.chart;
        let steps = &language.productions[production].steps;
        let mut end = j;
        let mut reversed: Vec<Vec<Entry>> = Vec::with_capacity(steps.len());

        for dot in (1..=steps.len()).rev() {
            let step = &steps[dot - 1];
            let prefix = Item {
                production,
                dot: dot - 1,
                origin: i,
            };
            let has_prefix = |k: usize| chart.sets[k].contains(&prefix);
            let mut entries = Vec::new();

            if self.is_terminal(step.symbol) {
                let k = end.checked_sub(1)?;
                let Unit::Token(token) = &self.units[k] else {
                    return None;
                };
                if k < i || token.symbol != step.symbol || !has_prefix(k) {
                    return None;
                }
                self.materialize(step, k, end, &mut entries);
                end = k;
            } else if let Some(node) = self.reused_at(step, i, end, &has_prefix) {
                entries.push((node, step.field));
                end -= 1;
            } else {
                let mut found = false;
                for k in (i..=end).rev() {
                    let completes = chart.sets[end].completed.contains_key(&(step.symbol, k));
                    if completes && has_prefix(k) && self.materialize(step, k, end, &mut entries) {
                        end = k;
                        found = true;
                        break;
                    }
                }
                if !found {
                    return None;
                }
            }
            reversed.push(entries);
        }

        if end != i {
            return None;
        }
        Some(reversed.into_iter().rev().flatten().collect())
    }

    /// A reused subtree ending right before `end` that can stand for `step`.
    fn reused_at(
        &self,
        step: &Step,
        i: usize,
        end: usize,
        has_prefix: &impl Fn(usize) -> bool,
    ) -> Option<Arc<Subtree>> {
        let k = end.checked_sub(1)?;
        let Unit::Reused(node) = self.units.get(k)? else {
            return None;
        };
        if k < i || node.symbol != step.symbol || !has_prefix(k) {
            return None;
        }
        let kind = step.alias.unwrap_or(step.symbol);
        if node.kind == kind {
            return Some(Arc::clone(node));
        }
        let mut renamed = Subtree::clone(node);
        renamed.kind = kind;
        Some(Arc::new(renamed))
    }
}

/// Whether a node from an old tree may be offered to the parser again.
pub(crate) fn is_reusable(language: &LanguageData, node: &Subtree) -> bool {
    if node.has_changes || node.has_error || node.is_extra || node.children.is_empty() {
        return false;
    }
    language
        .symbols
        .get(usize::from(node.symbol))
        .is_some_and(|info| matches!(info.kind, SymbolKind::Nonterminal))
}
