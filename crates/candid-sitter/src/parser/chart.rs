//! The Earley chart: one item set per consumed input unit.

use crate::language::{LanguageData, Symbol, SymbolKind};
use std::collections::{HashMap, HashSet};

/// A dotted production together with the set it was predicted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Item {
    pub production: usize,
    pub dot: usize,
    pub origin: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ItemSet {
    pub items: Vec<Item>,
    seen: HashSet<Item>,
    waiting: HashMap<Symbol, Vec<Item>>,
    /// Completed `(lhs, origin)` pairs and the productions that completed them.
    pub completed: HashMap<(Symbol, usize), Vec<usize>>,
}

impl ItemSet {
    pub fn contains(&self, item: &Item) -> bool {
        self.seen.contains(item)
    }

    /// Items whose next step is `symbol`.
    pub fn waiting_on(&self, symbol: Symbol) -> &[Item] {
        self.waiting.get(&symbol).map_or(&[][..], Vec::as_slice)
    }
}

pub(crate) struct Chart<'a> {
    language: &'a LanguageData,
    pub sets: Vec<ItemSet>,
}

impl<'a> Chart<'a> {
    pub fn new(language: &'a LanguageData) -> Self {
        let mut chart = Self {
            language,
            sets: vec![ItemSet::default()],
        };
        for &production in &language.productions_by_lhs[usize::from(language.start)] {
            chart.add(
                0,
                Item {
                    production,
                    dot: 0,
                    origin: 0,
                },
            );
        }
        chart
    }

    pub fn next_symbol(&self, item: &Item) -> Option<Symbol> {
        self.language.productions[item.production]
            .steps
            .get(item.dot)
            .map(|step| step.symbol)
    }

    pub fn add(&mut self, set: usize, item: Item) -> bool {
        let next = self.next_symbol(&item);
        let lhs = self.language.productions[item.production].lhs;
        let target = &mut self.sets[set];
        if !target.seen.insert(item) {
            return false;
        }
        target.items.push(item);
        match next {
            Some(symbol) => target.waiting.entry(symbol).or_default().push(item),
            None => target
                .completed
                .entry((lhs, item.origin))
                .or_default()
                .push(item.production),
        }
        true
    }

    fn is_nonterminal(&self, symbol: Symbol) -> bool {
        matches!(
            self.language.symbols[usize::from(symbol)].kind,
            SymbolKind::Nonterminal | SymbolKind::Auxiliary
        )
    }

    /// Runs prediction and completion on set `k` until nothing new is added.
    ///
    /// Predictions of symbols in `suppressed` are withheld; the parser offers
    /// reusable subtrees for those instead.
    pub fn close(&mut self, k: usize, suppressed: &HashSet<Symbol>) {
        let language = self.language;
        let mut index = 0;
        while index < self.sets[k].items.len() {
            let item = self.sets[k].items[index];
            index += 1;

            match self.next_symbol(&item) {
                None => {
                    let lhs = language.productions[item.production].lhs;
                    let waiting = self.sets[item.origin].waiting_on(lhs).to_vec();
                    for parent in waiting {
                        self.add(k, Item { dot: parent.dot + 1, ..parent });
                    }
                }
                Some(symbol) if self.is_nonterminal(symbol) => {
                    if !suppressed.contains(&symbol) {
                        for &production in &language.productions_by_lhs[usize::from(symbol)] {
                            self.add(
                                k,
                                Item {
                                    production,
                                    dot: 0,
                                    origin: k,
                                },
                            );
                        }
                    }
                    if language.nullable[usize::from(symbol)] {
                        self.add(k, Item { dot: item.dot + 1, ..item });
                    }
                }
                Some(_) => {}
            }
        }
    }

    /// Terminals the items of set `k` can consume next.
    pub fn expected_terminals(&self, k: usize) -> Vec<bool> {
        let mut expected = vec![false; self.language.symbols.len()];
        for symbol in self.sets[k].waiting.keys() {
            if !self.is_nonterminal(*symbol) {
                expected[usize::from(*symbol)] = true;
            }
        }
        expected
    }

    /// Nonterminals some item of set `k` is waiting on.
    pub fn expected_nonterminals(&self, k: usize) -> impl Iterator<Item = Symbol> + '_ {
        self.sets[k]
            .waiting
            .keys()
            .copied()
            .filter(|symbol| self.is_nonterminal(*symbol))
    }

    /// Advances every item in set `k` waiting on `symbol` into set `k + 1`.
    ///
    /// `after_extra` rejects steps marked as immediate.
    pub fn scan(&mut self, k: usize, symbol: Symbol, after_extra: bool) -> bool {
        if self.sets.len() == k + 1 {
            self.sets.push(ItemSet::default());
        }
        let language = self.language;
        let waiting = self.sets[k].waiting_on(symbol).to_vec();
        let mut advanced = false;
        for item in waiting {
            let step = &language.productions[item.production].steps[item.dot];
            if step.immediate && after_extra {
                continue;
            }
            advanced |= self.add(k + 1, Item { dot: item.dot + 1, ..item });
        }
        advanced
    }

    /// Drops a set that received no items, so the position can be retried.
    pub fn discard_after(&mut self, k: usize) {
        self.sets.truncate(k + 1);
    }

    /// Whether set `k` completes the augmented start symbol from position 0.
    pub fn accepts(&self, k: usize) -> bool {
        self.sets[k]
            .completed
            .contains_key(&(self.language.start, 0))
    }
}
