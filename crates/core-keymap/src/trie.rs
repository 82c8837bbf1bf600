//! Generic key-sequence trie.
//!
//! Each node remembers how many terminals live below it so `is_prefix` stays
//! exact after removals without pruning nodes. Edges are kept in a small inline
//! vector; most nodes have one or two children.

use core_events::KeyEvent;
use smallvec::SmallVec;
use tracing::trace;

#[derive(Debug, Clone)]
struct Edge {
    key: KeyEvent,
    next: usize,
}

#[derive(Debug, Clone)]
struct Node<V> {
    terminal: Option<V>,
    /// Terminals in this subtree, including this node's own.
    live: usize,
    edges: SmallVec<[Edge; 4]>,
}

impl<V> Node<V> {
    fn new() -> Self {
        Self {
            terminal: None,
            live: 0,
            edges: SmallVec::new(),
        }
    }

    fn child(&self, key: &KeyEvent) -> Option<usize> {
        self.edges.iter().find(|e| e.key == *key).map(|e| e.next)
    }

    /// True when a strictly longer sequence ends below this node.
    fn has_extensions(&self) -> bool {
        self.live > usize::from(self.terminal.is_some())
    }
}

/// Outcome of looking a typed key buffer up in a trie.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution<'a, V> {
    /// No registered sequence starts with the buffered keys.
    NoMatch,
    /// The buffer is a strict prefix of a longer sequence. `fallback` is the
    /// longest sequence already completed inside the buffer, used when the
    /// ambiguity timeout fires.
    Prefix { fallback: Option<(usize, &'a V)> },
    /// `consumed` leading keys form a complete sequence and nothing longer can
    /// still match.
    Match { consumed: usize, value: &'a V },
}

// Manual impls: deriving would require `V: Clone`/`V: Copy`.
impl<V> Clone for Resolution<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Resolution<'_, V> {}

#[derive(Debug, Clone)]
pub struct KeyTrie<V> {
    nodes: Vec<Node<V>>,
}

impl<V> Default for KeyTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> KeyTrie<V> {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new()],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes[0].live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `value` under `keys`, returning the value it replaced. An empty
    /// sequence is ignored and handed back.
    pub fn insert(&mut self, keys: &[KeyEvent], value: V) -> Option<V> {
        if keys.is_empty() {
            return Some(value);
        }
        let mut path = Vec::with_capacity(keys.len() + 1);
        let mut cur = 0usize;
        path.push(cur);
        for key in keys {
            cur = match self.nodes[cur].child(key) {
                Some(next) => next,
                None => {
                    let idx = self.nodes.len();
                    self.nodes.push(Node::new());
                    self.nodes[cur].edges.push(Edge {
                        key: *key,
                        next: idx,
                    });
                    idx
                }
            };
            path.push(cur);
        }
        let previous = self.nodes[cur].terminal.replace(value);
        if previous.is_some() {
            trace!(target: "input.map", node = cur, "terminal_override");
        } else {
            for idx in path {
                self.nodes[idx].live += 1;
            }
        }
        previous
    }

    pub fn remove(&mut self, keys: &[KeyEvent]) -> Option<V> {
        let path = self.path(keys)?;
        let end = *path.last()?;
        let removed = self.nodes[end].terminal.take()?;
        for idx in path {
            self.nodes[idx].live -= 1;
        }
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[0] = Node::new();
    }

    pub fn get(&self, keys: &[KeyEvent]) -> Option<&V> {
        let end = *self.path(keys)?.last()?;
        self.nodes[end].terminal.as_ref()
    }

    /// True when `keys` is a strict prefix of at least one stored sequence.
    pub fn is_prefix(&self, keys: &[KeyEvent]) -> bool {
        self.path(keys)
            .and_then(|p| p.last().copied())
            .is_some_and(|end| self.nodes[end].has_extensions())
    }

    pub fn resolve(&self, keys: &[KeyEvent]) -> Resolution<'_, V> {
        let mut node = 0usize;
        let mut walked = 0usize;
        let mut last: Option<(usize, &V)> = None;
        for (i, key) in keys.iter().enumerate() {
            let Some(next) = self.nodes[node].child(key) else {
                break;
            };
            if self.nodes[next].live == 0 {
                break;
            }
            node = next;
            walked = i + 1;
            trace!(target: "input.map", step = i, node, "advance");
            if let Some(v) = self.nodes[node].terminal.as_ref() {
                last = Some((walked, v));
            }
        }
        if walked == keys.len() && !keys.is_empty() && self.nodes[node].has_extensions() {
            return Resolution::Prefix { fallback: last };
        }
        match last {
            Some((consumed, value)) => Resolution::Match { consumed, value },
            None => Resolution::NoMatch,
        }
    }

    /// All stored values in depth-first order.
    pub fn values(&self) -> Vec<&V> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.live == 0 {
                continue;
            }
            if let Some(v) = node.terminal.as_ref() {
                out.push(v);
            }
            stack.extend(node.edges.iter().rev().map(|e| e.next));
        }
        out
    }

    fn path(&self, keys: &[KeyEvent]) -> Option<Vec<usize>> {
        let mut path = Vec::with_capacity(keys.len() + 1);
        let mut cur = 0usize;
        path.push(cur);
        for key in keys {
            cur = self.nodes[cur].child(key)?;
            path.push(cur);
        }
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::parse_keys;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn trie(entries: &[(&str, u32)]) -> KeyTrie<u32> {
        let mut t = KeyTrie::new();
        for (lhs, v) in entries {
            t.insert(&parse_keys(lhs), *v);
        }
        t
    }

    #[test]
    fn exact_single_key_match() {
        let t = trie(&[("w", 1)]);
        assert_eq!(
            t.resolve(&parse_keys("w")),
            Resolution::Match {
                consumed: 1,
                value: &1
            }
        );
    }

    #[test]
    fn strict_prefix_waits_with_fallback() {
        let t = trie(&[("d", 1), ("dx", 2)]);
        assert_eq!(
            t.resolve(&parse_keys("d")),
            Resolution::Prefix {
                fallback: Some((1, &1))
            }
        );
        assert!(t.is_prefix(&parse_keys("d")));
        assert!(!t.is_prefix(&parse_keys("dx")));
    }

    #[test]
    fn longest_match_consumes_more_keys() {
        let t = trie(&[("d", 1), ("dw", 2)]);
        assert_eq!(
            t.resolve(&parse_keys("dw")),
            Resolution::Match {
                consumed: 2,
                value: &2
            }
        );
        // Divergence after a completed shorter sequence falls back to it.
        assert_eq!(
            t.resolve(&parse_keys("dz")),
            Resolution::Match {
                consumed: 1,
                value: &1
            }
        );
    }

    #[test]
    fn unknown_key_is_no_match() {
        let t = trie(&[("gx", 1)]);
        assert_eq!(t.resolve(&parse_keys("z")), Resolution::NoMatch);
        assert_eq!(t.resolve(&parse_keys("gz")), Resolution::NoMatch);
        assert_eq!(t.resolve(&[]), Resolution::NoMatch);
    }

    #[test]
    fn removal_keeps_prefix_accounting_exact() {
        let mut t = trie(&[("abc", 1), ("ab", 2)]);
        assert!(t.is_prefix(&parse_keys("ab")));
        assert_eq!(t.remove(&parse_keys("abc")), Some(1));
        assert!(!t.is_prefix(&parse_keys("ab")));
        assert!(t.is_prefix(&parse_keys("a")));
        assert_eq!(
            t.resolve(&parse_keys("abc")),
            Resolution::Match {
                consumed: 2,
                value: &2
            }
        );
        assert_eq!(t.remove(&parse_keys("abc")), None);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn insert_replaces_and_empty_is_rejected() {
        let mut t = trie(&[("x", 1)]);
        assert_eq!(t.insert(&parse_keys("x"), 5), Some(1));
        assert_eq!(t.get(&parse_keys("x")), Some(&5));
        assert_eq!(t.insert(&[], 9), Some(9));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn values_lists_every_terminal() {
        let t = trie(&[("a", 1), ("ab", 2), ("b", 3)]);
        let mut vals: Vec<u32> = t.values().into_iter().copied().collect();
        vals.sort();
        assert_eq!(vals, vec![1, 2, 3]);
    }

    fn lhs() -> impl Strategy<Value = String> {
        proptest::collection::vec(prop_oneof![Just('a'), Just('b'), Just('c')], 1..5)
            .prop_map(|v| v.into_iter().collect())
    }

    proptest! {
        #[test]
        fn every_strict_prefix_is_a_prefix(seqs in proptest::collection::vec(lhs(), 1..8)) {
            let mut t = KeyTrie::new();
            for (i, s) in seqs.iter().enumerate() {
                t.insert(&parse_keys(s), i);
            }
            for s in &seqs {
                let keys = parse_keys(s);
                for cut in 1..keys.len() {
                    prop_assert!(t.is_prefix(&keys[..cut]));
                    let is_prefix_resolution =
                        matches!(t.resolve(&keys[..cut]), Resolution::Prefix { .. });
                    prop_assert!(is_prefix_resolution);
                }
                // The full sequence either matches exactly or waits for a longer one.
                match t.resolve(&keys) {
                    Resolution::Match { consumed, .. } => prop_assert_eq!(consumed, keys.len()),
                    Resolution::Prefix { fallback } => {
                        prop_assert_eq!(fallback.map(|(n, _)| n), Some(keys.len()))
                    }
                    Resolution::NoMatch => prop_assert!(false, "registered sequence must resolve"),
                }
            }
        }
    }
}
