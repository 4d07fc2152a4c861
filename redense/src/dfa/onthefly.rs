/*!
Lazy matching for partially built tables.

When construction stopped at the state limit (or never ran), the transition
rows still hold [`UNDEF`](super::UNDEF) in every cell that was not decided.
The on-the-fly matcher walks the input and resolves those cells as it meets
them: the successor subset is computed from the current state's stored
subset with the node-level byte predicate, closed, and interned. Every
discovery is memoized into the same table, so later searches get it for
free.
*/

use super::{cursor_bounds, Dfa, StateId, REJECT, UNDEF};
use crate::expr::NodeSet;

impl Dfa {
    /// Matches the whole haystack, building missing states on demand.
    pub fn on_the_fly_match(&mut self, haystack: impl AsRef<[u8]>) -> bool {
        let h = haystack.as_ref();
        let Some(tree) = self.tree.clone() else {
            return false;
        };
        if tree.width() == 0 {
            return false;
        }

        if self.states.is_empty() {
            let mut start = tree.first.clone();
            tree.expand(&mut start, true, false);
            let accept = tree.contains_accept(&start);
            let id = self.add_state();
            self.subset_to_id.insert(start.clone(), id);
            self.id_to_subset.push(start);
            self.states[id as usize].accept = accept;
        }

        let sign: isize = if self.config.reverse_match { -1 } else { 1 };
        let (mut cur, stop) = cursor_bounds(h.len(), self.config.reverse_match);
        let mut state: StateId = 0;

        while cur != stop {
            let byte = h[cur as usize];
            let mut next = self.transitions[state as usize][byte as usize];
            if next == REJECT {
                return false;
            }
            if next == UNDEF {
                let mut nexts = NodeSet::empty(tree.width());
                for node in self.id_to_subset[state as usize].iter() {
                    if tree.node_matches(node, byte) {
                        nexts.union_with(&tree.nodes[node as usize].follow);
                    }
                }
                tree.expand(&mut nexts, false, false);
                if nexts.is_empty() {
                    self.transitions[state as usize][byte as usize] = REJECT;
                    return false;
                }
                next = match self.subset_to_id.get(&nexts) {
                    Some(&existing) => existing,
                    None => {
                        let accept = tree.contains_accept(&nexts);
                        let id = self.add_state();
                        self.subset_to_id.insert(nexts.clone(), id);
                        self.id_to_subset.push(nexts);
                        self.states[id as usize].accept = accept;
                        id
                    }
                };
                self.transitions[state as usize][byte as usize] = next;
            }
            cur += sign;
            state = next;
        }

        if self.states[state as usize].accept {
            return true;
        }
        self.finish_accept(state, h.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        dfa::{Config, Dfa},
        expr::ExprInfo,
    };

    fn build_lazy(pattern: &str, limit: usize) -> Dfa {
        let config = Config::builder().state_limit(limit).build();
        Dfa::new(Arc::new(ExprInfo::parse(pattern).unwrap()), config)
    }

    #[test]
    fn lazy_matching_agrees_with_full_construction() {
        let inputs = ["", "abc", "abd", "abx", "ab", "abcabc", "xbc"];
        let full = build_lazy("abc|abd", 1 << 16);
        assert!(full.is_complete());
        let mut lazy = build_lazy("abc|abd", 2);
        assert!(!lazy.is_complete());
        for input in inputs {
            assert_eq!(
                lazy.on_the_fly_match(input),
                full.full_match(input),
                "{:?}",
                input
            );
        }
    }

    #[test]
    fn discoveries_are_memoized() {
        let mut lazy = build_lazy("(ab|cd)+x", 1);
        assert!(!lazy.is_complete());
        assert!(lazy.on_the_fly_match("abcdx"));
        let grown = lazy.state_len();
        assert!(grown > 1);
        assert!(lazy.on_the_fly_match("abcdx"));
        assert_eq!(lazy.state_len(), grown);
    }

    #[test]
    fn rejects_are_cached_too() {
        let mut lazy = build_lazy("abc", 1);
        assert!(!lazy.on_the_fly_match("zzz"));
        assert!(!lazy.on_the_fly_match("zzz"));
        assert!(lazy.on_the_fly_match("abc"));
    }

    #[test]
    fn end_anchor_resolves_at_input_exhaustion() {
        let mut lazy = build_lazy("foo$", 1);
        assert!(lazy.on_the_fly_match("foo"));
        assert!(!lazy.on_the_fly_match("fox"));
    }

    #[test]
    fn empty_input_opens_both_line_sides() {
        let mut lazy = build_lazy("^$", 1);
        assert!(lazy.on_the_fly_match(""));
        assert!(!lazy.on_the_fly_match("x"));
    }

    #[test]
    fn reverse_lazy_walk() {
        let config = Config::builder()
            .state_limit(1)
            .reverse_match(true)
            .build();
        let mut lazy = Dfa::new(
            Arc::new(ExprInfo::parse("cba").unwrap()),
            config,
        );
        assert!(lazy.on_the_fly_match("abc"));
        assert!(!lazy.on_the_fly_match("cba"));
    }
}
