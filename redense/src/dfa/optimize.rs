/*!
The two optimizer passes feeding the threaded-code back end: branch
elimination (O2) and inline chaining (O3).
*/

use itertools::Itertools;

use super::{AlterTrans, Dfa, UNDEF, REJECT};

/// Hard cap on the length of an inline chain.
const MAX_INLINE: usize = 10;

impl Dfa {
    /// O2: tries to express every transition row as a two-way alternate.
    ///
    /// A row qualifies when it is one contiguous interval of a single
    /// successor over a uniform background: the interval goes to `next1`,
    /// everything else to `next2`. A fully uniform row stores
    /// `{(0, 255), next, UNDEF}`. Rows of any other shape get no alternate.
    pub(crate) fn eliminate_branch(&mut self) -> bool {
        for i in 0..self.states.len() {
            let runs: Vec<(usize, u32)> =
                self.transitions[i].iter().copied().dedup_with_count().collect();
            self.states[i].alter = match runs.as_slice() {
                [(_, only)] => AlterTrans { key: (0, 255), next1: *only, next2: UNDEF },
                [(head, background), (_, next1)] => AlterTrans {
                    key: (*head as u8, 255),
                    next1: *next1,
                    next2: *background,
                },
                [(head, background), (middle, next1), (_, tail)] if tail == background => {
                    AlterTrans {
                        key: (*head as u8, (*head + *middle - 1) as u8),
                        next1: *next1,
                        next2: *background,
                    }
                }
                _ => AlterTrans::UNSET,
            };
        }
        true
    }

    /// O3: picks maximal linear chains for inlining.
    ///
    /// Starting from each state not yet swallowed by another chain, walk
    /// forward while the successor is unique (a lone live target, with or
    /// without a [`REJECT`] edge beside it), has an alternate, exactly one
    /// predecessor, is not accepting and is not state 0 (the entry point
    /// stays addressable). The chain length lands in `inline_level` on the
    /// head. Requires [`Dfa::eliminate_branch`] to have run.
    pub(crate) fn reduce(&mut self) -> bool {
        let n = self.states.len();
        let mut inlined = vec![false; n];
        for head in 0..n {
            if inlined[head] {
                continue;
            }
            let mut current = head;
            loop {
                let cur = &self.states[current];
                let n_dst = cur.dst_states.len();
                let with_reject = cur.dst_states.contains(&REJECT);
                if n_dst == 0 || n_dst > 2 {
                    break;
                }
                if n_dst == 2 && !with_reject {
                    break;
                }
                if n_dst == 1 && with_reject {
                    break;
                }
                let next =
                    cur.dst_states.iter().copied().find(|&d| d != REJECT).unwrap() as usize;
                if next == 0 {
                    break;
                }
                let candidate = &self.states[next];
                if candidate.alter.next1 == UNDEF {
                    break;
                }
                if candidate.src_states.len() != 1 || candidate.accept {
                    break;
                }
                if inlined[next] {
                    break;
                }
                inlined[next] = true;
                current = next;
                self.states[head].inline_level += 1;
                if self.states[head].inline_level >= MAX_INLINE {
                    break;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        dfa::{Config, Dfa, OptLevel, StateId, REJECT, UNDEF},
        expr::ExprInfo,
    };

    fn build(pattern: &str, config: Config) -> Dfa {
        Dfa::new(Arc::new(ExprInfo::parse(pattern).unwrap()), config)
    }

    /// The alternate must describe the row byte for byte.
    fn assert_alternates_agree(dfa: &Dfa) {
        for id in 0..dfa.state_len() as StateId {
            let alter = dfa.state(id).alter;
            if alter.next1 == UNDEF {
                continue;
            }
            let (lo, hi) = alter.key;
            for c in 0..=255u8 {
                let expect = if lo <= c && c <= hi { alter.next1 } else { alter.next2 };
                if expect != UNDEF {
                    assert_eq!(dfa.transition(id, c), expect, "state {} byte {}", id, c);
                }
            }
        }
    }

    #[test]
    fn eliminated_branches_describe_their_rows() {
        for pattern in ["abc", "a+b", "[a-m]x|[n-z]y", "(ab|cd)*"] {
            let mut dfa = build(pattern, Config::default());
            assert!(dfa.eliminate_branch());
            assert_alternates_agree(&dfa);
        }
    }

    #[test]
    fn uniform_row_collapses_to_one_target() {
        // an accepting shortest-match row is all REJECT
        let config = Config::builder().shortest_match(true).build();
        let mut dfa = build("a", config);
        dfa.eliminate_branch();
        let accept = dfa.transition(0, b'a');
        let alter = dfa.state(accept).alter;
        assert_eq!(alter.key, (0, 255));
        assert_eq!(alter.next1, REJECT);
        assert_eq!(alter.next2, UNDEF);
    }

    #[test]
    fn literal_row_keys_on_its_byte() {
        let mut dfa = build("ab", Config::default());
        dfa.eliminate_branch();
        let alter = dfa.state(0).alter;
        assert_eq!(alter.key, (b'a', b'a'));
        assert_eq!(alter.next1, dfa.transition(0, b'a'));
        assert_eq!(alter.next2, REJECT);
    }

    #[test]
    fn interval_reaching_the_top_byte_keys_to_255() {
        let mut dfa = build("[\\x80-\\xff]z", Config::default());
        dfa.eliminate_branch();
        let alter = dfa.state(0).alter;
        assert_eq!(alter.key, (0x80, 0xff));
        assert_eq!(alter.next2, REJECT);
    }

    #[test]
    fn chains_cap_at_ten_and_skip_accepting_states() {
        let mut dfa = build("abcdefghijklmnop", Config::default());
        dfa.compile(OptLevel::O3);
        // 16 literal states + the accepting state
        assert_eq!(dfa.state_len(), 17);
        assert_eq!(dfa.state(0).inline_level, 10);
        // the second chain stops short of the accepting state
        assert_eq!(dfa.state(11).inline_level, 4);
        for id in 1..11u32 {
            assert_eq!(dfa.state(id).inline_level, 0);
        }
    }

    #[test]
    fn chained_states_have_one_predecessor_and_do_not_accept() {
        let mut dfa = build("foo(bar|baz)quux", Config::default());
        dfa.compile(OptLevel::O3);
        for head in 0..dfa.state_len() as StateId {
            let level = dfa.state(head).inline_level;
            if level == 0 {
                continue;
            }
            let mut current = head;
            for _ in 0..level {
                let next = dfa
                    .state(current)
                    .dst_states
                    .iter()
                    .copied()
                    .find(|&d| d != REJECT)
                    .unwrap();
                assert_eq!(dfa.state(next).src_states.len(), 1);
                assert!(!dfa.state(next).accept);
                current = next;
            }
        }
    }
}
