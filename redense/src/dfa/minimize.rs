/*!
Minimization by pairwise distinguishability, and in-place complementation.
*/

use std::collections::HashMap;

use itertools::Itertools;

use crate::expr::NodeSet;

use super::{AlterTrans, Dfa, StateId, REJECT};

impl Dfa {
    /// Collapses indistinguishable states.
    ///
    /// Textbook refinement over an upper-triangular table of state pairs:
    /// seed with differing acceptance, then repeatedly mark pairs whose
    /// successors on some byte are already distinguished (or split between
    /// [`REJECT`] and a live state). Equivalent states are replaced by their
    /// lowest representative and the table is compacted; state 0 keeps its
    /// seat as the start. Idempotent. Returns `false` when construction was
    /// incomplete.
    pub fn minimize(&mut self) -> bool {
        if !self.complete {
            return false;
        }
        if self.minimum {
            return true;
        }
        let n = self.states.len();
        if n < 2 {
            self.minimum = true;
            return true;
        }

        // end-of-line re-expansion acceptance takes part in the initial
        // partition, otherwise merging could erase anchored acceptance
        let end_accept: Vec<bool> = (0..n)
            .map(|i| self.states[i].accept || self.finish_accept(i as StateId, false))
            .collect();

        let mut distinct: Vec<Vec<bool>> = (0..n)
            .map(|i| {
                ((i + 1)..n)
                    .map(|j| {
                        self.states[i].accept != self.states[j].accept
                            || end_accept[i] != end_accept[j]
                    })
                    .collect()
            })
            .collect();

        let mut changed = true;
        while changed {
            changed = false;
            for (i, j) in (0..n).tuple_combinations() {
                if distinct[i][j - i - 1] {
                    continue;
                }
                for c in 0..256usize {
                    let mut a = self.transitions[i][c];
                    let mut b = self.transitions[j][c];
                    if a == b {
                        continue;
                    }
                    if a > b {
                        std::mem::swap(&mut a, &mut b);
                    }
                    if b == REJECT || distinct[a as usize][b as usize - a as usize - 1] {
                        distinct[i][j - i - 1] = true;
                        changed = true;
                        break;
                    }
                }
            }
        }

        // each removable state maps to its lowest equivalent
        let mut replace_with: HashMap<StateId, StateId> = HashMap::new();
        for (i, j) in (0..n).tuple_combinations() {
            if !replace_with.contains_key(&(j as StateId)) && !distinct[i][j - i - 1] {
                replace_with.insert(j as StateId, i as StateId);
            }
        }
        if replace_with.is_empty() {
            self.minimum = true;
            return true;
        }

        let keep_subsets = self.id_to_subset.len() == n;
        let mut replace_map = vec![0 as StateId; n];
        let mut next: StateId = 0;
        for s in 0..n {
            if let Some(&rep) = replace_with.get(&(s as StateId)) {
                replace_map[s] = replace_map[rep as usize];
            } else {
                replace_map[s] = next;
                if s as StateId != next {
                    let row = self.transitions[s];
                    self.transitions[next as usize] = row;
                    self.states.swap(next as usize, s);
                    self.states[next as usize].id = next;
                    if keep_subsets {
                        self.id_to_subset.swap(next as usize, s);
                    }
                }
                next += 1;
            }
        }

        let new_len = next as usize;
        for i in 0..new_len {
            for c in 0..256usize {
                let t = self.transitions[i][c];
                if t != REJECT {
                    self.transitions[i][c] = replace_map[t as usize];
                }
            }
            let state = &mut self.states[i];
            state.dst_states = state
                .dst_states
                .iter()
                .map(|&t| if t == REJECT { REJECT } else { replace_map[t as usize] })
                .collect();
        }
        self.states.truncate(new_len);
        self.transitions.truncate(new_len);
        // predecessors of a merged-away state belong to its representative
        // now; re-derive the inverse adjacency wholesale
        for state in &mut self.states {
            state.src_states.clear();
        }
        self.finalize();
        if keep_subsets {
            self.id_to_subset.truncate(new_len);
            self.subset_to_id = self
                .id_to_subset
                .iter()
                .enumerate()
                .map(|(i, subset)| (subset.clone(), i as StateId))
                .collect();
        }

        self.invalidate_program();
        self.minimum = true;
        true
    }

    /// Complements the accepted language in place.
    ///
    /// Every state flips its accept flag; transitions into [`REJECT`] are
    /// repointed at a lazily materialized accepting sink that loops on
    /// itself. No sink is created when no state needs one. Involution at
    /// the language level. Returns `false` when construction was incomplete.
    pub fn complement(&mut self) -> bool {
        if !self.complete {
            return false;
        }
        let n = self.states.len();
        let mut sink = REJECT;
        for i in 0..n {
            self.states[i].accept = !self.states[i].accept;
            let mut to_sink = false;
            for c in 0..256usize {
                if self.transitions[i][c] == REJECT {
                    if sink == REJECT {
                        sink = self.add_state();
                        self.transitions[sink as usize] = [sink; 256];
                        self.states[sink as usize].accept = true;
                        self.states[sink as usize].dst_states.insert(sink);
                        self.states[sink as usize].src_states.insert(sink);
                        if self.id_to_subset.len() == n {
                            // keep ids and stored subsets aligned; the sink
                            // has no positions behind it
                            let width = self
                                .tree
                                .as_ref()
                                .map(|tree| tree.width())
                                .unwrap_or(0);
                            self.id_to_subset.push(NodeSet::empty(width));
                        }
                    }
                    self.transitions[i][c] = sink;
                    to_sink = true;
                }
            }
            if to_sink {
                self.states[i].dst_states.remove(&REJECT);
                self.states[i].dst_states.insert(sink);
                self.states[sink as usize].src_states.insert(i as StateId);
            }
        }
        if sink != REJECT {
            self.minimum = false;
        }
        self.complemented = !self.complemented;
        self.invalidate_program();
        true
    }

    /// A compiled program refers to state handlers by id, so any transform
    /// that renumbers or rewires states drops it.
    pub(crate) fn invalidate_program(&mut self) {
        self.program = None;
        self.olevel = None;
        for state in &mut self.states {
            state.alter = AlterTrans::UNSET;
            state.inline_level = 0;
        }
    }
}
