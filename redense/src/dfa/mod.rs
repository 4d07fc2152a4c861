/*!
The dense, table-driven DFA and its match drivers.

A [`Dfa`] is built from parsed [positions](crate::expr::ExprInfo) by breadth-
first subset construction (or from an externally prepared
[`Nfa`](crate::nfa::Nfa) by the classical construction). Each state owns a
dense 256-entry transition row. On top of the raw table sit:

- [`Dfa::minimize`]: distinguishability refinement,
- [`Dfa::complement`]: in-place language complement,
- [`Dfa::compile`]: lowering into a threaded-code program with optional
  branch elimination ([`OptLevel::O2`]) and inline chaining
  ([`OptLevel::O3`]),
- [`Dfa::full_match`] / [`Dfa::search`] / [`Dfa::on_the_fly_match`]: the
  drivers.

Construction takes a state-count limit. When the limit is hit the table is
left partially built and matching degrades to
[`Dfa::on_the_fly_match`](crate::dfa::Dfa::on_the_fly_match), which interns
the remaining subsets on demand.
*/

use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    sync::Arc,
};

use bon::Builder;

use crate::{
    expr::{ExprInfo, NodeKind, NodeSet},
    matches::Match,
    nfa::Nfa,
};

mod minimize;
mod onthefly;
mod optimize;
mod program;

use program::Program;

/// The id of a DFA state. State 0 is the start state.
pub type StateId = u32;

/// The dead state: no suffix can lead to acceptance.
pub const REJECT: StateId = u32::MAX;

/// Not-a-state: the transition (or alternate) has not been decided.
pub const UNDEF: StateId = u32::MAX - 1;

/// Optimization levels for [`Dfa::compile`].
///
/// `O0`/`O1` lower the table into threaded code as-is, `O2` additionally
/// collapses eligible rows into two-way alternate transitions, and `O3`
/// additionally inlines linear state chains into straight-line code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptLevel {
    O0,
    O1,
    O2,
    O3,
}

/// Match-time behavior of a [`Dfa`] (and of the [`Regex`](crate::Regex)
/// built on top of it).
#[derive(Builder, Clone, Copy, Debug)]
pub struct Config {
    /// Treat the haystack as a single line: no delimiter handling, anchors
    /// never match mid-input.
    #[builder(default = false)]
    pub(crate) one_line: bool,
    /// Run the cursor from the end of the haystack towards the start and
    /// report the begin bound instead of the end bound.
    #[builder(default = false)]
    pub(crate) reverse_match: bool,
    /// Stop at the first accepting position; accepting states drop their
    /// outgoing transitions.
    #[builder(default = false)]
    pub(crate) shortest_match: bool,
    /// Keep going after an accepting position and report the last one seen.
    #[builder(default = false)]
    pub(crate) longest_match: bool,
    /// Report the whole haystack on a match instead of a prefix bound.
    #[builder(default = false)]
    pub(crate) suffix_match: bool,
    /// Allow the compiled program to fast-forward over bytes that cannot
    /// occur in a match (see the quick filter in [`Dfa::compile`]).
    #[builder(default = false)]
    pub(crate) filtered_match: bool,
    /// The line delimiter byte.
    #[builder(default = b'\n')]
    pub(crate) delimiter: u8,
    /// Construction stops interning new states beyond this count.
    #[builder(default = 1 << 16)]
    pub(crate) state_limit: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config::builder().build()
    }
}

/// A two-way summary of a transition row: bytes inside `key` go to `next1`,
/// all others to `next2`. Synthesized by branch elimination; either field
/// may be [`REJECT`], and `next1 == UNDEF` means the row has no such shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlterTrans {
    pub key: (u8, u8),
    pub next1: StateId,
    pub next2: StateId,
}

impl AlterTrans {
    pub(crate) const UNSET: AlterTrans =
        AlterTrans { key: (0, 0), next1: UNDEF, next2: UNDEF };
}

#[derive(Clone, Debug)]
pub(crate) struct State {
    pub(crate) id: StateId,
    pub(crate) accept: bool,
    pub(crate) src_states: BTreeSet<StateId>,
    pub(crate) dst_states: BTreeSet<StateId>,
    pub(crate) alter: AlterTrans,
    pub(crate) inline_level: usize,
}

/// A deterministic finite automaton over the 256-byte alphabet.
pub struct Dfa {
    tree: Option<Arc<ExprInfo>>,
    config: Config,
    states: Vec<State>,
    transitions: Vec<[StateId; 256]>,
    subset_to_id: HashMap<NodeSet, StateId>,
    id_to_subset: Vec<NodeSet>,
    complete: bool,
    minimum: bool,
    complemented: bool,
    olevel: Option<OptLevel>,
    program: Option<Program>,
}

impl Dfa {
    /// Builds the DFA for `tree` by subset construction.
    ///
    /// When the state limit is exceeded the table is left incomplete;
    /// [`Dfa::is_complete`] reports which and
    /// [`Dfa::on_the_fly_match`] finishes lazily.
    pub fn new(tree: Arc<ExprInfo>, config: Config) -> Dfa {
        let mut dfa = Dfa {
            tree: Some(tree),
            config,
            states: Vec::new(),
            transitions: Vec::new(),
            subset_to_id: HashMap::new(),
            id_to_subset: Vec::new(),
            complete: false,
            minimum: false,
            complemented: false,
            olevel: None,
            program: None,
        };
        dfa.construct();
        dfa
    }

    /// Determinizes an externally prepared NFA. Always complete.
    pub fn from_nfa(nfa: &Nfa, config: Config) -> Dfa {
        let mut dfa = Dfa {
            tree: None,
            config,
            states: Vec::new(),
            transitions: Vec::new(),
            subset_to_id: HashMap::new(),
            id_to_subset: Vec::new(),
            complete: false,
            minimum: false,
            complemented: false,
            olevel: None,
            program: None,
        };
        dfa.construct_from_nfa(nfa);
        dfa
    }

    pub fn state_len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_accept(&self, id: StateId) -> bool {
        self.states[id as usize].accept
    }

    pub fn olevel(&self) -> Option<OptLevel> {
        self.olevel
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn tree(&self) -> Option<&Arc<ExprInfo>> {
        self.tree.as_ref()
    }

    pub(crate) fn state(&self, id: StateId) -> &State {
        &self.states[id as usize]
    }

    pub(crate) fn transition(&self, id: StateId, byte: u8) -> StateId {
        self.transitions[id as usize][byte as usize]
    }

    pub(crate) fn add_state(&mut self) -> StateId {
        let id = self.states.len() as StateId;
        self.transitions.push([UNDEF; 256]);
        self.states.push(State {
            id,
            accept: false,
            src_states: BTreeSet::new(),
            dst_states: BTreeSet::new(),
            alter: AlterTrans::UNSET,
            inline_level: 0,
        });
        id
    }

    fn construct(&mut self) {
        let tree = self.tree.as_ref().expect("construction without positions").clone();
        if tree.width() == 0 {
            return;
        }
        let delimiter = self.config.delimiter;
        let one_line = self.config.one_line;

        let mut start = tree.first.clone();
        tree.expand(&mut start, true, false);

        let mut next_id: StateId = 0;
        let mut queue: VecDeque<NodeSet> = VecDeque::new();
        self.subset_to_id.insert(start.clone(), next_id);
        self.id_to_subset.push(start.clone());
        next_id += 1;
        queue.push_back(start);

        let mut limit_over = false;
        let mut column: Vec<NodeSet> = vec![NodeSet::empty(tree.width()); 256];

        while let Some(states) = queue.pop_front() {
            let id = self.add_state();
            debug_assert_eq!(self.subset_to_id.get(&states), Some(&id));
            let begline = id == 0;
            let accept = tree.contains_accept(&states);
            self.states[id as usize].accept = accept;

            if self.config.shortest_match && accept {
                self.transitions[id as usize] = [REJECT; 256];
                self.states[id as usize].dst_states.insert(REJECT);
                continue;
            }

            for acc in column.iter_mut() {
                acc.clear();
            }
            for node in states.iter() {
                Self::fill_transition(&tree, node, &mut column, delimiter, one_line);
            }

            for c in 0..256usize {
                let next = &mut column[c];
                if next.is_empty() {
                    self.transitions[id as usize][c] = REJECT;
                    self.states[id as usize].dst_states.insert(REJECT);
                    continue;
                }
                tree.expand(next, false, false);

                if c == delimiter as usize && !one_line {
                    // the delimiter column is the end-of-line marker: it may
                    // only lead to the unique accepting subset `{EOP}`
                    tree.expand(next, begline, true);
                    if tree.contains_accept(next) {
                        next.clear();
                        next.insert(tree.eop);
                    } else {
                        self.transitions[id as usize][c] = REJECT;
                        self.states[id as usize].dst_states.insert(REJECT);
                        continue;
                    }
                }

                let next_state = match self.subset_to_id.get(next) {
                    Some(&existing) => existing,
                    None => {
                        if (next_id as usize) < self.config.state_limit {
                            let fresh = next_id;
                            next_id += 1;
                            self.subset_to_id.insert(next.clone(), fresh);
                            self.id_to_subset.push(next.clone());
                            queue.push_back(next.clone());
                            fresh
                        } else {
                            limit_over = true;
                            continue;
                        }
                    }
                };
                self.transitions[id as usize][c] = next_state;
                self.states[id as usize].dst_states.insert(next_state);
            }
        }

        if !limit_over {
            self.finalize();
        }
    }

    /// Accumulates the follow positions of `node` into the per-byte columns.
    fn fill_transition(
        tree: &ExprInfo,
        node: crate::expr::NodeId,
        column: &mut [NodeSet],
        delimiter: u8,
        one_line: bool,
    ) {
        let follow = &tree.nodes[node as usize].follow;
        match &tree.nodes[node as usize].kind {
            NodeKind::Literal(b) => {
                column[*b as usize].union_with(follow);
            }
            NodeKind::Class(set) => {
                for c in 0..256usize {
                    if set.contains(c as u8) {
                        column[c].union_with(follow);
                    }
                }
            }
            NodeKind::Dot => {
                for c in 0..256usize {
                    if c != delimiter as usize || one_line {
                        column[c].union_with(follow);
                    }
                }
            }
            NodeKind::Anchor(_) => {
                if !one_line {
                    column[delimiter as usize].union_with(follow);
                }
            }
            NodeKind::Operator { .. } | NodeKind::Eop => {}
        }
    }

    fn construct_from_nfa(&mut self, nfa: &Nfa) {
        let mut map: HashMap<BTreeSet<u32>, StateId> = HashMap::new();
        let mut queue: VecDeque<BTreeSet<u32>> = VecDeque::new();
        let mut next_id: StateId = 0;

        let start = nfa.start_states().clone();
        map.insert(start.clone(), next_id);
        next_id += 1;
        queue.push_back(start);

        while let Some(subset) = queue.pop_front() {
            let id = self.add_state();
            let mut column: Vec<BTreeSet<u32>> = vec![BTreeSet::new(); 256];
            let mut accept = false;
            for &s in &subset {
                let state = &nfa.states()[s as usize];
                for (c, targets) in state.transitions.iter().enumerate() {
                    column[c].extend(targets.iter().copied());
                }
                accept |= state.accept;
            }
            self.states[id as usize].accept = accept;

            if self.config.shortest_match && accept {
                self.transitions[id as usize] = [REJECT; 256];
                self.states[id as usize].dst_states.insert(REJECT);
                continue;
            }

            for (c, next) in column.into_iter().enumerate() {
                if next.is_empty() {
                    self.transitions[id as usize][c] = REJECT;
                    self.states[id as usize].dst_states.insert(REJECT);
                    continue;
                }
                let next_state = match map.get(&next) {
                    Some(&existing) => existing,
                    None => {
                        let fresh = next_id;
                        next_id += 1;
                        map.insert(next.clone(), fresh);
                        queue.push_back(next);
                        fresh
                    }
                };
                self.transitions[id as usize][c] = next_state;
                self.states[id as usize].dst_states.insert(next_state);
            }
        }

        self.finalize();
    }

    fn finalize(&mut self) {
        for i in 0..self.states.len() {
            let src = self.states[i].id;
            let dsts: Vec<StateId> = self.states[i]
                .dst_states
                .iter()
                .copied()
                .filter(|&d| d != REJECT)
                .collect();
            for d in dsts {
                self.states[d as usize].src_states.insert(src);
            }
        }
        self.complete = true;
    }

    /// Lowers the DFA into a threaded-code program.
    ///
    /// `O2` first collapses rows into alternate transitions, `O3` also picks
    /// inline chains; `O0`/`O1` emit the plain table-dispatch program.
    /// Returns `false` when construction was incomplete; requesting a level
    /// at or below the current one is a no-op returning `true`.
    pub fn compile(&mut self, level: OptLevel) -> bool {
        if !self.complete {
            return false;
        }
        if self.olevel >= Some(level) {
            return true;
        }
        if level >= OptLevel::O2 {
            if self.eliminate_branch() {
                self.olevel = Some(OptLevel::O2);
            }
            if level == OptLevel::O3 && self.reduce() {
                self.olevel = Some(OptLevel::O3);
            }
        }
        self.program = Some(Program::emit(self));
        if self.olevel < Some(OptLevel::O1) {
            self.olevel = Some(OptLevel::O1);
        }
        true
    }

    /// Tests whether the whole haystack is accepted.
    pub fn full_match(&self, haystack: impl AsRef<[u8]>) -> bool {
        let h = haystack.as_ref();
        debug_assert!(self.complete, "full_match on an incomplete table");
        if self.states.is_empty() {
            return false;
        }
        let sign: isize = if self.config.reverse_match { -1 } else { 1 };
        let (mut cur, stop) = cursor_bounds(h.len(), self.config.reverse_match);
        let mut state: StateId = 0;
        while cur != stop {
            state = self.transitions[state as usize][h[cur as usize] as usize];
            if state == REJECT {
                return false;
            }
            cur += sign;
        }
        if self.states[state as usize].accept {
            return true;
        }
        self.finish_accept(state, h.is_empty())
    }

    /// Runs the flag-driven search and reports the matched bound.
    ///
    /// Uses the compiled program once [`Dfa::compile`] has run; the fallback
    /// interpreter implements the same semantics, so results are identical
    /// at every optimization level.
    pub fn search(&self, haystack: impl AsRef<[u8]>) -> Option<Match> {
        let h = haystack.as_ref();
        debug_assert!(self.complete, "search on an incomplete table");
        if self.states.is_empty() {
            return None;
        }
        let (state, stash) = match &self.program {
            Some(program) => program.run(h),
            None => self.search_table(h),
        };
        self.finish_search(state, stash, h)
    }

    fn search_table(&self, h: &[u8]) -> (StateId, Option<isize>) {
        let sign: isize = if self.config.reverse_match { -1 } else { 1 };
        let (mut cur, stop) = cursor_bounds(h.len(), self.config.reverse_match);
        let mut stash: Option<isize> = None;
        let mut state: StateId = 0;
        loop {
            if self.states[state as usize].accept && !self.config.suffix_match {
                stash = Some(cur);
                if !self.config.longest_match {
                    return (state, stash);
                }
            }
            if cur == stop {
                return (state, stash);
            }
            let byte = h[cur as usize];
            cur += sign;
            let next = self.transitions[state as usize][byte as usize];
            if next == REJECT {
                return (REJECT, stash);
            }
            state = next;
        }
    }

    /// Turns a final state plus the stashed cursor into the reported bound.
    fn finish_search(&self, state: StateId, stash: Option<isize>, h: &[u8]) -> Option<Match> {
        let len = h.len();
        let reverse = self.config.reverse_match;
        let mut accept = state != REJECT && self.states[state as usize].accept;
        if !accept && state != REJECT {
            // a live non-accepting state means the cursor reached the end
            accept = self.finish_accept(state, len == 0);
        }
        if self.config.suffix_match {
            return accept.then(|| Match::new(0, len));
        }
        if let Some(bound) = stash {
            return Some(if reverse {
                Match::new((bound + 1) as usize, len)
            } else {
                Match::new(0, bound as usize)
            });
        }
        accept.then(|| Match::new(0, len))
    }

    /// Re-expands the state's stored subset with `endline` open and tests
    /// acceptance again. This is the only place end-of-line is considered
    /// dynamically.
    pub(crate) fn finish_accept(&self, state: StateId, begline: bool) -> bool {
        if self.complemented {
            // stored subsets describe the uncomplemented acceptance
            return false;
        }
        let Some(tree) = &self.tree else {
            return false;
        };
        let Some(subset) = self.id_to_subset.get(state as usize) else {
            return false;
        };
        let mut set = subset.clone();
        tree.expand(&mut set, begline, true);
        tree.contains_accept(&set)
    }
}

pub(crate) fn cursor_bounds(len: usize, reverse: bool) -> (isize, isize) {
    if reverse {
        (len as isize - 1, -1)
    } else {
        (0, len as isize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(pattern: &str, config: Config) -> Dfa {
        let tree = ExprInfo::parse(pattern).unwrap();
        Dfa::new(Arc::new(tree), config)
    }

    #[test]
    fn repeated_digit_groups() {
        let mut text = String::new();
        for _ in 0..100 {
            for _ in 0..10 {
                text.push_str("0123456789");
            }
            text.push('_');
        }
        assert_eq!(text.len(), 10_100);
        let dfa = build("((0123456789)_?)*", Config::default());
        assert!(dfa.is_complete());
        assert!(dfa.full_match(&text));
        assert!(!dfa.full_match("0123456789x"));
    }

    #[test]
    fn pathological_optionals_run_linear() {
        let text = "a".repeat(1024);
        let dfa = build("(a?){512}a{512}", Config::default());
        assert!(dfa.is_complete());
        assert!(dfa.full_match(&text));
        assert!(!dfa.full_match(&"a".repeat(1025)));
        assert!(dfa.full_match(&"a".repeat(512)));
        assert!(!dfa.full_match(&"a".repeat(511)));
    }

    #[test]
    fn scattered_required_bytes() {
        let text = format!("{}{}", "a".repeat(1024), "b".repeat(10));
        let dfa = build(".*b.{8}b", Config::default());
        assert!(dfa.is_complete());
        assert!(dfa.full_match(&text));
        assert!(!dfa.full_match(&"a".repeat(1024)));
    }

    #[test]
    fn transitions_stay_in_range() {
        let dfa = build("(ab|cd)*e[f-h]+", Config::default());
        for id in 0..dfa.state_len() {
            assert_eq!(dfa.state(id as StateId).id, id as StateId);
            for c in 0..=255u8 {
                let t = dfa.transition(id as StateId, c);
                assert!(t == REJECT || (t as usize) < dfa.state_len());
            }
        }
    }

    #[test]
    fn adjacency_is_symmetric() {
        let dfa = build("(ab|cd)*e[f-h]+", Config::default());
        for id in 0..dfa.state_len() as StateId {
            for &d in &dfa.state(id).dst_states {
                if d != REJECT {
                    assert!(dfa.state(d).src_states.contains(&id));
                }
            }
            for &s in &dfa.state(id).src_states {
                assert!(dfa.state(s).dst_states.contains(&id));
            }
        }
    }

    #[test]
    fn state_limit_leaves_table_incomplete() {
        let config = Config::builder().state_limit(2).build();
        let dfa = build("abc|abd", config);
        assert!(!dfa.is_complete());
        assert!(dfa.state_len() <= 2);
    }

    #[test]
    fn reverse_walk_reads_backwards() {
        let config = Config::builder().reverse_match(true).build();
        let dfa = build("cba", config);
        assert!(dfa.full_match("abc"));
        assert!(!dfa.full_match("cba"));
    }

    #[test]
    fn line_anchors_collapse_on_the_delimiter() {
        let dfa = build("^foo$", Config::default());
        assert!(dfa.full_match("foo"));
        assert!(!dfa.full_match("foo\nbar"));
        // the first line alone is a prefix match
        assert_eq!(dfa.search("foo\nbar"), Some(Match::new(0, 4)));
    }

    #[test]
    fn shortest_match_stops_at_first_accept() {
        let config = Config::builder().shortest_match(true).build();
        let dfa = build("a+", config);
        assert_eq!(dfa.search("aaaa"), Some(Match::new(0, 1)));
    }

    #[test]
    fn longest_match_reports_last_accept() {
        let config = Config::builder().longest_match(true).build();
        let dfa = build("a+", config);
        assert_eq!(dfa.search("aaab"), Some(Match::new(0, 3)));
        assert_eq!(dfa.search("baaa"), None);
    }

    #[test]
    fn suffix_match_reports_whole_input() {
        let config = Config::builder().suffix_match(true).build();
        let dfa = build("a+", config);
        assert_eq!(dfa.search("aaaa"), Some(Match::new(0, 4)));
        assert_eq!(dfa.search("aaab"), None);
    }

    #[test]
    fn reverse_search_reports_begin_bound() {
        let config = Config::builder().reverse_match(true).build();
        let dfa = build("ba", config);
        // the cursor walks "xxab" from the right: b, then a
        assert_eq!(dfa.search("xxab"), Some(Match::new(2, 4)));
    }

    #[test]
    fn intersection_requires_both_languages() {
        let tree = ExprInfo::intersection("[ab]*a[ab]*", "[ab]*b[ab]*").unwrap();
        let dfa = Dfa::new(Arc::new(tree), Config::default());
        assert!(dfa.full_match("ab"));
        assert!(dfa.full_match("ba"));
        assert!(!dfa.full_match("aa"));
        assert!(!dfa.full_match("b"));
        assert!(!dfa.full_match(""));
    }

    #[test]
    fn exclusive_or_requires_exactly_one() {
        let tree = ExprInfo::exclusive_or("a*", "b*").unwrap();
        let dfa = Dfa::new(Arc::new(tree), Config::default());
        assert!(dfa.full_match("a"));
        assert!(dfa.full_match("bb"));
        // the empty string is in both languages
        assert!(!dfa.full_match(""));
        assert!(!dfa.full_match("ab"));
    }

    #[test]
    fn nfa_subset_construction() {
        // (a|b)*ab
        let mut nfa = Nfa::new();
        let s0 = nfa.add_state();
        let s1 = nfa.add_state();
        let s2 = nfa.add_state();
        nfa.add_start(s0);
        nfa.add_transition(s0, b'a', s0);
        nfa.add_transition(s0, b'b', s0);
        nfa.add_transition(s0, b'a', s1);
        nfa.add_transition(s1, b'b', s2);
        nfa.set_accept(s2);

        let dfa = Dfa::from_nfa(&nfa, Config::default());
        assert!(dfa.is_complete());
        assert!(dfa.full_match("ab"));
        assert!(dfa.full_match("bbaab"));
        assert!(!dfa.full_match("aba"));
        assert!(!dfa.full_match(""));
    }
}
