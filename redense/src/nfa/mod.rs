/*!
An externally prepared non-deterministic finite automaton.

This is the second doorway into the engine: instead of a pattern, a caller
may hand over a plain NFA (per-byte transition sets, accept flags, a set of
start states) and have it determinized with
[`Dfa::from_nfa`](crate::dfa::Dfa::from_nfa). No anchors or language
operators exist on this path; the construction is the classical subset
construction.
*/

use std::collections::BTreeSet;

/// The id of an NFA state.
pub type NfaStateId = u32;

#[derive(Clone, Debug)]
pub(crate) struct State {
    pub(crate) transitions: Vec<BTreeSet<NfaStateId>>,
    pub(crate) accept: bool,
}

/// A byte-oriented NFA, built state by state.
///
/// # Example
///
/// ```
/// use redense::nfa::Nfa;
///
/// // an automaton for (a|b)*ab
/// let mut nfa = Nfa::new();
/// let s0 = nfa.add_state();
/// let s1 = nfa.add_state();
/// let s2 = nfa.add_state();
/// nfa.add_start(s0);
/// nfa.add_transition(s0, b'a', s0);
/// nfa.add_transition(s0, b'b', s0);
/// nfa.add_transition(s0, b'a', s1);
/// nfa.add_transition(s1, b'b', s2);
/// nfa.set_accept(s2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Nfa {
    states: Vec<State>,
    start: BTreeSet<NfaStateId>,
}

impl Nfa {
    pub fn new() -> Nfa {
        Nfa::default()
    }

    pub fn add_state(&mut self) -> NfaStateId {
        let id = self.states.len() as NfaStateId;
        self.states.push(State {
            transitions: vec![BTreeSet::new(); 256],
            accept: false,
        });
        id
    }

    pub fn add_transition(&mut self, from: NfaStateId, byte: u8, to: NfaStateId) {
        self.states[from as usize].transitions[byte as usize].insert(to);
    }

    pub fn set_accept(&mut self, id: NfaStateId) {
        self.states[id as usize].accept = true;
    }

    pub fn add_start(&mut self, id: NfaStateId) {
        self.start.insert(id);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub(crate) fn states(&self) -> &[State] {
        &self.states
    }

    pub(crate) fn start_states(&self) -> &BTreeSet<NfaStateId> {
        &self.start
    }
}
