/*!
The threaded-code back end.

[`Dfa::compile`] lowers the automaton into a flat program: a shared reject
tail, an optional quick filter, then one handler per state in ascending id
order, followed by a backpatched transition-address table (`N * 256` op
addresses, row-major). The op set mirrors machine-level handler code, one
instruction group per op (byte test with a branch polarity, bulk cursor
advance, indirect jump through the table), so the O2 alternate transitions
and O3 inline chains lower without losing their shape.

The run loop executes ops until a return, carrying the cursor, the stop
bound, and the stashed match bound. Reverse matching flips the step sign and
walks the haystack from its last byte.
*/

use super::{cursor_bounds, Dfa, OptLevel, StateId, REJECT, UNDEF};

type Addr = u32;

#[derive(Clone, Copy, Debug)]
enum Op {
    /// Record the cursor as the match bound.
    Stash,
    /// Leave the run loop.
    Ret { state: StateId },
    /// Step the cursor `adv` times and jump.
    Goto { adv: u8, target: Addr },
    /// Jump when fewer than `need` bytes remain.
    JmpIfShort { need: u32, target: Addr },
    /// Test the byte at `cursor + offset * sign` against `lo..=hi`, step the
    /// cursor `adv` times, then jump when the outcome equals `taken`.
    Branch { offset: u8, adv: u8, lo: u8, hi: u8, taken: bool, target: Addr },
    /// Load the byte under the cursor, step once, and jump through the
    /// transition-address table row of `state`.
    Table { state: StateId },
    /// Quick filter: skip ahead by the filter distance and dispatch on the
    /// probed byte.
    FilterProbe,
    /// Quick filter: undo the speculative skip and resume at the reset
    /// state.
    FilterRewind { target: Addr },
}

fn set_target(op: &mut Op, addr: Addr) {
    match op {
        Op::Goto { target, .. }
        | Op::JmpIfShort { target, .. }
        | Op::Branch { target, .. }
        | Op::FilterRewind { target } => *target = addr,
        _ => unreachable!("patching a non-jump op"),
    }
}

struct Filter {
    skip: isize,
    dispatch: Box<[Addr; 256]>,
}

pub(crate) struct Program {
    code: Vec<Op>,
    entries: Vec<Addr>,
    table: Vec<Addr>,
    filter: Option<Filter>,
    reject: Addr,
    reverse: bool,
}

impl Program {
    pub(crate) fn emit(dfa: &Dfa) -> Program {
        let n = dfa.state_len();
        let mut code: Vec<Op> = Vec::new();
        let mut entries: Vec<Addr> = vec![0; n];
        // forward references to state handlers, resolved once every handler
        // has an address
        let mut fixups: Vec<(usize, StateId)> = Vec::new();

        let reject = code.len() as Addr;
        code.push(Op::Ret { state: REJECT });

        let mut filter = None;
        let mut filter_entry = 0;
        let mut reset_state = UNDEF;
        if let Some(tree) = dfa.tree() {
            if dfa.config().filtered_match
                && tree.involve().count() < 126
                && tree.min_length() > 2
            {
                let skip = (tree.min_length() - 1) as isize;
                filter_entry = code.len() as Addr;
                code.push(Op::FilterProbe);
                let rewind = code.len();
                code.push(Op::FilterRewind { target: 0 });
                let mut dispatch = Box::new([0 as Addr; 256]);
                for c in 0..256usize {
                    if tree.involve().contains(c as u8) {
                        dispatch[c] = rewind as Addr;
                    } else {
                        if reset_state == UNDEF {
                            reset_state = dfa.transition(0, c as u8);
                        }
                        dispatch[c] = filter_entry;
                    }
                }
                fixups.push((rewind, reset_state));
                filter = Some(Filter { skip, dispatch });
            }
        }

        for id in 0..n as StateId {
            Self::emit_state(dfa, id, &mut code, &mut entries, &mut fixups);
        }

        for (at, state) in fixups {
            let addr = if state == REJECT { reject } else { entries[state as usize] };
            set_target(&mut code[at], addr);
        }

        let mut table = vec![0 as Addr; n * 256];
        for id in 0..n {
            for c in 0..256usize {
                let next = dfa.transition(id as StateId, c as u8);
                debug_assert!(next != UNDEF);
                table[id * 256 + c] = if next == REJECT {
                    reject
                } else if filter.is_some() && next == reset_state {
                    filter_entry
                } else {
                    entries[next as usize]
                };
            }
        }

        Program {
            code,
            entries,
            table,
            filter,
            reject,
            reverse: dfa.config().reverse_match,
        }
    }

    fn emit_state(
        dfa: &Dfa,
        id: StateId,
        code: &mut Vec<Op>,
        entries: &mut [Addr],
        fixups: &mut Vec<(usize, StateId)>,
    ) {
        entries[id as usize] = code.len() as Addr;
        let state = dfa.state(id);

        if state.accept && !dfa.config().suffix_match {
            code.push(Op::Stash);
            if !dfa.config().longest_match {
                code.push(Op::Ret { state: id });
            }
        }

        if dfa.olevel() >= Some(OptLevel::O2) && state.alter.next1 != UNDEF {
            let inline_level =
                if dfa.olevel() == Some(OptLevel::O3) { state.inline_level } else { 0 };
            let inlining = inline_level != 0;

            let bounds_at = code.len();
            code.push(Op::JmpIfShort { need: (inline_level + 1) as u32, target: 0 });

            let mut chain = id;
            let mut depth = 0usize;
            loop {
                let at = dfa.state(chain).alter;
                debug_assert!(at.next1 != UNDEF, "inline chain without an alternate");
                let live = at.next1 != REJECT;
                if at.next2 == UNDEF {
                    // single uniform successor: no byte test needed
                    if inlining && depth < inline_level {
                        // interior of the chain; the byte is consumed by the
                        // bulk advance further down
                        chain = at.next1;
                        depth += 1;
                        continue;
                    }
                    let adv = if inlining { (depth + 1) as u8 } else { 1 };
                    fixups.push((code.len(), at.next1));
                    code.push(Op::Goto { adv, target: 0 });
                    break;
                }
                let (offset, adv) = if !inlining {
                    (0u8, 1u8)
                } else if depth == inline_level {
                    (depth as u8, (depth + 1) as u8)
                } else {
                    (depth as u8, 0u8)
                };
                let (lo, hi) = at.key;
                if depth == inline_level || !live {
                    fixups.push((code.len(), at.next1));
                    code.push(Op::Branch { offset, adv, lo, hi, taken: true, target: 0 });
                } else {
                    fixups.push((code.len(), REJECT));
                    code.push(Op::Branch { offset, adv, lo, hi, taken: false, target: 0 });
                }
                if depth == inline_level {
                    fixups.push((code.len(), at.next2));
                    code.push(Op::Goto { adv: 0, target: 0 });
                    break;
                }
                chain = if live { at.next1 } else { at.next2 };
                depth += 1;
            }

            // bounds-check fallback: return here, or finish the step through
            // the head's table row when the chain could not be entered whole
            let fallback = code.len() as Addr;
            set_target(&mut code[bounds_at], fallback);
            if inlining {
                let short_at = code.len();
                code.push(Op::JmpIfShort { need: 1, target: 0 });
                code.push(Op::Table { state: id });
                let target = code.len() as Addr;
                set_target(&mut code[short_at], target);
                code.push(Op::Ret { state: id });
            } else {
                code.push(Op::Ret { state: id });
            }
        } else {
            let short_at = code.len();
            code.push(Op::JmpIfShort { need: 1, target: 0 });
            code.push(Op::Table { state: id });
            let target = code.len() as Addr;
            set_target(&mut code[short_at], target);
            code.push(Op::Ret { state: id });
        }
    }

    /// Executes the program. Returns the final state (possibly [`REJECT`])
    /// and the stashed match bound.
    pub(crate) fn run(&self, h: &[u8]) -> (StateId, Option<isize>) {
        let sign: isize = if self.reverse { -1 } else { 1 };
        let (mut cur, stop) = cursor_bounds(h.len(), self.reverse);
        let remaining =
            |cur: isize| if self.reverse { cur - stop } else { stop - cur };
        let mut stash: Option<isize> = None;
        let mut pc = self.entries[0] as usize;
        loop {
            match self.code[pc] {
                Op::Stash => {
                    stash = Some(cur);
                    pc += 1;
                }
                Op::Ret { state } => return (state, stash),
                Op::Goto { adv, target } => {
                    cur += adv as isize * sign;
                    pc = target as usize;
                }
                Op::JmpIfShort { need, target } => {
                    if remaining(cur) < need as isize {
                        pc = target as usize;
                    } else {
                        pc += 1;
                    }
                }
                Op::Branch { offset, adv, lo, hi, taken, target } => {
                    let byte = h[(cur + offset as isize * sign) as usize];
                    cur += adv as isize * sign;
                    let hit = lo <= byte && byte <= hi;
                    if hit == taken {
                        pc = target as usize;
                    } else {
                        pc += 1;
                    }
                }
                Op::Table { state } => {
                    let byte = h[cur as usize];
                    cur += sign;
                    pc = self.table[state as usize * 256 + byte as usize] as usize;
                }
                Op::FilterProbe => {
                    let filter =
                        self.filter.as_ref().expect("filter op without a filter");
                    cur += filter.skip * sign;
                    if remaining(cur) < 1 {
                        pc = self.reject as usize;
                        continue;
                    }
                    pc = filter.dispatch[h[cur as usize] as usize] as usize;
                }
                Op::FilterRewind { target } => {
                    let filter =
                        self.filter.as_ref().expect("filter op without a filter");
                    cur -= filter.skip * sign;
                    pc = target as usize;
                }
            }
        }
    }
}
