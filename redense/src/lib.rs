/*!
A byte-level regular expression engine built on dense DFAs.

A pattern is parsed (with [`regex-syntax`]) into an arena of positions, then
determinized into a dense table-driven DFA by a subset construction extended
with line-anchor pseudo-states and language operators (intersection,
exclusive-or). On top of the table sit minimization, in-place
complementation, and a two-level optimizer feeding a threaded-code back end:
`O2` collapses 256-entry transition rows into compact two-way branches, `O3`
chains linear runs of states into straight-line code. Matching consumes a
contiguous byte range in a single pass; patterns that blow up backtrackers
run in linear time here.

[`regex-syntax`]: https://docs.rs/regex-syntax/

## Usage

```
use redense::Regex;

let re = Regex::new("(a?){512}a{512}")?;
assert!(re.is_match("a".repeat(1024)));
assert!(!re.is_match("a".repeat(1025)));

# Ok::<(), redense::BuildError>(())
```

Matching is whole-haystack by default; [`Regex::find`] runs the flag-driven
search configured through [`Config`] (shortest/longest/suffix/reverse
matching, line delimiter, state limit):

```
use redense::{Config, OptLevel, Regex};

let re = Regex::builder()
    .configure(Config::builder().shortest_match(true).build())
    .optimize(OptLevel::O2)
    .build("a+")?;
assert_eq!(re.find("aaaa").map(|m| m.range()), Some(0..1));

# Ok::<(), redense::BuildError>(())
```

## Language combinators

Beyond the usual syntax, two whole-language combinators are available:

```
use redense::Regex;

// strings over {a,b} containing both letters
let re = Regex::intersection("[ab]*a[ab]*", "[ab]*b[ab]*")?;
assert!(re.is_match("ba"));
assert!(!re.is_match("aaa"));

# Ok::<(), redense::BuildError>(())
```

## Lower-level access

The [`dfa`] module exposes the automaton itself (construction from
positions or from a hand-built [`nfa::Nfa`], minimization, complementation,
compilation) for callers that want to drive it directly.
*/

pub mod dfa;
pub mod expr;
mod matches;
pub mod nfa;
mod regex;

pub use crate::{
    dfa::{Config, Dfa, OptLevel},
    expr::{BuildError, ExprInfo},
    matches::Match,
    regex::{Builder, Regex},
};
