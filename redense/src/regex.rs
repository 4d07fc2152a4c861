/*!
The public pattern-facing surface: [`Regex`] and its [`Builder`].
*/

use std::{cell::RefCell, sync::Arc};

use crate::{
    dfa::{Config, Dfa, OptLevel},
    expr::{BuildError, ExprInfo},
    matches::Match,
};

/// A pattern compiled into a dense DFA.
///
/// A `Regex` decides whole-haystack membership with [`Regex::is_match`] and
/// runs the flag-driven prefix/suffix search with [`Regex::find`]. Matching
/// is byte-oriented: the haystack may be any byte slice.
///
/// # Example
///
/// ```
/// use redense::Regex;
///
/// let re = Regex::new("((0123456789)_?)*")?;
/// assert!(re.is_match("0123456789_0123456789_"));
/// assert!(!re.is_match("012345678"));
///
/// # Ok::<(), redense::BuildError>(())
/// ```
///
/// # Optimization levels
///
/// A fresh `Regex` walks its transition table directly. [`Regex::compile`]
/// (or [`Builder::optimize`]) lowers the table into a threaded-code program:
/// [`OptLevel::O2`] collapses eligible 256-entry rows into compact two-way
/// branches, [`OptLevel::O3`] additionally chains linear runs of states into
/// straight-line code. Results never depend on the level, only throughput
/// does.
///
/// ```
/// use redense::{Config, OptLevel, Regex};
///
/// let re = Regex::builder()
///     .configure(Config::builder().longest_match(true).build())
///     .optimize(OptLevel::O3)
///     .build("a+b")?;
/// assert_eq!(re.find("aaab").map(|m| m.range()), Some(0..4));
///
/// # Ok::<(), redense::BuildError>(())
/// ```
///
/// # Construction limits
///
/// Subset construction stops at [`Config`]'s `state_limit`. Past the limit
/// the `Regex` keeps matching (remaining states are built lazily during
/// searches, memoized across calls) but it is no longer `Sync` and cannot
/// be compiled or minimized. Raise the limit if that matters.
pub struct Regex {
    matcher: Matcher,
}

/// How a search executes: against the fully built table, or with on-the-fly
/// subset construction when the state limit was hit. Lazy matching mutates
/// the table, hence the cell.
enum Matcher {
    Table(Dfa),
    OnTheFly(RefCell<Dfa>),
}

impl Regex {
    /// Compiles a pattern with the default configuration.
    pub fn new(pattern: &str) -> Result<Regex, BuildError> {
        Builder::new().build(pattern)
    }

    /// Returns a builder for a non-default configuration.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Compiles the intersection of two patterns: a haystack matches when
    /// it is in both languages.
    ///
    /// ```
    /// use redense::Regex;
    ///
    /// let re = Regex::intersection("[ab]*a[ab]*", "[ab]*b[ab]*")?;
    /// assert!(re.is_match("ab"));
    /// assert!(!re.is_match("aa"));
    /// # Ok::<(), redense::BuildError>(())
    /// ```
    pub fn intersection(p1: &str, p2: &str) -> Result<Regex, BuildError> {
        Builder::new().build_intersection(p1, p2)
    }

    /// Compiles the exclusive-or of two patterns: a haystack matches when
    /// it is in exactly one of the two languages.
    pub fn exclusive_or(p1: &str, p2: &str) -> Result<Regex, BuildError> {
        Builder::new().build_exclusive_or(p1, p2)
    }

    /// Tests whether the whole haystack is accepted.
    pub fn is_match(&self, haystack: impl AsRef<[u8]>) -> bool {
        match &self.matcher {
            Matcher::Table(dfa) => dfa.full_match(haystack),
            Matcher::OnTheFly(dfa) => dfa.borrow_mut().on_the_fly_match(haystack),
        }
    }

    /// Runs the flag-driven search and reports the matched range.
    ///
    /// On a lazily built `Regex` this degrades to the whole-haystack test
    /// and reports the full range on success.
    pub fn find(&self, haystack: impl AsRef<[u8]>) -> Option<Match> {
        match &self.matcher {
            Matcher::Table(dfa) => dfa.search(haystack),
            Matcher::OnTheFly(dfa) => {
                let h = haystack.as_ref();
                dfa.borrow_mut()
                    .on_the_fly_match(h)
                    .then(|| Match::new(0, h.len()))
            }
        }
    }

    /// Raises the optimization level. No-op below the current level;
    /// `false` when construction was incomplete.
    pub fn compile(&mut self, level: OptLevel) -> bool {
        match &mut self.matcher {
            Matcher::Table(dfa) => dfa.compile(level),
            Matcher::OnTheFly(_) => false,
        }
    }

    /// Collapses indistinguishable states. `false` when construction was
    /// incomplete.
    pub fn minimize(&mut self) -> bool {
        match &mut self.matcher {
            Matcher::Table(dfa) => dfa.minimize(),
            Matcher::OnTheFly(_) => false,
        }
    }

    /// Complements the accepted language in place. `false` when
    /// construction was incomplete.
    pub fn complement(&mut self) -> bool {
        match &mut self.matcher {
            Matcher::Table(dfa) => dfa.complement(),
            Matcher::OnTheFly(_) => false,
        }
    }

    /// The number of materialized DFA states.
    pub fn state_len(&self) -> usize {
        match &self.matcher {
            Matcher::Table(dfa) => dfa.state_len(),
            Matcher::OnTheFly(dfa) => dfa.borrow().state_len(),
        }
    }

    /// Whether subset construction ran to completion.
    pub fn is_complete(&self) -> bool {
        matches!(self.matcher, Matcher::Table(_))
    }
}

/// Configures and builds a [`Regex`].
#[derive(Clone, Debug, Default)]
pub struct Builder {
    config: Config,
    optimize: Option<OptLevel>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder { config: Config::default(), optimize: None }
    }

    /// Replaces the match-time configuration.
    pub fn configure(mut self, config: Config) -> Builder {
        self.config = config;
        self
    }

    /// Compiles to threaded code at `level` right after construction.
    pub fn optimize(mut self, level: OptLevel) -> Builder {
        self.optimize = Some(level);
        self
    }

    pub fn build(self, pattern: &str) -> Result<Regex, BuildError> {
        Ok(self.build_from_expr(ExprInfo::parse(pattern)?))
    }

    pub fn build_intersection(self, p1: &str, p2: &str) -> Result<Regex, BuildError> {
        Ok(self.build_from_expr(ExprInfo::intersection(p1, p2)?))
    }

    pub fn build_exclusive_or(self, p1: &str, p2: &str) -> Result<Regex, BuildError> {
        Ok(self.build_from_expr(ExprInfo::exclusive_or(p1, p2)?))
    }

    /// Builds a [`Regex`] from already-compiled positions.
    pub fn build_from_expr(self, expr: ExprInfo) -> Regex {
        let mut dfa = Dfa::new(Arc::new(expr), self.config);
        let matcher = if dfa.is_complete() {
            if let Some(level) = self.optimize {
                dfa.compile(level);
            }
            Matcher::Table(dfa)
        } else {
            Matcher::OnTheFly(RefCell::new(dfa))
        };
        Regex { matcher }
    }
}

#[cfg(test)]
mod tests {
    use regex_automata::{meta, util::syntax, Input};

    use super::*;

    /// Whole-haystack oracle built on the ecosystem engine.
    fn oracle(pattern: &str) -> impl Fn(&str) -> bool {
        let re = meta::Regex::builder()
            .syntax(syntax::Config::new().unicode(false).utf8(false))
            .build(&format!("^(?:{})$", pattern))
            .unwrap();
        move |h: &str| re.is_match(Input::new(h))
    }

    #[test]
    fn agrees_with_the_ecosystem_engine() {
        let patterns = [
            "abc",
            "a|b",
            "(ab)*",
            "a*b+c?",
            "[0-9]{2,4}",
            "(foo|bar)baz",
            "a(bc|de)*f",
            "a[^b]c",
            "(a?){4}a{4}",
        ];
        let alphabet = ["a", "b", "c", "f", "0", "9", "x", "foo", "bar", "de"];
        for pattern in patterns {
            let expect = oracle(pattern);
            let re = Regex::new(pattern).unwrap();
            let mut inputs: Vec<String> = vec![String::new()];
            for piece in alphabet {
                let mut next = Vec::new();
                for input in &inputs {
                    next.push(format!("{input}{piece}"));
                }
                inputs.extend(next);
            }
            for input in &inputs {
                assert_eq!(
                    re.is_match(input),
                    expect(input),
                    "pattern {:?} input {:?}",
                    pattern,
                    input
                );
            }
        }
    }

    #[test]
    fn lazy_regex_matches_like_a_complete_one() {
        let config = Config::builder().state_limit(2).build();
        let lazy = Regex::builder().configure(config).build("(ab|cd)+x").unwrap();
        let full = Regex::new("(ab|cd)+x").unwrap();
        assert!(!lazy.is_complete());
        for input in ["abx", "cdx", "abcdx", "ab", "x", ""] {
            assert_eq!(lazy.is_match(input), full.is_match(input), "{:?}", input);
        }
        // lazily discovered states stick around
        let grown = lazy.state_len();
        lazy.is_match("abcdabx");
        assert!(lazy.state_len() >= grown);
    }

    #[test]
    fn lazy_regex_rejects_table_only_operations() {
        let config = Config::builder().state_limit(1).build();
        let mut lazy = Regex::builder().configure(config).build("abc|abd").unwrap();
        assert!(!lazy.compile(OptLevel::O2));
        assert!(!lazy.minimize());
        assert!(!lazy.complement());
    }

    #[test]
    fn first_line_only_for_anchored_multiline() {
        let re = Regex::new("^foo$").unwrap();
        assert!(re.is_match("foo"));
        assert!(!re.is_match("foo\nbar"));
        assert_eq!(re.find("foo\nbar").map(|m| m.range()), Some(0..4));
    }

    #[test]
    fn one_line_disables_delimiter_handling() {
        let config = Config::builder().one_line(true).build();
        let re = Regex::builder().configure(config).build("^foo$").unwrap();
        assert!(re.is_match("foo"));
        assert!(re.find("foo\nbar").is_none());
    }

    #[test]
    fn complemented_membership_flips() {
        let mut re = Regex::new("a|b").unwrap();
        assert!(re.complement());
        assert!(!re.is_match("a"));
        assert!(re.is_match("c"));
        assert!(re.is_match(""));
    }

    #[test]
    fn xor_of_overlapping_languages() {
        let re = Regex::exclusive_or("a*", "b*").unwrap();
        assert!(re.is_match("aa"));
        assert!(re.is_match("b"));
        assert!(!re.is_match(""));
        assert!(!re.is_match("ab"));
    }

    #[test]
    fn minimize_then_compile_round_trip() {
        let mut re = Regex::new("((0123456789)_?)*").unwrap();
        assert!(re.minimize());
        assert!(re.state_len() <= 20);
        assert!(re.compile(OptLevel::O3));
        assert!(re.is_match("0123456789_"));
        assert_eq!(
            re.find("0123456789_").map(|m| m.range()),
            Some(0..0)
        );
    }
}
