/*!
Lowering from the `regex-syntax` HIR to positions.

Berry-Sethi construction: every byte-consuming HIR leaf becomes one position,
repetitions are expanded by recompiling the sub-expression, and follow sets
are wired while folding concatenations, alternations and loops. The pattern
is terminated with the end-of-pattern sentinel so acceptance becomes a
membership test.
*/

use std::{collections::BTreeSet, fmt};

use regex_syntax::{
    hir::{self, Class, Hir, HirKind, Look},
    ParserBuilder,
};

use super::{AnchorKind, ByteSet, ExprInfo, Node, NodeId, NodeKind, NodeSet, OperatorKind};

/// An error that occurred while turning a pattern into positions.
#[derive(Debug)]
pub struct BuildError {
    kind: ErrorKind,
}

#[derive(Debug)]
enum ErrorKind {
    Parse(Box<regex_syntax::Error>),
    Unsupported(&'static str),
}

impl BuildError {
    fn unsupported(what: &'static str) -> BuildError {
        BuildError { kind: ErrorKind::Unsupported(what) }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Parse(err) => err.fmt(f),
            ErrorKind::Unsupported(what) => {
                write!(f, "unsupported pattern construct: {}", what)
            }
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Parse(err) => Some(err.as_ref()),
            ErrorKind::Unsupported(_) => None,
        }
    }
}

impl From<regex_syntax::Error> for BuildError {
    fn from(err: regex_syntax::Error) -> BuildError {
        BuildError { kind: ErrorKind::Parse(Box::new(err)) }
    }
}

fn parse_hir(pattern: &str) -> Result<Hir, BuildError> {
    // Byte-oriented engine: transitions range over the 256 byte values, so
    // Unicode mode stays off and non-UTF-8 haystacks are fair game.
    let mut parser = ParserBuilder::new().unicode(false).utf8(false).build();
    Ok(parser.parse(pattern)?)
}

pub(super) fn parse(pattern: &str) -> Result<ExprInfo, BuildError> {
    let hir = parse_hir(pattern)?;
    let mut compiler = Compiler::new();
    let root = compiler.hir(&hir)?;
    Ok(compiler.finish(root))
}

pub(super) fn combine(
    p1: &str,
    p2: &str,
    kind: OperatorKind,
) -> Result<ExprInfo, BuildError> {
    let hir1 = parse_hir(p1)?;
    let hir2 = parse_hir(p2)?;
    let mut compiler = Compiler::new();
    let a = compiler.hir(&hir1)?;
    let b = compiler.hir(&hir2)?;
    let root = compiler.operator_pair(a, b, kind);
    Ok(compiler.finish(root))
}

/// The first/last/nullable summary of a compiled sub-expression.
#[derive(Clone, Debug)]
struct Frag {
    first: BTreeSet<NodeId>,
    last: BTreeSet<NodeId>,
    nullable: bool,
    min_length: usize,
}

impl Frag {
    fn empty() -> Frag {
        Frag { first: BTreeSet::new(), last: BTreeSet::new(), nullable: true, min_length: 0 }
    }
}

struct Compiler {
    kinds: Vec<NodeKind>,
    follow: Vec<BTreeSet<NodeId>>,
    involve: ByteSet,
    shared: u32,
}

impl Compiler {
    fn new() -> Compiler {
        Compiler { kinds: Vec::new(), follow: Vec::new(), involve: ByteSet::EMPTY, shared: 0 }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = self.kinds.len() as NodeId;
        self.kinds.push(kind);
        self.follow.push(BTreeSet::new());
        id
    }

    fn leaf(&mut self, kind: NodeKind, min_length: usize) -> Frag {
        let id = self.push(kind);
        Frag {
            first: BTreeSet::from([id]),
            last: BTreeSet::from([id]),
            nullable: false,
            min_length,
        }
    }

    fn connect(&mut self, from: &BTreeSet<NodeId>, to: &BTreeSet<NodeId>) {
        for &f in from {
            self.follow[f as usize].extend(to.iter().copied());
        }
    }

    fn concat(&mut self, a: Frag, b: Frag) -> Frag {
        self.connect(&a.last, &b.first);
        let mut first = a.first;
        if a.nullable {
            first.extend(b.first.iter().copied());
        }
        let mut last = b.last;
        if b.nullable {
            last.extend(a.last.iter().copied());
        }
        Frag {
            first,
            last,
            nullable: a.nullable && b.nullable,
            min_length: a.min_length + b.min_length,
        }
    }

    fn alternate(&mut self, mut a: Frag, b: Frag) -> Frag {
        a.first.extend(b.first.iter().copied());
        a.last.extend(b.last.iter().copied());
        Frag {
            first: a.first,
            last: a.last,
            nullable: a.nullable || b.nullable,
            min_length: a.min_length.min(b.min_length),
        }
    }

    fn star(&mut self, mut f: Frag) -> Frag {
        self.connect(&f.last, &f.first);
        f.nullable = true;
        f.min_length = 0;
        f
    }

    fn plus(&mut self, f: Frag) -> Frag {
        self.connect(&f.last, &f.first);
        f
    }

    fn hir(&mut self, hir: &Hir) -> Result<Frag, BuildError> {
        match hir.kind() {
            HirKind::Empty => Ok(Frag::empty()),
            HirKind::Literal(hir::Literal(bytes)) => {
                let mut acc = Frag::empty();
                for &b in bytes.iter() {
                    self.involve.insert(b);
                    let leaf = self.leaf(NodeKind::Literal(b), 1);
                    acc = self.concat(acc, leaf);
                }
                Ok(acc)
            }
            HirKind::Class(Class::Bytes(class)) => {
                let mut set = ByteSet::EMPTY;
                for range in class.ranges() {
                    set.insert_range(range.start(), range.end());
                }
                if set.is_full() {
                    // a true wildcard; deliberately kept out of `involve` so
                    // that the quick filter can treat it as "anything goes"
                    Ok(self.leaf(NodeKind::Dot, 1))
                } else {
                    for b in 0..=255u8 {
                        if set.contains(b) {
                            self.involve.insert(b);
                        }
                    }
                    Ok(self.leaf(NodeKind::Class(set), 1))
                }
            }
            HirKind::Class(Class::Unicode(_)) => {
                Err(BuildError::unsupported("Unicode character class"))
            }
            HirKind::Look(look) => match look {
                Look::Start | Look::StartLF | Look::StartCRLF => {
                    Ok(self.leaf(NodeKind::Anchor(AnchorKind::BegLine), 0))
                }
                Look::End | Look::EndLF | Look::EndCRLF => {
                    Ok(self.leaf(NodeKind::Anchor(AnchorKind::EndLine), 0))
                }
                _ => Err(BuildError::unsupported("look-around assertion")),
            },
            HirKind::Repetition(rep) => self.repetition(rep),
            HirKind::Capture(capture) => self.hir(&capture.sub),
            HirKind::Concat(subs) => {
                let mut acc = Frag::empty();
                for sub in subs {
                    let frag = self.hir(sub)?;
                    acc = self.concat(acc, frag);
                }
                Ok(acc)
            }
            HirKind::Alternation(subs) => {
                let mut acc: Option<Frag> = None;
                for sub in subs {
                    let frag = self.hir(sub)?;
                    acc = Some(match acc {
                        Some(prev) => self.alternate(prev, frag),
                        None => frag,
                    });
                }
                Ok(acc.unwrap_or_else(Frag::empty))
            }
        }
    }

    /// Bounded repetitions are expanded by recompiling the sub-expression;
    /// each copy gets fresh positions.
    fn repetition(&mut self, rep: &hir::Repetition) -> Result<Frag, BuildError> {
        let min = rep.min as usize;
        let mut acc = Frag::empty();
        match rep.max {
            Some(max) => {
                let max = max as usize;
                for _ in 0..min {
                    let frag = self.hir(&rep.sub)?;
                    acc = self.concat(acc, frag);
                }
                for _ in min..max {
                    let mut frag = self.hir(&rep.sub)?;
                    frag.nullable = true;
                    frag.min_length = 0;
                    acc = self.concat(acc, frag);
                }
            }
            None => {
                if min == 0 {
                    let frag = self.hir(&rep.sub)?;
                    let frag = self.star(frag);
                    acc = self.concat(acc, frag);
                } else {
                    for _ in 0..min - 1 {
                        let frag = self.hir(&rep.sub)?;
                        acc = self.concat(acc, frag);
                    }
                    let frag = self.hir(&rep.sub)?;
                    let frag = self.plus(frag);
                    acc = self.concat(acc, frag);
                }
            }
        }
        Ok(acc)
    }

    /// Joins two sub-languages through an operator pair. Each side is sealed
    /// with one partner position, so a subject completing a side deposits
    /// that partner into the subset; the closure in
    /// [`ExprInfo::expand`](super::ExprInfo::expand) then decides whether
    /// the continuation (here: acceptance) is reachable.
    fn operator_pair(&mut self, a: Frag, b: Frag, kind: OperatorKind) -> Frag {
        let shared = self.shared;
        self.shared += 1;
        let op_a = self.push(NodeKind::Operator { kind, pair: 0, shared });
        let op_b = self.push(NodeKind::Operator { kind, pair: op_a, shared });
        if let NodeKind::Operator { pair, .. } = &mut self.kinds[op_a as usize] {
            *pair = op_b;
        }
        let min_length = match kind {
            OperatorKind::Intersection => a.min_length.max(b.min_length),
            OperatorKind::Xor => a.min_length.min(b.min_length),
        };
        let a = self.seal(a, op_a);
        let b = self.seal(b, op_b);
        let mut root = self.alternate(a, b);
        root.min_length = min_length;
        root
    }

    fn seal(&mut self, f: Frag, op: NodeId) -> Frag {
        let ops = BTreeSet::from([op]);
        self.connect(&f.last, &ops);
        let mut first = f.first;
        if f.nullable {
            first.insert(op);
        }
        Frag { first, last: ops, nullable: false, min_length: f.min_length }
    }

    fn finish(mut self, root: Frag) -> ExprInfo {
        let eop = self.push(NodeKind::Eop);
        let eop_set = BTreeSet::from([eop]);
        self.connect(&root.last, &eop_set);

        let width = self.kinds.len();
        let nodes = self
            .kinds
            .into_iter()
            .zip(self.follow)
            .map(|(kind, follow)| {
                let mut set = NodeSet::empty(width);
                for id in follow {
                    set.insert(id);
                }
                Node { kind, follow: set }
            })
            .collect();

        let mut first = NodeSet::empty(width);
        for id in root.first {
            first.insert(id);
        }
        if root.nullable {
            first.insert(eop);
        }

        ExprInfo {
            nodes,
            first,
            eop,
            min_length: root.min_length,
            involve: self.involve,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ExprInfo, NodeKind, OperatorKind};

    #[test]
    fn repetitions_expand_into_fresh_positions() {
        let info = ExprInfo::parse("(a?){3}a{3}").unwrap();
        // six literal positions plus the sentinel
        assert_eq!(info.width(), 7);
        assert_eq!(info.min_length(), 3);
    }

    #[test]
    fn unbounded_repetition_loops_the_tail_copy() {
        let info = ExprInfo::parse("a{2,}").unwrap();
        assert_eq!(info.width(), 3);
        assert_eq!(info.min_length(), 2);
        // the tail copy follows itself
        assert!(info.nodes[1].follow.contains(1));
        assert!(!info.nodes[0].follow.contains(0));
    }

    #[test]
    fn dotall_wildcard_stays_out_of_involve() {
        let info = ExprInfo::parse(r"(?s:.)*abc").unwrap();
        assert_eq!(info.involve().count(), 3);
        assert_eq!(info.min_length(), 3);
        assert!(matches!(info.nodes[0].kind, NodeKind::Dot));
    }

    #[test]
    fn plain_dot_is_a_class() {
        let info = ExprInfo::parse("a.c").unwrap();
        assert!(matches!(info.nodes[1].kind, NodeKind::Class(_)));
        // everything but the line feed
        assert_eq!(info.involve().count(), 255);
    }

    #[test]
    fn word_boundary_is_rejected() {
        assert!(ExprInfo::parse(r"\bfoo").is_err());
        assert!(ExprInfo::parse("(").is_err());
    }

    #[test]
    fn operator_pairs_are_reflexive() {
        let info = ExprInfo::intersection("ab", "a.").unwrap();
        let ops: Vec<_> = info
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(id, node)| match node.kind {
                NodeKind::Operator { kind, pair, shared } => Some((id as u32, kind, pair, shared)),
                _ => None,
            })
            .collect();
        assert_eq!(ops.len(), 2);
        let (id_a, kind_a, pair_a, shared_a) = ops[0];
        let (id_b, kind_b, pair_b, shared_b) = ops[1];
        assert_eq!(kind_a, OperatorKind::Intersection);
        assert_eq!(kind_a, kind_b);
        assert_eq!(pair_a, id_b);
        assert_eq!(pair_b, id_a);
        assert_eq!(shared_a, shared_b);
    }
}
