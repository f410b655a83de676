//! Composition of recognizers.
//!
//! A [`Gesture`] is a tree. Leaves are recognizers; inner nodes say how
//! their children relate:
//!
//! - **Simultaneous**: children may be active at the same time.
//! - **Exclusive**: at most one child activates; earlier children have
//!   priority and later ones wait for them to fail.
//! - **Prioritized**: exclusive with explicit priorities. Children with
//!   equal priority have no wait edge between them, so if both claim in the
//!   same round the tie is broken by declaration order.
//!
//! Compiling the tree yields a flat member list plus two relations: which
//! pairs are exclusive and which members wait for which.

use std::collections::{HashMap, HashSet};

use super::recognizer::Recognizer;
use crate::error::{MotiveError, Result};

pub enum Gesture {
    Recognizer(Recognizer),
    Simultaneous(Vec<Gesture>),
    Exclusive(Vec<Gesture>),
    Prioritized(Vec<(i32, Gesture)>),
    /// `waiter` may only activate once `blocker` has failed.
    RequireToFail {
        inner: Box<Gesture>,
        waiter: String,
        blocker: String,
    },
}

impl From<Recognizer> for Gesture {
    fn from(recognizer: Recognizer) -> Self {
        Gesture::Recognizer(recognizer)
    }
}

impl Gesture {
    pub fn simultaneous<I, G>(children: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<Gesture>,
    {
        Gesture::Simultaneous(children.into_iter().map(Into::into).collect())
    }

    /// Children in priority order, highest first.
    pub fn exclusive<I, G>(children: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<Gesture>,
    {
        Gesture::Exclusive(children.into_iter().map(Into::into).collect())
    }

    /// Children with explicit priorities; higher wins.
    pub fn exclusive_by_priority<I, G>(children: I) -> Self
    where
        I: IntoIterator<Item = (i32, G)>,
        G: Into<Gesture>,
    {
        Gesture::Prioritized(children.into_iter().map(|(p, g)| (p, g.into())).collect())
    }

    /// Add a wait-for edge between two tagged recognizers anywhere in the
    /// tree. Unknown tags are reported when the bridge is built.
    pub fn require_to_fail(self, waiter: impl Into<String>, blocker: impl Into<String>) -> Self {
        Gesture::RequireToFail {
            inner: Box::new(self),
            waiter: waiter.into(),
            blocker: blocker.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GroupKind {
    Simultaneous,
    Exclusive,
    Prioritized,
}

/// One step on the path from the root to a leaf.
#[derive(Clone, Copy, Debug)]
struct Step {
    group: usize,
    kind: GroupKind,
    child: usize,
    priority: i32,
}

/// Flattened composition.
pub(crate) struct Plan {
    pub members: Vec<(String, Recognizer)>,
    /// `exclusive[i][j]`: at most one of `i` and `j` may activate.
    pub exclusive: Vec<Vec<bool>>,
    /// `waits_for[i]`: members that must fail before `i` may activate.
    pub waits_for: Vec<Vec<usize>>,
}

impl Plan {
    pub(crate) fn compile(root: Gesture) -> Result<Self> {
        let mut leaves = Vec::new();
        let mut edges = Vec::new();
        let mut next_group = 0;
        flatten(root, &mut Vec::new(), &mut next_group, &mut leaves, &mut edges);

        let n = leaves.len();
        let mut members = Vec::with_capacity(n);
        let mut paths = Vec::with_capacity(n);
        let mut index_of = HashMap::new();
        for (i, (path, recognizer)) in leaves.into_iter().enumerate() {
            let tag = recognizer
                .tag
                .clone()
                .unwrap_or_else(|| format!("{}#{i}", recognizer.kind.name()));
            if index_of.insert(tag.clone(), i).is_some() {
                return Err(MotiveError::invalid(
                    "gesture",
                    format!("duplicate recognizer tag `{tag}`"),
                ));
            }
            members.push((tag, recognizer));
            paths.push(path);
        }

        let mut exclusive = vec![vec![false; n]; n];
        let mut waits_for: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in 0..n {
            for j in (i + 1)..n {
                let Some((a, b)) = split(&paths[i], &paths[j]) else {
                    continue;
                };
                match a.kind {
                    GroupKind::Simultaneous => {}
                    GroupKind::Exclusive => {
                        exclusive[i][j] = true;
                        exclusive[j][i] = true;
                        waits_for[j].push(i);
                    }
                    GroupKind::Prioritized => {
                        exclusive[i][j] = true;
                        exclusive[j][i] = true;
                        if a.priority > b.priority {
                            waits_for[j].push(i);
                        } else if b.priority > a.priority {
                            waits_for[i].push(j);
                        }
                    }
                }
            }
        }

        for (i, (_, recognizer)) in members.iter().enumerate() {
            for blocker in &recognizer.requires_failure_of {
                edges.push((WaitEdge::Index(i), blocker.clone()));
            }
        }
        for (waiter, blocker) in edges {
            let i = match waiter {
                WaitEdge::Index(i) => i,
                WaitEdge::Tag(tag) => *index_of.get(&tag).ok_or_else(|| {
                    MotiveError::invalid(
                        "gesture",
                        format!("require_to_fail names unknown recognizer `{tag}`"),
                    )
                })?,
            };
            let tag = &members[i].0;
            let Some(&j) = index_of.get(&blocker) else {
                return Err(MotiveError::invalid(
                    "gesture",
                    format!("`{tag}` waits for unknown recognizer `{blocker}`"),
                ));
            };
            if j == i {
                return Err(MotiveError::invalid("gesture", format!("`{tag}` waits for itself")));
            }
            if !waits_for[i].contains(&j) {
                waits_for[i].push(j);
            }
        }

        if let Some(i) = find_wait_cycle(&waits_for) {
            return Err(MotiveError::invalid(
                "gesture",
                format!("wait-for edges form a cycle through `{}`", members[i].0),
            ));
        }

        Ok(Self {
            members,
            exclusive,
            waits_for,
        })
    }
}

enum WaitEdge {
    Index(usize),
    Tag(String),
}

fn flatten(
    gesture: Gesture,
    path: &mut Vec<Step>,
    next_group: &mut usize,
    out: &mut Vec<(Vec<Step>, Recognizer)>,
    edges: &mut Vec<(WaitEdge, String)>,
) {
    let (kind, children): (GroupKind, Vec<(i32, Gesture)>) = match gesture {
        Gesture::Recognizer(r) => {
            out.push((path.clone(), r));
            return;
        }
        Gesture::RequireToFail { inner, waiter, blocker } => {
            edges.push((WaitEdge::Tag(waiter), blocker));
            flatten(*inner, path, next_group, out, edges);
            return;
        }
        Gesture::Simultaneous(c) => (
            GroupKind::Simultaneous,
            c.into_iter().map(|g| (0, g)).collect(),
        ),
        Gesture::Exclusive(c) => (GroupKind::Exclusive, c.into_iter().map(|g| (0, g)).collect()),
        Gesture::Prioritized(c) => (GroupKind::Prioritized, c),
    };
    let group = *next_group;
    *next_group += 1;
    for (child, (priority, gesture)) in children.into_iter().enumerate() {
        path.push(Step {
            group,
            kind,
            child,
            priority,
        });
        flatten(gesture, path, next_group, out, edges);
        path.pop();
    }
}

/// The steps where two leaf paths diverge: same group, different children.
fn split(a: &[Step], b: &[Step]) -> Option<(Step, Step)> {
    a.iter()
        .zip(b.iter())
        .find(|(x, y)| x.group == y.group && x.child != y.child)
        .map(|(x, y)| (*x, *y))
}

fn find_wait_cycle(waits_for: &[Vec<usize>]) -> Option<usize> {
    fn visit(
        i: usize,
        waits_for: &[Vec<usize>],
        on_path: &mut HashSet<usize>,
        done: &mut HashSet<usize>,
    ) -> bool {
        if done.contains(&i) {
            return false;
        }
        if !on_path.insert(i) {
            return true;
        }
        let cyclic = waits_for[i].iter().any(|&j| visit(j, waits_for, on_path, done));
        on_path.remove(&i);
        done.insert(i);
        cyclic
    }

    let mut done = HashSet::new();
    (0..waits_for.len()).find(|&i| visit(i, waits_for, &mut HashSet::new(), &mut done))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::recognizer::{PanConfig, TapConfig};

    fn tap(tag: &str) -> Recognizer {
        Recognizer::tap(TapConfig::default()).unwrap().with_tag(tag)
    }

    #[test]
    fn exclusive_order_is_priority() {
        let plan = Plan::compile(Gesture::exclusive([tap("a"), tap("b"), tap("c")])).unwrap();
        assert!(plan.exclusive[0][2]);
        assert!(plan.waits_for[0].is_empty());
        assert_eq!(plan.waits_for[1], vec![0]);
        assert_eq!(plan.waits_for[2], vec![0, 1]);
    }

    #[test]
    fn nested_simultaneous_inside_exclusive() {
        let pan = Recognizer::pan(PanConfig::default()).unwrap().with_tag("pan");
        let plan = Plan::compile(Gesture::exclusive([
            Gesture::from(tap("double")),
            Gesture::simultaneous([tap("single"), pan]),
        ]))
        .unwrap();
        let single = 1;
        let pan = 2;
        assert!(!plan.exclusive[single][pan]);
        assert!(plan.exclusive[0][pan]);
        assert_eq!(plan.waits_for[pan], vec![0]);
    }

    #[test]
    fn equal_priorities_have_no_wait_edge() {
        let gesture = Gesture::exclusive_by_priority([(1, tap("a")), (1, tap("b")), (5, tap("c"))]);
        let plan = Plan::compile(gesture).unwrap();
        assert!(plan.exclusive[0][1]);
        assert!(plan.waits_for[1].is_empty());
        assert_eq!(plan.waits_for[0], vec![2]);
    }

    #[test]
    fn unknown_and_cyclic_edges_are_rejected() {
        let unknown = Gesture::simultaneous([tap("a"), tap("b")]).require_to_fail("a", "zzz");
        assert!(Plan::compile(unknown).is_err());

        let missing_waiter =
            Gesture::simultaneous([tap("a"), tap("b")]).require_to_fail("nope", "a");
        assert!(Plan::compile(missing_waiter).is_err());

        let cyclic = Gesture::simultaneous([tap("a"), tap("b")])
            .require_to_fail("a", "b")
            .require_to_fail("b", "a");
        assert!(Plan::compile(cyclic).is_err());

        let duplicate = Gesture::simultaneous([tap("a"), tap("a")]);
        assert!(Plan::compile(duplicate).is_err());
    }
}
