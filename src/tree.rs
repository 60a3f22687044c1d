//! Matcher trie indexing leaves (arrangements or occurrence counters) by
//! call shape.
//!
//! Nodes live in an arena and are addressed by index, so cloning a tree for a
//! child scope is a plain `Vec` copy. Each method has its own root; below it
//! depth 0 holds instance matchers, depth `k` the k-th argument matcher, and
//! the terminal matcher node's children are the leaves, in insertion order.

use std::collections::HashMap;

use crate::call_pattern::CallPattern;
use crate::context::CallContext;
use crate::matcher::Matcher;
use crate::method::MethodKey;

/// Direction of the matcher comparison at each depth during a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Stored and query matchers must be `equals`.
    Exact,
    /// Stored matcher must generalize the query (live-call resolution).
    Generalizing,
    /// Query matcher must generalize the stored one (introspection).
    Concretizing,
}

impl MatchMode {
    fn accepts(self, stored: &Matcher, query: &Matcher, ctx: &CallContext) -> bool {
        match self {
            MatchMode::Exact => stored.equals(query),
            MatchMode::Generalizing => stored.matches(query, ctx),
            MatchMode::Concretizing => query.matches(stored, ctx),
        }
    }
}

pub type NodeId = usize;

#[derive(Debug, Clone)]
enum NodeKind<L> {
    Root,
    Matcher(Matcher),
    Leaf(L),
}

#[derive(Debug, Clone)]
struct Node<L> {
    kind: NodeKind<L>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct MatcherTree<L> {
    nodes: Vec<Node<L>>,
    roots: HashMap<MethodKey, NodeId>,
    leaf_count: usize,
}

impl<L> Default for MatcherTree<L> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            roots: HashMap::new(),
            leaf_count: 0,
        }
    }
}

impl<L> MatcherTree<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    fn push(&mut self, kind: NodeKind<L>) -> NodeId {
        self.nodes.push(Node {
            kind,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn root_for(&mut self, method: MethodKey) -> NodeId {
        if let Some(&root) = self.roots.get(&method) {
            return root;
        }
        let root = self.push(NodeKind::Root);
        self.roots.insert(method, root);
        root
    }

    /// Walk (creating as needed) the exact path for `pattern` and return the
    /// terminal matcher node.
    fn terminal_for(&mut self, pattern: &CallPattern) -> NodeId {
        let mut node = self.root_for(pattern.method().key());
        for depth in 0..pattern.depth() {
            let wanted = pattern.matcher_at(depth);
            let existing = self.nodes[node].children.iter().copied().find(|&child| {
                matches!(&self.nodes[child].kind, NodeKind::Matcher(m) if m.equals(wanted))
            });
            node = match existing {
                Some(child) => child,
                None => {
                    let child = self.push(NodeKind::Matcher(wanted.clone()));
                    self.nodes[node].children.push(child);
                    child
                }
            };
        }
        node
    }

    /// Append `leaf` under the exact path of `pattern`. Patterns with
    /// identical matcher sequences share the path; their leaves keep
    /// insertion order.
    pub fn insert(&mut self, pattern: &CallPattern, leaf: L) -> NodeId {
        let terminal = self.terminal_for(pattern);
        let id = self.push(NodeKind::Leaf(leaf));
        self.nodes[terminal].children.push(id);
        self.leaf_count += 1;
        tracing::trace!(pattern = %pattern, nodes = self.nodes.len(), "tree insert");
        id
    }

    /// The first leaf on the exact path of `pattern`, created with `make` if
    /// the path has none yet.
    pub fn get_or_insert_with(&mut self, pattern: &CallPattern, make: impl FnOnce() -> L) -> &mut L {
        let terminal = self.terminal_for(pattern);
        let existing = self.nodes[terminal]
            .children
            .iter()
            .copied()
            .find(|&child| matches!(self.nodes[child].kind, NodeKind::Leaf(_)));
        let id = match existing {
            Some(id) => id,
            None => {
                let id = self.push(NodeKind::Leaf(make()));
                self.nodes[terminal].children.push(id);
                self.leaf_count += 1;
                id
            }
        };
        match &mut self.nodes[id].kind {
            NodeKind::Leaf(leaf) => leaf,
            _ => unreachable!("terminal children are always leaves"),
        }
    }

    /// All leaves reachable from the root of `pattern`'s method through
    /// children that are compatible with the pattern at every depth.
    pub fn query(&self, pattern: &CallPattern, mode: MatchMode, ctx: &CallContext) -> Vec<&L> {
        let mut out = Vec::new();
        if let Some(&root) = self.roots.get(&pattern.method().key()) {
            self.collect(root, 0, &mut out, &|depth, stored| {
                mode.accepts(stored, pattern.matcher_at(depth), ctx)
            });
        }
        tracing::trace!(pattern = %pattern, ?mode, found = out.len(), "tree query");
        out
    }

    /// Leaves of every method whose instance matcher is compatible with
    /// `instance`; arguments are unconstrained.
    pub fn query_instance(&self, instance: &Matcher, mode: MatchMode, ctx: &CallContext) -> Vec<&L> {
        let mut roots: Vec<_> = self.roots.values().copied().collect();
        roots.sort_unstable();
        let mut out = Vec::new();
        for root in roots {
            self.collect(root, 0, &mut out, &|depth, stored| {
                depth > 0 || mode.accepts(stored, instance, ctx)
            });
        }
        out
    }

    fn collect<'a>(
        &'a self,
        node: NodeId,
        depth: usize,
        out: &mut Vec<&'a L>,
        accept: &dyn Fn(usize, &Matcher) -> bool,
    ) {
        for &child in &self.nodes[node].children {
            match &self.nodes[child].kind {
                NodeKind::Leaf(leaf) => out.push(leaf),
                NodeKind::Matcher(m) => {
                    if accept(depth, m) {
                        self.collect(child, depth + 1, out, accept);
                    }
                }
                NodeKind::Root => {}
            }
        }
    }

    /// Every leaf, in insertion order.
    pub fn leaves(&self) -> impl Iterator<Item = &L> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::method::MethodInfo;
    use crate::value::{ObjectRef, TypeDesc, Value};

    fn setup() -> (Value, Arc<MethodInfo>) {
        let ty = TypeDesc::interface("ICalc", vec![]);
        let add = MethodInfo::builder(&ty, "add")
            .param("a", TypeDesc::int())
            .param("b", TypeDesc::int())
            .returns(TypeDesc::int())
            .build();
        (Value::Object(ObjectRef::labeled(ty, "calc")), add)
    }

    fn pattern(method: &Arc<MethodInfo>, instance: Matcher, args: Vec<Matcher>) -> CallPattern {
        CallPattern::new(method.clone(), instance, args).unwrap()
    }

    #[test]
    fn identical_patterns_share_path_and_keep_order() {
        let (obj, add) = setup();
        let mut tree = MatcherTree::new();
        let p = pattern(&add, Matcher::Reference(obj.clone()), vec![Matcher::Any, Matcher::value(2)]);
        tree.insert(&p, "first");
        tree.insert(&p, "second");
        let ctx = CallContext::new();
        assert_eq!(tree.query(&p, MatchMode::Exact, &ctx), vec![&"first", &"second"]);
        assert_eq!(tree.len(), 2);
        // Root + instance + two args + two leaves.
        assert_eq!(tree.nodes.len(), 6);
    }

    #[test]
    fn generalizing_finds_broader_stored_patterns() {
        let (obj, add) = setup();
        let ctx = CallContext::new();
        let mut tree = MatcherTree::new();
        tree.insert(&pattern(&add, Matcher::Any, vec![Matcher::Any, Matcher::Any]), "any");
        tree.insert(
            &pattern(&add, Matcher::Reference(obj.clone()), vec![Matcher::value(1), Matcher::Any]),
            "one",
        );
        tree.insert(
            &pattern(&add, Matcher::Reference(obj.clone()), vec![Matcher::value(5), Matcher::Any]),
            "five",
        );
        let call = CallPattern::concrete(add.clone(), Some(&obj), &[Value::Int(1), Value::Int(9)]);
        let mut found = tree.query(&call, MatchMode::Generalizing, &ctx);
        found.sort();
        assert_eq!(found, vec![&"any", &"one"]);
    }

    #[test]
    fn concretizing_finds_narrower_stored_patterns() {
        let (obj, add) = setup();
        let ctx = CallContext::new();
        let mut tree = MatcherTree::new();
        let one = CallPattern::concrete(add.clone(), Some(&obj), &[Value::Int(1), Value::Int(2)]);
        let two = CallPattern::concrete(add.clone(), Some(&obj), &[Value::Int(3), Value::Int(2)]);
        tree.insert(&one, 1);
        tree.insert(&two, 2);
        let broad = pattern(
            &add,
            Matcher::Reference(obj.clone()),
            vec![Matcher::of_type(TypeDesc::int()), Matcher::value(2)],
        );
        assert_eq!(tree.query(&broad, MatchMode::Concretizing, &ctx), vec![&1, &2]);
        let narrow = pattern(
            &add,
            Matcher::Reference(obj),
            vec![Matcher::inclusive(2, 4), Matcher::Any],
        );
        assert_eq!(tree.query(&narrow, MatchMode::Concretizing, &ctx), vec![&2]);
    }

    #[test]
    fn get_or_insert_reuses_leaf() {
        let (obj, add) = setup();
        let mut tree: MatcherTree<u32> = MatcherTree::new();
        let call = CallPattern::concrete(add.clone(), Some(&obj), &[Value::Int(1), Value::Int(2)]);
        *tree.get_or_insert_with(&call, || 0) += 1;
        *tree.get_or_insert_with(&call, || 0) += 1;
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.leaves().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn query_instance_spans_methods() {
        let (obj, add) = setup();
        let ty = TypeDesc::interface("ICalc", vec![]);
        let neg = MethodInfo::builder(&ty, "neg").param("a", TypeDesc::int()).build();
        let other = Value::Object(ObjectRef::new(ty));
        let ctx = CallContext::new();
        let mut tree = MatcherTree::new();
        tree.insert(&pattern(&add, Matcher::Reference(obj.clone()), vec![Matcher::Any, Matcher::Any]), "add");
        tree.insert(&pattern(&neg, Matcher::Reference(obj.clone()), vec![Matcher::value(1)]), "neg");
        tree.insert(&pattern(&neg, Matcher::Reference(other), vec![Matcher::Any]), "other");
        let found = tree.query_instance(&Matcher::Reference(obj), MatchMode::Concretizing, &ctx);
        assert_eq!(found, vec![&"add", &"neg"]);
    }

    #[test]
    fn clone_is_independent() {
        let (obj, add) = setup();
        let mut tree = MatcherTree::new();
        let p = pattern(&add, Matcher::Reference(obj), vec![Matcher::Any, Matcher::Any]);
        tree.insert(&p, 1);
        let mut copy = tree.clone();
        copy.insert(&p, 2);
        assert_eq!(tree.len(), 1);
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn unknown_method_yields_nothing() {
        let (obj, add) = setup();
        let tree: MatcherTree<u8> = MatcherTree::new();
        let call = CallPattern::concrete(add, Some(&obj), &[Value::Int(1), Value::Int(2)]);
        assert!(tree.query(&call, MatchMode::Generalizing, &CallContext::new()).is_empty());
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        fn arg_matcher() -> impl Strategy<Value = Matcher> {
            prop_oneof![
                Just(Matcher::Any),
                (-5i64..5).prop_map(Matcher::value),
                Just(Matcher::of_type(TypeDesc::int())),
                (-5i64..5, 0i64..5).prop_map(|(lo, w)| Matcher::inclusive(lo, lo + w)),
            ]
        }

        proptest! {
            #[test]
            fn insert_then_query_round_trip(
                others in prop::collection::vec((arg_matcher(), arg_matcher()), 0..8),
                a in arg_matcher(),
                b in arg_matcher(),
            ) {
                let (obj, add) = setup();
                let ctx = CallContext::new();
                let mut tree = MatcherTree::new();
                for (i, (x, y)) in others.into_iter().enumerate() {
                    tree.insert(&pattern(&add, Matcher::Reference(obj.clone()), vec![x, y]), i + 1);
                }
                let target = pattern(&add, Matcher::Reference(obj.clone()), vec![a, b]);
                tree.insert(&target, 0);

                let exact = tree.query(&target, MatchMode::Exact, &ctx);
                prop_assert!(exact.contains(&&0));
                let general = tree.query(&target, MatchMode::Generalizing, &ctx);
                prop_assert!(general.contains(&&0));
                prop_assert!(general.len() >= exact.len());
            }
        }
    }
}
