//! Resolution of a live call to at most one arrangement.
//!
//! Candidates come from a generalizing query of the arrangement tree, for the
//! live method and for every interface method it implements. The winner is
//! picked in ascending registration order:
//!
//! 1. the last non-sequential arrangement whose guard accepts the call;
//! 2. else the first sequential one not used yet;
//! 3. else the last sequential one (exhausted sequences repeat their tail).

use std::sync::Arc;

use crate::arrangement::{Arrangement, ArrangementId};
use crate::call_pattern::CallPattern;
use crate::context::CallContext;
use crate::tree::{MatchMode, MatcherTree};
use crate::value::Value;

/// How a dispatched call was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The engine stayed out of the way; the original implementation runs.
    Bypassed,
    Matched(ArrangementId),
    /// No arrangement applied; the receiver's fallback behaviors ran.
    Unmatched,
}

impl Resolution {
    pub fn arrangement(self) -> Option<ArrangementId> {
        match self {
            Resolution::Matched(id) => Some(id),
            Resolution::Bypassed | Resolution::Unmatched => None,
        }
    }
}

/// The live pattern plus its retargets onto every implemented interface
/// method, live method first.
pub(crate) fn lookup_patterns(call: &CallPattern) -> Vec<CallPattern> {
    let mut patterns = vec![call.clone()];
    for base in call.method().base_chain() {
        if base.declaring_type().is_interface() && base.arg_count() == call.args().len() {
            patterns.push(call.retarget(base.clone()));
        }
    }
    patterns
}

/// Every arrangement broad enough to accept `call`, deduplicated and sorted
/// by registration id.
pub(crate) fn collect_candidates(
    tree: &MatcherTree<Arc<Arrangement>>,
    call: &CallPattern,
    ctx: &CallContext,
) -> Vec<Arc<Arrangement>> {
    let mut found: Vec<Arc<Arrangement>> = lookup_patterns(call)
        .iter()
        .flat_map(|p| tree.query(p, MatchMode::Generalizing, ctx))
        .cloned()
        .collect();
    found.sort_by_key(|a| a.id());
    found.dedup_by_key(|a| a.id());
    found
}

/// Apply the tie-break to `candidates` (ascending id). Guards are evaluated
/// lazily, at most once each, and stop as soon as a tier has a winner.
pub(crate) fn select(
    candidates: &[Arc<Arrangement>],
    args: &[Value],
    ctx: &CallContext,
) -> Option<Arc<Arrangement>> {
    let newest_plain = candidates
        .iter()
        .rev()
        .filter(|c| !c.is_sequential())
        .find(|c| c.accepts(args, ctx));
    if let Some(winner) = newest_plain {
        return Some(Arc::clone(winner));
    }

    let sequential: Vec<&Arc<Arrangement>> =
        candidates.iter().filter(|c| c.is_sequential()).collect();
    if let Some(winner) = sequential
        .iter()
        .copied()
        .find(|c| !c.is_used() && c.accepts(args, ctx))
    {
        return Some(Arc::clone(winner));
    }
    // Every unused one was just rejected; only used ones are left to repeat.
    sequential
        .into_iter()
        .rev()
        .filter(|c| c.is_used())
        .find(|c| c.accepts(args, ctx))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::ArrangementHandle;
    use crate::call_pattern::ArgFilter;
    use crate::matcher::Matcher;
    use crate::testutil::calculator;

    fn arrangement(id: u64, pattern: &CallPattern) -> Arc<Arrangement> {
        Arc::new(Arrangement::new(ArrangementId::new(id), pattern.clone(), pattern.to_string(), 10))
    }

    fn winner(candidates: &[Arc<Arrangement>], ctx: &CallContext) -> Option<u64> {
        select(candidates, &[Value::Int(1), Value::Int(2)], ctx).map(|a| a.id().get())
    }

    #[test]
    fn last_plain_wins() {
        let fx = calculator();
        let p = CallPattern::any_args(fx.add.clone(), Matcher::Any).unwrap();
        let ctx = CallContext::new();
        let all = vec![arrangement(1, &p), arrangement(2, &p), arrangement(3, &p)];
        assert_eq!(winner(&all, &ctx), Some(3));
    }

    #[test]
    fn sequential_consumed_in_order_then_last_repeats() {
        let fx = calculator();
        let p = CallPattern::any_args(fx.add.clone(), Matcher::Any).unwrap();
        let ctx = CallContext::new();
        let all = vec![arrangement(1, &p), arrangement(2, &p), arrangement(3, &p)];
        for a in &all {
            ArrangementHandle::new(a.clone()).in_sequence();
        }
        let mut order = Vec::new();
        for _ in 0..4 {
            let w = select(&all, &[], &ctx).unwrap();
            w.mark_used();
            order.push(w.id().get());
        }
        assert_eq!(order, [1, 2, 3, 3]);
    }

    #[test]
    fn plain_beats_sequential_regardless_of_order() {
        let fx = calculator();
        let p = CallPattern::any_args(fx.add.clone(), Matcher::Any).unwrap();
        let ctx = CallContext::new();
        let plain = arrangement(1, &p);
        let seq = arrangement(2, &p);
        ArrangementHandle::new(seq.clone()).in_sequence();
        assert_eq!(winner(&[plain, seq], &ctx), Some(1));
    }

    #[test]
    fn rejected_guard_falls_through() {
        let fx = calculator();
        let p = CallPattern::any_args(fx.add.clone(), Matcher::Any).unwrap();
        let ctx = CallContext::new();
        let a = arrangement(1, &p);
        let b = arrangement(2, &p);
        ArrangementHandle::new(b.clone())
            .when(ArgFilter::new("never", |_| false));
        assert_eq!(winner(&[a, b.clone()], &ctx), Some(1));
        assert_eq!(winner(&[b], &ctx), None);
    }

    #[test]
    fn guards_are_evaluated_lazily() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let fx = calculator();
        let p = CallPattern::any_args(fx.add.clone(), Matcher::Any).unwrap();
        let ctx = CallContext::new();
        let checks = Arc::new(AtomicUsize::new(0));
        let counting = |accept: bool| {
            let checks = checks.clone();
            ArgFilter::new("counting", move |_| {
                checks.fetch_add(1, Ordering::SeqCst);
                accept
            })
        };
        let older = arrangement(1, &p);
        let newer = arrangement(2, &p);
        let seq = arrangement(3, &p);
        ArrangementHandle::new(older.clone()).when(counting(true));
        ArrangementHandle::new(newer.clone()).when(counting(true));
        ArrangementHandle::new(seq.clone()).in_sequence().when(counting(true));

        assert_eq!(winner(&[older, newer.clone(), seq.clone()], &ctx), Some(2));
        assert_eq!(checks.load(Ordering::SeqCst), 1);

        checks.store(0, Ordering::SeqCst);
        ArrangementHandle::new(newer.clone()).when(counting(false));
        let used = arrangement(4, &p);
        ArrangementHandle::new(used.clone()).in_sequence().when(counting(false));
        used.mark_used();
        assert_eq!(winner(&[newer, seq, used], &ctx), Some(3));
        assert_eq!(checks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn interface_methods_are_looked_up() {
        let fx = calculator();
        let ctx = CallContext::new();
        let mut tree = MatcherTree::new();
        let on_interface = CallPattern::any_args(fx.add.clone(), Matcher::Any).unwrap();
        tree.insert(&on_interface, arrangement(1, &on_interface));
        let call = CallPattern::concrete(
            fx.impl_add.clone(),
            Some(&fx.instance()),
            &[Value::Int(1), Value::Int(2)],
        );
        let found = collect_candidates(&tree, &call, &ctx);
        assert_eq!(found.len(), 1);
        assert_eq!(lookup_patterns(&call).len(), 2);
    }
}
