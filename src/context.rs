//! Re-entrancy context for one interception thread.
//!
//! Every entry into engine internals bumps the depth; every call back out to
//! user code (matcher predicates, acceptance guards, behavior delegates) runs
//! with the depth zeroed and restored afterwards. Interception sources must
//! bypass dispatch while the depth is non-zero.
//!
//! The context is an explicit value: the interception source owns one per
//! thread and passes it to every `Repository` entry point.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct CallContext {
    depth: AtomicUsize,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// True while engine internals are executing on this context.
    pub fn is_guarded(&self) -> bool {
        self.depth() > 0
    }

    pub fn enter_internal(&self) -> InternalScope<'_> {
        self.depth.fetch_add(1, Ordering::AcqRel);
        InternalScope { ctx: self }
    }

    /// Run user code with the guard lifted. The previous depth comes back
    /// even if `f` unwinds.
    pub fn run_external<R>(&self, f: impl FnOnce() -> R) -> R {
        let saved = self.depth.swap(0, Ordering::AcqRel);
        let _restore = RestoreDepth { ctx: self, saved };
        f()
    }
}

#[must_use = "the guard is lifted as soon as the scope is dropped"]
pub struct InternalScope<'a> {
    ctx: &'a CallContext,
}

impl Drop for InternalScope<'_> {
    fn drop(&mut self) {
        self.ctx.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

struct RestoreDepth<'a> {
    ctx: &'a CallContext,
    saved: usize,
}

impl Drop for RestoreDepth<'_> {
    fn drop(&mut self) {
        self.ctx.depth.store(self.saved, Ordering::Release);
    }
}
