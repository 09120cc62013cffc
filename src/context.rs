//! Process-wide and per-decode evaluator context (component C support,
//! §4.5). The design calls for the evaluator to resolve field paths
//! against the "current object", its parent, and the decode root, plus a
//! process-wide set of injected constants/functions a host adds once at
//! `Parser` construction (`add_to_context`, §4.4).
//!
//! This is new relative to the teacher, which has no notion of nested
//! scopes at all (`Schema::parse` is always flat) — it is grounded in the
//! evaluator capability the design names and generalizes the "current /
//! parent / root" scoping `crate::evaluator::EvalScope` already exposes
//! into a stack a recursive decode can push/pop through.

use std::collections::HashMap;

use crate::value::{Record, Value};

/// Process-wide bindings injected once via `ParserBuilder::add_to_context`
/// (§4.4), visible to every expression evaluation as `context.<name>`.
#[derive(Debug, Clone, Default)]
pub struct GlobalContext {
    bindings: HashMap<String, Value>,
}

impl GlobalContext {
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// A stack frame pushed while decoding/encoding a nested object: the
/// record being built for this level plus a reference chain back to
/// parent/root for evaluator scoping.
struct Frame {
    record: Record,
}

/// Tracks the current/parent/root scope chain during a single decode or
/// encode pass, so the engine can push a frame before recursing into a
/// nested `Object`/`ArrayObject` field and restore the previous frame on
/// every exit path (including early returns on error), per §4.5's "scoped
/// self/prefix key acquisition is always restored".
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new(root: Record) -> Self {
        ScopeStack { frames: vec![Frame { record: root }] }
    }

    pub fn push(&mut self, record: Record) {
        self.frames.push(Frame { record });
    }

    /// Pops the innermost frame and returns its record, merging it back
    /// into the caller's responsibility (the engine decides where the
    /// popped record is stored on the parent).
    pub fn pop(&mut self) -> Record {
        assert!(self.frames.len() > 1, "cannot pop the root scope frame");
        self.frames.pop().unwrap().record
    }

    pub fn current(&self) -> &Record {
        &self.frames.last().expect("scope stack is never empty").record
    }

    pub fn current_mut(&mut self) -> &mut Record {
        &mut self.frames.last_mut().expect("scope stack is never empty").record
    }

    pub fn parent(&self) -> Option<&Record> {
        self.frames.len().checked_sub(2).map(|i| &self.frames[i].record)
    }

    pub fn root(&self) -> &Record {
        &self.frames.first().expect("scope stack is never empty").record
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Consumes the stack, returning the root frame's record. Only valid
    /// once every pushed frame has been popped back off.
    pub fn into_root(mut self) -> Record {
        assert_eq!(self.frames.len(), 1, "cannot take the root record while nested frames remain");
        self.frames.pop().unwrap().record
    }
}

/// RAII guard that pops the scope stack back to its depth-at-construction
/// when dropped, guaranteeing restoration even if the body between push
/// and the natural pop point returns early via `?`.
pub struct ScopeGuard<'a> {
    stack: &'a mut ScopeStack,
    expected_depth: usize,
    /// Set once `finish` has already popped the frame, so `Drop` (which
    /// still runs on the by-value `self` at the end of `finish`) does not
    /// pop a second, unrelated frame belonging to an outer guard.
    finished: bool,
}

impl<'a> ScopeGuard<'a> {
    pub fn push(stack: &'a mut ScopeStack, record: Record) -> Self {
        let expected_depth = stack.depth() + 1;
        stack.push(record);
        ScopeGuard { stack, expected_depth, finished: false }
    }

    pub fn stack(&mut self) -> &mut ScopeStack {
        self.stack
    }

    /// Consumes the guard, popping the frame it pushed and returning its
    /// record without waiting for `Drop` (the common success path).
    pub fn finish(mut self) -> Record {
        let record = self.stack.pop();
        self.finished = true;
        record
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        while self.stack.depth() >= self.expected_depth && self.stack.depth() > 1 {
            self.stack.pop();
        }
    }
}
