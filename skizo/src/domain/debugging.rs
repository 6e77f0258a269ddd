//! `DebugState`: soft-debugging bookkeeping — the live call-frame stack `_soX_reglocals`/
//! `_soX_unreglocals` push and pop, plus the embedder-registered breakpoint watch list
//! `_soX_break` consults (spec §4.H, §4.K "breakpoint/watch iteration").
//!
//! No direct teacher analogue (the teacher never pauses managed execution); the interactive
//! breakpoint prompt itself is out of scope (spec §1 "Deliberately out of scope: ... the
//! interactive breakpoint prompt UI") — this module only tracks the state a prompt would be
//! built on top of.

use std::cell::{Cell, RefCell};

#[derive(Debug, Clone)]
pub struct FrameLocals {
	pub method_name: String,
	pub local_count: usize,
}

#[derive(Debug, Clone)]
pub struct Watch {
	pub id: u32,
	pub expression: String,
}

#[derive(Default)]
pub struct DebugState {
	frames: RefCell<Vec<FrameLocals>>,
	watches: RefCell<Vec<Watch>>,
	next_watch_id: Cell<u32>,
}

impl DebugState {
	pub fn new() -> Self {
		Self::default()
	}

	/// Called by the `_soX_reglocals` icall at method entry (spec §4.H).
	pub fn push_frame(&self, method_name: &str, local_count: usize) {
		self.frames.borrow_mut().push(FrameLocals { method_name: method_name.to_string(), local_count });
	}

	/// Called by `_soX_unreglocals` at method exit.
	pub fn pop_frame(&self) {
		self.frames.borrow_mut().pop();
	}

	/// Innermost frame last, matching call order — what a paused-at-`_soX_break` embedder
	/// would want to walk top-down.
	pub fn current_frames(&self) -> Vec<FrameLocals> {
		self.frames.borrow().clone()
	}

	pub fn add_watch(&self, expression: &str) -> u32 {
		let id = self.next_watch_id.get();
		self.next_watch_id.set(id + 1);
		self.watches.borrow_mut().push(Watch { id, expression: expression.to_string() });
		id
	}

	pub fn remove_watch(&self, id: u32) {
		self.watches.borrow_mut().retain(|w| w.id != id);
	}

	pub fn watches(&self) -> Vec<Watch> {
		self.watches.borrow().clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn frames_push_and_pop_in_stack_order() {
		let state = DebugState::new();
		state.push_frame("Foo.bar", 2);
		state.push_frame("Foo.baz", 0);
		assert_eq!(state.current_frames().len(), 2);
		state.pop_frame();
		let frames = state.current_frames();
		assert_eq!(frames.len(), 1);
		assert_eq!(frames[0].method_name, "Foo.bar");
	}

	#[test]
	fn watches_are_addressable_by_the_id_returned_on_registration() {
		let state = DebugState::new();
		let id = state.add_watch("self.count");
		assert_eq!(state.watches().len(), 1);
		state.remove_watch(id);
		assert!(state.watches().is_empty());
	}
}
