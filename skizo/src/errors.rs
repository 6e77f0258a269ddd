//! Error kinds for the two failure domains named in the spec: compile-time errors
//! (reported with a source location) and runtime errors (raised as a domain abort).
//!
//! Grounded on the teacher's `schema::errors::ReadError`: a plain `#[derive(Debug)]` enum
//! with hand-written `Display`/`Error` impls and no `thiserror`, kept here rather than
//! reached for an error-derive crate the teacher never uses.

use std::fmt::{Debug, Display, Formatter};

/// A position in a source module, attached to every AST expression and to every
/// compile-time error.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct SourceLocation {
	pub module: u32,
	pub line: u32,
	pub column: u32,
}

impl Display for SourceLocation {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.line, self.column)
	}
}

/// Errors raised while building a domain: parsing (externalized), resolving the type
/// system, and transforming the AST. The first offender aborts domain creation.
#[derive(Debug, Clone)]
pub enum CompileError {
	UnknownType { name: String, at: SourceLocation },
	DuplicateType { name: String },
	CyclicHierarchy { class: String },
	BadOverride { method: String, class: String },
	MissingAbstractImpl { class: String, method: String },
	AccessViolation { member: String, from_class: String, at: SourceLocation },
	AmbiguousName { name: String, at: SourceLocation },
	InvalidECall { method: String },
	UnresolvedICall { method: String },
	TypeMismatch { expected: String, found: String, at: SourceLocation },
	ImplicitDowncast { at: SourceLocation },
	BadAttribute { name: String, at: SourceLocation },
	NativeBodyConflict { method: String },
	DisallowedUnsafe { construct: &'static str, at: SourceLocation },
	/// The `CodeBackend` itself failed: a missing compiler, a bad C translation unit, a
	/// `dlopen` failure. Not one of the domain's own semantic checks.
	BackendFailure { detail: String },
}

impl Display for CompileError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::UnknownType { name, at } => write!(f, "{at}: unknown type `{name}`"),
			Self::DuplicateType { name } => write!(f, "duplicate type `{name}`"),
			Self::CyclicHierarchy { class } => write!(f, "cyclic class hierarchy at `{class}`"),
			Self::BadOverride { method, class } => {
				write!(f, "`{class}::{method}` does not match the signature it overrides")
			}
			Self::MissingAbstractImpl { class, method } => {
				write!(f, "`{class}` does not implement abstract method `{method}`")
			}
			Self::AccessViolation { member, from_class, at } => {
				write!(f, "{at}: `{from_class}` cannot access `{member}`")
			}
			Self::AmbiguousName { name, at } => write!(f, "{at}: ambiguous name `{name}`"),
			Self::InvalidECall { method } => write!(f, "invalid ecall declaration on `{method}`"),
			Self::UnresolvedICall { method } => write!(f, "unresolved icall `{method}`"),
			Self::TypeMismatch { expected, found, at } => {
				write!(f, "{at}: expected `{expected}`, found `{found}`")
			}
			Self::ImplicitDowncast { at } => write!(f, "{at}: implicit downcast is not allowed"),
			Self::BadAttribute { name, at } => write!(f, "{at}: bad attribute `{name}`"),
			Self::NativeBodyConflict { method } => {
				write!(f, "`{method}` is native and cannot have a body")
			}
			Self::DisallowedUnsafe { construct, at } => {
				write!(f, "{at}: `{construct}` requires an unsafe method")
			}
			Self::BackendFailure { detail } => write!(f, "backend failure: {detail}"),
		}
	}
}

impl std::error::Error for CompileError {}

/// Runtime abort codes, mirroring the C helper identifiers (`_soX_abort*`) the emitter
/// generates calls to. `#[repr(u32)]` with explicit discriminants lets the embedding API
/// round-trip a raw backend return code back into an `AbortCode` via [`AbortCode::from_repr`].
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, skizo_derive::FromRepr)]
pub enum AbortCode {
	RangeCheck = 0,
	NullableNullCheck = 1,
	NullDereference = 2,
	AssertFailed = 3,
	FailableFailure = 4,
	OutOfMemory = 5,
	DisallowedCall = 6,
	StackOverflow = 7,
	TypeInitializationError = 8,
}

impl Display for AbortCode {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let text = match self {
			Self::RangeCheck => "range check failed",
			Self::NullableNullCheck => "nullable null check failed",
			Self::NullDereference => "null dereference",
			Self::AssertFailed => "assertion failed",
			Self::FailableFailure => "failable operation failed",
			Self::OutOfMemory => "out of memory",
			Self::DisallowedCall => "disallowed call",
			Self::StackOverflow => "stack overflow",
			Self::TypeInitializationError => "type initialization error",
		};
		f.write_str(text)
	}
}

/// A single entry in an abort's captured stack trace, in call order (caller before
/// callee is *not* guaranteed; `Domain::invoke_entry_point` pushes innermost-first).
#[derive(Debug, Clone)]
pub struct StackFrame {
	pub method: String,
}

/// The only non-local control transfer in the runtime (spec §9). Unwinds up to the
/// domain's entry-point boundary; catchable around lock scopes so a managed fault inside
/// a locked critical section still releases the lock (spec §5, testable property 7).
#[derive(Debug, Clone)]
pub struct AbortError {
	pub code: Option<AbortCode>,
	pub message: String,
	pub stack_trace: Vec<StackFrame>,
}

impl AbortError {
	pub fn new(code: AbortCode) -> Self {
		Self { message: code.to_string(), code: Some(code), stack_trace: Vec::new() }
	}

	pub fn with_message(message: impl Into<String>) -> Self {
		Self { code: None, message: message.into(), stack_trace: Vec::new() }
	}

	/// Keeps the two outermost instances of the self-repeating pattern in a
	/// pairwise-recursive overflow (spec §4.J / S6), so the user sees who overflowed
	/// without thousands of duplicate frames.
	pub fn trim_stack_overflow_trace(&mut self) {
		if self.code != Some(AbortCode::StackOverflow) {
			return;
		}
		let Some(period) = detect_repeating_period(&self.stack_trace) else { return };
		let keep = period * 2;
		if self.stack_trace.len() > keep {
			self.stack_trace.truncate(keep);
		}
	}
}

fn detect_repeating_period(frames: &[StackFrame]) -> Option<usize> {
	let len = frames.len();
	for period in 1..=len / 3 {
		let repeats = len / period;
		if repeats < 3 {
			continue;
		}
		let is_periodic = (1..repeats).all(|i| {
			(0..period).all(|j| frames[j].method == frames[i * period + j].method)
		});
		if is_periodic {
			return Some(period);
		}
	}
	None
}

impl Display for AbortError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "ABORT (runtime): {}", self.message)
	}
}

impl std::error::Error for AbortError {}

#[cfg(test)]
mod tests {
	use super::*;

	fn frame(method: &str) -> StackFrame {
		StackFrame { method: method.to_string() }
	}

	#[test]
	fn trims_pairwise_recursive_overflow_to_two_periods() {
		let mut err = AbortError::new(AbortCode::StackOverflow);
		for _ in 0..2000 {
			err.stack_trace.push(frame("a"));
			err.stack_trace.push(frame("b"));
		}
		err.trim_stack_overflow_trace();
		assert_eq!(err.stack_trace.len(), 4);
		assert_eq!(err.stack_trace[0].method, "a");
		assert_eq!(err.stack_trace[1].method, "b");
	}

	#[test]
	fn leaves_non_overflow_traces_untouched() {
		let mut err = AbortError::new(AbortCode::NullDereference);
		err.stack_trace.push(frame("main"));
		err.trim_stack_overflow_trace();
		assert_eq!(err.stack_trace.len(), 1);
	}

	#[test]
	fn abort_code_round_trips_through_from_repr() {
		assert_eq!(AbortCode::from_repr(2), Some(AbortCode::NullDereference));
		assert_eq!(AbortCode::from_repr(99), None);
	}
}
