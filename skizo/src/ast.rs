//! The typed expression tree the transformer consumes and the emitter lowers to C.
//!
//! The tokenizer/parser are out of scope (spec §1): this module starts from the post-parse
//! shape the spec hands in, modeled the way the teacher models its own input tree —
//! `raw::il`'s tagged union of opcodes, here a tagged union of expression kinds, arena-owned
//! with plain reference edges instead of indices, since unlike the teacher's on-disk IL this
//! tree never needs to survive a serialization round-trip.

use std::cell::Cell;
use std::fmt::{Debug, Formatter};

use crate::errors::SourceLocation;
use crate::strings::StringSlice;
use crate::types::class::Class;
use crate::types::typeref::{CastTag, TypeRef};

/// A cast classification stamped onto a node by the transformer: either a user-written
/// `Cast` resolved against its own destination type, or an implicit conversion inserted at
/// an assignment (spec §4.E.4). `target` is the class the runtime helper casts *to*; it is
/// `None` for tags that don't need one (`NoCast`, `Upcast`, `Unbox`, `Unpack`).
#[derive(Debug, Copy, Clone)]
pub struct NodeCast<'l> {
	pub tag: CastTag,
	pub target: Option<&'l Class<'l>>,
}

impl<'l> NodeCast<'l> {
	pub fn none() -> Self {
		Self { tag: CastTag::NoCast, target: None }
	}
}

/// Every node carries its own inferred type and source position. The type starts
/// unresolved and is filled in by the transformer's bottom-up walk (spec §4.E.4); reading
/// it before that walk completes observes [`TypeRef::unresolved`].
pub struct Expr<'l> {
	pub kind: ExprKind<'l>,
	pub location: SourceLocation,
	inferred_type: Cell<TypeRef<'l>>,
	/// Set by [`crate::transform::Transformer::insert_implicit_conversion`] or the `Cast`
	/// inference arm; read by the emitter to pick the runtime helper call (spec §4.H).
	implicit_cast: Cell<NodeCast<'l>>,
}

impl<'l> Expr<'l> {
	pub fn new(kind: ExprKind<'l>, location: SourceLocation) -> Self {
		Self {
			kind,
			location,
			inferred_type: Cell::new(TypeRef::unresolved()),
			implicit_cast: Cell::new(NodeCast::none()),
		}
	}

	pub fn inferred_type(&self) -> TypeRef<'l> {
		self.inferred_type.get()
	}

	pub fn set_inferred_type(&self, ty: TypeRef<'l>) {
		self.inferred_type.set(ty);
	}

	pub fn implicit_cast(&self) -> NodeCast<'l> {
		self.implicit_cast.get()
	}

	pub fn set_implicit_cast(&self, tag: CastTag, target: Option<&'l Class<'l>>) {
		self.implicit_cast.set(NodeCast { tag, target });
	}
}

impl Debug for Expr<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Expr")
			.field("kind", &self.kind)
			.field("type", &self.inferred_type.get())
			.field("cast", &self.implicit_cast.get())
			.finish()
	}
}

/// A named, typed binding: a parameter, a local, or a captured closure slot.
#[derive(Debug, Clone)]
pub struct Binding<'l> {
	pub name: StringSlice<'l>,
	pub ty: TypeRef<'l>,
	/// Set by closure lowering (spec §4.E) once this binding is captured by an inner
	/// anonymous method and promoted into an environment class field.
	pub is_captured: Cell<bool>,
}

#[derive(Debug)]
pub enum ExprKind<'l> {
	/// An ordered list of statements, tied to the [`crate::types::class::Method`] that owns
	/// this as its root (root of every method body).
	Body(Vec<&'l Expr<'l>>),
	Call { target: &'l Expr<'l>, method_name: StringSlice<'l>, args: Vec<&'l Expr<'l>> },
	Ident(StringSlice<'l>),
	IntegerConstant(i64),
	FloatConstant(f64),
	BoolConstant(bool),
	CharLiteral(char),
	StringLiteral(StringSlice<'l>),
	NullConstant,
	This,
	Return(Option<&'l Expr<'l>>),
	Cast(&'l Expr<'l>),
	Sizeof(TypeRef<'l>),
	ArrayCreation { element: TypeRef<'l>, length: &'l Expr<'l> },
	ArrayInit { element: TypeRef<'l>, elements: Vec<&'l Expr<'l>> },
	IdentityComparison { left: &'l Expr<'l>, right: &'l Expr<'l>, negated: bool },
	Is { value: &'l Expr<'l>, ty: TypeRef<'l> },
	Assignment { target: &'l Expr<'l>, value: &'l Expr<'l> },
	Abort { message: &'l Expr<'l> },
	Assert(&'l Expr<'l>),
	/// `ref` of an lvalue. Only well-formed inside a method flagged `Unsafe` (spec §4.E
	/// "Access control and safety").
	Ref(&'l Expr<'l>),
	Break,
	/// Inline C injected verbatim by the emitter; opaque to the transformer beyond its
	/// declared type.
	CCode(StringSlice<'l>),
	/// Transformer-introduced: `bool then: ^{ … }` folded into a direct `if` (spec §4.E.5).
	/// `return` inside `body` is rejected during branch inlining.
	InlinedCondition { condition: &'l Expr<'l>, body: &'l Expr<'l> },
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bump::{AllocationKind, Arena};
	use crate::strings::StringTable;

	#[test]
	fn fresh_expr_has_unresolved_type_until_set() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let name = strings.intern_identifier("x");
		let expr = Expr::new(ExprKind::Ident(name), SourceLocation::default());
		assert!(!expr.inferred_type().is_resolved());
	}

	#[test]
	fn body_holds_statements_in_source_order() {
		let arena = Arena::new();
		let a = arena.alloc(Expr::new(ExprKind::IntegerConstant(1), SourceLocation::default()), AllocationKind::Expression);
		let b = arena.alloc(Expr::new(ExprKind::IntegerConstant(2), SourceLocation::default()), AllocationKind::Expression);
		let body = ExprKind::Body(vec![a, b]);
		match body {
			ExprKind::Body(stmts) => assert_eq!(stmts.len(), 2),
			_ => unreachable!(),
		}
	}
}
