//! TypeRef: the unresolved-then-resolved type reference used throughout the AST and the
//! class data model.
//!
//! Grounded on the teacher's lazy `Cell<TypeData>` field on `schema::Type` (`Uninit { name,
//! namespace }` swapped in-place for `Init { .. }` once the owning assembly's type table is
//! walked): here an unresolved reference names a class plus array/failable modifiers, and
//! [`crate::types::system::TypeSystem::resolve`] swaps it for a resolved class pointer,
//! synthesizing Array/Failable/Boxed wrapper classes on demand (spec §4.C).

use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

use crate::strings::StringSlice;
use crate::types::class::Class;
use crate::types::primitive::Primitive;

/// A type reference at some point in its resolution lifecycle. `Copy` so it can sit
/// directly in a `Cell` on [`crate::ast::Expr`] and on class/field/method signature slots
/// without an extra indirection.
#[derive(Copy, Clone)]
pub enum TypeRef<'l> {
	/// Not yet assigned an expression type; the sentinel every `Expr` starts with.
	Pending,
	/// Named but not yet looked up in the domain's `TypeSystem`.
	Unresolved { class_name: StringSlice<'l>, primitive: Option<Primitive>, array_level: u8, is_failable: bool },
	Resolved(&'l Class<'l>),
}

impl<'l> TypeRef<'l> {
	pub fn unresolved() -> Self {
		TypeRef::Pending
	}

	pub fn named(class_name: StringSlice<'l>) -> Self {
		TypeRef::Unresolved { class_name, primitive: None, array_level: 0, is_failable: false }
	}

	pub fn primitive(primitive: Primitive) -> Self {
		TypeRef::Unresolved {
			class_name: StringSlice::empty(),
			primitive: Some(primitive),
			array_level: 0,
			is_failable: false,
		}
	}

	pub fn is_resolved(&self) -> bool {
		matches!(self, TypeRef::Resolved(_))
	}

	pub fn class(&self) -> Option<&'l Class<'l>> {
		match self {
			TypeRef::Resolved(class) => Some(class),
			_ => None,
		}
	}

	pub fn array_of(self, levels: u8) -> Self {
		match self {
			TypeRef::Unresolved { class_name, primitive, is_failable, .. } => {
				TypeRef::Unresolved { class_name, primitive, array_level: levels, is_failable }
			}
			other => other,
		}
	}

	pub fn failable(self) -> Self {
		match self {
			TypeRef::Unresolved { class_name, primitive, array_level, .. } => {
				TypeRef::Unresolved { class_name, primitive, array_level, is_failable: true }
			}
			other => other,
		}
	}
}

/// Equal exactly when both resolve to the same class (spec §3: "Two TypeRefs are equal
/// when their resolved class pointers are equal"). Two `Pending` refs and two structurally
/// identical `Unresolved` refs also compare equal, so refs can be compared before
/// resolution during signature-matching (spec §4.C `MakeSureMethodsFinalized`).
impl PartialEq for TypeRef<'_> {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(TypeRef::Pending, TypeRef::Pending) => true,
			(TypeRef::Resolved(a), TypeRef::Resolved(b)) => std::ptr::eq(*a, *b),
			(
				TypeRef::Unresolved { class_name: n1, primitive: p1, array_level: a1, is_failable: f1 },
				TypeRef::Unresolved { class_name: n2, primitive: p2, array_level: a2, is_failable: f2 },
			) => n1 == n2 && p1 == p2 && a1 == a2 && f1 == f2,
			_ => false,
		}
	}
}

impl Eq for TypeRef<'_> {}

impl Hash for TypeRef<'_> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		match self {
			TypeRef::Pending => 0u8.hash(state),
			TypeRef::Resolved(class) => {
				1u8.hash(state);
				(*class as *const Class).hash(state);
			}
			TypeRef::Unresolved { class_name, primitive, array_level, is_failable } => {
				2u8.hash(state);
				class_name.hash(state);
				primitive.hash(state);
				array_level.hash(state);
				is_failable.hash(state);
			}
		}
	}
}

impl Display for TypeRef<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			TypeRef::Pending => f.write_str("<pending>"),
			TypeRef::Resolved(class) => Display::fmt(class, f),
			TypeRef::Unresolved { class_name, primitive, array_level, is_failable } => {
				match primitive {
					Some(p) => Display::fmt(p, f)?,
					None => Display::fmt(class_name, f)?,
				}
				for _ in 0..*array_level {
					f.write_str("[]")?;
				}
				if *is_failable {
					f.write_str("!")?;
				}
				Ok(())
			}
		}
	}
}

impl Debug for TypeRef<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "TypeRef({self})")
	}
}

/// Cast classification between a source and target type, resolved once by
/// [`crate::types::system::TypeSystem::cast_tag`] and consumed by the emitter to pick the
/// runtime helper call (spec §3, §4.H).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CastTag {
	NoCast,
	Upcast,
	Downcast,
	Box,
	Unbox,
	ValueToFailable,
	ErrorToFailable,
	/// Extracts the success value out of a Failable, aborting with `FailableFailure` at
	/// runtime if it actually holds an error (spec §3 "Failable").
	Unpack,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Cast {
	pub tag: CastTag,
	pub castable: bool,
}
