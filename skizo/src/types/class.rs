//! Class/Method/Field metadata: the arena-owned heap-shape description every managed
//! instance is stamped from.
//!
//! Grounded on the teacher's `structured::types::{Class, Interface, Field}`: identity
//! `Eq`/`Hash`/`PartialEq` via `std::ptr::eq` (classes are compared as the heap-like
//! metadata objects they are, never structurally), `Cell<&[T]>` for lazily-populated member
//! lists filled in after the shell is allocated, and `derivative::Derivative` for Debug
//! formatting of those cells. The teacher keeps `Class` and `Interface` as separate structs;
//! this spec folds interfaces into `Class` with a `SpecialClass::Interface` tag instead,
//! since every operation in §4.C (`RegisterClass`, `ResolveTypeRef`, `MakeSureMethodsFinalized`,
//! `CalcGCMap`) treats them identically apart from that tag.

use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use derivative::Derivative;
use fxhash::FxHashMap;
use nohash_hasher::IntMap;

use crate::ast::Expr;
use crate::strings::StringSlice;
use crate::types::primitive::Primitive;
use crate::types::typeref::TypeRef;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Access {
	Public,
	Protected,
	Internal,
	Private,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SpecialClass {
	None,
	Interface,
	Boxed,
	Array,
	Failable,
	Foreign,
	MethodClass,
	EventClass,
	Alias,
	BinaryBlob,
	ClosureEnv,
}

bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct ClassFlags: u32 {
		const ABSTRACT            = 1 << 0;
		const STATIC              = 1 << 1;
		const VALUE_TYPE          = 1 << 2;
		const SIZE_CALCULATED     = 1 << 3;
		const METHOD_LIST_FINAL   = 1 << 4;
		const INFERRED            = 1 << 5;
		const ATTRIBUTES_BORROWED = 1 << 6;
		const COMPILER_GENERATED  = 1 << 7;
		const EMIT_VTABLE         = 1 << 8;
		const FREE_VTABLE         = 1 << 9;
		const IS_INITIALIZED      = 1 << 10;
		const HAS_BREAK_EXPRS     = 1 << 11;
	}
}

/// `ContentSize` is the inline footprint; `SizeForUse` is the footprint when held as a
/// field (pointer-sized for heap classes/arrays, value-width for primitives, `ContentSize`
/// for value types); `gc_map` lists the byte offsets at which the GC finds a heap pointer
/// (spec §3).
#[derive(Debug, Clone, Default)]
pub struct GCInfo<'l> {
	pub content_size: usize,
	pub size_for_use: usize,
	pub gc_map: &'l [u32],
}

#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Field<'l> {
	pub name: StringSlice<'l>,
	pub ty: TypeRef<'l>,
	pub declaring_class: &'l Class<'l>,
	pub is_static: bool,
	pub offset: Cell<u32>,
	pub access: Access,
	#[derivative(Debug = "ignore")]
	pub attributes: &'l [StringSlice<'l>],
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MethodKind {
	Normal,
	Ctor,
	Dtor,
}

bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct MethodFlags: u32 {
		const ABSTRACT        = 1 << 0;
		const VIRTUAL         = 1 << 1;
		const SELF_CAPTURED   = 1 << 2;
		const ANONYMOUS       = 1 << 3;
		const INFERRED        = 1 << 4;
		const UNSAFE          = 1 << 5;
		const TRULY_VIRTUAL   = 1 << 6;
		const WAS_EVER_CALLED = 1 << 7;
		const FORCE_NO_HEADER = 1 << 8;
		const HAS_BREAK_EXPRS = 1 << 9;
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SpecialMethod {
	None,
	/// icall: resolved against the runtime's own intrinsic table, never emitted as C.
	Native,
	/// Body is materialized by the [`crate::thunk::ThunkManager`], not the emitter.
	ClosureCtor,
	DisallowedECall,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CallingConvention {
	Cdecl,
	Stdcall,
}

#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ECallDescriptor<'l> {
	pub library: StringSlice<'l>,
	pub entry_point: StringSlice<'l>,
	pub convention: CallingConvention,
	#[derivative(Debug = "ignore")]
	pub resolved_impl: Cell<Option<usize>>,
}

#[derive(Debug, Clone)]
pub struct Parameter<'l> {
	pub name: StringSlice<'l>,
	pub ty: TypeRef<'l>,
	pub is_captured: Cell<bool>,
}

#[derive(Debug, Clone)]
pub struct Signature<'l> {
	pub return_type: Cell<TypeRef<'l>>,
	pub parameters: &'l [Parameter<'l>],
	pub is_static: bool,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Method<'l> {
	pub name: StringSlice<'l>,
	pub kind: MethodKind,
	pub signature: Signature<'l>,
	pub access: Access,
	pub flags: Cell<MethodFlags>,
	pub special: SpecialMethod,
	pub ecall: Option<ECallDescriptor<'l>>,
	#[derivative(Debug = "ignore")]
	pub body: Cell<Option<&'l Expr<'l>>>,
	pub declaring_class: Cell<Option<&'l Class<'l>>>,
	pub extension_declaring_class: Cell<Option<&'l Class<'l>>>,
	pub parent_method: Cell<Option<&'l Method<'l>>>,
	pub closure_env_class: Cell<Option<&'l Class<'l>>>,
	pub target_field: Cell<Option<&'l Field<'l>>>,
	pub vtable_index: Cell<Option<u32>>,
}

impl Method<'_> {
	pub fn is_virtual(&self) -> bool {
		self.flags.get().contains(MethodFlags::VIRTUAL)
	}

	pub fn is_unsafe(&self) -> bool {
		self.flags.get().contains(MethodFlags::UNSAFE)
	}
}

#[derive(Debug, Copy, Clone)]
pub struct Const<'l> {
	pub name: StringSlice<'l>,
	pub ty: TypeRef<'l>,
	pub value: &'l Expr<'l>,
}

#[derive(Debug, Copy, Clone)]
pub struct EventField<'l> {
	pub name: StringSlice<'l>,
	pub ty: TypeRef<'l>,
}

/// A member slot in a class's name-set: fields, methods and consts all share one
/// namespace, so a name collision between e.g. a field and a method is a `RegisterClass`-
/// time error rather than silent shadowing.
#[derive(Debug, Copy, Clone)]
pub enum Member<'l> {
	Field(&'l Field<'l>),
	Method(&'l Method<'l>),
	Const(&'l Const<'l>),
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Class<'l> {
	pub flat_name: StringSlice<'l>,
	pub nice_name: Option<StringSlice<'l>>,
	pub primitive_tag: Option<Primitive>,
	pub special_class: SpecialClass,
	pub access: Access,
	pub flags: Cell<ClassFlags>,
	pub base_class: Cell<TypeRef<'l>>,
	pub wrapped_class: Cell<TypeRef<'l>>,
	/// Interfaces this class declares itself to implement (not inherited ones; those are
	/// reached by walking `base_class` in [`Class::implements`]).
	#[derivative(Debug(format_with = "crate::utilities::fmt_debug_cell"))]
	pub declared_interfaces: Cell<&'l [TypeRef<'l>]>,
	#[derivative(Debug(format_with = "crate::utilities::fmt_debug_cell"))]
	pub instance_fields: Cell<&'l [Field<'l>]>,
	#[derivative(Debug(format_with = "crate::utilities::fmt_debug_cell"))]
	pub static_fields: Cell<&'l [Field<'l>]>,
	#[derivative(Debug(format_with = "crate::utilities::fmt_debug_cell"))]
	pub instance_methods: Cell<&'l [&'l Method<'l>]>,
	#[derivative(Debug(format_with = "crate::utilities::fmt_debug_cell"))]
	pub static_methods: Cell<&'l [&'l Method<'l>]>,
	#[derivative(Debug(format_with = "crate::utilities::fmt_debug_cell"))]
	pub instance_ctors: Cell<&'l [&'l Method<'l>]>,
	pub instance_dtor: Cell<Option<&'l Method<'l>>>,
	pub static_ctor: Cell<Option<&'l Method<'l>>>,
	pub static_dtor: Cell<Option<&'l Method<'l>>>,
	#[derivative(Debug(format_with = "crate::utilities::fmt_debug_cell"))]
	pub consts: Cell<&'l [Const<'l>]>,
	#[derivative(Debug(format_with = "crate::utilities::fmt_debug_cell"))]
	pub event_fields: Cell<&'l [EventField<'l>]>,
	#[derivative(Debug(format_with = "crate::utilities::fmt_debug_cell"))]
	pub attributes: Cell<&'l [StringSlice<'l>]>,
	#[derivative(Debug = "ignore")]
	pub members: RefCell<FxHashMap<&'l str, Member<'l>>>,
	#[derivative(Debug = "ignore")]
	pub instance_methods_by_name: RefCell<FxHashMap<&'l str, &'l Method<'l>>>,
	pub gc_info: RefCell<GCInfo<'l>>,
	#[derivative(Debug = "ignore")]
	pub vtable: Cell<Option<usize>>,
	#[derivative(Debug = "ignore")]
	pub implements_cache: RefCell<IntMap<usize, bool>>,
	#[derivative(Debug = "ignore")]
	pub interface_impls: RefCell<FxHashMap<(*const Class<'l>, &'l str), &'l Method<'l>>>,
	pub hash_code_override: Cell<Option<&'l Method<'l>>>,
	pub equals_override: Cell<Option<&'l Method<'l>>>,
}

impl<'l> Class<'l> {
	pub fn is_abstract(&self) -> bool {
		self.flags.get().contains(ClassFlags::ABSTRACT)
	}

	pub fn is_value_type(&self) -> bool {
		self.flags.get().contains(ClassFlags::VALUE_TYPE)
	}

	pub fn is_inferred(&self) -> bool {
		self.flags.get().contains(ClassFlags::INFERRED)
	}

	/// Walks `base_class` links. Used by `is_subclass_of` and by access-control checks for
	/// `Protected` members (spec §4.E "Access control and safety").
	pub fn is_subclass_of(&self, other: &Class<'l>) -> bool {
		let mut current = self.base_class.get();
		loop {
			match current.class() {
				Some(base) => {
					if std::ptr::eq(base, other) {
						return true;
					}
					current = base.base_class.get();
				}
				None => return false,
			}
		}
	}

	/// Whether `self` (directly or through a base class) declares `interface` among its
	/// `declared_interfaces`, memoized per interface pointer (spec §3 "a resolved cache of
	/// interface-implementation checks"). Drives `TypeSystem::cast_tag`'s Box/Unbox-on-
	/// interface rule (spec §3 line "Upcast to interface on a value type inserts a Box
	/// cast...").
	pub fn implements(&self, interface: &'l Class<'l>) -> bool {
		let key = interface as *const Class as usize;
		if let Some(&cached) = self.implements_cache.borrow().get(&key) {
			return cached;
		}
		let declared = self.declared_interfaces.get().iter().any(|r| r.class().map(|c| std::ptr::eq(c, interface)).unwrap_or(false));
		let result = declared || self.base_class.get().class().map(|base| base.implements(interface)).unwrap_or(false);
		self.implements_cache.borrow_mut().insert(key, result);
		result
	}
}

impl Display for Class<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Display::fmt(&self.flat_name, f)
	}
}

macro_rules! impl_identity {
    ($($ty: ident),*) => {
		$(
			impl Eq for $ty<'_> {}

			impl PartialEq<Self> for $ty<'_> {
				#[inline]
				fn eq(&self, other: &Self) -> bool {
					std::ptr::eq(self, other)
				}
			}

			impl Hash for $ty<'_> {
				fn hash<H: Hasher>(&self, state: &mut H) {
					(self as *const Self).hash(state)
				}
			}
		)*
	};
}

impl_identity!(Class, Method);

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bump::Arena;
	use crate::strings::StringTable;

	fn make_class<'l>(arena: &'l Arena, strings: &StringTable<'l>, name: &str) -> &'l Class<'l> {
		arena.alloc(
			Class {
				flat_name: strings.intern_identifier(name),
				nice_name: None,
				primitive_tag: None,
				special_class: SpecialClass::None,
				access: Access::Public,
				flags: Cell::new(ClassFlags::empty()),
				base_class: Cell::new(TypeRef::Pending),
				wrapped_class: Cell::new(TypeRef::Pending),
				declared_interfaces: Cell::new(&[]),
				instance_fields: Cell::new(&[]),
				static_fields: Cell::new(&[]),
				instance_methods: Cell::new(&[]),
				static_methods: Cell::new(&[]),
				instance_ctors: Cell::new(&[]),
				instance_dtor: Cell::new(None),
				static_ctor: Cell::new(None),
				static_dtor: Cell::new(None),
				consts: Cell::new(&[]),
				event_fields: Cell::new(&[]),
				attributes: Cell::new(&[]),
				members: RefCell::new(FxHashMap::default()),
				instance_methods_by_name: RefCell::new(FxHashMap::default()),
				gc_info: RefCell::new(GCInfo::default()),
				vtable: Cell::new(None),
				implements_cache: RefCell::new(IntMap::default()),
				interface_impls: RefCell::new(FxHashMap::default()),
				hash_code_override: Cell::new(None),
				equals_override: Cell::new(None),
			},
			crate::bump::AllocationKind::Class,
		)
	}

	#[test]
	fn classes_compare_by_identity_not_name() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let a = make_class(&arena, &strings, "Foo");
		let b = make_class(&arena, &strings, "Foo");
		assert_ne!(a, b);
		assert_eq!(a, a);
	}

	#[test]
	fn subclass_walk_follows_base_class_chain() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let base = make_class(&arena, &strings, "Base");
		let derived = make_class(&arena, &strings, "Derived");
		derived.base_class.set(TypeRef::Resolved(base));
		assert!(derived.is_subclass_of(base));
		assert!(!base.is_subclass_of(derived));
	}

	#[test]
	fn implements_follows_declared_interfaces_and_base_chain() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let any = make_class(&arena, &strings, "Any");
		let base = make_class(&arena, &strings, "Base");
		base.declared_interfaces.set(arena.alloc_slice_copy(&[TypeRef::Resolved(any)]));
		let derived = make_class(&arena, &strings, "Derived");
		derived.base_class.set(TypeRef::Resolved(base));

		assert!(base.implements(any));
		assert!(derived.implements(any));
		assert!(!any.implements(base));
	}

	#[test]
	fn implements_result_is_memoized() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let any = make_class(&arena, &strings, "Any");
		let foo = make_class(&arena, &strings, "Foo");
		foo.declared_interfaces.set(arena.alloc_slice_copy(&[TypeRef::Resolved(any)]));

		assert!(foo.implements(any));
		assert!(foo.implements_cache.borrow().contains_key(&(any as *const Class as usize)));
		assert!(foo.implements(any));
	}
}
