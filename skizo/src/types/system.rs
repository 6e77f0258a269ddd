//! TypeSystem: the per-domain class registry plus the resolution/layout operations that
//! turn an unresolved [`TypeRef`] into a concrete [`Class`] and a finalized class into a
//! laid-out one.
//!
//! Grounded on the teacher's two-phase `TypePool`/`Type` resolution (a `Cell<TypeData>`
//! flipped from `Uninit` to `Init` on first lookup) for [`TypeSystem::resolve`], and on
//! `Class::CalcGCMap`'s recursive-then-word-align shape (`original_source/Class.cpp`) for
//! [`TypeSystem::calc_gc_map`].

use std::cell::RefCell;

use fxhash::FxHashMap;

use crate::bump::{AllocationKind, Arena};
use crate::errors::CompileError;
use crate::strings::StringTable;
use crate::types::class::{Class, ClassFlags, GCInfo, SpecialClass};
use crate::types::primitive::Primitive;
use crate::types::typeref::{Cast, CastTag, TypeRef};
use crate::utilities::round_to_multiple_of;

pub struct TypeSystem<'l> {
	arena: &'l Arena,
	strings: &'l StringTable<'l>,
	by_flat_name: RefCell<FxHashMap<&'l str, &'l Class<'l>>>,
	by_nice_name: RefCell<FxHashMap<&'l str, &'l Class<'l>>>,
	array_wrappers: RefCell<FxHashMap<(usize, u8), &'l Class<'l>>>,
	failable_wrappers: RefCell<FxHashMap<usize, &'l Class<'l>>>,
	boxed_wrappers: RefCell<FxHashMap<usize, &'l Class<'l>>>,
}

impl<'l> TypeSystem<'l> {
	pub fn new(arena: &'l Arena, strings: &'l StringTable<'l>) -> Self {
		Self {
			arena,
			strings,
			by_flat_name: RefCell::new(FxHashMap::default()),
			by_nice_name: RefCell::new(FxHashMap::default()),
			array_wrappers: RefCell::new(FxHashMap::default()),
			failable_wrappers: RefCell::new(FxHashMap::default()),
			boxed_wrappers: RefCell::new(FxHashMap::default()),
		}
	}

	pub fn register_class(&self, class: &'l Class<'l>) -> Result<(), CompileError> {
		let name = class.flat_name.as_str();
		let mut by_flat_name = self.by_flat_name.borrow_mut();
		if by_flat_name.contains_key(name) {
			return Err(CompileError::DuplicateType { name: name.to_string() });
		}
		by_flat_name.insert(name, class);
		drop(by_flat_name);

		if let Some(nice_name) = class.nice_name {
			self.by_nice_name.borrow_mut().entry(nice_name.as_str()).or_insert(class);
		}
		Ok(())
	}

	pub fn class_by_flat_name(&self, name: &str) -> Option<&'l Class<'l>> {
		self.by_flat_name.borrow().get(name).copied()
	}

	pub fn class_by_nice_name(&self, name: &str) -> Option<&'l Class<'l>> {
		self.by_nice_name.borrow().get(name).copied()
	}

	/// Every class registered so far, in unspecified order. Used by the emitter to walk
	/// the whole program once transformation has finished (spec §4.H).
	pub fn all_classes(&self) -> Vec<&'l Class<'l>> {
		self.by_flat_name.borrow().values().copied().collect()
	}

	/// Resolves a `TypeRef`, synthesizing Array/Failable/Boxed wrapper classes on demand
	/// (spec §4.C). Idempotent: resolving an already-`Resolved` ref is a no-op.
	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
	pub fn resolve(&self, type_ref: TypeRef<'l>) -> Result<TypeRef<'l>, CompileError> {
		let TypeRef::Unresolved { class_name, primitive, array_level, is_failable } = type_ref else {
			return Ok(type_ref);
		};

		let mut base = match primitive {
			Some(tag) => self.primitive_class(tag),
			None => self
				.class_by_flat_name(class_name.as_str())
				.ok_or_else(|| CompileError::UnknownType { name: class_name.to_string(), at: Default::default() })?,
		};

		for _ in 0..array_level {
			base = self.array_wrapper_of(base);
		}

		if is_failable {
			base = self.failable_wrapper_of(base);
		}

		Ok(TypeRef::Resolved(base))
	}

	/// The built-in classes every domain starts with are registered during `[Init basic
	/// classes]` (spec §4.J); `primitive_class` maps a bare primitive tag back to its
	/// already-registered shell.
	fn primitive_class(&self, tag: Primitive) -> &'l Class<'l> {
		let name = tag.to_string();
		self.class_by_flat_name(&name).unwrap_or_else(|| panic!("primitive class `{name}` was not registered during domain init"))
	}

	fn array_wrapper_of(&self, element: &'l Class<'l>) -> &'l Class<'l> {
		let key = (element as *const Class as usize, 1u8);
		if let Some(existing) = self.array_wrappers.borrow().get(&key) {
			return existing;
		}

		let flat_name = self.strings.intern_identifier(&format!("{element}[]"));
		let wrapper = self.arena.alloc(Class::shell(flat_name, SpecialClass::Array), AllocationKind::Class);
		wrapper.wrapped_class.set(TypeRef::Resolved(element));
		self.array_wrappers.borrow_mut().insert(key, wrapper);
		wrapper
	}

	fn failable_wrapper_of(&self, inner: &'l Class<'l>) -> &'l Class<'l> {
		let key = inner as *const Class as usize;
		if let Some(existing) = self.failable_wrappers.borrow().get(&key) {
			return existing;
		}

		let flat_name = self.strings.intern_identifier(&format!("{inner}!"));
		let wrapper = self.arena.alloc(Class::shell(flat_name, SpecialClass::Failable), AllocationKind::Class);
		wrapper.wrapped_class.set(TypeRef::Resolved(inner));
		wrapper.flags.set(wrapper.flags.get() | ClassFlags::VALUE_TYPE);
		self.failable_wrappers.borrow_mut().insert(key, wrapper);
		wrapper
	}

	/// A boxed form copies the value type's method table so the heap-allocated box still
	/// dispatches polymorphically (spec §4.C).
	pub fn boxed_wrapper_of(&self, value_type: &'l Class<'l>) -> &'l Class<'l> {
		let key = value_type as *const Class as usize;
		if let Some(existing) = self.boxed_wrappers.borrow().get(&key) {
			return existing;
		}

		let flat_name = self.strings.intern_identifier(&format!("Boxed<{value_type}>"));
		let wrapper = self.arena.alloc(Class::shell(flat_name, SpecialClass::Boxed), AllocationKind::Class);
		wrapper.wrapped_class.set(TypeRef::Resolved(value_type));
		wrapper.instance_methods.set(value_type.instance_methods.get());
		self.boxed_wrappers.borrow_mut().insert(key, wrapper);
		wrapper
	}

	/// Prepends the base class's virtual methods into `class`'s method-by-name map,
	/// overriding in place so an override keeps its base's vtable index, then rejects
	/// signature mismatches, private overrides, and non-abstract classes still carrying
	/// abstract virtuals (spec §4.C).
	pub fn make_sure_methods_finalized(&self, class: &'l Class<'l>) -> Result<(), CompileError> {
		if class.flags.get().contains(ClassFlags::METHOD_LIST_FINAL) {
			return Ok(());
		}

		let mut by_name = FxHashMap::default();

		if let Some(base) = class.base_class.get().class() {
			self.make_sure_methods_finalized(base)?;
			for (name, method) in base.instance_methods_by_name.borrow().iter() {
				by_name.insert(*name, *method);
			}
		}

		let mut next_vtable_index = by_name.len() as u32;
		for method in class.instance_methods.get() {
			let name = method.name.as_str();
			if let Some(base_method) = by_name.get(name) {
				if base_method.signature.parameters.len() != method.signature.parameters.len() {
					return Err(CompileError::BadOverride {
						method: name.to_string(),
						class: class.flat_name.to_string(),
					});
				}
				if base_method.access == crate::types::class::Access::Private {
					return Err(CompileError::BadOverride {
						method: name.to_string(),
						class: class.flat_name.to_string(),
					});
				}
				method.vtable_index.set(base_method.vtable_index.get());
			} else {
				method.vtable_index.set(Some(next_vtable_index));
				next_vtable_index += 1;
			}
			by_name.insert(name, method);
		}

		if !class.is_abstract() {
			for method in by_name.values() {
				if method.flags.get().contains(crate::types::class::MethodFlags::ABSTRACT) {
					return Err(CompileError::MissingAbstractImpl {
						class: class.flat_name.to_string(),
						method: method.name.to_string(),
					});
				}
			}
		}

		*class.instance_methods_by_name.borrow_mut() = by_name;
		class.flags.set(class.flags.get() | ClassFlags::METHOD_LIST_FINAL);
		Ok(())
	}

	/// Recursively ensures base and field classes have GC maps, word-aligns every field
	/// offset, and builds this class's own map: the base class's map prepended, or one
	/// word reserved for the vtable pointer if this is a hierarchy root.
	pub fn calc_gc_map(&self, class: &'l Class<'l>) -> Result<(), CompileError> {
		if class.flags.get().contains(ClassFlags::SIZE_CALCULATED) {
			return Ok(());
		}

		let mut offsets = Vec::new();
		let mut offset = 0usize;

		match class.base_class.get().class() {
			Some(base) => {
				self.calc_gc_map(base)?;
				let base_info = base.gc_info.borrow();
				offsets.extend_from_slice(base_info.gc_map);
				offset = base_info.content_size;
			}
			None if !class.is_value_type() => {
				offset = size_of::<usize>();
			}
			None => {}
		}

		for field in class.instance_fields.get() {
			offset = round_to_multiple_of::<{ size_of::<usize>() }>(offset);
			field.offset.set(offset as u32);

			if let Some(field_class) = field.ty.class() {
				self.calc_gc_map(field_class)?;
				if field_class.is_value_type() {
					for child_offset in field_class.gc_info.borrow().gc_map {
						offsets.push(offset as u32 + child_offset);
					}
					offset += field_class.gc_info.borrow().content_size;
				} else {
					offsets.push(offset as u32);
					offset += size_of::<usize>();
				}
			} else {
				offset += field.ty_primitive_size();
			}
		}

		let content_size = round_to_multiple_of::<{ size_of::<usize>() }>(offset);
		let size_for_use = if class.is_value_type() { content_size } else { size_of::<usize>() };

		*class.gc_info.borrow_mut() = GCInfo {
			content_size,
			size_for_use,
			gc_map: self.arena.alloc_slice_copy(&offsets),
		};
		class.flags.set(class.flags.get() | ClassFlags::SIZE_CALCULATED);
		Ok(())
	}

	/// Classifies the conversion from `from` to `to`, consumed by the transformer to
	/// decide which implicit-conversion node to insert and by the emitter to pick the
	/// runtime helper (spec §3, §4.E.4).
	pub fn cast_tag(&self, from: &'l Class<'l>, to: &'l Class<'l>) -> Cast {
		if std::ptr::eq(from, to) {
			return Cast { tag: CastTag::NoCast, castable: true };
		}
		// Wrapping a plain value (or an error object) into a Failable (spec §3 line 89:
		// "Value-to-Failable or Error-to-Failable insert a synthetic call to
		// createFromValue/createFromError"). The reverse direction (reading a Failable's
		// success value back out) is `Unpack`, below.
		if to.special_class == SpecialClass::Failable && from.special_class != SpecialClass::Failable {
			let wraps_matching_value = to
				.wrapped_class
				.get()
				.class()
				.map(|wrapped| std::ptr::eq(from, wrapped) || from.is_subclass_of(wrapped))
				.unwrap_or(false);
			let tag = if wraps_matching_value { CastTag::ValueToFailable } else { CastTag::ErrorToFailable };
			return Cast { tag, castable: true };
		}
		if from.special_class == SpecialClass::Failable && to.special_class != SpecialClass::Failable {
			return Cast { tag: CastTag::Unpack, castable: true };
		}
		// Interface casts (spec §3 line 90: "Upcast to interface on a value type inserts a
		// Box cast; downcast from interface to value type inserts an Unbox"). A reference
		// type just upcasts/downcasts against the interface's vtable like any other class.
		if to.special_class == SpecialClass::Interface && from.implements(to) {
			let tag = if from.is_value_type() { CastTag::Box } else { CastTag::Upcast };
			return Cast { tag, castable: true };
		}
		if from.special_class == SpecialClass::Interface && to.implements(from) {
			let tag = if to.is_value_type() { CastTag::Unbox } else { CastTag::Downcast };
			return Cast { tag, castable: true };
		}
		if from.is_subclass_of(to) {
			return Cast { tag: CastTag::Upcast, castable: true };
		}
		if to.is_subclass_of(from) {
			return Cast { tag: CastTag::Downcast, castable: true };
		}
		if from.special_class == SpecialClass::Boxed && std::ptr::eq(from.wrapped_class.get().class().unwrap_or(from), to) {
			return Cast { tag: CastTag::Unbox, castable: true };
		}
		if to.special_class == SpecialClass::Boxed && std::ptr::eq(to.wrapped_class.get().class().unwrap_or(to), from) {
			return Cast { tag: CastTag::Box, castable: true };
		}
		Cast { tag: CastTag::NoCast, castable: false }
	}
}

impl<'l> Class<'l> {
	/// An empty, not-yet-populated class shell: used both by `TypeSystem`'s wrapper
	/// synthesis and by the parser-facing class builder (out of scope here) to allocate a
	/// class before its members are known, matching the teacher's two-step "allocate shell,
	/// `Cell::set` the members later" construction in `structured::types::load_type_defs`.
	pub fn shell(flat_name: crate::strings::StringSlice<'l>, special_class: SpecialClass) -> Self {
		use std::cell::{Cell, RefCell};
		Class {
			flat_name,
			nice_name: None,
			primitive_tag: None,
			special_class,
			access: crate::types::class::Access::Public,
			flags: Cell::new(ClassFlags::COMPILER_GENERATED),
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
			implements_cache: RefCell::new(nohash_hasher::IntMap::default()),
			interface_impls: RefCell::new(FxHashMap::default()),
			hash_code_override: Cell::new(None),
			equals_override: Cell::new(None),
		}
	}

	fn ty_primitive_size(&self) -> usize {
		self.primitive_tag.map(Primitive::size_for_use).unwrap_or(size_of::<usize>())
	}
}

impl crate::types::class::Field<'_> {
	fn ty_primitive_size(&self) -> usize {
		match self.ty {
			TypeRef::Resolved(class) => class.gc_info.borrow().content_size,
			TypeRef::Unresolved { primitive: Some(p), .. } => p.size_for_use(),
			_ => size_of::<usize>(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::strings::StringTable;
	use crate::types::class::Access;

	fn bootstrap<'l>(arena: &'l Arena, strings: &'l StringTable<'l>) -> TypeSystem<'l> {
		let system = TypeSystem::new(arena, strings);
		for tag in [Primitive::Int, Primitive::Float, Primitive::Bool, Primitive::Char, Primitive::IntPtr, Primitive::Void, Primitive::Object] {
			let name = strings.intern_identifier(&tag.to_string());
			let mut class = Class::shell(name, SpecialClass::None);
			class.primitive_tag = Some(tag);
			class.access = Access::Public;
			if tag != Primitive::Object {
				class.flags.set(class.flags.get() | ClassFlags::VALUE_TYPE);
			}
			system.register_class(arena.alloc(class, AllocationKind::Class)).unwrap();
		}
		system
	}

	#[test]
	fn duplicate_flat_name_is_rejected() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let system = bootstrap(&arena, &strings);
		let name = strings.intern_identifier("int");
		let dup = arena.alloc(Class::shell(name, SpecialClass::None), AllocationKind::Class);
		assert!(matches!(system.register_class(dup), Err(CompileError::DuplicateType { .. })));
	}

	#[test]
	fn resolving_an_array_type_ref_synthesizes_a_wrapper_once() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let system = bootstrap(&arena, &strings);
		let int_ref = TypeRef::Unresolved {
			class_name: crate::strings::StringSlice::empty(),
			primitive: Some(Primitive::Int),
			array_level: 1,
			is_failable: false,
		};
		let a = system.resolve(int_ref).unwrap();
		let b = system.resolve(int_ref).unwrap();
		assert_eq!(a, b);
		assert!(matches!(a, TypeRef::Resolved(c) if c.special_class == SpecialClass::Array));
	}

	#[test]
	fn unknown_class_name_fails_resolution() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let system = bootstrap(&arena, &strings);
		let name = strings.intern_identifier("DoesNotExist");
		let result = system.resolve(TypeRef::named(name));
		assert!(matches!(result, Err(CompileError::UnknownType { .. })));
	}

	#[test]
	fn gc_map_prepends_base_class_offsets() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let system = bootstrap(&arena, &strings);

		let object = system.class_by_flat_name("object").unwrap();
		let base_name = strings.intern_identifier("Base");
		let base = arena.alloc(Class::shell(base_name, SpecialClass::None), AllocationKind::Class);
		base.base_class.set(TypeRef::Resolved(object));
		system.calc_gc_map(base).unwrap();

		let derived_name = strings.intern_identifier("Derived");
		let derived = arena.alloc(Class::shell(derived_name, SpecialClass::None), AllocationKind::Class);
		derived.base_class.set(TypeRef::Resolved(base));
		system.calc_gc_map(derived).unwrap();

		assert_eq!(derived.gc_info.borrow().content_size, base.gc_info.borrow().content_size);
	}
}
