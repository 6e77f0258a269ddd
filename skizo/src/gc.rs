//! Component F: the precise, stop-the-world, mark-sweep MemoryManager.
//!
//! Grounded on `original_source/Class.cpp`'s `CalcGCMap`/GC-offset-list design (consumed
//! here via [`crate::types::class::GCInfo`]) and on the teacher's own bump-arena-vs-GC-heap
//! split: metadata lives in the [`crate::bump::Arena`] and is never swept; only managed
//! *instances* live on this heap and are subject to collection (spec §3 "Lifecycles").

use std::alloc::Layout;
use std::cell::{Cell, RefCell};

use fxhash::FxHashSet;

use crate::types::class::{Class, SpecialClass};

/// Opaque handle to a managed heap allocation. The first word at this address is always a
/// vtable pointer whose own slot 0 is the owning [`Class`] (spec §3 invariant).
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ManagedObject(*mut u8);

impl ManagedObject {
	/// Wraps a raw pointer previously handed out by this same GC (e.g. crossing the FFI
	/// boundary and back in).
	#[inline]
	pub fn from_raw(ptr: *mut u8) -> Self {
		Self(ptr)
	}

	#[inline]
	pub fn as_ptr(&self) -> *mut u8 {
		self.0
	}

	fn addr(&self) -> usize {
		self.0 as usize
	}
}

/// A class's vtable, as materialized by the backend after compilation. `class` occupies
/// slot 0 per spec §3; `finalizer` is the compiled destructor, called during sweep with
/// virtual dispatch already resolved by the emitter (spec §4.F "Sweeping").
#[repr(C)]
pub struct VTable<'l> {
	pub class: &'l Class<'l>,
	pub finalizer: Option<extern "C" fn(ManagedObject)>,
}

struct Allocation<'l> {
	object: ManagedObject,
	layout: Layout,
	vtable: &'l VTable<'l>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionStats {
	pub bytes_before: usize,
	pub bytes_after: usize,
	pub live_objects: usize,
}

/// The stack base is supplied by the domain at creation (spec §4.F "Roots"). Because the
/// managed program's native stack is owned by compiled C code produced through the
/// [`crate::backend::CodeBackend`] abstraction rather than by this process's own call
/// stack, conservative root scanning here takes an explicit memory snapshot instead of
/// reading raw stack pointers — the same contract the generated prolog's `gc_roots` call
/// satisfies for precise roots.
pub struct MemoryManager<'l> {
	allocations: RefCell<Vec<Allocation<'l>>>,
	bytes_allocated: Cell<usize>,
	bytes_since_collection: Cell<usize>,
	collection_threshold: usize,
	explicit_roots: RefCell<Vec<ManagedObject>>,
	permanent_roots: RefCell<Vec<ManagedObject>>,
	stats: RefCell<Vec<CollectionStats>>,
}

impl<'l> MemoryManager<'l> {
	pub fn new(collection_threshold: usize) -> Self {
		Self {
			allocations: RefCell::new(Vec::new()),
			bytes_allocated: Cell::new(0),
			bytes_since_collection: Cell::new(0),
			collection_threshold,
			explicit_roots: RefCell::new(Vec::new()),
			permanent_roots: RefCell::new(Vec::new()),
			stats: RefCell::new(Vec::new()),
		}
	}

	/// `gc_alloc(size, vtable)`: returns a zero-initialized block whose first word is
	/// `vtable`. Triggers a collection first if the allocated-bytes delta since the last
	/// collection exceeds the configured threshold (spec §4.F "Allocation").
	pub fn alloc(&self, size: usize, vtable: &'l VTable<'l>, conservative_roots: &[usize]) -> ManagedObject {
		if self.bytes_since_collection.get() > self.collection_threshold {
			self.collect(conservative_roots);
		}

		let layout = Layout::from_size_align(size.max(size_of::<usize>()), size_of::<usize>()).unwrap();
		let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
		assert!(!ptr.is_null(), "out of memory");
		unsafe {
			*(ptr as *mut *const VTable) = vtable as *const VTable;
		}

		let object = ManagedObject(ptr);
		self.allocations.borrow_mut().push(Allocation { object, layout, vtable });
		self.bytes_allocated.set(self.bytes_allocated.get() + size);
		self.bytes_since_collection.set(self.bytes_since_collection.get() + size);
		object
	}

	pub fn add_root(&self, object: ManagedObject) {
		self.explicit_roots.borrow_mut().push(object);
	}

	pub fn remove_root(&self, object: ManagedObject) {
		self.explicit_roots.borrow_mut().retain(|r| *r != object);
	}

	/// Interned string literals and the intrinsic Map instances are permanent roots (spec
	/// §4.F "Roots").
	pub fn add_permanent_root(&self, object: ManagedObject) {
		self.permanent_roots.borrow_mut().push(object);
	}

	pub fn bytes_allocated(&self) -> usize {
		self.bytes_allocated.get()
	}

	pub fn stats(&self) -> Vec<CollectionStats> {
		self.stats.borrow().clone()
	}

	/// Runs one mark-sweep cycle. `conservative_roots` are addresses conservatively scanned
	/// from the managed program's native stack; any that land inside a live allocation are
	/// treated as a root (false positives cost only retention, since this GC never moves
	/// objects).
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn collect(&self, conservative_roots: &[usize]) -> CollectionStats {
		let bytes_before = self.bytes_allocated.get();
		let marked = self.mark(conservative_roots);
		let stats = self.sweep(&marked, bytes_before);
		self.bytes_since_collection.set(0);
		#[cfg(feature = "tracing")]
		tracing::info!(bytes_before, bytes_after = stats.bytes_after, live = stats.live_objects, "collection finished");
		self.stats.borrow_mut().push(stats);
		stats
	}

	/// Domain teardown: mark-and-sweep with every root dropped, finalizing all remaining
	/// objects in reverse allocation order (spec §4.F "Judgement day").
	pub fn judgement_day(&self) {
		let allocations = self.allocations.borrow();
		for allocation in allocations.iter().rev() {
			if let Some(finalizer) = allocation.vtable.finalizer {
				finalizer(allocation.object);
			}
		}
		drop(allocations);
		for allocation in self.allocations.borrow_mut().drain(..) {
			unsafe { std::alloc::dealloc(allocation.object.as_ptr(), allocation.layout) };
		}
		self.bytes_allocated.set(0);
	}

	fn mark(&self, conservative_roots: &[usize]) -> FxHashSet<usize> {
		let by_addr: FxHashSet<usize> = self.allocations.borrow().iter().map(|a| a.object.addr()).collect();

		let mut worklist: Vec<ManagedObject> = self.explicit_roots.borrow().clone();
		worklist.extend(self.permanent_roots.borrow().iter().copied());
		for &addr in conservative_roots {
			if by_addr.contains(&addr) {
				worklist.push(ManagedObject(addr as *mut u8));
			}
		}

		let mut marked = FxHashSet::default();
		while let Some(object) = worklist.pop() {
			if !marked.insert(object.addr()) {
				continue;
			}
			for child in self.children_of(object) {
				if by_addr.contains(&child.addr()) {
					worklist.push(child);
				}
			}
		}
		marked
	}

	/// Follows the owning class's GCMap offsets to discover child pointers; arrays use the
	/// wrapped class's map for value-type elements or one pointer per element otherwise
	/// (spec §4.F "Marking").
	fn children_of(&self, object: ManagedObject) -> Vec<ManagedObject> {
		let vtable = unsafe { &**(object.as_ptr() as *const *const VTable) };
		let class = vtable.class;
		let mut children = Vec::new();

		if class.special_class == SpecialClass::Array {
			let length = unsafe { *(object.as_ptr().add(size_of::<usize>()) as *const usize) };
			let wrapped = class.wrapped_class.get().class();
			let element_is_pointer = wrapped.map(|c| !c.is_value_type()).unwrap_or(true);
			let elements_base = unsafe { object.as_ptr().add(2 * size_of::<usize>()) };
			if element_is_pointer {
				let base = elements_base as *const *mut u8;
				for i in 0..length {
					let word = unsafe { *base.add(i) };
					if !word.is_null() {
						children.push(ManagedObject(word));
					}
				}
			} else if let Some(wrapped) = wrapped {
				// Value-type elements: each slot is an inline copy of the element, so the
				// element's own GCMap is re-walked at every slot's offset instead of treating
				// the slot itself as a pointer (spec §4.F "Marking").
				let element_size = wrapped.gc_info.borrow().content_size;
				let gc_map = wrapped.gc_info.borrow().gc_map;
				for i in 0..length {
					let element_base = unsafe { elements_base.add(i * element_size) };
					for &offset in gc_map {
						let word = unsafe { *(element_base.add(offset as usize) as *const *mut u8) };
						if !word.is_null() {
							children.push(ManagedObject(word));
						}
					}
				}
			}
			return children;
		}

		for &offset in class.gc_info.borrow().gc_map {
			let word = unsafe { *(object.as_ptr().add(offset as usize) as *const *mut u8) };
			if !word.is_null() {
				children.push(ManagedObject(word));
			}
		}
		children
	}

	fn sweep(&self, marked: &FxHashSet<usize>, bytes_before: usize) -> CollectionStats {
		let mut allocations = self.allocations.borrow_mut();
		let mut bytes_after = 0usize;
		let mut live_objects = 0usize;

		allocations.retain(|allocation| {
			if marked.contains(&allocation.object.addr()) {
				bytes_after += allocation.layout.size();
				live_objects += 1;
				true
			} else {
				if let Some(finalizer) = allocation.vtable.finalizer {
					finalizer(allocation.object);
				}
				unsafe { std::alloc::dealloc(allocation.object.as_ptr(), allocation.layout) };
				false
			}
		});

		self.bytes_allocated.set(bytes_after);
		CollectionStats { bytes_before, bytes_after, live_objects }
	}
}

impl Drop for MemoryManager<'_> {
	fn drop(&mut self) {
		for allocation in self.allocations.borrow_mut().drain(..) {
			unsafe { std::alloc::dealloc(allocation.object.as_ptr(), allocation.layout) };
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bump::{AllocationKind, Arena};
	use crate::strings::StringTable;
	use crate::types::class::SpecialClass;

	fn leaf_class<'l>(arena: &'l Arena, strings: &StringTable<'l>, name: &str) -> &'l Class<'l> {
		arena.alloc(Class::shell(strings.intern_identifier(name), SpecialClass::None), AllocationKind::Class)
	}

	#[test]
	fn unrooted_object_is_swept() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let class = leaf_class(&arena, &strings, "Foo");
		let vtable = arena.alloc(VTable { class, finalizer: None }, AllocationKind::Class);

		let gc = MemoryManager::new(usize::MAX);
		gc.alloc(16, vtable, &[]);
		assert_eq!(gc.bytes_allocated(), 16);

		let stats = gc.collect(&[]);
		assert_eq!(stats.live_objects, 0);
		assert_eq!(gc.bytes_allocated(), 0);
	}

	#[test]
	fn explicitly_rooted_object_survives_collection() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let class = leaf_class(&arena, &strings, "Foo");
		let vtable = arena.alloc(VTable { class, finalizer: None }, AllocationKind::Class);

		let gc = MemoryManager::new(usize::MAX);
		let object = gc.alloc(16, vtable, &[]);
		gc.add_root(object);

		let stats = gc.collect(&[]);
		assert_eq!(stats.live_objects, 1);

		gc.remove_root(object);
		let stats = gc.collect(&[]);
		assert_eq!(stats.live_objects, 0);
	}

	#[test]
	fn judgement_day_finalizes_every_remaining_object() {
		use std::sync::atomic::{AtomicUsize, Ordering};
		static FINALIZED: AtomicUsize = AtomicUsize::new(0);
		extern "C" fn finalize(_obj: ManagedObject) {
			FINALIZED.fetch_add(1, Ordering::SeqCst);
		}

		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let class = leaf_class(&arena, &strings, "Foo");
		let vtable = arena.alloc(VTable { class, finalizer: Some(finalize) }, AllocationKind::Class);

		let gc = MemoryManager::new(usize::MAX);
		gc.alloc(16, vtable, &[]);
		gc.alloc(16, vtable, &[]);
		gc.judgement_day();
		assert_eq!(FINALIZED.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn array_of_value_type_elements_walks_the_element_class_gc_map() {
		use crate::types::class::{ClassFlags, GCInfo};
		use crate::types::typeref::TypeRef;

		let arena = Arena::new();
		let strings = StringTable::new(&arena);

		let child_class = leaf_class(&arena, &strings, "Widget");
		let child_vtable = arena.alloc(VTable { class: child_class, finalizer: None }, AllocationKind::Class);

		let pair_class = arena.alloc(Class::shell(strings.intern_identifier("Pair"), SpecialClass::None), AllocationKind::Class);
		pair_class.flags.set(pair_class.flags.get() | ClassFlags::VALUE_TYPE);
		let element_size = 2 * size_of::<usize>();
		*pair_class.gc_info.borrow_mut() = GCInfo { content_size: element_size, size_for_use: element_size, gc_map: arena.alloc_slice_copy(&[0u32]) };

		let array_class = arena.alloc(Class::shell(strings.intern_identifier("Pair[]"), SpecialClass::Array), AllocationKind::Class);
		array_class.wrapped_class.set(TypeRef::Resolved(pair_class));
		let array_vtable = arena.alloc(VTable { class: array_class, finalizer: None }, AllocationKind::Class);

		let gc = MemoryManager::new(usize::MAX);
		let child = gc.alloc(16, child_vtable, &[]);

		let array_size = 2 * size_of::<usize>() + element_size;
		let array = gc.alloc(array_size, array_vtable, &[]);
		unsafe {
			*(array.as_ptr().add(size_of::<usize>()) as *mut usize) = 1;
			let elements_base = array.as_ptr().add(2 * size_of::<usize>());
			*(elements_base as *mut *mut u8) = child.as_ptr();
		}
		gc.add_root(array);

		let stats = gc.collect(&[]);
		assert_eq!(stats.live_objects, 2, "the value-type element's pointer field must keep its child alive");
	}
}
