//! Component K: the embedding API. A stable, `repr(C)` surface an embedder links against
//! to create a domain, run a program, and inspect the GC/profiling/debugging state without
//! ever touching a Rust lifetime.
//!
//! Grounded on the teacher's `ffi::containers` wrapper types (kept verbatim: they're
//! generic ABI plumbing, not domain logic) and on the `Pin<Box<_>>` + lifetime-transmute
//! trick used throughout this crate (`bump::Arena::bump`, the old `structured::Context::bump`)
//! to let one owned, boxed value hand out long-lived references to itself — generalized here
//! to own an entire domain behind one opaque handle instead of just an arena.

pub mod containers;

use std::ffi::{c_char, CStr, CString};
use std::mem::size_of;
use std::path::PathBuf;
use std::pin::Pin;

use crate::backend::{CodeBackend, NativeHostServices};
use crate::bump::Arena;
use crate::domain::profiling::{ProfileEntry, SortKey};
use crate::domain::{Domain, DomainOptions};
use crate::errors::CompileError;
use crate::ffi::containers::BoxSlice;
use crate::gc::{CollectionStats, ManagedObject, VTable};
use crate::strings::StringTable;

/// Owns everything a [`Domain`] borrows from, pinned so the `'static`-claiming references
/// handed to the contained `Domain` stay valid for the handle's lifetime. Never moved once
/// boxed; `SkizoDomain::create` is the only constructor and it returns a raw pointer
/// immediately.
pub struct SkizoDomain {
	arena: Pin<Box<Arena>>,
	strings: Pin<Box<StringTable<'static>>>,
	domain: Option<Domain<'static>>,
}

/// Opaque handle exported to C. Never dereferenced by the embedder; only passed back into
/// `skizo_*` calls.
#[repr(transparent)]
pub struct SkizoDomainHandle(*mut SkizoDomain);

struct NullBackend;
impl CodeBackend for NullBackend {
	fn compile(&mut self, unit: crate::backend::CompileUnit) -> Result<Box<dyn crate::backend::CodeImage>, CompileError> {
		let _ = unit;
		Err(CompileError::UnknownType { name: "<no backend configured>".to_string(), at: Default::default() })
	}
}

/// Creates a domain rooted at `base_module_path`, trusted by default (spec §4.K "create
/// domain"). Fails (returns a null handle) if this thread already owns a domain (spec §5).
#[no_mangle]
pub extern "C" fn skizo_create_domain(base_module_path: *const c_char) -> SkizoDomainHandle {
	let path = unsafe { CStr::from_ptr(base_module_path) }.to_string_lossy().into_owned();

	let arena = Pin::new(Box::new(Arena::new()));
	let arena_ref: &'static Arena = unsafe { std::mem::transmute(&*arena) };
	let strings = Pin::new(Box::new(StringTable::new(arena_ref)));
	let strings_ref: &'static StringTable<'static> = unsafe { std::mem::transmute(&*strings) };

	let options = DomainOptions { base_module_path: PathBuf::from(path), ..DomainOptions::default() };
	let domain = match Domain::create(arena_ref, strings_ref, options) {
		Ok(domain) => domain,
		Err(_) => return SkizoDomainHandle(std::ptr::null_mut()),
	};

	let boxed = Box::new(SkizoDomain { arena, strings, domain: Some(domain) });
	SkizoDomainHandle(Box::into_raw(boxed))
}

/// Runs the full create-to-entry-point pipeline against `source` and returns whether the
/// entry point completed without aborting (spec §4.J `InvokeEntryPoint`).
///
/// # Safety
/// `handle` must be a live handle returned by [`skizo_create_domain`] and not yet passed to
/// [`skizo_close_domain`].
#[no_mangle]
pub unsafe extern "C" fn skizo_invoke_entry_point(handle: SkizoDomainHandle, source: *const c_char) -> bool {
	let Some(state) = handle.0.as_ref() else { return false };
	let Some(domain) = state.domain.as_ref() else { return false };
	let source = CStr::from_ptr(source).to_string_lossy();
	let mut backend = NullBackend;
	let host = NativeHostServices;
	domain.invoke_entry_point(&mut backend, &host, &source, None).unwrap_or(false)
}

/// Closes the domain: runs the judgement-day GC pass and frees every resource the handle
/// owns (spec §4.J, §3 "Lifecycles").
///
/// # Safety
/// `handle` must not be used again after this call.
#[no_mangle]
pub unsafe extern "C" fn skizo_close_domain(handle: SkizoDomainHandle) {
	if handle.0.is_null() {
		return;
	}
	let mut state = Box::from_raw(handle.0);
	if let Some(domain) = state.domain.take() {
		domain.close();
	}
}

/// Returns the last abort message recorded on this thread, or null if none (spec §4.K "get
/// last error string"). The returned pointer is valid until the next call on this thread.
#[no_mangle]
pub extern "C" fn skizo_get_last_error() -> *mut c_char {
	match Domain::last_error() {
		Some(message) => CString::new(message).unwrap_or_default().into_raw(),
		None => std::ptr::null_mut(),
	}
}

/// Frees a string previously returned by `skizo_get_last_error`.
///
/// # Safety
/// `message` must be a pointer returned by `skizo_get_last_error`, or null.
#[no_mangle]
pub unsafe extern "C" fn skizo_free_string(message: *mut c_char) {
	if !message.is_null() {
		drop(CString::from_raw(message));
	}
}

/// Registers `object` as a GC root (spec §4.K "add/remove GC root").
///
/// # Safety
/// `handle` must be live and `object` must be a pointer this domain's GC returned.
#[no_mangle]
pub unsafe extern "C" fn skizo_gc_add_root(handle: SkizoDomainHandle, object: *mut u8) {
	let Some(state) = handle.0.as_ref() else { return };
	let Some(domain) = state.domain.as_ref() else { return };
	domain.gc().add_root(ManagedObject::from_raw(object));
}

/// # Safety
/// Same contract as [`skizo_gc_add_root`].
#[no_mangle]
pub unsafe extern "C" fn skizo_gc_remove_root(handle: SkizoDomainHandle, object: *mut u8) {
	let Some(state) = handle.0.as_ref() else { return };
	let Some(domain) = state.domain.as_ref() else { return };
	domain.gc().remove_root(ManagedObject::from_raw(object));
}

/// Forces an immediate collection (spec §4.K "force collect").
///
/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn skizo_gc_collect(handle: SkizoDomainHandle) {
	let Some(state) = handle.0.as_ref() else { return };
	let Some(domain) = state.domain.as_ref() else { return };
	domain.gc().collect(&[]);
}

/// Returns every collection recorded so far, oldest first (spec §4.K "fetch profiling/GC
/// data"). Ownership of the returned slice passes to the caller; free it with
/// `skizo_free_gc_stats`.
///
/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn skizo_get_gc_stats(handle: SkizoDomainHandle) -> BoxSlice<CollectionStats> {
	let Some(state) = handle.0.as_ref() else { return BoxSlice::from(Vec::new()) };
	let Some(domain) = state.domain.as_ref() else { return BoxSlice::from(Vec::new()) };
	BoxSlice::from(domain.gc().stats())
}

/// Frees a slice previously returned by `skizo_get_gc_stats`.
///
/// # Safety
/// `stats` must be a value returned by `skizo_get_gc_stats`, consumed exactly once.
#[no_mangle]
pub unsafe extern "C" fn skizo_free_gc_stats(stats: BoxSlice<CollectionStats>) {
	drop(stats);
}

/// A C-friendly snapshot of one [`ProfileEntry`] (spec §4.K "fetch profiling data").
/// `method_name` is owned by the caller and must be released with `skizo_free_string`.
#[repr(C)]
pub struct SkizoProfileEntry {
	pub method_name: *mut c_char,
	pub call_count: u64,
	pub total_time_ns: u64,
	pub average_time_ns: u64,
}

impl From<ProfileEntry> for SkizoProfileEntry {
	fn from(entry: ProfileEntry) -> Self {
		Self {
			method_name: CString::new(entry.method_name).unwrap_or_default().into_raw(),
			call_count: entry.profile.call_count,
			total_time_ns: entry.profile.total_time_ns,
			average_time_ns: entry.profile.average_time_ns(),
		}
	}
}

/// Sort keys an embedder can request a profiling fetch in (spec §4.K, §11 "sortable views").
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SkizoProfileSortKey {
	TotalTime,
	AverageTime,
	CallCount,
}

impl From<SkizoProfileSortKey> for SortKey {
	fn from(key: SkizoProfileSortKey) -> Self {
		match key {
			SkizoProfileSortKey::TotalTime => SortKey::TotalTime,
			SkizoProfileSortKey::AverageTime => SortKey::AverageTime,
			SkizoProfileSortKey::CallCount => SortKey::CallCount,
		}
	}
}

/// Reports one method call's timing into this domain's [`crate::domain::profiling::ProfilingInfo`].
/// Called from the instrumentation the backend links against the emitted `_soX_pushframe`/
/// `_soX_popframe` pair when profiling is enabled (spec §4.H): the generated C runs outside
/// this crate once compiled, so timing data crosses back in through this call rather than a
/// direct Rust call.
///
/// # Safety
/// `handle` must be live; `method_name` must be a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn skizo_profiling_record(handle: SkizoDomainHandle, method_name: *const c_char, elapsed_ns: u64) {
	let Some(state) = handle.0.as_ref() else { return };
	let Some(domain) = state.domain.as_ref() else { return };
	let name = CStr::from_ptr(method_name).to_string_lossy();
	domain.profiling().record_call(&name, elapsed_ns);
}

/// Fetches every recorded method's profile, sorted by `key` (spec §4.K "fetch/sort profiling
/// data"). Ownership passes to the caller; free with `skizo_free_profile_entries`.
///
/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn skizo_profiling_fetch_sorted(handle: SkizoDomainHandle, key: SkizoProfileSortKey) -> BoxSlice<SkizoProfileEntry> {
	let Some(state) = handle.0.as_ref() else { return BoxSlice::from(Vec::new()) };
	let Some(domain) = state.domain.as_ref() else { return BoxSlice::from(Vec::new()) };
	let entries: Vec<SkizoProfileEntry> = domain.profiling().entries_sorted_by(key.into()).into_iter().map(SkizoProfileEntry::from).collect();
	BoxSlice::from(entries)
}

/// Frees a slice previously returned by `skizo_profiling_fetch_sorted`, including each
/// entry's owned `method_name` string.
///
/// # Safety
/// `entries` must be a value returned by `skizo_profiling_fetch_sorted`, consumed exactly once.
#[no_mangle]
pub unsafe extern "C" fn skizo_free_profile_entries(entries: BoxSlice<SkizoProfileEntry>) {
	for entry in entries.iter() {
		if !entry.method_name.is_null() {
			drop(CString::from_raw(entry.method_name));
		}
	}
	drop(entries);
}

/// Renders the same fixed-width dump the original writes to `profile.txt` (spec §11). The
/// interactive console UI itself stays out of scope (spec §1); this only produces the text.
///
/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn skizo_profiling_dump(handle: SkizoDomainHandle) -> *mut c_char {
	let Some(state) = handle.0.as_ref() else { return std::ptr::null_mut() };
	let Some(domain) = state.domain.as_ref() else { return std::ptr::null_mut() };
	CString::new(domain.profiling().dump_to_string()).unwrap_or_default().into_raw()
}

/// Registers a breakpoint watch expression (spec §4.K "breakpoint/watch iteration"); returns
/// an id usable with `skizo_debug_remove_watch`.
///
/// # Safety
/// `handle` must be live; `expression` must be a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn skizo_debug_add_watch(handle: SkizoDomainHandle, expression: *const c_char) -> u32 {
	let Some(state) = handle.0.as_ref() else { return 0 };
	let Some(domain) = state.domain.as_ref() else { return 0 };
	let expression = CStr::from_ptr(expression).to_string_lossy();
	domain.debug_state().add_watch(&expression)
}

/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn skizo_debug_remove_watch(handle: SkizoDomainHandle, watch_id: u32) {
	let Some(state) = handle.0.as_ref() else { return };
	let Some(domain) = state.domain.as_ref() else { return };
	domain.debug_state().remove_watch(watch_id);
}

/// A C-friendly snapshot of one registered watch. `expression` is owned by the caller and
/// must be released with `skizo_free_string`.
#[repr(C)]
pub struct SkizoWatch {
	pub id: u32,
	pub expression: *mut c_char,
}

/// Iterates every currently registered watch (spec §4.K "breakpoint/watch iteration").
/// Ownership passes to the caller; free with `skizo_free_watches`.
///
/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn skizo_debug_list_watches(handle: SkizoDomainHandle) -> BoxSlice<SkizoWatch> {
	let Some(state) = handle.0.as_ref() else { return BoxSlice::from(Vec::new()) };
	let Some(domain) = state.domain.as_ref() else { return BoxSlice::from(Vec::new()) };
	let watches: Vec<SkizoWatch> = domain
		.debug_state()
		.watches()
		.into_iter()
		.map(|w| SkizoWatch { id: w.id, expression: CString::new(w.expression).unwrap_or_default().into_raw() })
		.collect();
	BoxSlice::from(watches)
}

/// # Safety
/// `watches` must be a value returned by `skizo_debug_list_watches`, consumed exactly once.
#[no_mangle]
pub unsafe extern "C" fn skizo_free_watches(watches: BoxSlice<SkizoWatch>) {
	for watch in watches.iter() {
		if !watch.expression.is_null() {
			drop(CString::from_raw(watch.expression));
		}
	}
	drop(watches);
}

/// Allocates a managed array object (spec §4.K "managed array allocation"). `vtable` is the
/// backend-materialized vtable for the array class (spec §3: slot 0 of every managed object
/// is always its vtable). Layout matches [`crate::gc::MemoryManager`]'s own convention: a
/// vtable word, a length word, then `length * element_size` bytes of element storage.
///
/// # Safety
/// `handle` must be live; `vtable` must point at a vtable whose class is an array class with
/// `element_size` matching that class's wrapped element width.
#[no_mangle]
pub unsafe extern "C" fn skizo_array_new(handle: SkizoDomainHandle, vtable: *const VTable<'static>, element_size: usize, length: usize) -> *mut u8 {
	let Some(state) = handle.0.as_ref() else { return std::ptr::null_mut() };
	let Some(domain) = state.domain.as_ref() else { return std::ptr::null_mut() };
	let vtable: &VTable<'static> = &*vtable;
	let size = 2 * size_of::<usize>() + length * element_size;
	let object = domain.gc().alloc(size, vtable, &[]);
	let ptr = object.as_ptr();
	*(ptr.add(size_of::<usize>()) as *mut usize) = length;
	ptr
}

/// Reads the length word written by `skizo_array_new` (also the layout `_soX_newarray`
/// produces from emitted C, spec §4.F).
///
/// # Safety
/// `object` must point at a managed array or string object.
#[no_mangle]
pub unsafe extern "C" fn skizo_array_length(object: *mut u8) -> usize {
	*(object.add(size_of::<usize>()) as *const usize)
}

/// Overwrites one element slot with `element_size` bytes from `value` (spec §4.K "array
/// element assignment with box/unbox rules"). Box/Unbox conversion itself is already applied
/// by the emitted call site before this runs (the cast tag is resolved once at compile time,
/// spec §3/§4.E.4) — this is the same raw, already-converted write `_soX_arrinit_<id>`
/// performs internally.
///
/// # Safety
/// `object` must point at a managed array with at least `index + 1` elements of width
/// `element_size`; `value` must point at `element_size` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn skizo_array_set_element(object: *mut u8, index: usize, element_size: usize, value: *const u8) {
	let elements_base = object.add(2 * size_of::<usize>());
	let dest = elements_base.add(index * element_size);
	std::ptr::copy_nonoverlapping(value, dest, element_size);
}

/// Allocates a managed string object from UTF-16 code units (spec §4.K "managed string
/// allocation"), same layout convention as [`skizo_array_new`] with a 2-byte element width.
///
/// # Safety
/// `handle` must be live; `vtable` must be the backend-materialized String vtable; `chars`
/// must point at `length` valid `u16` code units.
#[no_mangle]
pub unsafe extern "C" fn skizo_string_new(handle: SkizoDomainHandle, vtable: *const VTable<'static>, chars: *const u16, length: usize) -> *mut u8 {
	let Some(state) = handle.0.as_ref() else { return std::ptr::null_mut() };
	let Some(domain) = state.domain.as_ref() else { return std::ptr::null_mut() };
	let vtable: &VTable<'static> = &*vtable;
	let size = 2 * size_of::<usize>() + length * size_of::<u16>();
	let object = domain.gc().alloc(size, vtable, &[]);
	let ptr = object.as_ptr();
	*(ptr.add(size_of::<usize>()) as *mut usize) = length;
	let data = ptr.add(2 * size_of::<usize>()) as *mut u16;
	std::ptr::copy_nonoverlapping(chars, data, length);
	ptr
}

/// Reads one UTF-16 code unit out of a managed string (spec §4.K "managed string character
/// access").
///
/// # Safety
/// `object` must point at a managed string with at least `index + 1` characters.
#[no_mangle]
pub unsafe extern "C" fn skizo_string_char_at(object: *mut u8, index: usize) -> u16 {
	let data = object.add(2 * size_of::<usize>()) as *const u16;
	*data.add(index)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::ffi::CString;

	#[test]
	fn create_invoke_and_close_round_trip() {
		let path = CString::new(".").unwrap();
		let handle = skizo_create_domain(path.as_ptr());
		assert!(!handle.0.is_null());

		let source = CString::new("").unwrap();
		let ok = unsafe { skizo_invoke_entry_point(SkizoDomainHandle(handle.0), source.as_ptr()) };
		assert!(!ok); // NullBackend always fails compilation.

		unsafe { skizo_close_domain(handle) };
	}

	#[test]
	fn second_domain_on_the_same_thread_reports_a_null_handle() {
		let path = CString::new(".").unwrap();
		let first = skizo_create_domain(path.as_ptr());
		let second = skizo_create_domain(path.as_ptr());
		assert!(second.0.is_null());
		unsafe { skizo_close_domain(first) };
	}

	#[test]
	fn gc_stats_round_trip_through_a_boxed_slice() {
		let path = CString::new(".").unwrap();
		let handle = skizo_create_domain(path.as_ptr());
		unsafe { skizo_gc_collect(SkizoDomainHandle(handle.0)) };
		let stats = unsafe { skizo_get_gc_stats(SkizoDomainHandle(handle.0)) };
		assert_eq!(stats.len(), 1);
		unsafe { skizo_free_gc_stats(stats) };
		unsafe { skizo_close_domain(handle) };
	}
}
