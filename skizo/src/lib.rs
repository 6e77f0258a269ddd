//! A managed-object runtime for a statically typed, class-based scripting language: it
//! type-checks an already-parsed AST, emits portable C, compiles that C through an
//! abstracted [`backend::CodeBackend`], and links the result into the host process behind
//! a stable `repr(C)` embedding API.
//!
//! Module layout mirrors the component table: [`strings`] (A), [`bump`] (B), [`types`] (C),
//! [`ast`] (D), [`transform`] (E), [`gc`] (F), [`thunk`] (G), [`emitter`] (H),
//! [`security`] (I), [`domain`] (J), [`ffi`] (K).

pub mod ast;
pub mod backend;
pub mod bump;
pub mod domain;
pub mod emitter;
pub mod errors;
pub mod ffi;
pub mod gc;
pub mod security;
pub mod strings;
pub mod thunk;
pub mod transform;
pub mod types;
pub(crate) mod utilities;

pub use ast::{Binding, Expr, ExprKind};
pub use backend::{CodeBackend, CodeImage, CompileUnit, HostServices, NativeHostServices};
pub use bump::{AllocationKind, Arena};
pub use domain::{Domain, DomainExists, DomainOptions, EntryPoint, Phase};
pub use emitter::Emitter;
pub use errors::{AbortCode, AbortError, CompileError, SourceLocation};
pub use gc::{CollectionStats, ManagedObject, MemoryManager, VTable};
pub use security::{SandboxViolation, SecurityManager, Trust};
pub use strings::{StringSlice, StringTable};
pub use thunk::{Thunk, ThunkError, ThunkManager};
pub use transform::Transformer;
pub use types::class::Class;
pub use types::system::TypeSystem;
pub use types::typeref::TypeRef;
