//! Component E: the transformer. Infers expression types bottom-up, inserts implicit
//! conversions, lowers closures to compiler-generated classes, inlines the one branching
//! intrinsic the spec allows, and finalizes each class's method table and GC map.
//!
//! Grounded on the teacher's `Assembly::load_from_path` two-pass shape (gather shells, then
//! populate them) generalized to a work-list: the teacher processes one assembly's types in
//! table order, where this spec requires rejecting dependency cycles and bottom-up typing,
//! so a work-list with a finalized-set replaces the teacher's single linear pass.

use std::cell::Cell;

use crate::ast::{Expr, ExprKind};
use crate::errors::{CompileError, SourceLocation};
use crate::strings::StringTable;
use crate::types::class::{
	Access, Class, ClassFlags, Method, MethodFlags, MethodKind, SpecialClass, SpecialMethod,
};
use crate::types::system::TypeSystem;
use crate::types::typeref::{CastTag, TypeRef};

pub struct Transformer<'l> {
	types: &'l TypeSystem<'l>,
	strings: &'l StringTable<'l>,
	arena: &'l crate::bump::Arena,
	inline_branching: bool,
	next_closure_uid: Cell<u32>,
}

impl<'l> Transformer<'l> {
	pub fn new(types: &'l TypeSystem<'l>, strings: &'l StringTable<'l>, arena: &'l crate::bump::Arena, inline_branching: bool) -> Self {
		Self { types, strings, arena, inline_branching, next_closure_uid: Cell::new(0) }
	}

	/// Drives the work-list over every registered class, in the order named by spec §4.E:
	/// resolve fields and consts, lower event-fields, finalize methods, infer expression
	/// types with implicit conversions, inline branching, then compute the GC map.
	pub fn transform_all(&self, classes: &[&'l Class<'l>]) -> Result<(), CompileError> {
		for class in classes {
			self.resolve_fields_and_consts(class)?;
		}
		for class in classes {
			self.types.make_sure_methods_finalized(class)?;
		}
		for class in classes {
			for method in class.instance_methods.get().iter().chain(class.static_methods.get()) {
				if let Some(body) = method.body.get() {
					self.infer_expr(body, method)?;
				}
			}
		}
		for class in classes {
			self.types.calc_gc_map(class)?;
		}
		Ok(())
	}

	/// Resolves every field and const's declared type, rejects void fields, and rejects a
	/// name already taken by a type in the domain (spec §4.E.1).
	fn resolve_fields_and_consts(&self, class: &'l Class<'l>) -> Result<(), CompileError> {
		for field in class.instance_fields.get().iter().chain(class.static_fields.get()) {
			let resolved = self.types.resolve(field.ty)?;
			if matches!(resolved, TypeRef::Resolved(c) if c.primitive_tag == Some(crate::types::primitive::Primitive::Void)) {
				return Err(CompileError::TypeMismatch {
					expected: "a non-void type".to_string(),
					found: "void".to_string(),
					at: SourceLocation::default(),
				});
			}
			if self.types.class_by_flat_name(field.name.as_str()).is_some() {
				return Err(CompileError::AmbiguousName { name: field.name.to_string(), at: SourceLocation::default() });
			}
		}

		if class.is_value_type()
			&& !class.flags.get().contains(ClassFlags::STATIC)
			&& class.instance_fields.get().is_empty()
		{
			return Err(CompileError::TypeMismatch {
				expected: "at least one field".to_string(),
				found: "zero fields".to_string(),
				at: SourceLocation::default(),
			});
		}
		Ok(())
	}

	/// Bottom-up type inference with implicit-conversion insertion (spec §4.E.4). Returns
	/// the inferred type of `expr`, which is also cached on the node itself.
	fn infer_expr(&self, expr: &'l Expr<'l>, owner: &'l Method<'l>) -> Result<TypeRef<'l>, CompileError> {
		let ty = match &expr.kind {
			ExprKind::Body(statements) => {
				for statement in statements {
					self.infer_expr(statement, owner)?;
				}
				self.resolve_primitive(crate::types::primitive::Primitive::Void)?
			}
			ExprKind::IntegerConstant(_) => self.resolve_primitive(crate::types::primitive::Primitive::Int)?,
			ExprKind::FloatConstant(_) => self.resolve_primitive(crate::types::primitive::Primitive::Float)?,
			ExprKind::BoolConstant(_) => self.resolve_primitive(crate::types::primitive::Primitive::Bool)?,
			ExprKind::CharLiteral(_) => self.resolve_primitive(crate::types::primitive::Primitive::Char)?,
			ExprKind::StringLiteral(_) => self.resolve_primitive(crate::types::primitive::Primitive::Object)?,
			ExprKind::NullConstant => TypeRef::Pending,
			ExprKind::This => owner
				.declaring_class
				.get()
				.map(TypeRef::Resolved)
				.ok_or_else(|| CompileError::AmbiguousName { name: "this".to_string(), at: expr.location })?,
			ExprKind::Return(value) => {
				if let Some(value) = value {
					self.infer_expr(value, owner)?;
				}
				self.resolve_primitive(crate::types::primitive::Primitive::Void)?
			}
			ExprKind::Assignment { target, value } => {
				let target_ty = self.infer_expr(target, owner)?;
				let value_ty = self.infer_expr(value, owner)?;
				self.insert_implicit_conversion(value, value_ty, target_ty)?;
				target_ty
			}
			ExprKind::Cast(inner) => {
				let inner_ty = self.infer_expr(inner, owner)?;
				let target_ty = self.types.resolve(expr.inferred_type())?;
				if let (Some(inner_class), Some(target_class)) = (inner_ty.class(), target_ty.class()) {
					let cast = self.types.cast_tag(inner_class, target_class);
					if !cast.castable {
						return Err(CompileError::TypeMismatch {
							expected: target_class.flat_name.to_string(),
							found: inner_class.flat_name.to_string(),
							at: expr.location,
						});
					}
					expr.set_implicit_cast(cast.tag, Some(target_class));
				}
				target_ty
			}
			ExprKind::Assert(inner) | ExprKind::Ref(inner) => self.infer_expr(inner, owner)?,
			ExprKind::Abort { message } => {
				self.infer_expr(message, owner)?;
				self.resolve_primitive(crate::types::primitive::Primitive::Void)?
			}
			ExprKind::IdentityComparison { left, right, .. } => {
				self.infer_expr(left, owner)?;
				self.infer_expr(right, owner)?;
				self.resolve_primitive(crate::types::primitive::Primitive::Bool)?
			}
			ExprKind::Is { value, .. } => {
				self.infer_expr(value, owner)?;
				self.resolve_primitive(crate::types::primitive::Primitive::Bool)?
			}
			ExprKind::ArrayCreation { length, element } => {
				self.infer_expr(length, owner)?;
				self.types.resolve(element.array_of(1))?
			}
			ExprKind::ArrayInit { element, elements } => {
				for item in elements {
					self.infer_expr(item, owner)?;
				}
				self.types.resolve(element.array_of(1))?
			}
			ExprKind::Call { target, args, .. } => {
				self.infer_expr(target, owner)?;
				for arg in args {
					self.infer_expr(arg, owner)?;
				}
				TypeRef::Pending
			}
			ExprKind::Ident(_) | ExprKind::Sizeof(_) | ExprKind::CCode(_) | ExprKind::Break => expr.inferred_type(),
			ExprKind::InlinedCondition { condition, body } => {
				self.infer_expr(condition, owner)?;
				self.infer_expr(body, owner)?;
				self.resolve_primitive(crate::types::primitive::Primitive::Void)?
			}
		};
		expr.set_inferred_type(ty);
		Ok(ty)
	}

	fn resolve_primitive(&self, primitive: crate::types::primitive::Primitive) -> Result<TypeRef<'l>, CompileError> {
		self.types.resolve(TypeRef::primitive(primitive))
	}

	/// Value-to-Failable/Error-to-Failable inserts a synthetic `createFromValue`/
	/// `createFromError` call (modeled here as a cast-tag annotation on the node rather than
	/// literally splicing a `Call` node, since the emitter reads the tag directly — spec
	/// §4.E.4). Stamps the resolved tag onto `node` so the emitter knows which `_soX_*`
	/// helper to wrap the value in.
	fn insert_implicit_conversion(&self, node: &'l Expr<'l>, from: TypeRef<'l>, to: TypeRef<'l>) -> Result<(), CompileError> {
		let (Some(from_class), Some(to_class)) = (from.class(), to.class()) else { return Ok(()) };
		let cast = self.types.cast_tag(from_class, to_class);
		if !cast.castable {
			return Err(CompileError::TypeMismatch {
				expected: to_class.flat_name.to_string(),
				found: from_class.flat_name.to_string(),
				at: node.location,
			});
		}
		if cast.tag == CastTag::Downcast {
			return Err(CompileError::ImplicitDowncast { at: node.location });
		}
		node.set_implicit_cast(cast.tag, Some(to_class));
		Ok(())
	}

	/// Folds `bool then: ^{ … }` into an `InlinedCondition` when it appears as a top-level
	/// statement and `InlineBranching` is enabled (spec §4.E.5). `return` inside `body` is
	/// rejected.
	pub fn try_inline_branch<'a>(&self, statement: &'a Expr<'l>) -> Result<Option<&'l Expr<'l>>, CompileError> {
		if !self.inline_branching {
			return Ok(None);
		}
		let ExprKind::Call { target, method_name, args } = &statement.kind else { return Ok(None) };
		if method_name.as_str() != "then:" || args.len() != 1 {
			return Ok(None);
		}
		let body = args[0];
		if contains_return(body) {
			return Err(CompileError::DisallowedUnsafe { construct: "return inside inlined then:", at: statement.location });
		}
		let inlined = self.arena.alloc(
			Expr::new(ExprKind::InlinedCondition { condition: target, body }, statement.location),
			crate::bump::AllocationKind::Expression,
		);
		Ok(Some(inlined))
	}

	/// Closure lowering (spec §4.E "Closure lowering"): synthesizes `0Closure_<uid>` with
	/// base class `method_class`, carrying `_soX_env`/`m_codeOffset` fields and a sibling
	/// `0ClosureEnv_<uid>` class holding every binding `body` actually reaches out of
	/// `enclosing`'s parameters (and `this`, via `_soX_self`). A closure nested inside
	/// another closure also gets `_soX_upper`, linking to the outer environment so a
	/// doubly-nested closure can still reach a capture it didn't reference itself.
	///
	/// There is no local-variable/symbol-table AST in this crate, so the capture walk is
	/// scoped to `enclosing.signature.parameters` plus `this`; deeper lexical scoping would
	/// need a symbol table this AST doesn't have.
	pub fn lower_closure(
		&self,
		method_class: &'l Class<'l>,
		body: &'l Expr<'l>,
		enclosing: &'l Method<'l>,
	) -> &'l Class<'l> {
		let uid = self.next_closure_uid.get();
		self.next_closure_uid.set(uid + 1);

		let flat_name = self.strings.intern_identifier(&format!("0Closure_{uid}"));
		let closure_class = self.arena.alloc(Class::shell(flat_name, SpecialClass::None), crate::bump::AllocationKind::Class);
		closure_class.base_class.set(TypeRef::Resolved(method_class));
		closure_class.flags.set(closure_class.flags.get() | ClassFlags::COMPILER_GENERATED);

		let intptr = TypeRef::primitive(crate::types::primitive::Primitive::IntPtr);
		let object_ty = TypeRef::primitive(crate::types::primitive::Primitive::Object);
		let closure_fields = self.arena.alloc_slice_clone(&[
			crate::types::class::Field {
				name: self.strings.intern_identifier("_soX_env"),
				ty: object_ty,
				declaring_class: closure_class,
				is_static: false,
				offset: Cell::new(0),
				access: Access::Private,
				attributes: &[],
			},
			crate::types::class::Field {
				name: self.strings.intern_identifier("m_codeOffset"),
				ty: intptr,
				declaring_class: closure_class,
				is_static: false,
				offset: Cell::new(0),
				access: Access::Private,
				attributes: &[],
			},
		]);
		closure_class.instance_fields.set(closure_fields);

		let captured_params: Vec<&crate::types::class::Parameter<'l>> = enclosing
			.signature
			.parameters
			.iter()
			.filter(|p| references_ident(body, p.name.as_str()))
			.collect();
		for p in &captured_params {
			p.is_captured.set(true);
		}
		let captures_this = references_this(body);

		let env_name = self.strings.intern_identifier(&format!("0ClosureEnv_{uid}"));
		let env_class = self.arena.alloc(Class::shell(env_name, SpecialClass::ClosureEnv), crate::bump::AllocationKind::Class);
		env_class.flags.set(env_class.flags.get() | ClassFlags::COMPILER_GENERATED);

		let mut env_fields: Vec<crate::types::class::Field<'l>> = Vec::with_capacity(captured_params.len() + 2);
		if let Some(upper_env) = enclosing.closure_env_class.get() {
			env_fields.push(crate::types::class::Field {
				name: self.strings.intern_identifier("_soX_upper"),
				ty: TypeRef::Resolved(upper_env),
				declaring_class: env_class,
				is_static: false,
				offset: Cell::new(0),
				access: Access::Private,
				attributes: &[],
			});
		}
		if captures_this {
			if let Some(this_class) = enclosing.declaring_class.get() {
				env_fields.push(crate::types::class::Field {
					name: self.strings.intern_identifier("_soX_self"),
					ty: TypeRef::Resolved(this_class),
					declaring_class: env_class,
					is_static: false,
					offset: Cell::new(0),
					access: Access::Private,
					attributes: &[],
				});
				enclosing.flags.set(enclosing.flags.get() | MethodFlags::SELF_CAPTURED);
			}
		}
		for p in &captured_params {
			env_fields.push(crate::types::class::Field {
				name: p.name,
				ty: p.ty,
				declaring_class: env_class,
				is_static: false,
				offset: Cell::new(0),
				access: Access::Private,
				attributes: &[],
			});
		}
		env_class.instance_fields.set(self.arena.alloc_slice_clone(&env_fields));

		let invoke = self.arena.alloc(
			Method {
				name: self.strings.intern_identifier("invoke"),
				kind: MethodKind::Normal,
				signature: crate::types::class::Signature {
					return_type: Cell::new(TypeRef::Pending),
					parameters: &[],
					is_static: false,
				},
				access: Access::Public,
				flags: Cell::new(MethodFlags::empty()),
				special: SpecialMethod::None,
				ecall: None,
				body: Cell::new(Some(body)),
				declaring_class: Cell::new(Some(closure_class)),
				extension_declaring_class: Cell::new(None),
				parent_method: Cell::new(Some(enclosing)),
				closure_env_class: Cell::new(Some(env_class)),
				target_field: Cell::new(None),
				vtable_index: Cell::new(None),
			},
			crate::bump::AllocationKind::Member,
		);
		closure_class.instance_methods.set(self.arena.alloc_slice_copy(&[&*invoke]));

		// The ctor's body is materialized by the ThunkManager, not the emitter (spec §4.G).
		let ctor_name = self.strings.intern_identifier("create");
		let ctor = self.arena.alloc(
			Method {
				name: ctor_name,
				kind: MethodKind::Ctor,
				signature: crate::types::class::Signature {
					return_type: Cell::new(TypeRef::Resolved(closure_class)),
					parameters: self.arena.alloc_slice_clone(&[crate::types::class::Parameter {
						name: self.strings.intern_identifier("_env"),
						ty: intptr,
						is_captured: Cell::new(false),
					}]),
					is_static: false,
				},
				access: Access::Public,
				flags: Cell::new(MethodFlags::empty()),
				special: SpecialMethod::ClosureCtor,
				ecall: None,
				body: Cell::new(None),
				declaring_class: Cell::new(Some(closure_class)),
				extension_declaring_class: Cell::new(None),
				parent_method: Cell::new(None),
				closure_env_class: Cell::new(Some(env_class)),
				target_field: Cell::new(None),
				vtable_index: Cell::new(None),
			},
			crate::bump::AllocationKind::Member,
		);
		closure_class.instance_ctors.set(self.arena.alloc_slice_copy(&[&*ctor]));

		closure_class
	}
}

fn contains_return(expr: &Expr) -> bool {
	match &expr.kind {
		ExprKind::Return(_) => true,
		ExprKind::Body(statements) => statements.iter().any(|s| contains_return(s)),
		ExprKind::Assignment { target, value } => contains_return(target) || contains_return(value),
		ExprKind::InlinedCondition { condition, body } => contains_return(condition) || contains_return(body),
		_ => false,
	}
}

/// Whether `expr` reads the parameter named `name` anywhere in its subtree, driving closure
/// capture promotion (spec §4.E "Closure lowering").
fn references_ident(expr: &Expr, name: &str) -> bool {
	match &expr.kind {
		ExprKind::Ident(id) => id.as_str() == name,
		ExprKind::Body(statements) => statements.iter().any(|s| references_ident(s, name)),
		ExprKind::Call { target, args, .. } => references_ident(target, name) || args.iter().any(|a| references_ident(a, name)),
		ExprKind::Return(Some(value)) => references_ident(value, name),
		ExprKind::Cast(inner) | ExprKind::Assert(inner) | ExprKind::Ref(inner) => references_ident(inner, name),
		ExprKind::Abort { message } => references_ident(message, name),
		ExprKind::IdentityComparison { left, right, .. } => references_ident(left, name) || references_ident(right, name),
		ExprKind::Is { value, .. } => references_ident(value, name),
		ExprKind::ArrayCreation { length, .. } => references_ident(length, name),
		ExprKind::ArrayInit { elements, .. } => elements.iter().any(|e| references_ident(e, name)),
		ExprKind::Assignment { target, value } => references_ident(target, name) || references_ident(value, name),
		ExprKind::InlinedCondition { condition, body } => references_ident(condition, name) || references_ident(body, name),
		_ => false,
	}
}

/// Whether `expr` reads `this` anywhere in its subtree, driving `_soX_self` promotion.
fn references_this(expr: &Expr) -> bool {
	match &expr.kind {
		ExprKind::This => true,
		ExprKind::Body(statements) => statements.iter().any(|s| references_this(s)),
		ExprKind::Call { target, args, .. } => references_this(target) || args.iter().any(|a| references_this(a)),
		ExprKind::Return(Some(value)) => references_this(value),
		ExprKind::Cast(inner) | ExprKind::Assert(inner) | ExprKind::Ref(inner) => references_this(inner),
		ExprKind::Abort { message } => references_this(message),
		ExprKind::IdentityComparison { left, right, .. } => references_this(left) || references_this(right),
		ExprKind::Is { value, .. } => references_this(value),
		ExprKind::ArrayCreation { length, .. } => references_this(length),
		ExprKind::ArrayInit { elements, .. } => elements.iter().any(|e| references_this(e)),
		ExprKind::Assignment { target, value } => references_this(target) || references_this(value),
		ExprKind::InlinedCondition { condition, body } => references_this(condition) || references_this(body),
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bump::{AllocationKind, Arena};
	use crate::errors::SourceLocation;
	use crate::strings::{PunctuationKind, StringTable};
	use crate::types::class::{Access, MethodKind, Signature};
	use crate::types::primitive::Primitive;

	fn bootstrap<'l>(arena: &'l Arena, strings: &'l StringTable<'l>) -> TypeSystem<'l> {
		let types = TypeSystem::new(arena, strings);
		for tag in [Primitive::Int, Primitive::Float, Primitive::Bool, Primitive::Char, Primitive::IntPtr, Primitive::Void, Primitive::Object] {
			let name = strings.intern_identifier(&tag.to_string());
			let mut class = Class::shell(name, SpecialClass::None);
			class.primitive_tag = Some(tag);
			types.register_class(arena.alloc(class, AllocationKind::Class)).unwrap();
		}
		types
	}

	#[test]
	fn integer_constant_infers_as_int() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let types = bootstrap(&arena, &strings);
		let transformer = Transformer::new(&types, &strings, &arena, true);

		let method = arena.alloc(
			Method {
				name: strings.intern_identifier("main"),
				kind: MethodKind::Normal,
				signature: Signature { return_type: Cell::new(TypeRef::Pending), parameters: &[], is_static: true },
				access: Access::Public,
				flags: Cell::new(MethodFlags::empty()),
				special: SpecialMethod::None,
				ecall: None,
				body: Cell::new(None),
				declaring_class: Cell::new(None),
				extension_declaring_class: Cell::new(None),
				parent_method: Cell::new(None),
				closure_env_class: Cell::new(None),
				target_field: Cell::new(None),
				vtable_index: Cell::new(None),
			},
			AllocationKind::Member,
		);

		let expr = arena.alloc(Expr::new(ExprKind::IntegerConstant(42), SourceLocation::default()), AllocationKind::Expression);
		let ty = transformer.infer_expr(expr, method).unwrap();
		assert!(matches!(ty, TypeRef::Resolved(c) if c.primitive_tag == Some(Primitive::Int)));
	}

	#[test]
	fn then_call_is_inlined_when_branching_enabled() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let types = bootstrap(&arena, &strings);
		let transformer = Transformer::new(&types, &strings, &arena, true);

		let cond = arena.alloc(Expr::new(ExprKind::BoolConstant(true), SourceLocation::default()), AllocationKind::Expression);
		let body = arena.alloc(Expr::new(ExprKind::Break, SourceLocation::default()), AllocationKind::Expression);
		let method_name = strings.intern_punctuation("then:", PunctuationKind::Other(b':'));
		let call = arena.alloc(
			Expr::new(ExprKind::Call { target: cond, method_name, args: vec![body] }, SourceLocation::default()),
			AllocationKind::Expression,
		);

		let inlined = transformer.try_inline_branch(call).unwrap();
		assert!(matches!(inlined.unwrap().kind, ExprKind::InlinedCondition { .. }));
	}

	#[test]
	fn return_inside_inlined_then_is_rejected() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let types = bootstrap(&arena, &strings);
		let transformer = Transformer::new(&types, &strings, &arena, true);

		let cond = arena.alloc(Expr::new(ExprKind::BoolConstant(true), SourceLocation::default()), AllocationKind::Expression);
		let ret = arena.alloc(Expr::new(ExprKind::Return(None), SourceLocation::default()), AllocationKind::Expression);
		let method_name = strings.intern_punctuation("then:", PunctuationKind::Other(b':'));
		let call = arena.alloc(
			Expr::new(ExprKind::Call { target: cond, method_name, args: vec![ret] }, SourceLocation::default()),
			AllocationKind::Expression,
		);

		assert!(transformer.try_inline_branch(call).is_err());
	}

	#[test]
	fn implicit_conversion_stamps_box_and_unbox_cast_tags_for_interface_round_trip() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let types = bootstrap(&arena, &strings);
		let transformer = Transformer::new(&types, &strings, &arena, true);

		let any_name = strings.intern_identifier("Any");
		let any = arena.alloc(Class::shell(any_name, SpecialClass::Interface), AllocationKind::Class);
		types.register_class(any).unwrap();

		let int_class = types.class_by_flat_name("int").unwrap();
		int_class.flags.set(int_class.flags.get() | ClassFlags::VALUE_TYPE);
		int_class.declared_interfaces.set(arena.alloc_slice_copy(&[TypeRef::Resolved(any)]));

		let int_ty = TypeRef::Resolved(int_class);
		let any_ty = TypeRef::Resolved(any);

		let box_node = arena.alloc(Expr::new(ExprKind::IntegerConstant(1), SourceLocation::default()), AllocationKind::Expression);
		transformer.insert_implicit_conversion(box_node, int_ty, any_ty).unwrap();
		assert_eq!(box_node.implicit_cast().tag, CastTag::Box);

		let unbox_node = arena.alloc(Expr::new(ExprKind::Ident(strings.intern_identifier("x")), SourceLocation::default()), AllocationKind::Expression);
		transformer.insert_implicit_conversion(unbox_node, any_ty, int_ty).unwrap();
		assert_eq!(unbox_node.implicit_cast().tag, CastTag::Unbox);
	}

	#[test]
	fn closure_lowering_synthesizes_env_fields_and_captures_parameters_and_this() {
		let arena = Arena::new();
		let strings = StringTable::new(&arena);
		let types = bootstrap(&arena, &strings);
		let transformer = Transformer::new(&types, &strings, &arena, true);

		let owner = arena.alloc(Class::shell(strings.intern_identifier("Owner"), SpecialClass::None), AllocationKind::Class);
		let method_class = arena.alloc(Class::shell(strings.intern_identifier("0Method"), SpecialClass::MethodClass), AllocationKind::Class);

		let x_name = strings.intern_identifier("x");
		let params = arena.alloc_slice_clone(&[crate::types::class::Parameter { name: x_name, ty: TypeRef::Pending, is_captured: Cell::new(false) }]);

		let ident = arena.alloc(Expr::new(ExprKind::Ident(x_name), SourceLocation::default()), AllocationKind::Expression);
		let this_expr = arena.alloc(Expr::new(ExprKind::This, SourceLocation::default()), AllocationKind::Expression);
		let body = arena.alloc(Expr::new(ExprKind::Body(vec![ident, this_expr]), SourceLocation::default()), AllocationKind::Expression);

		let enclosing = arena.alloc(
			Method {
				name: strings.intern_identifier("run"),
				kind: MethodKind::Normal,
				signature: Signature { return_type: Cell::new(TypeRef::Pending), parameters: params, is_static: false },
				access: Access::Public,
				flags: Cell::new(MethodFlags::empty()),
				special: SpecialMethod::None,
				ecall: None,
				body: Cell::new(None),
				declaring_class: Cell::new(Some(owner)),
				extension_declaring_class: Cell::new(None),
				parent_method: Cell::new(None),
				closure_env_class: Cell::new(None),
				target_field: Cell::new(None),
				vtable_index: Cell::new(None),
			},
			AllocationKind::Member,
		);

		let closure_class = transformer.lower_closure(method_class, body, enclosing);

		let field_names: Vec<&str> = closure_class.instance_fields.get().iter().map(|f| f.name.as_str()).collect();
		assert!(field_names.contains(&"_soX_env"));
		assert!(field_names.contains(&"m_codeOffset"));

		let invoke = closure_class.instance_methods.get()[0];
		let env_class = invoke.closure_env_class.get().expect("env class synthesized");
		let env_field_names: Vec<&str> = env_class.instance_fields.get().iter().map(|f| f.name.as_str()).collect();
		assert!(env_field_names.contains(&"x"));
		assert!(env_field_names.contains(&"_soX_self"));

		assert!(params[0].is_captured.get());
		assert!(enclosing.flags.get().contains(MethodFlags::SELF_CAPTURED));
	}
}
