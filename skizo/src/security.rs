//! Component I: trusted/untrusted domain policy, base-module resolution, and the
//! filesystem sandbox backing the managed `Path::getFullPath` icall.
//!
//! Module search-path resolution is grounded on the teacher's
//! `structured::resolver::DefaultAssemblyResolver`: a first-match-wins walk over an
//! ordered list of directories. Here the ordering is base-module-directory-first so
//! builtin modules can never be shadowed by user source (spec §4.I), where the teacher's
//! resolver has no such precedence rule (any search path may supply an assembly name).
//! Bulk module discovery (`list_modules_in`) reuses the teacher's `rust_search`-based
//! recursive directory walk from `DefaultAssemblyResolver::gather_paths`, retargeted from
//! `.dll` to the source-file extension.

use std::path::{Path, PathBuf};

use rust_search::SearchBuilder;

use crate::backend::HostServices;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Trust {
	Trusted,
	Untrusted { permissions: Vec<String> },
}

#[derive(Debug)]
pub struct SecurityManager {
	trust: Trust,
	base_module_path: PathBuf,
	search_paths: Vec<PathBuf>,
}

impl SecurityManager {
	pub fn new(trust: Trust, base_module_path: PathBuf, search_paths: Vec<PathBuf>) -> Self {
		Self { trust, base_module_path, search_paths }
	}

	pub fn is_trusted(&self) -> bool {
		matches!(self.trust, Trust::Trusted)
	}

	pub fn has_permission(&self, permission: &str) -> bool {
		match &self.trust {
			Trust::Trusted => true,
			Trust::Untrusted { permissions } => permissions.iter().any(|p| p == permission),
		}
	}

	pub fn base_module_path(&self) -> &Path {
		&self.base_module_path
	}

	/// Resolves a module name to a source file: base-module directory first (so it can
	/// never be shadowed), then the ordered search-path list, then the current directory
	/// (spec §6).
	#[cfg_attr(feature = "tracing", tracing::instrument(skip(host)))]
	pub fn resolve_module(&self, name: &str, extension: &str, host: &dyn HostServices) -> Option<PathBuf> {
		let file_name = format!("{name}.{extension}");

		let base_candidate = self.base_module_path.join(&file_name);
		if host.exists(&base_candidate) {
			return Some(base_candidate);
		}

		for dir in &self.search_paths {
			let candidate = dir.join(&file_name);
			if host.exists(&candidate) {
				return Some(candidate);
			}
		}

		let cwd_candidate = PathBuf::from(&file_name);
		let found = host.exists(&cwd_candidate).then_some(cwd_candidate);
		#[cfg(feature = "tracing")]
		if found.is_none() {
			tracing::warn!(module = name, "module not found on any search path");
		}
		found
	}

	/// Backs the managed `Path::getFullPath` icall. In untrusted mode, rejects any
	/// resolved path that escapes the permitted roots (spec §4.I).
	pub fn get_full_path(&self, from: &Path, path: &Path, host: &dyn HostServices) -> Result<PathBuf, SandboxViolation> {
		let resolved = host
			.canonicalize(from, path)
			.map_err(|_| SandboxViolation { path: path.to_path_buf() })?;

		if self.is_trusted() {
			return Ok(resolved);
		}

		let permitted = self.permitted_roots();
		if permitted.iter().any(|root| resolved.starts_with(root)) {
			Ok(resolved)
		} else {
			Err(SandboxViolation { path: resolved })
		}
	}

	fn permitted_roots(&self) -> Vec<&Path> {
		let mut roots = vec![self.base_module_path.as_path()];
		roots.extend(self.search_paths.iter().map(PathBuf::as_path));
		roots
	}

	/// ECalls and the built-in `Marshal` class are gated to trusted domains (spec §4.E,
	/// §4.I); base modules are always permitted regardless of trust.
	pub fn allows_ecall(&self, declaring_module_is_base: bool) -> bool {
		self.is_trusted() || declaring_module_is_base
	}

	/// Recursively enumerates every source file with the given extension under the base
	/// module directory and all search paths, for tooling that needs the full module set
	/// up front (e.g. an IDE's "find all modules" command) rather than resolving one name
	/// at a time.
	pub fn list_modules_in(&self, extension: &str) -> Vec<PathBuf> {
		let mut found = Vec::new();
		for root in self.permitted_roots() {
			let results = SearchBuilder::default().location(root).depth(usize::MAX).ext(extension).build();
			found.extend(results.map(PathBuf::from));
		}
		found
	}
}

#[derive(Debug, Clone)]
pub struct SandboxViolation {
	pub path: PathBuf,
}

impl std::fmt::Display for SandboxViolation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "path `{}` escapes the untrusted domain's permitted roots", self.path.display())
	}
}

impl std::error::Error for SandboxViolation {}

#[cfg(test)]
mod tests {
	use super::*;

	struct FakeHost {
		existing: Vec<PathBuf>,
	}

	impl HostServices for FakeHost {
		fn read_to_string(&self, _path: &Path) -> std::io::Result<String> {
			unimplemented!()
		}

		fn exists(&self, path: &Path) -> bool {
			self.existing.contains(&path.to_path_buf())
		}

		fn canonicalize(&self, base: &Path, path: &Path) -> std::io::Result<PathBuf> {
			Ok(if path.is_absolute() { path.to_path_buf() } else { base.join(path) })
		}
	}

	#[test]
	fn base_module_directory_is_consulted_before_search_paths() {
		let host = FakeHost {
			existing: vec![PathBuf::from("/base/Core.sk"), PathBuf::from("/search/Core.sk")],
		};
		let security = SecurityManager::new(Trust::Trusted, PathBuf::from("/base"), vec![PathBuf::from("/search")]);
		let resolved = security.resolve_module("Core", "sk", &host).unwrap();
		assert_eq!(resolved, PathBuf::from("/base/Core.sk"));
	}

	#[test]
	fn untrusted_domain_rejects_paths_outside_permitted_roots() {
		let host = FakeHost { existing: vec![] };
		let security = SecurityManager::new(
			Trust::Untrusted { permissions: vec![] },
			PathBuf::from("/base"),
			vec![PathBuf::from("/sandbox")],
		);
		let result = security.get_full_path(Path::new("/sandbox"), Path::new("/etc/passwd"), &host);
		assert!(result.is_err());
	}

	#[test]
	fn trusted_domain_allows_any_resolvable_path() {
		let host = FakeHost { existing: vec![] };
		let security = SecurityManager::new(Trust::Trusted, PathBuf::from("/base"), vec![]);
		let result = security.get_full_path(Path::new("/base"), Path::new("/etc/passwd"), &host);
		assert!(result.is_ok());
	}

	#[test]
	fn list_modules_in_finds_source_files_under_every_root() {
		let unique = std::process::id();
		let root = std::env::temp_dir().join(format!("skizo_list_modules_{unique}"));
		let nested = root.join("nested");
		std::fs::create_dir_all(&nested).unwrap();
		std::fs::write(root.join("Core.sk"), "").unwrap();
		std::fs::write(nested.join("Util.sk"), "").unwrap();
		std::fs::write(root.join("readme.txt"), "").unwrap();

		let security = SecurityManager::new(Trust::Trusted, root.clone(), vec![]);
		let modules = security.list_modules_in("sk");

		std::fs::remove_dir_all(&root).unwrap();

		assert_eq!(modules.len(), 2);
		assert!(modules.iter().any(|p| p.ends_with("Core.sk")));
		assert!(modules.iter().any(|p| p.ends_with("Util.sk")));
	}
}
