//! The reference `CodeBackend`: shells out to the system C compiler and `dlopen`s the
//! result. Grounded on `thunk.rs`'s existing `libc` usage for the executable-memory path;
//! this is the other half of "compile C, then run it", done the ordinary OS-loader way
//! instead of hand-writing machine code.

use std::ffi::{c_void, CString};
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use skizo::{CodeBackend, CodeImage, CompileError};

pub struct SystemCcBackend {
	work_dir: PathBuf,
	next_unit_id: u32,
}

impl SystemCcBackend {
	pub fn new(work_dir: PathBuf) -> Self {
		Self { work_dir, next_unit_id: 0 }
	}
}

impl CodeBackend for SystemCcBackend {
	fn compile(&mut self, unit: skizo::CompileUnit) -> Result<Box<dyn CodeImage>, CompileError> {
		let id = self.next_unit_id;
		self.next_unit_id += 1;

		let c_path = self.work_dir.join(format!("skizo_unit_{id}.c"));
		let so_path = self.work_dir.join(format!("skizo_unit_{id}.so"));
		std::fs::write(&c_path, &unit.source).map_err(|e| io_to_compile_error(&e))?;

		let status = Command::new("cc")
			.args(["-shared", "-fPIC", "-o"])
			.arg(&so_path)
			.arg(&c_path)
			.status()
			.map_err(|e| io_to_compile_error(&e))?;

		if !status.success() {
			return Err(CompileError::BackendFailure { detail: format!("cc exited with {status}") });
		}

		let so_cstr = CString::new(so_path.to_string_lossy().into_owned()).unwrap();
		let handle = unsafe { libc::dlopen(so_cstr.as_ptr(), libc::RTLD_NOW) };
		if handle.is_null() {
			return Err(CompileError::BackendFailure {
				detail: "dlopen failed to load the compiled translation unit".to_string(),
			});
		}

		Ok(Box::new(DlCodeImage { handle }))
	}
}

fn io_to_compile_error(error: &std::io::Error) -> CompileError {
	CompileError::BackendFailure { detail: error.to_string() }
}

struct DlCodeImage {
	handle: *mut c_void,
}

impl fmt::Debug for DlCodeImage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DlCodeImage").field("handle", &self.handle).finish()
	}
}

impl CodeImage for DlCodeImage {
	fn symbol(&self, name: &str) -> Option<usize> {
		let name = CString::new(name).ok()?;
		let address = unsafe { libc::dlsym(self.handle, name.as_ptr()) };
		(!address.is_null()).then_some(address as usize)
	}
}

impl Drop for DlCodeImage {
	fn drop(&mut self) {
		unsafe { libc::dlclose(self.handle) };
	}
}
