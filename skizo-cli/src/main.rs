//! Reference command-line front-end (spec §6). Parses Microsoft-style `/option:value`
//! arguments, builds a domain from them, and invokes its entry point.

mod backend;
mod options;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use skizo::{Arena, Domain, DomainOptions, NativeHostServices, StringTable, Trust};

use crate::backend::SystemCcBackend;
use crate::options::Options;

fn main() -> ExitCode {
	let args: Vec<String> = std::env::args().skip(1).collect();

	let parsed = match Options::parse(args) {
		Ok(options) => options,
		Err(error) => {
			eprintln!("error: {error}");
			return ExitCode::FAILURE;
		}
	};

	if parsed.get_bool("help") || parsed.size() == 0 {
		parsed.print_help();
		return ExitCode::SUCCESS;
	}

	run(&parsed).unwrap_or(ExitCode::FAILURE)
}

fn run(parsed: &Options) -> Result<ExitCode, ()> {
	let Some(source_option) = parsed.get_string("source") else {
		eprintln!("error: /source is required (use /help for usage)");
		return Err(());
	};

	let host = NativeHostServices;
	let source_path = Path::new(source_option);
	let source = if source_path.is_file() {
		std::fs::read_to_string(source_path).map_err(|e| eprintln!("error: cannot read `{source_option}`: {e}"))?
	} else {
		source_option.to_string()
	};

	let search_paths: Vec<PathBuf> = parsed
		.get_string("paths")
		.map(|paths| paths.split(';').filter(|p| !p.is_empty()).map(PathBuf::from).collect())
		.unwrap_or_default();

	let trust = match parsed.get_string("permissions") {
		Some(permissions) if !permissions.is_empty() => {
			Trust::Untrusted { permissions: permissions.split(';').map(str::to_string).collect() }
		}
		_ => Trust::Trusted,
	};

	let base_module_path = source_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

	let domain_options = DomainOptions {
		trust,
		base_module_path,
		search_paths,
		stack_traces_enabled: parsed.get_bool("stacktraces"),
		profiling_enabled: parsed.get_bool("profile"),
		soft_debugging_enabled: parsed.get_bool("softdebug"),
		explicit_null_check: parsed.get_bool("nullcheck"),
		safe_callbacks: parsed.get_bool("safecallbacks"),
		inline_branching: parsed.get_bool("inline"),
		gc_threshold: match parsed.get_int("maxgcmemory") {
			Ok(n) if n > 0 => n as usize,
			_ => DomainOptions::default().gc_threshold,
		},
	};

	let arena = Arena::new();
	let strings = StringTable::new(&arena);
	let domain = Domain::create(&arena, &strings, domain_options).map_err(|e| eprintln!("error: {e}"))?;

	let mut backend = SystemCcBackend::new(std::env::temp_dir());
	let dump_path = parsed.get_bool("dump").then(|| PathBuf::from("skizodump.c"));
	let succeeded = match domain.invoke_entry_point(&mut backend, &host, &source, dump_path.as_deref()) {
		Ok(succeeded) => succeeded,
		Err(error) => {
			eprintln!("error: {error}");
			domain.close();
			return Ok(ExitCode::FAILURE);
		}
	};

	if !succeeded {
		if let Some(message) = Domain::last_error() {
			eprintln!("ABORT (runtime): {message}");
		}
	}

	if parsed.get_bool("gcstats") {
		for (i, stats) in domain.gc().stats().iter().enumerate() {
			println!(
				"gc #{i}: {} -> {} bytes, {} live objects",
				stats.bytes_before, stats.bytes_after, stats.live_objects
			);
		}
	}

	domain.close();
	Ok(if succeeded { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
