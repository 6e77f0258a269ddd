//! Microsoft-style `/option:value` command-line parsing, grounded on the original's
//! `ApplicationOptions.h`: a flat collection of named options, no subcommands, no GNU-style
//! `--long`/`-s` forms. Values may be double-quoted to carry spaces or `;`.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug)]
pub enum OptionsError {
	/// An argument didn't start with `/`, or a quoted value was never closed.
	BadFormat(String),
}

impl fmt::Display for OptionsError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OptionsError::BadFormat(arg) => write!(f, "malformed option `{arg}`"),
		}
	}
}

impl std::error::Error for OptionsError {}

/// One recognized option: its name, a human-readable description for `--help`, and the
/// default value an implicit bool (`/flag` with no `:value`) resolves to.
pub struct OptionDescription {
	pub name: &'static str,
	pub description: &'static str,
	pub default: &'static str,
}

pub const OPTIONS: &[OptionDescription] = &[
	OptionDescription { name: "source", description: "path or literal source of the main module", default: "" },
	OptionDescription { name: "paths", description: "`;`-joined additional module search paths", default: "" },
	OptionDescription { name: "help", description: "print this help and exit", default: "true" },
	OptionDescription { name: "dump", description: "write generated C to skizodump.c", default: "true" },
	OptionDescription { name: "profile", description: "enable profiling; write profile.txt on exit", default: "true" },
	OptionDescription { name: "stacktraces", description: "push/pop frames for diagnostics", default: "true" },
	OptionDescription { name: "softdebug", description: "enable debugger hooks (implies stacktraces)", default: "true" },
	OptionDescription { name: "nullcheck", description: "explicit null checks instead of a signal handler", default: "true" },
	OptionDescription { name: "safecallbacks", description: "validate cross-domain callback dispatch", default: "true" },
	OptionDescription { name: "permissions", description: "`;`-joined permission set; marks the domain untrusted", default: "" },
	OptionDescription { name: "inline", description: "enable branch inlining for `bool then:`", default: "true" },
	OptionDescription { name: "maxgcmemory", description: "GC collection threshold, in bytes", default: "-1" },
	OptionDescription { name: "gcstats", description: "print a report after every collection", default: "true" },
];

/// A parsed `/name:value` collection. Missing options fall back to their description's
/// default, matching `GetStringOption`/`GetBoolOption`/`GetIntOption` returning a sentinel
/// rather than erroring when an option was never mentioned.
pub struct Options {
	values: HashMap<String, String>,
}

impl Options {
	/// Parses `args` (excluding argv[0]). An argument not starting with `/` is rejected with
	/// `BadFormat`, mirroring `EC_BAD_FORMAT` in the original.
	pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, OptionsError> {
		let mut values = HashMap::new();
		for arg in args {
			let Some(rest) = arg.strip_prefix('/') else {
				return Err(OptionsError::BadFormat(arg));
			};

			let (name, value) = match rest.split_once(':') {
				Some((name, value)) => (name, unquote(value)),
				None => (rest, "true".to_string()),
			};
			values.insert(name.to_ascii_lowercase(), value);
		}
		Ok(Self { values })
	}

	pub fn get_string(&self, name: &str) -> Option<&str> {
		self.values.get(name).map(String::as_str)
	}

	/// Returns `false` when unspecified, matching the original's documented default.
	pub fn get_bool(&self, name: &str) -> bool {
		match self.values.get(name).map(String::as_str) {
			Some("true") | Some("") => true,
			Some("false") => false,
			Some(_) | None => false,
		}
	}

	/// Returns `-1` when unspecified, matching the original's documented sentinel.
	pub fn get_int(&self, name: &str) -> Result<i64, OptionsError> {
		match self.values.get(name) {
			None => Ok(-1),
			Some(value) => value.parse().map_err(|_| OptionsError::BadFormat(format!("{name}:{value}"))),
		}
	}

	pub fn size(&self) -> usize {
		self.values.len()
	}

	pub fn print_help(&self) {
		println!("usage: skizo /source:<path|literal> [options]");
		for option in OPTIONS {
			println!("  /{:<14} {}", option.name, option.description);
		}
	}
}

/// Strips one layer of surrounding double quotes, if present, leaving interior quotes alone.
fn unquote(value: &str) -> String {
	value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value).to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn implicit_bool_option_defaults_to_true() {
		let options = Options::parse(["/dump".to_string()]).unwrap();
		assert!(options.get_bool("dump"));
		assert!(!options.get_bool("gcstats"));
	}

	#[test]
	fn explicit_bool_and_quoted_string_values_are_parsed() {
		let options = Options::parse([
			"/source:\"C:/my project/main.sk\"".to_string(),
			"/nullcheck:false".to_string(),
		])
		.unwrap();
		assert_eq!(options.get_string("source"), Some("C:/my project/main.sk"));
		assert!(!options.get_bool("nullcheck"));
	}

	#[test]
	fn missing_int_option_returns_negative_one() {
		let options = Options::parse([] as [String; 0]).unwrap();
		assert_eq!(options.get_int("maxgcmemory").unwrap(), -1);
	}

	#[test]
	fn argument_without_leading_slash_is_rejected() {
		let result = Options::parse(["source:foo".to_string()]);
		assert!(result.is_err());
	}
}
