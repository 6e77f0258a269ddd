//! `ProfilingInfo`: per-method call counters and timings (spec §11).
//!
//! Grounded on `original_source/Profiling.h`'s `CProfilingInfo` — a flat per-method record,
//! sortable by total time, average time, or call count, with a disk/console dump. Report
//! formatting for an interactive console is out of scope (spec §1 "Deliberately out of
//! scope: ... profiling report formatting"); `dump_to_string` renders the same fixed-width
//! table the original writes to `profile.txt`, and callers are free to print it verbatim or
//! hand it somewhere else entirely.

use std::cell::RefCell;

use fxhash::FxHashMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct MethodProfile {
	pub call_count: u64,
	pub total_time_ns: u64,
}

impl MethodProfile {
	pub fn average_time_ns(&self) -> u64 {
		if self.call_count == 0 {
			0
		} else {
			self.total_time_ns / self.call_count
		}
	}
}

#[derive(Debug, Clone)]
pub struct ProfileEntry {
	pub method_name: String,
	pub profile: MethodProfile,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SortKey {
	TotalTime,
	AverageTime,
	CallCount,
}

/// Owned by [`crate::domain::Domain`]; the emitted C's frame-management calls report back
/// into this through the FFI surface (spec §4.K "fetch profiling data") rather than through
/// a direct Rust call, since the generated C runs outside this crate once compiled.
#[derive(Default)]
pub struct ProfilingInfo {
	by_method: RefCell<FxHashMap<String, MethodProfile>>,
}

impl ProfilingInfo {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_call(&self, method_name: &str, elapsed_ns: u64) {
		let mut by_method = self.by_method.borrow_mut();
		let entry = by_method.entry(method_name.to_string()).or_default();
		entry.call_count += 1;
		entry.total_time_ns += elapsed_ns;
	}

	pub fn entries_sorted_by(&self, key: SortKey) -> Vec<ProfileEntry> {
		let mut entries: Vec<ProfileEntry> =
			self.by_method.borrow().iter().map(|(name, profile)| ProfileEntry { method_name: name.clone(), profile: *profile }).collect();
		entries.sort_by(|a, b| match key {
			SortKey::TotalTime => b.profile.total_time_ns.cmp(&a.profile.total_time_ns),
			SortKey::AverageTime => b.profile.average_time_ns().cmp(&a.profile.average_time_ns()),
			SortKey::CallCount => b.profile.call_count.cmp(&a.profile.call_count),
		});
		entries
	}

	pub fn dump_to_string(&self) -> String {
		let mut out = String::new();
		for entry in self.entries_sorted_by(SortKey::TotalTime) {
			out.push_str(&format!(
				"{:<40} calls={:<8} total_ns={:<12} avg_ns={}\n",
				entry.method_name,
				entry.profile.call_count,
				entry.profile.total_time_ns,
				entry.profile.average_time_ns()
			));
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn entries_sort_by_the_requested_key() {
		let profiling = ProfilingInfo::new();
		profiling.record_call("Foo.slow", 1000);
		profiling.record_call("Foo.fast", 10);
		profiling.record_call("Foo.fast", 10);

		let by_total = profiling.entries_sorted_by(SortKey::TotalTime);
		assert_eq!(by_total[0].method_name, "Foo.slow");

		let by_count = profiling.entries_sorted_by(SortKey::CallCount);
		assert_eq!(by_count[0].method_name, "Foo.fast");
	}

	#[test]
	fn average_time_divides_by_call_count() {
		let profiling = ProfilingInfo::new();
		profiling.record_call("Foo.m", 100);
		profiling.record_call("Foo.m", 300);
		let entries = profiling.entries_sorted_by(SortKey::TotalTime);
		assert_eq!(entries[0].profile.average_time_ns(), 200);
	}

	#[test]
	fn dump_to_string_lists_every_recorded_method() {
		let profiling = ProfilingInfo::new();
		profiling.record_call("Foo.m", 100);
		let dump = profiling.dump_to_string();
		assert!(dump.contains("Foo.m"));
		assert!(dump.contains("calls=1"));
	}
}
