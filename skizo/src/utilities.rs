use std::cell::Cell;
use std::fmt::{Debug, Formatter};

/// Rounds `value` up to the next multiple of `MULTIPLE`. Used by [`crate::types::system`]
/// when laying out fields: every field in a [`crate::types::class::Class`] GC map starts
/// at a word-aligned offset.
#[inline]
pub(crate) const fn round_to_multiple_of<const MULTIPLE: usize>(value: usize) -> usize {
	((value + (MULTIPLE - 1)) / MULTIPLE) * MULTIPLE
}

/// Formats a `Cell<&[T]>` by printing its current contents, for use with
/// `#[derivative(Debug(format_with = "..."))]` on lazily-populated slice fields
/// (a class's fields/methods are filled in after the shell is allocated).
pub(crate) fn fmt_debug_cell<T: Debug>(cell: &Cell<&[T]>, f: &mut Formatter<'_>) -> std::fmt::Result {
	let slice = cell.get();
	f.debug_list().entries(slice.iter()).finish()
}

/// Formats the *values* of a map, omitting keys. Used for debug-printing registries
/// keyed by a field already present on the value (e.g. a class registry keyed by its
/// own flat name).
pub(crate) fn fmt_debug_values<'l, K, V: Debug>(
	map: &std::collections::HashMap<K, V, impl std::hash::BuildHasher>,
	f: &mut Formatter<'_>,
) -> std::fmt::Result {
	f.debug_list().entries(map.values()).finish()
}

/// Formats a byte slice as a contiguous hex string, e.g. for strong-name-style blobs.
pub(crate) fn display_as_hex(bytes: &[u8], f: &mut Formatter<'_>) -> std::fmt::Result {
	for byte in bytes {
		write!(f, "{byte:02X}")?;
	}
	Ok(())
}
