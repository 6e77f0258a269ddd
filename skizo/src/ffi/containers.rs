use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};

#[repr(C)]
pub struct BoxSlice<T> {
	data: *mut T,
	len: usize,
}

impl<T> Deref for BoxSlice<T> {
	type Target = [T];
	fn deref(&self) -> &Self::Target {
		unsafe { std::slice::from_raw_parts(self.data, self.len) }
	}
}

impl<T> DerefMut for BoxSlice<T> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		unsafe { std::slice::from_raw_parts_mut(self.data, self.len) }
	}
}

impl<T> From<Vec<T>> for BoxSlice<T> {
	fn from(value: Vec<T>) -> Self {
		Self::from(value.into_boxed_slice())
	}
}

impl<T> From<std::boxed::Box<[T]>> for BoxSlice<T> {
	fn from(value: std::boxed::Box<[T]>) -> Self {
		Self {
			len: value.len(),
			data: std::boxed::Box::leak(value).as_mut_ptr(),
		}
	}
}

impl<T> Drop for BoxSlice<T> {
	fn drop(&mut self) {
		unsafe { drop(std::boxed::Box::from_raw(std::slice::from_raw_parts_mut(self.data, self.len))) }
	}
}

impl<T: Clone> Clone for BoxSlice<T> {
	fn clone(&self) -> Self {
		Self::from(std::boxed::Box::from_iter(self.iter().cloned()))
	}
}

impl<T: Eq> Eq for BoxSlice<T> {}
impl<T: PartialEq> PartialEq for BoxSlice<T> {
	fn eq(&self, other: &Self) -> bool {
		(**self).eq(&**other)
	}
}

impl<T: Debug> Debug for BoxSlice<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		(*self).deref().fmt(f)
	}
}
