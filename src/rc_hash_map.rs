use core::hash::{BuildHasher, Hash};
use hashbrown::{
	hash_map::{DefaultHashBuilder, Entry},
	HashMap,
};
use num_traits::{CheckedAdd, One, Zero};

/// A reusable occurrence counter. Cleared between uses so its capacity carries over.
pub struct RcHashMap<K, C, S = DefaultHashBuilder>(HashMap<K, C, S>)
where
	K: Hash + Eq,
	C: CheckedAdd + One + Zero + Copy,
	S: BuildHasher;
impl<K, C, S> Default for RcHashMap<K, C, S>
where
	K: Hash + Eq,
	C: CheckedAdd + One + Zero + Copy,
	S: Default + BuildHasher,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<K, C, S> RcHashMap<K, C, S>
where
	K: Hash + Eq,
	C: CheckedAdd + One + Zero + Copy,
	S: BuildHasher,
{
	#[must_use]
	pub fn new() -> Self
	where
		S: Default,
	{
		Self(HashMap::with_hasher(S::default()))
	}

	/// Counts one more occurrence of `k` and returns the new count.
	pub fn increment(&mut self, k: K) -> Result<C, CountSaturatedError> {
		match self.0.entry(k) {
			Entry::Occupied(occupied) => {
				let c = occupied.into_mut();
				*c = c.checked_add(&C::one()).ok_or(CountSaturatedError)?;
				Ok(*c)
			}
			Entry::Vacant(vacant) => Ok(*vacant.insert(C::one())),
		}
	}

	/// How often `k` was counted since the last [`clear`](`RcHashMap::clear`).
	pub fn count(&self, k: &K) -> C {
		self.0.get(k).copied().unwrap_or_else(C::zero)
	}

	pub fn clear(&mut self) {
		self.0.clear()
	}

	pub fn capacity(&self) -> usize {
		self.0.capacity()
	}
}

#[derive(Debug)]
pub struct CountSaturatedError;
