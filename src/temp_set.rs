use crate::element::Key;
use hashbrown::HashSet;

/// Scratch set for sibling key bookkeeping, reused across child lists so its allocation sticks around.
#[derive(Debug, Default)]
pub struct TempKeySet(HashSet<Key>);
impl TempKeySet {
	/// Borrows the set, cleared.
	pub fn temp(&mut self) -> &mut HashSet<Key> {
		self.0.clear();
		&mut self.0
	}

	/// Retrieves the cache set's capacity without clearing it first.
	pub fn capacity(&self) -> usize {
		self.0.capacity()
	}
}
