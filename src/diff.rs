//! Child list reconciliation: matching new descriptors against a node's current children.

use crate::{
	element::{ElementDescriptor, ElementKind, Key, PropsDelta},
	error::DuplicateKeyConflict,
	lanes::Lane,
	rc_hash_map::{CountSaturatedError, RcHashMap},
	temp_set::TempKeySet,
	work_tree::{Draft, EffectPhase, NodeId, NodeKind, NodeStatus, WorkNode},
};
use hashbrown::HashMap;
use tracing::{debug, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

/// A single host-visible change, produced by the reconciler and applied by the commit pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
	/// Places the freshly created subtree rooted at `node`. `before` is the next sibling in the new child list that is neither created nor moved by this list's records.
	Create { parent: NodeId, node: NodeId, before: Option<NodeId> },
	Update { node: NodeId, delta: PropsDelta },
	/// `node` now sits at `index` in `parent`'s child list.
	Move { parent: NodeId, node: NodeId, index: usize },
	/// Removes the subtree rooted at `node`.
	Delete { node: NodeId },
}
impl Mutation {
	#[must_use]
	pub fn node(&self) -> NodeId {
		match *self {
			Mutation::Create { node, .. } | Mutation::Update { node, .. } | Mutation::Move { node, .. } | Mutation::Delete { node } => node,
		}
	}
}

/// How a child's own unit of work has to treat it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildWork {
	/// Reused: diff its children against the committed ones.
	Reconcile,
	/// Part of a freshly created subtree, covered by an ancestor's [`Mutation::Create`].
	Mount,
}

#[derive(Debug, Default)]
pub struct ChildrenDiff {
	pub children: Vec<NodeId>,
	pub mutations: Vec<Mutation>,
	/// Parallel to `children`.
	pub work: Vec<ChildWork>,
}

enum Slot {
	Reused { id: NodeId, old_index: usize, delta: PropsDelta },
	Created { id: NodeId },
}

/// Matches one level of new descriptors against a node's current children, staging the results.
///
/// Instances keep their scratch allocations between calls.
#[derive(Default)]
pub struct Reconciler {
	key_census: RcHashMap<Key, u16>,
	seen_keys: TempKeySet,
}
impl Reconciler {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Reconciles `parent`'s children against `new` and stages the updated child list on `parent`.
	///
	/// With `emit` unset, `parent` is part of a fresh subtree: every child is created and no mutations are recorded.
	///
	/// # Errors
	///
	/// Iff three or more of `new` share a key. Nothing is staged in that case.
	#[instrument(skip(self, draft, new), fields(new.len = new.len()))]
	pub(crate) fn reconcile_children(&mut self, draft: &mut Draft<'_>, parent: NodeId, new: &[ElementDescriptor], lane: Lane, emit: bool) -> Result<ChildrenDiff, DuplicateKeyConflict> {
		let keys = self.effective_keys(parent, new)?;
		let old = if emit { draft.get(parent).map(|node| node.children.clone()).unwrap_or_default() } else { Vec::new() };

		let span = trace_span!("Diffing children", %parent, old.len = old.len(), new.len = new.len());
		let _enter = span.enter();

		let mut keyed_old = HashMap::<Key, usize>::with_capacity(old.len());
		for (j, &id) in old.iter().enumerate() {
			match draft.get(id) {
				Some(WorkNode { key: Some(key), status, .. }) if *status != NodeStatus::Unmounted => {
					keyed_old.insert(key.clone(), j);
				}
				Some(_) => (),
				None => warn!("Child {} of {} is missing from the work tree. Ignoring it.", id, parent),
			}
		}

		let mut consumed = vec![false; old.len()];
		let mut deleted = vec![false; old.len()];
		let mut slots = Vec::with_capacity(new.len());

		for (i, (descriptor, key)) in new.iter().zip(keys).enumerate() {
			let matched = match &key {
				Some(key) => keyed_old.get(key).copied(),
				None => old
					.get(i)
					.filter(|&&id| draft.get(id).map_or(false, |node| node.key.is_none() && node.status != NodeStatus::Unmounted))
					.map(|_| i),
			}
			.filter(|&j| !consumed[j]);

			let slot = match matched {
				Some(j) => {
					consumed[j] = true;
					let old_id = old[j];
					let same_type = draft.get(old_id).map_or(false, |node| node.kind.matches(&descriptor.kind));
					if same_type {
						let delta = Self::reuse(draft, old_id, descriptor, key, lane);
						Slot::Reused { id: old_id, old_index: j, delta }
					} else {
						if let Some(node) = draft.get(old_id) {
							debug!("Replacing {} ({}) with {}.", node.kind, old_id, descriptor.kind);
							if STATIC_MAX_LEVEL >= Level::WARN {
								if let (NodeKind::Host(a), ElementKind::Host(b)) = (&node.kind, &descriptor.kind) {
									if a.eq_ignore_ascii_case(b) {
										warn!(
											"Recreating element due to different tag name casing: {:?} -> {:?}\n\
											Host tag names are compared exactly.",
											a, b
										)
									}
								}
							}
						}
						deleted[j] = true;
						Slot::Created { id: Self::create(draft, parent, descriptor, key, lane) }
					}
				}
				None => Slot::Created { id: Self::create(draft, parent, descriptor, key, lane) },
			};
			slots.push(slot);
		}

		for (j, consumed) in consumed.iter().enumerate() {
			if !consumed {
				deleted[j] = true;
			}
		}

		let children: Vec<NodeId> = slots
			.iter()
			.map(|slot| match *slot {
				Slot::Reused { id, .. } | Slot::Created { id } => id,
			})
			.collect();

		let reused_old_indices: Vec<usize> = slots
			.iter()
			.filter_map(|slot| match *slot {
				Slot::Reused { old_index, .. } => Some(old_index),
				Slot::Created { .. } => None,
			})
			.collect();
		let mut lis = longest_increasing_subsequence(&reused_old_indices).into_iter();
		// Children that keep their host position: reused and not moved.
		let stays: Vec<bool> = slots
			.iter()
			.map(|slot| match slot {
				Slot::Reused { .. } => lis.next().unwrap_or(true),
				Slot::Created { .. } => false,
			})
			.collect();

		let mut diff = ChildrenDiff {
			children: Vec::new(),
			mutations: Vec::new(),
			work: Vec::with_capacity(slots.len()),
		};

		if emit {
			diff.mutations.extend(old.iter().zip(&deleted).filter(|(_, is_deleted)| **is_deleted).map(|(&node, _)| Mutation::Delete { node }));
		}

		for (i, slot) in slots.into_iter().enumerate() {
			match slot {
				Slot::Created { id } => {
					if emit {
						diff.mutations.push(Mutation::Create {
							parent,
							node: id,
							before: children.iter().zip(&stays).skip(i + 1).find(|(_, keeps)| **keeps).map(|(&id, _)| id),
						});
					}
					diff.work.push(ChildWork::Mount);
				}
				Slot::Reused { id, delta, .. } => {
					if !stays[i] {
						trace!("Moving {} to index {}.", id, i);
						diff.mutations.push(Mutation::Move { parent, node: id, index: i });
					}
					if !delta.is_empty() && draft.get(id).map_or(false, |node| node.kind.is_host_bearing()) {
						diff.mutations.push(Mutation::Update { node: id, delta });
					}
					diff.work.push(ChildWork::Reconcile);
				}
			}
		}

		if let Some(parent_node) = draft.stage(parent) {
			parent_node.children = children.clone();
		}
		diff.children = children;
		Ok(diff)
	}

	/// Stages `id` with `descriptor`'s props and returns the shallow props delta.
	fn reuse(draft: &mut Draft<'_>, id: NodeId, descriptor: &ElementDescriptor, key: Option<Key>, lane: Lane) -> PropsDelta {
		let node = match draft.stage(id) {
			Some(node) => node,
			None => return PropsDelta::default(),
		};
		node.pending_props = descriptor.props.clone();
		node.key = key;
		node.lane = Some(lane);
		node.status = NodeStatus::Reconciling;
		if let ElementKind::Component(_) = descriptor.kind {
			node.element_children = descriptor.children.clone();
		}

		let delta = node.last_props.diff(&node.pending_props);
		if !delta.is_empty() {
			if cfg!(feature = "dangerous-logging") {
				trace!(%id, ?delta, "Props changed.");
			} else {
				trace!(%id, props = ?delta.names().collect::<Vec<_>>(), "Props changed.");
			}
			node.effects.push(EffectPhase::Update);
		}
		delta
	}

	fn create(draft: &mut Draft<'_>, parent: NodeId, descriptor: &ElementDescriptor, key: Option<Key>, lane: Lane) -> NodeId {
		let id = draft.allocate_id();
		trace!("Creating {} as {}.", descriptor.kind, id);
		draft.insert(WorkNode::from_descriptor(id, parent, key, descriptor, lane));
		id
	}

	/// Resolves duplicate keys: the last descriptor with a key keeps it, an earlier one becomes keyless.
	fn effective_keys(&mut self, parent: NodeId, new: &[ElementDescriptor]) -> Result<Vec<Option<Key>>, DuplicateKeyConflict> {
		self.key_census.clear();
		for key in new.iter().filter_map(|descriptor| descriptor.key.as_ref()) {
			if let Err(CountSaturatedError) = self.key_census.increment(key.clone()) {
				warn!("Key occurrence count saturated for {}.", key);
			}
		}
		for key in new.iter().filter_map(|descriptor| descriptor.key.as_ref()) {
			let occurrences = usize::from(self.key_census.count(key));
			if occurrences > 2 {
				return Err(DuplicateKeyConflict {
					parent,
					key: key.clone(),
					occurrences,
				});
			}
		}

		let seen = self.seen_keys.temp();
		let mut keys = vec![None; new.len()];
		for (i, descriptor) in new.iter().enumerate().rev() {
			if let Some(key) = &descriptor.key {
				if seen.insert(key.clone()) {
					keys[i] = Some(key.clone());
				} else {
					warn!("Duplicate key {} among children of {}; Matching the earlier one by position.", key, parent);
				}
			}
		}
		Ok(keys)
	}

	/// Scratch capacities, for logging.
	#[must_use]
	pub fn capacities(&self) -> (usize, usize) {
		(self.key_census.capacity(), self.seen_keys.capacity())
	}
}

/// Marks the members of one longest strictly increasing subsequence of `sequence`.
///
/// Nodes whose old positions form this subsequence keep their place; all other reused nodes are moved.
/// On ties, the subsequence ending in the smallest value wins, so of two swapped nodes the later one stays put.
fn longest_increasing_subsequence(sequence: &[usize]) -> Vec<bool> {
	let mut tails: Vec<usize> = Vec::new();
	let mut predecessors = vec![None; sequence.len()];
	for (i, &value) in sequence.iter().enumerate() {
		let position = tails.partition_point(|&tail| sequence[tail] < value);
		if position > 0 {
			predecessors[i] = Some(tails[position - 1]);
		}
		if position == tails.len() {
			tails.push(i)
		} else {
			tails[position] = i
		}
	}

	let mut members = vec![false; sequence.len()];
	let mut next = tails.last().copied();
	while let Some(i) = next {
		members[i] = true;
		next = predecessors[i];
	}
	members
}
