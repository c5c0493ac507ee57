//! Applies a finished pass to the host and installs it into the committed work tree.
//!
//! Commits are synchronous and never interrupted. Host failures don't stop a commit: the affected subtree is marked
//! [`Unmounted`](`NodeStatus::Unmounted`), the failure is reported and the remaining records are still applied.

use crate::{
	diff::Mutation,
	element::{Component, PropsDelta},
	error::{DuplicateKeyConflict, HostAdapterError, HostError},
	host::{HostAdapter, HostHandle, HostNodeType, HostOperation},
	lanes::Lane,
	pass::FinishedPass,
	scheduler::RootId,
	work_tree::{EffectPhase, EffectRecord, NodeId, NodeKind, NodeStatus, WorkTree},
};
use core::mem;
use hashbrown::HashSet;
use tracing::{debug, error, info, trace_span, warn};

/// Record counts of one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationCounts {
	pub create: usize,
	pub update: usize,
	pub moves: usize,
	pub delete: usize,
}
impl MutationCounts {
	#[must_use]
	pub fn of(mutations: &[Mutation]) -> Self {
		let mut counts = Self::default();
		for mutation in mutations {
			match mutation {
				Mutation::Create { .. } => counts.create += 1,
				Mutation::Update { .. } => counts.update += 1,
				Mutation::Move { .. } => counts.moves += 1,
				Mutation::Delete { .. } => counts.delete += 1,
			}
		}
		counts
	}

	#[must_use]
	pub fn total(&self) -> usize {
		self.create + self.update + self.moves + self.delete
	}
}

/// What a single commit did.
#[derive(Debug, Clone)]
pub struct CommitReport {
	pub root: RootId,
	pub lane: Lane,
	/// The records as they were applied, in order.
	pub mutations: Vec<Mutation>,
	pub counts: MutationCounts,
	/// Effects in the order they ran.
	pub effects: Vec<EffectRecord>,
	/// Subtrees that kept their previous output.
	pub conflicts: Vec<DuplicateKeyConflict>,
	pub host_errors: Vec<HostAdapterError>,
}

struct Commit<'a, H: ?Sized> {
	tree: &'a mut WorkTree,
	host: &'a mut H,
	/// Created or moved nodes whose record hasn't been applied yet. Never used as insertion anchors.
	pending: HashSet<NodeId>,
	/// Created nodes that have no host instances yet.
	unplaced: HashSet<NodeId>,
	host_errors: Vec<HostAdapterError>,
}

pub(crate) fn commit<H: HostAdapter + ?Sized>(tree: &mut WorkTree, host: &mut H, pass: FinishedPass) -> CommitReport {
	let FinishedPass {
		root,
		lane,
		mutations,
		conflicts,
		mut staged,
		staged_order,
		next_id,
	} = pass;
	let span = trace_span!("Commit", %root, %lane, mutations = mutations.len());
	let _enter = span.enter();

	// Deleted subtrees still hang off the committed tree until they're evicted.
	let deleted: Vec<NodeId> = mutations
		.iter()
		.filter_map(|mutation| match *mutation {
			Mutation::Delete { node } => Some(node),
			_ => None,
		})
		.flat_map(|node| tree.post_order(node))
		.collect();

	for id in &staged_order {
		if let Some(node) = staged.remove(id) {
			tree.install(node);
		}
	}
	debug_assert!(staged.is_empty(), "Staged nodes missing from the staging log");
	tree.next_id = tree.next_id.max(next_id);

	let mut unplaced = HashSet::new();
	let mut pending = HashSet::new();
	for mutation in &mutations {
		match *mutation {
			Mutation::Create { node, .. } => {
				unplaced.insert(node);
				pending.insert(node);
			}
			Mutation::Move { node, .. } => {
				pending.insert(node);
			}
			Mutation::Update { .. } | Mutation::Delete { .. } => (),
		}
	}

	let mut commit = Commit {
		tree: &mut *tree,
		host,
		pending,
		unplaced,
		host_errors: Vec::new(),
	};
	for mutation in &mutations {
		commit.apply(mutation);
	}
	let host_errors = commit.host_errors;

	for id in &staged_order {
		if let Some(node) = tree.get_mut(*id) {
			node.last_props.clone_from(&node.pending_props);
			node.lane = None;
			if node.status != NodeStatus::Unmounted {
				node.status = NodeStatus::Committed;
			}
		}
	}

	let mut effects = Vec::new();
	for &id in &deleted {
		if let Some(node) = tree.get(id) {
			if let Some(lifecycle) = node.kind.as_component().and_then(Component::lifecycle) {
				lifecycle.unmounting(id, &node.last_props);
			}
			effects.push(EffectRecord { node: id, phase: EffectPhase::Unmount });
		}
	}
	run_effects(tree, &staged_order, &mut effects);

	for &id in &deleted {
		tree.evict(id);
	}

	let counts = MutationCounts::of(&mutations);
	info!(
		creates = counts.create,
		updates = counts.update,
		moves = counts.moves,
		deletes = counts.delete,
		effects = effects.len(),
		host_errors = host_errors.len(),
		"Committed {} update.",
		lane
	);

	CommitReport {
		root,
		lane,
		mutations,
		counts,
		effects,
		conflicts,
		host_errors,
	}
}

/// Runs mount and update effects of the nodes staged by this commit's pass, children before their parents.
fn run_effects(tree: &mut WorkTree, staged: &[NodeId], effects: &mut Vec<EffectRecord>) {
	// Only staged nodes can have staged descendants.
	let touched: HashSet<NodeId> = staged.iter().copied().collect();
	let mut stack = vec![(NodeId::ROOT, false)];
	while let Some((id, expanded)) = stack.pop() {
		if !expanded {
			if touched.contains(&id) {
				stack.push((id, true));
				stack.extend(tree.children(id).iter().rev().map(|&child| (child, false)));
			}
			continue;
		}

		let phases = match tree.get_mut(id) {
			Some(node) => mem::take(&mut node.effects),
			None => continue,
		};
		let node = match tree.get(id) {
			Some(node) => node,
			None => continue,
		};
		if node.status == NodeStatus::Unmounted {
			if !phases.is_empty() {
				debug!("Skipping effects of unmounted {}.", id);
			}
			continue;
		}
		let lifecycle = node.kind.as_component().and_then(Component::lifecycle);
		for phase in phases {
			if let Some(lifecycle) = lifecycle {
				match phase {
					EffectPhase::Mount => lifecycle.mounted(id, &node.last_props),
					EffectPhase::Update => lifecycle.updated(id, &node.last_props),
					EffectPhase::Unmount => lifecycle.unmounting(id, &node.last_props),
				}
			}
			effects.push(EffectRecord { node: id, phase });
		}
	}
}

impl<'a, H: HostAdapter + ?Sized> Commit<'a, H> {
	fn apply(&mut self, mutation: &Mutation) {
		let span = trace_span!("Applying record", node = %mutation.node());
		let _enter = span.enter();

		match mutation {
			Mutation::Delete { node } => self.delete(*node),
			Mutation::Create { node, .. } => {
				self.create(*node);
				self.unplaced.remove(node);
				self.pending.remove(node);
			}
			Mutation::Move { node, .. } => {
				self.move_node(*node);
				self.pending.remove(node);
			}
			Mutation::Update { node, delta } => self.update(*node, delta),
		}
	}

	fn is_unmounted(&self, id: NodeId) -> bool {
		self.tree.get(id).map_or(true, |node| node.status == NodeStatus::Unmounted)
	}

	fn fail(&mut self, id: NodeId, operation: HostOperation, source: HostError) {
		let error = HostAdapterError { node: id, operation, source };
		if cfg!(feature = "log-paths") {
			error!("{} Path: {:?}. Marking the subtree unmounted.", error, self.tree.path(id));
		} else {
			error!("{} Marking the subtree unmounted.", error);
		}
		self.mark_unmounted(id);
		self.host_errors.push(error);
	}

	fn mark_unmounted(&mut self, id: NodeId) {
		for id in self.tree.post_order(id) {
			if let Some(node) = self.tree.get_mut(id) {
				node.status = NodeStatus::Unmounted;
			}
		}
	}

	fn delete(&mut self, id: NodeId) {
		let best_effort = self.is_unmounted(id);
		for handle in self.top_level_hosts(id) {
			if let Err(source) = self.host.remove(handle) {
				if best_effort {
					debug!("Best-effort removal of unmounted {} failed: {}", id, source);
				} else {
					self.fail(id, HostOperation::Remove, source);
				}
			}
		}
	}

	fn create(&mut self, id: NodeId) {
		if self.is_unmounted(id) {
			warn!("Skipping creation of unmounted {}.", id);
			return;
		}
		let parent = match self.host_parent(id) {
			Some(parent) => parent,
			None => {
				warn!("{} has no mounted host parent. Skipping its creation.", id);
				self.mark_unmounted(id);
				return;
			}
		};

		let mut created = Vec::new();
		let handles = match self.materialize(id, &mut created) {
			Ok(handles) => handles,
			Err((failed, operation, source)) => {
				// Children were created after their parents, so this detaches bottom-up.
				for &handle in created.iter().rev() {
					if let Err(error) = self.host.remove(handle) {
						debug!("Cleanup of a partially created subtree failed: {}", error);
					}
				}
				self.forget_hosts(id);
				self.fail(failed, operation, source);
				self.mark_unmounted(id);
				return;
			}
		};

		let before = self.anchor(id);
		for &handle in &handles {
			if let Err(source) = self.host.insert(parent, handle, before) {
				for &handle in &handles {
					if let Err(error) = self.host.remove(handle) {
						debug!("Cleanup of a failed insertion failed: {}", error);
					}
				}
				self.forget_hosts(id);
				self.fail(id, HostOperation::Insert, source);
				return;
			}
		}
	}

	/// Creates host instances for `id`'s subtree and assembles them, detached. Returns the top-level handles.
	fn materialize(&mut self, id: NodeId, created: &mut Vec<HostHandle>) -> Result<Vec<HostHandle>, (NodeId, HostOperation, HostError)> {
		let node = match self.tree.get(id) {
			Some(node) => node,
			None => return Ok(Vec::new()),
		};
		let children = node.children.clone();
		let result = match &node.kind {
			NodeKind::Host(tag) => Some(self.host.create(HostNodeType::Element(tag), &node.pending_props)),
			NodeKind::Text => Some(self.host.create(HostNodeType::Text, &node.pending_props)),
			NodeKind::Component(_) | NodeKind::Root => None,
		};
		let handle = match result {
			Some(result) => result.map_err(|source| (id, HostOperation::Create, source))?,
			None => {
				let mut handles = Vec::new();
				for child in children {
					handles.extend(self.materialize(child, created)?);
				}
				return Ok(handles);
			}
		};
		created.push(handle);
		if let Some(node) = self.tree.get_mut(id) {
			node.host = Some(handle);
		}

		for child in children {
			for child_handle in self.materialize(child, created)? {
				self.host.insert(handle, child_handle, None).map_err(|source| (child, HostOperation::Insert, source))?;
			}
		}
		Ok(vec![handle])
	}

	fn forget_hosts(&mut self, id: NodeId) {
		for id in self.tree.post_order(id) {
			if let Some(node) = self.tree.get_mut(id) {
				node.host = None;
			}
		}
	}

	fn move_node(&mut self, id: NodeId) {
		if self.is_unmounted(id) {
			warn!("Skipping move of unmounted {}.", id);
			return;
		}
		let parent = match self.host_parent(id) {
			Some(parent) => parent,
			None => {
				warn!("{} has no mounted host parent. Skipping its move.", id);
				return;
			}
		};
		let before = self.anchor(id);
		for handle in self.top_level_hosts(id) {
			if let Err(source) = self.host.move_child(parent, handle, before) {
				self.fail(id, HostOperation::Move, source);
				return;
			}
		}
	}

	fn update(&mut self, id: NodeId, delta: &PropsDelta) {
		let node = match self.tree.get(id) {
			Some(node) => node,
			None => {
				warn!("Skipping update of missing {}.", id);
				return;
			}
		};
		if node.status == NodeStatus::Unmounted {
			warn!("Skipping update of unmounted {}.", id);
			return;
		}
		let handle = match node.host {
			Some(handle) => handle,
			None => {
				warn!("Skipping update of {} ({}), which has no host instance.", id, node.kind);
				return;
			}
		};
		if let Err(source) = self.host.update(handle, delta) {
			self.fail(id, HostOperation::Update, source);
		}
	}

	/// The host instance of the nearest host-bearing ancestor (or the root container).
	fn host_parent(&self, id: NodeId) -> Option<HostHandle> {
		let mut current = self.tree.get(id)?.parent?;
		loop {
			let node = self.tree.get(current)?;
			if node.status == NodeStatus::Unmounted {
				return None;
			}
			if node.kind.is_host_bearing() {
				return node.host;
			}
			current = node.parent?;
		}
	}

	/// Host instances directly below `id`'s host parent that belong to `id`'s subtree, in order.
	fn top_level_hosts(&self, id: NodeId) -> Vec<HostHandle> {
		let mut handles = Vec::new();
		let mut stack = vec![id];
		while let Some(id) = stack.pop() {
			if self.unplaced.contains(&id) {
				continue;
			}
			let node = match self.tree.get(id) {
				Some(node) => node,
				None => continue,
			};
			if node.kind.is_host_bearing() {
				handles.extend(node.host);
			} else {
				stack.extend(node.children.iter().rev());
			}
		}
		handles
	}

	/// The next placed host instance after `id` in new-tree order, within the same host parent.
	fn anchor(&self, id: NodeId) -> Option<HostHandle> {
		let mut current = id;
		loop {
			let parent_id = self.tree.get(current)?.parent?;
			let parent = self.tree.get(parent_id)?;
			let position = parent.children.iter().position(|&child| child == current)?;
			if let Some(handle) = parent.children[position + 1..].iter().find_map(|&sibling| self.first_placed_host(sibling)) {
				return Some(handle);
			}
			if parent.kind.is_host_bearing() {
				return None;
			}
			current = parent_id;
		}
	}

	fn first_placed_host(&self, id: NodeId) -> Option<HostHandle> {
		if self.pending.contains(&id) {
			return None;
		}
		let node = self.tree.get(id)?;
		if node.status == NodeStatus::Unmounted {
			return None;
		}
		if node.kind.is_host_bearing() {
			node.host
		} else {
			node.children.iter().find_map(|&child| self.first_placed_host(child))
		}
	}
}
