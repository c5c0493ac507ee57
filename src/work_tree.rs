//! The engine's persistent record of what is currently rendered.
//!
//! Nodes live in an arena keyed by [`NodeId`]. Children are owned through their parent's child list;
//! the parent index is only ever used for upward walks.

use crate::{
	element::{Component, ElementDescriptor, ElementKind, Key, Props},
	host::HostHandle,
	lanes::Lane,
};
use core::fmt::{self, Display, Formatter};
use hashbrown::HashMap;
use std::{rc::Rc, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);
impl NodeId {
	/// Every [`WorkTree`] starts out with its root node under this id.
	pub const ROOT: NodeId = NodeId(0);
}
impl Display for NodeId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "node {}", self.0)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
	/// Owns the host container the root was created for.
	Root,
	Host(Arc<str>),
	Component(Component),
	Text,
}
impl NodeKind {
	/// Whether this node owns a host instance (or, for [`NodeKind::Root`], the container).
	#[must_use]
	pub fn is_host_bearing(&self) -> bool {
		!matches!(self, NodeKind::Component(_))
	}

	#[must_use]
	pub fn matches(&self, kind: &ElementKind) -> bool {
		match (self, kind) {
			(NodeKind::Host(a), ElementKind::Host(b)) => a == b,
			(NodeKind::Component(a), ElementKind::Component(b)) => a == b,
			(NodeKind::Text, ElementKind::Text) => true,
			_ => false,
		}
	}

	#[must_use]
	pub fn as_component(&self) -> Option<&Component> {
		match self {
			NodeKind::Component(component) => Some(component),
			_ => None,
		}
	}
}
impl From<&ElementKind> for NodeKind {
	fn from(kind: &ElementKind) -> Self {
		match kind {
			ElementKind::Host(tag) => NodeKind::Host(tag.clone()),
			ElementKind::Component(component) => NodeKind::Component(component.clone()),
			ElementKind::Text => NodeKind::Text,
		}
	}
}
impl Display for NodeKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			NodeKind::Root => f.write_str("#root"),
			NodeKind::Host(tag) => write!(f, "<{}>", tag),
			NodeKind::Component(component) => f.write_str(component.name()),
			NodeKind::Text => f.write_str("#text"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
	/// Never placed, or defensively detached after a host adapter failure.
	Unmounted,
	/// Staged by an in-progress pass.
	Reconciling,
	/// Staged, with all of its descendants reconciled.
	Complete,
	Committed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectPhase {
	Mount,
	Update,
	Unmount,
}

/// A side effect as it was run by the commit pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectRecord {
	pub node: NodeId,
	pub phase: EffectPhase,
}

#[derive(Debug, Clone)]
pub struct WorkNode {
	pub id: NodeId,
	pub kind: NodeKind,
	/// The key this node was matched under. Earlier duplicates are stored as [`None`].
	pub key: Option<Key>,
	pub last_props: Props,
	pub pending_props: Props,
	/// Descriptor children the node was last rendered with. Only tracked for components.
	pub element_children: Rc<[ElementDescriptor]>,
	pub children: Vec<NodeId>,
	pub parent: Option<NodeId>,
	/// Pending effects, drained by the commit pipeline.
	pub effects: Vec<EffectPhase>,
	pub lane: Option<Lane>,
	pub status: NodeStatus,
	pub host: Option<HostHandle>,
}
impl WorkNode {
	pub(crate) fn from_descriptor(id: NodeId, parent: NodeId, key: Option<Key>, descriptor: &ElementDescriptor, lane: Lane) -> Self {
		Self {
			id,
			kind: (&descriptor.kind).into(),
			key,
			last_props: Props::new(),
			pending_props: descriptor.props.clone(),
			element_children: match descriptor.kind {
				ElementKind::Component(_) => descriptor.children.clone(),
				_ => Rc::new([]),
			},
			children: Vec::new(),
			parent: Some(parent),
			effects: vec![EffectPhase::Mount],
			lane: Some(lane),
			status: NodeStatus::Reconciling,
			host: None,
		}
	}
}

/// One root's committed node arena.
#[derive(Debug)]
pub struct WorkTree {
	nodes: HashMap<NodeId, WorkNode>,
	pub(crate) next_id: u64,
}
impl WorkTree {
	#[must_use]
	pub fn new(container: HostHandle) -> Self {
		let mut nodes = HashMap::new();
		nodes.insert(
			NodeId::ROOT,
			WorkNode {
				id: NodeId::ROOT,
				kind: NodeKind::Root,
				key: None,
				last_props: Props::new(),
				pending_props: Props::new(),
				element_children: Rc::new([]),
				children: Vec::new(),
				parent: None,
				effects: Vec::new(),
				lane: None,
				status: NodeStatus::Committed,
				host: Some(container),
			},
		);
		Self { nodes, next_id: 1 }
	}

	#[must_use]
	pub fn root(&self) -> &WorkNode {
		&self.nodes[&NodeId::ROOT]
	}

	#[must_use]
	pub fn get(&self, id: NodeId) -> Option<&WorkNode> {
		self.nodes.get(&id)
	}

	pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut WorkNode> {
		self.nodes.get_mut(&id)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Children of `id`, or an empty slice for unknown nodes.
	#[must_use]
	pub fn children(&self, id: NodeId) -> &[NodeId] {
		self.nodes.get(&id).map_or(&[], |node| &node.children)
	}

	pub(crate) fn install(&mut self, node: WorkNode) {
		self.nodes.insert(node.id, node);
	}

	pub(crate) fn evict(&mut self, id: NodeId) -> Option<WorkNode> {
		debug_assert_ne!(id, NodeId::ROOT, "Tried to evict the root node");
		self.nodes.remove(&id)
	}

	/// `id`'s subtree in depth-first post-order, children before their parent.
	#[must_use]
	pub fn post_order(&self, id: NodeId) -> Vec<NodeId> {
		let mut order = Vec::new();
		let mut stack = vec![(id, false)];
		while let Some((id, expanded)) = stack.pop() {
			if expanded {
				order.push(id);
				continue;
			}
			stack.push((id, true));
			for &child in self.children(id).iter().rev() {
				stack.push((child, false));
			}
		}
		order
	}

	/// Ancestors of `id` from the root down, including `id` itself.
	#[must_use]
	pub fn path(&self, id: NodeId) -> Vec<NodeId> {
		let mut path = vec![id];
		let mut current = id;
		while let Some(parent) = self.get(current).and_then(|node| node.parent) {
			path.push(parent);
			current = parent;
		}
		path.reverse();
		path
	}
}

/// Nodes an in-progress pass has staged on top of a [`WorkTree`] without touching it.
#[derive(Debug, Default)]
pub(crate) struct StagedNodes {
	nodes: HashMap<NodeId, WorkNode>,
	/// Staging order, for rewinding to a checkpoint.
	log: Vec<NodeId>,
	next_id: u64,
}
impl StagedNodes {
	pub fn new(base: &WorkTree) -> Self {
		Self {
			nodes: HashMap::new(),
			log: Vec::new(),
			next_id: base.next_id,
		}
	}

	pub fn checkpoint(&self) -> usize {
		self.log.len()
	}

	/// Forgets everything staged after `checkpoint`. Copies of committed nodes revert to the committed state.
	pub fn rewind(&mut self, checkpoint: usize) {
		for id in self.log.drain(checkpoint..) {
			self.nodes.remove(&id);
		}
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn capacity(&self) -> usize {
		self.nodes.capacity()
	}

	pub fn into_parts(self) -> (HashMap<NodeId, WorkNode>, Vec<NodeId>, u64) {
		(self.nodes, self.log, self.next_id)
	}
}

/// Read-through view of a [`WorkTree`] with a pass's [`StagedNodes`] layered on top.
pub(crate) struct Draft<'a> {
	pub base: &'a WorkTree,
	pub staged: &'a mut StagedNodes,
}
impl<'a> Draft<'a> {
	pub fn get(&self, id: NodeId) -> Option<&WorkNode> {
		self.staged.nodes.get(&id).or_else(|| self.base.get(id))
	}

	/// Stages a copy of the committed node first, if necessary.
	pub fn stage(&mut self, id: NodeId) -> Option<&mut WorkNode> {
		if !self.staged.nodes.contains_key(&id) {
			let mut node = self.base.get(id)?.clone();
			node.effects.clear();
			self.staged.nodes.insert(id, node);
			self.staged.log.push(id);
		}
		self.staged.nodes.get_mut(&id)
	}

	pub fn allocate_id(&mut self) -> NodeId {
		let id = NodeId(self.staged.next_id);
		self.staged.next_id += 1;
		id
	}

	pub fn insert(&mut self, node: WorkNode) {
		let id = node.id;
		debug_assert!(self.base.get(id).is_none() && !self.staged.nodes.contains_key(&id), "Node id allocated twice: {}", id);
		self.staged.nodes.insert(id, node);
		self.staged.log.push(id);
	}
}
