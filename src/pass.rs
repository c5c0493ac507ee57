//! One resumable reconciliation attempt for one root update.
//!
//! The pass walks the tree depth-first through an explicit stack of [`WorkUnit`]s, so it can stop after any unit and
//! pick up again on the next flush. It never writes to the committed [`WorkTree`]: everything it decides is staged on
//! the side and either handed to the commit pipeline as a whole or dropped.

use crate::{
	config::EngineConfig,
	diff::{ChildWork, Mutation, Reconciler},
	element::ElementDescriptor,
	error::{DuplicateKeyConflict, RenderError},
	lanes::{Lane, PendingUpdate},
	scheduler::RootId,
	work_tree::{Draft, NodeId, NodeKind, NodeStatus, StagedNodes, WorkNode, WorkTree},
};
use hashbrown::HashMap;
use tracing::{error, info, trace, trace_span, warn};

#[derive(Debug, Clone)]
struct ChildUnit {
	node: NodeId,
	element: ElementDescriptor,
	work: ChildWork,
}

/// A node plus a resumption cursor into its reconciled children.
#[derive(Debug)]
struct WorkUnit {
	node: NodeId,
	/// [`None`] for the root, whose single child comes from the update itself.
	element: Option<ElementDescriptor>,
	work: ChildWork,
	/// Frame that catches render errors raised by this node.
	boundary: Option<usize>,
	/// Frame that catches render errors raised by this node's descendants.
	child_boundary: Option<usize>,
	/// Set after a descendant failed under this error boundary.
	fallback: Option<RenderError>,
	depth: usize,
	/// [`None`] until the node's own child list has been reconciled.
	children: Option<Vec<ChildUnit>>,
	cursor: usize,
}
impl WorkUnit {
	fn new(node: NodeId, element: Option<ElementDescriptor>, work: ChildWork, boundary: Option<usize>, depth: usize) -> Self {
		Self {
			node,
			element,
			work,
			boundary,
			child_boundary: boundary,
			fallback: None,
			depth,
			children: None,
			cursor: 0,
		}
	}
}

/// Everything an error boundary needs to throw away its subtree's work.
#[derive(Debug)]
struct BoundaryFrame {
	node: NodeId,
	stack_index: usize,
	mutations: usize,
	conflicts: usize,
	staged: usize,
	children: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
	/// Reconciled one node's children. Counts against the slice budget.
	Worked,
	/// Moved the cursor.
	Advanced,
	Done,
}

pub(crate) struct FinishedPass {
	pub root: RootId,
	pub lane: Lane,
	pub mutations: Vec<Mutation>,
	pub conflicts: Vec<DuplicateKeyConflict>,
	pub staged: HashMap<NodeId, WorkNode>,
	pub staged_order: Vec<NodeId>,
	pub next_id: u64,
}

pub(crate) struct Pass {
	pub root: RootId,
	pub lane: Lane,
	pub update: PendingUpdate,
	stack: Vec<WorkUnit>,
	staged: StagedNodes,
	mutations: Vec<Mutation>,
	conflicts: Vec<DuplicateKeyConflict>,
	boundaries: Vec<BoundaryFrame>,
}
impl Pass {
	pub fn new(root: RootId, lane: Lane, update: PendingUpdate, tree: &WorkTree) -> Self {
		Self {
			root,
			lane,
			update,
			stack: vec![WorkUnit::new(NodeId::ROOT, None, ChildWork::Reconcile, None, 0)],
			staged: StagedNodes::new(tree),
			mutations: Vec::new(),
			conflicts: Vec::new(),
			boundaries: Vec::new(),
		}
	}

	/// The node whose unit is on top of the stack.
	pub fn current_node(&self) -> Option<NodeId> {
		self.stack.last().map(|unit| unit.node)
	}

	pub fn mutation_count(&self) -> usize {
		self.mutations.len()
	}

	/// Performs the next step of the depth-first walk.
	///
	/// # Errors
	///
	/// With a render error no boundary caught. The pass is unusable afterwards.
	pub fn step(&mut self, tree: &WorkTree, reconciler: &mut Reconciler, config: &EngineConfig) -> Result<Step, RenderError> {
		let unit = match self.stack.last_mut() {
			Some(unit) => unit,
			None => return Ok(Step::Done),
		};

		let next_child = match &unit.children {
			None => {
				self.begin_work(tree, reconciler, config)?;
				return Ok(Step::Worked);
			}
			Some(children) => children.get(unit.cursor).cloned(),
		};

		match next_child {
			Some(ChildUnit { node, element, work }) => {
				unit.cursor += 1;
				let (boundary, depth) = (unit.child_boundary, unit.depth + 1);
				self.stack.push(WorkUnit::new(node, Some(element), work, boundary, depth));
			}
			None => self.complete_unit(tree),
		}
		Ok(Step::Advanced)
	}

	fn complete_unit(&mut self, tree: &WorkTree) {
		let unit = match self.stack.pop() {
			Some(unit) => unit,
			None => return,
		};
		trace!("Completed {}.", unit.node);
		let mut draft = Draft { base: tree, staged: &mut self.staged };
		if let Some(node) = draft.stage(unit.node) {
			node.status = NodeStatus::Complete;
		}
		if self.boundaries.last().map_or(false, |frame| frame.stack_index == self.stack.len()) {
			self.boundaries.pop();
		}
	}

	/// Renders the node on top of the stack (if it's a component) and reconciles its children.
	fn begin_work(&mut self, tree: &WorkTree, reconciler: &mut Reconciler, config: &EngineConfig) -> Result<(), RenderError> {
		let index = self.stack.len() - 1;
		let unit = &mut self.stack[index];
		let (id, work, depth) = (unit.node, unit.work, unit.depth);
		let span = trace_span!("Unit of work", node = %id, ?work, depth);
		let _enter = span.enter();

		let draft = Draft { base: tree, staged: &mut self.staged };
		let node = match draft.get(id) {
			Some(node) => node,
			None => {
				error!("{} is missing from the work tree. Skipping it.", id);
				unit.children = Some(Vec::new());
				return Ok(());
			}
		};

		if depth > config.depth_limit {
			error!("Depth limit reached at {} ({}).", id, node.kind);
			unit.children = Some(Vec::new());
			return Ok(());
		}

		let kind = node.kind.clone();
		let props = node.pending_props.clone();
		let element_children = node.element_children.clone();
		let unchanged = node.last_props == node.pending_props && tree.get(id).map_or(false, |committed| committed.element_children == element_children);

		let descriptors: Vec<ElementDescriptor> = match &kind {
			NodeKind::Root => self.update.element.iter().cloned().collect(),
			NodeKind::Host(_) => unit.element.as_ref().map(|element| element.children.to_vec()).unwrap_or_default(),
			NodeKind::Text => Vec::new(),
			NodeKind::Component(component) => match unit.fallback.as_ref() {
				Some(error) => component.fallback(error, &props).unwrap_or_default(),
				None if work == ChildWork::Reconcile && component.is_pure() && unchanged => {
					trace!("{} is pure and unchanged. Skipping its subtree.", component.name());
					unit.children = Some(Vec::new());
					return Ok(());
				}
				None => match component.render(&props, &element_children) {
					Ok(descriptors) => descriptors,
					Err(error) => {
						let error = error.located(component.name(), id);
						return self.throw(tree, error, index);
					}
				},
			},
		};

		let unit = &mut self.stack[index];
		let catches = matches!(&kind, NodeKind::Component(component) if component.is_error_boundary()) && unit.fallback.is_none();
		let boundary = unit.boundary;
		let child_boundary = if catches {
			let children = Draft { base: tree, staged: &mut self.staged }.get(id).map(|node| node.children.clone()).unwrap_or_default();
			self.boundaries.push(BoundaryFrame {
				node: id,
				stack_index: index,
				mutations: self.mutations.len(),
				conflicts: self.conflicts.len(),
				staged: self.staged.checkpoint(),
				children,
			});
			Some(self.boundaries.len() - 1)
		} else {
			boundary
		};

		let mut draft = Draft { base: tree, staged: &mut self.staged };
		let children = match reconciler.reconcile_children(&mut draft, id, &descriptors, self.lane, work == ChildWork::Reconcile) {
			Ok(diff) => {
				self.mutations.extend(diff.mutations);
				diff.children
					.into_iter()
					.zip(diff.work)
					.zip(descriptors)
					.map(|((node, work), element)| ChildUnit { node, element, work })
					.collect()
			}
			Err(conflict) => {
				if cfg!(feature = "log-paths") {
					error!("{} Path: {:?}. Keeping the previous children.", conflict, tree.path(id));
				} else {
					error!("{} Keeping the previous children.", conflict);
				}
				self.conflicts.push(conflict);
				Vec::new()
			}
		};

		let unit = &mut self.stack[index];
		unit.children = Some(children);
		unit.child_boundary = child_boundary;
		unit.cursor = 0;
		Ok(())
	}

	/// Hands `error`, raised by the unit at `index`, to the nearest enclosing error boundary.
	fn throw(&mut self, tree: &WorkTree, error: RenderError, index: usize) -> Result<(), RenderError> {
		let frame_index = match self.stack[index].boundary {
			Some(frame_index) if frame_index < self.boundaries.len() => frame_index,
			Some(_) => {
				warn!("Error boundary frame went missing. Treating the error as uncaught.");
				return Err(error);
			}
			None => return Err(error),
		};

		self.boundaries.truncate(frame_index + 1);
		let frame = match self.boundaries.pop() {
			Some(frame) => frame,
			None => return Err(error),
		};
		info!(boundary = %frame.node, %error, "Error boundary caught a render error.");

		self.mutations.truncate(frame.mutations);
		self.conflicts.truncate(frame.conflicts);
		self.staged.rewind(frame.staged);
		if let Some(node) = (Draft { base: tree, staged: &mut self.staged }).stage(frame.node) {
			node.children = frame.children;
		}
		self.stack.truncate(frame.stack_index + 1);

		let unit = &mut self.stack[frame.stack_index];
		unit.children = None;
		unit.cursor = 0;
		unit.child_boundary = unit.boundary;
		unit.fallback = Some(error);
		Ok(())
	}

	pub fn finish(self) -> FinishedPass {
		debug_assert!(self.stack.is_empty(), "Finished a pass with work left on the stack");
		let (staged, staged_order, next_id) = self.staged.into_parts();
		FinishedPass {
			root: self.root,
			lane: self.lane,
			mutations: self.mutations,
			conflicts: self.conflicts,
			staged,
			staged_order,
			next_id,
		}
	}

	/// Staging area capacity, for logging.
	pub fn staged_capacity(&self) -> usize {
		self.staged.capacity()
	}

	pub fn staged_len(&self) -> usize {
		self.staged.len()
	}
}
