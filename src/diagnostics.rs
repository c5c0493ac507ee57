use crate::{commit::MutationCounts, lanes::Lane, scheduler::RootId, work_tree::NodeId};

/// Read-only snapshot of a [`Scheduler`](`crate::Scheduler`)'s state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
	/// Queued updates per lane, highest priority first. The active pass isn't counted.
	pub queue_depths: [(Lane, usize); 3],
	pub active: Option<(RootId, Lane)>,
	/// The node the active pass will process next.
	pub current_node: Option<NodeId>,
	/// Counts of the most recent commit of any root.
	pub last_commit: MutationCounts,
}
impl Diagnostics {
	#[must_use]
	pub fn queue_depth(&self, lane: Lane) -> usize {
		self.queue_depths.iter().find(|(l, _)| *l == lane).map_or(0, |&(_, depth)| depth)
	}
}
