//! Priority lanes and their per-lane FIFO queues of root updates.

use crate::{element::ElementDescriptor, scheduler::RootId};
use core::fmt::{self, Display, Formatter};
use hashbrown::{hash_map::Entry, HashMap};
use std::collections::VecDeque;
use tracing::trace;

/// Priority class of an update. Ordered `Immediate > Default > Deferred`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lane {
	Deferred,
	Default,
	Immediate,
}
impl Lane {
	/// Highest priority first.
	pub const ALL: [Lane; 3] = [Lane::Immediate, Lane::Default, Lane::Deferred];

	fn index(self) -> usize {
		match self {
			Lane::Immediate => 0,
			Lane::Default => 1,
			Lane::Deferred => 2,
		}
	}
}
impl Display for Lane {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Lane::Immediate => "immediate",
			Lane::Default => "default",
			Lane::Deferred => "deferred",
		})
	}
}

/// Where a root's update for a given lane currently is.
///
/// `Complete`, `Committing` and `Committed` only exist within a single [`Scheduler::flush`](`crate::Scheduler::flush`) call
/// and are visible through logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
	Queued,
	Active,
	Interrupted,
	Complete,
	Committing,
	Committed,
}

#[derive(Debug, Clone)]
pub(crate) struct PendingUpdate {
	/// [`None`] clears the root.
	pub element: Option<ElementDescriptor>,
	/// Bumped on every coalesced write, for logs.
	pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueued {
	Queued,
	/// Replaced the descriptor of an update that was already queued in this lane.
	Coalesced,
}

#[derive(Debug, Default)]
pub(crate) struct LaneQueues {
	queues: [VecDeque<RootId>; 3],
	pending: HashMap<(RootId, Lane), PendingUpdate>,
}
impl LaneQueues {
	pub fn push(&mut self, root: RootId, lane: Lane, element: Option<ElementDescriptor>) -> Enqueued {
		match self.pending.entry((root, lane)) {
			Entry::Occupied(occupied) => {
				let update = occupied.into_mut();
				update.element = element;
				update.revision += 1;
				trace!(%root, %lane, revision = update.revision, "Coalesced update.");
				Enqueued::Coalesced
			}
			Entry::Vacant(vacant) => {
				vacant.insert(PendingUpdate { element, revision: 0 });
				self.queues[lane.index()].push_back(root);
				Enqueued::Queued
			}
		}
	}

	/// Puts an interrupted update back at the front of its lane.
	///
	/// If a newer update for the same root arrived in the meantime, that one wins and `update` is dropped.
	pub fn requeue(&mut self, root: RootId, lane: Lane, update: PendingUpdate) {
		match self.pending.entry((root, lane)) {
			Entry::Occupied(_) => trace!(%root, %lane, "Interrupted update superseded by a newer one."),
			Entry::Vacant(vacant) => {
				vacant.insert(update);
				self.queues[lane.index()].push_front(root);
			}
		}
	}

	pub fn pop_highest(&mut self) -> Option<(RootId, Lane, PendingUpdate)> {
		for lane in Lane::ALL {
			while let Some(root) = self.queues[lane.index()].pop_front() {
				if let Some(update) = self.pending.remove(&(root, lane)) {
					return Some((root, lane, update));
				}
			}
		}
		None
	}

	pub fn depth(&self, lane: Lane) -> usize {
		self.queues[lane.index()].len()
	}

	pub fn contains(&self, root: RootId, lane: Lane) -> bool {
		self.pending.contains_key(&(root, lane))
	}

	pub fn remove_root(&mut self, root: RootId) {
		for queue in &mut self.queues {
			queue.retain(|&queued| queued != root);
		}
		self.pending.retain(|&(pending_root, _), _| pending_root != root);
	}
}
