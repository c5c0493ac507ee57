//! The cooperative scheduler: roots, lane queues and the one active pass.

use crate::{
	commit::{commit, CommitReport, MutationCounts},
	config::{Clock, EngineConfig, Slice, SystemClock},
	diagnostics::Diagnostics,
	diff::Reconciler,
	element::ElementDescriptor,
	error::EngineError,
	host::{HostAdapter, HostHandle},
	lanes::{Enqueued, Lane, LaneQueues, PendingUpdate, UpdateStatus},
	pass::{Pass, Step},
	work_tree::WorkTree,
};
use core::fmt::{self, Display, Formatter};
use hashbrown::HashMap;
use std::time::Instant;
use tracing::{debug, error, info, instrument, level_filters::STATIC_MAX_LEVEL, trace, warn, Level};

/// Identifies one root created by [`Scheduler::create_root`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(u32);
impl Display for RootId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "root {}", self.0)
	}
}

/// What a single [`Scheduler::flush`] call did.
#[derive(Debug, Clone)]
pub enum FlushOutcome {
	/// No update was pending.
	Idle,
	/// The slice budget ran out. The pass resumes on the next flush unless a higher lane preempts it.
	Yielded { root: RootId, lane: Lane, units: usize },
	Committed(CommitReport),
}

/// Drives reconciliation passes for any number of roots against one host adapter.
///
/// Everything runs on the calling thread: work only happens inside [`flush`](`Scheduler::flush`) and
/// [`unmount_root`](`Scheduler::unmount_root`), and the host adapter is only touched while committing.
pub struct Scheduler<H: HostAdapter> {
	host: H,
	config: EngineConfig,
	clock: Box<dyn Clock>,
	roots: HashMap<RootId, WorkTree>,
	next_root: u32,
	lanes: LaneQueues,
	active: Option<Pass>,
	reconciler: Reconciler,
	last_commit: MutationCounts,
}
impl<H: HostAdapter> Scheduler<H> {
	pub fn new(host: H, config: EngineConfig) -> Self {
		Self::with_clock(host, config, SystemClock)
	}

	pub fn with_clock(host: H, config: EngineConfig, clock: impl 'static + Clock) -> Self {
		Self {
			host,
			config,
			clock: Box::new(clock),
			roots: HashMap::new(),
			next_root: 0,
			lanes: LaneQueues::default(),
			active: None,
			reconciler: Reconciler::new(),
			last_commit: MutationCounts::default(),
		}
	}

	/// Registers a host container as a new, empty root.
	#[instrument(skip(self))]
	pub fn create_root(&mut self, container: HostHandle) -> RootId {
		let root = RootId(self.next_root);
		self.next_root += 1;
		self.roots.insert(root, WorkTree::new(container));
		info!("Created {}.", root);
		root
	}

	/// Queues `element` as `root`'s new content. [`None`] clears the root.
	///
	/// A pending update for the same root and lane is overwritten in place.
	/// If `lane` is strictly higher than the active pass's lane, that pass is abandoned and its update re-queued.
	///
	/// # Errors
	///
	/// Iff `root` is unknown.
	#[instrument(skip(self, element))]
	pub fn schedule_update(&mut self, root: RootId, element: Option<ElementDescriptor>, lane: Lane) -> Result<(), EngineError> {
		if !self.roots.contains_key(&root) {
			return Err(EngineError::UnknownRoot(root));
		}

		match self.lanes.push(root, lane, element) {
			Enqueued::Queued => trace!(status = ?UpdateStatus::Queued, "Queued update."),
			Enqueued::Coalesced => debug!("Coalesced with the pending {} update of {}.", lane, root),
		}

		if self.active.as_ref().map_or(false, |pass| lane > pass.lane) {
			self.interrupt();
		}
		Ok(())
	}

	fn interrupt(&mut self) {
		if let Some(pass) = self.active.take() {
			info!(
				status = ?UpdateStatus::Interrupted,
				"Abandoning the {} pass of {} with {} staged node(s) and {} record(s).",
				pass.lane,
				pass.root,
				pass.staged_len(),
				pass.mutation_count()
			);
			self.lanes.requeue(pass.root, pass.lane, pass.update);
		}
	}

	fn start_pass(&mut self) -> Option<Pass> {
		while let Some((root, lane, update)) = self.lanes.pop_highest() {
			match self.roots.get(&root) {
				Some(tree) => {
					info!(status = ?UpdateStatus::Active, revision = update.revision, "Starting a {} pass of {}.", lane, root);
					return Some(Pass::new(root, lane, update, tree));
				}
				None => warn!("Dropping a {} update of unknown {}.", lane, root),
			}
		}
		None
	}

	/// Works on the highest-priority pending update until it commits or the slice budget starting at `now` runs out.
	///
	/// Commits at most one pass.
	///
	/// # Errors
	///
	/// With [`EngineError::Render`] if a render error escaped every error boundary.
	/// That update is dropped and its root keeps its previous output.
	#[instrument(skip(self, now))]
	pub fn flush(&mut self, now: Instant) -> Result<FlushOutcome, EngineError> {
		let mut pass = match self.active.take().or_else(|| self.start_pass()) {
			Some(pass) => pass,
			None => return Ok(FlushOutcome::Idle),
		};
		let mut slice = Slice::start(self.config.slice, now);

		let tree = match self.roots.get(&pass.root) {
			Some(tree) => tree,
			None => {
				warn!("Dropping a pass of unknown {}.", pass.root);
				return Ok(FlushOutcome::Idle);
			}
		};

		loop {
			match pass.step(tree, &mut self.reconciler, &self.config) {
				Ok(Step::Done) => break,
				Ok(Step::Advanced) => (),
				Ok(Step::Worked) => {
					if slice.spend(&*self.clock) {
						let (root, lane, units) = (pass.root, pass.lane, slice.units());
						debug!("Yielding the {} pass of {} after {} unit(s).", lane, root, units);
						self.active = Some(pass);
						return Ok(FlushOutcome::Yielded { root, lane, units });
					}
				}
				Err(source) => {
					error!("Uncaught render error: {}. Abandoning the {} pass of {}.", source, pass.lane, pass.root);
					return Err(EngineError::Render { root: pass.root, source });
				}
			}
		}

		trace!(status = ?UpdateStatus::Complete, units = slice.units());
		Ok(FlushOutcome::Committed(self.commit(pass)?))
	}

	fn commit(&mut self, pass: Pass) -> Result<CommitReport, EngineError> {
		let root = pass.root;
		trace!(status = ?UpdateStatus::Committing, staged = pass.staged_len());
		let staged_capacity = pass.staged_capacity();
		let finished = pass.finish();

		let tree = self.roots.get_mut(&root).ok_or(EngineError::UnknownRoot(root))?;
		let report = commit(tree, &mut self.host, finished);
		trace!(status = ?UpdateStatus::Committed);
		self.last_commit = report.counts;

		let (key_census, seen_keys) = self.reconciler.capacities();
		info!("Work tree size of {}: {}", root, tree.len());
		info!("Diff heap capacity (staged nodes/key census/seen keys): {}/{}/{}", staged_capacity, key_census, seen_keys);
		if STATIC_MAX_LEVEL >= Level::WARN && key_census >= 1000 {
			warn!(
				"The key census capacity is large ({}).\n\
				This may point to very long keyed child lists.",
				key_census
			)
		}
		Ok(report)
	}

	/// Flushes with the scheduler's clock until nothing is pending and returns the reports of all commits in order.
	///
	/// # Errors
	///
	/// Like [`Scheduler::flush`]. Commits that happened before the error aren't reported.
	pub fn run_until_idle(&mut self) -> Result<Vec<CommitReport>, EngineError> {
		let mut reports = Vec::new();
		loop {
			let now = self.clock.now();
			match self.flush(now)? {
				FlushOutcome::Idle => return Ok(reports),
				FlushOutcome::Yielded { .. } => (),
				FlushOutcome::Committed(report) => reports.push(report),
			}
		}
	}

	/// Synchronously clears `root`, commits that and forgets the root.
	///
	/// Pending updates and an active pass of `root` are dropped.
	///
	/// # Errors
	///
	/// Iff `root` is unknown.
	#[instrument(skip(self))]
	pub fn unmount_root(&mut self, root: RootId) -> Result<CommitReport, EngineError> {
		let tree = self.roots.get(&root).ok_or(EngineError::UnknownRoot(root))?;
		self.lanes.remove_root(root);
		if self.active.as_ref().map_or(false, |pass| pass.root == root) {
			debug!("Dropping the active pass of {}.", root);
			self.active = None;
		}

		let mut pass = Pass::new(root, Lane::Immediate, PendingUpdate { element: None, revision: 0 }, tree);
		loop {
			match pass.step(tree, &mut self.reconciler, &self.config) {
				Ok(Step::Done) => break,
				Ok(Step::Worked | Step::Advanced) => (),
				Err(source) => return Err(EngineError::Render { root, source }),
			}
		}
		let report = self.commit(pass)?;
		self.roots.remove(&root);
		info!("Unmounted {}.", root);
		Ok(report)
	}

	/// Where `root`'s update in `lane` is, if there is one.
	#[must_use]
	pub fn status(&self, root: RootId, lane: Lane) -> Option<UpdateStatus> {
		if self.active.as_ref().map_or(false, |pass| pass.root == root && pass.lane == lane) {
			Some(UpdateStatus::Active)
		} else if self.lanes.contains(root, lane) {
			Some(UpdateStatus::Queued)
		} else {
			None
		}
	}

	#[must_use]
	pub fn diagnostics(&self) -> Diagnostics {
		Diagnostics {
			queue_depths: Lane::ALL.map(|lane| (lane, self.lanes.depth(lane))),
			active: self.active.as_ref().map(|pass| (pass.root, pass.lane)),
			current_node: self.active.as_ref().and_then(Pass::current_node),
			last_commit: self.last_commit,
		}
	}

	/// `root`'s committed work tree.
	#[must_use]
	pub fn tree(&self, root: RootId) -> Option<&WorkTree> {
		self.roots.get(&root)
	}

	#[must_use]
	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	pub fn host(&self) -> &H {
		&self.host
	}

	/// Mutable access to the host adapter, for example to inject failures.
	///
	/// Changing the host's state behind the engine's back desynchronises it from the work trees.
	pub fn host_mut(&mut self) -> &mut H {
		&mut self.host
	}

	pub fn into_host(self) -> H {
		self.host
	}
}
