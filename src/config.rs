use core::time::Duration;
use std::time::Instant;

/// How much work a single [`Scheduler::flush`](`crate::Scheduler::flush`) may do before yielding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceBudget {
	/// Finish the pass in one go.
	Unbounded,
	/// Yield after this many units of work. `0` behaves like `1`.
	Units(usize),
	/// Yield once this much time has passed since the `now` handed to `flush`, as measured by the scheduler's [`Clock`].
	Time(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
	pub slice: SliceBudget,
	/// Subtrees nested deeper than this aren't descended into. Hitting the limit is logged as an error.
	pub depth_limit: usize,
}
impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			slice: SliceBudget::Time(Duration::from_millis(5)),
			depth_limit: 1024,
		}
	}
}
impl EngineConfig {
	#[must_use]
	pub fn with_slice(mut self, slice: SliceBudget) -> Self {
		self.slice = slice;
		self
	}

	#[must_use]
	pub fn with_depth_limit(mut self, depth_limit: usize) -> Self {
		self.depth_limit = depth_limit;
		self
	}
}

/// Time source for [`SliceBudget::Time`].
pub trait Clock {
	fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// One flush's remaining budget.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slice {
	budget: SliceBudget,
	started: Instant,
	units: usize,
}
impl Slice {
	pub fn start(budget: SliceBudget, now: Instant) -> Self {
		Self { budget, started: now, units: 0 }
	}

	/// Counts one unit of work and reports whether the slice is used up.
	pub fn spend(&mut self, clock: &dyn Clock) -> bool {
		self.units += 1;
		match self.budget {
			SliceBudget::Unbounded => false,
			SliceBudget::Units(limit) => self.units >= limit.max(1),
			SliceBudget::Time(duration) => clock.now().saturating_duration_since(self.started) >= duration,
		}
	}

	pub fn units(&self) -> usize {
		self.units
	}
}
