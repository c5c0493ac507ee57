#![doc(html_root_url = "https://docs.rs/lignin-fiber/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! A host-agnostic incremental reconciler.
//!
//! Applications describe what to render as [`ElementDescriptor`] trees and hand them to a [`Scheduler`] per root and
//! [`Lane`]. The scheduler diffs them against each root's [`WorkTree`] in small, interruptible units of work and
//! commits the resulting [`Mutation`]s to a [`HostAdapter`] in one synchronous step.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

mod commit;
mod config;
mod diagnostics;
mod diff;
mod element;
mod error;
mod host;
mod lanes;
mod pass;
mod rc_hash_map;
mod scheduler;
mod temp_set;
mod work_tree;

pub use commit::{CommitReport, MutationCounts};
pub use config::{Clock, EngineConfig, SliceBudget, SystemClock};
pub use diagnostics::Diagnostics;
pub use diff::Mutation;
pub use element::{Component, ComponentBuilder, ElementDescriptor, ElementKind, FallbackFn, Key, Lifecycle, PropValue, Props, PropsDelta, RenderFn};
pub use error::{DuplicateKeyConflict, EngineError, HostAdapterError, HostError, RenderError};
pub use host::{HostAdapter, HostHandle, HostNodeType, HostOperation};
pub use lanes::{Lane, UpdateStatus};
pub use scheduler::{FlushOutcome, RootId, Scheduler};
pub use work_tree::{EffectPhase, EffectRecord, NodeId, NodeKind, NodeStatus, WorkNode, WorkTree};
