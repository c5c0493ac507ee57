use crate::{element::Key, host::HostOperation, scheduler::RootId, work_tree::NodeId, CommitReport};
use std::borrow::Cow;
use thiserror::Error;

/// Raised by a component's render function.
///
/// The engine fills in [`component`](`RenderError::component`) and [`node`](`RenderError::node`) before propagating it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("component `{component}` failed to render: {message}")]
pub struct RenderError {
	pub component: Cow<'static, str>,
	pub node: Option<NodeId>,
	pub message: Cow<'static, str>,
}
impl RenderError {
	pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
		Self {
			component: Cow::Borrowed("?"),
			node: None,
			message: message.into(),
		}
	}

	#[must_use]
	pub(crate) fn located(mut self, component: &str, node: NodeId) -> Self {
		self.component = Cow::Owned(component.to_owned());
		self.node = Some(node);
		self
	}
}

/// Three or more siblings share a key, which the last-wins rule can't disambiguate.
///
/// The children of [`parent`](`DuplicateKeyConflict::parent`) keep their previously committed state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{occurrences} children of {parent} share the key {key}")]
pub struct DuplicateKeyConflict {
	pub parent: NodeId,
	pub key: Key,
	pub occurrences: usize,
}

/// Opaque failure reported by a [`HostAdapter`](`crate::HostAdapter`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HostError(pub Cow<'static, str>);
impl HostError {
	pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
		Self(message.into())
	}
}

/// A host call failed during commit. The subtree of [`node`](`HostAdapterError::node`) was marked unmounted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host {operation} failed for {node}: {source}")]
pub struct HostAdapterError {
	pub node: NodeId,
	pub operation: HostOperation,
	#[source]
	pub source: HostError,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
	#[error("unknown root {0}")]
	UnknownRoot(RootId),
	/// No error boundary caught the error. The pass was abandoned and the root keeps its previous output.
	#[error("uncaught render error in {root}: {source}")]
	Render {
		root: RootId,
		#[source]
		source: RenderError,
	},
	#[error(transparent)]
	DuplicateKeyConflict(#[from] DuplicateKeyConflict),
	#[error(transparent)]
	HostAdapter(#[from] HostAdapterError),
}

impl CommitReport {
	/// Converts the first problem this commit ran into, if any, into an [`EngineError`].
	///
	/// Host adapter failures take precedence over key conflicts.
	///
	/// # Errors
	///
	/// Iff [`host_errors`](`CommitReport::host_errors`) or [`conflicts`](`CommitReport::conflicts`) is non-empty.
	pub fn check(&self) -> Result<(), EngineError> {
		if let Some(error) = self.host_errors.first() {
			return Err(error.clone().into());
		}
		if let Some(conflict) = self.conflicts.first() {
			return Err(conflict.clone().into());
		}
		Ok(())
	}
}
