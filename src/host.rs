//! The boundary to the concrete renderer. Only the commit pipeline calls into it.

use crate::{
	element::{Props, PropsDelta},
	error::HostError,
};
use core::fmt::{self, Display, Formatter};

/// Opaque host instance handle, minted by [`HostAdapter::create`] (or by the caller, for root containers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostNodeType<'a> {
	Element(&'a str),
	Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOperation {
	Create,
	Update,
	Insert,
	Move,
	Remove,
}
impl Display for HostOperation {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			HostOperation::Create => "create",
			HostOperation::Update => "update",
			HostOperation::Insert => "insert",
			HostOperation::Move => "move",
			HostOperation::Remove => "remove",
		})
	}
}

/// A renderer the engine can drive.
///
/// Calls arrive strictly in the order the commit pipeline decides and must be applied in that order.
/// `before` anchors are always children of `parent` that are currently attached.
pub trait HostAdapter {
	/// # Errors
	///
	/// The created subtree is marked unmounted and the error is reported with the commit.
	fn create(&mut self, node_type: HostNodeType<'_>, props: &Props) -> Result<HostHandle, HostError>;

	/// # Errors
	///
	/// See [`HostAdapter::create`].
	fn update(&mut self, handle: HostHandle, delta: &PropsDelta) -> Result<(), HostError>;

	/// Attaches a detached `child`. [`None`] as `before` appends.
	///
	/// # Errors
	///
	/// See [`HostAdapter::create`].
	fn insert(&mut self, parent: HostHandle, child: HostHandle, before: Option<HostHandle>) -> Result<(), HostError>;

	/// Repositions an attached `child` within `parent`. [`None`] as `before` moves it to the end.
	///
	/// # Errors
	///
	/// See [`HostAdapter::create`].
	fn move_child(&mut self, parent: HostHandle, child: HostHandle, before: Option<HostHandle>) -> Result<(), HostError>;

	/// Detaches and discards `handle` along with its host descendants.
	///
	/// # Errors
	///
	/// See [`HostAdapter::create`].
	fn remove(&mut self, handle: HostHandle) -> Result<(), HostError>;
}

impl<H: HostAdapter + ?Sized> HostAdapter for &mut H {
	fn create(&mut self, node_type: HostNodeType<'_>, props: &Props) -> Result<HostHandle, HostError> {
		(**self).create(node_type, props)
	}

	fn update(&mut self, handle: HostHandle, delta: &PropsDelta) -> Result<(), HostError> {
		(**self).update(handle, delta)
	}

	fn insert(&mut self, parent: HostHandle, child: HostHandle, before: Option<HostHandle>) -> Result<(), HostError> {
		(**self).insert(parent, child, before)
	}

	fn move_child(&mut self, parent: HostHandle, child: HostHandle, before: Option<HostHandle>) -> Result<(), HostError> {
		(**self).move_child(parent, child, before)
	}

	fn remove(&mut self, handle: HostHandle) -> Result<(), HostError> {
		(**self).remove(handle)
	}
}
