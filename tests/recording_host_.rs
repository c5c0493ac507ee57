#![allow(dead_code)]

use lignin_fiber::{Clock, ElementDescriptor, ElementKind, HostAdapter, HostError, HostHandle, HostNodeType, HostOperation, Props, PropsDelta};
use std::{
	cell::Cell,
	collections::BTreeMap,
	fmt::Write as _,
	rc::Rc,
	sync::Once,
	time::{Duration, Instant},
};

static LOG_INITIALIZED: Once = Once::new();

pub fn init_log() {
	LOG_INITIALIZED.call_once(|| {
		//TODO: Fail on Warning or Error.
		let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).with_test_writer().try_init();
	})
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
	Create(HostHandle, String),
	Update(HostHandle, Vec<String>),
	Insert { parent: HostHandle, child: HostHandle, before: Option<HostHandle> },
	Move { parent: HostHandle, child: HostHandle, before: Option<HostHandle> },
	Remove(HostHandle),
}

#[derive(Debug, Clone)]
pub struct HostNode {
	/// `"#text"` for text nodes.
	pub tag: String,
	pub props: Props,
	pub children: Vec<HostHandle>,
	pub parent: Option<HostHandle>,
}

/// In-memory host tree that logs every call and checks the call contract.
#[derive(Debug)]
pub struct RecordingHost {
	pub nodes: BTreeMap<HostHandle, HostNode>,
	pub ops: Vec<Op>,
	next: u64,
	/// Fails this operation whenever it targets a node with this tag.
	pub failing: Option<(HostOperation, &'static str)>,
}
impl Default for RecordingHost {
	fn default() -> Self {
		Self::new()
	}
}
impl RecordingHost {
	pub const CONTAINER: HostHandle = HostHandle(0);

	pub fn new() -> Self {
		let mut nodes = BTreeMap::new();
		nodes.insert(
			Self::CONTAINER,
			HostNode {
				tag: "#container".to_owned(),
				props: Props::new(),
				children: Vec::new(),
				parent: None,
			},
		);
		Self {
			nodes,
			ops: Vec::new(),
			next: 1,
			failing: None,
		}
	}

	/// Creates another detached container, for additional roots.
	pub fn container(&mut self) -> HostHandle {
		let handle = HostHandle(self.next);
		self.next += 1;
		self.nodes.insert(
			handle,
			HostNode {
				tag: "#container".to_owned(),
				props: Props::new(),
				children: Vec::new(),
				parent: None,
			},
		);
		handle
	}

	fn fails(&self, operation: HostOperation, tag: &str) -> Result<(), HostError> {
		match self.failing {
			Some((failing, failing_tag)) if failing == operation && failing_tag == tag => Err(HostError::new(format!("injected {} failure on <{}>", operation, tag))),
			_ => Ok(()),
		}
	}

	fn node(&self, handle: HostHandle) -> Result<&HostNode, HostError> {
		self.nodes.get(&handle).ok_or_else(|| HostError::new(format!("unknown handle {:?}", handle)))
	}

	fn attach(&mut self, parent: HostHandle, child: HostHandle, before: Option<HostHandle>) -> Result<(), HostError> {
		let index = match before {
			Some(before) => self
				.node(parent)?
				.children
				.iter()
				.position(|&sibling| sibling == before)
				.ok_or_else(|| HostError::new(format!("{:?} is not a child of {:?}", before, parent)))?,
			None => self.node(parent)?.children.len(),
		};
		self.nodes.get_mut(&parent).ok_or_else(|| HostError::new("vanished parent"))?.children.insert(index, child);
		self.nodes.get_mut(&child).ok_or_else(|| HostError::new("vanished child"))?.parent = Some(parent);
		Ok(())
	}

	fn detach(&mut self, child: HostHandle) -> Result<(), HostError> {
		if let Some(parent) = self.node(child)?.parent {
			self.nodes.get_mut(&parent).ok_or_else(|| HostError::new("vanished parent"))?.children.retain(|&sibling| sibling != child);
			self.nodes.get_mut(&child).ok_or_else(|| HostError::new("vanished child"))?.parent = None;
		}
		Ok(())
	}

	/// Serialises the children of `handle` as markup.
	pub fn render(&self, handle: HostHandle) -> String {
		let mut markup = String::new();
		for &child in &self.nodes[&handle].children {
			self.render_node(child, &mut markup);
		}
		markup
	}

	/// Serialises the children of the default container.
	pub fn markup(&self) -> String {
		self.render(Self::CONTAINER)
	}

	fn render_node(&self, handle: HostHandle, markup: &mut String) {
		let node = &self.nodes[&handle];
		if node.tag == "#text" {
			markup.push_str(node.props.text().unwrap_or_default());
			return;
		}
		write!(markup, "<{}>", node.tag).unwrap();
		for &child in &node.children {
			self.render_node(child, markup);
		}
		write!(markup, "</{}>", node.tag).unwrap();
	}

	pub fn count(&self, predicate: impl Fn(&Op) -> bool) -> usize {
		self.ops.iter().filter(|op| predicate(op)).count()
	}

	pub fn take_ops(&mut self) -> Vec<Op> {
		std::mem::take(&mut self.ops)
	}
}

impl HostAdapter for RecordingHost {
	fn create(&mut self, node_type: HostNodeType<'_>, props: &Props) -> Result<HostHandle, HostError> {
		let tag = match node_type {
			HostNodeType::Element(tag) => tag.to_owned(),
			HostNodeType::Text => "#text".to_owned(),
		};
		self.fails(HostOperation::Create, &tag)?;
		let handle = HostHandle(self.next);
		self.next += 1;
		self.ops.push(Op::Create(handle, tag.clone()));
		self.nodes.insert(
			handle,
			HostNode {
				tag,
				props: props.clone(),
				children: Vec::new(),
				parent: None,
			},
		);
		Ok(handle)
	}

	fn update(&mut self, handle: HostHandle, delta: &PropsDelta) -> Result<(), HostError> {
		self.fails(HostOperation::Update, &self.node(handle)?.tag.clone())?;
		self.ops.push(Op::Update(handle, delta.names().map(ToOwned::to_owned).collect()));
		self.nodes.get_mut(&handle).ok_or_else(|| HostError::new("vanished node"))?.props.apply(delta);
		Ok(())
	}

	fn insert(&mut self, parent: HostHandle, child: HostHandle, before: Option<HostHandle>) -> Result<(), HostError> {
		self.fails(HostOperation::Insert, &self.node(child)?.tag.clone())?;
		if self.node(child)?.parent.is_some() {
			return Err(HostError::new(format!("{:?} is already attached", child)));
		}
		self.attach(parent, child, before)?;
		self.ops.push(Op::Insert { parent, child, before });
		Ok(())
	}

	fn move_child(&mut self, parent: HostHandle, child: HostHandle, before: Option<HostHandle>) -> Result<(), HostError> {
		self.fails(HostOperation::Move, &self.node(child)?.tag.clone())?;
		if self.node(child)?.parent != Some(parent) {
			return Err(HostError::new(format!("{:?} is not a child of {:?}", child, parent)));
		}
		if before == Some(child) {
			return Err(HostError::new("moved a node before itself"));
		}
		self.detach(child)?;
		self.attach(parent, child, before)?;
		self.ops.push(Op::Move { parent, child, before });
		Ok(())
	}

	fn remove(&mut self, handle: HostHandle) -> Result<(), HostError> {
		self.fails(HostOperation::Remove, &self.node(handle)?.tag.clone())?;
		self.detach(handle)?;
		let mut stack = vec![handle];
		while let Some(handle) = stack.pop() {
			if let Some(node) = self.nodes.remove(&handle) {
				stack.extend(node.children);
			}
		}
		self.ops.push(Op::Remove(handle));
		Ok(())
	}
}

/// Markup a host tree rendered from `descriptors` should serialise to. Components aren't supported.
pub fn markup_of(descriptors: &[ElementDescriptor]) -> String {
	let mut markup = String::new();
	for descriptor in descriptors {
		match &descriptor.kind {
			ElementKind::Text => markup.push_str(descriptor.props.text().unwrap_or_default()),
			ElementKind::Host(tag) => {
				write!(markup, "<{}>{}</{}>", tag, markup_of(&descriptor.children), tag).unwrap();
			}
			ElementKind::Component(component) => panic!("Can't serialise component {}", component.name()),
		}
	}
	markup
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock(Rc<Cell<Instant>>);
impl Default for ManualClock {
	fn default() -> Self {
		Self(Rc::new(Cell::new(Instant::now())))
	}
}
impl ManualClock {
	pub fn advance(&self, duration: Duration) {
		self.0.set(self.0.get() + duration)
	}
}
impl Clock for ManualClock {
	fn now(&self) -> Instant {
		self.0.get()
	}
}
