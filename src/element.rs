//! Element descriptors: the immutable "what should be rendered" values applications hand to the [`Scheduler`](`crate::Scheduler`).
//!
//! Descriptors are cheap to clone. Children are shared behind an [`Rc`] and component definitions are compared by identity,
//! so equality checks stay shallow where it matters.

use crate::{error::RenderError, work_tree::NodeId};
use core::{
	any::Any,
	fmt::{self, Debug, Display, Formatter},
};
use std::{borrow::Cow, collections::BTreeMap, rc::Rc, sync::Arc};

/// Stable sibling identity. Only used for matching, never for ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
	Str(Arc<str>),
	Num(i64),
}
impl Display for Key {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Key::Str(str) => write!(f, "{:?}", str),
			Key::Num(num) => write!(f, "#{}", num),
		}
	}
}
impl From<&str> for Key {
	fn from(str: &str) -> Self {
		Self::Str(str.into())
	}
}
impl From<String> for Key {
	fn from(string: String) -> Self {
		Self::Str(string.into())
	}
}
impl From<i64> for Key {
	fn from(num: i64) -> Self {
		Self::Num(num)
	}
}
impl From<usize> for Key {
	#[allow(clippy::cast_possible_wrap)]
	fn from(num: usize) -> Self {
		Self::Num(num as i64)
	}
}

/// A single, semantically opaque property value.
///
/// Comparison is shallow: [`PropValue::Opaque`] values are equal only if they are the same allocation.
#[derive(Clone)]
pub enum PropValue {
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(Arc<str>),
	Opaque(Rc<dyn Any>),
}
impl PartialEq for PropValue {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(PropValue::Bool(a), PropValue::Bool(b)) => a == b,
			(PropValue::Int(a), PropValue::Int(b)) => a == b,
			#[allow(clippy::float_cmp)]
			(PropValue::Float(a), PropValue::Float(b)) => a == b,
			(PropValue::Str(a), PropValue::Str(b)) => a == b,
			(PropValue::Opaque(a), PropValue::Opaque(b)) => Rc::ptr_eq(a, b),
			_ => false,
		}
	}
}
impl Debug for PropValue {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			PropValue::Bool(bool) => Debug::fmt(bool, f),
			PropValue::Int(int) => Debug::fmt(int, f),
			PropValue::Float(float) => Debug::fmt(float, f),
			PropValue::Str(str) => Debug::fmt(str, f),
			PropValue::Opaque(opaque) => write!(f, "Opaque({:p})", Rc::as_ptr(opaque)),
		}
	}
}
impl From<bool> for PropValue {
	fn from(bool: bool) -> Self {
		Self::Bool(bool)
	}
}
impl From<i64> for PropValue {
	fn from(int: i64) -> Self {
		Self::Int(int)
	}
}
impl From<i32> for PropValue {
	fn from(int: i32) -> Self {
		Self::Int(int.into())
	}
}
impl From<f64> for PropValue {
	fn from(float: f64) -> Self {
		Self::Float(float)
	}
}
impl From<&str> for PropValue {
	fn from(str: &str) -> Self {
		Self::Str(str.into())
	}
}
impl From<String> for PropValue {
	fn from(string: String) -> Self {
		Self::Str(string.into())
	}
}
impl From<Arc<str>> for PropValue {
	fn from(str: Arc<str>) -> Self {
		Self::Str(str)
	}
}

/// The property bag of a descriptor or work node, ordered by name so deltas come out deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props(BTreeMap<Arc<str>, PropValue>);
impl Props {
	/// Name of the prop that carries the content of text elements.
	pub const TEXT: &'static str = "text";

	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, name: impl Into<Arc<str>>, value: impl Into<PropValue>) -> Self {
		self.insert(name, value);
		self
	}

	pub fn insert(&mut self, name: impl Into<Arc<str>>, value: impl Into<PropValue>) -> Option<PropValue> {
		self.0.insert(name.into(), value.into())
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&PropValue> {
		self.0.get(name)
	}

	/// The text content, if this is the prop bag of a text element.
	#[must_use]
	pub fn text(&self) -> Option<&str> {
		match self.get(Self::TEXT) {
			Some(PropValue::Str(text)) => Some(text),
			_ => None,
		}
	}

	pub fn iter(&self) -> impl '_ + Iterator<Item = (&Arc<str>, &PropValue)> {
		self.0.iter()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Shallow per-field comparison against `next`.
	///
	/// The result lists every prop that is new or whose value changed, then every prop that went away.
	#[must_use]
	pub fn diff(&self, next: &Props) -> PropsDelta {
		let mut delta = PropsDelta::default();
		for (name, value) in &next.0 {
			if self.0.get(name) != Some(value) {
				delta.set.push((name.clone(), value.clone()));
			}
		}
		for name in self.0.keys() {
			if !next.0.contains_key(name) {
				delta.removed.push(name.clone());
			}
		}
		delta
	}

	/// Applies a delta produced by [`Props::diff`].
	pub fn apply(&mut self, delta: &PropsDelta) {
		for name in &delta.removed {
			self.0.remove(name);
		}
		for (name, value) in &delta.set {
			self.0.insert(name.clone(), value.clone());
		}
	}
}
impl<N: Into<Arc<str>>, V: Into<PropValue>> FromIterator<(N, V)> for Props {
	fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
		Self(iter.into_iter().map(|(name, value)| (name.into(), value.into())).collect())
	}
}

/// Changed props of a reused node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropsDelta {
	pub set: Vec<(Arc<str>, PropValue)>,
	pub removed: Vec<Arc<str>>,
}
impl PropsDelta {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.set.is_empty() && self.removed.is_empty()
	}

	/// Prop names touched by this delta, for logging without values.
	pub fn names(&self) -> impl '_ + Iterator<Item = &str> {
		self.set.iter().map(|(name, _)| &**name).chain(self.removed.iter().map(|name| &**name))
	}
}

/// Callbacks run by the commit pipeline for nodes rendered by a [`Component`].
///
/// All methods default to doing nothing.
pub trait Lifecycle {
	fn mounted(&self, _node: NodeId, _props: &Props) {}
	fn updated(&self, _node: NodeId, _props: &Props) {}
	fn unmounting(&self, _node: NodeId, _props: &Props) {}
}

pub type RenderFn = dyn Fn(&Props, &[ElementDescriptor]) -> Result<Vec<ElementDescriptor>, RenderError>;
pub type FallbackFn = dyn Fn(&RenderError, &Props) -> Vec<ElementDescriptor>;

struct Definition {
	name: Cow<'static, str>,
	render: Box<RenderFn>,
	fallback: Option<Box<FallbackFn>>,
	pure: bool,
	lifecycle: Option<Box<dyn Lifecycle>>,
}

/// A render definition. Two components are the same type only if they are clones of the same [`Component`].
#[derive(Clone)]
pub struct Component(Rc<Definition>);
impl Component {
	pub fn new(name: impl Into<Cow<'static, str>>, render: impl 'static + Fn(&Props, &[ElementDescriptor]) -> Result<Vec<ElementDescriptor>, RenderError>) -> Self {
		Self::builder(name, render).build()
	}

	pub fn builder(name: impl Into<Cow<'static, str>>, render: impl 'static + Fn(&Props, &[ElementDescriptor]) -> Result<Vec<ElementDescriptor>, RenderError>) -> ComponentBuilder {
		ComponentBuilder(Definition {
			name: name.into(),
			render: Box::new(render),
			fallback: None,
			pure: false,
			lifecycle: None,
		})
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.0.name
	}

	#[must_use]
	pub fn is_error_boundary(&self) -> bool {
		self.0.fallback.is_some()
	}

	#[must_use]
	pub fn is_pure(&self) -> bool {
		self.0.pure
	}

	pub(crate) fn render(&self, props: &Props, children: &[ElementDescriptor]) -> Result<Vec<ElementDescriptor>, RenderError> {
		(self.0.render)(props, children)
	}

	/// [`None`] iff this isn't an error boundary.
	pub(crate) fn fallback(&self, error: &RenderError, props: &Props) -> Option<Vec<ElementDescriptor>> {
		self.0.fallback.as_ref().map(|fallback| fallback(error, props))
	}

	pub(crate) fn lifecycle(&self) -> Option<&dyn Lifecycle> {
		self.0.lifecycle.as_deref()
	}
}
impl PartialEq for Component {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for Component {}
impl Debug for Component {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Component").field(&self.0.name).finish()
	}
}

#[must_use]
pub struct ComponentBuilder(Definition);
impl ComponentBuilder {
	/// Makes the component catch render errors of its descendants and render `fallback` in their place.
	pub fn error_boundary(mut self, fallback: impl 'static + Fn(&RenderError, &Props) -> Vec<ElementDescriptor>) -> Self {
		self.0.fallback = Some(Box::new(fallback));
		self
	}

	/// Skip rendering while props and children are unchanged.
	pub fn pure(mut self) -> Self {
		self.0.pure = true;
		self
	}

	pub fn lifecycle(mut self, lifecycle: impl 'static + Lifecycle) -> Self {
		self.0.lifecycle = Some(Box::new(lifecycle));
		self
	}

	pub fn build(self) -> Component {
		Component(Rc::new(self.0))
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
	/// A host primitive, like `"div"`.
	Host(Arc<str>),
	Component(Component),
	/// Text content, stored in the [`Props::TEXT`] prop.
	Text,
}
impl Display for ElementKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			ElementKind::Host(tag) => write!(f, "<{}>", tag),
			ElementKind::Component(component) => write!(f, "{}", component.name()),
			ElementKind::Text => f.write_str("#text"),
		}
	}
}

/// Immutable description of one element and its children.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDescriptor {
	pub kind: ElementKind,
	pub props: Props,
	pub key: Option<Key>,
	pub children: Rc<[ElementDescriptor]>,
}
impl ElementDescriptor {
	#[must_use]
	pub fn new(kind: ElementKind) -> Self {
		Self {
			kind,
			props: Props::new(),
			key: None,
			children: Rc::new([]),
		}
	}

	#[must_use]
	pub fn host(tag: impl Into<Arc<str>>) -> Self {
		Self::new(ElementKind::Host(tag.into()))
	}

	#[must_use]
	pub fn text(text: impl Into<Arc<str>>) -> Self {
		let mut this = Self::new(ElementKind::Text);
		this.props.insert(Props::TEXT, PropValue::Str(text.into()));
		this
	}

	#[must_use]
	pub fn component(component: &Component) -> Self {
		Self::new(ElementKind::Component(component.clone()))
	}

	#[must_use]
	pub fn key(mut self, key: impl Into<Key>) -> Self {
		self.key = Some(key.into());
		self
	}

	#[must_use]
	pub fn prop(mut self, name: impl Into<Arc<str>>, value: impl Into<PropValue>) -> Self {
		self.props.insert(name, value);
		self
	}

	#[must_use]
	pub fn props(mut self, props: Props) -> Self {
		self.props = props;
		self
	}

	#[must_use]
	pub fn child(self, child: ElementDescriptor) -> Self {
		self.children(Some(child))
	}

	/// Appends `children` after any existing ones.
	#[must_use]
	pub fn children(mut self, children: impl IntoIterator<Item = ElementDescriptor>) -> Self {
		let mut all = self.children.to_vec();
		all.extend(children);
		self.children = all.into();
		self
	}
}
