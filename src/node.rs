//! The virtual tree: [`VNode`]s, [`Element`]s and their [`Attributes`].
//!
//! Trees are plain immutable snapshots. They are rebuilt from scratch by each view invocation
//! and only ever compared and read afterwards.

use core::{
	fmt::{self, Debug, Formatter},
	iter::FromIterator,
};
use hashbrown::HashMap;
use std::{borrow::Cow, rc::Rc};

/// Name of the attribute that carries an input-like element's current value.
///
/// It's compared ahead of all other attributes, see [`Change::ValueChanged`](`crate::diff::Change::ValueChanged`).
pub const VALUE: &str = "value";

/// Prefix of attribute keys that bind event handlers, as in `onclick` or `oninput`.
pub const EVENT_PREFIX: &str = "on";

/// Returns the event name bound by an attribute key, if the key follows the event binding convention.
///
/// ```
/// assert_eq!(xylem::node::event_name("onclick"), Some("click"));
/// assert_eq!(xylem::node::event_name("class"), None);
/// ```
#[must_use]
pub fn event_name(key: &str) -> Option<&str> {
	key.strip_prefix(EVENT_PREFIX)
}

/// A node or primitive leaf occupying one position in a virtual tree.
#[derive(Debug, Clone)]
pub enum VNode {
	Element(Element),
	Text(Cow<'static, str>),
	Number(f64),
}

/// The runtime kind of a [`VNode`]. Differing kinds can only be reconciled by replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
	Element,
	Text,
	Number,
}

impl VNode {
	#[must_use]
	pub fn kind(&self) -> Kind {
		match self {
			VNode::Element(_) => Kind::Element,
			VNode::Text(_) => Kind::Text,
			VNode::Number(_) => Kind::Number,
		}
	}

	#[must_use]
	pub fn as_element(&self) -> Option<&Element> {
		match self {
			VNode::Element(element) => Some(element),
			VNode::Text(_) | VNode::Number(_) => None,
		}
	}

	/// The text a primitive leaf renders as, or [`None`] for elements.
	#[must_use]
	pub fn text(&self) -> Option<Cow<'_, str>> {
		match self {
			VNode::Element(_) => None,
			VNode::Text(text) => Some(Cow::Borrowed(text)),
			VNode::Number(number) => Some(Cow::Owned(number_text(*number))),
		}
	}
}

/// Formats like ECMAScript's `Number::toString`: `NaN`, `Infinity`, `0` for `-0`
/// and exponent notation outside of `1e-6 <= |n| < 1e21`.
#[allow(clippy::float_cmp)]
fn number_text(number: f64) -> String {
	if number.is_nan() {
		"NaN".to_owned()
	} else if number.is_infinite() {
		(if number > 0.0 { "Infinity" } else { "-Infinity" }).to_owned()
	} else if number == 0.0 {
		"0".to_owned()
	} else if number.abs() >= 1e21 || number.abs() < 1e-6 {
		let text = format!("{:e}", number);
		match text.find('e') {
			Some(e) if !text[e + 1..].starts_with('-') => format!("{}e+{}", &text[..e], &text[e + 1..]),
			_ => text,
		}
	} else {
		number.to_string()
	}
}

impl From<Element> for VNode {
	fn from(element: Element) -> Self {
		VNode::Element(element)
	}
}

impl From<&'static str> for VNode {
	fn from(text: &'static str) -> Self {
		VNode::Text(Cow::Borrowed(text))
	}
}

impl From<String> for VNode {
	fn from(text: String) -> Self {
		VNode::Text(Cow::Owned(text))
	}
}

impl From<Cow<'static, str>> for VNode {
	fn from(text: Cow<'static, str>) -> Self {
		VNode::Text(text)
	}
}

macro_rules! number_from {
	($($ty:ty),*) => {$(
		impl From<$ty> for VNode {
			fn from(number: $ty) -> Self {
				VNode::Number(number.into())
			}
		}
	)*};
}
number_from!(f64, f32, i32, u32, i16, u16, i8, u8);

impl From<usize> for VNode {
	#[allow(clippy::cast_precision_loss)]
	fn from(number: usize) -> Self {
		VNode::Number(number as f64)
	}
}

/// A structured node: a tag, its attributes and its positional children.
#[derive(Debug, Clone)]
pub struct Element {
	pub tag: Cow<'static, str>,
	pub attributes: Attributes,
	pub children: Vec<VNode>,
	/// Stable identity, reserved for keyed reconciliation strategies.
	///
	/// [`Strategy::Positional`](`crate::patch::Strategy::Positional`) ignores it.
	pub key: Option<Cow<'static, str>>,
}

/// Constructs an [`Element`]. Tags and attribute keys are passed through unchecked.
///
/// ```
/// use xylem::node::{h, Attributes};
///
/// let list = h("ul", Attributes::new().with("class", "tasks"), vec![
/// 	h("li", Attributes::new(), vec!["first".into()]).into(),
/// 	h("li", Attributes::new(), vec![2_u32.into()]).into(),
/// ]);
/// assert_eq!(list.children.len(), 2);
/// ```
#[must_use]
pub fn h(tag: impl Into<Cow<'static, str>>, attributes: Attributes, children: Vec<VNode>) -> Element {
	Element {
		tag: tag.into(),
		attributes,
		children,
		key: None,
	}
}

impl Element {
	#[must_use]
	pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
		h(tag, Attributes::new(), Vec::new())
	}

	#[must_use]
	pub fn attr(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<Cow<'static, str>>) -> Self {
		self.attributes.insert(name, AttributeValue::Text(value.into()));
		self
	}

	/// Binds `handler` to `event` (without the `on` prefix).
	#[must_use]
	pub fn on(mut self, event: &str, handler: impl 'static + Fn(&Event)) -> Self {
		self.attributes.insert(format!("{}{}", EVENT_PREFIX, event), AttributeValue::Handler(EventHandler::new(handler)));
		self
	}

	#[must_use]
	pub fn child(mut self, child: impl Into<VNode>) -> Self {
		self.children.push(child.into());
		self
	}

	#[must_use]
	pub fn children<I>(mut self, children: I) -> Self
	where
		I: IntoIterator,
		I::Item: Into<VNode>,
	{
		self.children.extend(children.into_iter().map(Into::into));
		self
	}

	#[must_use]
	pub fn with_key(mut self, key: impl Into<Cow<'static, str>>) -> Self {
		self.key = Some(key.into());
		self
	}
}

/// An attribute's value: either plain text or an event handler.
#[derive(Clone)]
pub enum AttributeValue {
	Text(Cow<'static, str>),
	Handler(EventHandler),
}

impl AttributeValue {
	#[must_use]
	pub fn as_text(&self) -> Option<&str> {
		match self {
			AttributeValue::Text(text) => Some(text),
			AttributeValue::Handler(_) => None,
		}
	}
}

/// Handlers compare equal to each other regardless of identity.
impl PartialEq for AttributeValue {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(AttributeValue::Text(a), AttributeValue::Text(b)) => a == b,
			(AttributeValue::Handler(_), AttributeValue::Handler(_)) => true,
			_ => false,
		}
	}
}

impl Debug for AttributeValue {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			AttributeValue::Text(text) => {
				if cfg!(feature = "dangerous-logging") {
					Debug::fmt(text, f)
				} else {
					f.write_str("\"…\"")
				}
			}
			AttributeValue::Handler(handler) => Debug::fmt(handler, f),
		}
	}
}

impl From<&'static str> for AttributeValue {
	fn from(text: &'static str) -> Self {
		AttributeValue::Text(Cow::Borrowed(text))
	}
}

impl From<String> for AttributeValue {
	fn from(text: String) -> Self {
		AttributeValue::Text(Cow::Owned(text))
	}
}

impl From<EventHandler> for AttributeValue {
	fn from(handler: EventHandler) -> Self {
		AttributeValue::Handler(handler)
	}
}

/// An element's attributes.
///
/// Insertion order is kept for materialization, but equality is order-independent.
/// Inserting an existing name overwrites its value in place.
///
/// Equality only considers text values. Event handlers are left out as if the attributes were serialized,
/// so adding, removing or swapping a handler alone is not a change.
#[derive(Clone, Default)]
pub struct Attributes(Vec<(Cow<'static, str>, AttributeValue)>);

impl Attributes {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<AttributeValue>) -> Self {
		self.insert(name, value);
		self
	}

	pub fn insert(&mut self, name: impl Into<Cow<'static, str>>, value: impl Into<AttributeValue>) {
		let name = name.into();
		let value = value.into();
		match self.0.iter_mut().find(|(existing, _)| *existing == name) {
			Some((_, slot)) => *slot = value,
			None => self.0.push((name, value)),
		}
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&AttributeValue> {
		self.0.iter().find(|(existing, _)| existing == name).map(|(_, value)| value)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
		self.0.iter().map(|(name, value)| (name.as_ref(), value))
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl PartialEq for Attributes {
	fn eq(&self, other: &Self) -> bool {
		let len = texts(self).count();
		if len != texts(other).count() {
			return false;
		}
		if len <= 8 {
			return texts(self).all(|(name, text)| other.get(name).and_then(AttributeValue::as_text) == Some(text));
		}
		let other = texts(other).collect::<HashMap<_, _>>();
		texts(self).all(|(name, text)| other.get(name) == Some(&text))
	}
}

fn texts(attributes: &Attributes) -> impl Iterator<Item = (&str, &str)> + '_ {
	attributes.iter().filter_map(|(name, value)| value.as_text().map(|text| (name, text)))
}

impl Debug for Attributes {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.iter()).finish()
	}
}

impl<N, V> FromIterator<(N, V)> for Attributes
where
	N: Into<Cow<'static, str>>,
	V: Into<AttributeValue>,
{
	fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
		let mut attributes = Self::new();
		for (name, value) in iter {
			attributes.insert(name, value);
		}
		attributes
	}
}

/// Backend-neutral event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
	/// The event type without `on` prefix, for example `"input"`.
	pub name: String,
	/// The event target's current value, if the target is input-like.
	pub value: Option<String>,
}

impl Event {
	#[must_use]
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), value: None }
	}

	#[must_use]
	pub fn with_value(mut self, value: impl Into<String>) -> Self {
		self.value = Some(value.into());
		self
	}
}

/// A shared event callback. Clones refer to the same closure.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event)>);

impl EventHandler {
	pub fn new(handler: impl 'static + Fn(&Event)) -> Self {
		Self(Rc::new(handler))
	}

	pub fn call(&self, event: &Event) {
		(self.0)(event)
	}

	/// Whether both handles refer to the same closure.
	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	/// Address-based identity, usable as a map key by live tree backends.
	#[must_use]
	pub fn id(&self) -> usize {
		Rc::as_ptr(&self.0) as *const () as usize
	}
}

impl Debug for EventHandler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "EventHandler({:#x})", self.id())
	}
}
