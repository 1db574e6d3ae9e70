use crate::{
	diff::{diff, Change},
	live::LiveTree,
	node::{event_name, AttributeValue, Attributes, Element, EventHandler, VNode},
};
use core::cell::{Cell, RefCell};
use tracing::{error, instrument, trace, trace_span, warn};

/// How children are matched up between two versions of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Strategy {
	/// Children are matched by index only. [`Element::key`] is ignored.
	Positional,
}

impl Default for Strategy {
	fn default() -> Self {
		Strategy::Positional
	}
}

/// What happens to event listeners of elements that survive a patch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerPolicy {
	/// Listeners are registered when an element is materialized and then left alone.
	///
	/// Handlers that capture per-render data (like a list index) go stale when the element is only updated.
	Stable,
	/// On every element that is updated rather than replaced, the previous tree's listeners are removed
	/// and the new tree's listeners are registered, unless both are the same [`EventHandler`](`crate::node::EventHandler`).
	///
	/// Use this from the first render on, since it assumes the live listeners are the previous tree's.
	Rebind,
}

impl Default for HandlerPolicy {
	fn default() -> Self {
		HandlerPolicy::Stable
	}
}

/// The default [`Options::depth_limit`].
pub const DEFAULT_DEPTH_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
	pub handler_policy: HandlerPolicy,
	pub strategy: Strategy,
	/// How many element levels one pass descends into. Deeper children are skipped with an error.
	pub depth_limit: usize,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			handler_policy: HandlerPolicy::default(),
			strategy: Strategy::default(),
			depth_limit: DEFAULT_DEPTH_LIMIT,
		}
	}
}

/// Applies [`diff`] verdicts to a [`LiveTree`].
///
/// # Correct Use
///
/// The live children under each `parent` passed in must be exactly those materialized from the `old` side,
/// in order. The patcher never inspects live content to verify this. Positions that don't exist panic with
/// debug assertions and are logged and skipped otherwise.
///
/// Both materialization and patching recurse once per element level. Children below
/// [`Options::depth_limit`] levels are not created or reconciled, which leaves the live tree incomplete there.
#[derive(Debug)]
pub struct Patcher<L: LiveTree> {
	tree: L,
	options: Options,
	depth: Cell<usize>,
	path: RefCell<Vec<usize>>,
}

impl<L: LiveTree> Patcher<L> {
	#[must_use]
	pub fn new(tree: L) -> Self {
		Self::with_options(tree, Options::default())
	}

	#[must_use]
	pub fn with_options(tree: L, options: Options) -> Self {
		Self {
			tree,
			options,
			depth: Cell::new(0),
			path: RefCell::new(Vec::new()),
		}
	}

	pub fn tree(&self) -> &L {
		&self.tree
	}

	#[must_use]
	pub fn options(&self) -> Options {
		self.options
	}

	/// Creates a detached live subtree for `vnode`, including attributes and event listeners.
	pub fn materialize(&self, vnode: &VNode) -> L::Node {
		match vnode {
			VNode::Element(element) => {
				let span = trace_span!("Creating element", tag = %element.tag, attributes = element.attributes.len(), children = element.children.len());
				let _enter = span.enter();

				let live = self.tree.create_element(&element.tag);
				self.set_attributes(&live, &element.attributes);
				self.descend(|| {
					for child in &element.children {
						let child = self.materialize(child);
						self.tree.append_child(&live, &child);
					}
				});
				live
			}
			VNode::Text(_) | VNode::Number(_) => {
				let text = vnode.text().unwrap_or_default();
				if cfg!(feature = "dangerous-logging") {
					trace!("Creating text node {:?}", text);
				} else {
					trace!("Creating text node ({} bytes)", text.len());
				}
				self.tree.create_text_node(&text)
			}
		}
	}

	/// Materializes `vnode` and appends it to `parent`.
	#[instrument(skip(self, parent, vnode))]
	pub fn mount(&self, parent: &L::Node, vnode: &VNode) {
		let live = self.materialize(vnode);
		self.tree.append_child(parent, &live);
	}

	/// Reconciles the `index`th child of `parent` from `old` to `new`.
	///
	/// - Only `new`: materialized and appended.
	/// - Only `old`: the live child is removed.
	/// - Both: dispatched on [`diff`]. See [`Change`] for what each verdict does.
	#[instrument(skip(self, parent, old, new))]
	pub fn update(&self, parent: &L::Node, old: Option<&VNode>, new: Option<&VNode>, index: usize) {
		let (old, new) = match (old, new) {
			(None, None) => return trace!("Nothing on either side."),
			(None, Some(new)) => return self.mount(parent, new),
			(Some(old), None) => {
				let span = trace_span!("Removing", index, kind = ?old.kind());
				let _enter = span.enter();
				if let Some(target) = self.expect_child(parent, index, "remove") {
					self.tree.remove_child(parent, &target);
				}
				return;
			}
			(Some(old), Some(new)) => (old, new),
		};

		let target = match self.expect_child(parent, index, "update") {
			Some(target) => target,
			None => return,
		};

		let change = diff(old, new);
		match (change, old, new) {
			(Change::TypeChanged, ..) | (Change::TextChanged, ..) | (Change::TagChanged, ..) => {
				let span = trace_span!("Replacing", index, ?change);
				let _enter = span.enter();
				let replacement = self.materialize(new);
				self.tree.replace_child(parent, &replacement, &target);
			}

			(Change::ValueChanged, VNode::Element(old), VNode::Element(new)) => {
				let span = trace_span!("Updating value", index, tag = %new.tag);
				let _enter = span.enter();
				let value = new.attributes.get(crate::node::VALUE).and_then(AttributeValue::as_text).unwrap_or_default();
				self.tree.set_value(&target, value);
				self.rebind(&target, &old.attributes, &new.attributes);
			}

			(Change::AttributesChanged, VNode::Element(old), VNode::Element(new)) => {
				let span = trace_span!("Updating attributes", index, tag = %new.tag);
				let _enter = span.enter();
				self.update_attributes(&target, &old.attributes, &new.attributes);
				self.rebind(&target, &old.attributes, &new.attributes);
				self.update_children(&target, old, new);
			}

			(Change::NoChangeFurtherRecursion, VNode::Element(old), VNode::Element(new)) => {
				let span = trace_span!("Recursing", index, tag = %new.tag);
				let _enter = span.enter();
				self.rebind(&target, &old.attributes, &new.attributes);
				self.update_children(&target, old, new);
			}

			(Change::Unchanged, ..) => trace!("Unchanged primitive."),

			(change, ..) => {
				// `diff` only reports element verdicts for element pairs.
				error!("Inconsistent classification {:?}. Ignoring.", change);
			}
		}
	}

	fn update_children(&self, target: &L::Node, old: &Element, new: &Element) {
		self.descend(|| match self.options.strategy {
			Strategy::Positional => {
				let common = old.children.len().min(new.children.len());
				for (index, (old, new)) in old.children.iter().zip(&new.children).enumerate() {
					self.enter(index);
					self.update(target, Some(old), Some(new), index);
					self.leave();
				}
				for new in &new.children[common..] {
					self.update(target, None, Some(new), common);
				}
				// Highest first, so the remaining indices stay valid.
				for (index, old) in old.children.iter().enumerate().skip(common).rev() {
					self.enter(index);
					self.update(target, Some(old), None, index);
					self.leave();
				}
			}
		});
	}

	/// Runs `f` one element level deeper, unless that would exceed [`Options::depth_limit`].
	fn descend(&self, f: impl FnOnce()) {
		let depth = self.depth.get();
		if depth >= self.options.depth_limit {
			return error!("Depth limit of {} reached{}. Skipping children.", self.options.depth_limit, self.describe_path());
		}
		self.depth.set(depth + 1);
		f();
		self.depth.set(depth);
	}

	fn set_attributes(&self, element: &L::Node, attributes: &Attributes) {
		for (name, value) in attributes.iter() {
			match (event_name(name), value) {
				(Some(event), AttributeValue::Handler(handler)) => self.tree.add_event_listener(element, event, handler),
				(None, AttributeValue::Text(text)) => self.tree.set_attribute(element, name, text),
				(Some(_), AttributeValue::Text(_)) => warn!("Attribute {:?} follows the event binding convention but has a text value. Skipping.", name),
				(None, AttributeValue::Handler(_)) => warn!("Attribute {:?} has a handler value but isn't an event binding. Skipping.", name),
			}
		}
	}

	/// Removes every old non-event attribute, then sets every new one.
	fn update_attributes(&self, element: &L::Node, old: &Attributes, new: &Attributes) {
		for (name, _) in old.iter().filter(|(name, _)| event_name(name).is_none()) {
			self.tree.remove_attribute(element, name);
		}
		for (name, value) in new.iter().filter(|(name, _)| event_name(name).is_none()) {
			match value {
				AttributeValue::Text(text) => self.tree.set_attribute(element, name, text),
				AttributeValue::Handler(_) => warn!("Attribute {:?} has a handler value but isn't an event binding. Skipping.", name),
			}
		}
	}

	fn rebind(&self, element: &L::Node, old: &Attributes, new: &Attributes) {
		if self.options.handler_policy != HandlerPolicy::Rebind {
			return;
		}

		let new_handlers = handlers(new).collect::<Vec<_>>();
		for (event, handler) in handlers(old) {
			if !new_handlers.iter().any(|&(e, h)| e == event && h.ptr_eq(handler)) {
				self.tree.remove_event_listener(element, event, handler);
			}
		}
		for &(event, handler) in &new_handlers {
			if !handlers(old).any(|(e, h)| e == event && h.ptr_eq(handler)) {
				self.tree.add_event_listener(element, event, handler);
			}
		}
	}

	fn expect_child(&self, parent: &L::Node, index: usize, operation: &str) -> Option<L::Node> {
		let child = self.tree.child_node(parent, index);
		if child.is_none() {
			if cfg!(debug_assertions) {
				panic!("xylem: Expected to {} live child {} beyond the end of its parent{}", operation, index, self.describe_path());
			} else {
				error!("Expected to {} live child {} beyond the end of its parent{}. Skipping.", operation, index, self.describe_path());
			}
		}
		child
	}

	fn enter(&self, index: usize) {
		if cfg!(feature = "log-paths") {
			self.path.borrow_mut().push(index);
		}
	}

	fn leave(&self) {
		if cfg!(feature = "log-paths") {
			self.path.borrow_mut().pop();
		}
	}

	fn describe_path(&self) -> String {
		if cfg!(feature = "log-paths") {
			format!(" at {:?}", self.path.borrow())
		} else {
			String::new()
		}
	}
}

fn handlers(attributes: &Attributes) -> impl Iterator<Item = (&str, &EventHandler)> + '_ {
	attributes.iter().filter_map(|(name, value)| match (event_name(name), value) {
		(Some(event), AttributeValue::Handler(handler)) => Some((event, handler)),
		_ => None,
	})
}
