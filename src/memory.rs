//! An in-process [`LiveTree`] that records every mutation applied to it.
//!
//! Useful for native hosts, snapshotting and tests.

use crate::{
	live::LiveTree,
	node::{Event, EventHandler},
};
use std::{cell::RefCell, rc::Rc};
use tracing::{error, trace};

/// Handle to a node in a [`MemoryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A single recorded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
	CreateElement { node: NodeId, tag: String },
	CreateText { node: NodeId, text: String },
	Append { parent: NodeId, child: NodeId },
	Replace { parent: NodeId, new_child: NodeId, old_child: NodeId },
	Remove { parent: NodeId, child: NodeId },
	SetAttribute { element: NodeId, name: String, value: String },
	RemoveAttribute { element: NodeId, name: String },
	AddListener { element: NodeId, event: String },
	RemoveListener { element: NodeId, event: String },
	SetValue { element: NodeId, value: String },
}

#[derive(Debug)]
enum Data {
	Element {
		tag: String,
		attributes: Vec<(String, String)>,
		value: Option<String>,
		listeners: Vec<(String, EventHandler)>,
	},
	Text(String),
}

#[derive(Debug)]
struct Slot {
	data: Data,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct Arena {
	slots: Vec<Slot>,
	mutations: Vec<Mutation>,
}

impl Arena {
	fn push(&mut self, data: Data) -> NodeId {
		let id = NodeId(self.slots.len());
		self.slots.push(Slot {
			data,
			parent: None,
			children: Vec::new(),
		});
		id
	}

	fn detach(&mut self, child: NodeId) {
		if let Some(parent) = self.slots[child.0].parent.take() {
			self.slots[parent.0].children.retain(|&c| c != child);
		}
	}

	fn position(&self, parent: NodeId, child: NodeId) -> Option<usize> {
		self.slots[parent.0].children.iter().position(|&c| c == child)
	}

	fn element_mut(&mut self, node: NodeId) -> Option<(&mut Vec<(String, String)>, &mut Option<String>, &mut Vec<(String, EventHandler)>)> {
		match &mut self.slots[node.0].data {
			Data::Element { attributes, value, listeners, .. } => Some((attributes, value, listeners)),
			Data::Text(_) => None,
		}
	}
}

/// A shared handle to an arena-backed tree. Clones refer to the same tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree(Rc<RefCell<Arena>>);

impl MemoryTree {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a detached root element with the given `id` attribute, without recording anything.
	#[must_use]
	pub fn create_root(&self, tag: &str, id: &str) -> NodeId {
		self.0.borrow_mut().push(Data::Element {
			tag: tag.to_owned(),
			attributes: vec![("id".to_owned(), id.to_owned())],
			value: None,
			listeners: Vec::new(),
		})
	}

	#[must_use]
	pub fn mutations(&self) -> Vec<Mutation> {
		self.0.borrow().mutations.clone()
	}

	/// Returns and clears the mutation log.
	pub fn take_mutations(&self) -> Vec<Mutation> {
		core::mem::take(&mut self.0.borrow_mut().mutations)
	}

	#[must_use]
	pub fn children(&self, node: NodeId) -> Vec<NodeId> {
		self.0.borrow().slots[node.0].children.clone()
	}

	#[must_use]
	pub fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.0.borrow().slots[node.0].parent
	}

	#[must_use]
	pub fn tag(&self, node: NodeId) -> Option<String> {
		match &self.0.borrow().slots[node.0].data {
			Data::Element { tag, .. } => Some(tag.clone()),
			Data::Text(_) => None,
		}
	}

	#[must_use]
	pub fn text(&self, node: NodeId) -> Option<String> {
		match &self.0.borrow().slots[node.0].data {
			Data::Element { .. } => None,
			Data::Text(text) => Some(text.clone()),
		}
	}

	#[must_use]
	pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
		match &self.0.borrow().slots[node.0].data {
			Data::Element { attributes, .. } => attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone()),
			Data::Text(_) => None,
		}
	}

	/// The current (property) value of an element, falling back to its `value` attribute.
	#[must_use]
	pub fn value(&self, node: NodeId) -> Option<String> {
		match &self.0.borrow().slots[node.0].data {
			Data::Element { attributes, value, .. } => value.clone().or_else(|| attributes.iter().find(|(n, _)| n == "value").map(|(_, v)| v.clone())),
			Data::Text(_) => None,
		}
	}

	#[must_use]
	pub fn listeners(&self, node: NodeId, event: &str) -> Vec<EventHandler> {
		match &self.0.borrow().slots[node.0].data {
			Data::Element { listeners, .. } => listeners.iter().filter(|(e, _)| e == event).map(|(_, h)| h.clone()).collect(),
			Data::Text(_) => Vec::new(),
		}
	}

	/// Invokes the listeners for `event.name` on `node`. Input-like dispatch should set [`Event::value`].
	///
	/// The tree is not borrowed while handlers run, so they may freely inspect it.
	pub fn dispatch(&self, node: NodeId, event: &Event) {
		if let (Some(value), Some((_, slot, _))) = (&event.value, self.0.borrow_mut().element_mut(node)) {
			*slot = Some(value.clone());
		}
		for handler in self.listeners(node, &event.name) {
			handler.call(event)
		}
	}

	/// Depth-first search by element id.
	#[must_use]
	pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
		self.find(|arena, node| matches!(&arena.slots[node.0].data, Data::Element { attributes, .. } if attributes.iter().any(|(n, v)| n == "id" && v == id)))
	}

	/// Serializes `node` and its descendants as markup. Values set through [`LiveTree::set_value`] are not included.
	#[must_use]
	pub fn to_html(&self, node: NodeId) -> String {
		let mut html = String::new();
		self.write_html(&mut html, node);
		html
	}

	fn write_html(&self, out: &mut String, node: NodeId) {
		let (tag, children) = {
			let arena = self.0.borrow();
			let slot = &arena.slots[node.0];
			match &slot.data {
				Data::Text(text) => return out.push_str(&escape(text)),
				Data::Element { tag, attributes, .. } => {
					out.push('<');
					out.push_str(tag);
					for (name, value) in attributes {
						out.push_str(&format!(" {}=\"{}\"", name, escape(value)));
					}
					out.push('>');
					(tag.clone(), slot.children.clone())
				}
			}
		};
		for child in children {
			self.write_html(out, child);
		}
		out.push_str(&format!("</{}>", tag));
	}

	fn find(&self, predicate: impl Fn(&Arena, NodeId) -> bool) -> Option<NodeId> {
		let arena = self.0.borrow();
		let mut stack = (0..arena.slots.len()).map(NodeId).filter(|&node| arena.slots[node.0].parent.is_none()).collect::<Vec<_>>();
		stack.reverse();
		while let Some(node) = stack.pop() {
			if predicate(&arena, node) {
				return Some(node);
			}
			stack.extend(arena.slots[node.0].children.iter().rev().copied());
		}
		None
	}
}

fn escape(text: &str) -> String {
	text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

impl LiveTree for MemoryTree {
	type Node = NodeId;

	fn create_element(&self, tag: &str) -> NodeId {
		let mut arena = self.0.borrow_mut();
		let node = arena.push(Data::Element {
			tag: tag.to_owned(),
			attributes: Vec::new(),
			value: None,
			listeners: Vec::new(),
		});
		arena.mutations.push(Mutation::CreateElement { node, tag: tag.to_owned() });
		node
	}

	fn create_text_node(&self, text: &str) -> NodeId {
		let mut arena = self.0.borrow_mut();
		let node = arena.push(Data::Text(text.to_owned()));
		arena.mutations.push(Mutation::CreateText { node, text: text.to_owned() });
		node
	}

	fn child_node(&self, parent: &NodeId, index: usize) -> Option<NodeId> {
		self.0.borrow().slots[parent.0].children.get(index).copied()
	}

	fn append_child(&self, &parent: &NodeId, &child: &NodeId) {
		let mut arena = self.0.borrow_mut();
		arena.detach(child);
		arena.slots[parent.0].children.push(child);
		arena.slots[child.0].parent = Some(parent);
		arena.mutations.push(Mutation::Append { parent, child });
	}

	fn replace_child(&self, &parent: &NodeId, &new_child: &NodeId, &old_child: &NodeId) {
		let mut arena = self.0.borrow_mut();
		arena.detach(new_child);
		let index = match arena.position(parent, old_child) {
			Some(index) => index,
			None => return error!("{:?} is not a child of {:?}. Not replacing.", old_child, parent),
		};
		arena.slots[parent.0].children[index] = new_child;
		arena.slots[old_child.0].parent = None;
		arena.slots[new_child.0].parent = Some(parent);
		arena.mutations.push(Mutation::Replace { parent, new_child, old_child });
	}

	fn remove_child(&self, &parent: &NodeId, &child: &NodeId) {
		let mut arena = self.0.borrow_mut();
		if arena.position(parent, child).is_none() {
			return error!("{:?} is not a child of {:?}. Not removing.", child, parent);
		}
		arena.detach(child);
		arena.mutations.push(Mutation::Remove { parent, child });
	}

	fn set_attribute(&self, &element: &NodeId, name: &str, value: &str) {
		let mut arena = self.0.borrow_mut();
		match arena.element_mut(element) {
			Some((attributes, _, _)) => match attributes.iter_mut().find(|(n, _)| n == name) {
				Some((_, v)) => *v = value.to_owned(),
				None => attributes.push((name.to_owned(), value.to_owned())),
			},
			None => return error!("Can't set attribute {:?} on text node {:?}.", name, element),
		}
		arena.mutations.push(Mutation::SetAttribute {
			element,
			name: name.to_owned(),
			value: value.to_owned(),
		});
	}

	fn remove_attribute(&self, &element: &NodeId, name: &str) {
		let mut arena = self.0.borrow_mut();
		match arena.element_mut(element) {
			Some((attributes, _, _)) => attributes.retain(|(n, _)| n != name),
			None => return error!("Can't remove attribute {:?} from text node {:?}.", name, element),
		}
		arena.mutations.push(Mutation::RemoveAttribute { element, name: name.to_owned() });
	}

	fn add_event_listener(&self, &element: &NodeId, event: &str, handler: &EventHandler) {
		let mut arena = self.0.borrow_mut();
		match arena.element_mut(element) {
			Some((_, _, listeners)) => {
				// Same as the DOM: identical registrations are ignored.
				if listeners.iter().any(|(e, h)| e == event && h.ptr_eq(handler)) {
					return trace!("Ignoring duplicate listener for {:?}.", event);
				}
				listeners.push((event.to_owned(), handler.clone()))
			}
			None => return error!("Can't add listener {:?} to text node {:?}.", event, element),
		}
		arena.mutations.push(Mutation::AddListener { element, event: event.to_owned() });
	}

	fn remove_event_listener(&self, &element: &NodeId, event: &str, handler: &EventHandler) {
		let mut arena = self.0.borrow_mut();
		match arena.element_mut(element) {
			Some((_, _, listeners)) => listeners.retain(|(e, h)| !(e == event && h.ptr_eq(handler))),
			None => return error!("Can't remove listener {:?} from text node {:?}.", event, element),
		}
		arena.mutations.push(Mutation::RemoveListener { element, event: event.to_owned() });
	}

	fn set_value(&self, &element: &NodeId, value: &str) {
		let mut arena = self.0.borrow_mut();
		match arena.element_mut(element) {
			Some((_, slot, _)) => *slot = Some(value.to_owned()),
			None => return error!("Can't set value of text node {:?}.", element),
		}
		arena.mutations.push(Mutation::SetValue { element, value: value.to_owned() });
	}

	fn query_selector(&self, selector: &str) -> Option<NodeId> {
		let selector = selector.trim();
		if let Some(id) = selector.strip_prefix('#') {
			return self.get_element_by_id(id);
		}
		if let Some(class) = selector.strip_prefix('.') {
			return self.find(|arena, node| {
				matches!(&arena.slots[node.0].data, Data::Element { attributes, .. }
					if attributes.iter().any(|(n, v)| n == "class" && v.split_whitespace().any(|c| c == class)))
			});
		}
		self.find(|arena, node| matches!(&arena.slots[node.0].data, Data::Element { tag, .. } if tag.eq_ignore_ascii_case(selector)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn structure() {
		let tree = MemoryTree::new();
		let root = tree.create_root("div", "app");
		let p = tree.create_element("p");
		let text = tree.create_text_node("a < b");
		tree.append_child(&p, &text);
		tree.append_child(&root, &p);
		tree.set_attribute(&p, "class", "x");
		assert_eq!(tree.to_html(root), "<div id=\"app\"><p class=\"x\">a &lt; b</p></div>");

		let span = tree.create_element("span");
		tree.replace_child(&root, &span, &p);
		assert_eq!(tree.children(root), vec![span]);
		assert_eq!(tree.parent(p), None);

		tree.remove_child(&root, &span);
		assert!(tree.children(root).is_empty());
	}

	#[test]
	fn selectors() {
		let tree = MemoryTree::new();
		let root = tree.create_root("main", "app");
		let section = tree.create_element("section");
		tree.set_attribute(&section, "class", "a b");
		tree.append_child(&root, &section);
		assert_eq!(tree.query_selector("#app"), Some(root));
		assert_eq!(tree.query_selector(".b"), Some(section));
		assert_eq!(tree.query_selector("SECTION"), Some(section));
		assert_eq!(tree.query_selector("#missing"), None);
	}

	#[test]
	fn dispatch_updates_value_then_calls_listeners() {
		let tree = MemoryTree::new();
		let input = tree.create_element("input");
		let seen = Rc::new(RefCell::new(Vec::new()));
		let handler = EventHandler::new({
			let seen = Rc::clone(&seen);
			let tree = tree.clone();
			move |event: &Event| seen.borrow_mut().push((event.value.clone(), tree.value(input)))
		});
		tree.add_event_listener(&input, "input", &handler);
		tree.add_event_listener(&input, "input", &handler);
		tree.dispatch(input, &Event::new("input").with_value("abc"));
		assert_eq!(*seen.borrow(), vec![(Some("abc".to_owned()), Some("abc".to_owned()))]);

		tree.remove_event_listener(&input, "input", &handler);
		tree.dispatch(input, &Event::new("input"));
		assert_eq!(seen.borrow().len(), 1);
	}
}
