//! The live tree seam.
//!
//! A [`LiveTree`] is the externally rendered structure a [`Patcher`](`crate::patch::Patcher`) keeps in sync with
//! the virtual tree. Implementations follow conventional DOM semantics: nodes are cheap cloneable handles,
//! a node has at most one parent and appending an attached node moves it.
//!
//! This crate ships [`MemoryTree`](`crate::memory::MemoryTree`) and [`DomTree`](`crate::dom::DomTree`).

use crate::node::EventHandler;

pub trait LiveTree {
	/// A handle to an element or text node.
	type Node: Clone;

	fn create_element(&self, tag: &str) -> Self::Node;
	fn create_text_node(&self, text: &str) -> Self::Node;

	/// The `index`th child of `parent`, if any.
	fn child_node(&self, parent: &Self::Node, index: usize) -> Option<Self::Node>;

	fn append_child(&self, parent: &Self::Node, child: &Self::Node);
	fn replace_child(&self, parent: &Self::Node, new_child: &Self::Node, old_child: &Self::Node);
	fn remove_child(&self, parent: &Self::Node, child: &Self::Node);

	fn set_attribute(&self, element: &Self::Node, name: &str, value: &str);
	fn remove_attribute(&self, element: &Self::Node, name: &str);

	/// `event` is the bare event name, like `"click"`.
	fn add_event_listener(&self, element: &Self::Node, event: &str, handler: &EventHandler);
	fn remove_event_listener(&self, element: &Self::Node, event: &str, handler: &EventHandler);

	/// Sets the current value of an input-like element without touching its `value` attribute.
	fn set_value(&self, element: &Self::Node, value: &str);

	/// Resolves a selector to an element, for [`MountTarget::Selector`](`crate::app::MountTarget::Selector`).
	fn query_selector(&self, selector: &str) -> Option<Self::Node>;
}
