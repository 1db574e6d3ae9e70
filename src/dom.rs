//! A [`LiveTree`] over the browser DOM.

use crate::{
	live::LiveTree,
	node::{Event, EventHandler},
	rc_hash_map::{CountSaturatedError, RcHashMap},
};
use js_sys::{Array, Function, Reflect};
use std::{cell::RefCell, rc::Rc};
use tracing::{error, info, instrument, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement};

/// Expando property listing the handler ids bound to an element, so they can be released with it.
const LISTENER_IDS: &str = "__xylem_listener_ids";

type Listeners = RcHashMap<usize, u16, (EventHandler, Function)>;

/// Attached to a [`web_sys::Document`], this `struct` creates and mutates nodes in it.
///
/// Each distinct [`EventHandler`] is bound through a single shared [`Closure`] and reference-counted per element it's registered on.
/// Counts are released when elements are removed or replaced through this tree.
///
/// Associated event listeners will start throwing errors into JavaScript if the instance is dropped.
/// Listeners left on detached elements whose handlers were released log an error instead.
#[derive(Debug)]
pub struct DomTree {
	document: web_sys::Document,
	listeners: Rc<RefCell<Listeners>>,
	common_handler: Closure<dyn Fn(JsValue, web_sys::Event)>,
}

impl DomTree {
	#[must_use]
	#[instrument]
	pub fn new(document: web_sys::Document) -> Self {
		let listeners = Rc::new(RefCell::new(Listeners::new()));
		let common_handler = Closure::wrap(Box::new({
			let listeners = Rc::downgrade(&listeners);
			move |handler_id: JsValue, event: web_sys::Event| {
				let span = trace_span!("common_handler", handler_id = ?handler_id, event = %event.type_());
				let _enter = span.enter();

				#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
				let handler = match (handler_id.as_f64(), listeners.upgrade()) {
					(Some(id), Some(listeners)) => {
						let handler = listeners.borrow().get(&(id as usize)).map(|(handler, _)| handler.clone());
						handler
					}
					_ => None,
				};

				// Not borrowed while the handler runs.
				match handler {
					Some(handler) => handler.call(&convert_event(&event)),
					None => error!("Event listener fired for an unknown or released handler {:?}.", handler_id),
				}
			}
		}) as Box<dyn Fn(JsValue, web_sys::Event)>);

		Self {
			document,
			listeners,
			common_handler,
		}
	}

	/// [`None`] outside of a browser window context.
	#[must_use]
	pub fn for_window() -> Option<Self> {
		web_sys::window()?.document().map(Self::new)
	}

	#[must_use]
	pub fn document(&self) -> &web_sys::Document {
		&self.document
	}

	/// How many distinct handlers are currently bound.
	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.listeners.borrow().len()
	}

	fn as_element<'a>(node: &'a web_sys::Node, operation: &str) -> Option<&'a web_sys::Element> {
		let element = node.dyn_ref::<web_sys::Element>();
		if element.is_none() {
			error!("Expected an element to {} but found {:?}.", operation, node);
		}
		element
	}

	fn listener_ids(element: &web_sys::Element) -> Array {
		match Reflect::get(element, &JsValue::from_str(LISTENER_IDS)) {
			Ok(ids) if Array::is_array(&ids) => ids.unchecked_into(),
			_ => Array::new(),
		}
	}

	/// Decrements every handler count held by `node` and its descendants, then frees unused listener closures.
	#[instrument(skip(self))]
	fn release(&self, node: &web_sys::Node) {
		let element = match node.dyn_ref::<web_sys::Element>() {
			Some(element) => element,
			None => return trace!("Nothing to release for a non-element."),
		};

		let descendants = match element.query_selector_all("*") {
			Ok(descendants) => descendants,
			Err(error) => return error!("Failed to enumerate descendants for listener release: {:?}", error),
		};

		let mut listeners = self.listeners.borrow_mut();
		let mut released = 0_usize;
		let elements = (0..descendants.length()).filter_map(|i| descendants.get(i)).filter_map(|node| node.dyn_into::<web_sys::Element>().ok());
		for element in Some(element.clone()).into_iter().chain(elements) {
			let ids = Self::listener_ids(&element);
			for id in ids.iter().filter_map(|id| id.as_f64()) {
				#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
				let id = id as usize;
				match listeners.weak_decrement(&id) {
					Ok(Some(_)) => released += 1,
					Ok(None) => warn!("Released unknown handler id {}.", id),
					Err(CountSaturatedError) => error!("Released handler id {} more often than it was bound.", id),
				}
			}
			if ids.length() != 0 {
				if let Err(error) = Reflect::delete_property(&element, &JsValue::from_str(LISTENER_IDS)) {
					warn!("Failed to clear released listener ids: {:?}", error)
				}
			}
		}

		let freed = listeners.drain_weak().count();
		trace!("Released {} binding(s), freeing {} listener closure(s).", released, freed);
		info!("Event listener count/cached capacity: {}/{}", listeners.len(), listeners.capacity());
	}
}

fn convert_event(event: &web_sys::Event) -> Event {
	let value = event.target().and_then(|target| {
		if let Some(input) = target.dyn_ref::<HtmlInputElement>() {
			Some(input.value())
		} else if let Some(text_area) = target.dyn_ref::<HtmlTextAreaElement>() {
			Some(text_area.value())
		} else {
			target.dyn_ref::<HtmlSelectElement>().map(HtmlSelectElement::value)
		}
	});
	Event { name: event.type_(), value }
}

impl LiveTree for DomTree {
	type Node = web_sys::Node;

	fn create_element(&self, tag: &str) -> web_sys::Node {
		match self.document.create_element(tag) {
			Ok(element) => element.into(),
			Err(error) => {
				error!("Failed to create element <{}>: {:?}. Substituting an empty text node.", tag, error);
				self.document.create_text_node("").into()
			}
		}
	}

	fn create_text_node(&self, text: &str) -> web_sys::Node {
		self.document.create_text_node(text).into()
	}

	#[allow(clippy::cast_possible_truncation)]
	fn child_node(&self, parent: &web_sys::Node, index: usize) -> Option<web_sys::Node> {
		parent.child_nodes().get(index as u32)
	}

	fn append_child(&self, parent: &web_sys::Node, child: &web_sys::Node) {
		if let Err(error) = parent.append_child(child) {
			error!("Failed to append node: {:?}", error)
		}
	}

	fn replace_child(&self, parent: &web_sys::Node, new_child: &web_sys::Node, old_child: &web_sys::Node) {
		match parent.replace_child(new_child, old_child) {
			Ok(replaced) => self.release(&replaced),
			Err(error) => error!("Failed to replace node: {:?}", error),
		}
	}

	fn remove_child(&self, parent: &web_sys::Node, child: &web_sys::Node) {
		match parent.remove_child(child) {
			Ok(removed) => self.release(&removed),
			Err(error) => error!("Failed to remove node: {:?}", error),
		}
	}

	fn set_attribute(&self, element: &web_sys::Node, name: &str, value: &str) {
		if let Some(element) = Self::as_element(element, "set an attribute on") {
			if let Err(error) = element.set_attribute(name, value) {
				error!("Could not set attribute {:?}: {:?}", name, error)
			}
		}
	}

	fn remove_attribute(&self, element: &web_sys::Node, name: &str) {
		if let Some(element) = Self::as_element(element, "remove an attribute from") {
			if let Err(error) = element.remove_attribute(name) {
				warn!("Could not remove attribute {:?}: {:?}", name, error)
			}
		}
	}

	#[instrument(skip(self, element))]
	fn add_event_listener(&self, element: &web_sys::Node, event: &str, handler: &EventHandler) {
		let element = match Self::as_element(element, "add an event listener to") {
			Some(element) => element,
			None => return,
		};

		let function = {
			let mut listeners = self.listeners.borrow_mut();
			let common_handler = &self.common_handler;
			match listeners.increment_or_insert_with(handler.id(), |&id| {
				#[allow(clippy::cast_precision_loss)]
				let function = common_handler.as_ref().unchecked_ref::<Function>().bind1(&JsValue::UNDEFINED, &JsValue::from_f64(id as f64));
				(handler.clone(), function)
			}) {
				Ok((_, function)) => function.clone(),
				Err(CountSaturatedError) => return error!("Too many (more than 65k) active bindings of the same handler."),
			}
		};

		if let Err(error) = element.add_event_listener_with_callback(event, &function) {
			return error!("Failed to add event listener {:?}: {:?}", event, error);
		}

		let ids = Self::listener_ids(element);
		#[allow(clippy::cast_precision_loss)]
		ids.push(&JsValue::from_f64(handler.id() as f64));
		if let Err(error) = Reflect::set(element, &JsValue::from_str(LISTENER_IDS), &ids) {
			warn!("Failed to record listener id: {:?}", error)
		}
	}

	#[instrument(skip(self, element))]
	fn remove_event_listener(&self, element: &web_sys::Node, event: &str, handler: &EventHandler) {
		let element = match Self::as_element(element, "remove an event listener from") {
			Some(element) => element,
			None => return,
		};

		let mut listeners = self.listeners.borrow_mut();
		let function = match listeners.weak_decrement(&handler.id()) {
			Ok(Some((_, function))) => function.clone(),
			Ok(None) => return warn!("Tried to remove a listener that was never added."),
			Err(CountSaturatedError) => return error!("Tried to remove a listener more often than it was added."),
		};
		trace!("Remaining bindings: {:?}", listeners.count(&handler.id()));

		if let Err(error) = element.remove_event_listener_with_callback(event, &function) {
			error!("Failed to remove event listener {:?}: {:?}", event, error)
		}

		#[allow(clippy::cast_precision_loss)]
		let id = handler.id() as f64;
		let ids = Self::listener_ids(element);
		if let Some(index) = ids.iter().position(|candidate| candidate.as_f64() == Some(id)) {
			let remaining = ids.iter().enumerate().filter(|&(i, _)| i != index).map(|(_, id)| id).collect::<Array>();
			if let Err(error) = Reflect::set(element, &JsValue::from_str(LISTENER_IDS), &remaining) {
				warn!("Failed to update listener ids: {:?}", error)
			}
		}

		listeners.drain_weak().for_each(drop);
	}

	fn set_value(&self, element: &web_sys::Node, value: &str) {
		if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
			input.set_value(value)
		} else if let Some(text_area) = element.dyn_ref::<HtmlTextAreaElement>() {
			text_area.set_value(value)
		} else if let Some(select) = element.dyn_ref::<HtmlSelectElement>() {
			select.set_value(value)
		} else if let Err(error) = Reflect::set(element, &JsValue::from_str("value"), &JsValue::from_str(value)) {
			warn!("Could not set value on {:?}: {:?}", element, error)
		}
	}

	fn query_selector(&self, selector: &str) -> Option<web_sys::Node> {
		match self.document.query_selector(selector) {
			Ok(element) => element.map(Into::into),
			Err(error) => {
				error!("Invalid selector {:?}: {:?}", selector, error);
				None
			}
		}
	}
}
