#![cfg(target_arch = "wasm32")]

use std::{cell::RefCell, rc::Rc};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, HtmlElement, HtmlInputElement};
use xylem::{
	app::{ActionTable, App, AppConfig, MountTarget},
	dom::DomTree,
	node::{Element, VNode},
	patch::Patcher,
	schedule::{Defer, TaskQueue, Timeout},
};

wasm_bindgen_test_configure!(run_in_browser);

static mut LOG_INITIALIZED: bool = false;

fn init_log() {
	unsafe {
		if !LOG_INITIALIZED {
			//TODO: Fail on Warning or Error.
			tracing_wasm::set_as_global_default();
			LOG_INITIALIZED = true;
		}
	}
}

#[wasm_bindgen_test]
fn click() {
	init_log();

	let body = window().unwrap().document().unwrap().body().unwrap();
	body.set_inner_html("");

	let tree = DomTree::for_window().unwrap();
	let patcher = Patcher::new(tree);

	let click_count = Rc::new(RefCell::new(0));
	let vdom: VNode = Element::new("button")
		.attr("id", "test-button")
		.on("click", {
			let click_count = Rc::clone(&click_count);
			move |event| {
				assert_eq!(event.name, "click");
				*click_count.borrow_mut() += 1;
			}
		})
		.into();

	assert_eq!(*click_count.borrow(), 0);
	patcher.update(body.as_ref(), None, Some(&vdom), 0);
	assert_eq!(*click_count.borrow(), 0);
	assert_eq!(patcher.tree().listener_count(), 1);

	let button: HtmlElement = window().unwrap().document().unwrap().get_element_by_id("test-button").unwrap().dyn_into().unwrap();
	button.click();
	assert_eq!(*click_count.borrow(), 1);

	patcher.update(body.as_ref(), Some(&vdom), None, 0);
	assert_eq!(patcher.tree().listener_count(), 0);
	button.click();
	assert_eq!(*click_count.borrow(), 1);
}

#[wasm_bindgen_test]
fn input_dispatches_through_app() {
	init_log();

	let document = window().unwrap().document().unwrap();
	let body = document.body().unwrap();
	body.set_inner_html(r#"<div id="app"></div>"#);

	let queue = TaskQueue::new();
	let actions = ActionTable::new().with("edit", |draft: &mut String, text: String| *draft = text);
	let config = AppConfig::new(MountTarget::Selector("#app".to_owned()), String::new(), actions, |draft: &String, dispatcher| {
		Ok(Element::new("div")
			.child(
				Element::new("input")
					.attr("id", "draft")
					.attr("value", draft.clone())
					.on("input", {
						let dispatcher = dispatcher.clone();
						move |event| {
							dispatcher.dispatch("edit", event.value.clone().unwrap_or_default()).ok();
						}
					}),
			)
			.child(Element::new("p").attr("id", "echo").child(draft.clone()))
			.into())
	});
	let app = App::new(config, DomTree::new(document.clone()), queue.clone()).unwrap();
	queue.run_until_idle();

	let input: HtmlInputElement = document.get_element_by_id("draft").unwrap().dyn_into().unwrap();
	input.set_value("typed");
	input.dispatch_event(&web_sys::Event::new("input").unwrap()).unwrap();
	assert!(app.scheduler().is_pending());
	queue.run_until_idle();

	assert_eq!(document.get_element_by_id("echo").unwrap().text_content().as_deref(), Some("typed"));
	assert_eq!(input.value(), "typed");
}

#[wasm_bindgen_test]
fn timeout_defers() {
	let ran = Rc::new(RefCell::new(false));
	let timeout = Timeout::new().unwrap();
	timeout.defer(Box::new({
		let ran = Rc::clone(&ran);
		move || *ran.borrow_mut() = true
	}))
	.unwrap();
	assert!(!*ran.borrow());
}
