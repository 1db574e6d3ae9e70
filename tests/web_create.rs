#![cfg(target_arch = "wasm32")]

use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::window;
use xylem::{
	dom::DomTree,
	node::{Element, VNode},
	patch::Patcher,
};

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn text() {
	test_create("Hello xylem!".into(), "Hello xylem!");
}

#[wasm_bindgen_test]
fn number() {
	test_create(1.5_f64.into(), "1.5");
}

#[wasm_bindgen_test]
fn nested_element() {
	test_create(
		Element::new("div").attr("class", "greeting").child(Element::new("b").child("Hello")).child(" xylem!").into(),
		r#"<div class="greeting"><b>Hello</b> xylem!</div>"#,
	);
}

#[wasm_bindgen_test]
fn input_value() {
	test_create(Element::new("input").attr("value", "draft").into(), r#"<input value="draft">"#);
}

fn test_create(vdom: VNode, expected_html: &str) {
	let body = window().unwrap().document().unwrap().body().unwrap();
	body.set_inner_html("");

	let patcher = Patcher::new(DomTree::for_window().unwrap());
	patcher.update(body.as_ref(), None, Some(&vdom), 0);

	assert_eq!(body.inner_html(), expected_html);
	assert_eq!(body.child_nodes().length(), 1);
}
