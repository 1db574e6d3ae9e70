//! Coalesced, deferred rendering.
//!
//! Any number of trees can be [submitted](`RenderScheduler::submit`) within one turn of the host's event loop.
//! Exactly one commit follows on a later turn, reconciling the last committed tree directly against the latest submission.

use crate::{
	error::{Error, Result},
	live::LiveTree,
	node::VNode,
	patch::Patcher,
};
use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc};
use tracing::{error, info, instrument, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast};

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Runs tasks on a later turn of the host's event loop, like a macrotask.
///
/// Implementations must never run a task before `defer` returns.
pub trait Defer {
	/// # Errors
	///
	/// [`Error::Defer`] if the task could not be queued. It is dropped without running.
	fn defer(&self, task: Task) -> Result<()>;
}

/// A manually pumped task queue, for native hosts and deterministic tests.
#[derive(Clone, Default)]
pub struct TaskQueue(Rc<RefCell<VecDeque<Task>>>);

impl TaskQueue {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.borrow().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.borrow().is_empty()
	}

	/// Runs the oldest task, if any. Returns whether one ran.
	pub fn run_next(&self) -> bool {
		// Not borrowed while the task runs, so it may defer more work.
		let task = self.0.borrow_mut().pop_front();
		match task {
			Some(task) => {
				task();
				true
			}
			None => false,
		}
	}

	/// Runs tasks until the queue is empty, including tasks deferred along the way. Returns how many ran.
	pub fn run_until_idle(&self) -> usize {
		let mut count = 0;
		while self.run_next() {
			count += 1;
		}
		count
	}
}

impl Defer for TaskQueue {
	fn defer(&self, task: Task) -> Result<()> {
		self.0.borrow_mut().push_back(task);
		Ok(())
	}
}

impl fmt::Debug for TaskQueue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TaskQueue").field("len", &self.len()).finish()
	}
}

/// Defers through `setTimeout(task, 0)` on the browser window.
#[derive(Debug, Clone)]
pub struct Timeout {
	window: web_sys::Window,
}

impl Timeout {
	/// [`None`] outside of a browser window context.
	#[must_use]
	pub fn new() -> Option<Self> {
		web_sys::window().map(|window| Self { window })
	}
}

impl Defer for Timeout {
	fn defer(&self, task: Task) -> Result<()> {
		let callback = Closure::once_into_js(move || task());
		match self.window.set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), 0) {
			Ok(_) => Ok(()),
			Err(error) => Err(Error::Defer {
				reason: format!("`setTimeout` failed: {:?}", error),
			}),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Idle,
	/// A commit is deferred and will pick up whatever tree is pending when it runs.
	Scheduled,
}

/// Render bookkeeping for one application instance.
///
/// Kept apart from the [`Patcher`], so trees can still be submitted while a commit is mutating the live tree.
#[derive(Debug)]
pub struct RenderState {
	/// The last committed tree. The live tree reflects exactly this.
	///
	/// Taken out for the duration of a commit.
	pub previous: Option<VNode>,
	/// The latest submitted tree, if newer than [`Self::previous`].
	pub pending: Option<VNode>,
	pub phase: Phase,
	pub commits: u64,
}

impl Default for RenderState {
	fn default() -> Self {
		Self {
			previous: None,
			pending: None,
			phase: Phase::Idle,
			commits: 0,
		}
	}
}

struct Renderer<L: LiveTree> {
	patcher: Patcher<L>,
	mount: L::Node,
	/// Where the root lands under `mount`, which may have had children of its own.
	root_index: usize,
}

impl<L: LiveTree> Renderer<L> {
	fn patch(&mut self, previous: Option<&VNode>, next: &VNode) {
		match previous {
			None => {
				let span = trace_span!("Initial render");
				let _enter = span.enter();
				self.root_index = (0..).find(|&i| self.patcher.tree().child_node(&self.mount, i).is_none()).unwrap_or_default();
				self.patcher.mount(&self.mount, next);
			}
			Some(previous) => {
				let span = trace_span!("Patching", root_index = self.root_index);
				let _enter = span.enter();
				self.patcher.update(&self.mount, Some(previous), Some(next), self.root_index);
			}
		}
	}
}

struct Shared<L: LiveTree, D> {
	renderer: RefCell<Renderer<L>>,
	state: RefCell<RenderState>,
	defer: D,
}

impl<L, D> Shared<L, D>
where
	L: 'static + LiveTree,
	D: 'static + Defer,
{
	/// Defers a commit. If that fails, the phase goes back to idle so that the next submission retries.
	fn schedule(shared: &Rc<Self>) -> Result<()> {
		shared.state.borrow_mut().phase = Phase::Scheduled;
		let weak = Rc::downgrade(shared);
		let deferred = shared.defer.defer(Box::new(move || match weak.upgrade() {
			Some(shared) => Self::commit(&shared),
			None => trace!("Scheduler dropped before its deferred commit ran."),
		}));
		if deferred.is_err() {
			shared.state.borrow_mut().phase = Phase::Idle;
		}
		deferred
	}

	#[instrument(skip(shared))]
	fn commit(shared: &Rc<Self>) {
		// Not borrowed while patching, so live tree callbacks can submit again.
		let (previous, next) = {
			let mut state = shared.state.borrow_mut();
			state.phase = Phase::Idle;
			match state.pending.take() {
				Some(next) => (state.previous.take(), next),
				None => return warn!("Commit without a pending tree."),
			}
		};

		match shared.renderer.try_borrow_mut() {
			Ok(mut renderer) => renderer.patch(previous.as_ref(), &next),
			Err(_) => {
				error!("Deferred commit ran during another commit. Retrying later.");
				let retry = {
					let mut state = shared.state.borrow_mut();
					state.previous = previous;
					state.pending.get_or_insert(next);
					state.phase == Phase::Idle
				};
				if retry {
					if let Err(error) = Self::schedule(shared) {
						error!("Could not reschedule: {}", error)
					}
				}
				return;
			}
		}

		let mut state = shared.state.borrow_mut();
		state.previous = Some(next);
		state.commits += 1;
		info!(commits = state.commits, "Committed.");
	}
}

/// Owns the [`Patcher`] and [`RenderState`] for one mount point and batches submissions into deferred commits.
pub struct RenderScheduler<L: LiveTree, D> {
	shared: Rc<Shared<L, D>>,
}

impl<L, D> RenderScheduler<L, D>
where
	L: 'static + LiveTree,
	D: 'static + Defer,
{
	/// Nothing is rendered until the first [`submit`](`Self::submit`).
	#[must_use]
	pub fn new(patcher: Patcher<L>, mount: L::Node, defer: D) -> Self {
		Self {
			shared: Rc::new(Shared {
				renderer: RefCell::new(Renderer { patcher, mount, root_index: 0 }),
				state: RefCell::new(RenderState::default()),
				defer,
			}),
		}
	}

	/// Replaces the pending tree, scheduling a commit unless one is already scheduled.
	///
	/// This also works while a commit is running. The new tree is then committed by a follow-up commit.
	///
	/// # Errors
	///
	/// - [`Error::Reentrant`] if called from inside [`with_previous`](`Self::with_previous`).
	/// - [`Error::Defer`] if no commit could be scheduled. The tree stays pending and the next submission retries.
	#[instrument(skip(self, tree))]
	pub fn submit(&self, tree: VNode) -> Result<()> {
		let phase = {
			let mut state = self.shared.state.try_borrow_mut().map_err(|_| Error::Reentrant)?;
			state.pending = Some(tree);
			state.phase
		};
		match phase {
			Phase::Scheduled => trace!("Render already scheduled. Replaced the pending tree."),
			Phase::Idle => {
				Shared::schedule(&self.shared)?;
				trace!("Render scheduled.");
			}
		}
		Ok(())
	}

	#[must_use]
	pub fn phase(&self) -> Phase {
		self.shared.state.borrow().phase
	}

	#[must_use]
	pub fn is_pending(&self) -> bool {
		self.phase() == Phase::Scheduled
	}

	#[must_use]
	pub fn commit_count(&self) -> u64 {
		self.shared.state.borrow().commits
	}

	/// Runs `f` with the last committed tree, which is [`None`] while a commit is running.
	pub fn with_previous<T>(&self, f: impl FnOnce(Option<&VNode>) -> T) -> T {
		f(self.shared.state.borrow().previous.as_ref())
	}

	/// # Panics
	///
	/// Iff called from inside a commit.
	#[must_use]
	pub fn mount(&self) -> L::Node {
		self.shared.renderer.borrow().mount.clone()
	}

	/// Runs `f` with the live tree.
	///
	/// # Panics
	///
	/// Iff called from inside a commit.
	pub fn with_tree<T>(&self, f: impl FnOnce(&L) -> T) -> T {
		f(self.shared.renderer.borrow().patcher.tree())
	}
}

impl<L: LiveTree, D: fmt::Debug> fmt::Debug for RenderScheduler<L, D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("RenderScheduler");
		if let Ok(state) = self.shared.state.try_borrow() {
			debug.field("state", &state);
		}
		debug.field("defer", &self.shared.defer).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		memory::{MemoryTree, Mutation, NodeId},
		node::{Element, EventHandler},
	};
	use std::cell::Cell;

	fn counter(count: u32) -> VNode {
		Element::new("p").child("Count: ").child(count).into()
	}

	fn scheduler() -> (RenderScheduler<MemoryTree, TaskQueue>, MemoryTree, TaskQueue) {
		let tree = MemoryTree::new();
		let mount = tree.create_root("div", "app");
		let queue = TaskQueue::new();
		(RenderScheduler::new(Patcher::new(tree.clone()), mount, queue.clone()), tree, queue)
	}

	#[test]
	fn nothing_renders_before_the_deferred_task() {
		let (scheduler, tree, queue) = scheduler();
		scheduler.submit(counter(0)).unwrap();
		assert!(scheduler.is_pending());
		assert!(tree.mutations().is_empty());
		assert_eq!(queue.len(), 1);

		assert_eq!(queue.run_until_idle(), 1);
		assert_eq!(scheduler.phase(), Phase::Idle);
		assert_eq!(scheduler.commit_count(), 1);
		assert_eq!(tree.to_html(scheduler.mount()), "<div id=\"app\"><p>Count: 0</p></div>");
	}

	#[test]
	fn bursts_coalesce_into_one_commit() {
		let (scheduler, tree, queue) = scheduler();
		scheduler.submit(counter(0)).unwrap();
		queue.run_until_idle();
		let p = tree.children(scheduler.mount())[0];
		let old_text = tree.children(p)[1];
		tree.take_mutations();

		scheduler.submit(counter(1)).unwrap();
		scheduler.submit(counter(2)).unwrap();
		scheduler.submit(counter(3)).unwrap();
		assert_eq!(queue.len(), 1);
		queue.run_until_idle();

		assert_eq!(scheduler.commit_count(), 2);
		let new_text = tree.children(p)[1];
		assert_eq!(
			tree.mutations(),
			vec![
				Mutation::CreateText { node: new_text, text: "3".to_owned() },
				Mutation::Replace {
					parent: p,
					new_child: new_text,
					old_child: old_text,
				},
			]
		);
		assert!(scheduler.with_previous(|previous| previous.and_then(VNode::as_element).map(|p| p.children.len())) == Some(2));
	}

	#[test]
	fn root_index_respects_existing_children() {
		let tree = MemoryTree::new();
		let mount = tree.create_root("body", "body");
		let banner = tree.create_element("header");
		tree.append_child(&mount, &banner);
		let queue = TaskQueue::new();
		let scheduler = RenderScheduler::new(Patcher::new(tree.clone()), mount, queue.clone());

		scheduler.submit(counter(0)).unwrap();
		queue.run_until_idle();
		scheduler.submit(counter(1)).unwrap();
		queue.run_until_idle();
		assert_eq!(tree.to_html(mount), "<body id=\"body\"><header></header><p>Count: 1</p></body>");
	}

	#[test]
	fn dropped_scheduler_skips_commit() {
		let (scheduler, tree, queue) = scheduler();
		scheduler.submit(counter(0)).unwrap();
		drop(scheduler);
		queue.run_until_idle();
		assert!(tree.mutations().is_empty());
	}

	fn list(items: &[&'static str]) -> VNode {
		items.iter().fold(Element::new("ul"), |ul, item| ul.child(Element::new("li").child(*item))).into()
	}

	/// Runs a callback once, right after the next removal.
	#[derive(Clone)]
	struct OnRemove {
		tree: MemoryTree,
		callback: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
	}

	impl LiveTree for OnRemove {
		type Node = NodeId;

		fn create_element(&self, tag: &str) -> NodeId {
			self.tree.create_element(tag)
		}
		fn create_text_node(&self, text: &str) -> NodeId {
			self.tree.create_text_node(text)
		}
		fn child_node(&self, parent: &NodeId, index: usize) -> Option<NodeId> {
			self.tree.child_node(parent, index)
		}
		fn append_child(&self, parent: &NodeId, child: &NodeId) {
			self.tree.append_child(parent, child)
		}
		fn replace_child(&self, parent: &NodeId, new_child: &NodeId, old_child: &NodeId) {
			self.tree.replace_child(parent, new_child, old_child)
		}
		fn remove_child(&self, parent: &NodeId, child: &NodeId) {
			self.tree.remove_child(parent, child);
			let callback = self.callback.borrow_mut().take();
			if let Some(callback) = callback {
				callback()
			}
		}
		fn set_attribute(&self, element: &NodeId, name: &str, value: &str) {
			self.tree.set_attribute(element, name, value)
		}
		fn remove_attribute(&self, element: &NodeId, name: &str) {
			self.tree.remove_attribute(element, name)
		}
		fn add_event_listener(&self, element: &NodeId, event: &str, handler: &EventHandler) {
			self.tree.add_event_listener(element, event, handler)
		}
		fn remove_event_listener(&self, element: &NodeId, event: &str, handler: &EventHandler) {
			self.tree.remove_event_listener(element, event, handler)
		}
		fn set_value(&self, element: &NodeId, value: &str) {
			self.tree.set_value(element, value)
		}
		fn query_selector(&self, selector: &str) -> Option<NodeId> {
			self.tree.query_selector(selector)
		}
	}

	#[test]
	fn submissions_during_a_commit_get_a_follow_up_commit() {
		let tree = MemoryTree::new();
		let mount = tree.create_root("div", "app");
		let queue = TaskQueue::new();
		let live = OnRemove {
			tree: tree.clone(),
			callback: Rc::default(),
		};
		let scheduler = Rc::new(RenderScheduler::new(Patcher::new(live.clone()), mount, queue.clone()));

		scheduler.submit(list(&["a", "b"])).unwrap();
		queue.run_until_idle();

		*live.callback.borrow_mut() = Some(Box::new({
			let scheduler = Rc::downgrade(&scheduler);
			move || scheduler.upgrade().unwrap().submit(list(&["z"])).unwrap()
		}));
		scheduler.submit(list(&["a"])).unwrap();
		assert_eq!(queue.run_until_idle(), 2);

		assert!(live.callback.borrow().is_none());
		assert!(!scheduler.is_pending());
		assert_eq!(scheduler.commit_count(), 3);
		assert_eq!(tree.to_html(mount), "<div id=\"app\"><ul><li>z</li></ul></div>");
		assert_eq!(scheduler.with_previous(|previous| previous.and_then(VNode::as_element).map(|ul| ul.children.len())), Some(1));
	}

	struct Refusing {
		queue: TaskQueue,
		refusals: Cell<usize>,
	}

	impl Defer for Refusing {
		fn defer(&self, task: Task) -> Result<()> {
			match self.refusals.get() {
				0 => self.queue.defer(task),
				n => {
					self.refusals.set(n - 1);
					Err(Error::Defer { reason: "refused".to_owned() })
				}
			}
		}
	}

	#[test]
	fn failed_deferral_returns_to_idle() {
		let tree = MemoryTree::new();
		let mount = tree.create_root("div", "app");
		let queue = TaskQueue::new();
		let refusing = Refusing {
			queue: queue.clone(),
			refusals: Cell::new(1),
		};
		let scheduler = RenderScheduler::new(Patcher::new(tree.clone()), mount, refusing);

		assert!(matches!(scheduler.submit(counter(0)), Err(Error::Defer { .. })));
		assert_eq!(scheduler.phase(), Phase::Idle);
		assert!(queue.is_empty());

		scheduler.submit(counter(1)).unwrap();
		assert!(scheduler.is_pending());
		assert_eq!(queue.run_until_idle(), 1);
		assert_eq!(scheduler.commit_count(), 1);
		assert_eq!(tree.to_html(mount), "<div id=\"app\"><p>Count: 1</p></div>");
	}
}
