//! Composition of state, a view function and an action table into a running application.
//!
//! ```
//! use xylem::{
//! 	app::{ActionTable, App, AppConfig, MountTarget},
//! 	memory::MemoryTree,
//! 	node::Element,
//! 	schedule::TaskQueue,
//! };
//!
//! let tree = MemoryTree::new();
//! let root = tree.create_root("div", "app");
//! let queue = TaskQueue::new();
//!
//! let actions = ActionTable::new().with("increment", |count: &mut u32, by: u32| *count += by);
//! let config = AppConfig::new(MountTarget::Selector("#app".to_owned()), 0_u32, actions, |count: &u32, _| {
//! 	Ok(Element::new("p").child(*count).into())
//! });
//! let app = App::new(config, tree.clone(), queue.clone()).unwrap();
//!
//! app.dispatch("increment", 2).unwrap();
//! app.dispatch("increment", 3).unwrap();
//! queue.run_until_idle();
//! assert_eq!(tree.to_html(root), "<div id=\"app\"><p>5</p></div>");
//! ```

use crate::{
	error::{Error, Result, ViewError},
	live::LiveTree,
	node::{Event, EventHandler, VNode},
	patch::{Options, Patcher},
	schedule::{Defer, RenderScheduler},
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use std::{
	borrow::Cow,
	rc::{Rc, Weak},
};
use tracing::{error, instrument, trace};

/// A state transition. Receives exclusive access to the state plus the dispatch arguments.
pub type Action<S, A, R> = Box<dyn Fn(&mut S, A) -> R>;

/// `(state, dispatcher) -> tree`. Must not mutate anything. Event handlers in the tree dispatch actions instead.
pub type View<S, A, R> = Box<dyn Fn(&S, &Dispatcher<A, R>) -> core::result::Result<VNode, ViewError>>;

/// Named [`Action`]s.
pub struct ActionTable<S, A = (), R = ()> {
	actions: HashMap<Cow<'static, str>, Action<S, A, R>>,
}

impl<S, A, R> Default for ActionTable<S, A, R> {
	fn default() -> Self {
		Self { actions: HashMap::new() }
	}
}

impl<S, A, R> ActionTable<S, A, R> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, name: impl Into<Cow<'static, str>>, action: impl 'static + Fn(&mut S, A) -> R) -> Self {
		self.insert(name, action);
		self
	}

	/// Replaces any action of the same name.
	pub fn insert(&mut self, name: impl Into<Cow<'static, str>>, action: impl 'static + Fn(&mut S, A) -> R) {
		self.actions.insert(name.into(), Box::new(action));
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Action<S, A, R>> {
		self.actions.get(name)
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.actions.keys().map(|name| &**name)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.actions.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.actions.is_empty()
	}
}

impl<S, A, R> Debug for ActionTable<S, A, R> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.names()).finish()
	}
}

/// Where the application renders into.
#[derive(Debug, Clone)]
pub enum MountTarget<N> {
	Node(N),
	/// Resolved with [`LiveTree::query_selector`] during [`App::new`].
	Selector(String),
}

pub struct AppConfig<S, A, R, N> {
	pub mount_target: MountTarget<N>,
	pub view: View<S, A, R>,
	pub state: S,
	pub actions: ActionTable<S, A, R>,
	pub options: Options,
}

impl<S, A, R, N> AppConfig<S, A, R, N> {
	pub fn new(
		mount_target: MountTarget<N>,
		state: S,
		actions: ActionTable<S, A, R>,
		view: impl 'static + Fn(&S, &Dispatcher<A, R>) -> core::result::Result<VNode, ViewError>,
	) -> Self {
		Self {
			mount_target,
			view: Box::new(view),
			state,
			actions,
			options: Options::default(),
		}
	}

	#[must_use]
	pub fn with_options(mut self, options: Options) -> Self {
		self.options = options;
		self
	}
}

trait Dispatch<A, R> {
	fn dispatch(&self, name: &str, args: A) -> Result<R>;
}

/// A weak handle for dispatching actions, handed to the view so event handlers can capture it.
pub struct Dispatcher<A, R = ()> {
	core: Weak<dyn Dispatch<A, R>>,
}

impl<A, R> Clone for Dispatcher<A, R> {
	fn clone(&self) -> Self {
		Self { core: Weak::clone(&self.core) }
	}
}

impl<A, R> Debug for Dispatcher<A, R> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dispatcher").field("alive", &(self.core.strong_count() > 0)).finish()
	}
}

impl<A: 'static, R: 'static> Dispatcher<A, R> {
	/// See [`App::dispatch`].
	///
	/// # Errors
	///
	/// [`Error::Dropped`] if the application is gone, otherwise as [`App::dispatch`].
	pub fn dispatch(&self, name: &str, args: A) -> Result<R> {
		self.core.upgrade().ok_or(Error::Dropped)?.dispatch(name, args)
	}

	/// An [`EventHandler`] that dispatches `name` with arguments derived from the event.
	///
	/// Handlers have nowhere to return errors to, so they are logged.
	pub fn handler(&self, name: &'static str, args: impl 'static + Fn(&Event) -> A) -> EventHandler {
		let dispatcher = self.clone();
		EventHandler::new(move |event| {
			if let Err(error) = dispatcher.dispatch(name, args(event)) {
				error!("Dispatching {:?} from {:?} failed: {}", name, event.name, error)
			}
		})
	}
}

struct Core<S, A, R, L: LiveTree, D> {
	state: RefCell<S>,
	actions: ActionTable<S, A, R>,
	view: View<S, A, R>,
	dispatcher: Dispatcher<A, R>,
	scheduler: RenderScheduler<L, D>,
}

impl<S, A, R, L, D> Core<S, A, R, L, D>
where
	L: 'static + LiveTree,
	D: 'static + Defer,
{
	/// Runs the view against the current state and hands the tree to the scheduler.
	fn recompute(&self) -> Result<()> {
		let tree = {
			let state = self.state.try_borrow().map_err(|_| Error::Reentrant)?;
			(self.view)(&*state, &self.dispatcher).map_err(Error::View)?
		};
		self.scheduler.submit(tree)
	}
}

impl<S, A, R, L, D> Dispatch<A, R> for Core<S, A, R, L, D>
where
	L: 'static + LiveTree,
	D: 'static + Defer,
{
	#[instrument(skip(self, args))]
	fn dispatch(&self, name: &str, args: A) -> Result<R> {
		let action = self.actions.get(name).ok_or_else(|| Error::UnknownAction { name: name.to_owned() })?;
		let output = {
			let mut state = self.state.try_borrow_mut().map_err(|_| Error::Reentrant)?;
			action(&mut *state, args)
		};
		trace!("Action ran. Recomputing.");
		self.recompute()?;
		Ok(output)
	}
}

/// A running application. Dropping it cancels any pending render and disconnects all [`Dispatcher`]s.
pub struct App<S, A, R, L: LiveTree, D> {
	core: Rc<Core<S, A, R, L, D>>,
}

impl<S, A, R, L, D> App<S, A, R, L, D>
where
	S: 'static,
	A: 'static,
	R: 'static,
	L: 'static + LiveTree,
	D: 'static + Defer,
{
	/// Resolves the mount target, computes the first tree and schedules the initial render.
	///
	/// # Errors
	///
	/// [`Error::MountTargetNotFound`] if a selector doesn't resolve, [`Error::View`] if the first view invocation fails,
	/// [`Error::Defer`] if the initial render could not be scheduled.
	#[instrument(skip(config, tree, defer))]
	pub fn new(config: AppConfig<S, A, R, L::Node>, tree: L, defer: D) -> Result<Self> {
		let AppConfig {
			mount_target,
			view,
			state,
			actions,
			options,
		} = config;

		let mount = match mount_target {
			MountTarget::Node(node) => node,
			MountTarget::Selector(selector) => match tree.query_selector(&selector) {
				Some(node) => node,
				None => return Err(Error::MountTargetNotFound { selector }),
			},
		};

		let core = Rc::new_cyclic(|core: &Weak<Core<S, A, R, L, D>>| {
			let core: Weak<dyn Dispatch<A, R>> = core.clone();
			Core {
				state: RefCell::new(state),
				actions,
				view,
				dispatcher: Dispatcher { core },
				scheduler: RenderScheduler::new(Patcher::with_options(tree, options), mount, defer),
			}
		});
		core.recompute()?;
		Ok(Self { core })
	}

	/// Runs the action `name` with exclusive access to the state, then recomputes the tree and schedules a render.
	///
	/// # Errors
	///
	/// - [`Error::UnknownAction`] if there is no such action. Nothing runs.
	/// - [`Error::Reentrant`] if called from inside an action or the view.
	/// - [`Error::View`] if recomputation fails. The action's effect on the state remains, but nothing is scheduled.
	/// - [`Error::Defer`] if the render could not be scheduled. The new tree stays pending for the next dispatch.
	pub fn dispatch(&self, name: &str, args: A) -> Result<R> {
		self.core.dispatch(name, args)
	}

	#[must_use]
	pub fn dispatcher(&self) -> Dispatcher<A, R> {
		self.core.dispatcher.clone()
	}

	/// Reads the state.
	///
	/// # Errors
	///
	/// [`Error::Reentrant`] while an action is running.
	pub fn with_state<T>(&self, f: impl FnOnce(&S) -> T) -> Result<T> {
		let state = self.core.state.try_borrow().map_err(|_| Error::Reentrant)?;
		Ok(f(&state))
	}

	#[must_use]
	pub fn scheduler(&self) -> &RenderScheduler<L, D> {
		&self.core.scheduler
	}
}

impl<S, A, R, L: LiveTree, D> Debug for App<S, A, R, L, D> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("App").field("actions", &self.core.actions).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		memory::{MemoryTree, NodeId},
		node::Element,
		schedule::TaskQueue,
	};
	use std::io;

	type TestApp = App<Vec<String>, String, usize, MemoryTree, TaskQueue>;

	fn list_app(tree: &MemoryTree, queue: &TaskQueue, mount: MountTarget<NodeId>) -> Result<TestApp> {
		let actions = ActionTable::new()
			.with("push", |items: &mut Vec<String>, item: String| {
				items.push(item);
				items.len()
			})
			.with("clear", |items: &mut Vec<String>, _| {
				let count = items.len();
				items.clear();
				count
			});
		let config = AppConfig::new(mount, Vec::new(), actions, |items: &Vec<String>, _| {
			Ok(Element::new("ul").children(items.iter().map(|item| Element::new("li").child(item.clone()))).into())
		});
		App::new(config, tree.clone(), queue.clone())
	}

	#[test]
	fn initial_render_is_deferred() {
		let tree = MemoryTree::new();
		let root = tree.create_root("div", "app");
		let queue = TaskQueue::new();
		let app = list_app(&tree, &queue, MountTarget::Node(root)).unwrap();
		assert!(app.scheduler().is_pending());
		assert!(tree.children(root).is_empty());
		queue.run_until_idle();
		assert_eq!(tree.to_html(root), "<div id=\"app\"><ul></ul></div>");
	}

	#[test]
	fn dispatch_returns_output_and_renders_latest_state_once() {
		let tree = MemoryTree::new();
		let root = tree.create_root("div", "app");
		let queue = TaskQueue::new();
		let app = list_app(&tree, &queue, MountTarget::Selector("#app".to_owned())).unwrap();
		queue.run_until_idle();

		assert_eq!(app.dispatch("push", "a".to_owned()).unwrap(), 1);
		assert_eq!(app.dispatch("push", "b".to_owned()).unwrap(), 2);
		assert_eq!(queue.len(), 1);
		queue.run_until_idle();

		assert_eq!(app.scheduler().commit_count(), 2);
		assert_eq!(tree.to_html(root), "<div id=\"app\"><ul><li>a</li><li>b</li></ul></div>");
		assert_eq!(app.with_state(Vec::len).unwrap(), 2);
	}

	#[test]
	fn unresolvable_selector_fails_construction() {
		let tree = MemoryTree::new();
		let queue = TaskQueue::new();
		match list_app(&tree, &queue, MountTarget::Selector("#nowhere".to_owned())) {
			Err(Error::MountTargetNotFound { selector }) => assert_eq!(selector, "#nowhere"),
			other => panic!("unexpected {:?}", other.map(|_| ())),
		}
		assert!(queue.is_empty());
	}

	#[test]
	fn unknown_action() {
		let tree = MemoryTree::new();
		let root = tree.create_root("div", "app");
		let queue = TaskQueue::new();
		let app = list_app(&tree, &queue, MountTarget::Node(root)).unwrap();
		queue.run_until_idle();
		assert!(matches!(app.dispatch("pop", String::new()), Err(Error::UnknownAction { name }) if name == "pop"));
		assert!(queue.is_empty());
	}

	#[test]
	fn view_errors_propagate_and_schedule_nothing() {
		let tree = MemoryTree::new();
		let root = tree.create_root("div", "app");
		let queue = TaskQueue::new();
		let actions = ActionTable::new().with("set", |value: &mut i32, new: i32| *value = new);
		let config = AppConfig::new(MountTarget::Node(root), 0, actions, |value: &i32, _: &Dispatcher<i32>| {
			if *value < 0 {
				Err(Box::new(io::Error::new(io::ErrorKind::InvalidData, "negative")) as ViewError)
			} else {
				Ok(Element::new("p").child(*value).into())
			}
		});
		let app = App::new(config, tree.clone(), queue.clone()).unwrap();
		queue.run_until_idle();

		assert!(matches!(app.dispatch("set", -1), Err(Error::View(_))));
		assert!(!app.scheduler().is_pending());
		assert!(queue.is_empty());
		assert_eq!(app.with_state(|value| *value).unwrap(), -1);
	}

	#[test]
	fn dispatcher_outliving_app() {
		let tree = MemoryTree::new();
		let root = tree.create_root("div", "app");
		let queue = TaskQueue::new();
		let app = list_app(&tree, &queue, MountTarget::Node(root)).unwrap();
		let dispatcher = app.dispatcher();
		assert_eq!(dispatcher.dispatch("push", "x".to_owned()).unwrap(), 1);
		drop(app);
		assert!(matches!(dispatcher.dispatch("push", "y".to_owned()), Err(Error::Dropped)));
		queue.run_until_idle();
		assert!(tree.children(root).is_empty());
	}

	#[test]
	fn reentrant_dispatch_from_view_is_rejected() {
		let tree = MemoryTree::new();
		let root = tree.create_root("div", "app");
		let queue = TaskQueue::new();
		let seen = Rc::new(RefCell::new(None));
		let actions = ActionTable::new().with("noop", |_: &mut (), _: ()| ());
		let config = AppConfig::new(MountTarget::Node(root), (), actions, {
			let seen = Rc::clone(&seen);
			move |_: &(), dispatcher: &Dispatcher<()>| {
				if seen.borrow().is_none() {
					*seen.borrow_mut() = Some(dispatcher.dispatch("noop", ()).is_err());
				}
				Ok(Element::new("p").into())
			}
		});
		let app = App::new(config, tree, queue).unwrap();
		app.dispatch("noop", ()).unwrap();
		assert_eq!(*seen.borrow(), Some(true));
	}
}
