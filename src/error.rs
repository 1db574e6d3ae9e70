use thiserror::Error;

/// What a view function fails with.
pub type ViewError = Box<dyn std::error::Error>;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
	/// The mount target selector resolved to nothing. Fatal at construction.
	#[error("mount target {selector:?} did not resolve to an element")]
	MountTargetNotFound { selector: String },

	#[error("no action named {name:?}")]
	UnknownAction { name: String },

	/// An action was dispatched while the state was borrowed, from inside another action or a view.
	#[error("application state is already in use (reentrant dispatch)")]
	Reentrant,

	/// A [`Dispatcher`](`crate::app::Dispatcher`) outlived its [`App`](`crate::app::App`).
	#[error("the application was dropped")]
	Dropped,

	/// A [`Defer`](`crate::schedule::Defer`) implementation could not queue a task.
	#[error("failed to defer a task: {reason}")]
	Defer { reason: String },

	/// Nothing is scheduled for a failed recomputation.
	#[error("view failed: {0}")]
	View(#[source] ViewError),
}
