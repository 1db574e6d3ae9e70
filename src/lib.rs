#![doc(html_root_url = "https://docs.rs/xylem/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! A minimal positional virtual DOM.
//!
//! Views build immutable [`VNode`](`node::VNode`) trees. [`diff`](`diff::diff`) classifies what changed at one position,
//! a [`Patcher`](`patch::Patcher`) applies the minimal matching mutations to a [`LiveTree`](`live::LiveTree`)
//! and a [`RenderScheduler`](`schedule::RenderScheduler`) coalesces bursts of updates into one deferred commit.
//! [`App`](`app::App`) ties this to a state value and a table of named actions.
//!
//! Two live trees are included: [`MemoryTree`](`memory::MemoryTree`), which records its mutations,
//! and [`DomTree`](`dom::DomTree`) for the browser.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod app;
pub mod diff;
pub mod dom;
pub mod live;
pub mod memory;
pub mod node;
pub mod patch;
pub mod schedule;

mod error;
mod rc_hash_map;

pub use error::{Error, Result, ViewError};
