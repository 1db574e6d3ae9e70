//! Classification of the difference between two [`VNode`]s at the same tree position.

use crate::node::{Element, VNode, VALUE};
use tracing::trace;

/// The verdict for one tree position, ordered roughly from least to most destructive.
///
/// See [`diff`] for the precedence between variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
	/// Two equal primitives.
	Unchanged,
	/// The runtime [`Kind`](`crate::node::Kind`)s differ. The node is replaced.
	TypeChanged,
	/// Two primitives of the same kind with differing values. The node is replaced.
	TextChanged,
	/// Two elements with differing tags. The node is replaced.
	TagChanged,
	/// Two elements with the same tag but a different [`VALUE`] attribute.
	///
	/// Only the live value is updated, which preserves focus and cursor position in inputs.
	ValueChanged,
	/// Same tag and [`VALUE`], but the remaining attributes differ.
	AttributesChanged,
	/// Same tag and attributes. The children still have to be compared.
	NoChangeFurtherRecursion,
}

impl Change {
	/// Whether the live node has to be recreated from scratch.
	#[must_use]
	pub fn replaces(self) -> bool {
		matches!(self, Change::TypeChanged | Change::TextChanged | Change::TagChanged)
	}
}

/// Classifies `old` → `new`.
///
/// Precedence is kind, then primitive value or tag, then [`VALUE`], then the full attribute set.
/// Attribute comparison is order-independent and ignores event handlers.
///
/// ```
/// use xylem::{diff::{diff, Change}, node::{Element, VNode}};
///
/// let old = VNode::from(Element::new("input").attr("value", "x"));
/// let new = VNode::from(Element::new("input").attr("value", "y"));
/// assert_eq!(diff(&old, &new), Change::ValueChanged);
/// ```
#[must_use]
pub fn diff(old: &VNode, new: &VNode) -> Change {
	let change = match (old, new) {
		(VNode::Element(old), VNode::Element(new)) => diff_elements(old, new),
		(VNode::Text(old), VNode::Text(new)) => {
			if old == new {
				Change::Unchanged
			} else {
				Change::TextChanged
			}
		}
		#[allow(clippy::float_cmp)]
		(VNode::Number(old), VNode::Number(new)) => {
			if old == new {
				Change::Unchanged
			} else {
				Change::TextChanged
			}
		}
		_ => Change::TypeChanged,
	};
	trace!(?change, old_kind = ?old.kind(), new_kind = ?new.kind());
	change
}

fn diff_elements(old: &Element, new: &Element) -> Change {
	if old.tag != new.tag {
		Change::TagChanged
	} else if old.attributes.get(VALUE) != new.attributes.get(VALUE) {
		Change::ValueChanged
	} else if old.attributes != new.attributes {
		Change::AttributesChanged
	} else {
		Change::NoChangeFurtherRecursion
	}
}
