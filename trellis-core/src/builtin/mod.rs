//! The builtin component catalog.
//!
//! These types are intentionally thin. Each one exists to exercise a part of
//! the core: scalar essentials and inverses (`number`, `angle`), arrays
//! (`point`, `pointList`), composites with incremental diffs (`sequence`),
//! variant selection (`selectFromSequence`, `select`) and shadow copies
//! (`copy`).

mod basic;
mod capabilities;
mod copy;
mod point;
mod select;
mod sequence;

pub use capabilities::{fixed, rounding};

use crate::component::TypeRegistry;

pub(crate) fn register_all(registry: &mut TypeRegistry) {
    basic::register(registry);
    point::register(registry);
    sequence::register(registry);
    select::register(registry);
    copy::register(registry);
}
