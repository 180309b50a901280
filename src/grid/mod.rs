//! Grid engine: catalog, grid state, filters, projection, reordering and the
//! session/persistence plumbing around them.
//!
//! Each stateful piece keeps its own `thread_local!` cell; the route layer
//! borrows them one at a time and never holds two mutable borrows of the
//! same cell.

pub mod catalog;
pub mod filter;
pub mod notice;
pub mod persist;
pub mod reorder;
pub mod session;
pub mod share;
pub mod state;
pub mod view;
