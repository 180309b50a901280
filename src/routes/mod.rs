pub mod catalog;
pub mod drag;
pub mod filters;
pub mod grid;
pub mod session;
pub mod share;
pub mod util;
