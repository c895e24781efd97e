//! Module system for monkey.
//!
//! This module provides:
//! - The search path taken from `MONKEYPATH`
//! - Loading a module into the importer's state

mod loader;
mod resolver;

pub use loader::load;
pub use resolver::{SearchPath, MODULE_EXTENSION, SEARCH_PATH_VAR};
