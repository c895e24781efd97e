//! Parser module for monkey programs.

mod core;
mod expressions;
mod precedence;
mod statements;


pub use self::core::Parser;
