//! Module search path.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Environment variable holding the colon-separated search path.
pub const SEARCH_PATH_VAR: &str = "MONKEYPATH";

/// File extension of monkey modules.
pub const MODULE_EXTENSION: &str = "monkey";

/// Directories searched, in order, when a module is imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Build from `MONKEYPATH`, falling back to the current directory.
    pub fn from_env() -> Self {
        Self::parse(env::var(SEARCH_PATH_VAR).ok().as_deref())
    }

    /// Build from a colon-separated list. Each entry has `$VAR` references
    /// expanded and is made absolute and cleaned. Empty entries are skipped.
    pub fn parse(value: Option<&str>) -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let dirs: Vec<PathBuf> = value
            .unwrap_or("")
            .split(':')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| clean(&cwd.join(expand_vars(entry))))
            .collect();

        if dirs.is_empty() {
            return Self::new(vec![cwd]);
        }
        Self::new(dirs)
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// The first `<dir>/<name>.monkey` that exists.
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        self.dirs
            .iter()
            .map(|dir| dir.join(format!("{}.{}", name, MODULE_EXTENSION)))
            .find(|path| path.exists() && path.is_file())
    }
}

impl Default for SearchPath {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Replace `$NAME` and `${NAME}` with the variable's value. Unset variables
/// expand to nothing.
fn expand_vars(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            output.push(c);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if braced && chars.peek() == Some(&'}') {
            chars.next();
        }

        if name.is_empty() {
            output.push('$');
        } else {
            output.push_str(&env::var(&name).unwrap_or_default());
        }
    }

    output
}

/// Lexically normalize a path: drop `.` and fold `..` into its parent.
fn clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(component);
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}
