//! Line-based interactive REPL.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use colored::Colorize;

use crate::bytecode::{disassemble_with_constants, VmState};
use crate::error::MonkeyError;
use crate::repl_highlight::SyntaxHighlighter;
use crate::value::Value;

const HISTORY_FILE: &str = ".monkey_history";

pub struct SimpleRepl {
    state: VmState,
    history: Vec<String>,
    history_file: PathBuf,
    multiline_buffer: String,
    brace_balance: i32,
    highlighter: SyntaxHighlighter,
}

impl SimpleRepl {
    pub fn new(state: VmState) -> Self {
        let mut repl = Self {
            state,
            history: Vec::new(),
            history_file: Self::get_history_path(),
            multiline_buffer: String::new(),
            brace_balance: 0,
            highlighter: SyntaxHighlighter::new(),
        };
        repl.load_history();
        repl
    }

    fn get_history_path() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            home.join(HISTORY_FILE)
        } else {
            PathBuf::from(HISTORY_FILE)
        }
    }

    fn load_history(&mut self) {
        if let Ok(content) = std::fs::read_to_string(&self.history_file) {
            self.history = content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    fn save_history(&self) {
        if let Some(parent) = self.history_file.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&self.history_file, self.history.join("\n"));
    }

    pub fn run(&mut self) {
        println!("monkey {} REPL", env!("CARGO_PKG_VERSION"));
        println!("Type .help for available commands.\n");

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();

        loop {
            print!("{}", self.get_prompt());
            let _ = io::stdout().flush();

            let line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(_)) | None => {
                    println!();
                    break;
                }
            };

            let trimmed = line.trim_end();
            if trimmed.is_empty() && !self.is_multiline() {
                continue;
            }
            if !self.is_multiline() && (trimmed == ".exit" || trimmed == ".quit") {
                break;
            }

            if let Some(output) = self.handle_line(trimmed) {
                println!("{}", output);
            }
        }

        self.save_history();
        println!("Goodbye!");
    }

    fn is_multiline(&self) -> bool {
        !self.multiline_buffer.is_empty()
    }

    fn get_prompt(&self) -> &'static str {
        if self.is_multiline() {
            "... "
        } else {
            ">> "
        }
    }

    /// Feed one input line. Returns what should be printed, if anything.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        if !self.is_multiline() && line.starts_with('.') {
            self.history.push(line.to_string());
            return self.handle_command(line);
        }

        if self.is_multiline() {
            self.multiline_buffer.push('\n');
        }
        self.multiline_buffer.push_str(line);
        self.brace_balance += count_braces(line);

        if self.brace_balance > 0 {
            return None;
        }

        let code = std::mem::take(&mut self.multiline_buffer);
        self.brace_balance = 0;
        self.history.push(code.replace('\n', " "));
        self.execute(&code)
    }

    fn handle_command(&mut self, line: &str) -> Option<String> {
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            ".help" => Some(help_text()),
            ".globals" => Some(self.cmd_globals()),
            ".dis" if rest.is_empty() => Some("Usage: .dis <expr>".to_string()),
            ".dis" => Some(self.cmd_dis(rest)),
            ".history" => Some(self.cmd_history()),
            ".reset" => {
                let search_path = self.state.search_path.clone();
                let trace = self.state.trace;
                self.state = VmState::with_search_path(search_path);
                self.state.trace = trace;
                Some("Environment reset.".to_string())
            }
            _ => Some(format!(
                "Unknown command: {}. Type .help for available commands.",
                command
            )),
        }
    }

    fn cmd_globals(&self) -> String {
        let globals = self.state.globals();
        if globals.is_empty() {
            return "No globals defined.".to_string();
        }
        globals
            .iter()
            .map(|(name, value)| format!("  {} = {}", name.bold(), value.inspect()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn cmd_dis(&mut self, source: &str) -> String {
        match crate::compile(&mut self.state, source) {
            Ok(bytecode) => {
                disassemble_with_constants(&bytecode.instructions, &bytecode.constants)
                    .trim_end()
                    .to_string()
            }
            Err(e) => format_error(&e),
        }
    }

    fn cmd_history(&self) -> String {
        self.history
            .iter()
            .enumerate()
            .map(|(i, entry)| format!("{:4}  {}", i + 1, entry))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn execute(&mut self, code: &str) -> Option<String> {
        match crate::run(&mut self.state, code) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value.inspect()),
            Err(e) => {
                eprintln!("{}", self.highlighter.highlight(code).dimmed());
                Some(format_error(&e))
            }
        }
    }
}

fn format_error(error: &MonkeyError) -> String {
    format!("{} {}", "Error:".red().bold(), error)
}

fn help_text() -> String {
    [
        "",
        "monkey REPL commands",
        "",
        ".help          Show this help message",
        ".globals       List every global and its value",
        ".dis <expr>    Show the bytecode for an expression",
        ".history       Show input history",
        ".reset         Discard all definitions",
        ".exit          Leave the REPL (or Ctrl+D)",
        "",
        "Input continues over several lines while braces are open.",
    ]
    .join("\n")
}

/// Net number of open braces in `s`, ignoring string literals and comments.
fn count_braces(s: &str) -> i32 {
    let mut balance = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '#' => break,
            '/' if chars.peek() == Some(&'/') => break,
            '{' => balance += 1,
            '}' => balance -= 1,
            _ => {}
        }
    }
    balance
}

pub fn run_simple_repl(state: VmState) {
    SimpleRepl::new(state).run();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::SearchPath;

    fn repl() -> SimpleRepl {
        SimpleRepl {
            state: VmState::with_search_path(SearchPath::new(vec![])),
            history: Vec::new(),
            history_file: PathBuf::from(HISTORY_FILE),
            multiline_buffer: String::new(),
            brace_balance: 0,
            highlighter: SyntaxHighlighter::new(),
        }
    }

    #[test]
    fn test_count_braces() {
        assert_eq!(count_braces("f := fn(x) {"), 1);
        assert_eq!(count_braces("}}"), -2);
        assert_eq!(count_braces(r#"s := "{\"{""#), 0);
        assert_eq!(count_braces("x := 1 # {"), 0);
    }

    #[test]
    fn test_definitions_persist_between_lines() {
        let mut repl = repl();
        assert_eq!(repl.handle_line("x := 5"), None);
        assert_eq!(repl.handle_line("x * 2"), Some("10".to_string()));
        assert_eq!(repl.handle_line("\"hi\""), Some("\"hi\"".to_string()));
    }

    #[test]
    fn test_multiline_input() {
        let mut repl = repl();
        assert_eq!(repl.handle_line("add := fn(a, b) {"), None);
        assert!(repl.is_multiline());
        assert_eq!(repl.handle_line("  a + b"), None);
        assert_eq!(repl.handle_line("}"), None);
        assert!(!repl.is_multiline());
        assert_eq!(repl.handle_line("add(2, 3)"), Some("5".to_string()));
    }

    #[test]
    fn test_error_keeps_earlier_definitions() {
        let mut repl = repl();
        repl.handle_line("x := 1");
        let output = repl.handle_line("x / 0").unwrap();
        assert!(output.contains("division by zero"));
        assert_eq!(repl.handle_line("x"), Some("1".to_string()));
    }

    #[test]
    fn test_reset_clears_globals() {
        let mut repl = repl();
        repl.handle_line("x := 1");
        assert!(repl.handle_line(".globals").unwrap().contains("x"));
        repl.handle_line(".reset");
        assert_eq!(repl.handle_line(".globals"), Some("No globals defined.".to_string()));
    }

    #[test]
    fn test_dis_command() {
        let mut repl = repl();
        let output = repl.handle_line(".dis 1 + 2").unwrap();
        assert!(output.contains("Add"));
        assert!(repl.handle_line(".nope").unwrap().starts_with("Unknown command"));
    }
}
