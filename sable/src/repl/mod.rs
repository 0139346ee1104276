//! Interactive REPL
//!
//! Keeps a single interpreter alive across lines, so declarations and
//! imports accumulate the way they would in a script.

use crate::error;
use crate::interp::{Interpreter, Payload};
use crate::lexer::tokenize;
use crate::parser::parse;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::path::PathBuf;

const PROMPT: &str = "> ";
const HISTORY_FILE: &str = ".sable_history";

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    interpreter: Interpreter,
    history_path: Option<PathBuf>,
}

impl Repl {
    /// Create a new REPL
    pub fn new() -> RlResult<Self> {
        let editor = DefaultEditor::new()?;
        let mut interpreter = Interpreter::new();
        if let Ok(cwd) = std::env::current_dir() {
            interpreter.set_base_dir(cwd);
        }

        let history_path = dirs_home().map(|h| h.join(HISTORY_FILE));

        let mut repl = Repl {
            editor,
            interpreter,
            history_path,
        };

        if let Some(ref path) = repl.history_path {
            let _ = repl.editor.load_history(path);
        }

        Ok(repl)
    }

    /// Run the REPL
    pub fn run(&mut self) -> RlResult<()> {
        println!("Sable REPL");
        println!("Type :help for help, :quit to exit.\n");

        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    let _ = self.editor.add_history_entry(line);

                    if line.starts_with(':') {
                        if self.handle_command(line) {
                            break;
                        }
                        continue;
                    }

                    self.eval_source(line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        if let Some(ref path) = self.history_path {
            let _ = self.editor.save_history(path);
        }

        Ok(())
    }

    /// Handle REPL commands (starting with :); returns true to exit
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":quit" | ":q" | ":exit" => {
                println!("Goodbye!");
                true
            }
            ":help" | ":h" | ":?" => {
                self.print_help();
                false
            }
            ":clear" => {
                print!("\x1B[2J\x1B[1;1H");
                false
            }
            _ => {
                println!("Unknown command: {cmd}");
                println!("Type :help for help.");
                false
            }
        }
    }

    fn print_help(&self) {
        println!("Sable REPL Commands:");
        println!("  :help, :h, :?   Show this help");
        println!("  :quit, :q       Exit the REPL");
        println!("  :clear          Clear the screen");
        println!();
        println!("You can enter any statement or expression:");
        println!("  var x = 1 + 2;");
        println!("  func add(a, b) {{ return a + b; }}");
        println!("  add(x, 3);");
        println!();
        println!("A trailing semicolon is added for you when missing.");
    }

    /// Evaluate one line of input against the persistent interpreter
    fn eval_source(&mut self, line: &str) {
        // statements need a terminator; expressions usually get typed
        // without one
        let mut source = line.to_string();
        if !source.ends_with(';') && !source.ends_with('}') {
            source.push(';');
        }

        let tokens = match tokenize(&source) {
            Ok(tokens) => tokens,
            Err(err) => {
                error::report("<repl>", &source, &err);
                return;
            }
        };

        let program = match parse(&tokens) {
            Ok(program) => program,
            Err(err) => {
                error::report("<repl>", &source, &err);
                return;
            }
        };

        match self.interpreter.run_program(&program) {
            Ok(()) => {
                if let Some(value) = self.interpreter.take_last_value() {
                    let echo = !matches!(value.borrow().payload, Payload::Null);
                    if echo {
                        println!("{}", value.borrow());
                    }
                }
            }
            Err(err) => {
                error::report_runtime("<repl>", &source, &err);
                // a failed statement must not leave a stray break or
                // return flag behind
                self.interpreter.reset_control_flags();
            }
        }
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new().expect("Failed to create REPL")
    }
}

/// Get home directory
fn dirs_home() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_command_quit_variants() {
        let mut repl = Repl::new().unwrap();
        assert!(repl.handle_command(":quit"));
        assert!(repl.handle_command(":q"));
        assert!(repl.handle_command(":exit"));
    }

    #[test]
    fn test_handle_command_non_quit() {
        let mut repl = Repl::new().unwrap();
        assert!(!repl.handle_command(":help"));
        assert!(!repl.handle_command(":clear"));
        assert!(!repl.handle_command(":unknown"));
    }

    #[test]
    fn test_eval_source_expression() {
        let mut repl = Repl::new().unwrap();
        repl.eval_source("1 + 2");
    }

    #[test]
    fn test_eval_source_missing_semicolon_added() {
        let mut repl = Repl::new().unwrap();
        repl.eval_source("var x = 10");
        repl.eval_source("x * 2");
    }

    #[test]
    fn test_eval_source_survives_errors() {
        let mut repl = Repl::new().unwrap();
        repl.eval_source("@#$%");
        repl.eval_source("1 / 0");
        // interpreter still usable afterwards
        repl.eval_source("var ok = true");
    }

    #[test]
    fn test_declarations_accumulate() {
        let mut repl = Repl::new().unwrap();
        repl.eval_source("func square(n) { return n * n; }");
        repl.eval_source("square(6)");
    }

    #[test]
    fn test_history_path_named_after_language() {
        let repl = Repl::new().unwrap();
        let path = repl.history_path.unwrap();
        assert!(path.to_string_lossy().contains(".sable_history"));
    }

    #[test]
    fn test_dirs_home_returns_some() {
        assert!(dirs_home().is_some());
    }
}
