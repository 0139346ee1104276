//! Sable Interpreter CLI

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sable", version, about = "Sable - a dynamic scripting language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Sable source file
    Run {
        /// Source file to run
        file: PathBuf,
    },
    /// Parse and dump AST (debug)
    Parse {
        /// Source file to parse
        file: PathBuf,
    },
    /// Tokenize and dump tokens (debug)
    Tokens {
        /// Source file to tokenize
        file: PathBuf,
    },
    /// Start an interactive session
    Repl,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { file } => run_file(&file),
        Command::Parse { file } => parse_file(&file),
        Command::Tokens { file } => tokenize_file(&file),
        Command::Repl => sable::repl::Repl::new()
            .and_then(|mut repl| repl.run())
            .map_err(|e| e.to_string().into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run_file(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();

    let tokens = match sable::lexer::tokenize(&source) {
        Ok(tokens) => tokens,
        Err(err) => {
            sable::error::report(&filename, &source, &err);
            std::process::exit(1);
        }
    };

    let program = match sable::parser::parse(&tokens) {
        Ok(program) => program,
        Err(err) => {
            sable::error::report(&filename, &source, &err);
            std::process::exit(1);
        }
    };

    let mut interpreter = sable::Interpreter::new();
    if let Some(dir) = path.parent() {
        interpreter.set_base_dir(dir.to_path_buf());
    }

    if let Err(err) = interpreter.run_program(&program) {
        sable::error::report_runtime(&filename, &source, &err);
        std::process::exit(1);
    }

    Ok(())
}

fn parse_file(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();

    let tokens = match sable::lexer::tokenize(&source) {
        Ok(tokens) => tokens,
        Err(err) => {
            sable::error::report(&filename, &source, &err);
            std::process::exit(1);
        }
    };

    let program = match sable::parser::parse(&tokens) {
        Ok(program) => program,
        Err(err) => {
            sable::error::report(&filename, &source, &err);
            std::process::exit(1);
        }
    };

    println!("{}", serde_json::to_string_pretty(&program)?);
    Ok(())
}

fn tokenize_file(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;

    let tokens = sable::lexer::tokenize(&source)?;
    for (tok, span) in &tokens {
        println!("{:?} @ {}..{}", tok, span.start, span.end);
    }

    Ok(())
}
