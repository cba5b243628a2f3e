use clap::Parser;
use rill::diagnostics::{emit_syntax_errors, report_io_error};
use rill::language::parser::parse_program;
use rill::runtime::Interpreter;
use std::{fs, path::PathBuf, process::ExitCode};

#[derive(Debug, Parser)]
#[command(name = "rill", version, about = "Rill language interpreter")]
struct Cli {
    /// Script to run; without one a banner is printed.
    #[arg(value_name = "SCRIPT")]
    script: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(path) = cli.script else {
        println!("Rill interpreter");
        println!("Usage: rill <script>");
        return ExitCode::SUCCESS;
    };

    let source = match fs::read_to_string(&path) {
        Ok(source) => source,
        Err(error) => {
            report_io_error(&path, &error);
            return ExitCode::FAILURE;
        }
    };

    match parse_program(&source) {
        Ok(statements) => {
            let mut interpreter = Interpreter::new();
            interpreter.interpret(&statements);
            ExitCode::SUCCESS
        }
        Err(errors) => {
            emit_syntax_errors(&path.display().to_string(), &source, &errors);
            ExitCode::FAILURE
        }
    }
}
