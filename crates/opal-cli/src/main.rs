//! Opal command-line interface
//!
//! One binary drives the whole toolchain. A single mode flag selects how
//! far the pipeline runs: lex, parse, pretty-print, check, IR dump, or
//! (the default) full execution. Errors of any stage print one diagnostic
//! line to stderr and exit nonzero.

use anyhow::{Context, Result};
use clap::Parser;
use opal_checker::Checker;
use opal_compiler::CodeGenerator;
use opal_engine::Vm;
use opal_parser::{Lexer, Printer};
use std::fs;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "opal")]
#[command(about = "Opal programming language toolchain")]
#[command(version)]
struct Cli {
    /// Print the token stream and exit
    #[arg(long, group = "mode")]
    lex: bool,

    /// Parse only; silent on success
    #[arg(long, group = "mode")]
    parse: bool,

    /// Pretty-print the parsed program
    #[arg(long = "print", group = "mode")]
    print_source: bool,

    /// Parse and type-check only; silent on success
    #[arg(long, group = "mode")]
    check: bool,

    /// Dump the compiled frame templates as JSON
    #[arg(long, group = "mode")]
    ir: bool,

    /// Source file (standard input when omitted)
    file: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let source = read_source(cli.file.as_deref())?;

    if cli.lex {
        for token in Lexer::new(&source).tokenize()? {
            println!("{token}");
        }
        return Ok(());
    }

    let ast = opal_parser::Parser::new(&source)?.parse()?;
    if cli.parse {
        return Ok(());
    }
    if cli.print_source {
        print!("{}", Printer::print(&ast));
        return Ok(());
    }

    Checker::check(&ast)?;
    if cli.check {
        return Ok(());
    }

    let program = CodeGenerator::compile(&ast)?;
    if cli.ir {
        println!("{}", serde_json::to_string_pretty(&program)?);
        return Ok(());
    }

    let mut vm = Vm::new();
    vm.load_program(program);
    vm.run()?;
    Ok(())
}

fn read_source(file: Option<&std::path::Path>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("cannot read '{}'", path.display())),
        None => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("cannot read standard input")?;
            Ok(source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_mode_flags_are_exclusive() {
        assert!(Cli::try_parse_from(["opal", "--lex", "--check"]).is_err());
        assert!(Cli::try_parse_from(["opal", "--ir", "program.opl"]).is_ok());
        assert!(Cli::try_parse_from(["opal"]).is_ok());
    }
}
