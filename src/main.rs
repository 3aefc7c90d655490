//! lisp CLI entry point
//!
//! Runs program files, command-line text or the interactive console through
//! the REPL, or through the Read-Eval-Read-Compare checker with `--test`.

use std::fs::File;
use std::io::{self, BufReader, IsTerminal};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{Level, debug};
use tracing_subscriber::EnvFilter;

use lisp::builtinops::build_global_environment;
use lisp::evaluator::{Environment, TRACE_TARGET};
use lisp::repl::repl;
use lisp::rerc::rerc;
use lisp::scan::{ConsoleReader, ReaderSource, Scanner, TokenStream};

/// A small Scheme-like interpreter with a self-testing mode
#[derive(Parser, Debug)]
#[command(name = "lisp", version, about)]
struct Args {
    /// Run the positional arguments, joined by spaces, as program text
    #[arg(short = 'e', long = "execute")]
    execute: bool,

    /// Check expression / expected-value pairs instead of printing results
    #[arg(long)]
    test: bool,

    /// Console prompt
    #[arg(long, default_value = "> ")]
    prompt: String,

    /// Console prompt while a list is still open
    #[arg(long, default_value = "? ")]
    prompt2: String,

    /// Log every evaluation step to stderr
    #[arg(long)]
    trace: bool,

    /// Program files, run in order in one shared environment; `-` is the console
    #[arg(value_name = "FILE")]
    files: Vec<String>,
}

/// Options shared by every input of one invocation
#[derive(Debug, Clone)]
struct RunConfig {
    test: bool,
    prompt: String,
    prompt2: String,
}

enum Input<'a> {
    Text(String),
    File(&'a str),
    Console,
    Stdin,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = init_logging(args.trace) {
        eprintln!("error: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(trace: bool) -> Result<()> {
    let mut filter = EnvFilter::from_default_env().add_directive(Level::WARN.into());
    if trace {
        filter = filter.add_directive(format!("{TRACE_TARGET}=trace").parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .init();
    Ok(())
}

/// Interpreter errors hold garbage-collected values, so they cross into
/// `anyhow` as text
fn interpreter_error(err: lisp::Error) -> anyhow::Error {
    anyhow!("{err}")
}

/// Run every input in order; `Ok(false)` when a Rerc check failed.
///
/// An error ends the run at that input. Rerc mismatches only mark the run as
/// failed, so later inputs are still checked.
fn run(args: &Args) -> Result<bool> {
    let config = RunConfig {
        test: args.test,
        prompt: args.prompt.clone(),
        prompt2: args.prompt2.clone(),
    };

    let inputs: Vec<Input<'_>> = if args.execute {
        vec![Input::Text(args.files.join(" "))]
    } else if args.files.is_empty() {
        if io::stdin().is_terminal() {
            vec![Input::Console]
        } else {
            vec![Input::Stdin]
        }
    } else {
        args.files
            .iter()
            .map(|file| {
                if file == "-" {
                    Input::Console
                } else {
                    Input::File(file)
                }
            })
            .collect()
    };

    let env = build_global_environment().map_err(interpreter_error)?;

    let mut passed = true;
    for input in &inputs {
        passed &= run_input(input, &env, &config)?;
    }
    Ok(passed)
}

fn run_input(input: &Input<'_>, env: &Environment, config: &RunConfig) -> Result<bool> {
    match input {
        Input::Text(text) => {
            debug!("running command-line text");
            run_tokens(&mut Scanner::from_str("<command line>", text), env, config, false)
        }
        Input::File(path) => {
            debug!("running {path}");
            let file = File::open(path).with_context(|| format!("cannot open {path}"))?;
            let mut scanner = Scanner::new(*path, ReaderSource::new(BufReader::new(file)));
            run_tokens(&mut scanner, env, config, false)
                .with_context(|| format!("while running {path}"))
        }
        Input::Console => {
            let console = ConsoleReader::new(config.prompt.clone(), config.prompt2.clone())
                .map_err(|err| anyhow!("cannot start the console: {err}"))?;
            run_tokens(&mut Scanner::new("<console>", console), env, config, true)
        }
        Input::Stdin => {
            let stdin = io::stdin().lock();
            run_tokens(&mut Scanner::new("<stdin>", ReaderSource::new(stdin)), env, config, false)
        }
    }
}

fn run_tokens<T: TokenStream>(
    tokens: &mut T,
    env: &Environment,
    config: &RunConfig,
    interactive: bool,
) -> Result<bool> {
    let mut out = io::stdout().lock();

    if config.test {
        let report = rerc(tokens, env, &mut out).map_err(interpreter_error)?;
        if let Some(err) = report.error {
            return Err(interpreter_error(err));
        }
        if report.failures > 0 {
            eprintln!("{} of {} checks failed", report.failures, report.checked);
        }
        Ok(report.failures == 0)
    } else {
        repl(tokens, env, interactive, &mut out).map_err(interpreter_error)?;
        Ok(true)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn script_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("lisp-{}-{name}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("lisp").chain(argv.iter().copied()))
    }

    #[test]
    fn test_rerc_mismatch_does_not_stop_later_files() {
        let mismatch = script_file("mismatch.scm", "(define x 2) ---\n(+ x 1) 4\n");
        let passing = script_file("passing.scm", "(* x 10) 20\n");
        let broken = script_file("broken.scm", "x 2\n)\n");
        let (mismatch, passing, broken) = (
            mismatch.to_str().unwrap(),
            passing.to_str().unwrap(),
            broken.to_str().unwrap(),
        );

        // one mismatch fails the whole invocation
        assert!(!run(&args(&["--test", mismatch, passing])).unwrap());
        // on its own, `passing` has no definition of x to see
        assert!(!run(&args(&["--test", passing])).unwrap());

        // a later file still runs after a mismatch, and its error ends the run
        let err = run(&args(&["--test", mismatch, broken])).unwrap_err();
        assert!(format!("{err:#}").contains(&format!("while running {broken}")), "{err:#}");

        for path in [mismatch, passing, broken] {
            fs::remove_file(path).unwrap();
        }
    }

    #[test]
    fn test_execute_joins_arguments() {
        assert!(run(&args(&["--test", "-e", "(+ 1 2)", "3"])).unwrap());
        assert!(!run(&args(&["--test", "-e", "(+ 1 2)", "4"])).unwrap());
        assert!(run(&args(&["-e", "(car", "5)"])).is_err());
    }
}
