//! `srm [-p] [--step] <file.bof>` — the command-line front end: load a
//! BOF file, then either print its listing (`-p`) or run it to
//! completion, optionally pausing for Enter between traced steps
//! (`--step`).

use std::io::{self, Read, Write};
use std::process::ExitCode;

use clap::Parser;
use srm::error::SrmError;
use srm::loader;
use srm::tracer;
use srm::vm;

/// Interpreter for the fixed-width 32-bit stack-oriented machine.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Print the program listing and exit, instead of running it.
    #[arg(short = 'p', long = "print")]
    print_listing: bool,

    /// Pause for Enter between each traced instruction.
    #[arg(short = 's', long = "step")]
    step: bool,

    /// Path to the binary object file (.bof) to load.
    file: String,
}

fn press_enter_to_continue() {
    let mut stdout = io::stdout();
    write!(stdout, "Press enter to continue...").ok();
    stdout.flush().ok();
    io::stdin().read(&mut [0u8]).ok();
}

/// `Args::parse()` would call clap's own `Error::exit()` on a bad
/// invocation, terminating with clap's exit code 2 (or printing
/// help/version straight to stdout and exiting 0) instead of the
/// usage-error exit code 1 spec.md §6 mandates. `try_parse` lets us
/// keep clap's own message but fold a genuine parse failure into
/// `SrmError::Usage` so it exits the way every other fatal error does.
fn parse_args() -> Result<Args, SrmError> {
    match Args::try_parse() {
        Ok(args) => Ok(args),
        Err(clap_err) if clap_err.exit_code() == 0 => {
            print!("{clap_err}");
            std::process::exit(0);
        }
        Err(clap_err) => {
            eprint!("{clap_err}");
            Err(SrmError::Usage)
        }
    }
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("srm: {e}");
            return ExitCode::from(1);
        }
    };

    let mut vm = match loader::load(&args.file) {
        Ok(vm) => vm,
        Err(e) => {
            eprintln!("srm: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.print_listing {
        let stdout = io::stdout();
        tracer::print_program(&vm, &mut stdout.lock());
        return ExitCode::SUCCESS;
    }

    let stdout = io::stdout();
    let stdin = io::stdin();
    let on_step = |_vm: &vm::Vm| {
        if args.step {
            press_enter_to_continue();
        }
    };
    match vm::run_with(&mut vm, &mut stdout.lock(), &mut stdin.lock(), on_step) {
        Ok(status) => ExitCode::from(status as u8),
        Err(e) => {
            eprintln!("srm: {e}");
            ExitCode::FAILURE
        }
    }
}
