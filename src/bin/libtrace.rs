//! Library-call tracer front end: attaches to (or execs) a tracee, arms a
//! breakpoint on every resolved dynamic symbol, and reports each call
//! until the tracee exits.

use std::process::ExitCode;

use clap::Parser;
use nix::unistd::Pid;

use sherlock_dbg::error::{invalid_input, Result};
use sherlock_dbg::libcall::LibCallTracer;
use sherlock_dbg::tracee::Tracee;

#[derive(Parser)]
#[command(name = "libtrace", about = "Traces every dynamic library call made by a tracee")]
struct Cli {
    #[arg(long)]
    pid: Option<i32>,

    #[arg(long, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    exec: Vec<String>,

    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run(cli: Cli) -> Result<i32> {
    sherlock_dbg::logging::init(cli.verbose);

    let mut tracee = if let Some(pid) = cli.pid {
        Tracee::attach_pid(Pid::from_raw(pid))?
    } else if !cli.exec.is_empty() {
        Tracee::attach_exec(&cli.exec)?
    } else {
        return Err(invalid_input("one of --pid or --exec is required"));
    };

    tracee.setup_symbols()?;

    let mut tracer = LibCallTracer::new(tracee);
    tracer.arm_all()?;
    tracer.run_to_completion()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => {
            if code == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("libtrace: {}", e);
            ExitCode::FAILURE
        }
    }
}
