//! Syscall tracer front end: attaches to (or execs) a tracee and reports
//! every syscall entry/exit until the tracee exits.

use std::process::ExitCode;

use clap::Parser;
use nix::unistd::Pid;

use sherlock_dbg::error::{invalid_input, Result};
use sherlock_dbg::syscall_trace::SyscallTracer;
use sherlock_dbg::tracee::Tracee;

#[derive(Parser)]
#[command(name = "synctrace", about = "Traces every syscall made by a tracee")]
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

    let tracee = if let Some(pid) = cli.pid {
        Tracee::attach_pid(Pid::from_raw(pid))?
    } else if !cli.exec.is_empty() {
        Tracee::attach_exec(&cli.exec)?
    } else {
        return Err(invalid_input("one of --pid or --exec is required"));
    };

    let mut tracer = SyscallTracer::new(&tracee)?;
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
            eprintln!("synctrace: {}", e);
            ExitCode::FAILURE
        }
    }
}
