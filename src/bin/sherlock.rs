//! Interactive debugger front end: parses `--pid`/`--exec`, attaches,
//! installs `SIGINT`/`SIGTERM` handlers, then runs the prompt/dispatch
//! event loop.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use clap::Parser;
use nix::unistd::Pid;

use sherlock_dbg::dispatch;
use sherlock_dbg::error::Result;
use sherlock_dbg::prompt;
use sherlock_dbg::session::Session;
use sherlock_dbg::tracee::{Tracee, TraceeState};

#[derive(Parser)]
#[command(
    name = "sherlock",
    about = "A minimal interactive debugger for a single Linux x86-64 tracee"
)]
struct Cli {
    /// Attach to an already-running process. Wins over --exec if both are given.
    #[arg(long)]
    pid: Option<i32>,

    /// Launch and attach to a fresh program: --exec PROGRAM [ARGS...]
    #[arg(long, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    exec: Vec<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

static TRACEE_PID: AtomicI32 = AtomicI32::new(0);
static ATTACHED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    if ATTACHED.load(Ordering::SeqCst) {
        let pid = TRACEE_PID.load(Ordering::SeqCst);
        unsafe {
            libc::kill(pid, libc::SIGINT);
        }
    } else {
        std::process::exit(1);
    }
}

extern "C" fn on_sigterm(_: libc::c_int) {
    std::process::exit(0);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, on_sigint as usize);
        libc::signal(libc::SIGTERM, on_sigterm as usize);
    }
}

fn setup_tracee(cli: &Cli) -> Result<Tracee> {
    if let Some(pid) = cli.pid {
        if pid <= 0 {
            return Err(sherlock_dbg::error::invalid_input("--pid must be a positive integer"));
        }
        return Tracee::attach_pid(Pid::from_raw(pid));
    }

    if !cli.exec.is_empty() {
        return Tracee::attach_exec(&cli.exec);
    }

    Err(sherlock_dbg::error::invalid_input(
        "one of --pid or --exec is required (sudo sherlock --pid PID | sherlock --exec program [args])",
    ))
}

fn run(cli: Cli) -> Result<()> {
    sherlock_dbg::logging::init(cli.verbose);

    let mut tracee = setup_tracee(&cli)?;
    TRACEE_PID.store(tracee.pid.as_raw(), Ordering::SeqCst);
    ATTACHED.store(true, Ordering::SeqCst);
    install_signal_handlers();

    if let Err(e) = tracee.setup_symbols() {
        log::error!("error setting up symbols, continuing with a partial symbol table: {}", e);
    }

    let mut session = Session::new(tracee)?;

    loop {
        let line = match prompt::read_line(prompt::PROMPT)? {
            Some(l) => l,
            None => return Ok(()),
        };
        if line.trim().is_empty() {
            continue;
        }

        let mut state = dispatch::dispatch(&mut session, &line)?;
        loop {
            match state {
                TraceeState::Running => {
                    state = session.tracee.wait_event()?;
                }
                TraceeState::Stopped => break,
                TraceeState::Killed => {
                    log::info!("tracee killed");
                    return Ok(());
                }
                TraceeState::Exited(code) => {
                    log::info!("tracee exited with code {}", code);
                    return Ok(());
                }
                TraceeState::Err => {
                    return Err(sherlock_dbg::error::err("tracee entered an unrecoverable error state"));
                }
            }
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sherlock: {}", e);
            ExitCode::FAILURE
        }
    }
}
