//! Minimal launcher for the Talon debugger core.
//!
//! Runs (or attaches to) a target, resumes it, and reports every stop
//! until it goes away. The interactive front-end lives elsewhere; this
//! binary exists to exercise the core end to end.

use std::process::exit;

use talon_core::process::ProcessState;
use talon_core::{Target, TrapType};
use talon_utils::init_logging;

fn print_usage() -> !
{
    eprintln!("usage: talon <program>");
    eprintln!("       talon -p <pid>");
    exit(1);
}

fn main()
{
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {e}");
        exit(1);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let target = match args.as_slice() {
        [flag, pid] if flag == "-p" => {
            let pid = pid.parse::<i32>().unwrap_or_else(|_| print_usage());
            Target::attach(pid)
        }
        [program] => Target::launch(program, None),
        _ => print_usage(),
    };

    let mut target = match target {
        Ok(target) => target,
        Err(e) => {
            eprintln!("talon: {e}");
            exit(1);
        }
    };

    tracing::info!(pid = target.process().pid().as_raw(), "target stopped at entry");

    loop {
        if let Err(e) = target.resume() {
            eprintln!("talon: {e}");
            exit(1);
        }
        match target.wait_on_signal() {
            Ok(reason) => match reason.state() {
                ProcessState::Exited => {
                    tracing::info!(status = reason.exit_status(), "target exited");
                    break;
                }
                ProcessState::Terminated => {
                    tracing::info!(signal = ?reason.signal(), "target terminated");
                    break;
                }
                ProcessState::Stopped => {
                    let pc = target.process().get_pc().ok();
                    let location = pc
                        .and_then(|pc| target.function_name_at_address(pc).ok().flatten())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    match reason.trap_type() {
                        Some(TrapType::Syscall) => {
                            tracing::info!(?pc, syscall = ?reason.syscall_info(), "syscall stop")
                        }
                        trap => {
                            tracing::info!(?pc, ?trap, signal = ?reason.signal(), function = %location, "target stopped")
                        }
                    }
                }
                ProcessState::Running => {}
            },
            Err(e) => {
                eprintln!("talon: {e}");
                exit(1);
            }
        }
    }
}
