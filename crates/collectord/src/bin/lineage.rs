//! Standalone lineage tool: render the ancestry of an arbitrary pid without
//! opening an incident. Useful for spot checks against a live system.
//!
//! Usage: ghosttrail-lineage [PID] [--dot]
//!
//! With no PID the tool walks its own ancestry. `--dot` emits the Graphviz
//! rendering instead of plain text.

use ghosttrail_collectord::{render_dot, render_text, LineageBuilder, ProcfsTable};
use std::process::ExitCode;
use std::sync::Arc;

fn usage() -> &'static str {
    "usage: ghosttrail-lineage [PID] [--dot]\n\
     \n\
     Walk the live process table from PID (default: this process) to the\n\
     root and print the chain. --dot emits Graphviz instead of plain text."
}

fn main() -> ExitCode {
    let mut pid: Option<u32> = None;
    let mut dot = false;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dot" => dot = true,
            "--help" | "-h" => {
                println!("{}", usage());
                return ExitCode::SUCCESS;
            }
            other => match other.parse::<u32>() {
                Ok(parsed) if pid.is_none() => pid = Some(parsed),
                _ => {
                    eprintln!("unrecognized argument: {}\n{}", other, usage());
                    return ExitCode::FAILURE;
                }
            },
        }
    }

    let pid = pid.unwrap_or_else(std::process::id);
    let builder = LineageBuilder::new(Arc::new(ProcfsTable::new()));
    let chain = builder.build(pid);

    if dot {
        print!("{}", render_dot(&chain));
    } else {
        print!("{}", render_text(&chain));
    }
    ExitCode::SUCCESS
}
