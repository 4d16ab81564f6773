//! # Console
//!
//! Interactive telecommand entry. The console runs on its own thread and only forwards parsed TCs
//! to the main loop, so a slow typist never holds up a cycle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{
    sync::mpsc::Sender,
    thread::{self, JoinHandle},
};

use comms_if::tc::{Tc, TcParseError};
use log::{error, warn};
use rustyline::{error::ReadlineError, DefaultEditor};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PROMPT: &str = "plan $ ";

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Start the console thread, sending every parsed TC into `tx`.
///
/// Ctrl-C, Ctrl-D or a console failure send [`Tc::Exit`].
pub(crate) fn spawn(tx: Sender<Tc>) -> JoinHandle<()> {
    thread::spawn(move || run(tx))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn run(tx: Sender<Tc>) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            error!("Could not start the console: {}", e);
            tx.send(Tc::Exit).ok();
            return;
        }
    };

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok();

                match Tc::from_console_line(line) {
                    Ok(tc) => {
                        let exit = tc == Tc::Exit;

                        if tx.send(tc).is_err() || exit {
                            break;
                        }
                    }
                    // Help and usage text
                    Err(TcParseError::InvalidCommand(msg)) => println!("{}", msg),
                    Err(e) => warn!("{}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                tx.send(Tc::Exit).ok();
                break;
            }
            Err(e) => {
                error!("Console error: {}", e);
                tx.send(Tc::Exit).ok();
                break;
            }
        }
    }
}
