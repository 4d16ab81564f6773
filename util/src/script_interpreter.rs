//! # Script interpreter module
//!
//! This module provides an interpreter for planner scripts, allowing telecommands to be executed
//! at fixed times. Each command is a line of the form
//!
//! ```text
//! <exec time in seconds>: <json telecommand>;
//! ```
//!
//! Anything not matching this form (for example comments) is ignored.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use regex::RegexBuilder;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal
use crate::session::get_elapsed_seconds;
use comms_if::tc::{Tc, TcParseError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const LINE_PATTERN: &str = r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command which is scripted to occur at a specific time.
struct Command {
    exec_time_s: f64,
    tc: Tc,
}

/// A script interpreter.
///
/// After initialising with the path to the script to run use `.get_pending_tcs` to
/// acquire a list of telecommands that need executing.
pub struct ScriptInterpreter {
    script_path: Option<PathBuf>,
    cmds: VecDeque<Command>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error("Script contains an invalid timestamp: {0}. Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Script contains an invalid TC at {0} s: {1}")]
    InvalidTc(f64, TcParseError),

    #[error("Could not build the script pattern: {0}")]
    PatternError(regex::Error),
}

#[derive(Debug, PartialEq)]
pub enum PendingTcs {
    None,
    Some(Vec<Tc>),
    EndOfScript,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {
    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        let path = PathBuf::from(script_path.as_ref());

        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path));
        }

        let script = fs::read_to_string(&path).map_err(ScriptError::ScriptLoadError)?;

        let mut interp = Self::from_script_str(&script)?;
        interp.script_path = Some(path);

        Ok(interp)
    }

    /// Create a new interpreter from the contents of a script.
    pub fn from_script_str(script: &str) -> Result<Self, ScriptError> {
        let re = RegexBuilder::new(LINE_PATTERN)
            .multi_line(true)
            .build()
            .map_err(ScriptError::PatternError)?;

        let mut cmds = VecDeque::new();

        for cap in re.captures_iter(script) {
            let exec_time_s: f64 = cap[1]
                .parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            let tc = Tc::from_json(&cap[3]).map_err(|e| ScriptError::InvalidTc(exec_time_s, e))?;

            cmds.push_back(Command { exec_time_s, tc });
        }

        if cmds.is_empty() {
            return Err(ScriptError::ScriptEmpty);
        }

        // Scripts are not required to be written in order
        cmds.make_contiguous()
            .sort_by(|a, b| a.exec_time_s.total_cmp(&b.exec_time_s));

        Ok(ScriptInterpreter {
            script_path: None,
            cmds,
        })
    }

    /// Return the TCs which are due at the current session time.
    pub fn get_pending_tcs(&mut self) -> PendingTcs {
        self.get_pending_tcs_at(get_elapsed_seconds())
    }

    /// Return the TCs which are due at the given time.
    pub fn get_pending_tcs_at(&mut self, current_time_s: f64) -> PendingTcs {
        if self.cmds.is_empty() {
            return PendingTcs::EndOfScript;
        }

        let mut tc_vec: Vec<Tc> = vec![];

        while let Some(cmd) = self.cmds.front() {
            if cmd.exec_time_s > current_time_s {
                break;
            }
            if let Some(cmd) = self.cmds.pop_front() {
                tc_vec.push(cmd.tc);
            }
        }

        if tc_vec.is_empty() {
            PendingTcs::None
        } else {
            PendingTcs::Some(tc_vec)
        }
    }

    /// Get the number of TCs remaining in the script
    pub fn get_num_tcs(&self) -> usize {
        self.cmds.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        self.cmds.back().map(|c| c.exec_time_s).unwrap_or(0.0)
    }

    /// Path the script was loaded from, if any.
    pub fn script_path(&self) -> Option<&Path> {
        self.script_path.as_deref()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const SCRIPT: &str = r#"
        # Build a small scene then fly it
        0.0: {"set_final_time": {"final_time_s": 6.0}};
        0.5: {"add": {"ellipse": {"x": 100, "y": -100, "radius": 30}}};
        2.0: "execute";
        1.0: "recompute";
    "#;

    #[test]
    fn test_pending_tcs() {
        let mut interp = ScriptInterpreter::from_script_str(SCRIPT).unwrap();

        assert_eq!(interp.get_num_tcs(), 4);
        assert_eq!(interp.get_duration(), 2.0);
        assert!(interp.script_path().is_none());

        assert_eq!(
            interp.get_pending_tcs_at(0.1),
            PendingTcs::Some(vec![Tc::SetFinalTime { final_time_s: 6.0 }])
        );
        assert_eq!(interp.get_pending_tcs_at(0.2), PendingTcs::None);

        match interp.get_pending_tcs_at(1.5) {
            PendingTcs::Some(tcs) => {
                assert_eq!(tcs.len(), 2);
                assert_eq!(tcs[1], Tc::Recompute);
            }
            p => panic!("Expected two TCs, got {:?}", p),
        }

        assert_eq!(
            interp.get_pending_tcs_at(2.0),
            PendingTcs::Some(vec![Tc::Execute])
        );
        assert_eq!(interp.get_pending_tcs_at(10.0), PendingTcs::EndOfScript);
    }

    #[test]
    fn test_bad_scripts() {
        assert!(matches!(
            ScriptInterpreter::from_script_str("nothing to see here"),
            Err(ScriptError::ScriptEmpty)
        ));
        assert!(matches!(
            ScriptInterpreter::from_script_str("1.0: {\"launch\": 3};"),
            Err(ScriptError::InvalidTc(t, _)) if t == 1.0
        ));
        assert!(matches!(
            ScriptInterpreter::new("/definitely/not/a/script.txt"),
            Err(ScriptError::ScriptNotFound(_))
        ));
    }
}
