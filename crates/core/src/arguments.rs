//! ansible command line options accepted as run variables.
//!
//! Run variables (template `vars`, periodic task variables, per-call
//! options) map one-to-one onto long command line options of `ansible` and
//! `ansible-playbook`. Unknown keys are rejected up front instead of
//! failing inside the subprocess.

use crate::error::CoreError;
use crate::execution::ExecutionKind;
use crate::variables::{parse_bool, Variables};

/// How an option value is passed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// `--name value`.
    Value,
    /// `--name value`, value must be a non-negative integer.
    Integer,
    /// `--name` when the value is truthy, omitted otherwise.
    Flag,
    /// `-v` repeated `value` times.
    Verbosity,
}

/// Options valid for both `ansible` and `ansible-playbook`.
const COMMON_ARGS: &[(&str, ArgKind)] = &[
    ("become", ArgKind::Flag),
    ("become-method", ArgKind::Value),
    ("become-user", ArgKind::Value),
    ("check", ArgKind::Flag),
    ("connection", ArgKind::Value),
    ("diff", ArgKind::Flag),
    ("extra-vars", ArgKind::Value),
    ("forks", ArgKind::Integer),
    ("key-file", ArgKind::Value),
    ("limit", ArgKind::Value),
    ("list-hosts", ArgKind::Flag),
    ("module-path", ArgKind::Value),
    ("new-vault-password-file", ArgKind::Value),
    ("private-key", ArgKind::Value),
    ("scp-extra-args", ArgKind::Value),
    ("sftp-extra-args", ArgKind::Value),
    ("ssh-common-args", ArgKind::Value),
    ("ssh-extra-args", ArgKind::Value),
    ("syntax-check", ArgKind::Flag),
    ("timeout", ArgKind::Integer),
    ("user", ArgKind::Value),
    ("vault-id", ArgKind::Value),
    ("vault-password-file", ArgKind::Value),
    ("verbose", ArgKind::Verbosity),
];

/// Options only `ansible-playbook` understands.
const PLAYBOOK_ARGS: &[(&str, ArgKind)] = &[
    ("flush-cache", ArgKind::Flag),
    ("force-handlers", ArgKind::Flag),
    ("list-tags", ArgKind::Flag),
    ("list-tasks", ArgKind::Flag),
    ("skip-tags", ArgKind::Value),
    ("start-at-task", ArgKind::Value),
    ("tags", ArgKind::Value),
];

/// Options only `ansible` (ad hoc module runs) understands.
const MODULE_ARGS: &[(&str, ArgKind)] = &[
    ("background", ArgKind::Integer),
    ("one-line", ArgKind::Flag),
    ("playbook-dir", ArgKind::Value),
    ("poll", ArgKind::Integer),
    ("tree", ArgKind::Value),
];

/// Maximum verbosity level (`-vvvv`).
const MAX_VERBOSITY: usize = 4;

/// Look up how `name` is passed for a given run kind.
pub fn arg_kind(kind: ExecutionKind, name: &str) -> Option<ArgKind> {
    let specific = match kind {
        ExecutionKind::Playbook => PLAYBOOK_ARGS,
        ExecutionKind::Module => MODULE_ARGS,
    };
    COMMON_ARGS
        .iter()
        .chain(specific.iter())
        .find(|(n, _)| *n == name)
        .map(|(_, k)| *k)
}

/// Validate run variables against the option table of `kind`.
pub fn validate_args(kind: ExecutionKind, vars: &Variables) -> Result<(), CoreError> {
    let subject = match kind {
        ExecutionKind::Playbook => "playbook",
        ExecutionKind::Module => "module",
    };
    for (name, value) in vars {
        let arg = arg_kind(kind, name).ok_or_else(|| {
            CoreError::Validation(format!(
                "Incorrect argument: '{name}' is not a valid {subject} argument"
            ))
        })?;
        match arg {
            ArgKind::Integer => {
                if value.trim().parse::<u64>().is_err() {
                    return Err(CoreError::Validation(format!(
                        "Incorrect argument: '{name}' expects an integer, got '{value}'"
                    )));
                }
            }
            ArgKind::Verbosity => match value.trim().parse::<usize>() {
                Ok(level) if level <= MAX_VERBOSITY => {}
                _ => {
                    return Err(CoreError::Validation(format!(
                        "Incorrect argument: '{name}' must be between 0 and {MAX_VERBOSITY}"
                    )))
                }
            },
            ArgKind::Value | ArgKind::Flag => {}
        }
    }
    Ok(())
}

/// Render validated run variables as command line arguments.
pub fn to_cli_args(kind: ExecutionKind, vars: &Variables) -> Result<Vec<String>, CoreError> {
    validate_args(kind, vars)?;
    let mut args = Vec::with_capacity(vars.len() * 2);
    for (name, value) in vars {
        // Presence was checked by `validate_args`.
        let Some(arg) = arg_kind(kind, name) else {
            continue;
        };
        match arg {
            ArgKind::Value | ArgKind::Integer => {
                args.push(format!("--{name}"));
                args.push(value.trim().to_string());
            }
            ArgKind::Flag => {
                if parse_bool(value) {
                    args.push(format!("--{name}"));
                }
            }
            ArgKind::Verbosity => {
                let level = value.trim().parse::<usize>().unwrap_or(0);
                if level > 0 {
                    args.push(format!("-{}", "v".repeat(level)));
                }
            }
        }
    }
    Ok(args)
}
