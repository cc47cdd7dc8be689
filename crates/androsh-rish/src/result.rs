use serde::Serialize;

/// Exit code used for results synthesized from transport failures.
pub const TRANSPORT_FAILURE_CODE: i32 = 1;

/// Outcome of one command dispatched through the privileged shell.
///
/// The merged output of the command lands in exactly one field: `stdout` when
/// `exit_code == 0`, `stderr` otherwise. Callers must check `exit_code` before
/// choosing which field to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Set only by [`CommandResult::transport_failure`]; the command never ran
    /// to completion, so `stderr` describes the channel, not the command.
    #[serde(skip)]
    transport: bool,
}

impl CommandResult {
    /// Route merged output according to the exit code.
    pub fn from_merged(output: String, exit_code: i32) -> Self {
        if exit_code == 0 {
            Self {
                stdout: output,
                stderr: String::new(),
                exit_code,
                transport: false,
            }
        } else {
            Self {
                stdout: String::new(),
                stderr: output,
                exit_code,
                transport: false,
            }
        }
    }

    /// Result standing in for a spawn error, timeout or undecodable output.
    pub fn transport_failure(description: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: description.into(),
            exit_code: TRANSPORT_FAILURE_CODE,
            transport: true,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Spawn error, timeout or undecodable output rather than a command status.
    pub fn is_transport_failure(&self) -> bool {
        self.transport
    }

    /// Whichever field carries the merged output.
    pub fn output(&self) -> &str {
        if self.success() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_routes_to_stdout() {
        let result = CommandResult::from_merged("hi\n".to_string(), 0);
        assert_eq!(result.stdout, "hi\n");
        assert!(result.stderr.is_empty());
        assert!(result.success());
    }

    #[test]
    fn nonzero_exit_routes_to_stderr() {
        let result = CommandResult::from_merged("boom".to_string(), 7);
        assert!(result.stdout.is_empty());
        assert_eq!(result.stderr, "boom");
        assert_eq!(result.output(), "boom");
    }

    #[test]
    fn transport_failure_is_nonzero() {
        let result = CommandResult::transport_failure("spawn failed");
        assert_eq!(result.exit_code, TRANSPORT_FAILURE_CODE);
        assert!(result.stdout.is_empty());
        assert_eq!(result.stderr, "spawn failed");
        assert!(result.is_transport_failure());
    }

    #[test]
    fn command_exiting_one_is_not_a_transport_failure() {
        let result = CommandResult::from_merged("rm: x: No such file or directory".to_string(), 1);
        assert_eq!(result.exit_code, TRANSPORT_FAILURE_CODE);
        assert!(!result.is_transport_failure());
    }
}
