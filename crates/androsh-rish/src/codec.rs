//! Framing for the single merged text stream the loader hands back.
//!
//! A command travels as `( <command> ) 2>&1; echo <TOKEN>:$?`. The subshell
//! keeps `exit`, `exec` and `set -e` from ending the shell before the status
//! is echoed. The token is fresh per call so legitimate output that merely
//! looks like a status marker is never mistaken for it.

use rand::RngCore;
use rand::rngs::OsRng;

const TOKEN_PREFIX: &str = "ANDROSH_STATUS_";
const TOKEN_ENTROPY_BYTES: usize = 16;

/// Per-call sentinel separating command output from its exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusToken(String);

impl StatusToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(format!("{TOKEN_PREFIX}{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn marker(&self) -> String {
        format!("{}:", self.0)
    }
}

/// Output and status recovered from a framed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub output: String,
    pub exit_code: i32,
}

/// Frame `command` so its stderr is merged and its status trails the output.
///
/// The command sits on its own lines inside the subshell so a trailing
/// comment cannot swallow the closing parenthesis.
pub fn wrap(command: &str, token: &StatusToken) -> String {
    format!("(\n{command}\n) 2>&1; echo {}:$?", token.as_str())
}

/// Recover the command output and exit status from `merged`.
///
/// Only the last `<TOKEN>:` immediately followed by digits counts. Text before
/// it is returned verbatim; anything after the digits (late output from a
/// backgrounded child) is appended on its own line. Returns `None` when no
/// status marker is present, which callers must treat as a transport failure.
pub fn decode(merged: &str, token: &StatusToken) -> Option<Decoded> {
    let marker = token.marker();
    let (start, digits) = merged.rmatch_indices(marker.as_str()).find_map(|(idx, _)| {
        let tail = &merged[idx + marker.len()..];
        let digits = tail.bytes().take_while(u8::is_ascii_digit).count();
        (digits > 0).then_some((idx, digits))
    })?;

    let after = &merged[start + marker.len()..];
    let exit_code = after[..digits].parse::<i32>().ok()?;
    let before = &merged[..start];
    let rest = after[digits..].trim();

    let output = if rest.is_empty() {
        before.to_string()
    } else if before.is_empty() {
        rest.to_string()
    } else if before.ends_with('\n') {
        format!("{before}{rest}")
    } else {
        format!("{before}\n{rest}")
    };

    Some(Decoded { output, exit_code })
}
