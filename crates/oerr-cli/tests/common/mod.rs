#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use std::time::Duration;

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an `oerr` command isolated from the caller's environment.
#[allow(dead_code)]
pub fn oerr_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("oerr"));
    cmd.timeout(CMD_TIMEOUT);
    cmd.env_remove("OERR_DB");
    cmd.env_remove("OERR_HOME");
    cmd
}
