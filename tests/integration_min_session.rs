// Drives the compiled binary through a PTY: start a run, abandon it, quit.
//
// Notes:
// - Requires a TTY; uses expectrl which allocates a pseudo terminal.
// - Unix-only and ignored by default.
// - Run manually via: `cargo test --test integration_min_session -- --ignored`.

#![cfg(unix)]

use std::time::Duration;

use expectrl::{spawn, Eof};

#[test]
#[ignore]
fn minimal_session_starts_and_exits() -> Result<(), Box<dyn std::error::Error>> {
    let bin = assert_cmd::cargo::cargo_bin("quantprep");
    let cmd = format!("{} --user pty --no-history", bin.display());

    let mut p = spawn(cmd)?;
    std::thread::sleep(Duration::from_millis(200));

    // enter starts the countdown, a stray digit lands in the answer box
    p.send("\r")?;
    std::thread::sleep(Duration::from_millis(200));
    p.send("1")?;
    std::thread::sleep(Duration::from_millis(200));

    // first ESC abandons the run, second quits from the menu
    p.send("\x1b")?;
    std::thread::sleep(Duration::from_millis(200));
    p.send("\x1b")?;

    p.expect(Eof)?;
    Ok(())
}
