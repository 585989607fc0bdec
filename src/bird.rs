//! Bird config rendering and daemon reload.
//!
//! The daemon's measurement results are rendered into a bird-includable
//! snippet of `define` constants, one group per probed interface, and an
//! external reload command (typically `birdc configure`) is invoked so the
//! routing daemon picks up the new values. Reload failures are reported to
//! the caller and logged there; they are never fatal.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::stats::TestResult;

/// Failures while invoking the external reload command.
#[derive(Error, Debug)]
pub enum ReloadError {
    /// The command ran but exited non-zero.
    #[error("reload command exited with {0}")]
    CommandFailed(std::process::ExitStatus),

    /// The command could not be spawned at all.
    #[error("failed to run reload command: {0}")]
    Spawn(#[from] io::Error),
}

/// Renders per-interface results into bird config text.
///
/// Interfaces whose last cycle failed are rendered as a comment so the
/// output always names every configured interface. Interface names are
/// mangled into valid bird identifiers (`tun-rpi` becomes `tun_rpi`).
#[must_use]
pub fn render(results: &BTreeMap<String, Option<TestResult>>) -> String {
    let mut out = String::from("# generated by linkbird, do not edit\n");

    for (ifname, result) in results {
        match result {
            Some(r) => {
                let ident = sanitize(ifname);
                // bird defines take integer constants
                let _ = writeln!(out, "define {}_loss_pct = {};", ident, pct(r.loss));
                let _ = writeln!(out, "define {}_avg_ms = {};", ident, ms(r.avg_ms));
                let _ = writeln!(out, "define {}_max_ms = {};", ident, ms(r.max_ms));
                let _ = writeln!(out, "define {}_min_ms = {};", ident, ms(r.min_ms));
                let _ = writeln!(out, "define {}_stddev_ms = {};", ident, ms(r.stddev_ms));
            }
            None => {
                let _ = writeln!(out, "# {}: no data this cycle", ifname);
            }
        }
    }

    out
}

/// Writes the rendered config to `path`.
pub fn write_config(path: &Path, contents: &str) -> io::Result<()> {
    std::fs::write(path, contents)
}

/// Runs the configured reload command. An empty command is a no-op.
///
/// # Errors
/// `Spawn` if the process cannot start, `CommandFailed` on non-zero exit.
pub async fn reload(cmd: &[String]) -> Result<(), ReloadError> {
    let Some((program, args)) = cmd.split_first() else {
        return Ok(());
    };

    let status = tokio::process::Command::new(program)
        .args(args)
        .status()
        .await?;

    if status.success() {
        Ok(())
    } else {
        Err(ReloadError::CommandFailed(status))
    }
}

fn sanitize(ifname: &str) -> String {
    ifname
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn pct(loss: f64) -> i64 {
    (loss * 100.0).round().max(0.0) as i64
}

fn ms(value: f64) -> i64 {
    value.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> TestResult {
        TestResult::from_delays(5, &[10, 20, 30, 40]).unwrap()
    }

    #[test]
    fn renders_defines_per_interface() {
        let mut results = BTreeMap::new();
        results.insert("tun-rpi".to_string(), Some(result()));

        let out = render(&results);
        assert!(out.contains("define tun_rpi_loss_pct = 20;"));
        assert!(out.contains("define tun_rpi_avg_ms = 25;"));
        assert!(out.contains("define tun_rpi_max_ms = 40;"));
        assert!(out.contains("define tun_rpi_min_ms = 10;"));
        assert!(out.contains("define tun_rpi_stddev_ms = 11;"));
    }

    #[test]
    fn failed_cycle_renders_as_comment() {
        let mut results = BTreeMap::new();
        results.insert("tun-a".to_string(), None);
        results.insert("tun-b".to_string(), Some(result()));

        let out = render(&results);
        assert!(out.contains("# tun-a: no data this cycle"));
        assert!(out.contains("define tun_b_loss_pct"));
    }

    #[test]
    fn output_is_deterministic() {
        let mut results = BTreeMap::new();
        results.insert("b".to_string(), None);
        results.insert("a".to_string(), None);

        // BTreeMap ordering keeps the rendering stable between cycles
        let first = render(&results);
        let second = render(&results);
        assert_eq!(first, second);
        assert!(first.find("# a:").unwrap() < first.find("# b:").unwrap());
    }

    #[test]
    fn negative_loss_clamps_to_zero() {
        let mut results = BTreeMap::new();
        results.insert(
            "tun".to_string(),
            Some(TestResult::from_delays(3, &[5, 5, 5, 5]).unwrap()),
        );
        assert!(render(&results).contains("define tun_loss_pct = 0;"));
    }

    #[tokio::test]
    async fn empty_reload_command_is_noop() {
        assert!(reload(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn failing_reload_command_is_reported() {
        let cmd = vec!["false".to_string()];
        assert!(matches!(
            reload(&cmd).await,
            Err(ReloadError::CommandFailed(_))
        ));
    }

    #[tokio::test]
    async fn missing_reload_command_is_spawn_error() {
        let cmd = vec!["/no/such/binary".to_string()];
        assert!(matches!(reload(&cmd).await, Err(ReloadError::Spawn(_))));
    }
}
