//! # Compatibility Matrix
//!
//! Runs every writer against every reader, writers outer and readers inner,
//! one pair at a time. Each pair is two processes joined by a single pipe:
//! the writer's stdout becomes the reader's stdin. The driver waits for
//! both processes before starting the next pair and stops at the first
//! pair where either side exits non-zero.
//!
//! [`MatrixRunner`] spawns an external program (normally the `extcompat`
//! binary itself) for each side. [`run_in_process`] performs the same
//! checks without spawning, for tests and for callers that already hold
//! loaded variants.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};

use thiserror::Error;

use crate::error::EXIT_USAGE;
use crate::reader::{verify, ReadError, ReadReport};
use crate::writer::build_message;
use crate::Harness;

/// One writer/reader combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub writer: String,
    pub reader: String,
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.writer, self.reader)
    }
}

/// All combinations, writers outer.
pub fn pairs(writers: &[String], readers: &[String]) -> Vec<Pair> {
    writers
        .iter()
        .flat_map(|w| {
            readers.iter().map(move |r| Pair {
                writer: w.clone(),
                reader: r.clone(),
            })
        })
        .collect()
}

/// Which process of a pair failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Writer,
    Reader,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Writer => "writer",
            Self::Reader => "reader",
        })
    }
}

/// The pair that stopped the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairFailure {
    pub pair: Pair,
    pub side: Side,
    /// Process exit code; a process killed by a signal reports [`EXIT_USAGE`].
    pub code: u8,
}

/// Outcome of a matrix run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixSummary {
    pub passed: Vec<Pair>,
    pub failure: Option<PairFailure>,
    /// Pairs never started because an earlier pair failed.
    pub skipped: usize,
}

impl MatrixSummary {
    pub fn exit_code(&self) -> u8 {
        self.failure.as_ref().map_or(0, |f| f.code)
    }
}

/// Error that prevents a pair from running at all.
#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("failed to spawn {side} '{program}' for {pair}: {source}")]
    Spawn {
        pair: Pair,
        side: Side,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {side} of {pair}: {source}")]
    Wait {
        pair: Pair,
        side: Side,
        #[source]
        source: std::io::Error,
    },

    #[error("writer of {pair} has no stdout pipe")]
    MissingPipe { pair: Pair },
}

/// Spawns writer and reader processes for each pair.
#[derive(Debug, Clone)]
pub struct MatrixRunner {
    program: PathBuf,
    global_args: Vec<OsString>,
}

impl MatrixRunner {
    /// `program` must accept `write --variant <w>` and
    /// `read --variant <r> --writer <w> --quiet`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
        }
    }

    /// Arguments placed before the subcommand on both sides, e.g. `--config`.
    pub fn global_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.global_args.push(arg.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.global_args);
        cmd
    }

    fn spawn(&self, mut cmd: Command, pair: &Pair, side: Side) -> Result<Child, MatrixError> {
        cmd.spawn().map_err(|source| MatrixError::Spawn {
            pair: pair.clone(),
            side,
            program: self.program.display().to_string(),
            source,
        })
    }

    /// Run one pair. `Ok(None)` means both processes exited 0.
    pub fn run_pair(&self, pair: &Pair) -> Result<Option<PairFailure>, MatrixError> {
        let mut writer_cmd = self.command();
        writer_cmd
            .args(["write", "--variant", pair.writer.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let mut writer = self.spawn(writer_cmd, pair, Side::Writer)?;

        let Some(pipe) = writer.stdout.take() else {
            reap(&mut writer);
            return Err(MatrixError::MissingPipe { pair: pair.clone() });
        };

        let mut reader_cmd = self.command();
        reader_cmd
            .args([
                "read",
                "--variant",
                pair.reader.as_str(),
                "--writer",
                pair.writer.as_str(),
                "--quiet",
            ])
            .stdin(Stdio::from(pipe))
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        let mut reader = match self.spawn(reader_cmd, pair, Side::Reader) {
            Ok(child) => child,
            Err(e) => {
                reap(&mut writer);
                return Err(e);
            }
        };

        let reader_status = wait(&mut reader, pair, Side::Reader)?;
        let writer_status = wait(&mut writer, pair, Side::Writer)?;
        tracing::debug!(%pair, ?writer_status, ?reader_status, "pair finished");

        let failure = [(Side::Writer, writer_status), (Side::Reader, reader_status)]
            .into_iter()
            .find(|(_, status)| !status.success())
            .map(|(side, status)| PairFailure {
                pair: pair.clone(),
                side,
                code: exit_code(status),
            });
        Ok(failure)
    }

    /// Run `pairs` in order, stopping at the first failure.
    pub fn run(&self, pairs: &[Pair]) -> Result<MatrixSummary, MatrixError> {
        let mut summary = MatrixSummary::default();
        for (i, pair) in pairs.iter().enumerate() {
            match self.run_pair(pair)? {
                None => {
                    tracing::info!(%pair, "ok");
                    summary.passed.push(pair.clone());
                }
                Some(failure) => {
                    tracing::error!(%pair, side = %failure.side, code = failure.code, "pair failed");
                    summary.failure = Some(failure);
                    summary.skipped = pairs.len() - i - 1;
                    break;
                }
            }
        }
        Ok(summary)
    }
}

fn wait(child: &mut Child, pair: &Pair, side: Side) -> Result<ExitStatus, MatrixError> {
    child.wait().map_err(|source| MatrixError::Wait {
        pair: pair.clone(),
        side,
        source,
    })
}

/// Best-effort cleanup of a writer whose reader never started.
fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn exit_code(status: ExitStatus) -> u8 {
    match status.code() {
        Some(code) => u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(EXIT_USAGE),
        None => EXIT_USAGE,
    }
}

/// Run `pairs` without spawning processes. Stops at the first pair whose
/// reader fails and returns that pair with the error.
pub fn run_in_process(
    harness: &Harness,
    pairs: &[Pair],
) -> Result<Vec<(Pair, ReadReport)>, (Pair, ReadError)> {
    let mut reports = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let outcome = (|| -> Result<ReadReport, ReadError> {
            let writer = harness.variant(&pair.writer)?;
            let reader = harness.variant(&pair.reader)?;
            let bytes = build_message(&writer, harness.fixture())?.encode_to_vec();
            verify(&reader, harness.fixture(), &bytes, Some(&writer))
        })();
        match outcome {
            Ok(report) => reports.push((pair.clone(), report)),
            Err(e) => return Err((pair.clone(), e)),
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pairs_writers_outer() {
        let all = pairs(
            &names(&["generic", "ext1", "ext2"]),
            &names(&["generic", "ext1", "ext2", "both"]),
        );
        assert_eq!(all.len(), 12);
        let rendered: Vec<String> = all.iter().map(Pair::to_string).collect();
        assert_eq!(
            &rendered[..5],
            &["generic|generic", "generic|ext1", "generic|ext2", "generic|both", "ext1|generic"]
        );
        assert_eq!(rendered[11], "ext2|both");
    }

    #[test]
    fn test_summary_exit_code() {
        let mut summary = MatrixSummary::default();
        assert_eq!(summary.exit_code(), 0);
        summary.failure = Some(PairFailure {
            pair: Pair {
                writer: "ext1".into(),
                reader: "ext2".into(),
            },
            side: Side::Reader,
            code: 2,
        });
        assert_eq!(summary.exit_code(), 2);
    }

    #[test]
    fn test_spawn_failure_reported() {
        let runner = MatrixRunner::new("/nonexistent/extcompat-binary");
        let pair = Pair {
            writer: "generic".into(),
            reader: "generic".into(),
        };
        assert!(matches!(
            runner.run_pair(&pair),
            Err(MatrixError::Spawn {
                side: Side::Writer,
                ..
            })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_pipeline_stops_run() {
        // `false` ignores its arguments and exits 1 on both sides.
        let runner = MatrixRunner::new("false");
        let all = pairs(&names(&["a", "b"]), &names(&["x", "y"]));
        let summary = runner.run(&all).unwrap();
        assert!(summary.passed.is_empty());
        let failure = summary.failure.unwrap();
        assert_eq!(failure.pair.to_string(), "a|x");
        assert_eq!(failure.side, Side::Writer);
        assert_eq!(failure.code, 1);
        assert_eq!(summary.skipped, 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_passing_pipeline_runs_every_pair() {
        let runner = MatrixRunner::new("true");
        let all = pairs(&names(&["a", "b"]), &names(&["x", "y"]));
        let summary = runner.run(&all).unwrap();
        assert_eq!(summary.passed.len(), 4);
        assert!(summary.failure.is_none());
        assert_eq!(summary.exit_code(), 0);
    }
}
