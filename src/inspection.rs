//! Traceback inspection.
//!
//! Runs a Python script to capture the traceback it dies with, then pulls
//! out the pieces the rest of the pipeline needs: the message, the error
//! type, and the source line the interpreter pointed at.

use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::errors::ErrorKind;

/// Interpreters tried in order when running the user's script.
const PYTHON_INTERPRETERS: [&str; 2] = ["python3", "python"];

/// How long a diagnosed script may run before we give up on it.
const SCRIPT_TIMEOUT_SECS: u64 = 30;

/// Everything the classifier and the adapter need to know about one error.
#[derive(Debug, Clone)]
pub struct ErrorDescription {
    pub traceback: String,
    pub message: String,
    pub kind: ErrorKind,
    pub line: usize,
    pub file: PathBuf,
    pub code: String,
    pub offending_line: String,
}

impl ErrorDescription {
    /// Build a description from a raw traceback, reading the named script
    /// off disk. Fails when any piece the pipeline needs is missing, since
    /// nothing downstream can work without a complete description.
    pub fn from_traceback(traceback: &str) -> Result<Self> {
        let message = error_message(traceback)
            .context("traceback has no error message")?
            .to_string();

        let name = message.split(':').next().unwrap_or("").trim();
        let kind = ErrorKind::from_name(name)
            .with_context(|| format!("unrecognized error type {name:?}"))?;

        let (file, line) =
            file_and_line(traceback).context("traceback names no file and line")?;

        let code = fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;

        // The interpreter counts lines from 1. A line number past the end
        // of the file happens with stale tracebacks; blame the last line.
        let offending_line = code
            .lines()
            .nth(line.saturating_sub(1))
            .or_else(|| code.lines().last())
            .context("script file is empty")?
            .to_string();

        Ok(Self {
            traceback: traceback.to_string(),
            message,
            kind,
            line,
            file,
            code,
            offending_line,
        })
    }
}

/// The error message is the last non-blank line of a traceback.
fn error_message(traceback: &str) -> Option<&str> {
    traceback.trim_end().lines().last()
}

/// File and line from the first `File "...", line N` header. Chained
/// tracebacks repeat the header; the first one names the user's own frame.
fn file_and_line(traceback: &str) -> Option<(PathBuf, usize)> {
    let header = Regex::new(r#"File "(.+?)", line (\d+)"#).unwrap();
    let caps = header.captures(traceback)?;
    let line = caps[2].parse().ok()?;
    Some((PathBuf::from(&caps[1]), line))
}

struct ScriptRun {
    stderr: String,
    timed_out: bool,
}

/// Run a Python script and capture the traceback it dies with. `Ok(None)`
/// means the script ran without writing to stderr.
pub fn capture_traceback(script: &Path) -> Result<Option<String>> {
    for interpreter in PYTHON_INTERPRETERS {
        let run = match run_script(interpreter, script) {
            Ok(run) => run,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to run {interpreter}"));
            }
        };
        if run.timed_out {
            bail!(
                "{} is still running after {SCRIPT_TIMEOUT_SECS}s, giving up",
                script.display()
            );
        }
        let stderr = run.stderr.trim_end();
        if stderr.is_empty() {
            return Ok(None);
        }
        return Ok(Some(stderr.to_string()));
    }
    bail!("no Python interpreter on PATH (tried python3 and python)")
}

fn run_script(interpreter: &str, script: &Path) -> std::io::Result<ScriptRun> {
    let mut child = Command::new(interpreter)
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("failed to capture stderr"))?;

    // Drain stderr on a separate thread so a chatty script cannot fill the
    // pipe and deadlock against our wait loop.
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        let mut reader = BufReader::new(stderr);
        let _ = reader.read_to_end(&mut buf);
        buf
    });

    let timeout = Duration::from_secs(SCRIPT_TIMEOUT_SECS);
    let start = Instant::now();
    let mut timed_out = false;
    loop {
        match child.try_wait()? {
            Some(_) => break,
            None => {
                if start.elapsed() >= timeout {
                    timed_out = true;
                    let _ = child.kill();
                    let _ = child.wait();
                    break;
                }
                thread::sleep(Duration::from_millis(50));
            }
        }
    }

    let stderr_bytes = reader.join().unwrap_or_default();
    Ok(ScriptRun {
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        timed_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn module_not_found_traceback(script: &Path) -> String {
        format!(
            "Traceback (most recent call last):\n  File \"{}\", line 2, in <module>\n    import kivy\nModuleNotFoundError: No module named 'kivy'",
            script.display()
        )
    }

    #[test]
    fn from_traceback_extracts_every_field() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("error_code.py");
        fs::write(&script, "import os\nimport kivy\n").unwrap();

        let traceback = module_not_found_traceback(&script);
        let description = ErrorDescription::from_traceback(&traceback).unwrap();

        assert_eq!(description.traceback, traceback);
        assert_eq!(
            description.message,
            "ModuleNotFoundError: No module named 'kivy'"
        );
        assert_eq!(description.kind, ErrorKind::ModuleNotFound);
        assert_eq!(description.line, 2);
        assert_eq!(description.file, script);
        assert_eq!(description.offending_line, "import kivy");
    }

    #[test]
    fn from_traceback_blames_last_line_when_number_is_stale() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("short.py");
        fs::write(&script, "x = 1\ny = x\n").unwrap();

        let traceback = format!(
            "Traceback (most recent call last):\n  File \"{}\", line 9, in <module>\n    y = x\nNameError: name 'x' is not defined",
            script.display()
        );
        let description = ErrorDescription::from_traceback(&traceback).unwrap();

        assert_eq!(description.line, 9);
        assert_eq!(description.offending_line, "y = x");
    }

    #[test]
    fn from_traceback_rejects_unknown_error_types() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("odd.py");
        fs::write(&script, "pass\n").unwrap();

        let traceback = format!(
            "Traceback (most recent call last):\n  File \"{}\", line 1, in <module>\nSomethingMadeUp: boom",
            script.display()
        );
        let err = ErrorDescription::from_traceback(&traceback).unwrap_err();
        assert!(err.to_string().contains("unrecognized error type"));
    }

    #[test]
    fn from_traceback_requires_a_file_header() {
        let err = ErrorDescription::from_traceback("NameError: name 'x' is not defined")
            .unwrap_err();
        assert!(err.to_string().contains("names no file and line"));
    }

    #[test]
    fn from_traceback_requires_a_readable_script() {
        let traceback = module_not_found_traceback(Path::new("/definitely/not/here.py"));
        assert!(ErrorDescription::from_traceback(&traceback).is_err());
    }

    #[test]
    fn error_message_is_the_last_nonblank_line() {
        assert_eq!(
            error_message("Traceback (most recent call last):\nKeyError: 'a'\n\n"),
            Some("KeyError: 'a'")
        );
        assert_eq!(error_message(""), None);
    }

    #[test]
    fn file_and_line_reads_the_first_header() {
        let traceback = concat!(
            "Traceback (most recent call last):\n",
            "  File \"outer.py\", line 7, in <module>\n",
            "  File \"inner.py\", line 3, in helper\n",
            "ValueError: bad value",
        );
        let (file, line) = file_and_line(traceback).unwrap();
        assert_eq!(file, PathBuf::from("outer.py"));
        assert_eq!(line, 7);
    }

    fn python_on_path() -> bool {
        PYTHON_INTERPRETERS.iter().any(|name| {
            Command::new(name)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok()
        })
    }

    #[test]
    fn capture_traceback_distinguishes_clean_and_crashing_scripts() {
        if !python_on_path() {
            return;
        }
        let dir = TempDir::new().unwrap();

        let clean = dir.path().join("clean.py");
        fs::write(&clean, "x = 1\n").unwrap();
        assert_eq!(capture_traceback(&clean).unwrap(), None);

        let crashing = dir.path().join("crashing.py");
        fs::write(&crashing, "print(missing_name)\n").unwrap();
        let traceback = capture_traceback(&crashing).unwrap().unwrap();
        assert!(traceback.contains("NameError"));
        assert!(traceback.ends_with("is not defined"));
    }
}
