//! Bounded execution of external OCR tools.

use std::ffi::OsStr;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::ExtractionError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program args..`, killing it if it outlives `timeout`.
///
/// A missing binary maps to `BackendNotAvailable`, a non-zero exit to
/// `OcrProcessing` carrying stderr. On timeout only the direct child is
/// killed; its pipe readers are left detached and exit once the last
/// writer (possibly a grandchild) closes the pipe.
pub fn run_command<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
) -> Result<CommandOutput, ExtractionError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExtractionError::BackendNotAvailable(format!(
                "{program} not found on PATH"
            )));
        }
        Err(e) => return Err(ExtractionError::Io(e)),
    };

    // Drain pipes on their own threads so a chatty child never blocks on a full pipe.
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            warn!(program, timeout_secs = timeout.as_secs(), "Killing stalled subprocess");
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExtractionError::Timeout {
                program: program.to_string(),
                secs: timeout.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    debug!(
        program,
        elapsed_ms = started.elapsed().as_millis() as u64,
        success = status.success(),
        "Subprocess finished"
    );

    if !status.success() {
        return Err(ExtractionError::OcrProcessing(format!(
            "{program} exited with {status}: {}",
            stderr.trim()
        )));
    }

    Ok(CommandOutput { stdout, stderr })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            debug!(error = %e, read = buf.len(), "Subprocess pipe read failed");
        }
        buf
    })
}

fn join_reader(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
