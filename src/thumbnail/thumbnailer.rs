//! External thumbnailer programs.
//!
//! Non-image sources are handed to per-MIME helper programs described by
//! freedesktop-style exec templates (`%u` URI, `%i` input path, `%o`
//! output path, `%s` size). At most one helper runs per process at a
//! time; each run is guarded by a wall-clock watchdog that SIGTERMs the
//! child on expiry, and cancellation kills it immediately. The worker
//! observes either ending as a nonzero exit status.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::Engine;

const THUMBNAILER_TIMEOUT: Duration = Duration::from_secs(30);

/// An external helper program registered for a MIME type via
/// [`crate::mime::MimeType::add_thumbnailer`].
pub struct Thumbnailer {
    id: String,
    exec: String,
}

impl Thumbnailer {
    pub fn new(id: impl Into<String>, exec: impl Into<String>) -> Arc<Thumbnailer> {
        Arc::new(Thumbnailer {
            id: id.into(),
            exec: exec.into(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn command(&self, uri: &str, output: &Path, size: u32) -> Option<Command> {
        let input = uri
            .strip_prefix("file://")
            .map(|rest| {
                percent_encoding::percent_decode_str(rest)
                    .decode_utf8_lossy()
                    .into_owned()
            })
            .unwrap_or_else(|| uri.to_string());
        let output = output.to_string_lossy();
        let size = size.to_string();

        let argv: Vec<String> = self
            .exec
            .split_whitespace()
            .map(|token| {
                token
                    .replace("%u", uri)
                    .replace("%i", &input)
                    .replace("%o", &output)
                    .replace("%s", &size)
                    .replace("%%", "%")
            })
            .collect();
        let (program, args) = argv.split_first()?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        Some(command)
    }

    fn launch(&self, uri: &str, output: &Path, size: u32) -> std::io::Result<Child> {
        let mut command = self
            .command(uri, output, size)
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
        command.spawn()
    }
}

/// Runs one helper invocation to completion. True means the helper exited
/// with status 0 and the output file should exist.
pub(crate) fn run(
    engine: &Arc<Engine>,
    thumbnailer: &Thumbnailer,
    uri: &str,
    output: &Path,
    size: u32,
) -> bool {
    let mut child = match thumbnailer.launch(uri, output, size) {
        Ok(child) => child,
        Err(err) => {
            warn!(id = thumbnailer.id(), %err, "failed to launch thumbnailer");
            return false;
        }
    };
    let pid = child.id() as i32;
    debug!(id = thumbnailer.id(), pid, size, "thumbnailer started");

    {
        let mut state = engine.state.lock();
        if state.thumbnailer_pid.is_some() {
            drop(state);
            // There is at most one external thumbnailer in flight globally.
            error!("concurrent external thumbnailer attempt");
            unsafe { libc::kill(pid, libc::SIGTERM) };
            let _ = child.wait();
            return false;
        }
        state.thumbnailer_pid = Some(pid);
    }

    let watchdog = Watchdog::arm(engine.clone(), pid);
    let status = child.wait();
    drop(watchdog);

    match status {
        Ok(status) if status.success() => true,
        Ok(status) => {
            debug!(id = thumbnailer.id(), %status, "thumbnailer failed");
            false
        }
        Err(err) => {
            warn!(id = thumbnailer.id(), %err, "waiting for thumbnailer failed");
            false
        }
    }
}

/// Scoped supervision of one helper process: holds the pid slot and the
/// timeout timer, and guarantees both are released no matter how the run
/// ends.
struct Watchdog {
    engine: Arc<Engine>,
    pid: i32,
    disarm: Option<mpsc::Sender<()>>,
}

impl Watchdog {
    fn arm(engine: Arc<Engine>, pid: i32) -> Watchdog {
        let (disarm, expired) = mpsc::channel::<()>();
        let timer_engine = engine.clone();
        let spawned = thread::Builder::new()
            .name("fm-thumbnailer-timer".into())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = expired.recv_timeout(THUMBNAILER_TIMEOUT) {
                    let mut state = timer_engine.state.lock();
                    // The slot may have been released by a normal exit or a
                    // cancel that raced the timeout.
                    if state.thumbnailer_pid == Some(pid) {
                        warn!(pid, "thumbnailer timed out, killing");
                        unsafe { libc::kill(pid, libc::SIGTERM) };
                        state.thumbnailer_pid = None;
                    }
                }
            });
        if spawned.is_err() {
            warn!("could not start thumbnailer timeout timer");
        }
        Watchdog {
            engine,
            pid,
            disarm: Some(disarm),
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // Dropping the sender wakes the timer thread, which then exits
        // without killing anything.
        self.disarm.take();
        let mut state = self.engine.state.lock();
        if state.thumbnailer_pid == Some(self.pid) {
            state.thumbnailer_pid = None;
        }
    }
}
