//! Child process plumbing for the plugin bridge.
//!
//! The child is spawned with a cleared environment, a null stdin, and both
//! output streams piped. A reader thread hands the first stdout line (the
//! handshake) to the bridge through a channel and logs anything after it.
//! Stderr is forwarded line by line to `tracing`.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::BRIDGE_TARGET;
use crate::error::PluginError;
use crate::handshake::HandshakeContract;
use crate::transport::ConnectionCloser;

/// Log target for everything a plugin prints.
pub(super) const PLUGIN_OUTPUT_TARGET: &str = "kiln_plugins::plugin_output";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long a plugin gets to react to `SIGTERM` before it is killed.
const SIGTERM_GRACE: Duration = Duration::from_millis(200);

/// Builds the child environment: allowlisted variables that are set in the
/// host, followed by the handshake variables.
pub(super) fn build_environment<F>(
    allowlist: &[String],
    lookup: F,
    contract: &HandshakeContract,
) -> Vec<(OsString, OsString)>
where
    F: Fn(&str) -> Option<OsString>,
{
    allowlist
        .iter()
        .filter_map(|key| lookup(key).map(|value| (OsString::from(key), value)))
        .chain(
            contract
                .environment()
                .into_iter()
                .map(|(key, value)| (OsString::from(key), OsString::from(value))),
        )
        .collect()
}

/// What arrived on stdout while waiting for the handshake.
#[derive(Debug)]
pub(super) enum FirstLine {
    Line(String),
    TimedOut,
    Closed,
    Failed(io::Error),
}

/// Spawns the plugin and starts its output readers.
pub(super) fn spawn(
    path: &Path,
    args: &[String],
    environment: Vec<(OsString, OsString)>,
    label: &str,
) -> Result<(Child, Receiver<io::Result<String>>), PluginError> {
    let mut command = Command::new(path);
    command
        .args(args)
        .env_clear()
        .envs(environment)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|error| PluginError::SpawnFailed {
        plugin: label.to_owned(),
        source: Arc::new(error),
    })?;

    let (sender, receiver) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        let label = label.to_owned();
        thread::spawn(move || forward_stdout(stdout, &sender, &label));
    }
    if let Some(stderr) = child.stderr.take() {
        let label = label.to_owned();
        thread::spawn(move || forward_stderr(stderr, &label));
    }

    debug!(
        target: BRIDGE_TARGET,
        plugin = label,
        pid = child.id(),
        "plugin process spawned"
    );
    Ok((child, receiver))
}

fn forward_stdout(stdout: impl Read, sender: &Sender<io::Result<String>>, label: &str) {
    let mut lines = BufReader::new(stdout).lines();
    match lines.next() {
        Some(first) => {
            // The bridge may have given up already; nobody to tell then.
            drop(sender.send(first));
        }
        None => return,
    }
    for line in lines {
        match line {
            Ok(line) => debug!(target: PLUGIN_OUTPUT_TARGET, plugin = label, stream = "stdout", "{line}"),
            Err(_) => break,
        }
    }
}

fn forward_stderr(stderr: impl Read, label: &str) {
    for line in BufReader::new(stderr).lines() {
        match line {
            Ok(line) => info!(target: PLUGIN_OUTPUT_TARGET, plugin = label, "{line}"),
            Err(_) => break,
        }
    }
}

/// Waits up to `timeout` for the handshake line.
pub(super) fn first_line(receiver: &Receiver<io::Result<String>>, timeout: Duration) -> FirstLine {
    match receiver.recv_timeout(timeout) {
        Ok(Ok(line)) => FirstLine::Line(line),
        Ok(Err(error)) => FirstLine::Failed(error),
        Err(RecvTimeoutError::Timeout) => FirstLine::TimedOut,
        Err(RecvTimeoutError::Disconnected) => FirstLine::Closed,
    }
}

/// The child process and connection, shared with termination handles.
#[derive(Debug, Default)]
pub(super) struct ChildSlot {
    child: Mutex<Option<Child>>,
    connection: Mutex<Option<ConnectionCloser>>,
    cancelled: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Recover from poisoning so the child can still be killed after a panic.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChildSlot {
    pub(super) fn store(&self, child: Child) {
        *lock(&self.child) = Some(child);
    }

    pub(super) fn store_connection(&self, closer: ConnectionCloser) {
        *lock(&self.connection) = Some(closer);
    }

    pub(super) fn pid(&self) -> Option<u32> {
        lock(&self.child).as_ref().map(Child::id)
    }

    pub(super) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the exit status if the child has exited.
    pub(super) fn exit_status(&self) -> Option<ExitStatus> {
        lock(&self.child)
            .as_mut()
            .and_then(|child| child.try_wait().ok().flatten())
    }

    /// Marks the bridge cancelled, closes the connection, and kills the
    /// child. Reaping is left to the bridge.
    pub(super) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(closer) = lock(&self.connection).as_ref() {
            closer.close();
        }
        if let Some(child) = lock(&self.child).as_mut() {
            if let Err(error) = child.kill() {
                debug!(target: BRIDGE_TARGET, %error, "kill on cancel failed");
            }
        }
    }

    /// Kills and reaps the child immediately.
    pub(super) fn kill(&self) {
        if let Some(closer) = lock(&self.connection).take() {
            closer.close();
        }
        if let Some(mut child) = lock(&self.child).take() {
            if let Err(error) = child.kill() {
                debug!(target: BRIDGE_TARGET, %error, "kill failed, process already gone");
            }
            drop(child.wait());
        }
    }

    /// Waits `grace` for the child to exit on its own, then asks it to stop
    /// with `SIGTERM` where available, then kills it.
    pub(super) fn terminate(&self, grace: Duration, label: &str) {
        if let Some(status) = self.wait_for_exit(grace) {
            debug!(target: BRIDGE_TARGET, plugin = label, ?status, "plugin exited");
            self.kill();
            return;
        }
        warn!(
            target: BRIDGE_TARGET,
            plugin = label,
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "plugin did not exit within grace period"
        );
        if self.signal_terminate() {
            if let Some(status) = self.wait_for_exit(SIGTERM_GRACE) {
                debug!(target: BRIDGE_TARGET, plugin = label, ?status, "plugin exited after SIGTERM");
            }
        }
        self.kill();
    }

    fn wait_for_exit(&self, limit: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + limit;
        loop {
            {
                let mut guard = lock(&self.child);
                let child = guard.as_mut()?;
                if let Ok(Some(status)) = child.try_wait() {
                    return Some(status);
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    #[cfg(unix)]
    fn signal_terminate(&self) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.pid().and_then(|pid| i32::try_from(pid).ok()) else {
            return false;
        };
        kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
    }

    #[cfg(not(unix))]
    fn signal_terminate(&self) -> bool {
        false
    }
}
