//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Merge OS signals and remote stop requests into one event source
//! - Hand a signal back once the controller has consumed it
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are installed when the lifecycle starts, never at build time
//! - After the first signal, a repeat of SIGINT or SIGTERM exits the process
//!   with the conventional `128 + signo` status, outside the controller
//! - At most one escape hatch exists per process; it is aborted when its
//!   observer is dropped or a new observer is installed
//! - Remote stop (`/stop`) travels the same channel as OS signals

use std::fmt;
use std::io;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// A catchable process-termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationSignal {
    /// SIGINT, Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl TerminationSignal {
    /// Exit status of a process killed by this signal's default disposition.
    pub fn exit_code(self) -> i32 {
        match self {
            TerminationSignal::Interrupt => 128 + 2,
            TerminationSignal::Terminate => 128 + 15,
        }
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Sending half of the remote stop path.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: mpsc::UnboundedSender<TerminationSignal>,
}

impl StopHandle {
    /// Request a graceful stop, as if the process received SIGINT.
    ///
    /// Returns false once the observer is gone.
    pub fn stop(&self) -> bool {
        self.send(TerminationSignal::Interrupt)
    }

    /// Deliver a specific signal through the observer.
    pub fn send(&self, signal: TerminationSignal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

/// Receiving half of the remote stop path, owned by a [`SignalObserver`].
#[derive(Debug)]
pub struct StopRequests {
    rx: mpsc::UnboundedReceiver<TerminationSignal>,
}

impl StopRequests {
    async fn recv(&mut self) -> Option<TerminationSignal> {
        self.rx.recv().await
    }
}

/// Create a connected stop handle and request stream.
pub fn stop_channel() -> (StopHandle, StopRequests) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StopHandle { tx }, StopRequests { rx })
}

/// A single consumable source of termination signals.
#[async_trait]
pub trait SignalObserver: Send {
    /// Wait for the next termination signal.
    ///
    /// `None` means the source can never fire again.
    async fn recv(&mut self) -> Option<TerminationSignal>;

    /// Stop intercepting; the next delivery must reach the process
    /// without controller mediation.
    fn disarm(&mut self, signal: TerminationSignal);
}

/// How a server observes termination signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalMode {
    /// Real OS signals plus remote stop requests.
    #[default]
    Os,
    /// Remote stop requests only; the embedding program owns OS signals.
    Manual,
}

impl SignalMode {
    pub(crate) fn observe(self, requests: StopRequests) -> io::Result<Box<dyn SignalObserver>> {
        match self {
            SignalMode::Os => Ok(Box::new(OsSignals::install(requests)?)),
            SignalMode::Manual => Ok(Box::new(ChannelSignals::new(requests))),
        }
    }
}

/// Signal source fed only by [`StopHandle`]s.
#[derive(Debug)]
pub struct ChannelSignals {
    requests: StopRequests,
    disarmed: Option<TerminationSignal>,
}

impl ChannelSignals {
    pub fn new(requests: StopRequests) -> Self {
        Self {
            requests,
            disarmed: None,
        }
    }

    /// The signal this observer was disarmed for, if any.
    pub fn disarmed(&self) -> Option<TerminationSignal> {
        self.disarmed
    }
}

#[async_trait]
impl SignalObserver for ChannelSignals {
    async fn recv(&mut self) -> Option<TerminationSignal> {
        self.requests.recv().await
    }

    fn disarm(&mut self, signal: TerminationSignal) {
        tracing::debug!(%signal, "Manual signal source disarmed");
        self.disarmed = Some(signal);
    }
}

/// The escape hatch currently armed in this process, if any.
static HATCH: Mutex<Option<AbortHandle>> = Mutex::new(None);

/// Put `next` in the process-wide slot, aborting whatever was there.
fn replace_hatch(next: Option<AbortHandle>) {
    let previous = match HATCH.lock() {
        Ok(mut slot) => std::mem::replace(&mut *slot, next),
        Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
    };

    if let Some(previous) = previous {
        if !previous.is_finished() {
            tracing::debug!("Previous escape hatch released");
        }
        previous.abort();
    }
}

/// Process signals merged with remote stop requests.
#[cfg(unix)]
pub struct OsSignals {
    interrupt: Option<tokio::signal::unix::Signal>,
    terminate: Option<tokio::signal::unix::Signal>,
    requests: StopRequests,
    hatch: Option<AbortHandle>,
}

#[cfg(unix)]
impl OsSignals {
    /// Install SIGINT and SIGTERM handlers. Must run inside a Tokio runtime.
    ///
    /// Releases the escape hatch of any earlier observer, so the new one
    /// sees the next signal.
    pub fn install(requests: StopRequests) -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        replace_hatch(None);

        Ok(Self {
            interrupt: Some(signal(SignalKind::interrupt())?),
            terminate: Some(signal(SignalKind::terminate())?),
            requests,
            hatch: None,
        })
    }
}

#[cfg(unix)]
impl Drop for OsSignals {
    fn drop(&mut self) {
        if let Some(hatch) = self.hatch.take() {
            hatch.abort();
        }
    }
}

#[cfg(unix)]
async fn next_delivery(signal: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match signal {
        Some(signal) => signal.recv().await,
        None => None,
    }
}

#[cfg(unix)]
#[async_trait]
impl SignalObserver for OsSignals {
    async fn recv(&mut self) -> Option<TerminationSignal> {
        let Self {
            interrupt,
            terminate,
            requests,
            ..
        } = self;

        tokio::select! {
            Some(()) = next_delivery(interrupt) => Some(TerminationSignal::Interrupt),
            Some(()) = next_delivery(terminate) => Some(TerminationSignal::Terminate),
            Some(signal) = requests.recv() => Some(signal),
            else => None,
        }
    }

    fn disarm(&mut self, signal: TerminationSignal) {
        // Tokio keeps its handler installed for the life of the process, so
        // the streams move to a task that exits the way SIG_DFL would.
        if let (Some(interrupt), Some(terminate)) = (self.interrupt.take(), self.terminate.take()) {
            tracing::debug!(%signal, "Signal handlers handed to escape hatch");
            let hatch = tokio::spawn(escape_hatch(interrupt, terminate)).abort_handle();
            replace_hatch(Some(hatch.clone()));
            self.hatch = Some(hatch);
        }
    }
}

#[cfg(unix)]
async fn escape_hatch(
    mut interrupt: tokio::signal::unix::Signal,
    mut terminate: tokio::signal::unix::Signal,
) {
    let signal = tokio::select! {
        Some(()) = interrupt.recv() => TerminationSignal::Interrupt,
        Some(()) = terminate.recv() => TerminationSignal::Terminate,
        else => return,
    };

    tracing::warn!(%signal, "Received termination signal again, exiting immediately");
    std::process::exit(signal.exit_code());
}

/// Ctrl-C merged with remote stop requests.
#[cfg(not(unix))]
pub struct OsSignals {
    armed: bool,
    requests: StopRequests,
    hatch: Option<AbortHandle>,
}

#[cfg(not(unix))]
impl OsSignals {
    pub fn install(requests: StopRequests) -> io::Result<Self> {
        replace_hatch(None);

        Ok(Self {
            armed: true,
            requests,
            hatch: None,
        })
    }
}

#[cfg(not(unix))]
impl Drop for OsSignals {
    fn drop(&mut self) {
        if let Some(hatch) = self.hatch.take() {
            hatch.abort();
        }
    }
}

#[cfg(not(unix))]
#[async_trait]
impl SignalObserver for OsSignals {
    async fn recv(&mut self) -> Option<TerminationSignal> {
        let armed = self.armed;
        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c(), if armed => Some(TerminationSignal::Interrupt),
            Some(signal) = self.requests.recv() => Some(signal),
            else => None,
        }
    }

    fn disarm(&mut self, signal: TerminationSignal) {
        if std::mem::replace(&mut self.armed, false) {
            tracing::debug!(%signal, "Ctrl-C handed to escape hatch");
            let hatch = tokio::spawn(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Received Ctrl-C again, exiting immediately");
                    std::process::exit(TerminationSignal::Interrupt.exit_code());
                }
            })
            .abort_handle();
            replace_hatch(Some(hatch.clone()));
            self.hatch = Some(hatch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_handle_feeds_channel_observer() {
        let (handle, requests) = stop_channel();
        let mut observer = ChannelSignals::new(requests);

        assert!(handle.send(TerminationSignal::Terminate));
        assert!(handle.stop());

        assert_eq!(observer.recv().await, Some(TerminationSignal::Terminate));
        assert_eq!(observer.recv().await, Some(TerminationSignal::Interrupt));
    }

    #[tokio::test]
    async fn dropped_handles_close_the_source() {
        let (handle, requests) = stop_channel();
        let mut observer = ChannelSignals::new(requests);
        drop(handle);

        assert_eq!(observer.recv().await, None);
    }

    #[test]
    fn disarm_is_recorded() {
        let (_handle, requests) = stop_channel();
        let mut observer = ChannelSignals::new(requests);
        assert_eq!(observer.disarmed(), None);

        observer.disarm(TerminationSignal::Interrupt);
        assert_eq!(observer.disarmed(), Some(TerminationSignal::Interrupt));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropping_observer_releases_escape_hatch() {
        let (_handle, requests) = stop_channel();
        let mut observer = OsSignals::install(requests).unwrap();
        observer.disarm(TerminationSignal::Terminate);

        let hatch = observer.hatch.clone().unwrap();
        assert!(!hatch.is_finished());

        drop(observer);
        for _ in 0..10 {
            if hatch.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(hatch.is_finished());
    }

    #[test]
    fn exit_codes_follow_shell_convention() {
        assert_eq!(TerminationSignal::Interrupt.exit_code(), 130);
        assert_eq!(TerminationSignal::Terminate.exit_code(), 143);
        assert_eq!(TerminationSignal::Terminate.to_string(), "SIGTERM");
    }
}
