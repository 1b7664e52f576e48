//! OS termination signals.

use tracing::info;

/// Signal kind that requested termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGINT or Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl std::fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationSignal::Interrupt => write!(f, "SIGINT"),
            TerminationSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Listener for termination requests.
///
/// The same listener can be awaited repeatedly: the first request starts a
/// graceful shutdown, a later one forces exit.
#[cfg(unix)]
pub(crate) struct TerminationSignals {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    pub(crate) fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let sigint = signal(SignalKind::interrupt())?;
        let sigterm = signal(SignalKind::terminate())?;
        info!("OS signal handlers installed (SIGTERM, SIGINT)");
        Ok(Self { sigint, sigterm })
    }

    pub(crate) async fn recv(&mut self) -> TerminationSignal {
        tokio::select! {
            _ = self.sigint.recv() => TerminationSignal::Interrupt,
            _ = self.sigterm.recv() => TerminationSignal::Terminate,
        }
    }
}

#[cfg(not(unix))]
pub(crate) struct TerminationSignals;

#[cfg(not(unix))]
impl TerminationSignals {
    pub(crate) fn install() -> std::io::Result<Self> {
        info!("OS signal handlers installed (Ctrl+C only)");
        Ok(Self)
    }

    pub(crate) async fn recv(&mut self) -> TerminationSignal {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        TerminationSignal::Interrupt
    }
}

/// Wait on an optional listener; a missing listener never fires.
pub(crate) async fn next_signal(signals: &mut Option<TerminationSignals>) -> TerminationSignal {
    match signals {
        Some(signals) => signals.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_signal_display() {
        assert_eq!(TerminationSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(TerminationSignal::Terminate.to_string(), "SIGTERM");
    }

    #[tokio::test]
    async fn test_missing_listener_never_fires() {
        let mut signals = None;
        let fired = tokio::time::timeout(Duration::from_millis(20), next_signal(&mut signals)).await;
        assert!(fired.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_listener() {
        let mut signals = Some(TerminationSignals::install().unwrap());
        let fired = tokio::time::timeout(Duration::from_millis(20), next_signal(&mut signals)).await;
        assert!(fired.is_err());
    }
}
