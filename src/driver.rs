//! Session driver
//!
//! Async event loop around a [`PlaySession`]. A single task multiplexes host
//! commands, the periodic evaluation timer and at most one in-flight remote
//! analysis. Input keeps being recorded while the remote call is pending; the
//! cycle completes with whatever the call returned (or the local fallback on
//! timeout). Closing the channel or sending [`DriverCommand::Teardown`] tears
//! the session down and drops the in-flight call.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::error::EngineError;
use crate::remote::AnalysisFuture;
use crate::session::{PendingCycle, PlaySession};
use crate::types::SessionInput;

/// Commands accepted by the driver
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    Input(SessionInput),
    /// Start a cycle now, regardless of the trigger
    Evaluate,
    Teardown,
}

/// Sending side of a driver's command channel
#[derive(Debug, Clone)]
pub struct DriverHandle {
    commands: mpsc::Sender<DriverCommand>,
}

impl DriverHandle {
    pub async fn send(&self, input: SessionInput) -> Result<(), EngineError> {
        self.command(DriverCommand::Input(input)).await
    }

    pub async fn evaluate(&self) -> Result<(), EngineError> {
        self.command(DriverCommand::Evaluate).await
    }

    pub async fn teardown(&self) -> Result<(), EngineError> {
        self.command(DriverCommand::Teardown).await
    }

    async fn command(&self, command: DriverCommand) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::SessionClosed)
    }
}

struct InFlight {
    pending: PendingCycle,
    remote: AnalysisFuture,
}

/// Owns a session and runs its event loop
pub struct SessionDriver {
    session: PlaySession,
    commands: mpsc::Receiver<DriverCommand>,
    /// Latest timestamp carried by host input
    host_time: DateTime<Utc>,
    /// When `host_time` arrived
    anchor: Instant,
}

impl SessionDriver {
    /// Create a driver and the handle used to feed it
    pub fn new(session: PlaySession, buffer: usize) -> (DriverHandle, SessionDriver) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let driver = SessionDriver {
            host_time: session.clock(),
            session,
            commands: rx,
            anchor: Instant::now(),
        };
        (DriverHandle { commands: tx }, driver)
    }

    /// Session time: the latest host timestamp plus the time elapsed since it arrived.
    ///
    /// Only host input moves the anchor. Ticks and cycles advance the session
    /// clock but never feed back into this value.
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.host_time + elapsed
    }

    fn observe_host_time(&mut self, at: DateTime<Utc>) {
        if at > self.host_time {
            self.host_time = at;
            self.anchor = Instant::now();
        }
    }

    /// Begin a cycle. Local-only cycles complete immediately.
    fn start_cycle(&mut self) -> Option<InFlight> {
        let now = self.now();
        let pending = self.session.begin_cycle(now);
        match self.session.start_remote(&pending) {
            Some(remote) => Some(InFlight { pending, remote }),
            None => {
                self.session.complete_cycle(pending, None);
                None
            }
        }
    }

    /// Run until teardown or until every handle is dropped. Returns the session.
    pub async fn run(mut self) -> PlaySession {
        let period = self
            .session
            .config()
            .timing
            .evaluation_interval()
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(30));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight: Option<InFlight> = None;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(DriverCommand::Input(input)) => {
                        if let Some(at) = input.timestamp() {
                            self.observe_host_time(at);
                        }
                        let due = self.session.handle(input);
                        if due && in_flight.is_none() {
                            in_flight = self.start_cycle();
                        }
                    }
                    Some(DriverCommand::Evaluate) => {
                        if in_flight.is_none() {
                            in_flight = self.start_cycle();
                        }
                    }
                    Some(DriverCommand::Teardown) | None => {
                        if in_flight.take().is_some() {
                            debug!("dropping in-flight remote analysis");
                        }
                        self.session.teardown();
                        break;
                    }
                },
                _ = interval.tick() => {
                    let now = self.now();
                    if self.session.tick(now) && in_flight.is_none() {
                        in_flight = self.start_cycle();
                    }
                }
                result = async {
                    match in_flight.as_mut() {
                        Some(flight) => (&mut flight.remote).await,
                        None => std::future::pending().await,
                    }
                }, if in_flight.is_some() => {
                    if let Some(flight) = in_flight.take() {
                        self.session.complete_cycle(flight.pending, Some(result));
                    }
                    if self.session.cycle_due() {
                        in_flight = self.start_cycle();
                    }
                }
            }
        }

        self.session
    }
}
