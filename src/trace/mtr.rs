use std::net::Ipv4Addr;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::MtrError;
use crate::lookup::{NameResolver, resolve_target};
use crate::probe::ProbeSocket;
use crate::state::{MtrResult, ResultSnapshot};
use crate::trace::cycle::{Cycle, CycleReport};

#[cfg(unix)]
use crate::lookup::DnsLookup;
#[cfg(unix)]
use crate::probe::{RawIcmpSocket, process_identifier};

/// A continuous path measurement towards one target
///
/// The engine is driven by [`Mtr::run`]; any number of other tasks may call
/// [`Mtr::snapshot`] while a run is in progress (share it through an `Arc`).
pub struct Mtr<S, R> {
    config: Config,
    identifier: u16,
    socket: S,
    resolver: R,
    result: MtrResult,
}

#[cfg(unix)]
impl Mtr<RawIcmpSocket, DnsLookup> {
    /// Resolve the target with the system resolver and open a raw ICMP socket
    ///
    /// The identifier carried by every probe is derived from the process id.
    pub async fn connect(config: Config) -> Result<Self, MtrError> {
        config.validate()?;
        let resolver = DnsLookup::new();
        let destination = resolve_target(&config.target, &resolver).await?;
        let socket = RawIcmpSocket::open()?;
        Ok(Self::assemble(
            config,
            process_identifier(),
            destination,
            socket,
            resolver,
        ))
    }
}

impl<S, R> Mtr<S, R>
where
    S: ProbeSocket,
    R: NameResolver,
{
    /// Build an engine from explicit collaborators
    ///
    /// Resolution happens here, before any probe is sent; a target that does
    /// not resolve to an IPv4 address fails construction.
    pub async fn with_parts(
        config: Config,
        identifier: u16,
        resolver: R,
        socket: S,
    ) -> Result<Self, MtrError> {
        config.validate()?;
        let destination = resolve_target(&config.target, &resolver).await?;
        Ok(Self::assemble(config, identifier, destination, socket, resolver))
    }

    fn assemble(
        config: Config,
        identifier: u16,
        destination: Ipv4Addr,
        socket: S,
        resolver: R,
    ) -> Self {
        tracing::info!(
            host = %config.target,
            %destination,
            max_hops = config.max_hops,
            identifier,
            "resolved target"
        );
        let result = MtrResult::new(config.target.clone(), destination, config.max_hops);
        Self {
            config,
            identifier,
            socket,
            resolver,
            result,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.result.resolved()
    }

    /// Point-in-time copy of the results so far
    pub fn snapshot(&self) -> ResultSnapshot {
        self.result.snapshot()
    }

    /// Run cycles until `count` is reached or `cancel` fires
    ///
    /// `on_cycle` receives a fresh snapshot after every completed cycle. A
    /// cycle already receiving when cancellation arrives runs to its timeout.
    /// Returns the final snapshot.
    pub async fn run<F>(&self, cancel: &CancellationToken, mut on_cycle: F) -> ResultSnapshot
    where
        F: FnMut(ResultSnapshot) + Send,
    {
        let started = Instant::now();
        // Time since the last completed cycle; intervals count, gaps between runs do not
        let mut mark = started;
        let mut completed: u64 = 0;
        if self.result.cycles() == 0 {
            self.result.mark_started();
        }

        tracing::info!(
            host = %self.config.target,
            count = self.config.count,
            interval = ?self.config.interval,
            timeout = ?self.config.timeout,
            "starting measurement"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if !self.config.is_unbounded() && completed >= self.config.count {
                break;
            }

            let report = self.run_cycle(self.result.cycles(), cancel).await;
            if report.cancelled {
                tracing::debug!(cycle = report.cycle, sent = report.sent, "cycle cancelled");
                break;
            }

            completed += 1;
            let now = Instant::now();
            self.result.complete_cycle(now.duration_since(mark));
            mark = now;
            tracing::debug!(
                cycle = report.cycle,
                sent = report.sent,
                accepted = report.accepted,
                discarded = report.discarded,
                reached = report.reached,
                "cycle complete"
            );
            on_cycle(self.result.snapshot());

            if !self.config.is_unbounded() && completed >= self.config.count {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        tracing::info!(
            cycles = completed,
            elapsed = ?started.elapsed(),
            cancelled = cancel.is_cancelled(),
            "measurement finished"
        );
        self.result.snapshot()
    }

    /// Like [`Mtr::run`], but publishes snapshots on a bounded channel
    ///
    /// Sending never waits: when the consumer lags and the channel is full,
    /// the snapshot is dropped so probe timing is unaffected.
    pub async fn run_with_channel(
        &self,
        cancel: &CancellationToken,
        tx: mpsc::Sender<ResultSnapshot>,
    ) -> ResultSnapshot {
        self.run(cancel, |snapshot| match tx.try_send(snapshot) {
            Ok(()) => {}
            Err(TrySendError::Full(snapshot)) => {
                tracing::debug!(cycle = snapshot.cycles, "consumer lagging, snapshot dropped");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!("snapshot receiver closed");
            }
        })
        .await
    }

    async fn run_cycle(&self, cycle: u64, cancel: &CancellationToken) -> CycleReport {
        Cycle {
            config: &self.config,
            identifier: self.identifier,
            destination: self.result.resolved(),
            socket: &self.socket,
            resolver: &self.resolver,
            result: &self.result,
        }
        .run(cycle, cancel)
        .await
    }
}
