use std::time::Duration;
use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use shared::types::{ServiceRecord, ServiceStatus};
use crate::config::PollerConfig;
use crate::error::RegistryResult;
use crate::registry::RegistryHandle;

/// Why a probe got no answer. Never leaves the prober: it is logged and
/// recorded as `FAIL`.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// Outcome of one probe. Any completed HTTP exchange counts as reached,
/// whatever the status code.
#[derive(Debug)]
pub enum Reachability {
    Reached { status_code: u16 },
    Unreached(ProbeError),
}

impl Reachability {
    pub fn status(&self) -> ServiceStatus {
        match self {
            Reachability::Reached { .. } => ServiceStatus::Ok,
            Reachability::Unreached(_) => ServiceStatus::Fail,
        }
    }
}

/// Counts for one poll cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub reached: usize,
    pub unreached: usize,
    /// Probes whose status could not be written, e.g. deleted mid-cycle
    pub not_recorded: usize,
}

struct ProbeReport {
    status: ServiceStatus,
    recorded: bool,
}

#[derive(Clone)]
pub struct Prober {
    registry: RegistryHandle,
    client: reqwest::Client,
    timeout: Duration,
}

impl Prober {
    pub fn new(registry: RegistryHandle, config: &PollerConfig) -> Result<Self> {
        // Availability matters here, not certificate hygiene: self-signed,
        // expired and mismatched certificates all count as answering.
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(true)
            .user_agent(concat!("service-pollerd/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build probe HTTP client")?;

        Ok(Self {
            registry,
            client,
            timeout: config.timeout(),
        })
    }

    /// Issue one GET against `url` as stored.
    pub async fn probe(&self, url: &str) -> Reachability {
        match self.client.get(url).send().await {
            Ok(response) => Reachability::Reached {
                status_code: response.status().as_u16(),
            },
            Err(e) => Reachability::Unreached(self.classify(&e)),
        }
    }

    fn classify(&self, err: &reqwest::Error) -> ProbeError {
        if err.is_timeout() {
            ProbeError::Timeout(self.timeout)
        } else if err.is_connect() {
            ProbeError::Connect(error_chain(err))
        } else {
            ProbeError::Request(error_chain(err))
        }
    }

    async fn probe_and_record(&self, record: ServiceRecord) -> ProbeReport {
        let reachability = self.probe(&record.url).await;
        match &reachability {
            Reachability::Reached { status_code } => {
                tracing::debug!("Service {} ({}) responded with {}", record.name, record.url, status_code);
            }
            Reachability::Unreached(e) => {
                tracing::info!("Service {} ({}) failed to respond: {}", record.name, record.url, e);
            }
        }

        let status = reachability.status();
        let recorded = match self.registry.set_status(&record.name, status).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Could not record status {} for {}: {}", status, record.name, e);
                false
            }
        };

        ProbeReport { status, recorded }
    }

    /// Run one poll cycle: snapshot the registry, probe every record
    /// concurrently and wait for all of them. Fails only if the snapshot
    /// cannot be taken, in which case nothing is written.
    pub async fn poll_once(&self) -> RegistryResult<PollSummary> {
        let records = self.registry.find_all().await?;
        tracing::info!("Polling {} service(s)", records.len());

        let mut probes: FuturesUnordered<_> = records
            .into_iter()
            .map(|record| {
                let prober = self.clone();
                tokio::spawn(async move { prober.probe_and_record(record).await })
            })
            .collect();

        let mut summary = PollSummary::default();
        while let Some(joined) = probes.next().await {
            match joined {
                Ok(report) => {
                    match report.status {
                        ServiceStatus::Ok => summary.reached += 1,
                        _ => summary.unreached += 1,
                    }
                    if !report.recorded {
                        summary.not_recorded += 1;
                    }
                }
                Err(e) => {
                    tracing::error!("Probe task aborted: {}", e);
                    summary.not_recorded += 1;
                }
            }
        }

        Ok(summary)
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Poll loop. Each tick spawns a cycle so a slow cycle never holds up the
/// timer; cycles may overlap. Returns once cancelled and in-flight cycles
/// have drained.
pub async fn run(prober: Prober, interval: Duration, cancel: CancellationToken) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let cycles = TaskTracker::new();

    tracing::info!("Poller started, interval {:?}", interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let prober = prober.clone();
                cycles.spawn(async move {
                    match prober.poll_once().await {
                        Ok(summary) => tracing::info!(
                            "Poll cycle done: {} reached, {} unreached, {} not recorded",
                            summary.reached,
                            summary.unreached,
                            summary.not_recorded
                        ),
                        Err(e) => tracing::error!("Skipping poll cycle, could not list services: {}", e),
                    }
                });
            }
            _ = cancel.cancelled() => {
                tracing::info!("Poller shutting down");
                break;
            }
        }
    }

    cycles.close();
    cycles.wait().await;
    Ok(())
}
