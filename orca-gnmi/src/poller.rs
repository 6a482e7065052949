//! Fixed-cadence Get polling

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{GetSettings, PollSettings};
use crate::dispatcher::{
    CallId, GetOptions, GetTransport, PendingCall, RequestDispatcher, build_get_request_with,
};
use crate::error::GnmiError;
use crate::gnmi::{GetRequest, GetResponse};
use crate::path::build_path;

/// What became of the call issued on one tick.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// The device answered.
    Completed { notifications: usize },
    /// The call failed.
    Failed(GnmiError),
    /// Still running when the poller returned.
    InFlight,
}

/// One tick of a poll run.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// 1-based tick number.
    pub tick: u32,
    pub call: CallId,
    pub outcome: TickOutcome,
}

/// Result of a poll run.
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    pub ticks: Vec<TickReport>,
    /// The shutdown signal ended the run before the last tick.
    pub stopped_early: bool,
}

impl PollReport {
    pub fn dispatched(&self) -> usize {
        self.ticks.len()
    }

    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, TickOutcome::Completed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TickOutcome::Failed(_)))
    }

    pub fn in_flight(&self) -> usize {
        self.count(|o| matches!(o, TickOutcome::InFlight))
    }

    fn count(&self, pred: impl Fn(&TickOutcome) -> bool) -> usize {
        self.ticks.iter().filter(|t| pred(&t.outcome)).count()
    }
}

/// Issues one Get per tick for a fixed number of ticks.
///
/// A tick never waits for earlier calls. The run stops early when the
/// shutdown watch turns `true`; if its sender goes away the poller keeps
/// ticking.
#[derive(Debug)]
pub struct Poller<T> {
    dispatcher: RequestDispatcher<T>,
    paths: Vec<String>,
    options: GetOptions,
    settings: PollSettings,
}

impl<T: GetTransport> Poller<T> {
    pub fn new(
        dispatcher: RequestDispatcher<T>,
        paths: Vec<String>,
        options: GetOptions,
        settings: PollSettings,
    ) -> Result<Self, GnmiError> {
        settings.validate()?;

        Ok(Self {
            dispatcher,
            paths,
            options,
            settings,
        })
    }

    /// Create a poller from the `get` and `poll` configuration sections.
    pub fn from_config(
        dispatcher: RequestDispatcher<T>,
        get: &GetSettings,
        poll: &PollSettings,
    ) -> Result<Self, GnmiError> {
        let options = GetOptions {
            data_type: get.data_type,
            encoding: get.encoding,
        };
        Self::new(dispatcher, get.paths.clone(), options, poll.clone())
    }

    fn build_request(&self) -> GetRequest {
        let paths = self.paths.iter().map(|p| build_path(p)).collect();
        build_get_request_with(paths, self.options)
    }

    /// Run all ticks, or until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> PollReport {
        let mut interval = tokio::time::interval(self.settings.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            ticks = self.settings.ticks,
            interval_ms = self.settings.interval_ms,
            paths = self.paths.len(),
            "Starting gNMI poller"
        );

        let mut pending: Vec<(u32, PendingCall)> = Vec::new();
        let mut listening = true;
        let mut stopped_early = false;

        for tick in 1..=self.settings.ticks {
            if listening && *shutdown.borrow() {
                stopped_early = true;
                break;
            }

            loop {
                if !listening {
                    interval.tick().await;
                    break;
                }

                tokio::select! {
                    biased;

                    changed = shutdown.changed() => match changed {
                        Ok(()) if *shutdown.borrow_and_update() => {
                            stopped_early = true;
                            break;
                        }
                        Ok(()) => {}
                        Err(_) => {
                            warn!(tick, "Wait for next tick interrupted: shutdown signal dropped, continuing");
                            listening = false;
                        }
                    },
                    _ = interval.tick() => break,
                }
            }

            if stopped_early {
                info!(tick, "Shutdown requested, stopping poller");
                break;
            }

            let call = self.dispatcher.send_get(self.build_request());
            debug!(tick, call = %call.id(), "Tick dispatched");
            pending.push((tick, call));
        }

        let mut drain = self.settings.drain_outstanding && !stopped_early;
        let mut ticks = Vec::with_capacity(pending.len());

        for (tick, mut call) in pending {
            let id = call.id();
            let result = if drain {
                match drain_call(&mut call, &mut shutdown, &mut listening).await {
                    Some(outcome) => Some(outcome),
                    None => {
                        info!(tick, call = %id, "Shutdown requested, no longer waiting for in-flight calls");
                        drain = false;
                        call.try_outcome()
                    }
                }
            } else {
                call.try_outcome()
            };

            let outcome = match result {
                Some(Ok(response)) => TickOutcome::Completed {
                    notifications: response.notification.len(),
                },
                Some(Err(err)) => TickOutcome::Failed(err),
                None => TickOutcome::InFlight,
            };

            ticks.push(TickReport {
                tick,
                call: id,
                outcome,
            });
        }

        let report = PollReport {
            ticks,
            stopped_early,
        };

        info!(
            dispatched = report.dispatched(),
            completed = report.completed(),
            failed = report.failed(),
            in_flight = report.in_flight(),
            stopped_early,
            "gNMI poller finished"
        );

        report
    }
}

/// Wait for one outstanding call; `None` when shutdown is requested first.
async fn drain_call(
    call: &mut PendingCall,
    shutdown: &mut watch::Receiver<bool>,
    listening: &mut bool,
) -> Option<Result<GetResponse, GnmiError>> {
    loop {
        if !*listening {
            return Some(call.finished().await);
        }

        tokio::select! {
            biased;

            changed = shutdown.changed() => match changed {
                Ok(()) if *shutdown.borrow_and_update() => return None,
                Ok(()) => {}
                Err(_) => {
                    warn!(call = %call.id(), "Wait for in-flight call interrupted: shutdown signal dropped, continuing");
                    *listening = false;
                }
            },
            outcome = call.finished() => return Some(outcome),
        }
    }
}
