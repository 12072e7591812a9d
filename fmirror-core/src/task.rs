use crate::{
    dispatch::Dispatcher,
    event::{EventTranslator, FsEvent},
    mirror::{Mirror, Outcome},
};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Public handle returned to callers for controlling the running monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    ctrl_tx: mpsc::Sender<TaskCommand>,
    state_rx: watch::Receiver<TaskState>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn state(&self) -> TaskState {
        self.state_rx.borrow().clone()
    }

    /// Resolves with the failure reason once the monitor gives up.
    /// Never resolves while mirroring keeps going.
    pub async fn failed(&mut self) -> String {
        loop {
            if let TaskState::Error(reason) = &*self.state_rx.borrow_and_update() {
                return reason.clone();
            }
            if self.state_rx.changed().await.is_err() {
                // the task is gone without failing
                return std::future::pending().await;
            }
        }
    }

    /// Stop watching and wait for the event being handled, if any, to finish.
    pub async fn stop(self) -> TaskState {
        let _ = self.ctrl_tx.send(TaskCommand::Stop).await;
        if let Err(e) = self.join.await {
            error!("monitor task ended abnormally: {e}");
        }
        let state = self.state_rx.borrow().clone();
        state
    }
}

#[derive(Debug, Clone)]
pub enum TaskCommand {
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Error(String),
}

/// Counts failed operations in a row and trips once a threshold is reached.
#[derive(Debug)]
struct Escalation {
    threshold: Option<u32>,
    streak: u32,
}

impl Escalation {
    fn record(&mut self, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Applied => self.streak = 0,
            Outcome::Failed => self.streak += 1,
        }
        self.threshold.is_some_and(|max| self.streak >= max)
    }
}

/// Watches every mapping and feeds their events, one at a time, through the
/// matching dispatcher.
pub(crate) struct MonitorTask<M: Mirror> {
    dispatchers: Vec<Dispatcher<M>>,
    escalation: Escalation,
    translator: EventTranslator,
}

type Tagged = (usize, notify::Event);

impl<M: Mirror> MonitorTask<M> {
    fn spawn_watchers(
        &self,
        op_tx: mpsc::Sender<Tagged>,
    ) -> notify::Result<Vec<RecommendedWatcher>> {
        let mut watchers = Vec::with_capacity(self.dispatchers.len());
        for (idx, dispatcher) in self.dispatchers.iter().enumerate() {
            let tx = op_tx.clone();
            let mut watcher = RecommendedWatcher::new(
                move |res: notify::Result<notify::Event>| match res {
                    Ok(event) => {
                        // receiver gone means we are shutting down
                        let _ = tx.blocking_send((idx, event));
                    }
                    Err(e) => warn!("watch error: {e}"),
                },
                notify::Config::default(),
            )?;
            let base = &dispatcher.mirror().mapping().local_base;
            watcher.watch(base, RecursiveMode::Recursive)?;
            debug!("watching {}", base.display());
            watchers.push(watcher);
        }
        Ok(watchers)
    }

    /// Hand each event to the dispatcher of its mapping. Returns the reason
    /// for giving up once escalation trips.
    async fn handle(&mut self, events: Vec<(usize, FsEvent)>) -> Option<String> {
        for (idx, ev) in events {
            let Some(dispatcher) = self.dispatchers.get(idx) else { continue };
            let Some(outcome) = dispatcher.dispatch(ev).await else { continue };
            if self.escalation.record(outcome) {
                return Some(format!(
                    "{} consecutive mirroring operations failed",
                    self.escalation.streak
                ));
            }
        }
        None
    }

    async fn run(
        mut self,
        watchers: Vec<RecommendedWatcher>,
        mut op_rx: mpsc::Receiver<Tagged>,
        mut ctrl_rx: mpsc::Receiver<TaskCommand>,
        state_tx: watch::Sender<TaskState>,
    ) {
        loop {
            let expiry = self.translator.next_expiry();
            let events = tokio::select! {
                biased;
                cmd = ctrl_rx.recv() => {
                    match cmd {
                        Some(TaskCommand::Stop) | None => break,
                    }
                }
                Some((idx, event)) = op_rx.recv() => {
                    let now = std::time::Instant::now();
                    let mut events = self.translator.expire(now);
                    events.extend(
                        self.translator
                            .translate(idx, event, now)
                            .into_iter()
                            .map(|ev| (idx, ev)),
                    );
                    events
                }
                _ = sleep_until(expiry.map_or_else(Instant::now, Instant::from_std)),
                    if expiry.is_some() =>
                {
                    self.translator.expire(std::time::Instant::now())
                }
            };
            if let Some(reason) = self.handle(events).await {
                error!("{reason}; giving up");
                drop(watchers);
                let _ = state_tx.send(TaskState::Error(reason));
                return;
            }
        }
        drop(watchers);
        info!("stopped watching");
        let _ = state_tx.send(TaskState::Idle);
    }
}

/// Start watching every dispatcher's local base and spawn the single task
/// that handles their events.
///
/// Fails before anything is spawned if a watch can't be established.
pub fn spawn_monitor<M: Mirror>(
    dispatchers: Vec<Dispatcher<M>>,
    escalation_threshold: Option<u32>,
) -> notify::Result<MonitorHandle> {
    let (op_tx, op_rx) = mpsc::channel(1024);
    let (ctrl_tx, ctrl_rx) = mpsc::channel(4);
    let (state_tx, state_rx) = watch::channel(TaskState::Running);
    let task = MonitorTask {
        dispatchers,
        escalation: Escalation {
            threshold: escalation_threshold,
            streak: 0,
        },
        translator: EventTranslator::new(),
    };
    // watches are live before the task exists, so it starts out Running
    let watchers = task.spawn_watchers(op_tx)?;
    let join = tokio::spawn(task.run(watchers, op_rx, ctrl_rx, state_tx));
    Ok(MonitorHandle {
        ctrl_tx,
        state_rx,
        join,
    })
}
