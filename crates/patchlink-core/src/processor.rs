//! Command queue and processor.
//!
//! One [`Dispatcher`] is built at start-up and shared with every producer.
//! A single processor thread drains the bounded command queue in FIFO order
//! and is the only thread that ever starts a device transaction. Heartbeat
//! and control-value producers only ever *offer* onto the queue with a short
//! timeout, so a saturated queue drops their commands instead of blocking.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded, select};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, instrument, trace, warn};

use crate::admission::{AdmissionClass, AdmissionController};
use crate::barrier::CancelToken;
use crate::command::{Command, ControlSource, ExecContext, Outcome, SerialCommand};
use crate::config::DispatcherConfig;
use crate::events::{CommandEvent, CommandObserver};
use crate::link::DeviceLink;
use crate::protocol::StatusCode;
use crate::transport::{DeviceResponse, DeviceTransport};

/// What happened to an offered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferResult {
    Queued,
    /// Refused by the admission controller.
    Rejected,
    /// The queue stayed full for the whole offer timeout.
    Dropped,
    /// The dispatcher has shut down.
    Stopped,
}

impl OfferResult {
    pub fn is_queued(self) -> bool {
        self == OfferResult::Queued
    }
}

struct Shared {
    config: DispatcherConfig,
    transport: Arc<dyn DeviceTransport>,
    observer: Arc<dyn CommandObserver>,
    admission: AdmissionController,
    cancel: CancelToken,
    commands_tx: Sender<Command>,
    commands_rx: Receiver<Command>,
    responses_rx: Receiver<DeviceResponse>,
    controls: Mutex<Option<Arc<dyn ControlSource>>>,
    /// Commands queued or executing.
    pending: Mutex<usize>,
    drained: Condvar,
}

/// Serializing command dispatcher.
pub struct Dispatcher {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        observer: Arc<dyn CommandObserver>,
        config: DispatcherConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = bounded(config.command_queue_capacity);
        let (responses_tx, responses_rx) = bounded(config.response_queue_capacity);
        transport.router().attach_responses(responses_tx);

        let admission = AdmissionController::new(config.cooldown());
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                observer,
                admission,
                cancel: CancelToken::new(),
                commands_tx,
                commands_rx,
                responses_rx,
                controls: Mutex::new(None),
                pending: Mutex::new(0),
                drained: Condvar::new(),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Source polled by the control-value producer. Set before [`start`](Self::start).
    pub fn set_control_source(&self, source: Arc<dyn ControlSource>) {
        *self.shared.controls.lock() = Some(source);
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.shared.admission
    }

    /// Commands queued or currently executing.
    pub fn pending(&self) -> usize {
        *self.shared.pending.lock()
    }

    /// Offer a user-initiated command.
    pub fn offer(&self, command: Command) -> OfferResult {
        self.shared.offer(command, self.shared.config.user_offer_timeout(), false)
    }

    /// Queue a command without consulting admission control.
    ///
    /// For the owner of the current long operation, whose own commands must
    /// still get through while everyone else is held back.
    pub fn enqueue(&self, command: Command) -> OfferResult {
        self.shared
            .enqueue(command, self.shared.config.user_offer_timeout(), false)
    }

    /// Offer a periodic command; drops quietly when the queue is saturated.
    pub fn offer_periodic(&self, command: Command) -> OfferResult {
        self.shared.offer_periodic(command)
    }

    /// Offer `command` and block until it finishes or `timeout` elapses.
    pub fn offer_and_wait(&self, command: Command, timeout: Duration) -> Option<Outcome> {
        let completion = command.completion();
        if !self.offer(command).is_queued() {
            return None;
        }
        completion.wait(timeout)
    }

    /// Block until every queued command has finished.
    ///
    /// Returns `false` if work is still outstanding after `timeout`.
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        let mut pending = self.shared.pending.lock();
        self.shared
            .drained
            .wait_while_for(&mut pending, |p| *p > 0, timeout);
        *pending == 0
    }

    /// Spawn the processor and the periodic producers.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }
        info!(
            poll_interval_ms = self.shared.config.poll_interval_ms,
            heartbeat = self.shared.config.heartbeat_enabled,
            "Starting dispatcher"
        );

        let shared = self.shared.clone();
        workers.push(thread::spawn(move || shared.run_processor()));

        if self.shared.config.heartbeat_enabled {
            let shared = self.shared.clone();
            workers.push(thread::spawn(move || {
                shared.run_producer("heartbeat", Command::ping)
            }));
        }

        if let Some(source) = self.shared.controls.lock().clone() {
            let shared = self.shared.clone();
            workers.push(thread::spawn(move || {
                shared.run_producer("controls", || Command::transmit_controls(source.clone()))
            }));
        }
    }

    /// Stop all threads. Commands still queued finish as interrupted.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                warn!("Dispatcher thread panicked");
            }
        }
        self.shared.abandon_queue(StatusCode::INTERRUPTED);
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn offer_periodic(&self, command: Command) -> OfferResult {
        self.offer(command, self.config.periodic_offer_timeout(), true)
    }

    fn offer(&self, command: Command, timeout: Duration, periodic: bool) -> OfferResult {
        if self.cancel.is_cancelled() {
            return OfferResult::Stopped;
        }
        if !self.admission.should_offer(&command) {
            debug!(?command, "Command rejected by admission control");
            return OfferResult::Rejected;
        }
        self.enqueue(command, timeout, periodic)
    }

    fn enqueue(&self, command: Command, timeout: Duration, periodic: bool) -> OfferResult {
        if self.cancel.is_cancelled() {
            return OfferResult::Stopped;
        }
        *self.pending.lock() += 1;
        match self.commands_tx.send_timeout(command, timeout) {
            Ok(()) => OfferResult::Queued,
            Err(SendTimeoutError::Timeout(command)) => {
                self.finish_one();
                if periodic {
                    debug!(?command, "Queue full, periodic command dropped");
                } else {
                    warn!(
                        ?command,
                        timeout_ms = timeout.as_millis() as u64,
                        "Queue full, command dropped"
                    );
                }
                OfferResult::Dropped
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                self.finish_one();
                OfferResult::Stopped
            }
        }
    }

    fn finish_one(&self) {
        self.release(1);
    }

    /// Drop `count` commands from the pending tally.
    fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(count);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    fn run_processor(&self) {
        let link = DeviceLink::new(self.transport.clone(), self.cancel.clone());
        debug!("Processor running");

        loop {
            select! {
                recv(self.cancel.signal()) -> _ => break,
                recv(self.commands_rx) -> msg => match msg {
                    Ok(command) if self.cancel.is_cancelled() => {
                        command.completion().finish(Outcome::new(StatusCode::INTERRUPTED, false));
                        self.finish_one();
                        break;
                    }
                    Ok(command) => self.process(&link, command),
                    Err(_) => break,
                },
                recv(self.responses_rx) -> msg => match msg {
                    Ok(DeviceResponse::Disconnected) => {
                        self.flush_after_disconnect();
                    }
                    Ok(DeviceResponse::Ack(ack)) => {
                        trace!(?ack, "Acknowledgment while idle");
                    }
                    Err(_) => break,
                },
            }
        }
        debug!("Processor stopped");
    }

    fn run_producer(&self, name: &'static str, make: impl Fn() -> Command) {
        let interval = self.config.poll_interval();
        loop {
            select! {
                recv(self.cancel.signal()) -> _ => break,
                default(interval) => {
                    if !self.transport.is_connected() {
                        continue;
                    }
                    if self.offer_periodic(make()) == OfferResult::Stopped {
                        break;
                    }
                }
            }
        }
        debug!(producer = name, "Producer stopped");
    }

    fn process(&self, link: &DeviceLink, command: Command) {
        let disconnected = self.run_command(link, command);
        // The executing command stays pending until the flush is announced.
        if disconnected {
            self.flush_after_disconnect();
        }
        self.finish_one();
    }

    /// Run one command to completion. Returns whether the device went away.
    #[instrument(level = "debug", skip_all, fields(command = ?command))]
    fn run_command(&self, link: &DeviceLink, mut command: Command) -> bool {
        let completion = command.completion();
        let announce = command.admission_class() != AdmissionClass::Periodic;
        if announce {
            self.observer.on_event(&CommandEvent::Started {
                message: command.start_message(),
            });
        }

        let mut disconnected = false;
        let outcome = match &mut command {
            Command::Gui(task) => task.run(self.observer.as_ref()),
            Command::Serial(cmd) => {
                let (outcome, lost) = self.execute_serial(link, cmd);
                disconnected = lost;
                outcome
            }
            Command::Shell(task) => {
                let result = task.run(self.observer.as_ref());
                if let Some(follow_up) = result.follow_up {
                    disconnected = self.run_command(link, follow_up);
                }
                result.outcome
            }
        };

        if announce {
            self.observer.on_event(&CommandEvent::Done {
                message: command.done_message(outcome.success),
                success: outcome.success,
                status: outcome.status,
            });
        }
        completion.finish(outcome);
        disconnected
    }

    fn execute_serial(&self, link: &DeviceLink, cmd: &mut SerialCommand) -> (Outcome, bool) {
        for stale in self.responses_rx.try_iter() {
            trace!(?stale, "Discarding stale response");
        }

        let ctx = ExecContext {
            link,
            observer: self.observer.as_ref(),
            config: &self.config,
        };
        let status = cmd.execute(&ctx);
        let outcome = Outcome::new(status, cmd.succeeded());

        let mut disconnected = !link.is_connected();
        for response in self.responses_rx.try_iter() {
            match response {
                DeviceResponse::Disconnected => disconnected = true,
                DeviceResponse::Ack(ack) => trace!(?ack, "Response"),
            }
        }
        (outcome, disconnected)
    }

    fn flush_after_disconnect(&self) {
        let flushed: Vec<Command> = self.commands_rx.try_iter().collect();
        warn!(flushed = flushed.len(), "Device disconnected, command queue flushed");
        self.observer.on_event(&CommandEvent::DeviceDisconnected {
            flushed: flushed.len(),
        });
        self.fail_all(flushed, StatusCode::NOT_READY);
    }

    /// Fail every queued command with `status` without running it.
    fn abandon_queue(&self, status: StatusCode) -> usize {
        let abandoned: Vec<Command> = self.commands_rx.try_iter().collect();
        let count = abandoned.len();
        self.fail_all(abandoned, status);
        count
    }

    fn fail_all(&self, commands: Vec<Command>, status: StatusCode) {
        let count = commands.len();
        for command in commands {
            command.completion().finish(Outcome::new(status, false));
        }
        self.release(count);
    }
}
