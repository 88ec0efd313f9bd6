use crate::domain::event::{
    BridgeEvent, MethodSummary, NOTIFICATION_METHOD_SELECTED, PayloadError, PaymentContextEvent,
    PaymentOutcome,
};
use crate::domain::flow::{FlowState, Transition};
use crate::domain::ports::{EventSink, EventSinkRef};
use crate::error::{BridgeError, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

pub(crate) type SelectionReply = oneshot::Sender<Result<MethodSummary>>;
pub(crate) type OutcomeReply = oneshot::Sender<Result<PaymentOutcome>>;

/// Messages processed, in order, by the dispatcher task.
#[derive(Debug)]
pub(crate) enum Dispatch {
    ContextStarted { epoch: u64 },
    ContextEnded { epoch: u64 },
    Notification {
        epoch: u64,
        event: std::result::Result<PaymentContextEvent, PayloadError>,
    },
    Emit(BridgeEvent),
    AwaitSelection { epoch: u64, reply: SelectionReply },
    AwaitOutcome { epoch: u64, reply: OutcomeReply },
    Shutdown,
}

/// Handle for posting onto the dispatcher from any thread.
///
/// Posting never blocks; the dispatcher task is the only place that touches
/// the runtime's event sink.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<Dispatch>,
}

impl EventQueue {
    pub(crate) fn post(&self, message: Dispatch) -> Result<()> {
        self.tx.send(message).map_err(|_| BridgeError::ChannelClosed)
    }
}

impl EventSink for EventQueue {
    fn emit(&self, event: BridgeEvent) -> Result<()> {
        self.post(Dispatch::Emit(event))
    }
}

/// Starts the dispatcher on the current runtime.
pub(crate) fn spawn(sink: EventSinkRef) -> (EventQueue, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(Dispatcher::new(sink).run(rx));
    (EventQueue { tx }, handle)
}

struct Dispatcher {
    sink: EventSinkRef,
    active_epoch: Option<u64>,
    flow: FlowState,
    selection: Option<SelectionReply>,
    outcome: Option<OutcomeReply>,
}

impl Dispatcher {
    fn new(sink: EventSinkRef) -> Self {
        Self {
            sink,
            active_epoch: None,
            flow: FlowState::Idle,
            selection: None,
            outcome: None,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Dispatch>) {
        while let Some(message) = rx.recv().await {
            if matches!(message, Dispatch::Shutdown) {
                break;
            }
            self.handle(message);
        }
        self.end_context();
        debug!("event dispatcher stopped");
    }

    fn handle(&mut self, message: Dispatch) {
        match message {
            Dispatch::ContextStarted { epoch } => {
                self.end_context();
                debug!(epoch, "payment context started");
                self.active_epoch = Some(epoch);
            }
            Dispatch::ContextEnded { epoch } => {
                if self.active_epoch == Some(epoch) {
                    debug!(epoch, "payment context ended");
                    self.end_context();
                }
            }
            Dispatch::Notification { epoch, event } => {
                if self.active_epoch != Some(epoch) {
                    debug!(epoch, "dropping notification from a torn down payment context");
                    return;
                }
                self.relay(event);
            }
            Dispatch::Emit(event) => self.deliver(event),
            Dispatch::AwaitSelection { epoch, reply } => {
                if self.active_epoch != Some(epoch) {
                    let _ = reply.send(Err(BridgeError::ContextTornDown));
                } else if let Some(previous) = self.selection.replace(reply) {
                    let _ = previous.send(Err(BridgeError::ContextTornDown));
                }
            }
            Dispatch::AwaitOutcome { epoch, reply } => {
                if self.active_epoch != Some(epoch) {
                    let _ = reply.send(Err(BridgeError::ContextTornDown));
                    return;
                }
                self.advance(self.flow.submit());
                if let Some(previous) = self.outcome.replace(reply) {
                    let _ = previous.send(Err(BridgeError::ContextTornDown));
                }
            }
            Dispatch::Shutdown => {}
        }
    }

    fn relay(&mut self, event: std::result::Result<PaymentContextEvent, PayloadError>) {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(notification = e.notification, reason = %e.reason, "payload could not be encoded");
                self.deliver(BridgeEvent::from(e.clone()));
                if e.notification == NOTIFICATION_METHOD_SELECTED
                    && let Some(reply) = self.selection.take()
                {
                    let _ = reply.send(Err(BridgeError::from(e)));
                }
                return;
            }
        };

        self.advance(self.flow.observe(&event));
        self.deliver(BridgeEvent::from(event.clone()));
        match event {
            PaymentContextEvent::SelectedMethodChanged(summary) => {
                if let Some(reply) = self.selection.take() {
                    let _ = reply.send(Ok(summary));
                }
            }
            PaymentContextEvent::DidFailToLoad(message) => {
                if let Some(reply) = self.selection.take() {
                    let _ = reply.send(Err(BridgeError::SdkReported(message)));
                }
            }
            PaymentContextEvent::DidFinish(outcome) => {
                if let Some(reply) = self.selection.take() {
                    let _ = reply.send(Err(BridgeError::SdkReported(format!(
                        "payment flow finished ({outcome}) before a method was selected"
                    ))));
                }
                if let Some(reply) = self.outcome.take() {
                    let _ = reply.send(Ok(outcome));
                }
            }
            PaymentContextEvent::DidCreatePaymentResult(_)
            | PaymentContextEvent::RequiresAction(_)
            | PaymentContextEvent::ReadyToCharge { .. } => {}
        }
    }

    fn advance(&mut self, transition: Transition) {
        if transition.expected {
            trace!(from = ?transition.from, to = ?transition.to, "payment flow transition");
        } else {
            warn!(from = ?transition.from, to = ?transition.to, "unexpected payment flow transition");
        }
        self.flow = transition.to;
    }

    fn deliver(&self, event: BridgeEvent) {
        let name = event.name();
        if let Err(e) = self.sink.emit(event) {
            error!(event = name, error = %e, "failed to emit event");
        }
    }

    fn end_context(&mut self) {
        self.active_epoch = None;
        self.flow = FlowState::Idle;
        if let Some(reply) = self.selection.take() {
            let _ = reply.send(Err(BridgeError::ContextTornDown));
        }
        if let Some(reply) = self.outcome.take() {
            let _ = reply.send(Err(BridgeError::ContextTornDown));
        }
    }
}
