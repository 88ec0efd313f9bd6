use crate::domain::event::{PaymentContextEvent, PaymentOutcome};

/// State of the SDK's payment flow as seen from its notifications.
///
/// The adapter never owns this state machine. It follows it to flag
/// notifications arriving out of sequence, and keeps relaying them anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Idle,
    MethodSelected,
    Submitting,
    /// Waiting for the customer to come back from an authorization page.
    AwaitingAction,
    Completed,
    Failed,
}

/// Result of feeding one notification into [`FlowState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: FlowState,
    pub to: FlowState,
    pub expected: bool,
}

impl FlowState {
    /// A payment was handed to the SDK.
    pub fn submit(self) -> Transition {
        Transition {
            from: self,
            to: FlowState::Submitting,
            expected: self == FlowState::MethodSelected,
        }
    }

    pub fn observe(self, event: &PaymentContextEvent) -> Transition {
        let (to, expected) = match event {
            PaymentContextEvent::SelectedMethodChanged(_) => {
                (FlowState::MethodSelected, self != FlowState::Submitting)
            }
            PaymentContextEvent::DidCreatePaymentResult(_) => {
                (FlowState::Completed, self == FlowState::Submitting)
            }
            PaymentContextEvent::DidFailToLoad(_) => (FlowState::Failed, true),
            PaymentContextEvent::DidFinish(outcome) => match outcome {
                PaymentOutcome::Completed => (FlowState::Completed, self == FlowState::Completed),
                PaymentOutcome::Failed => (FlowState::Failed, true),
                PaymentOutcome::Canceled => (FlowState::Idle, true),
            },
            PaymentContextEvent::RequiresAction(_) => {
                (FlowState::AwaitingAction, self == FlowState::Submitting)
            }
            PaymentContextEvent::ReadyToCharge { error: true } => (FlowState::Failed, true),
            PaymentContextEvent::ReadyToCharge { error: false } => (
                FlowState::Submitting,
                matches!(self, FlowState::Submitting | FlowState::AwaitingAction),
            ),
        };
        Transition {
            from: self,
            to,
            expected,
        }
    }
}
