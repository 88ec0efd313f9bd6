use crate::domain::event::PaymentOutcome;
use crate::domain::ports::PaymentContextObserver;
use crate::error::{BridgeError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum NotificationKind {
    MethodSelected,
    PaymentResult,
    FailedToLoad,
    Finished,
    RequiresAction,
    ReadyToCharge,
}

#[derive(Debug, Deserialize)]
struct NotificationRecord {
    notification: NotificationKind,
    #[serde(default)]
    payload: String,
}

/// One SDK callback from a replay script.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedNotification {
    MethodSelected(String),
    PaymentResult(String),
    FailedToLoad(String),
    Finished(PaymentOutcome),
    RequiresAction(String),
    ReadyToCharge { error: bool },
}

impl ScriptedNotification {
    fn from_record(record: NotificationRecord) -> Result<Self> {
        Ok(match record.notification {
            NotificationKind::MethodSelected => Self::MethodSelected(record.payload),
            NotificationKind::PaymentResult => Self::PaymentResult(record.payload),
            NotificationKind::FailedToLoad => Self::FailedToLoad(record.payload),
            NotificationKind::Finished => Self::Finished(record.payload.parse()?),
            NotificationKind::RequiresAction => Self::RequiresAction(record.payload),
            NotificationKind::ReadyToCharge => match record.payload.as_str() {
                "ok" => Self::ReadyToCharge { error: false },
                "error" => Self::ReadyToCharge { error: true },
                other => {
                    return Err(BridgeError::InvalidCommand(format!(
                        "ready_to_charge payload must be `ok` or `error`, got `{other}`"
                    )));
                }
            },
        })
    }

    /// Plays this notification into `observer`, as the SDK would.
    pub fn deliver(&self, observer: &dyn PaymentContextObserver) {
        match self {
            Self::MethodSelected(summary) => observer.selected_method_changed(summary),
            Self::PaymentResult(token) => observer.did_create_payment_result(token),
            Self::FailedToLoad(error) => observer.did_fail_to_load(error),
            Self::Finished(outcome) => observer.did_finish(*outcome),
            Self::RequiresAction(url) => observer.requires_action(url),
            Self::ReadyToCharge { error } => observer.ready_to_charge(*error),
        }
    }
}

/// Reads SDK notification scripts from a CSV source.
///
/// Expects a `notification,payload` header. JSON payloads containing commas
/// must be quoted.
pub struct NotificationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> NotificationReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads notifications; a bad row yields an error and reading goes on.
    pub fn notifications(self) -> impl Iterator<Item = Result<ScriptedNotification>> {
        self.reader
            .into_deserialize::<NotificationRecord>()
            .map(|record| ScriptedNotification::from_record(record.map_err(BridgeError::from)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = "notification,payload\n\
                    method_selected,\"{\"\"type\"\":\"\"card\"\",\"\"last4\"\":\"\"4242\"\"}\"\n\
                    payment_result,pi_123\n\
                    finished,completed";
        let reader = NotificationReader::new(data.as_bytes());
        let results: Vec<Result<ScriptedNotification>> = reader.notifications().collect();

        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].as_ref().unwrap(),
            &ScriptedNotification::MethodSelected(r#"{"type":"card","last4":"4242"}"#.into())
        );
        assert_eq!(
            results[2].as_ref().unwrap(),
            &ScriptedNotification::Finished(PaymentOutcome::Completed)
        );
    }

    #[test]
    fn test_reader_malformed_lines() {
        let data = "notification,payload\nexploded,1\nfinished,paid\nfailed_to_load,card declined";
        let reader = NotificationReader::new(data.as_bytes());
        let results: Vec<Result<ScriptedNotification>> = reader.notifications().collect();

        assert!(results[0].is_err());
        assert!(results[1].is_err());
        assert_eq!(
            results[2].as_ref().unwrap(),
            &ScriptedNotification::FailedToLoad("card declined".into())
        );
    }

    #[test]
    fn test_reader_redirect_notifications() {
        let data = "notification,payload\n\
                    requires_action,https://hooks.example.com/3ds/pi_123\n\
                    ready_to_charge,ok\n\
                    ready_to_charge,maybe";
        let results: Vec<Result<ScriptedNotification>> =
            NotificationReader::new(data.as_bytes()).notifications().collect();

        assert_eq!(
            results[0].as_ref().unwrap(),
            &ScriptedNotification::RequiresAction("https://hooks.example.com/3ds/pi_123".into())
        );
        assert_eq!(
            results[1].as_ref().unwrap(),
            &ScriptedNotification::ReadyToCharge { error: false }
        );
        assert!(results[2].is_err());
    }
}
