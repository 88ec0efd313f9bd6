use crate::domain::event::BridgeEvent;
use crate::domain::ports::EventSink;
use crate::error::{BridgeError, Result};
use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// Writes each emitted event as one JSON line:
/// `{"event":"onPaymentResult","payload":{"resultToken":"pi_123"}}`.
pub struct JsonLinesEventSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesEventSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> EventSink for JsonLinesEventSink<W> {
    fn emit(&self, event: BridgeEvent) -> Result<()> {
        let line = serde_json::to_string(&event)
            .map_err(|e| BridgeError::Serialization(format!("{}: {e}", event.name())))?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}
