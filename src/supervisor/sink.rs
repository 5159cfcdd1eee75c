//! Event sinks for delivering run events to a caller.
//!
//! Sinks are invoked from the run's worker task. A sink that feeds another
//! scheduling domain, such as a UI thread, owns that hand-off.

use tokio::sync::mpsc::UnboundedSender;

use crate::script::RunEvent;

/// Receiver of run events, in arrival order.
pub trait EventSink: Send {
    fn emit(&mut self, event: RunEvent);
}

impl<F> EventSink for F
where
    F: FnMut(RunEvent) + Send,
{
    fn emit(&mut self, event: RunEvent) {
        self(event);
    }
}

impl EventSink for UnboundedSender<RunEvent> {
    fn emit(&mut self, event: RunEvent) {
        if self.send(event).is_err() {
            tracing::trace!("Event receiver dropped, discarding event");
        }
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: RunEvent) {}
}
