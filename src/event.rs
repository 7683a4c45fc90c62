//! Engine-to-collaborator events.
//!
//! Discovery, detail aggregation and property writes report their progress
//! as [`EngineEvent`]s through an [`EventSink`]. A UI or HTTP layer usually
//! hands in one end of a tokio channel; tests and one-shot tools use
//! [`NullSink`] and work with the returned values instead.

use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::client::{DeviceSnapshot, SetPropertyResult};
use crate::discovery::DiscoveredDevice;

/// Everything the engine reports to the outside world
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "event", rename_all = "snake_case"))]
pub enum EngineEvent {
    /// First response of a node during a scan
    DeviceFound(DiscoveredDevice),
    /// The scan window closed
    ScanFinished { devices: usize },
    /// Intermediate, final or failed detail snapshot
    DeviceDetails(DeviceSnapshot),
    /// Outcome of a property write
    SetPropertyResult(SetPropertyResult),
}

/// Receiver of engine events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}

impl EventSink for mpsc::UnboundedSender<EngineEvent> {
    fn emit(&self, event: EngineEvent) {
        if self.send(event).is_err() {
            log::trace!("Event receiver dropped");
        }
    }
}

impl EventSink for mpsc::Sender<EngineEvent> {
    fn emit(&self, event: EngineEvent) {
        match self.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                log::warn!("Event channel full, dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::trace!("Event receiver dropped");
            }
        }
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: EngineEvent) {
        (**self).emit(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_sink_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(EngineEvent::ScanFinished { devices: 2 });
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::ScanFinished { devices: 2 }
        );
    }

    #[test]
    fn test_bounded_sink_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.emit(EngineEvent::ScanFinished { devices: 1 });
        tx.emit(EngineEvent::ScanFinished { devices: 2 });
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::ScanFinished { devices: 1 }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.emit(EngineEvent::ScanFinished { devices: 0 });

        let shared: Arc<dyn EventSink> = Arc::new(NullSink);
        shared.emit(EngineEvent::ScanFinished { devices: 0 });
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_events_serialize_tagged() {
        let json = serde_json::to_value(EngineEvent::ScanFinished { devices: 3 }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "event": "scan_finished", "devices": 3 })
        );
    }
}
