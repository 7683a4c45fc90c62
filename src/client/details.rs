//! Detail aggregation for one air conditioner.
//!
//! A detail pass runs in two phases:
//!
//! 1. one GET for the essential properties (power, mode, set-point, fan
//!    speed). Every unit supports these, so a failure means the unit is
//!    unreachable: a [`SnapshotPhase::Failed`] snapshot is emitted and the
//!    pass ends.
//! 2. five single-property GETs for the optional measurements, issued
//!    concurrently. A failing fetch leaves its field empty and is only
//!    logged; the pass waits for all five to settle.
//!
//! The essential snapshot is emitted as soon as phase 1 succeeds so a
//! consumer can render it before the slowest optional fetch returns.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::client::EchonetClient;
use crate::event::{EngineEvent, EventSink};
use crate::object::{AirConditionerState, ObjectIdentifier};
use crate::property::{Property, PropertyCode};

/// Fetched together in phase 1
pub const ESSENTIAL_PROPERTIES: [PropertyCode; 4] = [
    PropertyCode::OperationStatus,
    PropertyCode::OperationMode,
    PropertyCode::TemperatureSetting,
    PropertyCode::AirFlowRate,
];

/// Fetched one by one, concurrently, in phase 2
pub const OPTIONAL_PROPERTIES: [PropertyCode; 5] = [
    PropertyCode::MeasuredRoomTemperature,
    PropertyCode::MeasuredRelativeHumidity,
    PropertyCode::MeasuredOutdoorTemperature,
    PropertyCode::AirFlowDirectionVertical,
    PropertyCode::AirFlowDirectionHorizontal,
];

/// How far a detail pass got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SnapshotPhase {
    /// Essential properties only; optional fetches still running
    Essential,
    /// Every fetch settled
    Complete,
    /// The essential fetch failed
    Failed,
}

/// State of one device as of one detail pass
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceSnapshot {
    pub address: SocketAddr,
    pub object: ObjectIdentifier,
    pub phase: SnapshotPhase,
    pub state: AirConditionerState,
    pub updated_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    fn new(
        address: SocketAddr,
        object: ObjectIdentifier,
        phase: SnapshotPhase,
        state: AirConditionerState,
    ) -> Self {
        Self {
            address,
            object,
            phase,
            state,
            updated_at: Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase == SnapshotPhase::Complete
    }
}

/// Run a detail pass against `object` at `target`.
///
/// Emits the essential and the complete snapshot (or a single failed one)
/// to `sink` and returns the last of them.
pub async fn fetch_details<S>(
    client: &EchonetClient,
    target: SocketAddr,
    object: ObjectIdentifier,
    sink: &S,
) -> DeviceSnapshot
where
    S: EventSink + ?Sized,
{
    log::debug!("Fetching details of {} at {}", object, target);

    let mut state = AirConditionerState::default();
    match client.get(target, object, &ESSENTIAL_PROPERTIES).await {
        Ok(properties) => properties.iter().for_each(|p| state.apply(p)),
        Err(e) => {
            log::warn!(
                "Essential properties of {} at {} unavailable: {}",
                object,
                target,
                e
            );
            let snapshot = DeviceSnapshot::new(
                target,
                object,
                SnapshotPhase::Failed,
                AirConditionerState::unreachable(),
            );
            sink.emit(EngineEvent::DeviceDetails(snapshot.clone()));
            return snapshot;
        }
    }

    sink.emit(EngineEvent::DeviceDetails(DeviceSnapshot::new(
        target,
        object,
        SnapshotPhase::Essential,
        state.clone(),
    )));

    let [room, humidity, outdoor, vertical, horizontal] =
        OPTIONAL_PROPERTIES.map(|code| fetch_optional(client, target, object, code));
    let settled = tokio::join!(room, humidity, outdoor, vertical, horizontal);

    for property in [settled.0, settled.1, settled.2, settled.3, settled.4]
        .iter()
        .flatten()
    {
        state.apply(property);
    }

    let snapshot = DeviceSnapshot::new(target, object, SnapshotPhase::Complete, state);
    sink.emit(EngineEvent::DeviceDetails(snapshot.clone()));
    log::debug!("Details of {} at {} complete", object, target);
    snapshot
}

async fn fetch_optional(
    client: &EchonetClient,
    target: SocketAddr,
    object: ObjectIdentifier,
    code: PropertyCode,
) -> Option<Property> {
    match client.get(target, object, &[code]).await {
        Ok(properties) => properties.into_iter().find(|p| p.code == code),
        Err(e) => {
            log::warn!("{} of {} at {} unavailable: {}", code, object, target, e);
            None
        }
    }
}
