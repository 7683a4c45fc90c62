//! Property writes.
//!
//! A write is one SETC request. Unless it switches the unit off, a buzzer
//! property is sent along so the unit beeps to acknowledge the change.
//!
//! The write succeeded when the device answers SET_RES or SETC_SNA and
//! echoes the written property with an empty value; a device that refuses
//! a property echoes it back with its data.

use std::net::SocketAddr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::client::{ClientError, EchonetClient};
use crate::event::{EngineEvent, EventSink};
use crate::frame::ServiceCode;
use crate::object::aircon::{is_power_off, BUZZER_SOUND};
use crate::object::{AirConditionerCommand, ObjectIdentifier};
use crate::property::{Property, PropertyCode};

pub const MESSAGE_SUCCESS: &str = "success";
pub const MESSAGE_DEVICE_ERROR: &str = "device returned an error response";
pub const MESSAGE_TIMED_OUT: &str = "timed out";
pub const MESSAGE_SEND_ERROR: &str = "send error";
pub const MESSAGE_REQUEST_FAILED: &str = "request failed";
pub const MESSAGE_INVALID_COMMAND: &str = "invalid command";

/// Outcome of one property write
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SetPropertyResult {
    pub address: SocketAddr,
    pub success: bool,
    pub message: String,
}

impl SetPropertyResult {
    fn new(address: SocketAddr, success: bool, message: &str) -> Self {
        Self {
            address,
            success,
            message: message.to_string(),
        }
    }
}

/// Write `data` to `code` on `object`, emit the result to `sink` and
/// return it
pub async fn set_property<S>(
    client: &EchonetClient,
    target: SocketAddr,
    object: ObjectIdentifier,
    code: PropertyCode,
    data: Vec<u8>,
    sink: &S,
) -> SetPropertyResult
where
    S: EventSink + ?Sized,
{
    let result = write(client, target, object, code, data).await;
    if result.success {
        log::info!("Set {} on {} at {}", code, object, target);
    } else {
        log::warn!(
            "Setting {} on {} at {} failed: {}",
            code,
            object,
            target,
            result.message
        );
    }
    sink.emit(EngineEvent::SetPropertyResult(result.clone()));
    result
}

/// Apply a typed air conditioner command
pub async fn apply_command<S>(
    client: &EchonetClient,
    target: SocketAddr,
    object: ObjectIdentifier,
    command: AirConditionerCommand,
    sink: &S,
) -> SetPropertyResult
where
    S: EventSink + ?Sized,
{
    let (code, value) = match command.to_property() {
        Ok(property) => property,
        Err(e) => {
            log::warn!("Not sending {:?} to {} at {}: {}", command, object, target, e);
            let result = SetPropertyResult::new(target, false, MESSAGE_INVALID_COMMAND);
            sink.emit(EngineEvent::SetPropertyResult(result.clone()));
            return result;
        }
    };
    set_property(client, target, object, code, vec![value], sink).await
}

async fn write(
    client: &EchonetClient,
    target: SocketAddr,
    object: ObjectIdentifier,
    code: PropertyCode,
    data: Vec<u8>,
) -> SetPropertyResult {
    let properties = match build_properties(code, data) {
        Ok(properties) => properties,
        Err(e) => {
            log::warn!("Cannot build write of {}: {}", code, e);
            return SetPropertyResult::new(target, false, MESSAGE_REQUEST_FAILED);
        }
    };

    let timeout = client.config().request_timeout;
    match client
        .send_request(target, object, ServiceCode::SetC, properties, timeout)
        .await
    {
        Ok(response) => {
            let accepted = response
                .frame
                .property(code)
                .is_some_and(|echoed| echoed.pdc() == 0);
            if accepted {
                SetPropertyResult::new(target, true, MESSAGE_SUCCESS)
            } else {
                log::debug!("{} refused {} ({})", target, code, response.frame.esv);
                SetPropertyResult::new(target, false, MESSAGE_DEVICE_ERROR)
            }
        }
        Err(ClientError::Rejected { .. }) | Err(ClientError::Malformed { .. }) => {
            SetPropertyResult::new(target, false, MESSAGE_DEVICE_ERROR)
        }
        Err(ClientError::Timeout { .. }) => SetPropertyResult::new(target, false, MESSAGE_TIMED_OUT),
        Err(ClientError::Transport(_)) => SetPropertyResult::new(target, false, MESSAGE_SEND_ERROR),
        Err(e) => {
            log::debug!("Write to {} failed: {}", target, e);
            SetPropertyResult::new(target, false, MESSAGE_REQUEST_FAILED)
        }
    }
}

fn build_properties(
    code: PropertyCode,
    data: Vec<u8>,
) -> Result<Vec<Property>, crate::frame::FrameError> {
    let silent = is_power_off(code, &data);
    let mut properties = vec![Property::new(code, data)?];
    if !silent {
        properties.push(Property::new(PropertyCode::Buzzer, vec![BUZZER_SOUND])?);
    }
    Ok(properties)
}
