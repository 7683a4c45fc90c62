#![doc = include_str!("../README.md")]

#[macro_use]
pub mod util;

pub mod frame;
pub mod object;
pub mod property;

#[cfg(feature = "async")]
pub mod client;
#[cfg(feature = "async")]
pub mod controller;
#[cfg(feature = "async")]
pub mod discovery;
#[cfg(feature = "async")]
pub mod event;
#[cfg(feature = "async")]
pub mod transaction;
#[cfg(feature = "async")]
pub mod transport;

// Re-export main types without glob imports to avoid conflicts
pub use frame::{Frame, FrameError, ServiceCode};
pub use object::{AirConditionerCommand, AirConditionerState, ObjectIdentifier};
pub use property::{Property, PropertyCode};

#[cfg(feature = "async")]
pub use client::{ClientConfig, ClientError, DeviceSnapshot, EchonetClient, SetPropertyResult};
#[cfg(feature = "async")]
pub use controller::{Controller, ControllerConfig};
#[cfg(feature = "async")]
pub use discovery::{DiscoveredDevice, ScanConfig, Scanner};
#[cfg(feature = "async")]
pub use event::{EngineEvent, EventSink, NullSink};

/// Source object of every frame this crate sends (generic controller)
pub const CONTROLLER_OBJECT: ObjectIdentifier = ObjectIdentifier::CONTROLLER;

#[cfg(test)]
mod tests {
    use crate::object::ObjectIdentifier;
    use crate::{Frame, Property, PropertyCode, ServiceCode};

    #[test]
    fn test_controller_request_shape() {
        let frame = Frame::request(
            1,
            ObjectIdentifier::NODE_PROFILE,
            ServiceCode::Get,
            vec![Property::request(PropertyCode::SelfNodeInstanceListS)],
        );
        assert_eq!(frame.seoj, crate::CONTROLLER_OBJECT);
        assert_eq!(
            frame.encode().unwrap().as_ref(),
            &[0x10, 0x81, 0x00, 0x01, 0x05, 0xFF, 0x01, 0x0E, 0xF0, 0x01, 0x62, 0x01, 0xD6, 0x00]
        );
    }
}
