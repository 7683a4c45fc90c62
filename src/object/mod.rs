//! ECHONET Lite Object Module
//!
//! Devices on an ECHONET Lite network expose one or more objects, each
//! addressed by a three-byte object identifier (EOJ): class group code,
//! class code and instance code. A node profile object (0x0E 0xF0 0x01)
//! describes the node itself and lists the device objects it hosts.
//!
//! # Example
//!
//! ```
//! use echonet_rs::object::ObjectIdentifier;
//!
//! let eoj: ObjectIdentifier = "013001".parse().unwrap();
//! assert!(eoj.is_air_conditioner());
//! assert_eq!(eoj.instance(), 0x01);
//! assert_eq!(eoj.to_string(), "013001");
//! ```

pub mod aircon;

use std::fmt;
use std::str::FromStr;

use crate::frame::FrameError;
use crate::util::Buffer;

pub use aircon::{
    AirConditionerCommand, AirConditionerState, AirFlowRate, CommandError, HorizontalAirFlow,
    OperationMode, Power, VerticalAirFlow,
};

/// Class group code of housing/facility related devices
pub const CLASS_GROUP_HOUSING: u8 = 0x01;

/// Class code of the home air conditioner within [`CLASS_GROUP_HOUSING`]
pub const CLASS_HOME_AIR_CONDITIONER: u8 = 0x30;

/// Three-byte ECHONET Lite object identifier (EOJ)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIdentifier([u8; 3]);

impl ObjectIdentifier {
    /// Generic controller object, the source of every frame this crate sends
    pub const CONTROLLER: ObjectIdentifier = ObjectIdentifier([0x05, 0xFF, 0x01]);

    /// Node profile object, the target of discovery requests
    pub const NODE_PROFILE: ObjectIdentifier = ObjectIdentifier([0x0E, 0xF0, 0x01]);

    pub const fn new(class_group: u8, class: u8, instance: u8) -> Self {
        Self([class_group, class, instance])
    }

    pub fn class_group(&self) -> u8 {
        self.0[0]
    }

    pub fn class(&self) -> u8 {
        self.0[1]
    }

    pub fn instance(&self) -> u8 {
        self.0[2]
    }

    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }

    /// Whether the object is a home air conditioner (any instance)
    pub fn is_air_conditioner(&self) -> bool {
        self.class_group() == CLASS_GROUP_HOUSING && self.class() == CLASS_HOME_AIR_CONDITIONER
    }
}

impl From<[u8; 3]> for ObjectIdentifier {
    fn from(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Error parsing an object identifier from text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseObjectIdentifierError(String);

impl fmt::Display for ParseObjectIdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid object identifier {:?}: expected 6 hex digits", self.0)
    }
}

impl std::error::Error for ParseObjectIdentifierError {}

impl FromStr for ObjectIdentifier {
    type Err = ParseObjectIdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let mut bytes = [0u8; 3];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| ParseObjectIdentifierError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ObjectIdentifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ObjectIdentifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = <String as serde::Deserialize>::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Decode a self-node instance list (EPC 0xD6).
///
/// The payload is a count byte followed by that many three-byte object
/// identifiers. Decoding stops early when the payload is shorter than the
/// count announces; the identifiers read so far are returned.
pub fn decode_instance_list(data: &[u8]) -> Result<Vec<ObjectIdentifier>, FrameError> {
    let mut buffer = Buffer::new(data);
    let count = buffer.read_u8().ok_or(FrameError::InvalidInstanceList)?;

    let mut objects = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match buffer.read_array::<3>() {
            Some(bytes) => objects.push(ObjectIdentifier(bytes)),
            None => break,
        }
    }
    Ok(objects)
}

/// Encode a self-node instance list (EPC 0xD6)
pub fn encode_instance_list(objects: &[ObjectIdentifier]) -> Result<Vec<u8>, FrameError> {
    // 84 identifiers fill the 255-byte PDC limit with the count byte
    if objects.len() > 84 {
        return Err(FrameError::InvalidInstanceList);
    }
    let mut data = Vec::with_capacity(1 + objects.len() * 3);
    data.push(objects.len() as u8);
    for object in objects {
        data.extend_from_slice(object.as_bytes());
    }
    Ok(data)
}
