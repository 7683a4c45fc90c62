//! ECHONET Lite Property Module
//!
//! A property is an (EPC, EDT) pair: a one-byte property code and up to 255
//! bytes of data. Requests for a read carry no data; writes carry the new
//! value. The property data count (PDC) is always derived from the data, so
//! the declared and actual lengths can never disagree once a [`Property`]
//! exists.
//!
//! Property codes are only meaningful relative to an object class. The
//! codes named here cover the node profile and the home air conditioner
//! class (0x01 0x30); everything else decodes as `Custom` (manufacturer
//! range 0xF0..=0xFF) or `Reserved`.

use crate::frame::{FrameError, MAX_PROPERTY_DATA};

generate_custom_enum! {
    /// ECHONET Lite property codes (EPC)
    PropertyCode {
        OperationStatus = 0x80,
        InstallationLocation = 0x81,
        FaultStatus = 0x88,
        ManufacturerCode = 0x8A,
        StatusChangeAnnouncementMap = 0x9D,
        SetPropertyMap = 0x9E,
        GetPropertyMap = 0x9F,
        AirFlowRate = 0xA0,
        AirFlowDirectionVertical = 0xA4,
        AirFlowDirectionHorizontal = 0xA5,
        OperationMode = 0xB0,
        TemperatureSetting = 0xB3,
        MeasuredRelativeHumidity = 0xBA,
        MeasuredRoomTemperature = 0xBB,
        MeasuredOutdoorTemperature = 0xBE,
        Buzzer = 0xD0,
        InstanceListNotification = 0xD5,
        SelfNodeInstanceListS = 0xD6,
    },
    u8,
    0xF0..=0xFF
}

/// One property: code plus data, at most 255 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub code: PropertyCode,
    data: Vec<u8>,
}

impl Property {
    /// Create a property carrying data.
    ///
    /// Fails when the data cannot be described by a one-byte PDC.
    pub fn new(code: PropertyCode, data: impl Into<Vec<u8>>) -> Result<Self, FrameError> {
        let data = data.into();
        if data.len() > MAX_PROPERTY_DATA {
            return Err(FrameError::PropertyDataTooLong {
                code,
                len: data.len(),
            });
        }
        Ok(Self { code, data })
    }

    /// Create a read request for `code` (no data)
    pub fn request(code: PropertyCode) -> Self {
        Self {
            code,
            data: Vec::new(),
        }
    }

    /// Build a property from a slice the decoder has already bounded by PDC
    pub(crate) fn from_wire(code: PropertyCode, data: &[u8]) -> Self {
        Self {
            code,
            data: data.to_vec(),
        }
    }

    /// Property data (EDT)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Property data count (PDC)
    pub fn pdc(&self) -> u8 {
        // bounded by construction
        self.data.len() as u8
    }

    /// First data byte, if any
    pub fn first_byte(&self) -> Option<u8> {
        self.data.first().copied()
    }
}
