//! ECHONET Lite Frame Module
//!
//! This module implements the ECHONET Lite frame (format 1) codec. Every
//! datagram on UDP port 3610 carries exactly one frame:
//!
//! ```text
//! +------+------+-------+--------+--------+-----+-----+------------------------+
//! | EHD1 | EHD2 |  TID  |  SEOJ  |  DEOJ  | ESV | OPC | (EPC, PDC, EDT[PDC])*  |
//! | 0x10 | 0x81 | 2 (BE)|   3    |   3    |  1  |  1  |                        |
//! +------+------+-------+--------+--------+-----+-----+------------------------+
//! ```
//!
//! The fixed header is 12 bytes. Each property is written as its code, a
//! one-byte data count and the data itself, so no value can exceed 255 bytes
//! and no frame can carry more than 255 properties.
//!
//! Decoding treats its input as untrusted: a datagram shorter than the
//! header or with a foreign header is rejected, and a property whose
//! declared length runs past the end of the datagram stops the scan. In the
//! latter case the properties parsed so far are returned with
//! [`DecodedFrame::truncated`] set.
//!
//! # Example
//!
//! ```
//! use echonet_rs::frame::{decode, Frame, ServiceCode};
//! use echonet_rs::object::ObjectIdentifier;
//! use echonet_rs::property::{Property, PropertyCode};
//!
//! let aircon = ObjectIdentifier::new(0x01, 0x30, 0x01);
//! let request = Frame::request(
//!     7,
//!     aircon,
//!     ServiceCode::Get,
//!     vec![Property::request(PropertyCode::OperationStatus)],
//! );
//! let bytes = request.encode().unwrap();
//! assert_eq!(bytes.len(), 14);
//!
//! let decoded = decode(&bytes).unwrap();
//! assert!(!decoded.truncated);
//! assert_eq!(decoded.frame.tid, 7);
//! ```

use std::error::Error;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::object::ObjectIdentifier;
use crate::property::{Property, PropertyCode};
use crate::util::Buffer;

/// Result type for frame operations
pub type Result<T> = std::result::Result<T, FrameError>;

/// ECHONET Lite header byte 1 (conventional ECHONET Lite)
pub const EHD1: u8 = 0x10;

/// ECHONET Lite header byte 2 (format 1, specified message format)
pub const EHD2: u8 = 0x81;

/// Size of the fixed frame header
pub const HEADER_SIZE: usize = 12;

/// Largest property data a frame can describe (PDC is one byte)
pub const MAX_PROPERTY_DATA: usize = u8::MAX as usize;

/// Largest property count a frame can describe (OPC is one byte)
pub const MAX_PROPERTIES: usize = u8::MAX as usize;

/// Errors that can occur while encoding or decoding frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Datagram is shorter than the fixed header
    TooShort { len: usize },
    /// EHD1/EHD2 are not the ECHONET Lite format 1 markers
    InvalidHeader { ehd1: u8, ehd2: u8 },
    /// Property data longer than a PDC byte can describe
    PropertyDataTooLong { code: PropertyCode, len: usize },
    /// More properties than an OPC byte can describe
    TooManyProperties { count: usize },
    /// Instance list payload is empty or inconsistent
    InvalidInstanceList,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooShort { len } => {
                write!(f, "Frame too short: {} bytes, header needs {}", len, HEADER_SIZE)
            }
            FrameError::InvalidHeader { ehd1, ehd2 } => {
                write!(f, "Invalid ECHONET Lite header: {:02X} {:02X}", ehd1, ehd2)
            }
            FrameError::PropertyDataTooLong { code, len } => write!(
                f,
                "Property {} data is {} bytes, maximum is {}",
                code, len, MAX_PROPERTY_DATA
            ),
            FrameError::TooManyProperties { count } => write!(
                f,
                "Frame carries {} properties, maximum is {}",
                count, MAX_PROPERTIES
            ),
            FrameError::InvalidInstanceList => write!(f, "Invalid instance list"),
        }
    }
}

impl Error for FrameError {}

generate_custom_enum! {
    /// ECHONET Lite service codes (ESV)
    ServiceCode {
        SetI = 0x60,
        SetC = 0x61,
        Get = 0x62,
        InfReq = 0x63,
        SetGet = 0x6E,
        SetRes = 0x71,
        GetRes = 0x72,
        Inf = 0x73,
        InfC = 0x74,
        InfCRes = 0x7A,
        SetGetRes = 0x7E,
        SetISna = 0x50,
        SetCSna = 0x51,
        GetSna = 0x52,
        InfSna = 0x53,
        SetGetSna = 0x5E,
    },
    u8,
    0x50..=0x7F
}

impl ServiceCode {
    /// Whether this code is one of the "not accepted" (SNA) responses
    pub fn is_not_accepted(self) -> bool {
        (0x50..=0x5F).contains(&u8::from(self))
    }

    /// Whether a device answering `request` with `self` counts as a response.
    ///
    /// GET expects GET_RES only. SETC expects SET_RES or SETC_SNA: the
    /// not-accepted answer still carries the per-property outcome.
    pub fn is_response_to(self, request: ServiceCode) -> bool {
        match request {
            ServiceCode::Get => self == ServiceCode::GetRes,
            ServiceCode::SetC => matches!(self, ServiceCode::SetRes | ServiceCode::SetCSna),
            ServiceCode::SetGet => self == ServiceCode::SetGetRes,
            ServiceCode::InfReq => self == ServiceCode::Inf,
            ServiceCode::InfC => self == ServiceCode::InfCRes,
            _ => false,
        }
    }
}

/// One ECHONET Lite frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Transaction ID
    pub tid: u16,
    /// Source object
    pub seoj: ObjectIdentifier,
    /// Destination object
    pub deoj: ObjectIdentifier,
    /// Service code
    pub esv: ServiceCode,
    /// Properties in wire order
    pub properties: Vec<Property>,
}

/// Result of decoding one datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub frame: Frame,
    /// Set when a declared property length ran past the datagram end;
    /// `frame.properties` then holds only the properties before it.
    pub truncated: bool,
}

impl Frame {
    /// Build a controller-originated request
    pub fn request(
        tid: u16,
        deoj: ObjectIdentifier,
        esv: ServiceCode,
        properties: Vec<Property>,
    ) -> Self {
        Self {
            tid,
            seoj: ObjectIdentifier::CONTROLLER,
            deoj,
            esv,
            properties,
        }
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE
            + self
                .properties
                .iter()
                .map(|p| 2 + p.data().len())
                .sum::<usize>()
    }

    /// Look up the first property with the given code
    pub fn property(&self, code: PropertyCode) -> Option<&Property> {
        self.properties.iter().find(|p| p.code == code)
    }

    /// Encode the frame to bytes
    pub fn encode(&self) -> Result<Bytes> {
        if self.properties.len() > MAX_PROPERTIES {
            return Err(FrameError::TooManyProperties {
                count: self.properties.len(),
            });
        }

        let mut buffer = BytesMut::with_capacity(self.encoded_len());
        buffer.put_u8(EHD1);
        buffer.put_u8(EHD2);
        buffer.put_u16(self.tid);
        buffer.put_slice(self.seoj.as_bytes());
        buffer.put_slice(self.deoj.as_bytes());
        buffer.put_u8(self.esv.into());
        buffer.put_u8(self.properties.len() as u8);

        for property in &self.properties {
            buffer.put_u8(property.code.into());
            buffer.put_u8(property.pdc());
            buffer.put_slice(property.data());
        }

        Ok(buffer.freeze())
    }

    /// Decode a frame from a received datagram
    pub fn decode(data: &[u8]) -> Result<DecodedFrame> {
        let too_short = FrameError::TooShort { len: data.len() };
        if data.len() < HEADER_SIZE {
            return Err(too_short);
        }

        let mut buffer = Buffer::new(data);
        let ehd1 = buffer.read_u8().ok_or(too_short.clone())?;
        let ehd2 = buffer.read_u8().ok_or(too_short.clone())?;
        if ehd1 != EHD1 || ehd2 != EHD2 {
            return Err(FrameError::InvalidHeader { ehd1, ehd2 });
        }

        let tid = buffer.read_u16().ok_or(too_short.clone())?;
        let seoj = ObjectIdentifier::from(buffer.read_array::<3>().ok_or(too_short.clone())?);
        let deoj = ObjectIdentifier::from(buffer.read_array::<3>().ok_or(too_short.clone())?);
        let esv = ServiceCode::from(buffer.read_u8().ok_or(too_short.clone())?);
        let opc = buffer.read_u8().ok_or(too_short)?;

        let mut properties = Vec::with_capacity(opc as usize);
        let mut truncated = false;
        for _ in 0..opc {
            match read_property(&mut buffer) {
                Some(property) => properties.push(property),
                None => {
                    truncated = true;
                    break;
                }
            }
        }

        Ok(DecodedFrame {
            frame: Frame {
                tid,
                seoj,
                deoj,
                esv,
                properties,
            },
            truncated,
        })
    }
}

fn read_property(buffer: &mut Buffer<'_>) -> Option<Property> {
    let code = PropertyCode::from(buffer.read_u8()?);
    let pdc = buffer.read_u8()? as usize;
    let edt = buffer.read_bytes(pdc)?;
    Some(Property::from_wire(code, edt))
}

/// Encode a controller request frame
pub fn encode(
    tid: u16,
    deoj: ObjectIdentifier,
    esv: ServiceCode,
    properties: &[Property],
) -> Result<Bytes> {
    Frame::request(tid, deoj, esv, properties.to_vec()).encode()
}

/// Decode a received datagram
pub fn decode(data: &[u8]) -> Result<DecodedFrame> {
    Frame::decode(data)
}
