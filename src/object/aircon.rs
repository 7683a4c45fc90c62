//! Home Air Conditioner Class (0x01 0x30)
//!
//! Value model for the properties a controller reads and writes on an air
//! conditioner. Every decoder preserves codes it does not recognise, so a
//! device reporting a manufacturer-specific mode still round-trips.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::property::{Property, PropertyCode};

/// Lowest set-point accepted by [`AirConditionerCommand::temperature`]
pub const MIN_SET_POINT: u8 = 16;

/// Highest set-point accepted by [`AirConditionerCommand::temperature`]
pub const MAX_SET_POINT: u8 = 30;

/// Lowest numbered air flow level
pub const MIN_AIR_FLOW_LEVEL: u8 = 1;

/// Highest numbered air flow level
pub const MAX_AIR_FLOW_LEVEL: u8 = 8;

const POWER_ON: u8 = 0x30;
const POWER_OFF: u8 = 0x31;
const AIR_FLOW_AUTO: u8 = 0x41;
const AIR_FLOW_LEVEL_BASE: u8 = 0x30;

/// Buzzer data requesting an audible acknowledgement
pub const BUZZER_SOUND: u8 = 0x41;

/// Operation status (EPC 0x80)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Power {
    On,
    Off,
    Unknown(u8),
    /// The essential properties could not be fetched at all
    FetchFailed,
}

impl Power {
    pub fn from_code(code: u8) -> Self {
        match code {
            POWER_ON => Power::On,
            POWER_OFF => Power::Off,
            other => Power::Unknown(other),
        }
    }
}

/// Operation mode (EPC 0xB0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OperationMode {
    Auto,
    Cooling,
    Heating,
    Dehumidify,
    FanOnly,
    Other(u8),
}

impl OperationMode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x41 => OperationMode::Auto,
            0x42 => OperationMode::Cooling,
            0x43 => OperationMode::Heating,
            0x44 => OperationMode::Dehumidify,
            0x45 => OperationMode::FanOnly,
            other => OperationMode::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            OperationMode::Auto => 0x41,
            OperationMode::Cooling => 0x42,
            OperationMode::Heating => 0x43,
            OperationMode::Dehumidify => 0x44,
            OperationMode::FanOnly => 0x45,
            OperationMode::Other(code) => code,
        }
    }
}

/// Air flow rate (EPC 0xA0): automatic or a level from 1 to 8
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AirFlowRate {
    Auto,
    Level(u8),
    Other(u8),
}

impl AirFlowRate {
    pub fn from_code(code: u8) -> Self {
        match code {
            AIR_FLOW_AUTO => AirFlowRate::Auto,
            0x31..=0x38 => AirFlowRate::Level(code - AIR_FLOW_LEVEL_BASE),
            other => AirFlowRate::Other(other),
        }
    }

    /// Wire code; fails for levels outside 1..=8
    pub fn code(self) -> Result<u8, CommandError> {
        match self {
            AirFlowRate::Auto => Ok(AIR_FLOW_AUTO),
            AirFlowRate::Level(level @ MIN_AIR_FLOW_LEVEL..=MAX_AIR_FLOW_LEVEL) => {
                Ok(AIR_FLOW_LEVEL_BASE + level)
            }
            AirFlowRate::Level(level) => Err(CommandError::AirFlowLevelOutOfRange(level)),
            AirFlowRate::Other(code) => Ok(code),
        }
    }
}

/// Vertical air flow direction (EPC 0xA4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VerticalAirFlow {
    Top,
    UpperMiddle,
    Center,
    LowerMiddle,
    Bottom,
    Other(u8),
}

impl VerticalAirFlow {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x41 => VerticalAirFlow::Top,
            0x44 => VerticalAirFlow::UpperMiddle,
            0x43 => VerticalAirFlow::Center,
            0x45 => VerticalAirFlow::LowerMiddle,
            0x42 => VerticalAirFlow::Bottom,
            other => VerticalAirFlow::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            VerticalAirFlow::Top => 0x41,
            VerticalAirFlow::UpperMiddle => 0x44,
            VerticalAirFlow::Center => 0x43,
            VerticalAirFlow::LowerMiddle => 0x45,
            VerticalAirFlow::Bottom => 0x42,
            VerticalAirFlow::Other(code) => code,
        }
    }
}

/// Horizontal air flow direction (EPC 0xA5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum HorizontalAirFlow {
    Left,
    Center,
    Right,
    LeftRight,
    Other(u8),
}

impl HorizontalAirFlow {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x42 => HorizontalAirFlow::Left,
            0x43 => HorizontalAirFlow::Center,
            0x41 => HorizontalAirFlow::Right,
            0x44 => HorizontalAirFlow::LeftRight,
            other => HorizontalAirFlow::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            HorizontalAirFlow::Left => 0x42,
            HorizontalAirFlow::Center => 0x43,
            HorizontalAirFlow::Right => 0x41,
            HorizontalAirFlow::LeftRight => 0x44,
            HorizontalAirFlow::Other(code) => code,
        }
    }
}

/// Queried state of one air conditioner.
///
/// `None` means the property is unsupported or was not retrieved, which is
/// different from a retrieved zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AirConditionerState {
    pub power: Option<Power>,
    pub mode: Option<OperationMode>,
    pub set_point: Option<u8>,
    pub fan_speed: Option<AirFlowRate>,
    pub room_temperature: Option<i8>,
    pub outdoor_temperature: Option<i8>,
    pub humidity: Option<u8>,
    pub vertical_air_flow: Option<VerticalAirFlow>,
    pub horizontal_air_flow: Option<HorizontalAirFlow>,
}

impl AirConditionerState {
    /// Fill the field matching `property`; empty data and unrelated codes
    /// leave the state unchanged.
    pub fn apply(&mut self, property: &Property) {
        let Some(value) = property.first_byte() else {
            return;
        };

        match property.code {
            PropertyCode::OperationStatus => self.power = Some(Power::from_code(value)),
            PropertyCode::OperationMode => self.mode = Some(OperationMode::from_code(value)),
            PropertyCode::TemperatureSetting => self.set_point = Some(value),
            PropertyCode::AirFlowRate => self.fan_speed = Some(AirFlowRate::from_code(value)),
            PropertyCode::MeasuredRoomTemperature => self.room_temperature = Some(value as i8),
            PropertyCode::MeasuredOutdoorTemperature => {
                self.outdoor_temperature = Some(value as i8)
            }
            PropertyCode::MeasuredRelativeHumidity => self.humidity = Some(value),
            PropertyCode::AirFlowDirectionVertical => {
                self.vertical_air_flow = Some(VerticalAirFlow::from_code(value))
            }
            PropertyCode::AirFlowDirectionHorizontal => {
                self.horizontal_air_flow = Some(HorizontalAirFlow::from_code(value))
            }
            _ => {}
        }
    }

    /// State with every field empty except power, which marks the failure
    pub fn unreachable() -> Self {
        Self {
            power: Some(Power::FetchFailed),
            ..Default::default()
        }
    }
}

/// Out-of-range command values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("set-point {0}°C outside 16..=30")]
    SetPointOutOfRange(u8),
    #[error("air flow level {0} outside 1..=8")]
    AirFlowLevelOutOfRange(u8),
}

/// A single write to an air conditioner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case", tag = "command", content = "value"))]
pub enum AirConditionerCommand {
    Power(bool),
    Mode(OperationMode),
    SetPoint(u8),
    FanSpeed(AirFlowRate),
    VerticalAirFlow(VerticalAirFlow),
    HorizontalAirFlow(HorizontalAirFlow),
}

impl AirConditionerCommand {
    /// Set-point command, validated against the supported range
    pub fn temperature(celsius: u8) -> Result<Self, CommandError> {
        if !(MIN_SET_POINT..=MAX_SET_POINT).contains(&celsius) {
            return Err(CommandError::SetPointOutOfRange(celsius));
        }
        Ok(Self::SetPoint(celsius))
    }

    /// Fan speed command for a numbered level
    pub fn fan_level(level: u8) -> Result<Self, CommandError> {
        let rate = AirFlowRate::Level(level);
        rate.code()?;
        Ok(Self::FanSpeed(rate))
    }

    /// The (EPC, EDT) pair this command writes.
    ///
    /// Ranges are checked here as well as in the constructors, since a
    /// command may also be built directly or deserialized.
    pub fn to_property(self) -> Result<(PropertyCode, u8), CommandError> {
        let property = match self {
            AirConditionerCommand::Power(true) => (PropertyCode::OperationStatus, POWER_ON),
            AirConditionerCommand::Power(false) => (PropertyCode::OperationStatus, POWER_OFF),
            AirConditionerCommand::Mode(mode) => (PropertyCode::OperationMode, mode.code()),
            AirConditionerCommand::SetPoint(celsius) => {
                if !(MIN_SET_POINT..=MAX_SET_POINT).contains(&celsius) {
                    return Err(CommandError::SetPointOutOfRange(celsius));
                }
                (PropertyCode::TemperatureSetting, celsius)
            }
            AirConditionerCommand::FanSpeed(rate) => (PropertyCode::AirFlowRate, rate.code()?),
            AirConditionerCommand::VerticalAirFlow(direction) => {
                (PropertyCode::AirFlowDirectionVertical, direction.code())
            }
            AirConditionerCommand::HorizontalAirFlow(direction) => {
                (PropertyCode::AirFlowDirectionHorizontal, direction.code())
            }
        };
        Ok(property)
    }
}

/// Whether a write turns the unit off (no buzzer acknowledgement then)
pub fn is_power_off(code: PropertyCode, data: &[u8]) -> bool {
    code == PropertyCode::OperationStatus && data.first() == Some(&POWER_OFF)
}
