//! Value types nested inside packet bodies.

use super::{
    compact_mac, expand_mac, format_float, format_optional, parse_field, parse_optional,
    parse_timestamp,
};
use crate::args::ArgumentMap;
use crate::envelope;
use crate::error::ProtocolError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// GNSS fix reported by a device. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Position {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    /// Speed in km/h.
    pub speed: Option<f64>,
    /// Heading in degrees.
    pub direction: Option<f64>,
    pub satellite_count: Option<u32>,
    /// Horizontal dilution of precision.
    pub hdop: Option<f64>,
}

/// Number of wire fields a [`Position`] occupies.
pub(crate) const POSITION_FIELDS: usize = 7;

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Default::default()
        }
    }

    /// Renders the seven position fields, each followed by `;`.
    pub(crate) fn write_fields(&self, out: &mut String) {
        for value in [
            format_optional(self.latitude, format_float),
            format_optional(self.longitude, format_float),
            format_optional(self.altitude, format_float),
            format_optional(self.speed, format_float),
            format_optional(self.direction, format_float),
            format_optional(self.satellite_count, |n| n.to_string()),
            format_optional(self.hdop, format_float),
        ] {
            out.push_str(&value);
            out.push(';');
        }
    }

    pub(crate) fn read_fields(parts: &[&str]) -> Result<Self, ProtocolError> {
        debug_assert_eq!(parts.len(), POSITION_FIELDS);
        Ok(Self {
            latitude: parse_optional(parts[0], "latitude")?,
            longitude: parse_optional(parts[1], "longitude")?,
            altitude: parse_optional(parts[2], "altitude")?,
            speed: parse_optional(parts[3], "speed")?,
            direction: parse_optional(parts[4], "direction")?,
            satellite_count: parse_optional(parts[5], "satellite count")?,
            hdop: parse_optional(parts[6], "hdop")?,
        })
    }
}

/// Firmware release channel of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FirmwareBranch {
    #[default]
    Stable,
    Development,
}

impl FirmwareBranch {
    pub fn as_wire(&self) -> &'static str {
        match self {
            FirmwareBranch::Stable => "0",
            FirmwareBranch::Development => "1",
        }
    }

    pub fn from_wire(raw: &str) -> Result<Self, ProtocolError> {
        match raw {
            "0" => Ok(FirmwareBranch::Stable),
            "1" => Ok(FirmwareBranch::Development),
            _ => Err(ProtocolError::invalid_field("firmware branch", raw)),
        }
    }
}

/// Manufacturer-specific data advertised by a BLE peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BleManufacturerData {
    pub company_id: u16,
    pub data: Vec<u8>,
}

/// Service data advertised by a BLE peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BleServiceData {
    /// 16-bit service UUID.
    pub uuid: u16,
    pub data: Vec<u8>,
}

/// One scan record of a BLE peripheral detected by the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BleAdvertisement {
    /// MAC address of the detected peripheral, `AA:BB:CC:DD:EE:FF`.
    pub mac_address: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub model: String,
    pub device_name: String,
    pub rssi: i32,
    pub tx_power: Option<i32>,
    pub manufacturer_data: Vec<BleManufacturerData>,
    pub service_data: Vec<BleServiceData>,
}

/// Number of `;`-separated tokens in an advertisement block, checksum included.
pub(crate) const ADVERTISEMENT_FIELDS: usize = 12;

impl BleAdvertisement {
    /// Renders the block `mac;timestamp;...;svcData;CRC`.
    pub(crate) fn write_block(&self) -> String {
        let manufacturer = self
            .manufacturer_data
            .iter()
            .map(|d| format!("{:04X}:{}", d.company_id, hex::encode_upper(&d.data)))
            .collect::<Vec<_>>()
            .join(",");
        let service = self
            .service_data
            .iter()
            .map(|d| format!("{:04X}:{}", d.uuid, hex::encode_upper(&d.data)))
            .collect::<Vec<_>>()
            .join(",");

        let content = format!(
            "{};{};{};{};{};{};{};{};{};{};{};",
            compact_mac(&self.mac_address),
            self.timestamp.timestamp(),
            format_optional(self.latitude, format_float),
            format_optional(self.longitude, format_float),
            format_optional(self.altitude, format_float),
            self.model,
            self.device_name,
            self.rssi,
            format_optional(self.tx_power, |p| p.to_string()),
            manufacturer,
            service,
        );
        envelope::seal_block(&content)
    }

    /// Parses one block of [`ADVERTISEMENT_FIELDS`] tokens, verifying its
    /// own checksum first.
    pub(crate) fn read_block(parts: &[&str]) -> Result<Self, ProtocolError> {
        debug_assert_eq!(parts.len(), ADVERTISEMENT_FIELDS);
        let block = parts.join(";");
        envelope::open_block(&block)?;
        let fields = &parts[..ADVERTISEMENT_FIELDS - 1];

        Ok(Self {
            mac_address: expand_mac(fields[0])?,
            timestamp: parse_timestamp(fields[1])?,
            latitude: parse_optional(fields[2], "latitude")?,
            longitude: parse_optional(fields[3], "longitude")?,
            altitude: parse_optional(fields[4], "altitude")?,
            model: fields[5].to_string(),
            device_name: fields[6].to_string(),
            rssi: parse_field(fields[7], "rssi")?,
            tx_power: parse_optional(fields[8], "tx power")?,
            manufacturer_data: parse_payloads(fields[9], "company id")?
                .into_iter()
                .map(|(company_id, data)| BleManufacturerData { company_id, data })
                .collect(),
            service_data: parse_payloads(fields[10], "service uuid")?
                .into_iter()
                .map(|(uuid, data)| BleServiceData { uuid, data })
                .collect(),
        })
    }
}

/// Parses `,`-joined `id:hexbytes` pairs. Empty tokens are skipped.
fn parse_payloads(raw: &str, id_field: &'static str) -> Result<Vec<(u16, Vec<u8>)>, ProtocolError> {
    raw.split(',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            let (id, data) = token
                .split_once(':')
                .ok_or_else(|| ProtocolError::invalid_field(id_field, token))?;
            let id = u16::from_str_radix(id, 16)
                .map_err(|_| ProtocolError::invalid_field(id_field, id))?;
            let data =
                hex::decode(data).map_err(|_| ProtocolError::invalid_field("payload", data))?;
            Ok((id, data))
        })
        .collect()
}

/// A BLE peripheral the server asks the device to watch for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BleData {
    /// MAC address, `AA:BB:CC:DD:EE:FF`.
    pub mac_address: String,
    pub model: String,
}

/// A queued instruction from the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandDefinition {
    /// Unique command id, echoed back in the `Pc` response.
    pub command_id: i64,
    pub command_name: String,
    pub args: ArgumentMap,
}

/// Number of `;`-separated tokens in a command block, checksum included.
pub(crate) const COMMAND_FIELDS: usize = 4;

impl CommandDefinition {
    pub fn new(command_id: i64, command_name: impl Into<String>) -> Self {
        Self {
            command_id,
            command_name: command_name.into(),
            args: ArgumentMap::new(),
        }
    }

    pub fn with_args(mut self, args: ArgumentMap) -> Self {
        self.args = args;
        self
    }

    /// Renders `id;name;args;CRC`.
    pub(crate) fn write_block(&self) -> String {
        let content = format!(
            "{};{};{};",
            self.command_id,
            self.command_name,
            self.args.encode()
        );
        envelope::seal_block(&content)
    }

    pub(crate) fn read_block(parts: &[&str]) -> Result<Self, ProtocolError> {
        debug_assert_eq!(parts.len(), COMMAND_FIELDS);
        let block = parts.join(";");
        envelope::open_block(&block)?;

        Ok(Self {
            command_id: parse_field(parts[0], "command id")?,
            command_name: parts[1].to_string(),
            args: ArgumentMap::parse(parts[2]),
        })
    }
}
