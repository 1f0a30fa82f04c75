//! Device → server packets.

use super::types::{ADVERTISEMENT_FIELDS, POSITION_FIELDS};
use super::{
    parse_field, parse_timestamp, BleAdvertisement, FirmwareBranch, PacketBody, Position, Tag,
};
use crate::args::ArgumentMap;
use crate::envelope::{self, FIELD_SEPARATOR};
use crate::error::ProtocolError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Authentication request, the first packet of every TCP session.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct PaPacket {
    pub ident: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl PaPacket {
    pub fn new(ident: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ident: ident.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for PaPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaPacket")
            .field("ident", &self.ident)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl PacketBody for PaPacket {
    const TAG: Tag = Tag::Pa;

    fn write_body(&self) -> String {
        format!("{};{};", self.ident, self.password)
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        let parts = envelope::fields(content, Self::TAG, 2)?;
        Ok(Self::new(parts[0], parts[1]))
    }
}

/// Batch of BLE advertisements collected by the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PbPacket {
    pub advertisements: Vec<BleAdvertisement>,
}

impl PacketBody for PbPacket {
    const TAG: Tag = Tag::Pb;

    fn write_body(&self) -> String {
        let blocks: Vec<String> = self
            .advertisements
            .iter()
            .map(BleAdvertisement::write_block)
            .collect();
        format!("{};", blocks.join(";"))
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        if content.is_empty() {
            return Ok(Self::default());
        }

        let parts: Vec<&str> = content.split(FIELD_SEPARATOR).collect();
        if parts.len() % ADVERTISEMENT_FIELDS != 0 {
            return Err(ProtocolError::TokenCount {
                tag: Self::TAG.as_str(),
                expected: (parts.len() / ADVERTISEMENT_FIELDS + 1) * ADVERTISEMENT_FIELDS,
                actual: parts.len(),
            });
        }

        let advertisements = parts
            .chunks(ADVERTISEMENT_FIELDS)
            .map(BleAdvertisement::read_block)
            .collect::<Result<_, _>>()?;
        Ok(Self { advertisements })
    }
}

/// Response to a command previously delivered in an `Ac` packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PcPacket {
    pub timestamp: DateTime<Utc>,
    pub command_id: i64,
    pub message: String,
}

impl PacketBody for PcPacket {
    const TAG: Tag = Tag::Pc;

    fn write_body(&self) -> String {
        format!(
            "{};{};{};",
            self.timestamp.timestamp(),
            self.command_id,
            self.message
        )
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        let parts = envelope::fields(content, Self::TAG, 3)?;
        Ok(Self {
            timestamp: parse_timestamp(parts[0])?,
            command_id: parse_field(parts[1], "command id")?,
            message: parts[2].to_string(),
        })
    }
}

/// Telemetry sample: position fix plus sensor readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdPacket {
    pub timestamp: DateTime<Utc>,
    pub position: Position,
    pub extra_args: ArgumentMap,
}

impl PacketBody for PdPacket {
    const TAG: Tag = Tag::Pd;

    fn write_body(&self) -> String {
        let mut out = format!("{};", self.timestamp.timestamp());
        self.position.write_fields(&mut out);
        out.push_str(&self.extra_args.encode());
        out.push(FIELD_SEPARATOR);
        out
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        let parts = envelope::fields(content, Self::TAG, POSITION_FIELDS + 2)?;
        Ok(Self {
            timestamp: parse_timestamp(parts[0])?,
            position: Position::read_fields(&parts[1..=POSITION_FIELDS])?,
            extra_args: ArgumentMap::parse(parts[POSITION_FIELDS + 1]),
        })
    }
}

/// Device identification: firmware and hardware descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PiPacket {
    pub ident: String,
    pub firmware_id: String,
    pub firmware_build: i64,
    pub device_id: i64,
    pub hardware_id: i64,
    pub model_id: i64,
    pub firmware_branch: FirmwareBranch,
    pub fota_enabled: bool,
}

impl PacketBody for PiPacket {
    const TAG: Tag = Tag::Pi;

    fn write_body(&self) -> String {
        format!(
            "{};{};{};{};{};{};{};{};",
            self.ident,
            self.firmware_id,
            self.firmware_build,
            self.device_id,
            self.hardware_id,
            self.model_id,
            self.firmware_branch.as_wire(),
            self.fota_enabled,
        )
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        let parts = envelope::fields(content, Self::TAG, 8)?;
        let fota_enabled = match parts[7] {
            "true" | "1" => true,
            "false" | "0" => false,
            other => return Err(ProtocolError::invalid_field("fota enabled", other)),
        };

        Ok(Self {
            ident: parts[0].to_string(),
            firmware_id: parts[1].to_string(),
            firmware_build: parse_field(parts[2], "firmware build")?,
            device_id: parse_field(parts[3], "device id")?,
            hardware_id: parse_field(parts[4], "hardware id")?,
            model_id: parse_field(parts[5], "model id")?,
            firmware_branch: FirmwareBranch::from_wire(parts[6])?,
            fota_enabled,
        })
    }
}

/// Media upload: a file carried inline as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PmPacket {
    pub filename: String,
    pub content_type: String,
    #[serde(skip_serializing)]
    pub data: Vec<u8>,
}

impl PacketBody for PmPacket {
    const TAG: Tag = Tag::Pm;

    fn write_body(&self) -> String {
        format!(
            "{};{};{};",
            self.filename,
            self.content_type,
            BASE64.encode(&self.data)
        )
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        let parts = envelope::fields(content, Self::TAG, 3)?;
        let data = BASE64
            .decode(parts[2])
            .map_err(|_| ProtocolError::invalid_field("media data", parts[2]))?;

        Ok(Self {
            filename: parts[0].to_string(),
            content_type: parts[1].to_string(),
            data,
        })
    }
}

/// Reboot notice. Carries no fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrPacket;

impl PacketBody for PrPacket {
    const TAG: Tag = Tag::Pr;

    fn write_body(&self) -> String {
        ";".to_string()
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        let parts = envelope::fields(content, Self::TAG, 1)?;
        if !parts[0].is_empty() {
            return Err(ProtocolError::invalid_field("payload", parts[0]));
        }
        Ok(PrPacket)
    }
}

/// Settings report: the device's current configuration as an argument map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsPacket {
    pub timestamp: DateTime<Utc>,
    pub params: ArgumentMap,
}

impl PacketBody for PsPacket {
    const TAG: Tag = Tag::Ps;

    fn write_body(&self) -> String {
        format!("{};{};", self.timestamp.timestamp(), self.params.encode())
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        let parts = envelope::fields(content, Self::TAG, 2)?;
        Ok(Self {
            timestamp: parse_timestamp(parts[0])?,
            params: ArgumentMap::parse(parts[1]),
        })
    }
}
