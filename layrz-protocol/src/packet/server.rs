//! Server → device packets.

use super::types::COMMAND_FIELDS;
use super::{
    compact_mac, expand_mac, parse_timestamp, BleData, CommandDefinition, PacketBody, Tag,
};
use crate::envelope::{self, FIELD_SEPARATOR};
use crate::error::ProtocolError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// BLE peripherals the device should watch for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AbPacket {
    pub devices: Vec<BleData>,
}

impl PacketBody for AbPacket {
    const TAG: Tag = Tag::Ab;

    fn write_body(&self) -> String {
        let mut out = String::new();
        for device in &self.devices {
            out.push_str(&compact_mac(&device.mac_address));
            out.push(':');
            out.push_str(&device.model);
            out.push(FIELD_SEPARATOR);
        }
        if out.is_empty() {
            out.push(FIELD_SEPARATOR);
        }
        out
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        if content.is_empty() {
            return Ok(Self::default());
        }

        let devices = content
            .split(FIELD_SEPARATOR)
            .map(|pair| {
                let (mac, model) = pair
                    .split_once(':')
                    .ok_or_else(|| ProtocolError::invalid_field("ble device", pair))?;
                Ok(BleData {
                    mac_address: expand_mac(mac)?,
                    model: model.to_string(),
                })
            })
            .collect::<Result<_, ProtocolError>>()?;
        Ok(Self { devices })
    }
}

/// Queued commands for the device, each block checksummed on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcPacket {
    pub commands: Vec<CommandDefinition>,
}

impl PacketBody for AcPacket {
    const TAG: Tag = Tag::Ac;

    fn write_body(&self) -> String {
        let blocks: Vec<String> = self
            .commands
            .iter()
            .map(CommandDefinition::write_block)
            .collect();
        format!("{};", blocks.join(";"))
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        if content.is_empty() {
            return Ok(Self::default());
        }

        let parts: Vec<&str> = content.split(FIELD_SEPARATOR).collect();
        if parts.len() % COMMAND_FIELDS != 0 {
            return Err(ProtocolError::TokenCount {
                tag: Self::TAG.as_str(),
                expected: (parts.len() / COMMAND_FIELDS + 1) * COMMAND_FIELDS,
                actual: parts.len(),
            });
        }

        let commands = parts
            .chunks(COMMAND_FIELDS)
            .map(CommandDefinition::read_block)
            .collect::<Result<_, _>>()?;
        Ok(Self { commands })
    }
}

/// Acknowledges a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AoPacket {
    pub timestamp: DateTime<Utc>,
}

impl PacketBody for AoPacket {
    const TAG: Tag = Tag::Ao;

    fn write_body(&self) -> String {
        format!("{};", self.timestamp.timestamp())
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        let parts = envelope::fields(content, Self::TAG, 1)?;
        Ok(Self {
            timestamp: parse_timestamp(parts[0])?,
        })
    }
}

/// Rejects the last packet, with a human readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArPacket {
    pub reason: String,
}

impl PacketBody for ArPacket {
    const TAG: Tag = Tag::Ar;

    fn write_body(&self) -> String {
        format!("{};", self.reason)
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        let parts = envelope::fields(content, Self::TAG, 1)?;
        Ok(Self {
            reason: parts[0].to_string(),
        })
    }
}

fn read_empty(content: &str, tag: Tag) -> Result<(), ProtocolError> {
    let parts = envelope::fields(content, tag, 1)?;
    if !parts[0].is_empty() {
        return Err(ProtocolError::invalid_field("payload", parts[0]));
    }
    Ok(())
}

/// Authentication accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AsPacket;

impl PacketBody for AsPacket {
    const TAG: Tag = Tag::As;

    fn write_body(&self) -> String {
        ";".to_string()
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        read_empty(content, Self::TAG).map(|_| AsPacket)
    }
}

/// Authentication rejected. Superseded by `Ar`; receivers only log it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuPacket;

impl PacketBody for AuPacket {
    const TAG: Tag = Tag::Au;

    fn write_body(&self) -> String {
        ";".to_string()
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        read_empty(content, Self::TAG).map(|_| AuPacket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgumentMap;

    #[test]
    fn test_ab_reference_vector() {
        let raw = "<Ab>000000000000:MODEL1;000000000001:MODEL2;7DA8</Ab>";
        let packet = AbPacket {
            devices: vec![
                BleData {
                    mac_address: "00:00:00:00:00:00".to_string(),
                    model: "MODEL1".to_string(),
                },
                BleData {
                    mac_address: "00:00:00:00:00:01".to_string(),
                    model: "MODEL2".to_string(),
                },
            ],
        };
        assert_eq!(packet.to_packet(), raw);
        assert_eq!(AbPacket::from_packet(raw).unwrap(), packet);
    }

    #[test]
    fn test_ab_empty() {
        assert_eq!(AbPacket::default().to_packet(), "<Ab>;7F28</Ab>");
        assert!(AbPacket::from_packet("<Ab>;7F28</Ab>")
            .unwrap()
            .devices
            .is_empty());
    }

    #[test]
    fn test_ab_missing_model_separator() {
        let raw = envelope::seal(Tag::Ab, "000000000000;");
        assert!(matches!(
            AbPacket::from_packet(&raw),
            Err(ProtocolError::InvalidField { field: "ble device", .. })
        ));
    }

    #[test]
    fn test_ac_two_level_checksum() {
        let packet = AcPacket {
            commands: vec![
                CommandDefinition::new(1, "reboot"),
                CommandDefinition::new(2, "set_config")
                    .with_args(ArgumentMap::new().with("interval", 60)),
            ],
        };
        let raw = packet.to_packet();
        assert_eq!(AcPacket::from_packet(&raw).unwrap(), packet);

        // Each block carries its own checksum over `id;name;args;`.
        let inner = envelope::seal_block("1;reboot;;");
        assert!(raw.starts_with(&format!("<Ac>{};", inner)));
    }

    #[test]
    fn test_ac_every_bit_flip_detected() {
        let packet = AcPacket {
            commands: vec![
                CommandDefinition::new(1, "reboot"),
                CommandDefinition::new(42, "set_config")
                    .with_args(ArgumentMap::new().with("interval", 60).with("mode", "eco")),
            ],
        };
        crate::packet::assert_bit_flips_detected(&packet);
    }

    #[test]
    fn test_ac_inner_checksum_mismatch() {
        // Outer checksum is valid, inner one is not.
        let raw = envelope::seal(Tag::Ac, "1;reboot;;0000;");
        assert!(matches!(
            AcPacket::from_packet(&raw),
            Err(ProtocolError::ChecksumMismatch { received: 0, .. })
        ));
    }

    #[test]
    fn test_ac_empty() {
        assert!(AcPacket::from_packet("<Ac>;7F28</Ac>")
            .unwrap()
            .commands
            .is_empty());
    }

    #[test]
    fn test_ao_roundtrip() {
        let packet = AoPacket {
            timestamp: DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap(),
        };
        let raw = packet.to_packet();
        assert!(raw.starts_with("<Ao>1735689600;"));
        assert_eq!(AoPacket::from_packet(&raw).unwrap(), packet);
    }

    #[test]
    fn test_ar_reason() {
        let packet = ArPacket {
            reason: "invalid credentials".to_string(),
        };
        assert_eq!(ArPacket::from_packet(&packet.to_packet()).unwrap(), packet);
    }

    #[test]
    fn test_degenerate_packets() {
        assert_eq!(AsPacket.to_packet(), "<As>;7F28</As>");
        assert_eq!(AuPacket.to_packet(), "<Au>;7F28</Au>");
        assert_eq!(AsPacket::from_packet("<As>;7F28</As>").unwrap(), AsPacket);
        assert_eq!(AuPacket::from_packet("<Au>;7F28</Au>").unwrap(), AuPacket);

        let raw = envelope::seal(Tag::As, "ok;");
        assert!(AsPacket::from_packet(&raw).is_err());
        assert!(matches!(
            AsPacket::from_packet("<As>;0000</As>"),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }
}
