//! Packet variant catalog.
//!
//! Every packet is identified by a two-letter tag which fixes its direction
//! and body grammar. Device→server packets form [`ClientPacket`],
//! server→device packets form [`ServerPacket`].

mod client;
mod server;
mod trip;
mod types;

pub use client::{
    PaPacket, PbPacket, PcPacket, PdPacket, PiPacket, PmPacket, PrPacket, PsPacket,
};
pub use server::{AbPacket, AcPacket, AoPacket, ArPacket, AsPacket, AuPacket};
pub use trip::{TePacket, TsPacket};
pub use types::{
    BleAdvertisement, BleData, BleManufacturerData, BleServiceData, CommandDefinition,
    FirmwareBranch, Position,
};

use crate::envelope;
use crate::error::ProtocolError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Packet tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Tag {
    // Device → server
    Pa,
    Pb,
    Pc,
    Pd,
    Pi,
    Pm,
    Pr,
    Ps,
    Ts,
    Te,

    // Server → device
    Ab,
    Ac,
    Ao,
    Ar,
    As,
    Au,
}

/// Direction a packet travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    DeviceToServer,
    ServerToDevice,
}

impl Direction {
    /// First letters of the tags travelling in this direction.
    pub fn tag_leads(&self) -> &'static [u8] {
        match self {
            Direction::DeviceToServer => b"PT",
            Direction::ServerToDevice => b"A",
        }
    }
}

impl Tag {
    pub const ALL: [Tag; 16] = [
        Tag::Pa,
        Tag::Pb,
        Tag::Pc,
        Tag::Pd,
        Tag::Pi,
        Tag::Pm,
        Tag::Pr,
        Tag::Ps,
        Tag::Ts,
        Tag::Te,
        Tag::Ab,
        Tag::Ac,
        Tag::Ao,
        Tag::Ar,
        Tag::As,
        Tag::Au,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Pa => "Pa",
            Tag::Pb => "Pb",
            Tag::Pc => "Pc",
            Tag::Pd => "Pd",
            Tag::Pi => "Pi",
            Tag::Pm => "Pm",
            Tag::Pr => "Pr",
            Tag::Ps => "Ps",
            Tag::Ts => "Ts",
            Tag::Te => "Te",
            Tag::Ab => "Ab",
            Tag::Ac => "Ac",
            Tag::Ao => "Ao",
            Tag::Ar => "Ar",
            Tag::As => "As",
            Tag::Au => "Au",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Tag::Ab | Tag::Ac | Tag::Ao | Tag::Ar | Tag::As | Tag::Au => Direction::ServerToDevice,
            _ => Direction::DeviceToServer,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownTag(s.to_string()))
    }
}

/// Body grammar of a single packet variant.
///
/// Implementors describe only the field list; sealing, tag matching and
/// checksum verification are shared.
pub trait PacketBody: Sized {
    const TAG: Tag;

    /// Writes the body content, up to and including the separator that
    /// precedes the checksum.
    fn write_body(&self) -> String;

    /// Reads the body from verified content (trailing separator removed).
    fn read_body(content: &str) -> Result<Self, ProtocolError>;

    /// Encodes the packet into its wire representation.
    fn to_packet(&self) -> String {
        envelope::seal(Self::TAG, &self.write_body())
    }

    /// Decodes a packet from its wire representation.
    fn from_packet(raw: &str) -> Result<Self, ProtocolError> {
        let content = envelope::open(raw, Self::TAG)?;
        Self::read_body(content)
    }
}

/// Packets sent from a device to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tag", content = "packet")]
pub enum ClientPacket {
    Pa(PaPacket),
    Pb(PbPacket),
    Pc(PcPacket),
    Pd(PdPacket),
    Pi(PiPacket),
    Pm(PmPacket),
    Pr(PrPacket),
    Ps(PsPacket),
    Ts(TsPacket),
    Te(TePacket),
}

/// Packets sent from the server to a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tag", content = "packet")]
pub enum ServerPacket {
    Ab(AbPacket),
    Ac(AcPacket),
    Ao(AoPacket),
    Ar(ArPacket),
    As(AsPacket),
    Au(AuPacket),
}

/// Any packet of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Packet {
    Client(ClientPacket),
    Server(ServerPacket),
}

impl ClientPacket {
    pub fn tag(&self) -> Tag {
        match self {
            ClientPacket::Pa(_) => Tag::Pa,
            ClientPacket::Pb(_) => Tag::Pb,
            ClientPacket::Pc(_) => Tag::Pc,
            ClientPacket::Pd(_) => Tag::Pd,
            ClientPacket::Pi(_) => Tag::Pi,
            ClientPacket::Pm(_) => Tag::Pm,
            ClientPacket::Pr(_) => Tag::Pr,
            ClientPacket::Ps(_) => Tag::Ps,
            ClientPacket::Ts(_) => Tag::Ts,
            ClientPacket::Te(_) => Tag::Te,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            ClientPacket::Pa(p) => p.to_packet(),
            ClientPacket::Pb(p) => p.to_packet(),
            ClientPacket::Pc(p) => p.to_packet(),
            ClientPacket::Pd(p) => p.to_packet(),
            ClientPacket::Pi(p) => p.to_packet(),
            ClientPacket::Pm(p) => p.to_packet(),
            ClientPacket::Pr(p) => p.to_packet(),
            ClientPacket::Ps(p) => p.to_packet(),
            ClientPacket::Ts(p) => p.to_packet(),
            ClientPacket::Te(p) => p.to_packet(),
        }
    }

    /// Decodes a device→server packet, dispatching on its tag.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Packet::expect_direction(raw, Direction::DeviceToServer)?;
        match Packet::decode(raw)? {
            Packet::Client(packet) => Ok(packet),
            Packet::Server(packet) => Err(ProtocolError::UnknownTag(packet.tag().to_string())),
        }
    }
}

impl ServerPacket {
    pub fn tag(&self) -> Tag {
        match self {
            ServerPacket::Ab(_) => Tag::Ab,
            ServerPacket::Ac(_) => Tag::Ac,
            ServerPacket::Ao(_) => Tag::Ao,
            ServerPacket::Ar(_) => Tag::Ar,
            ServerPacket::As(_) => Tag::As,
            ServerPacket::Au(_) => Tag::Au,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            ServerPacket::Ab(p) => p.to_packet(),
            ServerPacket::Ac(p) => p.to_packet(),
            ServerPacket::Ao(p) => p.to_packet(),
            ServerPacket::Ar(p) => p.to_packet(),
            ServerPacket::As(p) => p.to_packet(),
            ServerPacket::Au(p) => p.to_packet(),
        }
    }

    /// Decodes a server→device packet, dispatching on its tag.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Packet::expect_direction(raw, Direction::ServerToDevice)?;
        match Packet::decode(raw)? {
            Packet::Server(packet) => Ok(packet),
            Packet::Client(packet) => Err(ProtocolError::UnknownTag(packet.tag().to_string())),
        }
    }
}

impl Packet {
    fn peek(raw: &str) -> Result<Tag, ProtocolError> {
        envelope::peek_tag(raw)
            .ok_or_else(|| ProtocolError::UnknownTag(raw.chars().take(4).collect()))?
            .parse()
    }

    /// Rejects a packet of the other direction before its body is parsed.
    fn expect_direction(raw: &str, direction: Direction) -> Result<(), ProtocolError> {
        let tag = Self::peek(raw)?;
        if tag.direction() != direction {
            return Err(ProtocolError::UnknownTag(tag.to_string()));
        }
        Ok(())
    }

    pub fn tag(&self) -> Tag {
        match self {
            Packet::Client(p) => p.tag(),
            Packet::Server(p) => p.tag(),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Client(p) => p.encode(),
            Packet::Server(p) => p.encode(),
        }
    }

    /// Decodes any packet, dispatching on its tag.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let tag = Self::peek(raw)?;

        let packet = match tag {
            Tag::Pa => Packet::Client(ClientPacket::Pa(PaPacket::from_packet(raw)?)),
            Tag::Pb => Packet::Client(ClientPacket::Pb(PbPacket::from_packet(raw)?)),
            Tag::Pc => Packet::Client(ClientPacket::Pc(PcPacket::from_packet(raw)?)),
            Tag::Pd => Packet::Client(ClientPacket::Pd(PdPacket::from_packet(raw)?)),
            Tag::Pi => Packet::Client(ClientPacket::Pi(PiPacket::from_packet(raw)?)),
            Tag::Pm => Packet::Client(ClientPacket::Pm(PmPacket::from_packet(raw)?)),
            Tag::Pr => Packet::Client(ClientPacket::Pr(PrPacket::from_packet(raw)?)),
            Tag::Ps => Packet::Client(ClientPacket::Ps(PsPacket::from_packet(raw)?)),
            Tag::Ts => Packet::Client(ClientPacket::Ts(TsPacket::from_packet(raw)?)),
            Tag::Te => Packet::Client(ClientPacket::Te(TePacket::from_packet(raw)?)),
            Tag::Ab => Packet::Server(ServerPacket::Ab(AbPacket::from_packet(raw)?)),
            Tag::Ac => Packet::Server(ServerPacket::Ac(AcPacket::from_packet(raw)?)),
            Tag::Ao => Packet::Server(ServerPacket::Ao(AoPacket::from_packet(raw)?)),
            Tag::Ar => Packet::Server(ServerPacket::Ar(ArPacket::from_packet(raw)?)),
            Tag::As => Packet::Server(ServerPacket::As(AsPacket::from_packet(raw)?)),
            Tag::Au => Packet::Server(ServerPacket::Au(AuPacket::from_packet(raw)?)),
        };
        Ok(packet)
    }
}

macro_rules! impl_from_variant {
    ($outer:ident, $($variant:ident => $ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for $outer {
                fn from(packet: $ty) -> Self {
                    $outer::$variant(packet)
                }
            }
        )+
    };
}

impl_from_variant!(
    ClientPacket,
    Pa => PaPacket,
    Pb => PbPacket,
    Pc => PcPacket,
    Pd => PdPacket,
    Pi => PiPacket,
    Pm => PmPacket,
    Pr => PrPacket,
    Ps => PsPacket,
    Ts => TsPacket,
    Te => TePacket,
);

impl_from_variant!(
    ServerPacket,
    Ab => AbPacket,
    Ac => AcPacket,
    Ao => AoPacket,
    Ar => ArPacket,
    As => AsPacket,
    Au => AuPacket,
);

impl From<ClientPacket> for Packet {
    fn from(packet: ClientPacket) -> Self {
        Packet::Client(packet)
    }
}

impl From<ServerPacket> for Packet {
    fn from(packet: ServerPacket) -> Self {
        Packet::Server(packet)
    }
}

// Field helpers shared by the variant grammars.

pub(crate) fn parse_field<T: FromStr>(raw: &str, field: &'static str) -> Result<T, ProtocolError> {
    raw.parse()
        .map_err(|_| ProtocolError::invalid_field(field, raw))
}

/// Parses a field whose absence is an empty token.
pub(crate) fn parse_optional<T: FromStr>(
    raw: &str,
    field: &'static str,
) -> Result<Option<T>, ProtocolError> {
    if raw.is_empty() {
        return Ok(None);
    }
    parse_field(raw, field).map(Some)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ProtocolError> {
    let secs: i64 = parse_field(raw, "timestamp")?;
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| ProtocolError::invalid_field("timestamp", raw))
}

pub(crate) fn format_float(value: f64) -> String {
    format!("{:.6}", value)
}

/// Renders an optional value, writing absence as an empty token.
pub(crate) fn format_optional<T>(value: Option<T>, render: impl Fn(T) -> String) -> String {
    value.map(render).unwrap_or_default()
}

/// Inserts `:` every two hex characters of a wire MAC address.
pub(crate) fn expand_mac(raw: &str) -> Result<String, ProtocolError> {
    if raw.len() % 2 != 0 || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProtocolError::invalid_field("mac address", raw));
    }
    Ok(raw
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":"))
}

/// Strips `:` separators from a MAC address for the wire.
pub(crate) fn compact_mac(mac: &str) -> String {
    mac.replace(':', "")
}

/// Flips every low bit of every byte of `packet`'s wire form and checks that
/// each corruption is rejected. The only accepted flips change the case of a
/// hex letter in the outer checksum token, which decodes case-insensitively.
#[cfg(test)]
pub(crate) fn assert_bit_flips_detected<P>(packet: &P)
where
    P: PacketBody + PartialEq + fmt::Debug,
{
    let raw = packet.to_packet();
    let original = P::from_packet(&raw).unwrap();
    let token_end = raw.len() - "</Xy>".len();
    let token = token_end - crate::checksum::CHECKSUM_LEN..token_end;

    for index in 0..raw.len() {
        // Bit 7 would leave ASCII; invalid UTF-8 never reaches a packet decoder.
        for bit in 0..7 {
            let mut bytes = raw.clone().into_bytes();
            bytes[index] ^= 1 << bit;
            let case_flip =
                token.contains(&index) && bytes[index].eq_ignore_ascii_case(&raw.as_bytes()[index]);
            let corrupted = String::from_utf8(bytes).unwrap();

            match P::from_packet(&corrupted) {
                Ok(decoded) if case_flip => assert_eq!(decoded, original),
                Ok(decoded) => panic!("flip at {index}:{bit} accepted as {decoded:?}"),
                Err(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for tag in Tag::ALL {
            assert_eq!(tag.as_str().parse::<Tag>().unwrap(), tag);
        }
        assert!(matches!(
            "Zz".parse::<Tag>(),
            Err(ProtocolError::UnknownTag(_))
        ));
    }

    #[test]
    fn test_tag_direction() {
        assert_eq!(Tag::Pi.direction(), Direction::DeviceToServer);
        assert_eq!(Tag::Ts.direction(), Direction::DeviceToServer);
        assert_eq!(Tag::As.direction(), Direction::ServerToDevice);
        assert_eq!(Tag::Ac.direction(), Direction::ServerToDevice);
    }

    #[test]
    fn test_tag_leads_match_direction() {
        for tag in Tag::ALL {
            let lead = tag.as_str().as_bytes()[0];
            assert!(tag.direction().tag_leads().contains(&lead), "{tag}");
        }
    }

    #[test]
    fn test_direction_checked_before_body() {
        assert_eq!(
            ServerPacket::decode("<Pi>not a body</Pi>"),
            Err(ProtocolError::UnknownTag("Pi".into()))
        );
        assert_eq!(
            ClientPacket::decode("<Ac>not a body</Ac>"),
            Err(ProtocolError::UnknownTag("Ac".into()))
        );
    }

    #[test]
    fn test_decode_dispatch() {
        let raw = "<Pi>744DBD89B0D9;layrz.hub12.base;49;22246;1;460;0;false;2586</Pi>";
        let packet = Packet::decode(raw).unwrap();
        assert_eq!(packet.tag(), Tag::Pi);
        assert_eq!(packet.encode(), raw);

        let packet = Packet::decode("<As>;7F28</As>").unwrap();
        assert_eq!(packet, Packet::Server(ServerPacket::As(AsPacket)));
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert!(matches!(
            Packet::decode("<Zz>;7F28</Zz>"),
            Err(ProtocolError::UnknownTag(_))
        ));
        assert!(matches!(
            Packet::decode("garbage"),
            Err(ProtocolError::UnknownTag(_))
        ));
    }

    #[test]
    fn test_direction_specific_decode() {
        assert!(ServerPacket::decode("<As>;7F28</As>").is_ok());
        assert!(ClientPacket::decode("<As>;7F28</As>").is_err());
        assert!(ClientPacket::decode("<Pr>;7F28</Pr>").is_ok());
        assert!(ServerPacket::decode("<Pr>;7F28</Pr>").is_err());
    }

    #[test]
    fn test_mac_helpers() {
        assert_eq!(expand_mac("000000000001").unwrap(), "00:00:00:00:00:01");
        assert_eq!(expand_mac("AABBCC").unwrap(), "AA:BB:CC");
        assert_eq!(expand_mac("").unwrap(), "");
        assert!(expand_mac("ABC").is_err());
        assert!(expand_mac("GG0000").is_err());
        assert_eq!(compact_mac("AA:BB:CC:DD:EE:FF"), "AABBCCDDEEFF");
    }

    #[test]
    fn test_parse_optional() {
        assert_eq!(parse_optional::<f64>("", "latitude").unwrap(), None);
        assert_eq!(parse_optional::<f64>("1.5", "latitude").unwrap(), Some(1.5));
        assert!(parse_optional::<f64>("x", "latitude").is_err());
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("1735689600").unwrap();
        assert_eq!(ts.timestamp(), 1_735_689_600);
        assert!(parse_timestamp("soon").is_err());
    }
}
