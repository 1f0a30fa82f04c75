//! Trip boundary packets.

use super::{parse_timestamp, PacketBody, Tag};
use crate::envelope;
use crate::error::ProtocolError;
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use uuid::Uuid;

fn write_trip(timestamp: &DateTime<Utc>, trip_id: &Uuid) -> String {
    format!("{};{};", timestamp.timestamp(), trip_id.hyphenated())
}

fn read_trip(content: &str, tag: Tag) -> Result<(DateTime<Utc>, Uuid), ProtocolError> {
    let parts = envelope::fields(content, tag, 2)?;
    let timestamp = parse_timestamp(parts[0])?;
    let trip_id =
        Uuid::parse_str(parts[1]).map_err(|_| ProtocolError::invalid_field("trip id", parts[1]))?;
    Ok((timestamp, trip_id))
}

/// Marks the start of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TsPacket {
    pub timestamp: DateTime<Utc>,
    pub trip_id: Uuid,
}

impl TsPacket {
    /// Starts a new trip now, with a fresh random id.
    ///
    /// Timestamps travel as whole seconds, so sub-second precision is dropped.
    pub fn start() -> Self {
        Self {
            timestamp: Utc::now().trunc_subsecs(0),
            trip_id: Uuid::new_v4(),
        }
    }

    /// The matching end-of-trip packet.
    pub fn end(&self) -> TePacket {
        TePacket {
            timestamp: Utc::now().trunc_subsecs(0),
            trip_id: self.trip_id,
        }
    }
}

impl PacketBody for TsPacket {
    const TAG: Tag = Tag::Ts;

    fn write_body(&self) -> String {
        write_trip(&self.timestamp, &self.trip_id)
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        let (timestamp, trip_id) = read_trip(content, Self::TAG)?;
        Ok(Self { timestamp, trip_id })
    }
}

/// Marks the end of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TePacket {
    pub timestamp: DateTime<Utc>,
    pub trip_id: Uuid,
}

impl PacketBody for TePacket {
    const TAG: Tag = Tag::Te;

    fn write_body(&self) -> String {
        write_trip(&self.timestamp, &self.trip_id)
    }

    fn read_body(content: &str) -> Result<Self, ProtocolError> {
        let (timestamp, trip_id) = read_trip(content, Self::TAG)?;
        Ok(Self { timestamp, trip_id })
    }
}
