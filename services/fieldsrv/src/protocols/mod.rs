//! Per-device-family protocol codecs
//!
//! Each variant knows how to build its poll command, recognise a complete
//! response frame in an accumulating buffer, and decode the frame into a
//! typed reading. Dispatch is a closed enum with explicit matches: adding a
//! device family means adding a variant here and a module alongside, nothing
//! is resolved dynamically at run time.

pub mod edm;
pub mod scoreboard;
pub mod wind;

pub use edm::EdmReading;
pub use wind::WindReading;

use crate::error::{FieldError, Result};

/// Broad device families, one per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    Edm,
    Wind,
    Scoreboard,
}

/// Concrete wire protocol spoken on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCodec {
    /// Generic EDM: `0x11 0x0D 0x0A` poll, space-delimited ASCII response.
    Edm,
    /// `READ\r\n` -> `±D.D\r\n`
    WindGeneric,
    /// Gill WindMaster polled mode: `Q\r\n` -> `Q,<node>,<dir>,<speed>,M,<status>,`
    WindGill,
    /// Lynx: `R\r\n` -> `WS:+D.D,WD:DDD\r\n`
    WindLynx,
    /// NMEA 0183 MWV sentence with XOR checksum.
    WindNmea,
    /// Binary 7-segment scoreboard frames with subtraction checksums.
    Scoreboard,
}

impl DeviceCodec {
    /// Resolve a configured protocol identifier.
    pub fn from_protocol_id(id: &str) -> Result<Self> {
        match id.to_ascii_lowercase().as_str() {
            "edm_generic" | "edm" => Ok(DeviceCodec::Edm),
            "wind_generic" => Ok(DeviceCodec::WindGeneric),
            "wind_gill" => Ok(DeviceCodec::WindGill),
            "wind_lynx" => Ok(DeviceCodec::WindLynx),
            "wind_nmea" => Ok(DeviceCodec::WindNmea),
            "scoreboard_fd" | "scoreboard" => Ok(DeviceCodec::Scoreboard),
            other => Err(FieldError::config(format!(
                "Unknown protocol identifier: {other}"
            ))),
        }
    }

    pub fn family(self) -> DeviceFamily {
        match self {
            DeviceCodec::Edm => DeviceFamily::Edm,
            DeviceCodec::WindGeneric
            | DeviceCodec::WindGill
            | DeviceCodec::WindLynx
            | DeviceCodec::WindNmea => DeviceFamily::Wind,
            DeviceCodec::Scoreboard => DeviceFamily::Scoreboard,
        }
    }

    /// Command bytes that trigger one measurement. The scoreboard is
    /// write-only and has no poll.
    pub fn poll_command(self) -> Option<&'static [u8]> {
        match self {
            DeviceCodec::Edm => Some(edm::POLL_COMMAND),
            DeviceCodec::WindGeneric => Some(wind::GENERIC_POLL),
            DeviceCodec::WindGill => Some(wind::GILL_POLL),
            DeviceCodec::WindLynx => Some(wind::LYNX_POLL),
            DeviceCodec::WindNmea => Some(wind::NMEA_POLL),
            DeviceCodec::Scoreboard => None,
        }
    }

    /// Whether the accumulated buffer is one complete response frame.
    pub fn frame_complete(self, buf: &[u8]) -> bool {
        match self {
            // All polled devices terminate responses with a newline
            DeviceCodec::Edm
            | DeviceCodec::WindGeneric
            | DeviceCodec::WindGill
            | DeviceCodec::WindLynx
            | DeviceCodec::WindNmea => buf.ends_with(b"\n"),
            DeviceCodec::Scoreboard => buf.len() >= scoreboard::FRAME_LEN,
        }
    }

    /// Decode a wind response frame. Errors on non-wind variants.
    pub fn decode_wind(self, frame: &[u8]) -> Result<WindReading> {
        match self {
            DeviceCodec::WindGeneric => wind::decode_generic(frame),
            DeviceCodec::WindGill => wind::decode_gill(frame),
            DeviceCodec::WindLynx => wind::decode_lynx(frame),
            DeviceCodec::WindNmea => wind::decode_nmea(frame),
            other => Err(FieldError::internal(format!(
                "decode_wind called on non-wind codec {other:?}"
            ))),
        }
    }
}
