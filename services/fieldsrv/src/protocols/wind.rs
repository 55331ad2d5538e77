//! Wind gauge codecs
//!
//! Four incompatible dialects in the wild, one decoded shape: wind speed in
//! metres per second, with direction where the gauge reports it. The NMEA
//! dialect additionally carries an XOR checksum which is validated before
//! any field is trusted.

use serde::{Deserialize, Serialize};

use crate::error::{FieldError, Result};

pub const GENERIC_POLL: &[u8] = b"READ\r\n";
pub const GILL_POLL: &[u8] = b"Q\r\n";
pub const LYNX_POLL: &[u8] = b"R\r\n";
pub const NMEA_POLL: &[u8] = b"$WIMWV\r\n";

/// Decoded wind sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindReading {
    pub speed_mps: f64,
    /// Degrees from north, where the dialect reports it.
    pub direction_deg: Option<f64>,
}

fn frame_text(frame: &[u8]) -> Result<&str> {
    std::str::from_utf8(frame)
        .map(str::trim)
        .map_err(|_| FieldError::protocol("Wind response is not valid ASCII"))
}

/// Generic ASCII: `±D.D\r\n`.
pub fn decode_generic(frame: &[u8]) -> Result<WindReading> {
    let text = frame_text(frame)?;
    let speed_mps: f64 = text
        .parse()
        .map_err(|_| FieldError::protocol(format!("Bad generic wind value: {text:?}")))?;
    Ok(WindReading {
        speed_mps,
        direction_deg: None,
    })
}

/// Gill WindMaster polled: `Q,<node>,<dir>,<speed>,M,<status>,`.
pub fn decode_gill(frame: &[u8]) -> Result<WindReading> {
    let text = frame_text(frame)?;
    let fields: Vec<&str> = text.split(',').collect();
    if fields.len() < 6 || fields[0] != "Q" {
        return Err(FieldError::protocol(format!(
            "Malformed Gill response: {text:?}"
        )));
    }
    if fields[4] != "M" {
        return Err(FieldError::protocol(format!(
            "Gill units field is {:?}, expected M (m/s)",
            fields[4]
        )));
    }

    let direction_deg: f64 = fields[2]
        .parse()
        .map_err(|_| FieldError::protocol(format!("Bad Gill direction: {:?}", fields[2])))?;
    let speed_mps: f64 = fields[3]
        .parse()
        .map_err(|_| FieldError::protocol(format!("Bad Gill speed: {:?}", fields[3])))?;

    Ok(WindReading {
        speed_mps,
        direction_deg: Some(direction_deg),
    })
}

/// Lynx key:value: `WS:+D.D,WD:DDD\r\n`.
pub fn decode_lynx(frame: &[u8]) -> Result<WindReading> {
    let text = frame_text(frame)?;

    let mut speed = None;
    let mut direction = None;
    for pair in text.split(',') {
        match pair.split_once(':') {
            Some(("WS", value)) => {
                speed = Some(value.parse::<f64>().map_err(|_| {
                    FieldError::protocol(format!("Bad Lynx WS value: {value:?}"))
                })?);
            },
            Some(("WD", value)) => {
                direction = Some(value.parse::<f64>().map_err(|_| {
                    FieldError::protocol(format!("Bad Lynx WD value: {value:?}"))
                })?);
            },
            _ => {}, // Unknown keys are ignored
        }
    }

    let speed_mps = speed.ok_or_else(|| {
        FieldError::protocol(format!("Lynx response has no WS field: {text:?}"))
    })?;
    Ok(WindReading {
        speed_mps,
        direction_deg: direction,
    })
}

/// XOR of all sentence bytes between `$` and `*`, as two uppercase hex digits.
pub fn nmea_checksum(sentence_body: &str) -> u8 {
    sentence_body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// NMEA MWV: `$WIMWV,<dir>,R,<speed>,M,A*<checksum>\r\n`.
///
/// The trailing checksum is validated first; a mismatch rejects the frame
/// outright. A status of anything but `A` (valid) is also rejected.
pub fn decode_nmea(frame: &[u8]) -> Result<WindReading> {
    let text = frame_text(frame)?;

    let body = text
        .strip_prefix('$')
        .ok_or_else(|| FieldError::protocol(format!("NMEA sentence missing '$': {text:?}")))?;
    let (body, checksum_hex) = body
        .split_once('*')
        .ok_or_else(|| FieldError::protocol(format!("NMEA sentence missing '*': {text:?}")))?;

    let claimed = u8::from_str_radix(checksum_hex.trim(), 16)
        .map_err(|_| FieldError::protocol(format!("Bad NMEA checksum field: {checksum_hex:?}")))?;
    let computed = nmea_checksum(body);
    if claimed != computed {
        return Err(FieldError::protocol(format!(
            "NMEA checksum mismatch: claimed {claimed:02X}, computed {computed:02X}"
        )));
    }

    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() < 6 || fields[0] != "WIMWV" {
        return Err(FieldError::protocol(format!(
            "Malformed MWV sentence: {text:?}"
        )));
    }
    if fields[5] != "A" {
        return Err(FieldError::protocol(format!(
            "MWV status is {:?}, expected A (valid)",
            fields[5]
        )));
    }
    if fields[4] != "M" {
        return Err(FieldError::protocol(format!(
            "MWV units field is {:?}, expected M (m/s)",
            fields[4]
        )));
    }

    let direction_deg: f64 = fields[1]
        .parse()
        .map_err(|_| FieldError::protocol(format!("Bad MWV direction: {:?}", fields[1])))?;
    let speed_mps: f64 = fields[3]
        .parse()
        .map_err(|_| FieldError::protocol(format!("Bad MWV speed: {:?}", fields[3])))?;

    Ok(WindReading {
        speed_mps,
        direction_deg: Some(direction_deg),
    })
}

/// Sliding average over the most recent N samples.
///
/// The rulebook's "5 second average" is realised as a configurable sample
/// count at a configurable cadence; the engine pushes one decoded sample
/// per poll.
#[derive(Debug)]
pub struct WindAverager {
    window: usize,
    samples: std::collections::VecDeque<f64>,
}

impl WindAverager {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: std::collections::VecDeque::with_capacity(window.max(1)),
        }
    }

    pub fn push(&mut self, speed_mps: f64) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(speed_mps);
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.window
    }

    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }
}
