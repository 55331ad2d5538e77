//! Scoreboard binary codec
//!
//! The board speaks a fixed 15-byte frame: a sync byte, a three-byte header
//! (address, payload count, message tag) closed by a subtraction checksum,
//! then control byte, seven 7-segment digit cells, a punctuation bitmask and
//! a second subtraction checksum over the payload. A display update is two
//! frames sharing one tag: the performance mark, then the athlete/attempt
//! line. Frames are built fresh per transmission because the tag advances.

use crate::error::{FieldError, Result};

/// Handshake: controller sends ENQ-like probe, board answers ACK.
pub const HANDSHAKE_REQUEST: u8 = 0x55;
pub const HANDSHAKE_ACK: u8 = 0x06;

/// Sync byte opening every frame.
pub const FRAME_SYNC: u8 = 0x16;
/// Full frame length on the wire.
pub const FRAME_LEN: usize = 15;
/// Payload byte count carried in the header: control + 7 digits + punctuation.
const PAYLOAD_COUNT: u8 = 9;

/// Control byte selecting the performance-mark line.
pub const CONTROL_MARK: u8 = 0x04;
/// Control byte selecting the athlete/attempt line.
pub const CONTROL_ATHLETE: u8 = 0x05;

/// Number of digit cells on one display line.
pub const DIGIT_CELLS: usize = 7;

/// First tag value, and the value wrapped back to after 0xF8.
pub const TAG_START: u8 = 0x08;
/// Tag stride per display update (one mark + one athlete frame).
pub const TAG_STEP: u8 = 0x10;

/// 7-segment encoding, segments gfedcba, active high.
fn segment_byte(c: char) -> Result<u8> {
    let byte = match c {
        '0' => 0x3F,
        '1' => 0x06,
        '2' => 0x5B,
        '3' => 0x4F,
        '4' => 0x66,
        '5' => 0x6D,
        '6' => 0x7D,
        '7' => 0x07,
        '8' => 0x7F,
        '9' => 0x6F,
        ' ' => 0x00,
        other => {
            return Err(FieldError::data(format!(
                "Character {other:?} has no 7-segment encoding"
            )))
        },
    };
    Ok(byte)
}

/// Subtraction checksum: `(0 - sum(bytes)) mod 256`. The receiver adds the
/// covered bytes plus the checksum and expects zero.
pub fn subtraction_checksum(bytes: &[u8]) -> u8 {
    let sum: u32 = bytes.iter().map(|&b| b as u32).sum();
    (0u32.wrapping_sub(sum) & 0xFF) as u8
}

/// Digit cells plus punctuation bitmask for one display line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DisplayLine {
    cells: [u8; DIGIT_CELLS],
    punctuation: u8,
}

/// Lay text out right-aligned across the seven cells. A `.` attaches a
/// decimal point to the preceding cell via the punctuation bitmask (bit i
/// lights the point after cell i).
fn layout_line(text: &str) -> Result<DisplayLine> {
    let mut cells: Vec<u8> = Vec::with_capacity(DIGIT_CELLS);
    let mut points: Vec<usize> = Vec::new();

    for c in text.chars() {
        if c == '.' {
            if cells.is_empty() {
                return Err(FieldError::data(format!(
                    "Display text starts with a decimal point: {text:?}"
                )));
            }
            points.push(cells.len() - 1);
        } else {
            cells.push(segment_byte(c)?);
        }
    }

    if cells.len() > DIGIT_CELLS {
        return Err(FieldError::data(format!(
            "Display text {text:?} needs {} cells, board has {DIGIT_CELLS}",
            cells.len()
        )));
    }

    let offset = DIGIT_CELLS - cells.len();
    let mut line = DisplayLine {
        cells: [0x00; DIGIT_CELLS],
        punctuation: 0,
    };
    line.cells[offset..].copy_from_slice(&cells);
    for p in points {
        line.punctuation |= 1 << (offset + p);
    }
    Ok(line)
}

/// Build one complete frame.
fn build_frame(address: u8, tag: u8, control: u8, line: DisplayLine) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = FRAME_SYNC;
    frame[1] = address;
    frame[2] = PAYLOAD_COUNT;
    frame[3] = tag;
    frame[4] = subtraction_checksum(&frame[1..4]);
    frame[5] = control;
    frame[6..13].copy_from_slice(&line.cells);
    frame[13] = line.punctuation;
    frame[14] = subtraction_checksum(&frame[5..14]);
    frame
}

/// Encode the performance-mark frame, e.g. `"21.34"`.
pub fn encode_mark_frame(address: u8, tag: u8, mark: &str) -> Result<[u8; FRAME_LEN]> {
    Ok(build_frame(address, tag, CONTROL_MARK, layout_line(mark)?))
}

/// Encode the athlete/attempt frame: bib right-aligned, attempt in the
/// rightmost cell.
pub fn encode_athlete_frame(
    address: u8,
    tag: u8,
    bib: &str,
    attempt: u8,
) -> Result<[u8; FRAME_LEN]> {
    if bib.len() > DIGIT_CELLS - 2 {
        return Err(FieldError::data(format!(
            "Athlete bib {bib:?} too long for the board"
        )));
    }
    let text = format!("{bib:>width$} {attempt}", width = DIGIT_CELLS - 2);
    Ok(build_frame(
        address,
        tag,
        CONTROL_ATHLETE,
        layout_line(&text)?,
    ))
}

/// A validated, decoded frame. Used by the simulator and by tests; the live
/// service only encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub address: u8,
    pub tag: u8,
    pub control: u8,
    pub digits: [u8; DIGIT_CELLS],
    pub punctuation: u8,
}

/// Validate sync, length and both checksums, then split out the fields.
pub fn decode_frame(frame: &[u8]) -> Result<DecodedFrame> {
    if frame.len() != FRAME_LEN {
        return Err(FieldError::protocol(format!(
            "Scoreboard frame is {} bytes, expected {FRAME_LEN}",
            frame.len()
        )));
    }
    if frame[0] != FRAME_SYNC {
        return Err(FieldError::protocol(format!(
            "Bad sync byte: {:#04x}",
            frame[0]
        )));
    }
    if frame[2] != PAYLOAD_COUNT {
        return Err(FieldError::protocol(format!(
            "Bad payload count: {:#04x}",
            frame[2]
        )));
    }
    if subtraction_checksum(&frame[1..4]) != frame[4] {
        return Err(FieldError::protocol("Header checksum mismatch"));
    }
    if subtraction_checksum(&frame[5..14]) != frame[14] {
        return Err(FieldError::protocol("Payload checksum mismatch"));
    }

    let mut digits = [0u8; DIGIT_CELLS];
    digits.copy_from_slice(&frame[6..13]);
    Ok(DecodedFrame {
        address: frame[1],
        tag: frame[3],
        control: frame[5],
        digits,
        punctuation: frame[13],
    })
}

/// Tag sequence: starts at 0x08, advances 0x10 per display update, wraps
/// back to 0x08 past 0xFF. Both frames of one update share the tag.
#[derive(Debug, Clone)]
pub struct TagSequencer {
    next: u8,
}

impl TagSequencer {
    pub fn new() -> Self {
        Self { next: TAG_START }
    }

    pub fn next_tag(&mut self) -> u8 {
        let tag = self.next;
        self.next = tag.checked_add(TAG_STEP).unwrap_or(TAG_START);
        tag
    }
}

impl Default for TagSequencer {
    fn default() -> Self {
        Self::new()
    }
}
