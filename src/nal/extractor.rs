//! Annex-B NAL unit extraction with emulation prevention
//!
//! The container demuxer hands us raw elementary-stream buffers; this module
//! slices them on start codes (`00 00 00 01` or `00 00 01`) and escapes any
//! payload byte run that a downstream Annex-B parser could mistake for a
//! start code.

use bytes::Bytes;

/// NAL unit type, decoded from the low 5 bits of the unit header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture
    NonIdrSlice,
    /// Coded slice of an IDR picture (keyframe)
    IdrSlice,
    /// Supplemental enhancement information
    Sei,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Access unit delimiter
    AccessUnitDelimiter,
    /// Reserved or unhandled type
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(header: u8) -> Self {
        match header & 0x1F {
            1 => NalUnitType::NonIdrSlice,
            5 => NalUnitType::IdrSlice,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::AccessUnitDelimiter,
            t => NalUnitType::Other(t),
        }
    }
}

/// A single NAL unit, start code removed, emulation prevention applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    data: Bytes,
}

impl NalUnit {
    /// Wrap an already-escaped payload
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    /// Unit type from the header byte
    pub fn nal_type(&self) -> NalUnitType {
        // Units are never empty: extract() drops zero-length slices.
        NalUnitType::from(self.data[0])
    }

    /// Whether this unit starts an IDR picture
    pub fn is_keyframe(&self) -> bool {
        self.nal_type() == NalUnitType::IdrSlice
    }

    /// Escaped payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Escaped payload, zero-copy
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the payload is empty (never produced by `extract`)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Length of the start code at `pos`, if any
///
/// The 4-byte form is checked first: `00 00 00 01` also matches the 3-byte
/// scan at its second byte, and the longer match wins.
fn start_code_len(data: &[u8], pos: usize) -> Option<usize> {
    if pos + 4 <= data.len() && data[pos..pos + 4] == [0, 0, 0, 1] {
        return Some(4);
    }
    if pos + 3 <= data.len() && data[pos..pos + 3] == [0, 0, 1] {
        return Some(3);
    }
    None
}

/// Extract NAL units from an Annex-B buffer
///
/// One pass, stateless across calls. Bytes before the first start code are
/// ignored; zero-length units (back-to-back start codes) are dropped.
/// Buffers shorter than 4 bytes yield no units.
pub fn extract(data: &[u8]) -> Vec<NalUnit> {
    let mut units = Vec::new();

    if data.len() < 4 {
        return units;
    }

    let mut i = 0;

    while i < data.len() {
        let Some(code_len) = start_code_len(data, i) else {
            i += 1;
            continue;
        };

        let unit_start = i + code_len;
        let mut unit_end = unit_start;
        while unit_end < data.len() && start_code_len(data, unit_end).is_none() {
            unit_end += 1;
        }

        let raw = &data[unit_start..unit_end];
        if !raw.is_empty() {
            let escaped = apply_emulation_prevention(raw);
            units.push(NalUnit::new(Bytes::from(escaped)));
        }

        i = unit_end;
    }

    units
}

/// Escape start-code-like byte runs in a raw NAL payload
///
/// Whenever the last two *emitted* bytes are `00 00` and the next source byte
/// is in `{00, 01, 02, 03}`, a literal `03` is emitted first. Working on the
/// output accumulator lets freshly emitted zero pairs re-trigger detection,
/// so runs of zeros escape correctly.
fn apply_emulation_prevention(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + raw.len() / 64);

    for &b in raw {
        if b <= 0x03 && out.len() >= 2 && out[out.len() - 2..] == [0, 0] {
            out.push(0x03);
        }
        out.push(b);
    }

    out
}

/// Remove emulation-prevention bytes, the inverse of the escaping in
/// [`extract`]
///
/// Drops the `03` of every `00 00 03` triple and resets the zero run, so
/// adjacent escapes (`00 00 03 03`) decode correctly.
pub fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0usize;

    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(b);
    }

    out
}
