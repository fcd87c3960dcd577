//! HTTP/3 SETTINGS frame (RFC 9114 Section 7.2.4).
//!
//! Only three settings are interpreted: SETTINGS_MAX_FIELD_SECTION_SIZE,
//! SETTINGS_H3_DATAGRAM and SETTINGS_ENABLE_CONNECT_PROTOCOL. Everything else
//! is kept verbatim in [`SettingsFrame::other`].
//!
//! Serialization comes in two flavours. [`SettingsFrame::append`] writes the
//! interpreted settings first, then `other` in map order.
//! [`SettingsFrame::append_with_order`] follows [`SettingsFrame::order`], which
//! lets a client reproduce another implementation's byte layout.
//!
//! An entry `SETTINGS_GREASE => 0` in `other` is replaced on every
//! serialization by a fresh reserved identifier with a random value, so two
//! serializations of the same frame differ in those bytes.

use crate::error::ParseError;
use crate::protocol::frame::FRAME_TYPE_SETTINGS;
use crate::protocol::varint;
use crate::qlog::FrameSummary;
use bytes::BufMut;
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};

/// SETTINGS_QPACK_MAX_TABLE_CAPACITY (RFC 9204)
pub const SETTINGS_QPACK_MAX_TABLE_CAPACITY: u64 = 0x1;
/// SETTINGS_MAX_FIELD_SECTION_SIZE
pub const SETTINGS_MAX_FIELD_SECTION_SIZE: u64 = 0x6;
/// SETTINGS_QPACK_BLOCKED_STREAMS (RFC 9204)
pub const SETTINGS_QPACK_BLOCKED_STREAMS: u64 = 0x7;
/// SETTINGS_ENABLE_CONNECT_PROTOCOL, Extended CONNECT (RFC 9220)
pub const SETTINGS_ENABLE_CONNECT_PROTOCOL: u64 = 0x8;
/// SETTINGS_H3_DATAGRAM (RFC 9297)
pub const SETTINGS_H3_DATAGRAM: u64 = 0x33;
/// SETTINGS_ENABLE_WEBTRANSPORT
pub const SETTINGS_ENABLE_WEBTRANSPORT: u64 = 0x2b60_3742;
/// Placeholder id in [`SettingsFrame::other`] that stands for a random
/// reserved setting (RFC 9114 Section 7.2.4.1).
pub const SETTINGS_GREASE: u64 = 0x1f + 0x21;

/// Reserved setting ids have the form `0x1f * N + 0x21`.
pub fn is_reserved_setting(id: u64) -> bool {
    id >= 0x21 && (id - 0x21) % 0x1f == 0
}

/// A SETTINGS frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsFrame {
    /// SETTINGS_MAX_FIELD_SECTION_SIZE, `None` if not sent
    pub max_field_section_size: Option<u64>,
    /// HTTP Datagrams (RFC 9297)
    pub datagram: bool,
    /// Extended CONNECT (RFC 9220)
    pub extended_connect: bool,
    /// All settings without a dedicated field
    pub other: HashMap<u64, u64>,
    /// Order in which setting ids appear on the wire. Filled in by the
    /// parser; used by [`SettingsFrame::append_with_order`].
    pub order: Option<Vec<u64>>,
}

/// One `(id, value)` pair to be written.
#[derive(Debug, Clone, Copy)]
enum Entry {
    Setting(u64, u64),
    /// Random reserved id and value, chosen at write time.
    Grease,
}

impl Entry {
    /// A non-zero value under [`SETTINGS_GREASE`] is written as is, but
    /// [`SettingsFrame::decode`] drops that id, so such an entry does not
    /// survive a round trip.
    fn other(id: u64, value: u64) -> Self {
        if id == SETTINGS_GREASE && value == 0 {
            Entry::Grease
        } else {
            Entry::Setting(id, value)
        }
    }

    fn encoded_len(&self) -> usize {
        match *self {
            Entry::Setting(id, value) => varint::len(id) + varint::len(value),
            // both written in the widest form, whatever gets drawn
            Entry::Grease => 2 * varint::MAX_LEN,
        }
    }
}

impl SettingsFrame {
    /// Decode a SETTINGS payload.
    pub fn decode(mut payload: &[u8]) -> Result<Self, ParseError> {
        let mut frame = SettingsFrame::default();
        let mut order = Vec::new();
        let mut seen_max_field_section_size = false;
        let mut seen_datagram = false;
        let mut seen_extended_connect = false;

        while !payload.is_empty() {
            let id = varint::decode(&mut payload).ok_or(ParseError::Incomplete)?;
            let value = varint::decode(&mut payload).ok_or(ParseError::Incomplete)?;
            order.push(id);

            match id {
                SETTINGS_MAX_FIELD_SECTION_SIZE => {
                    if seen_max_field_section_size {
                        return Err(ParseError::DuplicateSetting(id));
                    }
                    seen_max_field_section_size = true;
                    frame.max_field_section_size = Some(value);
                }
                SETTINGS_ENABLE_CONNECT_PROTOCOL => {
                    if seen_extended_connect {
                        return Err(ParseError::DuplicateSetting(id));
                    }
                    seen_extended_connect = true;
                    frame.extended_connect = parse_bool(id, value)?;
                }
                SETTINGS_H3_DATAGRAM => {
                    if seen_datagram {
                        return Err(ParseError::DuplicateSetting(id));
                    }
                    seen_datagram = true;
                    frame.datagram = parse_bool(id, value)?;
                }
                // filler, may repeat and carries nothing, whatever its value
                SETTINGS_GREASE => {}
                _ => {
                    if frame.other.insert(id, value).is_some() {
                        return Err(ParseError::DuplicateSetting(id));
                    }
                }
            }
        }

        tracing::trace!(
            "Decoded SETTINGS: {} settings, max_field_section_size={:?}, datagram={}, extended_connect={}",
            order.len(),
            frame.max_field_section_size,
            frame.datagram,
            frame.extended_connect
        );
        frame.order = Some(order);
        Ok(frame)
    }

    /// Append the frame, interpreted settings first.
    pub fn append<B: BufMut>(&self, buf: &mut B) {
        self.append_with_rng(buf, &mut rand::thread_rng());
    }

    /// Like [`append`](Self::append), drawing filler values from `rng`.
    pub fn append_with_rng<B, R>(&self, buf: &mut B, rng: &mut R)
    where
        B: BufMut,
        R: Rng + ?Sized,
    {
        let entries = self.unordered_entries();
        write_frame(buf, &entries, rng);
    }

    /// Append the frame following [`order`](Self::order).
    ///
    /// Falls back to [`append`](Self::append) when no order is set.
    pub fn append_with_order<B: BufMut>(&self, buf: &mut B) {
        self.append_with_order_and_rng(buf, &mut rand::thread_rng());
    }

    /// Like [`append_with_order`](Self::append_with_order), drawing filler
    /// values from `rng`.
    pub fn append_with_order_and_rng<B, R>(&self, buf: &mut B, rng: &mut R)
    where
        B: BufMut,
        R: Rng + ?Sized,
    {
        let entries = match &self.order {
            Some(order) => self.ordered_entries(order),
            None => self.unordered_entries(),
        };
        write_frame(buf, &entries, rng);
    }

    /// Summary for the `frame_parsed` qlog event.
    pub fn summary(&self) -> FrameSummary {
        let sent = |id: u64, enabled: bool| match &self.order {
            Some(order) if order.contains(&id) => Some(enabled),
            Some(_) => None,
            None => enabled.then_some(true),
        };
        FrameSummary::Settings {
            max_field_section_size: self.max_field_section_size,
            datagram: sent(SETTINGS_H3_DATAGRAM, self.datagram),
            extended_connect: sent(SETTINGS_ENABLE_CONNECT_PROTOCOL, self.extended_connect),
            other: self.other.iter().map(|(&id, &value)| (id, value)).collect::<BTreeMap<_, _>>(),
        }
    }

    fn unordered_entries(&self) -> Vec<Entry> {
        let mut entries = Vec::with_capacity(self.other.len() + 3);
        if let Some(size) = self.max_field_section_size {
            entries.push(Entry::Setting(SETTINGS_MAX_FIELD_SECTION_SIZE, size));
        }
        if self.datagram {
            entries.push(Entry::Setting(SETTINGS_H3_DATAGRAM, 1));
        }
        if self.extended_connect {
            entries.push(Entry::Setting(SETTINGS_ENABLE_CONNECT_PROTOCOL, 1));
        }
        for (&id, &value) in &self.other {
            let written = match id {
                SETTINGS_MAX_FIELD_SECTION_SIZE => self.max_field_section_size.is_some(),
                SETTINGS_H3_DATAGRAM => self.datagram,
                SETTINGS_ENABLE_CONNECT_PROTOCOL => self.extended_connect,
                _ => false,
            };
            if !written {
                entries.push(Entry::other(id, value));
            }
        }
        entries
    }

    fn ordered_entries(&self, order: &[u64]) -> Vec<Entry> {
        let mut entries = Vec::with_capacity(order.len() + 3);
        let mut written = HashSet::new();

        for &id in order {
            if id != SETTINGS_GREASE && written.contains(&id) {
                continue;
            }
            let entry = match id {
                SETTINGS_MAX_FIELD_SECTION_SIZE if self.max_field_section_size.is_some() => {
                    self.max_field_section_size.map(|size| Entry::Setting(id, size))
                }
                SETTINGS_H3_DATAGRAM if self.datagram => Some(Entry::Setting(id, 1)),
                SETTINGS_ENABLE_CONNECT_PROTOCOL if self.extended_connect => {
                    Some(Entry::Setting(id, 1))
                }
                _ => self.other.get(&id).map(|&value| Entry::other(id, value)),
            };
            if let Some(entry) = entry {
                written.insert(id);
                entries.push(entry);
            }
        }

        if let Some(size) = self.max_field_section_size {
            if !written.contains(&SETTINGS_MAX_FIELD_SECTION_SIZE) {
                entries.push(Entry::Setting(SETTINGS_MAX_FIELD_SECTION_SIZE, size));
            }
        }
        if self.datagram && !written.contains(&SETTINGS_H3_DATAGRAM) {
            entries.push(Entry::Setting(SETTINGS_H3_DATAGRAM, 1));
        }
        if self.extended_connect && !written.contains(&SETTINGS_ENABLE_CONNECT_PROTOCOL) {
            entries.push(Entry::Setting(SETTINGS_ENABLE_CONNECT_PROTOCOL, 1));
        }
        entries
    }
}

fn parse_bool(id: u64, value: u64) -> Result<bool, ParseError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(ParseError::InvalidSettingValue { id, value }),
    }
}

fn write_frame<B, R>(buf: &mut B, entries: &[Entry], rng: &mut R)
where
    B: BufMut,
    R: Rng + ?Sized,
{
    let len: usize = entries.iter().map(Entry::encoded_len).sum();
    varint::write(buf, FRAME_TYPE_SETTINGS);
    varint::write(buf, len as u64);

    for entry in entries {
        match *entry {
            Entry::Setting(id, value) => {
                varint::write(buf, id);
                varint::write(buf, value);
            }
            Entry::Grease => {
                let id = 0x1f * u64::from(rng.gen::<u32>() >> 1) + 0x21;
                let value = u64::from(rng.gen::<u32>());
                tracing::debug!("Sending GREASE setting {:#x}={}", id, value);
                varint::write_with_len(buf, id, varint::MAX_LEN);
                varint::write_with_len(buf, value, varint::MAX_LEN);
            }
        }
    }
    tracing::trace!("Encoded SETTINGS: {} settings, {} bytes", entries.len(), len);
}
