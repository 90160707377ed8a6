use crate::errors::CodecError;
use crate::event::{Event, GeoLocation};

/// Leading magic bytes of every encoded event.
pub const MAGIC: [u8; 2] = *b"TW";
/// Current layout version.
pub const VERSION: u8 = 1;

/// Fixed header size: [magic 2][version u8][field count u8]
const HEADER_SIZE: usize = 4;
/// Per-field header: [tag u8][len u32]
const FIELD_HEADER_SIZE: usize = 5;
/// Trailing crc32 over header and fields.
const CRC_SIZE: usize = 4;

pub const TAG_ID: u8 = 1;
pub const TAG_CREATED_AT: u8 = 2;
pub const TAG_AUTHOR: u8 = 3;
pub const TAG_TEXT: u8 = 4;
pub const TAG_LOCATION: u8 = 5;

/// Encode an event into the portable tagged-field layout.
///
/// Layout: `[magic "TW"][version u8][count u8]` followed by `count` fields of
/// `[tag u8][len u32 LE][value]` and a trailing crc32 (LE) of everything before it.
/// The location field is written only when the event carries one.
pub fn encode(event: &Event) -> Vec<u8> {
    let mut fields: Vec<(u8, Vec<u8>)> = Vec::with_capacity(5);
    fields.push((TAG_ID, event.id.to_le_bytes().to_vec()));
    fields.push((TAG_CREATED_AT, event.created_at.to_le_bytes().to_vec()));
    fields.push((TAG_AUTHOR, event.author.as_bytes().to_vec()));
    fields.push((TAG_TEXT, event.text.as_bytes().to_vec()));
    if let Some(location) = event.location {
        let mut value = Vec::with_capacity(16);
        value.extend_from_slice(&location.latitude.to_le_bytes());
        value.extend_from_slice(&location.longitude.to_le_bytes());
        fields.push((TAG_LOCATION, value));
    }

    let body_len: usize = fields
        .iter()
        .map(|(_, v)| FIELD_HEADER_SIZE + v.len())
        .sum();
    let mut buf = Vec::with_capacity(HEADER_SIZE + body_len + CRC_SIZE);
    buf.extend_from_slice(&MAGIC);
    buf.push(VERSION);
    buf.push(fields.len() as u8);
    for (tag, value) in &fields {
        buf.push(*tag);
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(value);
    }
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Decode an event produced by [`encode`] (or by any other implementation of the layout).
///
/// Unknown tags are skipped so newer producers can add fields.
pub fn decode(bytes: &[u8]) -> Result<Event, CodecError> {
    if bytes.len() < HEADER_SIZE + CRC_SIZE {
        return Err(CodecError::Truncated {
            offset: 0,
            needed: HEADER_SIZE + CRC_SIZE,
            available: bytes.len(),
        });
    }
    if bytes[0..2] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    if bytes[2] != VERSION {
        return Err(CodecError::UnsupportedVersion(bytes[2]));
    }

    let (content, trailer) = bytes.split_at(bytes.len() - CRC_SIZE);
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed = crc32fast::hash(content);
    if expected != computed {
        return Err(CodecError::ChecksumMismatch { expected, computed });
    }

    let count = content[3];
    let mut cursor = Cursor::new(content, HEADER_SIZE);

    let mut id: Option<u64> = None;
    let mut created_at: Option<u64> = None;
    let mut author: Option<String> = None;
    let mut text: Option<String> = None;
    let mut location: Option<GeoLocation> = None;

    for _ in 0..count {
        let tag = cursor.read_u8()?;
        let len = cursor.read_u32()? as usize;
        let value = cursor.take(len)?;
        match tag {
            TAG_ID => set_once(&mut id, tag, read_u64_field(tag, value)?)?,
            TAG_CREATED_AT => set_once(&mut created_at, tag, read_u64_field(tag, value)?)?,
            TAG_AUTHOR => set_once(&mut author, tag, read_string_field("author", value)?)?,
            TAG_TEXT => set_once(&mut text, tag, read_string_field("text", value)?)?,
            TAG_LOCATION => {
                if value.len() != 16 {
                    return Err(CodecError::InvalidLength { tag, len });
                }
                let latitude = f64::from_le_bytes(value[0..8].try_into().map_err(|_| {
                    CodecError::InvalidLength { tag, len }
                })?);
                let longitude = f64::from_le_bytes(value[8..16].try_into().map_err(|_| {
                    CodecError::InvalidLength { tag, len }
                })?);
                set_once(&mut location, tag, GeoLocation::new(latitude, longitude))?;
            }
            // forward compatibility
            _ => {}
        }
    }

    if cursor.remaining() > 0 {
        return Err(CodecError::TrailingBytes(cursor.remaining()));
    }

    let author = author.ok_or(CodecError::MissingField("author"))?;
    if author.is_empty() {
        return Err(CodecError::EmptyAuthor);
    }

    Ok(Event {
        id: id.ok_or(CodecError::MissingField("id"))?,
        created_at: created_at.ok_or(CodecError::MissingField("created_at"))?,
        author,
        text: text.ok_or(CodecError::MissingField("text"))?,
        location,
    })
}

fn set_once<T>(slot: &mut Option<T>, tag: u8, value: T) -> Result<(), CodecError> {
    if slot.is_some() {
        return Err(CodecError::DuplicateField(tag));
    }
    *slot = Some(value);
    Ok(())
}

fn read_u64_field(tag: u8, value: &[u8]) -> Result<u64, CodecError> {
    let arr: [u8; 8] = value.try_into().map_err(|_| CodecError::InvalidLength {
        tag,
        len: value.len(),
    })?;
    Ok(u64::from_le_bytes(arr))
}

fn read_string_field(name: &'static str, value: &[u8]) -> Result<String, CodecError> {
    String::from_utf8(value.to_vec()).map_err(|_| CodecError::InvalidUtf8(name))
}

/// Bounds-checked reader over the encoded content.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Cursor { buf, pos }
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
