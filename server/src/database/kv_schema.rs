//! Key layout of the embedded store.
//!
//! A user occupies three entries in the `users` table. Each key is 16 bytes:
//!
//! ```text
//! [ seq: u64 big-endian ][ field tag: u64 big-endian ]
//! ```
//!
//! with tags `1 = id`, `2 = hash`, `3 = name`. Values are the UTF-8 bytes of
//! the field (the id is its decimal string). Big-endian sequence numbers
//! make the table's byte order equal to insertion order, so a cursor from
//! the first key walks users oldest first.
//!
//! Nothing in here touches the database.

use thiserror::Error;

use super::User;

pub const KEY_LEN: usize = 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("key has {0} bytes, expected 16")]
    KeyLength(usize),

    #[error("unknown field tag {0}")]
    UnknownField(u64),

    #[error("field {0:?} is not valid UTF-8")]
    NotUtf8(Field),

    #[error("record {seq} is missing field {field:?}")]
    MissingField { seq: u64, field: Field },

    #[error("record {seq} stores id {stored}")]
    IdMismatch { seq: u64, stored: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Hash,
    Name,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Id, Field::Hash, Field::Name];

    pub fn tag(self) -> u64 {
        match self {
            Field::Id => 1,
            Field::Hash => 2,
            Field::Name => 3,
        }
    }

    pub fn from_tag(tag: u64) -> Result<Self, SchemaError> {
        match tag {
            1 => Ok(Field::Id),
            2 => Ok(Field::Hash),
            3 => Ok(Field::Name),
            other => Err(SchemaError::UnknownField(other)),
        }
    }
}

pub fn field_key(seq: u64, field: Field) -> [u8; KEY_LEN] {
    raw_key(seq, field.tag())
}

/// Inclusive key bounds covering every entry of one record.
pub fn record_bounds(seq: u64) -> ([u8; KEY_LEN], [u8; KEY_LEN]) {
    (raw_key(seq, 0), raw_key(seq, u64::MAX))
}

fn raw_key(seq: u64, tag: u64) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    key[..8].copy_from_slice(&seq.to_be_bytes());
    key[8..].copy_from_slice(&tag.to_be_bytes());
    key
}

pub fn split_key(key: &[u8]) -> Result<(u64, Field), SchemaError> {
    let bytes: [u8; KEY_LEN] = key
        .try_into()
        .map_err(|_| SchemaError::KeyLength(key.len()))?;
    let mut seq = [0u8; 8];
    let mut tag = [0u8; 8];
    seq.copy_from_slice(&bytes[..8]);
    tag.copy_from_slice(&bytes[8..]);
    Ok((u64::from_be_bytes(seq), Field::from_tag(u64::from_be_bytes(tag))?))
}

/// The three entries written for a user at `seq`.
pub fn encode_user(seq: u64, name: &str, password_hash: &str) -> Vec<([u8; KEY_LEN], Vec<u8>)> {
    vec![
        (field_key(seq, Field::Id), seq.to_string().into_bytes()),
        (field_key(seq, Field::Hash), password_hash.as_bytes().to_vec()),
        (field_key(seq, Field::Name), name.as_bytes().to_vec()),
    ]
}

/// Collects the entries of one record.
#[derive(Debug)]
pub struct RecordBuilder {
    seq: u64,
    id: Option<String>,
    hash: Option<String>,
    name: Option<String>,
}

impl RecordBuilder {
    pub fn new(seq: u64) -> Self {
        Self {
            seq,
            id: None,
            hash: None,
            name: None,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn apply(&mut self, field: Field, value: &[u8]) -> Result<(), SchemaError> {
        let text = std::str::from_utf8(value)
            .map_err(|_| SchemaError::NotUtf8(field))?
            .to_string();
        match field {
            Field::Id => self.id = Some(text),
            Field::Hash => self.hash = Some(text),
            Field::Name => self.name = Some(text),
        }
        Ok(())
    }

    pub fn finish(self) -> Result<User, SchemaError> {
        let seq = self.seq;
        let missing = |field| SchemaError::MissingField { seq, field };
        let id = self.id.ok_or_else(|| missing(Field::Id))?;
        if id != seq.to_string() {
            return Err(SchemaError::IdMismatch { seq, stored: id });
        }
        Ok(User {
            id,
            name: self.name.ok_or_else(|| missing(Field::Name))?,
            password_hash: self.hash.ok_or_else(|| missing(Field::Hash))?,
        })
    }
}

/// Decodes a single record from its entries.
pub fn decode_user<'a, I>(seq: u64, entries: I) -> Result<Option<User>, SchemaError>
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let mut builder = RecordBuilder::new(seq);
    let mut seen = false;
    for (key, value) in entries {
        let (_, field) = split_key(key)?;
        builder.apply(field, value)?;
        seen = true;
    }
    if !seen {
        return Ok(None);
    }
    builder.finish().map(Some)
}

/// Cursor state for a page walk over the table in key order.
///
/// Entries are fed one at a time; the first `offset` records are skipped
/// without decoding, then up to `limit` records are collected.
#[derive(Debug)]
pub struct PageCursor {
    offset: u64,
    limit: usize,
    records_seen: u64,
    current: Option<(RecordBuilder, bool)>,
    page: Vec<User>,
}

impl PageCursor {
    pub fn new(offset: u64, limit: u64) -> Self {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Self {
            offset,
            limit,
            records_seen: 0,
            current: None,
            page: Vec::with_capacity(limit.min(128)),
        }
    }

    /// Feeds one entry. Returns `false` once the page is full and the walk
    /// can stop.
    pub fn push(&mut self, key: &[u8], value: &[u8]) -> Result<bool, SchemaError> {
        let (seq, field) = split_key(key)?;
        let same_record = matches!(&self.current, Some((b, _)) if b.seq() == seq);
        if !same_record {
            self.close_record()?;
            if self.page.len() >= self.limit {
                return Ok(false);
            }
            let keep = self.records_seen >= self.offset;
            self.records_seen += 1;
            self.current = Some((RecordBuilder::new(seq), keep));
        }
        if let Some((builder, true)) = self.current.as_mut() {
            builder.apply(field, value)?;
        }
        Ok(true)
    }

    pub fn finish(mut self) -> Result<Vec<User>, SchemaError> {
        self.close_record()?;
        Ok(self.page)
    }

    fn close_record(&mut self) -> Result<(), SchemaError> {
        if let Some((builder, keep)) = self.current.take() {
            if keep {
                self.page.push(builder.finish()?);
            }
        }
        Ok(())
    }
}
