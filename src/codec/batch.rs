//! Batch codec.
//!
//! A batch is an 8-byte header followed by the concatenated records:
//! ```text
//! ┌──────────┬─────────────┬───────────┬───────────┬─────┐
//! │ batch ID │ recordCount │ record[0] │ record[1] │ ... │
//! │ u32 BE   │ u32 BE      │ var       │ var       │     │
//! └──────────┴─────────────┴───────────┴───────────┴─────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::reader::Reader;
use super::record::WagerRecord;
use crate::error::{AgencyError, Result};

/// Size of the batch header (id + count).
pub const BATCH_HEADER_SIZE: usize = 8;

/// An ordered group of records sent and acknowledged as one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    id: u32,
    records: Vec<WagerRecord>,
}

impl Batch {
    pub fn new(id: u32, records: Vec<WagerRecord>) -> Self {
        Self { id, records }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn records(&self) -> &[WagerRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Encode the batch.
    ///
    /// The declared record count is taken from the records being written,
    /// so header and body cannot disagree.
    ///
    /// # Example
    ///
    /// ```
    /// use agency_client::codec::Batch;
    ///
    /// let bytes = Batch::new(3, Vec::new()).encode().unwrap();
    /// assert_eq!(&bytes[..], &[0, 0, 0, 3, 0, 0, 0, 0]);
    /// ```
    pub fn encode(&self) -> Result<Bytes> {
        let count = u32::try_from(self.records.len()).map_err(|_| {
            AgencyError::Protocol(format!(
                "batch {} holds {} records, more than a u32 count",
                self.id,
                self.records.len()
            ))
        })?;

        let body_len: usize = self.records.iter().map(WagerRecord::encoded_len).sum();
        let mut buf = BytesMut::with_capacity(BATCH_HEADER_SIZE + body_len);
        buf.put_u32(self.id);
        buf.put_u32(count);
        for record in &self.records {
            record.encode_into(&mut buf);
        }
        Ok(buf.freeze())
    }

    /// Decode a batch that spans the whole buffer.
    ///
    /// Fails with `MalformedRecord` when fewer records are present than declared,
    /// and with `Protocol` when bytes are left over after the last record.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(buf);
        let id = reader.u32("batch_id")?;
        let count = reader.u32("record_count")? as usize;

        // A record is at least 24 bytes, never trust `count` for the allocation.
        let mut records = Vec::with_capacity(count.min(reader.remaining() / 24));
        for _ in 0..count {
            records.push(WagerRecord::read(&mut reader)?);
        }

        if reader.remaining() != 0 {
            return Err(AgencyError::Protocol(format!(
                "{} trailing bytes after batch {id}",
                reader.remaining()
            )));
        }

        Ok(Self { id, records })
    }
}
