//! Wager record and finish notification codec.
//!
//! Record layout (all integers Big Endian):
//! ```text
//! ┌─────────┬──────┬─────────────┬──────────┬──────────┬────────────┬─────────┐
//! │ nameLen │ name │ lastNameLen │ lastName │ document │ birthDate  │ number  │
//! │ u8      │ var  │ u8          │ var      │ u64      │ 10 bytes   │ u32     │
//! └─────────┴──────┴─────────────┴──────────┴──────────┴────────────┴─────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::reader::{utf8, Reader};
use crate::error::{AgencyError, Result};

/// Maximum byte length of a length-prefixed name field.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Exact byte length of a birth date (`YYYY-MM-DD`).
pub const BIRTH_DATE_LEN: usize = 10;

/// Encoded bytes of a record excluding the two name payloads.
const FIXED_RECORD_SIZE: usize = 1 + 1 + 8 + BIRTH_DATE_LEN + 4;

/// Number of comma-separated fields that make up one record line.
pub const RECORD_FIELD_COUNT: usize = 5;

/// One wager placed at an agency.
///
/// Built once from validated fields and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WagerRecord {
    first_name: String,
    last_name: String,
    document: u64,
    birth_date: String,
    number: u32,
}

impl WagerRecord {
    /// Create a record from typed fields.
    ///
    /// Fails with `FieldTooLong` for names over 255 bytes and
    /// `InvalidBirthDate` unless the date is `YYYY-MM-DD`.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        document: u64,
        birth_date: impl Into<String>,
        number: u32,
    ) -> Result<Self> {
        let first_name = first_name.into();
        let last_name = last_name.into();
        let birth_date = birth_date.into();

        check_name("first_name", &first_name)?;
        check_name("last_name", &last_name)?;
        check_birth_date(&birth_date)?;

        Ok(Self {
            first_name,
            last_name,
            document,
            birth_date,
            number,
        })
    }

    /// Parse a record from its five text fields
    /// `(first name, last name, document, birth date, wager number)`.
    ///
    /// # Example
    ///
    /// ```
    /// use agency_client::codec::WagerRecord;
    ///
    /// let record = WagerRecord::from_fields(&["Ana", "Diaz", "30000001", "1990-01-01", "7"]).unwrap();
    /// assert_eq!(record.document(), 30000001);
    /// assert!(WagerRecord::from_fields(&["Ana", "Diaz", "3e7", "1990-01-01", "7"]).is_err());
    /// ```
    pub fn from_fields(fields: &[&str]) -> Result<Self> {
        let &[first_name, last_name, document, birth_date, number] = fields else {
            return Err(AgencyError::Protocol(format!(
                "a record needs {RECORD_FIELD_COUNT} fields, got {}",
                fields.len()
            )));
        };

        Self::new(
            first_name,
            last_name,
            parse_numeric("document", document)?,
            birth_date,
            parse_numeric("number", number)?,
        )
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn document(&self) -> u64 {
        self.document
    }

    pub fn birth_date(&self) -> &str {
        &self.birth_date
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Size of this record on the wire.
    pub fn encoded_len(&self) -> usize {
        FIXED_RECORD_SIZE + self.first_name.len() + self.last_name.len()
    }

    /// Append the encoded record to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        // Lengths were checked at construction, the casts cannot truncate.
        buf.put_u8(self.first_name.len() as u8);
        buf.put_slice(self.first_name.as_bytes());
        buf.put_u8(self.last_name.len() as u8);
        buf.put_slice(self.last_name.as_bytes());
        buf.put_u64(self.document);
        buf.put_slice(self.birth_date.as_bytes());
        buf.put_u32(self.number);
    }

    /// Encode the record to bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Decode one record from the front of `buf`.
    ///
    /// Returns the record and the number of bytes consumed. Fails with
    /// `MalformedRecord` when a field would read past the end of the buffer.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut reader = Reader::new(buf);
        let record = Self::read(&mut reader)?;
        Ok((record, reader.position()))
    }

    pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let first_name = reader.short_string("first_name")?;
        let last_name = reader.short_string("last_name")?;
        let document = reader.u64("document")?;
        let birth_date = utf8("birth_date", reader.take("birth_date", BIRTH_DATE_LEN)?)?;
        let number = reader.u32("number")?;

        Self::new(first_name, last_name, document, birth_date, number)
    }
}

fn check_name(field: &'static str, value: &str) -> Result<()> {
    if value.len() > MAX_NAME_LEN {
        return Err(AgencyError::FieldTooLong {
            field,
            len: value.len(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

fn check_birth_date(value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    let shaped = bytes.len() == BIRTH_DATE_LEN
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if shaped {
        Ok(())
    } else {
        Err(AgencyError::InvalidBirthDate(value.to_string()))
    }
}

fn parse_numeric<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T> {
    // `str::parse` accepts a leading '+', the wire format only knows plain digits.
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AgencyError::InvalidNumericField {
            field,
            value: value.to_string(),
        });
    }
    value.parse().map_err(|_| AgencyError::InvalidNumericField {
        field,
        value: value.to_string(),
    })
}

/// "Agency finished" notification, sent once after the last batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishNotification {
    /// Agency identifier.
    pub agency_id: u8,
}

impl FinishNotification {
    /// Encoded size (a single byte).
    pub const SIZE: usize = 1;

    pub fn new(agency_id: u8) -> Self {
        Self { agency_id }
    }

    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&[self.agency_id])
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(buf);
        Ok(Self::new(reader.u8("agency_id")?))
    }
}
