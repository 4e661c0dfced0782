//! Record source - turns CSV lines into wager records.
//!
//! Each line carries exactly five comma-separated fields
//! `first_name,last_name,document,birth_date,number`. Lines with a different
//! field count are logged and skipped here; records whose fields fail
//! validation, or that are not UTF-8, are returned as errors so the caller
//! can pick a policy.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::codec::{WagerRecord, RECORD_FIELD_COUNT};
use crate::error::{AgencyError, Result};

/// What to do with a line whose fields fail record validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidRecordPolicy {
    /// Log and drop the line, like a line with the wrong field count.
    #[default]
    Skip,
    /// Abort the session.
    Abort,
}

impl FromStr for InvalidRecordPolicy {
    type Err = AgencyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(AgencyError::Config(format!(
                "invalid record policy {other:?}, expected \"skip\" or \"abort\""
            ))),
        }
    }
}

impl fmt::Display for InvalidRecordPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skip => "skip",
            Self::Abort => "abort",
        })
    }
}

/// Default record file for an agency: `agency-{id}.csv`.
pub fn agency_file_path(agency_id: u8) -> PathBuf {
    PathBuf::from(format!("agency-{agency_id}.csv"))
}

/// Parse one CSV line into a record.
///
/// A wrong field count is an `InputFormat` error carrying `line_number`.
pub fn parse_line(line_number: u64, line: &str) -> Result<WagerRecord> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != RECORD_FIELD_COUNT {
        return Err(AgencyError::InputFormat {
            line: line_number,
            fields: fields.len(),
        });
    }
    WagerRecord::from_fields(&fields)
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Sequential producer of wager records from a line-oriented reader.
pub struct RecordSource<R> {
    reader: R,
    line: Vec<u8>,
    line_number: u64,
    skipped_lines: u64,
}

impl RecordSource<BufReader<File>> {
    /// Open a record file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref()).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: AsyncBufRead + Unpin> RecordSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            line_number: 0,
            skipped_lines: 0,
        }
    }

    /// Next record, or `None` once the source is exhausted.
    ///
    /// Lines with the wrong field count are skipped with a warning. A record
    /// validation error or a non-UTF-8 line is returned as `Err`; calling
    /// again continues with the following line.
    pub async fn next_record(&mut self) -> Result<Option<WagerRecord>> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line).await? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let Ok(line) = std::str::from_utf8(strip_line_ending(&self.line)) else {
                return Err(AgencyError::InvalidEncoding {
                    line: self.line_number,
                });
            };
            match parse_line(self.line_number, line) {
                Ok(record) => return Ok(Some(record)),
                Err(e @ AgencyError::InputFormat { .. }) => {
                    self.skipped_lines += 1;
                    tracing::warn!(error = %e, line = %line, "skipping malformed line");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 1-based number of the last line read.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Lines dropped for having the wrong field count.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(data: &str) -> (Vec<WagerRecord>, u64) {
        let mut source = RecordSource::new(data.as_bytes());
        let mut records = Vec::new();
        while let Some(record) = source.next_record().await.unwrap() {
            records.push(record);
        }
        (records, source.skipped_lines())
    }

    #[tokio::test]
    async fn test_reads_records_in_order() {
        let (records, skipped) = collect(
            "Ana,Diaz,30000001,1990-01-01,7\nLuis,Perez,30000002,1991-02-02,42\n",
        )
        .await;

        assert_eq!(skipped, 0);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].first_name(), "Ana");
        assert_eq!(records[1].number(), 42);
    }

    #[tokio::test]
    async fn test_wrong_field_count_is_skipped() {
        let (records, skipped) = collect(
            "Ana,Diaz,30000001,1990-01-01,7\nBad,Line,only3,x\nLuis,Perez,30000002,1991-02-02,42",
        )
        .await;

        assert_eq!(skipped, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].first_name(), "Luis");
    }

    #[tokio::test]
    async fn test_crlf_line_endings() {
        let (records, skipped) = collect("Ana,Diaz,30000001,1990-01-01,7\r\n").await;
        assert_eq!(skipped, 0);
        assert_eq!(records[0].number(), 7);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let (records, skipped) = collect("").await;
        assert!(records.is_empty());
        assert_eq!(skipped, 0);
    }

    #[tokio::test]
    async fn test_record_error_is_returned_and_reading_continues() {
        let data = "Ana,Diaz,notanumber,1990-01-01,7\nLuis,Perez,30000002,1991-02-02,42\n";
        let mut source = RecordSource::new(data.as_bytes());

        let err = source.next_record().await.unwrap_err();
        assert!(err.is_record_error());
        assert_eq!(source.line_number(), 1);

        let record = source.next_record().await.unwrap().unwrap();
        assert_eq!(record.first_name(), "Luis");
        assert!(source.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latin1_line_is_a_record_error() {
        let data: &[u8] = b"Ana,Diaz,30000001,1990-01-01,7\n\
            Jos\xe9,Nu\xf1ez,30000003,1990-01-01,8\r\n\
            Luis,Perez,30000002,1991-02-02,42\n";
        let mut source = RecordSource::new(data);

        assert_eq!(source.next_record().await.unwrap().unwrap().first_name(), "Ana");

        let err = source.next_record().await.unwrap_err();
        assert!(matches!(err, AgencyError::InvalidEncoding { line: 2 }));
        assert!(err.is_record_error());

        assert_eq!(source.next_record().await.unwrap().unwrap().first_name(), "Luis");
        assert!(source.next_record().await.unwrap().is_none());
        assert_eq!(source.skipped_lines(), 0);
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let (records, _) = collect("Ana,Diaz,30000001,1990-01-01,7").await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].number(), 7);
    }

    #[test]
    fn test_parse_line_field_count() {
        match parse_line(3, "Bad,Line,only3") {
            Err(AgencyError::InputFormat { line, fields }) => {
                assert_eq!(line, 3);
                assert_eq!(fields, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(parse_line(1, "a,b,1,1990-01-01,1,extra").is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("skip".parse::<InvalidRecordPolicy>().unwrap(), InvalidRecordPolicy::Skip);
        assert_eq!("ABORT".parse::<InvalidRecordPolicy>().unwrap(), InvalidRecordPolicy::Abort);
        assert!("retry".parse::<InvalidRecordPolicy>().is_err());
        assert_eq!(InvalidRecordPolicy::default().to_string(), "skip");
    }

    #[test]
    fn test_agency_file_path() {
        assert_eq!(agency_file_path(3), PathBuf::from("agency-3.csv"));
    }
}
