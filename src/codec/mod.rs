//! Codec module - binary encoding of requests and responses.
//!
//! - [`WagerRecord`] / [`FinishNotification`] - request payload building blocks
//! - [`Batch`] - a framed group of records with id and count
//! - [`BatchAck`] / [`WinnerResult`] - the two response shapes, chosen by [`ExpectedResponse`]
//!
//! # Example
//!
//! ```
//! use agency_client::codec::{Batch, WagerRecord};
//!
//! let record = WagerRecord::new("Ana", "Diaz", 30000001, "1990-01-01", 7).unwrap();
//! let bytes = Batch::new(0, vec![record.clone()]).encode().unwrap();
//! let batch = Batch::decode(&bytes).unwrap();
//! assert_eq!(batch.records(), &[record]);
//! ```

mod batch;
mod reader;
mod record;
mod response;

pub use batch::{Batch, BATCH_HEADER_SIZE};
pub use record::{
    FinishNotification, WagerRecord, BIRTH_DATE_LEN, MAX_NAME_LEN, RECORD_FIELD_COUNT,
};
pub use response::{BatchAck, ExpectedResponse, Response, WinnerResult};
