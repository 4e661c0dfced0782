//! # agency-client
//!
//! Client for the lottery aggregation server.
//!
//! An agency reads its wagers from a CSV file, sends them to the server in
//! acknowledged batches over one TCP connection, announces that it has
//! finished, and receives the number of winners drawn for it.
//!
//! ## Layers
//!
//! - **Codec**: binary encoding of records, batches and responses
//! - **Protocol**: length-prefixed framing (`u32 length ‖ u8 sender ‖ payload`)
//! - **Transport**: a framed connection immune to short reads and writes
//! - **Session**: the request/response state machine driving one run
//!
//! ## Example
//!
//! ```ignore
//! use agency_client::{RecordSource, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::builder(1)
//!         .server_address("127.0.0.1:12345")
//!         .batch_size(100)
//!         .build()?;
//!
//!     let report = session.run(RecordSource::open("agency-1.csv").await?).await?;
//!     println!("winners: {}", report.winners);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod source;
pub mod transport;

mod session;

pub use error::{AgencyError, Result};
pub use session::{Session, SessionBuilder, SessionReport, SessionState, DEFAULT_BATCH_SIZE};
pub use source::{InvalidRecordPolicy, RecordSource};
