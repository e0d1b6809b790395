//! Market binary interchange format.
//!
//! A stream is a fixed-size metadata block followed by self-framed records:
//!
//! ```text
//! [metadata: METADATA_LENGTH bytes][record 1][record 2]...[record N]
//! ```
//!
//! The same layout is used in memory and on disk. This crate provides:
//!
//! - `enums`: schemas, record types, sides and actions with their wire codes
//! - `symbols`: the instrument id to ticker table
//! - `metadata`: the stream header block
//! - `record` / `codec`: typed records and their binary layouts
//! - `buffer`: [`BufferStore`], which owns a stream and offers eager decode,
//!   tabular projection and stateful replay
//! - `table`: the row-per-record projection and its CSV/JSON output
//! - `backtest` / `report`: backtest result containers and the CRC-checked
//!   report file they are persisted in
//!
//! The binaries (`src/main.rs` and `src/bin/player.rs`) inspect, export and
//! replay stream files.
pub mod backtest;
pub mod buffer;
pub mod codec;
pub mod enums;
pub mod error;
pub mod metadata;
pub mod record;
pub mod report;
pub mod symbols;
pub mod table;
mod wire;

pub use buffer::{BufferStore, Replay};
pub use codec::{decode_many, decode_one, encode_record, encode_records, encode_stream};
pub use enums::{Action, RType, Schema, Side};
pub use error::{Error, Result};
pub use metadata::Metadata;
pub use record::{
    BboMsg, BidAskPair, Mbp1Msg, OhlcvMsg, Record, RecordEnum, RecordHeader, TbboMsg, TradeMsg,
};
pub use symbols::SymbolMap;
pub use table::{Cell, Table, TableOptions};

/// Size of the metadata block; the first record starts at this offset.
pub const METADATA_LENGTH: usize = 100;

/// Fixed-point scale of every price field.
pub const PRICE_SCALE: i64 = 1_000_000_000;

/// Display value of a fixed-point price.
pub fn pretty_px(raw: i64) -> f64 {
    raw as f64 / PRICE_SCALE as f64
}
