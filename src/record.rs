//! Typed records and the read-only view they share.
//!
//! Each record starts with a [`RecordHeader`] and carries one fixed body
//! layout per [`RType`]. Prices are fixed-point integers scaled by
//! [`PRICE_SCALE`](crate::PRICE_SCALE); the `pretty_*` accessors give the
//! floating display value.
use crate::enums::{Action, RType, Side};
use crate::error::Result;
use crate::pretty_px;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Size of the record header on the wire.
pub const HEADER_SIZE: usize = 16;
/// The header length field counts 4-byte words.
pub const LENGTH_MULTIPLIER: usize = 4;
/// Largest record expressible by the one-byte length field.
pub const MAX_RECORD_SIZE: usize = u8::MAX as usize * LENGTH_MULTIPLIER;
/// Bytes preceding the level array in MBP-1, TBBO and BBO records; also the
/// full size of a trade record.
pub const BOOK_FIXED_SIZE: usize = 48;
pub const OHLCV_SIZE: usize = 56;
pub const LEVEL_SIZE: usize = 32;

/// Fields common to every record.
///
/// The wire header also carries the record length; it is derived from the
/// body when encoding (see [`Record::record_size`]) instead of being stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordHeader {
    pub rtype: RType,
    pub instrument_id: u32,
    /// Event time, ns since the UNIX epoch.
    pub ts_event: u64,
}

impl RecordHeader {
    pub fn new(rtype: RType, instrument_id: u32, ts_event: u64) -> Self {
        Self {
            rtype,
            instrument_id,
            ts_event,
        }
    }
}

/// One depth-of-book level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BidAskPair {
    pub bid_px: i64,
    pub ask_px: i64,
    pub bid_sz: u32,
    pub ask_sz: u32,
    pub bid_ct: u32,
    pub ask_ct: u32,
}

impl BidAskPair {
    pub fn pretty_bid_px(&self) -> f64 {
        pretty_px(self.bid_px)
    }

    pub fn pretty_ask_px(&self) -> f64 {
        pretty_px(self.ask_px)
    }
}

/// Market-by-price update with its top level(s). Also used for TBBO records,
/// which share the layout under their own rtype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mbp1Msg {
    pub hd: RecordHeader,
    pub price: i64,
    pub size: u32,
    /// Raw [`Action`] code.
    pub action: u8,
    /// Raw [`Side`] code.
    pub side: u8,
    pub depth: u8,
    pub flags: u8,
    pub ts_recv: u64,
    pub ts_in_delta: i32,
    pub sequence: u32,
    pub levels: Vec<BidAskPair>,
}

pub type TbboMsg = Mbp1Msg;

/// Trade print.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeMsg {
    pub hd: RecordHeader,
    pub price: i64,
    pub size: u32,
    pub action: u8,
    pub side: u8,
    pub depth: u8,
    pub flags: u8,
    pub ts_recv: u64,
    pub ts_in_delta: i32,
    pub sequence: u32,
}

/// Best bid and offer snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BboMsg {
    pub hd: RecordHeader,
    pub price: i64,
    pub size: u32,
    pub side: u8,
    pub flags: u8,
    pub ts_recv: u64,
    pub sequence: u32,
    pub levels: Vec<BidAskPair>,
}

/// Bar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OhlcvMsg {
    pub hd: RecordHeader,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: u64,
}

impl OhlcvMsg {
    pub fn pretty_open(&self) -> f64 {
        pretty_px(self.open)
    }
    pub fn pretty_high(&self) -> f64 {
        pretty_px(self.high)
    }
    pub fn pretty_low(&self) -> f64 {
        pretty_px(self.low)
    }
    pub fn pretty_close(&self) -> f64 {
        pretty_px(self.close)
    }
}

macro_rules! side_action_accessors {
    ($ty:ty, action) => {
        side_action_accessors!($ty);
        impl $ty {
            pub fn action(&self) -> Result<Action> {
                Action::try_from(self.action)
            }
        }
    };
    ($ty:ty) => {
        impl $ty {
            pub fn side(&self) -> Result<Side> {
                Side::try_from(self.side)
            }
        }
    };
}

side_action_accessors!(Mbp1Msg, action);
side_action_accessors!(TradeMsg, action);
side_action_accessors!(BboMsg);

/// Read-only view shared by every record layout.
pub trait Record {
    fn header(&self) -> &RecordHeader;

    /// Representative price: the order/trade price, or the close of a bar.
    fn price(&self) -> i64;

    /// Encoded size in bytes, header included.
    fn record_size(&self) -> usize;

    fn rtype(&self) -> RType {
        self.header().rtype
    }

    fn instrument_id(&self) -> u32 {
        self.header().instrument_id
    }

    fn ts_event(&self) -> u64 {
        self.header().ts_event
    }

    fn pretty_price(&self) -> f64 {
        pretty_px(self.price())
    }
}

impl Record for Mbp1Msg {
    fn header(&self) -> &RecordHeader {
        &self.hd
    }
    fn price(&self) -> i64 {
        self.price
    }
    fn record_size(&self) -> usize {
        BOOK_FIXED_SIZE + self.levels.len() * LEVEL_SIZE
    }
}

impl Record for TradeMsg {
    fn header(&self) -> &RecordHeader {
        &self.hd
    }
    fn price(&self) -> i64 {
        self.price
    }
    fn record_size(&self) -> usize {
        BOOK_FIXED_SIZE
    }
}

impl Record for BboMsg {
    fn header(&self) -> &RecordHeader {
        &self.hd
    }
    fn price(&self) -> i64 {
        self.price
    }
    fn record_size(&self) -> usize {
        BOOK_FIXED_SIZE + self.levels.len() * LEVEL_SIZE
    }
}

impl Record for OhlcvMsg {
    fn header(&self) -> &RecordHeader {
        &self.hd
    }
    fn price(&self) -> i64 {
        self.close
    }
    fn record_size(&self) -> usize {
        OHLCV_SIZE
    }
}

/// Any decoded record, tagged by layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordEnum {
    Mbp1(Mbp1Msg),
    Ohlcv(OhlcvMsg),
    Trade(TradeMsg),
    Tbbo(TbboMsg),
    Bbo(BboMsg),
}

impl RecordEnum {
    /// The rtype this variant is encoded under, independent of the header.
    pub const fn variant_rtype(&self) -> RType {
        match self {
            RecordEnum::Mbp1(_) => RType::Mbp1,
            RecordEnum::Ohlcv(_) => RType::Ohlcv,
            RecordEnum::Trade(_) => RType::Trade,
            RecordEnum::Tbbo(_) => RType::Tbbo,
            RecordEnum::Bbo(_) => RType::Bbo,
        }
    }

    pub fn as_record(&self) -> &dyn Record {
        match self {
            RecordEnum::Mbp1(msg) | RecordEnum::Tbbo(msg) => msg,
            RecordEnum::Ohlcv(msg) => msg,
            RecordEnum::Trade(msg) => msg,
            RecordEnum::Bbo(msg) => msg,
        }
    }

    /// Depth levels carried by the record; empty for bars and trades.
    pub fn levels(&self) -> &[BidAskPair] {
        match self {
            RecordEnum::Mbp1(msg) | RecordEnum::Tbbo(msg) => &msg.levels,
            RecordEnum::Bbo(msg) => &msg.levels,
            RecordEnum::Ohlcv(_) | RecordEnum::Trade(_) => &[],
        }
    }
}

impl Record for RecordEnum {
    fn header(&self) -> &RecordHeader {
        self.as_record().header()
    }
    fn price(&self) -> i64 {
        self.as_record().price()
    }
    fn record_size(&self) -> usize {
        self.as_record().record_size()
    }
}

impl From<OhlcvMsg> for RecordEnum {
    fn from(msg: OhlcvMsg) -> Self {
        RecordEnum::Ohlcv(msg)
    }
}

impl From<TradeMsg> for RecordEnum {
    fn from(msg: TradeMsg) -> Self {
        RecordEnum::Trade(msg)
    }
}

impl From<BboMsg> for RecordEnum {
    fn from(msg: BboMsg) -> Self {
        RecordEnum::Bbo(msg)
    }
}

/// Wraps an MBP-1 layout message under the variant named by its header, so a
/// TBBO header yields [`RecordEnum::Tbbo`].
impl From<Mbp1Msg> for RecordEnum {
    fn from(msg: Mbp1Msg) -> Self {
        if msg.hd.rtype == RType::Tbbo {
            RecordEnum::Tbbo(msg)
        } else {
            RecordEnum::Mbp1(msg)
        }
    }
}

/// Render a nanosecond UNIX timestamp as RFC 3339 in UTC.
pub fn ts_to_rfc3339(ts: u64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ts))
        .ok()?
        .format(&Rfc3339)
        .ok()
}
