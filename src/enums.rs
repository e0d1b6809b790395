//! Closed enumerations used on the wire.
//!
//! Every enum is declared once through [`wire_enum!`], which emits the variant
//! table (`ALL`), the integer and string conversions and `Display`. The table
//! is the only place a variant's code and text are written down, so
//! `from_int(v.code()) == v` and `v.to_string().parse() == v` hold by
//! construction.
//!
//! `Side` and `Action` are single-character enums: their discriminant *is*
//! the ASCII code of their character, e.g. `Side::Ask == b'A' == 65`. An
//! integer passed to `from_int` is therefore read as a character code, not as
//! an ordinal.
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident = $code:expr => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $code, )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical text, as accepted by `from_str`.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// Wire discriminant.
            pub const fn code(self) -> u8 {
                self as u8
            }

            /// Resolve a wire discriminant.
            pub fn from_int(code: u32) -> Result<Self> {
                u8::try_from(code)
                    .ok()
                    .and_then(|c| Self::ALL.iter().copied().find(|v| v.code() == c))
                    .ok_or_else(|| Error::invalid_enum($kind, code))
            }
        }

        impl TryFrom<u8> for $name {
            type Error = Error;

            fn try_from(code: u8) -> Result<Self> {
                Self::from_int(u32::from(code))
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value.code()
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(text: &str) -> Result<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(text))
                    .ok_or_else(|| Error::invalid_enum($kind, text))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Side of the book an order or aggressor belongs to.
    Side ("side") {
        /// A sell order or sell aggressor in a trade.
        Ask = b'A' => "A",
        /// A buy order or buy aggressor in a trade.
        Bid = b'B' => "B",
        /// No side specified by the source.
        None = b'N' => "N",
    }
}

wire_enum! {
    /// Event that produced a book or trade record.
    Action ("action") {
        /// An existing order was modified: price and/or size.
        Modify = b'M' => "M",
        /// An aggressing order traded. Does not affect the book.
        Trade = b'T' => "T",
        /// An existing order was filled. Does not affect the book.
        Fill = b'F' => "F",
        /// An order was fully or partially cancelled.
        Cancel = b'C' => "C",
        /// A new order was added to the book.
        Add = b'A' => "A",
        /// Reset the book; clear all orders for an instrument.
        Clear = b'R' => "R",
    }
}

wire_enum! {
    /// Logical record kind stored in a stream's metadata.
    Schema ("schema") {
        Mbp1 = 1 => "mbp-1",
        Ohlcv1S = 2 => "ohlcv-1s",
        Ohlcv1M = 3 => "ohlcv-1m",
        Ohlcv1H = 4 => "ohlcv-1h",
        Ohlcv1D = 5 => "ohlcv-1d",
        Trades = 6 => "trades",
        Tbbo = 7 => "tbbo",
        Bbo1S = 8 => "bbo-1s",
        Bbo1M = 9 => "bbo-1m",
    }
}

wire_enum! {
    /// Record-type tag identifying a physical record layout.
    RType ("rtype") {
        Mbp1 = 0x01 => "mbp-1",
        Ohlcv = 0x02 => "ohlcv",
        Trade = 0x03 => "trades",
        Tbbo = 0x04 => "tbbo",
        Bbo = 0x05 => "bbo",
    }
}

impl Side {
    pub const fn as_char(self) -> char {
        self as u8 as char
    }
}

impl Action {
    pub const fn as_char(self) -> char {
        self as u8 as char
    }
}

impl From<Side> for char {
    fn from(side: Side) -> Self {
        side.as_char()
    }
}

impl From<Action> for char {
    fn from(action: Action) -> Self {
        action.as_char()
    }
}

impl Schema {
    /// Layout used by records of this schema.
    pub const fn rtype(self) -> RType {
        match self {
            Schema::Mbp1 => RType::Mbp1,
            Schema::Ohlcv1S | Schema::Ohlcv1M | Schema::Ohlcv1H | Schema::Ohlcv1D => RType::Ohlcv,
            Schema::Trades => RType::Trade,
            Schema::Tbbo => RType::Tbbo,
            Schema::Bbo1S | Schema::Bbo1M => RType::Bbo,
        }
    }
}

impl RType {
    pub const fn from_schema(schema: Schema) -> Self {
        schema.rtype()
    }
}

impl From<Schema> for RType {
    fn from(schema: Schema) -> Self {
        schema.rtype()
    }
}

/// Bit flags carried in the `flags` field of book and trade records.
pub mod flags {
    /// Last message in the packet from the venue for a given `instrument_id`.
    pub const LAST: u8 = 1 << 7;
    /// Top-of-book message, not an individual order.
    pub const TOB: u8 = 1 << 6;
    /// Sourced from a replay, such as a snapshot server.
    pub const SNAPSHOT: u8 = 1 << 5;
    /// Aggregated price level message, not an individual order.
    pub const MBP: u8 = 1 << 4;
    /// `ts_recv` is inaccurate due to clock issues or packet reordering.
    pub const BAD_TS_RECV: u8 = 1 << 3;
    /// An unrecoverable gap was detected in the channel.
    pub const MAYBE_BAD_BOOK: u8 = 1 << 2;
}
