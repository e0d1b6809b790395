//! Row-per-record projection of a decoded stream.
use crate::enums::{Action, RType, Side};
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::pretty_px;
use crate::record::{BidAskPair, Record, RecordEnum, ts_to_rfc3339};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use tracing::warn;

/// Rendering switches for [`project`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOptions {
    /// Render `ts_event` and `ts_recv` as RFC 3339 text.
    pub pretty_ts: bool,
    /// Render fixed-point prices as floats.
    pub pretty_px: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Null,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Int(v) => write!(f, "{v}"),
            Cell::UInt(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Text(v) => f.write_str(v),
            Cell::Null => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` in the column called `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&Cell> {
        let col = self.column_index(name)?;
        self.rows.get(row)?.get(col)
    }

    /// Rows as column-ordered maps, for object-per-row serialization.
    pub fn records(&self) -> impl Iterator<Item = RowView<'_>> + '_ {
        self.rows.iter().map(|cells| RowView {
            columns: &self.columns,
            cells,
        })
    }

    pub fn write_csv<W: Write>(&self, mut w: W) -> Result<()> {
        write_csv_line(&mut w, self.columns.iter().map(String::as_str))?;
        for row in &self.rows {
            let rendered: Vec<String> = row.iter().map(Cell::to_string).collect();
            write_csv_line(&mut w, rendered.iter().map(String::as_str))?;
        }
        w.flush()?;
        Ok(())
    }
}

/// One table row serialized as a map in column order.
pub struct RowView<'a> {
    columns: &'a [String],
    cells: &'a [Cell],
}

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, cell) in self.columns.iter().zip(self.cells) {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

fn write_csv_line<'a, W: Write>(w: &mut W, fields: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut first = true;
    for field in fields {
        if !first {
            w.write_all(b",")?;
        }
        first = false;
        if field.contains(&[',', '"', '\n', '\r'][..]) {
            write!(w, "\"{}\"", field.replace('"', "\"\""))?;
        } else {
            w.write_all(field.as_bytes())?;
        }
    }
    w.write_all(b"\n")?;
    Ok(())
}

const LEVEL_FIELDS: [&str; 6] = ["bid_px", "ask_px", "bid_sz", "ask_sz", "bid_ct", "ask_ct"];

fn body_columns(rtype: RType) -> &'static [&'static str] {
    match rtype {
        RType::Ohlcv => &["open", "high", "low", "close", "volume"],
        RType::Mbp1 | RType::Tbbo | RType::Trade => &[
            "price",
            "size",
            "action",
            "side",
            "depth",
            "flags",
            "ts_recv",
            "ts_in_delta",
            "sequence",
        ],
        RType::Bbo => &["price", "size", "side", "flags", "ts_recv", "sequence"],
    }
}

/// Project `records` into a table, one row per record.
///
/// Every record must use the layout of `metadata.schema`; a stray layout
/// fails with [`Error::RTypeMismatch`]. Level columns are emitted for the
/// deepest record, shallower rows are padded with [`Cell::Null`].
pub fn project(metadata: &Metadata, records: &[RecordEnum], opts: TableOptions) -> Result<Table> {
    let expected = metadata.schema.rtype();
    for (index, record) in records.iter().enumerate() {
        if record.rtype() != expected {
            return Err(Error::RTypeMismatch {
                index,
                expected,
                found: record.rtype(),
            });
        }
    }
    let depth = records.iter().map(|r| r.levels().len()).max().unwrap_or(0);

    let mut columns: Vec<String> = ["ts_event", "instrument_id", "symbol"]
        .iter()
        .chain(body_columns(expected))
        .map(|c| c.to_string())
        .collect();
    for level in 0..depth {
        columns.extend(LEVEL_FIELDS.iter().map(|f| format!("{f}_{level:02}")));
    }

    let mut unknown = 0usize;
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let mut row = Vec::with_capacity(columns.len());
        row.push(ts_cell(record.ts_event(), opts));
        row.push(Cell::UInt(u64::from(record.instrument_id())));
        row.push(match metadata.mappings.get_ticker(record.instrument_id()) {
            Ok(ticker) => Cell::Text(ticker.to_string()),
            Err(_) => {
                unknown += 1;
                Cell::Null
            }
        });
        push_body(&mut row, record, opts);
        let levels = record.levels();
        for level in 0..depth {
            match levels.get(level) {
                Some(pair) => push_level(&mut row, pair, opts),
                None => row.extend(std::iter::repeat_n(Cell::Null, LEVEL_FIELDS.len())),
            }
        }
        debug_assert_eq!(row.len(), columns.len());
        rows.push(row);
    }
    if unknown > 0 {
        warn!(rows = unknown, "instrument ids missing from the symbol map");
    }
    Ok(Table { columns, rows })
}

fn ts_cell(ts: u64, opts: TableOptions) -> Cell {
    if !opts.pretty_ts {
        return Cell::UInt(ts);
    }
    match ts_to_rfc3339(ts) {
        Some(text) => Cell::Text(text),
        None => {
            warn!(ts, "timestamp out of range for RFC 3339, keeping raw value");
            Cell::UInt(ts)
        }
    }
}

fn px_cell(px: i64, opts: TableOptions) -> Cell {
    if opts.pretty_px {
        Cell::Float(pretty_px(px))
    } else {
        Cell::Int(px)
    }
}

fn side_cell(code: u8) -> Cell {
    match Side::try_from(code) {
        Ok(side) => Cell::Text(side.as_char().to_string()),
        Err(_) => Cell::UInt(u64::from(code)),
    }
}

fn action_cell(code: u8) -> Cell {
    match Action::try_from(code) {
        Ok(action) => Cell::Text(action.as_char().to_string()),
        Err(_) => Cell::UInt(u64::from(code)),
    }
}

fn push_body(row: &mut Vec<Cell>, record: &RecordEnum, opts: TableOptions) {
    match record {
        RecordEnum::Ohlcv(msg) => row.extend([
            px_cell(msg.open, opts),
            px_cell(msg.high, opts),
            px_cell(msg.low, opts),
            px_cell(msg.close, opts),
            Cell::UInt(msg.volume),
        ]),
        RecordEnum::Mbp1(msg) | RecordEnum::Tbbo(msg) => row.extend([
            px_cell(msg.price, opts),
            Cell::UInt(u64::from(msg.size)),
            action_cell(msg.action),
            side_cell(msg.side),
            Cell::UInt(u64::from(msg.depth)),
            Cell::UInt(u64::from(msg.flags)),
            ts_cell(msg.ts_recv, opts),
            Cell::Int(i64::from(msg.ts_in_delta)),
            Cell::UInt(u64::from(msg.sequence)),
        ]),
        RecordEnum::Trade(msg) => row.extend([
            px_cell(msg.price, opts),
            Cell::UInt(u64::from(msg.size)),
            action_cell(msg.action),
            side_cell(msg.side),
            Cell::UInt(u64::from(msg.depth)),
            Cell::UInt(u64::from(msg.flags)),
            ts_cell(msg.ts_recv, opts),
            Cell::Int(i64::from(msg.ts_in_delta)),
            Cell::UInt(u64::from(msg.sequence)),
        ]),
        RecordEnum::Bbo(msg) => row.extend([
            px_cell(msg.price, opts),
            Cell::UInt(u64::from(msg.size)),
            side_cell(msg.side),
            Cell::UInt(u64::from(msg.flags)),
            ts_cell(msg.ts_recv, opts),
            Cell::UInt(u64::from(msg.sequence)),
        ]),
    }
}

fn push_level(row: &mut Vec<Cell>, pair: &BidAskPair, opts: TableOptions) {
    row.extend([
        px_cell(pair.bid_px, opts),
        px_cell(pair.ask_px, opts),
        Cell::UInt(u64::from(pair.bid_sz)),
        Cell::UInt(u64::from(pair.ask_sz)),
        Cell::UInt(u64::from(pair.bid_ct)),
        Cell::UInt(u64::from(pair.ask_ct)),
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::Schema;
    use crate::record::{BboMsg, Mbp1Msg, OhlcvMsg, RecordHeader, TradeMsg};
    use crate::symbols::SymbolMap;

    fn metadata() -> Metadata {
        let map: SymbolMap = [(1, "AAPL")].into_iter().collect();
        Metadata::new(Schema::Ohlcv1S, 0, 10, map)
    }

    fn bar(id: u32) -> RecordEnum {
        RecordEnum::Ohlcv(OhlcvMsg {
            hd: RecordHeader::new(RType::Ohlcv, id, 1_000_000_000),
            open: 1_500_000_000,
            high: 2_000_000_000,
            low: 1_000_000_000,
            close: 1_250_000_000,
            volume: 42,
        })
    }

    #[test]
    fn raw_projection() {
        let table = project(&metadata(), &[bar(1), bar(9)], TableOptions::default()).unwrap();
        assert_eq!(
            table.columns,
            [
                "ts_event",
                "instrument_id",
                "symbol",
                "open",
                "high",
                "low",
                "close",
                "volume"
            ]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "symbol"), Some(&Cell::Text("AAPL".into())));
        assert_eq!(table.get(1, "symbol"), Some(&Cell::Null));
        assert_eq!(table.get(0, "open"), Some(&Cell::Int(1_500_000_000)));
        assert_eq!(table.get(0, "ts_event"), Some(&Cell::UInt(1_000_000_000)));
    }

    #[test]
    fn pretty_projection() {
        let opts = TableOptions {
            pretty_ts: true,
            pretty_px: true,
        };
        let table = project(&metadata(), &[bar(1)], opts).unwrap();
        assert_eq!(table.get(0, "open"), Some(&Cell::Float(1.5)));
        assert_eq!(table.get(0, "close"), Some(&Cell::Float(1.25)));
        assert_eq!(
            table.get(0, "ts_event"),
            Some(&Cell::Text("1970-01-01T00:00:01Z".into()))
        );
        assert_eq!(table.get(0, "volume"), Some(&Cell::UInt(42)));
    }

    #[test]
    fn mixed_layouts_are_rejected() {
        let trade = RecordEnum::Trade(TradeMsg {
            hd: RecordHeader::new(RType::Trade, 1, 2),
            price: 1,
            size: 1,
            action: b'T',
            side: b'A',
            depth: 0,
            flags: 0,
            ts_recv: 2,
            ts_in_delta: 0,
            sequence: 0,
        });
        assert!(matches!(
            project(&metadata(), &[bar(1), trade], TableOptions::default()),
            Err(Error::RTypeMismatch {
                index: 1,
                expected: RType::Ohlcv,
                found: RType::Trade
            })
        ));
    }

    #[test]
    fn csv_output() {
        let table = Table {
            columns: vec!["a".into(), "b".into(), "c".into()],
            rows: vec![vec![Cell::Int(-1), Cell::Text("x,\"y\"".into()), Cell::Null]],
        };
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a,b,c\n-1,\"x,\"\"y\"\"\",\n");
    }

    #[test]
    fn rows_serialize_as_objects() {
        let table = project(&metadata(), &[bar(1)], TableOptions::default()).unwrap();
        let json = serde_json::to_string(&table.records().collect::<Vec<_>>()).unwrap();
        assert!(json.starts_with(r#"[{"ts_event":1000000000,"instrument_id":1,"symbol":"AAPL","open":1500000000"#));
    }

    fn level(px: i64) -> BidAskPair {
        BidAskPair {
            bid_px: px,
            ask_px: px + 500_000_000,
            bid_sz: 3,
            ask_sz: 4,
            bid_ct: 1,
            ask_ct: 2,
        }
    }

    fn mbp1(action: u8, side: u8, levels: Vec<BidAskPair>) -> RecordEnum {
        RecordEnum::Mbp1(Mbp1Msg {
            hd: RecordHeader::new(RType::Mbp1, 1, 10),
            price: 2_000_000_000,
            size: 5,
            action,
            side,
            depth: 0,
            flags: 0,
            ts_recv: 11,
            ts_in_delta: -3,
            sequence: 7,
            levels,
        })
    }

    #[test]
    fn mbp1_levels_are_padded_to_the_deepest_record() {
        let m = Metadata::new(Schema::Mbp1, 0, 10, metadata().mappings);
        let records = [
            mbp1(b'A', b'B', vec![level(1_000_000_000), level(3_000_000_000)]),
            mbp1(1, 1, Vec::new()),
        ];
        let opts = TableOptions {
            pretty_ts: false,
            pretty_px: true,
        };
        let table = project(&m, &records, opts).unwrap();

        let mut expected: Vec<String> = [
            "ts_event",
            "instrument_id",
            "symbol",
            "price",
            "size",
            "action",
            "side",
            "depth",
            "flags",
            "ts_recv",
            "ts_in_delta",
            "sequence",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        for n in ["00", "01"] {
            for f in LEVEL_FIELDS {
                expected.push(format!("{f}_{n}"));
            }
        }
        assert_eq!(table.columns, expected);

        assert_eq!(table.get(0, "action"), Some(&Cell::Text("A".into())));
        assert_eq!(table.get(0, "side"), Some(&Cell::Text("B".into())));
        assert_eq!(table.get(0, "price"), Some(&Cell::Float(2.0)));
        assert_eq!(table.get(0, "bid_px_00"), Some(&Cell::Float(1.0)));
        assert_eq!(table.get(0, "ask_px_01"), Some(&Cell::Float(3.5)));
        assert_eq!(table.get(0, "ask_ct_01"), Some(&Cell::UInt(2)));
        assert_eq!(table.get(0, "ts_in_delta"), Some(&Cell::Int(-3)));

        // unknown codes stay numeric
        assert_eq!(table.get(1, "action"), Some(&Cell::UInt(1)));
        assert_eq!(table.get(1, "side"), Some(&Cell::UInt(1)));
        let first_level = table.column_index("bid_px_00").unwrap();
        assert!(table.rows[1][first_level..].iter().all(|c| *c == Cell::Null));
    }

    #[test]
    fn bbo_columns() {
        let m = Metadata::new(Schema::Bbo1S, 0, 10, metadata().mappings);
        let bbo = RecordEnum::Bbo(BboMsg {
            hd: RecordHeader::new(RType::Bbo, 1, 1_000_000_000),
            price: 4,
            size: 9,
            side: b'N',
            flags: 0x80,
            ts_recv: 2_000_000_000,
            sequence: 12,
            levels: vec![level(6)],
        });
        let opts = TableOptions {
            pretty_ts: true,
            pretty_px: false,
        };
        let table = project(&m, &[bbo], opts).unwrap();
        assert_eq!(
            &table.columns[3..9],
            ["price", "size", "side", "flags", "ts_recv", "sequence"]
        );
        assert_eq!(table.columns.len(), 9 + LEVEL_FIELDS.len());
        assert_eq!(table.get(0, "side"), Some(&Cell::Text("N".into())));
        assert_eq!(table.get(0, "flags"), Some(&Cell::UInt(0x80)));
        assert_eq!(
            table.get(0, "ts_recv"),
            Some(&Cell::Text("1970-01-01T00:00:02Z".into()))
        );
        assert_eq!(table.get(0, "bid_px_00"), Some(&Cell::Int(6)));
        assert_eq!(table.get(0, "ask_px_00"), Some(&Cell::Int(500_000_006)));
    }

    #[test]
    fn trade_columns() {
        let m = Metadata::new(Schema::Trades, 0, 10, metadata().mappings);
        let trade = RecordEnum::Trade(TradeMsg {
            hd: RecordHeader::new(RType::Trade, 1, 5),
            price: 1,
            size: 2,
            action: b'T',
            side: b'A',
            depth: 0,
            flags: 0,
            ts_recv: 6,
            ts_in_delta: 0,
            sequence: 3,
        });
        let table = project(&m, &[trade], TableOptions::default()).unwrap();
        assert_eq!(table.columns.len(), 12);
        assert!(table.column_index("bid_px_00").is_none());
        assert_eq!(table.get(0, "action"), Some(&Cell::Text("T".into())));
        assert_eq!(table.get(0, "side"), Some(&Cell::Text("A".into())));
        assert_eq!(table.get(0, "sequence"), Some(&Cell::UInt(3)));
    }
}
