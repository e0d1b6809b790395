//! Record framing: header dispatch on decode, the exact inverse on encode.
//!
//! Every record begins with a one-byte length in 4-byte words, so a reader can
//! always skip a record without looking at its body. Decoding a record never
//! reads past its declared length; encoding derives the length from the
//! body so the two cannot disagree.
//!
//! Reserved bytes (two in the header, two and four in the BBO body) are
//! written as zero and skipped unchecked on decode.
use crate::enums::RType;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::record::{
    BOOK_FIXED_SIZE, BboMsg, BidAskPair, HEADER_SIZE, LENGTH_MULTIPLIER, LEVEL_SIZE,
    MAX_RECORD_SIZE, Mbp1Msg, OHLCV_SIZE, OhlcvMsg, Record, RecordEnum, RecordHeader, TradeMsg,
};
use crate::wire::{WireReader, WireWrite};
use tracing::debug;

/// Decode the record starting at `offset` in `bytes`.
///
/// Returns the record and the number of bytes it occupies. Errors carry the
/// offset within `bytes` where decoding failed.
pub fn decode_one(bytes: &[u8], offset: usize) -> Result<(RecordEnum, usize)> {
    let rest = bytes.get(offset..).unwrap_or_default();
    if rest.len() < HEADER_SIZE {
        return Err(Error::decode(
            offset,
            format!(
                "truncated record header: need {HEADER_SIZE} bytes, {} left",
                rest.len()
            ),
        ));
    }
    let size = usize::from(rest[0]) * LENGTH_MULTIPLIER;
    let tag = rest[1];
    let rtype =
        RType::try_from(tag).map_err(|_| Error::InvalidRecordType { rtype: tag, offset })?;
    if size < HEADER_SIZE {
        return Err(Error::decode(
            offset,
            format!("record length {size} is shorter than its header"),
        ));
    }
    if size > rest.len() {
        return Err(Error::decode(
            offset,
            format!(
                "truncated {rtype} record: declared {size} bytes, {} left",
                rest.len()
            ),
        ));
    }

    let mut r = WireReader::new(&rest[..size], offset);
    let hd = read_header(&mut r, rtype)?;
    let record = match rtype {
        RType::Ohlcv => {
            expect_size(rtype, size, OHLCV_SIZE, offset)?;
            RecordEnum::Ohlcv(OhlcvMsg {
                hd,
                open: r.read_i64()?,
                high: r.read_i64()?,
                low: r.read_i64()?,
                close: r.read_i64()?,
                volume: r.read_u64()?,
            })
        }
        RType::Trade => {
            expect_size(rtype, size, BOOK_FIXED_SIZE, offset)?;
            RecordEnum::Trade(TradeMsg {
                hd,
                price: r.read_i64()?,
                size: r.read_u32()?,
                action: r.read_u8()?,
                side: r.read_u8()?,
                depth: r.read_u8()?,
                flags: r.read_u8()?,
                ts_recv: r.read_u64()?,
                ts_in_delta: r.read_i32()?,
                sequence: r.read_u32()?,
            })
        }
        RType::Mbp1 | RType::Tbbo => {
            let count = level_count(rtype, size, offset)?;
            let msg = Mbp1Msg {
                hd,
                price: r.read_i64()?,
                size: r.read_u32()?,
                action: r.read_u8()?,
                side: r.read_u8()?,
                depth: r.read_u8()?,
                flags: r.read_u8()?,
                ts_recv: r.read_u64()?,
                ts_in_delta: r.read_i32()?,
                sequence: r.read_u32()?,
                levels: read_levels(&mut r, count)?,
            };
            if rtype == RType::Tbbo {
                RecordEnum::Tbbo(msg)
            } else {
                RecordEnum::Mbp1(msg)
            }
        }
        RType::Bbo => {
            let count = level_count(rtype, size, offset)?;
            let price = r.read_i64()?;
            let sz = r.read_u32()?;
            let side = r.read_u8()?;
            let flags = r.read_u8()?;
            r.skip(2)?; // reserved
            let ts_recv = r.read_u64()?;
            let sequence = r.read_u32()?;
            r.skip(4)?; // reserved
            RecordEnum::Bbo(BboMsg {
                hd,
                price,
                size: sz,
                side,
                flags,
                ts_recv,
                sequence,
                levels: read_levels(&mut r, count)?,
            })
        }
    };
    debug_assert_eq!(r.remaining(), 0);
    Ok((record, size))
}

/// Decode every record in `bytes`.
///
/// All or nothing: a trailing partial record fails the whole call.
pub fn decode_many(bytes: &[u8]) -> Result<Vec<RecordEnum>> {
    decode_from(bytes, 0)
}

/// Decode every record in `bytes[start..]`, reporting offsets relative to
/// `bytes`.
pub fn decode_from(bytes: &[u8], start: usize) -> Result<Vec<RecordEnum>> {
    let mut records = Vec::new();
    let mut offset = start;
    while offset < bytes.len() {
        let (record, consumed) = decode_one(bytes, offset)?;
        records.push(record);
        offset += consumed;
    }
    debug!(
        records = records.len(),
        bytes = bytes.len().saturating_sub(start),
        "decoded records"
    );
    Ok(records)
}

/// Append the wire form of `record` to `out`.
///
/// Fails with [`Error::Encode`] if the header rtype disagrees with the
/// variant or the record exceeds [`MAX_RECORD_SIZE`]; `out` is left
/// untouched in that case.
pub fn encode_record(record: &RecordEnum, out: &mut Vec<u8>) -> Result<()> {
    let hd = record.header();
    if hd.rtype != record.variant_rtype() {
        return Err(Error::Encode(format!(
            "{} record carries header rtype {}",
            record.variant_rtype(),
            hd.rtype
        )));
    }
    let size = record.record_size();
    if size > MAX_RECORD_SIZE {
        return Err(Error::Encode(format!(
            "{} record is {size} bytes, limit is {MAX_RECORD_SIZE}",
            hd.rtype
        )));
    }

    let start = out.len();
    out.reserve(size);
    // size is a multiple of 4 and at most 1020, so the word count fits a u8
    out.put_u8((size / LENGTH_MULTIPLIER) as u8);
    out.put_u8(hd.rtype.code());
    out.put_zeros(2);
    out.put_u32(hd.instrument_id);
    out.put_u64(hd.ts_event);
    match record {
        RecordEnum::Ohlcv(msg) => {
            out.put_i64(msg.open);
            out.put_i64(msg.high);
            out.put_i64(msg.low);
            out.put_i64(msg.close);
            out.put_u64(msg.volume);
        }
        RecordEnum::Trade(msg) => {
            out.put_i64(msg.price);
            out.put_u32(msg.size);
            out.put_u8(msg.action);
            out.put_u8(msg.side);
            out.put_u8(msg.depth);
            out.put_u8(msg.flags);
            out.put_u64(msg.ts_recv);
            out.put_i32(msg.ts_in_delta);
            out.put_u32(msg.sequence);
        }
        RecordEnum::Mbp1(msg) | RecordEnum::Tbbo(msg) => {
            out.put_i64(msg.price);
            out.put_u32(msg.size);
            out.put_u8(msg.action);
            out.put_u8(msg.side);
            out.put_u8(msg.depth);
            out.put_u8(msg.flags);
            out.put_u64(msg.ts_recv);
            out.put_i32(msg.ts_in_delta);
            out.put_u32(msg.sequence);
            write_levels(out, &msg.levels);
        }
        RecordEnum::Bbo(msg) => {
            out.put_i64(msg.price);
            out.put_u32(msg.size);
            out.put_u8(msg.side);
            out.put_u8(msg.flags);
            out.put_zeros(2);
            out.put_u64(msg.ts_recv);
            out.put_u32(msg.sequence);
            out.put_zeros(4);
            write_levels(out, &msg.levels);
        }
    }
    debug_assert_eq!(out.len() - start, size);
    Ok(())
}

/// Encode a record sequence back to back.
pub fn encode_records(records: &[RecordEnum]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(records.iter().map(Record::record_size).sum());
    for record in records {
        encode_record(record, &mut out)?;
    }
    Ok(out)
}

/// Encode a complete stream: metadata block followed by `records`.
pub fn encode_stream(metadata: &Metadata, records: &[RecordEnum]) -> Result<Vec<u8>> {
    let mut out = metadata.encode()?;
    for record in records {
        encode_record(record, &mut out)?;
    }
    Ok(out)
}

fn read_header(r: &mut WireReader<'_>, rtype: RType) -> Result<RecordHeader> {
    // length and rtype, already inspected by the caller
    r.skip(2)?;
    // reserved
    r.skip(2)?;
    let instrument_id = r.read_u32()?;
    let ts_event = r.read_u64()?;
    Ok(RecordHeader::new(rtype, instrument_id, ts_event))
}

fn expect_size(rtype: RType, size: usize, expected: usize, offset: usize) -> Result<()> {
    if size != expected {
        return Err(Error::decode(
            offset,
            format!("{rtype} record length {size}, expected {expected}"),
        ));
    }
    Ok(())
}

fn level_count(rtype: RType, size: usize, offset: usize) -> Result<usize> {
    if size < BOOK_FIXED_SIZE || (size - BOOK_FIXED_SIZE) % LEVEL_SIZE != 0 {
        return Err(Error::decode(
            offset,
            format!("{rtype} record length {size} does not hold a whole number of levels"),
        ));
    }
    Ok((size - BOOK_FIXED_SIZE) / LEVEL_SIZE)
}

fn read_levels(r: &mut WireReader<'_>, count: usize) -> Result<Vec<BidAskPair>> {
    (0..count)
        .map(|_| {
            Ok(BidAskPair {
                bid_px: r.read_i64()?,
                ask_px: r.read_i64()?,
                bid_sz: r.read_u32()?,
                ask_sz: r.read_u32()?,
                bid_ct: r.read_u32()?,
                ask_ct: r.read_u32()?,
            })
        })
        .collect()
}

fn write_levels(out: &mut Vec<u8>, levels: &[BidAskPair]) {
    for level in levels {
        out.put_i64(level.bid_px);
        out.put_i64(level.ask_px);
        out.put_u32(level.bid_sz);
        out.put_u32(level.ask_sz);
        out.put_u32(level.bid_ct);
        out.put_u32(level.ask_ct);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::{Action, Schema, Side};
    use crate::symbols::SymbolMap;

    fn bar(ts: u64) -> RecordEnum {
        RecordEnum::Ohlcv(OhlcvMsg {
            hd: RecordHeader::new(RType::Ohlcv, 1, ts),
            open: 100_000_000_000,
            high: 200_000_000_000,
            low: 50_000_000_000,
            close: 150_000_000_000,
            volume: 1000,
        })
    }

    fn quote(rtype: RType, levels: usize) -> RecordEnum {
        RecordEnum::from(Mbp1Msg {
            hd: RecordHeader::new(rtype, 2, 1_700_000_000_000_000_000),
            price: 1_000,
            size: 10,
            action: Action::Add.code(),
            side: Side::Bid.code(),
            depth: 0,
            flags: 0,
            ts_recv: 1_700_000_000_000_000_100,
            ts_in_delta: -5,
            sequence: 42,
            levels: (0..levels as i64)
                .map(|i| BidAskPair {
                    bid_px: 1 + i,
                    ask_px: 2 + i,
                    bid_sz: 3,
                    ask_sz: 4,
                    bid_ct: 5,
                    ask_ct: 6,
                })
                .collect(),
        })
    }

    #[test]
    fn ohlcv_matches_reference_bytes() {
        let mut out = Vec::new();
        encode_record(&bar(1_649_116_800_000_000_000), &mut out).unwrap();
        assert_eq!(out.len(), OHLCV_SIZE);
        assert_eq!(&out[..8], &[14, 2, 0, 0, 1, 0, 0, 0]);
        assert_eq!(&out[8..16], &1_649_116_800_000_000_000u64.to_le_bytes());
        assert_eq!(&out[16..24], &100_000_000_000i64.to_le_bytes());
        assert_eq!(&out[48..56], &1000u64.to_le_bytes());
    }

    #[test]
    fn decodes_every_layout() {
        let bbo = RecordEnum::Bbo(BboMsg {
            hd: RecordHeader::new(RType::Bbo, 9, 5),
            price: 7,
            size: 8,
            side: b'N',
            flags: 0x80,
            ts_recv: 6,
            sequence: 3,
            levels: vec![BidAskPair::default()],
        });
        let trade = RecordEnum::Trade(TradeMsg {
            hd: RecordHeader::new(RType::Trade, 3, 4),
            price: -1,
            size: 2,
            action: b'T',
            side: b'A',
            depth: 0,
            flags: 0,
            ts_recv: 5,
            ts_in_delta: 0,
            sequence: 1,
        });
        let records = vec![
            bar(1),
            quote(RType::Mbp1, 1),
            quote(RType::Tbbo, 0),
            trade,
            bbo,
        ];
        let bytes = encode_records(&records).unwrap();
        assert_eq!(bytes.len(), 56 + 80 + 48 + 48 + 80);
        assert_eq!(decode_many(&bytes).unwrap(), records);
    }

    #[test]
    fn bbo_padding_is_zeroed() {
        let bbo = RecordEnum::Bbo(BboMsg {
            hd: RecordHeader::new(RType::Bbo, 1, 1),
            price: 1,
            size: 1,
            side: b'B',
            flags: 0,
            ts_recv: 1,
            sequence: u32::MAX,
            levels: Vec::new(),
        });
        let mut out = Vec::new();
        encode_record(&bbo, &mut out).unwrap();
        assert_eq!(&out[30..32], &[0, 0]);
        assert_eq!(&out[40..44], &[0xff; 4]);
        assert_eq!(&out[44..48], &[0; 4]);
    }

    #[test]
    fn nonzero_reserved_bytes_are_skipped() {
        let bbo = RecordEnum::Bbo(BboMsg {
            hd: RecordHeader::new(RType::Bbo, 4, 9),
            price: 1,
            size: 2,
            side: b'A',
            flags: 0,
            ts_recv: 3,
            sequence: 4,
            levels: Vec::new(),
        });
        let mut bytes = encode_records(std::slice::from_ref(&bbo)).unwrap();
        for i in [2, 3, 30, 31, 44, 45, 46, 47] {
            bytes[i] = 0xaa;
        }
        assert_eq!(decode_one(&bytes, 0).unwrap(), (bbo, 48));
    }

    #[test]
    fn reports_consumed_length() {
        let bytes = encode_records(&[quote(RType::Mbp1, 2), bar(3)]).unwrap();
        let (first, n) = decode_one(&bytes, 0).unwrap();
        assert_eq!(n, 112);
        assert_eq!(first.levels().len(), 2);
        let (second, m) = decode_one(&bytes, n).unwrap();
        assert_eq!(m, OHLCV_SIZE);
        assert_eq!(second.ts_event(), 3);
    }

    #[test]
    fn unknown_rtype_is_rejected() {
        let mut bytes = encode_records(&[bar(1), bar(2)]).unwrap();
        bytes[OHLCV_SIZE + 1] = 0x7f;
        assert!(matches!(
            decode_many(&bytes),
            Err(Error::InvalidRecordType { rtype: 0x7f, offset: 56 })
        ));
    }

    #[test]
    fn truncated_stream_fails_whole_decode() {
        let bytes = encode_records(&[bar(1), bar(2)]).unwrap();
        assert!(matches!(
            decode_many(&bytes[..bytes.len() - 1]),
            Err(Error::Decode { offset: 56, .. })
        ));
        assert!(matches!(
            decode_many(&bytes[..60]),
            Err(Error::Decode { offset: 56, .. })
        ));
        assert!(decode_many(&[]).unwrap().is_empty());
    }

    #[test]
    fn malformed_lengths_are_rejected() {
        let mut bytes = encode_records(&[bar(1)]).unwrap();
        bytes[0] = 2;
        assert!(matches!(decode_one(&bytes, 0), Err(Error::Decode { .. })));

        // ohlcv claiming one extra word
        let mut bytes = encode_records(&[bar(1)]).unwrap();
        bytes[0] = 15;
        bytes.extend_from_slice(&[0; 4]);
        assert!(matches!(decode_one(&bytes, 0), Err(Error::Decode { .. })));

        // mbp-1 with a partial level
        let mut bytes = encode_records(&[quote(RType::Mbp1, 0)]).unwrap();
        bytes[0] = 13;
        bytes.extend_from_slice(&[0; 4]);
        assert!(matches!(decode_one(&bytes, 0), Err(Error::Decode { .. })));
    }

    #[test]
    fn encode_checks_variant_and_size() {
        let mut wrong = bar(1);
        if let RecordEnum::Ohlcv(msg) = &mut wrong {
            msg.hd.rtype = RType::Trade;
        }
        let mut out = Vec::new();
        assert!(matches!(encode_record(&wrong, &mut out), Err(Error::Encode(_))));
        assert!(out.is_empty());

        let fits = quote(RType::Mbp1, 30);
        assert_eq!(fits.record_size(), 1008);
        assert!(encode_record(&fits, &mut out).is_ok());
        let too_big = quote(RType::Mbp1, 31);
        assert!(matches!(encode_record(&too_big, &mut out), Err(Error::Encode(_))));
    }

    #[test]
    fn stream_starts_records_after_metadata() {
        let metadata = Metadata::new(
            Schema::Ohlcv1S,
            0,
            10,
            [(1u32, "AAPL")].into_iter().collect::<SymbolMap>(),
        );
        let bytes = encode_stream(&metadata, &[bar(1)]).unwrap();
        assert_eq!(bytes.len(), crate::METADATA_LENGTH + OHLCV_SIZE);
        assert_eq!(
            decode_from(&bytes, crate::METADATA_LENGTH).unwrap(),
            vec![bar(1)]
        );
    }
}
