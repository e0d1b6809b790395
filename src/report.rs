//! Report file framing.
//!
//! A report file is a sequence of frames, each `[len u32][crc32 u32][payload]`
//! with a bincode-encoded [`BacktestData`] payload. The CRC covers the payload
//! only; a mismatch fails the read with [`Error::Frame`].
use crate::backtest::BacktestData;
use crate::error::{Error, Result};
use crc32fast::Hasher as Crc32;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use tracing::debug;

pub struct ReportWriter<W: Write> {
    inner: W,
    frames: usize,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, frames: 0 }
    }

    pub fn write(&mut self, report: &BacktestData) -> Result<()> {
        let payload = bincode::serialize(report)?;
        let len = u32::try_from(payload.len()).map_err(|_| Error::Frame {
            frame: self.frames,
            reason: format!("payload of {} bytes exceeds u32", payload.len()),
        })?;
        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        self.inner.write_all(&len.to_le_bytes())?;
        self.inner.write_all(&crc.to_le_bytes())?;
        self.inner.write_all(&payload)?;
        self.frames += 1;
        Ok(())
    }

    /// Frames written so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

fn read_u32<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Length prefix of the next frame, or `None` at a clean end of input.
fn read_len<R: Read>(r: &mut R, frame: usize) -> Result<Option<u32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(None),
        4 => Ok(Some(u32::from_le_bytes(buf))),
        n => Err(Error::Frame {
            frame,
            reason: format!("truncated length prefix ({n} of 4 bytes)"),
        }),
    }
}

/// Read every frame from `r` until a clean end of input.
///
/// End of input inside a frame is an [`Error::Frame`], not a short result.
pub fn read_reports<R: Read>(mut r: R) -> Result<Vec<BacktestData>> {
    let mut reports = Vec::new();
    loop {
        let frame = reports.len();
        let Some(len) = read_len(&mut r, frame)? else {
            break;
        };
        let truncated = |e: std::io::Error| -> Error {
            if e.kind() == ErrorKind::UnexpectedEof {
                Error::Frame {
                    frame,
                    reason: "truncated frame".into(),
                }
            } else {
                e.into()
            }
        };
        let crc_on_file = read_u32(&mut r).map_err(truncated)?;
        // grow with the bytes actually present, not the declared length
        let mut payload = Vec::new();
        let got = (&mut r).take(u64::from(len)).read_to_end(&mut payload)?;
        if got != len as usize {
            return Err(Error::Frame {
                frame,
                reason: format!("truncated frame: declared {len} bytes, got {got}"),
            });
        }
        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let crc_calc = hasher.finalize();
        if crc_calc != crc_on_file {
            return Err(Error::Frame {
                frame,
                reason: format!("CRC mismatch: file={crc_on_file:#x}, calc={crc_calc:#x}"),
            });
        }
        reports.push(bincode::deserialize(&payload)?);
    }
    debug!(frames = reports.len(), "read report frames");
    Ok(reports)
}

pub fn write_report_file<P: AsRef<Path>>(path: P, reports: &[BacktestData]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut w = ReportWriter::new(BufWriter::new(File::create(path)?));
    for report in reports {
        w.write(report)?;
    }
    w.finish()?;
    Ok(())
}

pub fn read_report_file<P: AsRef<Path>>(path: P) -> Result<Vec<BacktestData>> {
    read_reports(BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{Parameters, SignalInstructions, Signals, Trades};

    fn report() -> BacktestData {
        BacktestData {
            backtest_id: Some(7),
            backtest_name: "momentum".into(),
            parameters: Parameters {
                strategy_name: "momentum".into(),
                capital: 100_000_000_000_000,
                schema: "ohlcv-1s".into(),
                tickers: vec!["AAPL".into()],
                ..Default::default()
            },
            trades: vec![Trades {
                trade_id: 1,
                leg_id: 1,
                ticker: "AAPL".into(),
                quantity: 10,
                action: "BUY".into(),
                ..Default::default()
            }],
            signals: vec![Signals {
                timestamp: 1,
                trade_instructions: vec![SignalInstructions {
                    ticker: "AAPL".into(),
                    order_type: "MKT".into(),
                    action: "BUY".into(),
                    ..Default::default()
                }],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn frames_round_trip() {
        let mut w = ReportWriter::new(Vec::new());
        w.write(&report()).unwrap();
        w.write(&BacktestData::default()).unwrap();
        assert_eq!(w.frames(), 2);
        let bytes = w.finish().unwrap();
        let back = read_reports(bytes.as_slice()).unwrap();
        assert_eq!(back, vec![report(), BacktestData::default()]);
    }

    #[test]
    fn corrupted_payload_fails_crc() {
        let mut w = ReportWriter::new(Vec::new());
        w.write(&report()).unwrap();
        let mut bytes = w.finish().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            read_reports(bytes.as_slice()),
            Err(Error::Frame { frame: 0, .. })
        ));
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut w = ReportWriter::new(Vec::new());
        w.write(&report()).unwrap();
        let bytes = w.finish().unwrap();
        assert!(matches!(
            read_reports(&bytes[..bytes.len() - 3]),
            Err(Error::Frame { frame: 0, .. })
        ));
        assert!(matches!(
            read_reports(&bytes[..2]),
            Err(Error::Frame { frame: 0, .. })
        ));
        assert!(read_reports(&[0u8; 0][..]).unwrap().is_empty());
    }

    #[test]
    fn oversized_length_prefix_is_a_short_frame() {
        let mut bytes = u32::MAX.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);
        match read_reports(bytes.as_slice()) {
            Err(Error::Frame { frame: 0, reason }) => assert!(reason.contains("got 3")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
