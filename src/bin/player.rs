use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use market_binary::{BufferStore, Record, RecordEnum, record::ts_to_rfc3339};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Replay a market binary stream one record at a time")]
struct Args {
    /// Input file path to read
    #[arg(long, short = 'i', env = "MBIN_FILE")]
    input: PathBuf,

    /// Stop after this many printed records
    #[arg(long)]
    limit: Option<usize>,

    /// Only print records for this ticker
    #[arg(long)]
    symbol: Option<String>,
}

fn describe(record: &RecordEnum) -> String {
    match record {
        RecordEnum::Ohlcv(bar) => format!(
            "o={} h={} l={} c={} v={}",
            bar.pretty_open(),
            bar.pretty_high(),
            bar.pretty_low(),
            bar.pretty_close(),
            bar.volume
        ),
        RecordEnum::Mbp1(msg) | RecordEnum::Tbbo(msg) => {
            let mut s = format!(
                "px={} sz={} action={} side={} seq={}",
                msg.pretty_price(),
                msg.size,
                char::from(msg.action),
                char::from(msg.side),
                msg.sequence
            );
            if let Some(top) = msg.levels.first() {
                s.push_str(&format!(
                    " | {} x {} / {} x {}",
                    top.pretty_bid_px(),
                    top.bid_sz,
                    top.pretty_ask_px(),
                    top.ask_sz
                ));
            }
            s
        }
        RecordEnum::Trade(msg) => format!(
            "px={} sz={} side={} seq={}",
            msg.pretty_price(),
            msg.size,
            char::from(msg.side),
            msg.sequence
        ),
        RecordEnum::Bbo(msg) => {
            let mut s = format!(
                "px={} sz={} side={}",
                msg.pretty_price(),
                msg.size,
                char::from(msg.side)
            );
            if let Some(top) = msg.levels.first() {
                s.push_str(&format!(
                    " | {} x {} / {} x {}",
                    top.pretty_bid_px(),
                    top.bid_sz,
                    top.pretty_ask_px(),
                    top.ask_sz
                ));
            }
            s
        }
    }
}

/// Replay records from the store cursor, handing the ones for `wanted` to
/// `emit`. Stops before decoding once `limit` records were emitted.
/// Returns (records read, records emitted).
fn play<F>(
    store: &mut BufferStore,
    wanted: Option<u32>,
    limit: Option<usize>,
    mut emit: F,
) -> Result<(usize, usize)>
where
    F: FnMut(&BufferStore, &RecordEnum),
{
    let mut read = 0usize;
    let mut printed = 0usize;
    loop {
        if limit.is_some_and(|limit| printed >= limit) {
            break;
        }
        let Some(record) = store
            .replay()
            .with_context(|| format!("record {read} at offset {}", store.position()))?
        else {
            break;
        };
        read += 1;
        if wanted.is_some_and(|id| id != record.instrument_id()) {
            continue;
        }
        emit(store, &record);
        printed += 1;
    }
    Ok((read, printed))
}

fn main() -> Result<()> {
    let _ = dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    let mut store = BufferStore::from_file(&args.input)
        .with_context(|| format!("open {:?}", args.input))?;

    let wanted = match &args.symbol {
        Some(ticker) => Some(
            store
                .metadata()
                .mappings
                .get_instrument_id(ticker)
                .with_context(|| format!("ticker {ticker} not in the symbol map"))?,
        ),
        None => None,
    };

    let (read, printed) = play(&mut store, wanted, args.limit, |store, record| {
        let ticker = store
            .metadata()
            .mappings
            .get_ticker(record.instrument_id())
            .unwrap_or("?");
        let ts = ts_to_rfc3339(record.ts_event()).unwrap_or_else(|| record.ts_event().to_string());
        println!("{ts} {:<6} {:<8} {}", record.rtype().as_str(), ticker, describe(record));
    })?;
    eprintln!("Read {read} records, printed {printed}.");
    Ok(())
}
