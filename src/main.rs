use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use market_binary::{BufferStore, Record, TableOptions};
use std::collections::BTreeMap;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Inspect and export market binary stream files")]
struct Args {
    /// Stream file to read
    #[arg(long, short = 'i', env = "MBIN_FILE")]
    input: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the metadata block
    Inspect,
    /// Export records as a table
    Table {
        #[arg(long, value_enum, env = "MBIN_FORMAT", default_value_t = Format::Csv)]
        format: Format,

        /// Render timestamps as RFC 3339
        #[arg(long, default_value_t = false)]
        pretty_ts: bool,

        /// Render prices as decimals
        #[arg(long, default_value_t = false)]
        pretty_px: bool,

        /// Output file; defaults to stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },
    /// Count records per instrument
    Count,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();
    let store = BufferStore::from_file(&args.input)
        .with_context(|| format!("open {:?}", args.input))?;

    match args.command {
        Command::Inspect => inspect(&store),
        Command::Table {
            format,
            pretty_ts,
            pretty_px,
            out,
        } => {
            let table = store
                .decode_to_df(TableOptions {
                    pretty_ts,
                    pretty_px,
                })
                .context("decode records")?;
            let sink: Box<dyn Write> = match &out {
                Some(path) => Box::new(
                    std::fs::File::create(path).with_context(|| format!("create {path:?}"))?,
                ),
                None => Box::new(io::stdout().lock()),
            };
            let mut w = BufWriter::new(sink);
            match format {
                Format::Csv => table.write_csv(&mut w)?,
                Format::Json => {
                    serde_json::to_writer_pretty(&mut w, &table.records().collect::<Vec<_>>())?;
                    writeln!(w)?;
                }
            }
            w.flush()?;
            info!(rows = table.len(), "exported table");
            Ok(())
        }
        Command::Count => count(&store),
    }
}

fn inspect(store: &BufferStore) -> Result<()> {
    let m = store.metadata();
    println!("schema: {} ({})", m.schema, m.schema.rtype());
    println!("start:  {}", m.start);
    println!("end:    {}", m.end);
    println!("bytes:  {}", store.raw_bytes().len());
    println!("symbols ({}):", m.mappings.len());
    for (id, ticker) in m.mappings.iter() {
        println!("  {id:>10}  {ticker}");
    }
    Ok(())
}

fn count(store: &BufferStore) -> Result<()> {
    let mut per_instrument: BTreeMap<u32, usize> = BTreeMap::new();
    for record in store.iter() {
        let record = record.context("decode records")?;
        *per_instrument.entry(record.instrument_id()).or_default() += 1;
    }
    let mappings = &store.metadata().mappings;
    let mut total = 0;
    for (id, n) in &per_instrument {
        let ticker = mappings.get_ticker(*id).unwrap_or("?");
        println!("{id:>10}  {ticker:<12} {n}");
        total += n;
    }
    println!("total: {total}");
    Ok(())
}
