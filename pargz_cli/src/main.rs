use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, warn};
use xxhash_rust::xxh3::Xxh3;

use pargz_codecs::codec_by_name;
use pargz_core::format::MAX_MEMORY_BLOCK_SIZE;
use pargz_core::{
    ArchiveReader, CancellationToken, ChunkIndex, CompressOptions, DecompressOptions, ErrorKind,
    Outcome, RunStats, Session, Strategy,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "pargz",
    about = "Parallel chunked compression with a random-access footer",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DecompressStrategy {
    /// Workers seek to each chunk individually
    Seek,
    /// Read memory-bounded blocks of chunks sequentially
    Batched,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into independently compressed chunks plus a footer
    Compress {
        /// Source file to compress
        input: PathBuf,
        /// Destination archive
        output: PathBuf,
        /// Chunk codec: gzip | zstd | lz4 | passthrough
        #[arg(short, long, default_value = "gzip")]
        codec: String,
        /// Codec level (gzip 0–9, zstd 1–22)
        #[arg(short, long)]
        level: Option<i32>,
        /// Worker threads (default: one per core for inputs of 500 KB or more)
        #[arg(short, long)]
        threads: Option<usize>,
        /// Raw bytes per chunk (default: up to 8 MB, split evenly across workers)
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Restore the original file from an archive
    Decompress {
        /// Source archive
        input: PathBuf,
        /// Destination file
        output: PathBuf,
        /// Codec the archive was written with
        #[arg(short, long, default_value = "gzip")]
        codec: String,
        #[arg(short, long, value_enum, default_value_t = DecompressStrategy::Batched)]
        strategy: DecompressStrategy,
        /// Worker threads (default: one per core for archives of 500 KB or more)
        #[arg(short, long)]
        threads: Option<usize>,
        /// Maximum original bytes held in memory per block (batched strategy)
        #[arg(long, default_value_t = MAX_MEMORY_BLOCK_SIZE)]
        memory_ceiling: u64,
    },
    /// Print footer statistics
    Inspect {
        /// Archive to inspect
        file: PathBuf,
        /// Print per-chunk details
        #[arg(long)]
        chunks: bool,
    },
    /// Decompress a single chunk by index (in original-file order)
    ReadChunk {
        /// Archive
        file: PathBuf,
        /// Zero-based chunk index
        #[arg(short, long)]
        index: usize,
        #[arg(short, long, default_value = "gzip")]
        codec: String,
        /// Write raw bytes to a file instead of printing a hex dump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decode every chunk and report an xxh3 digest of the restored content
    Verify {
        /// Archive
        file: PathBuf,
        #[arg(short, long, default_value = "gzip")]
        codec: String,
        /// Original file to compare the restored content against
        #[arg(long)]
        against: Option<PathBuf>,
    },
}

/// A run stopped by its cancellation token.
#[derive(Debug)]
struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation canceled")
    }
}

impl std::error::Error for Cancelled {}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn print_stats(stats: &RunStats, elapsed_secs: f64) {
    eprintln!("  chunks      : {}", stats.chunks);
    eprintln!("  threads     : {}", stats.threads);
    eprintln!("  raw size    : {}", human_bytes(stats.original_bytes));
    eprintln!("  compressed  : {}", human_bytes(stats.compressed_bytes));
    eprintln!("  ratio       : {:.2}x", stats.ratio());
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((stats.original_bytes as f64 / elapsed_secs.max(1e-9)) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed_secs);
}

/// One-line diagnostic for a failed command.
fn describe(err: &anyhow::Error) -> String {
    if err.downcast_ref::<Cancelled>().is_some() {
        return "Operation canceled by user.".to_string();
    }
    let Some(core) = err.downcast_ref::<pargz_core::Error>() else {
        return format!("{err:#}");
    };
    match core.kind() {
        ErrorKind::NotFound => format!("File or directory not found... {core}"),
        ErrorKind::PermissionDenied => format!("Program does not have required permissions. {core}"),
        ErrorKind::Argument => format!("Invalid arguments: {core}"),
        ErrorKind::Format => format!("Input is not a valid pargz archive: {core}"),
        ErrorKind::Codec => format!("Chunk codec failed (was the archive written with another --codec?): {core}"),
        ErrorKind::Io | ErrorKind::Internal => format!("{err:#}"),
    }
}

fn completed(outcome: Outcome) -> anyhow::Result<RunStats> {
    match outcome {
        Outcome::Completed(stats) => Ok(stats),
        Outcome::Cancelled => Err(Cancelled.into()),
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    input: PathBuf,
    output: PathBuf,
    codec_name: &str,
    level: Option<i32>,
    options: CompressOptions,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let codec = codec_by_name(codec_name, level)?;
    let session = Session::from_paths(&input, &output)?;

    let t0 = Instant::now();
    let outcome = Strategy::Compress(options).run(&session, codec.as_ref(), cancel)?;
    let stats = completed(outcome)?;

    eprintln!("  codec       : {}", codec.name());
    print_stats(&stats, t0.elapsed().as_secs_f64());
    Ok(())
}

fn run_decompress(
    input: PathBuf,
    output: PathBuf,
    codec_name: &str,
    strategy: DecompressStrategy,
    options: DecompressOptions,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let codec = codec_by_name(codec_name, None)?;
    let session = Session::from_paths(&input, &output)?;
    let strategy = match strategy {
        DecompressStrategy::Seek => Strategy::SeekDecompress(options),
        DecompressStrategy::Batched => Strategy::BatchDecompress(options),
    };
    debug!("decompressing {:?} -> {:?} with {:?}", input, output, strategy);

    let t0 = Instant::now();
    let outcome = strategy.run(&session, codec.as_ref(), cancel)?;
    let stats = completed(outcome)?;
    print_stats(&stats, t0.elapsed().as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf, show_chunks: bool) -> anyhow::Result<()> {
    let mut f = File::open(&file).map_err(|source| pargz_core::Error::Open {
        path: file.clone(),
        source,
    })?;
    let index = ChunkIndex::read_archive(&mut f)?;
    let file_size = std::fs::metadata(&file)?.len();
    let compressed = index.compressed_size();

    println!("=== pargz archive: {:?} ===", file);
    println!();
    println!("  chunk count    : {}", index.len());
    println!("  original size  : {}", human_bytes(index.original_file_size()));
    println!("  compressed     : {}", human_bytes(compressed));
    println!("  footer         : {}", human_bytes(index.footer_size()));
    println!("  file on disk   : {}", human_bytes(file_size));
    if compressed > 0 {
        println!(
            "  ratio          : {:.2}x",
            index.original_file_size() as f64 / compressed as f64
        );
    }

    if show_chunks {
        println!();
        println!(
            "  {:>8}  {:>14}  {:>12}  {:>14}  {:>12}",
            "chunk", "compressed @", "compressed", "original @", "original"
        );
        println!("  {}", "-".repeat(68));
        for (i, c) in index.chunks().iter().enumerate() {
            println!(
                "  {:>8}  {:>14}  {:>12}  {:>14}  {:>12}",
                i,
                c.compressed_start,
                human_bytes(c.compressed_length),
                c.original_start,
                human_bytes(c.original_length)
            );
        }
    }

    Ok(())
}

fn run_read_chunk(
    file: PathBuf,
    index: usize,
    codec_name: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let codec = codec_by_name(codec_name, None)?;
    let mut reader = ArchiveReader::open(&file, codec)?;
    let chunk = *reader.chunks().get(index).with_context(|| {
        format!("chunk {} out of range (archive has {})", index, reader.chunk_count())
    })?;

    eprintln!(
        "seeking to chunk {} (offset {} bytes from file start)...",
        index, chunk.compressed_start
    );

    let t0 = Instant::now();
    let raw = reader.read_chunk(index)?;
    let elapsed = t0.elapsed();

    eprintln!(
        "  decoded {} in {:.3}ms",
        human_bytes(raw.len() as u64),
        elapsed.as_secs_f64() * 1000.0
    );

    match output {
        Some(path) => {
            std::fs::write(&path, &raw).with_context(|| format!("writing {:?}", path))?;
            eprintln!("  written to {:?}", path);
        }
        None => {
            let preview = &raw[..raw.len().min(256)];
            println!(
                "--- chunk {} (original offset {}, {} bytes, first {} shown) ---",
                index,
                chunk.original_start,
                raw.len(),
                preview.len()
            );
            for (i, line) in preview.chunks(16).enumerate() {
                print!("  {:04x}  ", i * 16);
                for b in line {
                    print!("{:02x} ", b);
                }
                for _ in line.len()..16 {
                    print!("   ");
                }
                print!("  |");
                for b in line {
                    if b.is_ascii_graphic() || *b == b' ' {
                        print!("{}", *b as char);
                    } else {
                        print!(".");
                    }
                }
                println!("|");
            }
            if raw.len() > 256 {
                println!("  ... ({} bytes remaining not shown)", raw.len() - 256);
            }
        }
    }

    Ok(())
}

/// xxh3-64 of an archive's restored content, decoding chunks in original order.
fn digest_archive(file: &Path, codec_name: &str) -> anyhow::Result<(u64, u64)> {
    let codec = codec_by_name(codec_name, None)?;
    let mut reader = ArchiveReader::open(file, codec)?;
    let mut hasher = Xxh3::new();
    let mut total = 0u64;
    for idx in 0..reader.chunk_count() {
        let raw = reader.read_chunk(idx)?;
        total += raw.len() as u64;
        hasher.update(&raw);
    }
    Ok((hasher.digest(), total))
}

fn digest_file(file: &Path) -> anyhow::Result<(u64, u64)> {
    let f = File::open(file).with_context(|| format!("opening {:?}", file))?;
    let mut src = BufReader::new(f);
    let mut buf = vec![0u8; 1 << 20];
    let mut hasher = Xxh3::new();
    let mut total = 0u64;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        total += n as u64;
        hasher.update(&buf[..n]);
    }
    Ok((hasher.digest(), total))
}

fn run_verify(file: PathBuf, codec_name: &str, against: Option<PathBuf>) -> anyhow::Result<()> {
    let t0 = Instant::now();
    let (digest, size) = digest_archive(&file, codec_name)?;
    println!("  restored     : {}", human_bytes(size));
    println!("  xxh3-64      : {:016x}", digest);

    if let Some(original) = against {
        let (expected, expected_size) = digest_file(&original)?;
        if (expected, expected_size) != (digest, size) {
            anyhow::bail!(
                "content mismatch: archive restores {} bytes with digest {:016x}, {:?} has {} bytes with digest {:016x}",
                size,
                digest,
                original,
                expected_size,
                expected
            );
        }
        println!("  matches      : {:?}", original);
    }
    eprintln!("  elapsed      : {:.3}s", t0.elapsed().as_secs_f64());
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn dispatch(command: Commands, cancel: &CancellationToken) -> anyhow::Result<()> {
    match command {
        Commands::Compress {
            input,
            output,
            codec,
            level,
            threads,
            chunk_size,
        } => run_compress(
            input,
            output,
            &codec,
            level,
            CompressOptions { threads, chunk_size },
            cancel,
        ),
        Commands::Decompress {
            input,
            output,
            codec,
            strategy,
            threads,
            memory_ceiling,
        } => run_decompress(
            input,
            output,
            &codec,
            strategy,
            DecompressOptions {
                threads,
                memory_ceiling,
            },
            cancel,
        ),
        Commands::Inspect { file, chunks } => run_inspect(file, chunks),
        Commands::ReadChunk {
            file,
            index,
            codec,
            output,
        } => run_read_chunk(file, index, &codec, output),
        Commands::Verify {
            file,
            codec,
            against,
        } => run_verify(file, &codec, against),
    }
}

/// Ctrl-C stops the running job at the next chunk boundary instead of
/// killing the process.
fn install_interrupt_handler(cancel: &CancellationToken) {
    let on_interrupt = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("Cancelling...");
        on_interrupt.cancel();
    }) {
        warn!("Ctrl-C will not cancel gracefully: {}", e);
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    install_interrupt_handler(&cancel);
    match dispatch(cli.command, &cancel) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", describe(&err));
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.00 KB");
        assert_eq!(human_bytes(8_000_000), "7.63 MB");
    }

    #[test]
    fn failures_get_distinct_messages() {
        assert_eq!(describe(&Cancelled.into()), "Operation canceled by user.");

        let missing = anyhow::Error::from(pargz_core::Error::Open {
            path: PathBuf::from("nope.bin"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
        assert!(describe(&missing).starts_with("File or directory not found"));

        let malformed = anyhow::Error::from(pargz_core::Error::format("bad footer"))
            .context("reading archive");
        assert!(describe(&malformed).starts_with("Input is not a valid pargz archive"));
    }

    #[test]
    fn cancelled_outcome_is_an_error() {
        assert!(completed(Outcome::Cancelled).is_err());
        assert!(completed(Outcome::Completed(RunStats::default())).is_ok());
    }

    #[test]
    fn verify_matches_the_original() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.txt");
        let archive = dir.path().join("data.pgz");
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&input, &data).unwrap();

        let cancel = CancellationToken::new();
        run_compress(
            input.clone(),
            archive.clone(),
            "zstd",
            None,
            CompressOptions {
                threads: Some(3),
                chunk_size: Some(4096),
            },
            &cancel,
        )
        .unwrap();

        assert_eq!(digest_archive(&archive, "zstd").unwrap(), digest_file(&input).unwrap());
        run_verify(archive.clone(), "zstd", Some(input.clone())).unwrap();

        std::fs::write(&input, b"something else").unwrap();
        assert!(run_verify(archive, "zstd", Some(input)).is_err());
    }

    #[test]
    fn cancelled_compress_reports_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.bin");
        let archive = dir.path().join("data.pgz");
        std::fs::write(&input, vec![9u8; 10_000]).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_compress(
            input,
            archive,
            "gzip",
            None,
            CompressOptions {
                threads: Some(2),
                chunk_size: Some(1000),
            },
            &cancel,
        )
        .unwrap_err();
        assert_eq!(describe(&err), "Operation canceled by user.");
    }
}
