//! # CLI — Subcommand Routing
//!
//! Thin boundary over the library: parses numeric/range expressions,
//! resolves defaults (timestamped stream sink, Miller-Rabin strength),
//! and prints results. All engine behavior lives in the library.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use izprime::{classic, expr, seek, segment, InputRange};

#[derive(Parser)]
#[command(
    name = "izprime",
    about = "Sieve, count and stream primes in the 6x±1 index space"
)]
pub struct Cli {
    /// Miller-Rabin rounds for probabilistic stages (clamped to [5, 50])
    #[arg(long, default_value_t = izprime::MR_ROUNDS_DEFAULT)]
    pub mr_rounds: u32,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enumerate all primes up to a bound with a chosen sieve
    Sieve {
        /// Bound expression, e.g. 10^9, 1e6 or 1,000,000
        n: String,
        /// Sieve algorithm
        #[arg(long, value_enum, default_value_t = Algorithm::Sizm)]
        algo: Algorithm,
        /// Also write the primes to this file, space-separated
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Stream every prime in an interval, ascending
    Stream {
        /// Interval start expression (may be arbitrarily large)
        #[arg(long)]
        start: String,
        /// Interval width expression (must fit 64 bits)
        #[arg(long)]
        range: String,
        /// Output file; "-" streams to stdout. Defaults to a timestamped
        /// file in the working directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Count the primes in an interval (width must exceed 100)
    Count {
        /// Interval as one range expression, e.g. "10^12..10^12+10^6"
        #[arg(long, conflicts_with_all = ["start", "range"])]
        span: Option<String>,
        /// Interval start expression
        #[arg(long, requires = "range")]
        start: Option<String>,
        /// Interval width expression
        #[arg(long, requires = "start")]
        range: Option<String>,
        /// Worker count (clamped to detected CPUs and segment count)
        #[arg(long, default_value_t = 1)]
        cores: usize,
    },
    /// Next (or previous) probable prime strictly beyond a base
    Next {
        /// Base expression
        base: String,
        /// Search downward instead of upward
        #[arg(long)]
        prev: bool,
    },
    /// Random probable prime of an exact bit size
    Random {
        #[arg(long)]
        bits: u32,
        /// Search flavor: row-major (vx) or column-major (vy)
        #[arg(long, value_enum, default_value_t = Flavor::Vx)]
        flavor: Flavor,
        #[arg(long, default_value_t = 1)]
        cores: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Algorithm {
    Soe,
    Ssoe,
    Soeu,
    Sos,
    Soa,
    Siz,
    Sizm,
    SizmVy,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Flavor {
    Vx,
    Vy,
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Sieve { n, algo, out } => run_sieve(&n, algo, out.as_deref()),
        Commands::Stream { start, range, out } => run_stream(&start, &range, out, cli.mr_rounds),
        Commands::Count {
            span,
            start,
            range,
            cores,
        } => run_count(span.as_deref(), start.as_deref(), range.as_deref(), cores, cli.mr_rounds),
        Commands::Next { base, prev } => run_next(&base, prev, cli.mr_rounds),
        Commands::Random {
            bits,
            flavor,
            cores,
        } => run_random(bits, flavor, cores, cli.mr_rounds),
    }
}

fn run_sieve(n_expr: &str, algo: Algorithm, out: Option<&std::path::Path>) -> Result<()> {
    let n = expr::parse_expr(n_expr)?
        .to_u64()
        .context("sieve bound must fit 64 bits")?;
    let started = Instant::now();
    let primes = match algo {
        Algorithm::Soe => classic::soe(n),
        Algorithm::Ssoe => classic::ssoe(n),
        Algorithm::Soeu => classic::soeu(n),
        Algorithm::Sos => classic::sos(n),
        Algorithm::Soa => classic::soa(n),
        Algorithm::Siz => segment::siz(n),
        Algorithm::Sizm => segment::sizm(n),
        Algorithm::SizmVy => segment::sizm_vy(n),
    };
    let Some(primes) = primes else {
        bail!("sieve failed: bound must be in (10, 10^12] and memory must suffice");
    };
    let elapsed = started.elapsed();
    let last = if primes.is_ordered() {
        primes.last()
    } else {
        primes.iter().max().copied()
    };
    println!(
        "{} primes <= {} in {:.1?} (largest: {})",
        primes.len(),
        n,
        elapsed,
        last.unwrap_or(0)
    );
    if let Some(path) = out {
        let mut w = std::io::BufWriter::new(std::fs::File::create(path)?);
        for (i, p) in primes.iter().enumerate() {
            if i > 0 {
                w.write_all(b" ")?;
            }
            write!(w, "{}", p)?;
        }
        w.flush()?;
        eprintln!("wrote {} primes to {}", primes.len(), path.display());
    }
    Ok(())
}

fn run_stream(start: &str, range: &str, out: Option<PathBuf>, mr_rounds: u32) -> Result<()> {
    let start = expr::parse_expr(start)?;
    let range = expr::parse_expr(range)?
        .to_u64()
        .context("range width must fit 64 bits")?;
    let filepath = match out {
        Some(p) if p.as_os_str() == "-" => None,
        Some(p) => Some(p),
        None => Some(PathBuf::from(format!(
            "primes_{}.txt",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ))),
    };
    if let Some(p) = &filepath {
        eprintln!("streaming to {}", p.display());
    }
    let started = Instant::now();
    let count = izprime::siz_stream(&InputRange::new(start, range, mr_rounds, filepath));
    eprintln!("{} primes streamed in {:.1?}", count, started.elapsed());
    Ok(())
}

fn run_count(
    span: Option<&str>,
    start: Option<&str>,
    range: Option<&str>,
    cores: usize,
    mr_rounds: u32,
) -> Result<()> {
    let (start, range) = match (span, start, range) {
        (Some(span), _, _) => {
            let (l, r) = expr::parse_range(span)?;
            let width = (rug::Integer::from(&r - &l) + 1u32)
                .to_u64()
                .context("range width must fit 64 bits")?;
            (l, width)
        }
        (None, Some(s), Some(r)) => {
            let start = expr::parse_expr(s)?;
            let width = expr::parse_expr(r)?
                .to_u64()
                .context("range width must fit 64 bits")?;
            (start, width)
        }
        _ => bail!("count needs either --span or both --start and --range"),
    };
    let started = Instant::now();
    let count = izprime::siz_count(&InputRange::new(start, range, mr_rounds, None), cores);
    eprintln!("counted in {:.1?}", started.elapsed());
    println!("{}", count);
    Ok(())
}

fn run_next(base: &str, prev: bool, mr_rounds: u32) -> Result<()> {
    let base = expr::parse_expr(base)?;
    match seek::iz_next_prime(&base, !prev, mr_rounds) {
        Some(p) => {
            println!("{}", p);
            Ok(())
        }
        None => bail!("no prime {} {}", if prev { "below" } else { "above" }, base),
    }
}

fn run_random(bits: u32, flavor: Flavor, cores: usize, mr_rounds: u32) -> Result<()> {
    let p = match flavor {
        Flavor::Vx => seek::vx_random_prime(bits, mr_rounds, cores),
        Flavor::Vy => seek::vy_random_prime(bits, mr_rounds, cores),
    };
    match p {
        Some(p) => {
            println!("{}", p);
            Ok(())
        }
        None => bail!("bit size must be at least 2"),
    }
}
