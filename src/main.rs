use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wildmatch::WildMatch;

use ecl_index::config::IndexerConfig;
use ecl_index::index::ViewTag;
use ecl_index::FileHandle;

#[derive(Parser)]
#[command(name = "ecl-index")]
#[command(about = "Index and inspect ECLIPSE unformatted result files", long_about = None)]
struct Cli {
    /// Config file (default: <config_dir>/ecl-index/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the sidecar index cache when it is valid
    #[arg(long, global = true)]
    fast: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List keywords of the file (or of one block)
    List {
        file: PathBuf,

        /// Glob filter on keyword names
        #[arg(short, long)]
        pattern: Option<String>,

        /// Restrict to the block delimited by this keyword
        #[arg(long)]
        block: Option<String>,

        /// Which block (0-based)
        #[arg(long, default_value_t = 0)]
        occurrence: usize,

        #[arg(long)]
        json: bool,
    },

    /// One line per block delimited by a keyword
    Blocks {
        file: PathBuf,

        #[arg(long)]
        kw: String,
    },

    /// Select a restart block and list it
    Restart {
        file: PathBuf,

        #[arg(long)]
        report_step: Option<i32>,

        /// Simulation date, YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,

        /// SEQNUM block number (0-based)
        #[arg(long)]
        index: Option<usize>,
    },

    /// Write the sidecar index cache
    Index {
        file: PathBuf,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print index statistics
    Stat { file: PathBuf },
}

#[derive(Serialize)]
struct Row<'a> {
    position: usize,
    name: &'a str,
    count: usize,
    ty: String,
    offset: u64,
    occurrence: Option<usize>,
}

fn open(cfg: &IndexerConfig, file: &Path, fast: bool) -> anyhow::Result<FileHandle> {
    let f = if fast && cfg.cache.enabled {
        FileHandle::fast_open(file, Some(&cfg.sidecar_for(file)), cfg.open)
    } else {
        FileHandle::open(file, cfg.open)
    };
    f.with_context(|| format!("opening {}", file.display()))
}

fn print_active(f: &FileHandle, pattern: Option<&WildMatch>, json: bool) -> anyhow::Result<()> {
    let rows: Vec<Row> = f
        .iter()
        .enumerate()
        .filter(|(_, kw)| pattern.map_or(true, |p| p.matches(kw.name())))
        .map(|(i, kw)| Row {
            position: i,
            name: kw.name(),
            count: kw.count(),
            ty: kw.ty().to_string(),
            offset: kw.offset(),
            occurrence: f.occurrence_of_position(i),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for r in &rows {
        println!(
            "{:>6}  {:<8} {:>10} {}  @{}",
            r.position, r.name, r.count, r.ty, r.offset
        );
    }
    Ok(())
}

fn parse_date(s: &str) -> anyhow::Result<chrono::DateTime<Utc>> {
    let d = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date {s:?}, expected YYYY-MM-DD"))?;
    let naive = d
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("invalid date {s:?}"))?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(p) => IndexerConfig::load(p)?,
        None => IndexerConfig::load_default()?,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::List {
            file,
            pattern,
            block,
            occurrence,
            json,
        } => {
            let mut f = open(&cfg, &file, cli.fast)?;
            if let Some(kw) = block {
                if !f.select_block(&kw, occurrence) {
                    bail!("no block {} #{} in {}", kw, occurrence, file.display());
                }
            }
            let pattern = pattern.as_deref().map(WildMatch::new);
            print_active(&f, pattern.as_ref(), json)?;
        }
        Commands::Blocks { file, kw } => {
            let f = open(&cfg, &file, cli.fast)?;
            let global = f.global_view();
            for i in 0..global.num_named(&kw) {
                let Some(block) = global.block(f.index(), Some(&kw), Some(&kw), i) else {
                    continue;
                };
                println!(
                    "{:>4}  start={:<8} keywords={}",
                    i,
                    block.global_position(0).unwrap_or(0),
                    block.len()
                );
            }
        }
        Commands::Restart {
            file,
            report_step,
            date,
            index,
        } => {
            let mut f = open(&cfg, &file, cli.fast)?;
            let found = match (report_step, date, index) {
                (Some(n), _, _) => f.select_restart_by_report_step(n)?,
                (None, Some(d), _) => f.select_restart_by_sim_time(parse_date(&d)?)?,
                (None, None, Some(i)) => f.iselect_restart(i)?,
                (None, None, None) => bail!("one of --report-step, --date or --index is required"),
            };
            if !found {
                bail!("no matching restart block in {}", file.display());
            }
            if let ViewTag::Restart(h) = f.active_view().tag() {
                println!(
                    "SEQNUM #{}  report_step={}  date={}  days={}",
                    h.seqnum_index,
                    h.report_step,
                    h.sim_time.format("%Y-%m-%d %H:%M:%S"),
                    h.sim_days
                );
            }
            print_active(&f, None, false)?;
        }
        Commands::Index { file, out } => {
            let f = FileHandle::open(&file, cfg.open)
                .with_context(|| format!("opening {}", file.display()))?;
            let out = out.unwrap_or_else(|| cfg.sidecar_for(&file));
            f.write_index_cache(&out)?;
            info!("Indexed {} keywords -> {}", f.index().len(), out.display());
        }
        Commands::Stat { file } => {
            let f = open(&cfg, &file, cli.fast)?;
            print!("{}", f.report());
            if let Ok(sim) = f.simulator() {
                println!("simulator: {:?}", sim);
            }
        }
    }

    Ok(())
}
