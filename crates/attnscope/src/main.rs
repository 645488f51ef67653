//! attnscope command-line inspector
//!
//! ## Usage
//!
//! ```bash
//! # List datasets under ./data
//! attnscope datasets
//!
//! # Describe one dataset
//! attnscope info sample1
//!
//! # Where does token 42 look in layer 12, averaged over heads?
//! attnscope inspect sample1 --layer 12 --token 42 --top 10
//!
//! # Single head, column view, served over HTTP
//! attnscope --base-url http://localhost:8000/data inspect sample1 \
//!     --layer 3 --token 7 --head 5 --direction target
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use attnscope::{discover_datasets, Dataset, Frame, ViewSession, ViewerConfig};
use attnscope_core::{AggMode, DatasetMeta, Direction, HeadSelection, Palette};

#[derive(Parser, Debug)]
#[command(name = "attnscope")]
#[command(author = "Daemoniorum LLC")]
#[command(version)]
#[command(about = "Inspect per-layer attention of vision-language models", long_about = None)]
struct Args {
    /// Configuration file path (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding datasets
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Fetch datasets over HTTP from this URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG when omitted
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available datasets
    Datasets,

    /// Show a dataset's model, prompt and shape
    Info {
        /// Dataset identifier ("." for the data root itself)
        dataset: String,
    },

    /// Print the tokens a selected token attends to most
    Inspect {
        /// Dataset identifier ("." for the data root itself)
        dataset: String,

        /// Layer index
        #[arg(short, long)]
        layer: usize,

        /// Selected token index
        #[arg(short, long)]
        token: usize,

        /// Head index, or -1 to combine all heads
        #[arg(long, allow_negative_numbers = true)]
        head: Option<i64>,

        /// Head reduction (mean, max)
        #[arg(long)]
        agg: Option<AggMode>,

        /// Row (source) or column (target) of the selected token
        #[arg(long)]
        direction: Option<Direction>,

        /// Color palette
        #[arg(long)]
        palette: Option<Palette>,

        /// Color opacity in [0, 1]
        #[arg(long)]
        opacity: Option<f32>,

        /// Number of tokens to list
        #[arg(long, default_value = "10")]
        top: usize,
    },
}

fn init_logging(log_level: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let builder = FmtSubscriber::builder()
        .with_target(true)
        .with_writer(std::io::stderr);

    match log_level {
        Some(level) => {
            let level = match level.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            };
            tracing::subscriber::set_global_default(builder.with_max_level(level).finish())?;
        }
        None => {
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
            tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())?;
        }
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<ViewerConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ViewerConfig::from_file(path)?,
        None => ViewerConfig::default(),
    };
    if let Some(root) = &args.data_root {
        config = config.with_data_root(root);
    }
    if let Some(url) = &args.base_url {
        config = config.with_base_url(url);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref())?;
    let config = load_config(&args)?;

    match args.command {
        Command::Datasets => {
            for id in discover_datasets(&config.data_root)? {
                println!("{id}");
            }
        }
        Command::Info { dataset } => {
            let dataset = Dataset::open(&config, &dataset).await?;
            print_info(dataset.id(), dataset.meta());
        }
        Command::Inspect {
            dataset,
            layer,
            token,
            head,
            agg,
            direction,
            palette,
            opacity,
            top,
        } => {
            let dataset = Dataset::open(&config, &dataset).await?;
            let mut session = ViewSession::new(dataset, config.cache.clone(), &config.defaults)?;

            if let Some(head) = head {
                session.set_head(HeadSelection::try_from(head)?)?;
            }
            if let Some(agg) = agg {
                session.set_agg(agg);
            }
            if let Some(direction) = direction {
                session.set_direction(direction);
            }
            if let Some(palette) = palette {
                session.set_palette(palette);
            }
            if let Some(opacity) = opacity {
                session.set_opacity(opacity);
            }
            session.select_token(Some(token))?;
            session.show_layer(layer).await?;

            match session.render()? {
                Some(frame) => print_frame(&session, &frame, top),
                None => println!("nothing to show"),
            }

            let stats = session.cache().stats();
            info!(
                "Cache: {} hits, {} misses, {} joined, {} resident",
                stats.hits, stats.misses, stats.joined, stats.resident
            );
        }
    }

    Ok(())
}

fn print_info(id: &str, meta: &DatasetMeta) {
    println!("dataset:  {id}");
    println!("model:    {}", meta.model);
    println!("mode:     {:?}", meta.mode);
    println!("prompt:   {}", meta.prompt);
    println!("image:    {} ({}x{})", meta.image_path, meta.image_size.0, meta.image_size.1);
    println!(
        "shape:    {} layers x {} heads x {} tokens ({})",
        meta.num_layers, meta.num_heads, meta.seq_len, meta.dtype
    );
    if meta.image_grid.is_empty() {
        println!("grid:     none");
    } else {
        println!(
            "grid:     {}x{} (tokens {}..={})",
            meta.image_grid.rows, meta.image_grid.cols, meta.image_grid.start_idx, meta.image_grid.end_idx
        );
    }
    println!(
        "tokens:   {} image, {} other",
        meta.image_token_count(),
        meta.seq_len - meta.image_token_count()
    );
}

fn print_frame(session: &ViewSession, frame: &Frame, top: usize) {
    let meta = session.meta();
    let state = session.state();
    let head = match state.head() {
        HeadSelection::Aggregated => format!("all ({})", state.agg()),
        HeadSelection::Single(h) => h.to_string(),
    };

    println!(
        "layer {} | token {} {:?} | head {} | {} | {}",
        frame.layer,
        frame.selected,
        meta.tokens[frame.selected].text,
        head,
        state.direction(),
        state.palette()
    );
    for (rank, (index, weight)) in frame.top_k(top).into_iter().enumerate() {
        let token = &meta.tokens[index];
        let [r, g, b, a] = frame.token_color(index).unwrap_or_default();
        let cell = meta
            .cell_of(index)
            .map(|(row, col)| format!(" @({row},{col})"))
            .unwrap_or_default();
        println!(
            "{:>3}. #{:<5} {:<24} {:.6}  #{:02x}{:02x}{:02x}{:02x}{}",
            rank + 1,
            index,
            format!("{:?}", token.text),
            weight,
            r,
            g,
            b,
            a,
            cell
        );
    }
    if let Some(overlay) = &frame.overlay {
        let (lo, hi) = overlay.value_range();
        println!(
            "image grid {}x{}: weights {:.6}..{:.6}",
            overlay.rows(),
            overlay.cols(),
            lo,
            hi
        );
    }
}
