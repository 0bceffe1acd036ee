//! seismic - run the barrier-synchronized acoustic wave engine.
//!
//! # Examples
//!
//! ```bash
//! # Default 2300x748 grid, 100 steps, reference kernel
//! seismic
//!
//! # Four threads with the AVX kernel, dump the final field
//! seismic --kernel avx_unaligned --threads 4 --output
//!
//! # Small grid with an ASCII sign map every 4 cells
//! seismic -y 64 -x 36 -t 20 --ascii 4
//!
//! # Kernels usable on this machine
//! seismic --list-kernels
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use seismic_core::config::human_bytes;
use seismic_core::prelude::*;
use seismic_core::render;
use tracing_subscriber::EnvFilter;

mod error;

use error::{CliError, CliResult};

/// 2-D acoustic wave propagation with barrier-synchronized worker threads
#[derive(Parser, Debug)]
#[command(name = "seismic")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Grid width (outer dimension, split between threads)
    #[arg(short = 'y', long, default_value_t = 2300)]
    width: usize,

    /// Grid height (inner dimension, contiguous in memory)
    #[arg(short = 'x', long, default_value_t = 748)]
    height: usize,

    /// Pulse column (default: width / 2)
    #[arg(short = 'j', long)]
    pulse_x: Option<usize>,

    /// Pulse row (default: height / 2)
    #[arg(short = 'i', long)]
    pulse_y: Option<usize>,

    /// Number of time steps
    #[arg(short = 't', long, default_value_t = 100)]
    timesteps: usize,

    /// Kernel variant (see --list-kernels)
    #[arg(short = 'k', long, default_value = "plain_naive")]
    kernel: String,

    /// Worker threads (0 is treated as 1)
    #[arg(short = 'p', long, default_value_t = 1)]
    threads: usize,

    /// Dimension split between threads (outer, inner)
    #[arg(long, default_value = "outer")]
    partition: PartitionMode,

    /// Write the final field as raw f32 values
    #[arg(short = 'o', long, num_args = 0..=1, default_missing_value = "output.bin")]
    output: Option<PathBuf>,

    /// Print a sign map of the final field, sampling every SCALE cells
    #[arg(short = 'a', long, value_name = "SCALE")]
    ascii: Option<usize>,

    /// List kernel variants and exit
    #[arg(long)]
    list_kernels: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn print_banner() {
    println!(
        "\n  {} {}\n",
        "seismic-rtm".bright_cyan().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    if !cli.quiet {
        print_banner();
    }

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", e.label().red().bold(), e);
            e.exit_code()
        }
    }
}

fn execute(cli: &Cli) -> CliResult<()> {
    let caps = Capabilities::detect();
    let registry = KernelRegistry::builtin();

    if cli.list_kernels {
        list_kernels(&registry, caps);
        return Ok(());
    }

    let threads = if cli.threads == 0 {
        tracing::warn!("thread count 0 requested, using 1");
        1
    } else {
        cli.threads
    };

    let config = SimulationConfig::new(cli.width, cli.height)
        .with_timesteps(cli.timesteps)
        .with_pulse(
            cli.pulse_x.unwrap_or(cli.width / 2),
            cli.pulse_y.unwrap_or(cli.height / 2),
        )
        .with_kernel(cli.kernel.clone())
        .with_threads(threads)
        .with_partition(cli.partition);

    let sim = Simulation::new(config, &registry, caps)?;

    if !cli.quiet {
        print_setup(&sim, caps);
    }

    let medium = Medium::default();
    let mut field = sim.allocate(&medium)?;
    let report = sim.run(&mut field)?;

    if !cli.quiet {
        print_report(&report);
    }

    let final_field = render::final_pressure(&field);

    if let Some(path) = &cli.output {
        render::write_raw(path, final_field).map_err(|source| CliError::Output {
            path: path.display().to_string(),
            source,
        })?;
        if !cli.quiet {
            println!("  {} {}", "Wrote".green(), path.display());
        }
    }

    if let Some(scale) = cli.ascii {
        print!("{}", render::ascii(final_field, field.width(), field.height(), scale));
    }

    Ok(())
}

fn print_setup(sim: &Simulation<'_>, caps: Capabilities) {
    let config = sim.config();
    let variant = sim.variant();
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    println!("{}", "Environment".bright_white().bold());
    println!("  cores        {}", cores);
    println!("  capabilities {}", caps);
    println!();
    println!("{}", "Configuration".bright_white().bold());
    println!("  grid         {} x {}", config.width, config.height);
    println!("  pulse        ({}, {})", config.pulse_x, config.pulse_y);
    println!("  timesteps    {}", config.timesteps);
    println!(
        "  kernel       {} (vector width {}, alignment {})",
        variant.name.bright_white(),
        variant.vector_width,
        variant.alignment
    );
    println!("  threads      {} ({:?}, {} partition)", config.threads, sim.mode(), config.partition);
    println!(
        "  memory       {}",
        human_bytes(config.memory_estimate(variant.alignment))
    );
    println!("  GFLOP        {:.2}", config.gflop());
    println!();
}

fn print_report(report: &RunReport) {
    let outer_ms = report.outer_elapsed.as_secs_f64() * 1000.0;
    let inner_ms = report.inner_elapsed.as_secs_f64() * 1000.0;
    println!("{}", "Result".bright_white().bold());
    println!(
        "  outer        {:.2} ms ({} GFLOPS)",
        outer_ms,
        format!("{:.2}", report.gflops_outer()).bright_green()
    );
    println!(
        "  inner        {:.2} ms ({} GFLOPS)",
        inner_ms,
        format!("{:.2}", report.gflops_inner()).bright_green()
    );
    println!("  final grid   {}", report.final_index);
}

fn list_kernels(registry: &KernelRegistry, caps: Capabilities) {
    println!("{} (processor: {})", "Kernels".bright_white().bold(), caps);
    for variant in registry.iter() {
        let usable = caps.contains(variant.requires);
        let marker = if usable { "✓".green() } else { "✗".red() };
        let requires = if variant.requires.is_empty() {
            "-".to_string()
        } else {
            variant.requires.to_string()
        };
        println!(
            "  {} {:<22} requires {:<14} align {:>2}  width {}",
            marker, variant.name, requires, variant.alignment, variant.vector_width
        );
    }
    let available = registry.list_available(caps).count();
    println!("\n  {} of {} usable", available, registry.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from([
            "seismic", "-y", "64", "-x", "36", "-j", "10", "-i", "12", "-t", "5", "-k", "plain_opt", "-p",
            "2", "-a", "4",
        ])
        .unwrap();
        assert_eq!(cli.width, 64);
        assert_eq!(cli.height, 36);
        assert_eq!(cli.pulse_x, Some(10));
        assert_eq!(cli.pulse_y, Some(12));
        assert_eq!(cli.timesteps, 5);
        assert_eq!(cli.kernel, "plain_opt");
        assert_eq!(cli.threads, 2);
        assert_eq!(cli.ascii, Some(4));
        assert!(cli.output.is_none());
    }

    #[test]
    fn test_output_default_name() {
        let cli = Cli::try_parse_from(["seismic", "--output"]).unwrap();
        assert_eq!(cli.output, Some(PathBuf::from("output.bin")));
        let cli = Cli::try_parse_from(["seismic", "-o", "field.raw"]).unwrap();
        assert_eq!(cli.output, Some(PathBuf::from("field.raw")));
    }

    #[test]
    fn test_partition_flag() {
        let cli = Cli::try_parse_from(["seismic", "--partition", "inner"]).unwrap();
        assert_eq!(cli.partition, PartitionMode::Inner);
        assert!(Cli::try_parse_from(["seismic", "--partition", "diagonal"]).is_err());
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            CliError::from(SeismicError::geometry("bad")).status(),
            CliError::from(SeismicError::Allocation { bytes: 1 }).status(),
            CliError::from(SeismicError::BarrierAborted).status(),
            CliError::Output {
                path: "x".into(),
                source: SeismicError::Io(std::io::Error::other("full")),
            }
            .status(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
            assert_ne!(*a, 0);
        }
    }
}
