//! FEL command-line entry point.
//!
//! Two subcommands cover the pipeline: `density` computes populations, free
//! energies, neighborhoods and the initial clustering from a coordinate
//! matrix; `mpp` refines a microstate trajectory through most-probable-path
//! lumping over a range of metastability thresholds.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use fel_comm::{Cluster, LocalCluster};
use fel_core::{io, FelError, Neighborhood};
use fel_density::{
    assign_low_density_frames, free_energies, initial_density_clustering, nearest_neighbors,
    populations,
};
use fel_mpp::{run_sweep, SweepConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "fel")]
#[command(version = VERSION)]
#[command(
    about = "Density-based clustering with most-probable-path metastability refinement",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Populations, free energies, neighborhoods and initial clusters
    Density(DensityArgs),
    /// Most-probable-path lumping over a q_min ladder
    Mpp(MppArgs),
}

#[derive(Args)]
struct DensityArgs {
    /// Input coordinate file: ASCII matrix, one frame per line
    #[arg(short, long)]
    file: PathBuf,

    /// Radius for population counting and free-energy estimation
    #[arg(short, long, conflicts_with = "radii")]
    radius: Option<f32>,

    /// Several radii: populations and free energies per radius in one pass
    ///
    /// Cannot be combined with clustering output, which needs a single
    /// length scale.
    #[arg(short = 'R', long, num_args = 1..)]
    radii: Vec<f32>,

    /// Output file for populations (basename in multi-radius mode)
    #[arg(short, long)]
    population: Option<PathBuf>,

    /// Output file for free energies (basename in multi-radius mode)
    #[arg(short = 'd', long)]
    free_energy: Option<PathBuf>,

    /// Reuse free energies from a previous run
    #[arg(short = 'D', long, conflicts_with = "free_energy")]
    free_energy_input: Option<PathBuf>,

    /// Output file for nearest-neighbor data
    #[arg(short = 'b', long)]
    nearest_neighbors: Option<PathBuf>,

    /// Reuse nearest-neighbor data from a previous run
    #[arg(short = 'B', long, conflicts_with = "nearest_neighbors")]
    nearest_neighbors_input: Option<PathBuf>,

    /// Output file for the clustered trajectory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Reuse an initial clustering instead of screening
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Free-energy threshold for the initial screening
    #[arg(short = 't', long)]
    threshold: Option<f32>,

    /// Keep low-density frames unassigned instead of attaching them to the
    /// initial clusters
    #[arg(long, default_value_t = false)]
    only_initial: bool,

    /// Number of SPMD workers
    #[arg(short = 'n', long, default_value_t = 1)]
    workers: usize,
}

#[derive(Args)]
struct MppArgs {
    /// Basename prefixed to every output file
    #[arg(short, long)]
    basename: String,

    /// Input microstate trajectory, one state id per line
    #[arg(short, long)]
    input: PathBuf,

    /// Free energies, one value per frame
    #[arg(short = 'D', long)]
    free_energy_input: PathBuf,

    /// First metastability threshold
    #[arg(long)]
    qmin_from: f32,

    /// Last metastability threshold, inclusive
    #[arg(long)]
    qmin_to: f32,

    /// Metastability threshold increment
    #[arg(long)]
    qmin_step: f32,

    /// Lag in frames for transition counting
    #[arg(short, long)]
    lagtime: usize,

    /// Sub-trajectory cutpoints, one per line; enables per-chunk weighting
    /// for differently sized chunks
    #[arg(long, conflicts_with = "concat_nframes")]
    concat_limits: Option<PathBuf>,

    /// Length of equally sized concatenated sub-trajectories
    #[arg(long)]
    concat_nframes: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.command {
        Command::Density(args) => run_density(&args),
        Command::Mpp(args) => run_mpp(&args),
    }
}

/// Appends the radius to a multi-radius output basename.
fn radius_suffixed(base: &Path, radius: f32) -> PathBuf {
    PathBuf::from(format!("{}_{:.6}", base.display(), radius))
}

/// Cutpoints for equally sized sub-trajectories of `chunk_len` frames.
fn equidistant_limits(total_len: usize, chunk_len: usize) -> Vec<usize> {
    let mut limits = Vec::new();
    let mut cut = chunk_len;
    while cut < total_len {
        limits.push(cut);
        cut += chunk_len;
    }
    limits
}

fn validate_concat_limits(limits: &[usize], trajectory_len: usize) -> fel_core::Result<()> {
    let mut previous = 0usize;
    for &cut in limits {
        if cut <= previous || cut > trajectory_len {
            return Err(FelError::bad_argument(format!(
                "concat limits must be strictly increasing within [1, {trajectory_len}] \
                 (offending cutpoint: {cut})"
            )));
        }
        previous = cut;
    }
    Ok(())
}

fn run_density(args: &DensityArgs) -> Result<()> {
    if !args.radii.is_empty() && args.output.is_some() {
        return Err(FelError::bad_argument(
            "clustering cannot be done with several radii (-R is set)",
        )
        .into());
    }
    LocalCluster::run(args.workers, |cluster| density_pipeline(args, cluster))?;
    Ok(())
}

fn density_pipeline(args: &DensityArgs, cluster: &Cluster) -> fel_core::Result<()> {
    // every worker holds the full coordinate matrix
    if cluster.is_root() {
        log::info!("reading coordinates from '{}'", args.file.display());
    }
    let coords = io::read_coords(&args.file)?;

    // free energies: reuse, or derive from populations
    let mut free_energy: Vec<f32> = Vec::new();
    if let Some(path) = &args.free_energy_input {
        if cluster.is_root() {
            log::info!("re-using free energy data");
        }
        free_energy = io::read_column(path)?;
    } else if args.free_energy.is_some() || args.population.is_some() || args.output.is_some() {
        if !args.radii.is_empty() {
            // several radii in one pass: write per-radius artifacts, no
            // downstream clustering
            let pops = populations(&coords, &args.radii, cluster)?;
            if cluster.is_root() {
                for (radius, counts) in &pops {
                    if let Some(base) = &args.population {
                        io::write_column(radius_suffixed(base, *radius), counts)?;
                    }
                    if let Some(base) = &args.free_energy {
                        io::write_free_energies(
                            radius_suffixed(base, *radius),
                            &free_energies(counts),
                        )?;
                    }
                }
            }
        } else {
            let radius = args
                .radius
                .ok_or_else(|| FelError::bad_argument("radius (-r) is required"))?;
            let pops = populations(&coords, &[radius], cluster)?;
            let counts = &pops[0].1;
            if cluster.is_root() {
                if let Some(path) = &args.population {
                    io::write_column(path, counts)?;
                }
                log::info!("calculating free energies");
            }
            free_energy = free_energies(counts);
            if cluster.is_root() {
                if let Some(path) = &args.free_energy {
                    io::write_free_energies(path, &free_energy)?;
                }
            }
        }
    }

    // nearest neighbors: reuse, or compute when needed
    let mut nh: Neighborhood = Vec::new();
    let mut nh_hd: Neighborhood = Vec::new();
    if let Some(path) = &args.nearest_neighbors_input {
        if cluster.is_root() {
            log::info!("re-using nearest neighbor data");
        }
        let pair = io::read_neighborhood(path)?;
        nh = pair.0;
        nh_hd = pair.1;
    } else if args.nearest_neighbors.is_some() || args.output.is_some() {
        let pair = nearest_neighbors(&coords, &free_energy, cluster)?;
        nh = pair.0;
        nh_hd = pair.1;
        if cluster.is_root() {
            if let Some(path) = &args.nearest_neighbors {
                io::write_neighborhood(path, &nh, &nh_hd)?;
            }
        }
    }

    // clustering
    if let Some(output) = &args.output {
        let clustering: Vec<usize> = if let Some(input) = &args.input {
            if cluster.is_root() {
                log::info!("reading initial clusters from file");
            }
            io::read_column(input)?
        } else {
            let threshold = args.threshold.ok_or_else(|| {
                FelError::bad_argument("threshold (-t) is required for initial clustering")
            })?;
            if cluster.is_root() {
                log::info!("calculating initial clusters");
            }
            initial_density_clustering(&coords, &free_energy, &nh, threshold, cluster)?
        };
        if cluster.is_root() {
            let clustering = if args.only_initial {
                clustering
            } else {
                log::info!("assigning low density frames to initial clusters");
                assign_low_density_frames(&clustering, &nh_hd, &free_energy)
            };
            log::info!("writing clusters to '{}'", output.display());
            io::write_column(output, &clustering)?;
        }
    }
    Ok(())
}

fn run_mpp(args: &MppArgs) -> Result<()> {
    if args.lagtime == 0 {
        return Err(
            FelError::bad_argument("a lagtime of 0 does not make sense for MPP clustering").into(),
        );
    }
    log::info!("loading microstates");
    let trajectory: Vec<usize> = io::read_column(&args.input)?;
    log::info!("loading free energies");
    let free_energy: Vec<f32> = io::read_column(&args.free_energy_input)?;

    let (concat_limits, diff_size_chunks) = if let Some(path) = &args.concat_limits {
        let limits: Vec<usize> = io::read_column(path)?;
        validate_concat_limits(&limits, trajectory.len())?;
        (limits, true)
    } else if let Some(chunk_len) = args.concat_nframes {
        if chunk_len == 0 {
            return Err(FelError::bad_argument("concat-nframes must be positive").into());
        }
        (equidistant_limits(trajectory.len(), chunk_len), false)
    } else {
        (Vec::new(), false)
    };

    let config = SweepConfig {
        basename: args.basename.clone(),
        q_min_from: args.qmin_from,
        q_min_to: args.qmin_to,
        q_min_step: args.qmin_step,
        lagtime: args.lagtime,
        concat_limits,
        diff_size_chunks,
    };
    log::info!("beginning q_min loop");
    let summary = run_sweep(&config, trajectory, free_energy)?;
    log::info!("finished {} q_min levels", summary.levels.len());
    Ok(())
}
