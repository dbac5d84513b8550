use super::CliError;
use super::helpers::{init_logging, install_shutdown_handler};
use eventgen_core::common::{CentralityDefinition, RunConfig};
use eventgen_core::observables::{RECORD_LAYOUT, RECORD_SIZE, numpy_dtype};
use eventgen_core::stages::SubprocessInvoker;
use clap::ArgAction;
use clap::builder::BoolishValueParser;
use eventgen_core::{RunSession, RunSummary};
use std::path::{Path, PathBuf};

#[derive(clap::Args, Debug)]
pub(super) struct RunArgs {
    /// Results file; records are appended
    #[arg(value_name = "RESULTS")]
    results: PathBuf,

    /// Number of events to run (unbounded when omitted)
    #[arg(long)]
    nevents: Option<u64>,

    /// Environment variable holding this instance's rank
    #[arg(long)]
    rankvar: Option<String>,

    /// Rank format: {}, {:N} or {:0N}
    #[arg(long, default_value = "{}")]
    rankfmt: String,

    /// Working directory for stage files (temporary when omitted)
    #[arg(long)]
    tmpdir: Option<PathBuf>,

    /// Collision system label, for the log only
    #[arg(long, alias = "system-and-sqrts")]
    system: Option<String>,

    /// Run event-averaged initial conditions (`--avg-ic` or `--avg-ic=on|off`)
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "off",
        default_missing_value = "on",
        value_parser = BoolishValueParser::new()
    )]
    avg_ic: bool,

    /// Events averaged into each averaged initial condition
    #[arg(long, default_value_t = 1000)]
    avg_ic_events: u64,

    /// Run the hadronic afterburner (`--afterburner` or `--afterburner=on|off`)
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "off",
        default_missing_value = "on",
        value_parser = BoolishValueParser::new()
    )]
    afterburner: bool,

    /// Generator normalization
    #[arg(long, default_value_t = 1.0)]
    norm: f64,

    /// Centrality definition: entropy, npart or impact
    #[arg(long, default_value = "entropy")]
    centrality_def: String,

    /// Lower centrality bound [%]
    #[arg(long, default_value_t = 0.0)]
    centrality_low: f64,

    /// Upper centrality bound [%]
    #[arg(long, default_value_t = 100.0)]
    centrality_high: f64,

    /// Nucleon width [fm]
    #[arg(long, default_value_t = 0.5)]
    nucleon_width: f64,

    /// Free-streaming time [fm/c]
    #[arg(long, default_value_t = 0.5)]
    tau_fs: f64,

    /// Extra generator arguments
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    trento_args: String,

    /// Grid step [fm]
    #[arg(long, default_value_t = 0.1)]
    grid_step: f64,

    /// Generator grid half-extent [fm]
    #[arg(long, default_value_t = 15.0)]
    grid_max: f64,

    /// Extra hydro arguments for the production pass
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    hydro_args: String,

    /// Particlization temperature [GeV]
    #[arg(long, default_value_t = 0.150)]
    tswitch: f64,

    /// Log file (stderr when omitted)
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Checkpoint file written before every event
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Append each event's final particles to this file
    #[arg(long)]
    particles: Option<PathBuf>,

    /// Directory for per-event evolution history archives
    #[arg(long)]
    history_dir: Option<PathBuf>,

    #[command(flatten)]
    programs: ProgramArgs,

    #[command(flatten)]
    sampling: SamplingArgs,
}

#[derive(clap::Args, Debug)]
pub(super) struct ProgramArgs {
    /// Initial-condition generator executable
    #[arg(long, default_value = "trento")]
    generator_program: String,

    /// Free-streaming executable
    #[arg(long, default_value = "freestream")]
    freestream_program: String,

    /// Hydrodynamics executable
    #[arg(long, default_value = "osu-hydro")]
    hydro_program: String,

    /// Particle sampler executable
    #[arg(long, default_value = "frzout-sample")]
    sampler_program: String,

    /// Hadronic afterburner executable
    #[arg(long, default_value = "afterburner")]
    afterburner_program: String,
}

#[derive(clap::Args, Debug)]
pub(super) struct SamplingArgs {
    /// Minimum number of oversamples per event
    #[arg(long, default_value_t = 10)]
    min_samples: u64,

    /// Maximum number of oversamples per event
    #[arg(long, default_value_t = 1000)]
    max_samples: u64,

    /// Minimum number of sampled particles per event
    #[arg(long, default_value_t = 100_000)]
    min_particles: u64,

    /// Oversamples requested per sampler call
    #[arg(long, default_value_t = 10)]
    sample_batch: u64,

    /// Pions collected for the event-plane estimate
    #[arg(long, default_value_t = 1_000_000)]
    event_plane_pions: u64,

    /// Sampler calls allowed for the event-plane estimate
    #[arg(long, default_value_t = 200)]
    event_plane_batches: u64,
}

impl RunArgs {
    pub(super) fn into_config(self) -> Result<RunConfig, CliError> {
        let definition = self.centrality_def.parse::<CentralityDefinition>()?;

        let mut config = RunConfig::new(self.results);
        config.nevents = self.nevents;
        config.rankvar = self.rankvar;
        config.rankfmt = self.rankfmt;
        config.tmpdir = self.tmpdir;
        config.system = self.system;
        config.avg_ic = self.avg_ic;
        config.avg_ic_events = self.avg_ic_events;
        config.afterburner = self.afterburner;
        config.norm = self.norm;
        config.centrality.definition = definition;
        config.centrality.low = self.centrality_low;
        config.centrality.high = self.centrality_high;
        config.nucleon_width = self.nucleon_width;
        config.tau_fs = self.tau_fs;
        config.trento_args = self.trento_args;
        config.grid_step = self.grid_step;
        config.grid_max = self.grid_max;
        config.hydro_args = self.hydro_args;
        config.tswitch = self.tswitch;
        config.logfile = self.logfile;
        config.checkpoint = self.checkpoint;
        config.particles = self.particles;
        config.history_dir = self.history_dir;

        config.programs.generator = self.programs.generator_program;
        config.programs.freestream = self.programs.freestream_program;
        config.programs.hydro = self.programs.hydro_program;
        config.programs.sampler = self.programs.sampler_program;
        config.programs.afterburner = self.programs.afterburner_program;

        config.sampling.min_samples = self.sampling.min_samples;
        config.sampling.max_samples = self.sampling.max_samples;
        config.sampling.min_particles = self.sampling.min_particles;
        config.sampling.batch = self.sampling.sample_batch;
        config.event_plane.target_pions = self.sampling.event_plane_pions;
        config.event_plane.max_batches = self.sampling.event_plane_batches;
        Ok(config)
    }
}

pub(super) fn run_events_command(args: RunArgs) -> Result<i32, CliError> {
    let session = RunSession::fresh(args.into_config()?)?;
    execute(session)
}

pub(super) fn resume_command(path: &Path) -> Result<i32, CliError> {
    let session = RunSession::resume(path)?;
    execute(session)
}

fn execute(session: RunSession) -> Result<i32, CliError> {
    init_logging(session.config().logfile.as_deref())?;
    let shutdown = install_shutdown_handler()?;
    let summary = session.execute(SubprocessInvoker, shutdown)?;
    Ok(exit_code(&summary))
}

fn exit_code(summary: &RunSummary) -> i32 {
    if summary.succeeded() { 0 } else { 1 }
}

pub(super) fn layout_command() -> Result<i32, CliError> {
    let layout = serde_json::to_string_pretty(RECORD_LAYOUT)
        .map_err(|error| CliError::Internal(error.into()))?;
    println!("{layout}");
    println!("record size: {RECORD_SIZE} bytes");
    println!("numpy dtype: {}", numpy_dtype());
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::{RunArgs, exit_code};
    use clap::Parser;
    use eventgen_core::RunSummary;
    use eventgen_core::common::CentralityDefinition;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RunArgs,
    }

    fn parse(args: &[&str]) -> RunArgs {
        Harness::try_parse_from(std::iter::once("run-events").chain(args.iter().copied()))
            .expect("arguments should parse")
            .args
    }

    #[test]
    fn options_map_onto_the_run_config() {
        let config = parse(&[
            "results.dat",
            "--nevents",
            "25",
            "--centrality-def",
            "npart",
            "--centrality-high",
            "10",
            "--trento-args",
            "Pb Pb -x 6.4",
            "--hydro-program",
            "/opt/osu-hydro",
            "--sample-batch",
            "4",
        ])
        .into_config()
        .expect("config should build");

        assert_eq!(config.nevents, Some(25));
        assert_eq!(config.centrality.definition, CentralityDefinition::Npart);
        assert_eq!(config.centrality.high, 10.0);
        assert_eq!(config.trento_args_list(), vec!["Pb", "Pb", "-x", "6.4"]);
        assert_eq!(config.programs.hydro, "/opt/osu-hydro");
        assert_eq!(config.sampling.batch, 4);
        config.validate().expect("config should validate");
    }

    #[test]
    fn unknown_centrality_definition_is_rejected() {
        let error = parse(&["results.dat", "--centrality-def", "mult"])
            .into_config()
            .expect_err("unknown definition should fail");
        assert!(error.to_string().contains("mult"));
    }

    #[test]
    fn exit_status_reflects_net_success() {
        let ran = RunSummary {
            attempted: 3,
            failed: 2,
            ..RunSummary::default()
        };
        assert_eq!(exit_code(&ran), 0);
        let broken = RunSummary {
            attempted: 4,
            failed: 4,
            aborted: true,
            ..RunSummary::default()
        };
        assert_eq!(exit_code(&broken), 1);
        assert_eq!(exit_code(&RunSummary::default()), 1);
    }
}
