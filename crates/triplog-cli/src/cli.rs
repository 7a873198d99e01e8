//! Triplog CLI - batch runs of the trip detector.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use triplog_core::{
    Attitude, CommitKind, CommittedRecord, InertialSample, PersistenceGateway, PositionSample,
    TrackingConfig,
};
use triplog_session::{CsvStore, MemoryStore, Session, SessionStats};
use triplog_sim::params::{self, ParamSpec};
use triplog_sim::{
    generate_sensor_data, replay, simulate_trip, Segment, SensorConfig, SensorData, SimResult,
    TripParams,
};

/// Public function that can be called from the main binary
pub fn run_cli_main(args: &[&str]) -> Result<()> {
    let args = Args::parse_from(args);
    main_inner(args)
}

#[derive(Parser, Debug, Clone)]
#[command(name = "triplog-cli")]
#[command(about = "Trip detection batch runner")]
#[command(version)]
pub struct Args {
    /// Output directory
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Output file format
    #[arg(short, long, value_enum, default_value = "csv")]
    format: OutputFormat,

    /// Run a single synthetic trip through a live session
    #[arg(long)]
    single: bool,

    /// Replay recorded position samples (CSV: timestamp,latitude,longitude,speed)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Recorded inertial samples to merge with --input
    #[arg(long, requires = "input")]
    inertial: Option<PathBuf>,

    /// Tracking config (JSON); flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    // ── Tracking ──────────────────────────────────────────────
    #[arg(long)]
    speed_threshold: Option<f64>,

    #[arg(long)]
    sample_rate: Option<u32>,

    #[arg(long)]
    buffer_capacity: Option<usize>,

    // ── Trip profile ──────────────────────────────────────────
    #[arg(long, default_value_t = 60.0)]
    dwell_time: f64,

    #[arg(long, default_value_t = 90.0)]
    walk_time: f64,

    #[arg(long, default_value_t = 1.4)]
    walk_speed: f64,

    #[arg(long, default_value_t = 300.0)]
    drive_time: f64,

    #[arg(long, default_value_t = 13.9)]
    drive_speed: f64,

    // ── Sensor options ────────────────────────────────────────
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 1.0)]
    noise_scale: f64,

    #[arg(long, default_value_t = 1.0)]
    gps_hz: f64,

    #[arg(long, default_value_t = 50.0)]
    imu_hz: f64,

    #[arg(long, default_value_t = 0.0)]
    gps_dropout: f64,

    #[arg(long)]
    no_inertial: bool,

    // ── Sweep options ─────────────────────────────────────────
    #[arg(long, default_value = "speed_threshold")]
    sweep_param: String,

    #[arg(long, default_value_t = 5)]
    sweep_steps: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Csv,
    Json,
}

fn main_inner(args: Args) -> Result<()> {
    println!("Triplog Trip Detector");
    println!("=====================\n");

    let config = build_tracking_config(&args)?;

    if let Some(input) = &args.input {
        run_replay_file(&args, &config, input)?;
    } else if args.single {
        run_single(&args, &config)?;
    } else {
        run_sweep(&args, &config)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Single Run
// ---------------------------------------------------------------------------
fn run_single(args: &Args, config: &TrackingConfig) -> Result<()> {
    println!("Running single synthetic trip...");

    // 1. Simulate
    let sim = simulate_trip(&build_trip_params(args));
    print_sim_stats(&sim);

    // 2. Sensors
    let mut data = generate_sensor_data(&sim, &build_sensor_config(args));
    if args.no_inertial {
        data.inertial.clear();
    }

    std::fs::create_dir_all(&args.output_dir)?;
    write_samples(&args.output_dir.join("samples.csv"), &data.positions)?;

    // 3. Live session
    let (stats, records) = run_session(args, config, &data)?;
    print_session_stats(&stats, &records);
    Ok(())
}

// ---------------------------------------------------------------------------
// Recorded Replay
// ---------------------------------------------------------------------------
fn run_replay_file(args: &Args, config: &TrackingConfig, input: &Path) -> Result<()> {
    println!("Replaying {:?}...", input);
    let positions = read_samples(input)?;
    let inertial = match &args.inertial {
        Some(path) => read_inertial(path)?,
        None => Vec::new(),
    };
    println!(
        "  {} position samples, {} inertial samples",
        positions.len(),
        inertial.len()
    );

    std::fs::create_dir_all(&args.output_dir)?;
    let data = SensorData {
        positions,
        inertial,
    };
    let (stats, records) = run_session(args, config, &data)?;
    print_session_stats(&stats, &records);
    Ok(())
}

/// Stream samples through a real session, merged by timestamp, and wait for
/// the writer to finish.
fn run_session(
    args: &Args,
    config: &TrackingConfig,
    data: &SensorData,
) -> Result<(SessionStats, Vec<CommittedRecord>)> {
    let memory = Arc::new(MemoryStore::new());
    let gateway: Arc<dyn PersistenceGateway> = match args.format {
        OutputFormat::Csv => {
            let path = args.output_dir.join("records.csv");
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("failed to replace {:?}", path))?;
            }
            Arc::new(TeeStore {
                memory: memory.clone(),
                csv: CsvStore::open(&path)?,
            })
        }
        OutputFormat::Json => memory.clone(),
    };

    let rt = tokio::runtime::Runtime::new()?;
    let stats = rt.block_on(async {
        let handle = Session::start(config.clone(), gateway)?;
        // Barrier well before the queue can fill.
        let batch = (config.queue_capacity / 2).max(1);

        let mut imu = data.inertial.iter().peekable();
        let mut queued = 0usize;
        for sample in &data.positions {
            while let Some(s) = imu.next_if(|s| s.timestamp <= sample.timestamp) {
                handle.on_inertial_sample(*s)?;
                queued += 1;
                if queued % batch == 0 {
                    handle.sync().await?;
                }
            }
            handle.on_position_sample(*sample, None)?;
            queued += 1;
            if queued % batch == 0 {
                handle.sync().await?;
            }
        }
        handle.sync().await?;
        anyhow::Ok(handle.stop().await)
    })?;

    let records = memory.records();
    if args.format == OutputFormat::Json {
        let path = args.output_dir.join("records.json");
        let file = std::fs::File::create(&path)?;
        serde_json::to_writer_pretty(
            file,
            &serde_json::json!({ "stats": stats, "records": records }),
        )?;
        println!("Records written to {:?}", path);
    } else {
        println!("Records written to {:?}", args.output_dir.join("records.csv"));
    }
    Ok((stats, records))
}

/// Writes to the CSV file and keeps a copy for the summary.
struct TeeStore {
    memory: Arc<MemoryStore>,
    csv: CsvStore,
}

impl PersistenceGateway for TeeStore {
    fn append(&self, record: &CommittedRecord) -> Result<(), triplog_core::GatewayError> {
        self.csv.append(record)?;
        self.memory.append(record)
    }
}

// ---------------------------------------------------------------------------
// Sweep Run
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SweepRow {
    value: f64,
    trips: usize,
    flushed: usize,
    sampled: usize,
    rejected: usize,
    evicted: usize,
    unflushed: usize,
}

fn run_sweep(args: &Args, config: &TrackingConfig) -> Result<()> {
    let Some(spec) = params::lookup(&args.sweep_param) else {
        let names: Vec<&str> = params::ALL.iter().map(|p| p.name).collect();
        bail!(
            "unknown sweep parameter '{}', expected one of {:?}",
            args.sweep_param,
            names
        );
    };
    println!("Sweeping {} over {} steps", spec.label, args.sweep_steps);

    let mut rows = Vec::new();
    for (i, value) in spec.sweep(args.sweep_steps).into_iter().enumerate() {
        let (run_args, run_config) = apply_param(args, config, &spec, value);
        run_config
            .validate()
            .with_context(|| format!("{} = {} is not a valid setting", spec.name, value))?;

        let sim = simulate_trip(&build_trip_params(&run_args));
        let data = generate_sensor_data(&sim, &build_sensor_config(&run_args));
        let res = replay(&data, &run_config);

        let flushed = res
            .commits
            .iter()
            .filter(|c| c.kind == CommitKind::Flush)
            .count();
        let row = SweepRow {
            value,
            trips: res.trips.len(),
            flushed,
            sampled: res.commits.len() - flushed,
            rejected: res.rejected,
            evicted: res.evicted,
            unflushed: res.unflushed,
        };
        println!(
            "Run {}/{} | {}: {:.2} -> trips {} | flushed {} | sampled {}",
            i + 1,
            args.sweep_steps,
            spec.name,
            value,
            row.trips,
            row.flushed,
            row.sampled
        );
        rows.push(row);
    }

    std::fs::create_dir_all(&args.output_dir)?;
    let path = match args.format {
        OutputFormat::Csv => {
            let path = args.output_dir.join("sweep_summary.csv");
            let mut wtr = csv::Writer::from_path(&path)?;
            for row in &rows {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
            path
        }
        OutputFormat::Json => {
            let path = args.output_dir.join("sweep_summary.json");
            serde_json::to_writer_pretty(std::fs::File::create(&path)?, &rows)?;
            path
        }
    };

    println!("\nSweep complete. Summary at {:?}", path);
    Ok(())
}

fn apply_param(
    args: &Args,
    config: &TrackingConfig,
    spec: &ParamSpec,
    value: f64,
) -> (Args, TrackingConfig) {
    let mut a = args.clone();
    let mut c = config.clone();
    let value = spec.clamp(value);
    match spec.name {
        "speed_threshold" => c.tracking_speed_threshold = value,
        "sample_rate" => c.sample_rate = value.round() as u32,
        "buffer_capacity" => c.ring_buffer_capacity = value.round() as usize,
        "dwell_time" => a.dwell_time = value,
        "walk_time" => a.walk_time = value,
        "walk_speed" => a.walk_speed = value,
        "drive_time" => a.drive_time = value,
        "drive_speed" => a.drive_speed = value,
        "noise_scale" => a.noise_scale = value,
        "gps_hz" => a.gps_hz = value,
        "imu_hz" => a.imu_hz = value,
        "gps_dropout" => a.gps_dropout = value,
        _ => {}
    }
    (a, c)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_tracking_config(args: &Args) -> Result<TrackingConfig> {
    let mut config = match &args.config {
        Some(path) => TrackingConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {:?}", path))?,
        None => TrackingConfig::default(),
    };
    if let Some(v) = args.speed_threshold {
        config.tracking_speed_threshold = v;
    }
    if let Some(v) = args.sample_rate {
        config.sample_rate = v;
    }
    if let Some(v) = args.buffer_capacity {
        config.ring_buffer_capacity = v;
    }
    config.validate()?;
    info!(?config, "tracking config");
    Ok(config)
}

fn build_trip_params(args: &Args) -> TripParams {
    // Home, walk to the car, drive, park, walk to the door.
    TripParams {
        segments: vec![
            Segment::dwell(args.dwell_time),
            Segment::walk(args.walk_time, args.walk_speed),
            Segment::dwell(args.dwell_time / 3.0),
            Segment::drive(args.drive_time, args.drive_speed),
            Segment::dwell(args.dwell_time / 2.0),
            Segment::walk(args.walk_time / 2.0, args.walk_speed),
            Segment::dwell(args.dwell_time / 2.0),
        ],
        ..TripParams::default()
    }
}

fn build_sensor_config(args: &Args) -> SensorConfig {
    SensorConfig {
        noise_scale: args.noise_scale,
        gps_rate_hz: args.gps_hz,
        imu_rate_hz: args.imu_hz,
        gps_dropout: args.gps_dropout,
        seed: args.seed,
        ..SensorConfig::default()
    }
}

fn print_sim_stats(sim: &SimResult) {
    let duration = match (sim.time.first(), sim.time.last()) {
        (Some(a), Some(b)) => b - a,
        _ => 0.0,
    };
    println!("\nSimulation Stats:");
    println!("  Steps:     {}", sim.len());
    println!("  Duration:  {:.1} s", duration);
    println!("  Distance:  {:.1} m", sim.distance_m());
    println!("  Max Speed: {:.2} m/s", sim.max_speed());
    println!("-----------------------------");
}

fn print_session_stats(stats: &SessionStats, records: &[CommittedRecord]) {
    println!("\nSession Stats:");
    println!("  Positions:  {}", stats.positions);
    println!("  Inertial:   {}", stats.inertial);
    println!("  Rejected:   {}", stats.rejected);
    println!("  Trips:      {}", stats.trips);
    println!("  Committed:  {}", stats.commits_written);
    println!("  Failures:   {}", stats.write_failures);
    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        println!("  Span:       {:.1} s", last.timestamp - first.timestamp);
    }
    println!("-----------------------------");
}

// ---------------------------------------------------------------------------
// Sample files
// ---------------------------------------------------------------------------

fn write_samples(path: &Path, samples: &[PositionSample]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for s in samples {
        wtr.serialize(s)?;
    }
    wtr.flush()?;
    Ok(())
}

fn read_samples(path: &Path) -> Result<Vec<PositionSample>> {
    let mut rdr =
        csv::Reader::from_path(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut out = Vec::new();
    for (i, row) in rdr.deserialize().enumerate() {
        let sample: PositionSample = row.with_context(|| format!("bad row {} in {:?}", i + 1, path))?;
        out.push(sample);
    }
    Ok(out)
}

/// Flat inertial row: timestamp,ax,ay,az,gx,gy,gz,pitch,yaw,roll
#[derive(Debug, Deserialize)]
struct InertialRow {
    timestamp: f64,
    ax: f64,
    ay: f64,
    az: f64,
    gx: f64,
    gy: f64,
    gz: f64,
    #[serde(default)]
    pitch: f64,
    #[serde(default)]
    yaw: f64,
    #[serde(default)]
    roll: f64,
}

impl From<InertialRow> for InertialSample {
    fn from(r: InertialRow) -> Self {
        InertialSample::new(
            r.timestamp,
            [r.ax, r.ay, r.az].into(),
            [r.gx, r.gy, r.gz].into(),
            Attitude {
                pitch: r.pitch,
                yaw: r.yaw,
                roll: r.roll,
            },
        )
    }
}

fn read_inertial(path: &Path) -> Result<Vec<InertialSample>> {
    let mut rdr =
        csv::Reader::from_path(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut out = Vec::new();
    for (i, row) in rdr.deserialize::<InertialRow>().enumerate() {
        let row = row.with_context(|| format!("bad row {} in {:?}", i + 1, path))?;
        out.push(row.into());
    }
    Ok(out)
}
