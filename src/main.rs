use std::path::PathBuf;

use clap::Parser;
use log::{info, LevelFilter};

use outbreak::log::set_log_level;
use outbreak::{CityRegistry, OutbreakError, Params, Simulation, SimulationEvent};

/// Run a toy epidemic simulation across US cities and write the final
/// report.
#[derive(Parser, Debug)]
#[command(name = "outbreak", version, about)]
struct Args {
    /// Path to the GeoJSON city dataset
    #[arg(long, default_value = "data/us-cities.json")]
    cities: PathBuf,

    /// Optional JSON parameter file; missing fields use the defaults
    #[arg(long)]
    params: Option<PathBuf>,

    /// Name of the city where the outbreak starts
    #[arg(long)]
    patient_zero: String,

    /// Random seed
    #[arg(short, long, default_value = "0")]
    random_seed: u64,

    /// Tick rate in simulated days per second; 0 runs unpaced
    #[arg(long, default_value_t = 0.0)]
    speed: f64,

    /// Run until infections reach exactly zero instead of merely low
    #[arg(long)]
    eradication: bool,

    /// Directory for report.json and history.csv
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    set_log_level(args.log_level);

    let registry = CityRegistry::from_path(&args.cities)?;
    let params = match &args.params {
        Some(path) => Params::from_file(path)?,
        None => Params::default(),
    };

    let mut simulation = Simulation::new(registry, params, args.random_seed);
    simulation.set_speed(args.speed);
    simulation.set_eradication_mode(args.eradication);

    // Console observer: a day summary every ten days and whenever
    // infections hit zero.
    let mut last_day = 0u32;
    simulation.subscribe(move |event| match event {
        SimulationEvent::DayChanged { day } => last_day = *day,
        SimulationEvent::StatisticsUpdated(stats)
            if last_day > 0 && (last_day % 10 == 0 || stats.infected == 0) =>
        {
            info!(
                "day {last_day}: infected {}, recovered {}, deceased {}",
                stats.infected, stats.recovered, stats.deceased
            );
        }
        _ => {}
    });

    simulation.set_patient_zero(&args.patient_zero);
    if simulation.state().patient_zero.is_none() {
        return Err(Box::new(OutbreakError::CityNotFound(args.patient_zero)));
    }

    simulation.start();
    let report = simulation
        .run()
        .ok_or_else(|| OutbreakError::OutbreakError("simulation never ran".to_string()))?;

    let json_path = args.output_dir.join("report.json");
    let csv_path = args.output_dir.join("history.csv");
    report.write_json(&json_path)?;
    report.write_history_csv(&csv_path)?;

    println!("Simulation ended after {} days: {}", report.duration_days, report.end_reason);
    println!(
        "Final: infected {}, recovered {}, deceased {} (peak {} on day {})",
        report.final_statistics.infected,
        report.final_statistics.recovered,
        report.final_statistics.deceased,
        report.peak_infections,
        report.peak_infection_day
    );
    println!("Report written to {}", json_path.display());
    Ok(())
}
