//! One simulation run (220 segments sharing a parameter set)
//! and the batch of runs driven from the command line.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::coalescent::CoalescentEngine;
use crate::common::{
    log_file_name, run_directory_name, segment_seed, DriverParams, ParameterSet, RunSettings,
};
use crate::demography::DemographicHistory;
use crate::error::SimError;
use crate::input::InputTables;
use crate::sampling::sni_sample_schedule;
use crate::segment::{simulate_segment, SegmentJob};

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub sim: u32,
    pub directory: PathBuf,
    pub parameters: ParameterSet,
    pub num_segments: u32,
    pub num_sites: usize,
}

/// Create `dir` unless it is already there.
pub fn ensure_run_directory(dir: &Path) -> Result<(), SimError> {
    if dir.is_dir() {
        warn!(directory = %dir.display(), "run directory exists, reusing it");
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| SimError::output(dir, e))
}

struct RunLog {
    path: PathBuf,
    out: BufWriter<File>,
}

impl RunLog {
    fn create(path: PathBuf) -> Result<Self, SimError> {
        let file = File::create(&path).map_err(|e| SimError::output(&path, e))?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    fn write_header(&mut self, sim: u32, params: &ParameterSet) -> Result<(), SimError> {
        let header = format!(
            "# Simulation {sim}\n# Ne4={}\n# T={}\n# Ne3={}\n# Ne1={}\n#\n# Chromosome\tSeed\tRecombinationRate\n",
            params.ne4,
            params.t(),
            params.ne3,
            params.ne1
        );
        self.write(&header)
    }

    // Flushed per row so a failed segment leaves its row behind
    fn write_row(&mut self, segment: u32, seed: u64, rate: &str) -> Result<(), SimError> {
        self.write(&format!("{segment}\t{seed}\t{rate}\n"))
    }

    fn write(&mut self, text: &str) -> Result<(), SimError> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush())
            .map_err(|e| SimError::output(&self.path, e))
    }
}

/// Simulate every segment of run `sim` under `output_root`.
///
/// The parameter set and each segment's recombination rate
/// are drawn from `tables` with `rng`. Output already written
/// stays on disk if a segment fails.
pub fn run_simulation<E, R>(
    sim: u32,
    output_root: &Path,
    tables: &InputTables,
    settings: &RunSettings,
    engine: &E,
    rng: &mut R,
) -> Result<RunSummary, SimError>
where
    E: CoalescentEngine + ?Sized,
    R: Rng + ?Sized,
{
    let settings = settings.validate().map_err(|e| e.in_run(sim))?;
    let directory = output_root.join(run_directory_name(sim));
    ensure_run_directory(&directory).map_err(|e| e.in_run(sim))?;

    let parameters = tables.draw_parameters(rng).map_err(|e| e.in_run(sim))?;
    let history = DemographicHistory::san_nicolas(&parameters).map_err(|e| e.in_run(sim))?;
    let samples = sni_sample_schedule();
    info!(
        sim,
        ne4 = parameters.ne4,
        t = parameters.t(),
        ne3 = parameters.ne3,
        ne1 = parameters.ne1,
        "starting simulation"
    );

    let mut log =
        RunLog::create(directory.join(log_file_name(sim))).map_err(|e| e.in_run(sim))?;
    log.write_header(sim, &parameters).map_err(|e| e.in_run(sim))?;

    let mut num_sites = 0;
    for segment in 1..=settings.num_segments {
        let seed = segment_seed(sim, segment);
        let rate = tables
            .draw_recombination_rate(rng)
            .map_err(|e| e.in_segment(sim, segment))?;
        log.write_row(segment, seed, rate.text)
            .map_err(|e| e.in_segment(sim, segment))?;
        let output = simulate_segment(
            engine,
            &SegmentJob {
                run_directory: &directory,
                segment,
                seed,
                history: &history,
                samples: &samples,
                recombination_rate: rate.value,
                settings: &settings,
            },
        )
        .map_err(|e| e.in_segment(sim, segment))?;
        debug!(sim, segment, seed, sites = output.num_sites, "segment done");
        num_sites += output.num_sites;
    }

    Ok(RunSummary {
        sim,
        directory,
        parameters,
        num_segments: settings.num_segments,
        num_sites,
    })
}

/// Load both tables, then run simulations `first..first + count`
/// one after another. Nothing is written if a table cannot be read.
pub fn run_batch<E, R>(
    params: &DriverParams,
    settings: &RunSettings,
    engine: &E,
    rng: &mut R,
) -> Result<Vec<RunSummary>, SimError>
where
    E: CoalescentEngine + ?Sized,
    R: Rng + ?Sized,
{
    let tables = InputTables::load(&params.parameter_table, &params.recombination_table)?;
    let last = params
        .first
        .checked_add(params.num_simulations)
        .ok_or_else(|| SimError::InvalidParameter("simulation index overflow".to_string()))?;
    let mut summaries = vec![];
    for sim in params.first..last {
        let summary = run_simulation(sim, &params.output_root, &tables, settings, engine, rng)?;
        info!(sim, sites = summary.num_sites, "simulation complete");
        println!("Simulation {sim} complete");
        summaries.push(summary);
    }
    Ok(summaries)
}
