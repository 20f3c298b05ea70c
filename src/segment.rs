use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::coalescent::{CoalescentEngine, SegmentSpec};
use crate::common::{vcf_file_name, RunSettings};
use crate::demography::DemographicHistory;
use crate::error::SimError;
use crate::sampling::SampleSpec;
use crate::vcf::write_vcf;

/// One 10 Mb "chromosome" of a run.
#[derive(Copy, Clone, Debug)]
pub struct SegmentJob<'a> {
    pub run_directory: &'a Path,
    pub segment: u32,
    pub seed: u64,
    pub history: &'a DemographicHistory,
    pub samples: &'a [SampleSpec],
    pub recombination_rate: f64,
    pub settings: &'a RunSettings,
}

#[derive(Clone, Debug)]
pub struct SegmentOutput {
    pub vcf_path: PathBuf,
    pub num_sites: usize,
}

/// Simulate one segment and write `peak_sim<seed>.vcf`
/// into the run directory.
pub fn simulate_segment<E: CoalescentEngine + ?Sized>(
    engine: &E,
    job: &SegmentJob,
) -> Result<SegmentOutput, SimError> {
    if job.settings.ploidy == 0 || job.samples.len() % job.settings.ploidy != 0 {
        return Err(SimError::InvalidParameter(format!(
            "{} samples do not form individuals of ploidy {}",
            job.samples.len(),
            job.settings.ploidy
        )));
    }
    let spec = SegmentSpec {
        history: job.history,
        samples: job.samples,
        sequence_length: job.settings.segment_length,
        recombination_rate: job.recombination_rate,
        mutation_rate: job.settings.mutation_rate,
        seed: job.seed,
    };
    let variants = engine.simulate(&spec)?;

    let vcf_path = job.run_directory.join(vcf_file_name(job.seed));
    let file = File::create(&vcf_path).map_err(|e| SimError::output(&vcf_path, e))?;
    let mut out = BufWriter::new(file);
    write_vcf(
        &variants,
        job.settings.ploidy,
        &job.segment.to_string(),
        &mut out,
    )
    .and_then(|_| out.flush())
    .map_err(|e| SimError::output(&vcf_path, e))?;

    Ok(SegmentOutput {
        vcf_path,
        num_sites: variants.sites().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::coalescent::HudsonEngine;
    use crate::common::ParameterSet;
    use crate::sampling::sni_sample_schedule;

    fn settings() -> RunSettings {
        RunSettings {
            segment_length: 100_000,
            ..Default::default()
        }
    }

    fn history() -> DemographicHistory {
        DemographicHistory::san_nicolas(&ParameterSet {
            ne4: 5000,
            t_offset: 50,
            ne3: 8000,
            ne1: 15000,
        })
        .unwrap()
    }

    #[test]
    fn test_same_seed_gives_identical_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir(&a).unwrap();
        std::fs::create_dir(&b).unwrap();
        let history = history();
        let samples = sni_sample_schedule();
        let settings = settings();
        let job = SegmentJob {
            run_directory: &a,
            segment: 7,
            seed: 3007,
            history: &history,
            samples: &samples,
            recombination_rate: 1.5e-8,
            settings: &settings,
        };
        let first = simulate_segment(&HudsonEngine, &job).unwrap();
        let second = simulate_segment(
            &HudsonEngine,
            &SegmentJob {
                run_directory: &b,
                ..job
            },
        )
        .unwrap();
        assert!(first.vcf_path.ends_with("peak_sim3007.vcf"));
        assert_eq!(
            std::fs::read(&first.vcf_path).unwrap(),
            std::fs::read(&second.vcf_path).unwrap()
        );
    }

    #[test]
    fn test_engine_errors_propagate_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let history = history();
        let samples = sni_sample_schedule();
        let settings = settings();
        let job = SegmentJob {
            run_directory: dir.path(),
            segment: 1,
            seed: 1001,
            history: &history,
            samples: &samples,
            recombination_rate: f64::NAN,
            settings: &settings,
        };
        assert!(matches!(
            simulate_segment(&HudsonEngine, &job),
            Err(SimError::InvalidParameter(_))
        ));
        assert!(!dir.path().join("peak_sim1001.vcf").exists());
    }

    #[test]
    fn test_missing_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not_there");
        let history = history();
        let samples = sni_sample_schedule();
        let settings = settings();
        let job = SegmentJob {
            run_directory: &missing,
            segment: 1,
            seed: 1001,
            history: &history,
            samples: &samples,
            recombination_rate: 1e-8,
            settings: &settings,
        };
        assert!(matches!(
            simulate_segment(&HudsonEngine, &job),
            Err(SimError::Output { .. })
        ));
    }
}
