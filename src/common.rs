use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

use crate::error::SimError;

/// Years between the 2016 model's time origin (1988)
/// and ours (2000).
pub const TIME_SHIFT: i64 = 12;
pub const NUM_SEGMENTS: u32 = 220;
pub const SEGMENT_LENGTH: i64 = 10_000_000;
pub const MUTATION_RATE: f64 = 2e-8;
pub const PLOIDY: usize = 2;

pub const PARAMETER_TABLE: &str = "SNI_ABC_posteriors_100.txt";
pub const RECOMBINATION_TABLE: &str = "Wong2010_dogRecRates_perbp.txt";

#[derive(Parser, Debug)]
#[command(about = "Simulate San Nicolas island fox genomes for heterozygosity peak analysis")]
pub struct DriverParams {
    #[arg(long = "params", default_value = PARAMETER_TABLE)]
    pub parameter_table: PathBuf,
    #[arg(long = "recrates", default_value = RECOMBINATION_TABLE)]
    pub recombination_table: PathBuf,
    #[arg(short, long = "outdir", default_value = ".")]
    pub output_root: PathBuf,
    #[arg(short, long, default_value = "1")]
    pub first: u32,
    #[arg(short, long = "nsims", default_value = "10")]
    pub num_simulations: u32,
}

/// Per-segment constants shared by every run.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RunSettings {
    pub num_segments: u32,
    pub segment_length: i64,
    pub mutation_rate: f64,
    pub ploidy: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            num_segments: NUM_SEGMENTS,
            segment_length: SEGMENT_LENGTH,
            mutation_rate: MUTATION_RATE,
            ploidy: PLOIDY,
        }
    }
}

impl RunSettings {
    pub fn validate(self) -> Result<Self, SimError> {
        if self.num_segments == 0 || self.num_segments > 999 {
            return Err(SimError::InvalidParameter(format!(
                "number of segments must be in 1..=999, got {}",
                self.num_segments
            )));
        }
        if self.segment_length <= 0 {
            return Err(SimError::InvalidParameter(format!(
                "segment length must be positive, got {}",
                self.segment_length
            )));
        }
        if !self.mutation_rate.is_finite() || self.mutation_rate < 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "mutation rate must be finite and non-negative, got {}",
                self.mutation_rate
            )));
        }
        if self.ploidy == 0 {
            return Err(SimError::InvalidParameter("ploidy must be positive".into()));
        }
        Ok(self)
    }
}

/// One line of the posterior parameter table.
///
/// Field order in the table is `Ne4 T_offset Ne3 Ne1`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParameterSet {
    pub ne4: i64,
    pub t_offset: i64,
    pub ne3: i64,
    pub ne1: i64,
}

impl ParameterSet {
    /// Onset of the `Ne4` epoch, shifted to the year-2000 origin.
    pub fn t(&self) -> i64 {
        self.t_offset + TIME_SHIFT
    }
}

impl FromStr for ParameterSet {
    type Err = SimError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || SimError::MalformedLine {
            table: "parameter",
            line: line.to_string(),
        };
        let fields = line
            .split_whitespace()
            .map(|f| f.parse::<i64>().map_err(|_| malformed()))
            .collect::<Result<Vec<_>, _>>()?;
        match fields[..] {
            [ne4, t_offset, ne3, ne1] => Ok(Self {
                ne4,
                t_offset,
                ne3,
                ne1,
            }),
            _ => Err(malformed()),
        }
    }
}

pub fn parse_rate(line: &str) -> Result<f64, SimError> {
    match line.trim().parse::<f64>() {
        Ok(rate) if rate.is_finite() && rate >= 0.0 => Ok(rate),
        _ => Err(SimError::MalformedLine {
            table: "recombination rate",
            line: line.to_string(),
        }),
    }
}

/// Seed for one segment: the decimal simulation index followed by
/// the segment index padded to three digits.
pub fn segment_seed(sim: u32, segment: u32) -> u64 {
    // Same digits as concatenating the strings, as long as
    // segment < 1000.
    u64::from(sim) * 1000 + u64::from(segment)
}

pub fn run_directory_name(sim: u32) -> String {
    format!("sim{sim:04}")
}

pub fn log_file_name(sim: u32) -> String {
    format!("peak_sim{sim}.log")
}

pub fn vcf_file_name(seed: u64) -> String {
    format!("peak_sim{seed}.vcf")
}
