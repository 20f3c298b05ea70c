//! Neutral coalescent simulations of San Nicolas island fox
//! genomes, used to calibrate analyses of heterozygosity peaks.
//!
//! Each run draws one demographic parameter set from a table of
//! posterior samples and simulates 220 independent 10 Mb segments
//! under a four-epoch size history, writing one VCF per segment
//! and a log of what was drawn.

pub mod coalescent;
pub mod common;
pub mod demography;
pub mod error;
pub mod input;
pub mod run;
pub mod sampling;
pub mod segment;
pub mod vcf;

pub use coalescent::{CoalescentEngine, HudsonEngine};
pub use common::{DriverParams, ParameterSet, RunSettings};
pub use error::SimError;
pub use input::InputTables;
pub use run::{run_batch, run_simulation, RunSummary};
