//! Reading the parameter and recombination rate tables.

use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::common::{parse_rate, ParameterSet};
use crate::error::SimError;

/// Non-empty, trimmed lines of a text table, in file order.
///
/// Contents are not validated here.
pub fn read_table(path: &Path) -> Result<Vec<String>, SimError> {
    let text = std::fs::read_to_string(path).map_err(|source| SimError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// One draw from the recombination rate table.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawnRate<'a> {
    /// As written in the table, for the run log.
    pub text: &'a str,
    pub value: f64,
}

/// Both input tables, immutable once loaded.
#[derive(Clone, Debug)]
pub struct InputTables {
    parameters: Vec<String>,
    recombination_rates: Vec<String>,
}

impl InputTables {
    pub fn new(
        parameters: Vec<String>,
        recombination_rates: Vec<String>,
    ) -> Result<Self, SimError> {
        if parameters.is_empty() {
            return Err(SimError::NoRows { table: "parameter" });
        }
        if recombination_rates.is_empty() {
            return Err(SimError::NoRows {
                table: "recombination rate",
            });
        }
        Ok(Self {
            parameters,
            recombination_rates,
        })
    }

    /// Load the parameter table, then the rate table.
    pub fn load(parameter_path: &Path, recombination_path: &Path) -> Result<Self, SimError> {
        let parameters = read_table(parameter_path)?;
        if parameters.is_empty() {
            return Err(SimError::EmptyTable {
                path: parameter_path.to_path_buf(),
            });
        }
        let recombination_rates = read_table(recombination_path)?;
        if recombination_rates.is_empty() {
            return Err(SimError::EmptyTable {
                path: recombination_path.to_path_buf(),
            });
        }
        debug!(
            parameter_sets = parameters.len(),
            recombination_rates = recombination_rates.len(),
            "loaded input tables"
        );
        Ok(Self {
            parameters,
            recombination_rates,
        })
    }

    /// Uniform draw, with replacement, from the parameter table.
    pub fn draw_parameters<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ParameterSet, SimError> {
        // Non-empty by construction
        let line = self
            .parameters
            .choose(rng)
            .ok_or_else(|| SimError::InvalidParameter("empty parameter table".into()))?;
        line.parse()
    }

    /// Uniform draw, with replacement, from the rate table.
    pub fn draw_recombination_rate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<DrawnRate<'_>, SimError> {
        let line = self
            .recombination_rates
            .choose(rng)
            .ok_or_else(|| SimError::InvalidParameter("empty recombination rate table".into()))?;
        Ok(DrawnRate {
            text: line,
            value: parse_rate(line)?,
        })
    }
}
