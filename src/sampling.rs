/// A haploid sample taken at `time` generations before present.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SampleSpec {
    pub population: usize,
    pub time: f64,
}

impl SampleSpec {
    pub fn new(population: usize, time: f64) -> Self {
        Self { population, time }
    }
}

/// One fox from 1929 (time 71), two from 1988 (time 12)
/// and one from 2000 (time 0), two haplotypes each.
pub fn sni_sample_schedule() -> Vec<SampleSpec> {
    [71., 71., 12., 12., 12., 12., 0., 0.]
        .into_iter()
        .map(|time| SampleSpec::new(0, time))
        .collect()
}
