//! Coalescent with recombination for a single population,
//! simulated backwards in time (Hudson's algorithm).
//!
//! Each lineage carries the ancestral material it holds as a
//! sorted list of half-open intervals. Every interval records
//! which samples descend from it (a bit mask, so at most 64
//! samples) and when the node above those samples was born.
//! When two intervals meet in a coalescence the branches below
//! end, mutations are thrown down on them, and the merged
//! interval starts a new branch. An interval whose mask holds
//! every sample has found its MRCA and is dropped.

use forrustts::Position;
use rand::prelude::Rng;
use rand::SeedableRng;
use tracing::debug;

use crate::demography::DemographicHistory;
use crate::error::SimError;
use crate::sampling::SampleSpec;

pub const MAX_SAMPLES: usize = 64;

/// Everything the engine needs for one segment.
#[derive(Copy, Clone, Debug)]
pub struct SegmentSpec<'a> {
    pub history: &'a DemographicHistory,
    pub samples: &'a [SampleSpec],
    pub sequence_length: i64,
    /// Per base, per generation.
    pub recombination_rate: f64,
    /// Per base, per generation.
    pub mutation_rate: f64,
    pub seed: u64,
}

impl SegmentSpec<'_> {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.sequence_length <= 0 {
            return Err(SimError::InvalidParameter(format!(
                "sequence length must be positive, got {}",
                self.sequence_length
            )));
        }
        for (name, rate) in [
            ("recombination", self.recombination_rate),
            ("mutation", self.mutation_rate),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(SimError::InvalidParameter(format!(
                    "{name} rate must be finite and non-negative, got {rate}"
                )));
            }
        }
        if self.samples.len() < 2 || self.samples.len() > MAX_SAMPLES {
            return Err(SimError::InvalidParameter(format!(
                "need between 2 and {MAX_SAMPLES} samples, got {}",
                self.samples.len()
            )));
        }
        for s in self.samples {
            if s.population != 0 {
                return Err(SimError::InvalidParameter(format!(
                    "only population 0 exists, sample requested from population {}",
                    s.population
                )));
            }
            if !s.time.is_finite() || s.time < 0.0 {
                return Err(SimError::InvalidParameter(format!(
                    "sample time must be finite and non-negative, got {}",
                    s.time
                )));
            }
        }
        Ok(())
    }
}

/// A segregating site. Bit `i` of `genotypes` is set when
/// sample `i` carries the derived allele.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Site {
    pub position: Position,
    pub genotypes: u64,
}

impl Site {
    pub fn carries_derived(&self, sample: usize) -> bool {
        (self.genotypes >> sample) & 1 == 1
    }
}

/// Engine output for one segment, sites sorted by position.
#[derive(Clone, Debug, PartialEq)]
pub struct Variants {
    sequence_length: i64,
    num_samples: usize,
    sites: Vec<Site>,
}

impl Variants {
    pub fn new(sequence_length: i64, num_samples: usize, mut sites: Vec<Site>) -> Self {
        sites.sort_by(|a, b| a.position.cmp(&b.position));
        Self {
            sequence_length,
            num_samples,
            sites,
        }
    }

    pub fn sequence_length(&self) -> i64 {
        self.sequence_length
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }
}

pub trait CoalescentEngine {
    fn simulate(&self, spec: &SegmentSpec) -> Result<Variants, SimError>;
}

/// Exact coalescent with recombination and infinite-sites
/// mutation, seeded per segment.
#[derive(Copy, Clone, Debug, Default)]
pub struct HudsonEngine;

impl CoalescentEngine for HudsonEngine {
    fn simulate(&self, spec: &SegmentSpec) -> Result<Variants, SimError> {
        spec.validate()?;
        Simulator::new(spec).run()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct AncestralSegment {
    left: i64,
    right: i64,
    samples: u64,
    born: f64,
}

#[derive(Debug, Default)]
struct Lineage {
    segments: Vec<AncestralSegment>,
}

impl Lineage {
    /// Number of places a crossover can separate this
    /// lineage's material.
    fn links(&self) -> i64 {
        match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => last.right - first.left - 1,
            _ => 0,
        }
    }

    /// Keep material left of `breakpoint`, return the rest.
    fn split_off(&mut self, breakpoint: i64) -> Lineage {
        let at = self.segments.partition_point(|s| s.right <= breakpoint);
        let mut right = self.segments.split_off(at);
        if let Some(first) = right.first_mut() {
            if first.left < breakpoint {
                let mut left_part = *first;
                left_part.right = breakpoint;
                first.left = breakpoint;
                self.segments.push(left_part);
            }
        }
        Lineage { segments: right }
    }
}

// Adjacent pieces of the same branch are joined
fn push_squashed(segments: &mut Vec<AncestralSegment>, segment: AncestralSegment) {
    if let Some(last) = segments.last_mut() {
        if last.right == segment.left
            && last.samples == segment.samples
            && last.born == segment.born
        {
            last.right = segment.right;
            return;
        }
    }
    segments.push(segment);
}

struct Simulator<'a> {
    spec: &'a SegmentSpec<'a>,
    rng: rand::rngs::StdRng,
    // (time, sample index), sorted by time
    pending: Vec<(f64, usize)>,
    next_pending: usize,
    lineages: Vec<Lineage>,
    all_samples: u64,
    sites: Vec<Site>,
    time: f64,
    num_coalescences: u64,
    num_recombinations: u64,
}

impl<'a> Simulator<'a> {
    fn new(spec: &'a SegmentSpec<'a>) -> Self {
        let mut pending = spec
            .samples
            .iter()
            .enumerate()
            .map(|(index, s)| (s.time, index))
            .collect::<Vec<_>>();
        pending.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let all_samples = if spec.samples.len() == MAX_SAMPLES {
            u64::MAX
        } else {
            (1_u64 << spec.samples.len()) - 1
        };
        Self {
            spec,
            rng: rand::rngs::StdRng::seed_from_u64(spec.seed),
            pending,
            next_pending: 0,
            lineages: vec![],
            all_samples,
            sites: vec![],
            time: 0.0,
            num_coalescences: 0,
            num_recombinations: 0,
        }
    }

    fn add_samples_up_to(&mut self, time: f64) {
        while let Some(&(t, index)) = self.pending.get(self.next_pending) {
            if t > time {
                break;
            }
            self.lineages.push(Lineage {
                segments: vec![AncestralSegment {
                    left: 0,
                    right: self.spec.sequence_length,
                    samples: 1 << index,
                    born: t,
                }],
            });
            self.next_pending += 1;
        }
    }

    fn next_interruption(&self) -> Option<f64> {
        let sample_time = self.pending.get(self.next_pending).map(|p| p.0);
        let size_change = self.spec.history.next_change_after(self.time);
        match (sample_time, size_change) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn run(mut self) -> Result<Variants, SimError> {
        self.add_samples_up_to(self.time);
        while !self.lineages.is_empty() || self.next_pending < self.pending.len() {
            let k = self.lineages.len() as f64;
            let size = self.spec.history.size_at(self.time);
            let coalescence_rate = k * (k - 1.0) / 2.0 / (2.0 * size);
            let links: i64 = self.lineages.iter().map(Lineage::links).sum();
            let recombination_rate = self.spec.recombination_rate * links as f64;
            let total_rate = coalescence_rate + recombination_rate;

            let waiting_time = if total_rate > 0.0 {
                let exp = rand_distr::Exp::new(total_rate)
                    .map_err(|e| SimError::InvalidParameter(format!("event rate: {e}")))?;
                self.rng.sample(exp)
            } else {
                f64::INFINITY
            };

            match self.next_interruption() {
                Some(t) if self.time + waiting_time >= t => {
                    self.time = t;
                    self.add_samples_up_to(t);
                    continue;
                }
                None if !waiting_time.is_finite() => {
                    return Err(SimError::InvalidParameter(format!(
                        "coalescent process stalled at time {} with {} lineages",
                        self.time,
                        self.lineages.len()
                    )));
                }
                _ => (),
            }

            self.time += waiting_time;
            if self.rng.gen::<f64>() * total_rate < recombination_rate {
                self.recombine(links)?;
            } else {
                self.coalesce();
            }
        }
        debug!(
            seed = self.spec.seed,
            tmrca = self.time,
            coalescences = self.num_coalescences,
            recombinations = self.num_recombinations,
            sites = self.sites.len(),
            "segment simulated"
        );
        Ok(Variants::new(
            self.spec.sequence_length,
            self.spec.samples.len(),
            self.sites,
        ))
    }

    fn recombine(&mut self, total_links: i64) -> Result<(), SimError> {
        let mut choice = self.rng.gen_range(0..total_links);
        let index = self
            .lineages
            .iter()
            .position(|lineage| {
                let n = lineage.links();
                if choice < n {
                    true
                } else {
                    choice -= n;
                    false
                }
            })
            .ok_or_else(|| {
                SimError::InvalidParameter("recombination link out of range".to_string())
            })?;
        let lineage = &mut self.lineages[index];
        let breakpoint = lineage.segments[0].left + 1 + choice;
        let right = lineage.split_off(breakpoint);
        self.lineages.push(right);
        self.num_recombinations += 1;
        Ok(())
    }

    fn coalesce(&mut self) {
        let k = self.lineages.len();
        let i = self.rng.gen_range(0..k);
        let mut j = self.rng.gen_range(0..k - 1);
        if j >= i {
            j += 1;
        }
        // Remove the higher index first so the lower one stays put
        let a = self.lineages.swap_remove(i.max(j));
        let b = self.lineages.swap_remove(i.min(j));
        let merged = self.merge(a.segments, b.segments);
        if !merged.is_empty() {
            self.lineages.push(Lineage { segments: merged });
        }
        self.num_coalescences += 1;
    }

    fn merge(
        &mut self,
        first: Vec<AncestralSegment>,
        second: Vec<AncestralSegment>,
    ) -> Vec<AncestralSegment> {
        let mut rv = Vec::with_capacity(first.len() + second.len());
        let mut first = first.into_iter();
        let mut second = second.into_iter();
        let mut x = first.next();
        let mut y = second.next();
        loop {
            let (mut sx, mut sy) = match (x, y) {
                (Some(sx), Some(sy)) => (sx, sy),
                _ => break,
            };
            if sx.right <= sy.left {
                push_squashed(&mut rv, sx);
                x = first.next();
                continue;
            }
            if sy.right <= sx.left {
                push_squashed(&mut rv, sy);
                y = second.next();
                continue;
            }
            // Overlap. Material held by only one lineage passes
            // through unchanged.
            if sx.left < sy.left {
                push_squashed(&mut rv, AncestralSegment { right: sy.left, ..sx });
                sx.left = sy.left;
            } else if sy.left < sx.left {
                push_squashed(&mut rv, AncestralSegment { right: sx.left, ..sy });
                sy.left = sx.left;
            }
            let left = sx.left;
            let right = sx.right.min(sy.right);
            self.end_branch(AncestralSegment { right, ..sx });
            self.end_branch(AncestralSegment { right, ..sy });
            let samples = sx.samples | sy.samples;
            if samples != self.all_samples {
                push_squashed(
                    &mut rv,
                    AncestralSegment {
                        left,
                        right,
                        samples,
                        born: self.time,
                    },
                );
            }
            if sx.right == right {
                x = first.next();
            } else {
                sx.left = right;
                x = Some(sx);
            }
            if sy.right == right {
                y = second.next();
            } else {
                sy.left = right;
                y = Some(sy);
            }
        }
        if let Some(sx) = x {
            push_squashed(&mut rv, sx);
        }
        if let Some(sy) = y {
            push_squashed(&mut rv, sy);
        }
        first.chain(second).for_each(|s| push_squashed(&mut rv, s));
        rv
    }

    /// Throw mutations on the branch above `segment`,
    /// which ends now.
    fn end_branch(&mut self, segment: AncestralSegment) {
        let span = (segment.right - segment.left) as f64;
        let mean = self.spec.mutation_rate * span * (self.time - segment.born);
        if mean <= 0.0 {
            return;
        }
        let num_mutations = match rand_distr::Poisson::<f64>::new(mean) {
            Ok(poisson) => self.rng.sample(poisson) as u64,
            Err(_) => return,
        };
        if num_mutations == 0 {
            return;
        }
        let position_generator = rand::distributions::Uniform::<Position>::new(
            Position::new_valid(segment.left),
            Position::new_valid(segment.right),
        );
        for _ in 0..num_mutations {
            self.sites.push(Site {
                position: self.rng.sample(position_generator),
                genotypes: segment.samples,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::demography::Epoch;
    use crate::sampling::sni_sample_schedule;

    fn constant_history(size: f64) -> DemographicHistory {
        DemographicHistory::new(size, vec![]).unwrap()
    }

    fn modern_samples(n: usize) -> Vec<SampleSpec> {
        (0..n).map(|_| SampleSpec::new(0, 0.)).collect()
    }

    #[test]
    fn test_split_off_inside_segment() {
        let mut lineage = Lineage {
            segments: vec![AncestralSegment {
                left: 0,
                right: 100,
                samples: 1,
                born: 0.,
            }],
        };
        assert_eq!(lineage.links(), 99);
        let right = lineage.split_off(40);
        assert_eq!(lineage.segments.len(), 1);
        assert_eq!(lineage.segments[0].right, 40);
        assert_eq!(right.segments[0].left, 40);
        assert_eq!(right.segments[0].right, 100);
    }

    #[test]
    fn test_split_off_in_gap() {
        let seg = |left, right| AncestralSegment {
            left,
            right,
            samples: 3,
            born: 1.,
        };
        let mut lineage = Lineage {
            segments: vec![seg(0, 10), seg(20, 30)],
        };
        let right = lineage.split_off(15);
        assert_eq!(lineage.segments, vec![seg(0, 10)]);
        assert_eq!(right.segments, vec![seg(20, 30)]);
    }

    #[test]
    fn test_merge_retires_mrca_intervals() {
        let history = constant_history(100.);
        let samples = modern_samples(2);
        let spec = SegmentSpec {
            history: &history,
            samples: &samples,
            sequence_length: 100,
            recombination_rate: 0.,
            mutation_rate: 0.,
            seed: 1,
        };
        let mut sim = Simulator::new(&spec);
        sim.time = 5.;
        let a = vec![AncestralSegment {
            left: 0,
            right: 60,
            samples: 1,
            born: 0.,
        }];
        let b = vec![AncestralSegment {
            left: 40,
            right: 100,
            samples: 2,
            born: 0.,
        }];
        let merged = sim.merge(a, b);
        // [40, 60) found its MRCA
        assert_eq!(
            merged,
            vec![
                AncestralSegment {
                    left: 0,
                    right: 40,
                    samples: 1,
                    born: 0.
                },
                AncestralSegment {
                    left: 60,
                    right: 100,
                    samples: 2,
                    born: 0.
                }
            ]
        );
    }

    #[test]
    fn test_invalid_specs() {
        let history = constant_history(100.);
        let samples = modern_samples(2);
        let good = SegmentSpec {
            history: &history,
            samples: &samples,
            sequence_length: 1000,
            recombination_rate: 1e-8,
            mutation_rate: 1e-8,
            seed: 1,
        };
        assert!(good.validate().is_ok());
        assert!(SegmentSpec {
            sequence_length: 0,
            ..good
        }
        .validate()
        .is_err());
        assert!(SegmentSpec {
            recombination_rate: -1.,
            ..good
        }
        .validate()
        .is_err());
        assert!(SegmentSpec {
            mutation_rate: f64::INFINITY,
            ..good
        }
        .validate()
        .is_err());
        let one = modern_samples(1);
        assert!(SegmentSpec {
            samples: &one,
            ..good
        }
        .validate()
        .is_err());
        let many = modern_samples(65);
        assert!(HudsonEngine
            .simulate(&SegmentSpec {
                samples: &many,
                ..good
            })
            .is_err());
    }

    #[test]
    fn test_no_mutation_no_sites() {
        let history = constant_history(1000.);
        let samples = modern_samples(8);
        let spec = SegmentSpec {
            history: &history,
            samples: &samples,
            sequence_length: 100_000,
            recombination_rate: 1e-8,
            mutation_rate: 0.,
            seed: 42,
        };
        let variants = HudsonEngine.simulate(&spec).unwrap();
        assert!(variants.sites().is_empty());
        assert_eq!(variants.num_samples(), 8);
    }

    #[test]
    fn test_same_seed_same_output() {
        let history = DemographicHistory::new(
            1000.,
            vec![Epoch::new(40., 10.), Epoch::new(42., 500.), Epoch::new(100., 2000.)],
        )
        .unwrap();
        let samples = sni_sample_schedule();
        let spec = SegmentSpec {
            history: &history,
            samples: &samples,
            sequence_length: 200_000,
            recombination_rate: 1e-8,
            mutation_rate: 2e-8,
            seed: 3001,
        };
        let a = HudsonEngine.simulate(&spec).unwrap();
        let b = HudsonEngine.simulate(&spec).unwrap();
        assert_eq!(a, b);
        let c = HudsonEngine
            .simulate(&SegmentSpec { seed: 3002, ..spec })
            .unwrap();
        assert_ne!(a, c);
    }

    // Expected pairwise diversity for two modern samples in a
    // constant population is 4 N mu per base.
    #[test]
    fn test_diversity_matches_theory() {
        let history = constant_history(1000.);
        let samples = modern_samples(2);
        let length = 100_000;
        let mutation_rate = 1e-7;
        let mut total = 0;
        let reps = 200;
        for seed in 0..reps {
            let spec = SegmentSpec {
                history: &history,
                samples: &samples,
                sequence_length: length,
                recombination_rate: 1e-8,
                mutation_rate,
                seed,
            };
            total += HudsonEngine.simulate(&spec).unwrap().sites().len();
        }
        let observed = total as f64 / reps as f64;
        let expected = 4.0 * 1000.0 * mutation_rate * length as f64;
        assert!(
            (observed - expected).abs() < 0.25 * expected,
            "{observed} vs {expected}"
        );
    }

    proptest! {
        #[test]
        fn sites_are_polymorphic_and_sorted(seed in 0..u64::MAX) {
            let history = DemographicHistory::new(
                500.,
                vec![Epoch::new(40., 10.), Epoch::new(42., 300.), Epoch::new(80., 800.)],
            )
            .unwrap();
            let samples = sni_sample_schedule();
            let spec = SegmentSpec {
                history: &history,
                samples: &samples,
                sequence_length: 50_000,
                recombination_rate: 1e-7,
                mutation_rate: 1e-7,
                seed,
            };
            let variants = HudsonEngine.simulate(&spec).unwrap();
            let all = (1_u64 << samples.len()) - 1;
            for site in variants.sites() {
                prop_assert!(site.genotypes != 0);
                prop_assert!(site.genotypes != all);
                let x: i64 = site.position.into();
                prop_assert!((0..50_000).contains(&x));
            }
            prop_assert!(variants
                .sites()
                .windows(2)
                .all(|w| w[0].position <= w[1].position));
        }
    }

    proptest! {
        #[test]
        #[ignore]
        fn full_length_segments_complete(seed in 0..u64::MAX) {
            let params = crate::common::ParameterSet {
                ne4: 5000,
                t_offset: 50,
                ne3: 8000,
                ne1: 15000,
            };
            let history = DemographicHistory::san_nicolas(&params).unwrap();
            let samples = sni_sample_schedule();
            let spec = SegmentSpec {
                history: &history,
                samples: &samples,
                sequence_length: crate::common::SEGMENT_LENGTH,
                recombination_rate: 1.5e-8,
                mutation_rate: crate::common::MUTATION_RATE,
                seed,
            };
            let _ = HudsonEngine.simulate(&spec).unwrap();
        }
    }
}
