use std::fmt;
use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::leiden::Partition;

/// Anything that can split a graph into communities at a given resolution.
pub trait Partitioner {
    fn partition(&self, resolution: f64, use_weights: bool) -> Result<Partition>;
}

/// A maximal run of resolutions over which the community count held.
///
/// Every interval is half-open `[start, end)` except the final one of a
/// sweep, which also contains `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionInterval {
    pub start: f64,
    pub end: f64,
    pub end_inclusive: bool,
    pub communities: usize,
}

impl fmt::Display for ResolutionInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let close = if self.end_inclusive { ']' } else { ')' };
        write!(
            f,
            "Resolution interval: [{}, {}{}, Communities: {}",
            self.start, self.end, close, self.communities
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SweepState {
    AwaitingFirstSample,
    Tracking { start: f64, count: usize },
}

impl SweepState {
    fn observe(self, resolution: f64, count: usize) -> (SweepState, Option<ResolutionInterval>) {
        match self {
            SweepState::AwaitingFirstSample => (
                SweepState::Tracking {
                    start: resolution,
                    count,
                },
                None,
            ),
            SweepState::Tracking { start, count: held } if held != count => (
                SweepState::Tracking {
                    start: resolution,
                    count,
                },
                Some(ResolutionInterval {
                    start,
                    end: resolution,
                    end_inclusive: false,
                    communities: held,
                }),
            ),
            tracking => (tracking, None),
        }
    }

    fn finish(self, last: f64) -> Option<ResolutionInterval> {
        match self {
            SweepState::AwaitingFirstSample => None,
            SweepState::Tracking { start, count } => Some(ResolutionInterval {
                start,
                end: last,
                end_inclusive: true,
                communities: count,
            }),
        }
    }
}

/// Lazy resolution sweep. Yields intervals as soon as the count changes.
///
/// A partitioner error is yielded once and ends the sweep.
pub struct Sweep<'a, P: ?Sized> {
    partitioner: &'a P,
    resolutions: &'a [f64],
    use_weights: bool,
    next: usize,
    state: SweepState,
    done: bool,
}

impl<P: Partitioner + ?Sized> Iterator for Sweep<'_, P> {
    type Item = Result<ResolutionInterval>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while let Some(&resolution) = self.resolutions.get(self.next) {
            self.next += 1;
            let count = match self.partitioner.partition(resolution, self.use_weights) {
                Ok(partition) => partition.community_count(),
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            debug!(resolution, communities = count, "sample");

            let (state, emitted) = self.state.observe(resolution, count);
            self.state = state;
            if let Some(interval) = emitted {
                return Some(Ok(interval));
            }
        }

        self.done = true;
        let last = *self.resolutions.last()?;
        self.state.finish(last).map(Ok)
    }
}

impl<P: Partitioner + ?Sized> FusedIterator for Sweep<'_, P> {}

/// Start a sweep over `resolutions`, which must be non-empty, finite and
/// strictly increasing.
pub fn sweep<'a, P: Partitioner + ?Sized>(
    partitioner: &'a P,
    resolutions: &'a [f64],
    use_weights: bool,
) -> Result<Sweep<'a, P>> {
    validate_resolutions(resolutions)?;
    info!(
        samples = resolutions.len(),
        first = resolutions[0],
        last = resolutions[resolutions.len() - 1],
        use_weights,
        "starting resolution sweep"
    );
    Ok(Sweep {
        partitioner,
        resolutions,
        use_weights,
        next: 0,
        state: SweepState::AwaitingFirstSample,
        done: false,
    })
}

/// Run the whole sweep and collect the intervals.
pub fn sweep_and_report<P: Partitioner + ?Sized>(
    partitioner: &P,
    resolutions: &[f64],
    use_weights: bool,
) -> Result<Vec<ResolutionInterval>> {
    sweep(partitioner, resolutions, use_weights)?.collect()
}

pub fn validate_resolutions(resolutions: &[f64]) -> Result<()> {
    if resolutions.is_empty() {
        return Err(Error::EmptySweep);
    }
    if let Some(index) = resolutions.iter().position(|r| !r.is_finite()) {
        return Err(Error::UnorderedResolutions { index });
    }
    if let Some(index) = resolutions.windows(2).position(|pair| pair[1] <= pair[0]) {
        return Err(Error::UnorderedResolutions { index: index + 1 });
    }
    Ok(())
}

/// Fixed-step grid `i / scale` for `i` in `start..end`.
///
/// Dividing integers keeps every sample exact to print, e.g. `0.0003` rather
/// than an accumulated `0.00030000000000000003`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionGrid {
    pub start: u32,
    pub end: u32,
    pub scale: f64,
}

impl Default for ResolutionGrid {
    fn default() -> Self {
        ResolutionGrid {
            start: 1,
            end: 100,
            scale: 10000.0,
        }
    }
}

impl ResolutionGrid {
    pub fn resolutions(&self) -> Result<Vec<f64>> {
        if self.end <= self.start {
            return Err(Error::InvalidGrid("end must be greater than start"));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(Error::InvalidGrid("scale must be positive"));
        }
        Ok((self.start..self.end)
            .map(|i| f64::from(i) / self.scale)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Replays a fixed list of community counts, one per call.
    struct Scripted {
        counts: Vec<usize>,
        fail_at: Option<usize>,
        calls: Cell<usize>,
    }

    impl Scripted {
        fn new(counts: &[usize]) -> Self {
            Scripted {
                counts: counts.to_vec(),
                fail_at: None,
                calls: Cell::new(0),
            }
        }

        fn failing_at(mut self, call: usize) -> Self {
            self.fail_at = Some(call);
            self
        }
    }

    impl Partitioner for Scripted {
        fn partition(&self, resolution: f64, _use_weights: bool) -> Result<Partition> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if self.fail_at == Some(call) {
                return Err(Error::InvalidResolution(resolution));
            }
            Ok(Partition::from_membership((0..self.counts[call]).collect()))
        }
    }

    fn grid(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64 / 10.0).collect()
    }

    #[test]
    fn test_count_change_splits_interval() {
        let partitioner = Scripted::new(&[2, 2, 3]);
        let intervals = sweep_and_report(&partitioner, &[0.1, 0.2, 0.3], true).unwrap();

        assert_eq!(
            intervals,
            vec![
                ResolutionInterval {
                    start: 0.1,
                    end: 0.3,
                    end_inclusive: false,
                    communities: 2
                },
                ResolutionInterval {
                    start: 0.3,
                    end: 0.3,
                    end_inclusive: true,
                    communities: 3
                },
            ]
        );
        assert_eq!(
            intervals[0].to_string(),
            "Resolution interval: [0.1, 0.3), Communities: 2"
        );
        assert_eq!(
            intervals[1].to_string(),
            "Resolution interval: [0.3, 0.3], Communities: 3"
        );
    }

    #[test]
    fn test_single_sample() {
        let partitioner = Scripted::new(&[4]);
        let intervals = sweep_and_report(&partitioner, &[0.5], false).unwrap();

        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start, 0.5);
        assert_eq!(intervals[0].end, 0.5);
        assert!(intervals[0].end_inclusive);
        assert_eq!(intervals[0].communities, 4);
    }

    #[test]
    fn test_constant_count_is_one_interval() {
        let partitioner = Scripted::new(&[1; 6]);
        let resolutions = grid(6);
        let intervals = sweep_and_report(&partitioner, &resolutions, true).unwrap();

        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start, resolutions[0]);
        assert_eq!(intervals[0].end, resolutions[5]);
        assert!(intervals[0].end_inclusive);
    }

    #[test]
    fn test_intervals_cover_sweep() {
        let patterns: [&[usize]; 5] = [
            &[1, 2, 3, 4, 5],
            &[3, 3, 1, 1, 3, 3],
            &[1, 1, 1, 2],
            &[2, 1, 1, 1],
            &[5, 4, 5, 4, 5, 4, 5],
        ];

        for counts in patterns {
            let resolutions = grid(counts.len());
            let partitioner = Scripted::new(counts);
            let intervals = sweep_and_report(&partitioner, &resolutions, true).unwrap();

            let changes = counts.windows(2).filter(|w| w[0] != w[1]).count();
            assert_eq!(intervals.len(), 1 + changes, "counts {counts:?}");

            assert_eq!(intervals[0].start, resolutions[0]);
            let last = intervals.last().unwrap();
            assert_eq!(last.end, *resolutions.last().unwrap());
            assert!(last.end_inclusive);
            for pair in intervals.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
                assert!(!pair[0].end_inclusive);
                assert_ne!(pair[0].communities, pair[1].communities);
            }
        }
    }

    #[test]
    fn test_error_stops_sweep() {
        let partitioner = Scripted::new(&[1, 2, 2, 2]).failing_at(2);
        let resolutions = grid(4);
        let mut iter = sweep(&partitioner, &resolutions, true).unwrap();

        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.communities, 1);
        assert!(matches!(
            iter.next(),
            Some(Err(Error::InvalidResolution(_)))
        ));
        assert!(iter.next().is_none());
        assert_eq!(partitioner.calls.get(), 3);

        let partitioner = Scripted::new(&[1, 2]).failing_at(1);
        assert!(sweep_and_report(&partitioner, &grid(2), true).is_err());
    }

    #[test]
    fn test_sweep_is_lazy() {
        let partitioner = Scripted::new(&[1, 2, 3]);
        let resolutions = grid(3);
        let mut iter = sweep(&partitioner, &resolutions, true).unwrap();
        assert_eq!(partitioner.calls.get(), 0);

        iter.next();
        assert_eq!(partitioner.calls.get(), 2);
    }

    #[test]
    fn test_rejects_bad_resolutions() {
        let partitioner = Scripted::new(&[1, 1, 1]);

        assert!(matches!(
            sweep(&partitioner, &[], true).err(),
            Some(Error::EmptySweep)
        ));
        assert!(matches!(
            sweep(&partitioner, &[0.1, 0.3, 0.2], true).err(),
            Some(Error::UnorderedResolutions { index: 2 })
        ));
        assert!(matches!(
            sweep(&partitioner, &[0.1, 0.1], true).err(),
            Some(Error::UnorderedResolutions { index: 1 })
        ));
        assert!(matches!(
            sweep(&partitioner, &[0.1, f64::NAN], true).err(),
            Some(Error::UnorderedResolutions { index: 1 })
        ));
        assert_eq!(partitioner.calls.get(), 0);
    }

    #[test]
    fn test_default_grid() {
        let resolutions = ResolutionGrid::default().resolutions().unwrap();

        assert_eq!(resolutions.len(), 99);
        assert_eq!(resolutions[0], 0.0001);
        assert_eq!(resolutions[2].to_string(), "0.0003");
        assert_eq!(resolutions[98], 0.0099);
        assert!(validate_resolutions(&resolutions).is_ok());
    }

    #[test]
    fn test_invalid_grid() {
        let empty = ResolutionGrid {
            start: 5,
            end: 5,
            scale: 10.0,
        };
        assert!(matches!(empty.resolutions(), Err(Error::InvalidGrid(_))));

        let zero_scale = ResolutionGrid {
            start: 1,
            end: 5,
            scale: 0.0,
        };
        assert!(matches!(zero_scale.resolutions(), Err(Error::InvalidGrid(_))));
    }
}
