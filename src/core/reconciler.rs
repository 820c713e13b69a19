use crate::{core::sample::Sample, quantity::energy::KilowattHours};

/// Turns consecutive samples of one series into per-interval energy deltas.
///
/// The same reconciler serves a whole history and a single new sample alike:
/// it only remembers what it last saw.
#[must_use]
#[derive(Copy, Clone, Debug, Default)]
pub struct Reconciler {
    last_state: Option<KilowattHours>,
    last_sum: Option<KilowattHours>,
}

impl Reconciler {
    /// Consume the next sample and return the energy delta since the previous one.
    ///
    /// The meter state difference takes precedence over the recorder sum difference,
    /// since the sum may have been reset or interpolated over a gap.
    /// Decreases are read as a meter reset and yield zero.
    pub fn delta(&mut self, sample: &Sample) -> KilowattHours {
        let sum = sample.cumulative_sum();
        let state = sample.state();

        let delta = match (state, self.last_state, self.last_sum) {
            (Some(state), Some(last_state), _) => state - last_state,
            (_, _, Some(last_sum)) => sum - last_sum,
            _ => KilowattHours::ZERO,
        };

        if state.is_some() {
            self.last_state = state;
        }
        self.last_sum = Some(sum);

        delta.non_negative()
    }

    /// Last known meter reading.
    pub const fn last_state(&self) -> Option<KilowattHours> {
        self.last_state
    }
}
