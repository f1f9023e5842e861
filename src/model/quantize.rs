/// Canonical chord durations in beats, covering the common rhythmic values in the corpus.
pub const DURATION_GRID: [f64; 17] = [
    0.5, 0.67, 0.75, 1.0, 1.33, 1.5, 1.6, 2.0, 2.67, 3.0, 3.2, 4.0, 4.5, 4.8, 5.33, 6.0, 8.0,
];

pub const NUM_VELOCITY_BINS: u8 = 8;

/// Snaps a duration to the nearest grid value.
///
/// The grid is scanned in list order with a strict comparison, so an exact
/// midpoint resolves to whichever value appears first in the list. Non-positive
/// input maps to the smallest grid value. An empty grid passes the input through.
pub fn quantize_duration(beats: f64, grid: &[f64]) -> f64 {
    let Some(&first) = grid.first() else {
        return beats;
    };

    if beats <= 0.0 {
        return grid.iter().copied().fold(first, f64::min);
    }

    let mut best = first;
    let mut best_dist = (beats - first).abs();
    for &value in grid.iter().skip(1) {
        let dist = (beats - value).abs();
        if dist < best_dist {
            best = value;
            best_dist = dist;
        }
    }

    best
}

/// Maps a MIDI velocity onto bins `1..=bins`.
pub fn quantize_velocity(velocity: u8, bins: u8) -> u8 {
    if velocity == 0 || bins == 0 {
        return 1;
    }

    let bin = (velocity as f64 / 127.0 * bins as f64).ceil();
    bin.clamp(1.0, bins as f64) as u8
}

/// The representative MIDI velocity of a bin. Not an inverse of [`quantize_velocity`].
pub fn dequantize_velocity(bin: u8, bins: u8) -> u8 {
    if bins == 0 {
        return 127;
    }

    let velocity = (bin as f64 / bins as f64 * 127.0).round_ties_even();
    velocity.clamp(1.0, 127.0) as u8
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn grid_values_are_fixed_points() {
        for value in DURATION_GRID {
            assert_eq!(quantize_duration(value, &DURATION_GRID), value);
        }
    }

    #[test]
    fn duration_snaps_to_nearest() {
        assert_eq!(quantize_duration(0.98, &DURATION_GRID), 1.0);
        assert_eq!(quantize_duration(2.6, &DURATION_GRID), 2.67);
        assert_eq!(quantize_duration(7.1, &DURATION_GRID), 8.0);
        assert_eq!(quantize_duration(40.0, &DURATION_GRID), 8.0);
        assert_eq!(quantize_duration(0.1, &DURATION_GRID), 0.5);
    }

    #[test]
    fn non_positive_duration_maps_to_smallest() {
        assert_eq!(quantize_duration(0.0, &DURATION_GRID), 0.5);
        assert_eq!(quantize_duration(-3.0, &DURATION_GRID), 0.5);
        assert_eq!(quantize_duration(0.0, &[2.0, 1.0, 4.0]), 1.0);
    }

    #[test]
    fn midpoint_tie_goes_to_earlier_entry() {
        assert_eq!(quantize_duration(2.5, &[2.0, 3.0]), 2.0);
        assert_eq!(quantize_duration(2.5, &[3.0, 2.0]), 3.0);
    }

    #[test]
    fn velocity_bins() {
        assert_eq!(quantize_velocity(0, 8), 1);
        assert_eq!(quantize_velocity(1, 8), 1);
        assert_eq!(quantize_velocity(60, 8), 4);
        assert_eq!(quantize_velocity(70, 8), 5);
        assert_eq!(quantize_velocity(80, 8), 6);
        assert_eq!(quantize_velocity(90, 8), 6);
        assert_eq!(quantize_velocity(127, 8), 8);
        assert_eq!(quantize_velocity(255, 8), 8);
    }

    #[test]
    fn velocity_bins_monotonic() {
        let bins: Vec<u8> = (1..=127u8).map(|v| quantize_velocity(v, NUM_VELOCITY_BINS)).collect();
        assert!(bins.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(bins.first(), Some(&1));
        assert_eq!(bins.last(), Some(&NUM_VELOCITY_BINS));
    }

    #[test]
    fn velocity_representatives() {
        let reps: Vec<u8> = (1..=8u8).map(|b| dequantize_velocity(b, 8)).collect();
        assert_eq!(reps, vec![16, 32, 48, 64, 79, 95, 111, 127]);
        assert_eq!(dequantize_velocity(0, 8), 1);
        assert_eq!(dequantize_velocity(20, 8), 127);
    }
}
