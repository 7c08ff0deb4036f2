//! One-sided power spectrum and spectral peak picking.
//!
//! ```text
//!  power
//!    │  ▲ DC         ▲ fundamental (bin 1)
//!    │  │            │
//!    │  │            │      ▲ harmonics (bins 2..10)
//!    │  │            │   ▲  │  ▲
//!    └──┴────────────┴───┴──┴──┴──────────── bin
//! ```

use rustfft::{num_complex::Complex64, Fft, FftPlanner};

/// Relative magnitude below which a bin is treated as FFT rounding residue.
const RESIDUE_FLOOR: f64 = 1e-9;

/// Normalized one-sided magnitude spectrum: `2/N * |X[k]|` for
/// `k in 0..N/2`. Bins that are only floating-point residue are zeroed.
pub fn power_spectrum(samples: &[f64]) -> Vec<f64> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer: Vec<Complex64> = samples.iter().map(|&x| Complex64::new(x, 0.0)).collect();
    fft.process(&mut buffer);

    let peak_abs = samples.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
    let floor = RESIDUE_FLOOR * (1.0 + peak_abs);
    let scale = 2.0 / n as f64;

    buffer[..n / 2]
        .iter()
        .map(|c| {
            let p = c.norm() * scale;
            if p <= floor {
                0.0
            } else {
                p
            }
        })
        .collect()
}

/// Indices of local maxima of `x`. Flat peaks report their middle index
/// (rounded down); the first and last samples are never peaks.
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

/// Find peaks in `x` strictly higher than `height` and at least `distance`
/// bins apart. When two candidates are too close the taller one wins;
/// equal heights keep the lower bin. Result is in ascending bin order.
pub fn find_peaks(x: &[f64], height: f64, distance: usize) -> Vec<usize> {
    let candidates: Vec<usize> = local_maxima(x).into_iter().filter(|&i| x[i] > height).collect();
    if distance <= 1 {
        return candidates;
    }

    let mut by_priority = candidates.clone();
    by_priority.sort_by(|&a, &b| x[b].total_cmp(&x[a]).then(a.cmp(&b)));

    let mut kept: Vec<usize> = Vec::new();
    for idx in by_priority {
        if kept.iter().all(|&k| k.abs_diff(idx) >= distance) {
            kept.push(idx);
        }
    }
    kept.sort_unstable();
    kept
}

/// The `limit` largest peaks as `(bin, magnitude)`, descending by magnitude,
/// lowest bin first on ties.
pub fn dominant_peaks(power: &[f64], peaks: &[usize], limit: usize) -> Vec<(usize, f64)> {
    let mut ranked: Vec<(usize, f64)> = peaks.iter().map(|&i| (i, power[i])).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Total harmonic distortion in percent, taking bin 1 as the fundamental and
/// bins 2..10 as its harmonics. 0 when there is no fundamental.
pub fn total_harmonic_distortion(power: &[f64]) -> f64 {
    let fundamental = if power.len() > 1 { power[1] } else { 0.0 };
    if fundamental <= 0.0 {
        return 0.0;
    }
    let upper = power.len().min(10);
    let harmonic_power: f64 = if upper > 2 {
        power[2..upper].iter().map(|p| p * p).sum()
    } else {
        0.0
    };
    harmonic_power.sqrt() / fundamental * 100.0
}
