// Polyphase sample-rate conversion for 16-bit PCM
//
// Each call is stateless: the frame is zero-padded at both edges, filtered
// with a Kaiser-windowed sinc low-pass, and the filter's group delay is
// removed so that output sample 0 lines up with input sample 0. The same
// bytes and rates always produce the same output bytes.

use crate::error::{RelayError, Result};

/// Kaiser window shape parameter
const KAISER_BETA: f64 = 5.0;

/// Filter half-length per unit of max(up, down)
const HALF_LEN_FACTOR: usize = 10;

/// Resample a buffer of s16le mono PCM from `source_rate` to `target_rate`.
///
/// The output holds `round(n * target_rate / source_rate)` samples, where `n`
/// is the input sample count. Odd-length buffers are rejected rather than
/// truncated.
pub fn resample(frame: &[u8], source_rate: u32, target_rate: u32) -> Result<Vec<u8>> {
    if frame.len() % 2 != 0 {
        return Err(RelayError::MalformedFrame(format!(
            "PCM frame has odd length {} (expected whole 16-bit samples)",
            frame.len()
        )));
    }
    if source_rate == 0 || target_rate == 0 {
        return Err(RelayError::MalformedFrame(format!(
            "invalid sample rates {} -> {}",
            source_rate, target_rate
        )));
    }
    if source_rate == target_rate || frame.is_empty() {
        return Ok(frame.to_vec());
    }

    let samples: Vec<f64> = frame
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f64 / 32768.0)
        .collect();

    let g = gcd(source_rate, target_rate);
    let up = (target_rate / g) as usize;
    let down = (source_rate / g) as usize;

    let resampled = PolyphaseFilter::new(up, down).apply(&samples);

    Ok(resampled
        .iter()
        .flat_map(|&v| {
            // Cast truncates toward zero after clamping into i16 range
            let s = (v * 32768.0).clamp(-32768.0, 32767.0) as i16;
            s.to_le_bytes()
        })
        .collect())
}

/// Number of output samples for `n` inputs, rounding halves up
pub fn output_len(n: usize, up: usize, down: usize) -> usize {
    (n * up * 2 + down) / (2 * down)
}

struct PolyphaseFilter {
    up: usize,
    down: usize,
    half_len: usize,
    taps: Vec<f64>,
}

impl PolyphaseFilter {
    fn new(up: usize, down: usize) -> Self {
        let max_rate = up.max(down);
        let half_len = HALF_LEN_FACTOR * max_rate;
        let n_taps = 2 * half_len + 1;
        let cutoff = 1.0 / max_rate as f64;
        let i0_beta = bessel_i0(KAISER_BETA);

        let mut taps: Vec<f64> = (0..n_taps)
            .map(|n| {
                let m = n as f64 - half_len as f64;
                let ratio = 2.0 * n as f64 / (n_taps - 1) as f64 - 1.0;
                let window = bessel_i0(KAISER_BETA * (1.0 - ratio * ratio).max(0.0).sqrt()) / i0_beta;
                cutoff * sinc(cutoff * m) * window
            })
            .collect();

        // Unit gain at DC, then compensate for the zeros inserted by upsampling
        let sum: f64 = taps.iter().sum();
        for t in taps.iter_mut() {
            *t = *t / sum * up as f64;
        }

        Self {
            up,
            down,
            half_len,
            taps,
        }
    }

    fn apply(&self, x: &[f64]) -> Vec<f64> {
        let n_in = x.len();
        let n_out = output_len(n_in, self.up, self.down);
        if n_out == 0 {
            return Vec::new();
        }

        // Pad so the filter's centre tap lands on a kept output index
        let n_pre_pad = self.down - self.half_len % self.down;
        let n_pre_remove = (self.half_len + n_pre_pad) / self.down;
        let mut n_post_pad = 0;
        while full_len(self.taps.len() + n_pre_pad + n_post_pad, n_in, self.up, self.down)
            < n_out + n_pre_remove
        {
            n_post_pad += 1;
        }

        let mut h = vec![0.0; n_pre_pad];
        h.extend_from_slice(&self.taps);
        h.extend(std::iter::repeat(0.0).take(n_post_pad));

        (0..n_out)
            .map(|i| {
                // Position in the upsampled, filtered signal
                let m = (i + n_pre_remove) * self.down;
                let limit = h.len().min(m + 1);
                let mut acc = 0.0;
                let mut j = m % self.up;
                while j < limit {
                    let idx = (m - j) / self.up;
                    if idx < n_in {
                        acc += h[j] * x[idx];
                    }
                    j += self.up;
                }
                acc
            })
            .collect()
    }
}

/// Length of the full upsample-filter-downsample output
fn full_len(h_len: usize, n_in: usize, up: usize, down: usize) -> usize {
    ((n_in - 1) * up + h_len - 1) / down + 1
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

/// Zeroth-order modified Bessel function of the first kind (power series)
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > 1e-12 * sum {
        term *= (half / k) * (half / k);
        sum += term;
        k += 1.0;
    }
    sum
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
