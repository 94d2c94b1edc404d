use voice_relay::audio::resample::output_len;
use voice_relay::{resample, AudioFrame, RelayError};

fn sine_pcm(freq: f64, rate: u32, seconds: f64, amplitude: f64) -> Vec<u8> {
    let n = (rate as f64 * seconds) as usize;
    (0..n)
        .map(|i| {
            let t = i as f64 / rate as f64;
            (amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()) as i16
        })
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

fn decode(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

fn zero_crossings(samples: &[i16]) -> usize {
    samples
        .windows(2)
        .filter(|w| (w[0] < 0) != (w[1] < 0))
        .count()
}

#[test]
fn test_sine_keeps_frequency_after_downsampling() {
    // One second of 440Hz at 48kHz
    let input = sine_pcm(440.0, 48_000, 1.0, 16_000.0);
    let output = decode(&resample(&input, 48_000, 24_000).unwrap());

    assert_eq!(output.len(), 24_000);
    let crossings = zero_crossings(&output) as i64;
    assert!(
        (crossings - 880).abs() <= 1,
        "expected ~880 zero crossings, got {}",
        crossings
    );
}

#[test]
fn test_amplitude_preserved_in_passband() {
    let input = sine_pcm(440.0, 48_000, 0.5, 16_000.0);
    let output = decode(&resample(&input, 48_000, 24_000).unwrap());

    let peak = output[1_000..11_000]
        .iter()
        .map(|s| s.unsigned_abs())
        .max()
        .unwrap();
    assert!(
        (15_500..=16_500).contains(&peak),
        "peak {} outside expected range",
        peak
    );
}

#[test]
fn test_tone_above_new_nyquist_is_attenuated() {
    // 15kHz is above the 12kHz Nyquist of the 24kHz output
    let input = sine_pcm(15_000.0, 48_000, 0.5, 16_000.0);
    let output = decode(&resample(&input, 48_000, 24_000).unwrap());

    let peak = output[1_000..11_000]
        .iter()
        .map(|s| s.unsigned_abs())
        .max()
        .unwrap();
    assert!(peak < 1_000, "aliased peak {} too high", peak);
}

#[test]
fn test_deterministic_output() {
    let input = sine_pcm(1_000.0, 48_000, 0.1, 12_000.0);
    let a = resample(&input, 48_000, 24_000).unwrap();
    let b = resample(&input, 48_000, 24_000).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_output_length_for_odd_sample_counts() {
    for n in [1usize, 3, 479, 480, 481, 4801] {
        let input = vec![0u8; n * 2];
        let output = resample(&input, 48_000, 24_000).unwrap();
        assert_eq!(output.len() / 2, output_len(n, 1, 2), "n = {}", n);
        assert_eq!(output.len() / 2, (n + 1) / 2, "n = {}", n);
    }
}

#[test]
fn test_odd_byte_length_rejected() {
    let err = resample(&[1, 2, 3], 48_000, 24_000).unwrap_err();
    assert!(matches!(err, RelayError::MalformedFrame(_)));

    let frame = AudioFrame::from_client(vec![0u8; 5]);
    assert!(frame.resampled().is_err());
}

#[test]
fn test_silence_stays_silent() {
    let input = vec![0u8; 1920];
    let output = resample(&input, 48_000, 24_000).unwrap();
    assert!(output.iter().all(|&b| b == 0));
}
