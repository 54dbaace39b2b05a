//! Per-stream rate conversion from a channel's sample rate to the device rate.

use csnd_ir::Interpolation;

/// Stateful converter. Position and the last input sample carry over from
/// one buffer to the next so block boundaries do not click.
#[derive(Clone, Debug, Default)]
pub struct Resampler {
    pos: f64,
    last: f32,
}

impl Resampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Convert `input` at `src_rate` to `dst_rate`, appending to `out`.
    ///
    /// `Interpolation::Enabled` blends neighbouring samples linearly (one
    /// sample of latency), `Disabled` holds each sample.
    pub fn process(
        &mut self,
        input: &[i16],
        src_rate: u32,
        dst_rate: u32,
        interpolation: Interpolation,
        out: &mut Vec<f32>,
    ) {
        if input.is_empty() || src_rate == 0 || dst_rate == 0 {
            return;
        }

        let step = src_rate as f64 / dst_rate as f64;
        let len = input.len() as f64;
        let sample = |i: usize| input[i] as f32 / 32768.0;

        let mut pos = self.pos;
        while pos < len {
            let i = pos as usize;
            let value = if interpolation.is_enabled() {
                let a = if i == 0 { self.last } else { sample(i - 1) };
                let b = sample(i);
                let frac = (pos - i as f64) as f32;
                a + (b - a) * frac
            } else {
                sample(i)
            };
            out.push(value);
            pos += step;
        }

        self.pos = pos - len;
        self.last = sample(input.len() - 1);
    }
}
