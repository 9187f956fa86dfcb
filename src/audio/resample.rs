//! Streaming linear resampler for the monitoring path.
//!
//! Converts blocks from one sample rate to another while keeping the
//! interpolation continuous across block boundaries.

pub struct LinearResampler {
    from_rate: u64,
    to_rate: u64,
    /// Position of the next output sample in units of `1 / to_rate` input
    /// samples. 0 is `prev`, `to_rate` the first sample of the next block.
    pos: u64,
    prev: f32,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate: from_rate.max(1) as u64,
            to_rate: to_rate.max(1) as u64,
            pos: 0,
            prev: 0.0,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate
    }

    /// Resamples `input` into `output`, replacing its contents.
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        output.clear();
        if self.is_passthrough() {
            output.extend_from_slice(input);
            return;
        }
        let Some(&last) = input.last() else {
            return;
        };

        let prev = self.prev;
        let sample = |index: usize| if index == 0 { prev } else { input[index - 1] };
        let end = input.len() as u64 * self.to_rate;
        while self.pos < end {
            let index = (self.pos / self.to_rate) as usize;
            let frac = (self.pos % self.to_rate) as f32 / self.to_rate as f32;
            let a = sample(index);
            let b = sample(index + 1);
            output.push(a + (b - a) * frac);
            self.pos += self.from_rate;
        }
        self.pos -= end;
        self.prev = last;
    }
}
