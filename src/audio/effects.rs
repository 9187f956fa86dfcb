//! Monitoring effects chain: low-pass filter followed by reverb.
//!
//! The chain produces the signal sent to the output device while recording:
//! the dry input, the low-passed input and the reverberated low-passed input
//! summed together and scaled by the monitor gain.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};
use std::collections::VecDeque;

use crate::config::EffectsConfig;
use crate::session::AcquisitionError;

/// Second-order low-pass filter.
pub struct LowPass {
    filter: DirectForm2Transposed<f32>,
}

impl LowPass {
    /// # Errors
    /// - If the cutoff lies above the Nyquist frequency or Q is not positive
    pub fn new(sample_rate: u32, cutoff_hz: f32, q: f32) -> Result<Self, AcquisitionError> {
        let coeffs = Coefficients::<f32>::from_params(
            Type::LowPass,
            (sample_rate as f32).hz(),
            cutoff_hz.hz(),
            q,
        )
        .map_err(|e| {
            AcquisitionError::Graph(format!(
                "low-pass at {cutoff_hz}Hz (Q {q}) is invalid for {sample_rate}Hz: {e:?}"
            ))
        })?;

        Ok(Self {
            filter: DirectForm2Transposed::<f32>::new(coeffs),
        })
    }

    pub fn process(&mut self, input: f32) -> f32 {
        self.filter.run(input)
    }
}

/// Base comb delays in samples at 44.1kHz (Freeverb tunings).
const COMB_TUNINGS: [usize; 4] = [1557, 1617, 1491, 1422];
const ALLPASS_TUNINGS: [usize; 2] = [225, 556];
const DAMPING: f32 = 0.2;

struct CombFilter {
    buffer: VecDeque<f32>,
    feedback: f32,
    filter_state: f32,
}

impl CombFilter {
    /// Feedback is chosen so the loop decays by 60 dB over `decay_secs`.
    fn new(delay: usize, sample_rate: u32, decay_secs: f32) -> Self {
        let delay_secs = delay as f32 / sample_rate as f32;
        let feedback = 10f32.powf(-3.0 * delay_secs / decay_secs).min(0.98);
        Self {
            buffer: VecDeque::from(vec![0.0; delay]),
            feedback,
            filter_state: 0.0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer.pop_front().unwrap_or(0.0);
        self.filter_state = delayed * (1.0 - DAMPING) + self.filter_state * DAMPING;
        self.buffer.push_back(input + self.filter_state * self.feedback);
        delayed
    }
}

struct AllpassFilter {
    buffer: VecDeque<f32>,
}

impl AllpassFilter {
    fn new(delay: usize) -> Self {
        Self {
            buffer: VecDeque::from(vec![0.0; delay]),
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer.pop_front().unwrap_or(0.0);
        self.buffer.push_back(input + delayed * 0.5);
        delayed - input
    }
}

/// Schroeder reverb with a pre-delay line and decay-time controlled feedback.
pub struct Reverb {
    pre_delay: VecDeque<f32>,
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
    wet: f32,
}

impl Reverb {
    /// # Errors
    /// - If the decay is not positive or the pre-delay is negative
    pub fn new(
        sample_rate: u32,
        decay_secs: f32,
        pre_delay_secs: f32,
        wet: f32,
    ) -> Result<Self, AcquisitionError> {
        if decay_secs <= 0.0 || pre_delay_secs < 0.0 {
            return Err(AcquisitionError::Graph(format!(
                "reverb decay {decay_secs}s / pre-delay {pre_delay_secs}s out of range"
            )));
        }

        let scale = sample_rate as f32 / 44100.0;
        let scaled = |delay: usize| ((delay as f32 * scale) as usize).max(1);
        let pre_delay_samples = (pre_delay_secs * sample_rate as f32).round() as usize;

        Ok(Self {
            pre_delay: VecDeque::from(vec![0.0; pre_delay_samples]),
            combs: COMB_TUNINGS
                .iter()
                .map(|&d| CombFilter::new(scaled(d), sample_rate, decay_secs))
                .collect(),
            allpasses: ALLPASS_TUNINGS
                .iter()
                .map(|&d| AllpassFilter::new(scaled(d)))
                .collect(),
            wet,
        })
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = if self.pre_delay.is_empty() {
            input
        } else {
            self.pre_delay.push_back(input);
            self.pre_delay.pop_front().unwrap_or(0.0)
        };

        let mut out = self.combs.iter_mut().map(|c| c.process(delayed)).sum::<f32>()
            / self.combs.len() as f32;
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out * self.wet
    }
}

/// Low-pass into reverb, mixed with the dry signal.
pub struct EffectChain {
    lowpass: LowPass,
    reverb: Reverb,
    gain: f32,
}

impl EffectChain {
    /// Builds the chain for a stream running at `sample_rate`.
    ///
    /// # Errors
    /// - If any effect parameter is invalid for the sample rate
    pub fn new(settings: &EffectsConfig, sample_rate: u32) -> Result<Self, AcquisitionError> {
        Ok(Self {
            lowpass: LowPass::new(sample_rate, settings.lowpass_cutoff_hz, settings.lowpass_q)?,
            reverb: Reverb::new(
                sample_rate,
                settings.reverb_decay_secs,
                settings.reverb_pre_delay_secs,
                settings.reverb_wet,
            )?,
            gain: settings.monitor_gain,
        })
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let filtered = self.lowpass.process(input);
        let reverberated = self.reverb.process(filtered);
        ((input + filtered + reverberated) * self.gain).clamp(-1.0, 1.0)
    }

    pub fn process_block(&mut self, input: &[f32], output: &mut Vec<f32>) {
        output.clear();
        output.extend(input.iter().map(|&s| self.process(s)));
    }
}
