//! Audio Buffer Management
//!
//! Decoded PCM audio held as non-interleaved 32-bit float channels. The
//! buffer keeps the sample rate and channel count of the source file;
//! operators never resample implicitly.

use crate::error::{MoodshiftError, Result};

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns `f64::NEG_INFINITY` for non-positive input.
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Decoded audio owned by a single job while it runs
///
/// # Example
/// ```
/// use moodshift::engine::AudioBuffer;
///
/// // One second of stereo silence at 44.1kHz
/// let buffer = AudioBuffer::new(44100, 2, 44100);
/// assert_eq!(buffer.num_channels(), 2);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is frames
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a zeroed buffer
    ///
    /// # Arguments
    /// * `num_samples` - Number of frames per channel
    /// * `channels` - Channel count (at least 1)
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(num_samples: usize, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; channels.max(1)],
            sample_rate,
        }
    }

    /// Create a buffer of silence lasting `duration_ms`
    pub fn silent(duration_ms: f64, channels: usize, sample_rate: u32) -> Self {
        let frames = frames_for_ms(duration_ms, sample_rate);
        Self::new(frames, channels, sample_rate)
    }

    /// Create a buffer from channel vectors
    ///
    /// All channels must have the same length and the sample rate must be positive.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if samples.is_empty() {
            return Err(MoodshiftError::Internal {
                reason: "audio buffer needs at least one channel".to_string(),
            });
        }
        if sample_rate == 0 {
            return Err(MoodshiftError::Internal {
                reason: "audio buffer sample rate must be positive".to_string(),
            });
        }
        let frames = samples[0].len();
        if samples.iter().any(|ch| ch.len() != frames) {
            return Err(MoodshiftError::Internal {
                reason: "audio buffer channels differ in length".to_string(),
            });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(MoodshiftError::Internal {
                reason: "interleaved audio needs at least one channel".to_string(),
            });
        }

        let frames = interleaved.len() / channels;
        let mut samples = vec![Vec::with_capacity(frames); channels];
        for frame in interleaved.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Self::from_channels(samples, sample_rate)
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ...)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_samples = self.len();
        let mut interleaved = Vec::with_capacity(self.num_channels() * num_samples);

        for frame in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[frame]);
            }
        }

        interleaved
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Number of frames per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nyquist frequency (half the sample rate)
    #[inline]
    pub fn nyquist(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    #[inline]
    pub fn duration_ms(&self) -> f64 {
        self.duration_secs() * 1000.0
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Get a sample, or None if indices are out of bounds
    #[inline]
    pub fn get_sample(&self, channel: usize, index: usize) -> Option<f32> {
        self.samples
            .get(channel)
            .and_then(|ch| ch.get(index).copied())
    }

    /// Largest absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// Scale every sample by `gain_db` decibels
    pub fn apply_gain_db(&mut self, gain_db: f64) {
        let gain = db_to_linear(gain_db) as f32;
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Copy of this buffer attenuated or boosted by `gain_db`
    pub fn with_gain_db(&self, gain_db: f64) -> Self {
        let mut out = self.clone();
        out.apply_gain_db(gain_db);
        out
    }

    /// Copy of this buffer preceded by `delay_ms` of silence
    ///
    /// Fails with `Internal` when the result would exceed [`MAX_FRAMES`].
    pub fn delayed(&self, delay_ms: f64) -> Result<Self> {
        let offset = if delay_ms > 0.0 {
            (delay_ms * self.sample_rate as f64 / 1000.0).round()
        } else {
            0.0
        };
        let total = checked_frame_count(offset + self.len() as f64)?;
        let offset = total - self.len();

        let samples = self
            .samples
            .iter()
            .map(|channel| {
                let mut shifted = try_zeroed(total)?;
                shifted[offset..].copy_from_slice(channel);
                Ok(shifted)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            samples,
            sample_rate: self.sample_rate,
        })
    }

    /// Additively mix `other` into this buffer starting at frame 0
    ///
    /// The result is as long as the longer operand. Channels of `other`
    /// beyond this buffer's channel count are ignored; a mono `other` is
    /// mixed into every channel.
    pub fn overlay(&mut self, other: &AudioBuffer) {
        let target_len = self.len().max(other.len());
        for channel in &mut self.samples {
            channel.resize(target_len, 0.0);
        }
        if other.num_channels() == 0 {
            return;
        }
        for (ch, channel) in self.samples.iter_mut().enumerate() {
            let source = &other.samples[ch % other.num_channels()];
            for (dst, &src) in channel.iter_mut().zip(source.iter()) {
                *dst += src;
            }
        }
    }
}

/// Most frames per channel an operator may produce
///
/// 2^28 frames is a little over 100 minutes at 44.1 kHz, 1 GiB per channel.
pub const MAX_FRAMES: usize = 1 << 28;

/// Convert a computed frame count to `usize`, rejecting anything above
/// [`MAX_FRAMES`] or not finite
pub fn checked_frame_count(frames: f64) -> Result<usize> {
    if !frames.is_finite() || frames < 0.0 || frames > MAX_FRAMES as f64 {
        return Err(MoodshiftError::Internal {
            reason: format!(
                "output of {} frames exceeds the limit of {} frames per channel",
                frames, MAX_FRAMES
            ),
        });
    }
    Ok(frames as usize)
}

/// Zeroed channel storage of `len` frames
///
/// Allocation failure is returned as `Internal` instead of aborting.
pub fn try_zeroed(len: usize) -> Result<Vec<f32>> {
    let mut samples = Vec::new();
    samples
        .try_reserve_exact(len)
        .map_err(|e| MoodshiftError::Internal {
            reason: format!("cannot allocate {} frames: {}", len, e),
        })?;
    samples.resize(len, 0.0);
    Ok(samples)
}

/// Number of frames spanning `ms` milliseconds at `sample_rate`
#[inline]
pub fn frames_for_ms(ms: f64, sample_rate: u32) -> usize {
    if ms <= 0.0 {
        return 0;
    }
    (ms * sample_rate as f64 / 1000.0).round() as usize
}

// ============================================================================
// Tests
// ============================================================================
