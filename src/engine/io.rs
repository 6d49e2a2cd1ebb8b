//! Audio file I/O for Moodshift
//!
//! The engine only sees the [`AudioCodec`] trait. [`DefaultCodec`] reads
//! WAV with hound, falling back to symphonia for encodings hound does not
//! handle, and every other container with symphonia. WAV output is
//! written directly; compressed formats are transcoded by ffmpeg from a
//! scratch WAV file.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use crate::engine::buffer::AudioBuffer;
use crate::error::{MoodshiftError, Result};

/// Bitrate used for mp3 output
pub const MP3_BITRATE: &str = "192k";

const MP3_ARGS: &[&str] = &["-codec:a", "libmp3lame", "-b:a", MP3_BITRATE, "-f", "mp3"];
const M4A_ARGS: &[&str] = &["-codec:a", "aac", "-f", "ipod"];
const OGG_ARGS: &[&str] = &["-codec:a", "libvorbis", "-f", "ogg"];
const FLAC_ARGS: &[&str] = &["-codec:a", "flac", "-f", "flac"];

// ============================================================================
// Output Format
// ============================================================================

/// Container format of a job's output artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Wav,
    Mp3,
    M4a,
    Ogg,
    Flac,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Wav,
        OutputFormat::Mp3,
        OutputFormat::M4a,
        OutputFormat::Ogg,
        OutputFormat::Flac,
    ];

    /// Parse a format name, falling back to WAV for anything unrecognized
    pub fn parse_or_default(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "wav" => OutputFormat::Wav,
            "mp3" => OutputFormat::Mp3,
            "m4a" => OutputFormat::M4a,
            "ogg" => OutputFormat::Ogg,
            "flac" => OutputFormat::Flac,
            other => {
                debug!(format = other, "unknown output format, using wav");
                OutputFormat::Wav
            }
        }
    }

    /// File extension (no dot)
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::M4a => "m4a",
            OutputFormat::Ogg => "ogg",
            OutputFormat::Flac => "flac",
        }
    }

    /// ffmpeg encoder arguments, None for formats written natively
    fn ffmpeg_args(&self) -> Option<&'static [&'static str]> {
        match self {
            OutputFormat::Wav => None,
            OutputFormat::Mp3 => Some(MP3_ARGS),
            OutputFormat::M4a => Some(M4A_ARGS),
            OutputFormat::Ogg => Some(OGG_ARGS),
            OutputFormat::Flac => Some(FLAC_ARGS),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ============================================================================
// Codec Boundary
// ============================================================================

/// Decode/encode boundary used by the effect engine
pub trait AudioCodec: Send + Sync {
    /// Decode a file into an AudioBuffer
    fn load(&self, path: &Path) -> Result<AudioBuffer>;

    /// Encode a buffer to `path` in `format`
    fn export(&self, buffer: &AudioBuffer, path: &Path, format: OutputFormat) -> Result<()>;
}

/// hound + symphonia decoding, hound + ffmpeg encoding
#[derive(Debug, Clone)]
pub struct DefaultCodec {
    ffmpeg_binary: PathBuf,
}

impl Default for DefaultCodec {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl DefaultCodec {
    pub fn new(ffmpeg_binary: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_binary: ffmpeg_binary.into(),
        }
    }

    fn transcode(&self, buffer: &AudioBuffer, path: &Path, format: OutputFormat) -> Result<()> {
        let args = format.ffmpeg_args().unwrap_or(&[]);
        let scratch = tempfile::tempdir().map_err(|e| encode_error(path, format, e))?;
        let scratch_wav = scratch.path().join("moodshift_export.wav");
        write_wav(buffer, &scratch_wav, format)?;

        let status = Command::new(&self.ffmpeg_binary)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(&scratch_wav)
            .args(args)
            .arg(path)
            .status()
            .map_err(|e| MoodshiftError::Encode {
                path: path.to_path_buf(),
                format: format.to_string(),
                reason: format!("failed to spawn {}", self.ffmpeg_binary.display()),
                source: Some(Box::new(e)),
            })?;

        if !status.success() {
            return Err(MoodshiftError::Encode {
                path: path.to_path_buf(),
                format: format.to_string(),
                reason: format!("ffmpeg exited with {}", status),
                source: None,
            });
        }
        Ok(())
    }
}

impl AudioCodec for DefaultCodec {
    fn load(&self, path: &Path) -> Result<AudioBuffer> {
        if !path.exists() {
            return Err(MoodshiftError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);

        let buffer = if is_wav {
            // hound covers plain PCM and 32-bit float; symphonia picks up
            // ADPCM, 64-bit float and other encodings it rejects
            match read_wav(path) {
                Ok(buffer) => buffer,
                Err(wav_err) => {
                    debug!(path = %path.display(), "hound could not read wav, trying symphonia: {}", wav_err);
                    read_with_symphonia(path).map_err(|_| wav_err)?
                }
            }
        } else {
            read_with_symphonia(path)?
        };

        info!(
            path = %path.display(),
            duration_secs = buffer.duration_secs(),
            channels = buffer.num_channels(),
            sample_rate = buffer.sample_rate,
            "loaded audio"
        );
        Ok(buffer)
    }

    fn export(&self, buffer: &AudioBuffer, path: &Path, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Wav => write_wav(buffer, path, format),
            _ => self.transcode(buffer, path, format),
        }
    }
}

// ============================================================================
// Test Tones
// ============================================================================

/// Generate a mono sine wave
///
/// # Arguments
/// * `frequency` - Frequency of the sine wave in Hz
/// * `amplitude` - Peak amplitude (0.0 to 1.0)
/// * `duration_secs` - Duration of the tone in seconds
/// * `sample_rate` - Sample rate in Hz
pub fn generate_test_tone(
    frequency: f32,
    amplitude: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32).round() as usize;
    let mut buffer = AudioBuffer::new(num_samples, 1, sample_rate);
    fill_sine(buffer.channel_mut(0), frequency, amplitude, sample_rate);
    buffer
}

/// Generate a stereo tone with a different frequency per channel
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    amplitude: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32).round() as usize;
    let mut buffer = AudioBuffer::new(num_samples, 2, sample_rate);
    fill_sine(buffer.channel_mut(0), freq_left, amplitude, sample_rate);
    fill_sine(buffer.channel_mut(1), freq_right, amplitude, sample_rate);
    buffer
}

fn fill_sine(channel: &mut [f32], frequency: f32, amplitude: f32, sample_rate: u32) {
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    for (i, sample) in channel.iter_mut().enumerate() {
        *sample = amplitude * (angular_freq * i as f32).sin();
    }
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn decode_error(path: &Path, reason: impl Into<String>) -> MoodshiftError {
    MoodshiftError::Decode {
        path: path.to_path_buf(),
        reason: reason.into(),
        source: None,
    }
}

fn encode_error<E>(path: &Path, format: OutputFormat, err: E) -> MoodshiftError
where
    E: std::error::Error + Send + Sync + 'static,
{
    MoodshiftError::Encode {
        path: path.to_path_buf(),
        format: format.to_string(),
        reason: err.to_string(),
        source: Some(Box::new(err)),
    }
}

fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let reader = WavReader::open(path).map_err(|e| MoodshiftError::Decode {
        path: path.to_path_buf(),
        reason: format!("failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)
        .map_err(|reason| decode_error(path, reason))?;

    AudioBuffer::from_interleaved(&samples, spec.channels as usize, spec.sample_rate)
        .map_err(|e| decode_error(path, e.to_string()))
}

/// Read samples from a WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> std::result::Result<Vec<f32>, String> {
    let collected: std::result::Result<Vec<f32>, hound::Error> = match (sample_format, bits_per_sample) {
        (SampleFormat::Float, _) => reader.samples::<f32>().collect(),
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect(),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect(),
        // 24-bit stored as i32 in hound
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect(),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect(),
        (SampleFormat::Int, bits) => {
            return Err(format!("unsupported {}-bit integer audio", bits));
        }
    };
    collected.map_err(|e| format!("failed to read samples: {}", e))
}

/// Write a 16-bit PCM WAV file
///
/// Samples are scaled by 32768 so 16-bit input survives a load/export
/// cycle unchanged.
fn write_wav(buffer: &AudioBuffer, path: &Path, format: OutputFormat) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(|e| encode_error(path, format, e))?;
    for sample in buffer.to_interleaved() {
        let scaled = (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
        writer
            .write_sample(scaled)
            .map_err(|e| encode_error(path, format, e))?;
    }
    writer.finalize().map_err(|e| encode_error(path, format, e))?;
    Ok(())
}

/// Decode any container symphonia can probe into an AudioBuffer
fn read_with_symphonia(path: &Path) -> Result<AudioBuffer> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| MoodshiftError::Decode {
            path: path.to_path_buf(),
            reason: format!("failed to probe audio format: {}", e),
            source: Some(Box::new(e)),
        })?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error(path, "no supported audio track found"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| decode_error(path, "unknown sample rate"))?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| MoodshiftError::Decode {
            path: path.to_path_buf(),
            reason: format!("failed to create decoder: {}", e),
            source: Some(Box::new(e)),
        })?;

    let mut interleaved: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(decode_error(path, e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                debug!(path = %path.display(), msg, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(decode_error(path, e.to_string())),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sample_buf.samples());
    }

    if channels == 0 {
        return Err(decode_error(path, "stream has no channels"));
    }

    AudioBuffer::from_interleaved(&interleaved, channels, sample_rate)
        .map_err(|e| decode_error(path, e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse_or_default("MP3"), OutputFormat::Mp3);
        assert_eq!(OutputFormat::parse_or_default("flac"), OutputFormat::Flac);
        assert_eq!(OutputFormat::parse_or_default("aiff"), OutputFormat::Wav);
        assert_eq!(OutputFormat::parse_or_default(""), OutputFormat::Wav);
    }

    #[test]
    fn test_output_format_serde() {
        let json = serde_json::to_string(&OutputFormat::M4a).unwrap();
        assert_eq!(json, "\"m4a\"");
        let parsed: OutputFormat = serde_json::from_str("\"ogg\"").unwrap();
        assert_eq!(parsed, OutputFormat::Ogg);
    }

    #[test]
    fn test_mp3_uses_fixed_bitrate() {
        let args = OutputFormat::Mp3.ffmpeg_args().unwrap();
        assert!(args.contains(&"192k"));
        assert!(OutputFormat::M4a.ffmpeg_args().unwrap().contains(&"ipod"));
        assert!(OutputFormat::Wav.ffmpeg_args().is_none());
    }

    #[test]
    fn test_generate_test_tone() {
        let buffer = generate_test_tone(440.0, 0.5, 1.0, 48000);
        assert_eq!(buffer.len(), 48000);
        assert_eq!(buffer.num_channels(), 1);
        assert!(buffer.peak() <= 0.5);
        assert!(buffer.peak() > 0.49);
    }

    #[test]
    fn test_wav_round_trip_is_exact_for_16bit() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.wav");
        let second = dir.path().join("second.wav");
        let codec = DefaultCodec::default();

        let original = generate_stereo_test_tone(440.0, 880.0, 0.5, 0.25, 44100);
        codec.export(&original, &first, OutputFormat::Wav).unwrap();

        let loaded = codec.load(&first).unwrap();
        assert_eq!(loaded.sample_rate, 44100);
        assert_eq!(loaded.num_channels(), 2);
        assert_eq!(loaded.len(), original.len());

        // Once quantized, further cycles are lossless
        codec.export(&loaded, &second, OutputFormat::Wav).unwrap();
        let reloaded = codec.load(&second).unwrap();
        assert_eq!(loaded, reloaded);
    }

    #[test]
    fn test_load_missing_file() {
        let codec = DefaultCodec::default();
        let err = codec.load(Path::new("/nonexistent/path/audio.wav")).unwrap_err();
        assert!(matches!(err, MoodshiftError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_garbage_is_decode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();

        let err = DefaultCodec::default().load(&path).unwrap_err();
        assert_eq!(err.error_code(), "DECODE_ERROR");
    }

    /// Minimal mono WAV with IEEE 64-bit float samples
    fn float64_wav_bytes(samples: &[f64], sample_rate: u32) -> Vec<u8> {
        let data_len = (samples.len() * 8) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&3u16.to_le_bytes()); // IEEE float
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 8).to_le_bytes());
        bytes.extend_from_slice(&8u16.to_le_bytes());
        bytes.extend_from_slice(&64u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_float64_wav_falls_back_to_symphonia() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("double.wav");
        let samples: Vec<f64> = (0..800).map(|i| if i % 2 == 0 { 0.25 } else { -0.5 }).collect();
        std::fs::write(&path, float64_wav_bytes(&samples, 8000)).unwrap();

        assert!(read_wav(&path).is_err());
        let buffer = DefaultCodec::default().load(&path).unwrap();
        assert_eq!(buffer.sample_rate, 8000);
        assert_eq!(buffer.num_channels(), 1);
        assert_eq!(buffer.len(), 800);
        assert_eq!(buffer.channel(0)[0], 0.25);
        assert_eq!(buffer.channel(0)[1], -0.5);
    }

    #[test]
    fn test_transcode_without_ffmpeg_is_encode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp3");
        let codec = DefaultCodec::new("/nonexistent/bin/ffmpeg");
        let buffer = generate_test_tone(440.0, 0.5, 0.1, 8000);

        let err = codec.export(&buffer, &path, OutputFormat::Mp3).unwrap_err();
        assert_eq!(err.error_code(), "ENCODE_ERROR");
    }
}
