//! Audio I/O: decode fetched/synthesized bytes, WAV read/write.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result, bail};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Decoded mono audio.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
}

/// Decode encoded audio bytes into mono f64 samples in [-1, 1].
///
/// RIFF/WAVE data goes through hound; everything else (MP3 from the
/// provider, AAC/MP4) is probed by symphonia. Multi-channel audio is
/// averaged to mono.
pub fn decode_audio(bytes: &[u8], extension_hint: Option<&str>) -> Result<DecodedAudio> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        let reader = WavReader::new(Cursor::new(bytes)).context("Failed to parse WAV data")?;
        return read_wav_reader(reader);
    }
    decode_with_symphonia(bytes, extension_hint)
}

fn read_wav_reader<R: std::io::Read>(reader: WavReader<R>) -> Result<DecodedAudio> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f64> = match spec.sample_format {
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to read WAV samples")?
        }
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| v as f64))
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read WAV samples")?,
    };

    Ok(DecodedAudio {
        samples: downmix(&interleaved, channels),
        sample_rate: spec.sample_rate,
    })
}

fn downmix(interleaved: &[f64], channels: usize) -> Vec<f64> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f64>() / channels as f64)
        .collect()
}

fn decode_with_symphonia(bytes: &[u8], extension_hint: Option<&str>) -> Result<DecodedAudio> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    if bytes.is_empty() {
        bail!("Empty audio payload");
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Unsupported audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found")?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported codec")?;

    let mut all_samples: Vec<f64> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let channels = spec.channels.count().max(1);
                let mut sample_buf = SampleBuffer::<f64>::new(decoded.frames() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                all_samples.extend(downmix(sample_buf.samples(), channels));
            }
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if all_samples.is_empty() || sample_rate == 0 {
        bail!("No audio decoded");
    }

    Ok(DecodedAudio {
        samples: all_samples,
        sample_rate,
    })
}

fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Encode f64 samples as a 16-bit PCM mono WAV in memory.
///
/// Clips values to [-1, 1] before conversion.
pub fn encode_wav(samples: &[f64], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut cursor, wav_spec(sample_rate)).context("Failed to start WAV encoder")?;
        for &sample in samples {
            writer.write_sample(to_i16(sample))?;
        }
        writer.finalize().context("Failed to finalize WAV data")?;
    }
    Ok(cursor.into_inner())
}

/// Write f64 samples to a 16-bit PCM WAV file.
///
/// Creates parent directories if needed.
pub fn write_wav(path: &Path, samples: &[f64], sample_rate: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut writer = WavWriter::create(path, wav_spec(sample_rate))
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    for &sample in samples {
        writer.write_sample(to_i16(sample))?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

fn to_i16(sample: f64) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(n: usize, sr: u32, amp: f64) -> Vec<f64> {
        (0..n)
            .map(|i| (i as f64 / sr as f64 * 220.0 * std::f64::consts::TAU).sin() * amp)
            .collect()
    }

    #[test]
    fn test_encode_decode_wav_bytes() {
        let samples = sine(1000, 16000, 0.5);
        let bytes = encode_wav(&samples, 16000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");

        let decoded = decode_audio(&bytes, None).unwrap();
        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.samples.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.samples.iter()) {
            assert!((a - b).abs() < 0.001, "sample mismatch: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_encode_clips_values() {
        let bytes = encode_wav(&[-2.0, 0.0, 2.0], 16000).unwrap();
        let decoded = decode_audio(&bytes, None).unwrap();
        assert!(decoded.samples[0] >= -1.0 && decoded.samples[0] <= -0.99);
        assert!(decoded.samples[2] >= 0.99 && decoded.samples[2] <= 1.0);
    }

    #[test]
    fn test_decode_stereo_is_averaged() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..100 {
                writer.write_sample(16384i16).unwrap();
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        let decoded = decode_audio(&cursor.into_inner(), Some("wav")).unwrap();
        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.samples.len(), 100);
        assert!((decoded.samples[0] - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_audio(b"definitely not audio", Some("mp3")).is_err());
        assert!(decode_audio(&[], None).is_err());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clip.wav");
        let samples = sine(1600, 16000, 0.3);
        write_wav(&path, &samples, 16000).unwrap();

        let decoded = decode_audio(&std::fs::read(&path).unwrap(), None).unwrap();
        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.samples.len(), 1600);
    }
}
