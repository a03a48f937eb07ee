//! Audio kernel: file decoding, cropping, resampling, gain and channel
//! layout. Waveforms are (batch, channels, samples) `f32` arrays.

use crate::core::error::{KernelError, KernelResult};
use crate::core::tensor::AudioData;
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView3, Axis};
use rayon::prelude::*;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Zero crossings on each side of the resampling kernel.
const SINC_ZERO_CROSSINGS: f64 = 16.0;

/// Trim whitespace and surrounding quotes, and turn backslashes into
/// forward slashes so Windows-style paths work everywhere.
pub fn normalize_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    PathBuf::from(trimmed.replace('\\', "/"))
}

/// Edits applied when loading or post-processing audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioEdit {
    pub offset_secs: f64,
    /// Length of the kept span; `None` keeps everything after the offset.
    pub duration_secs: Option<f64>,
    pub resample_to: Option<u32>,
    pub gain_db: f64,
    pub make_stereo: bool,
}

impl Default for AudioEdit {
    fn default() -> Self {
        Self {
            offset_secs: 0.0,
            duration_secs: None,
            resample_to: None,
            gain_db: 0.0,
            make_stereo: true,
        }
    }
}

impl AudioEdit {
    /// Build from host-style parameters where zero means "not set".
    pub fn from_params(gain_db: f64, offset_secs: f64, duration_secs: f64, resample_to_hz: f64, make_stereo: bool) -> Self {
        Self {
            offset_secs: offset_secs.max(0.0),
            duration_secs: (duration_secs > 0.0).then_some(duration_secs),
            resample_to: (resample_to_hz >= 1.0).then_some(resample_to_hz as u32),
            gain_db,
            make_stereo,
        }
    }
}

/// Decode an audio file (WAV, FLAC, MP3, Ogg Vorbis) into its sample rate
/// and a (channels, samples) array of `f32` in [-1, 1]. The container is
/// probed from its content; the extension is only a hint.
pub fn decode_file(path: &Path) -> KernelResult<(u32, Array2<f32>)> {
    let display = path.display().to_string();
    let decode_err = |reason: String| KernelError::Decoder {
        path: display.clone(),
        reason,
    };

    let file = std::fs::File::open(path).map_err(|e| decode_err(e.to_string()))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let probed = symphonia::default::get_probe()
        .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_err(format!("unsupported or unrecognised audio format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| decode_err("no audio track found".into()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(format!("unsupported codec: {}", e)))?;

    let mut interleaved: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(decode_err(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt frame is skipped rather than failing the whole file.
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("{}: skipping undecodable packet: {}", display, e);
                continue;
            }
            Err(e) => return Err(decode_err(e.to_string())),
        };
        let spec = *decoded.spec();
        if sample_rate.is_none() {
            sample_rate = Some(spec.rate);
        }
        channels = spec.channels.count();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buf.samples());
    }

    let sample_rate = sample_rate.ok_or_else(|| decode_err("stream has no sample rate".into()))?;
    let channels = channels.max(1);
    let frames = interleaved.len() / channels;
    let planar = Array2::from_shape_fn((channels, frames), |(c, i)| interleaved[i * channels + c]);
    Ok((sample_rate, planar))
}

/// Load an audio file and apply `edit`.
pub fn load_audio(raw_path: &str, edit: &AudioEdit) -> KernelResult<AudioData> {
    let path = normalize_path(raw_path);
    if !path.is_file() {
        return Err(KernelError::Decoder {
            path: path.display().to_string(),
            reason: "file does not exist or is not a regular file; check for stray quotes or spaces".into(),
        });
    }
    let (sample_rate, planar) = decode_file(&path)?;
    log::debug!(
        "decoded {}: {} Hz, {} channel(s), {} samples",
        path.display(),
        sample_rate,
        planar.nrows(),
        planar.ncols()
    );
    let audio = AudioData::new(sample_rate, planar.insert_axis(Axis(0)))?;
    process_audio(&audio, edit)
}

/// Crop, resample, apply gain and enforce stereo, in that order.
pub fn process_audio(audio: &AudioData, edit: &AudioEdit) -> KernelResult<AudioData> {
    let rate = audio.sample_rate;
    let mut waveform = crop(audio.waveform().view(), rate, edit.offset_secs, edit.duration_secs);
    let mut out_rate = rate;
    if let Some(target) = edit.resample_to.filter(|t| *t > 0 && *t != rate) {
        waveform = resample(waveform.view(), rate, target);
        out_rate = target;
    }
    if edit.gain_db != 0.0 {
        apply_gain(&mut waveform, edit.gain_db);
    }
    if edit.make_stereo {
        waveform = make_stereo(waveform)?;
    }
    AudioData::new(out_rate, waveform)
}

/// Keep `[offset, offset + duration)` seconds, clipped to the signal.
pub fn crop(waveform: ArrayView3<f32>, sample_rate: u32, offset_secs: f64, duration_secs: Option<f64>) -> Array3<f32> {
    let total = waveform.dim().2;
    let start = ((offset_secs.max(0.0) * sample_rate as f64) as usize).min(total);
    // Clamp in float so huge durations cannot overflow the index.
    let end = match duration_secs {
        Some(d) if d > 0.0 => start + (d * sample_rate as f64).min((total - start) as f64) as usize,
        _ => total,
    };
    waveform.slice(s![.., .., start..end]).to_owned()
}

/// Decibels to a linear factor.
pub fn db_to_gain(db: f64) -> f32 {
    10f64.powf(db / 20.0) as f32
}

pub fn apply_gain(waveform: &mut Array3<f32>, db: f64) {
    let g = db_to_gain(db);
    waveform.mapv_inplace(|v| v * g);
}

/// Duplicate a mono channel; two channels pass through.
pub fn make_stereo(waveform: Array3<f32>) -> KernelResult<Array3<f32>> {
    match waveform.dim().1 {
        1 => Ok(ndarray::concatenate(Axis(1), &[waveform.view(), waveform.view()])
            .map_err(|e| KernelError::MalformedInput(e.to_string()))?),
        2 => Ok(waveform),
        n => Err(KernelError::InvalidArgument(format!(
            "input audio has {} channels, cannot convert to stereo (2 channels)",
            n
        ))),
    }
}

/// Band-limited resampling with a Hann-windowed sinc kernel.
pub fn resample(waveform: ArrayView3<f32>, from: u32, to: u32) -> Array3<f32> {
    let (batch, channels, len) = waveform.dim();
    if from == to || from == 0 || to == 0 {
        return waveform.to_owned();
    }
    let out_len = ((len as u64 * to as u64 + from as u64 - 1) / from as u64) as usize;
    let lanes: Vec<ArrayView1<f32>> = waveform.lanes(Axis(2)).into_iter().collect();
    let resampled: Vec<Vec<f32>> = lanes
        .into_par_iter()
        .map(|lane| resample_lane(lane, from, to, out_len))
        .collect();
    let mut out = Array3::<f32>::zeros((batch, channels, out_len));
    for (mut dst, src) in out.lanes_mut(Axis(2)).into_iter().zip(resampled) {
        for (d, v) in dst.iter_mut().zip(src) {
            *d = v;
        }
    }
    out
}

fn resample_lane(lane: ArrayView1<f32>, from: u32, to: u32, out_len: usize) -> Vec<f32> {
    let len = lane.len() as isize;
    let step = from as f64 / to as f64;
    // Downsampling lowers the cutoff to the new Nyquist frequency.
    let cutoff = (to as f64 / from as f64).min(1.0);
    let radius = SINC_ZERO_CROSSINGS / cutoff;
    (0..out_len)
        .map(|j| {
            let t = j as f64 * step;
            let lo = (t - radius).ceil() as isize;
            let hi = (t + radius).floor() as isize;
            let mut acc = 0.0f64;
            let mut norm = 0.0f64;
            for k in lo.max(0)..=hi.min(len - 1) {
                let x = t - k as f64;
                let w = cutoff * sinc(cutoff * x) * hann(x / radius);
                acc += lane[k as usize] as f64 * w;
                norm += w;
            }
            if norm.abs() > 1e-9 {
                (acc / norm) as f32
            } else {
                0.0
            }
        })
        .collect()
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn hann(x: f64) -> f64 {
    if x.abs() >= 1.0 {
        0.0
    } else {
        0.5 * (1.0 + (PI * x).cos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn write_wav(path: &Path, channels: u16, rate: u32, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("  \"C:\\audio\\a.wav\" "), PathBuf::from("C:/audio/a.wav"));
        assert_eq!(normalize_path("'./a.wav'"), PathBuf::from("./a.wav"));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = load_audio("\"/no/such/dir\\clip.wav\"", &AudioEdit::default()).unwrap_err();
        match err {
            KernelError::Decoder { path, .. } => assert_eq!(path, "/no/such/dir/clip.wav"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_load_mono_as_stereo_with_crop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..1000).map(|i| (i * 16) as i16).collect();
        write_wav(&path, 1, 1000, &samples);

        let edit = AudioEdit::from_params(0.0, 0.25, 0.5, 0.0, true);
        let audio = load_audio(path.to_str().unwrap(), &edit).unwrap();
        assert_eq!(audio.sample_rate, 1000);
        assert_eq!(audio.waveform().dim(), (1, 2, 500));
        let first = audio.waveform()[[0, 0, 0]];
        assert!((first - 250.0 * 16.0 / 32768.0).abs() < 1e-6);
        assert_eq!(audio.waveform()[[0, 1, 0]], first);
    }

    #[test]
    fn test_crop_clamps_huge_duration() {
        let wave = Array3::from_shape_fn((1, 1, 100), |(_, _, i)| i as f32);
        let out = crop(wave.view(), 10, 1.0, Some(1e300));
        assert_eq!(out.dim(), (1, 1, 90));
        assert_eq!(out[[0, 0, 0]], 10.0);

        let past_end = crop(wave.view(), 10, 50.0, Some(f64::MAX));
        assert_eq!(past_end.dim(), (1, 1, 0));
    }

    #[test]
    fn test_content_probed_regardless_of_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.mp3");
        write_wav(&path, 2, 8000, &[100, -100, 200, -200]);
        let (rate, planar) = decode_file(&path).unwrap();
        assert_eq!(rate, 8000);
        assert_eq!(planar.dim(), (2, 2));
        assert!((planar[[1, 1]] + 200.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_unrecognised_format_is_decoder_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.ogg");
        std::fs::write(&path, b"this is plain text, not an audio stream").unwrap();
        match load_audio(path.to_str().unwrap(), &AudioEdit::default()) {
            Err(KernelError::Decoder { path: p, reason }) => {
                assert!(p.ends_with("notes.ogg"));
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected result {:?}", other.map(|a| a.samples())),
        }
    }

    #[test]
    fn test_stereo_rejects_multichannel() {
        let wave = Array3::<f32>::zeros((1, 3, 10));
        assert!(matches!(make_stereo(wave), Err(KernelError::InvalidArgument(_))));
    }

    #[test]
    fn test_gain() {
        assert!((db_to_gain(20.0) - 10.0).abs() < 1e-5);
        let mut wave = Array3::from_elem((1, 1, 4), 0.5f32);
        apply_gain(&mut wave, -6.0206);
        assert!((wave[[0, 0, 0]] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_resample_preserves_dc_and_length() {
        let wave = Array3::from_elem((1, 2, 441), 0.3f32);
        let out = resample(wave.view(), 44_100, 16_000);
        assert_eq!(out.dim(), (1, 2, 160));
        for v in out.slice(s![0, 0, 20..140]).iter() {
            assert!((v - 0.3).abs() < 1e-3);
        }
    }

    #[test]
    fn test_resample_keeps_low_frequency_tone() {
        let rate = 8_000u32;
        let tone = Array1::from_shape_fn(800, |i| (2.0 * std::f32::consts::PI * 100.0 * i as f32 / rate as f32).sin());
        let wave = tone.insert_axis(Axis(0)).insert_axis(Axis(0));
        let out = resample(wave.view(), rate, 16_000);
        assert_eq!(out.dim().2, 1600);
        let expected = (2.0 * std::f32::consts::PI * 100.0 * 400.0 / 16_000.0).sin();
        assert!((out[[0, 0, 400]] - expected).abs() < 0.02);
    }

    #[test]
    fn test_process_audio_resamples() {
        let audio = AudioData::new(1000, Array3::from_elem((1, 2, 1000), 0.1f32)).unwrap();
        let edit = AudioEdit { resample_to: Some(500), ..Default::default() };
        let out = process_audio(&audio, &edit).unwrap();
        assert_eq!(out.sample_rate, 500);
        assert_eq!(out.samples(), 500);
        assert!((out.duration_secs() - 1.0).abs() < 1e-9);
    }
}
