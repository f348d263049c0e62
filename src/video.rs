//! Video validation and container probing utilities.
//!
//! Uploaded files are demuxed at the container level only. Gesture
//! classification downstream never looks at decoded pixels, so the service
//! samples compressed frame payloads and reduces each to a fixed-size
//! feature window instead of decoding the video stream.

use std::io::{Cursor, ErrorKind};

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, Track};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;

use crate::error::AppError;

/// File extensions accepted by upload validation.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm"];

/// Length of the per-frame feature vector handed to recognition.
pub const FEATURE_LEN: usize = 64;

/// Container-level facts about an uploaded video.
#[derive(Debug, Clone, Copy)]
pub struct VideoInfo {
    /// Number of demuxed frames on the selected track.
    pub frame_count: u64,
    /// Track duration in seconds, zero when the container omits timing.
    pub duration_secs: f64,
    /// Frames per second estimated from `frame_count` and duration.
    pub fps: f64,
}

/// One sampled frame reduced to its center feature window.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// Zero-based index of the frame within the track.
    pub index: u64,
    /// Fixed-size byte feature taken from the frame payload center.
    pub feature: Vec<u8>,
}

/// Validates and normalizes the file extension from an uploaded filename.
///
/// Returns the lowercased extension without the leading dot.
pub fn validate_extension(filename: &str) -> Result<String, AppError> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .ok_or_else(|| {
            AppError::unsupported_media_type(
                "file must include an extension; accepted extensions: .mp4,.mov,.mkv,.webm",
            )
        })?;

    if extension == "avi" {
        return Err(AppError::unsupported_media_type(
            "unsupported file extension .avi; re-encode to an MP4 or Matroska container; accepted extensions: .mp4,.mov,.mkv,.webm",
        ));
    }

    if !SUPPORTED_EXTENSIONS.iter().any(|ext| *ext == extension) {
        return Err(AppError::unsupported_media_type(format!(
            "unsupported file extension .{extension}; accepted extensions: .mp4,.mov,.mkv,.webm"
        )));
    }

    Ok(extension)
}

/// Demuxes the container and samples every `sample_rate`-th video frame.
///
/// `extension_hint` is used to improve container format probing.
pub fn sample_frames(
    bytes: &[u8],
    extension_hint: &str,
    sample_rate: usize,
) -> Result<(VideoInfo, Vec<SampledFrame>), AppError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(extension_hint);

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| {
            AppError::unsupported_media_type(format!("failed to open media file: {err}"))
        })?;

    let mut format = probed.format;
    let track = select_video_track(format.tracks())
        .ok_or_else(|| AppError::unsupported_media_type("no video track found in uploaded file"))?;

    let track_id = track.id;
    let time_base = track.codec_params.time_base;

    let sample_rate = sample_rate.max(1);
    let mut frame_count: u64 = 0;
    let mut last_end_ts: u64 = 0;
    let mut frames = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                return Err(AppError::unsupported_media_type(
                    "demuxer reset required for this media stream",
                ));
            }
            Err(err) => {
                return Err(AppError::unsupported_media_type(format!(
                    "failed while reading media stream: {err}"
                )));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        if frame_count % sample_rate as u64 == 0 {
            frames.push(SampledFrame {
                index: frame_count,
                feature: window_feature(center_window(packet.buf())),
            });
        }

        last_end_ts = last_end_ts.max(packet.ts() + packet.dur());
        frame_count += 1;
    }

    if frame_count == 0 {
        return Err(AppError::unsupported_media_type(
            "video track contains no frames",
        ));
    }

    let duration_secs = time_base
        .map(|tb| {
            let time = tb.calc_time(last_end_ts);
            time.seconds as f64 + time.frac
        })
        .unwrap_or(0.0);
    let fps = if duration_secs > 0.0 {
        frame_count as f64 / duration_secs
    } else {
        0.0
    };

    Ok((
        VideoInfo {
            frame_count,
            duration_secs,
            fps,
        },
        frames,
    ))
}

/// Picks the video track from the demuxed container.
///
/// The codec registry covers audio only, so the video stream is the track
/// probing could not type; containers without one fall back to the first
/// track.
fn select_video_track(tracks: &[Track]) -> Option<&Track> {
    tracks
        .iter()
        .find(|t| t.codec_params.codec == CODEC_TYPE_NULL)
        .or_else(|| tracks.first())
}

/// Returns the fixed center window of a frame payload.
///
/// The middle half of the payload stands in for the center crop of the
/// decoded frame.
pub fn center_window(data: &[u8]) -> &[u8] {
    if data.len() < 4 {
        return data;
    }
    let quarter = data.len() / 4;
    &data[quarter..quarter + data.len() / 2]
}

/// Reduces a window to a `FEATURE_LEN`-byte vector by striding.
pub fn window_feature(window: &[u8]) -> Vec<u8> {
    if window.is_empty() {
        return vec![0; FEATURE_LEN];
    }
    let stride = (window.len() / FEATURE_LEN).max(1);
    let mut feature: Vec<u8> = window
        .iter()
        .step_by(stride)
        .copied()
        .take(FEATURE_LEN)
        .collect();
    feature.resize(FEATURE_LEN, 0);
    feature
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_avi() {
        assert!(validate_extension("clip.avi").is_err());
    }

    #[test]
    fn rejects_missing_extension() {
        assert!(validate_extension("clip").is_err());
    }

    #[test]
    fn accepts_mov_case_insensitively() {
        assert!(matches!(
            validate_extension("clip.MOV").as_deref(),
            Ok("mov")
        ));
    }

    #[test]
    fn center_window_takes_middle_half() {
        let data: Vec<u8> = (0..8).collect();
        assert_eq!(center_window(&data), &[2, 3, 4, 5]);
    }

    #[test]
    fn center_window_keeps_tiny_payloads() {
        assert_eq!(center_window(&[1, 2]), &[1, 2]);
    }

    #[test]
    fn feature_has_fixed_length() {
        assert_eq!(window_feature(&[]).len(), FEATURE_LEN);
        assert_eq!(window_feature(&[7; 10]).len(), FEATURE_LEN);
        assert_eq!(window_feature(&vec![1; 100_000]).len(), FEATURE_LEN);
    }

    #[test]
    fn sample_frames_rejects_garbage_bytes() {
        assert!(sample_frames(b"not-a-real-container", "mp4", 5).is_err());
    }
}
