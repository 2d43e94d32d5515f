//! Screen recording pipeline.
//!
//! ```text
//! ScreenRecorder ──frames──▶ ffmpeg ──~1s chunks──▶ chunk_channel ──▶ spawn_chunk_writer ──▶ TempVideoFile
//! ```
//!
//! The channel holds [`CHUNK_CAPACITY`] chunks. When the writer falls behind,
//! the encoder's output reader blocks on send; chunks are never dropped.

use crate::capture::ScreenCapturer;
use crate::error::{AppError, Result};
use crate::geometry::{physical_size, Rect};
use crate::settings::VideoQuality;
use image::imageops::FilterType;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

pub const CHUNK_CAPACITY: usize = 64;
pub const CHUNK_INTERVAL: Duration = Duration::from_secs(1);

pub type ChunkSender = mpsc::Sender<Vec<u8>>;
pub type ChunkReceiver = mpsc::Receiver<Vec<u8>>;

/// Bounded channel between the recorder and the file writer.
pub fn chunk_channel() -> (ChunkSender, ChunkReceiver) {
    mpsc::channel(CHUNK_CAPACITY)
}

pub(crate) fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Scratch file a recording is streamed into before the user picks a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempVideoFile {
    path: PathBuf,
}

impl TempVideoFile {
    /// Creates an empty `temp_video_<millis>.webm` in `dir`.
    pub async fn allocate(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("temp_video_{}.webm", unix_millis()));
        tokio::fs::File::create(&path).await?;
        log::debug!("Allocated temp recording {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Appends chunks to `temp` in arrival order until every sender is dropped.
///
/// Resolves to the number of bytes written.
pub fn spawn_chunk_writer(
    temp: &TempVideoFile,
    mut chunks: ChunkReceiver,
) -> tokio::task::JoinHandle<Result<u64>> {
    let path = temp.path.clone();
    tokio::spawn(async move {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await?;
        let mut written = 0u64;
        while let Some(chunk) = chunks.recv().await {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        log::debug!("Recording writer finished: {} bytes", written);
        Ok(written)
    })
}

/// Rounds down to even numbers; VP9 with yuv420p needs them.
pub fn even_dimensions(width: u32, height: u32) -> (u32, u32) {
    ((width & !1).max(2), (height & !1).max(2))
}

/// Encoder arguments for raw RGBA frames on stdin to WebM on stdout.
pub fn ffmpeg_args(width: u32, height: u32, quality: VideoQuality) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        format!("{}x{}", width, height),
        "-r".into(),
        quality.fps().to_string(),
        "-i".into(),
        "-".into(),
    ];
    args.extend(
        [
            "-c:v",
            "libvpx-vp9",
            "-pix_fmt",
            "yuv420p",
            "-deadline",
            "realtime",
            "-cpu-used",
            "8",
        ]
        .map(String::from),
    );
    args.push("-b:v".into());
    args.push(quality.bitrate().to_string());
    args.extend(["-f", "webm", "-"].map(String::from));
    args
}

/// What to record.
#[derive(Debug, Clone)]
pub struct RecordingRequest {
    pub display_id: u32,
    /// Logical region relative to the display origin.
    pub area: Rect,
    pub scale_factor: f32,
    pub quality: VideoQuality,
    pub ffmpeg: PathBuf,
}

/// Live capture of one screen region into the chunk channel.
pub struct ScreenRecorder {
    stop: Arc<AtomicBool>,
    child: Child,
    capture: Option<JoinHandle<Result<u64>>>,
    reader: Option<JoinHandle<()>>,
}

impl ScreenRecorder {
    /// Spawns the encoder and the capture/reader threads.
    pub fn start(request: RecordingRequest, chunks: ChunkSender) -> Result<Self> {
        let (pw, ph) = physical_size(
            request.area.width as u32,
            request.area.height as u32,
            request.scale_factor,
        );
        let (width, height) = even_dimensions(pw, ph);
        log::info!(
            "Recording {}x{} on display {} at {} fps",
            width,
            height,
            request.display_id,
            request.quality.fps()
        );

        let mut child = Command::new(&request.ffmpeg)
            .args(ffmpeg_args(width, height, request.quality))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                AppError::recorder(format!("failed to start {}: {}", request.ffmpeg.display(), e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::recorder("encoder stdin unavailable"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::recorder("encoder stdout unavailable"))?;

        let stop = Arc::new(AtomicBool::new(false));
        let capture_stop = stop.clone();
        let frame_interval = Duration::from_secs(1) / request.quality.fps();

        let capture = thread::spawn(move || -> Result<u64> {
            let mut frames = 0u64;
            while !capture_stop.load(Ordering::Relaxed) {
                let started = Instant::now();
                let mut frame = ScreenCapturer::capture_area(request.display_id, request.area)?;
                if frame.dimensions() != (width, height) {
                    frame = image::imageops::resize(&frame, width, height, FilterType::Triangle);
                }
                if stdin.write_all(frame.as_raw()).is_err() {
                    // encoder exited
                    break;
                }
                frames += 1;
                if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
                    thread::sleep(rest);
                }
            }
            // dropping stdin lets ffmpeg flush and exit
            Ok(frames)
        });

        let reader = thread::spawn(move || {
            let mut pending = Vec::new();
            let mut buf = vec![0u8; 64 * 1024];
            let mut last_flush = Instant::now();
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => pending.extend_from_slice(&buf[..n]),
                    Err(e) => {
                        log::error!("Reading encoder output failed: {}", e);
                        break;
                    }
                }
                if last_flush.elapsed() >= CHUNK_INTERVAL && !pending.is_empty() {
                    if chunks.blocking_send(std::mem::take(&mut pending)).is_err() {
                        log::warn!("Chunk receiver dropped; discarding encoder output");
                        return;
                    }
                    last_flush = Instant::now();
                }
            }
            if !pending.is_empty() {
                let _ = chunks.blocking_send(pending);
            }
        });

        Ok(Self {
            stop,
            child,
            capture: Some(capture),
            reader: Some(reader),
        })
    }

    /// Stops capturing, waits for the encoder to flush and closes the channel.
    pub fn stop(mut self) -> Result<()> {
        self.stop.store(true, Ordering::Relaxed);

        let frames = match self.capture.take().map(JoinHandle::join) {
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(AppError::recorder("capture thread panicked")),
            None => Ok(0),
        };

        let status = self.child.wait()?;
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }

        let frames = frames?;
        log::info!("Recording stopped after {} frames ({})", frames, status);
        if !status.success() {
            return Err(AppError::recorder(format!("encoder exited with {}", status)));
        }
        Ok(())
    }
}

impl Drop for ScreenRecorder {
    fn drop(&mut self) {
        if self.capture.is_some() {
            self.stop.store(true, Ordering::Relaxed);
            let _ = self.child.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writer_appends_in_order_and_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempVideoFile::allocate(dir.path()).await.unwrap();
        assert!(temp
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("temp_video_"));

        let (tx, rx) = chunk_channel();
        let writer = spawn_chunk_writer(&temp, rx);
        for chunk in [b"one-".to_vec(), b"two-".to_vec(), b"three".to_vec()] {
            tx.send(chunk).await.unwrap();
        }
        drop(tx);

        assert_eq!(writer.await.unwrap().unwrap(), 13);
        assert_eq!(std::fs::read(temp.path()).unwrap(), b"one-two-three");
    }

    #[tokio::test]
    async fn full_channel_blocks_instead_of_dropping() {
        let (tx, mut rx) = chunk_channel();
        for i in 0..CHUNK_CAPACITY {
            tx.try_send(vec![i as u8]).unwrap();
        }
        assert!(matches!(
            tx.try_send(vec![0xff]),
            Err(mpsc::error::TrySendError::Full(_))
        ));
        assert_eq!(rx.recv().await, Some(vec![0]));
        assert!(tx.try_send(vec![0xff]).is_ok());
    }

    #[test]
    fn encoder_gets_even_physical_size() {
        assert_eq!(even_dimensions(301, 151), (300, 150));
        let args = ffmpeg_args(300, 150, VideoQuality::Low);
        let size = args.iter().position(|a| a == "-s").unwrap();
        assert_eq!(args[size + 1], "300x150");
        let rate = args.iter().position(|a| a == "-b:v").unwrap();
        assert_eq!(args[rate + 1], "4000000");
    }
}
