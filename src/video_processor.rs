// src/video_processor.rs
//
// Frame I/O. The batch pipeline only sees the FrameSource / FrameSink
// traits; image-sequence directories are always available, video files
// need the `video` feature (OpenCV).

use crate::types::{Frame, VideoConfig};
use anyhow::{bail, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
#[cfg(feature = "video")]
const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

/// Suffix of the pre-computed pose track that sits next to each input.
pub const POSE_TRACK_SUFFIX: &str = ".poses.jsonl";

// ============================================================================
// TRAITS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// None when the container does not report a frame count.
    pub total_frames: Option<u64>,
}

pub trait FrameSource: Send {
    fn info(&self) -> &StreamInfo;

    /// Next frame in order, or None at end of stream.
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flushes and closes the output.
    fn finish(&mut self) -> Result<()>;

    fn output_path(&self) -> &Path;
}

// ============================================================================
// IMAGE SEQUENCES
// ============================================================================

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Frames stored as numbered images in one directory, read in file-name order.
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    next: usize,
    info: StreamInfo,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: f64) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("cannot list {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && has_extension(p, &IMAGE_EXTENSIONS))
            .collect();
        files.sort();

        let Some(first) = files.first() else {
            bail!("no image frames in {}", dir.display());
        };
        let (width, height) = image::image_dimensions(first)
            .with_context(|| format!("cannot read {}", first.display()))?;

        info!(
            "Image sequence {}: {}x{} @ {:.1} FPS, {} frames",
            dir.display(),
            width,
            height,
            fps,
            files.len()
        );

        Ok(Self {
            info: StreamInfo {
                width,
                height,
                fps,
                total_frames: Some(files.len() as u64),
            },
            files,
            next: 0,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let image = image::open(path)
            .with_context(|| format!("cannot decode {}", path.display()))?
            .to_rgb8();
        if image.dimensions() != (self.info.width, self.info.height) {
            bail!(
                "{} is {}x{}, expected {}x{}",
                path.display(),
                image.width(),
                image.height(),
                self.info.width,
                self.info.height
            );
        }

        let index = self.next as u64;
        self.next += 1;
        let timestamp_ms = index as f64 * 1000.0 / self.info.fps;
        Ok(Some(Frame::new(index, timestamp_ms, image)))
    }
}

/// Writes each frame as `frame_NNNNNN.png` into one directory.
pub struct ImageSequenceSink {
    dir: PathBuf,
    written: u64,
}

impl ImageSequenceSink {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create {}", dir.display()))?;
        let meta = std::fs::metadata(dir)?;
        if meta.permissions().readonly() {
            bail!("{} is read-only", dir.display());
        }
        info!("Output frames: {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let path = self.dir.join(format!("frame_{:06}.png", frame.index));
        frame
            .image
            .save(&path)
            .with_context(|| format!("cannot write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        debug!("Wrote {} frames to {}", self.written, self.dir.display());
        Ok(())
    }

    fn output_path(&self) -> &Path {
        &self.dir
    }
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// Frames held in memory. Used for tests and for callers that decode
/// frames themselves.
pub struct MemorySource {
    frames: std::vec::IntoIter<RgbImage>,
    index: u64,
    info: StreamInfo,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        let (width, height) = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        Self {
            info: StreamInfo {
                width,
                height,
                fps,
                total_frames: Some(frames.len() as u64),
            },
            frames: frames.into_iter(),
            index: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(image) = self.frames.next() else {
            return Ok(None);
        };
        let index = self.index;
        self.index += 1;
        Ok(Some(Frame::new(index, index as f64 * 1000.0 / self.info.fps, image)))
    }
}

/// Collects written frames in memory.
#[derive(Default)]
pub struct MemorySink {
    pub frames: Vec<Frame>,
    pub finished: bool,
    path: PathBuf,
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn output_path(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// VIDEO FILES (OpenCV)
// ============================================================================

#[cfg(feature = "video")]
pub use opencv_io::{VideoFileSink, VideoFileSource};

#[cfg(feature = "video")]
mod opencv_io {
    use super::{FrameSink, FrameSource, StreamInfo};
    use crate::types::Frame;
    use anyhow::{bail, Context, Result};
    use image::RgbImage;
    use opencv::{
        core::{self, Mat},
        imgproc,
        prelude::*,
        videoio::{
            self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst, VideoWriter,
            VideoWriterTrait,
        },
    };
    use std::path::{Path, PathBuf};
    use tracing::info;

    pub struct VideoFileSource {
        cap: VideoCapture,
        info: StreamInfo,
        next_index: u64,
    }

    impl VideoFileSource {
        pub fn open(path: &Path) -> Result<Self> {
            info!("Opening video: {}", path.display());

            let path_str = path
                .to_str()
                .with_context(|| format!("non UTF-8 path {}", path.display()))?;
            let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;

            if !cap.is_opened()? {
                bail!("Failed to open video file {}", path.display());
            }

            let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
            let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)?;
            let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as u32;
            let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
            let fps = if fps > 0.0 { fps } else { 30.0 };

            info!(
                "Video properties: {}x{} @ {:.1} FPS, {} frames",
                width, height, fps, total_frames
            );

            Ok(Self {
                cap,
                info: StreamInfo {
                    width,
                    height,
                    fps,
                    total_frames: (total_frames > 0.0).then_some(total_frames as u64),
                },
                next_index: 0,
            })
        }
    }

    impl FrameSource for VideoFileSource {
        fn info(&self) -> &StreamInfo {
            &self.info
        }

        fn read_frame(&mut self) -> Result<Option<Frame>> {
            let mut mat = Mat::default();
            if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
                return Ok(None);
            }

            let mut rgb_mat = Mat::default();
            imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;

            let (width, height) = (rgb_mat.cols() as u32, rgb_mat.rows() as u32);
            let data = rgb_mat.data_bytes()?.to_vec();
            let image = RgbImage::from_raw(width, height, data)
                .context("decoded frame has an unexpected buffer size")?;

            let index = self.next_index;
            self.next_index += 1;
            let timestamp_ms = index as f64 * 1000.0 / self.info.fps;
            Ok(Some(Frame::new(index, timestamp_ms, image)))
        }
    }

    pub struct VideoFileSink {
        writer: VideoWriter,
        path: PathBuf,
    }

    impl VideoFileSink {
        pub fn create(path: &Path, info: &StreamInfo) -> Result<Self> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let path_str = path
                .to_str()
                .with_context(|| format!("non UTF-8 path {}", path.display()))?;

            info!("Output video: {}", path.display());

            let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
            let writer = VideoWriter::new(
                path_str,
                fourcc,
                info.fps,
                core::Size::new(info.width as i32, info.height as i32),
                true,
            )?;
            if !writer.is_opened()? {
                bail!("Failed to open video writer {}", path.display());
            }

            Ok(Self {
                writer,
                path: path.to_path_buf(),
            })
        }
    }

    impl FrameSink for VideoFileSink {
        fn write_frame(&mut self, frame: &Frame) -> Result<()> {
            let mat = Mat::from_slice(frame.image.as_raw())?;
            let mat = mat.reshape(3, frame.height() as i32)?;

            let mut bgr_mat = Mat::default();
            imgproc::cvt_color(&*mat, &mut bgr_mat, imgproc::COLOR_RGB2BGR, 0)?;
            VideoWriterTrait::write(&mut self.writer, &bgr_mat)?;
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            VideoWriterTrait::release(&mut self.writer)?;
            Ok(())
        }

        fn output_path(&self) -> &Path {
            &self.path
        }
    }
}

// ============================================================================
// DISCOVERY & FACTORIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    ImageSequence,
    VideoFile,
}

/// One analysable input: frames plus the pose track that goes with them.
#[derive(Debug, Clone, PartialEq)]
pub struct InputJob {
    pub path: PathBuf,
    pub kind: InputKind,
    pub poses: PathBuf,
}

impl InputJob {
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string())
    }
}

/// `<dir>/<stem>.poses.jsonl` for `<dir>/<stem>[.ext]`.
pub fn pose_track_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{POSE_TRACK_SUFFIX}"))
}

pub fn input_kind(path: &Path) -> Option<InputKind> {
    if path.is_dir() {
        return Some(InputKind::ImageSequence);
    }
    #[cfg(feature = "video")]
    {
        if has_extension(path, &VIDEO_EXTENSIONS) {
            return Some(InputKind::VideoFile);
        }
    }
    None
}

pub fn open_source(path: &Path, default_fps: f64) -> Result<Box<dyn FrameSource>> {
    match input_kind(path) {
        Some(InputKind::ImageSequence) => Ok(Box::new(ImageSequenceSource::open(path, default_fps)?)),
        #[cfg(feature = "video")]
        Some(InputKind::VideoFile) => Ok(Box::new(VideoFileSource::open(path)?)),
        _ => bail!("unsupported input {}", path.display()),
    }
}

/// Where the annotated output for `input` goes under `output_dir`.
pub fn annotated_output_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    match input_kind(input) {
        Some(InputKind::VideoFile) => output_dir.join(format!("{stem}_annotated.mp4")),
        _ => output_dir.join(format!("{stem}_annotated")),
    }
}

pub fn create_sink(output: &Path, info: &StreamInfo) -> Result<Box<dyn FrameSink>> {
    #[cfg(feature = "video")]
    {
        if has_extension(output, &VIDEO_EXTENSIONS) {
            return Ok(Box::new(VideoFileSink::create(output, info)?));
        }
    }
    debug!("Sink for {}x{} frames", info.width, info.height);
    Ok(Box::new(ImageSequenceSink::create(output)?))
}

pub struct VideoProcessor {
    config: VideoConfig,
}

impl VideoProcessor {
    pub fn new(config: VideoConfig) -> Self {
        Self { config }
    }

    /// Inputs under `input_dir` that have a pose track next to them.
    pub fn find_inputs(&self) -> Result<Vec<InputJob>> {
        let mut jobs = Vec::new();

        for entry in WalkDir::new(&self.config.input_dir)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let Some(kind) = input_kind(path) else {
                continue;
            };
            if kind == InputKind::ImageSequence && !Self::contains_images(path) {
                continue;
            }

            let poses = pose_track_path(path);
            if !poses.is_file() {
                warn!("⚠️  Skipping {}: no {}", path.display(), poses.display());
                continue;
            }
            jobs.push(InputJob {
                path: path.to_path_buf(),
                kind,
                poses,
            });
        }

        info!("Found {} inputs", jobs.len());
        Ok(jobs)
    }

    fn contains_images(dir: &Path) -> bool {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .any(|e| has_extension(&e.path(), &IMAGE_EXTENSIONS))
            })
            .unwrap_or(false)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.output_dir)
    }

    pub fn summary_path(&self, job: &InputJob) -> PathBuf {
        self.output_dir().join(format!("{}_summary.json", job.stem()))
    }
}
