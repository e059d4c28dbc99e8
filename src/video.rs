//! Video input seam plus the in-tree sources.
//!
//! The webcam ([`crate::camera::CameraSource`]) and the procedural test
//! pattern both implement [`VideoSource`].
//! Acquisition is asynchronous: [`request_video`] resolves on a background
//! thread and the host polls the returned [`MediaRequest`] once per tick.

use crate::camera;
use crate::config::VideoInput;
use std::f32::consts::PI;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use thiserror::Error;
use tracing::debug;

pub trait VideoSource {
    /// Native frame size, or `None` while no stream is active.
    fn dimensions(&self) -> Option<(usize, usize)>;

    /// Writes the current frame as unmirrored row-major RGBA into `dst`, which
    /// holds exactly `width * height * 4` bytes.
    fn draw(&mut self, dst: &mut [u8], width: usize, height: usize);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("media permission denied: {0}")]
    PermissionDenied(String),
    #[error("media unavailable: {0}")]
    Unavailable(String),
}

/// Pending media acquisition. Resolves exactly once.
pub struct MediaRequest<T> {
    rx: Option<Receiver<Result<T, MediaError>>>,
    ready: Option<Result<T, MediaError>>,
}

impl<T: Send + 'static> MediaRequest<T> {
    pub fn spawn<F>(label: &str, acquire: F) -> Self
    where
        F: FnOnce() -> Result<T, MediaError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(format!("acquire-{label}"))
            .spawn(move || {
                let _ = tx.send(acquire());
            });
        match spawned {
            Ok(_) => Self {
                rx: Some(rx),
                ready: None,
            },
            Err(err) => Self::resolved(Err(MediaError::Unavailable(format!(
                "spawn {label} acquisition: {err}"
            )))),
        }
    }
}

impl<T> MediaRequest<T> {
    pub fn resolved(result: Result<T, MediaError>) -> Self {
        Self {
            rx: None,
            ready: Some(result),
        }
    }

    /// Returns the outcome on the first poll after it is known, `None` before
    /// that and forever after.
    pub fn poll(&mut self) -> Option<Result<T, MediaError>> {
        if let Some(result) = self.ready.take() {
            return Some(result);
        }
        let rx = self.rx.as_ref()?;
        match rx.try_recv() {
            Ok(result) => {
                self.rx = None;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.rx = None;
                Some(Err(MediaError::Unavailable(
                    "acquisition ended without a result".to_string(),
                )))
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.ready.is_some() || self.rx.is_some()
    }
}

pub type BoxedVideo = Box<dyn VideoSource + Send>;

/// Starts acquiring `input` at `width` x `height`. `camera_index` picks the
/// device when `input` is a camera.
pub fn request_video(
    input: VideoInput,
    width: usize,
    height: usize,
    camera_index: u32,
) -> MediaRequest<BoxedVideo> {
    match input {
        VideoInput::Camera => MediaRequest::spawn("video", move || {
            camera::open(camera_index, width, height).map(|cam| Box::new(cam) as BoxedVideo)
        }),
        VideoInput::Off => MediaRequest::resolved(Err(MediaError::Unavailable(
            "video input disabled".to_string(),
        ))),
        VideoInput::Pattern => MediaRequest::spawn("video", move || {
            if width == 0 || height == 0 {
                return Err(MediaError::Unavailable(format!(
                    "unsupported capture size {width}x{height}"
                )));
            }
            debug!(width, height, "test pattern camera ready");
            Ok(Box::new(TestPatternSource::new(width, height, 30.0)) as BoxedVideo)
        }),
    }
}

/// Procedural stand-in for a webcam: a drifting soft light over a dim
/// diagonal gradient with slowly scrolling bars.
pub struct TestPatternSource {
    width: usize,
    height: usize,
    fps: f32,
    frame: u64,
}

impl TestPatternSource {
    pub fn new(width: usize, height: usize, fps: f32) -> Self {
        Self {
            width,
            height,
            fps: fps.max(1.0),
            frame: 0,
        }
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frame
    }
}

impl VideoSource for TestPatternSource {
    fn dimensions(&self) -> Option<(usize, usize)> {
        (self.width > 0 && self.height > 0).then_some((self.width, self.height))
    }

    fn draw(&mut self, dst: &mut [u8], width: usize, height: usize) {
        let t = self.frame as f32 / self.fps;
        self.frame += 1;

        let wf = width.max(1) as f32;
        let hf = height.max(1) as f32;
        let cx = 0.5 + 0.32 * (t * 0.7).cos();
        let cy = 0.5 + 0.28 * (t * 1.1).sin();
        let radius = 0.22 + 0.05 * (t * 2.3).sin();

        for (i, px) in dst.chunks_exact_mut(4).enumerate() {
            let x = (i % width) as f32 / wf;
            let y = (i / width) as f32 / hf;

            let base = 40.0 + 70.0 * (x + y) * 0.5;
            let bars = 25.0 * ((x * 6.0 + t * 0.4) * PI).sin().max(0.0);
            let dx = x - cx;
            let dy = (y - cy) * hf / wf;
            let d2 = (dx * dx + dy * dy) / (radius * radius);
            let light = 150.0 * (-d2).exp();

            let v = base + bars + light;
            px[0] = (v * 1.05).clamp(0.0, 255.0) as u8;
            px[1] = v.clamp(0.0, 255.0) as u8;
            px[2] = (v * 0.9).clamp(0.0, 255.0) as u8;
            px[3] = 255;
        }
    }
}

/// Serves one fixed frame until the stream is ended.
#[derive(Debug, Clone)]
pub struct StillFrameSource {
    width: usize,
    height: usize,
    rgba: Vec<u8>,
    live: bool,
}

impl StillFrameSource {
    pub fn from_rgba(width: usize, height: usize, rgba: Vec<u8>) -> Option<Self> {
        if rgba.len() != width.checked_mul(height)?.checked_mul(4)? {
            return None;
        }
        Some(Self {
            width,
            height,
            rgba,
            live: true,
        })
    }

    pub fn uniform(width: usize, height: usize, rgb: [u8; 3]) -> Self {
        let mut rgba = vec![255u8; width * height * 4];
        for px in rgba.chunks_exact_mut(4) {
            px[..3].copy_from_slice(&rgb);
        }
        Self {
            width,
            height,
            rgba,
            live: true,
        }
    }

    pub fn set_frame(&mut self, rgba: Vec<u8>) -> bool {
        if rgba.len() != self.rgba.len() {
            return false;
        }
        self.rgba = rgba;
        true
    }

    pub fn end_stream(&mut self) {
        self.live = false;
    }
}

impl VideoSource for StillFrameSource {
    fn dimensions(&self) -> Option<(usize, usize)> {
        (self.live && self.width > 0 && self.height > 0).then_some((self.width, self.height))
    }

    fn draw(&mut self, dst: &mut [u8], _width: usize, _height: usize) {
        let n = dst.len().min(self.rgba.len());
        dst[..n].copy_from_slice(&self.rgba[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for<T>(req: &mut MediaRequest<T>) -> Result<T, MediaError> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = req.poll() {
                return result;
            }
            assert!(Instant::now() < deadline, "media request never resolved");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn pattern_request_resolves_once() {
        let mut req = request_video(VideoInput::Pattern, 8, 6, 0);
        let video = wait_for(&mut req).expect("pattern camera should open");
        assert_eq!(video.dimensions(), Some((8, 6)));
        assert!(req.poll().is_none());
        assert!(!req.is_pending());
    }

    #[test]
    fn disabled_video_is_unavailable() {
        let mut req = request_video(VideoInput::Off, 8, 6, 0);
        assert!(matches!(req.poll(), Some(Err(MediaError::Unavailable(_)))));
        assert!(req.poll().is_none());
    }

    #[cfg(not(feature = "camera"))]
    #[test]
    fn camera_without_support_is_unavailable() {
        let mut req = request_video(VideoInput::Camera, 8, 6, 0);
        let err = wait_for(&mut req).err().expect("camera support is not built in");
        assert!(matches!(err, MediaError::Unavailable(_)));
        assert!(!req.is_pending());
    }

    #[test]
    fn pattern_fills_opaque_pixels_and_animates() {
        let mut src = TestPatternSource::new(16, 12, 30.0);
        let mut a = vec![0u8; 16 * 12 * 4];
        let mut b = vec![0u8; 16 * 12 * 4];
        src.draw(&mut a, 16, 12);
        for _ in 0..10 {
            src.draw(&mut b, 16, 12);
        }
        assert!(a.chunks_exact(4).all(|px| px[3] == 255));
        assert_ne!(a, b);
        assert_eq!(src.frames_drawn(), 11);
    }

    #[test]
    fn ended_still_frame_has_no_dimensions() {
        let mut src = StillFrameSource::uniform(2, 2, [10, 20, 30]);
        assert_eq!(src.dimensions(), Some((2, 2)));
        src.end_stream();
        assert_eq!(src.dimensions(), None);
        assert!(StillFrameSource::from_rgba(2, 2, vec![0; 15]).is_none());
    }
}
