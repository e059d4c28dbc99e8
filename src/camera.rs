//! Live webcam input.
//!
//! The device handle is opened and read on a dedicated capture thread, which
//! publishes the newest decoded frame into a shared slot. [`CameraSource`] is
//! the `Send` handle the tick loop samples from; it rescales whatever the
//! device delivers to the requested capture size.
//!
//! Device access goes through `nokhwa` and is compiled in with the `camera`
//! feature. Without it, opening a camera reports the input as unavailable.

use crate::video::{MediaError, VideoSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

/// One decoded RGB8 frame as delivered by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbFrame {
    pub width: usize,
    pub height: usize,
    pub rgb: Vec<u8>,
}

#[derive(Default)]
struct CaptureSlot {
    frame: Mutex<Option<RgbFrame>>,
    live: AtomicBool,
}

impl CaptureSlot {
    fn publish(&self, frame: RgbFrame) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
        self.live.store(true, Ordering::Release);
    }
}

/// Handle to a running capture thread.
pub struct CameraSource {
    width: usize,
    height: usize,
    slot: Arc<CaptureSlot>,
    stop: Arc<AtomicBool>,
}

impl CameraSource {
    /// Starts a capture thread and blocks until the first frame arrives.
    ///
    /// `open` runs on the capture thread and returns the frame grabber, so
    /// device handles that cannot leave their thread stay there.
    pub fn spawn<F, G>(width: usize, height: usize, open: F) -> Result<Self, MediaError>
    where
        F: FnOnce() -> Result<G, MediaError> + Send + 'static,
        G: FnMut() -> Result<RgbFrame, String>,
    {
        if width == 0 || height == 0 {
            return Err(MediaError::Unavailable(format!(
                "unsupported capture size {width}x{height}"
            )));
        }

        let slot = Arc::new(CaptureSlot::default());
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let slot_for_thread = Arc::clone(&slot);
        let stop_for_thread = Arc::clone(&stop);

        thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                let mut grab = match open() {
                    Ok(grab) => grab,
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        return;
                    }
                };
                let mut ready = Some(tx);
                let mut frames = 0u64;
                while !stop_for_thread.load(Ordering::Relaxed) {
                    match grab() {
                        Ok(frame) => {
                            slot_for_thread.publish(frame);
                            frames += 1;
                            if let Some(tx) = ready.take() {
                                let _ = tx.send(Ok(()));
                            }
                        }
                        Err(reason) => {
                            match ready.take() {
                                Some(tx) => {
                                    let _ = tx.send(Err(open_error(&reason)));
                                }
                                None => warn!(%reason, "camera stream lost"),
                            }
                            break;
                        }
                    }
                }
                slot_for_thread.live.store(false, Ordering::Release);
                debug!(frames, "camera capture stopped");
            })
            .map_err(|err| MediaError::Unavailable(format!("spawn camera capture: {err}")))?;

        match rx.recv() {
            Ok(Ok(())) => Ok(Self {
                width,
                height,
                slot,
                stop,
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(MediaError::Unavailable(
                "camera capture ended before the first frame".to_string(),
            )),
        }
    }

    /// Size of the newest frame the device delivered.
    pub fn native_size(&self) -> Option<(usize, usize)> {
        let frame = self.slot.frame.lock().unwrap_or_else(PoisonError::into_inner);
        frame.as_ref().map(|f| (f.width, f.height))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl VideoSource for CameraSource {
    fn dimensions(&self) -> Option<(usize, usize)> {
        self.slot
            .live
            .load(Ordering::Acquire)
            .then_some((self.width, self.height))
    }

    fn draw(&mut self, dst: &mut [u8], width: usize, height: usize) {
        let frame = self.slot.frame.lock().unwrap_or_else(PoisonError::into_inner);
        match frame.as_ref() {
            Some(frame) => resample_rgb(frame, dst, width, height),
            None => dst.fill(0),
        }
    }
}

/// Nearest-neighbour scale of `src` into an RGBA `dst` of `width` x `height`.
/// A malformed source frame paints opaque black.
pub fn resample_rgb(src: &RgbFrame, dst: &mut [u8], width: usize, height: usize) {
    let usable = src.width > 0 && src.height > 0 && src.rgb.len() >= src.width * src.height * 3;
    for (i, px) in dst.chunks_exact_mut(4).take(width * height).enumerate() {
        if !usable {
            px.copy_from_slice(&[0, 0, 0, 255]);
            continue;
        }
        let sx = (i % width) * src.width / width;
        let sy = (i / width) * src.height / height;
        let o = (sy * src.width + sx) * 3;
        px[..3].copy_from_slice(&src.rgb[o..o + 3]);
        px[3] = 255;
    }
}

/// Maps a device error onto the media error the host reports.
pub fn open_error(reason: &str) -> MediaError {
    let lower = reason.to_ascii_lowercase();
    let denied = ["permission", "denied", "not authorized", "unauthorized", "eacces"]
        .iter()
        .any(|k| lower.contains(k));
    if denied {
        MediaError::PermissionDenied(reason.to_string())
    } else {
        MediaError::Unavailable(reason.to_string())
    }
}

/// Opens camera `index` and streams it at `width` x `height`.
#[cfg(feature = "camera")]
pub fn open(index: u32, width: usize, height: usize) -> Result<CameraSource, MediaError> {
    let source = CameraSource::spawn(width, height, move || {
        device::open(index).map(|mut camera| move || device::grab(&mut camera))
    })?;
    info!(index, native = ?source.native_size(), width, height, "camera ready");
    Ok(source)
}

#[cfg(not(feature = "camera"))]
pub fn open(index: u32, width: usize, height: usize) -> Result<CameraSource, MediaError> {
    info!(index, width, height, "camera requested in a build without camera support");
    Err(MediaError::Unavailable(
        "built without camera support (enable the `camera` feature or use --video pattern)"
            .to_string(),
    ))
}

#[cfg(feature = "camera")]
pub fn list_cameras() -> anyhow::Result<()> {
    use std::io::Write;

    let cameras = nokhwa::query(nokhwa::utils::ApiBackend::Auto)
        .map_err(|err| anyhow::anyhow!("enumerate cameras: {err}"))?;
    let mut out = std::io::stdout();
    writeln!(out, "Cameras:")?;
    for cam in cameras {
        writeln!(out, "  - [{}] {}", cam.index(), cam.human_name())?;
    }
    Ok(())
}

#[cfg(not(feature = "camera"))]
pub fn list_cameras() -> anyhow::Result<()> {
    use std::io::Write;

    writeln!(std::io::stdout(), "Cameras: (built without camera support)")?;
    Ok(())
}

#[cfg(feature = "camera")]
mod device {
    use super::{RgbFrame, open_error};
    use crate::video::MediaError;
    use nokhwa::Camera;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};

    pub(super) fn open(index: u32) -> Result<Camera, MediaError> {
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(index), format)
            .map_err(|err| open_error(&err.to_string()))?;
        camera
            .open_stream()
            .map_err(|err| open_error(&err.to_string()))?;
        Ok(camera)
    }

    pub(super) fn grab(camera: &mut Camera) -> Result<RgbFrame, String> {
        let buffer = camera.frame().map_err(|err| err.to_string())?;
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|err| err.to_string())?;
        Ok(RgbFrame {
            width: image.width() as usize,
            height: image.height() as usize,
            rgb: image.into_raw(),
        })
    }
}
