use particle_mirror::frame::{FrameSampler, PixelBuffer, SampleError, cache_bucket};
use particle_mirror::video::{StillFrameSource, TestPatternSource, VideoSource};
use std::time::Duration;

/// Source whose size can change between frames.
struct ResizingSource {
    size: (usize, usize),
}

impl VideoSource for ResizingSource {
    fn dimensions(&self) -> Option<(usize, usize)> {
        Some(self.size)
    }

    fn draw(&mut self, dst: &mut [u8], _width: usize, _height: usize) {
        dst.fill(128);
    }
}

/// 3x2 frame where each pixel's red channel is its column.
fn column_frame() -> StillFrameSource {
    let mut rgba = Vec::new();
    for _y in 0..2 {
        for x in 0..3u8 {
            rgba.extend_from_slice(&[x, 10, 20, 255]);
        }
    }
    StillFrameSource::from_rgba(3, 2, rgba).unwrap()
}

#[test]
fn cached_sample_shares_the_buffer() {
    let mut sampler = FrameSampler::new();
    let mut src = TestPatternSource::new(8, 6, 30.0);
    let a = sampler.sample(&mut src, true).unwrap();
    let b = sampler.sample(&mut src, true).unwrap();
    assert!(a.ptr_eq(&b));
    assert_eq!(sampler.captures(), 1);
    assert_eq!(src.frames_drawn(), 1);
}

#[test]
fn uncached_sample_always_captures() {
    let mut sampler = FrameSampler::new();
    let mut src = TestPatternSource::new(8, 6, 30.0);
    let a = sampler.sample(&mut src, false).unwrap();
    let b = sampler.sample(&mut src, false).unwrap();
    assert!(!a.ptr_eq(&b));
    assert_eq!(sampler.captures(), 2);
    assert!(sampler.cached().unwrap().ptr_eq(&b));
}

#[test]
fn first_sample_captures_even_with_cache_enabled() {
    let mut sampler = FrameSampler::new();
    let mut src = column_frame();
    assert!(sampler.cached().is_none());
    sampler.sample(&mut src, true).unwrap();
    assert_eq!(sampler.captures(), 1);
}

#[test]
fn samples_are_mirrored_horizontally() {
    let mut sampler = FrameSampler::new();
    let mut src = column_frame();
    let buf = sampler.sample(&mut src, false).unwrap();
    assert_eq!((buf.width(), buf.height()), (3, 2));
    for row in buf.data().chunks_exact(3 * 4) {
        assert_eq!(row, [2, 10, 20, 255, 1, 10, 20, 255, 0, 10, 20, 255]);
    }
}

#[test]
fn lost_stream_is_not_masked_by_cache() {
    let mut sampler = FrameSampler::new();
    let mut src = column_frame();
    sampler.sample(&mut src, false).unwrap();
    src.end_stream();
    assert_eq!(sampler.sample(&mut src, true).unwrap_err(), SampleError::SourceUnavailable);
    assert_eq!(sampler.captures(), 1);
}

#[test]
fn zero_sized_source_is_unavailable() {
    let mut sampler = FrameSampler::new();
    let mut src = ResizingSource { size: (0, 4) };
    assert_eq!(sampler.sample(&mut src, false).unwrap_err(), SampleError::SourceUnavailable);
    assert!(sampler.resolution().is_none());
}

#[test]
fn resolution_is_locked_after_first_capture() {
    let mut sampler = FrameSampler::new();
    let mut src = ResizingSource { size: (4, 4) };
    sampler.sample(&mut src, false).unwrap();
    src.size = (8, 4);
    assert_eq!(
        sampler.sample(&mut src, false).unwrap_err(),
        SampleError::ResolutionChanged {
            expected: (4, 4),
            actual: (8, 4),
        }
    );
    assert_eq!(sampler.resolution(), Some((4, 4)));
    src.size = (4, 4);
    assert!(sampler.sample(&mut src, true).is_ok());
}

#[test]
fn pixel_buffer_rejects_wrong_length() {
    assert!(PixelBuffer::from_rgba(2, 2, vec![0; 16]).is_some());
    assert!(PixelBuffer::from_rgba(2, 2, vec![0; 12]).is_none());
}

#[test]
fn bucket_alternates_reuse_and_capture() {
    let pattern = (0..6)
        .map(|i| cache_bucket(Duration::from_millis(i * 250), 500))
        .collect::<Vec<_>>();
    assert_eq!(pattern, vec![true, true, false, false, true, true]);
}
