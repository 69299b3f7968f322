//! Graphics backends owning the texture-like buffers tracks render into
//!
//! Buffers are created, copied and destroyed only on the main execution
//! context. Two backends are provided and one is selected at startup:
//!
//! - [`SoftwareBackend`]: CPU pixel storage, used headless and in tests
//! - [`NativeTextureBackend`]: GPU textures behind an external [`TextureDevice`]

use crate::error::{MediaError, MediaResult};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use trackbridge_core::{DispatcherHandle, NativeHandle};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Pixel formats a buffer can be allocated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA, linear
    Rgba8Unorm,
    /// 8-bit RGBA, sRGB encoded
    Rgba8Srgb,
    /// 8-bit BGRA, linear
    Bgra8Unorm,
    /// 8-bit BGRA, sRGB encoded
    Bgra8Srgb,
    /// 10-bit RGB with 2-bit alpha
    Rgb10A2Unorm,
    /// Half-float RGBA
    Rgba16Float,
    /// Single 8-bit channel
    R8Unorm,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8Unorm
            | PixelFormat::Rgba8Srgb
            | PixelFormat::Bgra8Unorm
            | PixelFormat::Bgra8Srgb
            | PixelFormat::Rgb10A2Unorm => 4,
            PixelFormat::Rgba16Float => 8,
            PixelFormat::R8Unorm => 1,
        }
    }

    /// Whether the red and blue channels are stored swapped
    pub fn is_bgra(self) -> bool {
        matches!(self, PixelFormat::Bgra8Unorm | PixelFormat::Bgra8Srgb)
    }

    /// Whether this is one of the 8-bit four-channel formats
    pub fn is_rgba8_family(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba8Unorm
                | PixelFormat::Rgba8Srgb
                | PixelFormat::Bgra8Unorm
                | PixelFormat::Bgra8Srgb
        )
    }
}

/// Identity of a buffer allocation, stable for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BufferId(u64);

/// Transform applied by [`GraphicsBackend::blit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitTransform {
    /// Straight copy
    Identity,
    /// Reverse row order
    FlipVertical,
}

impl BlitTransform {
    /// Transform matching a track's flip flag
    pub fn for_flip(need_flip: bool) -> Self {
        if need_flip {
            BlitTransform::FlipVertical
        } else {
            BlitTransform::Identity
        }
    }
}

/// Graphics backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// CPU pixel buffers
    #[default]
    Software,
    /// Native GPU textures
    NativeTexture,
}

struct BufferInner {
    id: BufferId,
    width: u32,
    height: u32,
    format: PixelFormat,
    native: NativeHandle,
    pixels: Option<Mutex<Vec<u8>>>,
    destroyed: AtomicBool,
}

/// Reference to a texture-like buffer
///
/// Clones share the same allocation. Exactly one track or sink owns the
/// buffer and destroys it; everyone else holds a borrowed reference that may
/// go stale, which [`is_destroyed`](GpuBuffer::is_destroyed) reports.
#[derive(Clone)]
pub struct GpuBuffer {
    inner: Arc<BufferInner>,
}

impl GpuBuffer {
    /// Create a buffer backed by CPU memory, zero-filled
    ///
    /// Fails with [`MediaError::InvalidDimensions`] when the size is zero or
    /// the byte length does not fit in memory.
    pub fn with_pixels(
        width: u32,
        height: u32,
        format: PixelFormat,
        native: NativeHandle,
    ) -> MediaResult<Self> {
        let len = validate_dimensions(width, height, format)?;
        Ok(Self::build(width, height, format, native, Some(vec![0; len])))
    }

    /// Create a buffer whose storage lives behind a native texture handle
    pub fn external(width: u32, height: u32, format: PixelFormat, native: NativeHandle) -> Self {
        Self::build(width, height, format, native, None)
    }

    fn build(
        width: u32,
        height: u32,
        format: PixelFormat,
        native: NativeHandle,
        pixels: Option<Vec<u8>>,
    ) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                id: BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed)),
                width,
                height,
                format,
                native,
                pixels: pixels.map(Mutex::new),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// Allocation identity
    pub fn id(&self) -> BufferId {
        self.inner.id
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.inner.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.inner.width, self.inner.height)
    }

    /// Pixel format
    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    /// Native texture handle handed to the media engine
    pub fn native_handle(&self) -> NativeHandle {
        self.inner.native
    }

    /// Whether both references point at the same allocation
    pub fn same_buffer(&self, other: &GpuBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether the owner has released this buffer
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Mark the buffer released and free CPU storage
    ///
    /// Returns `false` if it was already released. Called by backends from
    /// [`GraphicsBackend::destroy`].
    pub fn mark_destroyed(&self) -> bool {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(pixels) = &self.inner.pixels {
            let mut pixels = pixels.lock();
            pixels.clear();
            pixels.shrink_to_fit();
        }
        true
    }

    /// Snapshot of the CPU pixels, `None` for native textures or released
    /// buffers
    pub fn read_pixels(&self) -> Option<Bytes> {
        if self.is_destroyed() {
            return None;
        }
        self.inner
            .pixels
            .as_ref()
            .map(|pixels| Bytes::copy_from_slice(&pixels.lock()))
    }

    /// Overwrite the CPU pixels
    pub fn write_pixels(&self, data: &[u8]) -> MediaResult<()> {
        if self.is_destroyed() {
            return Err(MediaError::invalid_state("buffer has been released"));
        }
        let pixels = self
            .inner
            .pixels
            .as_ref()
            .ok_or_else(|| MediaError::graphics("buffer has no CPU storage"))?;

        let mut pixels = pixels.lock();
        if pixels.len() != data.len() {
            return Err(MediaError::graphics(format!(
                "pixel data is {} bytes, buffer holds {}",
                data.len(),
                pixels.len()
            )));
        }
        pixels.copy_from_slice(data);
        Ok(())
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("id", &self.inner.id)
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("format", &self.inner.format)
            .field("native", &self.inner.native)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Host graphics subsystem
///
/// Every method must be called on the main execution context.
pub trait GraphicsBackend: Send + Sync {
    /// Backend variant
    fn kind(&self) -> BackendKind;

    /// Pixel format buffers should be allocated in on this device
    fn supported_format(&self) -> PixelFormat;

    /// Allocate a buffer
    fn create_buffer(&self, width: u32, height: u32, format: PixelFormat) -> MediaResult<GpuBuffer>;

    /// Copy `src` into `dst`, applying `transform`
    fn blit(&self, src: &GpuBuffer, dst: &GpuBuffer, transform: BlitTransform) -> MediaResult<()>;

    /// Release a buffer
    fn destroy(&self, buffer: GpuBuffer);
}

/// Release `buffer` on the main execution context
///
/// Runs immediately when called on the dispatcher's consumer thread,
/// otherwise posts the release tagged with `owner`. If the dispatcher is
/// already torn down the buffer is simply dropped.
pub fn release_on_main(
    dispatcher: &DispatcherHandle,
    graphics: &Arc<dyn GraphicsBackend>,
    owner: NativeHandle,
    buffer: GpuBuffer,
) {
    if dispatcher.is_consumer_thread() {
        graphics.destroy(buffer);
        return;
    }

    let graphics = Arc::clone(graphics);
    if let Err(e) = dispatcher.post(owner, move || graphics.destroy(buffer)) {
        debug!("{}, dropping buffer of {} without release", e, owner);
    }
}

/// Byte length of a `width`x`height` buffer, rejecting empty or overflowing
/// sizes reported by a decoder
fn validate_dimensions(width: u32, height: u32, format: PixelFormat) -> MediaResult<usize> {
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(format.bytes_per_pixel()))
        .filter(|len| *len > 0 && *len <= isize::MAX as usize);
    len.ok_or(MediaError::InvalidDimensions { width, height })
}

/// CPU-backed graphics backend
#[derive(Debug)]
pub struct SoftwareBackend {
    format: PixelFormat,
    next_texture: AtomicU64,
    live_buffers: AtomicUsize,
    blits: AtomicU64,
}

impl SoftwareBackend {
    /// Texture handles handed out by the software backend live in their own
    /// range so they never collide with engine object handles.
    const TEXTURE_HANDLE_BASE: u64 = 0x7000_0000;

    /// Create a backend allocating RGBA8 buffers
    pub fn new() -> Self {
        Self::with_format(PixelFormat::Rgba8Unorm)
    }

    /// Create a backend reporting `format` as the device format
    pub fn with_format(format: PixelFormat) -> Self {
        Self {
            format,
            next_texture: AtomicU64::new(Self::TEXTURE_HANDLE_BASE),
            live_buffers: AtomicUsize::new(0),
            blits: AtomicU64::new(0),
        }
    }

    /// Buffers created and not yet destroyed
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.load(Ordering::Acquire)
    }

    /// Number of blits performed
    pub fn blit_count(&self) -> u64 {
        self.blits.load(Ordering::Relaxed)
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for SoftwareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn supported_format(&self) -> PixelFormat {
        self.format
    }

    fn create_buffer(&self, width: u32, height: u32, format: PixelFormat) -> MediaResult<GpuBuffer> {
        validate_dimensions(width, height, format)?;
        let native = NativeHandle::from_raw(self.next_texture.fetch_add(1, Ordering::Relaxed));
        let buffer = GpuBuffer::with_pixels(width, height, format, native)?;
        self.live_buffers.fetch_add(1, Ordering::AcqRel);
        trace!("Software buffer {:?} {}x{} {:?}", buffer.id(), width, height, format);
        Ok(buffer)
    }

    fn blit(&self, src: &GpuBuffer, dst: &GpuBuffer, transform: BlitTransform) -> MediaResult<()> {
        if src.is_destroyed() || dst.is_destroyed() {
            return Err(MediaError::invalid_state("blit on a released buffer"));
        }
        if src.dimensions() != dst.dimensions() {
            return Err(MediaError::graphics(format!(
                "blit size mismatch: {}x{} -> {}x{}",
                src.width(),
                src.height(),
                dst.width(),
                dst.height()
            )));
        }

        let bpp = src.format().bytes_per_pixel();
        if bpp != dst.format().bytes_per_pixel() {
            return Err(MediaError::graphics(format!(
                "blit format mismatch: {:?} -> {:?}",
                src.format(),
                dst.format()
            )));
        }
        let swizzle = src.format().is_rgba8_family()
            && dst.format().is_rgba8_family()
            && src.format().is_bgra() != dst.format().is_bgra();

        let source = src
            .read_pixels()
            .ok_or_else(|| MediaError::graphics("source buffer has no CPU storage"))?;
        let row_len = src.width() as usize * bpp;
        let rows = src.height() as usize;

        let mut out = vec![0u8; source.len()];
        for row in 0..rows {
            let from = match transform {
                BlitTransform::Identity => row,
                BlitTransform::FlipVertical => rows - 1 - row,
            };
            let dst_row = &mut out[row * row_len..(row + 1) * row_len];
            dst_row.copy_from_slice(&source[from * row_len..(from + 1) * row_len]);
            if swizzle {
                for pixel in dst_row.chunks_exact_mut(4) {
                    pixel.swap(0, 2);
                }
            }
        }

        dst.write_pixels(&out)?;
        self.blits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn destroy(&self, buffer: GpuBuffer) {
        if buffer.mark_destroyed() {
            self.live_buffers.fetch_sub(1, Ordering::AcqRel);
            trace!("Software buffer {:?} released", buffer.id());
        }
    }
}

/// External GPU device reached through native texture handles
pub trait TextureDevice: Send + Sync {
    /// Device name for logging
    fn name(&self) -> &str;

    /// Pixel format textures should be created in
    fn supported_format(&self) -> PixelFormat;

    /// Create a texture
    fn create_texture(&self, width: u32, height: u32, format: PixelFormat) -> Result<NativeHandle, String>;

    /// Copy one texture into another, optionally flipping rows
    fn copy_texture(&self, src: NativeHandle, dst: NativeHandle, flip: bool) -> Result<(), String>;

    /// Destroy a texture
    fn destroy_texture(&self, texture: NativeHandle);
}

/// Graphics backend delegating to a native texture device
pub struct NativeTextureBackend {
    device: Arc<dyn TextureDevice>,
}

impl NativeTextureBackend {
    /// Wrap a texture device
    pub fn new(device: Arc<dyn TextureDevice>) -> Self {
        debug!("Native texture backend on {}", device.name());
        Self { device }
    }
}

impl std::fmt::Debug for NativeTextureBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeTextureBackend")
            .field("device", &self.device.name())
            .finish()
    }
}

impl GraphicsBackend for NativeTextureBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NativeTexture
    }

    fn supported_format(&self) -> PixelFormat {
        self.device.supported_format()
    }

    fn create_buffer(&self, width: u32, height: u32, format: PixelFormat) -> MediaResult<GpuBuffer> {
        validate_dimensions(width, height, format)?;
        let texture = self
            .device
            .create_texture(width, height, format)
            .map_err(MediaError::graphics)?;
        Ok(GpuBuffer::external(width, height, format, texture))
    }

    fn blit(&self, src: &GpuBuffer, dst: &GpuBuffer, transform: BlitTransform) -> MediaResult<()> {
        if src.is_destroyed() || dst.is_destroyed() {
            return Err(MediaError::invalid_state("blit on a released buffer"));
        }
        self.device
            .copy_texture(
                src.native_handle(),
                dst.native_handle(),
                transform == BlitTransform::FlipVertical,
            )
            .map_err(MediaError::graphics)
    }

    fn destroy(&self, buffer: GpuBuffer) {
        if buffer.mark_destroyed() {
            self.device.destroy_texture(buffer.native_handle());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackbridge_core::Dispatcher;

    fn rows(width: u32, height: u32) -> Vec<u8> {
        // Every pixel of row r carries the value r in all four channels
        (0..height)
            .flat_map(|r| std::iter::repeat(r as u8).take(width as usize * 4))
            .collect()
    }

    #[test]
    fn test_software_blit_identity_and_flip() {
        let backend = SoftwareBackend::new();
        let src = backend.create_buffer(4, 3, PixelFormat::Rgba8Unorm).unwrap();
        let dst = backend.create_buffer(4, 3, PixelFormat::Rgba8Unorm).unwrap();
        src.write_pixels(&rows(4, 3)).unwrap();

        backend.blit(&src, &dst, BlitTransform::Identity).unwrap();
        assert_eq!(dst.read_pixels().unwrap(), src.read_pixels().unwrap());

        backend.blit(&src, &dst, BlitTransform::FlipVertical).unwrap();
        let flipped = dst.read_pixels().unwrap();
        assert!(flipped[..16].iter().all(|&b| b == 2));
        assert!(flipped[32..].iter().all(|&b| b == 0));
        assert_eq!(backend.blit_count(), 2);
    }

    #[test]
    fn test_software_blit_swizzles_bgra() {
        let backend = SoftwareBackend::new();
        let src = backend.create_buffer(1, 1, PixelFormat::Bgra8Unorm).unwrap();
        let dst = backend.create_buffer(1, 1, PixelFormat::Rgba8Unorm).unwrap();
        src.write_pixels(&[1, 2, 3, 4]).unwrap();

        backend.blit(&src, &dst, BlitTransform::Identity).unwrap();
        assert_eq!(dst.read_pixels().unwrap().as_ref(), &[3, 2, 1, 4]);
    }

    #[test]
    fn test_software_blit_size_mismatch() {
        let backend = SoftwareBackend::new();
        let src = backend.create_buffer(4, 4, PixelFormat::Rgba8Unorm).unwrap();
        let dst = backend.create_buffer(2, 2, PixelFormat::Rgba8Unorm).unwrap();
        assert!(matches!(
            backend.blit(&src, &dst, BlitTransform::Identity),
            Err(MediaError::Graphics { .. })
        ));
    }

    #[test]
    fn test_zero_sized_buffer_rejected() {
        let backend = SoftwareBackend::new();
        assert_eq!(
            backend.create_buffer(0, 10, PixelFormat::Rgba8Unorm).unwrap_err(),
            MediaError::InvalidDimensions {
                width: 0,
                height: 10
            }
        );
    }

    #[test]
    fn test_overflowing_buffer_rejected() {
        let backend = SoftwareBackend::new();
        assert_eq!(
            backend
                .create_buffer(u32::MAX, u32::MAX, PixelFormat::Rgba16Float)
                .unwrap_err(),
            MediaError::InvalidDimensions {
                width: u32::MAX,
                height: u32::MAX
            }
        );
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_destroy_is_tracked_once() {
        let backend = SoftwareBackend::new();
        let buffer = backend.create_buffer(8, 8, PixelFormat::Rgba8Unorm).unwrap();
        let borrowed = buffer.clone();
        assert_eq!(backend.live_buffers(), 1);

        backend.destroy(buffer);
        backend.destroy(borrowed.clone());
        assert_eq!(backend.live_buffers(), 0);
        assert!(borrowed.is_destroyed());
        assert!(borrowed.read_pixels().is_none());
    }

    #[test]
    fn test_release_on_main_defers_from_other_thread() {
        let mut dispatcher = Dispatcher::new();
        let handle = dispatcher.handle();
        let backend = Arc::new(SoftwareBackend::new());
        let graphics: Arc<dyn GraphicsBackend> = backend.clone();
        let buffer = graphics.create_buffer(2, 2, PixelFormat::Rgba8Unorm).unwrap();
        let observer = buffer.clone();

        let remote_graphics = Arc::clone(&graphics);
        std::thread::spawn(move || {
            release_on_main(&handle, &remote_graphics, NativeHandle::from_raw(1), buffer);
        })
        .join()
        .unwrap();

        assert!(!observer.is_destroyed());
        dispatcher.drain();
        assert!(observer.is_destroyed());
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_release_on_main_is_immediate_on_consumer() {
        let dispatcher = Dispatcher::new();
        let graphics: Arc<dyn GraphicsBackend> = Arc::new(SoftwareBackend::new());
        let buffer = graphics.create_buffer(2, 2, PixelFormat::Rgba8Unorm).unwrap();
        let observer = buffer.clone();

        release_on_main(&dispatcher.handle(), &graphics, NativeHandle::from_raw(1), buffer);
        assert!(observer.is_destroyed());
    }
}
