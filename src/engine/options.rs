//! Run options.

use crate::core::pixel::PixelType;
use crate::engine::progress::{ProgressCallback, ProgressUpdate};
use std::sync::Arc;

/// Default height of a streamed region, in lines.
pub const DEFAULT_STREAM_LINES: u32 = 256;

/// Options of a band math run.
#[derive(Clone)]
pub struct RunOptions {
    /// Worker threads (0 = rayon's default, one per core).
    pub threads: usize,
    /// Lines per streamed region (0 = the whole output region at once).
    pub stream_lines: u32,
    /// Numeric type of the output pixels; drives clamping.
    pub pixel_type: PixelType,
    /// Progress callback.
    pub progress_callback: Option<Arc<ProgressCallback>>,
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("threads", &self.threads)
            .field("stream_lines", &self.stream_lines)
            .field("pixel_type", &self.pixel_type)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            threads: 0,
            stream_lines: DEFAULT_STREAM_LINES,
            pixel_type: PixelType::default(),
            progress_callback: None,
        }
    }
}

impl RunOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the streamed region height.
    pub fn with_stream_lines(mut self, lines: u32) -> Self {
        self.stream_lines = lines;
        self
    }

    /// Set the output pixel type.
    pub fn with_pixel_type(mut self, pixel_type: PixelType) -> Self {
        self.pixel_type = pixel_type;
        self
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Thread count actually used.
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            rayon::current_num_threads()
        } else {
            self.threads
        }
    }
}
