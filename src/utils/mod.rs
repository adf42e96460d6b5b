pub mod memory;

pub use memory::{BufferHandle, DecoderMemory, FramePool, HeapMemory, Memory, TransferBuffer};

/// Wall clock in milliseconds.
#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> f64 {
    js_sys::Date::now()
}

/// Wall clock in milliseconds.
#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// Rolling window of timing samples, in milliseconds.
#[derive(Debug, Clone)]
pub struct Metrics {
    frame_times: Vec<f64>,
    queue_sizes: Vec<usize>,
    processing_times: Vec<f64>,
    window_size: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_window(60)
    }

    pub fn with_window(window_size: usize) -> Self {
        Self {
            frame_times: Vec::new(),
            queue_sizes: Vec::new(),
            processing_times: Vec::new(),
            window_size: window_size.max(1),
        }
    }

    pub fn record_frame_time(&mut self, time: f64) {
        push_bounded(&mut self.frame_times, time, self.window_size);
    }

    pub fn record_queue_size(&mut self, size: usize) {
        push_bounded(&mut self.queue_sizes, size, self.window_size);
    }

    pub fn record_processing_time(&mut self, time: f64) {
        push_bounded(&mut self.processing_times, time, self.window_size);
    }

    pub fn get_average_fps(&self) -> f64 {
        let avg = average(&self.frame_times);
        if avg <= 0.0 {
            return 0.0;
        }
        1000.0 / avg
    }

    pub fn average_processing_time(&self) -> f64 {
        average(&self.processing_times)
    }

    pub fn max_queue_size(&self) -> usize {
        self.queue_sizes.iter().copied().max().unwrap_or(0)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded<T>(samples: &mut Vec<T>, value: T, window: usize) {
    samples.push(value);
    if samples.len() > window {
        samples.remove(0);
    }
}

fn average(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}
