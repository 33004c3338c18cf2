//! Mock capture device generating synthetic packed 4:2:2 frames.
//!
//! Drives the full buffer-pool lifecycle without hardware: tests and the
//! demo binary run against it. The frame generator is injectable so tests
//! can script exact pixel content.

use super::config::CaptureConfig;
use super::device::{CaptureDevice, CaptureError, FrameFormat, MIN_BUFFERS};
use super::pool::{BufferPool, FrameGuard};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

/// Fills one packed 4:2:2 buffer for a given frame sequence number.
pub type FrameGenerator = Box<dyn FnMut(u64, &mut [u8]) + Send>;

/// Deterministic default pattern: drifting luma ramp, neutral chroma.
///
/// NOT meaningful imagery - only exercises frame plumbing, like a test
/// signal generator.
fn synthetic_pattern(sequence: u64, frame: &mut [u8]) {
    for (i, byte) in frame.iter_mut().enumerate() {
        // YUYV: even byte offsets are luma, odd are chroma.
        *byte = if i % 2 == 0 {
            ((i as u64 / 2 + sequence * 3) % 256) as u8
        } else {
            127
        };
    }
}

struct MockState {
    streaming: bool,
    closed: bool,
    sequence: u64,
    generator: FrameGenerator,
}

/// Mock capture device for testing and headless demos.
pub struct MockDevice {
    format: Mutex<Option<FrameFormat>>,
    pool: OnceLock<BufferPool>,
    state: Mutex<MockState>,
    /// Simulates a stingy driver: grants at most this many buffers.
    grant_cap: Option<u32>,
    /// Simulates transient EAGAIN: every Nth fetch reports "not ready".
    transient_every: Option<u64>,
}

impl MockDevice {
    /// Opens the mock device, validating the configuration.
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        config
            .validate()
            .map_err(|e| CaptureError::DeviceError(e.to_string()))?;

        tracing::info!(
            width = config.width,
            height = config.height,
            "mock capture device opened"
        );

        Ok(Self {
            format: Mutex::new(None),
            pool: OnceLock::new(),
            state: Mutex::new(MockState {
                streaming: false,
                closed: false,
                sequence: 0,
                generator: Box::new(synthetic_pattern),
            }),
            grant_cap: None,
            transient_every: None,
        })
    }

    /// Replaces the frame generator.
    pub fn with_generator(self, generator: FrameGenerator) -> Self {
        self.lock_state().generator = generator;
        self
    }

    /// Caps how many buffers the simulated driver will grant.
    pub fn with_grant_cap(mut self, cap: u32) -> Self {
        self.grant_cap = Some(cap);
        self
    }

    /// Makes every Nth fetch return the transient "not ready" sentinel.
    pub fn with_transient_every(mut self, every: u64) -> Self {
        self.transient_every = Some(every);
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pool(&self) -> &BufferPool {
        self.pool.get().expect("buffers not allocated")
    }
}

impl CaptureDevice for MockDevice {
    fn negotiate(&self, width: u32, height: u32) -> Result<FrameFormat, CaptureError> {
        if self.lock_state().closed {
            return Err(CaptureError::DeviceError("device closed".into()));
        }

        let format = FrameFormat::packed422(width, height);
        *self.format.lock().unwrap_or_else(|e| e.into_inner()) = Some(format);
        Ok(format)
    }

    fn allocate_buffers(&self, count: u32) -> Result<u32, CaptureError> {
        let format = self.format();

        let granted = match self.grant_cap {
            Some(cap) => count.min(cap),
            None => count,
        };
        if granted < MIN_BUFFERS {
            return Err(CaptureError::InsufficientBuffers { granted });
        }

        let pool = BufferPool::new(granted as usize, format.size_image as usize);
        if self.pool.set(pool).is_err() {
            return Err(CaptureError::DeviceError("buffers already allocated".into()));
        }
        Ok(granted)
    }

    fn start_streaming(&self) -> Result<(), CaptureError> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(CaptureError::DeviceError("device closed".into()));
        }
        self.pool().queue_all();
        state.streaming = true;
        Ok(())
    }

    fn stop_streaming(&self) -> Result<(), CaptureError> {
        self.lock_state().streaming = false;
        Ok(())
    }

    fn fetch_frame(&self, timeout: Duration) -> Result<Option<usize>, CaptureError> {
        let sequence = {
            let mut state = self.lock_state();
            if !state.streaming {
                return Err(CaptureError::DeviceError("device not streaming".into()));
            }
            state.sequence += 1;
            state.sequence
        };

        if let Some(every) = self.transient_every {
            if sequence % every == 0 {
                return Ok(None);
            }
        }

        // Block outside the state lock so release_frame and stop_streaming
        // stay callable from the other thread during the wait.
        let Some(index) = self.pool().dequeue_timeout(timeout) else {
            return Err(CaptureError::TimeoutExceeded);
        };

        let mut state = self.lock_state();
        let generator = &mut state.generator;
        self.pool().fill(index, |bytes| generator(sequence, bytes));

        Ok(Some(index))
    }

    fn frame(&self, index: usize) -> FrameGuard<'_> {
        self.pool().frame(index)
    }

    fn release_frame(&self, index: usize) {
        self.pool().requeue(index);
    }

    fn format(&self) -> FrameFormat {
        self.format
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .expect("format not negotiated")
    }

    fn close(&self) {
        let mut state = self.lock_state();
        if state.closed {
            return;
        }
        state.streaming = false;
        state.closed = true;
        tracing::info!("mock capture device closed");
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::device::bring_up;
    use crate::capture::pool::BufferState;

    fn test_config() -> CaptureConfig {
        CaptureConfig {
            device_path: "mock:".to_string(),
            width: 16,
            height: 8,
            buffer_count: 3,
            fetch_timeout_ms: 50,
        }
    }

    #[test]
    fn test_full_lifecycle() {
        let config = test_config();
        let device = MockDevice::open(&config).unwrap();

        let format = bring_up(&device, &config).unwrap();
        assert_eq!(format.size_image, 16 * 8 * 2);

        let index = device.fetch_frame(config.fetch_timeout()).unwrap().unwrap();
        assert_eq!(device.frame(index).len(), format.size_image as usize);

        device.release_frame(index);
        device.stop_streaming().unwrap();
        device.close();
    }

    #[test]
    fn test_fetch_before_streaming_fails() {
        let config = test_config();
        let device = MockDevice::open(&config).unwrap();
        device.negotiate(config.width, config.height).unwrap();
        device.allocate_buffers(config.buffer_count).unwrap();

        assert!(matches!(
            device.fetch_frame(Duration::from_millis(10)),
            Err(CaptureError::DeviceError(_))
        ));
    }

    #[test]
    fn test_stingy_driver_yields_insufficient_buffers() {
        let config = test_config();
        let device = MockDevice::open(&config).unwrap().with_grant_cap(1);
        device.negotiate(config.width, config.height).unwrap();

        assert!(matches!(
            device.allocate_buffers(4),
            Err(CaptureError::InsufficientBuffers { granted: 1 })
        ));
    }

    #[test]
    fn test_starved_pool_is_a_timeout() {
        let config = test_config();
        let device = MockDevice::open(&config).unwrap();
        bring_up(&device, &config).unwrap();

        // Fetch every buffer without releasing any.
        for _ in 0..config.buffer_count {
            device.fetch_frame(config.fetch_timeout()).unwrap().unwrap();
        }
        assert!(matches!(
            device.fetch_frame(Duration::from_millis(20)),
            Err(CaptureError::TimeoutExceeded)
        ));
    }

    #[test]
    fn test_transient_sentinel() {
        let config = test_config();
        let device = MockDevice::open(&config).unwrap().with_transient_every(2);
        bring_up(&device, &config).unwrap();

        let first = device.fetch_frame(config.fetch_timeout()).unwrap();
        assert!(first.is_some());
        device.release_frame(first.unwrap());

        // Every second fetch reports "not ready, retry".
        assert!(device.fetch_frame(config.fetch_timeout()).unwrap().is_none());
    }

    #[test]
    fn test_released_buffer_returns_to_driver() {
        let config = test_config();
        let device = MockDevice::open(&config).unwrap();
        bring_up(&device, &config).unwrap();

        let index = device.fetch_frame(config.fetch_timeout()).unwrap().unwrap();
        device.release_frame(index);
        assert_eq!(device.pool().state(index), BufferState::DriverOwned);
    }

    #[test]
    fn test_injected_generator_content() {
        let config = test_config();
        let device = MockDevice::open(&config)
            .unwrap()
            .with_generator(Box::new(|seq, frame| {
                frame.fill(seq as u8);
            }));
        bring_up(&device, &config).unwrap();

        let index = device.fetch_frame(config.fetch_timeout()).unwrap().unwrap();
        assert!(device.frame(index).iter().all(|&b| b == 1));
        device.release_frame(index);
    }
}
