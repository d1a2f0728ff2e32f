//! Fixed-size dual channel sample store shared between the timer context and
//! the processing worker.
//!
//! The ready flag is the only synchronisation: while it is clear the sampler
//! owns the arrays, while it is set the drain side owns them. A tick that
//! arrives while the window is held is a no-op, so an overloaded worker sees a
//! stale but consistent window instead of a torn one.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

use super::types::{AdcCode, SampleWindow, ADC_MIDPOINT, WINDOW_SIZE};

/// Two single-shot analog reads, voltage first.
pub trait AdcPair {
    fn read_pair(&mut self) -> (AdcCode, AdcCode);
}

impl<F> AdcPair for F
where
    F: FnMut() -> (AdcCode, AdcCode),
{
    fn read_pair(&mut self) -> (AdcCode, AdcCode) {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Sample written, window not yet full.
    Stored,
    /// Sample written and the write index wrapped; the window is now ready.
    WindowComplete,
    /// Window is held by the consumer; nothing was read or written.
    Held,
}

pub struct AcquisitionBuffer {
    voltage: UnsafeCell<[AdcCode; WINDOW_SIZE]>,
    current: UnsafeCell<[AdcCode; WINDOW_SIZE]>,
    ready: AtomicBool,
}

// SAFETY: the arrays are only reached through `Sampler` (writes while `ready`
// is false) and `ReadyWindow` (reads while `ready` is true). `split` hands out
// at most one of each, so no index is read and written concurrently.
unsafe impl Sync for AcquisitionBuffer {}

impl AcquisitionBuffer {
    pub const fn new() -> Self {
        Self {
            voltage: UnsafeCell::new([ADC_MIDPOINT; WINDOW_SIZE]),
            current: UnsafeCell::new([ADC_MIDPOINT; WINDOW_SIZE]),
            ready: AtomicBool::new(false),
        }
    }

    /// Split into the producer half (timer context) and the consumer half
    /// (worker). The write index restarts at zero.
    pub fn split(&mut self) -> (Sampler<'_>, Drain<'_>) {
        let buffer: &Self = self;
        (Sampler { buffer, index: 0 }, Drain { buffer })
    }
}

impl Default for AcquisitionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer half. Performs no allocation and never blocks.
pub struct Sampler<'a> {
    buffer: &'a AcquisitionBuffer,
    index: usize,
}

impl Sampler<'_> {
    pub fn on_tick<A: AdcPair + ?Sized>(&mut self, adc: &mut A) -> TickOutcome {
        if self.buffer.ready.load(Ordering::Acquire) {
            return TickOutcome::Held;
        }

        let (voltage, current) = adc.read_pair();

        // SAFETY: `ready` is false so the drain side holds no view of the
        // arrays, and this sampler is the only writer. `index < WINDOW_SIZE`.
        unsafe {
            self.buffer.voltage.get().cast::<AdcCode>().add(self.index).write(voltage);
            self.buffer.current.get().cast::<AdcCode>().add(self.index).write(current);
        }

        self.index += 1;
        if self.index >= WINDOW_SIZE {
            self.index = 0;
            self.buffer.ready.store(true, Ordering::Release);
            TickOutcome::WindowComplete
        } else {
            TickOutcome::Stored
        }
    }

    pub fn write_index(&self) -> usize {
        self.index
    }
}

/// Consumer half.
pub struct Drain<'a> {
    buffer: &'a AcquisitionBuffer,
}

impl Drain<'_> {
    /// Returns the ready window, if any. The window is released for refill
    /// when the returned guard is dropped.
    pub fn poll(&mut self) -> Option<ReadyWindow<'_>> {
        if self.buffer.ready.load(Ordering::Acquire) {
            Some(ReadyWindow { buffer: self.buffer })
        } else {
            None
        }
    }
}

/// Read access to a full window. Dropping it clears the ready flag.
pub struct ReadyWindow<'a> {
    buffer: &'a AcquisitionBuffer,
}

impl ReadyWindow<'_> {
    pub fn voltage(&self) -> &[AdcCode; WINDOW_SIZE] {
        // SAFETY: `ready` stays set for the guard's lifetime, so the sampler
        // does not write; the returned borrow cannot outlive the guard.
        unsafe { &*self.buffer.voltage.get() }
    }

    pub fn current(&self) -> &[AdcCode; WINDOW_SIZE] {
        // SAFETY: as for `voltage`.
        unsafe { &*self.buffer.current.get() }
    }

    pub fn to_window(&self) -> SampleWindow {
        SampleWindow {
            voltage: *self.voltage(),
            current: *self.current(),
        }
    }

    /// Release without processing.
    pub fn release(self) {}
}

impl Drop for ReadyWindow<'_> {
    fn drop(&mut self) {
        self.buffer.ready.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_adc() -> impl FnMut() -> (AdcCode, AdcCode) {
        let mut n: u16 = 0;
        move || {
            n = n.wrapping_add(1);
            (n, 4000 - n)
        }
    }

    #[test]
    fn test_ready_flag_set_exactly_on_wrap() {
        let mut buffer = AcquisitionBuffer::new();
        let (mut sampler, mut drain) = buffer.split();
        let mut adc = counting_adc();

        for i in 0..WINDOW_SIZE - 1 {
            assert_eq!(sampler.on_tick(&mut adc), TickOutcome::Stored, "tick {}", i);
            assert!(drain.poll().is_none());
        }
        assert_eq!(sampler.on_tick(&mut adc), TickOutcome::WindowComplete);
        assert_eq!(sampler.write_index(), 0);

        let window = drain.poll().expect("window should be ready");
        assert_eq!(window.voltage()[0], 1);
        assert_eq!(window.voltage()[WINDOW_SIZE - 1], WINDOW_SIZE as u16);
        assert_eq!(window.current()[0], 3999);
    }

    #[test]
    fn test_ticks_while_ready_leave_buffer_unchanged() {
        let mut buffer = AcquisitionBuffer::new();
        let (mut sampler, mut drain) = buffer.split();
        let mut adc = counting_adc();

        for _ in 0..WINDOW_SIZE {
            sampler.on_tick(&mut adc);
        }

        let window = drain.poll().expect("ready");
        let snapshot = window.to_window();

        let mut reads = 0;
        let mut spy = || {
            reads += 1;
            (1, 1)
        };
        for _ in 0..3 * WINDOW_SIZE {
            assert_eq!(sampler.on_tick(&mut spy), TickOutcome::Held);
        }
        assert_eq!(reads, 0, "ADC must not be read while the window is held");
        assert_eq!(window.to_window(), snapshot);
    }

    #[test]
    fn test_release_permits_refill_from_index_zero() {
        let mut buffer = AcquisitionBuffer::new();
        let (mut sampler, mut drain) = buffer.split();
        let mut adc = counting_adc();

        for _ in 0..WINDOW_SIZE {
            sampler.on_tick(&mut adc);
        }
        drain.poll().expect("ready").release();
        assert!(drain.poll().is_none());

        let mut fixed = || (7, 9);
        assert_eq!(sampler.on_tick(&mut fixed), TickOutcome::Stored);
        assert_eq!(sampler.write_index(), 1);

        for _ in 1..WINDOW_SIZE {
            sampler.on_tick(&mut fixed);
        }
        let window = drain.poll().expect("ready again");
        assert!(window.voltage().iter().all(|&v| v == 7));
        assert!(window.current().iter().all(|&i| i == 9));
    }

    #[test]
    fn test_handoff_across_threads() {
        let mut buffer = AcquisitionBuffer::new();
        let (mut sampler, mut drain) = buffer.split();

        let windows = std::thread::scope(|scope| {
            let producer = scope.spawn(move || {
                let mut level: u16 = 0;
                let mut completed = 0;
                while completed < 3 {
                    let mut adc = || (level, level);
                    match sampler.on_tick(&mut adc) {
                        TickOutcome::WindowComplete => {
                            completed += 1;
                            level += 1;
                        }
                        TickOutcome::Held => std::thread::yield_now(),
                        TickOutcome::Stored => {}
                    }
                }
            });

            let mut seen = Vec::new();
            while seen.len() < 3 {
                if let Some(window) = drain.poll() {
                    seen.push(window.to_window());
                } else {
                    std::thread::yield_now();
                }
            }
            producer.join().expect("producer thread");
            seen
        });

        for (n, window) in windows.iter().enumerate() {
            let first = window.voltage[0];
            assert!(window.voltage.iter().all(|&v| v == first), "window {} torn", n);
            assert_eq!(window.voltage, window.current);
        }
    }
}
