//! The console (keyboard + stdout) and the coarse software timer, both polled at tick
//! points by the dispatcher rather than ever blocking it.

use std::io::Read;
use std::sync::mpsc;
use std::thread;

/// The character that aborts the emulator unconditionally.
pub const ESCAPE_BYTE: u8 = b'`';

/// A non-blocking source of console bytes. [`StdinSource`] is the real host console;
/// `ScriptedSource` (test-only) feeds canned bytes without touching the process's real stdin.
trait ByteSource: Send {
    fn try_recv(&mut self) -> Option<u8>;
}

/// Reads host stdin on a dedicated thread and forwards bytes through a channel, so the
/// dispatcher's tick never blocks on a host read.
struct StdinSource {
    rx: mpsc::Receiver<u8>,
}

impl StdinSource {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut byte = [0u8; 1];
            loop {
                match std::io::stdin().read(&mut byte) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(byte[0]).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Self { rx }
    }
}

impl ByteSource for StdinSource {
    fn try_recv(&mut self) -> Option<u8> {
        self.rx.try_recv().ok()
    }
}

/// The emulated keyboard/console device. `BIN` reads the most recently polled byte and
/// clears it; `BOUT` writes straight through to host stdout.
pub struct Console {
    source: Box<dyn ByteSource>,
    buffered: Option<u8>,
}

impl Console {
    /// A console backed by the real host stdin.
    pub fn new() -> Self {
        Self {
            source: Box::new(StdinSource::new()),
            buffered: None,
        }
    }

    /// Non-blockingly check for a new byte. Returns it (and records it as buffered) if one
    /// arrived since the last poll.
    pub fn poll(&mut self) -> Option<u8> {
        let byte = self.source.try_recv()?;
        self.buffered = Some(byte);
        Some(byte)
    }

    /// `BIN`: return the buffered byte (or 0 if none) and clear it.
    pub fn take(&mut self) -> u32 {
        self.buffered.take().map(u32::from).unwrap_or(0)
    }

    /// `BOUT`: write one byte to host stdout.
    pub fn write_byte(&self, byte: u8) {
        use std::io::Write;
        let _ = std::io::stdout().write_all(&[byte]);
        let _ = std::io::stdout().flush();
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
struct ScriptedSource(std::sync::Arc<std::sync::Mutex<std::collections::VecDeque<u8>>>);

#[cfg(test)]
impl ByteSource for ScriptedSource {
    fn try_recv(&mut self) -> Option<u8> {
        self.0.lock().unwrap().pop_front()
    }
}

#[cfg(test)]
impl Console {
    /// A console fed from a fixed, in-memory byte queue instead of real stdin, for tests
    /// elsewhere in the crate that need to exercise a keyboard interrupt.
    pub(crate) fn scripted(bytes: &[u8]) -> Self {
        Self {
            source: Box::new(ScriptedSource(std::sync::Arc::new(std::sync::Mutex::new(
                bytes.iter().copied().collect(),
            )))),
            buffered: None,
        }
    }
}

/// The coarse software timer behind the `TIME`/`RTI`-adjacent trap. A free-running counter
/// compared against `timeout`; reaching it both raises the fault and resets the counter, so
/// a non-zero timeout behaves as a periodic tick rather than a one-shot alarm.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    counter: u32,
    timeout: u32,
}

impl Timer {
    pub fn set_timeout(&mut self, timeout: u32) {
        self.timeout = timeout;
        self.counter = 0;
    }

    /// Advance the timer by one tick. Returns `true` if it just reached `timeout`.
    pub fn tick(&mut self) -> bool {
        if self.timeout == 0 {
            return false;
        }
        self.counter = self.counter.wrapping_add(1);
        if self.counter >= self.timeout {
            self.counter = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_then_take_clears_buffer() {
        let mut console = Console::scripted(b"X");
        assert_eq!(console.poll(), Some(b'X'));
        assert_eq!(console.take(), b'X' as u32);
        assert_eq!(console.take(), 0);
    }

    #[test]
    fn empty_source_polls_none() {
        let mut console = Console::scripted(b"");
        assert_eq!(console.poll(), None);
    }

    #[test]
    fn timer_fires_and_resets() {
        let mut timer = Timer::default();
        timer.set_timeout(3);
        assert!(!timer.tick());
        assert!(!timer.tick());
        assert!(timer.tick());
        assert!(!timer.tick());
    }

    #[test]
    fn zero_timeout_disables_timer() {
        let mut timer = Timer::default();
        timer.set_timeout(0);
        for _ in 0..10_000 {
            assert!(!timer.tick());
        }
    }
}
