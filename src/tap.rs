use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

/// Write-path decorator that mirrors response bytes into a bounded buffer.
///
/// Every write is forwarded to the real channel first and its return value
/// preserved exactly; only the bytes the channel actually accepted are
/// mirrored. Mirroring stops once the buffer holds `cap` bytes, forwarding
/// never does.
pub struct ResponseTap {
    inner: Box<dyn Write + Send>,
    captured: Arc<Mutex<Vec<u8>>>,
    cap: usize,
}

impl ResponseTap {
    /// Wrap `inner`, returning the tap and a shared handle to its buffer.
    pub fn new(inner: Box<dyn Write + Send>, cap: usize) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let tap = Self {
            inner,
            captured: Arc::clone(&captured),
            cap,
        };
        (tap, captured)
    }
}

impl Write for ResponseTap {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        let mut captured = self.captured.lock();
        if captured.len() < self.cap {
            let take = (self.cap - captured.len()).min(written);
            captured.extend_from_slice(&buf[..take]);
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
