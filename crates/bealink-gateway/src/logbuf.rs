//! In-memory tail of the log, fed by a `tracing_subscriber::fmt` layer and
//! served to the `/debug` page over `/ws/logs`.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing_subscriber::fmt::MakeWriter;

const BROADCAST_CAPACITY: usize = 256;

/// Bounded ring of formatted log lines plus a live fan-out channel.
///
/// Must not log through `tracing` itself: it sits inside the subscriber.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
    tx: broadcast::Sender<String>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                capacity,
                lines: Mutex::new(VecDeque::with_capacity(capacity)),
                tx,
            }),
        }
    }

    pub fn push(&self, line: String) {
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        if line.is_empty() {
            return;
        }
        let mut lines = self.lock();
        if lines.len() == self.inner.capacity {
            lines.pop_front();
        }
        lines.push_back(line.clone());
        // Sent under the lock so `attach` sees each line exactly once.
        let _ = self.inner.tx.send(line);
    }

    /// Buffered lines, oldest first.
    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    /// Backlog plus a receiver for every line pushed after it.
    pub fn attach(&self) -> (Vec<String>, broadcast::Receiver<String>) {
        let lines = self.lock();
        let rx = self.inner.tx.subscribe();
        (lines.iter().cloned().collect(), rx)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.inner
            .lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Collects one formatted event and hands it to the buffer on drop.
pub struct LineWriter {
    buffer: LogBuffer,
    pending: Vec<u8>,
}

impl io::Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            for line in text.lines() {
                self.buffer.push(line.to_string());
            }
        }
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            buffer: self.clone(),
            pending: Vec::new(),
        }
    }
}
