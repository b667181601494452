use std::{collections::VecDeque, sync::Arc};

use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader},
    net::unix::pipe,
    sync::Mutex,
};

use crate::supervisor::SupervisorState;

/// Longer output lines are split into chunks of at most this many bytes.
const MAX_LINE_BYTES: u64 = 16 * 1024;

/// Fixed-capacity, insertion-ordered store of gateway output lines.
///
/// Once full, every push evicts the oldest line first.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns up to `count` of the most recent lines, oldest first.
    pub fn tail(&self, count: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(count);
        self.lines.iter().skip(skip).cloned().collect()
    }
}

/// Spawns the task draining the merged stdout/stderr of one gateway instance.
///
/// Lines are stored only while `generation` is still the supervisor's current
/// launch, so a lingering pipe from an earlier instance cannot pollute the
/// buffer of a newer one. The task ends once every writer of the pipe is gone.
pub(crate) fn spawn_drain(
    output: pipe::Receiver,
    state: Arc<Mutex<SupervisorState>>,
    generation: u64,
    pid: u32,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(output);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match next_line(&mut reader, &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&buf);
                    tracing::info!(target: "gateway", pid, "{line}");
                    let mut state = state.lock().await;
                    if state.generation == generation {
                        state.logs.push(line);
                    }
                }
                Err(err) => {
                    tracing::warn!(pid, error = %err, "failed to read gateway output");
                    break;
                }
            }
        }
        tracing::debug!(pid, "gateway output closed");
    });
}

/// Reads one line, or `MAX_LINE_BYTES` of it when no newline comes first.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    reader.take(MAX_LINE_BYTES).read_until(b'\n', buf).await
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end().to_owned()
}
