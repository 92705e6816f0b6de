//! Scripted transport for deterministic testing of the protocol engine.
//!
//! [`ScriptedTransport`] implements the [`Transport`] trait against an
//! ordered script of steps:
//!
//! - **expectations** -- "when the engine writes exactly these bytes,
//!   make these reply chunks readable", and
//! - **feeds** -- device output that no write triggers (the uManager
//!   prints its reprogram acknowledgement spontaneously after a
//!   transfer completes).
//!
//! Replies are delivered one chunk per `receive()` call, so tests can
//! exercise the poller's read-cycle accumulation. When the script has
//! nothing readable, `receive()` sleeps out the requested timeout and
//! returns [`Error::Timeout`], which makes poll budgets measurable with
//! short test timeouts.
//!
//! # Example
//!
//! ```
//! use damlib_test_harness::ScriptedTransport;
//!
//! let mut mock = ScriptedTransport::new();
//! // When the engine invokes the session, answer with the prompt.
//! mock.expect(b"+++", b"# ");
//! // Later, the device prints something unprompted.
//! mock.feed(b"Data programmed in flash\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;

use damlib_core::error::{Error, Result};
use damlib_core::transport::Transport;

/// One step of the device script.
#[derive(Debug, Clone)]
enum Step {
    /// Exact bytes the engine must write, and the reply chunks the write
    /// unlocks (possibly none, for a silent device).
    Expect {
        request: Vec<u8>,
        replies: VecDeque<Vec<u8>>,
    },
    /// Device output that becomes readable without any preceding write,
    /// once every earlier step has been consumed.
    Feed { replies: VecDeque<Vec<u8>> },
}

/// A mock [`Transport`] driven by an ordered script.
///
/// Writes must match the next `Expect` step exactly; a mismatched or
/// unscripted write fails the test with a transport error. Reads drain
/// unlocked reply chunks one per call, releasing any `Feed` steps that
/// have reached the front of the script.
#[derive(Debug)]
pub struct ScriptedTransport {
    /// Remaining script steps, consumed front to back.
    script: VecDeque<Step>,
    /// Reply chunks already unlocked and waiting to be read.
    pending: VecDeque<Vec<u8>>,
    /// Whether the transport is "connected".
    connected: bool,
    /// Log of all bytes sent through this transport.
    sent_log: Vec<Vec<u8>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Create a new scripted transport in the connected state.
    pub fn new() -> Self {
        ScriptedTransport {
            script: VecDeque::new(),
            pending: VecDeque::new(),
            connected: true,
            sent_log: Vec::new(),
        }
    }

    /// Script an expected write and the single reply chunk it unlocks.
    ///
    /// Pass an empty reply for a device that stays silent after the
    /// write.
    pub fn expect(&mut self, request: &[u8], reply: &[u8]) {
        let replies = if reply.is_empty() {
            VecDeque::new()
        } else {
            VecDeque::from([reply.to_vec()])
        };
        self.script.push_back(Step::Expect {
            request: request.to_vec(),
            replies,
        });
    }

    /// Script an expected write whose reply arrives split across several
    /// read calls.
    pub fn expect_chunks(&mut self, request: &[u8], replies: &[&[u8]]) {
        self.script.push_back(Step::Expect {
            request: request.to_vec(),
            replies: replies.iter().map(|r| r.to_vec()).collect(),
        });
    }

    /// Script unsolicited device output, delivered as one chunk.
    pub fn feed(&mut self, reply: &[u8]) {
        self.script.push_back(Step::Feed {
            replies: VecDeque::from([reply.to_vec()]),
        });
    }

    /// Script unsolicited device output split across several read calls.
    pub fn feed_chunks(&mut self, replies: &[&[u8]]) {
        self.script.push_back(Step::Feed {
            replies: replies.iter().map(|r| r.to_vec()).collect(),
        });
    }

    /// Return all data that has been sent through this transport, one
    /// element per `send()` call.
    pub fn sent_data(&self) -> &[Vec<u8>] {
        &self.sent_log
    }

    /// Return the number of script steps not yet consumed.
    pub fn remaining_steps(&self) -> usize {
        self.script.len()
    }

    /// Set the connected state of the mock transport.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Move any `Feed` steps at the front of the script into the pending
    /// read queue.
    fn release_feeds(&mut self) {
        while let Some(Step::Feed { .. }) = self.script.front() {
            if let Some(Step::Feed { replies }) = self.script.pop_front() {
                self.pending.extend(replies);
            }
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        self.sent_log.push(data.to_vec());

        // Output scripted ahead of this write should already have been
        // readable; release it before matching.
        self.release_feeds();

        match self.script.pop_front() {
            Some(Step::Expect { request, replies }) => {
                if data != request.as_slice() {
                    return Err(Error::Transport(format!(
                        "unexpected write: expected {:02X?}, got {:02X?}",
                        request, data
                    )));
                }
                self.pending.extend(replies);
                Ok(())
            }
            Some(Step::Feed { .. }) => unreachable!("feeds released above"),
            None => Err(Error::Transport(format!(
                "script exhausted: unexpected write {:02X?}",
                data
            ))),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        if self.pending.is_empty() {
            self.release_feeds();
        }

        match self.pending.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    // Caller's buffer was smaller than the chunk; keep
                    // the remainder for the next read.
                    self.pending.push_front(chunk[n..].to_vec());
                }
                Ok(n)
            }
            None => {
                tokio::time::sleep(timeout).await;
                Err(Error::Timeout)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
