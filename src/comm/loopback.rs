//! Scripted in-memory transport.
//!
//! A [`Loopback`] plays the instrument side of a conversation: every line that
//! is written must match the next scripted command, and only then does the
//! scripted reply become readable. This keeps replies from arriving before the
//! command that asks for them, the same way a real instrument behaves.

use super::Transport;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Exchange {
    command: String,
    reply: Option<Vec<u8>>,
}

/// Shared record of the lines written to a [`Loopback`].
#[derive(Debug, Clone, Default)]
pub struct LoopbackLog(Arc<Mutex<Vec<String>>>);

impl LoopbackLog {
    pub fn commands(&self) -> Vec<String> {
        match self.0.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, line: String) {
        match self.0.lock() {
            Ok(mut lines) => lines.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}

#[derive(Debug, Default)]
pub struct Loopback {
    script: VecDeque<Exchange>,
    pending: VecDeque<u8>,
    partial: Vec<u8>,
    log: LoopbackLog,
}

impl Loopback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect `command` and answer nothing.
    pub fn expect(mut self, command: &str) -> Self {
        self.script.push_back(Exchange {
            command: command.to_string(),
            reply: None,
        });
        self
    }

    /// Expect `command` and answer with `reply` followed by a newline.
    pub fn reply(self, command: &str, reply: &str) -> Self {
        let mut bytes = reply.as_bytes().to_vec();
        bytes.push(b'\n');
        self.reply_bytes(command, bytes)
    }

    /// Expect `command` and answer with exactly `reply`.
    pub fn reply_bytes(mut self, command: &str, reply: Vec<u8>) -> Self {
        self.script.push_back(Exchange {
            command: command.to_string(),
            reply: Some(reply),
        });
        self
    }

    pub fn log(&self) -> LoopbackLog {
        self.log.clone()
    }

    /// Scripted exchanges that have not happened yet.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    fn complete_line(&mut self) -> std::io::Result<()> {
        let mut raw = std::mem::take(&mut self.partial);
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        let line = String::from_utf8_lossy(&raw).into_owned();
        self.log.push(line.clone());

        let Some(next) = self.script.pop_front() else {
            return Err(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("unexpected command {line:?}: script exhausted"),
            ));
        };
        if next.command != line {
            return Err(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("unexpected command {line:?}, expected {:?}", next.command),
            ));
        }
        if let Some(reply) = next.reply {
            self.pending.extend(reply);
        }
        Ok(())
    }
}

impl Read for Loopback {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            return Err(std::io::Error::new(
                ErrorKind::TimedOut,
                "loopback has nothing to read",
            ));
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for Loopback {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for &byte in buf {
            if byte == b'\n' {
                self.complete_line()?;
            } else {
                self.partial.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Transport for Loopback {
    fn clear_input(&mut self) -> std::io::Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn set_timeout(&mut self, _timeout: Duration) -> std::io::Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "loopback".to_string()
    }
}
