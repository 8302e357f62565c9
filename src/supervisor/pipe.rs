//! Pipe shared between two supervised processes
//!
//! The SDR receiver writes samples to its stdout and the decimator reads them
//! on its stdin. Both supervisors hold the same [`SharedPipe`] through an
//! `Arc`; each (re)spawn attaches a fresh duplicate of the relevant end, so a
//! restarted process reconnects to the same pipe. The pipe closes when the
//! last supervisor releases it.

use std::io::{self, PipeReader, PipeWriter};
use std::process::Stdio;
use std::sync::Arc;

/// Anonymous OS pipe owned jointly by a producer and a consumer process
#[derive(Debug)]
pub struct SharedPipe {
    reader: PipeReader,
    writer: PipeWriter,
}

impl SharedPipe {
    pub fn new() -> io::Result<Arc<Self>> {
        let (reader, writer) = io::pipe()?;
        Ok(Arc::new(Self { reader, writer }))
    }

    /// Read end, for a consumer's stdin
    pub fn stdin(&self) -> io::Result<Stdio> {
        Ok(Stdio::from(self.reader.try_clone()?))
    }

    /// Write end, for a producer's stdout
    pub fn stdout(&self) -> io::Result<Stdio> {
        Ok(Stdio::from(self.writer.try_clone()?))
    }
}

/// How a supervised process is attached to a shared pipe
#[derive(Debug, Clone, Default)]
pub enum PipeRole {
    #[default]
    None,
    /// stdin is read from the pipe
    StdinFromPipe(Arc<SharedPipe>),
    /// stdout is written to the pipe; stderr still goes to the log
    StdoutToPipe(Arc<SharedPipe>),
}

impl PipeRole {
    pub fn pipe(&self) -> Option<&Arc<SharedPipe>> {
        match self {
            Self::None => None,
            Self::StdinFromPipe(pipe) | Self::StdoutToPipe(pipe) => Some(pipe),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::StdinFromPipe(_) => "stdin-from-pipe",
            Self::StdoutToPipe(_) => "stdout-to-pipe",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_bytes_flow_between_processes() {
        let pipe = SharedPipe::new().unwrap();
        let mut producer = Command::new("sh")
            .args(["-c", "echo pulse"])
            .stdout(pipe.stdout().unwrap())
            .spawn()
            .unwrap();
        producer.wait().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.txt");
        let out = std::fs::File::create(&out_path).unwrap();
        let mut consumer = Command::new("head")
            .args(["-n", "1"])
            .stdin(pipe.stdin().unwrap())
            .stdout(out)
            .spawn()
            .unwrap();
        consumer.wait().unwrap();

        assert_eq!(std::fs::read_to_string(out_path).unwrap(), "pulse\n");
    }

    #[test]
    fn test_role_exposes_pipe() {
        let pipe = SharedPipe::new().unwrap();
        assert!(PipeRole::None.pipe().is_none());
        let role = PipeRole::StdoutToPipe(pipe.clone());
        assert!(Arc::ptr_eq(role.pipe().unwrap(), &pipe));
        assert_eq!(Arc::strong_count(&pipe), 2);
    }
}
