//! Byte-stream transport abstraction for framed ingress.
//!
//! The serial ingress loop is generic over `Transport`; the UART adapter
//! implements it on device and tests use in-memory doubles.

/// Byte-oriented, non-blocking channel.
pub trait Transport {
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes. `Ok(0)` means nothing is pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data`, returning how many bytes were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Never yields bytes and swallows writes. Used when no console is wired.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

/// Replays a fixed script of chunks, one per `read`.
#[cfg(not(target_os = "espidf"))]
pub struct ScriptedTransport {
    chunks: std::collections::VecDeque<Vec<u8>>,
    pub written: Vec<u8>,
}

#[cfg(not(target_os = "espidf"))]
impl ScriptedTransport {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
            written: Vec::new(),
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Transport for ScriptedTransport {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        self.written.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }
}
