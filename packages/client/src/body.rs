//! Instrumented outbound request body.

use std::io::{self, Read};

use bytes::Bytes;
use futures_util::stream;
use partnerlink::{Error, ProtocolError};

use crate::event::EventHandle;

const CHUNK_SIZE: usize = 8 * 1024;

/// Wraps the outbound body so that every physical read reports the bytes it
/// consumed to the call's event sink.
pub struct RequestReader<R> {
    reader: Option<R>,
    event: EventHandle,
}

impl<R> RequestReader<R> {
    /// A `None` source fails every read with [`ProtocolError::EmptyReader`].
    pub fn new(reader: Option<R>, event: EventHandle) -> Self {
        Self { reader, event }
    }
}

impl<R: Read> Read for RequestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(io::Error::other(Error::from(ProtocolError::EmptyReader)));
        };
        let n = reader.read(buf)?;
        if n > 0 {
            self.event.request_read(&buf[..n]);
        }
        Ok(n)
    }
}

impl<R: Read + Send + 'static> RequestReader<R> {
    /// Turn the reader into a streaming request body. Each chunk the
    /// transport pulls is one physical read; the stream ends after the first
    /// error.
    pub fn into_body(self) -> reqwest::Body {
        let chunks = stream::unfold(Some(self), |state| async move {
            let mut reader = state?;
            let mut buf = vec![0u8; CHUNK_SIZE];
            match reader.read(&mut buf) {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(Bytes::from(buf)), Some(reader)))
                }
                Err(err) => Some((Err(err), None)),
            }
        });
        reqwest::Body::wrap_stream(chunks)
    }
}
