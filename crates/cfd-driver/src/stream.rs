//! Result streaming over a byte-oriented serial link
//!
//! # Wire format
//!
//! ```text
//! per batch : '+' '+' r0 r1 r2 r3      rN = 4 × f64, native byte order (32 bytes)
//! end       : '!' '!'
//! ```
//!
//! There are no checksums or length prefixes; the receiver knows the payload
//! size. Senders may accept only part of a payload (UART FIFO full); the
//! streamer resends from the first unaccepted byte until the whole payload is
//! out. A partial send is never an error.

use crate::batch::BATCH_SIZE;
use crate::device::PredictionResult;
use crate::error::{CfdError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{ErrorKind, Write};
use tracing::{debug, info, warn};

/// Marker byte sent twice before every batch
pub const BATCH_START: u8 = b'+';

/// Marker byte sent twice after the last batch
pub const STREAM_END: u8 = b'!';

/// Bytes of one framed batch
pub const FRAMED_BATCH_BYTES: usize = 2 + BATCH_SIZE * PredictionResult::WIRE_BYTES;

/// Byte sink of a serial link
pub trait SerialSink {
    /// Offer `bytes` to the link, returning how many were accepted (possibly 0).
    ///
    /// # Errors
    ///
    /// Returns error on a link failure other than back-pressure.
    fn send(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Whether the transmitter has drained everything accepted so far.
    fn is_transmit_empty(&self) -> bool;

    /// Send one byte, retrying until the link accepts it.
    ///
    /// # Errors
    ///
    /// Returns error on a link failure.
    fn send_byte(&mut self, byte: u8) -> Result<()> {
        while accepted(self.send(&[byte])?, 1)? == 0 {
            std::hint::spin_loop();
        }
        Ok(())
    }

    /// Push buffered bytes to the link.
    ///
    /// # Errors
    ///
    /// Returns error on a link failure.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// [`SerialSink`] over any [`Write`]: tty device node, socket, file, `Vec<u8>`
///
/// `Interrupted` and `WouldBlock` count as "nothing accepted" so the streamer
/// retries; other I/O errors propagate.
#[derive(Debug)]
pub struct WriteSink<W: Write> {
    inner: W,
    max_chunk: Option<usize>,
}

impl<W: Write> WriteSink<W> {
    /// Wrap a writer
    pub const fn new(inner: W) -> Self {
        Self {
            inner,
            max_chunk: None,
        }
    }

    /// Offer at most `bytes` per send, like a UART TX FIFO of that depth
    #[must_use]
    pub const fn with_max_chunk(mut self, bytes: usize) -> Self {
        self.max_chunk = Some(bytes);
        self
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> SerialSink for WriteSink<W> {
    fn send(&mut self, bytes: &[u8]) -> Result<usize> {
        let len = self.max_chunk.map_or(bytes.len(), |max| bytes.len().min(max));
        match self.inner.write(&bytes[..len]) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn is_transmit_empty(&self) -> bool {
        true
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(CfdError::from)
    }
}

/// Frames prediction results onto a [`SerialSink`]
#[derive(Debug)]
pub struct ResultStreamer<S: SerialSink> {
    sink: S,
    batches: u64,
    bytes_sent: u64,
}

impl<S: SerialSink> ResultStreamer<S> {
    /// Stream onto `sink`
    pub const fn new(sink: S) -> Self {
        Self {
            sink,
            batches: 0,
            bytes_sent: 0,
        }
    }

    /// Frame every full batch of `results`, then terminate the stream
    ///
    /// Returns the sink so the caller can keep using the link.
    ///
    /// # Errors
    ///
    /// Returns error on a link failure.
    pub fn stream_all(sink: S, results: &[PredictionResult]) -> Result<S> {
        let mut streamer = Self::new(sink);
        let mut chunks = results.chunks_exact(BATCH_SIZE);
        for batch in &mut chunks {
            streamer.send_batch(batch)?;
        }
        if !chunks.remainder().is_empty() {
            warn!("{} results outside a full batch not sent", chunks.remainder().len());
        }
        streamer.finish()
    }

    /// Send `'+' '+'` followed by each result's payload
    ///
    /// # Errors
    ///
    /// Returns error on a link failure.
    pub fn send_batch(&mut self, batch: &[PredictionResult]) -> Result<()> {
        self.send_marker(BATCH_START)?;
        for result in batch {
            while !self.sink.is_transmit_empty() {
                std::hint::spin_loop();
            }
            self.send_payload(result.as_bytes())?;
        }
        self.batches += 1;
        debug!("Framed batch {}", self.batches);
        Ok(())
    }

    /// Send `payload`, resending the unaccepted tail until all of it is out
    ///
    /// # Errors
    ///
    /// Returns error on a link failure.
    pub fn send_payload(&mut self, payload: &[u8]) -> Result<()> {
        let mut sent = 0;
        while sent != payload.len() {
            let offered = payload.len() - sent;
            sent += accepted(self.sink.send(&payload[sent..])?, offered)?;
        }
        self.bytes_sent += payload.len() as u64;
        Ok(())
    }

    /// Send `'!' '!'`, flush, and hand back the sink
    ///
    /// # Errors
    ///
    /// Returns error on a link failure.
    pub fn finish(mut self) -> Result<S> {
        self.send_marker(STREAM_END)?;
        self.sink.flush()?;
        info!(
            "Stream finished: {} batches, {} bytes",
            self.batches, self.bytes_sent
        );
        Ok(self.sink)
    }

    /// Batches framed so far
    pub const fn batches(&self) -> u64 {
        self.batches
    }

    /// Bytes sent so far, markers included
    pub const fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    fn send_marker(&mut self, marker: u8) -> Result<()> {
        self.sink.send_byte(marker)?;
        self.sink.send_byte(marker)?;
        self.bytes_sent += 2;
        Ok(())
    }
}

/// Reject an accepted-byte count larger than the bytes offered.
fn accepted(count: usize, offered: usize) -> Result<usize> {
    if count > offered {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("serial sink accepted {count} of {offered} offered bytes"),
        )
        .into());
    }
    Ok(count)
}

/// The exact byte stream [`ResultStreamer::stream_all`] produces for `results`
pub fn frame(results: &[PredictionResult]) -> Bytes {
    let batches = results.len() / BATCH_SIZE;
    let mut buf = BytesMut::with_capacity(batches * FRAMED_BATCH_BYTES + 2);
    for batch in results.chunks_exact(BATCH_SIZE) {
        buf.put_u8(BATCH_START);
        buf.put_u8(BATCH_START);
        for result in batch {
            buf.put_slice(result.as_bytes());
        }
    }
    buf.put_u8(STREAM_END);
    buf.put_u8(STREAM_END);
    buf.freeze()
}

/// Parse a framed stream back into results (receiver side)
///
/// # Errors
///
/// Returns [`CfdError::Framing`] on an unexpected marker, a truncated batch,
/// a missing terminator, or bytes after the terminator.
pub fn decode_stream(mut bytes: &[u8]) -> Result<Vec<PredictionResult>> {
    let mut results = Vec::new();
    loop {
        match bytes {
            [STREAM_END, STREAM_END] => return Ok(results),
            [STREAM_END, STREAM_END, rest @ ..] => {
                return Err(CfdError::framing(format!(
                    "{} bytes after stream terminator",
                    rest.len()
                )))
            }
            [BATCH_START, BATCH_START, rest @ ..] => {
                let payload_len = BATCH_SIZE * PredictionResult::WIRE_BYTES;
                if rest.len() < payload_len {
                    return Err(CfdError::framing(format!(
                        "batch {} truncated: {} of {payload_len} payload bytes",
                        results.len() / BATCH_SIZE,
                        rest.len()
                    )));
                }
                let (payload, tail) = rest.split_at(payload_len);
                for chunk in payload.chunks_exact(PredictionResult::WIRE_BYTES) {
                    results.push(PredictionResult {
                        values: bytemuck::pod_read_unaligned(chunk),
                    });
                }
                bytes = tail;
            }
            [] => return Err(CfdError::framing("missing stream terminator")),
            [a, ..] => {
                return Err(CfdError::framing(format!(
                    "unexpected byte {a:#04x} where a marker was expected"
                )))
            }
        }
    }
}
