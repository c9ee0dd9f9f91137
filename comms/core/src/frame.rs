//  Copyright 2024, The Tari Project
//
//  Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
//  following conditions are met:
//
//  1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
//  disclaimer.
//
//  2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
//  following disclaimer in the documentation and/or other materials provided with the distribution.
//
//  3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
//  products derived from this software without specific prior written permission.
//
//  THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
//  INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
//  DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
//  SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
//  SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
//  WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
//  USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! # Wire framing
//!
//! Every message on a transport socket is one frame:
//!
//! ```text
//! +-------------------+----------------+--------------+-------------+----
//! | count (u32 LE)    | len0 (u32 LE)  | bytes[len0]  | pad to 4    | ...
//! +-------------------+----------------+--------------+-------------+----
//! ```
//!
//! A frame with `count == 0` is a keepalive and carries nothing. Frames are always a multiple of 4 bytes long.
//! The receiving side acknowledges each non-keepalive frame with [ACK_TOKEN].

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time,
};

use crate::error::FrameError;

pub const MAX_PAYLOADS_IN_MESSAGE: usize = 100_000;
pub const MAX_PAYLOAD_SIZE_BYTES: usize = 20 * 1024 * 1024;

const WORD_SIZE: usize = 4;

pub const KEEPALIVE_FRAME: [u8; WORD_SIZE] = [0; WORD_SIZE];
pub const ACK_TOKEN: [u8; WORD_SIZE] = *b"ACK\0";

/// Bounds enforced while decoding, before any payload memory is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_payloads: usize,
    pub max_payload_size: usize,
}

impl FrameLimits {
    /// Checks that a receiver enforcing these limits would accept a frame carrying `payloads`.
    pub fn check_payloads(&self, payloads: &[Bytes]) -> Result<(), FrameError> {
        self.check_count(payloads.len())?;
        payloads.iter().try_for_each(|p| self.check_size(p.len()))
    }

    fn check_count(&self, count: usize) -> Result<(), FrameError> {
        if count > self.max_payloads {
            return Err(FrameError::TooManyPayloads {
                count,
                max: self.max_payloads,
            });
        }
        Ok(())
    }

    fn check_size(&self, size: usize) -> Result<(), FrameError> {
        if size > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.max_payload_size,
            });
        }
        Ok(())
    }
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_payloads: MAX_PAYLOADS_IN_MESSAGE,
            max_payload_size: MAX_PAYLOAD_SIZE_BYTES,
        }
    }
}

/// Number of zero bytes that follow a payload of `len` bytes.
pub fn padding_size(len: usize) -> usize {
    (WORD_SIZE - len % WORD_SIZE) % WORD_SIZE
}

pub fn encoded_len(payloads: &[Bytes]) -> usize {
    WORD_SIZE +
        payloads
            .iter()
            .map(|p| WORD_SIZE + p.len() + padding_size(p.len()))
            .sum::<usize>()
}

pub fn encode_frame(payloads: &[Bytes]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(encoded_len(payloads));
    encode_into(payloads, &mut buf);
    buf
}

fn encode_into(payloads: &[Bytes], buf: &mut BytesMut) {
    buf.reserve(encoded_len(payloads));
    buf.put_u32_le(payloads.len() as u32);
    for payload in payloads {
        buf.put_u32_le(payload.len() as u32);
        buf.put_slice(payload);
        buf.put_bytes(0, padding_size(payload.len()));
    }
}

/// Fills `buf` from `reader`. The timeout applies to each individual read, so a slow but steady sender is not cut
/// off.
pub async fn read_exact_timeout<R>(reader: &mut R, buf: &mut [u8], read_timeout: Duration) -> Result<(), FrameError>
where R: AsyncRead + Unpin {
    let mut filled = 0;
    while filled < buf.len() {
        let n = time::timeout(read_timeout, reader.read(&mut buf[filled..]))
            .await
            .map_err(|_| FrameError::Timeout)??;
        if n == 0 {
            return Err(FrameError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        filled += n;
    }
    Ok(())
}

/// Reads one frame. Limits are checked as soon as each length prefix arrives.
pub async fn read_frame<R>(reader: &mut R, limits: &FrameLimits, read_timeout: Duration) -> Result<Vec<Bytes>, FrameError>
where R: AsyncRead + Unpin {
    let mut word = [0u8; WORD_SIZE];
    read_exact_timeout(reader, &mut word, read_timeout).await?;
    let count = u32::from_le_bytes(word) as usize;
    limits.check_count(count)?;

    let mut payloads = Vec::with_capacity(count);
    for _ in 0..count {
        read_exact_timeout(reader, &mut word, read_timeout).await?;
        let len = u32::from_le_bytes(word) as usize;
        limits.check_size(len)?;
        let mut buf = BytesMut::zeroed(len + padding_size(len));
        read_exact_timeout(reader, &mut buf, read_timeout).await?;
        buf.truncate(len);
        payloads.push(buf.freeze());
    }
    Ok(payloads)
}

pub async fn write_frame<W>(writer: &mut W, payloads: &[Bytes], write_timeout: Duration) -> Result<(), FrameError>
where W: AsyncWrite + Unpin {
    let buf = encode_frame(payloads);
    write_all_timeout(writer, &buf, write_timeout).await
}

pub async fn write_all_timeout<W>(writer: &mut W, buf: &[u8], write_timeout: Duration) -> Result<(), FrameError>
where W: AsyncWrite + Unpin {
    time::timeout(write_timeout, async {
        writer.write_all(buf).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| FrameError::Timeout)??;
    Ok(())
}
