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

use std::fmt;

use bytes::Bytes;
use meridian_comms::{types::MAX_TRANSPORT_DATA_SIZE, RecipientMode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::block_sync::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockSyncKind {
    AvailabilityRequest,
    AvailabilityResponse,
    SyncRequest,
    SyncResponse,
}

impl BlockSyncKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockSyncKind::AvailabilityRequest => "block-availability-request",
            BlockSyncKind::AvailabilityResponse => "block-availability-response",
            BlockSyncKind::SyncRequest => "block-sync-request",
            BlockSyncKind::SyncResponse => "block-sync-response",
        }
    }
}

impl fmt::Display for BlockSyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gossip topics sharing the transport. Only block sync is handled by this crate, the other topics are dropped on
/// receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topic {
    BlockSync(BlockSyncKind),
    TransactionRelay,
    Consensus,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::BlockSync(kind) => write!(f, "block-sync/{}", kind),
            Topic::TransactionRelay => write!(f, "transaction-relay"),
            Topic::Consensus => write!(f, "consensus"),
        }
    }
}

/// First payload of every gossip message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipHeader {
    pub topic: Topic,
    pub recipient_mode: RecipientMode,
}

impl GossipHeader {
    pub fn block_sync(kind: BlockSyncKind, recipient_mode: RecipientMode) -> Self {
        Self {
            topic: Topic::BlockSync(kind),
            recipient_mode,
        }
    }
}

/// Room left for the encoded [GossipHeader] when sizing a message body.
const HEADER_ALLOWANCE: usize = 1024;

/// Largest encoded message body that still fits in one transport message next to its header.
pub const MAX_MESSAGE_BODY_SIZE: usize = MAX_TRANSPORT_DATA_SIZE - HEADER_ALLOWANCE;

/// Encodes `message` as the two payloads `[header, message]`.
pub fn encode_message<T: Serialize>(header: &GossipHeader, message: &T) -> Result<Vec<Bytes>, CodecError> {
    Ok(vec![
        Bytes::from(bincode::serialize(header)?),
        Bytes::from(bincode::serialize(message)?),
    ])
}

pub fn decode_header(payloads: &[Bytes]) -> Result<GossipHeader, CodecError> {
    let header = payloads.first().ok_or(CodecError::MissingHeader)?;
    Ok(bincode::deserialize(header)?)
}

/// Decodes the message body of `payloads`, which must be exactly `[header, message]`.
pub fn decode_message<T: DeserializeOwned>(kind: BlockSyncKind, payloads: &[Bytes]) -> Result<T, CodecError> {
    match payloads {
        [_header, body] => Ok(bincode::deserialize(body)?),
        _ => Err(CodecError::PayloadCount {
            kind: kind.as_str(),
            expected: 2,
            actual: payloads.len(),
        }),
    }
}
