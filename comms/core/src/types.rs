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

//! Addressing and message types shared by every transport.

use std::{collections::HashMap, fmt, marker::PhantomData, str::FromStr};

use bytes::Bytes;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::error::TransportError;

/// Hard cap on the sum of payload sizes in one [TransportData].
pub const MAX_TRANSPORT_DATA_SIZE: usize = 20 * 1024 * 1024;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeAddressError {
    #[error("Incorrect byte count (expected {} bytes, got {0})", NodeAddress::byte_size())]
    IncorrectByteCount(usize),
    #[error("Invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Fixed length identifier of a node in the network.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeAddress([u8; NodeAddress::byte_size()]);

impl NodeAddress {
    pub const fn byte_size() -> usize {
        20
    }

    pub const fn from_bytes(bytes: [u8; NodeAddress::byte_size()]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, NodeAddressError> {
        let bytes = hex::decode(hex_str)?;
        Self::try_from(bytes.as_slice())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 6 hex characters. Used in log lines and metric labels.
    pub fn short_str(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(6);
        s
    }
}

impl TryFrom<&[u8]> for NodeAddress {
    type Error = NodeAddressError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let buf = <[u8; NodeAddress::byte_size()]>::try_from(bytes)
            .map_err(|_| NodeAddressError::IncorrectByteCount(bytes.len()))?;
        Ok(Self(buf))
    }
}

impl FromStr for NodeAddress {
    type Err = NodeAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for NodeAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NodeAddress({})", self.to_hex())
    }
}

impl Serialize for NodeAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for NodeAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where D: Deserializer<'de> {
        struct HexVisitor<K> {
            marker: PhantomData<K>,
        }

        impl<'de> de::Visitor<'de> for HexVisitor<NodeAddress> {
            type Value = NodeAddress;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a node address in hex format")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where E: de::Error {
                NodeAddress::from_hex(v).map_err(E::custom)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(HexVisitor { marker: PhantomData })
        } else {
            <[u8; NodeAddress::byte_size()]>::deserialize(deserializer).map(NodeAddress)
        }
    }
}

/// A remote node as known from the topology. Immutable, a changed endpoint replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Peer {
    #[serde(rename = "address")]
    pub node_address: NodeAddress,
    pub endpoint: String,
    pub port: u16,
}

impl Peer {
    pub fn new<T: Into<String>>(node_address: NodeAddress, endpoint: T, port: u16) -> Self {
        Self {
            node_address,
            endpoint: endpoint.into(),
            port,
        }
    }

    /// The `host:port` string used to dial this peer.
    pub fn dial_address(&self) -> String {
        format!("{}:{}", self.endpoint, self.port)
    }

    /// True if dialing `other` would reach a different socket than dialing `self`.
    pub fn endpoint_differs(&self, other: &Peer) -> bool {
        self.endpoint != other.endpoint || self.port != other.port
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}:{})", self.node_address.short_str(), self.endpoint, self.port)
    }
}

pub type TransportPeers = HashMap<NodeAddress, Peer>;

/// Builds a topology map, later entries win on duplicate addresses.
pub fn peers_to_topology<I: IntoIterator<Item = Peer>>(peers: I) -> TransportPeers {
    peers.into_iter().map(|p| (p.node_address, p)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipientMode {
    /// Every connected peer except the sender
    Broadcast,
    /// Exactly the listed recipients
    List,
    /// Everyone except the listed recipients
    AllButList,
}

impl fmt::Display for RecipientMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecipientMode::Broadcast => write!(f, "broadcast"),
            RecipientMode::List => write!(f, "list"),
            RecipientMode::AllButList => write!(f, "all-but-list"),
        }
    }
}

/// An outbound message: a set of opaque payloads sent as one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportData {
    pub sender: NodeAddress,
    pub recipient_mode: RecipientMode,
    pub recipients: Vec<NodeAddress>,
    pub payloads: Vec<Bytes>,
}

impl TransportData {
    pub fn new(
        sender: NodeAddress,
        recipient_mode: RecipientMode,
        recipients: Vec<NodeAddress>,
        payloads: Vec<Bytes>,
    ) -> Result<Self, TransportError> {
        let data = Self {
            sender,
            recipient_mode,
            recipients,
            payloads,
        };
        data.check_size()?;
        Ok(data)
    }

    pub fn broadcast(sender: NodeAddress, payloads: Vec<Bytes>) -> Result<Self, TransportError> {
        Self::new(sender, RecipientMode::Broadcast, Vec::new(), payloads)
    }

    pub fn to_list(sender: NodeAddress, recipients: Vec<NodeAddress>, payloads: Vec<Bytes>) -> Result<Self, TransportError> {
        Self::new(sender, RecipientMode::List, recipients, payloads)
    }

    pub fn total_size(&self) -> usize {
        self.payloads.iter().map(Bytes::len).sum()
    }

    pub(crate) fn check_size(&self) -> Result<(), TransportError> {
        let size = self.total_size();
        if size > MAX_TRANSPORT_DATA_SIZE {
            return Err(TransportError::DataExceedsCapacity {
                size,
                max: MAX_TRANSPORT_DATA_SIZE,
            });
        }
        Ok(())
    }
}
