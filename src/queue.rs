// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Packet queue for payloads larger than one transport frame.
//!
//! Delivery is pull-based: every "ready for more" signal from the peer takes
//! one step of [`PacketQueue::pull`]. Chunks come out front to back, then a
//! single `EOF` marker, after which the queue is inactive and any further
//! signal means no transfer is in progress.

use std::collections::VecDeque;

use serde::Serialize;

use crate::codes::{DEFAULT_MAX_FRAME_SIZE, EOF_MARKER};

/// Result of one pull signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    /// Next chunk of the payload.
    Chunk(Vec<u8>),
    /// All chunks delivered; the queue has been deactivated.
    EndOfStream,
    /// No transfer in progress.
    Idle,
}

impl Pull {
    /// Bytes to put on the wire, if any.
    pub fn frame(&self) -> Option<&[u8]> {
        match self {
            Pull::Chunk(chunk) => Some(chunk),
            Pull::EndOfStream => Some(EOF_MARKER),
            Pull::Idle => None,
        }
    }
}

/// Single in-flight chunked transfer.
#[derive(Debug)]
pub struct PacketQueue {
    chunks: VecDeque<Vec<u8>>,
    active: bool,
    max_frame_size: usize,
}

impl PacketQueue {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            active: false,
            max_frame_size: max_frame_size.max(1),
        }
    }

    /// Serialize `payload` as JSON and queue it, replacing any transfer in flight.
    pub fn enqueue<T: Serialize + ?Sized>(&mut self, payload: &T) -> Result<(), serde_json::Error> {
        let bytes = serde_json::to_vec(payload)?;
        self.enqueue_bytes(&bytes);
        Ok(())
    }

    /// Queue raw bytes, replacing any transfer in flight.
    pub fn enqueue_bytes(&mut self, bytes: &[u8]) {
        self.chunks = bytes
            .chunks(self.max_frame_size)
            .map(<[u8]>::to_vec)
            .collect();
        self.active = true;
    }

    /// Pop the next chunk.
    pub fn dequeue(&mut self) -> Option<Vec<u8>> {
        self.chunks.pop_front()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Mark the transfer finished without dropping remaining chunks.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Drop any transfer in flight.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.active = false;
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Answer one "ready for more" signal.
    pub fn pull(&mut self) -> Pull {
        if !self.active {
            return Pull::Idle;
        }
        match self.dequeue() {
            Some(chunk) => Pull::Chunk(chunk),
            None => {
                self.deactivate();
                Pull::EndOfStream
            }
        }
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}
