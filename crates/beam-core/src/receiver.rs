//! Receiver side of the chunked transfer engine
//!
//! One [`Inbound`] tracks every transfer arriving from a single sending
//! peer, keyed by file name. Chunks are slotted by index, so arrival order
//! does not matter even though the reference transport happens to be
//! ordered. The terminal `end` marker triggers reassembly; an `end` that
//! arrives while slots are still empty is a protocol violation and the
//! session is dropped without producing output.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::error::TransferError;
use crate::protocol::TransferMessage;

/// A fully reassembled file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// What a delivered message amounted to
#[derive(Debug)]
pub enum InboundEvent {
    /// A chunk landed; percent is `floor(received / total * 100)`
    Progress { file_name: String, percent: u8 },
    /// The transfer finished and reassembled cleanly
    Completed(ReceivedFile),
}

struct Assembly {
    total: u32,
    slots: Vec<Option<Vec<u8>>>,
    filled: usize,
}

/// Reassembly state for everything one peer is sending us.
///
/// Buffers are private to this peer pair; dropping the `Inbound` (when the
/// channel is torn down) discards any partial transfers without emitting
/// anything.
#[derive(Default)]
pub struct Inbound {
    files: HashMap<String, Assembly>,
}

impl Inbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one message from the peer channel.
    ///
    /// Violations (out-of-range index, contradictory chunk count, `end` with
    /// missing slots, `end` for an unknown file) drop the affected session
    /// and leave every other in-flight transfer untouched.
    pub fn accept(&mut self, msg: TransferMessage) -> Result<InboundEvent, TransferError> {
        match msg {
            TransferMessage::Chunk {
                index,
                total_chunks,
                file_name,
                chunk,
            } => {
                let asm = match self.files.entry(file_name.clone()) {
                    Entry::Occupied(e) => {
                        if e.get().total != total_chunks {
                            let previous = e.get().total;
                            e.remove();
                            warn!(file = %file_name, previous, claimed = total_chunks, "chunk count changed, dropping session");
                            return Err(TransferError::ChunkCountMismatch {
                                file_name,
                                previous,
                                claimed: total_chunks,
                            });
                        }
                        e.into_mut()
                    }
                    Entry::Vacant(e) => e.insert(Assembly {
                        total: total_chunks,
                        slots: vec![None; total_chunks as usize],
                        filled: 0,
                    }),
                };

                if index >= asm.total {
                    let total = asm.total;
                    self.files.remove(&file_name);
                    warn!(file = %file_name, index, total, "chunk index out of range, dropping session");
                    return Err(TransferError::ChunkOutOfRange {
                        file_name,
                        index,
                        total,
                    });
                }

                let slot = &mut asm.slots[index as usize];
                if slot.is_none() {
                    asm.filled += 1;
                }
                *slot = Some(chunk);

                let percent = ((asm.filled as u64 * 100) / asm.total as u64) as u8;
                debug!(file = %file_name, index, filled = asm.filled, total = asm.total, "chunk received");
                Ok(InboundEvent::Progress { file_name, percent })
            }

            TransferMessage::End { file_name } => {
                let asm = match self.files.remove(&file_name) {
                    Some(asm) => asm,
                    None => {
                        warn!(file = %file_name, "end marker for unknown transfer");
                        return Err(TransferError::UnexpectedEnd(file_name));
                    }
                };

                let missing = asm.slots.iter().filter(|s| s.is_none()).count();
                if missing > 0 {
                    warn!(file = %file_name, missing, total = asm.total, "end marker with missing chunks, dropping session");
                    return Err(TransferError::ProtocolViolation {
                        file_name,
                        missing,
                        total: asm.total,
                    });
                }

                let mut bytes =
                    Vec::with_capacity(asm.slots.iter().flatten().map(Vec::len).sum());
                for chunk in asm.slots.into_iter().flatten() {
                    bytes.extend_from_slice(&chunk);
                }

                info!(file = %file_name, size = bytes.len(), chunks = asm.total, "file reassembled");
                Ok(InboundEvent::Completed(ReceivedFile { file_name, bytes }))
            }
        }
    }

    /// Percent received for an in-flight transfer, if one exists
    pub fn progress(&self, file_name: &str) -> Option<u8> {
        self.files
            .get(file_name)
            .map(|asm| ((asm.filled as u64 * 100) / asm.total as u64) as u8)
    }

    /// Number of transfers currently being assembled
    pub fn in_flight(&self) -> usize {
        self.files.len()
    }
}
