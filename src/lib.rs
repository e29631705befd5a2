//! Undertow - block request scheduling for swarm file transfers

#![deny(missing_docs)]
#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]
//!
//! This crate provides the request-scheduling core of a peer-to-peer file
//! transfer client: given a peer ready to receive requests and a desired
//! batch size, it decides which contiguous runs of blocks to ask that peer
//! for next. Piece selection biases toward nearly-complete pieces, honors
//! user priority, randomizes ties, and supports a sequential mode that can
//! start mid-content. The crate also carries the fixed piece/block
//! geometry a transfer host needs to answer the scheduler's queries.

pub mod clock;
pub mod transfer;

// Re-export main types for convenient access
pub use clock::{Clock, ManualClock, SystemClock};
pub use transfer::{
    BlockIndex, BlockSpan, Mediator, PeerSpeed, PieceIndex, PiecePriority, TransferError,
    TransferLayout, Wishlist, BLOCK_SIZE,
};
