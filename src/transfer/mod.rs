//! Block request scheduling for a single swarm transfer.
//!
//! Transfer content is divided into fixed-size pieces, each piece into
//! fixed-size blocks. Blocks are the unit of request and cancellation;
//! the [`Wishlist`] decides which runs of them to request next.

pub mod layout;
#[cfg(test)]
pub mod test_data;
pub mod wishlist;

use std::fmt;

pub use layout::{TransferLayout, BLOCK_SIZE};
pub use wishlist::{Mediator, PeerSpeed, Wishlist};

/// Zero-based index of a piece within a transfer.
///
/// Content is divided into pieces for verification and priority control.
/// Each piece has a sequential index starting from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceIndex(pub u32);

impl PieceIndex {
    /// Creates PieceIndex from a zero-based index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying piece index as u32.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PieceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Zero-based index of a block within a transfer.
///
/// Blocks are numbered across the whole transfer, not per piece; each
/// piece owns one contiguous run of block indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockIndex(pub u64);

impl BlockIndex {
    /// Creates BlockIndex from a zero-based index.
    pub fn new(index: u64) -> Self {
        Self(index)
    }

    /// Returns the underlying block index as u64.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open run `[begin, end)` of block indices.
///
/// Requests are batched as spans so adjacent blocks travel together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// First block in the run.
    pub begin: BlockIndex,
    /// One past the last block in the run.
    pub end: BlockIndex,
}

impl BlockSpan {
    /// Creates a span covering `[begin, end)`.
    pub fn new(begin: BlockIndex, end: BlockIndex) -> Self {
        debug_assert!(begin < end, "block span must be non-empty");
        Self { begin, end }
    }

    /// Number of blocks in the span.
    pub fn len(self) -> u64 {
        self.end.as_u64().saturating_sub(self.begin.as_u64())
    }

    /// Returns true if the span covers no blocks.
    pub fn is_empty(self) -> bool {
        self.begin >= self.end
    }

    /// Returns true if `block` falls inside the span.
    pub fn contains(self, block: BlockIndex) -> bool {
        self.begin <= block && block < self.end
    }

    /// Iterates the span's blocks in ascending order.
    pub fn blocks(self) -> impl Iterator<Item = BlockIndex> {
        (self.begin.as_u64()..self.end.as_u64()).map(BlockIndex::new)
    }
}

impl fmt::Display for BlockSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// Download urgency of a piece, as configured by the user.
///
/// When two pieces are equally close to completion, the higher-priority
/// piece is mined first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PiecePriority {
    /// Fetch after everything more urgent.
    Low,
    /// Default urgency.
    #[default]
    Normal,
    /// Fetch ahead of normal content.
    High,
}

/// Errors that can occur when describing a transfer's geometry.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The transfer has no content to lay out.
    #[error("transfer has no content")]
    EmptyTransfer,

    /// Piece size must be a positive multiple of the block size.
    #[error("piece size {piece_size} is not a positive multiple of the {BLOCK_SIZE}-byte block size")]
    UnalignedPieceSize {
        /// The rejected piece size in bytes.
        piece_size: u32,
    },

    /// The content needs more pieces than a piece index can address.
    #[error("transfer needs {0} pieces, more than the addressable maximum")]
    TooManyPieces(u64),
}
