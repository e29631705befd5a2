//! Fixed piece and block geometry of a transfer.
//!
//! All sizes are settled before the first request goes out: content is
//! split into `piece_size`-byte pieces and every piece into
//! [`BLOCK_SIZE`]-byte blocks, with the final piece (and final block)
//! possibly short. Mediator implementations answer the scheduler's span
//! queries from this arithmetic.

use super::{BlockIndex, BlockSpan, PieceIndex, TransferError};

/// Fixed size in bytes of a transfer block, the unit of request and
/// cancellation.
pub const BLOCK_SIZE: u32 = 16_384;

/// Piece and block geometry for a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLayout {
    total_size: u64,
    piece_size: u32,
    piece_count: u32,
    block_count: u64,
}

impl TransferLayout {
    /// Creates a layout for `total_size` bytes of content split into
    /// `piece_size`-byte pieces.
    ///
    /// # Errors
    /// - `TransferError::EmptyTransfer` - `total_size` is zero
    /// - `TransferError::UnalignedPieceSize` - `piece_size` is zero or not
    ///   a multiple of [`BLOCK_SIZE`]
    /// - `TransferError::TooManyPieces` - the piece count would not fit a
    ///   piece index
    pub fn new(total_size: u64, piece_size: u32) -> Result<Self, TransferError> {
        if total_size == 0 {
            return Err(TransferError::EmptyTransfer);
        }
        if piece_size == 0 || piece_size % BLOCK_SIZE != 0 {
            return Err(TransferError::UnalignedPieceSize { piece_size });
        }

        let piece_count = total_size.div_ceil(u64::from(piece_size));
        if piece_count > u64::from(u32::MAX) {
            return Err(TransferError::TooManyPieces(piece_count));
        }

        Ok(Self {
            total_size,
            piece_size,
            piece_count: piece_count as u32,
            block_count: total_size.div_ceil(u64::from(BLOCK_SIZE)),
        })
    }

    /// Total content size in bytes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Size in bytes of every piece but possibly the last.
    pub fn piece_size(&self) -> u32 {
        self.piece_size
    }

    /// Number of pieces in the transfer.
    pub fn piece_count(&self) -> u32 {
        self.piece_count
    }

    /// Number of blocks in the transfer.
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    fn blocks_per_piece(&self) -> u64 {
        u64::from(self.piece_size / BLOCK_SIZE)
    }

    /// Returns the contiguous block run owned by `piece`.
    ///
    /// Spans of distinct pieces are disjoint, ordered with piece index,
    /// and together cover every block of the transfer exactly once.
    ///
    /// # Panics
    /// Panics if `piece` is outside the layout.
    pub fn block_span(&self, piece: PieceIndex) -> BlockSpan {
        assert!(
            piece.as_u32() < self.piece_count,
            "piece {piece} out of range"
        );
        let begin = u64::from(piece.as_u32()) * self.blocks_per_piece();
        let end = (begin + self.blocks_per_piece()).min(self.block_count);
        BlockSpan::new(BlockIndex::new(begin), BlockIndex::new(end))
    }
}
