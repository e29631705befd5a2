//! Decides which block runs to request from a peer next.
//!
//! The wishlist is the request scheduler of a transfer: each call to
//! [`Wishlist::next`] ranks the pieces the client still wants, mines their
//! missing blocks under the current duplication policy, and shapes the
//! result into contiguous spans. It keeps no durable state; everything it
//! knows arrives through the [`Mediator`] at call time.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::time::Instant;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::layout::BLOCK_SIZE;
use super::{BlockIndex, BlockSpan, PieceIndex, PiecePriority};
use crate::clock::{Clock, SystemClock};

// Constants
const MAX_SORTED_PIECES: usize = 30; // candidates fully ordered before mining
const ENDGAME_MAX_PEERS: usize = 2; // outstanding requests per block in endgame
const SLOW_REQUEST_THRESHOLD: f64 = 1.5; // replacement must beat this score to cancel

/// Peer capability consulted when weighing a pending request against a
/// would-be replacement.
pub trait PeerSpeed {
    /// Measured payload rate from this peer to the client at `now`, in
    /// bytes per second.
    fn download_speed_bps(&self, now: Instant) -> u64;
}

/// Transfer state the wishlist observes and, for cancellations, mutates.
///
/// Implementations must answer from a snapshot that stays consistent for
/// the duration of one [`Wishlist::next`] call, with one exception:
/// [`active_request_count`](Self::active_request_count) may observe
/// cancellations issued earlier in the same call. The mining loop re-reads
/// it after preemption for exactly that reason.
pub trait Mediator {
    /// Peer handle type; owned copies are returned from
    /// [`active_requests`](Self::active_requests).
    type Peer: PeerSpeed;

    /// Total piece count for this transfer.
    fn piece_count(&self) -> u32;

    /// Returns true if the client still wants `piece` and peer policy
    /// permits requesting its blocks.
    fn client_can_request_piece(&self, piece: PieceIndex) -> bool;

    /// Number of blocks of `piece` not yet fully received.
    fn missing_block_count(&self, piece: PieceIndex) -> usize;

    /// User-configured priority for `piece`.
    fn piece_priority(&self, piece: PieceIndex) -> PiecePriority;

    /// Contiguous block run owned by `piece`.
    fn block_span(&self, piece: PieceIndex) -> BlockSpan;

    /// Returns true if `block` is eligible to be requested at all.
    fn client_can_request_block(&self, block: BlockIndex) -> bool;

    /// Number of peers currently holding a pending request for `block`.
    fn active_request_count(&self, block: BlockIndex) -> usize;

    /// Peers holding a pending request for `block`, each with the instant
    /// its request was issued.
    fn active_requests(&self, block: BlockIndex) -> Vec<(Self::Peer, Instant)>;

    /// Cancels the pending request for `block` held by `peer`.
    fn cancel_request(&mut self, peer: &Self::Peer, block: BlockIndex);

    /// Returns true when pieces are mined in index order instead of by
    /// completion bias.
    fn is_sequential_download(&self) -> bool;

    /// Entry of the wanted-piece list a sequential download starts from.
    /// Ignored when out of range or when sequential mode is off.
    fn sequential_download_start_piece(&self) -> PieceIndex;

    /// Returns true once the transfer is close enough to completion that
    /// duplicate requests are worth their cost.
    fn is_endgame(&self) -> bool;
}

/// Per-piece ranking record; lives only for one [`Wishlist::next`] call.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    piece: PieceIndex,
    missing_blocks: usize,
    priority: PiecePriority,
    salt: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // prefer pieces closer to completion, then higher priority; salt keeps
    // otherwise-equal pieces in a per-call random order
    fn cmp(&self, other: &Self) -> Ordering {
        self.missing_blocks
            .cmp(&other.missing_blocks)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| self.salt.cmp(&other.salt))
    }
}

/// Block request scheduler for a single transfer.
///
/// Each call to [`next`](Self::next) answers one question: which
/// contiguous runs of blocks should the client ask this peer for? Piece
/// selection biases toward nearly-complete pieces (index order in
/// sequential mode), honors user priority, and randomizes ties so that
/// independent peers spread across the piece space instead of converging
/// on the same blocks.
pub struct Wishlist<M, C = SystemClock> {
    mediator: M,
    clock: C,
    salter: ChaCha8Rng,
}

impl<M: Mediator> Wishlist<M> {
    /// Creates a scheduler over `mediator` with the system clock and an
    /// entropy-seeded salt stream.
    pub fn new(mediator: M) -> Self {
        Self {
            mediator,
            clock: SystemClock,
            salter: ChaCha8Rng::from_entropy(),
        }
    }
}

impl<M: Mediator, C: Clock> Wishlist<M, C> {
    /// Replaces the time source, for hosts and tests that control time.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Wishlist<M, C2> {
        Wishlist {
            mediator: self.mediator,
            clock,
            salter: self.salter,
        }
    }

    /// Reseeds the salt stream, making tie-breaking reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.salter = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Returns a shared reference to the mediator.
    pub fn mediator(&self) -> &M {
        &self.mediator
    }

    /// Returns an exclusive reference to the mediator.
    pub fn mediator_mut(&mut self) -> &mut M {
        &mut self.mediator
    }

    /// Returns at most `n_wanted` blocks' worth of request spans for
    /// `peer`.
    ///
    /// Returning fewer blocks than asked means no more blocks were
    /// eligible under current policy. Spans are ascending, disjoint, and
    /// non-adjacent.
    pub fn next(&mut self, n_wanted: usize, peer: &M::Peer) -> Vec<BlockSpan> {
        if n_wanted == 0 {
            return Vec::new();
        }

        let mut candidates = self.collect_candidates();
        let is_sequential = self.mediator.is_sequential_download();

        if !is_sequential {
            // Most calls exhaust `n_wanted` well before the candidate
            // tail, so only the head is worth ordering. Endgame requests
            // the remainder from several peers anyway; sort precision past
            // the horizon buys nothing.
            let middle = candidates.len().min(MAX_SORTED_PIECES);
            if middle < candidates.len() {
                candidates.select_nth_unstable(middle - 1);
            }
            candidates[..middle].sort_unstable();
        }

        let mut picked = BTreeSet::new();

        for candidate in &candidates {
            if picked.len() >= n_wanted {
                break;
            }

            // walk the blocks of this piece
            for block in self.mediator.block_span(candidate.piece).blocks() {
                if picked.len() >= n_wanted {
                    break;
                }

                // never re-request blocks the client already holds
                if !self.mediator.client_can_request_block(block) {
                    continue;
                }

                if is_sequential && self.mediator.active_request_count(block) > 0 {
                    // Sequential playback wants the head of the window as
                    // soon as possible; a request pending on a slow peer
                    // may be worth replacing.
                    self.cancel_slow_request(block, peer);
                }

                // don't request from too many peers
                let max_peers = if self.mediator.is_endgame() {
                    ENDGAME_MAX_PEERS
                } else {
                    1
                };
                if self.mediator.active_request_count(block) >= max_peers {
                    continue;
                }

                picked.insert(block);
            }
        }

        coalesce_spans(&picked)
    }

    /// Builds the per-call candidate list: one entry per wanted piece.
    fn collect_candidates(&mut self) -> Vec<Candidate> {
        // count up the pieces the client still wants
        let piece_count = self.mediator.piece_count();
        let mut wanted = Vec::with_capacity(piece_count as usize);
        for index in 0..piece_count {
            let piece = PieceIndex::new(index);
            if !self.mediator.client_can_request_piece(piece) {
                continue;
            }

            let missing = self.mediator.missing_block_count(piece);
            if missing == 0 {
                continue;
            }

            wanted.push((piece, missing));
        }

        let is_sequential = self.mediator.is_sequential_download();

        // A sequential download may begin mid-content (e.g. a seek into a
        // video): rotate so the origin entry is mined first and the
        // skipped head comes last.
        if is_sequential {
            let origin = self.mediator.sequential_download_start_piece().as_u32() as usize;
            if origin > 0 && origin < wanted.len() {
                tracing::info!("rotating wanted pieces to begin at entry {}", origin);
                wanted.rotate_left(origin);
            }
        }

        wanted
            .into_iter()
            .map(|(piece, missing_blocks)| Candidate {
                piece,
                missing_blocks,
                priority: self.mediator.piece_priority(piece),
                // Sequential mining keeps index order; otherwise each
                // candidate gets a fresh draw so equal pieces land in a
                // random order under the partial sort.
                salt: if is_sequential {
                    piece.as_u32()
                } else {
                    self.salter.next_u32()
                },
            })
            .collect()
    }

    /// Cancels at most one pending request for `block` when `peer` is
    /// expected to finish the block sooner than a current holder.
    ///
    /// The score is the whole-number speed ratio of the replacement over
    /// the holder, discounted by how much of the block the holder has
    /// already had time to fetch. Truncating division means a replacement
    /// that is not strictly faster scores zero and never cancels.
    fn cancel_slow_request(&mut self, block: BlockIndex, peer: &M::Peer) {
        let now = self.clock.now();
        let new_speed = peer.download_speed_bps(now);
        if new_speed == 0 {
            return;
        }

        for (holder, issued_at) in self.mediator.active_requests(block) {
            let holder_speed = holder.download_speed_bps(now);

            // A stalled holder gives no usable evidence; leave its request
            // alone rather than divide by zero.
            if holder_speed == 0 {
                continue;
            }

            let elapsed = now.saturating_duration_since(issued_at).as_secs();
            let advantage = new_speed / holder_speed;
            let already_fetched = elapsed * new_speed / u64::from(BLOCK_SIZE);
            let score = advantage as i64 - already_fetched as i64;

            if score as f64 > SLOW_REQUEST_THRESHOLD {
                tracing::trace!("cancelling slow request for block {}", block);
                self.mediator.cancel_request(&holder, block);
                return;
            }
        }
    }
}

/// Packs an ascending set of block indices into sorted, disjoint,
/// non-adjacent half-open spans.
fn coalesce_spans(blocks: &BTreeSet<BlockIndex>) -> Vec<BlockSpan> {
    let mut iter = blocks.iter().copied();
    let Some(first) = iter.next() else {
        return Vec::new();
    };

    let mut spans = Vec::new();
    let mut begin = first.as_u64();
    let mut end = first.as_u64() + 1;
    for block in iter {
        if block.as_u64() == end {
            end += 1;
        } else {
            spans.push(BlockSpan::new(BlockIndex::new(begin), BlockIndex::new(end)));
            begin = block.as_u64();
            end = begin + 1;
        }
    }
    spans.push(BlockSpan::new(BlockIndex::new(begin), BlockIndex::new(end)));

    spans
}
