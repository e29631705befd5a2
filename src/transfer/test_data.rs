//! Fixture transfer state for scheduler testing.
//!
//! Provides an in-memory [`Mediator`] whose answers are all independently
//! settable, so scenarios can pin piece, block, and request state without
//! one query being derived from another, plus scripted fixed-speed peers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use super::layout::BLOCK_SIZE;
use super::wishlist::{Mediator, PeerSpeed};
use super::{BlockIndex, BlockSpan, PieceIndex, PiecePriority, TransferLayout};

/// Peer whose measured download speed is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedPeer {
    name: &'static str,
    speed_bps: u64,
}

impl ScriptedPeer {
    /// Creates a peer that always reports `speed_bps`.
    pub fn new(name: &'static str, speed_bps: u64) -> Self {
        Self { name, speed_bps }
    }

    /// Returns the peer's fixture name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PeerSpeed for ScriptedPeer {
    fn download_speed_bps(&self, _now: Instant) -> u64 {
        self.speed_bps
    }
}

struct PieceState {
    wanted: bool,
    missing: usize,
    priority: PiecePriority,
}

struct StubState {
    layout: TransferLayout,
    pieces: Vec<PieceState>,
    held_blocks: HashSet<u64>,
    active: HashMap<u64, Vec<(ScriptedPeer, Instant)>>,
    sequential: bool,
    sequential_start: PieceIndex,
    endgame: bool,
    cancelled: Vec<(&'static str, BlockIndex)>,
}

/// Clonable in-memory mediator; clones share state, so a test can mutate
/// and inspect through one handle while the scheduler owns another.
#[derive(Clone)]
pub struct StubTransfer {
    state: Arc<Mutex<StubState>>,
}

impl StubTransfer {
    /// Creates a stub with `piece_count` pieces of `blocks_per_piece`
    /// blocks: everything wanted and missing, all blocks requestable,
    /// nothing in flight, normal (non-sequential, non-endgame) mode.
    pub fn new(piece_count: u32, blocks_per_piece: u32) -> Self {
        let layout = TransferLayout::new(
            u64::from(piece_count) * u64::from(blocks_per_piece) * u64::from(BLOCK_SIZE),
            blocks_per_piece * BLOCK_SIZE,
        )
        .expect("fixture layout is valid");

        let pieces = (0..piece_count)
            .map(|_| PieceState {
                wanted: true,
                missing: blocks_per_piece as usize,
                priority: PiecePriority::Normal,
            })
            .collect();

        Self::with_state(layout, pieces)
    }

    /// Creates a stub with no pieces at all.
    pub fn empty() -> Self {
        // span queries are unreachable without pieces; the layout is a
        // placeholder
        let layout =
            TransferLayout::new(u64::from(BLOCK_SIZE), BLOCK_SIZE).expect("fixture layout is valid");
        Self::with_state(layout, Vec::new())
    }

    fn with_state(layout: TransferLayout, pieces: Vec<PieceState>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StubState {
                layout,
                pieces,
                held_blocks: HashSet::new(),
                active: HashMap::new(),
                sequential: false,
                sequential_start: PieceIndex::new(0),
                endgame: false,
                cancelled: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().expect("stub state poisoned")
    }

    /// Overrides the missing-block answer for `piece`.
    pub fn set_missing(&self, piece: PieceIndex, missing: usize) {
        self.lock().pieces[piece.as_u32() as usize].missing = missing;
    }

    /// Marks `piece` as wanted or unwanted.
    pub fn set_wanted(&self, piece: PieceIndex, wanted: bool) {
        self.lock().pieces[piece.as_u32() as usize].wanted = wanted;
    }

    /// Sets the priority answer for `piece`.
    pub fn set_priority(&self, piece: PieceIndex, priority: PiecePriority) {
        self.lock().pieces[piece.as_u32() as usize].priority = priority;
    }

    /// Makes `block` ineligible for requests, as if already received.
    pub fn hold_block(&self, block: BlockIndex) {
        self.lock().held_blocks.insert(block.as_u64());
    }

    /// Records a pending request for `block` held by `peer` since
    /// `issued_at`.
    pub fn add_active_request(&self, block: BlockIndex, peer: ScriptedPeer, issued_at: Instant) {
        self.lock()
            .active
            .entry(block.as_u64())
            .or_default()
            .push((peer, issued_at));
    }

    /// Switches the stub into sequential mode starting from `origin`.
    pub fn set_sequential(&self, origin: PieceIndex) {
        let mut state = self.lock();
        state.sequential = true;
        state.sequential_start = origin;
    }

    /// Sets the endgame flag.
    pub fn set_endgame(&self, endgame: bool) {
        self.lock().endgame = endgame;
    }

    /// Returns every cancellation issued so far, in order.
    pub fn cancelled(&self) -> Vec<(&'static str, BlockIndex)> {
        self.lock().cancelled.clone()
    }
}

impl Mediator for StubTransfer {
    type Peer = ScriptedPeer;

    fn piece_count(&self) -> u32 {
        self.lock().pieces.len() as u32
    }

    fn client_can_request_piece(&self, piece: PieceIndex) -> bool {
        self.lock().pieces[piece.as_u32() as usize].wanted
    }

    fn missing_block_count(&self, piece: PieceIndex) -> usize {
        self.lock().pieces[piece.as_u32() as usize].missing
    }

    fn piece_priority(&self, piece: PieceIndex) -> PiecePriority {
        self.lock().pieces[piece.as_u32() as usize].priority
    }

    fn block_span(&self, piece: PieceIndex) -> BlockSpan {
        self.lock().layout.block_span(piece)
    }

    fn client_can_request_block(&self, block: BlockIndex) -> bool {
        !self.lock().held_blocks.contains(&block.as_u64())
    }

    fn active_request_count(&self, block: BlockIndex) -> usize {
        self.lock()
            .active
            .get(&block.as_u64())
            .map_or(0, Vec::len)
    }

    fn active_requests(&self, block: BlockIndex) -> Vec<(ScriptedPeer, Instant)> {
        self.lock()
            .active
            .get(&block.as_u64())
            .cloned()
            .unwrap_or_default()
    }

    fn cancel_request(&mut self, peer: &ScriptedPeer, block: BlockIndex) {
        let mut state = self.lock();
        if let Some(holders) = state.active.get_mut(&block.as_u64()) {
            holders.retain(|(holder, _)| holder != peer);
        }
        state.cancelled.push((peer.name(), block));
    }

    fn is_sequential_download(&self) -> bool {
        self.lock().sequential
    }

    fn sequential_download_start_piece(&self) -> PieceIndex {
        self.lock().sequential_start
    }

    fn is_endgame(&self) -> bool {
        self.lock().endgame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_defaults_to_everything_requestable() {
        let stub = StubTransfer::new(2, 3);

        assert_eq!(stub.piece_count(), 2);
        assert!(stub.client_can_request_piece(PieceIndex::new(0)));
        assert_eq!(stub.missing_block_count(PieceIndex::new(1)), 3);
        assert_eq!(
            stub.block_span(PieceIndex::new(1)),
            BlockSpan::new(BlockIndex::new(3), BlockIndex::new(6))
        );
        assert!(stub.client_can_request_block(BlockIndex::new(5)));
        assert_eq!(stub.active_request_count(BlockIndex::new(5)), 0);
        assert!(!stub.is_sequential_download());
        assert!(!stub.is_endgame());
    }

    #[test]
    fn test_stub_cancellation_removes_holder_and_journals() {
        let mut stub = StubTransfer::new(1, 2);
        let peer = ScriptedPeer::new("holder", 100);
        stub.add_active_request(BlockIndex::new(0), peer.clone(), Instant::now());

        stub.cancel_request(&peer, BlockIndex::new(0));

        assert_eq!(stub.active_request_count(BlockIndex::new(0)), 0);
        assert_eq!(stub.cancelled(), vec![("holder", BlockIndex::new(0))]);
    }

    #[test]
    fn test_stub_clones_share_state() {
        let stub = StubTransfer::new(1, 2);
        let handle = stub.clone();

        handle.hold_block(BlockIndex::new(1));

        assert!(!stub.client_can_request_block(BlockIndex::new(1)));
    }
}
