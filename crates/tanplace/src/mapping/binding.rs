//! Piece-to-target binding and consumption bookkeeping.

use std::collections::BTreeMap;

use crate::lifecycle::PieceId;
use crate::puzzle::TargetId;

/// Bidirectional piece <-> target binding table.
///
/// A target is consumed by at most one piece at a time, and a piece holds
/// at most one target. Claims against a consumed target are rejected, not
/// queued; the loser simply retries on a later pass.
#[derive(Debug, Default, Clone)]
pub struct BindingTable {
    piece_to_target: BTreeMap<PieceId, TargetId>,
    target_to_piece: BTreeMap<TargetId, PieceId>,
}

impl BindingTable {
    /// Try to bind `piece` to `target`. Returns `false` on conflict: the
    /// target is held by another piece, or the piece holds another target.
    /// Re-claiming an existing binding succeeds and is a no-op.
    pub fn claim(&mut self, piece: PieceId, target: TargetId) -> bool {
        match (
            self.piece_to_target.get(&piece),
            self.target_to_piece.get(&target),
        ) {
            (Some(&t), _) if t == target => true,
            (Some(_), _) | (_, Some(_)) => false,
            (None, None) => {
                self.piece_to_target.insert(piece, target);
                self.target_to_piece.insert(target, piece);
                true
            }
        }
    }

    /// Release whatever `piece` holds, returning the freed target.
    pub fn release_piece(&mut self, piece: PieceId) -> Option<TargetId> {
        let target = self.piece_to_target.remove(&piece)?;
        self.target_to_piece.remove(&target);
        Some(target)
    }

    pub fn target_of(&self, piece: PieceId) -> Option<TargetId> {
        self.piece_to_target.get(&piece).copied()
    }

    pub fn piece_of(&self, target: TargetId) -> Option<PieceId> {
        self.target_to_piece.get(&target).copied()
    }

    pub fn is_consumed(&self, target: TargetId) -> bool {
        self.target_to_piece.contains_key(&target)
    }

    pub fn n_bound(&self) -> usize {
        self.piece_to_target.len()
    }

    pub fn clear(&mut self) {
        self.piece_to_target.clear();
        self.target_to_piece.clear();
    }

    /// Bound pairs in ascending piece-id order.
    pub fn pairs(&self) -> impl Iterator<Item = (PieceId, TargetId)> + '_ {
        self.piece_to_target.iter().map(|(&p, &t)| (p, t))
    }
}
