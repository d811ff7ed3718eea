//! Grid placement for the notes board: snapping drags to cells and repairing stored
//! layouts on load.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Stored coordinates below this value on both axes are legacy rank indices, not pixels.
pub const LEGACY_RANK_THRESHOLD: i64 = 50;

/// Largest pixel offset a note may be stored at, on either axis.
pub const MAX_COORDINATE: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
pub struct GridPosition {
    pub x: i64,
    pub y: i64,
}

impl GridPosition {
    pub const ORIGIN: GridPosition = GridPosition { x: 0, y: 0 };

    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn is_origin(&self) -> bool {
        *self == Self::ORIGIN
    }

    /// Both coordinates small and non-negative, and not both zero.
    pub fn is_legacy_rank(&self) -> bool {
        (0..LEGACY_RANK_THRESHOLD).contains(&self.x)
            && (0..LEGACY_RANK_THRESHOLD).contains(&self.y)
            && !self.is_origin()
    }

    pub fn within_board(&self) -> bool {
        (0..=MAX_COORDINATE).contains(&self.x) && (0..=MAX_COORDINATE).contains(&self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct GridConfig {
    pub cell_width: i64,
    pub cell_height: i64,
    pub columns_per_row: i64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_width: 240,
            cell_height: 220,
            columns_per_row: 4,
        }
    }
}

/// A note's id and where it sits on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct NotePlacement {
    pub id: Uuid,
    pub position: GridPosition,
}

impl GridConfig {
    /// Nearest cell corner, never left of or above the board origin. Idempotent.
    pub fn snap(&self, position: GridPosition) -> GridPosition {
        GridPosition {
            x: round_to_step(position.x, self.cell_width),
            y: round_to_step(position.y, self.cell_height),
        }
    }

    /// Where a note lands after being dragged by `(dx, dy)` pixels.
    pub fn apply_drag(&self, position: GridPosition, dx: i64, dy: i64) -> GridPosition {
        self.snap(GridPosition::new(
            position.x.saturating_add(dx),
            position.y.saturating_add(dy),
        ))
    }

    /// Pixel position of the `index`-th cell in row-major order.
    pub fn cell_position(&self, index: i64) -> GridPosition {
        GridPosition {
            x: (index % self.columns_per_row) * self.cell_width,
            y: (index / self.columns_per_row) * self.cell_height,
        }
    }

    /// Legacy layouts stored the note's rank in `x`.
    pub fn rank_to_position(&self, position: GridPosition) -> GridPosition {
        self.cell_position(position.x)
    }

    fn cell_of(&self, position: GridPosition) -> (i64, i64) {
        let snapped = self.snap(position);
        (snapped.x / self.cell_width, snapped.y / self.cell_height)
    }

    /// First row-major cell not covered by any of `occupied`.
    pub fn first_free_cell<'a, I>(&self, occupied: I) -> GridPosition
    where
        I: IntoIterator<Item = &'a GridPosition>,
    {
        let taken: HashSet<(i64, i64)> = occupied.into_iter().map(|p| self.cell_of(*p)).collect();
        self.first_free_in(&taken)
    }

    fn first_free_in(&self, taken: &HashSet<(i64, i64)>) -> GridPosition {
        (0..)
            .map(|index| self.cell_position(index))
            .find(|candidate| !taken.contains(&self.cell_of(*candidate)))
            .unwrap_or(GridPosition::ORIGIN)
    }

    /// Repair a stored layout (notes in creation order):
    ///
    /// 1. legacy rank coordinates are converted to pixels (`col = rank % 4`, `row = rank / 4`);
    /// 2. a note at `(0,0)` when an earlier note already holds the origin is moved to the
    ///    first unoccupied cell, scanning row-major.
    ///
    /// Only notes whose position changed are returned.
    pub fn normalize_layout(&self, notes: &[NotePlacement]) -> Vec<NotePlacement> {
        let converted: Vec<GridPosition> = notes
            .iter()
            .map(|note| {
                if note.position.is_legacy_rank() {
                    self.rank_to_position(note.position)
                } else {
                    note.position
                }
            })
            .collect();

        let mut origin_claimed = false;
        let relocate: Vec<bool> = converted
            .iter()
            .map(|position| {
                if !position.is_origin() {
                    return false;
                }
                let collides = origin_claimed;
                origin_claimed = true;
                collides
            })
            .collect();

        let mut taken: HashSet<(i64, i64)> = converted
            .iter()
            .zip(&relocate)
            .filter(|(_, moved)| !**moved)
            .map(|(position, _)| self.cell_of(*position))
            .collect();

        let mut changed = Vec::new();
        for ((note, mut position), moved) in notes.iter().zip(converted).zip(relocate) {
            if moved {
                position = self.first_free_in(&taken);
                taken.insert(self.cell_of(position));
            }
            if position != note.position {
                changed.push(NotePlacement {
                    id: note.id,
                    position,
                });
            }
        }
        changed
    }
}

fn round_to_step(value: i64, step: i64) -> i64 {
    if step <= 0 {
        return value.max(0);
    }
    let value = value.max(0);
    (value.saturating_add(step / 2) / step) * step
}
