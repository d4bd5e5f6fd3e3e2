use crate::game::{Direction, Game};
use crate::grid::Terrain;

/// How a cell's ownership looks to the observing agent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CellClass {
    /// Owned by the observing agent.
    Mine,
    /// Owned by another agent.
    Opponent,
    /// Owned by nobody.
    Neutral,
    /// Outside the observer's field of vision; nothing about the occupant is
    /// known, including whether it is empty.
    Hidden,
}

/// Terrain as seen through the fog of war. Mountains are static map
/// knowledge and always visible; the occupant of any other hidden cell is
/// unknown, so hidden cities and generals report [`ObservedTerrain::Unknown`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObservedTerrain {
    Passable,
    Mountain,
    City,
    General,
    Unknown,
}

/// An agent's fog-of-war-limited view of the game, recomputed every turn.
///
/// Visibility covers the agent's own cells and every cell orthogonally or
/// diagonally adjacent to one. Hidden cells report no army count: callers
/// must not treat hidden as empty.
#[derive(Clone, Debug)]
pub struct Observation {
    rows: usize,
    cols: usize,
    army: Vec<Option<u32>>,
    cells: Vec<CellClass>,
    terrain: Vec<ObservedTerrain>,
    mask: Vec<bool>,
    is_winner: bool,
}

impl Observation {
    pub(crate) fn build(game: &Game, player: usize) -> Observation {
        let rows = game.grid().rows();
        let cols = game.grid().cols();
        let owner = game.owner_channel();
        let army = game.army_channel();

        // Visibility: the agent's own cells plus their 8-neighborhood
        let mut visible = vec![false; rows * cols];
        for (index, &cell_owner) in owner.iter().enumerate() {
            if cell_owner != Some(player) {
                continue;
            }
            let row = index / cols;
            let col = index % cols;
            for i in row.saturating_sub(1)..=(row + 1).min(rows - 1) {
                for j in col.saturating_sub(1)..=(col + 1).min(cols - 1) {
                    visible[i * cols + j] = true;
                }
            }
        }

        let cells = owner
            .iter()
            .enumerate()
            .map(|(index, &cell_owner)| {
                if !visible[index] {
                    CellClass::Hidden
                } else {
                    match cell_owner {
                        Some(other) if other == player => CellClass::Mine,
                        Some(_) => CellClass::Opponent,
                        None => CellClass::Neutral,
                    }
                }
            })
            .collect();

        let terrain = game
            .grid()
            .terrain_channel()
            .iter()
            .enumerate()
            .map(|(index, &terrain)| match terrain {
                Terrain::Mountain => ObservedTerrain::Mountain,
                _ if !visible[index] => ObservedTerrain::Unknown,
                Terrain::Passable => ObservedTerrain::Passable,
                Terrain::City => ObservedTerrain::City,
                Terrain::General => ObservedTerrain::General,
            })
            .collect();

        let masked_army: Vec<Option<u32>> = army
            .iter()
            .enumerate()
            .map(|(index, &count)| visible[index].then_some(count))
            .collect();

        // The mask mirrors the step's downgrade rule exactly: owned source
        // with more than one army, destination on-grid and not a mountain
        let mut mask = vec![false; rows * cols * Direction::ALL.len()];
        for index in 0..rows * cols {
            if owner[index] != Some(player) || army[index] <= 1 {
                continue;
            }
            let row = index / cols;
            let col = index % cols;
            for direction in Direction::ALL {
                let Some((to_row, to_col)) = direction.apply(row, col, rows, cols) else {
                    continue;
                };
                if game.grid().terrain(to_row, to_col) == Terrain::Mountain {
                    continue;
                }
                mask[index * Direction::ALL.len() + direction.index()] = true;
            }
        }

        Observation {
            rows,
            cols,
            army: masked_army,
            cells,
            terrain,
            mask,
            is_winner: game.winner_index() == Some(player),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The army on a cell, or `None` when the cell is hidden by fog.
    pub fn army_at(&self, row: usize, col: usize) -> Option<u32> {
        self.army[row * self.cols + col]
    }

    pub fn class_at(&self, row: usize, col: usize) -> CellClass {
        self.cells[row * self.cols + col]
    }

    pub fn terrain_at(&self, row: usize, col: usize) -> ObservedTerrain {
        self.terrain[row * self.cols + col]
    }

    /// Whether moving the army on `(row, col)` in `direction` would be
    /// applied by the engine rather than downgraded to idle.
    pub fn is_legal(&self, row: usize, col: usize, direction: Direction) -> bool {
        self.mask[(row * self.cols + col) * Direction::ALL.len() + direction.index()]
    }

    /// Every `(row, col, direction)` the mask marks as legal.
    pub fn legal_actions(&self) -> Vec<(usize, usize, Direction)> {
        let mut actions = Vec::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                for direction in Direction::ALL {
                    if self.is_legal(row, col, direction) {
                        actions.push((row, col, direction));
                    }
                }
            }
        }
        actions
    }

    /// True for the sole surviving agent once the game is over.
    pub fn is_winner(&self) -> bool {
        self.is_winner
    }
}
