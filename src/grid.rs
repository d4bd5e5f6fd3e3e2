use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base army strength for cities. A city encoded with digit `d` starts
/// with an army of `CITY_BASE_ARMY + d`.
pub const CITY_BASE_ARMY: u32 = 40;

/// The kind of terrain occupying a cell.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Terrain {
    Passable,
    Mountain,
    City,
    General,
}

/// Errors raised while constructing a [`Grid`].
#[derive(Debug, Error)]
pub enum GridError {
    #[error("missing or malformed metadata, expected `rows`, `cols` and `players` headers")]
    MissingMetadata,
    #[error("row {row} has {len} cells, expected {expected}")]
    DimensionMismatch {
        row: usize,
        len: usize,
        expected: usize,
    },
    #[error("expected {expected} rows, found {found}")]
    RowCountMismatch { expected: usize, found: usize },
    #[error("unknown symbol `{0}` in grid encoding")]
    UnknownSymbol(char),
    #[error("expected exactly one general for each of {expected} players, found {found}")]
    GeneralCount { expected: usize, found: usize },
    #[error("player {0} has more than one general")]
    DuplicateGeneral(usize),
    #[error("general of player {0} placed on a mountain")]
    GeneralOnMountain(usize),
    #[error("general of player {0} is not on a general cell")]
    MisplacedGeneral(usize),
    #[error("general cell at ({0}, {1}) is not assigned to any player")]
    UnassignedGeneral(usize, usize),
    #[error("city at ({0}, {1}) starts with army {2}, outside the encodable range")]
    CityArmy(usize, usize, u32),
    #[error("passable cells are not connected, cell ({0}, {1}) is walled off")]
    Disconnected(usize, usize),
}

/// An immutable terrain layout plus the starting position of each player's
/// general. Construction validates the layout; a `Grid` that exists is valid.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    terrain: Vec<Terrain>,
    /// Starting army per cell: city strength for cities, 1 for generals, 0 elsewhere.
    army: Vec<u32>,
    /// General position per player, indexed by player number.
    generals: Vec<(usize, usize)>,
}

impl Grid {
    /// Parses a grid from its textual encoding.
    ///
    /// The encoding declares `rows`, `cols` and `players` followed by one
    /// `m `-prefixed line per row, one character per cell:
    /// * `.` - passable land
    /// * `#` - mountain
    /// * `0`..=`9` - city with a starting army of [`CITY_BASE_ARMY`] plus the digit
    /// * `A`..=`J` - general of player 0 through 9
    ///
    /// The encoding round-trips losslessly through [`Grid::serialize`].
    pub fn parse(contents: &str) -> Result<Grid, GridError> {
        let metadata = Regex::new(r"rows (\d+)\s+cols (\d+)\s+players (\d+)")
            .unwrap()
            .captures(contents)
            .ok_or(GridError::MissingMetadata)?;

        let rows: usize = metadata
            .get(1)
            .unwrap()
            .as_str()
            .parse()
            .map_err(|_| GridError::MissingMetadata)?;
        let cols: usize = metadata
            .get(2)
            .unwrap()
            .as_str()
            .parse()
            .map_err(|_| GridError::MissingMetadata)?;
        let players: usize = metadata
            .get(3)
            .unwrap()
            .as_str()
            .parse()
            .map_err(|_| GridError::MissingMetadata)?;

        let mut terrain = vec![Terrain::Passable; rows * cols];
        let mut army = vec![0; rows * cols];
        let mut generals: Vec<Option<(usize, usize)>> = vec![None; players];
        let mut found = 0;

        let lines: Vec<&str> = Regex::new(r"m (\S*)")
            .unwrap()
            .captures_iter(contents)
            .map(|captures| captures.get(1).unwrap().as_str())
            .collect();

        if lines.len() != rows {
            return Err(GridError::RowCountMismatch {
                expected: rows,
                found: lines.len(),
            });
        }

        for (row, line) in lines.iter().enumerate() {
            if line.chars().count() != cols {
                return Err(GridError::DimensionMismatch {
                    row,
                    len: line.chars().count(),
                    expected: cols,
                });
            }

            for (col, value) in line.chars().enumerate() {
                let index = row * cols + col;
                match value {
                    '.' => {}
                    '#' => terrain[index] = Terrain::Mountain,
                    '0'..='9' => {
                        terrain[index] = Terrain::City;
                        army[index] = CITY_BASE_ARMY + value.to_digit(10).unwrap();
                    }
                    'A'..='J' => {
                        let player = value as usize - 'A' as usize;
                        terrain[index] = Terrain::General;
                        army[index] = 1;
                        if player < players {
                            if generals[player].is_some() {
                                return Err(GridError::DuplicateGeneral(player));
                            }
                            generals[player] = Some((row, col));
                        }
                        found += 1;
                    }
                    _ => return Err(GridError::UnknownSymbol(value)),
                }
            }
        }

        if found != players || generals.iter().any(Option::is_none) {
            return Err(GridError::GeneralCount {
                expected: players,
                found,
            });
        }

        Grid::from_parts(
            rows,
            cols,
            terrain,
            army,
            generals.into_iter().flatten().collect(),
        )
    }

    /// Builds a grid from raw channels, validating every invariant: the
    /// general cells match the per-player positions exactly, no general on
    /// a mountain, city armies within the encodable range, and all
    /// non-mountain cells mutually reachable through orthogonal moves.
    pub fn from_parts(
        rows: usize,
        cols: usize,
        terrain: Vec<Terrain>,
        army: Vec<u32>,
        generals: Vec<(usize, usize)>,
    ) -> Result<Grid, GridError> {
        let mut seen = vec![false; generals.len()];
        for (player, &(row, col)) in generals.iter().enumerate() {
            if seen[player] || generals.iter().filter(|&&g| g == (row, col)).count() > 1 {
                return Err(GridError::DuplicateGeneral(player));
            }
            seen[player] = true;

            match terrain[row * cols + col] {
                Terrain::Mountain => return Err(GridError::GeneralOnMountain(player)),
                Terrain::General => {}
                _ => return Err(GridError::MisplacedGeneral(player)),
            }
        }

        for (index, &cell) in terrain.iter().enumerate() {
            let row = index / cols;
            let col = index % cols;
            match cell {
                // Serialize encodes a general cell as its player's letter, so
                // every one must appear in the per-player list
                Terrain::General if !generals.contains(&(row, col)) => {
                    return Err(GridError::UnassignedGeneral(row, col));
                }
                // Serialize encodes a city's strength as a single digit
                Terrain::City
                    if !(CITY_BASE_ARMY..CITY_BASE_ARMY + 10).contains(&army[index]) =>
                {
                    return Err(GridError::CityArmy(row, col, army[index]));
                }
                _ => {}
            }
        }

        let grid = Grid {
            rows,
            cols,
            terrain,
            army,
            generals,
        };
        grid.check_connectivity()?;

        Ok(grid)
    }

    /// Serializes the grid back to its textual encoding.
    pub fn serialize(&self) -> String {
        let mut out = format!(
            "rows {}\ncols {}\nplayers {}\n",
            self.rows,
            self.cols,
            self.generals.len()
        );

        for row in 0..self.rows {
            out.push_str("m ");
            for col in 0..self.cols {
                let index = row * self.cols + col;
                let symbol = match self.terrain[index] {
                    Terrain::Passable => '.',
                    Terrain::Mountain => '#',
                    Terrain::City => {
                        char::from_digit(self.army[index] - CITY_BASE_ARMY, 10).unwrap()
                    }
                    Terrain::General => {
                        let player = self
                            .generals
                            .iter()
                            .position(|&general| general == (row, col))
                            .unwrap();
                        (player as u8 + b'A') as char
                    }
                };
                out.push(symbol);
            }
            out.push('\n');
        }

        out
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The number of players this grid was laid out for.
    pub fn players(&self) -> usize {
        self.generals.len()
    }

    pub fn terrain(&self, row: usize, col: usize) -> Terrain {
        self.terrain[row * self.cols + col]
    }

    pub(crate) fn terrain_channel(&self) -> &[Terrain] {
        &self.terrain
    }

    /// Starting army of a cell: the city strength for cities, 1 for generals
    /// and 0 for everything else.
    pub fn starting_army(&self, row: usize, col: usize) -> u32 {
        self.army[row * self.cols + col]
    }

    pub(crate) fn army_channel(&self) -> &[u32] {
        &self.army
    }

    /// General positions indexed by player number.
    pub fn generals(&self) -> &[(usize, usize)] {
        &self.generals
    }

    fn check_connectivity(&self) -> Result<(), GridError> {
        let start = match self.terrain.iter().position(|&t| t != Terrain::Mountain) {
            Some(index) => index,
            // An all-mountain grid has no generals, caught by the count checks
            None => return Ok(()),
        };

        let mut visited = vec![false; self.rows * self.cols];
        let mut frontier = vec![start];
        visited[start] = true;

        while let Some(index) = frontier.pop() {
            let row = index / self.cols;
            let col = index % self.cols;

            let mut visit = |row: usize, col: usize| {
                let index = row * self.cols + col;
                if !visited[index] && self.terrain[index] != Terrain::Mountain {
                    visited[index] = true;
                    frontier.push(index);
                }
            };

            if row > 0 {
                visit(row - 1, col);
            }
            if row + 1 < self.rows {
                visit(row + 1, col);
            }
            if col > 0 {
                visit(row, col - 1);
            }
            if col + 1 < self.cols {
                visit(row, col + 1);
            }
        }

        for (index, &terrain) in self.terrain.iter().enumerate() {
            if terrain != Terrain::Mountain && !visited[index] {
                return Err(GridError::Disconnected(
                    index / self.cols,
                    index % self.cols,
                ));
            }
        }

        Ok(())
    }
}

/// Procedural grid generator. Seeded for determinism: the same factory
/// configuration and seed always produce the same grid.
#[derive(Clone, Copy, Debug)]
pub struct GridFactory {
    pub rows: usize,
    pub cols: usize,
    pub players: usize,
    pub mountain_density: f64,
    pub city_density: f64,
}

impl GridFactory {
    pub fn new(rows: usize, cols: usize, players: usize) -> GridFactory {
        GridFactory {
            rows,
            cols,
            players,
            mountain_density: 0.2,
            city_density: 0.05,
        }
    }

    /// Generates a valid grid, retrying with fresh layouts until the
    /// connectivity and general-placement invariants hold.
    pub fn generate(&self, seed: u64) -> Result<Grid, GridError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut last_error = GridError::GeneralCount {
            expected: self.players,
            found: 0,
        };

        for _ in 0..100 {
            match self.generate_once(&mut rng) {
                Ok(grid) => return Ok(grid),
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }

    fn generate_once(&self, rng: &mut StdRng) -> Result<Grid, GridError> {
        let mut terrain = vec![Terrain::Passable; self.rows * self.cols];
        let mut army = vec![0; self.rows * self.cols];

        for index in 0..terrain.len() {
            if rng.gen_bool(self.mountain_density) {
                terrain[index] = Terrain::Mountain;
            } else if rng.gen_bool(self.city_density) {
                terrain[index] = Terrain::City;
                army[index] = CITY_BASE_ARMY + rng.gen_range(0..10);
            }
        }

        let mut passable: Vec<usize> = terrain
            .iter()
            .enumerate()
            .filter_map(|(index, &t)| (t == Terrain::Passable).then_some(index))
            .collect();
        passable.shuffle(rng);

        if passable.len() < self.players {
            return Err(GridError::GeneralCount {
                expected: self.players,
                found: passable.len(),
            });
        }

        let mut generals = Vec::with_capacity(self.players);
        for &index in passable.iter().take(self.players) {
            terrain[index] = Terrain::General;
            army[index] = 1;
            generals.push((index / self.cols, index % self.cols));
        }

        Grid::from_parts(self.rows, self.cols, terrain, army, generals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_parsing_a_grid_it_is_created_with_the_correct_dimensions_and_players() {
        let grid = "\
            rows 3
            cols 4
            players 2
            m A...
            m .#..
            m ...B";
        let grid = Grid::parse(grid).unwrap();

        assert_eq!(grid.rows(), 3);
        assert_eq!(grid.cols(), 4);
        assert_eq!(grid.players(), 2);
    }

    #[test]
    fn when_parsing_a_grid_the_terrain_and_starting_armies_are_correct() {
        let grid = "\
            rows 3
            cols 3
            players 2
            m A.#
            m .5.
            m #.B";
        let grid = Grid::parse(grid).unwrap();

        assert_eq!(grid.terrain(0, 0), Terrain::General);
        assert_eq!(grid.starting_army(0, 0), 1);
        assert_eq!(grid.terrain(0, 2), Terrain::Mountain);
        assert_eq!(grid.terrain(1, 1), Terrain::City);
        assert_eq!(grid.starting_army(1, 1), CITY_BASE_ARMY + 5);
        assert_eq!(grid.terrain(2, 2), Terrain::General);
        assert_eq!(grid.terrain(1, 0), Terrain::Passable);
        assert_eq!(grid.starting_army(1, 0), 0);
    }

    #[test]
    fn when_parsing_a_grid_the_general_positions_are_indexed_by_player() {
        let grid = "\
            rows 2
            cols 2
            players 2
            m B.
            m .A";
        let grid = Grid::parse(grid).unwrap();

        assert_eq!(grid.generals(), &[(1, 1), (0, 0)]);
    }

    #[test]
    fn when_parsing_a_grid_without_metadata_an_error_is_raised() {
        assert!(matches!(
            Grid::parse("m ..\nm .."),
            Err(GridError::MissingMetadata)
        ));
    }

    #[test]
    fn when_parsing_a_grid_with_a_short_row_an_error_is_raised() {
        let grid = "\
            rows 2
            cols 3
            players 1
            m A..
            m ..";
        assert!(matches!(
            Grid::parse(grid),
            Err(GridError::DimensionMismatch {
                row: 1,
                len: 2,
                expected: 3
            })
        ));
    }

    #[test]
    fn when_parsing_a_grid_with_missing_rows_an_error_is_raised() {
        let grid = "\
            rows 3
            cols 2
            players 1
            m A.
            m ..";
        assert!(matches!(
            Grid::parse(grid),
            Err(GridError::RowCountMismatch {
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn when_parsing_a_grid_with_an_unknown_symbol_an_error_is_raised() {
        let grid = "\
            rows 2
            cols 2
            players 1
            m A.
            m .!";
        assert!(matches!(Grid::parse(grid), Err(GridError::UnknownSymbol('!'))));
    }

    #[test]
    fn when_parsing_a_grid_with_too_few_generals_an_error_is_raised() {
        let grid = "\
            rows 2
            cols 2
            players 2
            m A.
            m ..";
        assert!(matches!(
            Grid::parse(grid),
            Err(GridError::GeneralCount {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn when_parsing_a_grid_with_too_many_generals_an_error_is_raised() {
        let grid = "\
            rows 2
            cols 2
            players 1
            m A.
            m .B";
        assert!(matches!(
            Grid::parse(grid),
            Err(GridError::GeneralCount {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn when_parsing_a_grid_with_a_duplicate_general_an_error_is_raised() {
        let grid = "\
            rows 2
            cols 2
            players 2
            m AB
            m .A";
        assert!(matches!(Grid::parse(grid), Err(GridError::DuplicateGeneral(0))));
    }

    #[test]
    fn when_parsing_a_grid_with_a_walled_off_region_an_error_is_raised() {
        let grid = "\
            rows 3
            cols 3
            players 2
            m A.#
            m ..#
            m ##B";
        assert!(matches!(Grid::parse(grid), Err(GridError::Disconnected(2, 2))));
    }

    #[test]
    fn when_serializing_a_grid_the_encoding_round_trips_losslessly() {
        let contents = "\
            rows 4
            cols 4
            players 3
            m A..#
            m .7..
            m ..0.
            m C..B";
        let grid = Grid::parse(contents).unwrap();
        let reparsed = Grid::parse(&grid.serialize()).unwrap();

        assert_eq!(grid, reparsed);
    }

    #[test]
    fn when_building_from_parts_a_general_on_a_mountain_is_rejected() {
        let terrain = vec![
            Terrain::Mountain,
            Terrain::Passable,
            Terrain::Passable,
            Terrain::General,
        ];
        let result = Grid::from_parts(2, 2, terrain, vec![0, 0, 0, 1], vec![(0, 0), (1, 1)]);

        assert!(matches!(result, Err(GridError::GeneralOnMountain(0))));
    }

    #[test]
    fn when_building_from_parts_two_generals_on_the_same_cell_are_rejected() {
        let terrain = vec![
            Terrain::General,
            Terrain::Passable,
            Terrain::Passable,
            Terrain::Passable,
        ];
        let result = Grid::from_parts(2, 2, terrain, vec![1, 0, 0, 0], vec![(0, 0), (0, 0)]);

        assert!(matches!(result, Err(GridError::DuplicateGeneral(_))));
    }

    #[test]
    fn when_building_from_parts_a_city_army_below_the_encodable_range_is_rejected() {
        let terrain = vec![
            Terrain::General,
            Terrain::City,
            Terrain::Passable,
            Terrain::General,
        ];
        let result = Grid::from_parts(2, 2, terrain, vec![1, 10, 0, 1], vec![(0, 0), (1, 1)]);

        assert!(matches!(result, Err(GridError::CityArmy(0, 1, 10))));
    }

    #[test]
    fn when_building_from_parts_a_city_army_above_the_encodable_range_is_rejected() {
        let terrain = vec![
            Terrain::General,
            Terrain::City,
            Terrain::Passable,
            Terrain::General,
        ];
        let result = Grid::from_parts(2, 2, terrain, vec![1, 100, 0, 1], vec![(0, 0), (1, 1)]);

        assert!(matches!(result, Err(GridError::CityArmy(0, 1, 100))));
    }

    #[test]
    fn when_building_from_parts_the_strongest_encodable_city_round_trips() {
        let terrain = vec![
            Terrain::General,
            Terrain::City,
            Terrain::Passable,
            Terrain::General,
        ];
        let grid = Grid::from_parts(
            2,
            2,
            terrain,
            vec![1, CITY_BASE_ARMY + 9, 0, 1],
            vec![(0, 0), (1, 1)],
        )
        .unwrap();

        let reparsed = Grid::parse(&grid.serialize()).unwrap();
        assert_eq!(reparsed, grid);
        assert_eq!(reparsed.starting_army(0, 1), CITY_BASE_ARMY + 9);
    }

    #[test]
    fn when_building_from_parts_a_general_cell_without_a_player_is_rejected() {
        let terrain = vec![
            Terrain::General,
            Terrain::General,
            Terrain::Passable,
            Terrain::Passable,
        ];
        let result = Grid::from_parts(2, 2, terrain, vec![1, 1, 0, 0], vec![(0, 0)]);

        assert!(matches!(result, Err(GridError::UnassignedGeneral(0, 1))));
    }

    #[test]
    fn when_building_from_parts_a_general_listed_on_a_plain_cell_is_rejected() {
        let terrain = vec![
            Terrain::General,
            Terrain::Passable,
            Terrain::Passable,
            Terrain::Passable,
        ];
        let result = Grid::from_parts(2, 2, terrain, vec![1, 0, 0, 0], vec![(0, 0), (1, 1)]);

        assert!(matches!(result, Err(GridError::MisplacedGeneral(1))));
    }

    #[test]
    fn when_generating_a_grid_it_is_valid_and_deterministic_per_seed() {
        let factory = GridFactory::new(10, 12, 2);

        let first = factory.generate(42).unwrap();
        let second = factory.generate(42).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.rows(), 10);
        assert_eq!(first.cols(), 12);
        assert_eq!(first.players(), 2);
        assert_eq!(first.generals().len(), 2);
    }

    #[test]
    fn when_generating_grids_with_different_seeds_the_layouts_differ() {
        let factory = GridFactory::new(10, 12, 2);

        let first = factory.generate(1).unwrap();
        let second = factory.generate(2).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn when_generating_a_grid_the_encoding_round_trips() {
        let factory = GridFactory::new(8, 8, 2);
        let grid = factory.generate(7).unwrap();

        assert_eq!(Grid::parse(&grid.serialize()).unwrap(), grid);
    }
}
