use crate::grid::{Grid, GridError, Terrain};
use crate::observation::Observation;
use crate::replay::{AgentData, Replay};
use crossterm::{
    cursor::Hide,
    execute,
    style::{Color, Print, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::collections::HashMap;
use std::io::{stdout, Write};
use thiserror::Error;

/// How often plain owned land grows by one army, in turns.
pub const LAND_GROWTH_INTERVAL: usize = 50;

/// Display colors assigned to players, indexed by player number.
const PLAYER_PALETTE: [(u8, u8, u8); 10] = [
    (220, 50, 47),
    (60, 160, 60),
    (50, 100, 220),
    (200, 180, 40),
    (180, 70, 180),
    (60, 180, 180),
    (150, 40, 40),
    (40, 110, 40),
    (130, 40, 130),
    (160, 130, 30),
];

pub fn player_color(player: usize) -> (u8, u8, u8) {
    PLAYER_PALETTE[player % PLAYER_PALETTE.len()]
}

/// Represents the direction an army can move.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Stable index of the direction, used by the legal-action mask.
    pub fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }

    /// The destination of a move from `(row, col)`, or `None` when it would
    /// leave a grid of the given dimensions.
    pub fn apply(self, row: usize, col: usize, rows: usize, cols: usize) -> Option<(usize, usize)> {
        match self {
            Direction::Up => (row > 0).then(|| (row - 1, col)),
            Direction::Down => (row + 1 < rows).then(|| (row + 1, col)),
            Direction::Left => (col > 0).then(|| (row, col - 1)),
            Direction::Right => (col + 1 < cols).then(|| (row, col + 1)),
        }
    }
}

/// Represents a move an agent can make on its turn.
///
/// If the source cell is not owned by the agent, holds an army of 1 or less,
/// or the destination is off-grid or a mountain, the action is downgraded to
/// idle rather than rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Action {
    row: usize,
    col: usize,
    direction: Direction,
    split: bool,
}

impl Action {
    /// Creates a new action.
    ///
    /// # Arguments
    /// * `row` - The row of the source cell.
    /// * `col` - The column of the source cell.
    /// * `direction` - The direction to move the army.
    /// * `split` - Move half the army (rounded down) instead of all but one.
    pub fn new(row: usize, col: usize, direction: Direction, split: bool) -> Action {
        Action {
            row,
            col,
            direction,
            split,
        }
    }
}

/// Errors raised while constructing a [`Game`].
#[derive(Debug, Error)]
pub enum GameError {
    #[error("agent name `{0}` is used more than once")]
    DuplicateAgent(String),
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Structural errors for a [`Game::step`] call. The game state is unchanged
/// when one of these is returned.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown agent `{0}`")]
    UnknownAgent(String),
    #[error("no action submitted for living agent `{0}`")]
    MissingAction(String),
}

/// Per-agent summary returned alongside each observation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Info {
    /// Total army over all cells the agent owns.
    pub army: u32,
    /// Number of cells the agent owns.
    pub land: usize,
    /// The turn the game is on.
    pub turn: usize,
}

/// The generals game.
/// Main entry point for running the simulation.
pub struct Game {
    grid: Grid,
    agents: Vec<String>,
    army: Vec<u32>,
    owner: Vec<Option<usize>>,
    alive: Vec<bool>,
    turn: usize,
    land_growth_interval: usize,
    replay: Option<Replay>,
}

impl Game {
    /// Creates a new game on the given grid.
    ///
    /// Fails when the grid does not carry exactly one general per agent, or
    /// when two agents share a name. The index of a name in `agents` is the
    /// player number owning the matching general.
    pub fn new(grid: Grid, agents: Vec<String>) -> Result<Game, GameError> {
        if grid.players() != agents.len() {
            return Err(GameError::Grid(GridError::GeneralCount {
                expected: agents.len(),
                found: grid.players(),
            }));
        }
        for (index, name) in agents.iter().enumerate() {
            if agents[..index].contains(name) {
                return Err(GameError::DuplicateAgent(name.clone()));
            }
        }

        let cells = grid.rows() * grid.cols();
        let mut owner = vec![None; cells];
        for (player, &(row, col)) in grid.generals().iter().enumerate() {
            owner[row * grid.cols() + col] = Some(player);
        }

        Ok(Game {
            army: grid.army_channel().to_vec(),
            owner,
            alive: vec![true; agents.len()],
            turn: 0,
            land_growth_interval: LAND_GROWTH_INTERVAL,
            replay: None,
            grid,
            agents,
        })
    }

    /// Overrides how often plain owned land grows, in turns.
    pub fn with_land_growth_interval(mut self, interval: usize) -> Game {
        self.land_growth_interval = interval;
        self
    }

    /// Enables replay recording. The initial state is logged immediately and
    /// a snapshot is appended after every resolved turn.
    pub fn with_replay(mut self) -> Game {
        let agent_data = self
            .agents
            .iter()
            .enumerate()
            .map(|(player, name)| AgentData {
                name: name.clone(),
                color: player_color(player),
            })
            .collect();

        let mut replay = Replay::new(&self.grid, agent_data);
        replay.add_snapshot(self.turn, &self.army, &self.owner, self.alive_players());
        self.replay = Some(replay);
        self
    }

    /// Resolves one simultaneous turn.
    ///
    /// `actions` must contain an entry for every living agent; `None` is an
    /// explicit idle. Unknown agent names and missing entries fail with
    /// [`ActionError`] before any state is touched. Semantically illegal
    /// moves are silently downgraded to idle.
    ///
    /// Returns the fog-of-war observation and [`Info`] for every agent.
    ///
    /// # Panics
    /// Panics if the game is already finished.
    pub fn step(
        &mut self,
        actions: &HashMap<String, Option<Action>>,
    ) -> Result<(HashMap<String, Observation>, HashMap<String, Info>), ActionError> {
        if self.is_done() {
            panic!("Game is finished! Create a new game to play again.");
        }

        // Structural validation happens up front so the turn is transactional
        for name in actions.keys() {
            if !self.agents.contains(name) {
                return Err(ActionError::UnknownAgent(name.clone()));
            }
        }
        for (player, name) in self.agents.iter().enumerate() {
            if self.alive[player] && !actions.contains_key(name) {
                return Err(ActionError::MissingAction(name.clone()));
            }
        }

        self.turn += 1;

        // Growth for every agent happens before any movement so that
        // resolution order never changes the combat arithmetic
        self.grow();

        // Moves resolve one agent at a time in ascending player number so
        // contested cells have a reproducible outcome
        for player in 0..self.agents.len() {
            if !self.alive[player] {
                continue;
            }
            if let Some(Some(action)) = actions.get(&self.agents[player]) {
                self.apply_move(player, *action);
            }
        }

        let alive = self.alive_players();
        if let Some(replay) = self.replay.as_mut() {
            replay.add_snapshot(self.turn, &self.army, &self.owner, alive);
        }

        let observations = self
            .agents
            .iter()
            .enumerate()
            .map(|(player, name)| (name.clone(), Observation::build(self, player)))
            .collect();
        let infos = self
            .agents
            .iter()
            .enumerate()
            .map(|(player, name)| (name.clone(), self.agent_info(player)))
            .collect();

        Ok((observations, infos))
    }

    /// The fog-of-war observation for a single agent, by name.
    pub fn agent_observation(&self, agent: &str) -> Option<Observation> {
        self.player_index(agent)
            .map(|player| Observation::build(self, player))
    }

    /// Whether the game reached a terminal state: at most one living agent.
    pub fn is_done(&self) -> bool {
        self.alive.iter().filter(|&&alive| alive).count() <= 1
    }

    /// The winning agent's name, if the game is over and somebody survived.
    pub fn winner(&self) -> Option<&str> {
        self.winner_index()
            .map(|player| self.agents[player].as_str())
    }

    /// Names of the agents that have not been eliminated.
    pub fn alive_agents(&self) -> Vec<&str> {
        self.agents
            .iter()
            .enumerate()
            .filter(|&(player, _)| self.alive[player])
            .map(|(_, name)| name.as_str())
            .collect()
    }

    pub fn turn(&self) -> usize {
        self.turn
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn army_at(&self, row: usize, col: usize) -> u32 {
        self.army[row * self.grid.cols() + col]
    }

    /// The player owning a cell, or `None` for neutral cells.
    pub fn owner_at(&self, row: usize, col: usize) -> Option<usize> {
        self.owner[row * self.grid.cols() + col]
    }

    /// The recorded replay, if recording was enabled.
    pub fn replay(&self) -> Option<&Replay> {
        self.replay.as_ref()
    }

    /// Draws the game to the console.
    pub fn draw(&self) {
        let mut stdout = stdout();

        execute!(
            stdout,
            Clear(ClearType::All),
            Hide,
            Print("Turn: "),
            Print(self.turn.to_string())
        )
        .unwrap();

        for (player, name) in self.agents.iter().enumerate() {
            let info = self.agent_info(player);
            let (r, g, b) = player_color(player);
            execute!(
                stdout,
                SetForegroundColor(Color::Rgb { r, g, b }),
                Print("\n"),
                Print(name.to_string()),
                Print(": Army = "),
                Print(info.army.to_string()),
                Print(", Land = "),
                Print(info.land.to_string()),
                Print(if self.alive[player] { "" } else { " (eliminated)" }),
                SetForegroundColor(Color::Reset)
            )
            .unwrap();
        }
        execute!(stdout, Print("\n\n")).unwrap();

        for row in 0..self.grid.rows() {
            for col in 0..self.grid.cols() {
                let index = row * self.grid.cols() + col;
                let symbol = match self.grid.terrain(row, col) {
                    Terrain::Mountain => '#',
                    Terrain::City => 'C',
                    Terrain::General => 'G',
                    Terrain::Passable => {
                        if self.owner[index].is_some() {
                            'o'
                        } else {
                            '.'
                        }
                    }
                };
                let color = match self.owner[index] {
                    Some(player) => {
                        let (r, g, b) = player_color(player);
                        Color::Rgb { r, g, b }
                    }
                    None => Color::Reset,
                };
                execute!(
                    stdout,
                    SetForegroundColor(color),
                    Print(symbol),
                    SetForegroundColor(Color::Reset)
                )
                .unwrap();
            }
            execute!(stdout, Print("\n")).unwrap();
        }

        stdout.flush().unwrap();
    }

    pub(crate) fn army_channel(&self) -> &[u32] {
        &self.army
    }

    pub(crate) fn owner_channel(&self) -> &[Option<usize>] {
        &self.owner
    }

    pub(crate) fn winner_index(&self) -> Option<usize> {
        let mut living = self
            .alive
            .iter()
            .enumerate()
            .filter(|&(_, &alive)| alive)
            .map(|(player, _)| player);

        match (living.next(), living.next()) {
            (Some(player), None) => Some(player),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_cell(&mut self, row: usize, col: usize, owner: Option<usize>, army: u32) {
        let index = row * self.grid.cols() + col;
        self.owner[index] = owner;
        self.army[index] = army;
    }

    fn player_index(&self, agent: &str) -> Option<usize> {
        self.agents.iter().position(|name| name == agent)
    }

    fn agent_info(&self, player: usize) -> Info {
        let mut army = 0;
        let mut land = 0;
        for (index, &owner) in self.owner.iter().enumerate() {
            if owner == Some(player) {
                army += self.army[index];
                land += 1;
            }
        }

        Info {
            army,
            land,
            turn: self.turn,
        }
    }

    fn alive_players(&self) -> Vec<usize> {
        self.alive
            .iter()
            .enumerate()
            .filter(|&(_, &alive)| alive)
            .map(|(player, _)| player)
            .collect()
    }

    fn grow(&mut self) {
        let land_growth = self.turn % self.land_growth_interval == 0;

        for index in 0..self.army.len() {
            let Some(player) = self.owner[index] else {
                continue;
            };
            if !self.alive[player] {
                continue;
            }

            match self.grid.terrain_channel()[index] {
                Terrain::General | Terrain::City => self.army[index] += 1,
                _ if land_growth => self.army[index] += 1,
                _ => {}
            }
        }
    }

    fn apply_move(&mut self, player: usize, action: Action) {
        let rows = self.grid.rows();
        let cols = self.grid.cols();

        // An invalid action is an idle turn, never an error: agents are
        // expected to consult the action mask but not required to honor it
        if action.row >= rows || action.col >= cols {
            return;
        }
        let source = action.row * cols + action.col;
        if self.owner[source] != Some(player) || self.army[source] <= 1 {
            return;
        }
        let Some((to_row, to_col)) = action.direction.apply(action.row, action.col, rows, cols)
        else {
            return;
        };
        let dest = to_row * cols + to_col;
        if self.grid.terrain_channel()[dest] == Terrain::Mountain {
            return;
        }

        let moved = if action.split {
            self.army[source] / 2
        } else {
            self.army[source] - 1
        };
        self.army[source] -= moved;

        if self.owner[dest] == Some(player) {
            // Merge with own army, no ownership change
            self.army[dest] += moved;
            return;
        }

        let defense = i64::from(self.army[dest]) - i64::from(moved);
        if defense > 0 {
            // Attack repelled, the defender keeps the cell
            self.army[dest] = defense as u32;
        } else if defense == 0 {
            // The attack exactly consumed the defense with nothing left over
            // to occupy the cell
            self.army[dest] = 0;
            self.owner[dest] = None;
        } else {
            let defeated = self.owner[dest];
            self.army[dest] = (-defense) as u32;
            self.owner[dest] = Some(player);

            if self.grid.terrain_channel()[dest] == Terrain::General {
                if let Some(defeated) = defeated {
                    self.eliminate(defeated, player);
                }
            }
        }
    }

    /// Removes `defeated` from the game, transferring every cell it owns to
    /// `capturer` with armies halved (rounded down). Plain cells halved to
    /// zero become neutral; city and general cells keep a minimum garrison
    /// of 1 so an owned city is never empty.
    fn eliminate(&mut self, defeated: usize, capturer: usize) {
        self.alive[defeated] = false;

        for index in 0..self.army.len() {
            if self.owner[index] != Some(defeated) {
                continue;
            }

            let halved = self.army[index] / 2;
            match self.grid.terrain_channel()[index] {
                Terrain::General | Terrain::City => {
                    self.owner[index] = Some(capturer);
                    self.army[index] = halved.max(1);
                }
                _ if halved == 0 => {
                    self.owner[index] = None;
                    self.army[index] = 0;
                }
                _ => {
                    self.owner[index] = Some(capturer);
                    self.army[index] = halved;
                }
            }
        }
    }
}
