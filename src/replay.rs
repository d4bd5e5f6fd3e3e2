use crate::grid::{Grid, GridError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Version of the replay file layout. Bumped whenever the stored shape
/// changes; `load` rejects files written with any other version.
pub const REPLAY_VERSION: u32 = 1;

/// Errors raised while storing or loading a [`Replay`]. Never affects a
/// running game.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed replay file: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported replay version {0}, expected {REPLAY_VERSION}")]
    UnsupportedVersion(u32),
    #[error("replay grid does not reconstruct: {0}")]
    Grid(#[from] GridError),
    #[error("snapshot {index} has {len} cells, the grid declares {expected}")]
    SnapshotShape {
        index: usize,
        len: usize,
        expected: usize,
    },
    #[error("snapshot {index} references player {player}, but the replay has {players} agents")]
    UnknownPlayer {
        index: usize,
        player: usize,
        players: usize,
    },
}

/// Display metadata for one agent, stored in the replay header.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AgentData {
    pub name: String,
    pub color: (u8, u8, u8),
}

/// One recorded game state: the full army and ownership channels after a
/// turn resolved, plus which players were still alive.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Snapshot {
    pub turn: usize,
    pub army: Vec<u32>,
    pub owner: Vec<Option<usize>>,
    pub alive: Vec<usize>,
}

/// An append-only log of game state snapshots with the grid and agent
/// metadata needed to play any turn back without re-running game logic.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Replay {
    version: u32,
    grid: String,
    agents: Vec<AgentData>,
    snapshots: Vec<Snapshot>,
}

impl Replay {
    pub fn new(grid: &Grid, agents: Vec<AgentData>) -> Replay {
        Replay {
            version: REPLAY_VERSION,
            grid: grid.serialize(),
            agents,
            snapshots: Vec::new(),
        }
    }

    /// Appends a snapshot of the given channels.
    pub fn add_snapshot(
        &mut self,
        turn: usize,
        army: &[u32],
        owner: &[Option<usize>],
        alive: Vec<usize>,
    ) {
        self.snapshots.push(Snapshot {
            turn,
            army: army.to_vec(),
            owner: owner.to_vec(),
            alive,
        });
    }

    /// The grid the recorded game was played on.
    pub fn grid(&self) -> Result<Grid, GridError> {
        Grid::parse(&self.grid)
    }

    pub fn agents(&self) -> &[AgentData] {
        &self.agents
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Persists the replay to `path`. The output handle is held only for
    /// the duration of this call and released on every exit path.
    pub fn store(&self, path: impl AsRef<Path>) -> Result<(), ReplayError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Loads and validates a stored replay.
    pub fn load(path: impl AsRef<Path>) -> Result<Replay, ReplayError> {
        let file = File::open(path)?;
        let replay: Replay = serde_json::from_reader(BufReader::new(file))?;
        replay.validate()?;
        Ok(replay)
    }

    fn validate(&self) -> Result<(), ReplayError> {
        if self.version != REPLAY_VERSION {
            return Err(ReplayError::UnsupportedVersion(self.version));
        }

        let grid = Grid::parse(&self.grid)?;
        let expected = grid.rows() * grid.cols();
        let players = self.agents.len();

        for (index, snapshot) in self.snapshots.iter().enumerate() {
            for len in [snapshot.army.len(), snapshot.owner.len()] {
                if len != expected {
                    return Err(ReplayError::SnapshotShape {
                        index,
                        len,
                        expected,
                    });
                }
            }

            let referenced = snapshot
                .owner
                .iter()
                .flatten()
                .chain(snapshot.alive.iter());
            for &player in referenced {
                if player >= players {
                    return Err(ReplayError::UnknownPlayer {
                        index,
                        player,
                        players,
                    });
                }
            }
        }

        Ok(())
    }
}
