//! # generals_engine
//!
//! The core engine for a generals-style territory conquest game.
//! Deterministic, turn-based, and played under a fog of war.

pub mod agents;
pub mod game;
pub mod grid;
pub mod observation;
pub mod replay;

pub use agents::Agent;
pub use agents::ExpanderAgent;
pub use agents::RandomAgent;
pub use game::Action;
pub use game::ActionError;
pub use game::Direction;
pub use game::Game;
pub use game::GameError;
pub use game::Info;
pub use game::player_color;
pub use game::LAND_GROWTH_INTERVAL;
pub use grid::Grid;
pub use grid::GridError;
pub use grid::GridFactory;
pub use grid::Terrain;
pub use grid::CITY_BASE_ARMY;
pub use observation::CellClass;
pub use observation::Observation;
pub use observation::ObservedTerrain;
pub use replay::AgentData;
pub use replay::Replay;
pub use replay::ReplayError;
pub use replay::Snapshot;
pub use replay::REPLAY_VERSION;
