use crate::game::{Action, Direction};
use crate::observation::{CellClass, Observation};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// The capability every policy exposes to the game loop: pick an action for
/// the current observation, and reset any internal state between games.
pub trait Agent {
    /// Chooses an action for the turn. `None` is an idle turn.
    fn play(&mut self, observation: &Observation) -> Option<Action>;

    /// Resets the agent's state before a new game. Stateless agents can
    /// keep the default no-op.
    fn reset(&mut self) {}
}

/// Picks a uniformly random legal action, occasionally idling or splitting.
pub struct RandomAgent {
    idle_probability: f64,
    split_probability: f64,
    rng: StdRng,
}

impl RandomAgent {
    pub fn new(seed: u64) -> RandomAgent {
        RandomAgent::with_probabilities(seed, 0.1, 0.25)
    }

    pub fn with_probabilities(
        seed: u64,
        idle_probability: f64,
        split_probability: f64,
    ) -> RandomAgent {
        RandomAgent {
            idle_probability,
            split_probability,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomAgent {
    fn play(&mut self, observation: &Observation) -> Option<Action> {
        let legal = observation.legal_actions();
        if legal.is_empty() || self.rng.gen_bool(self.idle_probability) {
            return None;
        }

        legal.choose(&mut self.rng).map(|&(row, col, direction)| {
            let split = self.rng.gen_bool(self.split_probability);
            Action::new(row, col, direction, split)
        })
    }
}

/// Heuristic policy that prioritizes capturing opponent cells, then neutral
/// cells, and otherwise moves randomly. Never splits.
pub struct ExpanderAgent {
    rng: StdRng,
}

impl ExpanderAgent {
    pub fn new(seed: u64) -> ExpanderAgent {
        ExpanderAgent {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for ExpanderAgent {
    fn play(&mut self, observation: &Observation) -> Option<Action> {
        let legal = observation.legal_actions();
        if legal.is_empty() {
            return None;
        }

        let mut to_opponent = Vec::new();
        let mut to_neutral = Vec::new();

        for &(row, col, direction) in &legal {
            let Some((to_row, to_col)) =
                direction.apply(row, col, observation.rows(), observation.cols())
            else {
                continue;
            };

            // The destination of a legal move is adjacent to an owned cell,
            // so both armies are visible
            let source_army = observation.army_at(row, col).unwrap_or(0);
            let dest_army = observation.army_at(to_row, to_col).unwrap_or(0);
            if source_army <= dest_army + 1 {
                // Not enough army to take the cell
                continue;
            }

            match observation.class_at(to_row, to_col) {
                CellClass::Opponent => to_opponent.push((row, col, direction)),
                CellClass::Neutral => to_neutral.push((row, col, direction)),
                _ => {}
            }
        }

        let pool = if !to_opponent.is_empty() {
            &to_opponent
        } else if !to_neutral.is_empty() {
            &to_neutral
        } else {
            &legal
        };

        pool.choose(&mut self.rng)
            .map(|&(row, col, direction)| Action::new(row, col, direction, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Game;
    use crate::grid::Grid;

    fn game_4x4() -> Game {
        let grid = "\
            rows 4
            cols 4
            players 2
            m A...
            m ....
            m ....
            m ...B";
        Game::new(
            Grid::parse(grid).unwrap(),
            vec!["red".to_string(), "blue".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn when_no_action_is_legal_the_random_agent_idles() {
        let game = game_4x4();
        let observation = game.agent_observation("red").unwrap();
        let mut agent = RandomAgent::with_probabilities(0, 0.0, 0.0);

        assert!(agent.play(&observation).is_none());
    }

    #[test]
    fn when_actions_are_legal_the_random_agent_picks_one_of_them() {
        let mut game = game_4x4();
        game.set_cell(0, 0, Some(0), 5);
        let observation = game.agent_observation("red").unwrap();
        let mut agent = RandomAgent::with_probabilities(0, 0.0, 0.0);

        for _ in 0..20 {
            let action = agent.play(&observation).unwrap();
            let legal = observation.legal_actions();
            assert!(legal
                .iter()
                .any(|&(row, col, direction)| Action::new(row, col, direction, false) == action));
        }
    }

    #[test]
    fn when_the_idle_probability_is_one_the_random_agent_always_idles() {
        let mut game = game_4x4();
        game.set_cell(0, 0, Some(0), 5);
        let observation = game.agent_observation("red").unwrap();
        let mut agent = RandomAgent::with_probabilities(0, 1.0, 0.0);

        assert!(agent.play(&observation).is_none());
    }

    #[test]
    fn when_random_agents_share_a_seed_they_play_the_same_moves() {
        let mut game = game_4x4();
        game.set_cell(0, 0, Some(0), 5);
        game.set_cell(1, 1, Some(0), 3);
        let observation = game.agent_observation("red").unwrap();

        let mut first = RandomAgent::new(42);
        let mut second = RandomAgent::new(42);

        for _ in 0..10 {
            assert_eq!(first.play(&observation), second.play(&observation));
        }
    }

    #[test]
    fn when_an_opponent_cell_can_be_captured_the_expander_attacks_it() {
        let mut game = game_4x4();
        game.set_cell(1, 1, Some(0), 10);
        game.set_cell(1, 2, Some(1), 2);
        let observation = game.agent_observation("red").unwrap();
        let mut agent = ExpanderAgent::new(0);

        for _ in 0..10 {
            let action = agent.play(&observation).unwrap();
            assert_eq!(action, Action::new(1, 1, Direction::Right, false));
        }
    }

    #[test]
    fn when_only_neutral_cells_can_be_captured_the_expander_expands() {
        let mut game = game_4x4();
        game.set_cell(1, 1, Some(0), 10);
        let observation = game.agent_observation("red").unwrap();
        let mut agent = ExpanderAgent::new(0);

        // Every destination around (1, 1) is a neutral cell it can take
        for _ in 0..10 {
            let action = agent.play(&observation).unwrap();
            assert!(Direction::ALL
                .iter()
                .any(|&direction| action == Action::new(1, 1, direction, false)));
        }
    }

    #[test]
    fn when_nothing_can_be_captured_the_expander_still_moves() {
        let mut game = game_4x4();
        game.set_cell(1, 1, Some(0), 3);
        // Every neighbor defends with more than the 2 that can move
        game.set_cell(0, 1, None, 5);
        game.set_cell(2, 1, None, 5);
        game.set_cell(1, 0, None, 5);
        game.set_cell(1, 2, None, 5);
        let observation = game.agent_observation("red").unwrap();
        let mut agent = ExpanderAgent::new(0);

        let action = agent.play(&observation);
        assert!(action.is_some());
    }
}
