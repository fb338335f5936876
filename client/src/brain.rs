//! Move selection for the bot client.

use crate::game::ClientGameState;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use shared::Move;

/// Chooses the next move from the mirrored board.
pub trait SnakeBrain {
    fn choose_move(&mut self, state: &ClientGameState) -> Move;
}

/// Picks uniformly among moves that stay on the board and avoid bodies,
/// preferring ones that step onto food.
#[derive(Debug)]
pub struct RandomSafeBrain {
    rng: StdRng,
}

impl RandomSafeBrain {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl SnakeBrain for RandomSafeBrain {
    fn choose_move(&mut self, state: &ClientGameState) -> Move {
        let Some(head) = state.head() else {
            return Move::Up;
        };

        let safe: Vec<Move> = Move::ALL
            .into_iter()
            .filter(|mv| state.is_free(head.moved(*mv)))
            .collect();

        let eating: Vec<Move> = safe
            .iter()
            .copied()
            .filter(|mv| state.get(head.moved(*mv)) == Some(shared::Square::Food))
            .collect();

        let pool = if eating.is_empty() { &safe } else { &eating };
        pool.choose(&mut self.rng).copied().unwrap_or(Move::Up)
    }
}

/// Always answers with the same move.
#[derive(Debug, Clone, Copy)]
pub struct FixedBrain(pub Move);

impl SnakeBrain for FixedBrain {
    fn choose_move(&mut self, _state: &ClientGameState) -> Move {
        self.0
    }
}
