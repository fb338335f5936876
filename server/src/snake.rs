use shared::Pos;
use std::collections::VecDeque;
use std::fmt;

/// Death turn reported for snakes still alive when their match finishes.
pub const SURVIVED_TURN: u32 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathReason {
    Timeout,
    HeadCollision,
    OutOfBounds,
    OwnBody,
    OtherBody,
}

impl DeathReason {
    pub fn is_timeout(self) -> bool {
        self == DeathReason::Timeout
    }
}

impl fmt::Display for DeathReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeathReason::Timeout => write!(
                f,
                "Didn't receive move after {}ms",
                crate::game::MOVE_TIMEOUT.as_millis()
            ),
            DeathReason::HeadCollision => f.write_str("Collision with other snake's head"),
            DeathReason::OutOfBounds => f.write_str("Out of bounds"),
            DeathReason::OwnBody => f.write_str("Tried to move to own body"),
            DeathReason::OtherBody => f.write_str("Tried to move to other snake's body"),
        }
    }
}

/// A player's body on the board. The back of the queue is the head.
#[derive(Debug, Clone)]
pub struct Snake {
    id: u32,
    body: VecDeque<Pos>,
    start_size: usize,
    alive: bool,
    died_on: Option<u32>,
    size_at_death: Option<usize>,
    death_reason: Option<DeathReason>,
}

impl Snake {
    /// Builds a snake from its cells, tail first.
    pub fn new(id: u32, cells: impl IntoIterator<Item = Pos>) -> Self {
        let body: VecDeque<Pos> = cells.into_iter().collect();
        Self {
            id,
            start_size: body.len(),
            body,
            alive: true,
            died_on: None,
            size_at_death: None,
            death_reason: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn head(&self) -> Option<Pos> {
        self.body.back().copied()
    }

    pub fn body(&self) -> &VecDeque<Pos> {
        &self.body
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn start_size(&self) -> usize {
        self.start_size
    }

    /// Length at death for dead snakes, current length otherwise.
    pub fn final_size(&self) -> usize {
        self.size_at_death.unwrap_or(self.body.len())
    }

    pub fn died_on(&self) -> Option<u32> {
        self.died_on
    }

    pub fn death_reason(&self) -> Option<DeathReason> {
        self.death_reason
    }

    pub fn push_head(&mut self, pos: Pos) {
        self.body.push_back(pos);
    }

    pub fn retract_tail(&mut self) -> Option<Pos> {
        self.body.pop_front()
    }

    /// Marks the snake dead and hands back the cells it occupied.
    ///
    /// Returns `None` if the snake was already dead.
    pub fn kill(&mut self, turn: u32, reason: DeathReason) -> Option<Vec<Pos>> {
        if !self.alive {
            return None;
        }

        self.alive = false;
        self.died_on = Some(turn);
        self.death_reason = Some(reason);
        self.size_at_death = Some(self.body.len());

        Some(self.body.drain(..).collect())
    }

    /// Stamps a survivor with [`SURVIVED_TURN`] so it ranks after every dead snake.
    pub fn mark_survived(&mut self) {
        if self.alive {
            self.died_on = Some(SURVIVED_TURN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Snake {
        Snake::new(3, [Pos::new(0, 0), Pos::new(0, 1), Pos::new(0, 2)])
    }

    #[test]
    fn test_snake_creation() {
        let snake = line();
        assert_eq!(snake.id(), 3);
        assert_eq!(snake.head(), Some(Pos::new(0, 2)));
        assert_eq!(snake.start_size(), 3);
        assert_eq!(snake.final_size(), 3);
        assert!(snake.is_alive());
    }

    #[test]
    fn test_move_by_push_and_retract() {
        let mut snake = line();
        assert_eq!(snake.retract_tail(), Some(Pos::new(0, 0)));
        snake.push_head(Pos::new(1, 2));
        assert_eq!(snake.head(), Some(Pos::new(1, 2)));
        assert_eq!(snake.body().len(), 3);
    }

    #[test]
    fn test_kill_snapshots_size_once() {
        let mut snake = line();
        snake.push_head(Pos::new(0, 3));

        let cells = snake.kill(7, DeathReason::OutOfBounds).unwrap();
        assert_eq!(cells.len(), 4);
        assert!(!snake.is_alive());
        assert!(snake.body().is_empty());
        assert_eq!(snake.final_size(), 4);
        assert_eq!(snake.died_on(), Some(7));
        assert_eq!(snake.death_reason(), Some(DeathReason::OutOfBounds));

        assert!(snake.kill(8, DeathReason::Timeout).is_none());
        assert_eq!(snake.died_on(), Some(7));
        assert_eq!(snake.final_size(), 4);
    }

    #[test]
    fn test_mark_survived_only_touches_living() {
        let mut alive = line();
        alive.mark_survived();
        assert_eq!(alive.died_on(), Some(SURVIVED_TURN));

        let mut dead = line();
        dead.kill(2, DeathReason::HeadCollision);
        dead.mark_survived();
        assert_eq!(dead.died_on(), Some(2));
    }

    #[test]
    fn test_reason_text() {
        assert_eq!(DeathReason::Timeout.to_string(), "Didn't receive move after 2000ms");
        assert_eq!(
            DeathReason::HeadCollision.to_string(),
            "Collision with other snake's head"
        );
    }
}
