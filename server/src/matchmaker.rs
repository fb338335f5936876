//! Pool of running matches and the players waiting for one.

use crate::error::LayoutError;
use crate::game::Game;
use crate::layout::Layout;
use crate::player::Player;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::Color;
use std::collections::HashSet;
use std::mem;
use std::path::Path;
use std::time::Instant;

/// Colour the match view draws the board with.
pub const BACKGROUND: Color = Color::new(26, 26, 26);

/// Player colours closer than this to [`BACKGROUND`] are replaced.
pub const MIN_BACKGROUND_DISTANCE: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub color: Color,
    pub elo: i32,
    pub in_game: bool,
}

pub struct Matchmaker {
    slots: Vec<Option<Game>>,
    free_players: Vec<Player>,
    layout: Layout,
    rng: StdRng,
}

impl Matchmaker {
    pub fn new(target_games: usize, layout: Layout, rng: StdRng) -> Self {
        Self {
            slots: (0..target_games).map(|_| None).collect(),
            free_players: Vec::new(),
            layout,
            rng,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Replaces the layout used for matches created from now on.
    pub fn set_layout(&mut self, layout: Layout) {
        info!(
            "Using {}x{} layout with {} snakes and {} food",
            layout.num_rows,
            layout.num_cols,
            layout.num_snakes(),
            layout.num_food
        );
        self.layout = layout;
    }

    /// Loads a layout file. On failure the current layout stays active.
    pub fn reload_layout(&mut self, path: &Path) -> Result<(), LayoutError> {
        let layout = Layout::load(path)?;
        self.set_layout(layout);
        Ok(())
    }

    pub fn target_games(&self) -> usize {
        self.slots.len()
    }

    pub fn active_games(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Running matches with their slot index.
    pub fn games(&self) -> impl Iterator<Item = (usize, &Game)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|game| (index, game)))
    }

    pub fn free_players(&self) -> &[Player] {
        &self.free_players
    }

    fn all_players(&self) -> impl Iterator<Item = &Player> {
        self.games()
            .flat_map(|(_, game)| game.players())
            .chain(self.free_players.iter())
    }

    /// `requested`, or `requested` followed by the first free " N" suffix.
    pub fn player_name(&self, requested: &str) -> String {
        let taken: HashSet<&str> = self.all_players().map(Player::name).collect();

        if !taken.contains(requested) {
            return requested.to_string();
        }

        (1..)
            .map(|n| format!("{} {}", requested, n))
            .find(|candidate| !taken.contains(candidate.as_str()))
            .unwrap_or_else(|| requested.to_string())
    }

    /// `requested`, or a random colour if it would vanish into the background.
    pub fn player_color(&mut self, requested: Color) -> Color {
        let mut color = requested;
        while color.distance(BACKGROUND) < MIN_BACKGROUND_DISTANCE {
            color = Color::new(self.rng.gen(), self.rng.gen(), self.rng.gen());
        }
        color
    }

    /// Queues a player for the next match. Returns the name it was given.
    pub fn add_player(&mut self, mut player: Player) -> String {
        let name = self.player_name(player.name());
        let color = self.player_color(player.color());

        player.set_name(name.clone());
        player.set_color(color);
        player.set_in_game(false);

        info!("{} joined the pool ({}, elo {})", name, color, player.elo());
        self.free_players.push(player);

        name
    }

    /// One scheduling pass: drop kicked players, advance or finish running
    /// matches, then start new ones in free slots.
    pub fn tick(&mut self, now: Instant) {
        let (kicked, waiting): (Vec<Player>, Vec<Player>) =
            mem::take(&mut self.free_players).into_iter().partition(Player::is_kicked);
        self.free_players = waiting;

        for player in kicked {
            info!("{} left the pool", player.name());
            player.remove();
        }

        for index in 0..self.slots.len() {
            let ended = match &mut self.slots[index] {
                Some(game) if game.has_ended() => true,
                Some(game) => {
                    game.try_advance(now);
                    false
                }
                None => false,
            };

            if ended {
                if let Some(game) = self.slots[index].take() {
                    self.retire(index, game);
                }
            }
        }

        self.fill_slots(now);
    }

    fn retire(&mut self, index: usize, mut game: Game) {
        game.finish();
        info!("Match in slot {} finished after {} turns", index, game.turn());

        for mut player in game.into_players() {
            if player.is_kicked() {
                info!("{} was kicked", player.name());
                player.remove();
            } else {
                player.set_in_game(false);
                self.free_players.push(player);
            }
        }
    }

    fn fill_slots(&mut self, now: Instant) {
        let needed = self.layout.num_snakes();
        if needed == 0 {
            warn!("Layout has no snakes, no matches can start");
            return;
        }

        while self.free_players.len() >= needed {
            let Some(index) = self.slots.iter().position(Option::is_none) else {
                break;
            };

            let mut picked = rand::seq::index::sample(&mut self.rng, self.free_players.len(), needed).into_vec();
            picked.sort_unstable_by(|a, b| b.cmp(a));

            let players: Vec<Player> = picked
                .into_iter()
                .map(|i| self.free_players.remove(i))
                .collect();

            let names: Vec<&str> = players.iter().map(Player::name).collect();
            info!("Starting match in slot {} with {}", index, names.join(", "));

            let rng = StdRng::seed_from_u64(self.rng.gen());
            self.slots[index] = Some(Game::new(&self.layout, players, rng, now));
        }
    }

    /// Every known player, best rating first.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .all_players()
            .map(|player| LeaderboardEntry {
                name: player.name().to_string(),
                color: player.color(),
                elo: player.elo(),
                in_game: player.in_game(),
            })
            .collect();

        entries.sort_by(|a, b| b.elo.cmp(&a.elo).then_with(|| a.name.cmp(&b.name)));
        entries
    }
}
