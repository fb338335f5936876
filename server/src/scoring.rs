//! Placement scoring and multiplayer Elo updates.
//!
//! Every finished match ranks its snakes, converts ranks to a linear
//! placement score that sums to 1 over the match, and moves each rating by
//! the gap between that score and the score expected from the ratings at
//! match start.

/// Logistic divisor of the expected-score curve.
pub const ELO_D: f64 = 400.0;

/// Rating step per unit of score surprise, scaled by `n - 1` players.
pub const ELO_K: f64 = 50.0;

/// Extra growth credited to snakes alive at the end of the match.
pub const SURVIVAL_BONUS: i64 = 10;

/// Distance from an integer below which a raw rating change counts as that integer.
const DELTA_EPSILON: f64 = 1e-9;

/// What a snake brought to the final ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    /// Final size minus starting size, plus [`SURVIVAL_BONUS`] for survivors.
    pub growth: i64,
    pub died_on: u32,
}

impl Standing {
    fn key(&self) -> (i64, u32) {
        (self.growth, self.died_on)
    }
}

/// Outcome for one snake, in the same order as the standings passed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub score: f64,
    /// 1 + number of snakes ranked strictly better.
    pub rank: u32,
    /// Other snakes sharing this snake's tie block.
    pub num_ties: u32,
    pub elo_delta: i32,
}

/// Expected placement score of each rating against the rest of the field.
///
/// The values sum to 1 for two or more players.
pub fn expected_scores(ratings: &[i32]) -> Vec<f64> {
    let n = ratings.len();
    if n < 2 {
        return vec![1.0; n];
    }

    let pairs = (n * (n - 1) / 2) as f64;

    ratings
        .iter()
        .enumerate()
        .map(|(i, &own)| {
            let total: f64 = ratings
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, &other)| 1.0 / (1.0 + 10f64.powf((other - own) as f64 / ELO_D)))
                .sum();
            total / pairs
        })
        .collect()
}

/// Rounds a raw rating change down, treating values within
/// [`DELTA_EPSILON`] of an integer as that integer.
fn floor_delta(raw: f64) -> i32 {
    let nearest = raw.round();
    if (raw - nearest).abs() < DELTA_EPSILON {
        nearest as i32
    } else {
        raw.floor() as i32
    }
}

/// Linear score for 1-based `rank` out of `n`.
pub fn placement_score(rank: usize, n: usize) -> f64 {
    if n < 2 {
        return 1.0;
    }
    (n - rank) as f64 / (n * (n - 1) / 2) as f64
}

/// Ranks the standings and computes rating changes that sum to exactly zero.
///
/// `expected` holds each snake's expected score, aligned with `standings`.
pub fn settle(standings: &[Standing], expected: &[f64]) -> Vec<Placement> {
    let n = standings.len();
    debug_assert_eq!(n, expected.len());

    // Best first; a stable sort keeps equal keys in id order.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| standings[b].key().cmp(&standings[a].key()));

    let mut placements = vec![
        Placement {
            score: 0.0,
            rank: 0,
            num_ties: 0,
            elo_delta: 0,
        };
        n
    ];

    let mut start = 0;
    while start < n {
        let key = standings[order[start]].key();
        let end = order[start..]
            .iter()
            .position(|&i| standings[i].key() != key)
            .map_or(n, |offset| start + offset);

        let block = end - start;
        let shared: f64 = (start + 1..=end).map(|rank| placement_score(rank, n)).sum::<f64>() / block as f64;

        for &i in &order[start..end] {
            placements[i].score = shared;
            placements[i].rank = start as u32 + 1;
            placements[i].num_ties = block as u32 - 1;
        }

        start = end;
    }

    if n < 2 {
        return placements;
    }

    let scale = ELO_K * (n - 1) as f64;
    let mut total = 0i32;
    for (i, placement) in placements.iter_mut().enumerate() {
        placement.elo_delta = floor_delta((placement.score - expected[i]) * scale);
        total += placement.elo_delta;
    }

    if total < 0 {
        placements[order[0]].elo_delta -= total;
    } else if total > 0 {
        placements[order[n - 1]].elo_delta -= total;
    }

    placements
}
