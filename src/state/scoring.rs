//! Pure scoring of a round's submitted guesses.

use indexmap::IndexMap;

/// Points awarded per member of a matching group, multiplied by group size.
const POINTS_PER_GROUP_MEMBER: u32 = 100;

/// Players whose normalized guesses were identical, with the points each of
/// them earns for the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessGroup {
    /// Normalized guess text shared by the group.
    pub guess: String,
    /// Points awarded to every player in the group (0 for singletons).
    pub points: u32,
    /// Names of the grouped players, in submission order.
    pub players: Vec<String>,
}

/// Fold a raw guess into its canonical matching form.
///
/// Matching is intentionally forgiving: surrounding whitespace and letter
/// case never separate two guesses.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Group a round's guesses by normalized text and compute per-player awards.
///
/// `guesses` maps player name to raw guess text, one entry per player, in
/// submission order. Groups of size >= 2 earn `100 x size` points per member;
/// a player nobody matched earns nothing. The result is deterministic for a
/// given input: groups appear in first-submission order and players keep
/// their submission order within a group.
pub fn score_round(guesses: &IndexMap<String, String>) -> Vec<GuessGroup> {
    let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
    for (player, raw) in guesses {
        grouped
            .entry(normalize(raw))
            .or_default()
            .push(player.clone());
    }

    grouped
        .into_iter()
        .map(|(guess, players)| {
            let points = if players.len() >= 2 {
                POINTS_PER_GROUP_MEMBER * players.len() as u32
            } else {
                0
            };
            GuessGroup {
                guess,
                points,
                players,
            }
        })
        .collect()
}
