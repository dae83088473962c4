// Head-to-head category scoring for a fantasy week.

use std::cmp::Ordering;

use crate::aggregation::records::{Matchup, TeamWeek};
use crate::stats::schema::{Category, ParsedStats};

/// Categories contested each week, in scoring order.
pub const MATCHUP_CATEGORIES: [Category; 10] = [
    Category::G,
    Category::A,
    Category::P,
    Category::PPP,
    Category::SOG,
    Category::HIT,
    Category::BLK,
    Category::W,
    Category::GAA,
    Category::SVP,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

/// League rule: a week with equal categories won goes to the home team.
pub const HOME_WINS_TIES: Side = Side::Home;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchupScore {
    pub home_categories_won: u32,
    pub away_categories_won: u32,
}

impl MatchupScore {
    pub fn winner(&self) -> Side {
        match self.home_categories_won.cmp(&self.away_categories_won) {
            Ordering::Greater => Side::Home,
            Ordering::Less => Side::Away,
            Ordering::Equal => HOME_WINS_TIES,
        }
    }

    /// Whether the winner was decided by [`HOME_WINS_TIES`].
    pub fn is_tie_break(&self) -> bool {
        self.home_categories_won == self.away_categories_won
    }
}

/// Which side takes one category, if either. Goaltending rates only count
/// when both teams recorded one.
pub fn category_winner(category: Category, home: f64, away: f64) -> Option<Side> {
    if matches!(category, Category::GAA | Category::SVP) && !(home > 0.0 && away > 0.0) {
        return None;
    }
    let ordering = home.partial_cmp(&away)?;
    let ordering = if category.lower_is_better() {
        ordering.reverse()
    } else {
        ordering
    };
    match ordering {
        Ordering::Greater => Some(Side::Home),
        Ordering::Less => Some(Side::Away),
        Ordering::Equal => None,
    }
}

pub fn score_stats(home: &ParsedStats, away: &ParsedStats) -> MatchupScore {
    let mut score = MatchupScore::default();
    for category in MATCHUP_CATEGORIES {
        match category_winner(category, home.category(category), away.category(category)) {
            Some(Side::Home) => score.home_categories_won += 1,
            Some(Side::Away) => score.away_categories_won += 1,
            None => {}
        }
    }
    score
}

/// Score two teams' week aggregates against each other.
pub fn score_matchup(home: &TeamWeek, away: &TeamWeek) -> MatchupScore {
    score_stats(&home.stats, &away.stats)
}

/// Record a score on the matchup and mark it complete.
pub fn apply_to_matchup(matchup: &mut Matchup, score: MatchupScore) {
    matchup.home_score = Some(score.home_categories_won);
    matchup.away_score = Some(score.away_categories_won);
    matchup.tie = Some(false);
    matchup.is_complete = true;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
