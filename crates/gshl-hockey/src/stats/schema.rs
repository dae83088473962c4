// Fixed numeric stat schema and the single extraction function that maps a
// raw record onto it.

use gshl_core::Record;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Stat fields
// ---------------------------------------------------------------------------

/// Every numeric column the engine reads from a stat record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum StatField {
    GP,
    MG,
    IR,
    IRplus,
    GS,
    G,
    A,
    P,
    PM,
    PIM,
    PPP,
    SOG,
    HIT,
    BLK,
    W,
    GA,
    GAA,
    SV,
    SA,
    SVP,
    SO,
    TOI,
}

pub const STAT_FIELD_COUNT: usize = 22;

impl StatField {
    pub const ALL: [StatField; STAT_FIELD_COUNT] = [
        StatField::GP,
        StatField::MG,
        StatField::IR,
        StatField::IRplus,
        StatField::GS,
        StatField::G,
        StatField::A,
        StatField::P,
        StatField::PM,
        StatField::PIM,
        StatField::PPP,
        StatField::SOG,
        StatField::HIT,
        StatField::BLK,
        StatField::W,
        StatField::GA,
        StatField::GAA,
        StatField::SV,
        StatField::SA,
        StatField::SVP,
        StatField::SO,
        StatField::TOI,
    ];

    /// Column name in raw and aggregate records.
    pub fn name(self) -> &'static str {
        match self {
            StatField::GP => "GP",
            StatField::MG => "MG",
            StatField::IR => "IR",
            StatField::IRplus => "IRplus",
            StatField::GS => "GS",
            StatField::G => "G",
            StatField::A => "A",
            StatField::P => "P",
            StatField::PM => "PM",
            StatField::PIM => "PIM",
            StatField::PPP => "PPP",
            StatField::SOG => "SOG",
            StatField::HIT => "HIT",
            StatField::BLK => "BLK",
            StatField::W => "W",
            StatField::GA => "GA",
            StatField::GAA => "GAA",
            StatField::SV => "SV",
            StatField::SA => "SA",
            StatField::SVP => "SVP",
            StatField::SO => "SO",
            StatField::TOI => "TOI",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Participation counters: summed for every active day, whether or not
    /// the player was in the fantasy lineup.
    pub fn is_participation(self) -> bool {
        matches!(
            self,
            StatField::GP | StatField::MG | StatField::IR | StatField::IRplus | StatField::GS
        )
    }

    /// Rate stats are recomputed from summed components, never summed.
    pub fn is_rate(self) -> bool {
        matches!(self, StatField::GAA | StatField::SVP)
    }
}

// ---------------------------------------------------------------------------
// Ranking categories
// ---------------------------------------------------------------------------

/// Categories tracked by the ranking model. Serialized by abbreviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum Category {
    G,
    A,
    P,
    PPP,
    SOG,
    HIT,
    BLK,
    W,
    GA,
    GAA,
    SV,
    SVP,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::G,
        Category::A,
        Category::P,
        Category::PPP,
        Category::SOG,
        Category::HIT,
        Category::BLK,
        Category::W,
        Category::GA,
        Category::GAA,
        Category::SV,
        Category::SVP,
    ];

    pub fn stat_field(self) -> StatField {
        match self {
            Category::G => StatField::G,
            Category::A => StatField::A,
            Category::P => StatField::P,
            Category::PPP => StatField::PPP,
            Category::SOG => StatField::SOG,
            Category::HIT => StatField::HIT,
            Category::BLK => StatField::BLK,
            Category::W => StatField::W,
            Category::GA => StatField::GA,
            Category::GAA => StatField::GAA,
            Category::SV => StatField::SV,
            Category::SVP => StatField::SVP,
        }
    }

    pub fn name(self) -> &'static str {
        self.stat_field().name()
    }

    /// Goals-against style categories where a smaller number is better.
    pub fn lower_is_better(self) -> bool {
        matches!(self, Category::GA | Category::GAA)
    }

    /// +1.0 for higher-is-better, -1.0 for lower-is-better.
    pub fn sign(self) -> f64 {
        if self.lower_is_better() {
            -1.0
        } else {
            1.0
        }
    }
}

// ---------------------------------------------------------------------------
// Parsed stats
// ---------------------------------------------------------------------------

/// Strict numeric view of a stat record. Missing values are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParsedStats([f64; STAT_FIELD_COUNT]);

impl ParsedStats {
    pub fn get(&self, field: StatField) -> f64 {
        self.0[field.index()]
    }

    pub fn set(&mut self, field: StatField, value: f64) {
        self.0[field.index()] = value;
    }

    /// Builder-style setter.
    pub fn with(mut self, field: StatField, value: f64) -> Self {
        self.set(field, value);
        self
    }

    pub fn add(&mut self, field: StatField, value: f64) {
        self.0[field.index()] += value;
    }

    pub fn category(&self, category: Category) -> f64 {
        self.get(category.stat_field())
    }

    /// All values in `StatField::ALL` order.
    pub fn values(&self) -> &[f64; STAT_FIELD_COUNT] {
        &self.0
    }

    /// Recompute GAA and SVP from their components. `starts` is the GAA
    /// denominator: lineup starts for a player, goalie starts for a team.
    pub fn recompute_rates(&mut self, starts: f64) {
        let gaa = if starts > 0.0 {
            self.get(StatField::GA) / starts
        } else {
            0.0
        };
        let sa = self.get(StatField::SA);
        let svp = if sa > 0.0 {
            self.get(StatField::SV) / sa
        } else {
            0.0
        };
        self.set(StatField::GAA, gaa);
        self.set(StatField::SVP, svp);
    }

    /// Write every field onto `record` under its column name.
    pub fn write_into(&self, record: &mut Record) {
        for field in StatField::ALL {
            record.set(field.name(), self.get(field));
        }
    }
}

/// Map a raw record onto the numeric schema. Missing, empty, non-numeric
/// and non-finite values all read as 0.
pub fn parse_stats(record: &Record) -> ParsedStats {
    let mut stats = ParsedStats::default();
    for field in StatField::ALL {
        stats.set(field, record.get_f64(field.name()).unwrap_or(0.0));
    }
    stats
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
