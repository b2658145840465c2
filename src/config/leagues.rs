use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Competitive tier a tournament belongs to, from the top tier down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum League {
    Legend,
    Champion,
    Platinum,
    Gold,
    Silver,
    Copper,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown league: {0:?}")]
pub struct UnknownLeague(pub String);

impl League {
    pub const ALL: [League; 6] = [
        League::Legend,
        League::Champion,
        League::Platinum,
        League::Gold,
        League::Silver,
        League::Copper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            League::Legend => "Legend",
            League::Champion => "Champion",
            League::Platinum => "Platinum",
            League::Gold => "Gold",
            League::Silver => "Silver",
            League::Copper => "Copper",
        }
    }

    /// Name of the directory holding this league's live snapshots
    pub fn live_dir_name(&self) -> String {
        format!("{}_live", self.as_str())
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for League {
    type Err = UnknownLeague;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legend" | "legends" => Ok(League::Legend),
            "champion" | "champions" => Ok(League::Champion),
            "platinum" => Ok(League::Platinum),
            "gold" => Ok(League::Gold),
            "silver" => Ok(League::Silver),
            "copper" => Ok(League::Copper),
            _ => Err(UnknownLeague(s.to_string())),
        }
    }
}

impl ToSql for League {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for League {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Queue priority per league. Lower rank is processed first; leagues
/// missing from the table sort after every configured one.
#[derive(Debug, Clone)]
pub struct LeaguePriorities {
    ranks: HashMap<League, u32>,
}

impl LeaguePriorities {
    pub fn empty() -> Self {
        Self { ranks: HashMap::new() }
    }

    pub fn with_rank(mut self, league: League, rank: u32) -> Self {
        self.ranks.insert(league, rank);
        self
    }

    pub fn rank(&self, league: League) -> u32 {
        self.ranks.get(&league).copied().unwrap_or(u32::MAX)
    }

    /// Leagues in processing order
    pub fn ordered(&self) -> Vec<League> {
        let mut leagues = League::ALL.to_vec();
        leagues.sort_by_key(|league| (self.rank(*league), *league));
        leagues
    }
}

impl Default for LeaguePriorities {
    fn default() -> Self {
        League::ALL
            .iter()
            .zip(1..)
            .fold(Self::empty(), |table, (league, rank)| table.with_rank(*league, rank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plural_and_mixed_case_names() {
        assert_eq!("Champions".parse::<League>().unwrap(), League::Champion);
        assert_eq!(" legend ".parse::<League>().unwrap(), League::Legend);
        assert!("Diamond".parse::<League>().is_err());
    }

    #[test]
    fn default_priorities_follow_tier_order() {
        let priorities = LeaguePriorities::default();
        assert_eq!(priorities.rank(League::Legend), 1);
        assert_eq!(priorities.rank(League::Copper), 6);
        assert_eq!(priorities.ordered(), League::ALL.to_vec());
    }

    #[test]
    fn unconfigured_leagues_sort_last() {
        let priorities = LeaguePriorities::empty()
            .with_rank(League::Gold, 1)
            .with_rank(League::Legend, 2);
        let ordered = priorities.ordered();
        assert_eq!(&ordered[..2], &[League::Gold, League::Legend]);
        assert_eq!(priorities.rank(League::Copper), u32::MAX);
    }
}
