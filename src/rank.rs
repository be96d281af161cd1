//src/rank.rs

use std::fmt;
use std::str::FromStr;

/// Taxonomic rank as reported by the taxonomy.
///
/// The named variants are the ranks that can appear in a canonical lineage.
/// Anything else the taxonomy reports (e.g. `subfamily`, `clade`) is kept
/// verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Rank {
    Superkingdom,
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
    Strain,
    NoRank,
    Other(String),
    Unknown,
}

impl Rank {
    pub fn as_str(&self) -> &str {
        match self {
            Rank::Superkingdom => "superkingdom",
            Rank::Kingdom => "kingdom",
            Rank::Phylum => "phylum",
            Rank::Class => "class",
            Rank::Order => "order",
            Rank::Family => "family",
            Rank::Genus => "genus",
            Rank::Species => "species",
            Rank::Strain => "strain",
            Rank::NoRank => "no rank",
            Rank::Other(s) => s,
            Rank::Unknown => "UNKNOWN",
        }
    }
}

impl FromStr for Rank {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rank = match s.trim() {
            // newer NCBI dumps call the top rank "domain"
            "superkingdom" | "domain" => Rank::Superkingdom,
            "kingdom" => Rank::Kingdom,
            "phylum" => Rank::Phylum,
            "class" => Rank::Class,
            "order" => Rank::Order,
            "family" => Rank::Family,
            "genus" => Rank::Genus,
            "species" => Rank::Species,
            "strain" => Rank::Strain,
            "no rank" => Rank::NoRank,
            "" | "UNKNOWN" => Rank::Unknown,
            other => Rank::Other(other.to_string()),
        };
        Ok(rank)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered mapping `Rank -> prefix` that drives lineage formatting.
///
/// The order of the entries is the order of the lineage slots and of the
/// rank columns in the per-query output.
#[derive(Debug, Clone, PartialEq)]
pub struct RankPrefixes {
    entries: Vec<(Rank, String)>,
}

impl RankPrefixes {
    pub fn new(entries: Vec<(Rank, String)>) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rank, &str)> {
        self.entries.iter().map(|(r, p)| (r, p.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn prefix(&self, rank: &Rank) -> Option<&str> {
        self.entries
            .iter()
            .find(|(r, _)| r == rank)
            .map(|(_, p)| p.as_str())
    }

    /// Whether `rank` has a lineage slot.
    pub fn is_canonical(&self, rank: &Rank) -> bool {
        self.prefix(rank).is_some()
    }

    /// Prefix that marks the superkingdom token, if superkingdom is configured.
    pub fn superkingdom_prefix(&self) -> Option<&str> {
        self.prefix(&Rank::Superkingdom)
    }

    pub fn rank_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(r, _)| r.as_str())
    }
}

impl Default for RankPrefixes {
    /// Root-first: superkingdom down to strain.
    fn default() -> Self {
        Self::new(vec![
            (Rank::Superkingdom, "sk__".to_string()),
            (Rank::Kingdom, "k__".to_string()),
            (Rank::Phylum, "p__".to_string()),
            (Rank::Class, "c__".to_string()),
            (Rank::Order, "o__".to_string()),
            (Rank::Family, "f__".to_string()),
            (Rank::Genus, "g__".to_string()),
            (Rank::Species, "s__".to_string()),
            (Rank::Strain, "st__".to_string()),
        ])
    }
}
