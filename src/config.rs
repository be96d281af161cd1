//src/config.rs

use std::path::PathBuf;

use crate::error::{LcaError, Result};
use crate::rank::RankPrefixes;

/// Columns of a BLAST/DIAMOND tabular hit file as produced upstream.
pub const DEFAULT_HIT_COLUMNS: &str =
    "query_ID seq_title seq_ID taxonID evalue bitscore pident length";

/// Splits a space-delimited list of column names.
pub fn parse_column_names(names: &str) -> Vec<String> {
    names.split_whitespace().map(str::to_string).collect()
}

fn column_index(column_names: &[String], column: &str) -> Result<usize> {
    column_names
        .iter()
        .position(|c| c == column)
        .ok_or_else(|| LcaError::MissingColumn {
            column: column.to_string(),
        })
}

/// Settings for per-query LCA assignment.
#[derive(Debug, Clone)]
pub struct LcaConfig {
    /// Column names of the hit table. `None` means the table's first line is a header.
    pub column_names: Option<Vec<String>>,
    pub query_column: String,
    pub taxon_column: String,
    pub score_column: String,
    /// Keep hits scoring within this percentage of the query's best hit.
    pub within_percent_of_top: f64,
    pub blacklist: Option<PathBuf>,
    pub rank_prefixes: RankPrefixes,
}

impl Default for LcaConfig {
    fn default() -> Self {
        Self {
            column_names: Some(parse_column_names(DEFAULT_HIT_COLUMNS)),
            query_column: "query_ID".to_string(),
            taxon_column: "taxonID".to_string(),
            score_column: "bitscore".to_string(),
            within_percent_of_top: 1.0,
            blacklist: None,
            rank_prefixes: RankPrefixes::default(),
        }
    }
}

/// Positions of the columns the LCA stage reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitColumns {
    pub query: usize,
    pub taxon: usize,
    pub score: usize,
}

impl LcaConfig {
    pub fn hit_columns(&self, column_names: &[String]) -> Result<HitColumns> {
        Ok(HitColumns {
            query: column_index(column_names, &self.query_column)?,
            taxon: column_index(column_names, &self.taxon_column)?,
            score: column_index(column_names, &self.score_column)?,
        })
    }
}

/// Settings for clade count aggregation over an LCA table.
#[derive(Debug, Clone)]
pub struct CountConfig {
    pub query_column: String,
    pub lca_column: String,
    /// Two-column `query_id<TAB>count` file. Without it every query counts once.
    pub counts: Option<PathBuf>,
    pub rank_prefixes: RankPrefixes,
}

impl Default for CountConfig {
    fn default() -> Self {
        Self {
            query_column: "query_ID".to_string(),
            lca_column: "LCA_taxonID".to_string(),
            counts: None,
            rank_prefixes: RankPrefixes::default(),
        }
    }
}

/// Positions of the columns the counting stage reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcaColumns {
    pub query: usize,
    pub lca: usize,
}

impl CountConfig {
    pub fn lca_columns(&self, column_names: &[String]) -> Result<LcaColumns> {
        Ok(LcaColumns {
            query: column_index(column_names, &self.query_column)?,
            lca: column_index(column_names, &self.lca_column)?,
        })
    }
}
