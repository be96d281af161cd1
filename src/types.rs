//src/types.rs

use std::fmt;

use crate::rank::Rank;

/// NCBI taxon identifier. `0` means unknown/unresolved.
pub type TaxonId = u32;

pub const UNKNOWN_TAXID: TaxonId = 0;

/// Id of the synthetic root every lineage hangs from (NCBI's `root`).
pub const ROOT_TAXID: TaxonId = 1;

/// Ordered taxon ids from the root down to a taxon.
pub type Lineage = Vec<TaxonId>;

/// One candidate assignment for a query, i.e. one row of the hit table.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub query_id: String,
    /// `None` when the taxon column is empty, `N/A` or not a number.
    pub taxon: Option<TaxonId>,
    pub score: f64,
    /// Every field of the original row, query id included, in column order.
    pub fields: Vec<String>,
}

/// One slot per configured rank: `Some("g__Escherichia")` or `None` when the
/// lineage has no taxon at that rank.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CanonicalLineage(pub Vec<Option<String>>);

impl CanonicalLineage {
    /// Column tokens, with `0` standing in for a missing rank.
    pub fn tokens(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(|slot| slot.as_deref().unwrap_or("0"))
    }

    pub fn slots(&self) -> &[Option<String>] {
        &self.0
    }
}

impl fmt::Display for CanonicalLineage {
    /// Array-like rendering used in the aggregated count table,
    /// e.g. `['sk__Bacteria', 'p__Proteobacteria', 0]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, slot) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match slot {
                Some(token) => write!(f, "'{}'", token)?,
                None => f.write_str("0")?,
            }
        }
        f.write_str("]")
    }
}

/// The LCA assignment of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub query_id: String,
    /// Non-query columns of the surviving hits, each comma-joined.
    pub aggregated_fields: Vec<String>,
    pub lca_taxon: TaxonId,
    pub lineage: CanonicalLineage,
}

/// A leaf-level observation to be credited to a taxon and all its ancestors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountEntry {
    pub taxon: TaxonId,
    pub count: f64,
}

/// One row of the aggregated count table.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRow {
    pub taxon: TaxonId,
    pub lineage: CanonicalLineage,
    /// First superkingdom token of `lineage`, or `UNKNOWN`.
    pub superkingdom: String,
    /// Display name carrying its rank prefix, e.g. `g__Escherichia`.
    pub name: String,
    pub rank: Rank,
    pub count: f64,
}
