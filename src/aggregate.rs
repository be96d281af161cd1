//src/aggregate.rs

use ahash::AHashMap;
use rayon::prelude::*;

use crate::error::Result;
use crate::lineage_format::LineageFormatter;
use crate::lineage_tree::SharedLineageTree;
use crate::taxdb::TaxonomyProvider;
use crate::types::{AggregatedRow, CountEntry, TaxonId, UNKNOWN_TAXID};

/// taxon -> count of the taxon and everything below it
pub type CladeCounts = AHashMap<TaxonId, f64>;

fn merge_clade_counts(mut a: CladeCounts, b: CladeCounts) -> CladeCounts {
    a.reserve(b.len());
    for (taxon, count) in b {
        *a.entry(taxon).or_insert(0.0) += count;
    }
    a
}

/// Credits counts to every ancestor of the observed taxa and reports one row
/// per taxon at a canonical rank.
pub struct CountAggregator<'a, P: TaxonomyProvider + ?Sized> {
    tree: &'a SharedLineageTree,
    provider: &'a P,
    formatter: LineageFormatter,
}

impl<'a, P: TaxonomyProvider + ?Sized> CountAggregator<'a, P> {
    pub fn new(tree: &'a SharedLineageTree, provider: &'a P, formatter: LineageFormatter) -> Self {
        Self {
            tree,
            provider,
            formatter,
        }
    }

    /// Add each entry's count to every taxon of its full lineage.
    ///
    /// Entries are folded in parallel into per-thread maps which are merged
    /// afterwards, so no total is ever incremented from two threads.
    pub fn clade_counts(&self, entries: &[CountEntry]) -> Result<CladeCounts> {
        entries
            .par_iter()
            .filter(|entry| entry.taxon != UNKNOWN_TAXID)
            .try_fold(CladeCounts::default, |mut acc, entry| -> Result<CladeCounts> {
                let lineage = self.tree.ensure_lineage(entry.taxon, self.provider)?;
                for taxon in lineage {
                    *acc.entry(taxon).or_insert(0.0) += entry.count;
                }
                Ok(acc)
            })
            .try_reduce(CladeCounts::default, |a, b| Ok(merge_clade_counts(a, b)))
    }

    /// One row per taxon with a nonzero total whose own rank is canonical,
    /// sorted by taxon id. Taxa without a name are left out.
    ///
    /// Rank, name and lineage are read from the tree, which already holds
    /// every taxon of `totals`.
    pub fn rows(&self, totals: &CladeCounts) -> Result<Vec<AggregatedRow>> {
        let mut taxa: Vec<TaxonId> = totals
            .iter()
            .filter(|(_, count)| **count != 0.0)
            .map(|(&taxon, _)| taxon)
            .collect();
        taxa.sort_unstable();

        let prefixes = self.formatter.prefixes();
        let sk_prefix = prefixes.superkingdom_prefix();

        let rows: Vec<Option<AggregatedRow>> = taxa
            .par_iter()
            .map(|&taxon| -> Result<Option<AggregatedRow>> {
                let Some(node) = self.tree.node(taxon) else {
                    return Ok(None);
                };
                let Some(prefix) = prefixes.prefix(&node.rank) else {
                    return Ok(None);
                };
                if node.name.is_none() {
                    log::warn!("Taxon {} has no name; leaving it out of the counts", taxon);
                    return Ok(None);
                }

                let lineage = self
                    .formatter
                    .canonical_lineage(taxon, self.tree, self.provider)?;
                let superkingdom = sk_prefix
                    .and_then(|sk| {
                        lineage
                            .slots()
                            .iter()
                            .flatten()
                            .find(|token| token.starts_with(sk))
                            .cloned()
                    })
                    .unwrap_or_else(|| "UNKNOWN".to_string());

                Ok(Some(AggregatedRow {
                    taxon,
                    lineage,
                    superkingdom,
                    name: format!("{}{}", prefix, node.display_name()),
                    rank: node.rank,
                    count: totals[&taxon],
                }))
            })
            .collect::<Result<_>>()?;

        Ok(rows.into_iter().flatten().collect())
    }

    pub fn aggregate(&self, entries: &[CountEntry]) -> Result<Vec<AggregatedRow>> {
        let totals = self.clade_counts(entries)?;
        log::info!(
            "Distributed {} count entries over {} taxa",
            entries.len(),
            totals.len()
        );
        self.rows(&totals)
    }
}
