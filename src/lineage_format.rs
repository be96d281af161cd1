//src/lineage_format.rs

use crate::error::Result;
use crate::lineage_tree::SharedLineageTree;
use crate::rank::RankPrefixes;
use crate::taxdb::TaxonomyProvider;
use crate::types::{CanonicalLineage, TaxonId};

/// Turns a taxon into one rank-prefixed token per configured rank.
#[derive(Debug, Clone, Default)]
pub struct LineageFormatter {
    prefixes: RankPrefixes,
}

impl LineageFormatter {
    pub fn new(prefixes: RankPrefixes) -> Self {
        Self { prefixes }
    }

    pub fn prefixes(&self) -> &RankPrefixes {
        &self.prefixes
    }

    /// For each configured rank, the first taxon of that rank on the
    /// tree's root-to-`taxon` path, as `prefix + name`; `None` when the
    /// path has no taxon at that rank.
    ///
    /// The lineage is made present in the tree first, so ranks and names
    /// come from the stored (corrected) chain rather than from the provider.
    pub fn canonical_lineage<P: TaxonomyProvider + ?Sized>(
        &self,
        taxon: TaxonId,
        tree: &SharedLineageTree,
        provider: &P,
    ) -> Result<CanonicalLineage> {
        let path = tree.ensure_lineage(taxon, provider)?;
        let nodes = tree.nodes_along(&path);

        let slots = self
            .prefixes
            .iter()
            .map(|(rank, prefix)| {
                nodes
                    .iter()
                    .find(|node| &node.rank == rank)
                    .map(|node| format!("{}{}", prefix, node.display_name()))
            })
            .collect();

        Ok(CanonicalLineage(slots))
    }
}
