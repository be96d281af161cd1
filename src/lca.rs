//src/lca.rs

use crate::error::{LcaError, Result};
use crate::lineage_tree::SharedLineageTree;
use crate::taxdb::TaxonomyProvider;
use crate::types::{TaxonId, ROOT_TAXID};

/// Length of the shared prefix of two root-first paths.
#[inline]
fn common_prefix_len(a: &[TaxonId], b: &[TaxonId]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Resolves the lowest common ancestor of a set of taxa over the shared
/// lineage tree, fetching missing lineages from the provider.
pub struct LcaResolver<'a, P: TaxonomyProvider + ?Sized> {
    tree: &'a SharedLineageTree,
    provider: &'a P,
}

impl<'a, P: TaxonomyProvider + ?Sized> LcaResolver<'a, P> {
    pub fn new(tree: &'a SharedLineageTree, provider: &'a P) -> Self {
        Self { tree, provider }
    }

    /// LCA of `taxa`. A single taxon is returned as is without touching the tree.
    ///
    /// The running ancestor path is folded pairwise against each taxon's
    /// path, keeping only the shared prefix, so memory stays bounded by the
    /// depth of the taxonomy whatever the number of taxa.
    pub fn resolve(&self, taxa: &[TaxonId]) -> Result<TaxonId> {
        match taxa {
            [] => Err(LcaError::EmptyTaxonSet),
            [only] => Ok(*only),
            [first, rest @ ..] => {
                let mut current = self.tree.ensure_lineage(*first, self.provider)?;
                for &taxon in rest {
                    let path = self.tree.ensure_lineage(taxon, self.provider)?;
                    let shared = common_prefix_len(&current, &path);
                    current.truncate(shared);
                }
                // every path starts at the synthetic root
                Ok(current.last().copied().unwrap_or(ROOT_TAXID))
            }
        }
    }
}
