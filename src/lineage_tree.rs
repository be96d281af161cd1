//src/lineage_tree.rs

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::error::{LcaError, Result};
use crate::rank::Rank;
use crate::taxdb::TaxonomyProvider;
use crate::types::{Lineage, TaxonId, ROOT_TAXID};

/// Arena record for one taxon. The parent is an index into the same table.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonNode {
    /// `None` only for the synthetic root.
    pub parent: Option<TaxonId>,
    pub rank: Rank,
    pub name: Option<String>,
}

impl TaxonNode {
    /// Name with spaces turned into underscores, `UNKNOWN` if the taxonomy had none.
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .unwrap_or("UNKNOWN")
            .replace(' ', "_")
    }
}

/// Subtree of the taxonomy holding only the taxa seen so far.
///
/// Nodes are only ever added. Every chain hangs from the synthetic root
/// (`ROOT_TAXID`), so any two nodes have a common ancestor.
#[derive(Debug)]
pub struct LineageTree {
    nodes: AHashMap<TaxonId, TaxonNode>,
    drift_corrections: usize,
}

impl Default for LineageTree {
    fn default() -> Self {
        Self::new()
    }
}

impl LineageTree {
    pub fn new() -> Self {
        let mut nodes = AHashMap::new();
        nodes.insert(
            ROOT_TAXID,
            TaxonNode {
                parent: None,
                rank: Rank::NoRank,
                name: Some("root".to_string()),
            },
        );
        Self {
            nodes,
            drift_corrections: 0,
        }
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // the root is always present
        false
    }

    pub fn contains(&self, taxon: TaxonId) -> bool {
        self.nodes.contains_key(&taxon)
    }

    pub fn node(&self, taxon: TaxonId) -> Option<&TaxonNode> {
        self.nodes.get(&taxon)
    }

    fn missing_from(&self, lineage: &[TaxonId]) -> Vec<TaxonId> {
        lineage
            .iter()
            .copied()
            .filter(|&t| !self.contains(t))
            .collect()
    }

    /// How many fetched chains ended in a taxon other than the one requested.
    pub fn drift_corrections(&self) -> usize {
        self.drift_corrections
    }

    /// Make sure `taxon` and its ancestors are in the tree and return its
    /// root-to-taxon path.
    pub fn ensure_lineage<P: TaxonomyProvider + ?Sized>(
        &mut self,
        taxon: TaxonId,
        provider: &P,
    ) -> Result<Lineage> {
        if !self.contains(taxon) {
            let chain = fetch_chain(taxon, provider);
            if chain.corrected {
                self.drift_corrections += 1;
            }
            let missing = self.missing_from(&chain.lineage);
            let records = describe(&missing, provider);
            self.insert_chain(&chain.lineage, records);
        }
        self.ancestor_path(taxon)
    }

    /// Insert every taxon of `lineage` that is not present yet, linked to its
    /// predecessor (the first one to the root). Present taxa are left untouched.
    fn insert_chain(&mut self, lineage: &[TaxonId], records: Vec<(TaxonId, Rank, Option<String>)>) {
        let mut meta: AHashMap<TaxonId, (Rank, Option<String>)> = records
            .into_iter()
            .map(|(t, rank, name)| (t, (rank, name)))
            .collect();

        for (i, &taxon) in lineage.iter().enumerate() {
            if self.nodes.contains_key(&taxon) {
                continue;
            }
            let parent = if i == 0 { ROOT_TAXID } else { lineage[i - 1] };
            let (rank, name) = meta.remove(&taxon).unwrap_or((Rank::Unknown, None));
            self.nodes.insert(
                taxon,
                TaxonNode {
                    parent: Some(parent),
                    rank,
                    name,
                },
            );
        }
    }

    /// Path from the root down to `taxon`, rebuilt by following parent links.
    pub fn ancestor_path(&self, taxon: TaxonId) -> Result<Lineage> {
        let mut path = Vec::with_capacity(32);
        let mut current = taxon;
        loop {
            let node = self
                .nodes
                .get(&current)
                .ok_or(LcaError::UnknownNode { taxon: current })?;
            path.push(current);
            match node.parent {
                Some(p) => current = p,
                None => break,
            }
            // a chain can never be longer than the table
            if path.len() > self.nodes.len() {
                break;
            }
        }
        path.reverse();
        Ok(path)
    }
}

/// Lineage fetched from the provider, already corrected to end in the requested taxon.
struct FetchedChain {
    lineage: Lineage,
    corrected: bool,
}

fn fetch_chain<P: TaxonomyProvider + ?Sized>(taxon: TaxonId, provider: &P) -> FetchedChain {
    let mut lineage = match provider.lineage(taxon) {
        Some(lineage) if !lineage.is_empty() => lineage,
        _ => {
            log::warn!("Cannot find taxonID {}; using a single-taxon lineage", taxon);
            vec![taxon]
        }
    };

    let mut corrected = false;
    if let Some(last) = lineage.last_mut() {
        if *last != taxon {
            log::warn!(
                "Terminal taxonID in the lineage of {} is {} (reference database drift?); overwriting to {}",
                taxon,
                last,
                taxon
            );
            *last = taxon;
            corrected = true;
        }
    }

    FetchedChain { lineage, corrected }
}

/// Rank and name of each taxon in `missing`, fetched from the provider.
fn describe<P: TaxonomyProvider + ?Sized>(
    missing: &[TaxonId],
    provider: &P,
) -> Vec<(TaxonId, Rank, Option<String>)> {
    missing
        .iter()
        .map(|&t| {
            (
                t,
                provider.rank(t).unwrap_or(Rank::Unknown),
                provider.name(t),
            )
        })
        .collect()
}

/// `LineageTree` shared between worker threads.
///
/// Taxa already in the tree are served under the read lock. For unseen taxa
/// the provider is queried without holding any lock and the insert is done
/// under the write lock; since insertion is idempotent two workers racing
/// on the same ancestor both succeed.
#[derive(Debug, Default)]
pub struct SharedLineageTree {
    inner: RwLock<LineageTree>,
}

impl SharedLineageTree {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LineageTree::new()),
        }
    }

    pub fn ensure_lineage<P: TaxonomyProvider + ?Sized>(
        &self,
        taxon: TaxonId,
        provider: &P,
    ) -> Result<Lineage> {
        {
            let tree = self.inner.read();
            if tree.contains(taxon) {
                return tree.ancestor_path(taxon);
            }
        }

        let chain = fetch_chain(taxon, provider);
        let missing = self.inner.read().missing_from(&chain.lineage);
        // provider lookups happen with no lock held
        let records = describe(&missing, provider);

        let mut tree = self.inner.write();
        if !tree.contains(taxon) {
            if chain.corrected {
                tree.drift_corrections += 1;
            }
            tree.insert_chain(&chain.lineage, records);
        }
        tree.ancestor_path(taxon)
    }

    pub fn ancestor_path(&self, taxon: TaxonId) -> Result<Lineage> {
        self.inner.read().ancestor_path(taxon)
    }

    pub fn node(&self, taxon: TaxonId) -> Option<TaxonNode> {
        self.inner.read().node(taxon).cloned()
    }

    /// Nodes of `path` in order, read under a single lock. Taxa not in the tree are skipped.
    pub fn nodes_along(&self, path: &[TaxonId]) -> Vec<TaxonNode> {
        let tree = self.inner.read();
        path.iter().filter_map(|&t| tree.node(t).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn drift_corrections(&self) -> usize {
        self.inner.read().drift_corrections()
    }

    pub fn into_inner(self) -> LineageTree {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxdb::tests_support::{sample_taxonomy, DriftingProvider};
    use rayon::prelude::*;

    #[test]
    fn ensure_lineage_inserts_whole_chain() {
        let db = sample_taxonomy();
        let mut tree = LineageTree::new();
        let lineage = tree.ensure_lineage(9606, &db).unwrap();

        assert_eq!(
            lineage,
            vec![1, 131567, 2759, 33208, 7711, 40674, 314146, 9443, 9604, 9605, 9606]
        );
        assert_eq!(tree.len(), 11);
        let genus = tree.node(9605).unwrap();
        assert_eq!(genus.parent, Some(9604));
        assert_eq!(genus.rank, Rank::Genus);
        assert_eq!(genus.name.as_deref(), Some("Homo"));
        assert_eq!(tree.node(9606).unwrap().display_name(), "Homo_sapiens");
    }

    #[test]
    fn ensure_lineage_is_idempotent() {
        let db = sample_taxonomy();
        let mut tree = LineageTree::new();
        tree.ensure_lineage(562, &db).unwrap();
        let after_first = tree.len();
        tree.ensure_lineage(562, &db).unwrap();
        assert_eq!(tree.len(), after_first);

        // a sibling only adds the nodes not shared with 562
        tree.ensure_lineage(622, &db).unwrap();
        assert_eq!(tree.len(), after_first + 2);
    }

    #[test]
    fn unresolvable_taxon_gets_degenerate_lineage() {
        let db = sample_taxonomy();
        let mut tree = LineageTree::new();
        let lineage = tree.ensure_lineage(424242, &db).unwrap();
        assert_eq!(lineage, vec![ROOT_TAXID, 424242]);
        assert_eq!(tree.node(424242).unwrap().rank, Rank::Unknown);
        assert_eq!(tree.node(424242).unwrap().display_name(), "UNKNOWN");
    }

    #[test]
    fn terminal_drift_is_corrected_to_requested_taxon() {
        let provider = DriftingProvider(sample_taxonomy());
        let mut tree = LineageTree::new();
        let lineage = tree.ensure_lineage(562, &provider).unwrap();
        assert_eq!(lineage.last(), Some(&562));
        assert_eq!(tree.node(562).unwrap().parent, Some(561));
        assert!(!tree.contains(12345));
        assert_eq!(tree.drift_corrections(), 1);
    }

    #[test]
    fn ancestor_path_of_missing_taxon_is_an_error() {
        let tree = LineageTree::new();
        assert!(matches!(
            tree.ancestor_path(562),
            Err(LcaError::UnknownNode { taxon: 562 })
        ));
        assert_eq!(tree.ancestor_path(ROOT_TAXID).unwrap(), vec![ROOT_TAXID]);
    }

    #[test]
    fn concurrent_inserts_converge() {
        let db = sample_taxonomy();
        let shared = SharedLineageTree::new();
        let taxa: Vec<TaxonId> = vec![9606, 10090, 562, 622, 83333, 9606, 562];

        let paths: Vec<Lineage> = taxa
            .par_iter()
            .map(|&t| shared.ensure_lineage(t, &db).unwrap())
            .collect();

        let mut sequential = LineageTree::new();
        for (&t, path) in taxa.iter().zip(&paths) {
            assert_eq!(path, &sequential.ensure_lineage(t, &db).unwrap());
        }
        assert_eq!(shared.len(), sequential.len());
    }
}
