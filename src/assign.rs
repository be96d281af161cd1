//src/assign.rs

use rayon::prelude::*;

use crate::error::Result;
use crate::hit_filter::HitFilter;
use crate::hit_table::QueryGroup;
use crate::lca::LcaResolver;
use crate::lineage_format::LineageFormatter;
use crate::lineage_tree::SharedLineageTree;
use crate::taxdb::TaxonomyProvider;
use crate::types::{Hit, QueryResult, TaxonId};

/// Each column except `query_column`, its values across `hits` comma-joined
/// with spaces turned into underscores.
pub fn aggregate_fields(hits: &[Hit], query_column: usize) -> Vec<String> {
    let width = hits.first().map(|h| h.fields.len()).unwrap_or(0);
    (0..width)
        .filter(|&col| col != query_column)
        .map(|col| {
            hits.iter()
                .map(|h| h.fields.get(col).map(String::as_str).unwrap_or(""))
                .collect::<Vec<_>>()
                .join(",")
                .replace(' ', "_")
        })
        .collect()
}

/// Everything needed to turn a query's hits into its LCA assignment.
pub struct QueryAssigner<'a, P: TaxonomyProvider + ?Sized> {
    pub filter: &'a HitFilter,
    pub tree: &'a SharedLineageTree,
    pub provider: &'a P,
    pub formatter: &'a LineageFormatter,
    pub query_column: usize,
}

/// Outcome of a whole run over grouped hits.
#[derive(Debug, Default)]
pub struct Assignments {
    pub results: Vec<QueryResult>,
    /// Queries none of whose hits survived filtering.
    pub skipped: Vec<String>,
}

impl<'a, P: TaxonomyProvider + ?Sized> QueryAssigner<'a, P> {
    /// LCA assignment for one query, or `None` when no hit survives filtering.
    pub fn assign(&self, group: &QueryGroup) -> Result<Option<QueryResult>> {
        let survivors = self.filter.filter(&group.hits, self.provider);
        if survivors.is_empty() {
            log::warn!(
                "None of the lines from query_ID {} made it through filtration",
                group.query_id
            );
            return Ok(None);
        }

        // validity filtering leaves only resolvable taxa
        let taxa: Vec<TaxonId> = survivors.iter().filter_map(|h| h.taxon).collect();
        let lca = LcaResolver::new(self.tree, self.provider).resolve(&taxa)?;

        Ok(Some(QueryResult {
            query_id: group.query_id.clone(),
            aggregated_fields: aggregate_fields(&survivors, self.query_column),
            lca_taxon: lca,
            lineage: self
                .formatter
                .canonical_lineage(lca, self.tree, self.provider)?,
        }))
    }

    /// Assigns every group in parallel; results keep the order of `groups`.
    pub fn assign_all(&self, groups: &[QueryGroup]) -> Result<Assignments> {
        let outcomes: Vec<(String, Option<QueryResult>)> = groups
            .par_iter()
            .map(|group| -> Result<(String, Option<QueryResult>)> {
                Ok((group.query_id.clone(), self.assign(group)?))
            })
            .collect::<Result<_>>()?;

        let mut assignments = Assignments::default();
        for (query_id, outcome) in outcomes {
            match outcome {
                Some(result) => assignments.results.push(result),
                None => assignments.skipped.push(query_id),
            }
        }
        log::info!(
            "Assigned {} queries ({} without surviving hits); lineage tree holds {} taxa",
            assignments.results.len(),
            assignments.skipped.len(),
            self.tree.len()
        );
        Ok(assignments)
    }
}
