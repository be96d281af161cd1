// src/lib.rs
pub mod aggregate;
pub mod assign;
pub mod config;
pub mod count_table;
pub mod error;
pub mod hit_filter;
pub mod hit_table;
pub mod lca;
pub mod lineage_format;
pub mod lineage_tree;
pub mod rank;
pub mod taxdb;
pub mod types;

use std::fmt::Write as FmtWrite;
use std::path::Path;

use crate::aggregate::CountAggregator;
use crate::assign::QueryAssigner;
use crate::config::{CountConfig, LcaConfig};
use crate::count_table::{count_entries, read_counts_file, read_lca_table};
use crate::error::Result;
use crate::hit_filter::{read_blacklist, Blacklist, HitFilter};
use crate::hit_table::{group_hits, read_hit_table};
use crate::lineage_format::LineageFormatter;
use crate::lineage_tree::SharedLineageTree;
use crate::taxdb::TaxonomyProvider;
use crate::types::{AggregatedRow, QueryResult};

/// Per-query LCA assignments of one hit table.
/// Only structured data is kept; the output table is rendered on demand.
pub struct LcaResults {
    /// Output column names: query column, other input columns,
    /// `LCA_taxonID`, then one column per canonical rank.
    pub header: Vec<String>,

    /// One entry per query with at least one surviving hit, in input order.
    pub query_results: Vec<QueryResult>,

    /// Queries none of whose hits survived filtering.
    pub skipped_queries: Vec<String>,

    /// Lineages whose terminal taxon had to be overwritten.
    pub drift_corrections: usize,
}

impl LcaResults {
    /// Render the tab-delimited LCA table, header included.
    pub fn get_lca_table(&self) -> String {
        let mut output = String::new();
        writeln!(output, "{}", self.header.join("\t")).unwrap();

        for result in &self.query_results {
            let mut row = Vec::with_capacity(self.header.len());
            row.push(result.query_id.clone());
            row.extend(result.aggregated_fields.iter().cloned());
            row.push(result.lca_taxon.to_string());
            row.extend(result.lineage.tokens().map(str::to_string));
            writeln!(output, "{}", row.join("\t")).unwrap();
        }
        output
    }
}

/// Assign every query of a hit table to the LCA of its surviving hits.
pub fn assign_lca<P, Q>(hits_path: Q, provider: &P, config: &LcaConfig) -> Result<LcaResults>
where
    P: TaxonomyProvider + ?Sized,
    Q: AsRef<Path>,
{
    // 1. Blacklist and input table
    let blacklist = match &config.blacklist {
        Some(path) => read_blacklist(path)?,
        None => Blacklist::new(),
    };
    let table = read_hit_table(hits_path, config)?;

    // 2. Cut into per-query groups, checking announced sizes
    let groups = group_hits(table.hits)?;

    // 3. Filter, resolve and format each query
    let filter = HitFilter::new(blacklist, config.within_percent_of_top);
    let tree = SharedLineageTree::new();
    let formatter = LineageFormatter::new(config.rank_prefixes.clone());
    let assigner = QueryAssigner {
        filter: &filter,
        tree: &tree,
        provider,
        formatter: &formatter,
        query_column: table.columns.query,
    };
    let assignments = assigner.assign_all(&groups)?;

    // 4. Output layout
    let mut header = Vec::with_capacity(table.column_names.len() + 1 + config.rank_prefixes.len());
    header.push(table.column_names[table.columns.query].clone());
    header.extend(
        table
            .column_names
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != table.columns.query)
            .map(|(_, name)| name.clone()),
    );
    header.push("LCA_taxonID".to_string());
    header.extend(config.rank_prefixes.rank_names().map(str::to_string));

    Ok(LcaResults {
        header,
        query_results: assignments.results,
        skipped_queries: assignments.skipped,
        drift_corrections: tree.drift_corrections(),
    })
}

/// Clade-level counts for every canonical-rank taxon.
pub struct CountResults {
    pub rows: Vec<AggregatedRow>,
}

/// Counts are always printed as floats (`8.0`, `2.5`).
fn format_count(count: f64) -> String {
    if count.fract() == 0.0 {
        format!("{:.1}", count)
    } else {
        count.to_string()
    }
}

impl CountResults {
    /// Render the tab-delimited count table, header included.
    pub fn get_count_table(&self) -> String {
        let mut output = String::new();
        output.push_str("taxonID\tlineage\tsuperkingdom\ttaxon\tlevel\tcount\n");
        for row in &self.rows {
            writeln!(
                output,
                "{}\t{}\t{}\t{}\t{}\t{}",
                row.taxon,
                row.lineage,
                row.superkingdom,
                row.name,
                row.rank,
                format_count(row.count)
            )
            .unwrap();
        }
        output
    }
}

/// Credit the (optionally weighted) queries of an LCA table to their LCA
/// taxa and every ancestor of those taxa.
pub fn count_taxa<P, Q>(lca_table_path: Q, provider: &P, config: &CountConfig) -> Result<CountResults>
where
    P: TaxonomyProvider + ?Sized,
    Q: AsRef<Path>,
{
    let assignments = read_lca_table(lca_table_path, config)?;
    let counts = match &config.counts {
        Some(path) => Some(read_counts_file(path)?),
        None => {
            log::info!("No counts file given; every query counts once");
            None
        }
    };
    let entries = count_entries(&assignments, counts.as_ref())?;

    let tree = SharedLineageTree::new();
    let formatter = LineageFormatter::new(config.rank_prefixes.clone());
    let rows = CountAggregator::new(&tree, provider, formatter).aggregate(&entries)?;

    Ok(CountResults { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LcaError;
    use crate::taxdb::tests_support::sample_taxonomy;
    use std::fs;

    const HITS: &str = "\
Q1\tHomo sapiens chromosome 1\tNC_000001\t9606\t1e-40\t95\t99.1\t150
Q1\tMus musculus chromosome 4\tNC_000070\t10090\t1e-39\t94\t98.0\t150
Q2\tEscherichia coli K-12\tNC_000913\t83333\t1e-60\t300\t100\t150
Q2\tShigella dysenteriae\tNZ_CP006736\t622\t1e-60\t299\t99.3\t150
Q2\tEscherichia coli O157\tNC_002695\t562\t1e-20\t120\t90.0\t150
Q3\tunclassified entry\tXX_1\tN/A\t1e-10\t80\t90.0\t150
Q4\tEscherichia fergusonii\tNZ_CP057657\t564\t1e-50\t210\t99.0\t150
";

    #[test]
    fn lca_table_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let hits_path = dir.path().join("hits.tsv");
        fs::write(&hits_path, HITS).unwrap();

        let config = LcaConfig {
            within_percent_of_top: 2.0,
            ..LcaConfig::default()
        };
        let results = assign_lca(&hits_path, &sample_taxonomy(), &config).unwrap();

        assert_eq!(results.skipped_queries, vec!["Q3".to_string()]);
        let lcas: Vec<(&str, u32)> = results
            .query_results
            .iter()
            .map(|r| (r.query_id.as_str(), r.lca_taxon))
            .collect();
        assert_eq!(lcas, vec![("Q1", 314146), ("Q2", 543), ("Q4", 564)]);

        let table = results.get_lca_table();
        let mut lines = table.lines();
        assert_eq!(
            lines.next().unwrap(),
            "query_ID\tseq_title\tseq_ID\ttaxonID\tevalue\tbitscore\tpident\tlength\t\
             LCA_taxonID\tsuperkingdom\tkingdom\tphylum\tclass\torder\tfamily\tgenus\tspecies\tstrain"
        );
        let q1: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(q1.len(), 18);
        assert_eq!(q1[1], "Homo_sapiens_chromosome_1,Mus_musculus_chromosome_4");
        assert_eq!(q1[3], "9606,10090");
        assert_eq!(q1[8], "314146");
        assert_eq!(&q1[9..13], &["sk__Eukaryota", "k__Metazoa", "p__Chordata", "c__Mammalia"]);
        assert_eq!(&q1[13..], &["0", "0", "0", "0", "0"]);
    }

    #[test]
    fn blacklist_changes_the_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let hits_path = dir.path().join("hits.tsv");
        let blacklist_path = dir.path().join("blacklist.tsv");
        fs::write(&hits_path, HITS).unwrap();
        fs::write(&blacklist_path, "622\tShigella dysenteriae\n").unwrap();

        let config = LcaConfig {
            within_percent_of_top: 2.0,
            blacklist: Some(blacklist_path),
            ..LcaConfig::default()
        };
        let results = assign_lca(&hits_path, &sample_taxonomy(), &config).unwrap();
        let q2 = results
            .query_results
            .iter()
            .find(|r| r.query_id == "Q2")
            .unwrap();
        assert_eq!(q2.lca_taxon, 83333);
        assert_eq!(q2.lineage.slots()[8].as_deref(), Some("st__Escherichia_coli_K-12"));
    }

    #[test]
    fn non_contiguous_query_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let hits_path = dir.path().join("hits.tsv");
        fs::write(
            &hits_path,
            "Q1\ta\tb\t9606\t1\t95\t99\t150\n\
             Q2\ta\tb\t562\t1\t95\t99\t150\n\
             Q1\ta\tb\t10090\t1\t94\t99\t150\n",
        )
        .unwrap();

        let result = assign_lca(&hits_path, &sample_taxonomy(), &LcaConfig::default());
        assert!(matches!(result, Err(LcaError::GroupSizeMismatch { .. })));
    }

    #[test]
    fn counts_follow_the_lca_table() {
        let dir = tempfile::tempdir().unwrap();
        let hits_path = dir.path().join("hits.tsv");
        let lca_path = dir.path().join("lca.tsv");
        let counts_path = dir.path().join("counts.tsv");
        fs::write(&hits_path, HITS).unwrap();

        let db = sample_taxonomy();
        let lca_config = LcaConfig {
            within_percent_of_top: 2.0,
            ..LcaConfig::default()
        };
        let results = assign_lca(&hits_path, &db, &lca_config).unwrap();
        fs::write(&lca_path, results.get_lca_table()).unwrap();

        // unweighted: one per query
        let counts = count_taxa(&lca_path, &db, &CountConfig::default()).unwrap();
        let total = |taxon: u32| {
            counts
                .rows
                .iter()
                .find(|r| r.taxon == taxon)
                .map(|r| r.count)
        };
        assert_eq!(total(2), Some(2.0));
        assert_eq!(total(2759), Some(1.0));
        assert_eq!(total(543), Some(2.0));
        assert_eq!(total(561), Some(1.0));
        assert_eq!(total(314146), None);

        // weighted by a counts file
        fs::write(&counts_path, "Q1\t10\nQ2\t5\nQ4\t2\n*\t99\n").unwrap();
        let config = CountConfig {
            counts: Some(counts_path),
            ..CountConfig::default()
        };
        let counts = count_taxa(&lca_path, &db, &config).unwrap();
        let bacteria = counts.rows.iter().find(|r| r.taxon == 2).unwrap();
        assert_eq!(bacteria.count, 7.0);

        let table = counts.get_count_table();
        assert!(table.starts_with("taxonID\tlineage\tsuperkingdom\ttaxon\tlevel\tcount\n"));
        assert!(table.contains(
            "2\t['sk__Bacteria', 0, 0, 0, 0, 0, 0, 0, 0]\tsk__Bacteria\tsk__Bacteria\tsuperkingdom\t7.0\n"
        ));
    }

    #[test]
    fn counts_are_printed_as_floats() {
        assert_eq!(format_count(8.0), "8.0");
        assert_eq!(format_count(2.5), "2.5");
    }
}
