//src/count_table.rs

use ahash::{AHashMap, AHashSet};
use std::io::BufRead;
use std::path::Path;

use crate::config::CountConfig;
use crate::error::{LcaError, Result};
use crate::hit_table::open_table;
use crate::types::{CountEntry, TaxonId, UNKNOWN_TAXID};

/// `(query_id, LCA taxon)` for every row of an LCA table.
pub type QueryTaxa = Vec<(String, TaxonId)>;

/// Reads the query and LCA columns of a headed, tab-delimited LCA table.
/// An empty LCA cell counts as taxon 0; query ids must be unique.
pub fn read_lca_table<P: AsRef<Path>>(path: P, config: &CountConfig) -> Result<QueryTaxa> {
    let mut lines = open_table(path)?.lines();
    let header: Vec<String> = match lines.next() {
        Some(header) => header?.split('\t').map(str::to_string).collect(),
        None => Vec::new(),
    };
    let columns = config.lca_columns(&header)?;

    let mut seen = AHashSet::new();
    let mut assignments = Vec::new();
    for (line_no, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let (Some(query), Some(lca)) = (fields.get(columns.query), fields.get(columns.lca)) else {
            log::warn!("Skipping malformed line {} of the LCA table", line_no + 2);
            continue;
        };

        let lca = lca.trim();
        let taxon = if lca.is_empty() {
            UNKNOWN_TAXID
        } else {
            lca.parse::<TaxonId>().map_err(|e| LcaError::InvalidValue {
                line: line_no + 2,
                value: lca.to_string(),
                reason: e.to_string(),
            })?
        };

        if !seen.insert(query.to_string()) {
            return Err(LcaError::DuplicateQueryId {
                query_id: query.to_string(),
            });
        }
        assignments.push((query.to_string(), taxon));
    }

    log::info!("Read {} query assignments", assignments.len());
    Ok(assignments)
}

/// Reads a `query_id<TAB>count` file. The `*` bucket (unmapped reads) is ignored.
pub fn read_counts_file<P: AsRef<Path>>(path: P) -> Result<AHashMap<String, f64>> {
    let reader = open_table(path)?;
    let mut counts = AHashMap::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 2 {
            return Err(LcaError::InvalidValue {
                line: line_no + 1,
                value: line.clone(),
                reason: "expected two tab-separated columns".to_string(),
            });
        }
        if fields[0] == "*" {
            continue;
        }
        let count = fields[1].trim().parse::<f64>().map_err(|e| LcaError::InvalidValue {
            line: line_no + 1,
            value: fields[1].to_string(),
            reason: e.to_string(),
        })?;
        counts.insert(fields[0].to_string(), count);
    }

    Ok(counts)
}

/// Sums query counts per LCA taxon. Without `counts` every query weighs 1.
/// Entries come out sorted by taxon id.
pub fn count_entries(
    assignments: &[(String, TaxonId)],
    counts: Option<&AHashMap<String, f64>>,
) -> Result<Vec<CountEntry>> {
    let mut per_taxon: AHashMap<TaxonId, f64> = AHashMap::new();
    for (query_id, taxon) in assignments {
        let count = match counts {
            Some(counts) => *counts.get(query_id).ok_or_else(|| LcaError::MissingCount {
                query_id: query_id.clone(),
            })?,
            None => 1.0,
        };
        *per_taxon.entry(*taxon).or_insert(0.0) += count;
    }

    let mut entries: Vec<CountEntry> = per_taxon
        .into_iter()
        .map(|(taxon, count)| CountEntry { taxon, count })
        .collect();
    entries.sort_unstable_by_key(|e| e.taxon);
    Ok(entries)
}
