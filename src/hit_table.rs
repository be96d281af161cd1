//src/hit_table.rs

use ahash::AHashMap;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::config::{HitColumns, LcaConfig};
use crate::error::{LcaError, Result};
use crate::types::{Hit, TaxonId};

/// Opens a text table, transparently decompressing `.gz` files.
pub fn open_table<P: AsRef<Path>>(path: P) -> std::io::Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path)?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    Ok(if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    })
}

/// Parsed hit table: the column names in effect plus every well-formed row.
#[derive(Debug, Clone)]
pub struct HitTable {
    pub column_names: Vec<String>,
    pub columns: HitColumns,
    pub hits: Vec<Hit>,
}

/// Taxon field as a taxon id; empty, `N/A` and other non-numeric values are missing.
fn parse_taxon(field: &str) -> Option<TaxonId> {
    let field = field.trim();
    if field.is_empty() || field == "N/A" {
        return None;
    }
    field.parse().ok()
}

/// Turns one tab-split row into a `Hit`, or `None` when the row is malformed.
pub fn parse_hit(fields: Vec<String>, expected_len: usize, columns: &HitColumns) -> Option<Hit> {
    if fields.len() != expected_len {
        return None;
    }
    let score = fields[columns.score].trim().parse::<f64>().ok()?;
    Some(Hit {
        query_id: fields[columns.query].clone(),
        taxon: parse_taxon(&fields[columns.taxon]),
        score,
        fields,
    })
}

/// Reads a tab-delimited hit table. Rows whose field count differs from the
/// column names, or whose score is not a number, are skipped with a warning.
pub fn read_hit_table<P: AsRef<Path>>(path: P, config: &LcaConfig) -> Result<HitTable> {
    let mut lines = open_table(path)?.lines();

    let column_names = match &config.column_names {
        Some(names) => names.clone(),
        None => match lines.next() {
            Some(header) => header?.split('\t').map(str::to_string).collect(),
            None => Vec::new(),
        },
    };
    let columns = config.hit_columns(&column_names)?;

    let mut hits = Vec::new();
    let mut skipped = 0usize;
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<String> = line.split('\t').map(str::to_string).collect();
        match parse_hit(fields, column_names.len(), &columns) {
            Some(hit) => hits.push(hit),
            None => {
                skipped += 1;
                log::warn!(
                    "Skipping malformed line (expected {} fields with a numeric score): {}",
                    column_names.len(),
                    line
                );
            }
        }
    }

    log::info!("Read {} hits ({} malformed lines skipped)", hits.len(), skipped);
    Ok(HitTable {
        column_names,
        columns,
        hits,
    })
}

/// All hits of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryGroup {
    pub query_id: String,
    pub hits: Vec<Hit>,
}

/// Number of hits announced for each query.
pub fn expected_counts(hits: &[Hit]) -> AHashMap<String, usize> {
    let mut counts = AHashMap::new();
    for hit in hits {
        *counts.entry(hit.query_id.clone()).or_insert(0) += 1;
    }
    counts
}

/// Cuts a stream of hits into per-query groups using the announced hit
/// count of each query.
///
/// A group is complete the moment its observed count reaches the announced
/// count. Any deviation (rows of a query interleaved with another, a query
/// that was not announced, a query seen again after completion, or a stream
/// ending mid-group) is a fatal error naming the query.
#[derive(Debug)]
pub struct QueryGrouper {
    expected: AHashMap<String, usize>,
    observed: AHashMap<String, usize>,
    current: Vec<Hit>,
    processed: usize,
}

impl QueryGrouper {
    pub fn new(expected: AHashMap<String, usize>) -> Self {
        Self {
            expected,
            observed: AHashMap::new(),
            current: Vec::new(),
            processed: 0,
        }
    }

    fn expected_for(&self, query_id: &str) -> usize {
        self.expected.get(query_id).copied().unwrap_or(0)
    }

    fn mismatch(&self, query_id: &str) -> LcaError {
        LcaError::GroupSizeMismatch {
            query_id: query_id.to_string(),
            expected: self.expected_for(query_id),
            observed: self.observed.get(query_id).copied().unwrap_or(0),
        }
    }

    /// Feed the next hit; returns the group it completes, if any.
    pub fn push(&mut self, hit: Hit) -> Result<Option<QueryGroup>> {
        if let Some(open) = self.current.first() {
            if open.query_id != hit.query_id {
                return Err(self.mismatch(&open.query_id));
            }
        }

        let observed = self.observed.entry(hit.query_id.clone()).or_insert(0);
        *observed += 1;
        let observed = *observed;
        self.processed += 1;

        let expected = self.expected_for(&hit.query_id);
        if observed > expected {
            return Err(self.mismatch(&hit.query_id));
        }

        let query_id = hit.query_id.clone();
        self.current.push(hit);
        if observed < expected {
            return Ok(None);
        }

        // `current` only ever holds hits of one query
        let hits = std::mem::take(&mut self.current);
        Ok(Some(QueryGroup { query_id, hits }))
    }

    /// Checks that the stream ended on a group boundary and every announced hit arrived.
    pub fn finish(self) -> Result<()> {
        if let Some(open) = self.current.first() {
            return Err(self.mismatch(&open.query_id));
        }
        let total_expected: usize = self.expected.values().sum();
        if self.processed != total_expected {
            return Err(LcaError::RecordCountMismatch {
                expected: total_expected,
                processed: self.processed,
            });
        }
        Ok(())
    }
}

/// Groups `hits` by query against the given announced counts.
pub fn group_hits_with_expected(
    hits: Vec<Hit>,
    expected: AHashMap<String, usize>,
) -> Result<Vec<QueryGroup>> {
    let mut grouper = QueryGrouper::new(expected);
    let mut groups = Vec::new();
    for hit in hits {
        if let Some(group) = grouper.push(hit)? {
            groups.push(group);
        }
    }
    grouper.finish()?;
    Ok(groups)
}

/// Groups `hits` by query, announcing for each query the number of its hits
/// in `hits`. Fails if a query's hits are not contiguous.
pub fn group_hits(hits: Vec<Hit>) -> Result<Vec<QueryGroup>> {
    let expected = expected_counts(&hits);
    group_hits_with_expected(hits, expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn hit(query: &str, taxon: TaxonId) -> Hit {
        Hit {
            query_id: query.to_string(),
            taxon: Some(taxon),
            score: 1.0,
            fields: vec![query.to_string(), taxon.to_string(), "1".to_string()],
        }
    }

    #[test]
    fn contiguous_queries_form_groups_in_order() {
        let hits = vec![hit("Q1", 562), hit("Q1", 622), hit("Q2", 9606), hit("Q3", 1)];
        let groups = group_hits(hits).unwrap();
        let ids: Vec<&str> = groups.iter().map(|g| g.query_id.as_str()).collect();
        assert_eq!(ids, vec!["Q1", "Q2", "Q3"]);
        assert_eq!(groups[0].hits.len(), 2);
    }

    #[test]
    fn interleaved_query_is_fatal() {
        let hits = vec![hit("Q1", 562), hit("Q2", 9606), hit("Q1", 622)];
        match group_hits(hits) {
            Err(LcaError::GroupSizeMismatch {
                query_id,
                expected,
                observed,
            }) => {
                assert_eq!(query_id, "Q1");
                assert_eq!(expected, 2);
                assert_eq!(observed, 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn foreign_hit_inside_an_open_group_names_the_open_query() {
        let mut grouper = QueryGrouper::new(expected_counts(&[
            hit("Q1", 562),
            hit("Q1", 622),
            hit("Q2", 9606),
        ]));
        assert_eq!(grouper.push(hit("Q1", 562)).unwrap(), None);
        match grouper.push(hit("Q2", 9606)) {
            Err(LcaError::GroupSizeMismatch { query_id, .. }) => assert_eq!(query_id, "Q1"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn completed_groups_hold_a_single_query() {
        let groups = group_hits(vec![hit("Q1", 562), hit("Q1", 622), hit("Q2", 9606)]).unwrap();
        for group in &groups {
            assert!(group.hits.iter().all(|h| h.query_id == group.query_id));
        }
    }

    #[test]
    fn stream_ending_mid_group_is_fatal() {
        let mut expected = AHashMap::new();
        expected.insert("Q1".to_string(), 3);
        let result = group_hits_with_expected(vec![hit("Q1", 562), hit("Q1", 622)], expected);
        assert!(matches!(
            result,
            Err(LcaError::GroupSizeMismatch { expected: 3, observed: 2, .. })
        ));
    }

    #[test]
    fn unannounced_query_is_fatal() {
        let mut expected = AHashMap::new();
        expected.insert("Q1".to_string(), 1);
        let result = group_hits_with_expected(vec![hit("Q1", 562), hit("Q9", 622)], expected);
        assert!(matches!(
            result,
            Err(LcaError::GroupSizeMismatch { expected: 0, observed: 1, .. })
        ));
    }

    #[test]
    fn missing_announced_records_are_fatal() {
        let mut expected = AHashMap::new();
        expected.insert("Q1".to_string(), 1);
        expected.insert("Q2".to_string(), 2);
        let result = group_hits_with_expected(vec![hit("Q1", 562)], expected);
        assert!(matches!(
            result,
            Err(LcaError::RecordCountMismatch { expected: 3, processed: 1 })
        ));
    }

    #[test]
    fn reads_table_skipping_malformed_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Q1\tEscherichia coli\tNZ_1\t562\t1e-50\t200\t99.0\t150").unwrap();
        writeln!(file, "Q1\tshort row\t562").unwrap();
        writeln!(file, "Q1\tunknown\tNZ_2\tN/A\t1e-40\t180\t98.0\t150").unwrap();
        writeln!(file, "Q2\tbad score\tNZ_3\t562\t1e-40\tnan-ish\t98.0\t150").unwrap();
        writeln!(file).unwrap();
        file.flush().unwrap();

        let table = read_hit_table(file.path(), &LcaConfig::default()).unwrap();
        assert_eq!(table.hits.len(), 2);
        assert_eq!(table.hits[0].taxon, Some(562));
        assert_eq!(table.hits[0].score, 200.0);
        assert_eq!(table.hits[1].taxon, None);
        assert_eq!(table.hits[1].fields.len(), 8);
    }

    #[test]
    fn reads_header_when_no_column_names_are_given() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "qseqid\tstaxids\tbitscore").unwrap();
        writeln!(file, "read1\t9606\t95").unwrap();
        file.flush().unwrap();

        let config = LcaConfig {
            column_names: None,
            query_column: "qseqid".to_string(),
            taxon_column: "staxids".to_string(),
            ..LcaConfig::default()
        };
        let table = read_hit_table(file.path(), &config).unwrap();
        assert_eq!(table.column_names, vec!["qseqid", "staxids", "bitscore"]);
        assert_eq!(table.hits.len(), 1);
        assert_eq!(table.hits[0].query_id, "read1");
    }

    #[test]
    fn reads_gzipped_tables() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hits.tsv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        writeln!(encoder, "Q1\tHomo sapiens\tNC_1\t9606\t1e-30\t95\t99\t100").unwrap();
        encoder.finish().unwrap();

        let table = read_hit_table(&path, &LcaConfig::default()).unwrap();
        assert_eq!(table.hits.len(), 1);
        assert_eq!(table.hits[0].taxon, Some(9606));
    }
}
