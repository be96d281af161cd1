//src/taxdb.rs

use ahash::{AHashMap, AHashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::rank::Rank;
use crate::types::{Lineage, TaxonId, ROOT_TAXID};

pub type ParentMap = AHashMap<TaxonId, TaxonId>;
pub type NameMap = AHashMap<TaxonId, String>;
pub type RankMap = AHashMap<TaxonId, Rank>;

/// Read-only taxonomy oracle.
///
/// Implementations may be backed by a local file, a database or a remote
/// service; calls may be slow and are made from several threads at once.
pub trait TaxonomyProvider: Send + Sync {
    /// Ancestor chain from the root down to `taxon` (root-first, `taxon` last),
    /// or `None` if the taxon is unknown.
    fn lineage(&self, taxon: TaxonId) -> Option<Lineage>;

    fn rank(&self, taxon: TaxonId) -> Option<Rank>;

    /// Scientific name, or `None` if the taxon is unknown.
    fn name(&self, taxon: TaxonId) -> Option<String>;
}

/// In-memory taxonomy keyed by taxon id.
#[derive(Debug, Default, Clone)]
pub struct TaxDb {
    parent_map: ParentMap,
    name_map: NameMap,
    rank_map: RankMap,
}

impl TaxDb {
    /// Build from `(taxid, parent, name, rank)` records. Taxid 0 is ignored.
    pub fn from_records<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = (TaxonId, TaxonId, S, Rank)>,
        S: Into<String>,
    {
        let mut db = TaxDb::default();
        for (taxid, parent, name, rank) in records {
            db.insert(taxid, parent, name.into(), rank);
        }
        db
    }

    fn insert(&mut self, taxid: TaxonId, parent: TaxonId, name: String, rank: Rank) {
        if taxid == 0 {
            return;
        }
        self.parent_map.insert(taxid, parent);
        self.name_map.insert(taxid, name);
        self.rank_map.insert(taxid, rank);
    }

    /// Parses a taxDB file in the format:
    /// ```text
    /// <taxid>\t<parentid>\t<taxname>\t<rank>
    /// ```
    /// Lines with fewer than four fields or an unparsable taxid are skipped.
    pub fn from_taxdb_file<P: AsRef<Path>>(filepath: P) -> io::Result<Self> {
        let file = File::open(filepath)?;
        let reader = BufReader::new(file);
        let mut db = TaxDb::default();

        for line_result in reader.lines() {
            let line = line_result?;
            // e.g. "2   1   Eukaryota   domain"
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 4 {
                continue;
            }

            let taxid: TaxonId = parts[0].trim().parse().unwrap_or(0);
            let parentid: TaxonId = parts[1].trim().parse().unwrap_or(0);
            let rank: Rank = parts[3].parse().unwrap_or(Rank::Unknown);

            db.insert(taxid, parentid, parts[2].trim().to_string(), rank);
        }

        log::info!("Loaded {} taxa from taxDB file", db.len());
        Ok(db)
    }

    /// Load an NCBI taxdump (`nodes.dmp` + `names.dmp`). Only scientific names are kept.
    pub fn from_ncbi_dump<P: AsRef<Path>, Q: AsRef<Path>>(
        nodes_path: P,
        names_path: Q,
    ) -> io::Result<Self> {
        let mut db = TaxDb::default();

        let reader = BufReader::new(File::open(nodes_path)?);
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<_> = line.split("\t|\t").collect();
            if fields.len() < 3 {
                continue;
            }
            let Ok(taxid) = fields[0].trim().parse::<TaxonId>() else {
                continue;
            };
            let parent = fields[1].trim().parse::<TaxonId>().unwrap_or(0);
            let rank: Rank = fields[2].parse().unwrap_or(Rank::Unknown);
            db.parent_map.insert(taxid, parent);
            db.rank_map.insert(taxid, rank);
        }

        let reader = BufReader::new(File::open(names_path)?);
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.trim_end_matches(|c| c == '\t' || c == '|');
            let fields: Vec<_> = line.split("\t|\t").collect();
            if fields.len() < 4 || fields[3] != "scientific name" {
                continue;
            }
            if let Ok(taxid) = fields[0].trim().parse::<TaxonId>() {
                db.name_map.insert(taxid, fields[1].to_string());
            }
        }

        log::info!("Loaded {} taxa from NCBI taxdump", db.len());
        Ok(db)
    }

    pub fn len(&self) -> usize {
        self.parent_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent_map.is_empty()
    }
}

impl TaxonomyProvider for TaxDb {
    fn lineage(&self, taxon: TaxonId) -> Option<Lineage> {
        if !self.parent_map.contains_key(&taxon) {
            return None;
        }

        let mut lineage = vec![taxon];
        let mut seen = AHashSet::with_capacity(32);
        seen.insert(taxon);
        let mut current = taxon;

        while current != ROOT_TAXID {
            match self.parent_map.get(&current) {
                // self-parented or parentless node => top of the chain
                Some(&p) if p != current && p != 0 => {
                    if !seen.insert(p) {
                        log::warn!("Parent cycle detected above taxon {}", taxon);
                        break;
                    }
                    lineage.push(p);
                    current = p;
                }
                _ => break,
            }
        }

        lineage.reverse();
        Some(lineage)
    }

    fn rank(&self, taxon: TaxonId) -> Option<Rank> {
        self.rank_map.get(&taxon).cloned()
    }

    fn name(&self, taxon: TaxonId) -> Option<String> {
        self.name_map.get(&taxon).cloned()
    }
}


#[cfg(test)]
mod tests {
    use super::tests_support::sample_taxonomy;
    use super::*;
    use std::io::Write;

    #[test]
    fn lineage_is_root_first_and_ends_at_taxon() {
        let db = sample_taxonomy();
        let lineage = db.lineage(562).unwrap();
        assert_eq!(
            lineage,
            vec![1, 131567, 2, 1224, 1236, 91347, 543, 561, 562]
        );
        assert_eq!(db.lineage(1), Some(vec![1]));
        assert_eq!(db.lineage(999_999), None);
    }

    #[test]
    fn parent_cycle_stops_the_walk() {
        let db = TaxDb::from_records(vec![
            (10, 11, "a", Rank::Genus),
            (11, 10, "b", Rank::Family),
        ]);
        assert_eq!(db.lineage(10), Some(vec![11, 10]));
    }

    #[test]
    fn parses_taxdb_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1\t1\troot\tno rank").unwrap();
        writeln!(file, "2\t1\tBacteria\tdomain").unwrap();
        writeln!(file, "malformed line").unwrap();
        writeln!(file, "561\t2\tEscherichia\tgenus").unwrap();
        file.flush().unwrap();

        let db = TaxDb::from_taxdb_file(file.path()).unwrap();
        assert_eq!(db.len(), 3);
        assert_eq!(db.rank(2), Some(Rank::Superkingdom));
        assert_eq!(db.name(561).as_deref(), Some("Escherichia"));
        assert_eq!(db.lineage(561), Some(vec![1, 2, 561]));
    }

    #[test]
    fn parses_ncbi_dump() {
        let mut nodes = tempfile::NamedTempFile::new().unwrap();
        writeln!(nodes, "1\t|\t1\t|\tno rank\t|\t\t|").unwrap();
        writeln!(nodes, "2\t|\t131567\t|\tsuperkingdom\t|\t\t|").unwrap();
        writeln!(nodes, "131567\t|\t1\t|\tno rank\t|\t\t|").unwrap();
        nodes.flush().unwrap();

        let mut names = tempfile::NamedTempFile::new().unwrap();
        writeln!(names, "1\t|\troot\t|\t\t|\tscientific name\t|").unwrap();
        writeln!(names, "2\t|\tBacteria\t|\tBacteria <bacteria>\t|\tscientific name\t|").unwrap();
        writeln!(names, "2\t|\teubacteria\t|\t\t|\tgenbank common name\t|").unwrap();
        writeln!(names, "131567\t|\tcellular organisms\t|\t\t|\tscientific name\t|").unwrap();
        names.flush().unwrap();

        let db = TaxDb::from_ncbi_dump(nodes.path(), names.path()).unwrap();
        assert_eq!(db.name(2).as_deref(), Some("Bacteria"));
        assert_eq!(db.rank(2), Some(Rank::Superkingdom));
        assert_eq!(db.lineage(2), Some(vec![1, 131567, 2]));
    }
}
