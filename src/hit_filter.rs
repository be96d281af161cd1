//src/hit_filter.rs

use ahash::AHashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{LcaError, Result};
use crate::taxdb::TaxonomyProvider;
use crate::types::{Hit, TaxonId};

pub type Blacklist = AHashSet<TaxonId>;

/// Reads a blacklist: one taxon per line, either alone or as the first of
/// several tab-separated fields (anything after the first tab is ignored).
pub fn read_blacklist<P: AsRef<Path>>(path: P) -> Result<Blacklist> {
    let reader = BufReader::new(File::open(path)?);
    let mut blacklist = Blacklist::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let field = line.split('\t').next().unwrap_or("").trim();
        if field.is_empty() {
            continue;
        }
        let taxon = field.parse::<TaxonId>().map_err(|e| LcaError::InvalidValue {
            line: line_no + 1,
            value: field.to_string(),
            reason: e.to_string(),
        })?;
        blacklist.insert(taxon);
    }

    log::info!("Loaded {} blacklisted taxa", blacklist.len());
    Ok(blacklist)
}

/// Why a hit was not accepted for its query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingTaxon,
    Blacklisted,
    UnknownTaxon,
    DuplicateTaxon,
}

/// Drops invalid hits of a query, then keeps only those scoring within
/// `within_percent_of_top` percent of the best remaining score.
#[derive(Debug, Clone)]
pub struct HitFilter {
    blacklist: Blacklist,
    within_percent_of_top: f64,
}

impl HitFilter {
    pub fn new(blacklist: Blacklist, within_percent_of_top: f64) -> Self {
        Self {
            blacklist,
            within_percent_of_top,
        }
    }

    /// Validity of `hit` given the hits already accepted for the same query.
    /// The first failing rule is reported.
    pub fn check<P: TaxonomyProvider + ?Sized>(
        &self,
        hit: &Hit,
        accepted: &[Hit],
        provider: &P,
    ) -> std::result::Result<(), Rejection> {
        let taxon = hit.taxon.ok_or(Rejection::MissingTaxon)?;
        if self.blacklist.contains(&taxon) {
            return Err(Rejection::Blacklisted);
        }
        if provider.name(taxon).is_none() {
            return Err(Rejection::UnknownTaxon);
        }
        if accepted.iter().any(|h| h.taxon == Some(taxon)) {
            return Err(Rejection::DuplicateTaxon);
        }
        Ok(())
    }

    /// Validity pass over all hits of one query, in arrival order.
    pub fn valid_hits<P: TaxonomyProvider + ?Sized>(&self, hits: &[Hit], provider: &P) -> Vec<Hit> {
        let mut accepted: Vec<Hit> = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.check(hit, &accepted, provider) {
                Ok(()) => accepted.push(hit.clone()),
                Err(reason) => log::debug!(
                    "Query {}: dropping hit with taxon {:?} ({:?})",
                    hit.query_id,
                    hit.taxon,
                    reason
                ),
            }
        }
        accepted
    }

    /// `max_score * (1 - within_percent_of_top / 100)`; `None` for no hits.
    pub fn score_threshold(&self, hits: &[Hit]) -> Option<f64> {
        let max_score = hits.iter().map(|h| h.score).reduce(f64::max)?;
        Some(max_score * (1.0 - self.within_percent_of_top / 100.0))
    }

    /// Score pass. An empty input stays empty.
    pub fn within_top_score(&self, hits: Vec<Hit>) -> Vec<Hit> {
        match self.score_threshold(&hits) {
            Some(threshold) => hits.into_iter().filter(|h| h.score >= threshold).collect(),
            None => hits,
        }
    }

    /// Both passes. An empty result means no hit of the query survived.
    pub fn filter<P: TaxonomyProvider + ?Sized>(&self, hits: &[Hit], provider: &P) -> Vec<Hit> {
        self.within_top_score(self.valid_hits(hits, provider))
    }
}
