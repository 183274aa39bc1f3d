//! Gene identifier resolution and the on-disk annotation cache.
//!
//! [DataManager] maps user-supplied gene names to STRING protein
//! identifiers with one batched call to the `get_string_ids` endpoint.
//! When an annotation file path is configured and the file exists it is
//! loaded verbatim instead - no network call at all.  The cache is
//! keyed by path only, not by the gene list or species that produced
//! it.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::fetch::{self, StringTransport};
use crate::{GeneName, Species, StringId, TaxonId};

/// One row mapping a query string to a resolved STRING identifier and
/// a preferred display name.  Round-trips losslessly through the
/// annotation cache file (tab-delimited, with a header).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub query: GeneName,
    pub string_id: StringId,
    pub preferred_name: String,
    pub taxon_id: TaxonId,
}

/// Resolves gene names and owns the annotation cache
pub struct DataManager {
    genes: Vec<GeneName>,
    species: Species,
    version: Option<String>,
    cache_path: Option<PathBuf>,
    gene_map: Option<BTreeMap<GeneName, AnnotationRecord>>,
}

impl DataManager {
    pub fn new(genes: Vec<GeneName>,
               species: Species,
               version: Option<String>,
               cache_path: Option<PathBuf>)
        -> DataManager
    {
        DataManager {
            genes,
            species,
            version,
            cache_path,
            gene_map: None,
        }
    }

    pub fn species(&self) -> Species {
        self.species
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Resolve the configured genes to [AnnotationRecord]s, keyed by
    /// the query string.
    ///
    /// If the annotation file exists it is trusted verbatim and no
    /// request is issued.  Otherwise one batched request is made and
    /// the result is written to the annotation file (only on full
    /// success).  Genes with no match in the response are silently
    /// dropped from the mapping - callers must handle
    /// under-resolution.
    pub fn resolve_ids(&mut self, transport: &dyn StringTransport)
        -> Result<&BTreeMap<GeneName, AnnotationRecord>>
    {
        if self.gene_map.is_none() {
            let gene_map = self.resolve_uncached(transport)?;
            self.gene_map = Some(gene_map);
        }

        Ok(self.gene_map.as_ref().unwrap())
    }

    fn resolve_uncached(&self, transport: &dyn StringTransport)
        -> Result<BTreeMap<GeneName, AnnotationRecord>>
    {
        if self.genes.is_empty() {
            return Err(Error::InvalidInput("empty gene list".to_owned()));
        }

        if let Some(ref path) = self.cache_path {
            if path.is_file() {
                let records = load_annotation_file(path)?;
                info!("loaded {} annotations from {}", records.len(),
                      path.display());
                return Ok(records.into_iter()
                          .map(|record| (record.query.clone(), record))
                          .collect());
            }
        }

        let records = fetch::fetch_string_ids(transport,
                                              self.version.as_deref(),
                                              &self.genes,
                                              self.species)?;

        let gene_map: BTreeMap<GeneName, AnnotationRecord> =
            records.into_iter()
                   .map(|record| (record.query.clone(), record))
                   .collect();

        let unresolved_count = self.genes.iter()
            .filter(|gene| !gene_map.contains_key(*gene))
            .count();
        if unresolved_count > 0 {
            warn!("{} of {} genes had no match and were dropped",
                  unresolved_count, self.genes.len());
        }

        if let Some(ref path) = self.cache_path {
            write_annotation_file(path, gene_map.values())?;
            info!("wrote {} annotations to {}", gene_map.len(),
                  path.display());
        }

        Ok(gene_map)
    }

    /// The resolved records in the original input order, skipping
    /// unresolved genes.  [resolve_ids](DataManager::resolve_ids) must
    /// have run first.
    pub fn annotations_in_order(&self) -> Vec<&AnnotationRecord> {
        let Some(ref gene_map) = self.gene_map
        else {
            return vec![];
        };

        self.genes.iter()
            .filter_map(|gene| gene_map.get(gene))
            .collect()
    }

    /// The resolved STRING identifiers in the original input order
    pub fn string_ids(&self) -> Vec<StringId> {
        self.annotations_in_order().iter()
            .map(|record| record.string_id.clone())
            .collect()
    }
}

fn load_annotation_file(path: &Path) -> Result<Vec<AnnotationRecord>> {
    let file = File::open(path)
        .map_err(|e| Error::Cache(format!("can't open {}: {}", path.display(), e)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(file);

    let mut records = vec![];

    for result in reader.deserialize() {
        let record: AnnotationRecord = result?;
        records.push(record);
    }

    Ok(records)
}

fn write_annotation_file<'a>(path: &Path,
                             records: impl Iterator<Item = &'a AnnotationRecord>)
    -> Result<()>
{
    let file = File::create(path)
        .map_err(|e| Error::Cache(format!("can't create {}: {}", path.display(), e)))?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }

    writer.flush()
        .map_err(|e| Error::Cache(format!("can't write {}: {}", path.display(), e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MockTransport;

    fn resolution_body() -> Vec<u8> {
        "TP53\t0\t9606.ENSP00000269305\t9606\tHomo sapiens\tTP53\tcellular tumor antigen p53\n\
         BRCA1\t1\t9606.ENSP00000418960\t9606\tHomo sapiens\tBRCA1\tbreast cancer type 1\n"
            .as_bytes().to_vec()
    }

    #[test]
    fn resolve_subset_test() {
        // NOSUCHGENE is absent from the response: dropped, not an error
        let genes = vec!["TP53".to_owned(), "BRCA1".to_owned(),
                         "NOSUCHGENE".to_owned()];
        let transport = MockTransport::new(vec![Ok(resolution_body())]);

        let mut manager = DataManager::new(genes.clone(), crate::Species::Human,
                                           None, None);
        let gene_map = manager.resolve_ids(&transport).unwrap();

        assert_eq!(gene_map.len(), 2);
        assert!(gene_map.keys().all(|key| genes.contains(key)));
        assert_eq!(gene_map["TP53"].string_id, "9606.ENSP00000269305");
        assert!(!gene_map.contains_key("NOSUCHGENE"));

        assert_eq!(manager.string_ids(),
                   vec!["9606.ENSP00000269305".to_owned(),
                        "9606.ENSP00000418960".to_owned()]);
    }

    #[test]
    fn resolve_empty_genes_test() {
        let transport = MockTransport::new(vec![]);
        let mut manager = DataManager::new(vec![], crate::Species::Human,
                                           None, None);

        let res = manager.resolve_ids(&transport);

        assert!(matches!(res, Err(Error::InvalidInput(_))));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn cache_round_trip_test() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("annotations.tsv");
        let genes = vec!["TP53".to_owned(), "BRCA1".to_owned()];

        let transport = MockTransport::new(vec![Ok(resolution_body())]);
        let mut manager = DataManager::new(genes.clone(), crate::Species::Human,
                                           None, Some(cache_path.clone()));
        let first_map = manager.resolve_ids(&transport).unwrap().clone();
        assert_eq!(transport.call_count(), 1);
        assert!(cache_path.is_file());

        // second run: served from the file, zero network calls
        let transport = MockTransport::new(vec![]);
        let mut manager = DataManager::new(genes, crate::Species::Human,
                                           None, Some(cache_path));
        let second_map = manager.resolve_ids(&transport).unwrap().clone();

        assert_eq!(transport.call_count(), 0);
        assert_eq!(first_map, second_map);
    }

    #[test]
    fn cache_trusted_verbatim_test() {
        // the cache is keyed by path only: a different gene list still
        // gets the file content
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("annotations.tsv");

        let transport = MockTransport::new(vec![Ok(resolution_body())]);
        let mut manager = DataManager::new(vec!["TP53".to_owned(),
                                                "BRCA1".to_owned()],
                                           crate::Species::Human,
                                           None, Some(cache_path.clone()));
        manager.resolve_ids(&transport).unwrap();

        let transport = MockTransport::new(vec![]);
        let mut manager = DataManager::new(vec!["EGFR".to_owned()],
                                           crate::Species::Mouse,
                                           None, Some(cache_path));
        let gene_map = manager.resolve_ids(&transport).unwrap();

        assert_eq!(transport.call_count(), 0);
        assert_eq!(gene_map.len(), 2);
        assert!(gene_map.contains_key("TP53"));
    }

    #[test]
    fn no_cache_file_written_on_failure_test() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("annotations.tsv");

        let transport = MockTransport::new(vec![Err("HTTP status 500".to_owned())]);
        let mut manager = DataManager::new(vec!["TP53".to_owned()],
                                           crate::Species::Human,
                                           None, Some(cache_path.clone()));

        let res = manager.resolve_ids(&transport);

        assert!(matches!(res, Err(Error::Fetch { .. })));
        assert!(!cache_path.exists());
    }
}
