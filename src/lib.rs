//! A client library for building protein-protein interaction (PPI)
//! networks from the [STRING database](https://string-db.org).
//!
//! Starting from a list of gene names, the crate resolves the names to
//! STRING protein identifiers (caching the annotation table on disk),
//! fetches the interactions between them, assembles an undirected
//! weighted [petgraph] graph, partitions it into densely connected
//! subnetworks and runs functional enrichment over the resulting gene
//! sets via the STRING enrichment endpoint.
//!
//! ## Example
//! ```no_run
//! use string_ppi::{NetworkBuilder, NetworkConfig, EnrichmentTarget};
//!
//! let config = NetworkConfig::new(vec!["TP53".to_owned(), "BRCA1".to_owned()], "human")
//!     .unwrap()
//!     .annotation_file("annotations.tsv");
//!
//! let mut builder = NetworkBuilder::new(config);
//! builder.construct_network().unwrap();
//! builder.extract_subnets(Default::default(), 2).unwrap();
//!
//! for (label, subnet) in builder.subnetworks() {
//!     println!("subnetwork {}: {} proteins", label, subnet.node_count());
//! }
//!
//! let table = builder.get_enrichment_table(EnrichmentTarget::Network).unwrap();
//! for row in table.iter().take(5) {
//!     println!("{}\t{:.3e}\t{}", row.term, row.fdr, row.description);
//! }
//! ```

#[macro_use] extern crate serde_derive;

pub mod error;
pub mod fetch;
pub mod data;
pub mod graph;

pub use error::{Error, RemoteCall, Result};
pub use data::{AnnotationRecord, DataManager};
pub use fetch::{
    EnrichmentRecord, FigureAxis, HttpTransport, InteractionEdge, PlotOptions,
    StringTransport,
};
pub use graph::{
    CommunityMethod, EnrichmentTarget, NetworkBuilder, NetworkConfig, ProteinNode,
    Subnetwork,
};

/// A user-supplied gene name or accession
pub type GeneName = String;
/// A STRING internal protein identifier, like "9606.ENSP00000269305"
pub type StringId = String;
/// An NCBI taxonomy code, like 9606 for human
pub type TaxonId = u32;

/// Lookup table of common organism names, keyed by lowercase name
static SPECIES_NAMES: phf::Map<&'static str, TaxonId> = phf::phf_map! {
    "human" => 9606,
    "mouse" => 10090,
    "rat" => 10116,
    "yeast" => 4932,
    "zebrafish" => 7955,
    "fly" => 7227,
};

/// A supported organism with its canonical NCBI taxonomy code
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Species {
    Human,
    Mouse,
    Rat,
    Yeast,
    Zebrafish,
    Fly,
}

impl Species {
    /// Resolve a common name (case-insensitive) or an NCBI taxonomy
    /// code in string form.  Fails with [Error::UnknownSpecies] when
    /// the input matches no registry entry.
    pub fn resolve(name_or_code: &str) -> Result<Species> {
        let lower = name_or_code.trim().to_lowercase();

        if let Some(&taxon_id) = SPECIES_NAMES.get(lower.as_str()) {
            return Species::from_taxon(taxon_id)
                .ok_or_else(|| Error::UnknownSpecies(name_or_code.to_owned()));
        }

        if let Ok(taxon_id) = lower.parse::<TaxonId>() {
            if let Some(species) = Species::from_taxon(taxon_id) {
                return Ok(species);
            }
        }

        Err(Error::UnknownSpecies(name_or_code.to_owned()))
    }

    pub fn from_taxon(taxon_id: TaxonId) -> Option<Species> {
        match taxon_id {
            9606 => Some(Species::Human),
            10090 => Some(Species::Mouse),
            10116 => Some(Species::Rat),
            4932 => Some(Species::Yeast),
            7955 => Some(Species::Zebrafish),
            7227 => Some(Species::Fly),
            _ => None,
        }
    }

    pub fn taxon_id(&self) -> TaxonId {
        match self {
            Species::Human => 9606,
            Species::Mouse => 10090,
            Species::Rat => 10116,
            Species::Yeast => 4932,
            Species::Zebrafish => 7955,
            Species::Fly => 7227,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Species::Human => "human",
            Species::Mouse => "mouse",
            Species::Rat => "rat",
            Species::Yeast => "yeast",
            Species::Zebrafish => "zebrafish",
            Species::Fly => "fly",
        }
    }
}

impl std::fmt::Display for Species {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (NCBITaxon:{})", self.name(), self.taxon_id())
    }
}
