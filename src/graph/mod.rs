//! Building and analyzing the protein-protein interaction network.
//!
//! [NetworkBuilder] orchestrates the whole pipeline: identifier
//! resolution, interaction lookup, graph assembly, community
//! detection and enrichment.  Operations that need a prior step
//! (a constructed network, an extracted subnetwork) all go through the
//! same guard accessors and fail with [Error::RequireNetwork] naming
//! the missing prerequisite.

pub mod community;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use petgraph::Graph;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use tracing::info;

use crate::data::DataManager;
use crate::error::{Error, Result};
use crate::fetch::{self, DEFAULT_STRING_VERSION, EnrichmentRecord, HttpTransport,
                   PlotOptions, StringTransport};
use crate::{GeneName, Species, StringId};

pub use community::{CommunityMethod, detect_communities};

/// A protein in the interaction network
#[derive(Debug, Clone, PartialEq)]
pub struct ProteinNode {
    pub string_id: StringId,
    /// the preferred display name
    pub name: String,
    /// set on the highest-degree nodes when `add_color_nodes` is
    /// configured, for downstream visualization only
    pub highlight: bool,
    /// the community label assigned by
    /// [extract_subnets](NetworkBuilder::extract_subnets), 0 = largest
    pub community: Option<usize>,
}

/// The interaction network: undirected, confidence weights in [0,1]
pub type PpiGraph = UnGraph<ProteinNode, f64>;

/// Configuration for a [NetworkBuilder] run
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub genes: Vec<GeneName>,
    pub species: Species,
    /// annotation cache file; loaded verbatim when it exists
    pub annotation_file: Option<PathBuf>,
    /// STRING release, `None` for the un-versioned production host
    pub version: Option<String>,
    /// minimum interaction confidence, source 0-1000 scale, passed
    /// through to the service
    pub required_score: Option<u32>,
    /// how many extra highly connected neighbors the service should
    /// add to the network, passed through
    pub add_nodes: Option<u32>,
    /// how many of the highest-degree nodes get the highlight
    /// attribute
    pub add_color_nodes: usize,
}

impl NetworkConfig {
    pub fn new(genes: Vec<GeneName>, species: &str) -> Result<NetworkConfig> {
        Ok(NetworkConfig {
            genes,
            species: Species::resolve(species)?,
            annotation_file: None,
            version: Some(DEFAULT_STRING_VERSION.to_owned()),
            required_score: None,
            add_nodes: None,
            add_color_nodes: 10,
        })
    }

    pub fn annotation_file(mut self, path: impl Into<PathBuf>) -> NetworkConfig {
        self.annotation_file = Some(path.into());
        self
    }

    pub fn version(mut self, version: Option<String>) -> NetworkConfig {
        self.version = version;
        self
    }

    pub fn required_score(mut self, score: u32) -> NetworkConfig {
        self.required_score = Some(score);
        self
    }

    pub fn add_nodes(mut self, add_nodes: u32) -> NetworkConfig {
        self.add_nodes = Some(add_nodes);
        self
    }

    pub fn add_color_nodes(mut self, count: usize) -> NetworkConfig {
        self.add_color_nodes = count;
        self
    }
}

/// A community's induced subgraph, read-only once extracted
#[derive(Debug, Clone)]
pub struct Subnetwork {
    graph: PpiGraph,
}

impl Subnetwork {
    pub fn graph(&self) -> &PpiGraph {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn string_ids(&self) -> Vec<StringId> {
        self.graph.node_weights()
            .map(|node| node.string_id.clone())
            .collect()
    }

    pub fn gene_names(&self) -> Vec<String> {
        self.graph.node_weights()
            .map(|node| node.name.clone())
            .collect()
    }
}

/// The gene set an enrichment operation runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentTarget {
    /// the whole constructed network
    Network,
    /// one extracted subnetwork, by community label
    Subnet(usize),
}

/// Builds the PPI network and holds the latest network and its
/// subnetworks.  Single-caller, single-run use: all I/O is blocking
/// and nothing is shared.
pub struct NetworkBuilder<T: StringTransport = HttpTransport> {
    transport: T,
    data: DataManager,
    required_score: Option<u32>,
    add_nodes: Option<u32>,
    add_color_nodes: usize,
    network: Option<PpiGraph>,
    subnetworks: BTreeMap<usize, Subnetwork>,
}

impl NetworkBuilder<HttpTransport> {
    pub fn new(config: NetworkConfig) -> NetworkBuilder<HttpTransport> {
        NetworkBuilder::with_transport(config, HttpTransport::new())
    }
}

impl<T: StringTransport> NetworkBuilder<T> {
    /// Build with a caller-supplied transport (tests use a canned one)
    pub fn with_transport(config: NetworkConfig, transport: T) -> NetworkBuilder<T> {
        let data = DataManager::new(config.genes, config.species,
                                    config.version, config.annotation_file);

        NetworkBuilder {
            transport,
            data,
            required_score: config.required_score,
            add_nodes: config.add_nodes,
            add_color_nodes: config.add_color_nodes,
            network: None,
            subnetworks: BTreeMap::new(),
        }
    }

    /// Resolve identifiers, fetch interactions and assemble the graph.
    ///
    /// All-or-nothing: on any upstream failure the error is wrapped in
    /// [Error::Construct] and the network stays unset.
    pub fn construct_network(&mut self) -> Result<()> {
        match self.build_network() {
            Ok(graph) => {
                info!("constructed network: {} proteins, {} interactions",
                      graph.node_count(), graph.edge_count());
                self.network = Some(graph);
                Ok(())
            },
            Err(err) => Err(Error::Construct(Box::new(err))),
        }
    }

    fn build_network(&mut self) -> Result<PpiGraph> {
        self.data.resolve_ids(&self.transport)?;

        let ids = self.data.string_ids();
        let edges = fetch::fetch_interactions(&self.transport,
                                              self.data.version(),
                                              &ids,
                                              self.data.species(),
                                              self.required_score,
                                              self.add_nodes)?;

        let mut graph = Graph::new_undirected();
        let mut node_lookup: HashMap<StringId, NodeIndex> = HashMap::new();

        // resolved proteins first, in input order, so degree ties
        // break on the original resolution order
        for record in self.data.annotations_in_order() {
            node_lookup.entry(record.string_id.clone())
                .or_insert_with(|| graph.add_node(ProteinNode {
                    string_id: record.string_id.clone(),
                    name: record.preferred_name.clone(),
                    highlight: false,
                    community: None,
                }));
        }

        // then any nodes the service added (neighbor expansion)
        for edge in &edges {
            for (string_id, name) in [(&edge.id_a, &edge.name_a),
                                      (&edge.id_b, &edge.name_b)] {
                node_lookup.entry(string_id.clone())
                    .or_insert_with(|| graph.add_node(ProteinNode {
                        string_id: string_id.clone(),
                        name: name.clone(),
                        highlight: false,
                        community: None,
                    }));
            }

            let a = node_lookup[&edge.id_a];
            let b = node_lookup[&edge.id_b];
            graph.add_edge(a, b, edge.weight);
        }

        mark_highlight_nodes(&mut graph, self.add_color_nodes);

        Ok(graph)
    }

    /// Partition the network into communities and keep those with at
    /// least `min_size` nodes as subnetworks, labelled by descending
    /// size (label 0 = largest).  Every node gets a community label,
    /// including members of communities too small to keep.
    pub fn extract_subnets(&mut self, method: CommunityMethod, min_size: usize)
        -> Result<()>
    {
        self.require_network()?;
        let graph = self.network.as_mut().unwrap();

        let mut communities = detect_communities(graph, method);

        for group in communities.iter_mut() {
            group.sort();
        }
        communities.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));

        for (label, group) in communities.iter().enumerate() {
            for &node_idx in group {
                graph[node_idx].community = Some(label);
            }
        }

        let graph = self.network.as_ref().unwrap();
        let mut subnetworks = BTreeMap::new();

        for (label, group) in communities.iter().enumerate() {
            if group.len() < min_size {
                continue;
            }

            subnetworks.insert(label, Subnetwork {
                graph: induced_subgraph(graph, group),
            });
        }

        info!("extracted {} subnetworks from {} communities",
              subnetworks.len(), communities.len());

        self.subnetworks = subnetworks;

        Ok(())
    }

    /// The constructed network, or [Error::RequireNetwork]
    pub fn network(&self) -> Result<&PpiGraph> {
        self.require_network()
    }

    /// The extracted subnetworks, keyed by community label
    pub fn subnetworks(&self) -> &BTreeMap<usize, Subnetwork> {
        &self.subnetworks
    }

    pub fn subnetwork(&self, label: usize) -> Result<&Subnetwork> {
        self.require_subnet(label)
    }

    /// Fetch the enrichment table for the chosen gene set, sorted by
    /// ascending adjusted p-value
    pub fn get_enrichment_table(&self, target: EnrichmentTarget)
        -> Result<Vec<EnrichmentRecord>>
    {
        let ids = self.target_ids(target)?;

        fetch::fetch_enrichment(&self.transport, self.data.version(), &ids,
                                self.data.species())
    }

    /// Fetch a rendered enrichment figure for the chosen gene set and
    /// write it to `path`.  Fails with [Error::Plotting] when the
    /// enrichment table is empty; no file is created in that case.
    pub fn save_enrichment_plot(&self,
                                path: impl AsRef<Path>,
                                target: EnrichmentTarget,
                                options: &PlotOptions)
        -> Result<()>
    {
        let table = self.get_enrichment_table(target)?;

        if table.is_empty() {
            return Err(Error::Plotting(
                "empty enrichment table - nothing to render".to_owned()));
        }

        let ids = self.target_ids(target)?;
        let bytes = fetch::fetch_enrichment_figure(&self.transport,
                                                   self.data.version(), &ids,
                                                   self.data.species(), options)?;

        write_image(path.as_ref(), &bytes)
    }

    /// Fetch STRING's rendered picture of the chosen network and write
    /// it to `path`
    pub fn save_network_image(&self,
                              path: impl AsRef<Path>,
                              target: EnrichmentTarget)
        -> Result<()>
    {
        let ids = self.target_ids(target)?;
        let bytes = fetch::fetch_network_figure(&self.transport,
                                                self.data.version(), &ids,
                                                self.data.species())?;

        write_image(path.as_ref(), &bytes)
    }

    fn target_ids(&self, target: EnrichmentTarget) -> Result<Vec<StringId>> {
        match target {
            EnrichmentTarget::Network => {
                let graph = self.require_network()?;
                Ok(graph.node_weights()
                   .map(|node| node.string_id.clone())
                   .collect())
            },
            EnrichmentTarget::Subnet(label) => {
                Ok(self.require_subnet(label)?.string_ids())
            },
        }
    }

    fn require_network(&self) -> Result<&PpiGraph> {
        self.network.as_ref()
            .ok_or_else(|| Error::RequireNetwork("the main network".to_owned()))
    }

    fn require_subnet(&self, label: usize) -> Result<&Subnetwork> {
        self.require_network()?;

        self.subnetworks.get(&label)
            .ok_or_else(|| Error::RequireNetwork(format!("subnetwork {}", label)))
    }
}

/// Set the highlight attribute on the `count` highest-degree nodes,
/// ties broken by insertion order
fn mark_highlight_nodes(graph: &mut PpiGraph, count: usize) {
    if count == 0 {
        return;
    }

    let mut by_degree: Vec<(usize, NodeIndex)> =
        graph.node_indices()
             .map(|node_idx| (graph.edges(node_idx).count(), node_idx))
             .collect();

    by_degree.sort_by(|(deg_a, idx_a), (deg_b, idx_b)| {
        deg_b.cmp(deg_a).then(idx_a.cmp(idx_b))
    });

    for &(_, node_idx) in by_degree.iter().take(count) {
        graph[node_idx].highlight = true;
    }
}

/// The subgraph induced by `nodes`: their cloned weights and every
/// edge with both endpoints in the set
fn induced_subgraph(graph: &PpiGraph, nodes: &[NodeIndex]) -> PpiGraph {
    let mut sub_graph = Graph::new_undirected();
    let mut index_map = HashMap::new();

    for &node_idx in nodes {
        index_map.insert(node_idx, sub_graph.add_node(graph[node_idx].clone()));
    }

    for edge_ref in graph.edge_references() {
        let (Some(&source), Some(&target)) =
            (index_map.get(&edge_ref.source()), index_map.get(&edge_ref.target()))
        else {
            continue;
        };

        sub_graph.add_edge(source, target, *edge_ref.weight());
    }

    sub_graph
}

fn write_image(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)
        .map_err(|e| Error::Plotting(format!("can't write {}: {}",
                                             path.display(), e)))
}
