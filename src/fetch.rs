//! Access to the STRING-db web service.
//!
//! All remote calls go through the [StringTransport] trait so tests can
//! substitute a canned transport.  The production implementation is
//! [HttpTransport], a thin wrapper around a blocking [reqwest] client.
//!
//! The three tabular endpoints (`get_string_ids`, `network`,
//! `enrichment`) return tab-delimited text which is parsed here into
//! typed rows.  The figure endpoints return raw image bytes.

use tracing::debug;

use crate::data::AnnotationRecord;
use crate::error::{Error, RemoteCall, Result};
use crate::{GeneName, Species, StringId};

/// STRING release used when the caller does not pick one
pub const DEFAULT_STRING_VERSION: &str = "12.0";

const CALLER_IDENTITY: &str = "string-ppi";

/// What a transport reports on failure: a human-readable reason.  The
/// fetch layer attaches the [RemoteCall] context.
pub type TransportResult = std::result::Result<Vec<u8>, String>;

/// A blocking POST of a form-encoded request to the STRING API
pub trait StringTransport {
    fn post(&self, url: &str, params: &[(&str, String)]) -> TransportResult;
}

/// [StringTransport] backed by a blocking [reqwest] client
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> HttpTransport {
        HttpTransport {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> HttpTransport {
        HttpTransport::new()
    }
}

impl StringTransport for HttpTransport {
    fn post(&self, url: &str, params: &[(&str, String)]) -> TransportResult {
        let response = self.client
            .post(url)
            .form(params)
            .send()
            .map_err(|e| format!("no response - {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP status {}", response.status()));
        }

        response.bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|e| format!("failed reading body - {}", e))
    }
}

/// Build a STRING API URL like
/// `https://version-12-0.string-db.org/api/tsv/network`.  A `None`
/// version targets the un-versioned production host.
pub fn request_url(version: Option<&str>, output_format: &str, method: &str) -> String {
    let base = match version {
        Some(version) => {
            let dashed = version.replace('.', "-");
            format!("https://version-{}.string-db.org/api", dashed)
        },
        None => "https://string-db.org/api".to_owned(),
    };

    format!("{}/{}/{}", base, output_format, method)
}

/// One interaction row from the `network` endpoint, confidence already
/// normalized to the [0,1] scale
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct InteractionEdge {
    pub id_a: StringId,
    pub id_b: StringId,
    pub name_a: String,
    pub name_b: String,
    pub weight: f64,
}

/// One row of an enrichment table from the `enrichment` endpoint
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EnrichmentRecord {
    pub term: String,
    pub category: String,
    /// genes from the query in the term over genes in the background
    pub gene_ratio: f64,
    pub p_value: f64,
    /// the adjusted p-value as reported by STRING
    pub fdr: f64,
    pub description: String,
}

/// Metric shown on the x axis of a remote-rendered enrichment figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FigureAxis {
    #[default]
    Fdr,
    Signal,
    Strength,
    GeneCount,
}

impl FigureAxis {
    fn api_name(&self) -> &'static str {
        match self {
            FigureAxis::Fdr => "FDR",
            FigureAxis::Signal => "signal",
            FigureAxis::Strength => "strength",
            FigureAxis::GeneCount => "gene_count",
        }
    }
}

/// Options for [crate::NetworkBuilder::save_enrichment_plot]
#[derive(Debug, Clone)]
pub struct PlotOptions {
    /// STRING enrichment category, like "Process", "Component",
    /// "Function" or "KEGG"
    pub category: String,
    /// how many of the top terms to show
    pub n_terms: u32,
    pub x_axis: FigureAxis,
}

impl Default for PlotOptions {
    fn default() -> PlotOptions {
        PlotOptions {
            category: "Process".to_owned(),
            n_terms: 20,
            x_axis: FigureAxis::default(),
        }
    }
}

fn join_identifiers(identifiers: &[String]) -> String {
    identifiers.join("\r")
}

fn body_text(bytes: Vec<u8>, call: RemoteCall) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|_| Error::fetch(call, "response is not valid UTF-8"))
}

/// Split a TSV-with-header response into (header, data rows), checking
/// that every data row has exactly the header's column count
fn parse_table(text: &str, call: RemoteCall) -> Result<(Vec<&str>, Vec<Vec<&str>>)> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let header: Vec<&str> = lines.next()
        .ok_or_else(|| Error::fetch(call, "empty response"))?
        .split('\t')
        .collect();

    let mut rows = vec![];

    for line in lines {
        let row: Vec<&str> = line.split('\t').collect();
        if row.len() != header.len() {
            return Err(Error::fetch(call,
                format!("malformed row: expected {} columns, got {}",
                        header.len(), row.len())));
        }
        rows.push(row);
    }

    Ok((header, rows))
}

fn column_index(header: &[&str], name: &str, call: RemoteCall) -> Result<usize> {
    header.iter().position(|&col| col == name)
        .ok_or_else(|| Error::fetch(call, format!("missing column '{}'", name)))
}

/// Resolve gene names to STRING identifiers with one batched call to
/// `get_string_ids`.  Genes with no match are absent from the result.
pub fn fetch_string_ids(transport: &dyn StringTransport,
                        version: Option<&str>,
                        genes: &[GeneName],
                        species: Species)
    -> Result<Vec<AnnotationRecord>>
{
    let call = RemoteCall::ResolveIds;
    let url = request_url(version, "tsv-no-header", "get_string_ids");

    let params = [
        ("identifiers", join_identifiers(genes)),
        ("species", species.taxon_id().to_string()),
        // one (best) identifier per input protein
        ("limit", "1".to_owned()),
        // echo the query term as the first output column
        ("echo_query", "1".to_owned()),
        ("caller_identity", CALLER_IDENTITY.to_owned()),
    ];

    debug!("POST {} ({} identifiers)", url, genes.len());

    let bytes = transport.post(&url, &params)
        .map_err(|reason| Error::fetch(call, reason))?;
    let text = body_text(bytes, call)?;

    // tsv-no-header columns: query term, query index, STRING id,
    // taxon, species name, preferred name, annotation
    let mut records = vec![];

    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 6 {
            return Err(Error::fetch(call,
                format!("malformed row: expected at least 6 columns, got {}",
                        cols.len())));
        }

        let taxon_id = cols[3].parse()
            .map_err(|_| Error::fetch(call,
                format!("bad taxon code '{}'", cols[3])))?;

        records.push(AnnotationRecord {
            query: cols[0].to_owned(),
            string_id: cols[2].to_owned(),
            preferred_name: cols[5].to_owned(),
            taxon_id,
        });
    }

    Ok(records)
}

/// Fetch the interactions between `ids` (plus up to `add_nodes` extra
/// highly connected neighbors, expanded remotely) with one call to the
/// `network` endpoint.  `required_score` is on the source 0-1000 scale
/// and is passed through; the returned weights are normalized to [0,1].
pub fn fetch_interactions(transport: &dyn StringTransport,
                          version: Option<&str>,
                          ids: &[StringId],
                          species: Species,
                          required_score: Option<u32>,
                          add_nodes: Option<u32>)
    -> Result<Vec<InteractionEdge>>
{
    let call = RemoteCall::Network;

    if let Some(score) = required_score {
        if score > 1000 {
            return Err(Error::InvalidInput(
                format!("required_score must be in 0..=1000, got {}", score)));
        }
    }

    let url = request_url(version, "tsv", "network");

    let mut params = vec![
        ("identifiers", join_identifiers(ids)),
        ("species", species.taxon_id().to_string()),
        ("caller_identity", CALLER_IDENTITY.to_owned()),
    ];
    if let Some(score) = required_score {
        params.push(("required_score", score.to_string()));
    }
    if let Some(add_nodes) = add_nodes {
        params.push(("add_nodes", add_nodes.to_string()));
    }

    debug!("POST {} ({} identifiers)", url, ids.len());

    let bytes = transport.post(&url, &params)
        .map_err(|reason| Error::fetch(call, reason))?;
    let text = body_text(bytes, call)?;

    let (header, rows) = parse_table(&text, call)?;

    let id_a_idx = column_index(&header, "stringId_A", call)?;
    let id_b_idx = column_index(&header, "stringId_B", call)?;
    let name_a_idx = column_index(&header, "preferredName_A", call)?;
    let name_b_idx = column_index(&header, "preferredName_B", call)?;
    let score_idx = column_index(&header, "score", call)?;

    let mut edges = vec![];

    for row in rows {
        let raw_score: f64 = row[score_idx].parse()
            .map_err(|_| Error::fetch(call,
                format!("bad score '{}'", row[score_idx])))?;

        // the source reports combined scores as 0-1000 integers;
        // some releases emit an already normalized float.  Only a
        // value with a decimal point counts as normalized, so an
        // integer score of 1 still converts to 0.001.
        let weight =
            if row[score_idx].contains('.') {
                raw_score
            } else {
                raw_score / 1000.0
            };

        edges.push(InteractionEdge {
            id_a: row[id_a_idx].to_owned(),
            id_b: row[id_b_idx].to_owned(),
            name_a: row[name_a_idx].to_owned(),
            name_b: row[name_b_idx].to_owned(),
            weight,
        });
    }

    Ok(edges)
}

/// Fetch the enrichment table for a gene set, sorted by ascending
/// adjusted p-value.  The adjustment method and ranking are whatever
/// the service returns - no local statistics.
pub fn fetch_enrichment(transport: &dyn StringTransport,
                        version: Option<&str>,
                        ids: &[StringId],
                        species: Species)
    -> Result<Vec<EnrichmentRecord>>
{
    let call = RemoteCall::Enrichment;
    let url = request_url(version, "tsv", "enrichment");

    let params = [
        ("identifiers", join_identifiers(ids)),
        ("species", species.taxon_id().to_string()),
        ("caller_identity", CALLER_IDENTITY.to_owned()),
    ];

    debug!("POST {} ({} identifiers)", url, ids.len());

    let bytes = transport.post(&url, &params)
        .map_err(|reason| Error::fetch(call, reason))?;
    let text = body_text(bytes, call)?;

    let (header, rows) = parse_table(&text, call)?;

    let category_idx = column_index(&header, "category", call)?;
    let term_idx = column_index(&header, "term", call)?;
    let n_genes_idx = column_index(&header, "number_of_genes", call)?;
    let n_background_idx = column_index(&header, "number_of_genes_in_background", call)?;
    let p_value_idx = column_index(&header, "p_value", call)?;
    let fdr_idx = column_index(&header, "fdr", call)?;
    let description_idx = column_index(&header, "description", call)?;

    let parse_f64 = |field: &str| -> Result<f64> {
        field.parse()
            .map_err(|_| Error::fetch(call, format!("bad number '{}'", field)))
    };

    let mut records = vec![];

    for row in rows {
        let n_genes = parse_f64(row[n_genes_idx])?;
        let n_background = parse_f64(row[n_background_idx])?;

        let gene_ratio =
            if n_background > 0.0 {
                n_genes / n_background
            } else {
                0.0
            };

        records.push(EnrichmentRecord {
            term: row[term_idx].to_owned(),
            category: row[category_idx].to_owned(),
            gene_ratio,
            p_value: parse_f64(row[p_value_idx])?,
            fdr: parse_f64(row[fdr_idx])?,
            description: row[description_idx].to_owned(),
        });
    }

    records.sort_by(|a, b| a.fdr.total_cmp(&b.fdr));

    Ok(records)
}

/// Fetch a remote-rendered enrichment figure as raw image bytes
pub fn fetch_enrichment_figure(transport: &dyn StringTransport,
                               version: Option<&str>,
                               ids: &[StringId],
                               species: Species,
                               options: &PlotOptions)
    -> Result<Vec<u8>>
{
    let call = RemoteCall::EnrichmentFigure;
    let url = request_url(version, "image", "enrichmentfigure");

    let params = [
        ("identifiers", join_identifiers(ids)),
        ("species", species.taxon_id().to_string()),
        ("caller_identity", CALLER_IDENTITY.to_owned()),
        ("category", options.category.clone()),
        ("number_of_term_shown", options.n_terms.to_string()),
        ("x_axis", options.x_axis.api_name().to_owned()),
    ];

    debug!("POST {} ({} identifiers)", url, ids.len());

    transport.post(&url, &params)
        .map_err(|reason| Error::fetch(call, reason))
}

/// Fetch a remote-rendered picture of the interaction network itself
pub fn fetch_network_figure(transport: &dyn StringTransport,
                            version: Option<&str>,
                            ids: &[StringId],
                            species: Species)
    -> Result<Vec<u8>>
{
    let call = RemoteCall::NetworkImage;
    let url = request_url(version, "image", "network");

    let params = [
        ("identifiers", join_identifiers(ids)),
        ("species", species.taxon_id().to_string()),
        ("caller_identity", CALLER_IDENTITY.to_owned()),
    ];

    debug!("POST {} ({} identifiers)", url, ids.len());

    transport.post(&url, &params)
        .map_err(|reason| Error::fetch(call, reason))
}
