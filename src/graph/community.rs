//! Community detection over the interaction graph.
//!
//! petgraph has no clustering routine of its own, so this module is the
//! whole collaborator surface: [detect_communities] takes a graph and a
//! [CommunityMethod] and returns the node partition.  Callers never see
//! algorithm internals.

use std::collections::BTreeMap;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;

/// Selector for the community detection algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommunityMethod {
    /// Weighted greedy modularity agglomeration, fastgreedy style.
    /// Deterministic: merge ties are broken by smallest community
    /// label.
    #[default]
    Greedy,
    /// Connected components (petgraph's union-find)
    Components,
}

/// Partition the graph's nodes into communities.  Every node appears
/// in exactly one returned group, including isolated nodes.
pub fn detect_communities<N>(graph: &UnGraph<N, f64>, method: CommunityMethod)
    -> Vec<Vec<NodeIndex>>
{
    match method {
        CommunityMethod::Greedy => greedy_modularity(graph),
        CommunityMethod::Components => connected_components(graph),
    }
}

fn connected_components<N>(graph: &UnGraph<N, f64>) -> Vec<Vec<NodeIndex>> {
    let mut union_find = UnionFind::new(graph.node_count());

    for edge_ref in graph.edge_references() {
        union_find.union(edge_ref.source().index(), edge_ref.target().index());
    }

    let mut groups: BTreeMap<usize, Vec<NodeIndex>> = BTreeMap::new();

    for node_idx in graph.node_indices() {
        let root = union_find.find(node_idx.index());
        groups.entry(root).or_default().push(node_idx);
    }

    groups.into_values().collect()
}

/// Greedy modularity merging: start with singleton communities and
/// repeatedly merge the connected pair with the largest modularity
/// gain until no merge improves modularity.
fn greedy_modularity<N>(graph: &UnGraph<N, f64>) -> Vec<Vec<NodeIndex>> {
    let node_count = graph.node_count();

    if node_count == 0 {
        return vec![];
    }

    // total edge weight (each undirected edge once)
    let total_weight: f64 = graph.edge_references()
        .map(|edge_ref| *edge_ref.weight())
        .sum();

    if total_weight <= 0.0 {
        return graph.node_indices().map(|idx| vec![idx]).collect();
    }

    // weight between pairs of communities, keyed (small, large)
    let mut between: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    // weighted degree sum per community
    let mut degree_sum = vec![0.0; node_count];
    let mut members: BTreeMap<usize, Vec<NodeIndex>> =
        graph.node_indices().map(|idx| (idx.index(), vec![idx])).collect();

    for edge_ref in graph.edge_references() {
        let weight = *edge_ref.weight();
        let a = edge_ref.source().index();
        let b = edge_ref.target().index();

        degree_sum[a] += weight;
        degree_sum[b] += weight;

        if a != b {
            let key = (a.min(b), a.max(b));
            *between.entry(key).or_insert(0.0) += weight;
        }
    }

    loop {
        // the connected pair with the largest modularity gain;
        // BTreeMap iteration makes the tie-break stable
        let mut best: Option<((usize, usize), f64)> = None;

        for (&(i, j), &weight) in &between {
            let gain = weight / total_weight
                - degree_sum[i] * degree_sum[j] / (2.0 * total_weight * total_weight);

            match best {
                Some((_, best_gain)) if gain <= best_gain => {},
                _ => best = Some(((i, j), gain)),
            }
        }

        let Some(((i, j), gain)) = best
        else {
            break;
        };

        if gain <= 0.0 {
            break;
        }

        // merge community j into i
        degree_sum[i] += degree_sum[j];
        let moved = members.remove(&j).unwrap_or_default();
        if let Some(group) = members.get_mut(&i) {
            group.extend(moved);
        }

        between.remove(&(i, j));

        let affected: Vec<((usize, usize), f64)> = between.iter()
            .filter(|(key, _)| key.0 == j || key.1 == j)
            .map(|(&key, &weight)| (key, weight))
            .collect();

        for ((x, y), weight) in affected {
            between.remove(&(x, y));
            let other = if x == j { y } else { x };
            let key = (other.min(i), other.max(i));
            *between.entry(key).or_insert(0.0) += weight;
        }
    }

    members.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> UnGraph<&'static str, f64> {
        // two triangles joined by one weak bridge
        let mut graph = UnGraph::new_undirected();

        let nodes: Vec<NodeIndex> =
            ["a", "b", "c", "d", "e", "f"].iter()
                .map(|&name| graph.add_node(name))
                .collect();

        for &(i, j) in &[(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5)] {
            graph.add_edge(nodes[i], nodes[j], 0.9);
        }
        graph.add_edge(nodes[2], nodes[3], 0.2);

        graph
    }

    #[test]
    fn greedy_splits_triangles_test() {
        let graph = two_triangles();
        let communities = detect_communities(&graph, CommunityMethod::Greedy);

        assert_eq!(communities.len(), 2);
        for community in &communities {
            assert_eq!(community.len(), 3);
        }
    }

    #[test]
    fn partition_covers_all_nodes_test() {
        let mut graph = two_triangles();
        // an isolated node must still land in some community
        let isolated = graph.add_node("g");

        let communities = detect_communities(&graph, CommunityMethod::Greedy);

        let total: usize = communities.iter().map(|c| c.len()).sum();
        assert_eq!(total, graph.node_count());
        assert!(communities.iter().any(|c| c == &vec![isolated]));
    }

    #[test]
    fn greedy_chain_merge_test() {
        // a path of four nodes: the first merge re-keys the pairs
        // adjacent to the merged community before the next round
        let mut graph = UnGraph::<&str, f64>::new_undirected();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        let d = graph.add_node("d");
        graph.add_edge(a, b, 0.9);
        graph.add_edge(b, c, 0.9);
        graph.add_edge(c, d, 0.9);

        let mut communities = detect_communities(&graph, CommunityMethod::Greedy);
        for group in communities.iter_mut() {
            group.sort();
        }
        communities.sort();

        assert_eq!(communities, vec![vec![a, b], vec![c, d]]);
    }

    #[test]
    fn components_test() {
        let mut graph = UnGraph::<&str, f64>::new_undirected();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        graph.add_edge(a, b, 0.5);

        let communities = detect_communities(&graph, CommunityMethod::Components);

        assert_eq!(communities.len(), 2);
        assert!(communities.contains(&vec![a, b]));
        assert!(communities.contains(&vec![c]));
    }

    #[test]
    fn empty_graph_test() {
        let graph = UnGraph::<&str, f64>::new_undirected();
        assert!(detect_communities(&graph, CommunityMethod::Greedy).is_empty());
        assert!(detect_communities(&graph, CommunityMethod::Components).is_empty());
    }
}
