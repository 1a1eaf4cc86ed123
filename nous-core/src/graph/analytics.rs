//! Whole-graph analytics: PageRank, community detection, centrality and
//! clustering.
//!
//! Everything here runs on an [`AnalyticsGraph`], a capped `petgraph`
//! snapshot of the concept graph. The cap (strongest concepts first, then
//! heaviest edges among them) bounds worst-case latency on large graphs.
//!
//! PageRank and betweenness use the stored edge orientation; community
//! detection and the clustering coefficient use the undirected projection.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use ordered_float::OrderedFloat;
use petgraph::algo::page_rank;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::debug;

use crate::error::{NousError, Result};
use crate::types::{Concept, ConceptId, Connection, KnowledgeCluster};

use super::ConceptGraph;

/// Capped directed snapshot of the concept graph.
#[derive(Debug, Clone)]
pub struct AnalyticsGraph {
    graph: DiGraph<ConceptId, f64>,
    truncated: bool,
}

impl AnalyticsGraph {
    /// Snapshot `source`, keeping at most `max_nodes` concepts (strongest
    /// first) and `max_edges` edges (heaviest first).
    #[must_use]
    pub fn build(source: &ConceptGraph, max_nodes: usize, max_edges: usize) -> Self {
        let mut concepts: Vec<&Concept> = source.concepts().collect();
        let mut truncated = false;
        if concepts.len() > max_nodes {
            concepts.sort_by_key(|c| (Reverse(OrderedFloat(c.strength)), c.id.clone()));
            concepts.truncate(max_nodes);
            concepts.sort_by(|a, b| a.id.cmp(&b.id));
            truncated = true;
        }

        let mut graph = DiGraph::with_capacity(concepts.len(), source.edge_count().min(max_edges));
        let mut index: HashMap<&ConceptId, NodeIndex> = HashMap::with_capacity(concepts.len());
        for concept in &concepts {
            index.insert(&concept.id, graph.add_node(concept.id.clone()));
        }

        let mut edges: Vec<&Connection> = source
            .edges()
            .filter(|e| index.contains_key(&e.source) && index.contains_key(&e.target))
            .collect();
        if edges.len() > max_edges {
            edges.sort_by_key(|e| (Reverse(OrderedFloat(e.weight)), e.key()));
            edges.truncate(max_edges);
            truncated = true;
        }
        for edge in edges {
            if let (Some(&a), Some(&b)) = (index.get(&edge.source), index.get(&edge.target)) {
                graph.add_edge(a, b, edge.weight);
            }
        }

        if truncated {
            debug!(
                nodes = graph.node_count(),
                edges = graph.edge_count(),
                "Analytics input truncated"
            );
        }
        Self { graph, truncated }
    }

    /// Number of nodes in the snapshot.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges in the snapshot.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the cap dropped any nodes or edges.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// PageRank over the directed snapshot. Empty for an empty graph.
    ///
    /// # Errors
    ///
    /// Returns [`NousError::GraphAlgorithm`] for a damping factor outside
    /// [0, 1] or if the iteration produced non-finite scores.
    pub fn pagerank(&self, damping: f64, iterations: usize) -> Result<Vec<(ConceptId, f64)>> {
        if self.graph.node_count() == 0 {
            return Ok(Vec::new());
        }
        if !(0.0..=1.0).contains(&damping) {
            return Err(NousError::GraphAlgorithm(format!(
                "pagerank damping {damping} outside [0, 1]"
            )));
        }
        let scores = page_rank(&self.graph, damping, iterations);
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(NousError::GraphAlgorithm("pagerank did not converge".into()));
        }
        Ok(self
            .graph
            .node_indices()
            .map(|ix| (self.graph[ix].clone(), scores[ix.index()]))
            .collect())
    }

    /// Weighted undirected adjacency, by node index.
    fn undirected(&self) -> Vec<BTreeMap<usize, f64>> {
        let mut adj = vec![BTreeMap::new(); self.graph.node_count()];
        for edge in self.graph.edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            if a == b {
                continue;
            }
            *adj[a].entry(b).or_insert(0.0) += *edge.weight();
            *adj[b].entry(a).or_insert(0.0) += *edge.weight();
        }
        adj
    }

    /// Greedy modularity maximization (Clauset–Newman–Moore) on the
    /// weighted undirected projection.
    ///
    /// Communities are merged pairwise while some merge increases
    /// modularity. Ties go to the lowest index pair, so the result is
    /// deterministic. Returns every community (singletons included), each
    /// sorted, largest first.
    ///
    /// # Errors
    ///
    /// Returns [`NousError::GraphAlgorithm`] if the edge weights are not
    /// finite.
    pub fn communities(&self) -> Result<Vec<Vec<ConceptId>>> {
        let n = self.graph.node_count();
        if n == 0 {
            return Ok(Vec::new());
        }
        let adj = self.undirected();
        let two_w: f64 = adj.iter().flat_map(BTreeMap::values).sum();
        if !two_w.is_finite() {
            return Err(NousError::GraphAlgorithm(
                "community detection needs finite edge weights".into(),
            ));
        }

        let mut members: BTreeMap<usize, Vec<usize>> = (0..n).map(|i| (i, vec![i])).collect();
        if two_w > 0.0 {
            let mut a: Vec<f64> = adj.iter().map(|row| row.values().sum::<f64>() / two_w).collect();
            let mut e: BTreeMap<usize, BTreeMap<usize, f64>> = adj
                .iter()
                .enumerate()
                .map(|(i, row)| (i, row.iter().map(|(&j, &w)| (j, w / two_w)).collect()))
                .collect();

            loop {
                let mut best: Option<(f64, usize, usize)> = None;
                for (&i, row) in &e {
                    for (&j, &eij) in row.range(i + 1..) {
                        let dq = 2.0 * (eij - a[i] * a[j]);
                        if best.is_none_or(|(b, _, _)| dq > b) {
                            best = Some((dq, i, j));
                        }
                    }
                }
                let Some((dq, i, j)) = best else { break };
                if dq <= 0.0 {
                    break;
                }

                // Fold community j into i.
                let row_j = e.remove(&j).unwrap_or_default();
                for (k, w) in row_j {
                    if k == i {
                        continue;
                    }
                    *e.entry(i).or_default().entry(k).or_insert(0.0) += w;
                    let row_k = e.entry(k).or_default();
                    row_k.remove(&j);
                    *row_k.entry(i).or_insert(0.0) += w;
                }
                if let Some(row_i) = e.get_mut(&i) {
                    row_i.remove(&j);
                }
                a[i] += a[j];
                a[j] = 0.0;
                let moved = members.remove(&j).unwrap_or_default();
                members.entry(i).or_default().extend(moved);
            }
        }

        let mut out: Vec<Vec<ConceptId>> = members
            .into_values()
            .map(|m| {
                let mut ids: Vec<ConceptId> = m
                    .into_iter()
                    .map(|ix| self.graph[NodeIndex::new(ix)].clone())
                    .collect();
                ids.sort();
                ids
            })
            .collect();
        out.sort_by(|x, y| y.len().cmp(&x.len()).then_with(|| x.cmp(y)));
        Ok(out)
    }

    /// Communities with at least `min_size` members (never fewer than
    /// three), with names and internal edge weight filled in from `source`.
    ///
    /// # Errors
    ///
    /// Propagates [`AnalyticsGraph::communities`] failures.
    pub fn knowledge_clusters(
        &self,
        source: &ConceptGraph,
        min_size: usize,
    ) -> Result<Vec<KnowledgeCluster>> {
        let min_size = min_size.max(3);
        Ok(self
            .communities()?
            .into_iter()
            .filter(|members| members.len() >= min_size)
            .map(|members| {
                let set: BTreeSet<&ConceptId> = members.iter().collect();
                let internal_weight = source
                    .edges()
                    .filter(|e| set.contains(&e.source) && set.contains(&e.target))
                    .map(|e| e.weight)
                    .sum();
                let names = members
                    .iter()
                    .map(|id| source.concept(id).map_or_else(|| id.to_string(), |c| c.name.clone()))
                    .collect();
                KnowledgeCluster {
                    members,
                    names,
                    internal_weight,
                }
            })
            .collect())
    }

    /// Brandes betweenness centrality over directed shortest paths,
    /// normalized by `(n − 1)(n − 2)`. Indexed like the snapshot's nodes.
    #[must_use]
    pub fn betweenness(&self) -> Vec<f64> {
        let n = self.graph.node_count();
        let out: Vec<Vec<usize>> = self
            .graph
            .node_indices()
            .map(|ix| {
                let set: BTreeSet<usize> = self
                    .graph
                    .neighbors(ix)
                    .map(NodeIndex::index)
                    .filter(|&j| j != ix.index())
                    .collect();
                set.into_iter().collect()
            })
            .collect();

        let mut centrality = vec![0.0_f64; n];
        for s in 0..n {
            let mut stack = Vec::with_capacity(n);
            let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
            let mut sigma = vec![0.0_f64; n];
            let mut dist: Vec<Option<usize>> = vec![None; n];
            sigma[s] = 1.0;
            dist[s] = Some(0);
            let mut queue = VecDeque::from([s]);

            while let Some(v) = queue.pop_front() {
                stack.push(v);
                let dv = dist[v].unwrap_or(0);
                for &w in &out[v] {
                    if dist[w].is_none() {
                        dist[w] = Some(dv + 1);
                        queue.push_back(w);
                    }
                    if dist[w] == Some(dv + 1) {
                        sigma[w] += sigma[v];
                        preds[w].push(v);
                    }
                }
            }

            let mut delta = vec![0.0_f64; n];
            while let Some(w) = stack.pop() {
                for &v in &preds[w] {
                    delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
                }
                if w != s {
                    centrality[w] += delta[w];
                }
            }
        }

        if n > 2 {
            let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
            for c in &mut centrality {
                *c *= scale;
            }
        }
        centrality
    }

    /// Mean local clustering coefficient of the undirected projection;
    /// nodes with fewer than two neighbours count as zero.
    #[must_use]
    pub fn average_clustering(&self) -> f64 {
        let n = self.graph.node_count();
        if n == 0 {
            return 0.0;
        }
        let adj = self.undirected();
        let total: f64 = adj
            .iter()
            .map(|row| {
                let k = row.len();
                if k < 2 {
                    return 0.0;
                }
                let neighbours: Vec<usize> = row.keys().copied().collect();
                let mut triangles = 0_usize;
                for (x, &u) in neighbours.iter().enumerate() {
                    for &w in &neighbours[x + 1..] {
                        if adj[u].contains_key(&w) {
                            triangles += 1;
                        }
                    }
                }
                2.0 * triangles as f64 / (k * (k - 1)) as f64
            })
            .sum();
        total / n as f64
    }
}

/// Population standard deviation; `0.0` for fewer than two values.
#[must_use]
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionKind;
    use chrono::Utc;

    fn graph(names: &[&str], edges: &[(&str, &str, f64)]) -> ConceptGraph {
        let now = Utc::now();
        let concepts = names.iter().map(|n| Concept::new(n, 0.1, 0.1, now)).collect();
        let edges = edges
            .iter()
            .map(|(a, b, w)| Connection {
                source: ConceptId::from_name(a),
                target: ConceptId::from_name(b),
                weight: *w,
                kind: ConnectionKind::CoOccurrence,
                reinforcement_count: 0,
                discovered_at: now,
            })
            .collect();
        ConceptGraph::from_parts(concepts, edges)
    }

    fn view(g: &ConceptGraph) -> AnalyticsGraph {
        AnalyticsGraph::build(g, 1000, 20_000)
    }

    fn two_triangles() -> ConceptGraph {
        graph(
            &["a", "b", "c", "x", "y", "z"],
            &[
                ("a", "b", 1.0),
                ("b", "c", 1.0),
                ("a", "c", 1.0),
                ("x", "y", 1.0),
                ("y", "z", 1.0),
                ("x", "z", 1.0),
                ("c", "x", 0.1),
            ],
        )
    }

    #[test]
    fn empty_graph_is_harmless() {
        let g = ConceptGraph::default();
        let v = view(&g);
        assert!(v.pagerank(0.85, 50).expect("pagerank").is_empty());
        assert!(v.communities().expect("communities").is_empty());
        assert!(v.knowledge_clusters(&g, 3).expect("clusters").is_empty());
        assert!(v.betweenness().is_empty());
        assert_eq!(v.average_clustering(), 0.0);
    }

    #[test]
    fn single_node_has_no_clusters() {
        let g = graph(&["alone"], &[]);
        let v = view(&g);
        let pr = v.pagerank(0.85, 50).expect("pagerank");
        assert_eq!(pr.len(), 1);
        assert!((pr[0].1 - 1.0).abs() < 1e-9);
        assert!(v.knowledge_clusters(&g, 3).expect("clusters").is_empty());
    }

    #[test]
    fn pagerank_favours_the_hub() {
        let g = graph(
            &["hub", "s1", "s2", "s3"],
            &[("s1", "hub", 0.5), ("s2", "hub", 0.5), ("s3", "hub", 0.5)],
        );
        let pr = view(&g).pagerank(0.85, 50).expect("pagerank");
        let hub = ConceptId::from_name("hub");
        let top = pr
            .iter()
            .max_by_key(|(_, s)| OrderedFloat(*s))
            .map(|(id, _)| id.clone());
        assert_eq!(top, Some(hub));
        let total: f64 = pr.iter().map(|(_, s)| s).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn bad_damping_is_an_algorithm_error() {
        let g = graph(&["a", "b"], &[("a", "b", 0.5)]);
        assert!(matches!(
            view(&g).pagerank(1.5, 10),
            Err(NousError::GraphAlgorithm(_))
        ));
    }

    #[test]
    fn greedy_modularity_splits_weakly_bridged_triangles() {
        let g = two_triangles();
        let communities = view(&g).communities().expect("communities");
        assert_eq!(communities.len(), 2);
        assert!(communities.iter().all(|c| c.len() == 3));

        let clusters = view(&g).knowledge_clusters(&g, 3).expect("clusters");
        assert_eq!(clusters.len(), 2);
        for cluster in &clusters {
            assert!((cluster.internal_weight - 3.0).abs() < 1e-12);
            assert_eq!(cluster.names.len(), 3);
        }
    }

    #[test]
    fn clique_is_one_community() {
        let g = graph(
            &["a", "b", "c", "d"],
            &[
                ("a", "b", 1.0),
                ("a", "c", 1.0),
                ("a", "d", 1.0),
                ("b", "c", 1.0),
                ("b", "d", 1.0),
                ("c", "d", 1.0),
            ],
        );
        let communities = view(&g).communities().expect("communities");
        assert_eq!(communities.len(), 1);
        assert_eq!(communities[0].len(), 4);
    }

    #[test]
    fn pairs_never_become_clusters() {
        let g = graph(&["a", "b", "c", "d"], &[("a", "b", 1.0), ("c", "d", 1.0)]);
        assert!(view(&g).knowledge_clusters(&g, 1).expect("clusters").is_empty());
    }

    #[test]
    fn betweenness_on_directed_path() {
        let g = graph(&["a", "b", "c"], &[("a", "b", 1.0), ("b", "c", 1.0)]);
        let v = view(&g);
        let bc = v.betweenness();
        let b_ix = v
            .graph
            .node_indices()
            .find(|ix| v.graph[*ix] == ConceptId::from_name("b"))
            .expect("b");
        assert!((bc[b_ix.index()] - 0.5).abs() < 1e-12);
        assert!((bc.iter().sum::<f64>() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn clustering_of_triangle_with_pendant() {
        let g = graph(
            &["a", "b", "c", "d"],
            &[("a", "b", 1.0), ("b", "c", 1.0), ("a", "c", 1.0), ("c", "d", 1.0)],
        );
        let avg = view(&g).average_clustering();
        assert!((avg - (1.0 + 1.0 + 1.0 / 3.0) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn cap_keeps_strongest_nodes_and_heaviest_edges() {
        let mut g = two_triangles();
        let strong = ConceptId::from_name("a");
        if let Some(c) = g.concepts.get_mut(&strong) {
            c.strength = 0.9;
        }
        let v = AnalyticsGraph::build(&g, 1, 0);
        assert!(v.is_truncated());
        assert_eq!(v.node_count(), 1);
        assert_eq!(v.graph[NodeIndex::new(0)], strong);

        let v = AnalyticsGraph::build(&g, 6, 6);
        assert_eq!(v.edge_count(), 6);
        assert_eq!(v.communities().expect("communities").len(), 2);
    }

    #[test]
    fn non_finite_weights_fail_community_detection() {
        let g = graph(&["a", "b", "c"], &[("a", "b", f64::NAN), ("b", "c", 1.0)]);
        assert!(matches!(
            view(&g).communities(),
            Err(NousError::GraphAlgorithm(_))
        ));
    }

    #[test]
    fn std_dev_is_population() {
        assert!((std_dev(&[1.0, 3.0]) - 1.0).abs() < 1e-12);
        assert_eq!(std_dev(&[5.0]), 0.0);
    }
}
