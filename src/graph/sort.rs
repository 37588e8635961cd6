use super::{Graph, GraphError};

/// Consumer-first ordering of the stages of a pipeline.
///
/// Stages must be started in this order so that every consumer is listening
/// before its producer comes up. Data flows the other way: the forwarding
/// chain visits stages in [`StageOrder::forwarding`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOrder(Vec<String>);

impl StageOrder {
    /// Consumers before the producers that feed them
    pub fn startup(&self) -> &[String] {
        &self.0
    }

    /// Producers before the consumers they feed
    pub fn forwarding(&self) -> Vec<String> {
        self.0.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first post-order over the graph.
///
/// Roots are visited in node order and children in insertion order, so the
/// same descriptor list always sorts the same way.
pub fn topo_sort(graph: &Graph) -> Result<StageOrder, GraphError> {
    let mut marks = vec![Mark::Unvisited; graph.len()];
    let mut path = Vec::new();
    let mut order = Vec::with_capacity(graph.len());

    for root in 0..graph.len() {
        if marks[root] == Mark::Unvisited {
            visit(graph, root, &mut marks, &mut path, &mut order)?;
        }
    }

    Ok(StageOrder(
        order
            .into_iter()
            .map(|i| graph.nodes[i].name.clone())
            .collect(),
    ))
}

fn visit(
    graph: &Graph,
    node: usize,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), GraphError> {
    marks[node] = Mark::InProgress;
    path.push(node);

    for &child in graph.nodes[node].children() {
        match marks[child] {
            Mark::Done => {}
            Mark::Unvisited => visit(graph, child, marks, path, order)?,
            Mark::InProgress => {
                // The cycle is the stretch of the current path starting at `child`.
                let start = path.iter().position(|&p| p == child).unwrap_or(0);
                let mut nodes: Vec<String> = path[start..]
                    .iter()
                    .map(|&i| graph.nodes[i].name.clone())
                    .collect();
                nodes.push(graph.nodes[child].name.clone());
                return Err(GraphError::CycleDetected { nodes });
            }
        }
    }

    path.pop();
    marks[node] = Mark::Done;
    order.push(node);
    Ok(())
}
