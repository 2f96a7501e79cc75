use std::ops::Range;

use serde::Serialize;
use snafu::prelude::*;

use super::error::{
    AcquisitionError, EmptyJobListSnafu, InvalidNodeCountSnafu, NodeIndexOutOfRangeSnafu,
};

/// The contiguous slice of the global job list assigned to one node.
///
/// Every node gets `floor(jobs / total_nodes)` jobs; the remainder at the end
/// of the list is not assigned to any node and is reported as `dropped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeBlock {
    /// Zero-based node index.
    pub node_index: usize,
    /// Number of nodes sharing the job list.
    pub total_nodes: usize,
    /// Jobs per node.
    pub block_size: usize,
    /// Indices into the global job list owned by this node.
    pub range: Range<usize>,
    /// Trailing jobs assigned to no node.
    pub dropped: usize,
}

impl NodeBlock {
    /// This node's share of `jobs`.
    pub fn slice<'a, T>(&self, jobs: &'a [T]) -> &'a [T] {
        jobs.get(self.range.clone()).unwrap_or(&[])
    }
}

/// Compute the block owned by `node_index` out of `total_nodes` for
/// `job_count` jobs.
///
/// # Errors
///
/// - [`AcquisitionError::EmptyJobList`] when `job_count` is zero.
/// - [`AcquisitionError::InvalidNodeCount`] when `total_nodes` is zero or
///   exceeds `job_count`.
/// - [`AcquisitionError::NodeIndexOutOfRange`] when `node_index >= total_nodes`.
pub fn partition(
    job_count: usize,
    total_nodes: usize,
    node_index: usize,
) -> Result<NodeBlock, AcquisitionError> {
    ensure!(job_count > 0, EmptyJobListSnafu);
    ensure!(
        total_nodes > 0 && total_nodes <= job_count,
        InvalidNodeCountSnafu {
            total_nodes,
            jobs: job_count,
        }
    );
    ensure!(
        node_index < total_nodes,
        NodeIndexOutOfRangeSnafu {
            node_index,
            total_nodes,
        }
    );

    let block_size = job_count / total_nodes;
    let start = node_index * block_size;
    Ok(NodeBlock {
        node_index,
        total_nodes,
        block_size,
        range: start..start + block_size,
        dropped: job_count - block_size * total_nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn ten_jobs_over_three_nodes() {
        let jobs: Vec<usize> = (0..10).collect();
        let blocks: Vec<NodeBlock> = (0..3).map(|i| partition(10, 3, i).unwrap()).collect();

        assert_eq!(blocks[0].slice(&jobs), &[0, 1, 2]);
        assert_eq!(blocks[1].slice(&jobs), &[3, 4, 5]);
        assert_eq!(blocks[2].slice(&jobs), &[6, 7, 8]);
        assert!(blocks.iter().all(|b| b.block_size == 3 && b.dropped == 1));
    }

    #[test]
    fn blocks_are_disjoint_and_cover_the_prefix() {
        for (jobs, nodes) in [(7usize, 7usize), (100, 7), (13, 1), (5, 2)] {
            let mut owned: Vec<usize> = (0..nodes)
                .flat_map(|i| partition(jobs, nodes, i).unwrap().range)
                .collect();
            owned.sort_unstable();
            let block = jobs / nodes;
            assert_eq!(owned, (0..block * nodes).collect::<Vec<_>>());
        }
    }

    #[test]
    fn invalid_parameters_are_config_errors() {
        for (jobs, nodes, index) in [(10, 11, 0), (10, 0, 0), (10, 3, 3), (0, 1, 0)] {
            let err = partition(jobs, nodes, index).unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Config, "{err}");
        }
        assert!(matches!(
            partition(0, 1, 0),
            Err(AcquisitionError::EmptyJobList)
        ));
    }
}
