//! 线选模式下的首尾排序

use crate::geometry::Segment;
use crate::region::{cluster_endpoints, LoopEdge};

/// 把选中的线段排成首尾相接的一条链
///
/// 必要时反转线段方向。选中线段不能构成单一路径或单一环时返回 `None`。
pub fn order_chain(segments: &[Segment], indices: &[usize], tolerance: f64) -> Option<Vec<LoopEdge>> {
    if indices.is_empty() {
        return None;
    }
    let selected: Vec<Segment> = indices
        .iter()
        .map(|&i| segments.get(i).copied())
        .collect::<Option<_>>()?;

    let (node_of, node_count) = cluster_endpoints(&selected, tolerance);
    // 半边 2k 从线段 k 的起点出发，2k+1 从终点出发
    let mut incident: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for h in 0..node_of.len() {
        incident[node_of[h]].push(h);
    }
    if incident.iter().any(|around| around.len() > 2) {
        return None;
    }

    let ends: Vec<usize> = (0..node_count).filter(|&n| incident[n].len() == 1).collect();
    let mut node = match ends.len() {
        0 => node_of[0],
        2 => ends[0],
        _ => return None,
    };

    let mut used = vec![false; selected.len()];
    let mut chain = Vec::with_capacity(selected.len());
    while chain.len() < selected.len() {
        let h = incident[node].iter().copied().find(|&h| !used[h / 2])?;
        let k = h / 2;
        used[k] = true;
        let reversed = h % 2 == 1;
        chain.push(LoopEdge {
            segment: indices[k],
            reversed,
            geometry: if reversed {
                selected[k].reversed()
            } else {
                selected[k]
            },
        });
        node = node_of[h ^ 1];
    }
    Some(chain)
}
