//! 闭合区域识别
//!
//! 从 DXF 导入的线段/圆弧中找出可作为铺铜边界的闭合环：
//! 1. 在相交处（包括 T 形接头）拆分线段/圆弧，使图保持平面
//! 2. 在容差 ε 内合并端点（并查集 + 网格），每个簇是图的一个节点
//! 3. 拆分后的片段作为无向边；零长度退化边不参与连接
//! 4. 删除桥边（包括悬挂的细丝），它们不可能位于任何环上
//! 5. 按出射切线角度对每个节点的半边排序，沿半边遍历平面图的面
//! 6. 面边界在重复节点处拆分为简单环，只保留逆时针（有界）的环
//!
//! 结果以惰性迭代器 [`Loops`] 返回，面在迭代时才被遍历。

use crate::geometry::Segment;
use crate::math::{BoundingBox2, Point2, EPSILON};
use std::collections::{HashMap, HashSet, VecDeque};
use std::f64::consts::FRAC_PI_2;
use tracing::debug;

/// 环中的一条有向边
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopEdge {
    /// 输入线段的索引；被交点拆开的线段，各片段共用同一索引
    pub segment: usize,
    /// 是否逆着输入方向行进
    pub reversed: bool,
    /// 按行进方向定向后的几何
    pub geometry: Segment,
}

/// 闭合环：首尾相接、逆时针的有向边序列
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    edges: Vec<LoopEdge>,
    area: f64,
}

impl Loop {
    fn new(edges: Vec<LoopEdge>) -> Self {
        let area = edges.iter().map(|e| e.geometry.area_contribution()).sum();
        Self { edges, area }
    }

    pub fn edges(&self) -> &[LoopEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// 组成该环的输入线段索引（按行进顺序）
    pub fn segment_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.edges.iter().map(|e| e.segment)
    }

    /// 对输入子集识别后，把线段索引映射回完整列表
    pub fn map_segments(mut self, f: impl Fn(usize) -> usize) -> Loop {
        for edge in &mut self.edges {
            edge.segment = f(edge.segment);
        }
        self
    }

    /// 与起点和方向无关的标识，用于比较两个环是否相同
    ///
    /// 被交点拆开的线段可能同时出现在多个环中，这些环的标识可能相同。
    pub fn canonical_key(&self) -> Vec<usize> {
        let mut key: Vec<usize> = self.segment_indices().collect();
        key.sort_unstable();
        key
    }

    /// 有符号面积（逆时针为正，圆弧按解析式计算）
    pub fn signed_area(&self) -> f64 {
        self.area
    }

    pub fn area(&self) -> f64 {
        self.area.abs()
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        self.edges
            .iter()
            .fold(BoundingBox2::empty(), |acc, e| acc.union(&e.geometry.bounding_box()))
    }

    /// 离散后的边界多边形（不重复首点）
    pub fn polygon(&self, segments_per_circle: usize) -> Vec<Point2> {
        let mut points = Vec::new();
        for edge in &self.edges {
            let pts = edge.geometry.flatten(segments_per_circle);
            // 每条边的终点即下一条边的起点
            points.extend_from_slice(&pts[..pts.len() - 1]);
        }
        points
    }

    /// 点是否位于环内
    pub fn contains_point(&self, point: &Point2, segments_per_circle: usize) -> bool {
        let bbox = self.bounding_box();
        if !bbox.contains(point) {
            return false;
        }
        // 以包围盒中心为原点转换到 f32，保留精度
        let origin = bbox.center();
        let poly: Vec<parry2d::math::Point<f32>> = self
            .polygon(segments_per_circle)
            .iter()
            .map(|p| parry2d::math::Point::new((p.x - origin.x) as f32, (p.y - origin.y) as f32))
            .collect();
        let pt = parry2d::math::Point::new((point.x - origin.x) as f32, (point.y - origin.y) as f32);
        parry2d::utils::point_in_poly2d(&pt, &poly)
    }

    /// 三角剖分离散后的边界，用于填充显示
    ///
    /// 返回多边形顶点与三角形索引；退化的边界返回 `None`。
    pub fn triangulate(&self, segments_per_circle: usize) -> Option<(Vec<Point2>, Vec<[u32; 3]>)> {
        let polygon = self.polygon(segments_per_circle);
        if polygon.len() < 3 {
            return None;
        }
        let origin = self.bounding_box().center();
        let flat: Vec<f64> = polygon
            .iter()
            .flat_map(|p| [p.x - origin.x, p.y - origin.y])
            .collect();
        let indices = earcutr::earcut(&flat, &[], 2).unwrap_or_default();
        if indices.is_empty() {
            return None;
        }
        let triangles = indices
            .chunks_exact(3)
            .map(|t| [t[0] as u32, t[1] as u32, t[2] as u32])
            .collect();
        Some((polygon, triangles))
    }
}

/// 找出点所在的所有环，按面积从小到大排序
pub fn loops_containing(loops: &[Loop], point: &Point2, segments_per_circle: usize) -> Vec<usize> {
    let mut hits: Vec<usize> = loops
        .iter()
        .enumerate()
        .filter(|(_, l)| l.contains_point(point, segments_per_circle))
        .map(|(i, _)| i)
        .collect();
    hits.sort_by(|&a, &b| loops[a].area().total_cmp(&loops[b].area()));
    hits
}

/// 识别闭合环
///
/// 端点距离 `<= tolerance` 视为相连。返回的迭代器是惰性的；
/// 对相同输入再次调用会得到相同的环。
pub fn assemble(segments: &[Segment], tolerance: f64) -> Loops {
    let graph = PlanarGraph::build(segments, tolerance);
    let half_edge_count = graph.half_edges.len();
    Loops {
        graph,
        visited: vec![false; half_edge_count],
        cursor: 0,
        pending: VecDeque::new(),
        emitted: HashSet::new(),
        min_area: (tolerance * tolerance).max(1e-12),
    }
}

/// 统计容差内但不重合的端点对数量（即被容差“修补”的缺口）
pub fn count_gaps(segments: &[Segment], tolerance: f64) -> usize {
    let endpoints = collect_endpoints(segments);
    let mut grid = EndpointGrid::new(tolerance);
    let mut gaps = 0;
    for (i, (p, owner)) in endpoints.iter().enumerate() {
        for j in grid.neighbors(p) {
            let (q, other) = &endpoints[j];
            if owner == other {
                continue;
            }
            let d = (p - q).norm();
            if d > 0.0 && d <= tolerance {
                gaps += 1;
            }
        }
        grid.insert(p, i);
    }
    gaps
}

/// 惰性的环序列
pub struct Loops {
    graph: PlanarGraph,
    visited: Vec<bool>,
    cursor: usize,
    pending: VecDeque<Loop>,
    emitted: HashSet<Vec<usize>>,
    min_area: f64,
}

impl Iterator for Loops {
    type Item = Loop;

    fn next(&mut self) -> Option<Loop> {
        loop {
            if let Some(l) = self.pending.pop_front() {
                return Some(l);
            }
            let start = self.next_unvisited()?;
            let face = self.walk_face(start);
            for cycle in split_simple_cycles(&face, &self.graph) {
                let candidate = Loop::new(
                    cycle.iter().map(|&h| self.graph.loop_edge(h)).collect(),
                );
                if candidate.signed_area() <= self.min_area {
                    continue;
                }
                // 按图边去重：同一输入线段的不同片段可能分属两个环
                let mut key: Vec<usize> = cycle.iter().map(|&h| h / 2).collect();
                key.sort_unstable();
                if self.emitted.insert(key) {
                    self.pending.push_back(candidate);
                }
            }
        }
    }
}

impl Loops {
    fn next_unvisited(&mut self) -> Option<usize> {
        while self.cursor < self.visited.len() {
            let h = self.cursor;
            self.cursor += 1;
            if self.graph.active[h / 2] && !self.visited[h] {
                return Some(h);
            }
        }
        None
    }

    /// 沿 next 指针走完一个面
    fn walk_face(&mut self, start: usize) -> Vec<usize> {
        let mut face = Vec::new();
        let mut current = start;
        // 面边界最多经过每条半边一次
        for _ in 0..self.visited.len() {
            if self.visited[current] {
                break;
            }
            self.visited[current] = true;
            face.push(current);
            current = self.graph.next[current];
            if current == start {
                return face;
            }
        }
        debug!("Face walk from half-edge {} did not close", start);
        Vec::new()
    }
}

/// 将闭合遍历在重复节点处拆分为简单环
fn split_simple_cycles(face: &[usize], graph: &PlanarGraph) -> Vec<Vec<usize>> {
    let mut cycles = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut position: HashMap<usize, usize> = HashMap::new();

    for &h in face {
        let node = graph.origin(h);
        if let Some(&pos) = position.get(&node) {
            // 从上一次出现处到此为止构成一个简单环
            let cycle: Vec<usize> = stack.drain(pos..).collect();
            for &c in &cycle {
                position.remove(&graph.origin(c));
            }
            cycles.push(cycle);
        }
        position.insert(node, stack.len());
        stack.push(h);
    }
    if !stack.is_empty() {
        cycles.push(stack);
    }
    cycles
}

/// 在相交处（包括 T 形接头）拆分图元
///
/// 返回 `(输入索引, 片段)`。距端点不超过容差的交点不拆分，
/// 由端点合并处理。
fn split_at_crossings(segments: &[Segment], tolerance: f64) -> Vec<(usize, Segment)> {
    let slack = tolerance.max(EPSILON);
    let boxes: Vec<BoundingBox2> = segments.iter().map(|s| s.bounding_box()).collect();

    // 按包围盒左边界扫描，只检查 x 区间重叠的图元对
    let mut order: Vec<usize> = (0..segments.len())
        .filter(|&i| segments[i].length().is_finite() && segments[i].length() > EPSILON)
        .collect();
    order.sort_by(|&a, &b| boxes[a].min.x.total_cmp(&boxes[b].min.x));

    let mut cuts: Vec<Vec<f64>> = vec![Vec::new(); segments.len()];
    for (k, &i) in order.iter().enumerate() {
        for &j in &order[k + 1..] {
            if boxes[j].min.x > boxes[i].max.x + slack {
                break;
            }
            if boxes[j].min.y > boxes[i].max.y + slack || boxes[i].min.y > boxes[j].max.y + slack {
                continue;
            }
            for p in segments[i].intersections(&segments[j], slack) {
                cuts[i].push(segments[i].fraction_at(&p));
                cuts[j].push(segments[j].fraction_at(&p));
            }
        }
    }

    let mut pieces = Vec::with_capacity(segments.len());
    let mut split = 0;
    for (i, segment) in segments.iter().enumerate() {
        let length = segment.length();
        let mut fractions: Vec<f64> = cuts[i]
            .iter()
            .copied()
            .filter(|f| f * length > slack && (1.0 - f) * length > slack)
            .collect();
        fractions.sort_by(f64::total_cmp);
        fractions.dedup_by(|later, kept| (*later - *kept) * length <= slack);

        if fractions.is_empty() {
            pieces.push((i, *segment));
        } else {
            split += 1;
            pieces.extend(segment.split_at(&fractions).into_iter().map(|s| (i, s)));
        }
    }
    if split > 0 {
        debug!("Split {} segments at crossings into {} pieces", split, pieces.len());
    }
    pieces
}

/// 端点：位置与所属线段
fn collect_endpoints(segments: &[Segment]) -> Vec<(Point2, usize)> {
    segments
        .iter()
        .enumerate()
        .flat_map(|(i, s)| [(s.start_point(), i), (s.end_point(), i)])
        .collect()
}

/// 以容差为单元大小的网格，用于邻近端点查询
struct EndpointGrid {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl EndpointGrid {
    fn new(tolerance: f64) -> Self {
        Self {
            cell_size: tolerance.max(EPSILON),
            cells: HashMap::new(),
        }
    }

    fn to_grid_coord(&self, p: &Point2) -> (i64, i64) {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
        )
    }

    fn insert(&mut self, p: &Point2, id: usize) {
        let cell = self.to_grid_coord(p);
        self.cells.entry(cell).or_default().push(id);
    }

    /// 周围 3x3 单元内已插入的端点
    fn neighbors(&self, p: &Point2) -> Vec<usize> {
        let (gx, gy) = self.to_grid_coord(p);
        let mut result = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                let key = (gx.saturating_add(dx), gy.saturating_add(dy));
                if let Some(ids) = self.cells.get(&key) {
                    result.extend_from_slice(ids);
                }
            }
        }
        result
    }
}

/// 并查集
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// 一条无向边，对应输入线段的一个片段
#[derive(Debug, Clone, Copy)]
struct GraphEdge {
    segment: usize,
    from: usize,
    to: usize,
}

/// 半边结构的平面图
///
/// 边 `e` 对应两条半边：`2e` 沿输入方向，`2e + 1` 逆向；孪生半边为 `h ^ 1`。
struct PlanarGraph {
    edges: Vec<GraphEdge>,
    /// 按行进方向定向后的几何
    half_edges: Vec<Segment>,
    /// 边是否仍在图中（桥边被移除）
    active: Vec<bool>,
    /// 面遍历中的后继半边
    next: Vec<usize>,
}

impl PlanarGraph {
    fn build(segments: &[Segment], tolerance: f64) -> Self {
        let (sources, pieces): (Vec<usize>, Vec<Segment>) =
            split_at_crossings(segments, tolerance).into_iter().unzip();
        let (node_of, node_count) = cluster_endpoints(&pieces, tolerance);

        let mut edges = Vec::new();
        let mut half_edges = Vec::new();
        let mut degenerate = 0;
        for (k, segment) in pieces.iter().enumerate() {
            let from = node_of[2 * k];
            let to = node_of[2 * k + 1];
            let is_degenerate = !segment.length().is_finite()
                || segment.length() <= EPSILON
                || (from == to
                    && match segment {
                        Segment::Line(_) => true,
                        Segment::Arc(a) => a.length() <= tolerance,
                    });
            if is_degenerate {
                degenerate += 1;
                continue;
            }
            edges.push(GraphEdge {
                segment: sources[k],
                from,
                to,
            });
            half_edges.extend([*segment, segment.reversed()]);
        }

        let mut graph = Self {
            active: vec![true; edges.len()],
            next: (0..half_edges.len()).collect(),
            edges,
            half_edges,
        };

        let bridges = graph.remove_bridges(node_count);
        graph.link_half_edges(node_count);

        debug!(
            "Planar graph: {} nodes, {} edges, {} degenerate, {} bridges removed",
            node_count,
            graph.edges.len(),
            degenerate,
            bridges
        );
        graph
    }

    fn origin(&self, h: usize) -> usize {
        let e = &self.edges[h / 2];
        if h % 2 == 0 {
            e.from
        } else {
            e.to
        }
    }

    fn loop_edge(&self, h: usize) -> LoopEdge {
        LoopEdge {
            segment: self.edges[h / 2].segment,
            reversed: h % 2 == 1,
            geometry: self.half_edges[h],
        }
    }

    /// 每个节点的出射半边
    fn outgoing(&self, node_count: usize) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); node_count];
        for (e, edge) in self.edges.iter().enumerate() {
            if !self.active[e] {
                continue;
            }
            out[edge.from].push(2 * e);
            out[edge.to].push(2 * e + 1);
        }
        out
    }

    /// 移除所有桥边（Tarjan low-link，迭代实现）
    ///
    /// 悬挂细丝也是桥边，因此开放的链不会进入任何环。
    fn remove_bridges(&mut self, node_count: usize) -> usize {
        let out = self.outgoing(node_count);
        let mut disc = vec![usize::MAX; node_count];
        let mut low = vec![0usize; node_count];
        let mut timer = 0;
        let mut bridges = Vec::new();

        for root in 0..node_count {
            if disc[root] != usize::MAX {
                continue;
            }
            disc[root] = timer;
            low[root] = timer;
            timer += 1;
            // (节点, 进入该节点的边, 下一个待处理的出射半边位置)
            let mut stack: Vec<(usize, Option<usize>, usize)> = vec![(root, None, 0)];

            while let Some(frame) = stack.last_mut() {
                let (node, parent_edge, cursor) = *frame;
                if cursor < out[node].len() {
                    frame.2 += 1;
                    let h = out[node][cursor];
                    let e = h / 2;
                    if Some(e) == parent_edge {
                        continue;
                    }
                    let target = self.origin(h ^ 1);
                    if disc[target] == usize::MAX {
                        disc[target] = timer;
                        low[target] = timer;
                        timer += 1;
                        stack.push((target, Some(e), 0));
                    } else {
                        low[node] = low[node].min(disc[target]);
                    }
                } else {
                    stack.pop();
                    if let (Some(e), Some(parent)) = (parent_edge, stack.last()) {
                        let p = parent.0;
                        low[p] = low[p].min(low[node]);
                        if low[node] > disc[p] {
                            bridges.push(e);
                        }
                    }
                }
            }
        }

        for &e in &bridges {
            self.active[e] = false;
        }
        bridges.len()
    }

    /// 按出射切线角度排序，设置面遍历的后继半边
    ///
    /// 到达节点后取从回头方向顺时针的第一条出射半边，使有界面为逆时针。
    fn link_half_edges(&mut self, node_count: usize) {
        let out = self.outgoing(node_count);
        for mut around in out {
            if around.is_empty() {
                continue;
            }
            around.sort_by(|&a, &b| {
                let (ka, kb) = (self.departure_key(a), self.departure_key(b));
                ka.0.cmp(&kb.0)
                    .then(ka.1.total_cmp(&kb.1))
                    .then(ka.2.cmp(&kb.2))
            });
            let n = around.len();
            for i in 0..n {
                let incoming = around[i] ^ 1;
                self.next[incoming] = around[(i + n - 1) % n];
            }
        }
    }

    /// 排序键：量化后的切线角度、有符号曲率、重合边的次序
    ///
    /// 完全重合的边按边号排序；朝向左半平面时取反，
    /// 使两端节点上的次序互为镜像，保持平面嵌入一致。
    fn departure_key(&self, h: usize) -> (i64, f64, i64) {
        let segment = &self.half_edges[h];
        let t = segment.tangent_at_start();
        let angle = quantize_angle(t.y.atan2(t.x));
        let edge = (h / 2) as i64;
        let rank = if angle > quantize_angle(-FRAC_PI_2) && angle <= quantize_angle(FRAC_PI_2) {
            edge
        } else {
            -edge
        };
        (angle, segment.curvature(), rank)
    }
}

fn quantize_angle(angle: f64) -> i64 {
    (angle * 1e9).round() as i64
}

/// 在容差内合并端点，返回每个端点的节点编号与节点数
pub(crate) fn cluster_endpoints(segments: &[Segment], tolerance: f64) -> (Vec<usize>, usize) {
    let endpoints = collect_endpoints(segments);
    let mut uf = UnionFind::new(endpoints.len());
    let mut grid = EndpointGrid::new(tolerance);

    for (i, (p, _)) in endpoints.iter().enumerate() {
        for j in grid.neighbors(p) {
            if (p - endpoints[j].0).norm() <= tolerance {
                uf.union(i, j);
            }
        }
        grid.insert(p, i);
    }

    let mut ids: HashMap<usize, usize> = HashMap::new();
    let mut node_of = Vec::with_capacity(endpoints.len());
    for i in 0..endpoints.len() {
        let root = uf.find(i);
        let next_id = ids.len();
        node_of.push(*ids.entry(root).or_insert(next_id));
    }
    (node_of, ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Arc, Line};
    use std::f64::consts::PI;

    fn line(x1: f64, y1: f64, x2: f64, y2: f64) -> Segment {
        Segment::Line(Line::new(Point2::new(x1, y1), Point2::new(x2, y2)))
    }

    fn unit_square() -> Vec<Segment> {
        vec![
            line(0.0, 0.0, 1.0, 0.0),
            line(1.0, 0.0, 1.0, 1.0),
            line(1.0, 1.0, 0.0, 1.0),
            line(0.0, 1.0, 0.0, 0.0),
        ]
    }

    fn keys(loops: impl Iterator<Item = Loop>) -> HashSet<Vec<usize>> {
        loops.map(|l| l.canonical_key()).collect()
    }

    fn permutations(n: usize) -> Vec<Vec<usize>> {
        if n == 0 {
            return vec![vec![]];
        }
        let mut result = Vec::new();
        for p in permutations(n - 1) {
            for pos in 0..=p.len() {
                let mut q = p.clone();
                q.insert(pos, n - 1);
                result.push(q);
            }
        }
        result
    }

    #[test]
    fn test_unit_square_single_loop() {
        let loops: Vec<Loop> = assemble(&unit_square(), 1e-6).collect();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 4);
        assert!((loops[0].signed_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_square_any_order_and_direction() {
        let square = unit_square();
        for perm in permutations(4) {
            for flips in 0..16u32 {
                let segments: Vec<Segment> = perm
                    .iter()
                    .enumerate()
                    .map(|(k, &i)| {
                        if flips & (1 << k) != 0 {
                            square[i].reversed()
                        } else {
                            square[i]
                        }
                    })
                    .collect();
                let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
                assert_eq!(loops.len(), 1, "perm {:?} flips {}", perm, flips);
                assert_eq!(loops[0].canonical_key(), vec![0, 1, 2, 3]);
            }
        }
    }

    #[test]
    fn test_open_u_has_no_loop() {
        let segments = vec![
            line(0.0, 1.0, 0.0, 0.0),
            line(0.0, 0.0, 1.0, 0.0),
            line(1.0, 0.0, 1.0, 1.0),
        ];
        assert_eq!(assemble(&segments, 1e-6).count(), 0);
    }

    #[test]
    fn test_square_with_diagonal_gives_two_triangles() {
        let mut segments = unit_square();
        segments.push(line(0.0, 0.0, 1.0, 1.0));
        let found = keys(assemble(&segments, 1e-6));
        let expected: HashSet<Vec<usize>> = [vec![0, 1, 4], vec![2, 3, 4]].into_iter().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_crossing_edges_bowtie() {
        // 首尾相接但两条边在 (1, 2/3) 处交叉
        let segments = vec![
            line(0.0, 0.0, 3.0, 2.0),
            line(3.0, 2.0, 3.0, 0.0),
            line(3.0, 0.0, 0.0, 1.0),
            line(0.0, 1.0, 0.0, 0.0),
        ];
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        assert_eq!(loops.len(), 2);
        assert!(loops.iter().all(|l| l.len() == 3 && l.signed_area() > 0.0));

        let found = keys(loops.iter().cloned());
        let expected: HashSet<Vec<usize>> = [vec![0, 2, 3], vec![0, 1, 2]].into_iter().collect();
        assert_eq!(found, expected);

        let mut areas: Vec<f64> = loops.iter().map(|l| l.area()).collect();
        areas.sort_by(f64::total_cmp);
        assert!((areas[0] - 0.5).abs() < 1e-9);
        assert!((areas[1] - 2.0).abs() < 1e-9);

        // 交点是两个环共有的顶点
        let crossing = Point2::new(1.0, 2.0 / 3.0);
        for l in &loops {
            assert!(l.edges().iter().any(|e| (e.geometry.end_point() - crossing).norm() < 1e-9));
        }
    }

    #[test]
    fn test_crossing_edges_square_diagonals() {
        let mut segments = unit_square();
        segments.push(line(0.0, 0.0, 1.0, 1.0));
        segments.push(line(1.0, 0.0, 0.0, 1.0));
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        assert_eq!(loops.len(), 4);
        assert!(loops.iter().all(|l| (l.area() - 0.25).abs() < 1e-9));

        let found = keys(loops.into_iter());
        let expected: HashSet<Vec<usize>> =
            [vec![0, 4, 5], vec![1, 4, 5], vec![2, 4, 5], vec![3, 4, 5]].into_iter().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_crossing_edges_circle_cut_by_line() {
        // 直线穿过整圆，两端伸出圆外的部分是细丝
        let segments = vec![
            Segment::Arc(Arc::full_circle(Point2::origin(), 1.0)),
            line(-2.0, 0.0, 2.0, 0.0),
        ];
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        assert_eq!(loops.len(), 2);
        for l in &loops {
            assert_eq!(l.canonical_key(), vec![0, 1]);
            assert!((l.signed_area() - PI / 2.0).abs() < 1e-9);
        }
        let hits = loops_containing(&loops, &Point2::new(0.0, 0.5), 72);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_t_junction_splits_edge() {
        // 竖线的下端落在底边中部，把方形分成左右两半
        let mut segments = unit_square();
        segments.push(line(0.5, 1.0, 0.5, 0.0));
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        assert_eq!(loops.len(), 2);
        assert!(loops.iter().all(|l| (l.area() - 0.5).abs() < 1e-9));
    }

    #[test]
    fn test_tolerance_boundary_inclusive() {
        // 最后一条边距起点恰好 0.25
        let mut segments = unit_square();
        segments[3] = line(0.0, 1.0, 0.0, 0.25);
        assert_eq!(assemble(&segments, 0.25).count(), 1);

        // 再远 1/1024 就断开
        segments[3] = line(0.0, 1.0, 0.0, 0.25 + 1.0 / 1024.0);
        assert_eq!(assemble(&segments, 0.25).count(), 0);
    }

    #[test]
    fn test_idempotent() {
        let mut segments = unit_square();
        segments.push(line(0.0, 0.0, 1.0, 1.0));
        segments.push(line(2.0, 0.0, 3.0, 0.0));
        segments.push(Segment::Arc(Arc::full_circle(Point2::new(5.0, 5.0), 1.0)));
        let first = keys(assemble(&segments, 1e-6));
        let second = keys(assemble(&segments, 1e-6));
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_circle_is_single_loop() {
        let segments = vec![Segment::Arc(Arc::full_circle(Point2::new(1.0, 2.0), 3.0))];
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 1);
        assert!((loops[0].area() - 9.0 * PI).abs() < 1e-9);
    }

    #[test]
    fn test_two_half_arcs_form_circle() {
        let c = Point2::origin();
        let segments = vec![
            Segment::Arc(Arc::new(c, 1.0, 0.0, PI)),
            Segment::Arc(Arc::new(c, 1.0, PI, PI)),
        ];
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 2);
        assert!((loops[0].signed_area() - PI).abs() < 1e-9);
    }

    #[test]
    fn test_slot_of_lines_and_arcs() {
        // 两条直线 + 两个半圆组成的长圆孔
        let segments = vec![
            line(0.0, 0.0, 4.0, 0.0),
            Segment::Arc(Arc::new(Point2::new(4.0, 1.0), 1.0, -PI / 2.0, PI)),
            line(4.0, 2.0, 0.0, 2.0),
            Segment::Arc(Arc::new(Point2::new(0.0, 1.0), 1.0, PI / 2.0, PI)),
        ];
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        assert_eq!(loops.len(), 1);
        assert!((loops[0].area() - (8.0 + PI)).abs() < 1e-9);
    }

    #[test]
    fn test_filament_is_ignored() {
        let mut segments = unit_square();
        segments.push(line(0.0, 0.0, 0.5, 0.5));
        segments.push(line(1.0, 1.0, 2.0, 2.0));
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].canonical_key(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_dumbbell_bridge_removed() {
        let mut segments = unit_square();
        segments.push(line(1.0, 0.5, 2.0, 0.5));
        segments.extend([
            line(2.0, 0.0, 3.0, 0.0),
            line(3.0, 0.0, 3.0, 1.0),
            line(3.0, 1.0, 2.0, 1.0),
            line(2.0, 1.0, 2.0, 0.5),
            line(2.0, 0.5, 2.0, 0.0),
        ]);
        // 左方形的右边拆成两段以连接桥
        segments[1] = line(1.0, 0.0, 1.0, 0.5);
        segments.push(line(1.0, 0.5, 1.0, 1.0));
        let found = keys(assemble(&segments, 1e-6));
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|k| !k.contains(&4)));
    }

    #[test]
    fn test_figure_eight_reports_both_lobes() {
        let segments = vec![
            line(0.0, 0.0, 1.0, 1.0),
            line(1.0, 1.0, 0.0, 2.0),
            line(0.0, 2.0, 0.0, 0.0),
            line(1.0, 1.0, 2.0, 0.0),
            line(2.0, 0.0, 2.0, 2.0),
            line(2.0, 2.0, 1.0, 1.0),
        ];
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        assert_eq!(loops.len(), 2);
        assert!(loops.iter().all(|l| l.len() == 3));
    }

    #[test]
    fn test_touching_pocket_keeps_outer_boundary() {
        // 大三角形内部有一个在顶点处相切的小三角形
        let segments = vec![
            line(0.0, 0.0, 10.0, 0.0),
            line(10.0, 0.0, 0.0, 10.0),
            line(0.0, 10.0, 0.0, 0.0),
            line(0.0, 0.0, 3.0, 1.0),
            line(3.0, 1.0, 1.0, 3.0),
            line(1.0, 3.0, 0.0, 0.0),
        ];
        let found = keys(assemble(&segments, 1e-6));
        let expected: HashSet<Vec<usize>> = [vec![0, 1, 2], vec![3, 4, 5]].into_iter().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_nested_disconnected_loops() {
        let mut segments = unit_square();
        segments.push(Segment::Arc(Arc::full_circle(Point2::new(0.5, 0.5), 0.2)));
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        assert_eq!(loops.len(), 2);
        let hits = loops_containing(&loops, &Point2::new(0.5, 0.5), 36);
        assert_eq!(hits.len(), 2);
        // 小环排在前面
        assert_eq!(loops[hits[0]].len(), 1);
        let hits = loops_containing(&loops, &Point2::new(0.1, 0.1), 36);
        assert_eq!(hits.len(), 1);
        assert_eq!(loops[hits[0]].len(), 4);
    }

    #[test]
    fn test_degenerate_segments_excluded() {
        let mut segments = unit_square();
        segments.push(line(0.5, 0.5, 0.5, 0.5));
        segments.push(line(1.0, 1.0, 1.0, 1.0));
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 4);
    }

    #[test]
    fn test_duplicate_edge_makes_no_sliver() {
        let mut segments = unit_square();
        segments.push(line(1.0, 0.0, 0.0, 0.0));
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        assert_eq!(loops.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(assemble(&[], 0.001).count(), 0);
    }

    #[test]
    fn test_count_gaps() {
        let mut segments = unit_square();
        segments[3] = line(0.0, 1.0, 0.0, 0.0005);
        assert_eq!(count_gaps(&segments, 0.001), 1);
        assert_eq!(count_gaps(&unit_square(), 0.001), 0);
    }

    #[test]
    fn test_triangulate_square() {
        let loops: Vec<Loop> = assemble(&unit_square(), 1e-6).collect();
        let (points, triangles) = loops[0].triangulate(36).unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(triangles.len(), 2);
    }

    #[test]
    fn test_triangulate_concave() {
        // L 形，6 个顶点
        let segments = vec![
            line(0.0, 0.0, 2.0, 0.0),
            line(2.0, 0.0, 2.0, 1.0),
            line(2.0, 1.0, 1.0, 1.0),
            line(1.0, 1.0, 1.0, 2.0),
            line(1.0, 2.0, 0.0, 2.0),
            line(0.0, 2.0, 0.0, 0.0),
        ];
        let loops: Vec<Loop> = assemble(&segments, 1e-6).collect();
        let (points, triangles) = loops[0].triangulate(36).unwrap();
        assert_eq!(points.len(), 6);
        assert_eq!(triangles.len(), 4);
        let area: f64 = triangles
            .iter()
            .map(|t| {
                let [a, b, c] = t.map(|i| points[i as usize]);
                ((b - a).perp(&(c - a)) / 2.0).abs()
            })
            .sum();
        assert!((area - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_polygon_closes_on_itself() {
        let loops: Vec<Loop> = assemble(&unit_square(), 1e-6).collect();
        let poly = loops[0].polygon(36);
        assert_eq!(poly.len(), 4);
        assert!(loops[0].contains_point(&Point2::new(0.5, 0.5), 36));
        assert!(!loops[0].contains_point(&Point2::new(1.5, 0.5), 36));
    }
}
