//! 几何图元定义
//!
//! 闭合区域识别只关心两类基本图元：
//! - 线段 (Line)
//! - 圆弧 (Arc)，整圆视为扫角为 2π 的圆弧
//!
//! 多段线 (Polyline) 在导入时通过 [`Polyline::explode`] 拆成线段和圆弧。

use crate::math::{normalize_angle, BoundingBox2, Point2, Vector2, EPSILON};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// 线段或圆弧
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Segment {
    Line(Line),
    Arc(Arc),
}

impl Segment {
    pub fn type_name(&self) -> &'static str {
        match self {
            Segment::Line(_) => "Line",
            Segment::Arc(a) if a.is_full_circle() => "Circle",
            Segment::Arc(_) => "Arc",
        }
    }

    pub fn start_point(&self) -> Point2 {
        match self {
            Segment::Line(l) => l.start,
            Segment::Arc(a) => a.start_point(),
        }
    }

    pub fn end_point(&self) -> Point2 {
        match self {
            Segment::Line(l) => l.end,
            Segment::Arc(a) => a.end_point(),
        }
    }

    /// 曲线中点（圆弧取扫角一半处）
    pub fn midpoint(&self) -> Point2 {
        match self {
            Segment::Line(l) => l.midpoint(),
            Segment::Arc(a) => a.mid_point(),
        }
    }

    pub fn length(&self) -> f64 {
        match self {
            Segment::Line(l) => l.length(),
            Segment::Arc(a) => a.length(),
        }
    }

    /// 反向后的图元（起点与终点互换）
    pub fn reversed(&self) -> Segment {
        match self {
            Segment::Line(l) => Segment::Line(Line::new(l.end, l.start)),
            Segment::Arc(a) => Segment::Arc(a.reversed()),
        }
    }

    /// 起点处沿行进方向的单位切向量
    pub fn tangent_at_start(&self) -> Vector2 {
        match self {
            Segment::Line(l) => l.direction(),
            Segment::Arc(a) => a.tangent_at_start(),
        }
    }

    /// 终点处沿行进方向的单位切向量
    pub fn tangent_at_end(&self) -> Vector2 {
        match self {
            Segment::Line(l) => l.direction(),
            Segment::Arc(a) => a.tangent_at_end(),
        }
    }

    /// 有符号曲率，左转（逆时针）为正
    pub fn curvature(&self) -> f64 {
        match self {
            Segment::Line(_) => 0.0,
            Segment::Arc(a) => a.curvature(),
        }
    }

    pub fn distance_to_point(&self, point: &Point2) -> f64 {
        match self {
            Segment::Line(l) => l.distance_to_point(point),
            Segment::Arc(a) => a.distance_to_point(point),
        }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        match self {
            Segment::Line(l) => l.bounding_box(),
            Segment::Arc(a) => a.bounding_box(),
        }
    }

    /// 离散为折线点，包含首尾两点
    pub fn flatten(&self, segments_per_circle: usize) -> Vec<Point2> {
        match self {
            Segment::Line(l) => vec![l.start, l.end],
            Segment::Arc(a) => a.flatten(segments_per_circle),
        }
    }

    /// 沿行进方向的面积积分贡献 ∮(x dy - y dx) / 2
    ///
    /// 圆弧部分按解析式计算，不依赖离散精度。
    pub fn area_contribution(&self) -> f64 {
        match self {
            Segment::Line(l) => (l.start.x * l.end.y - l.end.x * l.start.y) / 2.0,
            Segment::Arc(a) => {
                let t1 = a.start_angle;
                let t2 = a.end_angle();
                let r = a.radius;
                let c = a.center;
                0.5 * (r * r * a.sweep
                    + r * c.x * (t2.sin() - t1.sin())
                    - r * c.y * (t2.cos() - t1.cos()))
            }
        }
    }

    /// 与另一图元的交点
    ///
    /// 交点到两个图元的距离都不超过 `slack`，因此端点落在另一图元上的
    /// T 形接头也会被找到。平行或重合的部分不产生交点。
    pub fn intersections(&self, other: &Segment, slack: f64) -> Vec<Point2> {
        let candidates = match (self, other) {
            (Segment::Line(l1), Segment::Line(l2)) => {
                line_line_intersection(l1, l2).into_iter().collect()
            }
            (Segment::Line(line), Segment::Arc(arc)) | (Segment::Arc(arc), Segment::Line(line)) => {
                line_circle_intersection(line, &arc.center, arc.radius)
            }
            (Segment::Arc(a1), Segment::Arc(a2)) => {
                circle_circle_intersection(&a1.center, a1.radius, &a2.center, a2.radius)
            }
        };

        candidates
            .into_iter()
            .filter(|p| self.distance_to_point(p) <= slack && other.distance_to_point(p) <= slack)
            .collect()
    }

    /// 点在图元上的位置：沿行进方向的长度比例，起点为 0、终点为 1
    ///
    /// 点应位于图元上或其附近；超出端点的点得到 [0, 1] 以外的值。
    pub fn fraction_at(&self, point: &Point2) -> f64 {
        match self {
            Segment::Line(l) => {
                let d = l.end - l.start;
                let len2 = d.norm_squared();
                if len2 < EPSILON * EPSILON {
                    return 0.0;
                }
                (point - l.start).dot(&d) / len2
            }
            Segment::Arc(a) => {
                if a.sweep.abs() < EPSILON {
                    return 0.0;
                }
                let angle = (point.y - a.center.y).atan2(point.x - a.center.x);
                let offset = if a.sweep >= 0.0 {
                    normalize_angle(angle - a.start_angle)
                } else {
                    normalize_angle(a.start_angle - angle)
                };
                offset / a.sweep.abs()
            }
        }
    }

    /// 在给定比例处拆分，比例须严格递增且位于 (0, 1) 内
    pub fn split_at(&self, fractions: &[f64]) -> Vec<Segment> {
        let mut bounds = Vec::with_capacity(fractions.len() + 2);
        bounds.push(0.0);
        bounds.extend_from_slice(fractions);
        bounds.push(1.0);

        bounds
            .windows(2)
            .map(|w| match self {
                Segment::Line(l) => {
                    let d = l.end - l.start;
                    let end = if w[1] >= 1.0 { l.end } else { l.start + d * w[1] };
                    Segment::Line(Line::new(l.start + d * w[0], end))
                }
                Segment::Arc(a) => Segment::Arc(Arc::new(
                    a.center,
                    a.radius,
                    a.start_angle + a.sweep * w[0],
                    a.sweep * (w[1] - w[0]),
                )),
            })
            .collect()
    }
}

/// 两条直线（无限延长）的交点
fn line_line_intersection(l1: &Line, l2: &Line) -> Option<Point2> {
    let d1 = l1.end - l1.start;
    let d2 = l2.end - l2.start;

    let cross = d1.x * d2.y - d1.y * d2.x;

    // 平行
    if cross.abs() <= EPSILON * d1.norm() * d2.norm() {
        return None;
    }

    let d = l2.start - l1.start;
    let t = (d.x * d2.y - d.y * d2.x) / cross;
    Some(l1.start + d1 * t)
}

/// 直线（无限延长）与圆的交点
fn line_circle_intersection(line: &Line, center: &Point2, radius: f64) -> Vec<Point2> {
    let d = line.end - line.start;
    let f = line.start - center;

    let a = d.dot(&d);
    if a < EPSILON * EPSILON {
        return vec![];
    }
    let b = 2.0 * f.dot(&d);
    let c = f.dot(&f) - radius * radius;

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return vec![];
    }

    if discriminant.abs() < EPSILON {
        // 相切
        let t = -b / (2.0 * a);
        vec![line.start + d * t]
    } else {
        let sqrt_disc = discriminant.sqrt();
        let t1 = (-b - sqrt_disc) / (2.0 * a);
        let t2 = (-b + sqrt_disc) / (2.0 * a);
        vec![line.start + d * t1, line.start + d * t2]
    }
}

/// 两圆的交点；同心圆不计
fn circle_circle_intersection(c1: &Point2, r1: f64, c2: &Point2, r2: f64) -> Vec<Point2> {
    let d = (c2 - c1).norm();

    if d > r1 + r2 || d < (r1 - r2).abs() || d < EPSILON {
        return vec![];
    }

    let a = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
    let h = (r1 * r1 - a * a).max(0.0).sqrt();

    let dir = (c2 - c1) / d;
    let p = c1 + dir * a;
    let perp = Vector2::new(-dir.y, dir.x);

    if h < EPSILON {
        vec![p]
    } else {
        vec![p + perp * h, p - perp * h]
    }
}

/// 线段
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Point2,
    pub end: Point2,
}

impl Line {
    pub fn new(start: Point2, end: Point2) -> Self {
        Self { start, end }
    }

    /// 计算线段长度
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// 计算线段方向向量（单位向量），零长度线段返回零向量
    pub fn direction(&self) -> Vector2 {
        let v = self.end - self.start;
        let len = v.norm();
        if len < EPSILON {
            Vector2::zeros()
        } else {
            v / len
        }
    }

    /// 计算线段中点
    pub fn midpoint(&self) -> Point2 {
        Point2::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }

    /// 计算点到线段的距离
    pub fn distance_to_point(&self, point: &Point2) -> f64 {
        let v = self.end - self.start;
        let w = point - self.start;

        let c1 = w.dot(&v);
        if c1 <= 0.0 {
            return (point - self.start).norm();
        }

        let c2 = v.dot(&v);
        if c2 <= c1 {
            return (point - self.end).norm();
        }

        let b = c1 / c2;
        let pb = self.start + v * b;
        (point - pb).norm()
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        BoundingBox2::from_points([self.start, self.end])
    }
}

/// 圆弧
///
/// `sweep` 为有符号扫角：正值逆时针，负值顺时针。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub center: Point2,
    pub radius: f64,
    /// 起始角度（弧度）
    pub start_angle: f64,
    /// 扫角（弧度）
    pub sweep: f64,
}

impl Arc {
    pub fn new(center: Point2, radius: f64, start_angle: f64, sweep: f64) -> Self {
        Self {
            center,
            radius,
            start_angle,
            sweep,
        }
    }

    /// DXF 约定：从起始角逆时针到终止角（角度制）
    pub fn from_ccw_degrees(center: Point2, radius: f64, start_deg: f64, end_deg: f64) -> Self {
        let start = start_deg.to_radians();
        let sweep = normalize_angle(end_deg.to_radians() - start);
        Self::new(center, radius, start, sweep)
    }

    /// 整圆
    pub fn full_circle(center: Point2, radius: f64) -> Self {
        Self::new(center, radius, 0.0, TAU)
    }

    pub fn is_full_circle(&self) -> bool {
        self.sweep.abs() >= TAU - EPSILON
    }

    pub fn end_angle(&self) -> f64 {
        self.start_angle + self.sweep
    }

    /// 计算弧长
    pub fn length(&self) -> f64 {
        self.sweep.abs() * self.radius
    }

    /// 获取圆上指定角度的点
    pub fn point_at_angle(&self, angle: f64) -> Point2 {
        Point2::new(
            self.center.x + self.radius * angle.cos(),
            self.center.y + self.radius * angle.sin(),
        )
    }

    pub fn start_point(&self) -> Point2 {
        self.point_at_angle(self.start_angle)
    }

    pub fn end_point(&self) -> Point2 {
        self.point_at_angle(self.end_angle())
    }

    pub fn mid_point(&self) -> Point2 {
        self.point_at_angle(self.start_angle + self.sweep / 2.0)
    }

    pub fn reversed(&self) -> Arc {
        Arc::new(self.center, self.radius, self.end_angle(), -self.sweep)
    }

    fn tangent_at_angle(&self, angle: f64) -> Vector2 {
        let t = Vector2::new(-angle.sin(), angle.cos());
        if self.sweep >= 0.0 {
            t
        } else {
            -t
        }
    }

    pub fn tangent_at_start(&self) -> Vector2 {
        self.tangent_at_angle(self.start_angle)
    }

    pub fn tangent_at_end(&self) -> Vector2 {
        self.tangent_at_angle(self.end_angle())
    }

    pub fn curvature(&self) -> f64 {
        if self.radius < EPSILON {
            return 0.0;
        }
        self.sweep.signum() / self.radius
    }

    /// 检查角度是否落在弧的扫掠范围内
    pub fn contains_angle(&self, angle: f64) -> bool {
        if self.is_full_circle() {
            return true;
        }
        if self.sweep >= 0.0 {
            normalize_angle(angle - self.start_angle) <= self.sweep + EPSILON
        } else {
            normalize_angle(self.start_angle - angle) <= -self.sweep + EPSILON
        }
    }

    /// 计算点到圆弧的距离
    pub fn distance_to_point(&self, point: &Point2) -> f64 {
        let angle = (point.y - self.center.y).atan2(point.x - self.center.x);

        if self.contains_angle(angle) {
            ((point - self.center).norm() - self.radius).abs()
        } else {
            let d1 = (point - self.start_point()).norm();
            let d2 = (point - self.end_point()).norm();
            d1.min(d2)
        }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        let mut bbox = BoundingBox2::from_points([self.start_point(), self.end_point()]);

        // 检查象限点
        for angle in [0.0, FRAC_PI_2, PI, 3.0 * FRAC_PI_2] {
            if self.contains_angle(angle) {
                bbox.expand_to_include(&self.point_at_angle(angle));
            }
        }

        bbox
    }

    /// 按整圆 `segments_per_circle` 段的密度离散圆弧
    pub fn flatten(&self, segments_per_circle: usize) -> Vec<Point2> {
        let per_circle = segments_per_circle.max(3) as f64;
        let count = ((self.sweep.abs() / TAU) * per_circle).ceil().max(1.0) as usize;
        let step = self.sweep / count as f64;
        (0..=count)
            .map(|i| self.point_at_angle(self.start_angle + step * i as f64))
            .collect()
    }
}

/// 多段线顶点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolylineVertex {
    pub point: Point2,
    /// 凸度（bulge）- 用于弧线段，0表示直线
    pub bulge: f64,
}

impl PolylineVertex {
    pub fn new(point: Point2) -> Self {
        Self { point, bulge: 0.0 }
    }

    pub fn with_bulge(point: Point2, bulge: f64) -> Self {
        Self { point, bulge }
    }
}

/// 多段线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub vertices: Vec<PolylineVertex>,
    /// 是否闭合
    pub closed: bool,
}

impl Polyline {
    pub fn new(vertices: Vec<PolylineVertex>, closed: bool) -> Self {
        Self { vertices, closed }
    }

    /// 从点列表创建（所有顶点都是直线连接）
    pub fn from_points(points: impl IntoIterator<Item = Point2>, closed: bool) -> Self {
        Self {
            vertices: points.into_iter().map(PolylineVertex::new).collect(),
            closed,
        }
    }

    /// 线段数量
    pub fn segment_count(&self) -> usize {
        if self.vertices.len() < 2 {
            return 0;
        }
        if self.closed {
            self.vertices.len()
        } else {
            self.vertices.len() - 1
        }
    }

    /// 爆炸为独立的线段/圆弧
    pub fn explode(&self) -> Vec<Segment> {
        let mut result = Vec::with_capacity(self.segment_count());

        for i in 0..self.segment_count() {
            let v1 = &self.vertices[i];
            let v2 = &self.vertices[(i + 1) % self.vertices.len()];

            if v1.bulge.abs() < EPSILON {
                result.push(Segment::Line(Line::new(v1.point, v2.point)));
            } else if let Some(arc) = Self::vertex_pair_to_arc(v1, v2) {
                result.push(Segment::Arc(arc));
            } else {
                // 回退到直线
                result.push(Segment::Line(Line::new(v1.point, v2.point)));
            }
        }

        result
    }

    /// 将带凸度的顶点对转换为圆弧
    ///
    /// bulge = tan(θ/4)，θ 为有符号圆心角；圆心位于弦中点沿左法向偏移 s / tan(θ/2) 处。
    fn vertex_pair_to_arc(v1: &PolylineVertex, v2: &PolylineVertex) -> Option<Arc> {
        let chord = v2.point - v1.point;
        let chord_len = chord.norm();

        if chord_len < EPSILON {
            return None;
        }

        let sweep = 4.0 * v1.bulge.atan();
        let half = sweep / 2.0;
        let s = chord_len / 2.0;

        let mid = Point2::new(
            (v1.point.x + v2.point.x) / 2.0,
            (v1.point.y + v2.point.y) / 2.0,
        );
        let left = Vector2::new(-chord.y, chord.x) / chord_len;
        let center = mid + left * (s / half.tan());
        let radius = s / half.sin().abs();

        let start_angle = (v1.point.y - center.y).atan2(v1.point.x - center.x);

        Some(Arc::new(center, radius, start_angle, sweep))
    }
}
