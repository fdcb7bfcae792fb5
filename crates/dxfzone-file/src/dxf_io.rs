//! DXF 文件导入
//!
//! 只读取可以构成边界或走线的图元：直线、圆弧、圆和多段线。
//! 多段线拆成独立的线段与圆弧，其它图元跳过并计数。

use crate::error::FileError;
use dxf::entities::{Entity, EntityType};
use dxfzone_core::geometry::{Arc, Line, Polyline, PolylineVertex, Segment};
use dxfzone_core::math::{BoundingBox2, Point2};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 线段来源的 DXF 图元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Line,
    Arc,
    Circle,
    LwPolyline,
    Polyline,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Line => "LINE",
            EntityKind::Arc => "ARC",
            EntityKind::Circle => "CIRCLE",
            EntityKind::LwPolyline => "LWPOLYLINE",
            EntityKind::Polyline => "POLYLINE",
        }
    }
}

/// 线段来源：图层与图元类型
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSource {
    pub layer: String,
    pub kind: EntityKind,
}

/// 导入后的图纸快照
#[derive(Debug, Clone, Default)]
pub struct Drawing {
    pub path: PathBuf,
    pub segments: Vec<Segment>,
    /// 与 `segments` 一一对应
    pub sources: Vec<SegmentSource>,
    /// DXF 图层表中的图层名
    pub layers: Vec<String>,
    /// 跳过的图元数量
    pub skipped: usize,
}

impl Drawing {
    pub fn bounds(&self) -> BoundingBox2 {
        self.segments
            .iter()
            .fold(BoundingBox2::empty(), |acc, s| acc.union(&s.bounding_box()))
    }

    /// 文件名（不含扩展名），用于生成走线分组名
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// 不在隐藏图层上的线段索引
    pub fn visible_indices(&self, hidden: &HashSet<String>) -> Vec<usize> {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, src)| !hidden.contains(&src.layer))
            .map(|(i, _)| i)
            .collect()
    }

    fn push(&mut self, layer: &str, kind: EntityKind, segments: Vec<Segment>) {
        for segment in segments {
            self.segments.push(segment);
            self.sources.push(SegmentSource {
                layer: layer.to_string(),
                kind,
            });
        }
    }
}

/// 从DXF文件导入
pub fn import(path: &Path) -> Result<Drawing, FileError> {
    let dxf_drawing = dxf::Drawing::load_file(path).map_err(|e| FileError::Dxf(e.to_string()))?;

    let mut drawing = Drawing {
        path: path.to_path_buf(),
        ..Default::default()
    };

    for layer in dxf_drawing.layers() {
        drawing.layers.push(layer.name.clone());
    }

    let mut skipped_kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
    for entity in dxf_drawing.entities() {
        match convert_entity(entity) {
            Some((kind, segments)) => {
                // 图层表中可能缺少图元引用的图层
                if !drawing.layers.contains(&entity.common.layer) {
                    drawing.layers.push(entity.common.layer.clone());
                }
                drawing.push(&entity.common.layer, kind, segments);
            }
            None => {
                drawing.skipped += 1;
                *skipped_kinds.entry(entity_type_name(&entity.specific)).or_default() += 1;
            }
        }
    }

    for (kind, count) in &skipped_kinds {
        debug!("Skipped {} {} entities", count, kind);
    }
    info!(
        "Imported {} segments from {} ({} layers, {} entities skipped)",
        drawing.segments.len(),
        path.display(),
        drawing.layers.len(),
        drawing.skipped
    );

    Ok(drawing)
}

/// 将DXF图元转换为线段列表
///
/// 不支持的图元返回 `None`。
pub fn convert_entity(entity: &Entity) -> Option<(EntityKind, Vec<Segment>)> {
    match &entity.specific {
        EntityType::Line(line) => {
            let start = Point2::new(line.p1.x, line.p1.y);
            let end = Point2::new(line.p2.x, line.p2.y);
            Some((EntityKind::Line, vec![Segment::Line(Line::new(start, end))]))
        }

        EntityType::Arc(arc) => {
            let mirrored = arc.normal.z < 0.0;
            let (center, start_deg, end_deg) = if mirrored {
                // 法向朝 -Z 时，OCS 的 X 轴与 WCS 相反
                (
                    Point2::new(-arc.center.x, arc.center.y),
                    180.0 - arc.end_angle,
                    180.0 - arc.start_angle,
                )
            } else {
                (
                    Point2::new(arc.center.x, arc.center.y),
                    arc.start_angle,
                    arc.end_angle,
                )
            };
            let arc = Arc::from_ccw_degrees(center, arc.radius, start_deg, end_deg);
            Some((EntityKind::Arc, vec![Segment::Arc(arc)]))
        }

        EntityType::Circle(circle) => {
            let x = if circle.normal.z < 0.0 {
                -circle.center.x
            } else {
                circle.center.x
            };
            let center = Point2::new(x, circle.center.y);
            Some((
                EntityKind::Circle,
                vec![Segment::Arc(Arc::full_circle(center, circle.radius))],
            ))
        }

        EntityType::LwPolyline(lwpoly) => {
            let polyline = ocs_polyline(
                lwpoly.vertices.iter().map(|v| (v.x, v.y, v.bulge)),
                lwpoly.is_closed(),
                lwpoly.extrusion_direction.z < 0.0,
            );
            Some((EntityKind::LwPolyline, polyline.explode()))
        }

        EntityType::Polyline(poly) => {
            let polyline = ocs_polyline(
                poly.vertices().map(|v| (v.location.x, v.location.y, v.bulge)),
                poly.is_closed(),
                poly.normal.z < 0.0,
            );
            Some((EntityKind::Polyline, polyline.explode()))
        }

        _ => None,
    }
}

/// 由 OCS 顶点 `(x, y, bulge)` 构造多段线
///
/// 法向朝 -Z 时 X 取反，凸度取反以保持圆弧的实际转向。
fn ocs_polyline(
    vertices: impl Iterator<Item = (f64, f64, f64)>,
    closed: bool,
    mirrored: bool,
) -> Polyline {
    let vertices: Vec<PolylineVertex> = vertices
        .map(|(x, y, bulge)| {
            if mirrored {
                PolylineVertex::with_bulge(Point2::new(-x, y), -bulge)
            } else {
                PolylineVertex::with_bulge(Point2::new(x, y), bulge)
            }
        })
        .collect();
    Polyline::new(vertices, closed)
}

fn entity_type_name(specific: &EntityType) -> &'static str {
    match specific {
        EntityType::Text(_) => "TEXT",
        EntityType::MText(_) => "MTEXT",
        EntityType::Insert(_) => "INSERT",
        EntityType::Spline(_) => "SPLINE",
        EntityType::Ellipse(_) => "ELLIPSE",
        EntityType::Solid(_) => "SOLID",
        EntityType::ModelPoint(_) => "POINT",
        _ => "other",
    }
}
