//! 生成 KiCad 板元素
//!
//! 坐标在 DXF 图纸空间中给出，写出时按 [`EmitSettings`] 翻转 Y 轴并加偏移。

use crate::board::Net;
use crate::sexp::SExp;
use dxfzone_core::geometry::{Arc, Segment};
use dxfzone_core::math::{Point2, Vector2};
use uuid::Uuid;

/// 坐标变换设置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitSettings {
    /// DXF 的 Y 轴向上，KiCad 向下
    pub flip_y: bool,
    /// 变换后加到每个坐标上（mm）
    pub offset: Vector2,
}

impl Default for EmitSettings {
    fn default() -> Self {
        Self {
            flip_y: true,
            offset: Vector2::zeros(),
        }
    }
}

impl EmitSettings {
    pub fn transform(&self, p: &Point2) -> Point2 {
        let y = if self.flip_y { -p.y } else { p.y };
        Point2::new(p.x + self.offset.x, y + self.offset.y)
    }
}

/// 元素标识的写法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStyle {
    /// 元素用 `uuid`，分组用 `uuid`
    Uuid,
    /// 旧格式：元素用 `tstamp`，分组用 `id`
    Legacy,
}

/// 走线路径
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackPath {
    Line { start: Point2, end: Point2 },
    Arc { start: Point2, mid: Point2, end: Point2 },
}

/// 待追加到板文件的元素
#[derive(Debug, Clone, PartialEq)]
pub enum BoardItem {
    CopperZone {
        id: Uuid,
        net: Net,
        layer: String,
        outline: Vec<Point2>,
        clearance: f64,
        min_thickness: f64,
    },
    Keepout {
        id: Uuid,
        layer: String,
        outline: Vec<Point2>,
        min_thickness: f64,
    },
    Track {
        id: Uuid,
        net_code: u32,
        layer: String,
        width: f64,
        path: TrackPath,
    },
    Group {
        id: Uuid,
        name: String,
        members: Vec<Uuid>,
    },
}

impl BoardItem {
    pub fn copper_zone(net: Net, layer: &str, outline: Vec<Point2>, clearance: f64, min_thickness: f64) -> Self {
        BoardItem::CopperZone {
            id: Uuid::new_v4(),
            net,
            layer: layer.to_string(),
            outline,
            clearance,
            min_thickness,
        }
    }

    pub fn keepout(layer: &str, outline: Vec<Point2>, min_thickness: f64) -> Self {
        BoardItem::Keepout {
            id: Uuid::new_v4(),
            layer: layer.to_string(),
            outline,
            min_thickness,
        }
    }

    /// 由一条线段生成走线
    ///
    /// 整圆的起止点重合，拆成两段半圆弧。
    pub fn tracks(segment: &Segment, net_code: u32, layer: &str, width: f64) -> Vec<BoardItem> {
        let paths = match segment {
            Segment::Line(l) => vec![TrackPath::Line {
                start: l.start,
                end: l.end,
            }],
            Segment::Arc(a) if a.is_full_circle() => {
                let half = a.sweep / 2.0;
                vec![
                    arc_path(&Arc::new(a.center, a.radius, a.start_angle, half)),
                    arc_path(&Arc::new(a.center, a.radius, a.start_angle + half, half)),
                ]
            }
            Segment::Arc(a) => vec![arc_path(a)],
        };
        paths
            .into_iter()
            .map(|path| BoardItem::Track {
                id: Uuid::new_v4(),
                net_code,
                layer: layer.to_string(),
                width,
                path,
            })
            .collect()
    }

    pub fn group(name: &str, members: Vec<Uuid>) -> Self {
        BoardItem::Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            members,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            BoardItem::CopperZone { id, .. }
            | BoardItem::Keepout { id, .. }
            | BoardItem::Track { id, .. }
            | BoardItem::Group { id, .. } => *id,
        }
    }

    pub fn to_sexp(&self, style: IdStyle, settings: &EmitSettings) -> SExp {
        let item_id = |id: &Uuid| {
            let key = match style {
                IdStyle::Uuid => "uuid",
                IdStyle::Legacy => "tstamp",
            };
            SExp::node(key, [SExp::string(id.to_string())])
        };
        let xy = |key: &str, p: &Point2| {
            let p = settings.transform(p);
            SExp::node(key, [SExp::symbol(format_mm(p.x)), SExp::symbol(format_mm(p.y))])
        };

        match self {
            BoardItem::CopperZone {
                id,
                net,
                layer,
                outline,
                clearance,
                min_thickness,
            } => zone_sexp(
                net.code,
                &net.name,
                layer,
                item_id(id),
                *clearance,
                *min_thickness,
                None,
                outline.iter().map(|p| xy("xy", p)),
            ),
            BoardItem::Keepout {
                id,
                layer,
                outline,
                min_thickness,
            } => zone_sexp(
                0,
                "",
                layer,
                item_id(id),
                0.0,
                *min_thickness,
                Some(keepout_rules()),
                outline.iter().map(|p| xy("xy", p)),
            ),
            BoardItem::Track {
                id,
                net_code,
                layer,
                width,
                path,
            } => {
                let (head, mut items) = match path {
                    TrackPath::Line { start, end } => ("segment", vec![xy("start", start), xy("end", end)]),
                    TrackPath::Arc { start, mid, end } => {
                        ("arc", vec![xy("start", start), xy("mid", mid), xy("end", end)])
                    }
                };
                items.extend([
                    SExp::node("width", [SExp::symbol(format_mm(*width))]),
                    SExp::node("layer", [SExp::string(layer.as_str())]),
                    SExp::node("net", [SExp::symbol(net_code.to_string())]),
                    item_id(id),
                ]);
                SExp::node(head, items)
            }
            BoardItem::Group { id, name, members } => {
                let id_key = match style {
                    IdStyle::Uuid => "uuid",
                    IdStyle::Legacy => "id",
                };
                SExp::node(
                    "group",
                    [
                        SExp::string(name.as_str()),
                        SExp::node(id_key, [SExp::string(id.to_string())]),
                        SExp::node("members", members.iter().map(|m| SExp::string(m.to_string()))),
                    ],
                )
            }
        }
    }
}

fn arc_path(arc: &Arc) -> TrackPath {
    TrackPath::Arc {
        start: arc.start_point(),
        mid: arc.mid_point(),
        end: arc.end_point(),
    }
}

fn keepout_rules() -> SExp {
    let rule = |key: &str, value: &str| SExp::node(key, [SExp::symbol(value)]);
    SExp::node(
        "keepout",
        [
            rule("tracks", "allowed"),
            rule("vias", "allowed"),
            rule("pads", "allowed"),
            rule("copperpour", "not_allowed"),
            rule("footprints", "allowed"),
        ],
    )
}

#[allow(clippy::too_many_arguments)]
fn zone_sexp(
    net_code: u32,
    net_name: &str,
    layer: &str,
    id: SExp,
    clearance: f64,
    min_thickness: f64,
    keepout: Option<SExp>,
    points: impl Iterator<Item = SExp>,
) -> SExp {
    let num = |v: f64| SExp::symbol(format_mm(v));
    let mut items = vec![
        SExp::node("net", [SExp::symbol(net_code.to_string())]),
        SExp::node("net_name", [SExp::string(net_name)]),
        SExp::node("layer", [SExp::string(layer)]),
        id,
        SExp::node("hatch", [SExp::symbol("edge"), num(0.5)]),
        SExp::node("connect_pads", [SExp::node("clearance", [num(clearance)])]),
        SExp::node("min_thickness", [num(min_thickness)]),
        SExp::node("filled_areas_thickness", [SExp::symbol("no")]),
    ];
    items.extend(keepout);
    items.push(SExp::node(
        "fill",
        [
            SExp::node("thermal_gap", [num(0.5)]),
            SExp::node("thermal_bridge_width", [num(0.5)]),
        ],
    ));
    items.push(SExp::node("polygon", [SExp::node("pts", points)]));
    SExp::node("zone", items)
}

/// 渲染为可直接插入板文件的文本，每个元素一行
pub fn render_items(items: &[BoardItem], style: IdStyle, settings: &EmitSettings) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str("  ");
        out.push_str(&item.to_sexp(style, settings).to_string());
        out.push('\n');
    }
    out
}

/// mm 数值：最多 6 位小数，去掉末尾的 0
pub fn format_mm(value: f64) -> String {
    let mut s = format!("{:.6}", value);
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxfzone_core::geometry::Line;

    fn gnd() -> Net {
        Net {
            code: 1,
            name: "GND".to_string(),
        }
    }

    fn square() -> Vec<Point2> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 5.5),
            Point2::new(0.0, 5.5),
        ]
    }

    #[test]
    fn test_format_mm() {
        assert_eq!(format_mm(1.0), "1");
        assert_eq!(format_mm(0.2), "0.2");
        assert_eq!(format_mm(-0.0000001), "0");
        assert_eq!(format_mm(12.3456789), "12.345679");
        assert_eq!(format_mm(-3.5), "-3.5");
    }

    #[test]
    fn test_transform_flips_and_offsets() {
        let settings = EmitSettings {
            flip_y: true,
            offset: Vector2::new(100.0, 50.0),
        };
        assert_eq!(settings.transform(&Point2::new(1.0, 2.0)), Point2::new(101.0, 48.0));
        let plain = EmitSettings {
            flip_y: false,
            offset: Vector2::zeros(),
        };
        assert_eq!(plain.transform(&Point2::new(1.0, 2.0)), Point2::new(1.0, 2.0));
    }

    #[test]
    fn test_copper_zone_text() {
        let zone = BoardItem::copper_zone(gnd(), "F.Cu", square(), 0.5, 0.25);
        let text = zone.to_sexp(IdStyle::Uuid, &EmitSettings::default()).to_string();
        assert!(text.starts_with("(zone (net 1) (net_name \"GND\") (layer \"F.Cu\") (uuid \""));
        assert!(text.contains("(connect_pads (clearance 0.5)) (min_thickness 0.25)"));
        assert!(text.contains("(polygon (pts (xy 0 0) (xy 10 0) (xy 10 -5.5) (xy 0 -5.5)))"));
        assert!(!text.contains("keepout"));
    }

    #[test]
    fn test_keepout_text() {
        let zone = BoardItem::keepout("F.Cu", square(), 0.25);
        let text = zone.to_sexp(IdStyle::Uuid, &EmitSettings::default()).to_string();
        assert!(text.starts_with("(zone (net 0) (net_name \"\")"));
        assert!(text.contains("(copperpour not_allowed)"));
        assert!(text.contains("(tracks allowed)"));
    }

    #[test]
    fn test_track_segment_text() {
        let segment = Segment::Line(Line::new(Point2::new(0.0, 1.0), Point2::new(2.0, 1.0)));
        let tracks = BoardItem::tracks(&segment, 3, "B.Cu", 0.2);
        assert_eq!(tracks.len(), 1);
        let text = tracks[0].to_sexp(IdStyle::Uuid, &EmitSettings::default()).to_string();
        assert!(text.starts_with("(segment (start 0 -1) (end 2 -1) (width 0.2) (layer \"B.Cu\") (net 3) (uuid \""));
    }

    #[test]
    fn test_circle_becomes_two_arcs() {
        let circle = Segment::Arc(Arc::full_circle(Point2::origin(), 1.0));
        let tracks = BoardItem::tracks(&circle, 1, "F.Cu", 0.2);
        assert_eq!(tracks.len(), 2);
        let text = tracks[0].to_sexp(IdStyle::Uuid, &EmitSettings::default()).to_string();
        assert!(text.starts_with("(arc (start 1 0) (mid 0 -1) (end -1 0)"));
    }

    #[test]
    fn test_legacy_ids() {
        let segment = Segment::Line(Line::new(Point2::origin(), Point2::new(1.0, 0.0)));
        let track = &BoardItem::tracks(&segment, 1, "F.Cu", 0.2)[0];
        let text = track.to_sexp(IdStyle::Legacy, &EmitSettings::default()).to_string();
        assert!(text.contains("(tstamp \""));
        let group = BoardItem::group("board - GND", vec![track.id()]);
        let text = group.to_sexp(IdStyle::Legacy, &EmitSettings::default()).to_string();
        assert!(text.starts_with("(group \"board - GND\" (id \""));
        assert!(text.contains(&format!("(members \"{}\")", track.id())));
    }

    #[test]
    fn test_render_items_one_per_line() {
        let items = vec![
            BoardItem::copper_zone(gnd(), "F.Cu", square(), 0.5, 0.25),
            BoardItem::keepout("F.Cu", square(), 0.25),
        ];
        let text = render_items(&items, IdStyle::Uuid, &EmitSettings::default());
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|l| l.starts_with("  (zone ")));
    }
}
