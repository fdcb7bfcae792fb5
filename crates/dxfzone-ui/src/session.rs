//! 会话状态
//!
//! 显式的上下文对象：持有当前图纸快照、识别出的闭合区域、目标板文件和选择。
//! 界面的每个操作都通过它完成，没有全局状态。

use crate::config::ToolConfig;
use dxfzone_core::chain::order_chain;
use dxfzone_core::geometry::Segment;
use dxfzone_core::math::{BoundingBox2, Point2};
use dxfzone_core::region::{assemble, count_gaps, loops_containing, Loop};
use dxfzone_file::{dxf_io, Board, BoardItem, Drawing, FileError};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No board loaded")]
    NoBoard,

    #[error("No drawing loaded")]
    NoDrawing,

    #[error("Nothing selected")]
    NothingSelected,

    #[error("No net chosen")]
    NoNet,

    #[error("Net not on board: {0}")]
    UnknownNet(String),

    #[error(transparent)]
    File(#[from] FileError),
}

/// 选择模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 选取闭合区域，生成铺铜或禁布区
    Zone,
    /// 选取线段，生成走线
    Line,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Zone => "区域",
            Mode::Line => "走线",
        }
    }
}

/// 闭合区域的用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryRole {
    /// 外边界：所选网络上的铺铜
    Outer,
    /// 内边界：禁止铺铜的禁布区
    Inner,
}

impl BoundaryRole {
    pub fn name(&self) -> &'static str {
        match self {
            BoundaryRole::Outer => "外边界",
            BoundaryRole::Inner => "内边界",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedLoop {
    pub loop_index: usize,
    pub role: BoundaryRole,
}

/// 当前选择
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// 区域模式：闭合区域索引及用途
    Loops(Vec<SelectedLoop>),
    /// 走线模式：按点击顺序的线段索引
    Segments(Vec<usize>),
}

impl Selection {
    fn empty_for(mode: Mode) -> Self {
        match mode {
            Mode::Zone => Selection::Loops(Vec::new()),
            Mode::Line => Selection::Segments(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Selection::Loops(list) => list.len(),
            Selection::Segments(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self) {
        match self {
            Selection::Loops(list) => list.clear(),
            Selection::Segments(list) => list.clear(),
        }
    }
}

/// 点选结果
#[derive(Debug, Clone, PartialEq)]
pub enum PickOutcome {
    /// 没有命中
    Nothing,
    Selected(usize),
    /// 扩展选择时再次点击已选项
    Deselected(usize),
    /// 点落在多个闭合区域内，按面积从小到大列出，等待用户选择
    Ambiguous(Vec<usize>),
}

#[derive(Debug, Clone)]
struct PendingPick {
    candidates: Vec<usize>,
    extend: bool,
}

pub struct Session {
    config: ToolConfig,
    drawing: Option<Drawing>,
    /// 参与识别和拾取的线段（不在隐藏图层上）
    visible: Vec<usize>,
    loops: Vec<Loop>,
    gap_count: usize,
    board: Option<Board>,
    mode: Mode,
    role: BoundaryRole,
    selection: Selection,
    net: Option<String>,
    layer: String,
    hidden_layers: HashSet<String>,
    pending: Option<PendingPick>,
    /// 状态栏消息
    pub status_message: String,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ToolConfig::default())
    }
}

impl Session {
    pub fn new(config: ToolConfig) -> Self {
        Self {
            config,
            drawing: None,
            visible: Vec::new(),
            loops: Vec::new(),
            gap_count: 0,
            board: None,
            mode: Mode::Zone,
            role: BoundaryRole::Outer,
            selection: Selection::empty_for(Mode::Zone),
            net: None,
            layer: "F.Cu".to_string(),
            hidden_layers: HashSet::new(),
            pending: None,
            status_message: "就绪".to_string(),
        }
    }

    // ========== 访问器 ==========

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// 不影响区域识别的参数可以直接修改，容差请用 [`Session::set_tolerance`]
    pub fn config_mut(&mut self) -> &mut ToolConfig {
        &mut self.config
    }

    pub fn drawing(&self) -> Option<&Drawing> {
        self.drawing.as_ref()
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    pub fn gap_count(&self) -> usize {
        self.gap_count
    }

    pub fn visible_segments(&self) -> &[usize] {
        &self.visible
    }

    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// 新选取的闭合区域使用的用途
    pub fn role(&self) -> BoundaryRole {
        self.role
    }

    pub fn set_default_role(&mut self, role: BoundaryRole) {
        self.role = role;
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn net(&self) -> Option<&str> {
        self.net.as_deref()
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn set_layer(&mut self, layer: &str) {
        self.layer = layer.to_string();
    }

    pub fn is_layer_visible(&self, layer: &str) -> bool {
        !self.hidden_layers.contains(layer)
    }

    /// 等待用户选择的候选区域
    pub fn pending_candidates(&self) -> Option<&[usize]> {
        self.pending.as_ref().map(|p| p.candidates.as_slice())
    }

    pub fn cancel_candidates(&mut self) {
        self.pending = None;
    }

    // ========== 加载 ==========

    /// 导入 DXF，失败时保留之前的图纸
    pub fn load_drawing(&mut self, path: &Path) -> Result<(), SessionError> {
        let drawing = dxf_io::import(path)?;
        self.set_drawing(drawing);
        Ok(())
    }

    /// 整体替换图纸快照并重新识别闭合区域
    pub fn set_drawing(&mut self, drawing: Drawing) {
        self.drawing = Some(drawing);
        self.hidden_layers.clear();
        self.rebuild_loops();
        self.selection = Selection::empty_for(self.mode);
        self.pending = None;

        let name = self.drawing.as_ref().map(|d| d.stem()).unwrap_or_default();
        self.status_message = format!(
            "已加载 {}：{} 个图元，{} 个闭合区域，修补 {} 处缺口",
            name,
            self.visible.len(),
            self.loops.len(),
            self.gap_count
        );
    }

    /// 打开板文件，失败时保留之前的板
    pub fn load_board(&mut self, path: &Path) -> Result<(), SessionError> {
        let board = Board::open(path)?;
        self.set_board(board);
        Ok(())
    }

    pub fn set_board(&mut self, board: Board) {
        self.net = board.net_names().into_iter().next();
        let layers = board.copper_layers();
        if !layers.is_empty() && !layers.iter().any(|l| *l == self.layer) {
            self.layer = layers[0].clone();
        }
        self.status_message = format!(
            "已打开板文件 {}：{} 个网络",
            board.path().display(),
            board.net_names().len()
        );
        self.board = Some(board);
    }

    /// 修改端点容差并重新识别
    pub fn set_tolerance(&mut self, tolerance: f64) {
        let tolerance = tolerance.max(0.0);
        if tolerance == self.config.tolerance {
            return;
        }
        self.config.tolerance = tolerance;
        self.rebuild_loops();
        if let Selection::Loops(list) = &mut self.selection {
            list.clear();
        }
        self.pending = None;
    }

    fn rebuild_loops(&mut self) {
        let Some(drawing) = &self.drawing else {
            self.visible.clear();
            self.loops.clear();
            self.gap_count = 0;
            return;
        };

        let visible = drawing.visible_indices(&self.hidden_layers);
        let segments: Vec<Segment> = visible.iter().map(|&i| drawing.segments[i]).collect();
        let tolerance = self.config.tolerance;

        self.loops = assemble(&segments, tolerance)
            .map(|l| l.map_segments(|k| visible[k]))
            .collect();
        self.gap_count = count_gaps(&segments, tolerance);
        debug!(
            "Found {} loops in {} segments ({} gaps healed, tolerance {})",
            self.loops.len(),
            segments.len(),
            self.gap_count,
            tolerance
        );
        self.visible = visible;
    }

    // ========== 选择 ==========

    /// 切换模式，模式变化时清空选择
    pub fn set_mode(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        self.selection = Selection::empty_for(mode);
        self.pending = None;
        self.status_message = format!("{}模式", mode.name());
    }

    /// 在图纸坐标 `point` 处点选
    ///
    /// `radius` 为走线模式的拾取距离（图纸单位）。`extend` 为真时切换该项，
    /// 否则替换当前选择。
    pub fn pick_at(&mut self, point: &Point2, radius: f64, extend: bool) -> PickOutcome {
        if self.drawing.is_none() {
            return PickOutcome::Nothing;
        }
        self.pending = None;

        let outcome = match self.mode {
            Mode::Zone => {
                let candidates = loops_containing(&self.loops, point, self.config.segments_per_circle);
                match candidates.len() {
                    0 => PickOutcome::Nothing,
                    1 => self.apply_loop_pick(candidates[0], extend),
                    _ => {
                        self.pending = Some(PendingPick {
                            candidates: candidates.clone(),
                            extend,
                        });
                        PickOutcome::Ambiguous(candidates)
                    }
                }
            }
            Mode::Line => match self.nearest_segment(point, radius) {
                Some(index) => self.apply_segment_pick(index, extend),
                None => PickOutcome::Nothing,
            },
        };

        match &outcome {
            PickOutcome::Nothing if !extend => self.selection.clear(),
            PickOutcome::Ambiguous(c) => {
                self.status_message = format!("该点位于 {} 个闭合区域内，请选择", c.len());
            }
            _ => {}
        }
        self.update_selection_status(&outcome);
        outcome
    }

    /// 从候选区域中选定一个
    pub fn choose_candidate(&mut self, loop_index: usize) -> PickOutcome {
        let Some(pending) = self.pending.take() else {
            return PickOutcome::Nothing;
        };
        if !pending.candidates.contains(&loop_index) {
            return PickOutcome::Nothing;
        }
        let outcome = self.apply_loop_pick(loop_index, pending.extend);
        self.update_selection_status(&outcome);
        outcome
    }

    /// 框选线段（仅走线模式）
    ///
    /// `window` 为真时只选完全在框内的线段，否则选包围盒与框相交的线段。
    /// 返回命中的线段数量。
    pub fn select_in_box(&mut self, rect: &BoundingBox2, window: bool, extend: bool) -> usize {
        let Some(drawing) = &self.drawing else {
            return 0;
        };
        let Selection::Segments(list) = &mut self.selection else {
            return 0;
        };

        let hits: Vec<usize> = self
            .visible
            .iter()
            .copied()
            .filter(|&i| {
                let bbox = drawing.segments[i].bounding_box();
                if window {
                    rect.contains_box(&bbox)
                } else {
                    rect.intersects(&bbox)
                }
            })
            .collect();

        if !extend {
            list.clear();
        }
        for &i in &hits {
            if !list.contains(&i) {
                list.push(i);
            }
        }
        self.status_message = format!("框选 {} 条线段，共选中 {} 条", hits.len(), list.len());
        hits.len()
    }

    /// 按选择列表中的位置移除
    pub fn remove_selected(&mut self, index: usize) -> bool {
        let removed = match &mut self.selection {
            Selection::Loops(list) if index < list.len() => {
                list.remove(index);
                true
            }
            Selection::Segments(list) if index < list.len() => {
                list.remove(index);
                true
            }
            _ => false,
        };
        if removed {
            self.status_message = format!("已选中 {} 项", self.selection.len());
        }
        removed
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.pending = None;
    }

    /// 修改已选区域的用途
    pub fn set_role(&mut self, index: usize, role: BoundaryRole) -> bool {
        match &mut self.selection {
            Selection::Loops(list) => match list.get_mut(index) {
                Some(item) => {
                    item.role = role;
                    true
                }
                None => false,
            },
            Selection::Segments(_) => false,
        }
    }

    /// 显示或隐藏 DXF 图层，隐藏图层上的图元不参与识别和拾取
    pub fn set_layer_visible(&mut self, layer: &str, visible: bool) {
        let changed = if visible {
            self.hidden_layers.remove(layer)
        } else {
            self.hidden_layers.insert(layer.to_string())
        };
        if !changed {
            return;
        }

        self.rebuild_loops();
        self.pending = None;
        match &mut self.selection {
            // 区域索引已失效
            Selection::Loops(list) => list.clear(),
            Selection::Segments(list) => {
                let visible = &self.visible;
                list.retain(|i| visible.contains(i));
            }
        }
        debug!("Layer {} visible: {}", layer, visible);
    }

    fn apply_loop_pick(&mut self, loop_index: usize, extend: bool) -> PickOutcome {
        let role = self.role;
        let Selection::Loops(list) = &mut self.selection else {
            return PickOutcome::Nothing;
        };
        if extend {
            if let Some(pos) = list.iter().position(|s| s.loop_index == loop_index) {
                list.remove(pos);
                return PickOutcome::Deselected(loop_index);
            }
        } else {
            list.clear();
        }
        list.push(SelectedLoop { loop_index, role });
        PickOutcome::Selected(loop_index)
    }

    fn apply_segment_pick(&mut self, index: usize, extend: bool) -> PickOutcome {
        let Selection::Segments(list) = &mut self.selection else {
            return PickOutcome::Nothing;
        };
        if extend {
            if let Some(pos) = list.iter().position(|&i| i == index) {
                list.remove(pos);
                return PickOutcome::Deselected(index);
            }
        } else {
            list.clear();
        }
        list.push(index);
        PickOutcome::Selected(index)
    }

    fn nearest_segment(&self, point: &Point2, radius: f64) -> Option<usize> {
        let drawing = self.drawing.as_ref()?;
        self.visible
            .iter()
            .map(|&i| (i, drawing.segments[i].distance_to_point(point)))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    fn update_selection_status(&mut self, outcome: &PickOutcome) {
        if matches!(outcome, PickOutcome::Selected(_) | PickOutcome::Deselected(_)) {
            self.status_message = format!("已选中 {} 项", self.selection.len());
        }
    }

    // ========== 网络与提交 ==========

    pub fn set_net(&mut self, name: &str) -> Result<(), SessionError> {
        let board = self.board.as_ref().ok_or(SessionError::NoBoard)?;
        if board.find_net(name).is_err() {
            return Err(SessionError::UnknownNet(name.to_string()));
        }
        self.net = Some(name.to_string());
        Ok(())
    }

    /// 由当前选择生成板元素
    pub fn build_items(&self) -> Result<Vec<BoardItem>, SessionError> {
        let board = self.board.as_ref().ok_or(SessionError::NoBoard)?;
        let drawing = self.drawing.as_ref().ok_or(SessionError::NoDrawing)?;
        if self.selection.is_empty() {
            return Err(SessionError::NothingSelected);
        }
        let net_name = self.net.as_deref().ok_or(SessionError::NoNet)?;
        let net = board
            .find_net(net_name)
            .map_err(|_| SessionError::UnknownNet(net_name.to_string()))?;
        let config = &self.config;

        let items: Vec<BoardItem> = match &self.selection {
            Selection::Loops(list) => list
                .iter()
                .filter_map(|s| {
                    let outline = self.loops.get(s.loop_index)?.polygon(config.segments_per_circle);
                    Some(match s.role {
                        BoundaryRole::Outer => BoardItem::copper_zone(
                            net.clone(),
                            &self.layer,
                            outline,
                            config.zone_clearance,
                            config.zone_min_thickness,
                        ),
                        BoundaryRole::Inner => {
                            BoardItem::keepout(&self.layer, outline, config.zone_min_thickness)
                        }
                    })
                })
                .collect(),
            Selection::Segments(list) => {
                // 能连成一条链时按链的顺序和方向输出，否则按点击顺序
                let geometries: Vec<Segment> =
                    match order_chain(&drawing.segments, list, config.tolerance) {
                        Some(chain) => chain.iter().map(|e| e.geometry).collect(),
                        None => list.iter().map(|&i| drawing.segments[i]).collect(),
                    };
                let mut items: Vec<BoardItem> = geometries
                    .iter()
                    .flat_map(|g| BoardItem::tracks(g, net.code, &self.layer, config.track_width))
                    .collect();
                if items.len() >= 2 {
                    let members = items.iter().map(|i| i.id()).collect();
                    let name = format!("{} - {}", drawing.stem(), net.name);
                    items.push(BoardItem::group(&name, members));
                }
                items
            }
        };
        Ok(items)
    }

    /// 追加到内存中的板，不写盘
    pub fn commit(&mut self) -> Result<usize, SessionError> {
        let items = self.build_items()?;
        let settings = self.config.emit_settings();
        let board = self.board.as_mut().ok_or(SessionError::NoBoard)?;
        board.append(&items, &settings)?;
        Ok(self.finish_commit(items.len()))
    }

    /// 追加并写回板文件
    ///
    /// 在副本上追加，写盘成功后才替换内存中的板。
    pub fn commit_and_save(&mut self) -> Result<usize, SessionError> {
        let items = self.build_items()?;
        let mut board = self.board.clone().ok_or(SessionError::NoBoard)?;
        board.append(&items, &self.config.emit_settings())?;
        board.save()?;
        self.board = Some(board);
        Ok(self.finish_commit(items.len()))
    }

    /// 追加并另存为
    pub fn commit_and_save_as(&mut self, path: &Path) -> Result<usize, SessionError> {
        let items = self.build_items()?;
        let mut board = self.board.clone().ok_or(SessionError::NoBoard)?;
        board.append(&items, &self.config.emit_settings())?;
        board.save_as(path)?;
        self.board = Some(board);
        Ok(self.finish_commit(items.len()))
    }

    /// 保存之前提交但未写盘的修改
    pub fn save(&mut self) -> Result<(), SessionError> {
        let board = self.board.as_mut().ok_or(SessionError::NoBoard)?;
        board.save()?;
        self.status_message = format!("已保存 {}", board.path().display());
        Ok(())
    }

    pub fn save_as(&mut self, path: &Path) -> Result<(), SessionError> {
        let board = self.board.as_mut().ok_or(SessionError::NoBoard)?;
        board.save_as(path)?;
        self.status_message = format!("已另存为 {}", path.display());
        Ok(())
    }

    fn finish_commit(&mut self, count: usize) -> usize {
        info!(
            "Committed {} items on net {} layer {}",
            count,
            self.net.as_deref().unwrap_or(""),
            self.layer
        );
        self.clear_selection();
        self.status_message = format!("已写入 {} 个元素", count);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxfzone_core::geometry::{Arc, Line};
    use dxfzone_file::{EntityKind, SegmentSource};
    use std::path::PathBuf;

    const BOARD: &str = "(kicad_pcb (version 20240108)\n  (layers (0 \"F.Cu\" signal) (31 \"B.Cu\" signal))\n  (net 0 \"\")\n  (net 1 \"VCC\")\n  (net 2 \"GND\")\n)\n";

    fn line(x1: f64, y1: f64, x2: f64, y2: f64) -> Segment {
        Segment::Line(Line::new(Point2::new(x1, y1), Point2::new(x2, y2)))
    }

    /// 10x10 方形，中间一个半径 2 的圆（另一图层），右侧一条独立折线
    fn drawing() -> Drawing {
        let mut segments = vec![
            line(0.0, 0.0, 10.0, 0.0),
            line(10.0, 0.0, 10.0, 10.0),
            line(10.0, 10.0, 0.0, 10.0),
            line(0.0, 10.0, 0.0, 0.0),
        ];
        let mut sources = vec![
            SegmentSource {
                layer: "Outline".to_string(),
                kind: EntityKind::Line,
            };
            4
        ];
        segments.push(Segment::Arc(Arc::full_circle(Point2::new(5.0, 5.0), 2.0)));
        sources.push(SegmentSource {
            layer: "Holes".to_string(),
            kind: EntityKind::Circle,
        });
        segments.push(line(20.0, 0.0, 25.0, 0.0));
        segments.push(line(25.0, 0.0, 25.0, 5.0));
        for _ in 0..2 {
            sources.push(SegmentSource {
                layer: "Traces".to_string(),
                kind: EntityKind::Line,
            });
        }
        Drawing {
            path: PathBuf::from("outline.dxf"),
            segments,
            sources,
            layers: vec!["Outline".to_string(), "Holes".to_string(), "Traces".to_string()],
            skipped: 0,
        }
    }

    fn board() -> Board {
        Board::from_text(Path::new("board.kicad_pcb"), BOARD.to_string()).unwrap()
    }

    fn session() -> Session {
        let mut session = Session::default();
        session.set_drawing(drawing());
        session.set_board(board());
        session
    }

    #[test]
    fn test_load_finds_loops_and_first_net() {
        let s = session();
        assert_eq!(s.loops().len(), 2);
        assert_eq!(s.net(), Some("GND"));
        assert_eq!(s.layer(), "F.Cu");
    }

    #[test]
    fn test_pick_replaces_and_extend_toggles() {
        let mut s = session();
        let square = s.pick_at(&Point2::new(1.0, 1.0), 0.1, false);
        let PickOutcome::Selected(square) = square else {
            panic!("expected selection");
        };
        assert_eq!(s.loops()[square].len(), 4);

        // 普通点击替换选择
        s.pick_at(&Point2::new(1.0, 1.0), 0.1, false);
        assert_eq!(s.selection().len(), 1);

        // Shift 点击同一区域取消选择
        assert_eq!(s.pick_at(&Point2::new(1.0, 1.0), 0.1, true), PickOutcome::Deselected(square));
        assert!(s.selection().is_empty());
    }

    #[test]
    fn test_miss_clears_selection() {
        let mut s = session();
        s.pick_at(&Point2::new(1.0, 1.0), 0.1, false);
        assert_eq!(s.pick_at(&Point2::new(50.0, 50.0), 0.1, true), PickOutcome::Nothing);
        assert_eq!(s.selection().len(), 1);
        assert_eq!(s.pick_at(&Point2::new(50.0, 50.0), 0.1, false), PickOutcome::Nothing);
        assert!(s.selection().is_empty());
    }

    #[test]
    fn test_ambiguous_pick_smallest_first() {
        let mut s = session();
        let PickOutcome::Ambiguous(candidates) = s.pick_at(&Point2::new(5.0, 5.0), 0.1, false) else {
            panic!("expected candidates");
        };
        assert_eq!(candidates.len(), 2);
        assert_eq!(s.loops()[candidates[0]].len(), 1);
        assert!(s.selection().is_empty());

        assert_eq!(s.choose_candidate(candidates[1]), PickOutcome::Selected(candidates[1]));
        assert_eq!(s.selection().len(), 1);
        assert!(s.pending_candidates().is_none());
    }

    #[test]
    fn test_mode_switch_clears_selection() {
        let mut s = session();
        s.pick_at(&Point2::new(1.0, 1.0), 0.1, false);
        s.set_mode(Mode::Line);
        assert!(s.selection().is_empty());
        assert!(matches!(s.selection(), Selection::Segments(_)));
    }

    #[test]
    fn test_line_pick_nearest_within_radius() {
        let mut s = session();
        s.set_mode(Mode::Line);
        assert_eq!(s.pick_at(&Point2::new(22.0, 0.05), 0.1, false), PickOutcome::Selected(5));
        assert_eq!(s.pick_at(&Point2::new(22.0, 1.0), 0.1, false), PickOutcome::Nothing);
    }

    #[test]
    fn test_box_select_window_and_crossing() {
        let mut s = session();
        s.set_mode(Mode::Line);
        let rect = BoundingBox2::new(Point2::new(19.0, -1.0), Point2::new(26.0, 2.0));
        // 完全在框内的只有底边
        assert_eq!(s.select_in_box(&rect, true, false), 1);
        // 相交的还有竖边
        assert_eq!(s.select_in_box(&rect, false, false), 2);
        assert_eq!(s.selection(), &Selection::Segments(vec![5, 6]));
    }

    #[test]
    fn test_hidden_layer_drops_loops() {
        let mut s = session();
        s.set_layer_visible("Holes", false);
        assert_eq!(s.loops().len(), 1);
        assert!(!s.is_layer_visible("Holes"));
        assert_eq!(s.pick_at(&Point2::new(5.0, 5.0), 0.1, false), PickOutcome::Selected(0));
        s.set_layer_visible("Holes", true);
        assert_eq!(s.loops().len(), 2);
    }

    #[test]
    fn test_commit_without_board() {
        let mut s = Session::default();
        s.set_drawing(drawing());
        s.pick_at(&Point2::new(1.0, 1.0), 0.1, false);
        assert!(matches!(s.commit(), Err(SessionError::NoBoard)));
        assert_eq!(s.selection().len(), 1);
    }

    #[test]
    fn test_commit_without_selection() {
        let mut s = session();
        assert!(matches!(s.commit(), Err(SessionError::NothingSelected)));
        assert!(!s.board().unwrap().is_modified());
    }

    #[test]
    fn test_unknown_net_rejected() {
        let mut s = session();
        assert!(matches!(s.set_net("VDD"), Err(SessionError::UnknownNet(_))));
        assert_eq!(s.net(), Some("GND"));
        s.set_net("VCC").unwrap();
        assert_eq!(s.net(), Some("VCC"));
    }

    #[test]
    fn test_commit_zone_and_keepout() {
        let mut s = session();
        s.pick_at(&Point2::new(1.0, 1.0), 0.1, false);
        let PickOutcome::Ambiguous(c) = s.pick_at(&Point2::new(5.0, 5.0), 0.1, true) else {
            panic!("expected candidates");
        };
        s.choose_candidate(c[0]);
        assert!(s.set_role(1, BoundaryRole::Inner));

        assert_eq!(s.commit().unwrap(), 2);
        let text = s.board().unwrap().text();
        assert!(text.contains("(zone (net 2) (net_name \"GND\")"));
        assert!(text.contains("(copperpour not_allowed)"));
        assert!(s.selection().is_empty());
        assert!(s.board().unwrap().is_modified());
    }

    #[test]
    fn test_commit_tracks_groups_chain() {
        let mut s = session();
        s.set_mode(Mode::Line);
        s.pick_at(&Point2::new(25.0, 3.0), 0.1, false);
        s.pick_at(&Point2::new(22.0, 0.0), 0.1, true);
        let items = s.build_items().unwrap();
        assert_eq!(items.len(), 3);
        assert!(matches!(items.last(), Some(BoardItem::Group { name, .. }) if name == "outline - GND"));

        s.commit().unwrap();
        let text = s.board().unwrap().text();
        assert_eq!(text.matches("(segment ").count(), 2);
        assert!(text.contains("(group \"outline - GND\""));
    }

    #[test]
    fn test_single_track_has_no_group() {
        let mut s = session();
        s.set_mode(Mode::Line);
        s.pick_at(&Point2::new(22.0, 0.0), 0.1, false);
        let items = s.build_items().unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_commit_and_save_as() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("out.kicad_pcb");
        let mut s = session();
        s.pick_at(&Point2::new(1.0, 1.0), 0.1, false);
        assert_eq!(s.commit_and_save_as(&target).unwrap(), 1);
        let saved = std::fs::read_to_string(&target).unwrap();
        assert!(saved.contains("(zone "));
        assert!(!s.board().unwrap().is_modified());
    }

    #[test]
    fn test_failed_save_keeps_board_and_selection() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("missing").join("out.kicad_pcb");
        let mut s = session();
        s.pick_at(&Point2::new(1.0, 1.0), 0.1, false);
        assert!(s.commit_and_save_as(&target).is_err());
        assert_eq!(s.board().unwrap().text(), BOARD);
        assert_eq!(s.selection().len(), 1);
    }

    #[test]
    fn test_failed_drawing_load_keeps_previous() {
        let mut s = session();
        assert!(s.load_drawing(Path::new("/nonexistent/x.dxf")).is_err());
        assert_eq!(s.loops().len(), 2);
    }
}
