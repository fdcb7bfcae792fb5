//! dxfzone 主应用程序入口
//! 从 DXF 图纸中选取闭合区域或线段，写入 KiCad 板文件

use anyhow::Result;
use eframe::egui;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use dxfzone_core::geometry::Segment;
use dxfzone_core::math::{BoundingBox2, Point2};
use dxfzone_core::region::{loops_containing, Loop};
use dxfzone_file::Drawing;
use dxfzone_ui::{BoundaryRole, Mode, PickOutcome, Selection, Session};

/// 显示用的整圆离散段数
const DISPLAY_SEGMENTS_PER_CIRCLE: usize = 96;

/// 没有板文件时可选的铜层
const DEFAULT_COPPER_LAYERS: [&str; 2] = ["F.Cu", "B.Cu"];

const SEGMENT_COLOR: egui::Color32 = egui::Color32::from_rgb(190, 190, 205);
const SELECTED_COLOR: egui::Color32 = egui::Color32::from_rgb(80, 230, 120);
const HOVER_COLOR: egui::Color32 = egui::Color32::from_rgb(250, 210, 80);

/// dxfzone 应用程序
struct DxfZoneApp {
    session: Session,

    // 视图状态
    camera_center: Point2,
    camera_zoom: f64,
    viewport_size: (f32, f32),
    mouse_world_pos: Point2,

    /// 左键框选起点（屏幕坐标）
    box_start: Option<egui::Pos2>,

    // 文件操作状态
    pending_file_op: Option<FileOperation>,

    /// 等待用户确认的错误
    error_message: Option<String>,

    /// DXF 图层及其图元数量
    layer_entries: Vec<(String, usize)>,
    show_layers_panel: bool,

    /// 候选窗口中鼠标所在的区域
    candidate_hover: Option<usize>,
}

/// 文件操作类型
#[derive(Debug, Clone)]
enum FileOperation {
    OpenDxf(PathBuf),
    OpenBoard(PathBuf),
    SaveBoardAs(PathBuf),
    CommitAndSaveAs(PathBuf),
}

/// 本帧按下的快捷键
#[derive(Debug)]
struct KeyActions {
    open_dxf: bool,
    save: bool,
    commit: bool,
    clear: bool,
    delete: bool,
    fit: bool,
}

impl Default for DxfZoneApp {
    fn default() -> Self {
        Self {
            session: Session::default(),
            camera_center: Point2::new(0.0, 0.0),
            camera_zoom: 4.0,
            viewport_size: (800.0, 600.0),
            mouse_world_pos: Point2::new(0.0, 0.0),
            box_start: None,
            pending_file_op: None,
            error_message: None,
            layer_entries: Vec::new(),
            show_layers_panel: true,
            candidate_hover: None,
        }
    }
}

impl DxfZoneApp {
    /// 世界坐标转屏幕坐标
    fn world_to_screen(&self, point: Point2, rect: &egui::Rect) -> egui::Pos2 {
        let center = rect.center();
        let x = center.x + ((point.x - self.camera_center.x) * self.camera_zoom) as f32;
        let y = center.y - ((point.y - self.camera_center.y) * self.camera_zoom) as f32; // Y轴翻转
        egui::Pos2::new(x, y)
    }

    /// 屏幕坐标转世界坐标
    fn screen_to_world(&self, pos: egui::Pos2, rect: &egui::Rect) -> Point2 {
        let center = rect.center();
        let x = self.camera_center.x + ((pos.x - center.x) as f64 / self.camera_zoom);
        let y = self.camera_center.y - ((pos.y - center.y) as f64 / self.camera_zoom); // Y轴翻转
        Point2::new(x, y)
    }

    /// 缩放到适合视图
    fn zoom_to_fit(&mut self) {
        let Some(drawing) = self.session.drawing() else {
            return;
        };
        let bounds = drawing.bounds();
        if bounds.is_empty() {
            return;
        }
        self.camera_center = bounds.center();

        let zoom_x = (self.viewport_size.0 as f64 - 60.0) / bounds.width().max(1e-3);
        let zoom_y = (self.viewport_size.1 as f64 - 60.0) / bounds.height().max(1e-3);
        self.camera_zoom = zoom_x.min(zoom_y).clamp(0.01, 10000.0);
    }

    // ========== 绘制 ==========

    fn draw_segment(&self, painter: &egui::Painter, rect: &egui::Rect, segment: &Segment, stroke: egui::Stroke) {
        let points: Vec<egui::Pos2> = segment
            .flatten(DISPLAY_SEGMENTS_PER_CIRCLE)
            .into_iter()
            .map(|p| self.world_to_screen(p, rect))
            .collect();
        painter.add(egui::Shape::line(points, stroke));
    }

    /// 填充闭合区域
    fn fill_loop(&self, painter: &egui::Painter, rect: &egui::Rect, lp: &Loop, color: egui::Color32) {
        let Some((points, triangles)) = lp.triangulate(DISPLAY_SEGMENTS_PER_CIRCLE) else {
            return;
        };
        let mut mesh = egui::Mesh::default();
        for p in points {
            mesh.colored_vertex(self.world_to_screen(p, rect), color);
        }
        for [a, b, c] in triangles {
            mesh.add_triangle(a, b, c);
        }
        painter.add(egui::Shape::mesh(mesh));
    }

    fn outline_loop(&self, painter: &egui::Painter, rect: &egui::Rect, lp: &Loop, stroke: egui::Stroke) {
        for edge in lp.edges() {
            self.draw_segment(painter, rect, &edge.geometry, stroke);
        }
    }

    /// 鼠标下面积最小的闭合区域
    fn hovered_loop(&self) -> Option<usize> {
        if self.session.mode() != Mode::Zone {
            return None;
        }
        if let Some(index) = self.candidate_hover {
            return Some(index);
        }
        loops_containing(
            self.session.loops(),
            &self.mouse_world_pos,
            self.session.config().segments_per_circle,
        )
        .first()
        .copied()
    }

    fn draw_drawing(&self, painter: &egui::Painter, rect: &egui::Rect, hovered: Option<usize>) {
        let Some(drawing) = self.session.drawing() else {
            return;
        };
        let loops = self.session.loops();

        let mut selected_segments = HashSet::new();
        match self.session.selection() {
            Selection::Loops(list) => {
                for item in list {
                    let Some(lp) = loops.get(item.loop_index) else {
                        continue;
                    };
                    let color = match item.role {
                        BoundaryRole::Outer => egui::Color32::from_rgba_unmultiplied(60, 200, 90, 90),
                        BoundaryRole::Inner => egui::Color32::from_rgba_unmultiplied(220, 60, 60, 110),
                    };
                    self.fill_loop(painter, rect, lp, color);
                }
            }
            Selection::Segments(list) => selected_segments.extend(list.iter().copied()),
        }

        if let Some(lp) = hovered.and_then(|i| loops.get(i)) {
            self.fill_loop(painter, rect, lp, egui::Color32::from_rgba_unmultiplied(250, 210, 80, 40));
        }

        let normal = egui::Stroke::new(1.2, SEGMENT_COLOR);
        for &index in self.session.visible_segments() {
            if selected_segments.contains(&index) {
                continue;
            }
            self.draw_segment(painter, rect, &drawing.segments[index], normal);
        }

        if let Some(lp) = hovered.and_then(|i| loops.get(i)) {
            self.outline_loop(painter, rect, lp, egui::Stroke::new(2.0, HOVER_COLOR));
        }
        let selected = egui::Stroke::new(3.0, SELECTED_COLOR);
        for &index in &selected_segments {
            if let Some(segment) = drawing.segments.get(index) {
                self.draw_segment(painter, rect, segment, selected);
            }
        }
    }

    /// 框选矩形：从左向右为窗口选择（蓝），从右向左为交叉选择（绿）
    fn draw_box(&self, painter: &egui::Painter, start: egui::Pos2, end: egui::Pos2) {
        let window = end.x >= start.x;
        let (fill, stroke) = if window {
            (
                egui::Color32::from_rgba_unmultiplied(80, 140, 255, 30),
                egui::Color32::from_rgb(80, 140, 255),
            )
        } else {
            (
                egui::Color32::from_rgba_unmultiplied(80, 230, 120, 30),
                egui::Color32::from_rgb(80, 230, 120),
            )
        };
        let rect = egui::Rect::from_two_pos(start, end);
        painter.rect_filled(rect, 0.0, fill);
        painter.rect_stroke(rect, 0.0, egui::Stroke::new(1.0, stroke), egui::StrokeKind::Middle);
    }

    // ========== 选择 ==========

    fn handle_left_click(&mut self, extend: bool) {
        let radius = self.session.config().pick_radius_px as f64 / self.camera_zoom;
        let point = self.mouse_world_pos;
        if let PickOutcome::Ambiguous(candidates) = self.session.pick_at(&point, radius, extend) {
            info!("Click inside {} overlapping loops", candidates.len());
        }
    }

    fn handle_box_select(&mut self, start: egui::Pos2, end: egui::Pos2, rect: &egui::Rect, extend: bool) {
        let window = end.x >= start.x;
        let world = BoundingBox2::from_points([
            self.screen_to_world(start, rect),
            self.screen_to_world(end, rect),
        ]);
        self.session.select_in_box(&world, window, extend);
    }

    /// 删除最后选中的一项
    fn remove_last_selected(&mut self) {
        let len = self.session.selection().len();
        if len > 0 {
            self.session.remove_selected(len - 1);
        }
    }

    // ========== 写入 ==========

    fn commit(&mut self) {
        match self.session.commit() {
            Ok(count) => info!("Appended {} items to board in memory", count),
            Err(e) => self.show_error("写入失败", &e),
        }
    }

    fn commit_and_save(&mut self) {
        match self.session.commit_and_save() {
            Ok(count) => info!("Appended {} items and saved board", count),
            Err(e) => self.show_error("写入并保存失败", &e),
        }
    }

    fn save_board(&mut self) {
        if let Err(e) = self.session.save() {
            self.show_error("保存失败", &e);
        }
    }

    fn show_error(&mut self, context: &str, err: &dyn std::fmt::Display) {
        error!("{}: {}", context, err);
        self.session.status_message = format!("{}：{}", context, err);
        self.error_message = Some(format!("{}：\n{}", context, err));
    }

    // ========== 文件 ==========

    fn show_open_dxf_dialog(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("DXF 文件", &["dxf"])
            .add_filter("所有文件", &["*"])
            .set_title("打开 DXF")
            .pick_file()
        {
            self.pending_file_op = Some(FileOperation::OpenDxf(path));
        }
    }

    fn show_open_board_dialog(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("KiCad 板文件", &["kicad_pcb"])
            .add_filter("所有文件", &["*"])
            .set_title("打开板文件")
            .pick_file()
        {
            self.pending_file_op = Some(FileOperation::OpenBoard(path));
        }
    }

    /// 另存为对话框，`commit` 为真时先写入当前选择
    fn show_save_board_dialog(&mut self, commit: bool) {
        let mut dialog = rfd::FileDialog::new()
            .add_filter("KiCad 板文件", &["kicad_pcb"])
            .set_title(if commit { "写入并另存为" } else { "另存为" });

        if let Some(file_name) = self.session.board().and_then(|b| b.path().file_name()) {
            dialog = dialog.set_file_name(file_name.to_string_lossy().as_ref());
        }

        if let Some(path) = dialog.save_file() {
            self.pending_file_op = Some(if commit {
                FileOperation::CommitAndSaveAs(path)
            } else {
                FileOperation::SaveBoardAs(path)
            });
        }
    }

    /// 处理文件操作
    fn process_file_operations(&mut self) {
        let Some(op) = self.pending_file_op.take() else {
            return;
        };
        match op {
            FileOperation::OpenDxf(path) => match self.session.load_drawing(&path) {
                Ok(()) => {
                    self.layer_entries = self.session.drawing().map(collect_layers).unwrap_or_default();
                    self.candidate_hover = None;
                    self.zoom_to_fit();
                    info!("Opened drawing: {}", path.display());
                }
                Err(e) => self.show_error("打开 DXF 失败", &e),
            },
            FileOperation::OpenBoard(path) => match self.session.load_board(&path) {
                Ok(()) => info!("Opened board: {}", path.display()),
                Err(e) => self.show_error("打开板文件失败", &e),
            },
            FileOperation::SaveBoardAs(path) => match self.session.save_as(&path) {
                Ok(()) => info!("Saved board as: {}", path.display()),
                Err(e) => self.show_error("另存为失败", &e),
            },
            FileOperation::CommitAndSaveAs(path) => match self.session.commit_and_save_as(&path) {
                Ok(count) => info!("Appended {} items and saved board as {}", count, path.display()),
                Err(e) => self.show_error("写入并另存为失败", &e),
            },
        }
    }

    fn apply_keys(&mut self, keys: KeyActions) {
        if keys.open_dxf {
            self.show_open_dxf_dialog();
        }
        if keys.save {
            self.save_board();
        }
        if keys.commit {
            self.commit();
        }
        if keys.clear {
            if self.session.pending_candidates().is_some() {
                self.session.cancel_candidates();
                self.candidate_hover = None;
            } else {
                self.session.clear_selection();
            }
            self.box_start = None;
        }
        if keys.delete {
            self.remove_last_selected();
        }
        if keys.fit {
            self.zoom_to_fit();
        }
    }

    // ========== 面板 ==========

    fn selection_panel_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("选择");
        ui.separator();

        let mut remove = None;
        let mut set_role = None;
        match self.session.selection() {
            Selection::Loops(list) if !list.is_empty() => {
                for (n, item) in list.iter().enumerate() {
                    let area = self.session.loops().get(item.loop_index).map(|l| l.area()).unwrap_or(0.0);
                    ui.horizontal(|ui| {
                        ui.label(format!("#{} 面积 {:.2}", item.loop_index + 1, area));
                        for role in [BoundaryRole::Outer, BoundaryRole::Inner] {
                            if ui.selectable_label(item.role == role, role.name()).clicked() {
                                set_role = Some((n, role));
                            }
                        }
                        if ui.small_button("✖").on_hover_text("移除").clicked() {
                            remove = Some(n);
                        }
                    });
                }
            }
            Selection::Segments(list) if !list.is_empty() => {
                let drawing = self.session.drawing();
                for (n, &index) in list.iter().enumerate() {
                    let text = match drawing.and_then(|d| d.segments.get(index).zip(d.sources.get(index))) {
                        Some((segment, source)) => format!(
                            "{} {:.2} mm ({})",
                            segment.type_name(),
                            segment.length(),
                            source.layer
                        ),
                        None => format!("#{}", index),
                    };
                    ui.horizontal(|ui| {
                        ui.label(text);
                        if ui.small_button("✖").on_hover_text("移除").clicked() {
                            remove = Some(n);
                        }
                    });
                }
            }
            _ => {
                ui.label("未选择");
            }
        }

        if let Some((n, role)) = set_role {
            self.session.set_role(n, role);
        }
        if let Some(n) = remove {
            self.session.remove_selected(n);
        }

        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("写入").on_hover_text("追加到板文件 (Enter)").clicked() {
                self.commit();
            }
            if ui.button("清空").on_hover_text("清空选择 (Esc)").clicked() {
                self.session.clear_selection();
            }
        });
    }

    fn layers_panel_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("图层");
        ui.separator();
        if self.layer_entries.is_empty() {
            ui.label("未加载图纸");
        }
        let mut toggled = None;
        for (name, count) in &self.layer_entries {
            let mut visible = self.session.is_layer_visible(name);
            if ui.checkbox(&mut visible, format!("{} ({})", name, count)).changed() {
                toggled = Some((name.clone(), visible));
            }
        }
        if let Some((name, visible)) = toggled {
            self.session.set_layer_visible(&name, visible);
        }

        ui.add_space(12.0);
        ui.heading("设置");
        ui.separator();
        let config = self.session.config_mut();
        egui::Grid::new("settings").num_columns(2).show(ui, |ui| {
            ui.label("铺铜间距");
            ui.add(egui::DragValue::new(&mut config.zone_clearance).speed(0.01).range(0.0..=10.0).suffix(" mm"));
            ui.end_row();
            ui.label("最小宽度");
            ui.add(egui::DragValue::new(&mut config.zone_min_thickness).speed(0.01).range(0.01..=10.0).suffix(" mm"));
            ui.end_row();
            ui.label("圆弧段数");
            ui.add(egui::DragValue::new(&mut config.segments_per_circle).range(8..=720));
            ui.end_row();
            ui.label("翻转 Y");
            ui.checkbox(&mut config.flip_y, "");
            ui.end_row();
            ui.label("偏移 X");
            ui.add(egui::DragValue::new(&mut config.offset_x).speed(0.1).suffix(" mm"));
            ui.end_row();
            ui.label("偏移 Y");
            ui.add(egui::DragValue::new(&mut config.offset_y).speed(0.1).suffix(" mm"));
            ui.end_row();
            ui.label("拾取半径");
            ui.add(egui::DragValue::new(&mut config.pick_radius_px).speed(0.5).range(1.0..=50.0).suffix(" px"));
            ui.end_row();
        });
    }

    /// 重叠区域候选窗口
    fn show_candidates_window(&mut self, ctx: &egui::Context) {
        let Some(candidates) = self.session.pending_candidates().map(|c| c.to_vec()) else {
            self.candidate_hover = None;
            return;
        };

        let mut chosen = None;
        let mut cancel = false;
        let mut hovered = None;
        let loops = self.session.loops();
        egui::Window::new("选择区域")
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label("该点位于多个闭合区域内，按面积从小到大：");
                for (n, &index) in candidates.iter().enumerate() {
                    let Some(lp) = loops.get(index) else {
                        continue;
                    };
                    let response = ui.button(format!("{}. 面积 {:.3}，{} 条边", n + 1, lp.area(), lp.len()));
                    if response.hovered() {
                        hovered = Some(index);
                    }
                    if response.clicked() {
                        chosen = Some(index);
                    }
                }
                ui.separator();
                if ui.button("取消").clicked() {
                    cancel = true;
                }
            });

        self.candidate_hover = hovered;
        if let Some(index) = chosen {
            self.session.choose_candidate(index);
            self.candidate_hover = None;
        } else if cancel {
            self.session.cancel_candidates();
            self.candidate_hover = None;
        }
    }

    fn show_error_window(&mut self, ctx: &egui::Context) {
        let Some(message) = &self.error_message else {
            return;
        };
        let mut close = false;
        let modal = egui::Modal::new(egui::Id::new("error")).show(ctx, |ui| {
            ui.heading("错误");
            ui.add(egui::Label::new(message.as_str()).selectable(true));
            ui.separator();
            if ui.button("确定").clicked() {
                close = true;
            }
        });
        if close || modal.should_close() {
            self.error_message = None;
        }
    }
}

/// 图层表中的图层加上图元实际使用的图层，附带线段数量
fn collect_layers(drawing: &Drawing) -> Vec<(String, usize)> {
    let mut entries: Vec<(String, usize)> = drawing.layers.iter().map(|l| (l.clone(), 0)).collect();
    for source in &drawing.sources {
        match entries.iter_mut().find(|(name, _)| *name == source.layer) {
            Some(entry) => entry.1 += 1,
            None => entries.push((source.layer.clone(), 1)),
        }
    }
    entries
}

impl eframe::App for DxfZoneApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 处理文件操作
        self.process_file_operations();

        // 更新窗口标题
        let title = match self.session.board() {
            Some(board) => {
                let modified = if board.is_modified() { "*" } else { "" };
                format!("dxfzone - {}{}", board.path().display(), modified)
            }
            None => "dxfzone".to_string(),
        };
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(title));

        // 深色主题
        ctx.set_visuals(egui::Visuals::dark());

        // 快捷键（文本框获得焦点时只响应组合键）
        let typing = ctx.wants_keyboard_input();
        let keys = ctx.input(|i| KeyActions {
            open_dxf: i.modifiers.command && i.key_pressed(egui::Key::O),
            save: i.modifiers.command && i.key_pressed(egui::Key::S),
            commit: !typing && i.key_pressed(egui::Key::Enter),
            clear: i.key_pressed(egui::Key::Escape),
            delete: !typing && (i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace)),
            fit: !typing && !i.modifiers.command && i.key_pressed(egui::Key::Z),
        });
        self.apply_keys(keys);

        // UI状态快照
        let mode = self.session.mode();
        let role = self.session.role();
        let has_board = self.session.board().is_some();
        let has_selection = !self.session.selection().is_empty();

        // ===== 顶部菜单 =====
        #[allow(deprecated)]
        egui::TopBottomPanel::top("menu").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("文件", |ui| {
                    if ui.button("📂 打开 DXF (Ctrl+O)").clicked() {
                        self.show_open_dxf_dialog();
                        ui.close();
                    }
                    if ui.button("📂 打开板文件").clicked() {
                        self.show_open_board_dialog();
                        ui.close();
                    }
                    ui.separator();
                    if ui.add_enabled(has_board, egui::Button::new("💾 保存 (Ctrl+S)")).clicked() {
                        self.save_board();
                        ui.close();
                    }
                    if ui.add_enabled(has_board, egui::Button::new("💾 另存为")).clicked() {
                        self.show_save_board_dialog(false);
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("🚪 退出").clicked() {
                        ui.ctx().send_viewport_cmd(egui::ViewportCommand::Close);
                        ui.close();
                    }
                });
                ui.menu_button("编辑", |ui| {
                    let can_commit = has_board && has_selection;
                    if ui.add_enabled(can_commit, egui::Button::new("➕ 写入 (Enter)")).clicked() {
                        self.commit();
                        ui.close();
                    }
                    if ui.add_enabled(can_commit, egui::Button::new("💾 写入并保存")).clicked() {
                        self.commit_and_save();
                        ui.close();
                    }
                    if ui.add_enabled(can_commit, egui::Button::new("💾 写入并另存为")).clicked() {
                        self.show_save_board_dialog(true);
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("🗑 删除最后一项 (Del)").clicked() {
                        self.remove_last_selected();
                        ui.close();
                    }
                    if ui.button("✖ 清空选择 (Esc)").clicked() {
                        self.session.clear_selection();
                        ui.close();
                    }
                });
                ui.menu_button("视图", |ui| {
                    if ui.button("📐 缩放至全部 (Z)").clicked() {
                        self.zoom_to_fit();
                        ui.close();
                    }
                    let mark = if self.show_layers_panel { "☑" } else { "☐" };
                    if ui.button(format!("{} 图层面板", mark)).clicked() {
                        self.show_layers_panel = !self.show_layers_panel;
                        ui.close();
                    }
                });
            });
        });

        // ===== 工具栏 =====
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                for m in [Mode::Zone, Mode::Line] {
                    if ui.selectable_label(mode == m, m.name()).clicked() {
                        self.session.set_mode(m);
                    }
                }
                ui.separator();

                ui.add_enabled_ui(mode == Mode::Zone, |ui| {
                    for r in [BoundaryRole::Outer, BoundaryRole::Inner] {
                        if ui.selectable_label(role == r, r.name()).on_hover_text("新选取区域的用途").clicked() {
                            self.session.set_default_role(r);
                        }
                    }
                });
                ui.separator();

                ui.label("网络");
                let net_names = self.session.board().map(|b| b.net_names()).unwrap_or_default();
                let current_net = self.session.net().unwrap_or("").to_string();
                let mut picked_net = None;
                egui::ComboBox::from_id_salt("net")
                    .selected_text(if current_net.is_empty() { "-" } else { current_net.as_str() })
                    .width(140.0)
                    .show_ui(ui, |ui| {
                        for name in &net_names {
                            if ui.selectable_label(*name == current_net, name.as_str()).clicked() {
                                picked_net = Some(name.clone());
                            }
                        }
                    });
                if let Some(name) = picked_net {
                    if let Err(e) = self.session.set_net(&name) {
                        self.show_error("选择网络失败", &e);
                    }
                }

                ui.label("层");
                let mut layers: Vec<String> = self
                    .session
                    .board()
                    .map(|b| b.copper_layers().to_vec())
                    .unwrap_or_default();
                if layers.is_empty() {
                    layers = DEFAULT_COPPER_LAYERS.iter().map(|s| s.to_string()).collect();
                }
                let current_layer = self.session.layer().to_string();
                let mut picked_layer = None;
                egui::ComboBox::from_id_salt("layer")
                    .selected_text(current_layer.as_str())
                    .width(80.0)
                    .show_ui(ui, |ui| {
                        for name in &layers {
                            if ui.selectable_label(*name == current_layer, name.as_str()).clicked() {
                                picked_layer = Some(name.clone());
                            }
                        }
                    });
                if let Some(name) = picked_layer {
                    self.session.set_layer(&name);
                }
                ui.separator();

                ui.label("线宽");
                ui.add(
                    egui::DragValue::new(&mut self.session.config_mut().track_width)
                        .speed(0.01)
                        .range(0.01..=10.0)
                        .suffix(" mm"),
                );

                ui.label("容差");
                let mut tolerance = self.session.config().tolerance;
                let response = ui.add(
                    egui::DragValue::new(&mut tolerance)
                        .speed(0.0005)
                        .range(0.0..=5.0)
                        .max_decimals(4)
                        .suffix(" mm"),
                );
                if response.changed() {
                    self.session.set_tolerance(tolerance);
                }
                ui.separator();

                if ui
                    .add_enabled(has_board && has_selection, egui::Button::new("➕ 写入"))
                    .on_hover_text("追加到板文件 (Enter)")
                    .clicked()
                {
                    self.commit();
                }
                if ui.button("⊞").on_hover_text("缩放至全部 (Z)").clicked() {
                    self.zoom_to_fit();
                }
            });
        });

        // ===== 状态栏 =====
        let status = self.session.status_message.clone();
        let mouse_world = self.mouse_world_pos;
        let segment_count = self.session.visible_segments().len();
        let loop_count = self.session.loops().len();
        let gap_count = self.session.gap_count();
        let selected_count = self.session.selection().len();
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(&status);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(format!("X:{:>9.3} Y:{:>9.3}", mouse_world.x, mouse_world.y));
                    ui.separator();
                    ui.label(format!("图元: {}", segment_count));
                    ui.separator();
                    ui.label(format!("闭合区域: {}", loop_count));
                    if gap_count > 0 {
                        ui.separator();
                        ui.colored_label(egui::Color32::YELLOW, format!("缺口: {}", gap_count));
                    }
                    if selected_count > 0 {
                        ui.separator();
                        ui.label(format!("选中: {}", selected_count));
                    }
                });
            });
        });

        // ===== 右侧面板 - 图层 =====
        if self.show_layers_panel {
            egui::SidePanel::right("layers").default_width(180.0).show(ctx, |ui| {
                self.layers_panel_ui(ui);
            });
        }

        // ===== 左侧面板 - 选择 =====
        egui::SidePanel::left("selection").default_width(200.0).show(ctx, |ui| {
            self.selection_panel_ui(ui);
        });

        // ===== 中央绘图区域 =====
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(egui::Color32::from_rgb(30, 30, 46)))
            .show(ctx, |ui| {
                let available_rect = ui.available_rect_before_wrap();
                self.viewport_size = (available_rect.width(), available_rect.height());

                let (response, painter) = ui.allocate_painter(available_rect.size(), egui::Sense::click_and_drag());
                let rect = response.rect;

                // 处理鼠标位置
                if let Some(hover_pos) = response.hover_pos() {
                    self.mouse_world_pos = self.screen_to_world(hover_pos, &rect);
                }

                // 处理滚轮缩放
                let scroll_delta = ui.input(|i| i.raw_scroll_delta);
                if scroll_delta.y.abs() > 0.0 && response.hovered() {
                    let zoom_factor = if scroll_delta.y > 0.0 { 1.1 } else { 0.9 };

                    // 缩放时保持鼠标位置不变
                    if let Some(hover_pos) = response.hover_pos() {
                        let world_before = self.screen_to_world(hover_pos, &rect);
                        self.camera_zoom = (self.camera_zoom * zoom_factor).clamp(0.01, 10000.0);
                        let world_after = self.screen_to_world(hover_pos, &rect);
                        self.camera_center.x += world_before.x - world_after.x;
                        self.camera_center.y += world_before.y - world_after.y;
                    }
                }

                // 处理中键平移
                if response.dragged_by(egui::PointerButton::Middle) {
                    let delta = response.drag_delta();
                    self.camera_center.x -= (delta.x as f64) / self.camera_zoom;
                    self.camera_center.y += (delta.y as f64) / self.camera_zoom;
                }

                let extend = ui.input(|i| i.modifiers.shift);

                // 处理左键点击
                if response.clicked_by(egui::PointerButton::Primary) {
                    self.handle_left_click(extend);
                }

                // 走线模式下左键拖动框选
                if mode == Mode::Line {
                    if response.drag_started_by(egui::PointerButton::Primary) {
                        self.box_start = response.interact_pointer_pos();
                    }
                    if response.drag_stopped_by(egui::PointerButton::Primary) {
                        let end = response.interact_pointer_pos().or(response.hover_pos());
                        if let (Some(start), Some(end)) = (self.box_start.take(), end) {
                            self.handle_box_select(start, end, &rect, extend);
                        }
                    }
                } else {
                    self.box_start = None;
                }

                // ===== 绘制 =====
                let hovered = if response.hovered() || self.candidate_hover.is_some() {
                    self.hovered_loop()
                } else {
                    None
                };
                self.draw_drawing(&painter, &rect, hovered);

                let pointer = response.interact_pointer_pos().or(response.hover_pos());
                if let (Some(start), Some(end)) = (self.box_start, pointer) {
                    self.draw_box(&painter, start, end);
                }

                if self.session.drawing().is_none() {
                    painter.text(
                        rect.center(),
                        egui::Align2::CENTER_CENTER,
                        "文件 → 打开 DXF (Ctrl+O)",
                        egui::FontId::proportional(16.0),
                        egui::Color32::from_gray(120),
                    );
                }
            });

        self.show_candidates_window(ctx);
        self.show_error_window(ctx);
    }
}

/// 设置中文字体支持
fn setup_chinese_fonts(ctx: &egui::Context) {
    let mut fonts = egui::FontDefinitions::default();

    // 尝试从系统加载中文字体
    let font_paths = [
        // macOS
        "/System/Library/Fonts/PingFang.ttc",
        "/System/Library/Fonts/Hiragino Sans GB.ttc",
        // Linux
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        // Windows
        "C:\\Windows\\Fonts\\msyh.ttc",
        "C:\\Windows\\Fonts\\simsun.ttc",
    ];

    let Some((path, font_data)) = font_paths
        .iter()
        .find_map(|path| std::fs::read(path).ok().map(|data| (*path, data)))
    else {
        tracing::warn!("No Chinese font found, using default fonts");
        return;
    };

    fonts.font_data.insert(
        "chinese".to_owned(),
        std::sync::Arc::new(egui::FontData::from_owned(font_data)),
    );
    // 放在最前面以优先使用
    for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
        fonts.families.entry(family).or_default().insert(0, "chinese".to_owned());
    }
    info!("Loaded Chinese font from: {}", path);

    ctx.set_fonts(fonts);
}

fn main() -> Result<()> {
    // 初始化日志
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(Level::INFO).finish(),
    )?;

    info!("Starting dxfzone...");

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_title("dxfzone"),
        ..Default::default()
    };

    eframe::run_native(
        "dxfzone",
        native_options,
        Box::new(|cc| {
            setup_chinese_fonts(&cc.egui_ctx);
            Ok(Box::new(DxfZoneApp::default()))
        }),
    )
    .map_err(|e| anyhow::anyhow!("eframe error: {}", e))?;

    Ok(())
}
