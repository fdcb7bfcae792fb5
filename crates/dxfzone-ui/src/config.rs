//! 工具配置
//!
//! 所有参数只通过界面修改，没有命令行或环境变量。

use dxfzone_core::math::Vector2;
use dxfzone_file::EmitSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// 端点匹配容差（图纸单位，mm）
    pub tolerance: f64,
    /// 走线宽度（mm）
    pub track_width: f64,
    /// 铺铜与焊盘的间距（mm）
    pub zone_clearance: f64,
    /// 铺铜最小宽度（mm）
    pub zone_min_thickness: f64,
    /// 整圆离散段数，用于铺铜轮廓和点选
    pub segments_per_circle: usize,
    /// 写入板文件时翻转 Y 轴
    pub flip_y: bool,
    /// 写入坐标的偏移（mm）
    pub offset_x: f64,
    pub offset_y: f64,
    /// 线选模式的拾取半径（屏幕像素）
    pub pick_radius_px: f32,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.001,
            track_width: 0.2,
            zone_clearance: 0.5,
            zone_min_thickness: 0.25,
            segments_per_circle: 36,
            flip_y: true,
            offset_x: 0.0,
            offset_y: 0.0,
            pick_radius_px: 6.0,
        }
    }
}

impl ToolConfig {
    pub fn emit_settings(&self) -> EmitSettings {
        EmitSettings {
            flip_y: self.flip_y,
            offset: Vector2::new(self.offset_x, self.offset_y),
        }
    }
}
