//! dxfzone 文件处理
//!
//! 支持：
//! - `.dxf` 导入为线段与圆弧
//! - `.kicad_pcb` 读取网络/铜层，追加铺铜、禁布区和走线

pub mod board;
pub mod dxf_io;
pub mod emit;
pub mod error;
pub mod sexp;

pub use board::{Board, Net};
pub use dxf_io::{Drawing, EntityKind, SegmentSource};
pub use emit::{BoardItem, EmitSettings, IdStyle};
pub use error::FileError;
