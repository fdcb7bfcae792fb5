//! dxfzone 核心几何
//!
//! 提供线段/圆弧图元，以及从无序图元中识别闭合区域的算法。
//!
//! # 示例
//!
//! ```rust
//! use dxfzone_core::prelude::*;
//!
//! let square = [
//!     Line::new(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)),
//!     Line::new(Point2::new(10.0, 0.0), Point2::new(10.0, 10.0)),
//!     Line::new(Point2::new(10.0, 10.0), Point2::new(0.0, 10.0)),
//!     Line::new(Point2::new(0.0, 10.0), Point2::new(0.0, 0.0)),
//! ]
//! .map(Segment::Line);
//!
//! let loops: Vec<Loop> = assemble(&square, 0.001).collect();
//! assert_eq!(loops.len(), 1);
//! ```

pub mod chain;
pub mod geometry;
pub mod math;
pub mod region;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::chain::order_chain;
    pub use crate::geometry::{Arc, Line, Polyline, PolylineVertex, Segment};
    pub use crate::math::{BoundingBox2, Point2, Vector2};
    pub use crate::region::{assemble, count_gaps, loops_containing, Loop, LoopEdge, Loops};
}
