//! 数学类型与包围盒

use serde::{Deserialize, Serialize};

pub type Point2 = nalgebra::Point2<f64>;
pub type Vector2 = nalgebra::Vector2<f64>;

/// 浮点比较的默认容差
pub const EPSILON: f64 = 1e-9;

/// 轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2 {
    pub min: Point2,
    pub max: Point2,
}

impl BoundingBox2 {
    pub fn new(min: Point2, max: Point2) -> Self {
        Self { min, max }
    }

    /// 空包围盒（min > max），扩展任意点后生效
    pub fn empty() -> Self {
        Self {
            min: Point2::new(f64::MAX, f64::MAX),
            max: Point2::new(f64::MIN, f64::MIN),
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Point2>) -> Self {
        let mut bbox = Self::empty();
        for p in points {
            bbox.expand_to_include(&p);
        }
        bbox
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn expand_to_include(&mut self, p: &Point2) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    /// 合并另一个包围盒
    pub fn union(&self, other: &BoundingBox2) -> BoundingBox2 {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        BoundingBox2::new(
            Point2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            Point2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        )
    }

    pub fn contains(&self, p: &Point2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// 是否完全包含另一个包围盒
    pub fn contains_box(&self, other: &BoundingBox2) -> bool {
        self.contains(&other.min) && self.contains(&other.max)
    }

    pub fn intersects(&self, other: &BoundingBox2) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point2 {
        Point2::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }
}

/// 将角度归一化到 [0, 2π)
pub fn normalize_angle(angle: f64) -> f64 {
    angle.rem_euclid(std::f64::consts::TAU)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_from_points() {
        let bbox = BoundingBox2::from_points([Point2::new(1.0, 5.0), Point2::new(-2.0, 3.0)]);
        assert_eq!(bbox.min, Point2::new(-2.0, 3.0));
        assert_eq!(bbox.max, Point2::new(1.0, 5.0));
        assert!(bbox.contains(&Point2::new(0.0, 4.0)));
    }

    #[test]
    fn test_empty_union() {
        let a = BoundingBox2::empty();
        let b = BoundingBox2::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0));
        assert!(a.is_empty());
        assert_eq!(a.union(&b), b);
    }

    #[test]
    fn test_normalize_angle() {
        let a = normalize_angle(-std::f64::consts::FRAC_PI_2);
        assert!((a - 1.5 * std::f64::consts::PI).abs() < EPSILON);
    }
}
