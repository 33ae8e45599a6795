use anyhow::Result;
use parry2d::na::{Isometry2, Point2, Vector2};
use parry2d::query;
use parry2d::query::Contact;
use parry2d::shape::{Ball, Cuboid};

use ql::prelude::QlError;

pub type Pos2 = Point2<f32>;
pub type Vec2 = Vector2<f32>;

/// Axis-aligned Bounding Box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AaBB {
    pub min: Pos2,
    pub max: Pos2,
}

impl AaBB {
    pub fn from_center(
        center: Pos2,
        len_x: f32,
        len_y: f32,
    ) -> Self {
        let half = Vec2::new(len_x / 2.0, len_y / 2.0);
        AaBB {
            min: center - half,
            max: center + half,
        }
    }

    pub fn center(&self) -> Pos2 { Pos2::new((self.min.x + self.max.x) / 2.0, (self.min.y + self.max.y) / 2.0) }

    pub fn half_extents(&self) -> Vec2 { Vec2::new((self.max.x - self.min.x) / 2.0, (self.max.y - self.min.y) / 2.0) }

    pub fn translate(
        &self,
        value: Vec2,
    ) -> Self {
        AaBB {
            min: self.min + value,
            max: self.max + value,
        }
    }

    pub fn contains(
        &self,
        p: Pos2,
    ) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Circle {
    pub center: Pos2,
    pub radius: f32,
}

/// r = v - 2 (v ⋅ n) n
pub fn reflected_vector(
    v: Vec2,
    surface_normal: Vec2,
) -> Vec2 {
    v - 2.0 * v.dot(&surface_normal) * surface_normal
}

/// Contact between a circle (shape 1) and an AaBB (shape 2), if they are closer than `prediction`.
/// `normal2` of the result points from the box surface towards the circle.
pub fn contact_test_circle_aabb(
    circle: &Circle,
    aabb: &AaBB,
    prediction: f32,
) -> Result<Option<Contact>> {
    let aabb_center = aabb.center();
    let contact = query::contact(
        &Isometry2::translation(circle.center.x, circle.center.y),
        &Ball::new(circle.radius),
        &Isometry2::translation(aabb_center.x, aabb_center.y),
        &Cuboid::new(aabb.half_extents()),
        prediction,
    )
    .map_err(|_| QlError::from("contact calculation failed"))?;
    Ok(contact)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn assert_eq_roughly(
        what: &str,
        a: f32,
        b: f32,
    ) {
        assert!((a - b).abs() <= 0.001, "'{what}' difference between {a} and {b}");
    }

    #[rstest]
    #[case(Vec2::new(1.0, 1.0), Vec2::new(-1.0, 0.0), Vec2::new(-1.0, 1.0))]
    #[case(Vec2::new(1.0, -2.0), Vec2::new(0.0, 1.0), Vec2::new(1.0, 2.0))]
    #[case(Vec2::new(0.0, 3.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 3.0))]
    fn test_reflected_vector(
        #[case] v: Vec2,
        #[case] normal: Vec2,
        #[case] expected: Vec2,
    ) {
        let r = reflected_vector(v, normal);
        assert_eq_roughly("x", r.x, expected.x);
        assert_eq_roughly("y", r.y, expected.y);
    }

    #[test]
    fn test_aabb() {
        let aabb = AaBB::from_center(Pos2::new(10.0, 20.0), 4.0, 16.0);
        assert_eq!(aabb.min, Pos2::new(8.0, 12.0));
        assert_eq!(aabb.max, Pos2::new(12.0, 28.0));
        assert_eq!(aabb.center(), Pos2::new(10.0, 20.0));
        assert!(aabb.contains(Pos2::new(12.0, 12.0)));
        assert!(!aabb.contains(Pos2::new(12.1, 12.0)));
        assert_eq!(aabb.translate(Vec2::new(1.0, -2.0)).center(), Pos2::new(11.0, 18.0));
    }

    #[rstest]
    // approaching the left face
    #[case(Pos2::new(5.5, 20.0), Some(Vec2::new(-1.0, 0.0)))]
    // touching the bottom face
    #[case(Pos2::new(10.0, 29.5), Some(Vec2::new(0.0, 1.0)))]
    // far away
    #[case(Pos2::new(30.0, 20.0), None)]
    fn test_contact_circle_aabb(
        #[case] center: Pos2,
        #[case] expected_normal: Option<Vec2>,
    ) {
        let aabb = AaBB::from_center(Pos2::new(10.0, 20.0), 4.0, 16.0);
        let contact = contact_test_circle_aabb(&Circle { center, radius: 2.0 }, &aabb, 1.0).unwrap();
        match (contact, expected_normal) {
            (None, None) => (),
            (Some(c), Some(n)) => {
                assert_eq_roughly("normal.x", c.normal2.x, n.x);
                assert_eq_roughly("normal.y", c.normal2.y, n.y);
            }
            (c, n) => panic!("contact {:?} expected normal {:?}", c, n),
        }
    }
}
