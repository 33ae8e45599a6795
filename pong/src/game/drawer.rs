use image::{ImageBuffer, Luma};
use itertools::iproduct;

use crate::game::algebra_2d::AaBB;
use crate::game::mechanics::{Ball, PongMechanics, FIELD_LEN_X, FIELD_LEN_Y};

/// Gray-scaled image
pub type GrayFrame = ImageBuffer<Luma<u8>, Vec<u8>>;

pub const FRAME_SIZE_X: u32 = FIELD_LEN_X as u32;
pub const FRAME_SIZE_Y: u32 = FIELD_LEN_Y as u32;

// intensities of the Atari Pong play field (blue channel)
pub const BACKGROUND_INTENSITY: u8 = 17;
pub const OPPONENT_INTENSITY: u8 = 74;
pub const AGENT_INTENSITY: u8 = 92;
pub const BALL_INTENSITY: u8 = 236;

/// Rasterizes the game to a frame of one pixel per field unit
pub fn draw(mechanics: &PongMechanics) -> GrayFrame {
    let mut frame = GrayFrame::from_pixel(FRAME_SIZE_X, FRAME_SIZE_Y, Luma([BACKGROUND_INTENSITY]));
    fill_aabb(&mut frame, &mechanics.opponent_paddle.shape, OPPONENT_INTENSITY);
    fill_aabb(&mut frame, &mechanics.agent_paddle.shape, AGENT_INTENSITY);
    if mechanics.ball_in_play() && !mechanics.finished() {
        fill_ball(&mut frame, &mechanics.ball, BALL_INTENSITY);
    }
    frame
}

/// index range of the pixels whose centers lie within `min..=max`, clipped to `0..len`
fn pixel_range(
    min: f32,
    max: f32,
    len: u32,
) -> std::ops::Range<u32> {
    let from = (min - 0.5).ceil().max(0.0) as u32;
    let to = ((max - 0.5).floor() + 1.0).clamp(0.0, len as f32) as u32;
    from.min(to)..to
}

fn fill_aabb(
    frame: &mut GrayFrame,
    aabb: &AaBB,
    intensity: u8,
) {
    let xs = pixel_range(aabb.min.x, aabb.max.x, frame.width());
    let ys = pixel_range(aabb.min.y, aabb.max.y, frame.height());
    for (x, y) in iproduct!(xs, ys) {
        frame.put_pixel(x, y, Luma([intensity]));
    }
}

fn fill_ball(
    frame: &mut GrayFrame,
    ball: &Ball,
    intensity: u8,
) {
    let c = ball.shape.center;
    let r = ball.shape.radius;
    let xs = pixel_range(c.x - r, c.x + r, frame.width());
    let ys = pixel_range(c.y - r, c.y + r, frame.height());
    for (x, y) in iproduct!(xs, ys) {
        let dx = x as f32 + 0.5 - c.x;
        let dy = y as f32 + 0.5 - c.y;
        if dx * dx + dy * dy <= r * r {
            frame.put_pixel(x, y, Luma([intensity]));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::game::algebra_2d::Pos2;
    use crate::game::mechanics::{PADDLE_LEN_X, PADDLE_LEN_Y, POINTS_TO_WIN};

    use super::*;

    fn count_pixels(
        frame: &GrayFrame,
        intensity: u8,
    ) -> usize {
        frame.pixels().filter(|p| p.0[0] == intensity).count()
    }

    #[test]
    fn test_pixel_range() {
        assert_eq!(pixel_range(2.0, 6.0, 160), 2..6);
        assert_eq!(pixel_range(-3.0, 1.0, 160), 0..1);
        assert_eq!(pixel_range(158.0, 163.0, 160), 158..160);
        assert_eq!(pixel_range(170.0, 175.0, 160), 160..160);
    }

    #[test]
    fn test_draw_paddles_and_ball() {
        let mut mechanics = PongMechanics::with_seed(POINTS_TO_WIN, 1);
        let frame = draw(&mechanics);
        assert_eq!(frame.dimensions(), (FRAME_SIZE_X, FRAME_SIZE_Y));
        let paddle_pixels = (PADDLE_LEN_X * PADDLE_LEN_Y) as usize;
        assert_eq!(count_pixels(&frame, AGENT_INTENSITY), paddle_pixels);
        assert_eq!(count_pixels(&frame, OPPONENT_INTENSITY), paddle_pixels);
        // not yet served
        assert_eq!(count_pixels(&frame, BALL_INTENSITY), 0);

        mechanics.serve_countdown = 0;
        mechanics.ball.shape.center = Pos2::new(50.0, 50.0);
        let frame = draw(&mechanics);
        assert_eq!(count_pixels(&frame, BALL_INTENSITY), 12);
        assert_eq!(frame.get_pixel(50, 50).0[0], BALL_INTENSITY);
        assert_eq!(frame.get_pixel(0, 0).0[0], BACKGROUND_INTENSITY);
    }
}
