use std::collections::VecDeque;

use console_engine::pixel;
use console_engine::screen::Screen;
use image::Luma;
use ndarray::Array1;

use ql::ml_model::model::ToFeatureVector;
use ql::prelude::DebugVisualizer;

use crate::environment::preprocessing::{normalize, NEUTRAL_INTENSITY};
use crate::game::drawer::{GrayFrame, AGENT_INTENSITY, BALL_INTENSITY, OPPONENT_INTENSITY};

/// The `NUM_FRAMES` most recent (preprocessed) frames.
///
/// A fresh buffer holds blank frames, which normalize to zero.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRingBuffer<const NUM_FRAMES: usize> {
    frame_size_x: u32,
    frame_size_y: u32,
    /// newest at the front
    buffer: VecDeque<GrayFrame>,
}

impl<const NUM_FRAMES: usize> FrameRingBuffer<NUM_FRAMES> {
    pub fn new(
        frame_size_x: u32,
        frame_size_y: u32,
    ) -> Self {
        assert!(NUM_FRAMES > 0);
        Self {
            frame_size_x,
            frame_size_y,
            buffer: (0..NUM_FRAMES).map(|_| Self::blank_frame(frame_size_x, frame_size_y)).collect(),
        }
    }

    fn blank_frame(
        frame_size_x: u32,
        frame_size_y: u32,
    ) -> GrayFrame {
        GrayFrame::from_pixel(frame_size_x, frame_size_y, Luma([NEUTRAL_INTENSITY]))
    }

    pub fn frame_size(&self) -> (u32, u32) { (self.frame_size_x, self.frame_size_y) }

    pub fn add(
        &mut self,
        frame: GrayFrame,
    ) {
        assert_eq!(frame.dimensions(), (self.frame_size_x, self.frame_size_y));
        self.buffer.pop_back();
        self.buffer.push_front(frame);
    }

    /// `0` = most recent frame
    pub fn get(
        &self,
        steps_into_history: usize,
    ) -> &GrayFrame {
        assert!(steps_into_history < NUM_FRAMES, "available steps into history: 0..{}", NUM_FRAMES - 1);
        &self.buffer[steps_into_history]
    }
}

impl<const NUM_FRAMES: usize> ToFeatureVector for FrameRingBuffer<NUM_FRAMES> {
    fn feature_len(&self) -> usize { NUM_FRAMES * (self.frame_size_x * self.frame_size_y) as usize }

    /// normalized frames, most recent first, each flattened row by row
    fn to_feature_vector(&self) -> Array1<f32> {
        let mut features = Vec::with_capacity(self.feature_len());
        for frame in self.buffer.iter() {
            features.extend(normalize(frame).iter());
        }
        Array1::from(features)
    }
}

impl<const NUM_FRAMES: usize> DebugVisualizer for FrameRingBuffer<NUM_FRAMES> {
    fn one_line_info(&self) -> String {
        let ball_visible = self.get(0).pixels().any(|p| p.0[0] == BALL_INTENSITY);
        format!(
            "FrameRingBuffer: {} frames of {}x{}, ball visible: {}",
            NUM_FRAMES, self.frame_size_x, self.frame_size_y, ball_visible
        )
    }

    fn render_to_console(&self) -> Screen {
        let frame = self.get(0);
        let mut screen = Screen::new_fill(self.frame_size_x, self.frame_size_y, pixel::pxl(' '));
        for (x, y, p) in frame.enumerate_pixels() {
            let c = match p.0[0] {
                BALL_INTENSITY => 'o',
                AGENT_INTENSITY => '█',
                OPPONENT_INTENSITY => '▒',
                _ => continue,
            };
            screen.set_pxl(x as i32, y as i32, pixel::pxl(c));
        }
        screen
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{s, ArrayView1};

    use super::*;

    fn frame_features(
        features: &Array1<f32>,
        frame_len: usize,
        steps_into_history: usize,
    ) -> ArrayView1<'_, f32> {
        features.slice(s![steps_into_history * frame_len..(steps_into_history + 1) * frame_len])
    }

    #[test]
    fn test_fresh_buffer_is_blank() {
        let buffer = FrameRingBuffer::<4>::new(4, 3);
        assert_eq!(buffer.feature_len(), 48);
        let v = buffer.to_feature_vector();
        assert_eq!(v.len(), 48);
        assert!(v.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_newest_frame_comes_first() {
        let mut buffer = FrameRingBuffer::<3>::new(2, 2);
        for value in [0_u8, 115, 230, 230] {
            buffer.add(GrayFrame::from_pixel(2, 2, Luma([value])));
        }
        assert_eq!(buffer.get(0).get_pixel(0, 0).0[0], 230);
        assert_eq!(buffer.get(2).get_pixel(0, 0).0[0], 115);

        let v = buffer.to_feature_vector();
        assert!(frame_features(&v, 4, 0).iter().all(|&e| e == 0.5));
        assert!(frame_features(&v, 4, 1).iter().all(|&e| e == 0.5));
        assert!(frame_features(&v, 4, 2).iter().all(|&e| e == 0.0));
    }

    #[test]
    #[should_panic]
    fn test_history_is_limited() {
        let buffer = FrameRingBuffer::<2>::new(2, 2);
        buffer.get(2);
    }

    #[test]
    fn test_render() {
        let mut buffer = FrameRingBuffer::<2>::new(5, 5);
        let mut frame = GrayFrame::from_pixel(5, 5, Luma([17]));
        frame.put_pixel(2, 2, Luma([BALL_INTENSITY]));
        buffer.add(frame);
        assert!(buffer.one_line_info().contains("ball visible: true"));
        let screen = buffer.render_to_console();
        assert_eq!(screen.get_pxl(2, 2).unwrap().chr, 'o');
    }
}
