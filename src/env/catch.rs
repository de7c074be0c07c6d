use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Environment, Step};
use crate::error::{DqnError, Result};
use crate::replay_buffer::Frame;

const PADDLE_HALF_WIDTH: usize = 1;

/// A ball falls one row per step; a three-cell paddle on the bottom row
/// moves left, stays, or moves right. Catching the ball pays +1, missing it
/// pays -1, and either ends the episode.
///
/// Frames are single-channel, `grid_size * pixel_scale` pixels on a side,
/// with the ball and paddle drawn at 255 on a black background.
#[derive(Clone, Debug)]
pub struct Catch {
    grid_size: usize,
    pixel_scale: usize,
    rng: StdRng,
    ball_row: usize,
    ball_col: usize,
    paddle_col: usize,
    done: bool,
}

impl Catch {
    pub fn new(grid_size: usize, pixel_scale: usize, seed: u64) -> Result<Self> {
        if grid_size < 2 * PADDLE_HALF_WIDTH + 1 {
            return Err(DqnError::configuration(
                "grid_size".to_string(),
                format!("must be at least {}", 2 * PADDLE_HALF_WIDTH + 1),
            ));
        }
        if pixel_scale == 0 {
            return Err(DqnError::configuration("pixel_scale", "must be greater than 0"));
        }
        Ok(Catch {
            grid_size,
            pixel_scale,
            rng: StdRng::seed_from_u64(seed),
            ball_row: 0,
            ball_col: 0,
            paddle_col: grid_size / 2,
            // Must be reset before the first step.
            done: true,
        })
    }

    /// Side length of the rendered frames in pixels.
    pub fn frame_size(&self) -> usize {
        self.grid_size * self.pixel_scale
    }

    fn render(&self) -> Frame {
        let size = self.frame_size();
        let scale = self.pixel_scale;
        let paddle_row = self.grid_size - 1;
        let paddle_lo = self.paddle_col.saturating_sub(PADDLE_HALF_WIDTH);
        let paddle_hi = (self.paddle_col + PADDLE_HALF_WIDTH).min(self.grid_size - 1);

        Array3::from_shape_fn((size, size, 1), |(y, x, _)| {
            let (row, col) = (y / scale, x / scale);
            let ball = row == self.ball_row && col == self.ball_col;
            let paddle = row == paddle_row && (paddle_lo..=paddle_hi).contains(&col);
            if ball || paddle {
                255
            } else {
                0
            }
        })
    }
}

impl Environment for Catch {
    fn reset(&mut self) -> Result<Frame> {
        self.ball_row = 0;
        self.ball_col = self.rng.gen_range(0..self.grid_size);
        self.paddle_col = self.grid_size / 2;
        self.done = false;
        Ok(self.render())
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        if self.done {
            return Err(DqnError::precondition("step called on a finished episode; call reset first"));
        }
        match action {
            0 => self.paddle_col = self.paddle_col.saturating_sub(1).max(PADDLE_HALF_WIDTH),
            1 => {}
            2 => self.paddle_col = (self.paddle_col + 1).min(self.grid_size - 1 - PADDLE_HALF_WIDTH),
            _ => {
                return Err(DqnError::precondition(format!(
                    "action {} out of range for {} actions",
                    action,
                    self.num_actions()
                )))
            }
        }

        self.ball_row += 1;
        let mut reward = 0.0;
        if self.ball_row == self.grid_size - 1 {
            self.done = true;
            reward = if self.ball_col.abs_diff(self.paddle_col) <= PADDLE_HALF_WIDTH {
                1.0
            } else {
                -1.0
            };
        }
        Ok(Step::new(self.render(), reward, self.done))
    }

    fn num_actions(&self) -> usize {
        3
    }
}
