use console_engine::screen::Screen;

use ql::prelude::{Action, DebugVisualizer};

/// Plain text of a console screen, one line per row, colors dropped
pub fn screen_text(screen: &Screen) -> String {
    (0..screen.get_height() as i32)
        .map(|y| {
            (0..screen.get_width() as i32)
                .map(|x| screen.get_pxl(x, y).map(|p| p.chr).unwrap_or(' '))
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// What `play` prints per step: the rendered state followed by an info line
pub fn step_view<S, A>(
    state: &S,
    action: A,
    reward: f32,
) -> String
where
    S: DebugVisualizer,
    A: Action,
{
    format!(
        "{}\n{} action: {}, reward: {:.1}",
        screen_text(&state.render_to_console()),
        state.one_line_info(),
        action,
        reward
    )
}
