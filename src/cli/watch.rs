//! Watch command implementation - Interactive TUI viewer.

// CLI watch uses intentional casts for display and timing
#![allow(
    clippy::needless_pass_by_value,
    clippy::cast_possible_truncation
)]

use super::{CliError, WorldArgs};
use bastion::game::{Command, PLAYER_KINGDOM};
use bastion::render::{Cell, Occupancy, cell_at, describe_event, render_status};
use bastion::sim::new_simulation;
use bastion::{Coord, KingdomId, Simulation, Snapshot};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::collections::VecDeque;
use std::io::stdout;
use std::path::Path;
use std::time::{Duration, Instant};

/// Events kept in the log panel.
const LOG_LINES: usize = 12;

/// Execute the watch command.
///
/// # Errors
///
/// Returns an error if the world cannot be built or the TUI fails.
pub(crate) fn execute(world: &WorldArgs, snapshot: Option<&Path>, speed: u64) -> Result<(), CliError> {
    let sim = match snapshot {
        Some(path) => {
            let restored = Snapshot::load(path)
                .map_err(|e| CliError::new(format!("Failed to read {}: {e}", path.display())))?
                .restore()?;
            Simulation::seeded(restored.state, world.seed())
        }
        None => new_simulation(world.seed(), &world.config()?)?,
    };

    run_tui(sim, speed)
}

/// App state for the TUI.
struct App {
    sim: Simulation,
    paused: bool,
    speed_ms: u64,
    /// Simulation steps per frame.
    steps_per_frame: u32,
    last_step: Instant,
    log: VecDeque<String>,
}

impl App {
    fn new(sim: Simulation, speed_ms: u64) -> Self {
        Self {
            sim,
            paused: true, // Start paused
            speed_ms,
            steps_per_frame: 1,
            last_step: Instant::now(),
            log: VecDeque::with_capacity(LOG_LINES),
        }
    }

    fn push_log(&mut self, line: String) {
        if self.log.len() == LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    fn step_forward(&mut self) {
        for _ in 0..self.steps_per_frame {
            if self.sim.state.is_game_over() {
                break;
            }
            for event in self.sim.step() {
                if let Some(line) = describe_event(&event) {
                    self.push_log(line);
                }
            }
        }
        self.last_step = Instant::now();
    }

    fn command(&mut self, command: Command) {
        if let Err(e) = self.sim.execute(command) {
            self.push_log(format!("! {e}"));
        }
    }

    fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    fn increase_speed(&mut self) {
        self.speed_ms = self.speed_ms.saturating_sub(25).max(10);
    }

    fn decrease_speed(&mut self) {
        self.speed_ms = (self.speed_ms + 25).min(1000);
    }

    fn should_auto_step(&self) -> bool {
        !self.paused
            && !self.sim.state.is_game_over()
            && self.last_step.elapsed() >= Duration::from_millis(self.speed_ms)
    }
}

fn run_tui(sim: Simulation, speed: u64) -> Result<(), CliError> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).map_err(|e| CliError::new(e.to_string()))?;

    let mut app = App::new(sim, speed);

    loop {
        terminal.draw(|f| ui(f, &app)).map_err(|e| CliError::new(e.to_string()))?;

        if app.should_auto_step() {
            app.step_forward();
        }

        if !event::poll(Duration::from_millis(20))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Char(' ') => app.toggle_pause(),
            KeyCode::Char('n' | '.') => {
                app.paused = true;
                app.step_forward();
            }
            KeyCode::Char('+' | '=') => app.increase_speed(),
            KeyCode::Char('-') => app.decrease_speed(),
            KeyCode::Char(']') => app.steps_per_frame = (app.steps_per_frame * 2).min(64),
            KeyCode::Char('[') => app.steps_per_frame = (app.steps_per_frame / 2).max(1),
            KeyCode::Up | KeyCode::Char('k') => app.command(Command::MovePlayer { dx: 0, dy: -1 }),
            KeyCode::Down | KeyCode::Char('j') => app.command(Command::MovePlayer { dx: 0, dy: 1 }),
            KeyCode::Left | KeyCode::Char('h') => app.command(Command::MovePlayer { dx: -1, dy: 0 }),
            KeyCode::Right | KeyCode::Char('l') => app.command(Command::MovePlayer { dx: 1, dy: 0 }),
            KeyCode::Char('f') => app.command(Command::AttackAdjacentUnits),
            _ => {}
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    Ok(())
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Main content
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    render_header(f, chunks[0], app);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(chunks[1]);
    let side_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(main_chunks[1]);

    render_map(f, main_chunks[0], app);
    render_stats(f, side_chunks[0], app);
    render_log(f, side_chunks[1], app);
    render_footer(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let state = &app.sim.state;
    let status = if state.is_game_over() {
        "GAME OVER"
    } else if app.paused {
        "PAUSED"
    } else {
        "RUNNING"
    };
    let seconds = state.now_ms / 1000;
    let title = format!(
        " Bastion | {}:{:02} | Year {} | {status} | {}ms x{} ",
        seconds / 60,
        seconds % 60,
        state.game_years(),
        app.speed_ms,
        app.steps_per_frame
    );

    let header = Paragraph::new(title)
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL));

    f.render_widget(header, area);
}

/// First visible index so that `focus` stays centred without leaving the map.
fn viewport_origin(focus: u16, visible: u16, size: u16) -> u16 {
    focus.saturating_sub(visible / 2).min(size.saturating_sub(visible))
}

fn render_map(f: &mut Frame, area: Rect, app: &App) {
    let state = &app.sim.state;
    let size = state.map.size();
    let occupancy = Occupancy::of(state);

    let visible_width = area.width.saturating_sub(2).min(size);
    let visible_height = area.height.saturating_sub(2).min(size);
    let focus = state.player.position;
    let left = viewport_origin(focus.x, visible_width, size);
    let top = viewport_origin(focus.y, visible_height, size);

    let mut lines: Vec<Line> = Vec::with_capacity(usize::from(visible_height));
    for y in top..top + visible_height {
        let spans: Vec<Span> = (left..left + visible_width)
            .map(|x| {
                let cell = cell_at(state, &occupancy, Coord::new(x, y));
                Span::styled(cell.glyph.to_string(), cell_style(cell))
            })
            .collect();
        lines.push(Line::from(spans));
    }

    let title = format!(" Map ({left},{top}) ");
    let map_widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));

    f.render_widget(map_widget, area);
}

fn kingdom_color(id: KingdomId) -> Color {
    match id {
        0 => Color::Cyan,
        1 => Color::Red,
        2 => Color::Blue,
        3 => Color::Green,
        4 => Color::Yellow,
        _ => Color::White,
    }
}

fn cell_style(cell: Cell) -> Style {
    let style = Style::default().fg(cell.owner.map_or(Color::DarkGray, kingdom_color));
    match cell.glyph {
        '@' | '*' => style.add_modifier(Modifier::BOLD),
        '#' | 'p' | 'w' | 'a' => style,
        'T' | 'S' | 'B' if cell.owner.is_none() => Style::default().fg(Color::Gray),
        _ if cell.owner.is_some() => style.add_modifier(Modifier::DIM),
        _ => style,
    }
}

fn render_stats(f: &mut Frame, area: Rect, app: &App) {
    let lines: Vec<Line> = render_status(&app.sim.state)
        .lines()
        .map(|line| {
            let owner = line
                .strip_prefix('[')
                .and_then(|rest| rest.chars().next())
                .and_then(|c| c.to_digit(10));
            match owner {
                Some(id) => Line::from(Span::styled(
                    line.to_string(),
                    Style::default()
                        .fg(kingdom_color(id as KingdomId))
                        .add_modifier(Modifier::BOLD),
                )),
                None => Line::from(line.to_string()),
            }
        })
        .collect();

    let stats_widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Kingdoms "))
        .wrap(Wrap { trim: false });

    f.render_widget(stats_widget, area);
}

fn render_log(f: &mut Frame, area: Rect, app: &App) {
    let lines: Vec<Line> = app.log.iter().map(|l| Line::from(l.as_str())).collect();
    let log_widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Events "))
        .wrap(Wrap { trim: true });

    f.render_widget(log_widget, area);
}

fn render_footer(f: &mut Frame, area: Rect, app: &App) {
    let controls = if app.sim.state.is_game_over() {
        " [q] Quit "
    } else if app.sim.state.kingdom(PLAYER_KINGDOM).is_some_and(|k| k.alive) {
        " [q] Quit  [Space] Pause  [n] Step  [+/-] Speed  [[/]] Steps  [arrows] Move  [f] Fight "
    } else {
        " [q] Quit  [Space] Pause  [n] Step  [+/-] Speed  [[/]] Steps "
    };

    let footer = Paragraph::new(controls)
        .style(Style::default().fg(Color::Gray))
        .block(Block::default().borders(Borders::ALL));

    f.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_follows_focus_within_bounds() {
        assert_eq!(viewport_origin(50, 20, 100), 40);
        assert_eq!(viewport_origin(3, 20, 100), 0);
        assert_eq!(viewport_origin(98, 20, 100), 80);
        assert_eq!(viewport_origin(10, 100, 64), 0);
    }
}
