pub mod charting;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::app::{App, AppState};
use crate::history::{summarize, HistoryStore};
use crate::question::{GenerationConfig, Operator};
use crate::session::{SessionStatus, SESSION_SECS};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;
const MIN_ANSWER_WIDTH: usize = 12;

impl<S: HistoryStore> Widget for &App<S> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match (self.state, self.controller.status()) {
            (AppState::History, _) => render_history(self, area, buf),
            (AppState::Quiz, SessionStatus::Running) => render_running(self, area, buf),
            (AppState::Quiz, _) => render_menu(self, area, buf),
        }
    }
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn italic() -> Style {
    Style::default().add_modifier(Modifier::ITALIC)
}

fn render_running<S: HistoryStore>(app: &App<S>, area: Rect, buf: &mut Buffer) {
    let question = app
        .controller
        .current_question()
        .map(|q| q.display_text().to_string())
        .unwrap_or_default();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(1), // time left
            Constraint::Length(1), // score
            Constraint::Length(1), // padding
            Constraint::Length(1), // question
            Constraint::Length(3), // answer box
            Constraint::Min(0),
            Constraint::Length(1), // legend
        ])
        .split(area);

    let seconds = app.controller.seconds_remaining();
    let timer_style = if seconds <= 10 {
        bold().fg(Color::Red)
    } else {
        bold().add_modifier(Modifier::DIM)
    };
    Paragraph::new(Span::styled(format!("Time Left: {seconds}s"), timer_style))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

    Paragraph::new(Span::styled(
        format!("Score: {}", app.controller.score()),
        bold().fg(Color::Green),
    ))
    .alignment(Alignment::Center)
    .render(chunks[2], buf);

    Paragraph::new(Span::styled(question.clone(), bold().fg(Color::Cyan)))
        .alignment(Alignment::Center)
        .render(chunks[4], buf);

    // answer box sized to the question, centred
    let box_width = (question.width().max(MIN_ANSWER_WIDTH) + 2).min(chunks[5].width as usize) as u16;
    let box_area = Rect {
        x: chunks[5].x + (chunks[5].width.saturating_sub(box_width)) / 2,
        width: box_width,
        ..chunks[5]
    };
    Paragraph::new(Span::styled(app.answer.clone(), bold()))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center)
        .render(box_area, buf);

    Paragraph::new(Span::styled("(esc) abandon run", italic())).render(chunks[7], buf);
}

fn operator_toggles(config: &GenerationConfig) -> String {
    Operator::ALL
        .iter()
        .enumerate()
        .map(|(i, op)| {
            let mark = if config.enabled_operators.contains(op) {
                "x"
            } else {
                " "
            };
            format!("[{mark}] {op} ({})", i + 1)
        })
        .collect::<Vec<_>>()
        .join("  ")
}

fn render_menu<S: HistoryStore>(app: &App<S>, area: Rect, buf: &mut Buffer) {
    let config = app.controller.config();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1), // title
            Constraint::Length(1), // padding
            Constraint::Length(2), // last result
            Constraint::Length(5), // configuration
            Constraint::Min(0),
            Constraint::Length(1), // legend
        ])
        .split(area);

    Paragraph::new(Span::styled(
        format!("Timed Mental Math ({SESSION_SECS}s) - {}", app.controller.username()),
        bold(),
    ))
    .alignment(Alignment::Center)
    .render(chunks[0], buf);

    let mut result_lines = Vec::new();
    if app.controller.status() == SessionStatus::Finished {
        let display = app
            .controller
            .current_question()
            .map(|q| q.display_text().to_string())
            .unwrap_or_default();
        result_lines.push(Line::from(Span::styled(
            format!("{display}  Final score: {}", app.controller.score()),
            bold().fg(Color::Magenta),
        )));
    }
    if let Some(notice) = &app.notice {
        result_lines.push(Line::from(Span::styled(
            notice.clone(),
            Style::default().fg(Color::Red),
        )));
    }
    Paragraph::new(result_lines)
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

    let settings = vec![
        Line::from(format!(
            "Addition:     max digits {} (a)   max decimals {} (d)",
            config.addition_max_digits, config.addition_max_decimals
        )),
        Line::from(format!(
            "Subtraction:  max digits {} (s)   max decimals {} (f)",
            config.subtraction_max_digits, config.subtraction_max_decimals
        )),
        Line::from(format!("Operations:   {}", operator_toggles(config))),
    ];
    Paragraph::new(settings)
        .block(Block::default().borders(Borders::ALL).title("Configuration"))
        .style(Style::default().fg(Color::Gray))
        .wrap(Wrap { trim: false })
        .render(chunks[3], buf);

    Paragraph::new(Span::styled(
        "(enter) start / (h)istory / (esc)ape",
        italic(),
    ))
    .render(chunks[5], buf);
}

fn render_history<S: HistoryStore>(app: &App<S>, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Min(1),    // chart
            Constraint::Length(1), // summary
            Constraint::Length(1), // padding
            Constraint::Length(1), // legend
        ])
        .split(area);

    let legend = Paragraph::new(Span::styled("(b)ack", italic()));

    let Some(summary) = summarize(&app.history) else {
        let mut lines = vec![
            Line::from(Span::styled("No past sessions found.", bold())),
            Line::from("Try completing a mental math session!"),
        ];
        if let Some(notice) = &app.notice {
            lines.push(Line::from(Span::styled(
                notice.clone(),
                Style::default().fg(Color::Red),
            )));
        }
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .render(chunks[0], buf);
        legend.render(chunks[3], buf);
        return;
    };

    let points = charting::history_points(&app.history);
    let (attempts, highest) = charting::compute_chart_params(&points);
    let datasets = vec![Dataset::default()
        .name("Mental Math Score")
        .marker(ratatui::symbols::Marker::Braille)
        .style(Style::default().fg(Color::Cyan))
        .graph_type(GraphType::Line)
        .data(&points)];

    Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Mental Math Scores Over Time"),
        )
        .x_axis(
            Axis::default()
                .title("attempt")
                .bounds([1.0, attempts])
                .labels(vec![
                    Span::styled("#1", bold()),
                    Span::styled(format!("#{}", charting::format_label(attempts)), bold()),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("score")
                .bounds([0.0, highest])
                .labels(vec![
                    Span::styled("0", bold()),
                    Span::styled(charting::format_label(highest), bold()),
                ]),
        )
        .render(chunks[0], buf);

    Paragraph::new(Span::styled(
        format!(
            "{} sessions   best {}   mean {:.1}",
            summary.sessions, summary.best, summary.mean
        ),
        bold(),
    ))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    legend.render(chunks[3], buf);
}
