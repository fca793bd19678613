//! Ratatui-based terminal UI.
//!
//! Three tabs share one country list and one granularity switch:
//! reporting-day tables, mean-rate tables, and box plots of any metric.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, Tabs, Wrap},
};
use tracing::{info, warn};

use crate::app::pipeline::Pipeline;
use crate::app::selection::CountrySelection;
use crate::domain::{DashConfig, Granularity, Metric, Reduction, TableKind};
use crate::error::AppError;
use crate::report::{PivotTable, TIMEFRAME_HEADER, box_stats_by_country, fmt_value};

mod plotters_chart;

use plotters_chart::BoxPlotChart;

const PAGE: usize = 10;

/// Start the TUI over an already loaded pipeline.
pub fn run(pipeline: Pipeline, config: &DashConfig) -> Result<(), AppError> {
    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal =
        Terminal::new(backend).map_err(|e| AppError::terminal(format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(pipeline, config);
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::terminal(format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::terminal(format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Presence,
    Rates,
    Boxplots,
}

impl Tab {
    const ALL: [Tab; 3] = [Tab::Presence, Tab::Rates, Tab::Boxplots];

    fn title(self) -> &'static str {
        match self {
            Tab::Presence => "Reporting days",
            Tab::Rates => "Mean rates",
            Tab::Boxplots => "Boxplots",
        }
    }

    /// The derived table this tab reads from.
    fn table_kind(self) -> TableKind {
        match self {
            Tab::Presence => TableKind::Presence,
            Tab::Rates => TableKind::Rates,
            Tab::Boxplots => TableKind::Merged,
        }
    }

    fn index(self) -> usize {
        match self {
            Tab::Presence => 0,
            Tab::Rates => 1,
            Tab::Boxplots => 2,
        }
    }

    fn next(self) -> Self {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    fn prev(self) -> Self {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }
}

struct App {
    pipeline: Pipeline,
    tab: Tab,
    granularity: Granularity,
    /// Selected metric per tab, as an index into `Tab::table_kind().metrics()`.
    metric_idx: [usize; 3],
    selection: CountrySelection,
    max_countries: usize,
    /// Cursor into the filtered country list.
    cursor: usize,
    filter: String,
    editing_filter: bool,
    table_scroll: usize,
    status: String,
}

impl App {
    fn new(pipeline: Pipeline, config: &DashConfig) -> Self {
        let mut selection = CountrySelection::new(config.countries.iter().cloned());
        if let Some(snapshot) = pipeline.snapshot() {
            selection.retain_known(snapshot.countries());
        }
        let status = pipeline
            .snapshot()
            .map(|s| format!("Loaded {} countries.", s.countries().len()))
            .unwrap_or_else(|| "No data loaded.".to_string());

        Self {
            pipeline,
            tab: Tab::Presence,
            granularity: config.granularity,
            metric_idx: [0; 3],
            selection,
            max_countries: config.max_countries,
            cursor: 0,
            filter: String::new(),
            editing_filter: false,
            table_scroll: 0,
            status,
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::terminal(format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::terminal(format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::terminal(format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        if self.editing_filter {
            self.handle_filter_edit(code);
            return false;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Tab => self.set_tab(self.tab.next()),
            KeyCode::BackTab => self.set_tab(self.tab.prev()),
            KeyCode::Char('1') => self.set_tab(Tab::Presence),
            KeyCode::Char('2') => self.set_tab(Tab::Rates),
            KeyCode::Char('3') => self.set_tab(Tab::Boxplots),
            KeyCode::Up => self.move_cursor(-1),
            KeyCode::Down => self.move_cursor(1),
            KeyCode::PageUp => self.move_cursor(-(PAGE as isize)),
            KeyCode::PageDown => self.move_cursor(PAGE as isize),
            KeyCode::Char(' ') | KeyCode::Enter => self.toggle_at_cursor(),
            KeyCode::Char('g') => {
                self.granularity = self.granularity.toggled();
                self.table_scroll = 0;
                self.status = format!("granularity: {}", self.granularity.display_name());
            }
            KeyCode::Char('m') => self.cycle_metric(1),
            KeyCode::Char('M') => self.cycle_metric(-1),
            KeyCode::Char('[') => self.table_scroll = self.table_scroll.saturating_sub(1),
            KeyCode::Char(']') => self.table_scroll = self.table_scroll.saturating_add(1),
            KeyCode::Char('/') => {
                self.editing_filter = true;
                self.status = "Filter countries. Enter to keep, Esc to clear.".to_string();
            }
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('e') => self.export(),
            _ => {}
        }

        false
    }

    fn handle_filter_edit(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.filter.clear();
                self.editing_filter = false;
                self.status = "Filter cleared.".to_string();
            }
            KeyCode::Enter => {
                self.editing_filter = false;
                self.status = format!("filter: {}", self.filter);
            }
            KeyCode::Backspace => {
                self.filter.pop();
            }
            KeyCode::Char(c) => self.filter.push(c),
            _ => {}
        }
        self.cursor = 0;
    }

    fn set_tab(&mut self, tab: Tab) {
        self.tab = tab;
        self.table_scroll = 0;
    }

    fn metric(&self) -> Metric {
        let metrics = self.tab.table_kind().metrics();
        metrics[self.metric_idx[self.tab.index()] % metrics.len()]
    }

    fn cycle_metric(&mut self, delta: isize) {
        let n = self.tab.table_kind().metrics().len() as isize;
        let idx = &mut self.metric_idx[self.tab.index()];
        *idx = (*idx as isize + delta).rem_euclid(n) as usize;
        self.status = format!("metric: {}", self.metric().label());
    }

    fn visible_countries(&self) -> Vec<&str> {
        let needle = self.filter.to_lowercase();
        self.pipeline
            .snapshot()
            .map(|s| s.countries())
            .unwrap_or(&[])
            .iter()
            .map(String::as_str)
            .filter(|c| needle.is_empty() || c.to_lowercase().contains(&needle))
            .collect()
    }

    fn move_cursor(&mut self, delta: isize) {
        let n = self.visible_countries().len();
        if n == 0 {
            self.cursor = 0;
            return;
        }
        self.cursor = (self.cursor as isize + delta).clamp(0, n as isize - 1) as usize;
    }

    fn toggle_at_cursor(&mut self) {
        let Some(country) = self.visible_countries().get(self.cursor).map(|c| c.to_string()) else {
            return;
        };
        let selected = self.selection.toggle(&country);
        self.status = match self.selection.over_limit(self.max_countries) {
            Some(msg) => msg,
            None if selected => format!("+ {country}"),
            None => format!("- {country}"),
        };
    }

    fn refresh(&mut self) {
        match self.pipeline.refresh() {
            Ok(snapshot) => {
                let n = snapshot.countries().len();
                let known = snapshot.countries().to_vec();
                self.selection.retain_known(&known);
                self.move_cursor(0);
                self.status = format!("Refreshed: {n} countries.");
            }
            Err(err) => self.status = format!("Refresh failed: {err}"),
        }
    }

    fn export(&mut self) {
        let Some(snapshot) = self.pipeline.snapshot() else {
            self.status = "No data to export.".to_string();
            return;
        };
        let path = PathBuf::from(format!("cov-merged-{}.csv", self.granularity.display_name().to_lowercase()));
        match crate::io::export::write_merged_csv(&path, snapshot.tables.merged.get(self.granularity)) {
            Ok(()) => {
                info!(path = %path.display(), "Exported merged table");
                self.status = format!("Wrote {}", path.display());
            }
            Err(err) => {
                warn!(error = %err, "Export failed");
                self.status = format!("Export failed: {err}");
            }
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_tabs(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_tabs(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let loaded = self
            .pipeline
            .snapshot()
            .map(|s| s.loaded_at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        let tabs = Tabs::new(Tab::ALL.iter().map(|t| t.title()))
            .select(self.tab.index())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("cov | {} | loaded {loaded}", self.pipeline.source().describe())),
            )
            .style(Style::default().fg(Color::Gray))
            .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
        frame.render_widget(tabs, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(32), Constraint::Min(0)])
            .split(area);

        self.draw_countries(frame, chunks[0]);
        self.draw_view(frame, chunks[1]);
    }

    fn draw_countries(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let visible = self.visible_countries();
        let items: Vec<ListItem> = visible
            .iter()
            .map(|c| {
                let (mark, style) = if self.selection.contains(c) {
                    ("[x] ", Style::default().fg(Color::Green))
                } else {
                    ("[ ] ", Style::default())
                };
                ListItem::new(format!("{mark}{c}")).style(style)
            })
            .collect();

        let mut title = format!("Countries {}/{}", self.selection.len(), self.max_countries);
        if self.editing_filter || !self.filter.is_empty() {
            title.push_str(&format!(" /{}", self.filter));
        }

        let list = List::new(items)
            .block(Block::default().title(title).borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ListState::default();
        if !visible.is_empty() {
            state.select(Some(self.cursor.min(visible.len() - 1)));
        }
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_view(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);

        self.draw_controls(frame, chunks[0]);

        let block = Block::default().title(self.metric().label()).borders(Borders::ALL);
        let inner = block.inner(chunks[1]);
        frame.render_widget(block, chunks[1]);
        frame.render_widget(Clear, inner);

        if let Some(msg) = self.selection.over_limit(self.max_countries) {
            frame.render_widget(message(msg, Color::Red), inner);
            return;
        }
        if self.selection.is_empty() {
            frame.render_widget(message("Select countries with Space.".to_string(), Color::Yellow), inner);
            return;
        }

        let metric = self.metric();
        let countries = self.selection.as_slice();
        let table = match self
            .pipeline
            .get_aggregate(self.granularity, self.tab.table_kind(), countries, metric)
        {
            Ok(table) => table,
            Err(err) => {
                frame.render_widget(message(err.to_string(), Color::Red), inner);
                return;
            }
        };

        match self.tab {
            Tab::Presence | Tab::Rates => {
                self.draw_table(frame, inner, &PivotTable::from_table(&table, countries));
            }
            Tab::Boxplots => {
                let boxes = box_stats_by_country(&table, countries);
                if boxes.is_empty() {
                    frame.render_widget(message("No values for the selection.".to_string(), Color::Yellow), inner);
                    return;
                }
                let chart = BoxPlotChart {
                    boxes: &boxes,
                    y_bounds: plotters_chart::y_bounds(&boxes),
                    y_label: metric.column(),
                    fmt_y: match metric.reduction() {
                        Reduction::CountPresent => fmt_axis_count,
                        Reduction::Mean => fmt_axis_rate,
                    },
                };
                frame.render_widget(chart, inner);
            }
        }
    }

    fn draw_controls(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let radio = |g: Granularity| {
            let mark = if g == self.granularity { "(•)" } else { "( )" };
            format!("{mark} {}  ", g.display_name())
        };
        let mut spans: Vec<Span> = Granularity::ALL.iter().map(|&g| Span::raw(radio(g))).collect();
        spans.push(Span::raw("| "));
        spans.push(Span::styled(self.metric().label(), Style::default().fg(Color::Cyan)));

        let p = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_table(&self, frame: &mut ratatui::Frame<'_>, area: Rect, pivot: &PivotTable) {
        if pivot.is_empty() {
            frame.render_widget(message("No rows for the selection.".to_string(), Color::Yellow), area);
            return;
        }

        let offset = self.table_scroll.min(pivot.rows.len() - 1);
        let header = Row::new(
            std::iter::once(Cell::from(TIMEFRAME_HEADER))
                .chain(pivot.countries.iter().map(|c| Cell::from(c.as_str()))),
        )
        .style(Style::default().add_modifier(Modifier::BOLD));

        let rows = pivot.rows.iter().skip(offset).map(|r| {
            Row::new(
                std::iter::once(r.period.display_label())
                    .chain(r.cells.iter().map(|c| fmt_value(pivot.metric, *c))),
            )
        });

        let widths = std::iter::once(Constraint::Length(16))
            .chain(pivot.countries.iter().map(|_| Constraint::Min(12)));

        frame.render_widget(Table::new(rows, widths).header(header), area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "Tab/1-3 tab  ↑/↓ move  Space select  / filter  g period  m metric  [/] scroll  r refresh  e export  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

fn message(text: String, color: Color) -> Paragraph<'static> {
    Paragraph::new(Text::from(text))
        .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
        .wrap(Wrap { trim: true })
}

fn fmt_axis_count(v: f64) -> String {
    format!("{v:.0}")
}

fn fmt_axis_rate(v: f64) -> String {
    format!("{v:.1e}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DataSource;
    use crate::io::ingest::parse_records;

    const DATA: &str = "\
set,name,time,new_tests_orig,new_cases_orig,new_deaths_orig,cap_new_tests,cap_new_cases,cap_new_deaths
country,Chile,2021-03-01,1,1,1,0.1,0.1,0.1
country,Peru,2021-03-01,1,1,1,0.1,0.1,0.1
country,Switzerland,2021-03-01,1,1,1,0.1,0.1,0.1
";

    fn app() -> App {
        let ingest = parse_records(DATA.as_bytes()).unwrap();
        let pipeline = Pipeline::from_ingested(DataSource::Path("fixture.csv".into()), ingest).unwrap();
        App::new(pipeline, &DashConfig::default())
    }

    #[test]
    fn starts_with_default_country_selected() {
        let app = app();
        assert_eq!(app.selection.as_slice(), ["Switzerland"]);
        assert_eq!(app.tab, Tab::Presence);
        assert_eq!(app.metric(), Metric::DaysReportingTests);
    }

    #[test]
    fn tabs_cycle_both_ways() {
        let mut app = app();
        app.handle_key(KeyCode::BackTab);
        assert_eq!(app.tab, Tab::Boxplots);
        app.handle_key(KeyCode::Tab);
        assert_eq!(app.tab, Tab::Presence);
        app.handle_key(KeyCode::Char('2'));
        assert_eq!(app.tab, Tab::Rates);
        assert_eq!(app.metric(), Metric::MeanTestRate);
    }

    #[test]
    fn metric_cycling_stays_within_the_tab() {
        let mut app = app();
        app.handle_key(KeyCode::Char('M'));
        assert_eq!(app.metric(), Metric::DaysReportingDeaths);
        app.handle_key(KeyCode::Char('3'));
        for _ in 0..4 {
            app.handle_key(KeyCode::Char('m'));
        }
        assert_eq!(app.metric(), Metric::MeanCaseRate);
    }

    #[test]
    fn space_toggles_country_under_cursor() {
        let mut app = app();
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Char(' '));
        assert_eq!(app.selection.as_slice(), ["Switzerland", "Peru"]);
        app.handle_key(KeyCode::Char(' '));
        assert_eq!(app.selection.as_slice(), ["Switzerland"]);
    }

    #[test]
    fn filter_narrows_the_list() {
        let mut app = app();
        for code in [KeyCode::Char('/'), KeyCode::Char('p'), KeyCode::Char('e'), KeyCode::Enter] {
            app.handle_key(code);
        }
        assert_eq!(app.visible_countries(), vec!["Peru"]);
        app.handle_key(KeyCode::Char(' '));
        assert!(app.selection.contains("Peru"));
    }

    #[test]
    fn granularity_toggle_and_quit() {
        let mut app = app();
        assert!(!app.handle_key(KeyCode::Char('g')));
        assert_eq!(app.granularity, Granularity::Quarterly);
        assert!(app.handle_key(KeyCode::Char('q')));
    }
}
