use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind,
};

/// What a key or mouse event asks the viewer to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Scroll by a number of steps along each axis.
    Scroll { dx: f32, dy: f32 },
    /// Scroll by whole viewports.
    ScrollPages(f32),
    GoToPage(usize),
    GoToLastPage,
    ZoomIn,
    ZoomOut,
    ResetZoom,
    ToggleFit,
    ToggleDoublePage,
    ToggleFullscreen,
    Resize { columns: u16, rows: u16 },
    Quit,
    None,
}

/// Maps terminal events to [`Action`]s, keeping a vi-style numeric count prefix between
/// keys.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_event(&mut self, event: Event) -> Action {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.map_key(key),
            Event::Mouse(mouse) => self.map_mouse(mouse),
            Event::Resize(columns, rows) => Action::Resize { columns, rows },
            _ => Action::None,
        }
    }

    fn map_key(&mut self, KeyEvent { code, modifiers, .. }: KeyEvent) -> Action {
        let plain = modifiers.is_empty() || modifiers == KeyModifiers::SHIFT;
        match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.reset_count();
                Action::Quit
            }
            KeyCode::Char(c @ '1'..='9') if plain => {
                self.push_digit(c);
                Action::None
            }
            KeyCode::Char('0') if plain && self.pending_count.is_some() => {
                self.push_digit('0');
                Action::None
            }
            KeyCode::Char('0') if plain => Action::ResetZoom,
            KeyCode::Char('j') | KeyCode::Down => self.scroll(0.0, 1.0),
            KeyCode::Char('k') | KeyCode::Up => self.scroll(0.0, -1.0),
            KeyCode::Char('h') | KeyCode::Left => self.scroll(-1.0, 0.0),
            KeyCode::Char('l') | KeyCode::Right => self.scroll(1.0, 0.0),
            KeyCode::Char(' ') | KeyCode::PageDown => {
                let count = self.take_count();
                Action::ScrollPages(count as f32)
            }
            KeyCode::PageUp => {
                let count = self.take_count();
                Action::ScrollPages(-(count as f32))
            }
            KeyCode::Char('g') | KeyCode::Home => {
                let page = self.pending_count.take().unwrap_or(1);
                self.reset_count();
                Action::GoToPage(page.max(1))
            }
            KeyCode::Char('G') | KeyCode::End => match self.pending_count.take() {
                Some(page) => {
                    self.reset_count();
                    Action::GoToPage(page.max(1))
                }
                None => Action::GoToLastPage,
            },
            KeyCode::Char('+') | KeyCode::Char('=') => self.simple(Action::ZoomIn),
            KeyCode::Char('-') | KeyCode::Char('_') => self.simple(Action::ZoomOut),
            KeyCode::Char('b') => self.simple(Action::ToggleFit),
            KeyCode::Char('p') => self.simple(Action::ToggleDoublePage),
            KeyCode::Char('c') => self.simple(Action::ToggleFullscreen),
            KeyCode::Char('q') | KeyCode::Esc => self.simple(Action::Quit),
            _ => {
                self.reset_count();
                Action::None
            }
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent) -> Action {
        let zoom = mouse.modifiers.contains(KeyModifiers::CONTROL);
        match (mouse.kind, zoom) {
            (MouseEventKind::ScrollUp, true) => Action::ZoomIn,
            (MouseEventKind::ScrollDown, true) => Action::ZoomOut,
            (MouseEventKind::ScrollUp, false) => Action::Scroll { dx: 0.0, dy: -1.0 },
            (MouseEventKind::ScrollDown, false) => Action::Scroll { dx: 0.0, dy: 1.0 },
            (MouseEventKind::ScrollLeft, _) => Action::Scroll { dx: -1.0, dy: 0.0 },
            (MouseEventKind::ScrollRight, _) => Action::Scroll { dx: 1.0, dy: 0.0 },
            _ => Action::None,
        }
    }

    fn simple(&mut self, action: Action) -> Action {
        self.reset_count();
        action
    }

    fn scroll(&mut self, dx: f32, dy: f32) -> Action {
        let count = self.take_count() as f32;
        Action::Scroll {
            dx: dx * count,
            dy: dy * count,
        }
    }

    fn push_digit(&mut self, digit: char) {
        let Some(value) = digit.to_digit(10) else {
            return;
        };
        let current = self.pending_count.unwrap_or(0);
        self.pending_count = Some(current.saturating_mul(10).saturating_add(value as usize));
        self.pending_digits.push(digit);
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    /// Digits typed so far, for the status line.
    pub fn pending_input(&self) -> Option<&str> {
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(&self.pending_digits)
        }
    }
}
