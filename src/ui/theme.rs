use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// What a piece of terminal text is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Title,
    Success,
    Failure,
    Caution,
    Note,
    Label,
    Muted,
    /// Hero and team values
    Entity,
}

/// Styles per [`Role`]; every role renders unstyled when color is off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    color: bool,
}

impl Theme {
    /// Colored on a terminal, plain when piped or with `NO_COLOR` set
    pub fn detect() -> Self {
        let color = std::env::var_os("NO_COLOR").is_none() && console::Term::stdout().is_term();
        Self { color }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn is_colored(&self) -> bool {
        self.color
    }

    pub fn style(&self, role: Role) -> Style {
        if !self.color {
            return Style::new();
        }
        match role {
            Role::Title => Style::new().cyan().bold(),
            Role::Success => Style::new().green().bold(),
            Role::Failure => Style::new().red().bold(),
            Role::Caution => Style::new().yellow().bold(),
            Role::Note => Style::new().magenta(),
            Role::Label => Style::new().white().dimmed(),
            Role::Muted => Style::new().bright_black(),
            Role::Entity => Style::new().blue(),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use owo_colors::OwoColorize;

    #[test]
    fn test_plain_theme_leaves_text_untouched() {
        let theme = Theme::plain();
        assert!(!theme.is_colored());
        assert_eq!("Preventers".style(theme.style(Role::Entity)).to_string(), "Preventers");
        assert_eq!("Heroes".style(theme.style(Role::Title)).to_string(), "Heroes");
    }
}
