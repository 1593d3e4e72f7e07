use std::fmt::Display;
use crate::output::is_quiet;
use crate::ui::{theme, Icons, Role};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::ROCKET, text.style(theme().style(Role::Title)));
}

pub fn status(icon: &str, label: &str, value: &str) {
    println!("{} {}: {}", icon, label.style(theme().style(Role::Label)), value);
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().style(Role::Success)));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().style(Role::Failure)));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().style(Role::Caution)));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().style(Role::Note)),
        label.style(theme().style(Role::Label)),
        value
    );
}

pub fn section(title: &str) {
    if is_quiet() {
        return;
    }
    println!();
    println!("━{}━", title.style(theme().style(Role::Title)));
}

pub fn dim(text: &str) -> String {
    text.style(theme().style(Role::Label)).to_string()
}

pub fn muted(text: &str) -> String {
    text.style(theme().style(Role::Muted)).to_string()
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().style(Role::Label)), value);
}

/// One labelled entity line, e.g. `Created hero: id=1 name='Deadpond' ...`
pub fn entity_line(icon: &str, label: &str, value: &impl Display) {
    println!(
        "{} {}: {}",
        icon,
        label.style(theme().style(Role::Label)),
        value.style(theme().style(Role::Entity))
    );
}
