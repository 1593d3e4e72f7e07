use serde::Serialize;
use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// Suppress decorative output (`ROWKEEPER_QUIET=1`)
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("ROWKEEPER_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Human }
    }

    pub fn is_human(&self) -> bool {
        *self == Self::Human
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    ok: bool,
    command: &'a str,
    data: T,
}

/// Print a JSON envelope for a successful command
pub fn emit_success<T: Serialize>(command: &str, data: T) -> serde_json::Result<()> {
    let envelope = Envelope { ok: true, command, data };
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

/// Print a JSON envelope for a failed command
pub fn emit_error(command: &str, message: &str) -> serde_json::Result<()> {
    let envelope = Envelope {
        ok: false,
        command,
        data: serde_json::json!({ "error": message }),
    };
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}
