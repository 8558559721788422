//! Colored terminal output
//!
//! Respects `NO_COLOR` and the `--color` flag.

use std::io::{IsTerminal, Write};

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve the color choice from the flag and the environment
///
/// Priority: `NO_COLOR` > `--color` > auto-detect.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Whether log lines on stderr should carry ANSI escapes
pub fn stderr_ansi(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Never => false,
        ColorChoice::Always | ColorChoice::AlwaysAnsi => true,
        ColorChoice::Auto => std::io::stderr().is_terminal(),
    }
}

/// Styled writer over stdout and stderr
pub struct StyledOutput {
    stdout: StandardStream,
    stderr: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    fn styled(stream: &mut StandardStream, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = stream.set_color(&spec);
        let _ = write!(stream, "{}", text);
        let _ = stream.reset();
    }

    /// Green bold text
    pub fn success(&mut self, text: &str) {
        Self::styled(&mut self.stdout, text, Some(Color::Green), true);
    }

    /// Cyan text
    pub fn info(&mut self, text: &str) {
        Self::styled(&mut self.stdout, text, Some(Color::Cyan), false);
    }

    /// Bold text
    pub fn bold(&mut self, text: &str) {
        Self::styled(&mut self.stdout, text, None, true);
    }

    pub fn plain(&mut self, text: &str) {
        let _ = write!(self.stdout, "{}", text);
    }

    pub fn newline(&mut self) {
        let _ = writeln!(self.stdout);
    }

    // ── stderr ───────────────────────────────────────────────────────

    /// Red bold text on stderr
    pub fn stderr_error(&mut self, text: &str) {
        Self::styled(&mut self.stderr, text, Some(Color::Red), true);
    }

    pub fn stderr_plain(&mut self, text: &str) {
        let _ = write!(self.stderr, "{}", text);
    }
}
