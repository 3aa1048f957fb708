//! Presentation of assistant text.
//!
//! A [`Presenter`] is chosen once when a client is built. Plain terminals get
//! text verbatim; notebook kernels get markdown rendered to HTML.

use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Mutex;

use tracing::debug;

use crate::errors::PlaylabError;

const DISPLAY_ENV: &str = "PLAYLAB_DISPLAY";
const EVCXR_RUNTIME_ENV: &str = "EVCXR_IS_RUNTIME";

/// Renders client output.
pub trait Presenter: Send + Sync {
    /// Shows a complete assistant message.
    fn render_text(&self, text: &str);

    /// Writes a streamed fragment immediately, without a newline.
    fn write_chunk(&self, chunk: &str);

    /// Writes a line of client chrome (labels, echoed user input).
    fn write_line(&self, line: &str);
}

/// Requested display behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayMode {
    /// `PLAYLAB_DISPLAY` if set, otherwise rich inside an Evcxr kernel and
    /// plain everywhere else.
    #[default]
    Auto,
    Plain,
    Rich,
}

impl DisplayMode {
    /// Resolves `Auto` against the environment; explicit modes are returned as is.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto => {
                if let Some(mode) = std::env::var(DISPLAY_ENV)
                    .ok()
                    .and_then(|v| v.parse::<Self>().ok())
                    .filter(|mode| *mode != Self::Auto)
                {
                    return mode;
                }
                if std::env::var_os(EVCXR_RUNTIME_ENV).is_some() {
                    Self::Rich
                } else {
                    Self::Plain
                }
            }
            explicit => explicit,
        }
    }

    /// Builds the stdout presenter for this mode.
    pub fn presenter(self) -> Box<dyn Presenter> {
        match self.resolve() {
            Self::Rich => Box::new(MarkdownPresenter::stdout()),
            _ => Box::new(PlainPresenter::stdout()),
        }
    }
}

impl FromStr for DisplayMode {
    type Err = PlaylabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "plain" | "text" => Ok(Self::Plain),
            "rich" | "markdown" | "html" => Ok(Self::Rich),
            other => Err(PlaylabError::Validation(format!(
                "unknown display mode: {other} (expected auto, plain or rich)"
            ))),
        }
    }
}

struct Sink(Mutex<Box<dyn Write + Send>>);

impl Sink {
    fn new(out: Box<dyn Write + Send>) -> Self {
        Self(Mutex::new(out))
    }

    /// Display is best effort: a failed write is logged and the call goes on.
    fn write(&self, text: &str, newline: bool) {
        let mut out = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = write_text(&mut **out, text, newline) {
            debug!(event = "presenter.write_failed", bytes = text.len() as u64, error = %e);
        }
    }
}

fn write_text(out: &mut dyn Write, text: &str, newline: bool) -> io::Result<()> {
    out.write_all(text.as_bytes())?;
    if newline {
        out.write_all(b"\n")?;
    }
    out.flush()
}

/// Writes text verbatim.
pub struct PlainPresenter {
    out: Sink,
}

impl PlainPresenter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out: Sink::new(out) }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl Presenter for PlainPresenter {
    fn render_text(&self, text: &str) {
        self.out.write(text, true);
    }

    fn write_chunk(&self, chunk: &str) {
        self.out.write(chunk, false);
    }

    fn write_line(&self, line: &str) {
        self.out.write(line, true);
    }
}

/// Renders complete messages as HTML for Evcxr notebooks.
///
/// Display-math brackets `\[`/`\]` are rewritten to `$` first so the notebook
/// typesets them.
pub struct MarkdownPresenter {
    out: Sink,
}

impl MarkdownPresenter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out: Sink::new(out) }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

/// Converts assistant markdown to HTML.
pub fn render_markdown(markdown: &str) -> String {
    use pulldown_cmark::{Parser, html};

    let source = markdown.replace("\\[", "$").replace("\\]", "$");
    let mut out = String::new();
    html::push_html(&mut out, Parser::new(&source));
    out
}

impl Presenter for MarkdownPresenter {
    fn render_text(&self, text: &str) {
        let block = format!(
            "EVCXR_BEGIN_CONTENT text/html\n{}\nEVCXR_END_CONTENT",
            render_markdown(text).trim_end()
        );
        self.out.write(&block, true);
    }

    fn write_chunk(&self, chunk: &str) {
        self.out.write(chunk, false);
    }

    fn write_line(&self, line: &str) {
        self.out.write(line, true);
    }
}
