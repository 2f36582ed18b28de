//! Optional external PDF converters.
//!
//! Each converter is an independent capability probe: it reports whether
//! its program is installed and, if so, turns the rendered Markdown into a
//! PDF. The chain tries them in order and stops at the first success.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use pulldown_cmark::{html, Options, Parser};

use crate::domain::{AppError, Result};

/// Inputs and output of one conversion.
#[derive(Debug, Clone, Copy)]
pub struct PdfRequest<'a> {
    /// Rendered Markdown file.
    pub markdown: &'a Path,
    /// Where the PDF must be written.
    pub pdf: &'a Path,
    /// Job directory; relative image links resolve against it.
    pub workdir: &'a Path,
}

/// A single optional converter.
pub trait PdfConverter: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Whether the converter can run on this machine.
    fn is_available(&self) -> bool;

    /// Produce `request.pdf`.
    ///
    /// # Errors
    /// Returns error if the conversion fails.
    fn convert(&self, request: &PdfRequest<'_>) -> Result<()>;
}

/// Markdown to PDF directly through pandoc.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: String,
}

impl PandocConverter {
    /// Use the `pandoc` found on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "pandoc".into(),
        }
    }
}

impl Default for PandocConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfConverter for PandocConverter {
    fn name(&self) -> &str {
        &self.program
    }

    fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn convert(&self, request: &PdfRequest<'_>) -> Result<()> {
        let program = locate(&self.program)?;
        let mut cmd = Command::new(program);
        cmd.arg(request.markdown)
            .arg("-o")
            .arg(request.pdf)
            .current_dir(request.workdir);
        run(self.name(), &mut cmd, request.pdf)
    }
}

/// Markdown rendered to HTML in-process, then printed by an HTML-to-PDF tool
/// invoked as `<program> [args..] <input.html> <output.pdf>`.
#[derive(Debug, Clone)]
pub struct HtmlPdfConverter {
    program: String,
    args: Vec<String>,
}

impl HtmlPdfConverter {
    /// Converter for an arbitrary HTML-to-PDF program.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `weasyprint input.html output.pdf`
    #[must_use]
    pub fn weasyprint() -> Self {
        Self::new("weasyprint", Vec::new())
    }

    /// `wkhtmltopdf --enable-local-file-access input.html output.pdf`
    #[must_use]
    pub fn wkhtmltopdf() -> Self {
        Self::new("wkhtmltopdf", vec!["--enable-local-file-access".into()])
    }
}

impl PdfConverter for HtmlPdfConverter {
    fn name(&self) -> &str {
        &self.program
    }

    fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn convert(&self, request: &PdfRequest<'_>) -> Result<()> {
        let program = locate(&self.program)?;

        let markdown = fs::read_to_string(request.markdown)
            .map_err(|e| AppError::io("Failed to read rendered markdown", e))?;
        let html_path = request.workdir.join("thread.html");
        fs::write(&html_path, markdown_to_html(&markdown))
            .map_err(|e| AppError::io("Failed to write rendered HTML", e))?;

        let mut cmd = Command::new(program);
        cmd.args(&self.args)
            .arg(&html_path)
            .arg(request.pdf)
            .current_dir(request.workdir);
        run(self.name(), &mut cmd, request.pdf)
    }
}

/// Render Markdown as a standalone HTML page.
#[must_use]
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut body = String::new();
    html::push_html(&mut body, Parser::new_ext(markdown, options));

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <style>body {{ font-family: sans-serif; }} img {{ max-width: 100%; }}</style>\n\
         </head>\n<body>\n{body}</body>\n</html>\n"
    )
}

fn locate(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|e| AppError::Converter {
        name: program.to_string(),
        message: format!("not installed: {e}"),
    })
}

fn run(name: &str, cmd: &mut Command, expected: &Path) -> Result<()> {
    tracing::debug!(converter = name, command = ?cmd, "Running converter");

    let output = cmd.output().map_err(|e| AppError::Converter {
        name: name.to_string(),
        message: format!("failed to start: {e}"),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::Converter {
            name: name.to_string(),
            message: format!("{} {}", output.status, stderr.trim()),
        });
    }

    if !expected.is_file() {
        return Err(AppError::Converter {
            name: name.to_string(),
            message: format!("no output at {}", expected.display()),
        });
    }

    Ok(())
}

/// Ordered list of converters tried until one succeeds.
pub struct ConverterChain {
    converters: Vec<Box<dyn PdfConverter>>,
}

impl ConverterChain {
    /// Chain over explicit converters.
    #[must_use]
    pub fn new(converters: Vec<Box<dyn PdfConverter>>) -> Self {
        Self { converters }
    }

    /// Build a chain from configured names.
    ///
    /// # Errors
    /// Returns `Config` for an unknown converter name.
    pub fn from_names(names: &[String]) -> Result<Self> {
        let converters = names
            .iter()
            .map(|name| -> Result<Box<dyn PdfConverter>> {
                match name.to_lowercase().as_str() {
                    "pandoc" => Ok(Box::new(PandocConverter::new())),
                    "weasyprint" => Ok(Box::new(HtmlPdfConverter::weasyprint())),
                    "wkhtmltopdf" => Ok(Box::new(HtmlPdfConverter::wkhtmltopdf())),
                    other => Err(AppError::Config {
                        message: format!(
                            "Unknown PDF converter: {other}. Use: pandoc, weasyprint, wkhtmltopdf"
                        ),
                    }),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { converters })
    }

    /// Converter names and whether each is installed, in order.
    #[must_use]
    pub fn availability(&self) -> Vec<(String, bool)> {
        self.converters
            .iter()
            .map(|c| (c.name().to_string(), c.is_available()))
            .collect()
    }

    /// Try each converter in order; return the name of the one that succeeded.
    ///
    /// # Errors
    /// Returns `NoConverter` if every converter is missing or fails.
    pub fn convert(&self, request: &PdfRequest<'_>) -> Result<String> {
        let mut tried = Vec::new();

        for converter in &self.converters {
            let name = converter.name().to_string();

            if !converter.is_available() {
                tracing::debug!(converter = %name, "Converter not installed, skipping");
                tried.push(format!("{name}: not installed"));
                continue;
            }

            match converter.convert(request) {
                Ok(()) => {
                    tracing::info!(converter = %name, pdf = %request.pdf.display(), "PDF converted");
                    return Ok(name);
                }
                Err(e) => {
                    tracing::warn!(converter = %name, error = %e, "Converter failed, trying next");
                    tried.push(format!("{name}: {e}"));
                }
            }
        }

        let tried = if tried.is_empty() {
            "none configured".to_string()
        } else {
            tried.join("; ")
        };
        Err(AppError::NoConverter { tried })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable converters for pipeline tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Converter whose availability and outcome are fixed up front.
    pub struct FakeConverter {
        pub name: String,
        pub available: bool,
        pub succeed: bool,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeConverter {
        pub fn boxed(name: &str, available: bool, succeed: bool) -> (Box<dyn PdfConverter>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let fake = Self {
                name: name.into(),
                available,
                succeed,
                calls: Arc::clone(&calls),
            };
            (Box::new(fake), calls)
        }
    }

    impl PdfConverter for FakeConverter {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn convert(&self, request: &PdfRequest<'_>) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                fs::write(request.pdf, b"%PDF-1.4 fake\n")
                    .map_err(|e| AppError::io("fake converter write", e))
            } else {
                Err(AppError::Converter {
                    name: self.name.clone(),
                    message: "scripted failure".into(),
                })
            }
        }
    }
}
