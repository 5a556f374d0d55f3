use console::style;
use ndvigrid::dashboard::Banner;
use std::fmt::Display;

/// Terminal rendering of the dashboards
pub struct OutputWriter {
    quiet: bool,
}

impl OutputWriter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn header(&self, title: impl Display) {
        if self.quiet {
            return;
        }
        println!();
        println!("{}", style(title).cyan().bold().underlined());
        println!();
    }

    pub fn success(&self, message: impl Display) {
        if !self.quiet {
            println!("{} {}", style("✓").green().bold(), message);
        }
    }

    pub fn info(&self, message: impl Display) {
        if !self.quiet {
            println!("{} {}", style("ℹ").blue().bold(), message);
        }
    }

    pub fn warning(&self, message: impl Display) {
        eprintln!("{} {}", style("⚠").yellow().bold(), message);
    }

    pub fn error(&self, message: impl Display) {
        eprintln!("{} {}", style("✗").red().bold(), message);
    }

    pub fn banner(&self, banner: &Banner) {
        match banner {
            Banner::Info(msg) => self.info(msg),
            Banner::Warning(msg) => self.warning(msg),
            Banner::Error(msg) => self.error(msg),
        }
    }

    pub fn kv(&self, key: impl Display, value: impl Display) {
        if !self.quiet {
            println!("  {}: {}", style(key).dim(), value);
        }
    }

    /// Tables are data, printed even in quiet mode
    pub fn table(&self, table: &str) {
        println!("{}", table);
    }
}
