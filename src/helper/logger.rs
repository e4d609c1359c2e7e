#[cfg(feature = "colored-term")]
use colored::{Color, ColoredString, Colorize};
use log::{Level, LevelFilter, Metadata, Record};
use std::str::FromStr;

/// A simple [`log`] implimentation writing `[level] module > message` lines to stdout.
pub struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    #[cfg(feature = "colored-term")]
    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let color = level_color(record.level());
        let args = format!("{}", record.args());
        // only the body of error messages is colored so they stand out
        let args = if record.level() == Level::Error {
            args.color(Color::Red)
        } else {
            ColoredString::from(args.as_str())
        };

        println!(
            "{} {} {} {}",
            level_str(record.level()).color(color),
            record
                .module_path()
                .unwrap_or("(unknown module)")
                .color(color),
            ">".color(color),
            args,
        );
    }

    #[cfg(not(feature = "colored-term"))]
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{}", format_record(record));
        }
    }

    fn flush(&self) {}
}

#[cfg(feature = "colored-term")]
fn level_color(level: Level) -> Color {
    match level {
        Level::Error => Color::BrightRed,
        Level::Warn => Color::Yellow,
        Level::Info => Color::Cyan,
        Level::Debug => Color::Magenta,
        Level::Trace => Color::Blue,
    }
}

#[cfg(any(test, not(feature = "colored-term")))]
fn format_record(record: &Record) -> String {
    format!(
        "{} {} > {}",
        level_str(record.level()),
        record.module_path().unwrap_or("(unknown module)"),
        record.args()
    )
}

fn level_str(level: Level) -> &'static str {
    match level {
        Level::Error => "[E]",
        Level::Warn => "[W]",
        Level::Info => "[I]",
        Level::Debug => "[D]",
        Level::Trace => "[T]",
    }
}

/// Parses a log level name (case insensitive) e.g. "debug" or "OFF".
pub fn parse_level_filter(level_name: &str) -> Option<LevelFilter> {
    LevelFilter::from_str(level_name.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_format_matches_console_layout() {
        let args = format_args!("swapchain recreated");
        let record = Record::builder()
            .args(args)
            .level(Level::Info)
            .module_path(Some("vulkan_renderer::renderer"))
            .build();
        assert_eq!(
            format_record(&record),
            "[I] vulkan_renderer::renderer > swapchain recreated"
        );
    }

    #[test]
    fn level_names_parse() {
        assert_eq!(parse_level_filter("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level_filter(" WARN "), Some(LevelFilter::Warn));
        assert_eq!(parse_level_filter("off"), Some(LevelFilter::Off));
        assert_eq!(parse_level_filter("loud"), None);
    }
}
