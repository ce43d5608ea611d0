//! logfmt 行格式
//!
//! `ts_utc=<ISO8601 ms> level=<LEVEL> <span fields> msg="..." k="v" ...`
//!
//! Span fields (e.g. `run_id`) come first so every line inside a run carries
//! them. All values are double-quoted.

use std::fmt::{self, Write as _};

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::field::{MakeVisitor, VisitFmt, VisitOutput};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

/// Escape `\`, `"`, newline, carriage return and tab
pub fn escape_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

pub fn level_label(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN",
        Level::INFO => "INFO",
        Level::DEBUG | Level::TRACE => "DEBUG",
    }
}

/// Event formatter
#[derive(Debug, Clone, Copy, Default)]
pub struct LogfmtFormat;

impl<S, N> FormatEvent<S, N> for LogfmtFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "ts_utc={} level={}",
            contracts::format_utc_millis(&Utc::now()),
            level_label(event.metadata().level())
        )?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, " {}", fields.fields)?;
                    }
                }
            }
        }

        let mut collector = EventFields::default();
        event.record(&mut collector);

        write!(writer, " msg=\"{}\"", escape_value(&collector.message))?;
        for (key, value) in &collector.fields {
            write!(writer, " {key}=\"{}\"", escape_value(value))?;
        }
        writeln!(writer)
    }
}

/// Collects event fields, splitting out `message`
#[derive(Default)]
struct EventFields {
    message: String,
    fields: Vec<(&'static str, String)>,
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.fields.push((field.name(), rendered));
        }
    }
}

/// Span field formatter (`key="value"` pairs)
#[derive(Debug, Clone, Copy, Default)]
pub struct LogfmtFields;

impl<'a> MakeVisitor<Writer<'a>> for LogfmtFields {
    type Visitor = LogfmtVisitor<'a>;

    fn make_visitor(&self, target: Writer<'a>) -> Self::Visitor {
        LogfmtVisitor {
            writer: target,
            first: true,
            result: Ok(()),
        }
    }
}

pub struct LogfmtVisitor<'a> {
    writer: Writer<'a>,
    first: bool,
    result: fmt::Result,
}

impl LogfmtVisitor<'_> {
    fn push(&mut self, name: &str, value: &str) {
        if self.result.is_err() {
            return;
        }
        let sep = if self.first { "" } else { " " };
        self.first = false;
        self.result = write!(self.writer, "{sep}{name}=\"{}\"", escape_value(value));
    }
}

impl Visit for LogfmtVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field.name(), value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        self.push(field.name(), &rendered);
    }
}

impl VisitOutput<fmt::Result> for LogfmtVisitor<'_> {
    fn finish(self) -> fmt::Result {
        self.result
    }
}

impl VisitFmt for LogfmtVisitor<'_> {
    fn writer(&mut self) -> &mut dyn fmt::Write {
        &mut self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture<F: FnOnce()>(body: F) -> String {
        let sink = Capture::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .event_format(LogfmtFormat)
            .fmt_fields(LogfmtFields)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, body);
        let bytes = sink.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value("a\"b\\c\nd\re\tf"), "a\\\"b\\\\c\\nd\\re\\tf");
    }

    #[test]
    fn test_line_layout() {
        let output = capture(|| {
            let span = tracing::info_span!("run", run_id = "run-1-abc");
            let _guard = span.enter();
            tracing::warn!(attempt = 2, error = "link \"down\"", "reconnect failed");
        });
        let line = output.trim_end();
        assert!(line.starts_with("ts_utc="), "got: {line}");
        let expected = r#" level=WARN run_id="run-1-abc" msg="reconnect failed" attempt="2" error="link \"down\"""#;
        assert!(line.ends_with(expected), "got: {line}");
        assert!(line[7..].split(' ').next().unwrap().ends_with('Z'), "got: {line}");
    }

    #[test]
    fn test_levels_and_no_span() {
        let output = capture(|| {
            tracing::debug!("dbg");
            tracing::error!("boom");
        });
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(" level=DEBUG msg=\"dbg\""));
        assert!(lines[1].contains(" level=ERROR msg=\"boom\""));
    }
}
