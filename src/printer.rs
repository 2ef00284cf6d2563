//! Renders records according to a [`RenderDescriptor`].

use crate::client::RecordSink;
use crate::error::Result;
use crate::output::{Encoding, RenderDescriptor};
use crate::record::{AgentEvent, DebugEvent, Endpoint, EventKind, Flow, Record};
use crossterm::style::Stylize;
use std::io::Write;

const DICT_SEPARATOR: &str = "------------";

enum Paint {
    Good,
    Bad,
    Warn,
    Dim,
}

pub struct Printer<W: Write> {
    out: W,
    render: RenderDescriptor,
    color: bool,
    header_written: bool,
    records: u64,
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, render: RenderDescriptor) -> Self {
        let color = render.color.enabled();
        Self::with_color(out, render, color)
    }

    /// Like [`Printer::new`] with color decided by the caller.
    pub fn with_color(out: W, render: RenderDescriptor, color: bool) -> Self {
        Self {
            out,
            render,
            color,
            header_written: false,
            records: 0,
        }
    }

    /// Number of records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, text: String, paint: Paint) -> String {
        if !self.color {
            return text;
        }
        match paint {
            Paint::Good => text.green().to_string(),
            Paint::Bad => text.red().to_string(),
            Paint::Warn => text.yellow().to_string(),
            Paint::Dim => text.dim().to_string(),
        }
    }

    fn paint_verdict(&self, verdict: String) -> String {
        let paint = match verdict.trim() {
            "FORWARDED" | "REDIRECTED" | "TRANSLATED" => Paint::Good,
            "DROPPED" | "ERROR" => Paint::Bad,
            _ => Paint::Warn,
        };
        self.paint(verdict, paint)
    }

    fn time(&self, record: &Record) -> String {
        self.render.time_format.format(&record.time)
    }

    fn endpoint(&self, endpoint: &Endpoint) -> String {
        let host = match endpoint.pod() {
            Some(pod) if self.render.translate_ip && !self.render.numeric => pod,
            _ => endpoint.ip.clone(),
        };
        match endpoint.port {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        }
    }

    fn node_suffix(&self, record: &Record) -> String {
        if self.render.show_node_name && !record.node_name.is_empty() {
            format!(" [{}]", self.paint(record.node_name.clone(), Paint::Dim))
        } else {
            String::new()
        }
    }

    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        match self.render.encoding {
            Encoding::Json => {
                serde_json::to_writer(&mut self.out, record)?;
                writeln!(self.out)?;
            }
            Encoding::Compact => {
                let line = self.compact(record);
                writeln!(self.out, "{}", line)?;
            }
            Encoding::Dict => {
                if self.records > 0 {
                    writeln!(self.out, "{}", DICT_SEPARATOR)?;
                }
                for (key, value) in self.dict(record) {
                    writeln!(self.out, "{:>11}: {}", key, value)?;
                }
            }
            Encoding::Table => {
                if let Some(kind) = record.kind() {
                    if !self.header_written {
                        let header = self.table_header(kind);
                        writeln!(self.out, "{}", header)?;
                        writeln!(self.out, "{}", "-".repeat(header.len()))?;
                        self.header_written = true;
                    }
                }
                let row = self.table_row(record);
                writeln!(self.out, "{}", row)?;
            }
        }
        self.records += 1;
        Ok(())
    }

    fn compact(&self, record: &Record) -> String {
        let prefix = format!("{}{}", self.time(record), self.node_suffix(record));
        if let Some(flow) = &record.flow {
            let summary = if flow.summary.is_empty() {
                String::new()
            } else {
                format!(" ({})", flow.summary)
            };
            format!(
                "{}: {} -> {} {} {}{}",
                prefix,
                self.endpoint(&flow.source),
                self.endpoint(&flow.destination),
                flow.protocol,
                self.paint_verdict(flow.verdict.clone()),
                summary
            )
        } else if let Some(event) = &record.agent_event {
            format!("{}: {} {}", prefix, event.event_type, event.message)
        } else if let Some(event) = &record.debug_event {
            format!("{}: {}: {}", prefix, self.debug_origin(event), event.message)
        } else {
            prefix
        }
    }

    fn debug_origin(&self, event: &DebugEvent) -> String {
        let mut origin = event.event_type.clone();
        if let Some(source) = &event.source {
            origin.push_str(&format!(" from {}", source));
        }
        if let Some(cpu) = event.cpu {
            origin.push_str(&format!(" on CPU {}", cpu));
        }
        origin
    }

    fn dict(&self, record: &Record) -> Vec<(&'static str, String)> {
        let mut fields = vec![("TIMESTAMP", self.time(record))];
        if self.render.show_node_name {
            fields.push(("NODE", self.paint(record.node_name.clone(), Paint::Dim)));
        }
        if let Some(flow) = &record.flow {
            fields.push(("SOURCE", self.endpoint(&flow.source)));
            fields.push(("DESTINATION", self.endpoint(&flow.destination)));
            fields.push(("PROTOCOL", flow.protocol.clone()));
            fields.push(("VERDICT", self.paint_verdict(flow.verdict.clone())));
            if !flow.summary.is_empty() {
                fields.push(("SUMMARY", flow.summary.clone()));
            }
        } else if let Some(AgentEvent {
            event_type,
            message,
        }) = &record.agent_event
        {
            fields.push(("TYPE", event_type.clone()));
            fields.push(("MESSAGE", message.clone()));
        } else if let Some(event) = &record.debug_event {
            fields.push(("TYPE", event.event_type.clone()));
            if let Some(source) = &event.source {
                fields.push(("FROM", source.clone()));
            }
            if let Some(cpu) = event.cpu {
                fields.push(("CPU", cpu.to_string()));
            }
            fields.push(("MESSAGE", event.message.clone()));
        }
        fields
    }

    fn table_header(&self, kind: EventKind) -> String {
        let mut header = format!("{:<24}", "TIMESTAMP");
        if self.render.show_node_name {
            header.push_str(&format!(" {:<16}", "NODE"));
        }
        match kind {
            EventKind::Flows => header.push_str(&format!(
                " {:<28} {:<28} {:<8} {:<12} {}",
                "SOURCE", "DESTINATION", "PROTOCOL", "VERDICT", "SUMMARY"
            )),
            EventKind::AgentEvents => header.push_str(&format!(" {:<24} {}", "TYPE", "MESSAGE")),
            EventKind::DebugEvents => {
                header.push_str(&format!(" {:<24} {:<20} {:<4} {}", "TYPE", "FROM", "CPU", "MESSAGE"))
            }
        }
        header
    }

    fn table_row(&self, record: &Record) -> String {
        let mut row = format!("{:<24}", truncate(&self.time(record), 24));
        if self.render.show_node_name {
            let node = format!("{:<16}", truncate(&record.node_name, 16));
            row.push_str(&format!(" {}", self.paint(node, Paint::Dim)));
        }
        if let Some(Flow {
            source,
            destination,
            protocol,
            verdict,
            summary,
        }) = &record.flow
        {
            let verdict = self.paint_verdict(format!("{:<12}", truncate(verdict, 12)));
            row.push_str(&format!(
                " {:<28} {:<28} {:<8} {} {}",
                truncate(&self.endpoint(source), 28),
                truncate(&self.endpoint(destination), 28),
                truncate(protocol, 8),
                verdict,
                summary
            ));
        } else if let Some(event) = &record.agent_event {
            row.push_str(&format!(
                " {:<24} {}",
                truncate(&event.event_type, 24),
                event.message
            ));
        } else if let Some(event) = &record.debug_event {
            row.push_str(&format!(
                " {:<24} {:<20} {:<4} {}",
                truncate(&event.event_type, 24),
                truncate(event.source.as_deref().unwrap_or("-"), 20),
                event.cpu.map_or_else(|| "-".to_string(), |cpu| cpu.to_string()),
                event.message
            ));
        }
        row.trim_end().to_string()
    }
}

impl<W: Write + Send> RecordSink for Printer<W> {
    fn accept(&mut self, record: &Record) -> Result<()> {
        self.write_record(record)
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ColorMode;
    use crate::time::TimeFormat;

    fn flow_record() -> Record {
        serde_json::from_str(
            r#"{"time":"2024-01-02T15:04:05.250Z","node_name":"node-1","flow":{"source":{"ip":"10.0.0.5","port":4242,"namespace":"web","pod_name":"frontend"},"destination":{"ip":"10.0.0.9","port":80},"protocol":"TCP","verdict":"FORWARDED","summary":"SYN"}}"#,
        )
        .unwrap()
    }

    fn render(encoding: Encoding) -> RenderDescriptor {
        RenderDescriptor {
            encoding,
            color: ColorMode::Never,
            ..Default::default()
        }
    }

    fn print(render: RenderDescriptor, records: &[Record]) -> String {
        let mut printer = Printer::new(Vec::new(), render);
        for record in records {
            printer.accept(record).unwrap();
        }
        String::from_utf8(printer.into_inner()).unwrap()
    }

    #[test]
    fn test_compact_flow() {
        let out = print(render(Encoding::Compact), &[flow_record()]);
        assert_eq!(
            out,
            "Jan  2 15:04:05.250: web/frontend:4242 -> 10.0.0.9:80 TCP FORWARDED (SYN)\n"
        );
    }

    #[test]
    fn test_node_name_and_time_format() {
        let render = RenderDescriptor {
            show_node_name: true,
            time_format: TimeFormat::RFC3339,
            ..render(Encoding::Compact)
        };
        let out = print(render, &[flow_record()]);
        assert!(out.starts_with("2024-01-02T15:04:05Z [node-1]: "));
    }

    #[test]
    fn test_numeric_shows_ips() {
        let render = RenderDescriptor {
            numeric: true,
            ..render(Encoding::Compact)
        };
        let out = print(render, &[flow_record()]);
        assert!(out.contains("10.0.0.5:4242 -> 10.0.0.9:80"));

        let render = RenderDescriptor {
            translate_ip: false,
            ..render
        };
        let out = print(render, &[flow_record()]);
        assert!(out.contains("10.0.0.5:4242"));
    }

    #[test]
    fn test_json_ignores_time_format() {
        let out = print(render(Encoding::Json), &[flow_record()]);
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["time"], "2024-01-02T15:04:05.250Z");
        assert_eq!(value["node_name"], "node-1");
        assert_eq!(value["flow"]["verdict"], "FORWARDED");
    }

    #[test]
    fn test_dict_separates_records() {
        let out = print(render(Encoding::Dict), &[flow_record(), flow_record()]);
        assert_eq!(out.matches(DICT_SEPARATOR).count(), 1);
        assert!(out.contains("  TIMESTAMP: Jan  2 15:04:05.250\n"));
        assert!(out.contains("DESTINATION: 10.0.0.9:80\n"));
    }

    #[test]
    fn test_table_header_once() {
        let out = print(render(Encoding::Table), &[flow_record(), flow_record()]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("TIMESTAMP"));
        assert!(lines[0].contains("DESTINATION"));
        assert!(lines[1].starts_with("---"));
        assert!(lines[2].contains("web/frontend:4242"));
    }

    #[test]
    fn test_agent_event_compact() {
        let record: Record = serde_json::from_str(
            r#"{"time":"2024-01-02T15:04:05Z","agent_event":{"type":"AGENT_STARTED","message":"hello"}}"#,
        )
        .unwrap();
        let out = print(render(Encoding::Compact), &[record]);
        assert_eq!(out, "Jan  2 15:04:05.000: AGENT_STARTED hello\n");
    }

    #[test]
    fn test_colors_only_when_enabled() {
        let mut printer = Printer::with_color(Vec::new(), render(Encoding::Compact), true);
        printer.accept(&flow_record()).unwrap();
        let out = String::from_utf8(printer.into_inner()).unwrap();
        assert!(out.contains("\u{1b}["));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("frontend", 10), "frontend");
        assert_eq!(truncate("frontend-7d9f8", 10), "fronten...");
    }
}
