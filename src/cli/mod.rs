pub mod commands;

use crate::config::Config;
use crate::filter::FilterOptions;
use crate::output::FormattingOptions;
use crate::selector::{SelectorOptions, DEFAULT_FLOW_COUNT};
use crate::time::TimeFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flowscope")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query and render buffered or live network flow records", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, value_name = "PATH", help = "YAML config file with option defaults")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Observe flows, agent events or debug events")]
    Observe(ObserveArgs),
}

/// `observe` on its own behaves like `observe flows`.
#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct ObserveArgs {
    #[command(subcommand)]
    pub command: Option<ObserveCommand>,

    #[command(flatten)]
    pub flows: FlowsArgs,
}

#[derive(Subcommand, Debug)]
pub enum ObserveCommand {
    #[command(about = "Observe flows")]
    Flows(FlowsArgs),
    #[command(about = "Observe agent events")]
    AgentEvents(EventsArgs),
    #[command(about = "Observe debug events")]
    DebugEvents(EventsArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct FlowsArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EventsArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Options shared by every observe command.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    #[command(flatten)]
    pub selectors: SelectorArgs,

    #[command(flatten)]
    pub formatting: FormattingArgs,

    #[command(flatten)]
    pub other: OtherArgs,
}

fn layout_help(intro: &str) -> String {
    let mut help = intro.to_string();
    for layout in TimeFormat::ALL {
        help.push_str(&format!(
            "\n  {:<24}{}",
            format!("{}:", layout.name()),
            layout.example()
        ));
    }
    help
}

fn time_help(what: &str) -> String {
    layout_help(&format!(
        "{}. The format is relative (e.g. 3s, 4m, 1h43m, ...) or one of:",
        what
    ))
}

#[derive(Args, Debug, Clone, Default)]
#[command(next_help_heading = "Selectors")]
pub struct SelectorArgs {
    #[arg(long, help = "Get all records stored in the buffer")]
    pub all: bool,

    #[arg(
        long,
        default_value_t = 0,
        value_name = "N",
        help = format!("Get the last N records stored in the buffer (default {})", DEFAULT_FLOW_COUNT)
    )]
    pub last: u64,

    #[arg(
        long,
        default_value_t = 0,
        value_name = "N",
        help = "Get the first N records stored in the buffer"
    )]
    pub first: u64,

    #[arg(short, long, help = "Follow new records as they arrive")]
    pub follow: bool,

    #[arg(long, default_value = "", value_name = "TIME", help = time_help("Filter records since a specific date"))]
    pub since: String,

    #[arg(long, default_value = "", value_name = "TIME", help = time_help("Filter records until a specific date"))]
    pub until: String,
}

impl SelectorArgs {
    pub fn to_options(&self) -> SelectorOptions {
        SelectorOptions {
            all: self.all,
            last: self.last,
            first: self.first,
            since: self.since.clone(),
            until: self.until.clone(),
            follow: self.follow,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
#[command(next_help_heading = "Formatting")]
pub struct FormattingArgs {
    #[arg(
        short,
        long,
        value_name = "FORMAT",
        help = "Output format, one of:\n  compact:  Compact output\n  dict:     Each record is shown as KEY: VALUE pairs\n  jsonpb:   One JSON object per record\n  json:     Alias for jsonpb\n  table:    Aligned columns\n[default: compact]"
    )]
    pub output: Option<String>,

    #[arg(long, help = "Print node name in output")]
    pub print_node_name: bool,

    #[arg(
        long,
        value_name = "LAYOUT",
        help = layout_help("Time format for printing; not used by json and jsonpb output [default: StampMilli]. One of:")
    )]
    pub time_format: Option<String>,

    #[arg(
        long,
        value_name = "BOOL",
        help = "Show pod names instead of IP addresses when known [default: true]"
    )]
    pub ip_translation: Option<bool>,

    #[arg(long, help = "Display IP addresses and ports numerically")]
    pub numeric: bool,

    #[arg(
        long,
        value_name = "WHEN",
        help = "Colorize output: auto, always or never [default: auto]"
    )]
    pub color: Option<String>,
}

impl FormattingArgs {
    /// Command line values win over the config file, which wins over defaults.
    pub fn merge(&self, config: &Config) -> FormattingOptions {
        let defaults = FormattingOptions::default();
        FormattingOptions {
            output: self
                .output
                .clone()
                .or_else(|| config.output.clone())
                .unwrap_or(defaults.output),
            time_format: self
                .time_format
                .clone()
                .or_else(|| config.time_format.clone())
                .unwrap_or(defaults.time_format),
            print_node_name: self.print_node_name || config.print_node_name.unwrap_or(false),
            ip_translation: self
                .ip_translation
                .or(config.ip_translation)
                .unwrap_or(defaults.ip_translation),
            numeric: self.numeric,
            color: self
                .color
                .clone()
                .or_else(|| config.color.clone())
                .unwrap_or(defaults.color),
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
#[command(next_help_heading = "Other")]
pub struct OtherArgs {
    #[arg(short = 's', long = "silent-errors", help = "Silently ignore errors and warnings")]
    pub ignore_stderr: bool,

    #[arg(
        long = "print-raw-filters",
        help = "Print allowlist/denylist filters and exit without reading any records"
    )]
    pub print_raw_filters: bool,

    #[arg(
        long,
        value_name = "PATH",
        help = "Read records from a JSON-lines file, or - for stdin [default: -]"
    )]
    pub input_file: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
#[command(next_help_heading = "Filters")]
pub struct FilterArgs {
    #[arg(long, value_name = "IP", help = "Show records originating at the given IP address")]
    pub from_ip: Vec<String>,

    #[arg(long, value_name = "IP", help = "Show records destined to the given IP address")]
    pub to_ip: Vec<String>,

    #[arg(long, value_name = "IP", help = "Show records related to the given IP address")]
    pub ip: Vec<String>,

    #[arg(long, value_name = "[NAMESPACE/]POD", help = "Show records originating in the given pod")]
    pub from_pod: Vec<String>,

    #[arg(long, value_name = "[NAMESPACE/]POD", help = "Show records destined to the given pod")]
    pub to_pod: Vec<String>,

    #[arg(long, value_name = "[NAMESPACE/]POD", help = "Show records related to the given pod")]
    pub pod: Vec<String>,

    #[arg(long, value_name = "NAMESPACE", help = "Show records related to the given namespace")]
    pub namespace: Vec<String>,

    #[arg(long, value_name = "PORT", help = "Show records with the given source port")]
    pub from_port: Vec<u16>,

    #[arg(long, value_name = "PORT", help = "Show records with the given destination port")]
    pub to_port: Vec<u16>,

    #[arg(long, value_name = "PORT", help = "Show records with the given source or destination port")]
    pub port: Vec<u16>,

    #[arg(long = "node-name", value_name = "NODE", help = "Show records observed on the given node")]
    pub node_name: Vec<String>,

    #[arg(long, value_name = "PROTO", help = "Show records with the given L4 protocol")]
    pub protocol: Vec<String>,

    #[arg(long, value_name = "VERDICT", help = "Show records with the given verdict (FORWARDED, DROPPED, ...)")]
    pub verdict: Vec<String>,

    #[arg(
        long,
        value_name = "KEY=VALUE",
        help = "Hide records matching a filter; KEY is a filter option name without the leading --, e.g. verdict=DROPPED"
    )]
    pub exclude: Vec<String>,
}

impl FilterArgs {
    pub fn to_options(&self) -> FilterOptions {
        FilterOptions {
            from_ip: self.from_ip.clone(),
            to_ip: self.to_ip.clone(),
            ip: self.ip.clone(),
            from_pod: self.from_pod.clone(),
            to_pod: self.to_pod.clone(),
            pod: self.pod.clone(),
            namespace: self.namespace.clone(),
            from_port: self.from_port.clone(),
            to_port: self.to_port.clone(),
            port: self.port.clone(),
            node_name: self.node_name.clone(),
            protocol: self.protocol.clone(),
            verdict: self.verdict.clone(),
            exclude: self.exclude.clone(),
        }
    }
}
