use crate::cli::{Commands, CommonArgs, FilterArgs, ObserveArgs, ObserveCommand};
use crate::client::{FlowClient, InputSource, ObserveRequest, ReaderClient, RecordSink};
use crate::config::Config;
use crate::filter::FilterSet;
use crate::output::RenderDescriptor;
use crate::printer::Printer;
use crate::record::EventKind;
use crate::selector::QueryDescriptor;
use crate::Result;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::io::{BufWriter, Write};
use tracing::{debug, info};

/// Process-level switches threaded through to the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OtherOptions {
    /// Hide warnings about skipped records. Fatal errors are still reported.
    pub ignore_stderr: bool,
    pub print_raw_filters: bool,
}

/// Everything one `observe` invocation needs, resolved up front.
#[derive(Debug, Clone)]
pub struct ObserveConfig {
    pub request: ObserveRequest,
    pub render: RenderDescriptor,
    pub other: OtherOptions,
    pub input: InputSource,
}

impl ObserveConfig {
    pub fn resolve(args: &ObserveArgs, config: &Config, now: DateTime<Utc>) -> Result<Self> {
        let (kind, common, filters): (EventKind, &CommonArgs, Option<&FilterArgs>) =
            match &args.command {
                None => (EventKind::Flows, &args.flows.common, Some(&args.flows.filters)),
                Some(ObserveCommand::Flows(flows)) => {
                    (EventKind::Flows, &flows.common, Some(&flows.filters))
                }
                Some(ObserveCommand::AgentEvents(events)) => {
                    (EventKind::AgentEvents, &events.common, None)
                }
                Some(ObserveCommand::DebugEvents(events)) => {
                    (EventKind::DebugEvents, &events.common, None)
                }
            };

        let query = QueryDescriptor::build(&common.selectors.to_options(), now)?;
        let render = RenderDescriptor::build(&common.formatting.merge(config))?;
        let filters = match filters {
            Some(filters) => FilterSet::build(&filters.to_options())?,
            None => FilterSet::default(),
        };
        let input = InputSource::from(
            common
                .other
                .input_file
                .as_deref()
                .or(config.input_file.as_deref())
                .unwrap_or("-"),
        );

        Ok(Self {
            request: ObserveRequest {
                kind,
                query,
                filters,
            },
            render,
            other: OtherOptions {
                ignore_stderr: common.other.ignore_stderr,
                print_raw_filters: common.other.print_raw_filters,
            },
            input,
        })
    }
}

/// Run a resolved invocation against `client`, rendering to `out`.
///
/// With `print_raw_filters` the filters are written and `client` is never
/// contacted.
pub async fn run_observe<W: Write + Send>(
    observe: &ObserveConfig,
    client: &mut dyn FlowClient,
    mut out: W,
) -> Result<()> {
    if observe.other.print_raw_filters {
        write!(out, "{}", observe.request.filters.render_raw()?)?;
        out.flush()?;
        return Ok(());
    }

    let mut printer = Printer::new(out, observe.render);
    client.observe(&observe.request, &mut printer).await?;
    printer.flush()?;
    debug!("Printed {} {}", printer.records(), observe.request.kind);
    Ok(())
}

/// Like [`run_observe`], but stops as soon as `shutdown` completes.
///
/// Returns `true` when the run was cut short.
pub async fn observe_until<W, F>(
    observe: &ObserveConfig,
    client: &mut dyn FlowClient,
    out: W,
    shutdown: F,
) -> Result<bool>
where
    W: Write + Send,
    F: Future,
{
    tokio::select! {
        result = run_observe(observe, client, out) => result.map(|()| false),
        _ = shutdown => {
            info!("Shutdown signal received");
            Ok(true)
        }
    }
}

/// Returns `true` when interrupted by Ctrl+C.
pub async fn handle_command(command: Commands, config: &Config) -> Result<bool> {
    match command {
        Commands::Observe(args) => handle_observe(args, config).await,
    }
}

async fn handle_observe(args: ObserveArgs, config: &Config) -> Result<bool> {
    let observe = ObserveConfig::resolve(&args, config, Utc::now())?;
    info!("Observing {} from {}", observe.request.kind, observe.input);

    let mut client = ReaderClient::new(observe.input.clone(), observe.other.ignore_stderr);
    let out = BufWriter::new(std::io::stdout());

    if observe.request.query.is_long_lived() {
        info!("Following until interrupted. Press Ctrl+C to exit.");
    }

    observe_until(&observe, &mut client, out, tokio::signal::ctrl_c()).await
}
