//! Allow/deny flow filters built from the `flows` filter options.

use crate::error::{ObserveError, Result};
use crate::record::Record;
use serde::Serialize;
use std::net::IpAddr;

const VERDICTS: [&str; 7] = [
    "FORWARDED",
    "DROPPED",
    "ERROR",
    "AUDIT",
    "REDIRECTED",
    "TRACED",
    "TRANSLATED",
];

const FILTER_KEYS: [&str; 13] = [
    "from-ip",
    "to-ip",
    "ip",
    "from-pod",
    "to-pod",
    "pod",
    "namespace",
    "from-port",
    "to-port",
    "port",
    "node-name",
    "protocol",
    "verdict",
];

/// Options that constrain the same side of a flow and so cannot be mixed.
const EXCLUSIVE_KEYS: [&[&str]; 6] = [
    &["from-ip", "ip"],
    &["to-ip", "ip"],
    &["from-pod", "pod", "namespace"],
    &["to-pod", "pod", "namespace"],
    &["from-port", "port"],
    &["to-port", "port"],
];

/// Raw filter values as collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub from_ip: Vec<String>,
    pub to_ip: Vec<String>,
    pub ip: Vec<String>,
    pub from_pod: Vec<String>,
    pub to_pod: Vec<String>,
    pub pod: Vec<String>,
    pub namespace: Vec<String>,
    pub from_port: Vec<u16>,
    pub to_port: Vec<u16>,
    pub port: Vec<u16>,
    pub node_name: Vec<String>,
    pub protocol: Vec<String>,
    pub verdict: Vec<String>,
    /// `KEY=VALUE` expressions for the denylist.
    pub exclude: Vec<String>,
}

/// Lists are OR'ed within a field and AND'ed across fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowFilter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_ip: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub destination_ip: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_pod: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub destination_pod: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_port: Vec<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub destination_port: Vec<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub node_name: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub protocol: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub verdict: Vec<String>,
}

impl FlowFilter {
    fn has_flow_fields(&self) -> bool {
        !(self.source_ip.is_empty()
            && self.destination_ip.is_empty()
            && self.source_pod.is_empty()
            && self.destination_pod.is_empty()
            && self.source_port.is_empty()
            && self.destination_port.is_empty()
            && self.protocol.is_empty()
            && self.verdict.is_empty())
    }

    pub fn matches(&self, record: &Record) -> bool {
        if !self.node_name.is_empty() && !self.node_name.contains(&record.node_name) {
            return false;
        }

        let flow = match &record.flow {
            Some(flow) => flow,
            None => return !self.has_flow_fields(),
        };

        let pod_matches = |prefixes: &[String], pod: Option<String>| {
            prefixes.is_empty()
                || pod.map_or(false, |pod| prefixes.iter().any(|p| pod.starts_with(p.as_str())))
        };
        let port_matches =
            |ports: &[u16], port: Option<u16>| ports.is_empty() || port.map_or(false, |p| ports.contains(&p));
        let any_ignore_case =
            |values: &[String], actual: &str| values.is_empty() || values.iter().any(|v| v.eq_ignore_ascii_case(actual));

        (self.source_ip.is_empty() || self.source_ip.contains(&flow.source.ip))
            && (self.destination_ip.is_empty() || self.destination_ip.contains(&flow.destination.ip))
            && pod_matches(&self.source_pod, flow.source.pod())
            && pod_matches(&self.destination_pod, flow.destination.pod())
            && port_matches(&self.source_port, flow.source.port)
            && port_matches(&self.destination_port, flow.destination.port)
            && any_ignore_case(&self.protocol, &flow.protocol)
            && any_ignore_case(&self.verdict, &flow.verdict)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSet {
    pub allowlist: Vec<FlowFilter>,
    pub denylist: Vec<FlowFilter>,
}

#[derive(Serialize)]
struct RawFilters {
    allowlist: Vec<String>,
    denylist: Vec<String>,
}

/// A single option value, before it is placed into a filter.
#[derive(Debug, Clone)]
enum Criterion {
    FromIp(String),
    ToIp(String),
    Ip(String),
    FromPod(String),
    ToPod(String),
    Pod(String),
    Namespace(String),
    FromPort(u16),
    ToPort(u16),
    Port(u16),
    NodeName(String),
    Protocol(String),
    Verdict(String),
}

impl Criterion {
    fn parse(key: &str, value: &str) -> Result<Self> {
        let invalid = |reason: String| ObserveError::InvalidFilter {
            input: format!("{}={}", key, value),
            reason,
        };
        let port = || {
            value
                .parse::<u16>()
                .map_err(|_| invalid(format!("{:?} is not a port number", value)))
        };

        let criterion = match key {
            "from-ip" => Criterion::FromIp(value.to_string()),
            "to-ip" => Criterion::ToIp(value.to_string()),
            "ip" => Criterion::Ip(value.to_string()),
            "from-pod" => Criterion::FromPod(value.to_string()),
            "to-pod" => Criterion::ToPod(value.to_string()),
            "pod" => Criterion::Pod(value.to_string()),
            "namespace" => Criterion::Namespace(value.to_string()),
            "from-port" => Criterion::FromPort(port()?),
            "to-port" => Criterion::ToPort(port()?),
            "port" => Criterion::Port(port()?),
            "node-name" => Criterion::NodeName(value.to_string()),
            "protocol" => Criterion::Protocol(value.to_string()),
            "verdict" => Criterion::Verdict(value.to_string()),
            _ => {
                return Err(invalid(format!(
                    "unknown key {:?}, must be one of: {}",
                    key,
                    FILTER_KEYS.join(", ")
                )))
            }
        };
        criterion.validate()?;
        Ok(criterion)
    }

    fn validate(&self) -> Result<()> {
        match self {
            Criterion::FromIp(ip) | Criterion::ToIp(ip) | Criterion::Ip(ip) => {
                ip.parse::<IpAddr>().map_err(|_| ObserveError::InvalidFilter {
                    input: ip.clone(),
                    reason: "not an IP address".to_string(),
                })?;
            }
            Criterion::Verdict(verdict) => {
                if !VERDICTS.iter().any(|v| v.eq_ignore_ascii_case(verdict)) {
                    return Err(ObserveError::InvalidFilter {
                        input: verdict.clone(),
                        reason: format!("verdict must be one of: {}", VERDICTS.join(", ")),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn is_symmetric(&self) -> bool {
        matches!(
            self,
            Criterion::Ip(_) | Criterion::Pod(_) | Criterion::Namespace(_) | Criterion::Port(_)
        )
    }

    /// Add this criterion to `filter`; symmetric criteria go to the side
    /// selected by `source`.
    fn apply(&self, filter: &mut FlowFilter, source: bool) {
        match self {
            Criterion::FromIp(ip) => filter.source_ip.push(ip.clone()),
            Criterion::ToIp(ip) => filter.destination_ip.push(ip.clone()),
            Criterion::FromPod(pod) => filter.source_pod.push(pod_prefix(pod)),
            Criterion::ToPod(pod) => filter.destination_pod.push(pod_prefix(pod)),
            Criterion::FromPort(port) => filter.source_port.push(*port),
            Criterion::ToPort(port) => filter.destination_port.push(*port),
            Criterion::NodeName(node) => filter.node_name.push(node.clone()),
            Criterion::Protocol(proto) => filter.protocol.push(proto.clone()),
            Criterion::Verdict(verdict) => filter.verdict.push(verdict.to_uppercase()),
            Criterion::Ip(ip) if source => filter.source_ip.push(ip.clone()),
            Criterion::Ip(ip) => filter.destination_ip.push(ip.clone()),
            Criterion::Pod(pod) if source => filter.source_pod.push(pod_prefix(pod)),
            Criterion::Pod(pod) => filter.destination_pod.push(pod_prefix(pod)),
            Criterion::Namespace(ns) if source => filter.source_pod.push(format!("{}/", ns)),
            Criterion::Namespace(ns) => filter.destination_pod.push(format!("{}/", ns)),
            Criterion::Port(port) if source => filter.source_port.push(*port),
            Criterion::Port(port) => filter.destination_port.push(*port),
        }
    }
}

fn pod_prefix(pod: &str) -> String {
    if pod.contains('/') {
        pod.to_string()
    } else {
        format!("default/{}", pod)
    }
}

/// Directional criteria share one filter. Symmetric criteria split it into a
/// source-side and a destination-side variant.
fn filters_from(criteria: &[Criterion]) -> Vec<FlowFilter> {
    if criteria.is_empty() {
        return Vec::new();
    }

    let symmetric = criteria.iter().any(Criterion::is_symmetric);
    let sides: &[bool] = if symmetric { &[true, false] } else { &[true] };

    sides
        .iter()
        .map(|&source| {
            let mut filter = FlowFilter::default();
            for criterion in criteria {
                criterion.apply(&mut filter, source);
            }
            filter
        })
        .collect()
}

impl FilterOptions {
    fn is_set(&self, key: &str) -> bool {
        match key {
            "from-ip" => !self.from_ip.is_empty(),
            "to-ip" => !self.to_ip.is_empty(),
            "ip" => !self.ip.is_empty(),
            "from-pod" => !self.from_pod.is_empty(),
            "to-pod" => !self.to_pod.is_empty(),
            "pod" => !self.pod.is_empty(),
            "namespace" => !self.namespace.is_empty(),
            "from-port" => !self.from_port.is_empty(),
            "to-port" => !self.to_port.is_empty(),
            "port" => !self.port.is_empty(),
            "node-name" => !self.node_name.is_empty(),
            "protocol" => !self.protocol.is_empty(),
            "verdict" => !self.verdict.is_empty(),
            _ => false,
        }
    }

    fn check_combinations(&self) -> Result<()> {
        for group in EXCLUSIVE_KEYS {
            let given: Vec<String> = group
                .iter()
                .filter(|key| self.is_set(key))
                .map(|key| format!("--{}", key))
                .collect();
            if given.len() > 1 {
                return Err(ObserveError::InvalidFilter {
                    input: given.join(" "),
                    reason: format!("filters {} cannot be combined", given.join(" and ")),
                });
            }
        }
        Ok(())
    }
}

impl FilterSet {
    pub fn build(opts: &FilterOptions) -> Result<Self> {
        opts.check_combinations()?;
        let mut criteria = Vec::new();
        let strings = [
            ("from-ip", &opts.from_ip),
            ("to-ip", &opts.to_ip),
            ("ip", &opts.ip),
            ("from-pod", &opts.from_pod),
            ("to-pod", &opts.to_pod),
            ("pod", &opts.pod),
            ("namespace", &opts.namespace),
            ("node-name", &opts.node_name),
            ("protocol", &opts.protocol),
            ("verdict", &opts.verdict),
        ];
        for (key, values) in strings {
            for value in values {
                criteria.push(Criterion::parse(key, value)?);
            }
        }
        criteria.extend(opts.from_port.iter().copied().map(Criterion::FromPort));
        criteria.extend(opts.to_port.iter().copied().map(Criterion::ToPort));
        criteria.extend(opts.port.iter().copied().map(Criterion::Port));

        let mut denylist = Vec::new();
        for expr in &opts.exclude {
            let (key, value) = expr.split_once('=').ok_or_else(|| ObserveError::InvalidFilter {
                input: expr.clone(),
                reason: "expected KEY=VALUE".to_string(),
            })?;
            let criterion = Criterion::parse(key.trim(), value.trim())?;
            denylist.extend(filters_from(&[criterion]));
        }

        Ok(Self {
            allowlist: filters_from(&criteria),
            denylist,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.allowlist.is_empty() && self.denylist.is_empty()
    }

    /// A record passes when any allow filter matches (or there are none)
    /// and no deny filter matches.
    pub fn allows(&self, record: &Record) -> bool {
        let allowed = self.allowlist.is_empty() || self.allowlist.iter().any(|f| f.matches(record));
        allowed && !self.denylist.iter().any(|f| f.matches(record))
    }

    /// YAML listing of both sets with every filter as a JSON string.
    pub fn render_raw(&self) -> Result<String> {
        let encode = |filters: &[FlowFilter]| {
            filters
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()
        };
        let raw = RawFilters {
            allowlist: encode(&self.allowlist)?,
            denylist: encode(&self.denylist)?,
        };
        serde_yaml::to_string(&raw).map_err(|e| ObserveError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow_record(src: &str, dst: &str, verdict: &str) -> Record {
        let line = format!(
            r#"{{"time":"2024-01-02T15:04:05Z","node_name":"node-1","flow":{{"source":{{"ip":"{}","port":40000,"namespace":"web","pod_name":"frontend"}},"destination":{{"ip":"{}","port":80}},"protocol":"TCP","verdict":"{}"}}}}"#,
            src, dst, verdict
        );
        serde_json::from_str(&line).unwrap()
    }

    #[test]
    fn test_no_options_no_filters() {
        let filters = FilterSet::build(&FilterOptions::default()).unwrap();
        assert!(filters.is_empty());
        assert!(filters.allows(&flow_record("10.0.0.1", "10.0.0.2", "FORWARDED")));
    }

    #[test]
    fn test_directional_options_share_one_filter() {
        let opts = FilterOptions {
            from_ip: vec!["10.0.0.1".to_string()],
            to_port: vec![80],
            ..Default::default()
        };
        let filters = FilterSet::build(&opts).unwrap();
        assert_eq!(filters.allowlist.len(), 1);
        assert!(filters.allows(&flow_record("10.0.0.1", "10.0.0.2", "FORWARDED")));
        assert!(!filters.allows(&flow_record("10.0.0.3", "10.0.0.2", "FORWARDED")));
    }

    #[test]
    fn test_symmetric_options_match_either_side() {
        let opts = FilterOptions {
            ip: vec!["10.0.0.2".to_string()],
            ..Default::default()
        };
        let filters = FilterSet::build(&opts).unwrap();
        assert_eq!(filters.allowlist.len(), 2);
        assert!(filters.allows(&flow_record("10.0.0.2", "10.0.0.9", "FORWARDED")));
        assert!(filters.allows(&flow_record("10.0.0.9", "10.0.0.2", "FORWARDED")));
        assert!(!filters.allows(&flow_record("10.0.0.8", "10.0.0.9", "FORWARDED")));
    }

    #[test]
    fn test_pod_and_namespace_prefixes() {
        let opts = FilterOptions {
            namespace: vec!["web".to_string()],
            ..Default::default()
        };
        let filters = FilterSet::build(&opts).unwrap();
        assert_eq!(filters.allowlist[0].source_pod, vec!["web/".to_string()]);
        assert!(filters.allows(&flow_record("10.0.0.1", "10.0.0.2", "FORWARDED")));

        let opts = FilterOptions {
            from_pod: vec!["frontend".to_string()],
            ..Default::default()
        };
        let filters = FilterSet::build(&opts).unwrap();
        assert_eq!(filters.allowlist[0].source_pod, vec!["default/frontend".to_string()]);
        assert!(!filters.allows(&flow_record("10.0.0.1", "10.0.0.2", "FORWARDED")));
    }

    #[test]
    fn test_exclude_builds_denylist() {
        let opts = FilterOptions {
            exclude: vec!["verdict=dropped".to_string()],
            ..Default::default()
        };
        let filters = FilterSet::build(&opts).unwrap();
        assert!(filters.allowlist.is_empty());
        assert_eq!(filters.denylist.len(), 1);
        assert!(filters.allows(&flow_record("10.0.0.1", "10.0.0.2", "FORWARDED")));
        assert!(!filters.allows(&flow_record("10.0.0.1", "10.0.0.2", "DROPPED")));
    }

    #[test]
    fn test_invalid_filters() {
        for exclude in ["verdict", "colour=red", "port=http", "ip=not-an-ip"] {
            let opts = FilterOptions {
                exclude: vec![exclude.to_string()],
                ..Default::default()
            };
            let err = FilterSet::build(&opts).unwrap_err();
            assert!(matches!(err, ObserveError::InvalidFilter { .. }), "{}", exclude);
        }

        let opts = FilterOptions {
            verdict: vec!["MAYBE".to_string()],
            ..Default::default()
        };
        assert!(FilterSet::build(&opts).is_err());
    }

    #[test]
    fn test_directional_and_symmetric_options_cannot_mix() {
        let cases = [
            FilterOptions {
                from_ip: vec!["10.0.0.1".to_string()],
                ip: vec!["10.0.0.2".to_string()],
                ..Default::default()
            },
            FilterOptions {
                to_ip: vec!["10.0.0.1".to_string()],
                ip: vec!["10.0.0.2".to_string()],
                ..Default::default()
            },
            FilterOptions {
                namespace: vec!["web".to_string()],
                pod: vec!["x".to_string()],
                ..Default::default()
            },
            FilterOptions {
                to_pod: vec!["web/frontend".to_string()],
                namespace: vec!["web".to_string()],
                ..Default::default()
            },
            FilterOptions {
                from_port: vec![80],
                port: vec![443],
                ..Default::default()
            },
            FilterOptions {
                to_port: vec![80],
                port: vec![443],
                ..Default::default()
            },
        ];
        for opts in cases {
            let err = FilterSet::build(&opts).unwrap_err();
            assert!(matches!(err, ObserveError::InvalidFilter { .. }), "{:?}", opts);
            assert!(err.to_string().contains("cannot be combined"));
        }

        let err = FilterSet::build(&FilterOptions {
            from_ip: vec!["10.0.0.1".to_string()],
            ip: vec!["10.0.0.2".to_string()],
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("filters --from-ip and --ip cannot be combined"));

        let opts = FilterOptions {
            from_ip: vec!["10.0.0.1".to_string()],
            to_ip: vec!["10.0.0.2".to_string()],
            port: vec![80],
            ..Default::default()
        };
        assert!(FilterSet::build(&opts).is_ok());
    }

    #[test]
    fn test_render_raw() {
        let opts = FilterOptions {
            from_ip: vec!["10.0.0.1".to_string()],
            exclude: vec!["protocol=udp".to_string()],
            ..Default::default()
        };
        let raw = FilterSet::build(&opts).unwrap().render_raw().unwrap();
        assert!(raw.starts_with("allowlist:"));
        assert!(raw.contains(r#"{"source_ip":["10.0.0.1"]}"#));
        assert!(raw.contains(r#"{"protocol":["udp"]}"#));

        let raw = FilterSet::default().render_raw().unwrap();
        assert_eq!(raw, "allowlist: []\ndenylist: []\n");
    }
}
