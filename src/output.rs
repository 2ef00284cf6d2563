//! Turns the formatting options into a single [`RenderDescriptor`].

use crate::error::{ObserveError, Result};
use crate::time::TimeFormat;
use std::io::IsTerminal;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Compact,
    Dict,
    Json,
    Table,
}

impl Encoding {
    pub const NAMES: [&'static str; 5] = ["compact", "dict", "jsonpb", "json", "table"];
}

impl FromStr for Encoding {
    type Err = ObserveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "compact" => Ok(Encoding::Compact),
            "dict" => Ok(Encoding::Dict),
            "jsonpb" | "json" => Ok(Encoding::Json),
            "table" => Ok(Encoding::Table),
            _ => Err(ObserveError::InvalidOutputFormat {
                input: s.to_string(),
                accepted: Self::NAMES.to_vec(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    pub const NAMES: [&'static str; 3] = ["auto", "always", "never"];

    /// Whether to emit colors when writing to stdout.
    pub fn enabled(&self) -> bool {
        match self {
            ColorMode::Auto => std::io::stdout().is_terminal(),
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

impl FromStr for ColorMode {
    type Err = ObserveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(ColorMode::Auto),
            "always" => Ok(ColorMode::Always),
            "never" => Ok(ColorMode::Never),
            _ => Err(ObserveError::InvalidColorMode {
                input: s.to_string(),
                accepted: Self::NAMES.to_vec(),
            }),
        }
    }
}

/// Raw formatting values after merging the command line with the config file.
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    pub output: String,
    pub time_format: String,
    pub print_node_name: bool,
    pub ip_translation: bool,
    pub numeric: bool,
    pub color: String,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            output: "compact".to_string(),
            time_format: TimeFormat::default().name().to_string(),
            print_node_name: false,
            ip_translation: true,
            numeric: false,
            color: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderDescriptor {
    pub encoding: Encoding,
    /// Validated for every encoding, unused by JSON output.
    pub time_format: TimeFormat,
    pub show_node_name: bool,
    pub translate_ip: bool,
    pub numeric: bool,
    pub color: ColorMode,
}

impl RenderDescriptor {
    pub fn build(opts: &FormattingOptions) -> Result<Self> {
        Ok(Self {
            encoding: opts.output.parse()?,
            time_format: opts.time_format.parse()?,
            show_node_name: opts.print_node_name,
            translate_ip: opts.ip_translation,
            numeric: opts.numeric,
            color: opts.color.parse()?,
        })
    }
}

impl Default for RenderDescriptor {
    fn default() -> Self {
        Self {
            encoding: Encoding::Compact,
            time_format: TimeFormat::default(),
            show_node_name: false,
            translate_ip: true,
            numeric: false,
            color: ColorMode::Auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_output(output: &str) -> FormattingOptions {
        FormattingOptions {
            output: output.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let render = RenderDescriptor::build(&FormattingOptions::default()).unwrap();
        assert_eq!(render, RenderDescriptor::default());
    }

    #[test]
    fn test_json_is_alias_for_jsonpb() {
        let json = RenderDescriptor::build(&with_output("json")).unwrap();
        let jsonpb = RenderDescriptor::build(&with_output("jsonpb")).unwrap();
        assert_eq!(json.encoding, Encoding::Json);
        assert_eq!(json.encoding, jsonpb.encoding);
    }

    #[test]
    fn test_unknown_output_lists_choices() {
        let err = RenderDescriptor::build(&with_output("xml")).unwrap_err();
        match &err {
            ObserveError::InvalidOutputFormat { input, accepted } => {
                assert_eq!(input, "xml");
                assert_eq!(accepted, &vec!["compact", "dict", "jsonpb", "json", "table"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("compact, dict, jsonpb, json, table"));
    }

    #[test]
    fn test_time_format_validated_for_json() {
        let opts = FormattingOptions {
            output: "json".to_string(),
            time_format: "StampMilli".to_string(),
            ..Default::default()
        };
        let render = RenderDescriptor::build(&opts).unwrap();
        assert_eq!(render.time_format, TimeFormat::StampMilli);

        let opts = FormattingOptions {
            output: "json".to_string(),
            time_format: "Kitchen".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RenderDescriptor::build(&opts),
            Err(ObserveError::InvalidTimeFormat { .. })
        ));
    }

    #[test]
    fn test_numeric_and_translation_are_independent() {
        let opts = FormattingOptions {
            ip_translation: true,
            numeric: true,
            ..Default::default()
        };
        let render = RenderDescriptor::build(&opts).unwrap();
        assert!(render.translate_ip);
        assert!(render.numeric);
    }

    #[test]
    fn test_color_modes() {
        for (input, expected) in [
            ("auto", ColorMode::Auto),
            ("always", ColorMode::Always),
            ("never", ColorMode::Never),
        ] {
            let opts = FormattingOptions {
                color: input.to_string(),
                ..Default::default()
            };
            assert_eq!(RenderDescriptor::build(&opts).unwrap().color, expected);
        }

        let opts = FormattingOptions {
            color: "rainbow".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RenderDescriptor::build(&opts),
            Err(ObserveError::InvalidColorMode { .. })
        ));
        assert!(ColorMode::Always.enabled());
        assert!(!ColorMode::Never.enabled());
    }
}
