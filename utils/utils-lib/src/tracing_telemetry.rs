use tracing_subscriber::{
    filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

/// Fmt Layer for console output.
#[derive(Debug, Clone, Copy, Eq, PartialEq, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum FmtLayer {
    /// Output traces to stdout.
    Stdout,
    /// Output traces to stderr.
    Stderr,
    /// Don't output traces to console.
    None,
}

/// Tracing telemetry style.
#[derive(Debug, Clone, Copy, Eq, PartialEq, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum FmtStyle {
    /// Compact style.
    Compact,
    /// Pretty Style.
    Pretty,
    /// JSON Style.
    Json,
}

/// The filter from `RUST_LOG`, or `default` if it's not set or invalid.
pub fn rust_log_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Tracing telemetry builder.
#[derive(Debug)]
pub struct TracingTelemetry {
    writer: FmtLayer,
    style: FmtStyle,
    colours: bool,
    default_filter: String,
}

impl TracingTelemetry {
    /// Tracing telemetry default builder.
    pub fn builder() -> Self {
        Self {
            writer: FmtLayer::Stderr,
            style: FmtStyle::Compact,
            colours: true,
            default_filter: crate::DEFAULT_LOG_FILTER.to_string(),
        }
    }
    /// Specify writer stream.
    pub fn with_writer(self, writer: FmtLayer) -> TracingTelemetry {
        TracingTelemetry { writer, ..self }
    }
    /// Specify style.
    pub fn with_style(self, style: FmtStyle) -> TracingTelemetry {
        TracingTelemetry { style, ..self }
    }
    /// Specify whether colour is needed or not.
    pub fn with_colours(self, colours: bool) -> TracingTelemetry {
        TracingTelemetry { colours, ..self }
    }
    /// Specify the filter used when `RUST_LOG` is not set.
    pub fn with_default_filter(self, default_filter: impl Into<String>) -> TracingTelemetry {
        TracingTelemetry {
            default_filter: default_filter.into(),
            ..self
        }
    }

    /// Initialize the telemetry instance.
    /// Fails if a global subscriber has already been set.
    pub fn init(self, service_name: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
        let layer = match self.writer {
            FmtLayer::None => None,
            FmtLayer::Stdout => Some(self.fmt_layer(std::io::stdout)),
            FmtLayer::Stderr => Some(self.fmt_layer(std::io::stderr)),
        };
        Registry::default()
            .with(layer)
            .with(rust_log_filter(&self.default_filter))
            .try_init()?;

        tracing::debug!(service = service_name, style = self.style.as_ref(), "Tracing initialised");
        Ok(())
    }

    fn fmt_layer<W>(&self, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
    where
        W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(self.colours);
        match self.style {
            FmtStyle::Compact => layer.compact().boxed(),
            FmtStyle::Pretty => layer.pretty().boxed(),
            FmtStyle::Json => layer.json().boxed(),
        }
    }
}
