//! OpenTelemetry tracing and metrics setup, behind the `telemetry` feature.
//!
//! [`Telemetry`] is a small builder: it wires `tracing-subscriber` to an OTLP
//! exporter when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, and otherwise falls back to a
//! plain stdout subscriber so local development never needs an OTLP collector
//! running. [`Telemetry::http_tracing`] returns a `tower-http` layer for the Axum
//! router.

#[cfg(feature = "telemetry")]
mod imp {
    use opentelemetry::KeyValue;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::Resource;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use std::time::Duration;
    use tower_http::trace::TraceLayer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    /// Builds and installs the process-wide tracing subscriber.
    pub struct Telemetry {
        service_name: String,
        service_version: String,
    }

    impl Telemetry {
        pub fn new() -> Self {
            Self {
                service_name: "stellar-x402-facilitator".to_string(),
                service_version: "0.0.0".to_string(),
            }
        }

        pub fn with_name(mut self, name: impl Into<String>) -> Self {
            self.service_name = name.into();
            self
        }

        pub fn with_version(mut self, version: impl Into<String>) -> Self {
            self.service_version = version.into();
            self
        }

        /// Installs the subscriber as the global default. Returns `self` so the
        /// caller can still build an HTTP tracing layer afterward.
        pub fn register(self) -> Self {
            let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

            match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
                Ok(endpoint) => {
                    let exporter = opentelemetry_otlp::SpanExporter::builder()
                        .with_tonic()
                        .with_endpoint(endpoint)
                        .with_timeout(Duration::from_secs(5))
                        .build()
                        .expect("failed to build OTLP span exporter");
                    let resource = Resource::builder()
                        .with_attributes([
                            KeyValue::new("service.name", self.service_name.clone()),
                            KeyValue::new("service.version", self.service_version.clone()),
                        ])
                        .build();
                    let provider = SdkTracerProvider::builder()
                        .with_batch_exporter(exporter)
                        .with_resource(resource)
                        .build();
                    let tracer = provider.tracer(self.service_name.clone());
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(tracing_subscriber::fmt::layer())
                        .with(otel_layer)
                        .init();
                }
                Err(_) => {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(tracing_subscriber::fmt::layer())
                        .init();
                }
            }

            self
        }

        /// A `tower-http` layer recording one span per HTTP request.
        pub fn http_tracing(&self) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>> {
            TraceLayer::new_for_http()
        }
    }

    impl Default for Telemetry {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(feature = "telemetry")]
pub use imp::Telemetry;
