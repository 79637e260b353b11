use anyhow::{Result, anyhow};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

pub struct LogConfig {
    pub filter: String,
}

pub struct Logger {
    reload_handle: reload::Handle<EnvFilter, Registry>,
}

impl Logger {
    pub fn new_bootstrap() -> Self {
        Self::init(false)
    }

    /// Like [`Logger::new_bootstrap`] but with the JSON formatter. The format
    /// cannot be swapped after installation, only the filter.
    pub fn new_bootstrap_json() -> Self {
        Self::init(true)
    }

    fn init(json: bool) -> Self {
        let filter = EnvFilter::new("info");
        let (filter, reload_handle) = reload::Layer::new(filter);

        let fmt_layer = if json {
            fmt::layer().json().with_current_span(true).boxed()
        } else {
            fmt::layer().boxed()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();

        Self { reload_handle }
    }

    pub fn reload_from_config(&self, config: &LogConfig) -> Result<()> {
        let filter = EnvFilter::try_new(&config.filter).map_err(|e| anyhow!(e))?;
        self.reload_handle.reload(filter).map_err(|e| anyhow!(e))?;
        Ok(())
    }
}
