//! Public Dump/Load entry points
//!
//! A [`Marshal`] holds only its [`CodecConfig`]. Every call builds fresh
//! symbol and object tables, so one codec can serve any number of calls;
//! values themselves are single-threaded (`Rc`), so calls on a given graph
//! stay on the thread that owns it.

use crate::config::CodecConfig;
use crate::decoder::Loader;
use crate::encoder::Dumper;
use crate::error::{LoadWarning, Result};
use crate::host::HostAdapter;
use crate::value::Value;
use tracing::debug;

/// Result of a successful Load
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub value: Value,
    /// Non-fatal conditions seen while reading (newer or older minor version)
    pub warnings: Vec<LoadWarning>,
}

/// Encoder/decoder pair for one format version
#[derive(Debug, Clone, Default)]
pub struct Marshal {
    config: CodecConfig,
}

impl Marshal {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Dump with the configured depth budget
    pub fn dump(&self, value: &Value, host: &dyn HostAdapter) -> Result<Vec<u8>> {
        self.dump_with_limit(value, self.config.depth_limit, host)
    }

    /// Dump with an explicit depth budget (negative means unlimited)
    pub fn dump_with_limit(
        &self,
        value: &Value,
        limit: i32,
        host: &dyn HostAdapter,
    ) -> Result<Vec<u8>> {
        debug!("dump start (limit {})", limit);
        let bytes = Dumper::new(host, &self.config).dump(value, limit)?;
        debug!("dump done ({} bytes)", bytes.len());
        Ok(bytes)
    }

    pub fn load(&self, bytes: &[u8], host: &dyn HostAdapter) -> Result<Loaded> {
        self.run_load(bytes, host, None)
    }

    /// Load, calling `callback` post-order on each decoded value
    ///
    /// Backreferences (`@`, `;`) and values still inside an `I`/`e` wrapper
    /// are not reported. An error from the callback aborts the load.
    pub fn load_with(
        &self,
        bytes: &[u8],
        host: &dyn HostAdapter,
        callback: &mut dyn FnMut(&Value) -> Result<()>,
    ) -> Result<Loaded> {
        self.run_load(bytes, host, Some(callback))
    }

    fn run_load(
        &self,
        bytes: &[u8],
        host: &dyn HostAdapter,
        callback: Option<&mut dyn FnMut(&Value) -> Result<()>>,
    ) -> Result<Loaded> {
        debug!("load start ({} bytes)", bytes.len());
        let (value, warnings) = Loader::new(bytes, host, &self.config, callback).load()?;
        debug!("load done ({} warnings)", warnings.len());
        Ok(Loaded { value, warnings })
    }
}

/// Dump `value` with the default configuration
pub fn dump(value: &Value, host: &dyn HostAdapter) -> Result<Vec<u8>> {
    Marshal::default().dump(value, host)
}

/// Load a value with the default configuration, discarding warnings
pub fn load(bytes: &[u8], host: &dyn HostAdapter) -> Result<Value> {
    Marshal::default().load(bytes, host).map(|loaded| loaded.value)
}
