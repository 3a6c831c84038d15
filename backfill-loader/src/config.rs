use backfill_config::load_config;
use backfill_config::shared::BackfillConfig;

use crate::error::{LoaderError, LoaderResult};

/// Loads and validates the backfill configuration.
pub fn load_backfill_config() -> LoaderResult<BackfillConfig> {
    let config = load_config::<BackfillConfig>().map_err(LoaderError::config)?;
    config.validate().map_err(LoaderError::config)?;

    Ok(config)
}
