pub mod filter;
pub mod integrate;
pub mod orthologs;

use anyhow::Result;
use log::info;
use orthocurate::types::CurateError;

/// Size the global rayon pool, or report the auto-detected size
pub fn configure_threads(threads: Option<usize>) -> Result<()> {
    if let Some(threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| CurateError::InvalidInput(format!("Failed to set thread count: {}", e)))?;
        info!("Using {} threads for parallel processing", threads);
    } else {
        info!(
            "Using {} threads for parallel processing (auto-detected)",
            rayon::current_num_threads()
        );
    }
    Ok(())
}
