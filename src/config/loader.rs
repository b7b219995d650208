//! Config loading facade.

use super::merge_policy::builder_with_defaults;
use super::sources::{add_environment, global_file, workspace_file};
use super::TabsumConfig;
use crate::error::PipelineError;
use config::File;
use std::path::Path;
use tracing::debug;

/// Loads [`TabsumConfig`] from the layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace: defaults, global file, workspace files, env.
    pub fn load(workspace_root: &Path) -> Result<TabsumConfig, PipelineError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder);
        let builder = workspace_file::add_to_builder(builder, workspace_root);
        let builder = add_environment(builder);

        let config: TabsumConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        config.validated()
    }

    /// Load configuration from a single file (plus defaults and env overrides).
    pub fn load_from_file(path: &Path) -> Result<TabsumConfig, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::ConfigError(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let builder = builder_with_defaults()?.add_source(File::from(path));
        let builder = add_environment(builder);

        let config: TabsumConfig = builder.build()?.try_deserialize()?;
        config.validated()
    }
}
