//! Destination resolver
//!
//! Maps a descriptor path to its category and delivery folder by position in
//! the folder tree: `<descriptor_root>/<category>/...` delivers to
//! `<download_root>/<category>`.

use crate::Result;
use crate::config::Config;
use crate::types::Category;
use std::path::{Component, Path, PathBuf};

/// Resolves descriptor locations to delivery folders
#[derive(Clone, Debug)]
pub struct DestinationResolver {
    descriptor_root: PathBuf,
    download_root: PathBuf,
    enabled: Vec<Category>,
}

impl DestinationResolver {
    /// Create a resolver over explicit roots
    pub fn new(
        descriptor_root: impl Into<PathBuf>,
        download_root: impl Into<PathBuf>,
        enabled: Vec<Category>,
    ) -> Self {
        Self {
            descriptor_root: descriptor_root.into(),
            download_root: download_root.into(),
            enabled,
        }
    }

    /// Build from configuration; only enabled catalogs resolve
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.paths.descriptor_root.clone(),
            config.paths.download_root.clone(),
            config.catalogs.enabled_categories(),
        )
    }

    /// Category and delivery folder for a descriptor, if it lives under an
    /// enabled category folder
    pub fn resolve(&self, descriptor: &Path) -> Option<(Category, PathBuf)> {
        let relative = descriptor.strip_prefix(&self.descriptor_root).ok()?;
        let mut components = relative.components();
        let first = match components.next()? {
            Component::Normal(name) => name.to_str()?,
            _ => return None,
        };
        // The descriptor itself must sit below the category folder
        components.next()?;

        let category = Category::parse(first)?;
        if !self.enabled.contains(&category) {
            tracing::debug!(
                path = %descriptor.display(),
                category = %category,
                "descriptor belongs to a disabled category"
            );
            return None;
        }
        Some((category, self.download_folder(category)))
    }

    /// Delivery folder of a category
    pub fn download_folder(&self, category: Category) -> PathBuf {
        self.download_root.join(category.as_str())
    }

    /// Descriptor folder of a category
    pub fn descriptor_folder(&self, category: Category) -> PathBuf {
        self.descriptor_root.join(category.as_str())
    }

    /// Descriptor folders of all enabled categories
    pub fn monitored_folders(&self) -> Vec<PathBuf> {
        self.enabled
            .iter()
            .map(|c| self.descriptor_folder(*c))
            .collect()
    }

    /// Enabled categories
    pub fn categories(&self) -> &[Category] {
        &self.enabled
    }

    /// Create descriptor and delivery folders of every enabled category
    pub async fn ensure_folders(&self) -> Result<()> {
        for category in &self.enabled {
            for folder in [
                self.descriptor_folder(*category),
                self.download_folder(*category),
            ] {
                tokio::fs::create_dir_all(&folder).await?;
                tracing::debug!(folder = %folder.display(), "ensured folder");
            }
        }
        Ok(())
    }
}
