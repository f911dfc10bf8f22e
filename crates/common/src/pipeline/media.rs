//! Media Locator - image references for a resolved subject

use super::subject::Subject;
use crate::knowledge::KnowledgeSource;
use std::sync::Arc;
use tracing::{debug, error};

/// Raster formats kept from a page's image list
const IMAGE_SUFFIXES: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];

/// Best-effort image lookup over the knowledge source
pub struct MediaLocator {
    source: Arc<dyn KnowledgeSource>,
}

impl MediaLocator {
    pub fn new(source: Arc<dyn KnowledgeSource>) -> Self {
        Self { source }
    }

    /// Image URLs of the subject's page. Failures yield an empty list.
    pub async fn find_images(&self, subject: &Subject) -> Vec<String> {
        if subject.is_empty() {
            return Vec::new();
        }

        let page = match self.source.page(subject.as_str()).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                debug!(subject = %subject, "No page for image lookup");
                return Vec::new();
            }
            Err(e) => {
                error!(subject = %subject, error = %e, "Error fetching images");
                return Vec::new();
            }
        };

        match self.source.images(&page.title).await {
            Ok(images) => images.into_iter().filter(|url| is_raster_image(url)).collect(),
            Err(e) => {
                error!(subject = %subject, title = %page.title, error = %e, "Error fetching images");
                Vec::new()
            }
        }
    }
}

fn is_raster_image(url: &str) -> bool {
    IMAGE_SUFFIXES.iter().any(|suffix| url.ends_with(suffix))
}
