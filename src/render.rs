//! Read-only presentation of a merged diagnosis.

use std::fmt;

use serde::Serialize;
use url::Url;

use crate::{config::ClientConfig, error::Result, model::MergedResult};

/// Everything the result panel shows, already resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultView {
    pub badge: Option<String>,
    pub description: String,
    /// Shown numbered, in service order.
    pub treatment: Vec<String>,
    /// Shown bulleted, in service order.
    pub prevention: Vec<String>,
    /// Reference images, resolved against the service host.
    pub gallery: Vec<Url>,
}

impl ResultView {
    pub fn project(result: &MergedResult, config: &ClientConfig) -> Result<Self> {
        let cure = &result.cure_info;
        let gallery = cure
            .images
            .iter()
            .map(|path| config.resolve(path))
            .collect::<Result<Vec<_>>>()?;

        Ok(ResultView {
            badge: result.label().map(str::to_string),
            description: cure.reason.clone().unwrap_or_default(),
            treatment: cure.treatment.steps.clone(),
            prevention: cure.prevention.steps.clone(),
            gallery,
        })
    }
}

impl fmt::Display for ResultView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Potential Plant Issue")?;
        if let Some(badge) = &self.badge {
            writeln!(f)?;
            writeln!(f, "  [ {badge} ]")?;
        }

        writeln!(f)?;
        writeln!(f, "Description")?;
        writeln!(f, "  {}", self.description)?;

        writeln!(f)?;
        writeln!(f, "Treatment")?;
        for (index, step) in self.treatment.iter().enumerate() {
            writeln!(f, "  {}. {step}", index + 1)?;
        }

        writeln!(f)?;
        writeln!(f, "Prevention")?;
        for step in &self.prevention {
            writeln!(f, "  - {step}")?;
        }

        writeln!(f)?;
        writeln!(f, "Alternate Images")?;
        for (index, url) in self.gallery.iter().enumerate() {
            writeln!(f, "  ({}) {url}", index + 1)?;
        }
        Ok(())
    }
}

/// Renders the result panel; nothing at all when there is no result.
pub fn render(result: Option<&MergedResult>, config: &ClientConfig) -> Result<Option<String>> {
    result
        .map(|result| ResultView::project(result, config).map(|view| view.to_string()))
        .transpose()
}
