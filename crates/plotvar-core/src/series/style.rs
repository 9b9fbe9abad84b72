//! Plot presentation metadata carried alongside series data.

use serde::{Deserialize, Serialize};

/// Axis scaling for a plotted series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisScale {
    /// Linear axis.
    #[default]
    Linear,
    /// Logarithmic axis.
    Log,
}

/// Presentation hints for one series.
///
/// Every field is optional in spirit: a default style means "let the
/// plotting layer decide". Styles ride along with series data through
/// derivation and persistence so a derived variable keeps its look
/// across recomputations and restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotStyle {
    /// Axis label, usually the variable name plus units.
    pub label: Option<String>,
    /// Legend entry when several series share a panel.
    pub legend: Option<String>,
    /// Line or marker color, as understood by the plotting layer.
    pub color: Option<String>,
    /// Axis scaling.
    pub scale: AxisScale,
    /// Line style name, e.g. `"solid"` or `"dotted"`.
    pub line: Option<String>,
    /// Marker style name, or `None` for a plain line.
    pub marker: Option<String>,
    /// Histogram bin edges for spectrogram-like data.
    pub bins: Option<Vec<f64>>,
}

impl PlotStyle {
    /// Default style carrying only an axis label.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }
}
