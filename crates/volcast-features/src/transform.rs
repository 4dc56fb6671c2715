//! The `Transform` trait shared by the table transforms.

use crate::error::Result;
use polars::prelude::*;
use volcast_data::table::require_columns;

/// A pure table-to-table transformation.
pub trait Transform {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Columns that must be present in the input.
    fn required_columns(&self) -> Vec<String>;

    /// Produce a new table; the input is left untouched.
    fn apply(&self, df: &DataFrame) -> Result<DataFrame>;

    /// Fail on the first missing required column.
    fn check_input(&self, df: &DataFrame) -> Result<()> {
        Ok(require_columns(df, &self.required_columns())?)
    }
}

/// Apply transforms in order.
pub fn apply_all(df: &DataFrame, transforms: &[&dyn Transform]) -> Result<DataFrame> {
    let mut out = df.clone();
    for transform in transforms {
        tracing::debug!(transform = transform.name(), rows = out.height(), "applying transform");
        out = transform.apply(&out)?;
    }
    Ok(out)
}
