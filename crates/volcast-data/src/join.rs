//! Joining per-instrument bucket tables into the modelling table.

use crate::error::Result;
use crate::provider::{Instrument, LoadRequest, TimeSeriesProvider};
use crate::table::{HHMM_COL, TIME_COL, VOLUME_COL, require_columns};
use chrono::NaiveDateTime;
use polars::prelude::*;

/// Name of the prediction target column in the joined table.
pub const TARGET_COL: &str = "VOLUME_fut_target";

fn volumes(df: DataFrame, instrument: Instrument, with_hhmm: bool) -> Result<LazyFrame> {
    require_columns(&df, &[TIME_COL, HHMM_COL, VOLUME_COL])?;
    let mut exprs = vec![col(TIME_COL)];
    if with_hhmm {
        exprs.push(col(HHMM_COL));
    }
    exprs.push(col(VOLUME_COL).alias(instrument.volume_column()));
    Ok(df.lazy().select(exprs))
}

/// Inner-join futures, ETF and options buckets on `time`.
///
/// Output columns: `time`, `hhmm` (from futures), `VOLUME_fut`, `VOLUME_etf`,
/// `VOLUME_opt` and [`TARGET_COL`] (a copy of `VOLUME_fut`), sorted by time.
/// Buckets missing from any instrument are dropped.
pub fn join_instruments(fut: DataFrame, etf: DataFrame, opt: DataFrame) -> Result<DataFrame> {
    let heights = (fut.height(), etf.height(), opt.height());
    let fut_col = Instrument::Futures.volume_column();

    let joined = volumes(fut, Instrument::Futures, true)?
        .inner_join(
            volumes(etf, Instrument::Etf, false)?,
            col(TIME_COL),
            col(TIME_COL),
        )
        .inner_join(
            volumes(opt, Instrument::Options, false)?,
            col(TIME_COL),
            col(TIME_COL),
        )
        .with_column(col(fut_col.as_str()).alias(TARGET_COL))
        .sort([TIME_COL], Default::default())
        .collect()?;

    tracing::info!(
        fut = heights.0,
        etf = heights.1,
        opt = heights.2,
        joined = joined.height(),
        "joined instrument buckets"
    );
    Ok(joined)
}

/// Load all three instruments for `[start, end]` and join them.
pub fn load_joined<P: TimeSeriesProvider + ?Sized>(
    provider: &P,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<DataFrame> {
    let load = |instrument| provider.load(&LoadRequest::new(instrument, start, end)?);
    join_instruments(
        load(Instrument::Futures)?,
        load(Instrument::Etf)?,
        load(Instrument::Options)?,
    )
}
