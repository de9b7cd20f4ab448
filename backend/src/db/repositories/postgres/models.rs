use chrono::NaiveDate;
use diesel::prelude::*;

use super::schema::{bad_data, metadata, outputs, stats};
use crate::api::{
    BadDataId, BadDataReason, BadDataRecord, Exposure, ExposureId, Instrument, ObsType, OutputId,
    OutputRecord, StatsId, StatsRecord,
};
use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = metadata)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MetadataRow {
    pub id: i64,
    pub filename: String,
    pub path: String,
    pub telescope: String,
    pub instrument: String,
    pub detector: String,
    pub targname: String,
    pub cal_ver: String,
    pub obstype: String,
    pub cenwave: i32,
    pub opt_elem: String,
    pub aperture: String,
    pub fppos: i32,
    pub ingest_date: NaiveDate,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = metadata)]
pub struct NewMetadataRow {
    pub filename: String,
    pub path: String,
    pub telescope: String,
    pub instrument: String,
    pub detector: String,
    pub targname: String,
    pub cal_ver: String,
    pub obstype: String,
    pub cenwave: i32,
    pub opt_elem: String,
    pub aperture: String,
    pub fppos: i32,
    pub ingest_date: NaiveDate,
}

impl From<&Exposure> for NewMetadataRow {
    fn from(e: &Exposure) -> Self {
        Self {
            filename: e.filename.clone(),
            path: e.path.clone(),
            telescope: e.telescope.clone(),
            instrument: e.instrument.as_str().to_string(),
            detector: e.detector.clone(),
            targname: e.targname.clone(),
            cal_ver: e.cal_ver.clone(),
            obstype: e.obstype.as_str().to_string(),
            cenwave: e.cenwave,
            opt_elem: e.opt_elem.clone(),
            aperture: e.aperture.clone(),
            fppos: e.fppos,
            ingest_date: e.ingest_date,
        }
    }
}

fn decode_error(column: &str, row_id: i64, message: String) -> RepositoryError {
    RepositoryError::internal(message).at(ErrorContext::new("decode_row").row(column, row_id))
}

impl TryFrom<MetadataRow> for Exposure {
    type Error = RepositoryError;

    fn try_from(row: MetadataRow) -> RepositoryResult<Self> {
        let instrument = row
            .instrument
            .parse::<Instrument>()
            .map_err(|e| decode_error("metadata.instrument", row.id, e))?;
        let obstype = row
            .obstype
            .parse::<ObsType>()
            .map_err(|e| decode_error("metadata.obstype", row.id, e))?;
        Ok(Exposure {
            id: Some(ExposureId(row.id)),
            filename: row.filename,
            path: row.path,
            telescope: row.telescope,
            instrument,
            detector: row.detector,
            targname: row.targname,
            cal_ver: row.cal_ver,
            obstype,
            cenwave: row.cenwave,
            opt_elem: row.opt_elem,
            aperture: row.aperture,
            fppos: row.fppos,
            ingest_date: row.ingest_date,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = outputs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutputRow {
    pub id: i64,
    pub metadata_id: i64,
    pub individual_path: String,
    pub individual_filename: String,
    pub composite_path: Option<String>,
    pub composite_filename: Option<String>,
}

// `treat_none_as_null` so an upsert with no composite clears the old one
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = outputs)]
#[diesel(treat_none_as_null = true)]
pub struct NewOutputRow {
    pub metadata_id: i64,
    pub individual_path: String,
    pub individual_filename: String,
    pub composite_path: Option<String>,
    pub composite_filename: Option<String>,
}

impl From<&OutputRecord> for NewOutputRow {
    fn from(o: &OutputRecord) -> Self {
        Self {
            metadata_id: o.exposure_id.value(),
            individual_path: o.individual_path.clone(),
            individual_filename: o.individual_filename.clone(),
            composite_path: o.composite_path.clone(),
            composite_filename: o.composite_filename.clone(),
        }
    }
}

impl From<OutputRow> for OutputRecord {
    fn from(row: OutputRow) -> Self {
        OutputRecord {
            id: Some(OutputId(row.id)),
            exposure_id: ExposureId(row.metadata_id),
            individual_path: row.individual_path,
            individual_filename: row.individual_filename,
            composite_path: row.composite_path,
            composite_filename: row.composite_filename,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = bad_data)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BadDataRow {
    pub id: i64,
    pub filename: String,
    pub ingest_date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = bad_data)]
pub struct NewBadDataRow {
    pub filename: String,
    pub ingest_date: NaiveDate,
    pub reason: String,
}

impl From<&BadDataRecord> for NewBadDataRow {
    fn from(r: &BadDataRecord) -> Self {
        Self {
            filename: r.filename.clone(),
            ingest_date: r.ingest_date,
            reason: r.reason.as_str().to_string(),
        }
    }
}

impl TryFrom<BadDataRow> for BadDataRecord {
    type Error = RepositoryError;

    fn try_from(row: BadDataRow) -> RepositoryResult<Self> {
        let reason = row
            .reason
            .parse::<BadDataReason>()
            .map_err(|e| decode_error("bad_data.reason", row.id, e))?;
        Ok(BadDataRecord {
            id: Some(BadDataId(row.id)),
            filename: row.filename,
            ingest_date: row.ingest_date,
            reason,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = stats)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StatsRow {
    pub id: i64,
    pub lightcurve_path: String,
    pub lightcurve_filename: String,
    pub total: i64,
    pub mean: Option<f64>,
    pub mu: Option<f64>,
    pub stdev: Option<f64>,
    pub poisson_factor: Option<f64>,
    pub pearson_r: Option<f64>,
    pub pearson_p: Option<f64>,
    pub periodogram: bool,
    pub deliver: bool,
}

/// Insert/update payload for `stats`. `deliver` is left to its column default
/// on insert and never touched on update.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = stats)]
#[diesel(treat_none_as_null = true)]
pub struct NewStatsRow {
    pub lightcurve_path: String,
    pub lightcurve_filename: String,
    pub total: i64,
    pub mean: Option<f64>,
    pub mu: Option<f64>,
    pub stdev: Option<f64>,
    pub poisson_factor: Option<f64>,
    pub pearson_r: Option<f64>,
    pub pearson_p: Option<f64>,
    pub periodogram: bool,
}

impl From<&StatsRecord> for NewStatsRow {
    fn from(s: &StatsRecord) -> Self {
        Self {
            lightcurve_path: s.lightcurve_path.clone(),
            lightcurve_filename: s.lightcurve_filename.clone(),
            total: s.total,
            mean: s.mean,
            mu: s.mu,
            stdev: s.stdev,
            poisson_factor: s.poisson_factor,
            pearson_r: s.pearson_r,
            pearson_p: s.pearson_p,
            periodogram: s.periodogram,
        }
    }
}

impl From<StatsRow> for StatsRecord {
    fn from(row: StatsRow) -> Self {
        StatsRecord {
            id: Some(StatsId(row.id)),
            lightcurve_path: row.lightcurve_path,
            lightcurve_filename: row.lightcurve_filename,
            total: row.total,
            mean: row.mean,
            mu: row.mu,
            stdev: row.stdev,
            poisson_factor: row.poisson_factor,
            pearson_r: row.pearson_r,
            pearson_p: row.pearson_p,
            periodogram: row.periodogram,
            deliver: row.deliver,
        }
    }
}
