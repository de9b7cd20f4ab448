//! Data-quality gate applied to every file before ingest.
//!
//! Checks run in [`CHECKS`] order and the first failure wins.

use std::collections::BTreeSet;

use crate::api::BadDataReason;
use crate::models::EventFile;

/// Tunables for the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckSettings {
    pub bad_proposals: BTreeSet<i64>,
    pub min_exptime: qtty::Seconds,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            bad_proposals: BTreeSet::new(),
            min_exptime: qtty::Seconds::new(1.0),
        }
    }
}

pub type CheckFn = fn(&EventFile, &CheckSettings) -> Result<(), BadDataReason>;

/// A named quality check.
#[derive(Clone, Copy)]
pub struct DataCheck {
    pub name: &'static str,
    pub check: CheckFn,
}

pub const CHECKS: [DataCheck; 6] = [
    DataCheck {
        name: "expflag",
        check: check_expflag,
    },
    DataCheck {
        name: "no_events",
        check: check_no_events,
    },
    DataCheck {
        name: "linear_time",
        check: check_linear_time,
    },
    DataCheck {
        name: "not_singular",
        check: check_not_singular,
    },
    DataCheck {
        name: "bad_proposal",
        check: check_bad_proposal,
    },
    DataCheck {
        name: "exptime",
        check: check_exptime,
    },
];

/// Run every check in order, returning the reason of the first failure.
pub fn dataset_ok(file: &EventFile, settings: &CheckSettings) -> Result<(), BadDataReason> {
    CHECKS
        .iter()
        .try_for_each(|entry| (entry.check)(file, settings))
}

pub fn check_expflag(file: &EventFile, _: &CheckSettings) -> Result<(), BadDataReason> {
    if file.header.expflag == "NORMAL" {
        Ok(())
    } else {
        Err(BadDataReason::BadExpflag)
    }
}

pub fn check_no_events(file: &EventFile, _: &CheckSettings) -> Result<(), BadDataReason> {
    if file.events.is_empty() {
        Err(BadDataReason::NoEvents)
    } else {
        Ok(())
    }
}

/// TIME must never decrease.
pub fn check_linear_time(file: &EventFile, _: &CheckSettings) -> Result<(), BadDataReason> {
    if file.events.time.windows(2).all(|w| w[1] >= w[0]) {
        Ok(())
    } else {
        Err(BadDataReason::NonLinearTime)
    }
}

/// At least two distinct event times.
pub fn check_not_singular(file: &EventFile, _: &CheckSettings) -> Result<(), BadDataReason> {
    let times = &file.events.time;
    match times.first() {
        Some(first) if times.iter().all(|t| t == first) => Err(BadDataReason::SingularEvent),
        _ => Ok(()),
    }
}

pub fn check_bad_proposal(file: &EventFile, settings: &CheckSettings) -> Result<(), BadDataReason> {
    if settings.bad_proposals.contains(&file.header.proposid) {
        Err(BadDataReason::BadProposal)
    } else {
        Ok(())
    }
}

pub fn check_exptime(file: &EventFile, settings: &CheckSettings) -> Result<(), BadDataReason> {
    if file.header.exptime < settings.min_exptime.value() {
        Err(BadDataReason::ShortExposure)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventTable, ExposureHeader};

    fn file(times: Vec<f64>) -> EventFile {
        let n = times.len();
        EventFile {
            header: ExposureHeader {
                telescope: "HST".to_string(),
                instrument: "COS".to_string(),
                detector: "FUV".to_string(),
                targname: "HD12345".to_string(),
                opt_elem: "G130M".to_string(),
                cenwave: 1300,
                aperture: "PSA".to_string(),
                obstype: "SPECTROSCOPIC".to_string(),
                fppos: 3,
                cal_ver: "3.0".to_string(),
                expflag: "NORMAL".to_string(),
                proposid: 12000,
                sdqflags: 0,
                exptime: 100.0,
                expstart: 55000.0,
                bkgrate: None,
                sensitivity: None,
            },
            events: EventTable {
                time: times,
                wavelength: vec![1200.0; n],
                xcorr: vec![1.0; n],
                ycorr: vec![1.0; n],
                dq: vec![0; n],
            },
        }
    }

    #[test]
    fn test_good_file_passes() {
        assert_eq!(dataset_ok(&file(vec![0.0, 1.0, 1.0, 2.0]), &CheckSettings::default()), Ok(()));
    }

    #[test]
    fn test_each_reason() {
        let settings = CheckSettings {
            bad_proposals: [12000].into_iter().collect(),
            ..CheckSettings::default()
        };
        let ok = CheckSettings::default();

        let mut f = file(vec![0.0, 1.0]);
        f.header.expflag = "INTERRUPTED".to_string();
        assert_eq!(dataset_ok(&f, &ok), Err(BadDataReason::BadExpflag));

        assert_eq!(dataset_ok(&file(vec![]), &ok), Err(BadDataReason::NoEvents));
        assert_eq!(dataset_ok(&file(vec![2.0, 1.0]), &ok), Err(BadDataReason::NonLinearTime));
        assert_eq!(dataset_ok(&file(vec![3.0, 3.0, 3.0]), &ok), Err(BadDataReason::SingularEvent));
        assert_eq!(dataset_ok(&file(vec![0.0, 1.0]), &settings), Err(BadDataReason::BadProposal));

        let mut short = file(vec![0.0, 0.5]);
        short.header.exptime = 0.8;
        assert_eq!(dataset_ok(&short, &ok), Err(BadDataReason::ShortExposure));
    }

    #[test]
    fn test_first_failure_wins() {
        let mut f = file(vec![]);
        f.header.expflag = "BAD".to_string();
        f.header.exptime = 0.0;
        assert_eq!(dataset_ok(&f, &CheckSettings::default()), Err(BadDataReason::BadExpflag));
    }

    #[test]
    fn test_registry_order() {
        let names: Vec<_> = CHECKS.iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            ["expflag", "no_events", "linear_time", "not_singular", "bad_proposal", "exptime"]
        );
    }
}
