//! Initial populations built from postcode-level census counts.
//!
//! The input is a CSV file with a header row. Only these columns are read:
//!
//! | column | contents |
//! |---|---|
//! | 0 | postcode |
//! | 6 | longitude |
//! | 7 | latitude |
//! | 8 | persons |
//! | 9 | females |
//! | 10 | males |
//!
//! Empty count cells are read as zero.
use std::path::Path;

use csv::StringRecord;
use log::{debug, info};
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agents::{Position, Role, Sex};
use crate::error::GeospreadError;
use crate::parameters::SeedingOptions;
use crate::population::AgentSeed;

const POSTCODE: usize = 0;
const LONGITUDE: usize = 6;
const LATITUDE: usize = 7;
const PERSONS: usize = 8;
const FEMALES: usize = 9;
const MALES: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CensusRecord {
    pub postcode: String,
    pub position: Position,
    pub persons: u32,
    pub females: u32,
    pub males: u32,
}

impl CensusRecord {
    /// People whose sex is not broken down in the counts.
    #[must_use]
    pub fn unassigned(&self) -> u32 {
        self.persons
            .saturating_sub(self.females.saturating_add(self.males))
    }
}

fn field<'r>(record: &'r StringRecord, column: usize, line: u64) -> Result<&'r str, GeospreadError> {
    record
        .get(column)
        .map(str::trim)
        .ok_or_else(|| GeospreadError::InvalidRecord {
            line,
            message: format!("missing column {column}"),
        })
}

fn coordinate(record: &StringRecord, column: usize, line: u64) -> Result<f64, GeospreadError> {
    let value = field(record, column, line)?;
    value.parse().map_err(|_| GeospreadError::InvalidRecord {
        line,
        message: format!("column {column}: {value:?} is not a number"),
    })
}

fn count(record: &StringRecord, column: usize, line: u64) -> Result<u32, GeospreadError> {
    let value = field(record, column, line)?;
    if value.is_empty() {
        return Ok(0);
    }
    value.parse().map_err(|_| GeospreadError::InvalidRecord {
        line,
        message: format!("column {column}: {value:?} is not a count"),
    })
}

fn parse_record(record: &StringRecord) -> Result<CensusRecord, GeospreadError> {
    let line = record.position().map_or(0, csv::Position::line);
    let position = Position::new(
        coordinate(record, LATITUDE, line)?,
        coordinate(record, LONGITUDE, line)?,
    );
    position.validate()?;
    Ok(CensusRecord {
        postcode: field(record, POSTCODE, line)?.to_string(),
        position,
        persons: count(record, PERSONS, line)?,
        females: count(record, FEMALES, line)?,
        males: count(record, MALES, line)?,
    })
}

/// Reads every row of a census CSV file.
///
/// # Errors
///
/// Returns `IoError`/`CsvError` if the file cannot be read, `InvalidRecord` for a row with
/// a missing column or a malformed number, and `InvalidPosition` for coordinates outside
/// the valid range.
pub fn read_census_csv(path: &Path) -> Result<Vec<CensusRecord>, GeospreadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let mut records = Vec::new();
    for result in reader.records() {
        records.push(parse_record(&result?)?);
    }
    info!("read {} postcodes from {}", records.len(), path.display());
    Ok(records)
}

/// Creates one susceptible seed per person counted in `records`.
///
/// Each record yields its females, then its males, then its unassigned people with a
/// uniformly drawn sex, all at the postcode position. Ages are uniform in
/// `min_age..=max_age`. Afterwards `initial_infectious` seeds, chosen uniformly without
/// replacement, are made infectious with their speed scaled by `infectious_speed_ratio`.
///
/// # Errors
///
/// Returns `ConfigurationError` if `min_age` exceeds `max_age` or more infectious seeds are
/// requested than there are people.
pub fn seeds_from_census<R: Rng + ?Sized>(
    records: &[CensusRecord],
    options: &SeedingOptions,
    infectious_speed_ratio: f64,
    rng: &mut R,
) -> Result<Vec<AgentSeed>, GeospreadError> {
    if options.min_age > options.max_age {
        return Err(GeospreadError::ConfigurationError(format!(
            "min_age ({}) is greater than max_age ({})",
            options.min_age, options.max_age
        )));
    }

    let mut seeds = Vec::new();
    for record in records {
        let sexes = std::iter::repeat_n(Some(Sex::Female), record.females as usize)
            .chain(std::iter::repeat_n(Some(Sex::Male), record.males as usize))
            .chain(std::iter::repeat_n(None, record.unassigned() as usize));
        for sex in sexes {
            let sex = sex.unwrap_or_else(|| {
                if rng.random_bool(0.5) {
                    Sex::Female
                } else {
                    Sex::Male
                }
            });
            seeds.push(AgentSeed {
                role: Role::Susceptible,
                position: record.position,
                age: rng.random_range(options.min_age..=options.max_age),
                sex,
                speed: options.susceptible_speed_km,
            });
        }
    }

    if options.initial_infectious > seeds.len() {
        return Err(GeospreadError::ConfigurationError(format!(
            "{} initial infectious agents requested from a population of {}",
            options.initial_infectious,
            seeds.len()
        )));
    }
    for i in index::sample(rng, seeds.len(), options.initial_infectious) {
        let seed = &mut seeds[i];
        seed.role = Role::Infectious;
        seed.speed *= infectious_speed_ratio;
    }
    debug!(
        "created {} seeds, {} infectious",
        seeds.len(),
        options.initial_infectious
    );
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "pcd,a,b,c,d,e,long,lat,persons,females,males";

    fn census_file(rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file
    }

    fn record(persons: u32, females: u32, males: u32) -> CensusRecord {
        CensusRecord {
            postcode: "SW1A 1AA".to_string(),
            position: Position::new(51.501, -0.141),
            persons,
            females,
            males,
        }
    }

    #[test]
    fn reads_columns_and_empty_counts() {
        let file = census_file(&[
            "SW1A 1AA,x,x,x,x,x,-0.141,51.501,5,2,3",
            "EC1A 1BB,x,x,x,x,x,-0.1,51.52,,,",
        ]);
        let records = read_census_csv(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], record(5, 2, 3));
        assert_eq!(records[1].postcode, "EC1A 1BB");
        assert_eq!(records[1].position, Position::new(51.52, -0.1));
        assert_eq!(
            (records[1].persons, records[1].females, records[1].males),
            (0, 0, 0)
        );
    }

    #[test]
    fn malformed_rows_report_their_line() {
        let file = census_file(&["SW1A 1AA,x,x,x,x,x,-0.141,north,5,2,3"]);
        assert!(matches!(
            read_census_csv(file.path()),
            Err(GeospreadError::InvalidRecord { line: 2, .. })
        ));

        let file = census_file(&["SW1A 1AA,x,x,x,x,x,-0.141,51.5"]);
        assert!(matches!(
            read_census_csv(file.path()),
            Err(GeospreadError::InvalidRecord { .. })
        ));

        let file = census_file(&["SW1A 1AA,x,x,x,x,x,-0.141,95.0,1,1,0"]);
        assert!(matches!(
            read_census_csv(file.path()),
            Err(GeospreadError::InvalidPosition { .. })
        ));
    }

    #[test]
    fn one_seed_per_person() {
        let mut rng = SmallRng::seed_from_u64(5);
        let options = SeedingOptions {
            susceptible_speed_km: 3.0,
            initial_infectious: 0,
            min_age: 20,
            max_age: 30,
        };
        let seeds = seeds_from_census(&[record(6, 2, 3), record(1, 0, 0)], &options, 0.5, &mut rng)
            .unwrap();
        assert_eq!(seeds.len(), 7);
        assert_eq!(
            seeds[..5].iter().map(|s| s.sex).collect::<Vec<_>>(),
            vec![Sex::Female, Sex::Female, Sex::Male, Sex::Male, Sex::Male]
        );
        assert!(seeds.iter().all(|s| (20..=30).contains(&s.age)));
        assert!(seeds.iter().all(|s| s.role == Role::Susceptible && s.speed == 3.0));
    }

    #[test]
    fn counts_above_persons_are_kept() {
        let mut rng = SmallRng::seed_from_u64(5);
        let options = SeedingOptions {
            initial_infectious: 0,
            ..SeedingOptions::default()
        };
        let seeds = seeds_from_census(&[record(1, 2, 2)], &options, 0.5, &mut rng).unwrap();
        assert_eq!(seeds.len(), 4);
    }

    #[test]
    fn initial_infectious_are_distinct() {
        let mut rng = SmallRng::seed_from_u64(9);
        let options = SeedingOptions {
            susceptible_speed_km: 2.0,
            initial_infectious: 4,
            min_age: 0,
            max_age: 90,
        };
        let seeds = seeds_from_census(&[record(10, 5, 5)], &options, 0.5, &mut rng).unwrap();
        let infectious: Vec<&AgentSeed> =
            seeds.iter().filter(|s| s.role == Role::Infectious).collect();
        assert_eq!(infectious.len(), 4);
        assert!(infectious.iter().all(|s| s.speed == 1.0));
    }

    #[test]
    fn rejects_impossible_options() {
        let mut rng = SmallRng::seed_from_u64(9);
        let too_many = SeedingOptions {
            initial_infectious: 3,
            ..SeedingOptions::default()
        };
        assert!(matches!(
            seeds_from_census(&[record(2, 1, 1)], &too_many, 0.5, &mut rng),
            Err(GeospreadError::ConfigurationError(_))
        ));

        let inverted = SeedingOptions {
            min_age: 50,
            max_age: 10,
            ..SeedingOptions::default()
        };
        assert!(seeds_from_census(&[], &inverted, 0.5, &mut rng).is_err());
    }

    #[test]
    fn seeding_is_reproducible() {
        let options = SeedingOptions {
            initial_infectious: 2,
            ..SeedingOptions::default()
        };
        let records = [record(20, 7, 8)];
        let first =
            seeds_from_census(&records, &options, 0.5, &mut SmallRng::seed_from_u64(1)).unwrap();
        let second =
            seeds_from_census(&records, &options, 0.5, &mut SmallRng::seed_from_u64(1)).unwrap();
        assert_eq!(first, second);
    }
}
