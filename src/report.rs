use std::any::TypeId;
use std::cell::RefCell;
use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

use csv::Writer;
use log::{debug, trace};

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::GeospreadError;
use crate::hashing::HashMap;

/// A row type written to its own CSV file. Implement it with `define_report!`.
pub trait Report: 'static {
    fn type_id(&self) -> TypeId;
    fn serialize(&self, writer: &mut Writer<File>) -> Result<(), GeospreadError>;
}

/// Use this macro to implement `Report` for a `serde::Serialize` row type.
#[macro_export]
macro_rules! define_report {
    ($name:ident) => {
        impl $crate::report::Report for $name {
            fn type_id(&self) -> std::any::TypeId {
                std::any::TypeId::of::<$name>()
            }

            fn serialize(
                &self,
                writer: &mut csv::Writer<std::fs::File>,
            ) -> Result<(), $crate::error::GeospreadError> {
                writer.serialize(self)?;
                Ok(())
            }
        }
    };
}
pub use define_report;

/// Where report files are written: `<directory>/<file_prefix><short_name>.csv`.
#[derive(Clone, Debug)]
pub struct ReportOptions {
    pub file_prefix: String,
    pub directory: PathBuf,
    pub overwrite: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            file_prefix: String::new(),
            directory: PathBuf::from("."),
            overwrite: false,
        }
    }
}

impl ReportOptions {
    pub fn file_prefix(&mut self, file_prefix: impl Into<String>) -> &mut ReportOptions {
        self.file_prefix = file_prefix.into();
        self
    }

    pub fn directory(&mut self, directory: impl Into<PathBuf>) -> &mut ReportOptions {
        self.directory = directory.into();
        self
    }

    pub fn overwrite(&mut self, overwrite: bool) -> &mut ReportOptions {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn path_for(&self, short_name: &str) -> PathBuf {
        self.directory
            .join(format!("{}{short_name}.csv", self.file_prefix))
    }
}

struct ReportState {
    writers: RefCell<HashMap<TypeId, Writer<File>>>,
    options: ReportOptions,
}

define_data_plugin!(
    ReportPlugin,
    ReportState,
    ReportState {
        writers: RefCell::new(HashMap::default()),
        options: ReportOptions::default(),
    }
);

// Creates `path` and any missing parent directories.
fn create_report_file(path: &Path, overwrite: bool) -> Result<File, GeospreadError> {
    if path.extension().and_then(OsStr::to_str) != Some("csv") {
        return Err(GeospreadError::ReportError(
            "report output files must be CSVs".to_string(),
        ));
    }
    if !overwrite && path.exists() {
        return Err(GeospreadError::ReportError(format!(
            "{} already exists; use the overwrite option to replace it",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

pub trait ContextReportExt {
    /// The options used by later `add_report` calls.
    fn report_options(&mut self) -> &mut ReportOptions;

    /// Opens the CSV file for reports of type `T`, named from `short_name` and the current
    /// report options.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if the file exists and overwriting is off, and `IoError` if
    /// the file or its directory cannot be created.
    fn add_report<T: Report>(&mut self, short_name: &str) -> Result<PathBuf, GeospreadError>;

    /// Appends `report` as one row of its report file and flushes it.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if no report of this type was added and `CsvError` if the row
    /// cannot be written.
    fn send_report<T: Report>(&self, report: T) -> Result<(), GeospreadError>;

    /// Whether `add_report` was called for `T`.
    fn has_report<T: Report>(&self) -> bool;
}

impl ContextReportExt for Context {
    fn report_options(&mut self) -> &mut ReportOptions {
        &mut self.get_data_mut::<ReportPlugin>().options
    }

    fn add_report<T: Report>(&mut self, short_name: &str) -> Result<PathBuf, GeospreadError> {
        let state = self.get_data_mut::<ReportPlugin>();
        let path = state.options.path_for(short_name);
        let file = create_report_file(&path, state.options.overwrite)?;
        debug!("writing {short_name} report to {}", path.display());
        state
            .writers
            .borrow_mut()
            .insert(TypeId::of::<T>(), Writer::from_writer(file));
        Ok(path)
    }

    fn send_report<T: Report>(&self, report: T) -> Result<(), GeospreadError> {
        let missing = || GeospreadError::ReportError("no writer found for the report type".into());
        let state = self.get_data::<ReportPlugin>().ok_or_else(missing)?;
        let mut writers = state.writers.borrow_mut();
        let writer = writers.get_mut(&report.type_id()).ok_or_else(missing)?;
        report.serialize(writer)?;
        writer.flush()?;
        trace!("sent report row");
        Ok(())
    }

    fn has_report<T: Report>(&self) -> bool {
        self.get_data::<ReportPlugin>().is_some_and(|data| {
            data.writers
                .borrow()
                .contains_key(&TypeId::of::<T>())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize)]
    struct LabelReport {
        agent: u32,
        label: String,
    }

    define_report!(LabelReport);

    #[derive(Serialize)]
    struct OtherReport {
        step: usize,
    }

    define_report!(OtherReport);

    fn context_writing_to(directory: &Path) -> Context {
        let mut context = Context::new();
        context.report_options().directory(directory);
        context
    }

    #[test]
    fn rows_are_quoted_and_flushed() {
        let dir = tempdir().unwrap();
        let mut context = context_writing_to(dir.path());
        let path = context.add_report::<LabelReport>("sample").unwrap();
        assert_eq!(path, dir.path().join("sample.csv"));
        assert!(context.has_report::<LabelReport>());
        assert!(!context.has_report::<OtherReport>());

        context
            .send_report(LabelReport {
                agent: 1,
                label: "Value,1".to_string(),
            })
            .unwrap();
        context
            .send_report(LabelReport {
                agent: 2,
                label: "Value\n2".to_string(),
            })
            .unwrap();

        let mut reader = csv::Reader::from_path(path).unwrap();
        let records: Vec<LabelReport> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].agent, 1);
        assert_eq!(records[0].label, "Value,1");
        assert_eq!(records[1].label, "Value\n2");
    }

    #[test]
    fn prefix_and_nested_directory() {
        let dir = tempdir().unwrap();
        let mut context = Context::new();
        context
            .report_options()
            .directory(dir.path().join("nested").join("output"))
            .file_prefix("run1_");
        let path = context.add_report::<OtherReport>("steps").unwrap();
        assert_eq!(
            path,
            dir.path().join("nested").join("output").join("run1_steps.csv")
        );
        context.send_report(OtherReport { step: 4 }).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents, "step\n4\n");
    }

    #[test]
    fn existing_files_need_overwrite() {
        let dir = tempdir().unwrap();
        let mut context = context_writing_to(dir.path());
        context.add_report::<LabelReport>("sample").unwrap();

        let mut second = context_writing_to(dir.path());
        assert!(matches!(
            second.add_report::<LabelReport>("sample"),
            Err(GeospreadError::ReportError(_))
        ));
        second.report_options().overwrite(true);
        assert!(second.add_report::<LabelReport>("sample").is_ok());
    }

    #[test]
    fn rejects_non_csv_paths() {
        let dir = tempdir().unwrap();
        let result = create_report_file(&dir.path().join("sample.tsv"), true);
        assert!(matches!(result, Err(GeospreadError::ReportError(_))));
    }

    #[test]
    fn sending_needs_an_open_report() {
        let context = Context::new();
        let result = context.send_report(OtherReport { step: 1 });
        assert!(matches!(result, Err(GeospreadError::ReportError(_))));
    }
}
