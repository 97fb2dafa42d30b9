use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::app::ports::ContactWriter;
use crate::domain::ContactResult;
use crate::error::{PipelineError, Result};

/// Writes contacts as `name,phone,count` rows with a header line.
pub struct CsvContactWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvContactWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| PipelineError::Io(e.into_error()))
    }
}

impl<W: Write> ContactWriter for CsvContactWriter<W> {
    fn write_contacts(&mut self, contacts: &[ContactResult]) -> Result<()> {
        self.writer.write_record(["name", "phone", "count"])?;
        for contact in contacts {
            let count = contact.count.to_string();
            self.writer.write_record([
                contact.display_name.as_str(),
                contact.phone.as_str(),
                count.as_str(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Write `contacts` to a new file at `path`, prefixed with a UTF-8 BOM so
/// spreadsheet programs detect the encoding.
pub fn write_contacts_file(path: &Path, contacts: &[ContactResult]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(b"\xEF\xBB\xBF")?;
    let mut writer = CsvContactWriter::new(file);
    writer.write_contacts(contacts)
}
