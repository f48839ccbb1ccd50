use crate::domain::RequestView;

use super::{cells, ReportError, COLUMNS};

pub fn render(rows: &[RequestView]) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for view in rows {
        writer.write_record(&cells(view))?;
    }
    writer.into_inner().map_err(|e| ReportError::Io(e.into_error()))
}
